//! Reclock is a deterministic scene-capture engine built on virtual time.
//!
//! A hosted scene never observes the wall clock. Every time source it can
//! reach (frame callbacks, timers, animation clocks) is backed by a
//! [`VirtualClock`] that only moves when the capture pipeline advances it, one
//! exact frame duration per tick. Capturing a frame after each tick yields a
//! video whose timing is independent of machine load: the same scene produces
//! the same frames on a laptop and on a build server.
//!
//! # Pipeline overview
//!
//! 1. **Discover**: scan a directory for scene files and build [`SceneJob`]s
//! 2. **Drive**: a [`RendererDriver`] hosts one scene per session, clock
//!    installed before load
//! 3. **Capture**: [`record_scene`] ticks the clock, waits for paint, grabs
//!    frame bytes
//! 4. **Encode**: frames stream through a [`FrameSink`] (the system `ffmpeg`
//!    binary for MP4 output, with bounded backpressure)
//! 5. **Orchestrate**: [`run_jobs`] fans jobs out round-robin across isolated
//!    worker sessions
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic-by-default**: frame `i` always corresponds to virtual
//!   time `i * frame_duration`, regardless of real delays in the pipeline.
//! - **Bounded memory**: at most one frame in flight per session plus a small
//!   encoder queue.
#![forbid(unsafe_code)]

mod capture;
mod clock;
mod driver;
mod encode;
mod foundation;
mod orchestrate;
mod scenes;
mod sync;

pub use capture::pipeline::{CaptureOpts, RecordingResult, record_scene};
pub use capture::progress::{JobPhase, NoopProgress, ProgressObserver, ProgressSnapshot};
pub use clock::{CallbackId, FrameCallback, TimerCallback, TimerId, VirtualClock};
pub use driver::{
    KEY_HIDE_OVERLAY, KEY_START_PLAYBACK, RendererDriver, SyntheticDriver, SyntheticDriverOpts,
};
pub use encode::ffmpeg::{
    EncoderPreset, FfmpegSink, FfmpegSinkOpts, ensure_parent_dir, is_ffmpeg_on_path,
};
pub use encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use foundation::core::{FrameFormat, FrameIndex, Fps, Resolution};
pub use foundation::error::{ReclockError, ReclockResult};
pub use orchestrate::{
    DriverFactory, JobReport, RunReport, SinkFactory, WorkerAssignment, clamp_worker_count,
    partition_round_robin, run_jobs,
};
pub use scenes::{
    DEFAULT_DURATION_SECONDS, DEFAULT_EXTRA_SECONDS, JobStatus, SceneJob, discover_scenes,
    extract_duration, is_scene_file, total_frames,
};
pub use sync::{AnimationHandle, AnimationId, AnimationTracker, PlayState};
