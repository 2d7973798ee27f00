use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::capture::progress::{JobPhase, ProgressObserver, ProgressSnapshot};
use crate::driver::{KEY_HIDE_OVERLAY, KEY_START_PLAYBACK, RendererDriver};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{FrameFormat, FrameIndex, Fps, Resolution};
use crate::foundation::error::ReclockResult;
use crate::scenes::SceneJob;

/// Per-session capture parameters.
#[derive(Clone, Debug)]
pub struct CaptureOpts {
    pub fps: Fps,
    pub format: FrameFormat,
    /// Pixel dimensions frames are captured (and encoded) at.
    pub resolution: Resolution,
    /// Tail padding in seconds, folded into each job's frame budget.
    pub extra_seconds: f64,
    /// Frames advanced before playback starts, to let scene initialization
    /// side effects run.
    pub warmup_frames: u32,
    /// Applies to scene loading only; capture itself has no timeout.
    pub load_timeout: Duration,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        Self {
            fps: Fps { num: 60, den: 1 },
            format: FrameFormat::Png,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            extra_seconds: crate::scenes::DEFAULT_EXTRA_SECONDS,
            warmup_frames: 3,
            load_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of one completed scene job. Immutable after creation.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RecordingResult {
    pub scene_id: String,
    /// The video artifact produced for this scene.
    pub artifact: PathBuf,
    pub duration_seconds: f64,
    pub wall_seconds: f64,
}

/// Record one scene job to `sink`, frame by frame.
///
/// Phases: loading -> warming-up -> capturing -> finalizing. Any error fails
/// the job; the caller decides what that means for sibling jobs.
///
/// Guarantee: frame `i` pushed to the sink corresponds to virtual time
/// `i * frame_duration_ms` after warm-up, independent of real wall-clock
/// delays anywhere in the pipeline.
pub fn record_scene(
    driver: &mut dyn RendererDriver,
    job: &SceneJob,
    sink: &mut dyn FrameSink,
    artifact: &Path,
    opts: &CaptureOpts,
    progress: &dyn ProgressObserver,
) -> ReclockResult<RecordingResult> {
    let start = Instant::now();
    let mut snap = ProgressSnapshot::start(&job.id, job.total_frames);
    progress.update(&snap);

    // The clock must be in place before any scene logic can observe time.
    driver.install_clock(opts.fps)?;
    driver.load_scene(&job.source, opts.load_timeout)?;

    debug!(scene = %job.id, "warming up");
    snap.phase = JobPhase::WarmingUp;
    snap.elapsed_ms = start.elapsed().as_millis() as u64;
    progress.update(&snap);

    for _ in 0..opts.warmup_frames {
        driver.advance_frame()?;
    }
    driver.await_paint_settle()?;

    driver.dispatch_key(KEY_HIDE_OVERLAY)?;
    driver.advance_frame()?;
    driver.await_paint_settle()?;

    driver.dispatch_key(KEY_START_PLAYBACK)?;
    driver.advance_frame()?;
    driver.await_paint_settle()?;

    debug!(scene = %job.id, frames = job.total_frames, "capturing");
    snap.phase = JobPhase::Capturing;
    progress.update(&snap);

    sink.begin(SinkConfig {
        fps: opts.fps,
        format: opts.format,
        resolution: opts.resolution,
    })?;

    // Progress once per nominal second of output, and on the last frame.
    let cadence = (opts.fps.as_f64().round() as u64).max(1);
    for frame in 0..job.total_frames {
        driver.advance_frame()?;
        driver.await_paint_settle()?;
        let bytes = driver.capture_frame()?;
        sink.push_frame(FrameIndex(frame), &bytes)?;

        if (frame + 1) % cadence == 0 || frame + 1 == job.total_frames {
            snap.frame_index = frame + 1;
            snap.percent = ((frame + 1) as f64 / job.total_frames.max(1) as f64) * 100.0;
            snap.elapsed_ms = start.elapsed().as_millis() as u64;
            progress.update(&snap);
        }
    }

    snap.phase = JobPhase::Finalizing;
    snap.elapsed_ms = start.elapsed().as_millis() as u64;
    progress.update(&snap);

    sink.end()?;

    let wall_seconds = start.elapsed().as_secs_f64();
    snap.phase = JobPhase::Done;
    snap.elapsed_ms = start.elapsed().as_millis() as u64;
    progress.finish(&snap);
    debug!(scene = %job.id, wall_seconds, "scene recorded");

    Ok(RecordingResult {
        scene_id: job.id.clone(),
        artifact: artifact.to_path_buf(),
        duration_seconds: job.duration_seconds,
        wall_seconds,
    })
}
