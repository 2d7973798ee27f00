use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use anyhow::Context as _;
use tracing::{debug, trace, warn};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReclockError, ReclockResult};

/// x264 effort/quality trade-off per capture quality tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderPreset {
    /// Fast encode for iteration.
    Draft,
    /// Slow encode for delivery.
    Final,
}

impl EncoderPreset {
    fn libx264_preset(self) -> &'static str {
        match self {
            EncoderPreset::Draft => "fast",
            EncoderPreset::Final => "slow",
        }
    }
}

/// Options for [`FfmpegSink`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    pub preset: EncoderPreset,
    /// Bounded queue depth between `push_frame` and the pipe writer thread.
    /// This is the backpressure window: a full queue suspends the producer.
    pub channel_capacity: usize,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            preset: EncoderPreset::Final,
            channel_capacity: 8,
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams encoded frames
/// (`image2pipe`) to its stdin.
///
/// Frames travel through a bounded channel to a dedicated writer thread that
/// owns the child's stdin. When the channel is full, `push_frame` blocks until
/// the writer drains, so memory stays bounded no matter how slow the encoder is.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    tx: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,

    last_idx: Option<FrameIndex>,
    backpressure_waits: u64,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            tx: None,
            writer: None,
            stderr_drain: None,
            last_idx: None,
            backpressure_waits: 0,
        }
    }

    /// How many pushes had to suspend on a full encoder queue.
    pub fn backpressure_waits(&self) -> u64 {
        self.backpressure_waits
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReclockResult<()> {
        if cfg.resolution.width == 0 || cfg.resolution.height == 0 {
            return Err(ReclockError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.resolution.width.is_multiple_of(2) || !cfg.resolution.height.is_multiple_of(2) {
            return Err(ReclockError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReclockError::validation(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(ReclockError::setup(
                "ffmpeg is required for MP4 encoding, but was not found on PATH \
                 (install it, e.g. `apt install ffmpeg` or `brew install ffmpeg`)",
            ));
        }

        let args = build_ffmpeg_args(&cfg, &self.opts);
        debug!(out = %self.opts.out_path.display(), "spawning ffmpeg");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .arg(&self.opts.out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReclockError::setup(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReclockError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReclockError::encode("failed to open ffmpeg stderr (unexpected)"))?;

        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(self.opts.channel_capacity.max(1));
        let writer = std::thread::spawn(move || {
            for frame in rx {
                stdin.write_all(&frame)?;
            }
            // stdin drops here, closing the encoder's input.
            Ok(())
        });

        self.child = Some(child);
        self.tx = Some(tx);
        self.writer = Some(writer);
        self.stderr_drain = Some(stderr_drain);
        self.last_idx = None;
        self.backpressure_waits = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, bytes: &[u8]) -> ReclockResult<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ReclockError::encode("ffmpeg sink not started"));
        };
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReclockError::encode(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        match tx.try_send(bytes.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                // Encoder input is full: suspend until the writer drains.
                self.backpressure_waits += 1;
                trace!(frame = idx.0, "encoder queue full; waiting for drain");
                tx.send(frame)
                    .map_err(|_| ReclockError::encode("ffmpeg writer thread exited early"))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(ReclockError::encode("ffmpeg writer thread exited early"))
            }
        }
    }

    fn end(&mut self) -> ReclockResult<()> {
        drop(self.tx.take());

        if let Some(writer) = self.writer.take() {
            writer
                .join()
                .map_err(|_| ReclockError::encode("ffmpeg writer thread panicked"))?
                .map_err(|e| {
                    ReclockError::encode(format!("failed to write frames to ffmpeg stdin: {e}"))
                })?;
        }

        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReclockError::encode("ffmpeg sink not started"))?;
        let status = child
            .wait()
            .map_err(|e| ReclockError::encode(format!("failed to wait for ffmpeg: {e}")))?;

        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReclockError::encode("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReclockError::encode(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReclockError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    /// A sink dropped before `end` (the job failed mid-capture) still owns a
    /// live child. Kill and reap it here; the partial output file stays on
    /// disk for inspection.
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        warn!(
            out = %self.opts.out_path.display(),
            "ffmpeg sink dropped before end; stopping encoder, output is partial"
        );
        drop(self.tx.take());
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        let _ = child.kill();
        let _ = child.wait();
        if let Some(drain) = self.stderr_drain.take() {
            let _ = drain.join();
        }
    }
}

fn build_ffmpeg_args(cfg: &SinkConfig, opts: &FfmpegSinkOpts) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    args.push(if opts.overwrite { "-y" } else { "-n" }.to_owned());
    args.extend(
        [
            "-loglevel",
            "error",
            "-f",
            "image2pipe",
            "-vcodec",
            cfg.format.pipe_codec(),
            "-framerate",
        ]
        .map(str::to_owned),
    );
    args.push(format!("{}/{}", cfg.fps.num, cfg.fps.den));
    args.extend(
        [
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            opts.preset.libx264_preset(),
            "-crf",
            "18",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]
        .map(str::to_owned),
    );
    args
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReclockResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
