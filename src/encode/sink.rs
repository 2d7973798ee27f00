use crate::foundation::core::{FrameFormat, FrameIndex, Fps, Resolution};
use crate::foundation::error::ReclockResult;

/// Configuration provided to a [`FrameSink`] at the start of a capture.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Output frames-per-second.
    pub fps: Fps,
    /// Byte format of the pushed frames.
    pub format: FrameFormat,
    /// Pixel dimensions of every pushed frame.
    pub resolution: Resolution,
}

/// Sink contract for consuming captured frames in timeline order.
///
/// Ordering contract: `push_frame` is called in strictly increasing
/// `FrameIndex` order. `push_frame` may block under backpressure; callers must
/// not write past a full downstream buffer.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> ReclockResult<()>;
    /// Push one encoded frame in strictly increasing timeline order.
    fn push_frame(&mut self, idx: FrameIndex, bytes: &[u8]) -> ReclockResult<()>;
    /// Called once after the last frame is pushed.
    fn end(&mut self) -> ReclockResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, Vec<u8>)>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sink configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg.clone()
    }

    /// Borrow the captured frames.
    pub fn frames(&self) -> &[(FrameIndex, Vec<u8>)] {
        &self.frames
    }

    /// Consume the sink, returning the captured frames.
    pub fn into_frames(self) -> Vec<(FrameIndex, Vec<u8>)> {
        self.frames
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ReclockResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, bytes: &[u8]) -> ReclockResult<()> {
        self.frames.push((idx, bytes.to_vec()));
        Ok(())
    }

    fn end(&mut self) -> ReclockResult<()> {
        Ok(())
    }
}
