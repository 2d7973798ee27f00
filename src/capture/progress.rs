/// Phase of one scene job as it moves through the capture pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Loading,
    WarmingUp,
    Capturing,
    Finalizing,
    Done,
    Failed,
}

/// Point-in-time view of a job's progress.
///
/// The core only exposes this snapshot; rendering it (plain lines, in-place
/// redraw, nothing at all) is entirely the caller's concern.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ProgressSnapshot {
    pub scene_id: String,
    pub phase: JobPhase,
    /// Frames already written to the encoder.
    pub frame_index: u64,
    pub total_frames: u64,
    /// 0.0 - 100.0.
    pub percent: f64,
    /// Wall-clock time since the job started.
    pub elapsed_ms: u64,
}

impl ProgressSnapshot {
    pub(crate) fn start(scene_id: &str, total_frames: u64) -> Self {
        Self {
            scene_id: scene_id.to_owned(),
            phase: JobPhase::Loading,
            frame_index: 0,
            total_frames,
            percent: 0.0,
            elapsed_ms: 0,
        }
    }
}

/// Observer of job progress. Shared across workers, so it must be `Sync`;
/// updates arrive from multiple worker threads concurrently.
pub trait ProgressObserver: Send + Sync {
    fn update(&self, snapshot: &ProgressSnapshot);

    /// Called once per job with the terminal snapshot (`Done` or `Failed`).
    fn finish(&self, snapshot: &ProgressSnapshot) {
        let _ = snapshot;
    }
}

/// Observer that ignores everything.
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn update(&self, _snapshot: &ProgressSnapshot) {}
}
