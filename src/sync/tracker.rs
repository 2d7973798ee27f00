use tracing::debug;

use crate::foundation::error::ReclockResult;

/// Reported playback state of a host animation object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Running,
    /// Reached its end but still holds its final value.
    Finished,
    /// Terminal state; the tracker drops the entry.
    Idle,
}

/// Capability surface of a continuous-time animation object in the host
/// renderer. The tracker never assumes anything beyond this contract.
pub trait AnimationHandle {
    fn play_state(&self) -> PlayState;

    /// Stop autonomous real-time progress. Called exactly once, at creation.
    fn suspend(&mut self) -> ReclockResult<()>;

    /// Seek the animation to `local_ms` since its creation. An error marks the
    /// handle as no longer settable and the entry is dropped.
    fn set_local_time(&mut self, local_ms: f64) -> ReclockResult<()>;
}

/// Identifier of a tracked animation within one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnimationId(u64);

struct TrackedAnimation {
    id: u64,
    created_at_ms: f64,
    handle: Box<dyn AnimationHandle>,
}

/// Pins continuous-time animations to the session's virtual clock.
///
/// Animation engines that interpolate on elapsed wall time would desynchronize
/// from the discrete frame grid; suspending each animation at creation and
/// seeking it explicitly every tick makes its output a pure function of the
/// frame index.
#[derive(Default)]
pub struct AnimationTracker {
    entries: Vec<TrackedAnimation>,
    next_id: u64,
}

impl AnimationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intercept a freshly created animation: suspend it immediately and
    /// record its virtual creation time.
    pub fn intercept_creation(
        &mut self,
        mut handle: Box<dyn AnimationHandle>,
        now_ms: f64,
    ) -> ReclockResult<AnimationId> {
        handle.suspend()?;
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(TrackedAnimation {
            id,
            created_at_ms: now_ms,
            handle,
        });
        Ok(AnimationId(id))
    }

    /// Whether a resume/play request must be swallowed. Tracked animations are
    /// externally driven, so resuming them is a no-op; requests for untracked
    /// animations pass through unchanged.
    pub fn suppress_play(&self, id: AnimationId) -> bool {
        self.entries.iter().any(|t| t.id == id.0)
    }

    /// Pin every live animation to `now_ms - created_at_ms`. Entries that
    /// report idle or reject the seek are dropped.
    pub fn sync_to(&mut self, now_ms: f64) {
        self.entries.retain_mut(|t| {
            if t.handle.play_state() == PlayState::Idle {
                debug!(animation = t.id, "dropping idle animation");
                return false;
            }
            let local = now_ms - t.created_at_ms;
            match t.handle.set_local_time(local) {
                Ok(()) => true,
                Err(err) => {
                    debug!(animation = t.id, error = %err, "dropping animation with unsettable handle");
                    false
                }
            }
        });
    }

    pub fn tracked_count(&self) -> usize {
        self.entries.len()
    }
}
