use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::warn;

use crate::foundation::core::Fps;

/// Callback invoked once on the next virtual frame, with the new virtual time in ms.
///
/// A returned error is logged and isolated; it does not abort the rest of the tick.
pub type FrameCallback = Box<dyn FnMut(f64) -> anyhow::Result<()>>;

/// Deferred or repeating callback owned by the clock's timer arena.
pub type TimerCallback = Box<dyn FnMut() -> anyhow::Result<()>>;

/// Identifier for a registered frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(pub(crate) u64);

/// Identifier for a registered timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

struct FrameEntry {
    id: u64,
    cb: FrameCallback,
}

struct TimerEntry {
    id: u64,
    fire_at: f64,
    /// 0 means one-shot.
    interval_ms: f64,
    cancelled: bool,
    /// Taken out while the callback runs; a one-shot keeps it `None` forever.
    cb: Option<TimerCallback>,
}

struct ClockInner {
    virtual_time_ms: f64,
    frame_duration_ms: f64,
    /// Callbacks accumulated for the next tick. Promoted to the current-frame
    /// batch at the start of `advance_frame`, so anything registered during a
    /// flush waits for the following tick.
    next_frame: Vec<FrameEntry>,
    /// Ids cancelled while their entry is in the in-flight batch. Cleared at
    /// the end of every flush.
    cancelled_frames: HashSet<u64>,
    timers: Vec<TimerEntry>,
    next_callback_id: u64,
    next_timer_id: u64,
}

/// Simulated monotonic clock for one rendering session.
///
/// The clock replaces every real time source the hosted scene would otherwise
/// read: `now()` is the only time observable during a recording, and time moves
/// only when [`VirtualClock::advance_frame`] is called. A session is logically
/// single-threaded and cooperative, so the handle is a cheap `Rc` clone that
/// callbacks may capture to register further work.
///
/// `advance_frame` must not be re-entered from inside a callback.
#[derive(Clone)]
pub struct VirtualClock {
    inner: Rc<RefCell<ClockInner>>,
}

impl VirtualClock {
    pub fn new(fps: Fps) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ClockInner {
                virtual_time_ms: 0.0,
                frame_duration_ms: fps.frame_duration_ms(),
                next_frame: Vec::new(),
                cancelled_frames: HashSet::new(),
                timers: Vec::new(),
                next_callback_id: 1,
                next_timer_id: 1,
            })),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> f64 {
        self.inner.borrow().virtual_time_ms
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.inner.borrow().frame_duration_ms
    }

    /// Register a callback for the next frame. Callbacks registered during a
    /// flush of frame `k` run at frame `k + 1`, never at `k`.
    pub fn request_frame(&self, cb: FrameCallback) -> CallbackId {
        let mut c = self.inner.borrow_mut();
        let id = c.next_callback_id;
        c.next_callback_id += 1;
        c.next_frame.push(FrameEntry { id, cb });
        CallbackId(id)
    }

    pub fn cancel_frame(&self, id: CallbackId) {
        let mut c = self.inner.borrow_mut();
        if let Some(pos) = c.next_frame.iter().position(|e| e.id == id.0) {
            c.next_frame.remove(pos);
        } else {
            // The entry may be in the batch currently being flushed.
            c.cancelled_frames.insert(id.0);
        }
    }

    /// Register a timer firing `delay_ms` virtual ms from now. `interval_ms`
    /// of 0 is one-shot; a positive interval reschedules relative to the
    /// previous nominal `fire_at` (no cumulative drift under load).
    pub fn register_timer(&self, cb: TimerCallback, delay_ms: f64, interval_ms: f64) -> TimerId {
        let mut c = self.inner.borrow_mut();
        let id = c.next_timer_id;
        c.next_timer_id += 1;
        let interval = if interval_ms > 0.0 {
            interval_ms.max(1.0)
        } else {
            0.0
        };
        let fire_at = c.virtual_time_ms + delay_ms.max(0.0);
        c.timers.push(TimerEntry {
            id,
            fire_at,
            interval_ms: interval,
            cancelled: false,
            cb: Some(cb),
        });
        TimerId(id)
    }

    /// Cancel a timer. A cancelled entry never fires, even when its `fire_at`
    /// is already in the past at cancellation time.
    pub fn cancel_timer(&self, id: TimerId) {
        let mut c = self.inner.borrow_mut();
        if let Some(pos) = c.timers.iter().position(|t| t.id == id.0) {
            if c.timers[pos].cb.is_some() {
                c.timers.remove(pos);
            } else {
                // Currently firing; the flush loop prunes it afterwards.
                c.timers[pos].cancelled = true;
            }
        }
    }

    /// Advance virtual time by exactly one frame duration and run one full
    /// tick: promote + flush the frame-callback queue, then fire due timers in
    /// `(fire_at, registration order)` order.
    pub fn advance_frame(&self) {
        let (now, batch) = {
            let mut c = self.inner.borrow_mut();
            c.virtual_time_ms += c.frame_duration_ms;
            (c.virtual_time_ms, std::mem::take(&mut c.next_frame))
        };

        for mut entry in batch {
            let skip = self.inner.borrow_mut().cancelled_frames.remove(&entry.id);
            if skip {
                continue;
            }
            if let Err(err) = (entry.cb)(now) {
                warn!(callback = entry.id, error = %err, "frame callback failed; tick continues");
            }
        }
        // Remaining ids belong to the batch just flushed (or were already
        // stale); entries still queued were removed directly in cancel_frame.
        self.inner.borrow_mut().cancelled_frames.clear();

        self.fire_due_timers(now);
    }

    fn fire_due_timers(&self, now: f64) {
        let due_ids: Vec<u64> = {
            let c = self.inner.borrow();
            let mut due: Vec<(f64, u64)> = c
                .timers
                .iter()
                .filter(|t| !t.cancelled && t.fire_at <= now)
                .map(|t| (t.fire_at, t.id))
                .collect();
            // Ascending fire_at; ties resolve in registration order. Ids are
            // monotonically increasing, so the id is the tie-break.
            due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            due.into_iter().map(|(_, id)| id).collect()
        };

        for id in due_ids {
            let taken = {
                let mut c = self.inner.borrow_mut();
                match c.timers.iter().position(|t| t.id == id) {
                    Some(pos) if !c.timers[pos].cancelled => {
                        let interval = c.timers[pos].interval_ms;
                        if interval > 0.0 {
                            c.timers[pos].fire_at += interval;
                        }
                        c.timers[pos].cb.take().map(|cb| (cb, interval))
                    }
                    Some(pos) => {
                        // Cancelled by an earlier callback in this same tick.
                        c.timers.remove(pos);
                        None
                    }
                    None => None,
                }
            };
            let Some((mut cb, interval)) = taken else {
                continue;
            };

            if let Err(err) = cb() {
                warn!(timer = id, error = %err, "timer callback failed; tick continues");
            }

            let mut c = self.inner.borrow_mut();
            if let Some(pos) = c.timers.iter().position(|t| t.id == id) {
                if interval > 0.0 && !c.timers[pos].cancelled {
                    c.timers[pos].cb = Some(cb);
                } else {
                    c.timers.remove(pos);
                }
            }
        }
    }

    /// Number of live timer entries (test and diagnostics aid).
    pub fn timer_count(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Number of callbacks queued for the next frame.
    pub fn pending_frame_callbacks(&self) -> usize {
        self.inner.borrow().next_frame.len()
    }
}
