mod engine;

pub use engine::{CallbackId, FrameCallback, TimerCallback, TimerId, VirtualClock};
