mod tracker;

pub use tracker::{AnimationHandle, AnimationId, AnimationTracker, PlayState};
