pub mod pipeline;
pub mod progress;
