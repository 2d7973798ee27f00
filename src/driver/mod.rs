mod synthetic;

pub use synthetic::{SyntheticDriver, SyntheticDriverOpts};

use std::path::Path;
use std::time::Duration;

use crate::foundation::core::Fps;
use crate::foundation::error::ReclockResult;

/// DOM-style key code that suppresses a scene's debug overlay.
pub const KEY_HIDE_OVERLAY: &str = "KeyH";
/// DOM-style key code that starts scene playback.
pub const KEY_START_PLAYBACK: &str = "Space";

/// Capability set the capture pipeline requires from a renderer.
///
/// One driver instance backs one rendering session; the pipeline never assumes
/// a specific automation library behind it. Implementations must substitute
/// their time source with the session's [`crate::VirtualClock`] so that the
/// hosted scene can only observe virtual time; `install_clock` is called
/// before `load_scene`, mirroring script injection before navigation.
pub trait RendererDriver {
    /// Install a fresh virtual clock (and animation interception) for the
    /// session at the given frame rate.
    fn install_clock(&mut self, fps: Fps) -> ReclockResult<()>;

    /// Load a scene and wait for asset readiness (fonts, images). Exceeding
    /// `timeout` fails the job.
    fn load_scene(&mut self, source: &Path, timeout: Duration) -> ReclockResult<()>;

    /// Advance the session's virtual clock by one frame and re-pin tracked
    /// animations.
    fn advance_frame(&mut self) -> ReclockResult<()>;

    /// Block until one real paint has settled after the last tick.
    fn await_paint_settle(&mut self) -> ReclockResult<()>;

    /// Capture the current frame as encoded image bytes in the session's
    /// [`crate::FrameFormat`].
    fn capture_frame(&mut self) -> ReclockResult<Vec<u8>>;

    /// Send a key event to the hosted scene.
    fn dispatch_key(&mut self, key: &str) -> ReclockResult<()>;
}
