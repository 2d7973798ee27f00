use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, trace};

use crate::clock::VirtualClock;
use crate::driver::{KEY_HIDE_OVERLAY, KEY_START_PLAYBACK, RendererDriver};
use crate::foundation::core::{FrameFormat, Fps, Resolution};
use crate::foundation::error::{ReclockError, ReclockResult};
use crate::scenes;
use crate::sync::{AnimationHandle, AnimationId, AnimationTracker, PlayState};

/// Options for the built-in [`SyntheticDriver`].
#[derive(Clone, Debug)]
pub struct SyntheticDriverOpts {
    pub resolution: Resolution,
    pub format: FrameFormat,
    /// JPEG quality (1-100) when `format` is [`FrameFormat::Jpeg`].
    pub jpeg_quality: u8,
}

impl Default for SyntheticDriverOpts {
    fn default() -> Self {
        Self {
            resolution: Resolution {
                width: 64,
                height: 36,
            },
            format: FrameFormat::Png,
            jpeg_quality: 90,
        }
    }
}

/// In-process reference implementation of [`RendererDriver`].
///
/// This is not a browser: it hosts a [`VirtualClock`] and an
/// [`AnimationTracker`] exactly the way a real renderer driver must, and
/// paints frames that are a pure function of virtual time and scene state.
/// Identical inputs therefore produce identical captured bytes, which is what
/// the integration tests (and `reclock record --driver synthetic`) rely on.
pub struct SyntheticDriver {
    opts: SyntheticDriverOpts,
    clock: Option<VirtualClock>,
    tracker: AnimationTracker,
    scene: Option<SceneState>,
}

struct SceneState {
    playing: Rc<Cell<bool>>,
    overlay_visible: bool,
    /// Incremented by the scene's self-re-registering frame-callback loop.
    ticks_seen: Rc<Cell<u64>>,
    /// Incremented by a 1s interval timer, like a beat-sync track.
    beat: Rc<Cell<u64>>,
    /// Written by the tracker pinning the scene's one tracked animation.
    anim_pos_ms: Rc<Cell<f64>>,
    anim_id: AnimationId,
}

struct SyntheticAnimation {
    duration_ms: f64,
    pos_ms: Rc<Cell<f64>>,
    suspended: bool,
}

impl AnimationHandle for SyntheticAnimation {
    fn play_state(&self) -> PlayState {
        if self.pos_ms.get() >= self.duration_ms {
            PlayState::Finished
        } else {
            PlayState::Running
        }
    }

    fn suspend(&mut self) -> ReclockResult<()> {
        self.suspended = true;
        Ok(())
    }

    fn set_local_time(&mut self, local_ms: f64) -> ReclockResult<()> {
        if !self.suspended {
            return Err(ReclockError::driver(
                "seek on an animation that was never suspended",
            ));
        }
        self.pos_ms.set(local_ms);
        Ok(())
    }
}

impl SyntheticDriver {
    pub fn new(opts: SyntheticDriverOpts) -> Self {
        Self {
            opts,
            clock: None,
            tracker: AnimationTracker::new(),
            scene: None,
        }
    }

    fn clock(&self) -> ReclockResult<&VirtualClock> {
        self.clock
            .as_ref()
            .ok_or_else(|| ReclockError::driver("no clock installed for this session"))
    }

    /// Schedule the scene's frame-callback loop: each invocation registers the
    /// next, so every registration lands in the clock's next-frame queue.
    fn schedule_tick_loop(clock: &VirtualClock, ticks_seen: Rc<Cell<u64>>) {
        let clock2 = clock.clone();
        clock.request_frame(Box::new(move |_now| {
            ticks_seen.set(ticks_seen.get() + 1);
            Self::schedule_tick_loop(&clock2, ticks_seen.clone());
            Ok(())
        }));
    }

    fn paint_rgb(&self, scene: &SceneState, now_ms: f64) -> Vec<u8> {
        let Resolution { width, height } = self.opts.resolution;
        let tq = (now_ms * 8.0).round() as u64;
        let anim = scene.anim_pos_ms.get().round().max(0.0) as u64;
        let beat = scene.beat.get();
        let ticks = scene.ticks_seen.get();
        let playing = u64::from(scene.playing.get());

        let mut buf = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..u64::from(height) {
            for x in 0..u64::from(width) {
                let r = (tq.wrapping_add(x * 3).wrapping_add(y * 7) & 0xff) as u8;
                let g = ((anim / 4).wrapping_add(ticks).wrapping_add(playing * 64) & 0xff) as u8;
                let b = ((beat * 32).wrapping_add(x ^ y) & 0xff) as u8;
                buf.extend_from_slice(&[r, g, b]);
            }
        }

        if scene.overlay_visible {
            // Debug overlay: a solid white top row. Warm-up must suppress it
            // before capture starts.
            let row = (width * 3) as usize;
            buf[..row].fill(0xff);
        }
        buf
    }

    fn encode(&self, rgb: &[u8]) -> ReclockResult<Vec<u8>> {
        use image::{ExtendedColorType, ImageEncoder as _};

        let Resolution { width, height } = self.opts.resolution;
        let mut out = Vec::new();
        match self.opts.format {
            FrameFormat::Png => {
                image::codecs::png::PngEncoder::new(&mut out)
                    .write_image(rgb, width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| ReclockError::driver(format!("png frame encode failed: {e}")))?;
            }
            FrameFormat::Jpeg => {
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.opts.jpeg_quality)
                    .write_image(rgb, width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| ReclockError::driver(format!("jpeg frame encode failed: {e}")))?;
            }
        }
        Ok(out)
    }
}

impl RendererDriver for SyntheticDriver {
    fn install_clock(&mut self, fps: Fps) -> ReclockResult<()> {
        self.clock = Some(VirtualClock::new(fps));
        self.tracker = AnimationTracker::new();
        self.scene = None;
        Ok(())
    }

    fn load_scene(&mut self, source: &Path, _timeout: Duration) -> ReclockResult<()> {
        let clock = self.clock()?.clone();

        let text = std::fs::read_to_string(source)
            .with_context(|| format!("load scene '{}'", source.display()))?;
        let duration_s =
            scenes::extract_duration(&text).unwrap_or(scenes::DEFAULT_DURATION_SECONDS);
        debug!(scene = %source.display(), duration_s, "synthetic scene loaded");

        let ticks_seen = Rc::new(Cell::new(0u64));
        Self::schedule_tick_loop(&clock, ticks_seen.clone());

        let beat = Rc::new(Cell::new(0u64));
        let beat2 = beat.clone();
        clock.register_timer(
            Box::new(move || {
                beat2.set(beat2.get() + 1);
                Ok(())
            }),
            1000.0,
            1000.0,
        );

        let anim_pos_ms = Rc::new(Cell::new(0.0));
        let anim_id = self.tracker.intercept_creation(
            Box::new(SyntheticAnimation {
                duration_ms: duration_s * 1000.0,
                pos_ms: anim_pos_ms.clone(),
                suspended: false,
            }),
            clock.now(),
        )?;

        self.scene = Some(SceneState {
            playing: Rc::new(Cell::new(false)),
            overlay_visible: true,
            ticks_seen,
            beat,
            anim_pos_ms,
            anim_id,
        });
        Ok(())
    }

    fn advance_frame(&mut self) -> ReclockResult<()> {
        let clock = self.clock()?.clone();
        clock.advance_frame();
        self.tracker.sync_to(clock.now());
        Ok(())
    }

    fn await_paint_settle(&mut self) -> ReclockResult<()> {
        // Painting is synchronous here; a real driver would wait for one real
        // rAF-backed paint.
        Ok(())
    }

    fn capture_frame(&mut self) -> ReclockResult<Vec<u8>> {
        let now = self.clock()?.now();
        let scene = self
            .scene
            .as_ref()
            .ok_or_else(|| ReclockError::driver("capture requested before a scene was loaded"))?;
        let rgb = self.paint_rgb(scene, now);
        self.encode(&rgb)
    }

    fn dispatch_key(&mut self, key: &str) -> ReclockResult<()> {
        let scene = self
            .scene
            .as_mut()
            .ok_or_else(|| ReclockError::driver("key dispatched before a scene was loaded"))?;
        match key {
            KEY_HIDE_OVERLAY => scene.overlay_visible = !scene.overlay_visible,
            KEY_START_PLAYBACK => {
                scene.playing.set(true);
                // The scene tries to resume its animation on play; the
                // interception layer must swallow this for tracked handles.
                if !self.tracker.suppress_play(scene.anim_id) {
                    return Err(ReclockError::driver(
                        "tracked animation escaped play interception",
                    ));
                }
            }
            other => trace!(key = other, "ignoring key with no scene binding"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_file(dir: &Path, name: &str, duration: f64) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(
            &path,
            format!("<script>initScene({{ duration: {duration} }});</script>"),
        )
        .unwrap();
        path
    }

    fn driver() -> SyntheticDriver {
        SyntheticDriver::new(SyntheticDriverOpts {
            resolution: Resolution {
                width: 16,
                height: 9,
            },
            format: FrameFormat::Png,
            jpeg_quality: 90,
        })
    }

    #[test]
    fn capture_is_a_pure_function_of_virtual_time() {
        let dir = std::env::temp_dir().join("reclock_synthetic_pure");
        std::fs::create_dir_all(&dir).unwrap();
        let scene = scene_file(&dir, "01-pure.html", 1.0);

        let run = || -> Vec<Vec<u8>> {
            let mut d = driver();
            d.install_clock(Fps::new(30, 1).unwrap()).unwrap();
            d.load_scene(&scene, Duration::from_secs(1)).unwrap();
            d.dispatch_key(KEY_HIDE_OVERLAY).unwrap();
            d.dispatch_key(KEY_START_PLAYBACK).unwrap();
            (0..5)
                .map(|_| {
                    d.advance_frame().unwrap();
                    // Wall-clock jitter between ticks must not show up in
                    // the captured bytes.
                    std::thread::sleep(Duration::from_millis(2));
                    d.capture_frame().unwrap()
                })
                .collect()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn frames_vary_over_virtual_time() {
        let dir = std::env::temp_dir().join("reclock_synthetic_vary");
        std::fs::create_dir_all(&dir).unwrap();
        let scene = scene_file(&dir, "01-vary.html", 1.0);

        let mut d = driver();
        d.install_clock(Fps::new(30, 1).unwrap()).unwrap();
        d.load_scene(&scene, Duration::from_secs(1)).unwrap();
        d.advance_frame().unwrap();
        let a = d.capture_frame().unwrap();
        d.advance_frame().unwrap();
        let b = d.capture_frame().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn capture_before_load_is_a_driver_error() {
        let mut d = driver();
        d.install_clock(Fps::new(30, 1).unwrap()).unwrap();
        assert!(d.capture_frame().is_err());
    }

    #[test]
    fn missing_scene_file_fails_load() {
        let mut d = driver();
        d.install_clock(Fps::new(30, 1).unwrap()).unwrap();
        let err = d.load_scene(
            Path::new("/nonexistent/99-gone.html"),
            Duration::from_secs(1),
        );
        assert!(err.is_err());
    }
}
