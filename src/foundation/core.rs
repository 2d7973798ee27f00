use crate::foundation::error::{ReclockError, ReclockResult};

/// Absolute 0-based frame index in output timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReclockResult<Self> {
        if den == 0 {
            return Err(ReclockError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReclockError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in virtual milliseconds.
    pub fn frame_duration_ms(self) -> f64 {
        1000.0 * f64::from(self.den) / f64::from(self.num)
    }
}

/// Output resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Byte format of captured frames, as piped to the encoder (`image2pipe`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FrameFormat {
    /// Lossless capture, used for final-quality output.
    Png,
    /// JPEG capture, used for draft-quality output (faster capture and encode).
    Jpeg,
}

impl FrameFormat {
    /// The matching `image2pipe` input codec name.
    pub fn pipe_codec(self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "mjpeg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rejects_zero() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(60, 0).is_err());
    }

    #[test]
    fn frame_duration_is_1000_over_fps() {
        let fps = Fps::new(60, 1).unwrap();
        assert!((fps.frame_duration_ms() - 1000.0 / 60.0).abs() < 1e-9);

        let ntsc = Fps::new(30_000, 1_001).unwrap();
        assert!((ntsc.frame_duration_ms() - 1_001_000.0 / 30_000.0).abs() < 1e-9);
    }
}
