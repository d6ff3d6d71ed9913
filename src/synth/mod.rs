//! Energy curve → flat-colored frames.
//!
//! Every [`FRAME_STRIDE`]th energy value becomes one frame. A frame's
//! intensity is `trunc(255 * e / max)` and its color is
//! `[intensity, 255 - intensity, intensity]`, so quiet frames are green and
//! the loudest frame is magenta.
//!
//! The video runs at the configured frame rate regardless of how much audio
//! the curve covers: 30 fps over every 10th hop of 512 samples at 22.05 kHz
//! plays back roughly 7× faster than the source. This is kept as-is and the
//! two durations are reported side by side.

pub mod encoder;

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::energy::EnergyCurve;
pub use encoder::{EncodeError, FfmpegFrameEncoder};

/// One frame per this many energy values.
pub const FRAME_STRIDE: usize = 10;

#[derive(Error, Debug, PartialEq)]
pub enum SynthError {
    #[error("energy curve is empty")]
    EmptyCurve,
    #[error("energy curve is silent (maximum is {0}); cannot normalize by zero")]
    SilentCurve(f32),
    #[error("invalid video format {0}")]
    InvalidFormat(VideoFormat),
}

/// Geometry and timing of a synthesized video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            frame_rate: 30,
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}fps", self.width, self.height, self.frame_rate)
    }
}

impl VideoFormat {
    pub fn duration_secs(&self, frames: usize) -> f64 {
        frames as f64 / self.frame_rate as f64
    }

    /// Dimensions must be non-zero and even (yuv420p subsamples by two).
    fn validate(&self) -> Result<(), SynthError> {
        if self.width == 0 || self.height == 0 || self.frame_rate == 0 {
            return Err(SynthError::InvalidFormat(*self));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(SynthError::InvalidFormat(*self));
        }
        Ok(())
    }
}

/// A solid-color frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// RGB
    pub color: [u8; 3],
}

impl Frame {
    pub fn solid(format: &VideoFormat, color: [u8; 3]) -> Self {
        Self {
            width: format.width,
            height: format.height,
            color,
        }
    }

    /// Packed RGB24 pixels, row-major.
    pub fn to_rgb24(&self) -> Vec<u8> {
        let pixels = self.width as usize * self.height as usize;
        self.color.repeat(pixels)
    }
}

/// Scale `value` against `max` onto 0..=255, truncating.
pub fn intensity(value: f32, max: f32) -> u8 {
    (255.0 * value / max) as u8
}

pub fn frame_color(intensity: u8) -> [u8; 3] {
    [intensity, 255 - intensity, intensity]
}

/// Number of frames a curve of `curve_len` values produces.
pub fn frame_count(curve_len: usize) -> usize {
    curve_len.div_ceil(FRAME_STRIDE)
}

/// The video frame that shows energy value `index`, if that value is sampled.
pub fn sampled_frame(index: usize) -> Option<usize> {
    (index % FRAME_STRIDE == 0).then_some(index / FRAME_STRIDE)
}

/// Build the frame sequence for `curve`.
///
/// An empty curve or one whose maximum is zero is an error: there is nothing
/// to normalize against.
pub fn synthesize(curve: &EnergyCurve, format: &VideoFormat) -> Result<Vec<Frame>, SynthError> {
    format.validate()?;
    if curve.is_empty() {
        return Err(SynthError::EmptyCurve);
    }
    let max = curve.max();
    if !(max > 0.0 && max.is_finite()) {
        return Err(SynthError::SilentCurve(max));
    }

    let values = curve.values();
    let frames: Vec<Frame> = (0..values.len())
        .into_par_iter()
        .step_by(FRAME_STRIDE)
        .map(|i| Frame::solid(format, frame_color(intensity(values[i], max))))
        .collect();

    log::debug!(
        "Synthesized {} frames ({}) from {} energy values",
        frames.len(),
        format,
        values.len()
    );
    Ok(frames)
}

/// Writes frames to a video container.
pub trait FrameEncoder: Send + Sync {
    fn encode(
        &self,
        frames: &[Frame],
        format: &VideoFormat,
        output: &Path,
    ) -> Result<(), EncodeError>;
}
