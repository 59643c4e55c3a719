//! Per-pixel scalar helpers shared by every compositing backend.

pub const LUMA_R: f32 = 0.299;
pub const LUMA_G: f32 = 0.587;
pub const LUMA_B: f32 = 0.114;

/// Perceptual grey value of a linear RGB sample.
#[inline]
pub fn luminance(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA_R + rgb[1] * LUMA_G + rgb[2] * LUMA_B
}

/// Converts roughness to smoothness and back.
#[inline]
pub fn invert(value: f32) -> f32 {
    1.0 - value
}

/// Maps a [0,1] channel value to an 8-bit channel, rounding to nearest.
#[inline]
pub fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
