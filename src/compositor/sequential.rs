use image::RgbaImage;

use super::{Backend, Compositor, MaskInputs};
use crate::error::Result;

/// Single-threaded scalar pass, row by row.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialCompositor;

impl Compositor for SequentialCompositor {
    fn backend(&self) -> Backend {
        Backend::Sequential
    }

    fn composite(&self, inputs: &MaskInputs<'_>) -> Result<RgbaImage> {
        let (width, height) = inputs.dimensions()?;
        let mut mask = RgbaImage::new(width, height);
        for (x, y, pixel) in mask.enumerate_pixels_mut() {
            *pixel = inputs.pixel(x, y);
        }
        Ok(mask)
    }
}
