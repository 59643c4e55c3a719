use image::RgbaImage;
use rayon::prelude::*;

use super::{Backend, Compositor, MaskInputs};
use crate::error::{Error, Result};

/// A rectangle of output pixels processed as one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    /// Covers `width` x `height` with `tile_size` squares; edge tiles are clipped.
    pub fn grid(width: u32, height: u32, tile_size: u32) -> Vec<TileRect> {
        let tile_size = tile_size.max(1);
        let mut tiles = Vec::with_capacity(
            (width.div_ceil(tile_size) as usize) * (height.div_ceil(tile_size) as usize),
        );
        for y in (0..height).step_by(tile_size as usize) {
            for x in (0..width).step_by(tile_size as usize) {
                tiles.push(TileRect {
                    x,
                    y,
                    width: tile_size.min(width - x),
                    height: tile_size.min(height - y),
                });
            }
        }
        tiles
    }
}

/// Splits the mask into tiles and resolves them on the rayon thread pool.
#[derive(Debug, Clone, Copy)]
pub struct ParallelCompositor {
    pub tile_size: u32,
}

impl ParallelCompositor {
    pub const DEFAULT_TILE_SIZE: u32 = 8;

    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }
}

impl Default for ParallelCompositor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TILE_SIZE)
    }
}

impl Compositor for ParallelCompositor {
    fn backend(&self) -> Backend {
        Backend::Parallel
    }

    fn composite(&self, inputs: &MaskInputs<'_>) -> Result<RgbaImage> {
        let (width, height) = inputs.dimensions()?;
        if self.tile_size == 0 {
            return Err(Error::execution(Backend::Parallel, "tile size must be positive"));
        }

        let tiles = TileRect::grid(width, height, self.tile_size);

        // Each tile owns its buffer; no state is shared between tiles.
        let tile_buffers: Vec<Vec<u8>> = tiles
            .par_iter()
            .map(|tile| {
                let tile_width = tile.width as usize;
                let mut buffer = vec![0u8; tile_width * tile.height as usize * 4];
                for ty in 0..tile.height {
                    for tx in 0..tile.width {
                        let pixel = inputs.pixel(tile.x + tx, tile.y + ty);
                        let idx = (ty as usize * tile_width + tx as usize) * 4;
                        buffer[idx..idx + 4].copy_from_slice(&pixel.0);
                    }
                }
                buffer
            })
            .collect();

        let mut mask = RgbaImage::new(width, height);
        let stride = width as usize * 4;
        let raw: &mut [u8] = &mut mask;
        for (tile, buffer) in tiles.iter().zip(tile_buffers) {
            let row_len = tile.width as usize * 4;
            for ty in 0..tile.height {
                let dst = ((tile.y + ty) as usize) * stride + (tile.x as usize) * 4;
                let src = (ty as usize) * row_len;
                raw[dst..dst + row_len].copy_from_slice(&buffer[src..src + row_len]);
            }
        }
        Ok(mask)
    }
}
