//! Packs four grayscale material inputs into the channels of one RGBA mask map.
//!
//! Channel layout: R = metallic, G = ambient occlusion, B = detail mask,
//! A = smoothness. Each channel comes either from the luminance of a source
//! texture or from a scalar fallback. Every output pixel depends only on the
//! matching input pixels, so the sequential, tiled and GPU backends are
//! interchangeable.

mod gpu;
pub mod luminance;
mod parallel;
mod sequential;

use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, Rgb32FImage, Rgba, RgbaImage};
use serde::Deserialize;

use crate::error::{InvalidInput, Result};

pub use gpu::GpuCompositor;
pub use luminance::{invert, luminance, quantize};
pub use parallel::{ParallelCompositor, TileRect};
pub use sequential::SequentialCompositor;

/// Read-only RGB texture sampled as linear values in [0,1].
#[derive(Debug, Clone)]
pub struct ImageSource {
    pixels: Rgb32FImage,
}

impl ImageSource {
    pub fn new(pixels: Rgb32FImage) -> Self {
        Self { pixels }
    }

    /// Converts any decoded image; 8-bit channels map to `v / 255` without sRGB decoding.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(image.to_rgb32f())
    }

    pub fn from_rgba8(image: &RgbaImage) -> Self {
        Self::new(DynamicImage::ImageRgba8(image.clone()).to_rgb32f())
    }

    /// A uniform grey texture.
    pub fn solid(width: u32, height: u32, value: f32) -> Self {
        Self::new(Rgb32FImage::from_pixel(
            width,
            height,
            image::Rgb([value, value, value]),
        ))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    #[inline]
    pub fn sample(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels.get_pixel(x, y).0
    }

    pub(crate) fn as_raw(&self) -> &[f32] {
        self.pixels.as_raw()
    }
}

/// The four material properties, in output channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Metallic,
    Occlusion,
    Detail,
    Smoothness,
}

impl ChannelRole {
    pub const ALL: [Self; 4] = [
        Self::Metallic,
        Self::Occlusion,
        Self::Detail,
        Self::Smoothness,
    ];

    /// Index of the RGBA channel this role is written to.
    pub const fn index(self) -> usize {
        match self {
            Self::Metallic => 0,
            Self::Occlusion => 1,
            Self::Detail => 2,
            Self::Smoothness => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metallic => "metallic",
            Self::Occlusion => "occlusion",
            Self::Detail => "detail",
            Self::Smoothness => "smoothness",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source texture or scalar fallback for one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec<'a> {
    pub source: Option<&'a ImageSource>,
    pub fallback: f32,
}

impl<'a> ChannelSpec<'a> {
    pub const DEFAULT_FALLBACK: f32 = 0.5;

    pub fn value(fallback: f32) -> Self {
        Self {
            source: None,
            fallback,
        }
    }

    pub fn texture(source: &'a ImageSource) -> Self {
        Self {
            source: Some(source),
            fallback: Self::DEFAULT_FALLBACK,
        }
    }

    /// Detail channel: the fallback is always black.
    pub fn detail(source: Option<&'a ImageSource>) -> Self {
        Self {
            source,
            fallback: 0.0,
        }
    }

    pub fn with_fallback(mut self, fallback: f32) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Everything one composite call reads.
#[derive(Debug, Clone, Copy)]
pub struct MaskInputs<'a> {
    pub metallic: ChannelSpec<'a>,
    pub occlusion: ChannelSpec<'a>,
    pub detail: ChannelSpec<'a>,
    pub smoothness: ChannelSpec<'a>,
    /// Invert the smoothness source; has no effect on the smoothness fallback.
    pub treat_as_roughness: bool,
}

impl Default for MaskInputs<'_> {
    fn default() -> Self {
        Self {
            metallic: ChannelSpec::value(ChannelSpec::DEFAULT_FALLBACK),
            occlusion: ChannelSpec::value(ChannelSpec::DEFAULT_FALLBACK),
            detail: ChannelSpec::detail(None),
            smoothness: ChannelSpec::value(ChannelSpec::DEFAULT_FALLBACK),
            treat_as_roughness: false,
        }
    }
}

impl<'a> MaskInputs<'a> {
    pub fn channel(&self, role: ChannelRole) -> &ChannelSpec<'a> {
        match role {
            ChannelRole::Metallic => &self.metallic,
            ChannelRole::Occlusion => &self.occlusion,
            ChannelRole::Detail => &self.detail,
            ChannelRole::Smoothness => &self.smoothness,
        }
    }

    /// Fallback actually used when `role` has no source.
    pub fn fallback(&self, role: ChannelRole) -> f32 {
        match role {
            ChannelRole::Detail => 0.0,
            _ => self.channel(role).fallback,
        }
    }

    /// Output size, taken from the first present source in channel order.
    ///
    /// Rejects inputs that cannot produce a well-defined mask map; callers run
    /// this before allocating any output.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        for role in ChannelRole::ALL {
            if role != ChannelRole::Detail && !self.channel(role).fallback.is_finite() {
                return Err(InvalidInput::NonFiniteFallback { role }.into());
            }
        }

        let mut expected: Option<(u32, u32)> = None;
        for role in ChannelRole::ALL {
            let Some(source) = self.channel(role).source else {
                continue;
            };
            let found = source.dimensions();
            if found.0 == 0 || found.1 == 0 {
                return Err(InvalidInput::EmptySource { role }.into());
            }
            match expected {
                None => expected = Some(found),
                Some(expected) if expected != found => {
                    return Err(InvalidInput::DimensionMismatch {
                        role,
                        expected,
                        found,
                    }
                    .into());
                }
                Some(_) => {}
            }
        }
        expected.ok_or_else(|| InvalidInput::NoSources.into())
    }

    /// Resolved value of one channel at `(x, y)`, before clamping.
    #[inline]
    pub fn resolve_channel(&self, role: ChannelRole, x: u32, y: u32) -> f32 {
        match self.channel(role).source {
            Some(source) => {
                let grey = luminance(source.sample(x, y));
                if role == ChannelRole::Smoothness && self.treat_as_roughness {
                    invert(grey)
                } else {
                    grey
                }
            }
            None => self.fallback(role),
        }
    }

    /// All four channels at `(x, y)`, clamped to [0,1].
    #[inline]
    pub fn resolve(&self, x: u32, y: u32) -> [f32; 4] {
        let mut out = [0.0; 4];
        for role in ChannelRole::ALL {
            out[role.index()] = self.resolve_channel(role, x, y).clamp(0.0, 1.0);
        }
        out
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        Rgba(self.resolve(x, y).map(quantize))
    }
}

/// Execution strategy for a composite call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// One pixel at a time on the calling thread.
    #[serde(alias = "cpu")]
    Sequential,
    /// Independent tiles on the rayon thread pool.
    #[default]
    Parallel,
    /// wgpu compute kernel.
    Gpu,
}

impl Backend {
    pub const NAMES: &'static [&'static str] = &["sequential", "parallel", "gpu"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw {
            "sequential" | "cpu" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "gpu" => Ok(Self::Gpu),
            other => Err(format!(
                "unknown backend '{other}', expected one of: {}",
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// One way of turning [`MaskInputs`] into a packed mask map.
///
/// Implementations validate before allocating and never return a partially
/// written image.
pub trait Compositor {
    fn backend(&self) -> Backend;

    fn composite(&self, inputs: &MaskInputs<'_>) -> Result<RgbaImage>;
}

/// Composites with the default configuration of `backend`.
pub fn composite(inputs: &MaskInputs<'_>, backend: Backend) -> Result<RgbaImage> {
    match backend {
        Backend::Sequential => SequentialCompositor.composite(inputs),
        Backend::Parallel => ParallelCompositor::default().composite(inputs),
        Backend::Gpu => GpuCompositor.composite(inputs),
    }
}
