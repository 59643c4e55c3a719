use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::compositor::{Backend, ChannelRole, ParallelCompositor};

/// A channel that falls back to a scalar when no texture is assigned.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChannelConfig {
    /// Grayscale source texture.
    pub texture: Option<PathBuf>,
    /// Value written when `texture` is unset.
    pub value: f32,
}

impl ChannelConfig {
    const fn default_value() -> f32 {
        0.5
    }

    fn validate(&self, key: &str) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.value),
            "{key}.value must be within [0, 1], got {}",
            self.value
        );
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            texture: None,
            value: Self::default_value(),
        }
    }
}

/// The detail mask has no scalar fallback; it is black when unassigned.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DetailConfig {
    pub texture: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SmoothnessConfig {
    pub texture: Option<PathBuf>,
    pub value: f32,
    /// The texture stores roughness and is inverted while packing.
    pub roughness_map: bool,
}

impl SmoothnessConfig {
    /// Whether the roughness flag is set but has nothing to apply to.
    pub fn roughness_without_texture(&self) -> bool {
        self.roughness_map && self.texture.is_none()
    }
}

impl Default for SmoothnessConfig {
    fn default() -> Self {
        Self {
            texture: None,
            value: ChannelConfig::default_value(),
            roughness_map: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Red channel.
    pub metallic: ChannelConfig,
    /// Green channel.
    pub ambient_occlusion: ChannelConfig,
    /// Blue channel.
    pub detail_mask: DetailConfig,
    /// Alpha channel.
    pub smoothness: SmoothnessConfig,
    /// Execution strategy for the composite.
    pub backend: Backend,
    /// Retry on the parallel CPU backend when the selected backend fails.
    pub allow_cpu_fallback: bool,
    /// Tile edge length for the parallel backend, in pixels.
    pub tile_size: u32,
    /// Destination PNG.
    pub output: PathBuf,
    /// Replace `output` if it already exists.
    pub overwrite: bool,
}

impl Configuration {
    const fn default_tile_size() -> u32 {
        ParallelCompositor::DEFAULT_TILE_SIZE
    }

    fn default_output() -> PathBuf {
        PathBuf::from("mask_map.png")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.metallic.validate("metallic")?;
        self.ambient_occlusion.validate("ambient-occlusion")?;
        ensure!(
            (0.0..=1.0).contains(&self.smoothness.value),
            "smoothness.value must be within [0, 1], got {}",
            self.smoothness.value
        );
        ensure!(
            self.texture_paths().next().is_some(),
            "assign at least one input texture before generating the mask map"
        );
        ensure!(self.tile_size > 0, "tile-size must be greater than zero");
        ensure!(
            !self.output.as_os_str().is_empty(),
            "output path must not be empty"
        );
        ensure!(
            self.output
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png")),
            "output {} must have a .png extension",
            self.output.display()
        );
        Ok(self)
    }

    pub fn texture(&self, role: ChannelRole) -> Option<&Path> {
        match role {
            ChannelRole::Metallic => self.metallic.texture.as_deref(),
            ChannelRole::Occlusion => self.ambient_occlusion.texture.as_deref(),
            ChannelRole::Detail => self.detail_mask.texture.as_deref(),
            ChannelRole::Smoothness => self.smoothness.texture.as_deref(),
        }
    }

    /// Configured textures in channel order.
    pub fn texture_paths(&self) -> impl Iterator<Item = (ChannelRole, &Path)> + '_ {
        ChannelRole::ALL
            .into_iter()
            .filter_map(|role| self.texture(role).map(|path| (role, path)))
    }

    /// Clears every texture and restores the default values.
    pub fn reset(&mut self) {
        self.metallic = ChannelConfig::default();
        self.ambient_occlusion = ChannelConfig::default();
        self.detail_mask = DetailConfig::default();
        self.smoothness = SmoothnessConfig::default();
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            metallic: ChannelConfig::default(),
            ambient_occlusion: ChannelConfig::default(),
            detail_mask: DetailConfig::default(),
            smoothness: SmoothnessConfig::default(),
            backend: Backend::default(),
            allow_cpu_fallback: false,
            tile_size: Self::default_tile_size(),
            output: Self::default_output(),
            overwrite: false,
        }
    }
}
