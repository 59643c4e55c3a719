//! The "generate mask map" action: load, composite, save.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::{info, warn};

use crate::assets::{load_source, save_png};
use crate::compositor::{
    Backend, ChannelRole, ChannelSpec, Compositor, GpuCompositor, ImageSource, MaskInputs,
    ParallelCompositor, SequentialCompositor,
};
use crate::config::Configuration;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Backend that produced the saved image.
    pub backend: Backend,
}

/// Textures decoded for one generate call, keyed by channel.
#[derive(Debug, Default)]
pub struct LoadedSources {
    sources: HashMap<ChannelRole, ImageSource>,
}

impl LoadedSources {
    pub fn load(cfg: &Configuration) -> Result<Self> {
        let mut sources = HashMap::new();
        for (role, path) in cfg.texture_paths() {
            let source = load_source(path)
                .with_context(|| format!("failed to load {role} texture"))?;
            sources.insert(role, source);
        }
        Ok(Self { sources })
    }

    pub fn get(&self, role: ChannelRole) -> Option<&ImageSource> {
        self.sources.get(&role)
    }

    /// Pairs the decoded textures with the configured fallback values.
    pub fn inputs<'a>(&'a self, cfg: &Configuration) -> MaskInputs<'a> {
        MaskInputs {
            metallic: ChannelSpec {
                source: self.get(ChannelRole::Metallic),
                fallback: cfg.metallic.value,
            },
            occlusion: ChannelSpec {
                source: self.get(ChannelRole::Occlusion),
                fallback: cfg.ambient_occlusion.value,
            },
            detail: ChannelSpec::detail(self.get(ChannelRole::Detail)),
            smoothness: ChannelSpec {
                source: self.get(ChannelRole::Smoothness),
                fallback: cfg.smoothness.value,
            },
            treat_as_roughness: cfg.smoothness.roughness_map,
        }
    }
}

fn compositor_for(backend: Backend, tile_size: u32) -> Box<dyn Compositor> {
    match backend {
        Backend::Sequential => Box::new(SequentialCompositor),
        Backend::Parallel => Box::new(ParallelCompositor::new(tile_size)),
        Backend::Gpu => Box::new(GpuCompositor),
    }
}

/// Composites with the configured backend, retrying on the CPU only when the
/// configuration opts in.
pub fn composite_with_config(
    inputs: &MaskInputs<'_>,
    cfg: &Configuration,
) -> Result<(RgbaImage, Backend), Error> {
    composite_with(compositor_for(cfg.backend, cfg.tile_size).as_ref(), inputs, cfg)
}

/// Runs `primary`, retrying an execution failure on the parallel backend when
/// `cfg.allow_cpu_fallback` is set. Input errors are never retried.
pub fn composite_with(
    primary: &dyn Compositor,
    inputs: &MaskInputs<'_>,
    cfg: &Configuration,
) -> Result<(RgbaImage, Backend), Error> {
    match primary.composite(inputs) {
        Ok(mask) => Ok((mask, primary.backend())),
        Err(err)
            if err.is_execution_failure()
                && cfg.allow_cpu_fallback
                && primary.backend() != Backend::Parallel =>
        {
            warn!("{err}; retrying on the parallel cpu backend");
            let fallback = ParallelCompositor::new(cfg.tile_size);
            fallback
                .composite(inputs)
                .map(|mask| (mask, fallback.backend()))
        }
        Err(err) => Err(err),
    }
}

/// Loads the configured textures, packs them and writes the PNG.
pub fn generate(cfg: &Configuration) -> Result<GenerateReport> {
    if cfg.smoothness.roughness_without_texture() {
        warn!("smoothness.roughness-map is set without a smoothness texture; ignoring it");
    }

    let loaded = LoadedSources::load(cfg)?;
    let inputs = loaded.inputs(cfg);

    info!(backend = %cfg.backend, "generating mask map");
    let (mask, backend) =
        composite_with_config(&inputs, cfg).context("failed to generate mask map")?;

    save_png(&mask, &cfg.output, cfg.overwrite)?;
    info!(
        output = %cfg.output.display(),
        width = mask.width(),
        height = mask.height(),
        %backend,
        "saved mask map"
    );

    Ok(GenerateReport {
        output: cfg.output.clone(),
        width: mask.width(),
        height: mask.height(),
        backend,
    })
}
