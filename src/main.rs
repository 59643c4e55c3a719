//! Binary entrypoint for the mask map generator.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use mask_map::Backend;
use mask_map::config::Configuration;

/// Pack metallic, occlusion, detail and smoothness maps into one RGBA mask map.
#[derive(Debug, Parser)]
#[command(name = "mask-map", version)]
struct Cli {
    /// Path to a YAML job file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Metallic texture (red channel)
    #[arg(long, value_name = "FILE")]
    metallic: Option<PathBuf>,

    /// Metallic value used without a texture
    #[arg(long, value_name = "0..1")]
    metallic_value: Option<f32>,

    /// Ambient occlusion texture (green channel)
    #[arg(long, visible_alias = "ao", value_name = "FILE")]
    occlusion: Option<PathBuf>,

    /// Ambient occlusion value used without a texture
    #[arg(long, visible_alias = "ao-value", value_name = "0..1")]
    occlusion_value: Option<f32>,

    /// Detail mask texture (blue channel)
    #[arg(long, value_name = "FILE")]
    detail: Option<PathBuf>,

    /// Smoothness texture (alpha channel)
    #[arg(long, value_name = "FILE")]
    smoothness: Option<PathBuf>,

    /// Smoothness value used without a texture
    #[arg(long, value_name = "0..1")]
    smoothness_value: Option<f32>,

    /// The smoothness texture is a roughness map
    #[arg(long, overrides_with = "no_roughness")]
    roughness: bool,

    /// The smoothness texture is not a roughness map
    #[arg(long, overrides_with = "roughness")]
    no_roughness: bool,

    /// Execution backend: sequential, parallel or gpu
    #[arg(long, value_name = "BACKEND")]
    backend: Option<Backend>,

    /// Retry on the CPU if the selected backend fails
    #[arg(long)]
    allow_cpu_fallback: bool,

    /// Tile edge length for the parallel backend
    #[arg(long, value_name = "PIXELS")]
    tile_size: Option<u32>,

    /// Output PNG path
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(short, long)]
    force: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(self, cfg: &mut Configuration) {
        if let Some(path) = self.metallic {
            cfg.metallic.texture = Some(path);
        }
        if let Some(value) = self.metallic_value {
            cfg.metallic.value = value;
        }
        if let Some(path) = self.occlusion {
            cfg.ambient_occlusion.texture = Some(path);
        }
        if let Some(value) = self.occlusion_value {
            cfg.ambient_occlusion.value = value;
        }
        if let Some(path) = self.detail {
            cfg.detail_mask.texture = Some(path);
        }
        if let Some(path) = self.smoothness {
            cfg.smoothness.texture = Some(path);
        }
        if let Some(value) = self.smoothness_value {
            cfg.smoothness.value = value;
        }
        if self.roughness {
            cfg.smoothness.roughness_map = true;
        } else if self.no_roughness {
            cfg.smoothness.roughness_map = false;
        }
        if let Some(backend) = self.backend {
            cfg.backend = backend;
        }
        if self.allow_cpu_fallback {
            cfg.allow_cpu_fallback = true;
        }
        if let Some(tile_size) = self.tile_size {
            cfg.tile_size = tile_size;
        }
        if let Some(output) = self.output {
            cfg.output = output;
        }
        if self.force {
            cfg.overwrite = true;
        }
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mask_map={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("naga=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    cli.apply(&mut cfg);
    let cfg = cfg.validated().context("validating configuration")?;

    let report = mask_map::generate::generate(&cfg)?;
    info!(
        "wrote {}x{} mask map to {} ({} backend)",
        report.width,
        report.height,
        report.output.display(),
        report.backend
    );
    Ok(())
}
