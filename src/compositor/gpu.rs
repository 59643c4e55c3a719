use std::sync::{Arc, Mutex, OnceLock, mpsc};

use anyhow::{Context, anyhow, ensure};
use bytemuck::{Pod, Zeroable, cast_slice};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::{Backend, ChannelRole, Compositor, MaskInputs, quantize};
use crate::error::{Error, Result};

const WORKGROUP_SIZE: u32 = 8;

const MASK_PACK_SHADER: &str = include_str!("shaders/mask_pack.comp.wgsl");

/// Runs the packing kernel as a wgpu compute dispatch.
///
/// The device is created lazily on first use and shared by later calls.
/// Any failure to obtain or drive the device is reported as
/// [`Error::ExecutionFailure`]; this backend never falls back to the CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuCompositor;

impl Compositor for GpuCompositor {
    fn backend(&self) -> Backend {
        Backend::Gpu
    }

    fn composite(&self, inputs: &MaskInputs<'_>) -> Result<RgbaImage> {
        let (width, height) = inputs.dimensions()?;
        let ctx = instance().map_err(|reason| Error::execution(Backend::Gpu, reason))?;
        let mut guard = ctx
            .lock()
            .map_err(|_| Error::execution(Backend::Gpu, "gpu context mutex poisoned"))?;
        let resolved = guard
            .run(width, height, inputs)
            .map_err(|err| Error::execution(Backend::Gpu, format!("{err:#}")))?;
        drop(guard);

        let bytes: Vec<u8> = resolved.iter().map(|&v| quantize(v)).collect();
        RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| Error::execution(Backend::Gpu, "readback size does not match mask map"))
    }
}

static CONTEXT: OnceLock<std::result::Result<Arc<Mutex<GpuMaskContext>>, String>> =
    OnceLock::new();

fn instance() -> std::result::Result<Arc<Mutex<GpuMaskContext>>, String> {
    match CONTEXT.get_or_init(|| {
        GpuMaskContext::new()
            .map(Mutex::new)
            .map(Arc::new)
            .map_err(|err| format!("failed to init gpu mask context: {err:#}"))
    }) {
        Ok(ctx) => Ok(Arc::clone(ctx)),
        Err(reason) => Err(reason.clone()),
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct MaskParams {
    width: u32,
    height: u32,
    present: u32,
    roughness: u32,
    fallback: [f32; 4],
}

struct GpuMaskContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuMaskContext {
    fn new() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("request wgpu adapter")?;
        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("mask-pack-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("request wgpu device")?;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mask-pack-compute"),
            source: wgpu::ShaderSource::Wgsl(MASK_PACK_SHADER.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mask-pack-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mask-pack-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("mask-pack-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        Ok(Self {
            device,
            queue,
            pipeline,
            layout,
        })
    }

    /// Returns resolved RGBA values, four floats per pixel in row-major order.
    fn run(&mut self, width: u32, height: u32, inputs: &MaskInputs<'_>) -> anyhow::Result<Vec<f32>> {
        let pixel_count = (width as u64) * (height as u64);
        let input_size = pixel_count * 3 * std::mem::size_of::<f32>() as u64;
        let output_size = pixel_count * 4 * std::mem::size_of::<f32>() as u64;

        let limits = self.device.limits();
        ensure!(
            output_size <= u64::from(limits.max_storage_buffer_binding_size)
                && output_size <= limits.max_buffer_size,
            "{width}x{height} mask map needs {output_size} bytes, device allows {}",
            limits.max_storage_buffer_binding_size
        );
        let groups_x = width.div_ceil(WORKGROUP_SIZE);
        let groups_y = height.div_ceil(WORKGROUP_SIZE);
        ensure!(
            groups_x <= limits.max_compute_workgroups_per_dimension
                && groups_y <= limits.max_compute_workgroups_per_dimension,
            "{width}x{height} exceeds the device dispatch limit"
        );

        let mut present = 0u32;
        let mut fallback = [0.0f32; 4];
        for role in ChannelRole::ALL {
            if inputs.channel(role).source.is_some() {
                present |= 1 << role.index();
            }
            fallback[role.index()] = inputs.fallback(role);
        }
        let params = MaskParams {
            width,
            height,
            present,
            roughness: u32::from(inputs.treat_as_roughness),
            fallback,
        };
        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mask-params"),
                contents: cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        // Absent channels bind a one-pixel placeholder the kernel never reads.
        let placeholder = [0.0f32; 3];
        let sources: Vec<wgpu::Buffer> = ChannelRole::ALL
            .iter()
            .map(|role| {
                let contents = match inputs.channel(*role).source {
                    Some(source) => {
                        debug_assert_eq!(source.as_raw().len() as u64 * 4, input_size);
                        source.as_raw()
                    }
                    None => &placeholder[..],
                };
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(role.as_str()),
                        contents: cast_slice(contents),
                        usage: wgpu::BufferUsages::STORAGE,
                    })
            })
            .collect();

        let result = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mask-result"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mask-readback"),
            size: output_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let bind = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mask-pack-bind"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sources[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: sources[1].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: sources[2].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: sources[3].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: result.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mask-pack-command"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("mask-pack-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&result, 0, &readback, 0, output_size);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("device poll failed: {err}"))?;
        receiver
            .recv()
            .context("receive map result")?
            .context("map buffer for read")?;
        let data = buffer_slice.get_mapped_range();
        let out: Vec<f32> = cast_slice::<u8, f32>(&data).to_vec();
        drop(data);
        readback.unmap();
        Ok(out)
    }
}
