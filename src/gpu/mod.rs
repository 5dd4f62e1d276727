//! wgpu backend: kernel dispatch and indirect draws on a window surface.

mod camera;
mod pipelines;
pub mod shaders;

use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

pub use camera::{Camera, CameraUniform};
use pipelines::{KernelPipelines, StagePipeline};

use crate::backend::{Backend, BufferKind, IndirectDraw, KernelBindings, Readback, ShadowCasting, StageBindings};
use crate::error::{GpuError, PipelineError};
use crate::mesh::{Assets, Stage};

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.05,
    a: 1.0,
};

struct StageResources {
    pipeline: StagePipeline,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

struct FrameTarget {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    cleared: bool,
}

pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    depth_texture: wgpu::TextureView,
    camera_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    pub camera: Camera,
    kernel: KernelPipelines,
    particles: Option<StageResources>,
    lines: Option<StageResources>,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<FrameTarget>,
    surface_error: Option<wgpu::SurfaceError>,
    culled_draws: u64,
}

impl WgpuBackend {
    /// Open a device on `window` with a camera framing `radius`.
    pub async fn new(window: Arc<Window>, radius: f32) -> Result<Self, PipelineError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window).map_err(GpuError::from)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::from)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoAdapter)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = create_depth_texture(&device, &config);

        let camera = Camera::for_radius(radius);
        let aspect = config.width as f32 / config.height as f32;
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::bytes_of(&camera.uniform(aspect)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_layout = pipelines::camera_layout(&device);
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let kernel = pipelines::kernel_pipelines(&device)?;

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_texture,
            camera_layout,
            camera_buffer,
            camera_bind_group,
            camera,
            kernel,
            particles: None,
            lines: None,
            encoder: None,
            frame: None,
            surface_error: None,
            culled_draws: 0,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = create_depth_texture(&self.device, &self.config);
        }
    }

    /// Reconfigure the surface at its current size, after it was lost.
    pub fn reconfigure_surface(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Re-frame the camera after the bounding sphere changed.
    pub fn frame_radius(&mut self, radius: f32) {
        self.camera = Camera::for_radius(radius);
    }

    /// Draws skipped because their bounds were outside the view.
    pub fn culled_draws(&self) -> u64 {
        self.culled_draws
    }

    fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    /// Acquire the swapchain image for this frame. Returns `false` if the
    /// surface failed; the error is reported by [`Backend::submit`].
    fn acquire_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        if self.surface_error.is_some() {
            return false;
        }
        match self.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                let uniform = self.camera.uniform(self.aspect());
                self.queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniform));
                self.frame = Some(FrameTarget {
                    output,
                    view,
                    cleared: false,
                });
                true
            }
            Err(e) => {
                self.surface_error = Some(e);
                false
            }
        }
    }

    fn upload_stage(&self, assets: &Assets, stage: Stage) -> Result<StageResources, PipelineError> {
        let pipeline = pipelines::stage_pipeline(
            &self.device,
            stage,
            assets.material(stage),
            &self.camera_layout,
            self.config.format,
        )?;

        // A missing mesh still needs bound buffers; its draw has index_count 0.
        let (positions, indices): (&[[f32; 3]], &[u32]) = match assets.mesh(stage) {
            Some(mesh) => (&mesh.positions, &mesh.indices),
            None => (&[[0.0; 3]], &[0]),
        };

        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(stage.label()),
            contents: bytemuck::cast_slice(positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(stage.label()),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(StageResources {
            pipeline,
            vertices,
            indices,
        })
    }
}

fn storage_binding(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

fn encoder<'a>(slot: &'a mut Option<wgpu::CommandEncoder>, device: &wgpu::Device) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        })
    })
}

/// Begin a pass on the frame image. The first pass of a frame clears it.
fn frame_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    frame: &mut FrameTarget,
    depth: &wgpu::TextureView,
    label: &str,
) -> wgpu::RenderPass<'e> {
    let (color_load, depth_load) = if frame.cleared {
        (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
    } else {
        (wgpu::LoadOp::Clear(CLEAR_COLOR), wgpu::LoadOp::Clear(1.0))
    };
    frame.cleared = true;

    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &frame.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

impl Backend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn prepare_stages(&mut self, assets: &Assets) -> Result<(), PipelineError> {
        self.particles = Some(self.upload_stage(assets, Stage::Particles)?);
        self.lines = Some(self.upload_stage(assets, Stage::Lines)?);
        Ok(())
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<wgpu::Buffer, PipelineError> {
        let size = contents.len() as u64;
        let limits = self.device.limits();
        let limit = limits.max_buffer_size.min(limits.max_storage_buffer_binding_size as u64);
        if size > limit {
            return Err(PipelineError::Allocation {
                kind,
                size,
                reason: format!("exceeds the device limit of {} bytes", limit),
            });
        }

        let mut usage =
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        if kind.is_indirect_args() {
            usage |= wgpu::BufferUsages::INDIRECT;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(kind.label()),
            contents,
            usage,
        });
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            buffer.destroy();
            return Err(PipelineError::Allocation {
                kind,
                size,
                reason: e.to_string(),
            });
        }
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: &wgpu::Buffer, data: &[u8]) {
        self.queue.write_buffer(buffer, 0, data);
    }

    fn destroy_buffer(&mut self, buffer: wgpu::Buffer) {
        buffer.destroy();
    }

    fn dispatch(&mut self, bindings: KernelBindings<'_, wgpu::Buffer>, workgroups: u32) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Bind Group"),
            layout: &self.kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bindings.parameters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: bindings.nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: bindings.lines.as_entire_binding(),
                },
            ],
        });

        let encoder = encoder(&mut self.encoder, &self.device);
        // Connect reads positions written by integrate; separate passes order them.
        for (label, pipeline) in [
            (shaders::INTEGRATE_ENTRY, &self.kernel.integrate),
            (shaders::CONNECT_ENTRY, &self.kernel.connect),
        ] {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
    }

    fn draw_indexed_indirect(&mut self, draw: IndirectDraw<'_, wgpu::Buffer>) {
        let stage = draw.bindings.stage();
        if !draw.bounds.visible_from(self.camera.view_proj(self.aspect())) {
            self.culled_draws += 1;
            log::trace!("Culled {} draw", stage.label());
            return;
        }
        if draw.shadows == ShadowCasting::On {
            log::trace!("No shadow pass; drawing {} unshadowed", stage.label());
        }
        if !self.acquire_frame() {
            return;
        }

        let resources = match stage {
            Stage::Particles => self.particles.as_ref(),
            Stage::Lines => self.lines.as_ref(),
        };
        let (Some(resources), Some(frame)) = (resources, self.frame.as_mut()) else {
            log::warn!("Skipping {} draw: stage is not prepared", stage.label());
            return;
        };

        let entries = match draw.bindings {
            StageBindings::Particles { nodes } => vec![storage_binding(0, nodes)],
            StageBindings::Lines {
                nodes,
                lines,
                parameters,
            } => vec![
                storage_binding(0, nodes),
                storage_binding(1, lines),
                storage_binding(2, parameters),
            ],
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(stage.label()),
            layout: &resources.pipeline.layout,
            entries: &entries,
        });

        let encoder = encoder(&mut self.encoder, &self.device);
        let mut pass = frame_pass(encoder, frame, &self.depth_texture, stage.label());
        pass.set_pipeline(&resources.pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_bind_group(1, &self.camera_bind_group, &[]);
        pass.set_vertex_buffer(0, resources.vertices.slice(..));
        pass.set_index_buffer(resources.indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed_indirect(draw.args, 0);
    }

    fn submit(&mut self) -> Result<(), PipelineError> {
        // A frame with no visible draws still clears the screen.
        if self.acquire_frame() {
            if let Some(frame) = self.frame.as_mut().filter(|f| !f.cleared) {
                let encoder = encoder(&mut self.encoder, &self.device);
                frame_pass(encoder, frame, &self.depth_texture, "Clear Pass");
            }
        }

        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(frame) = self.frame.take() {
            frame.output.present();
        }

        match self.surface_error.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl Readback for WgpuBackend {
    /// Copy `buffer` through a staging buffer. Reflects submitted work only.
    fn read_buffer(&mut self, buffer: &wgpu::Buffer) -> Result<Vec<u8>, GpuError> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = std::sync::mpsc::channel();
        let buffer_slice = staging.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let data = buffer_slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }
}

fn create_depth_texture(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
