//! WGPU backend for the renderer.
//!
//! [`Context`] owns the window surface, device and every GPU object the
//! [`Renderer`](crate::render::Renderer) asked for, and implements
//! [`GraphicsContext`] on top of them. Clears and draws are recorded during
//! the frame and encoded on `finish`: every clear that follows a draw starts
//! a new render pass, and all per draw uniforms go into one buffer bound
//! with dynamic offsets.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::data_structures::texture::{self, create_default_sampler, texture_pair_layout};
use crate::pipelines::basic::{
    MeshVertex, PipelineKey, mk_program_layout, mk_render_pipeline, topology,
};
use crate::render::{
    DrawCall, DrawUniforms, GraphicsContext, ProgramHandle, TextureHandle, VertexArrayHandle,
};
use crate::resources::mesh::VMeshData;
use crate::resources::shader::Shader;
use crate::resources::texture::Texture as TextureData;

const UNIFORM_SIZE: usize = std::mem::size_of::<DrawUniforms>();

#[derive(Debug)]
struct Program {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

/// Uploaded mesh. Indices are mirrored on the CPU so a rewrite of any
/// index range can be widened to the 4 byte copy alignment.
#[derive(Debug)]
struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    shadow: Vec<u16>,
    index_count: u32,
}

/// One buffer holding the uniforms of every draw in a frame.
#[derive(Debug)]
struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: usize,
    capacity: usize,
}

impl UniformArena {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment as usize;
        let stride = UNIFORM_SIZE.next_multiple_of(alignment.max(1));
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer"),
            size: (stride * capacity) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(UNIFORM_SIZE as u64),
                }),
            }],
            label: Some("draw_uniform_bind_group"),
        });

        Self {
            buffer,
            bind_group,
            stride,
            capacity,
        }
    }
}

#[derive(Debug)]
enum Command {
    Clear { color: Option<[f32; 4]>, depth: bool },
    Draw(DrawCall),
}

/// Render pass boundaries: what a pass clears and which draws it holds.
#[derive(Debug, Default)]
struct Pass {
    color: Option<[f32; 4]>,
    depth: bool,
    draws: Vec<usize>,
}

fn split_passes(commands: &[Command]) -> Vec<Pass> {
    let mut passes: Vec<Pass> = Vec::new();
    let mut draw = 0;
    for command in commands {
        match command {
            Command::Clear { color, depth } => match passes.last_mut() {
                Some(pass) if pass.draws.is_empty() => {
                    pass.color = color.or(pass.color);
                    pass.depth |= depth;
                }
                _ => passes.push(Pass {
                    color: *color,
                    depth: *depth,
                    draws: Vec::new(),
                }),
            },
            Command::Draw(_) => {
                if passes.is_empty() {
                    passes.push(Pass::default());
                }
                if let Some(pass) = passes.last_mut() {
                    pass.draws.push(draw);
                }
                draw += 1;
            }
        }
    }
    passes
}

#[derive(Debug)]
pub struct Context {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub(crate) depth_texture: texture::Texture,
    is_surface_configured: bool,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: UniformArena,
    sampler: wgpu::Sampler,
    fallback: texture::Texture,
    next_handle: u32,
    programs: HashMap<ProgramHandle, Program>,
    meshes: HashMap<VertexArrayHandle, GpuMesh>,
    textures: HashMap<TextureHandle, texture::Texture>,
    texture_groups: HashMap<(Option<TextureHandle>, Option<TextureHandle>), wgpu::BindGroup>,
    commands: Vec<Command>,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible graphics adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to open graphics device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            bail!("surface reports no formats");
        };
        // Textures are uploaded as sRGB, so the surface should be too.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(first_format);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_SIZE as u64),
                },
                count: None,
            }],
            label: Some("draw_uniform_bind_group_layout"),
        });
        let texture_layout = texture_pair_layout(&device);
        let pipeline_layout = mk_program_layout(&device, &uniform_layout, &texture_layout);
        let uniforms = UniformArena::new(&device, &uniform_layout, 64);

        let depth_texture = texture::Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "depth_texture",
        );
        let fallback =
            texture::Texture::create_solid(&device, &queue, [0xFF; 4], "fallback_texture");
        let sampler = create_default_sampler(&device);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_texture,
            is_surface_configured: false,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            uniforms,
            sampler,
            fallback,
            next_handle: 1,
            programs: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            texture_groups: HashMap::new(),
            commands: Vec::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.is_surface_configured = true;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = texture::Texture::create_depth_texture(
                &self.device,
                [self.config.width, self.config.height],
                "depth_texture",
            );
        }
    }

    pub fn is_surface_configured(&self) -> bool {
        self.is_surface_configured
    }

    fn next_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Builds the pipeline and texture bind group a draw needs. `None` when
    /// the draw cannot be made on this backend.
    fn prepare(&mut self, call: &DrawCall) -> Option<PipelineKey> {
        let key = PipelineKey {
            blend: call.blend,
            two_sided: call.two_sided,
            topology: topology(call.primitive)?,
        };

        let format = self.config.format;
        let program = self.programs.get_mut(&call.program)?;
        if !program.pipelines.contains_key(&key) {
            log::debug!("building pipeline {key:?} for {}", program.name);
            let pipeline = mk_render_pipeline(
                &self.device,
                &self.pipeline_layout,
                format,
                &program.vertex,
                &program.fragment,
                key,
            );
            program.pipelines.insert(key, pipeline);
        }

        let textures = (call.diffuse, call.secondary);
        if !self.texture_groups.contains_key(&textures) {
            let view = |handle: Option<TextureHandle>| match handle {
                Some(handle) => self.textures.get(&handle),
                None => Some(&self.fallback),
            };
            let primary = view(call.diffuse)?;
            let secondary = view(call.secondary)?;
            let sampler = |texture: &'_ texture::Texture| {
                texture.sampler.clone().unwrap_or_else(|| self.sampler.clone())
            };

            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&primary.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler(primary)),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&secondary.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&sampler(secondary)),
                    },
                ],
                label: Some("texture_pair_bind_group"),
            });
            self.texture_groups.insert(textures, group);
        }

        Some(key)
    }

    fn upload_uniforms(&mut self, draws: &[&DrawCall]) {
        if draws.len() > self.uniforms.capacity {
            let capacity = draws.len().next_power_of_two();
            log::debug!("growing draw uniform buffer to {capacity} draws");
            self.uniforms = UniformArena::new(&self.device, &self.uniform_layout, capacity);
        }

        let stride = self.uniforms.stride;
        let mut bytes = vec![0u8; draws.len() * stride];
        for (slot, call) in draws.iter().enumerate() {
            let at = slot * stride;
            bytes[at..at + UNIFORM_SIZE].copy_from_slice(bytemuck::bytes_of(&call.uniforms));
        }
        if !bytes.is_empty() {
            self.queue.write_buffer(&self.uniforms.buffer, 0, &bytes);
        }
    }

    /// Encodes and submits the recorded frame into `view`.
    pub fn render_to(&mut self, view: &wgpu::TextureView) {
        let commands = std::mem::take(&mut self.commands);
        let draws: Vec<&DrawCall> = commands
            .iter()
            .filter_map(|command| match command {
                Command::Draw(call) => Some(call),
                Command::Clear { .. } => None,
            })
            .collect();

        let keys: Vec<Option<PipelineKey>> = draws.iter().map(|call| self.prepare(call)).collect();
        self.upload_uniforms(&draws);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        for pass in split_passes(&commands) {
            let load = match pass.color {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: if pass.depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for slot in pass.draws {
                let (call, Some(key)) = (draws[slot], keys[slot]) else { continue };
                let Some(mesh) = self.meshes.get(&call.vertex_array) else { continue };
                let program = self.programs.get(&call.program);
                let Some(pipeline) = program.and_then(|p| p.pipelines.get(&key)) else {
                    continue;
                };
                let Some(textures) = self.texture_groups.get(&(call.diffuse, call.secondary)) else {
                    continue;
                };
                let end = call.index_start + call.index_count;
                if end > mesh.index_count {
                    continue;
                }

                render_pass.set_pipeline(pipeline);
                let offset = (slot * self.uniforms.stride) as u32;
                render_pass.set_bind_group(0, &self.uniforms.bind_group, &[offset]);
                render_pass.set_bind_group(1, textures, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                render_pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(call.index_start..end, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GraphicsContext for Context {
    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: bool) {
        self.commands.push(Command::Clear { color, depth });
    }

    fn create_program(&mut self, name: &str, shader: &Shader) -> anyhow::Result<ProgramHandle> {
        if !shader.vertex.contains("fn vs_main") || !shader.fragment.contains("fn fs_main") {
            bail!("shader {name} has no WGSL vs_main and fs_main entry points");
        }

        let module = |source: &str| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.to_string().into()),
            })
        };
        let vertex = module(&shader.vertex);
        let fragment = if shader.fragment == shader.vertex {
            vertex.clone()
        } else {
            module(&shader.fragment)
        };

        let handle = ProgramHandle(self.next_handle());
        self.programs.insert(
            handle,
            Program {
                name: name.to_string(),
                vertex,
                fragment,
                pipelines: HashMap::new(),
            },
        );
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
    }

    fn create_vertex_array(&mut self, mesh: &VMeshData) -> anyhow::Result<VertexArrayHandle> {
        let vertices = MeshVertex::from_mesh(mesh);
        if vertices.is_empty() || mesh.indices.is_empty() {
            bail!("mesh has no vertices or no indices");
        }

        let mut shadow = mesh.indices.clone();
        if shadow.len() % 2 == 1 {
            shadow.push(0);
        }

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&shadow),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        });

        let handle = VertexArrayHandle(self.next_handle());
        self.meshes.insert(
            handle,
            GpuMesh {
                vertices: vertex_buffer,
                indices: index_buffer,
                shadow,
                index_count: mesh.indices.len() as u32,
            },
        );
        Ok(handle)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.meshes.remove(&vertex_array);
    }

    fn rewrite_indices(&mut self, vertex_array: VertexArrayHandle, start: u32, indices: &[u16]) {
        let Some(mesh) = self.meshes.get_mut(&vertex_array) else { return };
        let start = start as usize;
        let end = (start + indices.len()).min(mesh.index_count as usize);
        if start >= end {
            return;
        }
        mesh.shadow[start..end].copy_from_slice(&indices[..end - start]);

        // Widen to whole pairs of indices so offset and size are 4 byte aligned.
        let first = start & !1;
        let last = (end + 1) & !1;
        self.queue.write_buffer(
            &mesh.indices,
            (first * 2) as wgpu::BufferAddress,
            bytemuck::cast_slice(&mesh.shadow[first..last]),
        );
    }

    fn create_texture(
        &mut self,
        texture: &TextureData,
        alpha: bool,
    ) -> anyhow::Result<TextureHandle> {
        let handle = TextureHandle(self.next_handle());
        let label = format!("texture {}", handle.0);
        let gpu =
            texture::Texture::from_resource(&self.device, &self.queue, texture, alpha, &label)?;
        self.textures.insert(handle, gpu);
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.texture_groups.retain(|(diffuse, secondary), _| {
            *diffuse != Some(texture) && *secondary != Some(texture)
        });
    }

    fn draw(&mut self, call: &DrawCall) {
        self.commands.push(Command::Draw(call.clone()));
    }

    fn finish(&mut self) {
        if !self.is_surface_configured {
            self.commands.clear();
            return;
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.commands.clear();
                let size = self.window.inner_size();
                self.resize(size.width, size.height);
                return;
            }
            Err(error) => {
                self.commands.clear();
                log::error!("Unable to render {error}");
                return;
            }
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.render_to(&view);
        output.present();
    }
}
