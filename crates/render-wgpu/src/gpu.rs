use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use gallery_assets::{MaterialId, SceneGraph, TextureId, TextureSlot};
use gallery_render::{FrameView, LightingRig, RenderBackend, RenderError};
use glam::Mat4;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::overlay::{OverlayFrame, OverlayPainter};
use crate::shaders;
use crate::textures::{fit_within, mip_chain, sampler_descriptor};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const MAX_LIGHTS: usize = 2;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct LightUniform {
    direction: [f32; 4],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FrameUniforms {
    view_proj: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    ambient: [f32; 4],
    lights: [LightUniform; MAX_LIGHTS],
    shadow: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MaterialUniforms {
    base_color: [f32; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ObjectUniforms {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    flags: [f32; 4],
}

impl ObjectUniforms {
    fn new(world: Mat4, receive_shadow: bool) -> Self {
        Self {
            model: world.to_cols_array_2d(),
            normal: world.inverse().transpose().to_cols_array_2d(),
            flags: [if receive_shadow { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

/// Pack the per-frame uniform block. Only the first two directionals are lit.
fn frame_uniforms(frame: &FrameView<'_>, shadow_texel: f32) -> FrameUniforms {
    let rig: &LightingRig = frame.rig;
    let mut lights = [LightUniform::zeroed(); MAX_LIGHTS];
    for (slot, light) in lights.iter_mut().zip(&rig.directionals) {
        let d = light.direction();
        let c = light.color;
        slot.direction = [d.x, d.y, d.z, 1.0];
        slot.color = [
            c[0] * light.intensity,
            c[1] * light.intensity,
            c[2] * light.intensity,
            if light.shadow.is_some() { 1.0 } else { 0.0 },
        ];
    }
    let a = rig.ambient;
    let (light_view_proj, shadow) = match rig.shadow_caster() {
        Some(caster) => {
            let settings = caster.shadow.unwrap_or_default();
            (
                caster.shadow_view_projection().unwrap_or(Mat4::IDENTITY),
                [1.0, settings.bias, settings.normal_bias, shadow_texel],
            )
        }
        None => (Mat4::IDENTITY, [0.0; 4]),
    };
    FrameUniforms {
        view_proj: frame.view_projection().to_cols_array_2d(),
        light_view_proj: light_view_proj.to_cols_array_2d(),
        camera_pos: frame.eye.extend(1.0).to_array(),
        ambient: [
            a.color[0] * a.intensity,
            a.color[1] * a.intensity,
            a.color[2] * a.intensity,
            1.0,
        ],
        lights,
        shadow,
    }
}

/// Index into the lit pipeline table.
fn pipeline_index(transparent: bool, double_sided: bool) -> usize {
    (transparent as usize) * 2 + double_sided as usize
}

struct GpuMaterial {
    bind_group: wgpu::BindGroup,
    transparent: bool,
    double_sided: bool,
}

struct GpuPrimitive {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material: usize,
}

struct GpuNode {
    primitives: Vec<GpuPrimitive>,
    object_buffer: wgpu::Buffer,
    object_bind_group: wgpu::BindGroup,
    cast_shadow: bool,
    receive_shadow: bool,
}

struct ShadowTarget {
    size: u32,
    view: wgpu::TextureView,
    frame_bind_group: wgpu::BindGroup,
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
    frame_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    shadow_frame_bind_group: wgpu::BindGroup,
    shadow_sampler: wgpu::Sampler,
    lit_pipelines: Vec<wgpu::RenderPipeline>,
    shadow_pipeline: wgpu::RenderPipeline,
    shadow: ShadowTarget,
    white: wgpu::TextureView,
    materials: Vec<GpuMaterial>,
    nodes: HashMap<usize, GpuNode>,
    overlay: OverlayPainter,
}

/// Surface-backed renderer. Owns the device, queue and every uploaded resource.
pub struct WgpuBackend {
    gpu: Option<GpuState>,
    adapter_name: String,
}

impl WgpuBackend {
    /// Create the device and configure `target` at `width` x `height`.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::Backend("no compatible adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("gallery_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::Backend(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Backend("surface has no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let adapter_name = adapter.get_info().name;
        info!(
            adapter = %adapter_name,
            backend = adapter.get_info().backend.to_str(),
            ?format,
            "GPU initialized"
        );

        let gpu = GpuState::new(surface, device, queue, config);
        Ok(Self {
            gpu: Some(gpu),
            adapter_name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Queue an egui overlay for the next `draw`.
    pub fn queue_overlay(&mut self, frame: OverlayFrame) {
        if let Some(gpu) = &mut self.gpu {
            gpu.overlay.queue(&gpu.device, &gpu.queue, frame);
        }
    }

    pub fn is_released(&self) -> bool {
        self.gpu.is_none()
    }
}

impl RenderBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        gpu.config.width = width.max(1);
        gpu.config.height = height.max(1);
        gpu.surface.configure(&gpu.device, &gpu.config);
        gpu.depth = create_depth_view(&gpu.device, gpu.config.width, gpu.config.height, "depth_texture", false);
        debug!(width = gpu.config.width, height = gpu.config.height, "surface reconfigured");
    }

    fn upload_scene(&mut self, scene: &SceneGraph) -> Result<(), RenderError> {
        let gpu = self.gpu.as_mut().ok_or(RenderError::Released)?;
        gpu.upload_scene(scene);
        Ok(())
    }

    fn draw(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        let gpu = self.gpu.as_mut().ok_or(RenderError::Released)?;
        gpu.draw(frame)
    }

    fn release(&mut self) {
        if self.gpu.take().is_some() {
            info!("GPU resources released");
        }
    }
}

impl GpuState {
    fn new(
        surface: wgpu::Surface<'static>,
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });
        let shadow_frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_frame_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT)],
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_frame_bind_group"),
            layout: &shadow_frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let lit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lit_pipeline_layout"),
            bind_group_layouts: &[&frame_layout, &material_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MESH_SHADER.into()),
        });
        let mut lit_pipelines = Vec::with_capacity(4);
        for transparent in [false, true] {
            for double_sided in [false, true] {
                debug_assert_eq!(lit_pipelines.len(), pipeline_index(transparent, double_sided));
                lit_pipelines.push(create_lit_pipeline(
                    &device,
                    &lit_layout,
                    &mesh_shader,
                    config.format,
                    transparent,
                    double_sided,
                ));
            }
        }

        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow_pipeline_layout"),
            bind_group_layouts: &[&shadow_frame_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SHADOW_SHADER.into()),
        });
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow_pipeline"),
            layout: Some(&shadow_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_shadow"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                }],
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let shadow = create_shadow_target(&device, &frame_layout, &frame_buffer, &shadow_sampler, 1);
        let white = create_texture_view(
            &device,
            &queue,
            "white_texture",
            1,
            1,
            &[255; 4],
            false,
            device.limits().max_texture_dimension_2d,
        )
        .expect("1x1 white texture always fits the device limit");
        let depth = create_depth_view(&device, config.width, config.height, "depth_texture", false);
        let overlay = OverlayPainter::new(&device, config.format);

        Self {
            surface,
            device,
            queue,
            config,
            depth,
            frame_layout,
            material_layout,
            object_layout,
            frame_buffer,
            shadow_frame_bind_group,
            shadow_sampler,
            lit_pipelines,
            shadow_pipeline,
            shadow,
            white,
            materials: Vec::new(),
            nodes: HashMap::new(),
            overlay,
        }
    }

    fn upload_scene(&mut self, scene: &SceneGraph) {
        let mut texture_cache: HashMap<(TextureId, bool), Option<wgpu::TextureView>> =
            HashMap::new();
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        let mut materials = Vec::with_capacity(scene.materials.len().max(1));

        for material in &scene.materials {
            let binding = material.texture(TextureSlot::BaseColor);
            let image = binding.and_then(|b| scene.texture(b.texture).map(|img| (b, img)));
            let key = image.map(|(b, _)| (b.texture, b.sampling.mipmaps));
            if let (Some(key), Some((binding, image))) = (key, image) {
                texture_cache.entry(key).or_insert_with(|| {
                    create_texture_view(
                        &self.device,
                        &self.queue,
                        image.name.as_deref().unwrap_or("scene_texture"),
                        image.width,
                        image.height,
                        &image.rgba,
                        binding.sampling.mipmaps,
                        max_dimension,
                    )
                });
            }
            let view = key.and_then(|k| texture_cache.get(&k)).and_then(Option::as_ref);
            let has_texture = view.is_some();
            let (view, sampler) = match (view, image) {
                (Some(view), Some((binding, _))) => {
                    (view, self.device.create_sampler(&sampler_descriptor(&binding.sampling)))
                }
                _ => (
                    &self.white,
                    self.device.create_sampler(&wgpu::SamplerDescriptor {
                        label: Some("untextured_sampler"),
                        ..Default::default()
                    }),
                ),
            };
            let uniforms = MaterialUniforms {
                base_color: material.base_color,
                params: [
                    material.alpha_test.unwrap_or(-1.0),
                    if has_texture { 1.0 } else { 0.0 },
                    0.0,
                    0.0,
                ],
            };
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("material_uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(material.name.as_str()),
                layout: &self.material_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });
            materials.push(GpuMaterial {
                bind_group,
                transparent: material.transparent,
                double_sided: material.double_sided,
            });
        }

        let mut nodes = HashMap::new();
        for (index, mesh) in scene.mesh_nodes() {
            let mut primitives = Vec::with_capacity(mesh.primitives.len());
            for (i, primitive) in mesh.primitives.iter().enumerate() {
                let material = mesh
                    .material
                    .for_primitive(i)
                    .map(|MaterialId(m)| m)
                    .filter(|m| *m < materials.len());
                let Some(material) = material else {
                    warn!(node = index, primitive = i, "primitive without a material, skipped");
                    continue;
                };
                let vertices: Vec<Vertex> = primitive
                    .positions
                    .iter()
                    .zip(&primitive.normals)
                    .zip(&primitive.uvs)
                    .map(|((p, n), uv)| Vertex {
                        position: *p,
                        normal: *n,
                        uv: *uv,
                    })
                    .collect();
                if vertices.is_empty() || primitive.indices.is_empty() {
                    continue;
                }
                let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("mesh_vertex_buffer"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("mesh_index_buffer"),
                    contents: bytemuck::cast_slice(&primitive.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                primitives.push(GpuPrimitive {
                    vertex_buffer,
                    index_buffer,
                    index_count: primitive.indices.len() as u32,
                    material,
                });
            }

            let object_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("object_uniforms"),
                contents: bytemuck::bytes_of(&ObjectUniforms::new(
                    scene.world_matrix(index),
                    mesh.flags.receive_shadow,
                )),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let object_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object_bind_group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: object_buffer.as_entire_binding(),
                }],
            });
            nodes.insert(
                index,
                GpuNode {
                    primitives,
                    object_buffer,
                    object_bind_group,
                    cast_shadow: mesh.flags.cast_shadow,
                    receive_shadow: mesh.flags.receive_shadow,
                },
            );
        }

        info!(
            nodes = nodes.len(),
            materials = materials.len(),
            textures = texture_cache.len(),
            "scene resources uploaded"
        );
        self.materials = materials;
        self.nodes = nodes;
    }

    fn ensure_shadow_map(&mut self, size: u32) {
        if self.shadow.size == size {
            return;
        }
        self.shadow = create_shadow_target(
            &self.device,
            &self.frame_layout,
            &self.frame_buffer,
            &self.shadow_sampler,
            size,
        );
        debug!(size, "shadow map allocated");
    }

    fn draw(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        let shadow_size = frame
            .rig
            .shadow_caster()
            .and_then(|l| l.shadow)
            .map(|s| s.map_size.max(1))
            .unwrap_or(1);
        self.ensure_shadow_map(shadow_size);

        let output = self.surface.get_current_texture().map_err(surface_error)?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = frame_uniforms(frame, 1.0 / shadow_size as f32);
        self.queue.write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));
        for item in frame.draws {
            if let Some(node) = self.nodes.get(&item.node) {
                self.queue.write_buffer(
                    &node.object_buffer,
                    0,
                    bytemuck::bytes_of(&ObjectUniforms::new(item.world, node.receive_shadow)),
                );
            }
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        if uniforms.shadow[0] > 0.0 {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&self.shadow_pipeline);
            pass.set_bind_group(0, &self.shadow_frame_bind_group, &[]);
            // Casters outside the camera frustum still throw shadows into view.
            for node in self.nodes.values().filter(|n| n.cast_shadow) {
                pass.set_bind_group(1, &node.object_bind_group, &[]);
                for p in &node.primitives {
                    pass.set_vertex_buffer(0, p.vertex_buffer.slice(..));
                    pass.set_index_buffer(p.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..p.index_count, 0, 0..1);
                }
            }
        }

        {
            let [r, g, b] = frame.rig.background;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_bind_group(0, &self.shadow.frame_bind_group, &[]);

            // Opaque first, then blended.
            for blended in [false, true] {
                for item in frame.draws {
                    let Some(node) = self.nodes.get(&item.node) else {
                        continue;
                    };
                    pass.set_bind_group(2, &node.object_bind_group, &[]);
                    for p in &node.primitives {
                        let Some(material) = self.materials.get(p.material) else {
                            continue;
                        };
                        if material.transparent != blended {
                            continue;
                        }
                        pass.set_pipeline(
                            &self.lit_pipelines[pipeline_index(material.transparent, material.double_sided)],
                        );
                        pass.set_bind_group(1, &material.bind_group, &[]);
                        pass.set_vertex_buffer(0, p.vertex_buffer.slice(..));
                        pass.set_index_buffer(p.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..p.index_count, 0, 0..1);
                    }
                }
            }
        }

        let size = (self.config.width, self.config.height);
        let mut buffers = self
            .overlay
            .paint(&self.device, &self.queue, &mut encoder, &view, size);
        buffers.push(encoder.finish());
        self.queue.submit(buffers);
        self.overlay.after_submit();
        output.present();
        Ok(())
    }
}

fn surface_error(e: wgpu::SurfaceError) -> RenderError {
    match e {
        wgpu::SurfaceError::Lost => RenderError::SurfaceLost,
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Timeout => RenderError::SurfaceOutdated,
        wgpu::SurfaceError::OutOfMemory => RenderError::OutOfMemory,
        other => RenderError::Backend(other.to_string()),
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_lit_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    transparent: bool,
    double_sided: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("lit_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x3,
                    2 => Float32x2,
                ],
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(if transparent {
                    wgpu::BlendState::ALPHA_BLENDING
                } else {
                    wgpu::BlendState::REPLACE
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: if double_sided { None } else { Some(wgpu::Face::Back) },
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: !transparent,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

fn create_depth_view(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
    sampled: bool,
) -> wgpu::TextureView {
    let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
    if sampled {
        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn create_shadow_target(
    device: &wgpu::Device,
    frame_layout: &wgpu::BindGroupLayout,
    frame_buffer: &wgpu::Buffer,
    sampler: &wgpu::Sampler,
    size: u32,
) -> ShadowTarget {
    let view = create_depth_view(device, size, size, "shadow_map", true);
    let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frame_bind_group"),
        layout: frame_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    ShadowTarget {
        size,
        view,
        frame_bind_group,
    }
}

fn create_texture_view(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
    mipmaps: bool,
    max_dimension: u32,
) -> Option<wgpu::TextureView> {
    let Some(base) = fit_within(width, height, rgba, max_dimension) else {
        warn!(texture = label, width, height, "unusable texture data, slot left untextured");
        return None;
    };
    if (base.width, base.height) != (width, height) {
        warn!(
            texture = label,
            width,
            height,
            max_dimension,
            scaled_width = base.width,
            scaled_height = base.height,
            "texture exceeds device limit, downscaled"
        );
    }
    let (width, height) = (base.width, base.height);
    let levels = if mipmaps {
        mip_chain(width, height, &base.rgba)
    } else {
        vec![base]
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: levels.len().max(1) as u32,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (mip_level, level) in levels.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: mip_level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &level.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * level.width),
                rows_per_image: Some(level.height),
            },
            wgpu::Extent3d {
                width: level.width,
                height: level.height,
                depth_or_array_layers: 1,
            },
        );
    }
    Some(texture.create_view(&Default::default()))
}
