//! wgpu backend implementation
//!
//! Draw calls are buffered into a pending render pass and encoded when the bound
//! targets change, a debug group opens or closes, or the frame ends. Each pass
//! packs the uniform blocks of its draws into one buffer, aligned to the device's
//! uniform offset alignment.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::backend::effect::*;
use crate::backend::traits::*;
use crate::backend::types::*;

/// A color attachment of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorTarget {
    BackBuffer,
    Texture(TextureHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PassTargets {
    colors: Vec<ColorTarget>,
    depth: Option<TextureHandle>,
}

/// Pipelines are specialized per render state and attachment formats
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    effect: EffectHandle,
    blend: BlendMode,
    depth: DepthMode,
    cull: CullMode,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
}

struct DrawCommand {
    pipeline: usize,
    effect: EffectHandle,
    uniform_offset: u64,
    sampler: SamplerMode,
    textures: Vec<Option<TextureHandle>>,
    vertex_buffer: BufferHandle,
    index_buffer: Option<(BufferHandle, IndexFormat)>,
    range: Range<u32>,
    base_vertex: i32,
}

/// Buffered render pass command
enum PassCommand {
    SetViewport(Viewport),
    Draw(DrawCommand),
}

/// Pending render pass with buffered commands
struct PendingPass {
    targets: PassTargets,
    color_clear: Option<[f32; 4]>,
    depth_clear: Option<f32>,
    commands: Vec<PassCommand>,
    uniforms: Vec<u8>,
}

impl PendingPass {
    fn new(targets: PassTargets) -> Self {
        Self {
            targets,
            color_clear: None,
            depth_clear: None,
            commands: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    fn has_work(&self) -> bool {
        self.color_clear.is_some()
            || self.depth_clear.is_some()
            || self.commands.iter().any(|c| matches!(c, PassCommand::Draw(_)))
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: TextureFormat,
    width: u32,
    height: u32,
}

struct GpuEffect {
    descriptor: EffectDescriptor,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    slots: Vec<ParameterSlot>,
    uniforms: Vec<u8>,
    textures: Vec<Option<TextureHandle>>,
}

/// Draw state set between draws
#[derive(Default)]
struct DrawState {
    render_state: Option<RenderState>,
    effect: Option<EffectHandle>,
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<(BufferHandle, IndexFormat)>,
    viewport: Option<Viewport>,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
    uniform_alignment: usize,
    samplers: [wgpu::Sampler; 3],

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, GpuTexture>,
    effects: HashMap<u64, GpuEffect>,
    pipelines: Vec<wgpu::RenderPipeline>,
    pipeline_cache: HashMap<PipelineKey, usize>,
    next_id: u64,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<PendingPass>,
    state: DrawState,
    debug_depth: u32,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        }
    }

    fn convert_texture_format_back(format: wgpu::TextureFormat) -> TextureFormat {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
            wgpu::TextureFormat::Rgba32Float => TextureFormat::Rgba32Float,
            _ => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }

    fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
        match factor {
            BlendFactor::Zero => wgpu::BlendFactor::Zero,
            BlendFactor::One => wgpu::BlendFactor::One,
            BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        }
    }

    fn convert_blend_operation(op: BlendOperation) -> wgpu::BlendOperation {
        match op {
            BlendOperation::Add => wgpu::BlendOperation::Add,
            BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
            BlendOperation::Min => wgpu::BlendOperation::Min,
            BlendOperation::Max => wgpu::BlendOperation::Max,
        }
    }

    fn convert_blend_component(component: BlendComponent) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: Self::convert_blend_factor(component.src_factor),
            dst_factor: Self::convert_blend_factor(component.dst_factor),
            operation: Self::convert_blend_operation(component.operation),
        }
    }

    fn convert_cull_mode(mode: CullMode) -> Option<wgpu::Face> {
        match mode {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }

    fn convert_surface_error(error: wgpu::SurfaceError) -> BackendError {
        match error {
            wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
            wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
            e => BackendError::AcquireImageFailed(e.to_string()),
        }
    }
}

impl WgpuBackend {
    /// Create the backend for a window, blocking on adapter and device requests
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| BackendError::SurfaceCreationFailed("Surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let max_size = device.limits().max_texture_dimension_2d;
        let (width, height) = clamp_to_limit(size.width, size.height, max_size);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sampler = |label: &str, filter: wgpu::FilterMode, address: wgpu::AddressMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: address,
                address_mode_v: address,
                address_mode_w: address,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let samplers = [
            sampler("point clamp", wgpu::FilterMode::Nearest, wgpu::AddressMode::ClampToEdge),
            sampler("linear clamp", wgpu::FilterMode::Linear, wgpu::AddressMode::ClampToEdge),
            sampler("linear wrap", wgpu::FilterMode::Linear, wgpu::AddressMode::Repeat),
        ];
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            uniform_alignment,
            samplers,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            effects: HashMap::new(),
            pipelines: Vec::new(),
            pipeline_cache: HashMap::new(),
            next_id: 1,
            encoder: None,
            pass: None,
            state: DrawState::default(),
            debug_depth: 0,
        })
    }

    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all()),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Deferred Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn sampler(&self, mode: SamplerMode) -> &wgpu::Sampler {
        match mode {
            SamplerMode::PointClamp => &self.samplers[0],
            SamplerMode::LinearClamp => &self.samplers[1],
            SamplerMode::LinearWrap => &self.samplers[2],
        }
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        })
    }

    /// Start a new pass on `targets`, encoding the current one
    fn begin_pass(&mut self, targets: PassTargets) {
        self.flush_pass();
        self.pass = Some(PendingPass::new(targets));
        self.state.viewport = None;
    }

    /// Encode the pending pass and reopen an empty one on the same targets
    fn flush_pass(&mut self) {
        let Some(pass) = self.pass.take() else {
            return;
        };

        let mut next = PendingPass::new(pass.targets.clone());
        if let Some(viewport) = self.state.viewport {
            next.commands.push(PassCommand::SetViewport(viewport));
        }
        self.pass = Some(next);

        if pass.has_work() {
            self.encode_pass(pass);
        }
    }

    fn color_format(&self, target: ColorTarget) -> Option<TextureFormat> {
        match target {
            ColorTarget::BackBuffer => Some(Self::convert_texture_format_back(self.surface_config.format)),
            ColorTarget::Texture(handle) => self.textures.get(&handle.0).map(|t| t.format),
        }
    }

    fn pipeline_index(&mut self, effect: EffectHandle, state: RenderState) -> Option<usize> {
        let targets = &self.pass.as_ref()?.targets;
        let color_formats = targets
            .colors
            .iter()
            .map(|t| self.color_format(*t))
            .collect::<Option<Vec<_>>>()?;
        let depth_format = match targets.depth {
            Some(handle) => Some(self.textures.get(&handle.0)?.format),
            None => None,
        };

        let key = PipelineKey {
            effect,
            blend: state.blend,
            depth: state.depth,
            cull: state.cull,
            color_formats,
            depth_format,
        };
        if let Some(&index) = self.pipeline_cache.get(&key) {
            return Some(index);
        }

        let pipeline = self.create_pipeline(&key)?;
        let index = self.pipelines.len();
        self.pipelines.push(pipeline);
        self.pipeline_cache.insert(key, index);
        Some(index)
    }

    fn create_pipeline(&self, key: &PipelineKey) -> Option<wgpu::RenderPipeline> {
        let effect = self.effects.get(&key.effect.0)?;
        let layout = &effect.descriptor.vertex_layout;
        log::debug!("Creating pipeline for '{}' ({:?})", effect.descriptor.label, key.blend);

        let attributes: Vec<wgpu::VertexAttribute> = layout
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: layout.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let blend = key.blend.blend_state().map(|b| wgpu::BlendState {
            color: Self::convert_blend_component(b.color),
            alpha: Self::convert_blend_component(b.alpha),
        });
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: Self::convert_texture_format(*format),
                    // 32-bit float targets are not blendable
                    blend: if format.is_filterable() { blend } else { None },
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format: Self::convert_texture_format(format),
            depth_write_enabled: key.depth.writes(),
            depth_compare: Self::convert_compare_function(key.depth.compare()),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        Some(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(effect.descriptor.label),
            layout: Some(&effect.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &effect.module,
                entry_point: "vs_main",
                buffers: &vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &effect.module,
                entry_point: "fs_main",
                targets: &color_targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Self::convert_cull_mode(key.cull),
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        }))
    }

    fn create_bind_group(&self, draw: &DrawCommand, uniforms: &wgpu::Buffer) -> Option<wgpu::BindGroup> {
        let effect = self.effects.get(&draw.effect.0)?;
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: uniforms,
                    offset: draw.uniform_offset,
                    size: NonZeroU64::new(effect.uniforms.len() as u64),
                }),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(self.sampler(draw.sampler)),
            },
        ];

        for (i, texture) in draw.textures.iter().enumerate() {
            let Some(gpu) = texture.and_then(|t| self.textures.get(&t.0)) else {
                log::warn!(
                    "Effect '{}' drawn with an unbound texture parameter",
                    effect.descriptor.label
                );
                return None;
            };
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_TEXTURE_BINDING + i as u32,
                resource: wgpu::BindingResource::TextureView(&gpu.view),
            });
        }

        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(effect.descriptor.label),
            layout: &effect.bind_group_layout,
            entries: &entries,
        }))
    }

    fn encode_pass(&mut self, pass: PendingPass) {
        let mut encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        };

        let back_buffer_view = self
            .current_texture
            .as_ref()
            .map(|t| t.texture.create_view(&wgpu::TextureViewDescriptor::default()));

        let contents: &[u8] = if pass.uniforms.is_empty() {
            &[0; 16]
        } else {
            &pass.uniforms
        };
        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pass uniforms"),
            contents,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_groups: Vec<Option<wgpu::BindGroup>> = pass
            .commands
            .iter()
            .map(|command| match command {
                PassCommand::Draw(draw) => self.create_bind_group(draw, &uniforms),
                PassCommand::SetViewport(_) => None,
            })
            .collect();

        let views: Option<Vec<&wgpu::TextureView>> = pass
            .targets
            .colors
            .iter()
            .map(|target| match target {
                ColorTarget::BackBuffer => back_buffer_view.as_ref(),
                ColorTarget::Texture(handle) => self.textures.get(&handle.0).map(|t| &t.view),
            })
            .collect();
        let Some(views) = views else {
            log::warn!("Render pass target unavailable, dropping {} commands", pass.commands.len());
            self.encoder = Some(encoder);
            return;
        };

        let color_load = match pass.color_clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let depth_attachment = pass
            .targets
            .depth
            .and_then(|handle| self.textures.get(&handle.0))
            .map(|texture| wgpu::RenderPassDepthStencilAttachment {
                view: &texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: match pass.depth_clear {
                        Some(depth) => wgpu::LoadOp::Clear(depth),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (command, bind_group) in pass.commands.iter().zip(&bind_groups) {
                match command {
                    PassCommand::SetViewport(v) => {
                        render_pass.set_viewport(v.x, v.y, v.width, v.height, 0.0, 1.0);
                    }
                    PassCommand::Draw(draw) => {
                        let (Some(pipeline), Some(bind_group), Some(vertices)) = (
                            self.pipelines.get(draw.pipeline),
                            bind_group.as_ref(),
                            self.buffers.get(&draw.vertex_buffer.0),
                        ) else {
                            continue;
                        };
                        render_pass.set_pipeline(pipeline);
                        render_pass.set_bind_group(0, bind_group, &[]);
                        render_pass.set_vertex_buffer(0, vertices.slice(..));
                        match draw.index_buffer {
                            Some((buffer, format)) => {
                                if let Some(indices) = self.buffers.get(&buffer.0) {
                                    render_pass.set_index_buffer(
                                        indices.slice(..),
                                        Self::convert_index_format(format),
                                    );
                                    render_pass.draw_indexed(draw.range.clone(), draw.base_vertex, 0..1);
                                }
                            }
                            None => render_pass.draw(draw.range.clone(), 0..1),
                        }
                    }
                }
            }
        }

        self.encoder = Some(encoder);
    }

    fn record_draw(&mut self, range: Range<u32>, indexed: bool, base_vertex: i32) {
        let (Some(effect), Some(vertex_buffer)) = (self.state.effect, self.state.vertex_buffer) else {
            log::warn!("Draw without an effect or vertex buffer");
            return;
        };
        let state = self.state.render_state.unwrap_or(RenderState::SCREEN_OPAQUE);
        let index_buffer = if indexed {
            match self.state.index_buffer {
                Some(index) => Some(index),
                None => {
                    log::warn!("Indexed draw without an index buffer");
                    return;
                }
            }
        } else {
            None
        };

        let Some(pipeline) = self.pipeline_index(effect, state) else {
            log::warn!("No pipeline for the current effect and targets");
            return;
        };
        let (Some(pass), Some(gpu_effect)) = (self.pass.as_mut(), self.effects.get(&effect.0)) else {
            return;
        };

        let uniform_offset = pass.uniforms.len() as u64;
        pass.uniforms.extend_from_slice(&gpu_effect.uniforms);
        let aligned = pass.uniforms.len().div_ceil(self.uniform_alignment) * self.uniform_alignment;
        pass.uniforms.resize(aligned, 0);

        pass.commands.push(PassCommand::Draw(DrawCommand {
            pipeline,
            effect,
            uniform_offset,
            sampler: state.sampler,
            textures: gpu_effect.textures.clone(),
            vertex_buffer,
            index_buffer,
            range,
            base_vertex,
        }));
    }
}

impl GraphicsBackend for WgpuBackend {
    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn surface_format(&self) -> TextureFormat {
        Self::convert_texture_format_back(self.surface_config.format)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let max_size = self.device.limits().max_texture_dimension_2d;
            let (width, height) = clamp_to_limit(width, height, max_size);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
            log::info!("Surface resized to {}x{}", width, height);
        }
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if self.current_texture.is_some() {
            return Ok(());
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                self.surface
                    .get_current_texture()
                    .map_err(Self::convert_surface_error)?
            }
            Err(e) => return Err(Self::convert_surface_error(e)),
        };

        self.current_texture = Some(output);
        self.encoder();
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.flush_pass();
        self.pass = None;
        while self.debug_depth > 0 {
            self.encoder().pop_debug_group();
            self.debug_depth -= 1;
        }

        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: invalid size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_id();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                format: desc.format,
                width: desc.width,
                height: desc.height,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        if let Some(gpu) = self.textures.get(&texture.0) {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &gpu.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(width * gpu.format.bytes_per_pixel()),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture.0).map(|t| (t.width, t.height))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        // Commands already buffered may still sample it
        self.flush_pass();
        self.textures.remove(&texture.0);
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        if data.is_empty() {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: no data",
                desc.label
            )));
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.next_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.flush_pass();
        self.buffers.remove(&buffer.0);
    }

    fn create_effect(&mut self, desc: &EffectDescriptor) -> BackendResult<EffectHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::EffectCreationFailed {
                label: desc.label.to_string(),
                reason: error.to_string(),
            });
        }

        let uniform_size = desc.uniform_size();
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(uniform_size),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for (slot, param) in desc.slots().iter().zip(&desc.parameters) {
            if let (ParameterSlot::Texture { binding }, ParameterKind::Texture { filterable }) =
                (slot, param.kind)
            {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: *binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
            }
        }

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let id = self.next_id();
        self.effects.insert(
            id,
            GpuEffect {
                descriptor: desc.clone(),
                module,
                bind_group_layout,
                pipeline_layout,
                slots: desc.slots(),
                uniforms: vec![0; uniform_size as usize],
                textures: vec![None; desc.texture_parameters().count()],
            },
        );
        Ok(EffectHandle(id))
    }

    fn effect_parameter(&self, effect: EffectHandle, name: &str) -> Option<ParameterHandle> {
        self.effects
            .get(&effect.0)?
            .descriptor
            .find(name)
            .map(|index| ParameterHandle { effect, index })
    }

    fn set_parameter(&mut self, parameter: ParameterHandle, value: ParameterValue<'_>) {
        let Some(effect) = self.effects.get_mut(&parameter.effect.0) else {
            return;
        };
        let (Some(slot), Some(desc)) = (
            effect.slots.get(parameter.index),
            effect.descriptor.parameters.get(parameter.index),
        ) else {
            return;
        };
        if !value.matches(desc.kind) {
            log::warn!(
                "Parameter {}.{} expects {:?}",
                effect.descriptor.label,
                desc.name,
                desc.kind
            );
            return;
        }

        match (*slot, value) {
            (ParameterSlot::Uniform { offset, size }, value) => {
                let range = offset as usize..(offset + size) as usize;
                value.write_uniform(&mut effect.uniforms[range]);
            }
            (ParameterSlot::Texture { binding }, ParameterValue::Texture(texture)) => {
                let index = (binding - FIRST_TEXTURE_BINDING) as usize;
                if let Some(entry) = effect.textures.get_mut(index) {
                    *entry = Some(texture);
                }
            }
            _ => {}
        }
    }

    fn set_render_targets(&mut self, colors: &[TextureHandle], depth: Option<TextureHandle>) {
        self.begin_pass(PassTargets {
            colors: colors.iter().map(|t| ColorTarget::Texture(*t)).collect(),
            depth,
        });
    }

    fn set_back_buffer(&mut self) {
        self.begin_pass(PassTargets {
            colors: vec![ColorTarget::BackBuffer],
            depth: None,
        });
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        if self
            .pass
            .as_ref()
            .is_some_and(|p| p.commands.iter().any(|c| matches!(c, PassCommand::Draw(_))))
        {
            self.flush_pass();
        }
        let Some(pass) = self.pass.as_mut() else {
            log::warn!("Clear without bound targets");
            return;
        };
        if color.is_some() {
            pass.color_clear = color;
        }
        if depth.is_some() && pass.targets.depth.is_some() {
            pass.depth_clear = depth;
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
        if let Some(pass) = self.pass.as_mut() {
            pass.commands.push(PassCommand::SetViewport(viewport));
        }
    }

    fn apply_render_state(&mut self, state: RenderState) {
        self.state.render_state = Some(state);
    }

    fn set_effect(&mut self, effect: EffectHandle) {
        self.state.effect = Some(effect);
    }

    fn set_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.state.vertex_buffer = Some(buffer);
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.state.index_buffer = Some((buffer, format));
    }

    fn draw(&mut self, vertices: Range<u32>) {
        self.record_draw(vertices, false, 0);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) {
        self.record_draw(indices, true, base_vertex);
    }

    fn push_debug_group(&mut self, label: &str) {
        self.flush_pass();
        self.encoder().push_debug_group(label);
        self.debug_depth += 1;
    }

    fn pop_debug_group(&mut self) {
        if self.debug_depth == 0 {
            return;
        }
        self.flush_pass();
        self.encoder().pop_debug_group();
        self.debug_depth -= 1;
    }
}

/// Scale down to fit `max_size` on both axes, keeping the aspect ratio
fn clamp_to_limit(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width > max_size || height > max_size {
        let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
        (
            ((width as f32 * scale) as u32).max(1),
            ((height as f32 * scale) as u32).max(1),
        )
    } else {
        (width.max(1), height.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_limit_keeps_aspect() {
        assert_eq!(clamp_to_limit(8192, 4096, 4096), (4096, 2048));
        assert_eq!(clamp_to_limit(1280, 720, 4096), (1280, 720));
        assert_eq!(clamp_to_limit(0, 0, 4096), (1, 1));
    }

    #[test]
    fn test_pass_without_draws_or_clears_is_empty() {
        let mut pass = PendingPass::new(PassTargets {
            colors: vec![ColorTarget::BackBuffer],
            depth: None,
        });
        pass.commands.push(PassCommand::SetViewport(Viewport::full(4, 4)));
        assert!(!pass.has_work());
        pass.color_clear = Some([0.0; 4]);
        assert!(pass.has_work());
    }
}
