//! `wgpu` implementation of the backend traits.
//!
//! Programs are compiled per filter layout: the filter's WGSL sources are
//! joined into one module, bindings are taken from the parsed module (group 0
//! only; texture globals matched to input ports by name, sampler globals
//! bound to one program-wide sampler derived from the output format), and one
//! render pipeline is built per geometry topology the filter draws. Filters
//! without a vertex entry point get a built-in full-screen triangle stage.
//!
//! Deferred device errors are captured with validation error scopes, popped
//! synchronously via `PollType::Wait`.

use log::debug;

use crate::error::GraphError;
use crate::format::{ChannelLayout, FilterMode, SampleDepth, TextureFormat, WrapMode};
use crate::geometry::{GeometryModel, Primitive};
use crate::gpu::{GpuBackend, GpuProgram, GpuTexture, RenderTarget};
use crate::layout::filter::{BlendFactor, DepthCompare, FilterLayout, RenderState};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    current: Option<NodeScope>,
}

struct NodeScope {
    encoder: wgpu::CommandEncoder,
    color_views: Vec<wgpu::TextureView>,
    depth_view: wgpu::TextureView,
    state: RenderState,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            current: None,
        }
    }

    /// Acquire any available adapter and wrap it. Convenience for hosts and
    /// examples that do not manage their own device.
    pub fn request() -> Result<Self, GraphError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| GraphError::Backend {
            message: format!("no adapter: {e}"),
        })?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("pipeforge"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: Default::default(),
        }))
        .map_err(|e| GraphError::Backend {
            message: format!("no device: {e}"),
        })?;
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

#[derive(Debug, Clone, Copy)]
enum BindingKind {
    /// Index into the filter's input port list.
    Texture(usize),
    Sampler,
}

pub struct WgpuProgram {
    name: String,
    bind_group_layout: wgpu::BindGroupLayout,
    bindings: Vec<(u32, BindingKind)>,
    sampler: wgpu::Sampler,
    triangles: Option<wgpu::RenderPipeline>,
    points: Option<wgpu::RenderPipeline>,
}

impl GpuProgram for WgpuProgram {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct WgpuTarget {
    views: Vec<wgpu::TextureView>,
    depth_view: wgpu::TextureView,
    format: TextureFormat,
}

impl RenderTarget for WgpuTarget {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn attachment_count(&self) -> usize {
        self.views.len()
    }
}

#[derive(Clone)]
pub struct WgpuTexture {
    view: wgpu::TextureView,
    format: TextureFormat,
}

impl WgpuTexture {
    /// Wrap a host-provided texture view as a pipeline input.
    pub fn new(view: wgpu::TextureView, format: TextureFormat) -> Self {
        Self { view, format }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl GpuTexture for WgpuTexture {
    fn format(&self) -> TextureFormat {
        self.format
    }
}

/// Closest wgpu color format; three-channel layouts are promoted to four,
/// there is no renderable RGB format.
pub fn color_format(format: &TextureFormat) -> wgpu::TextureFormat {
    use ChannelLayout::*;
    use SampleDepth::*;
    match (format.channels, format.depth) {
        (R, UnsignedByte) => wgpu::TextureFormat::R8Unorm,
        (Rg, UnsignedByte) => wgpu::TextureFormat::Rg8Unorm,
        (Rgb | Rgba, UnsignedByte) => wgpu::TextureFormat::Rgba8Unorm,
        (R, HalfFloat) => wgpu::TextureFormat::R16Float,
        (Rg, HalfFloat) => wgpu::TextureFormat::Rg16Float,
        (Rgb | Rgba, HalfFloat) => wgpu::TextureFormat::Rgba16Float,
        (R, Float) => wgpu::TextureFormat::R32Float,
        (Rg, Float) => wgpu::TextureFormat::Rg32Float,
        (Rgb | Rgba, Float) => wgpu::TextureFormat::Rgba32Float,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn compare_function(compare: DepthCompare) -> wgpu::CompareFunction {
    match compare {
        DepthCompare::Less => wgpu::CompareFunction::Less,
        DepthCompare::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthCompare::Equal => wgpu::CompareFunction::Equal,
        DepthCompare::Greater => wgpu::CompareFunction::Greater,
        DepthCompare::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        DepthCompare::Always => wgpu::CompareFunction::Always,
    }
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Mirror => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Stage used when the filter's own WGSL declares no vertex entry point.
const FULLSCREEN_VERTEX: &str = "
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}
";

fn backend_err(message: impl Into<String>) -> GraphError {
    GraphError::Backend {
        message: message.into(),
    }
}

struct ReflectedModule {
    bindings: Vec<(u32, BindingKind)>,
    vertex_entry: Option<String>,
    fragment_entry: String,
}

fn reflect_bindings(filter: &FilterLayout, text: &str) -> Result<ReflectedModule, GraphError> {
    let module = naga::front::wgsl::parse_str(text)
        .map_err(|e| backend_err(format!("filter {}: {}", filter.name, e.emit_to_string(text))))?;

    let mut bindings = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let kind = match module.types[var.ty].inner {
            naga::TypeInner::Image { .. } => {
                let name = var.name.as_deref().unwrap_or_default();
                let index = filter
                    .inputs
                    .iter()
                    .position(|p| p.name == name)
                    .ok_or_else(|| {
                        backend_err(format!("filter {}: unmapped texture {name}", filter.name))
                    })?;
                BindingKind::Texture(index)
            }
            naga::TypeInner::Sampler { .. } => BindingKind::Sampler,
            _ => continue,
        };
        let Some(resource) = &var.binding else {
            continue;
        };
        if resource.group != 0 {
            return Err(backend_err(format!(
                "filter {}: only bind group 0 is supported",
                filter.name
            )));
        }
        bindings.push((resource.binding, kind));
    }

    let mut vertex_entry = None;
    let mut fragment_entry = None;
    for ep in &module.entry_points {
        match ep.stage {
            naga::ShaderStage::Vertex => vertex_entry = Some(ep.name.clone()),
            naga::ShaderStage::Fragment => fragment_entry = Some(ep.name.clone()),
            _ => {}
        }
    }
    let fragment_entry = fragment_entry
        .ok_or_else(|| backend_err(format!("filter {}: no fragment entry point", filter.name)))?;

    Ok(ReflectedModule {
        bindings,
        vertex_entry,
        fragment_entry,
    })
}

impl WgpuBackend {
    fn build_pipeline(
        &self,
        filter: &FilterLayout,
        module: &wgpu::ShaderModule,
        vertex: (&wgpu::ShaderModule, &str),
        fragment_entry: &str,
        layout: &wgpu::PipelineLayout,
        topology: wgpu::PrimitiveTopology,
    ) -> wgpu::RenderPipeline {
        let blend = filter.render_state.blend.map(|(src, dst)| {
            let component = wgpu::BlendComponent {
                src_factor: blend_factor(src),
                dst_factor: blend_factor(dst),
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState {
                color: component,
                alpha: component,
            }
        });
        let target = wgpu::ColorTargetState {
            format: color_format(&filter.output_format),
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        };
        let targets = vec![Some(target); filter.attachment_count()];
        let depth_stencil = filter.render_state.depth_test.map(|compare| {
            wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: compare_function(compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }
        });

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&filter.name),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: vertex.0,
                    entry_point: Some(vertex.1),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(fragment_entry),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                multiview: None,
                cache: None,
            })
    }
}

impl GpuBackend for WgpuBackend {
    type Program = WgpuProgram;
    type Target = WgpuTarget;
    type Texture = WgpuTexture;

    fn create_program(&mut self, filter: &FilterLayout) -> Result<Self::Program, GraphError> {
        let text: String = filter
            .shaders
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let reflected = reflect_bindings(filter, &text)?;

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&filter.name),
                source: wgpu::ShaderSource::Wgsl(text.into()),
            });
        let fallback_vertex;
        let vertex: (&wgpu::ShaderModule, &str) = match &reflected.vertex_entry {
            Some(entry) => (&module, entry),
            None => {
                fallback_vertex = self
                    .device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some("fullscreen-vertex"),
                        source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX.into()),
                    });
                (&fallback_vertex, "vs_main")
            }
        };

        let filterable = filter.output_format.depth != SampleDepth::Float;
        let entries: Vec<wgpu::BindGroupLayoutEntry> = reflected
            .bindings
            .iter()
            .map(|(binding, kind)| wgpu::BindGroupLayoutEntry {
                binding: *binding,
                visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::VERTEX,
                ty: match kind {
                    BindingKind::Texture(_) => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    BindingKind::Sampler => wgpu::BindingType::Sampler(if filterable {
                        wgpu::SamplerBindingType::Filtering
                    } else {
                        wgpu::SamplerBindingType::NonFiltering
                    }),
                },
                count: None,
            })
            .collect();
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&filter.name),
                    entries: &entries,
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&filter.name),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&filter.name),
            address_mode_u: address_mode(filter.output_format.wrap),
            address_mode_v: address_mode(filter.output_format.wrap),
            mag_filter: filter_mode(filter.output_format.filter),
            min_filter: filter_mode(filter.output_format.filter),
            ..Default::default()
        });

        let mut triangles = None;
        let mut points = None;
        for geometry in &filter.geometries {
            match geometry.primitive {
                Primitive::Quad if triangles.is_none() => {
                    triangles = Some(self.build_pipeline(
                        filter,
                        &module,
                        vertex,
                        &reflected.fragment_entry,
                        &pipeline_layout,
                        wgpu::PrimitiveTopology::TriangleList,
                    ));
                }
                Primitive::Points { .. } if points.is_none() => {
                    points = Some(self.build_pipeline(
                        filter,
                        &module,
                        vertex,
                        &reflected.fragment_entry,
                        &pipeline_layout,
                        wgpu::PrimitiveTopology::PointList,
                    ));
                }
                _ => {}
            }
        }

        debug!("compiled program for filter {}", filter.name);
        Ok(WgpuProgram {
            name: filter.name.clone(),
            bind_group_layout,
            bindings: reflected.bindings,
            sampler,
            triangles,
            points,
        })
    }

    fn create_target(
        &mut self,
        format: &TextureFormat,
        attachments: usize,
    ) -> Result<Self::Target, GraphError> {
        let size = wgpu::Extent3d {
            width: format.width,
            height: format.height,
            depth_or_array_layers: 1,
        };
        let views = (0..attachments)
            .map(|i| {
                self.device
                    .create_texture(&wgpu::TextureDescriptor {
                        label: Some(&format!("target#{i}")),
                        size,
                        mip_level_count: format.mip_levels,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: color_format(format),
                        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                            | wgpu::TextureUsages::TEXTURE_BINDING,
                        view_formats: &[],
                    })
                    .create_view(&wgpu::TextureViewDescriptor::default())
            })
            .collect();
        let depth_view = self
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("target-depth"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget {
            views,
            depth_view,
            format: *format,
        })
    }

    fn release_target(&mut self, target: Self::Target) {
        // Dropping the views releases the underlying textures.
        drop(target);
    }

    fn target_texture(&self, target: &Self::Target, attachment: usize) -> Self::Texture {
        WgpuTexture {
            view: target.views[attachment].clone(),
            format: target.format,
        }
    }

    fn begin_capture(&mut self) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
    }

    fn end_capture(&mut self) -> Result<Option<String>, GraphError> {
        let scope = self.device.pop_error_scope();
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| backend_err(format!("poll failed: {e}")))?;
        Ok(pollster::block_on(scope).map(|e| e.to_string()))
    }

    fn begin_node(
        &mut self,
        _program: &Self::Program,
        target: &Self::Target,
        state: &RenderState,
    ) -> Result<(), GraphError> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        self.current = Some(NodeScope {
            encoder,
            color_views: target.views.clone(),
            depth_view: target.depth_view.clone(),
            state: *state,
        });
        Ok(())
    }

    fn draw(
        &mut self,
        program: &Self::Program,
        inputs: &[Self::Texture],
        geometries: &[GeometryModel],
    ) -> Result<(), GraphError> {
        let scope = self
            .current
            .as_mut()
            .ok_or_else(|| backend_err("draw outside begin_node/end_node"))?;

        let entries: Vec<wgpu::BindGroupEntry> = program
            .bindings
            .iter()
            .map(|(binding, kind)| {
                let resource = match kind {
                    BindingKind::Texture(index) => {
                        wgpu::BindingResource::TextureView(&inputs[*index].view)
                    }
                    BindingKind::Sampler => wgpu::BindingResource::Sampler(&program.sampler),
                };
                wgpu::BindGroupEntry {
                    binding: *binding,
                    resource,
                }
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.name),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let load = if scope.state.clear {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        } else {
            wgpu::LoadOp::Load
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = scope
            .color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_stencil_attachment =
            scope
                .state
                .depth_test
                .map(|_| wgpu::RenderPassDepthStencilAttachment {
                    view: &scope.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut pass = scope.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&program.name),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, &bind_group, &[]);
        for geometry in geometries {
            let pipeline = match geometry.primitive {
                Primitive::Quad => program.triangles.as_ref(),
                Primitive::Points { .. } => program.points.as_ref(),
            };
            let Some(pipeline) = pipeline else {
                return Err(backend_err(format!(
                    "program {} has no pipeline for its geometry",
                    program.name
                )));
            };
            pass.set_pipeline(pipeline);
            let vertices = u32::try_from(geometry.vertex_count()).map_err(|_| {
                backend_err(format!(
                    "program {} draws more vertices than the device can index",
                    program.name
                ))
            })?;
            pass.draw(0..vertices, 0..1);
        }
        Ok(())
    }

    fn end_node(&mut self) -> Result<(), GraphError> {
        let scope = self
            .current
            .take()
            .ok_or_else(|| backend_err("end_node outside begin_node"))?;
        self.queue.submit(std::iter::once(scope.encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| backend_err(format!("poll failed: {e}")))?;
        Ok(())
    }
}
