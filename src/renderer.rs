// renderer.rs — 核心渲染器：全景（全屏三角形反投影）/ 房间网格 / 热点公告板 + egui 叠加
//
// 渲染器只消费引擎产出的 RenderFrame；GPU 资源按 Arc 指针缓存，
// 帧里不再引用时立即释放。

use crate::engine::{Background, RenderFrame};
use crate::markers;
use crate::mesh::{PackedLight, RoomMesh, RoomVertex, MAX_LIGHTS};
use bytemuck::{Pod, Zeroable};
use image::{GenericImage, Rgba, RgbaImage};
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct PanoramaUniform {
    inv_view_proj: [[f32; 4]; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct RoomUniform {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
    fog: [f32; 4],
    misc: [f32; 4],
    lights: [PackedLight; MAX_LIGHTS],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct MarkerUniform {
    view_proj: [[f32; 4]; 4],
    right: [f32; 4],
    up: [f32; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct MarkerInstance {
    center_size: [f32; 4],
    uv_rect: [f32; 4],
    tint: [f32; 4],
    extra: [f32; 4],
}

impl MarkerInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 4] =
        wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x4, 2 => Float32x4, 3 => Float32x4];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MarkerInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

const ROOM_ATTRIBS: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3, 3 => Float32x3];

fn room_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<RoomVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ROOM_ATTRIBS,
    }
}

/// 上传到 GPU 的全景纹理，`source` 用来判断帧里是不是同一张图
struct PanoramaTexture {
    source: Arc<RgbaImage>,
    bind_group: wgpu::BindGroup,
    _texture: wgpu::Texture,
}

struct RoomBuffers {
    source: Arc<RoomMesh>,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

/// Equirect images the GPU can sample as-is: downscaled to the device limit
/// and padded to 2:1 when shorter.
pub fn fit_equirect(img: &RgbaImage, max_dimension: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();

    let img = if src_w > max_dimension || src_h > max_dimension {
        let scale = (max_dimension as f32 / src_w.max(src_h) as f32).min(1.0);
        let new_w = ((src_w as f32 * scale) as u32).max(1);
        let new_h = ((src_h as f32 * scale) as u32).max(1);
        log::warn!(
            "panorama {}x{} exceeds GPU limit {}, scaled to {}x{}",
            src_w,
            src_h,
            max_dimension,
            new_w,
            new_h
        );
        image::imageops::resize(img, new_w, new_h, image::imageops::FilterType::Lanczos3)
    } else {
        img.clone()
    };

    // 高度不足 2:1 时顶部补黑，原图贴在底部
    let (src_w, src_h) = img.dimensions();
    let target_h = src_w / 2;
    if target_h > 0 && src_h < target_h {
        let mut canvas = RgbaImage::from_pixel(src_w, target_h, Rgba([0, 0, 0, 255]));
        // y_offset 保证不越界
        let _ = canvas.copy_from(&img, 0, target_h - src_h);
        canvas
    } else {
        img
    }
}

pub struct Renderer {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,

    depth_view: wgpu::TextureView,
    sampler: wgpu::Sampler,

    panorama_pipeline: wgpu::RenderPipeline,
    panorama_layout: wgpu::BindGroupLayout,
    panorama_buffer: wgpu::Buffer,
    panorama_blank: wgpu::BindGroup,
    panorama: Option<PanoramaTexture>,
    /// 全景模式但没有纹理，画黑底
    panorama_missing: bool,

    room_pipeline: wgpu::RenderPipeline,
    room_bind_group: wgpu::BindGroup,
    room_buffer: wgpu::Buffer,
    room: Option<RoomBuffers>,

    marker_pipeline_overlay: wgpu::RenderPipeline,
    marker_pipeline_depth: wgpu::RenderPipeline,
    marker_bind_group: wgpu::BindGroup,
    marker_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    instance_count: u32,
    markers_depth_tested: bool,

    clear_color: wgpu::Color,

    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
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

fn texture_entries(first: u32) -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: first,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: first + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

fn upload_rgba(device: &wgpu::Device, queue: &wgpu::Queue, img: &RgbaImage, label: &str) -> wgpu::Texture {
    let (width, height) = img.dimensions();
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        label: Some(label),
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        img,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
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

struct PipelineDesc<'a> {
    label: &'a str,
    shader: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    blend: wgpu::BlendState,
    depth_compare: wgpu::CompareFunction,
    depth_write: bool,
}

fn create_pipeline(device: &wgpu::Device, format: wgpu::TextureFormat, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.shader,
            entry_point: "vs_main",
            buffers: desc.buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(desc.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // 房间从内部看，墙面双面绘制
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: desc.depth_write,
            depth_compare: desc.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window.as_ref()) }.unwrap();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .unwrap();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: if cfg!(target_arch = "wasm32") {
                        wgpu::Limits::downlevel_webgl2_defaults()
                    } else {
                        wgpu::Limits::default().using_resolution(adapter.limits())
                    },
                    label: None,
                },
                None,
            )
            .await
            .unwrap();

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, config.width, config.height);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            // 全景水平方向循环
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let atlas_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // --- 全景 ---
        let panorama_layout = {
            let [tex, smp] = texture_entries(1);
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("panorama_layout"),
                entries: &[uniform_entry(0, wgpu::ShaderStages::FRAGMENT), tex, smp],
            })
        };
        let panorama_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("panorama_uniform"),
            contents: bytemuck::bytes_of(&PanoramaUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let blank = upload_rgba(&device, &queue, &RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])), "blank");
        let blank_view = blank.create_view(&wgpu::TextureViewDescriptor::default());
        let panorama_blank = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("panorama_blank"),
            layout: &panorama_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: panorama_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&blank_view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&sampler) },
            ],
        });
        let panorama_shader = device.create_shader_module(wgpu::include_wgsl!("shaders/panorama.wgsl"));
        let panorama_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("panorama_pipeline_layout"),
            bind_group_layouts: &[&panorama_layout],
            push_constant_ranges: &[],
        });
        let panorama_pipeline = create_pipeline(
            &device,
            config.format,
            PipelineDesc {
                label: "panorama_pipeline",
                shader: &panorama_shader,
                layout: &panorama_pipeline_layout,
                buffers: &[],
                blend: wgpu::BlendState::REPLACE,
                depth_compare: wgpu::CompareFunction::Always,
                depth_write: false,
            },
        );

        // --- 房间 ---
        let room_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("room_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT)],
        });
        let room_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("room_uniform"),
            contents: bytemuck::bytes_of(&RoomUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let room_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("room_bind_group"),
            layout: &room_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: room_buffer.as_entire_binding() }],
        });
        let room_shader = device.create_shader_module(wgpu::include_wgsl!("shaders/room.wgsl"));
        let room_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("room_pipeline_layout"),
            bind_group_layouts: &[&room_layout],
            push_constant_ranges: &[],
        });
        let room_pipeline = create_pipeline(
            &device,
            config.format,
            PipelineDesc {
                label: "room_pipeline",
                shader: &room_shader,
                layout: &room_pipeline_layout,
                buffers: &[room_vertex_layout()],
                blend: wgpu::BlendState::REPLACE,
                depth_compare: wgpu::CompareFunction::Less,
                depth_write: true,
            },
        );

        // --- 热点标记 ---
        let marker_layout = {
            let [tex, smp] = texture_entries(1);
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("marker_layout"),
                entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT), tex, smp],
            })
        };
        let marker_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("marker_uniform"),
            contents: bytemuck::bytes_of(&MarkerUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let atlas = upload_rgba(&device, &queue, &markers::atlas(), "marker_atlas");
        let atlas_view = atlas.create_view(&wgpu::TextureViewDescriptor::default());
        let marker_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("marker_bind_group"),
            layout: &marker_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: marker_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&atlas_view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&atlas_sampler) },
            ],
        });
        let marker_shader = device.create_shader_module(wgpu::include_wgsl!("shaders/marker.wgsl"));
        let marker_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("marker_pipeline_layout"),
            bind_group_layouts: &[&marker_layout],
            push_constant_ranges: &[],
        });
        let marker_desc = |label: &'static str, compare: wgpu::CompareFunction| PipelineDesc {
            label,
            shader: &marker_shader,
            layout: &marker_pipeline_layout,
            buffers: &[],
            blend: wgpu::BlendState::ALPHA_BLENDING,
            depth_compare: compare,
            depth_write: false,
        };
        let instance_layouts = [MarkerInstance::layout()];
        let marker_pipeline_overlay = create_pipeline(
            &device,
            config.format,
            PipelineDesc {
                buffers: &instance_layouts,
                ..marker_desc("marker_overlay_pipeline", wgpu::CompareFunction::Always)
            },
        );
        let marker_pipeline_depth = create_pipeline(
            &device,
            config.format,
            PipelineDesc {
                buffers: &instance_layouts,
                ..marker_desc("marker_depth_pipeline", wgpu::CompareFunction::Less)
            },
        );
        let instance_capacity = 16;
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("marker_instances"),
            size: (instance_capacity * std::mem::size_of::<MarkerInstance>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // --- egui ---
        let egui_ctx = egui::Context::default();
        crate::fonts::install_egui_fonts(&egui_ctx);

        let mut egui_state = egui_winit::State::new(window.as_ref());
        // 高 DPI 显示器
        egui_state.set_pixels_per_point(window.scale_factor() as f32);

        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1);

        Self {
            surface,
            device,
            queue,
            config,
            size,
            depth_view,
            sampler,
            panorama_pipeline,
            panorama_layout,
            panorama_buffer,
            panorama_blank,
            panorama: None,
            panorama_missing: false,
            room_pipeline,
            room_bind_group,
            room_buffer,
            room: None,
            marker_pipeline_overlay,
            marker_pipeline_depth,
            marker_bind_group,
            marker_buffer,
            instance_buffer,
            instance_capacity,
            instance_count: 0,
            markers_depth_tested: false,
            clear_color: wgpu::Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 },
            egui_ctx,
            egui_state,
            egui_renderer,
        }
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, new_size.width, new_size.height);
        }
    }

    fn upload_panorama(&mut self, source: &Arc<RgbaImage>) {
        let max = self.device.limits().max_texture_dimension_2d;
        let img = fit_equirect(source, max);
        let texture = upload_rgba(&self.device, &self.queue, &img, "panorama_texture");
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("panorama_bind_group"),
            layout: &self.panorama_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.panorama_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&self.sampler) },
            ],
        });
        log::debug!("uploaded panorama texture {}x{}", img.width(), img.height());
        self.panorama = Some(PanoramaTexture {
            source: Arc::clone(source),
            bind_group,
            _texture: texture,
        });
    }

    fn upload_room(&mut self, source: &Arc<RoomMesh>) {
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("room_vertices"),
            contents: bytemuck::cast_slice(&source.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("room_indices"),
            contents: bytemuck::cast_slice(&source.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        log::debug!("uploaded room mesh: {} vertices, {} indices", source.vertices.len(), source.indices.len());
        self.room = Some(RoomBuffers {
            source: Arc::clone(source),
            vertices,
            indices,
            index_count: source.indices.len() as u32,
        });
    }

    /// Syncs GPU resources and uniforms with `frame`. `None` clears the scene.
    pub fn prepare(&mut self, frame: Option<&RenderFrame>) {
        let Some(frame) = frame else {
            self.panorama = None;
            self.panorama_missing = false;
            self.room = None;
            self.instance_count = 0;
            self.clear_color = wgpu::Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 };
            return;
        };
        let opacity = frame.opacity.clamp(0.0, 1.0);
        let view_proj = frame.camera.view_proj();

        match &frame.background {
            Background::Panorama(image) => {
                self.room = None;
                match image {
                    Some(img) => {
                        let same = self.panorama.as_ref().is_some_and(|p| Arc::ptr_eq(&p.source, img));
                        if !same {
                            self.upload_panorama(img);
                        }
                    }
                    None => self.panorama = None,
                }
                self.panorama_missing = image.is_none();
                let uniform = PanoramaUniform {
                    inv_view_proj: view_proj.inverse().to_cols_array_2d(),
                    params: [opacity, if image.is_some() { 1.0 } else { 0.0 }, 0.0, 0.0],
                };
                self.queue.write_buffer(&self.panorama_buffer, 0, bytemuck::bytes_of(&uniform));
                self.clear_color = wgpu::Color::BLACK;
            }
            Background::Room(mesh) => {
                self.panorama = None;
                self.panorama_missing = false;
                let same = self.room.as_ref().is_some_and(|r| Arc::ptr_eq(&r.source, mesh));
                if !same {
                    self.upload_room(mesh);
                }
                let mut lights = [PackedLight::zeroed(); MAX_LIGHTS];
                let count = mesh.lights.len().min(MAX_LIGHTS);
                lights[..count].copy_from_slice(&mesh.lights[..count]);
                let eye = frame.camera.eye;
                let uniform = RoomUniform {
                    view_proj: view_proj.to_cols_array_2d(),
                    eye: [eye.x, eye.y, eye.z, 1.0],
                    fog: [mesh.fog_color[0], mesh.fog_color[1], mesh.fog_color[2], mesh.fog_near],
                    misc: [mesh.fog_far, opacity, count as f32, 0.0],
                    lights,
                };
                self.queue.write_buffer(&self.room_buffer, 0, bytemuck::bytes_of(&uniform));
                let [r, g, b] = mesh.fog_color.map(|c| (c * opacity) as f64);
                self.clear_color = wgpu::Color { r, g, b, a: 1.0 };
            }
            Background::Empty => {
                self.panorama = None;
                self.panorama_missing = false;
                self.room = None;
                self.clear_color = wgpu::Color { r: 0.1, g: 0.1, b: 0.1, a: 1.0 };
            }
        }

        self.prepare_markers(frame, opacity);
    }

    fn prepare_markers(&mut self, frame: &RenderFrame, opacity: f32) {
        let instances: Vec<MarkerInstance> = frame
            .markers
            .iter()
            .map(|m| MarkerInstance {
                center_size: [m.position.x, m.position.y, m.position.z, m.size],
                uv_rect: m.glyph.atlas_uv(),
                tint: [m.tint[0], m.tint[1], m.tint[2], if m.hovered { 1.0 } else { 0.0 }],
                extra: [m.dwell, 0.0, 0.0, 0.0],
            })
            .collect();

        if instances.len() > self.instance_capacity {
            self.instance_capacity = instances.len().next_power_of_two();
            self.instance_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("marker_instances"),
                size: (self.instance_capacity * std::mem::size_of::<MarkerInstance>()) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        if !instances.is_empty() {
            self.queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&instances));
        }
        self.instance_count = instances.len() as u32;
        self.markers_depth_tested = frame.markers_depth_tested;

        let cam = &frame.camera;
        let uniform = MarkerUniform {
            view_proj: cam.view_proj().to_cols_array_2d(),
            right: [cam.right.x, cam.right.y, cam.right.z, 0.0],
            up: [cam.up.x, cam.up.y, cam.up.z, 0.0],
            params: [opacity, 0.0, 0.0, 0.0],
        };
        self.queue.write_buffer(&self.marker_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn render_with_ui(&mut self, window: &Window, run_ui: impl FnOnce(&egui::Context)) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        // 1. 场景
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: true,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: false,
                    }),
                    stencil_ops: None,
                }),
            });

            if let Some(pano) = &self.panorama {
                pass.set_pipeline(&self.panorama_pipeline);
                pass.set_bind_group(0, &pano.bind_group, &[]);
                pass.draw(0..3, 0..1);
            } else if self.panorama_missing {
                pass.set_pipeline(&self.panorama_pipeline);
                pass.set_bind_group(0, &self.panorama_blank, &[]);
                pass.draw(0..3, 0..1);
            }

            if let Some(room) = &self.room {
                pass.set_pipeline(&self.room_pipeline);
                pass.set_bind_group(0, &self.room_bind_group, &[]);
                pass.set_vertex_buffer(0, room.vertices.slice(..));
                pass.set_index_buffer(room.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..room.index_count, 0, 0..1);
            }

            if self.instance_count > 0 {
                let pipeline = if self.markers_depth_tested {
                    &self.marker_pipeline_depth
                } else {
                    &self.marker_pipeline_overlay
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.marker_bind_group, &[]);
                pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
                pass.draw(0..6, 0..self.instance_count);
            }
        }

        // 2. UI
        let raw_input = self.egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, run_ui);

        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, delta);
        }

        let user_cmds = self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer.render(&mut pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue
            .submit(user_cmds.into_iter().chain(std::iter::once(encoder.finish())));
        output.present();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_image_is_scaled_to_limit() {
        let img = RgbaImage::new(400, 200);
        let out = fit_equirect(&img, 100);
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[test]
    fn short_image_is_padded_at_top() {
        let img = RgbaImage::from_pixel(8, 2, Rgba([255, 255, 255, 255]));
        let out = fit_equirect(&img, 1024);
        assert_eq!(out.dimensions(), (8, 4));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 3), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn uniforms_are_std140_sized() {
        assert_eq!(std::mem::size_of::<RoomUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<RoomUniform>(), 64 + 16 * 3 + 64 * MAX_LIGHTS);
        assert_eq!(std::mem::size_of::<MarkerInstance>(), 64);
    }
}
