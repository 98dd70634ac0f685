use glam::{Mat4, Quat, Vec3};
use wgpu::*;

use super::gpu_init::GpuContext;
use crate::assets::CharacterFit;
use crate::model::{Camera, PlayerPose};
use crate::scene::{Scene, SceneUpload, PLACEHOLDER_COLOR, PLACEHOLDER_SIZE};
use crate::utils::{create_blob_disc, create_box, create_ground_plane, Mesh, MeshBuffer, Vertex};

/// Height of the blob shadow above the player's feet.
const BLOB_LIFT: f32 = 0.04;
const BLOB_CENTER_ALPHA: f32 = 0.3;
/// 0x808080 in linear RGB.
const GROUND_COLOR: [f32; 4] = [0.216, 0.216, 0.216, 1.0];

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_proj().to_cols_array_2d(),
            eye: camera.eye.extend(1.0).to_array(),
        }
    }
}

/// Light rig packed as vec4s; `w` carries a scalar where noted.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniform {
    pub sky: [f32; 4],
    pub ground: [f32; 4],
    pub ambient: [f32; 4],
    /// xyz: direction toward the sun, w: intensity
    pub sun_dir: [f32; 4],
    pub sun_color: [f32; 4],
    /// w: 1 when environment lighting is active
    pub env_sky: [f32; 4],
    pub env_ground: [f32; 4],
    /// x: exposure
    pub params: [f32; 4],
}

impl LightingUniform {
    pub fn from_scene(scene: &Scene, player: Vec3) -> Self {
        let l = &scene.lighting;
        let scaled = |c: Vec3, k: f32| (c * k).extend(1.0).to_array();
        let (env_sky, env_ground) = match l.active_environment() {
            Some(env) => (
                Vec3::from(env.sky).extend(1.0).to_array(),
                Vec3::from(env.ground).extend(1.0).to_array(),
            ),
            None => ([0.0; 4], [0.0; 4]),
        };
        Self {
            sky: scaled(l.sky_color, l.hemisphere_intensity),
            ground: scaled(l.ground_color, l.hemisphere_intensity),
            ambient: scaled(l.ambient_color, l.ambient_intensity),
            sun_dir: l.sun_direction(player).extend(l.sun_intensity).to_array(),
            sun_color: l.sun_color.extend(1.0).to_array(),
            env_sky,
            env_ground,
            params: [l.exposure, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformUniform {
    pub transform: [[f32; 4]; 4],
}

// Shared graphics setup used by native and web
pub struct CameraResources {
    pub camera_buffer: wgpu::Buffer,
    pub lighting_buffer: wgpu::Buffer,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub camera_bind_group: wgpu::BindGroup,
}

pub struct PipelineResources {
    pub pipeline: wgpu::RenderPipeline,
    /// Unlit, alpha blended, no depth writes.
    pub translucent_pipeline: wgpu::RenderPipeline,
}

pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
    (depth_texture, depth_view)
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

pub fn create_camera_resources(device: &wgpu::Device) -> CameraResources {
    let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("camera_buffer"),
        size: std::mem::size_of::<CameraUniform>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let lighting_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("lighting_buffer"),
        size: std::mem::size_of::<LightingUniform>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("camera_bind_group_layout"),
        entries: &[
            uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
            uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
        ],
    });

    let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("camera_bind_group"),
        layout: &bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: lighting_buffer.as_entire_binding() },
        ],
    });

    CameraResources { camera_buffer, lighting_buffer, bind_group_layout, camera_bind_group }
}

/// Layout of the per-draw model transform (group 1).
pub fn create_model_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("model_bind_group_layout"),
        entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
    })
}

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
    wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 12, shader_location: 1, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 24, shader_location: 2, format: wgpu::VertexFormat::Float32x4 },
];

pub fn create_mesh_pipelines(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    camera_layout: &wgpu::BindGroupLayout,
    model_layout: &wgpu::BindGroupLayout,
    depth_format: wgpu::TextureFormat,
) -> PipelineResources {
    let shader_src = include_str!("shaders/mesh.wgsl");
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("mesh_shader"),
        source: wgpu::ShaderSource::Wgsl(shader_src.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("pipeline_layout"),
        bind_group_layouts: &[camera_layout, model_layout],
        push_constant_ranges: &[],
    });

    let build = |label: &str, fragment_entry: &str, depth_write: bool| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // glTF winding is not reliable across exporters
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: depth_write,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
            multiview: None,
            cache: None,
        })
    };

    PipelineResources {
        pipeline: build("mesh_pipeline", "fs_main", true),
        translucent_pipeline: build("translucent_pipeline", "fs_unlit", false),
    }
}

///////////////////////////////////////////////////////////////////////////////

/// One uploaded mesh with its own transform uniform.
pub struct Drawable {
    pub mesh: MeshBuffer,
    pub transform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub visible: bool,
}

impl Drawable {
    pub fn new(device: &Device, layout: &BindGroupLayout, mesh: &Mesh, label: &str) -> Self {
        let transform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<TransformUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: transform_buffer.as_entire_binding() }],
        });
        Self { mesh: mesh.upload(device), transform_buffer, bind_group, visible: true }
    }

    pub fn set_transform(&self, queue: &Queue, transform: Mat4) {
        let uniform = TransformUniform { transform: transform.to_cols_array_2d() };
        queue.write_buffer(&self.transform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn draw(&self, rp: &mut RenderPass<'_>) {
        if !self.visible || self.mesh.index_count == 0 {
            return;
        }
        rp.set_bind_group(1, &self.bind_group, &[]);
        rp.set_vertex_buffer(0, self.mesh.vertex_buffer.slice(..));
        rp.set_index_buffer(self.mesh.index_buffer.slice(..), IndexFormat::Uint32);
        rp.draw_indexed(0..self.mesh.index_count, 0, 0..1);
    }
}

/// World transform of the character model for `player`.
pub fn character_transform(player: &PlayerPose, fit: &CharacterFit) -> Mat4 {
    Mat4::from_rotation_translation(Quat::from_rotation_y(player.yaw), player.position) * fit.transform()
}

pub fn blob_transform(player: &PlayerPose, scale: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        Vec3::new(scale, 1.0, scale),
        Quat::IDENTITY,
        player.position + Vec3::new(0.0, BLOB_LIFT, 0.0),
    )
}

/// Everything the mesh pass draws.
pub struct SceneDrawables {
    pub ground: Drawable,
    pub map: Option<Drawable>,
    pub character: Option<(Drawable, CharacterFit)>,
    pub placeholder: Drawable,
    pub blob: Drawable,
    model_layout: BindGroupLayout,
}

impl SceneDrawables {
    pub fn new(device: &Device, queue: &Queue, model_layout: BindGroupLayout, ground_size: f32) -> Self {
        let ground = Drawable::new(device, &model_layout, &create_ground_plane(ground_size, GROUND_COLOR), "ground");
        ground.set_transform(queue, Mat4::IDENTITY);
        let [w, h, d] = PLACEHOLDER_SIZE;
        let placeholder = Drawable::new(device, &model_layout, &create_box(w, h, d, PLACEHOLDER_COLOR), "placeholder");
        let blob = Drawable::new(device, &model_layout, &create_blob_disc(32, BLOB_CENTER_ALPHA), "blob_shadow");
        Self { ground, map: None, character: None, placeholder, blob, model_layout }
    }

    pub fn upload(&mut self, device: &Device, queue: &Queue, upload: SceneUpload) {
        match upload {
            SceneUpload::Map(mesh) => {
                let map = Drawable::new(device, &self.model_layout, &mesh, "map");
                map.set_transform(queue, Mat4::IDENTITY);
                self.map = Some(map);
                self.ground.visible = false;
            }
            SceneUpload::Character { mesh, fit } => {
                let character = Drawable::new(device, &self.model_layout, &mesh, "character");
                self.character = Some((character, fit));
                self.placeholder.visible = false;
            }
        }
    }

    /// Refresh per-frame transforms and visibility.
    pub fn update(&mut self, queue: &Queue, scene: &Scene, player: &PlayerPose) {
        match &self.character {
            Some((drawable, fit)) => drawable.set_transform(queue, character_transform(player, fit)),
            None => self.placeholder.set_transform(
                queue,
                Mat4::from_rotation_translation(Quat::from_rotation_y(player.yaw), player.position),
            ),
        }
        self.blob.visible = scene.blob_visible;
        self.blob.set_transform(queue, blob_transform(player, scene.blob_scale()));
    }

    pub fn model_layout(&self) -> &BindGroupLayout {
        &self.model_layout
    }

    fn draw_opaque(&self, rp: &mut RenderPass<'_>) {
        self.ground.draw(rp);
        if let Some(map) = &self.map {
            map.draw(rp);
        }
        match &self.character {
            Some((drawable, _)) => drawable.draw(rp),
            None => self.placeholder.draw(rp),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Consolidated render state to avoid parameter explosion
pub struct RenderState {
    // wgpu resources
    pub format: TextureFormat,
    pub alpha_mode: CompositeAlphaMode,
    pub width: u32,
    pub height: u32,
    pub depth_view: TextureView,

    // Pipelines
    pub pipelines: PipelineResources,

    // UI
    pub egui_renderer: egui_wgpu::Renderer,
    pub egui_primitives: Option<Vec<egui::ClippedPrimitive>>,
    pub egui_full_output: Option<egui::FullOutput>,
    pub egui_dpr: f32,
}

impl RenderState {
    pub fn new(gpu: &GpuContext, camera_layout: &BindGroupLayout, model_layout: &BindGroupLayout, dpr: f32) -> Self {
        let device = gpu.device.as_ref();
        let depth_format = TextureFormat::Depth32Float;
        let (_, depth_view) = create_depth_texture(device, gpu.config.width, gpu.config.height);
        let pipelines = create_mesh_pipelines(device, gpu.format, camera_layout, model_layout, depth_format);
        let egui_renderer = egui_wgpu::Renderer::new(device, gpu.format, egui_wgpu::RendererOptions::default());

        Self {
            format: gpu.format,
            alpha_mode: gpu.config.alpha_mode,
            width: gpu.config.width,
            height: gpu.config.height,
            depth_view,
            pipelines,
            egui_renderer,
            egui_primitives: None,
            egui_full_output: None,
            egui_dpr: dpr,
        }
    }

    fn surface_config(&self) -> SurfaceConfiguration {
        SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: self.format,
            width: self.width.max(1),
            height: self.height.max(1),
            present_mode: PresentMode::Fifo,
            alpha_mode: self.alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        }
    }

    /// Reconfigure the surface and depth buffer. Returns false if the size is unchanged.
    pub fn resize(&mut self, device: &Device, surface: &Surface, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width == self.width && height == self.height) {
            return false;
        }
        self.width = width;
        self.height = height;
        surface.configure(device, &self.surface_config());
        self.depth_view = create_depth_texture(device, width, height).1;
        tracing::debug!("Resized to {}x{}", width, height);
        true
    }

    pub fn draw_frame(
        &mut self,
        device: &Device,
        queue: &Queue,
        surface: &Surface,
        drawables: &SceneDrawables,
        cam_bg: &BindGroup,
    ) {
        let (egui_primitives, egui_full_output) = match (self.egui_primitives.take(), self.egui_full_output.take()) {
            (Some(prim), Some(output)) => (prim, output),
            _ => return, // No UI to render
        };

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.width, self.height],
            pixels_per_point: self.egui_dpr,
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                surface.configure(device, &self.surface_config());
                return;
            }
            Err(e) => {
                tracing::warn!("Skipping frame: {e:?}");
                return;
            }
        };

        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("encoder"),
        });

        {
            let mut rp = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("render_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rp.set_pipeline(&self.pipelines.pipeline);
            rp.set_bind_group(0, cam_bg, &[]);
            drawables.draw_opaque(&mut rp);

            rp.set_pipeline(&self.pipelines.translucent_pipeline);
            drawables.blob.draw(&mut rp);
        }

        // Upload egui textures
        for (id, image_delta) in &egui_full_output.textures_delta.set {
            self.egui_renderer.update_texture(device, queue, *id, image_delta);
        }

        // Update egui buffers
        self.egui_renderer
            .update_buffers(device, queue, &mut encoder, &egui_primitives, &screen_descriptor);

        // Render egui overlay
        {
            let egui_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("egui_render_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Load,
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.egui_renderer
                .render(&mut egui_pass.forget_lifetime(), &egui_primitives, &screen_descriptor);
        }

        // Free egui textures
        for id in &egui_full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{fit_character, EnvironmentLight};
    use crate::config::{AssetConfig, LightingConfig};
    use crate::utils::Bounds;

    fn scene() -> Scene {
        Scene::new(&LightingConfig::default(), &AssetConfig::default(), Vec::new(), 0.0)
    }

    #[test]
    fn uniform_sizes_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<CameraUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<LightingUniform>(), 128);
        assert_eq!(std::mem::size_of::<Vertex>(), 40);
    }

    #[test]
    fn lighting_uniform_carries_intensities() {
        let s = scene();
        let u = LightingUniform::from_scene(&s, Vec3::ZERO);
        assert!((u.sun_dir[3] - 1.25).abs() < 1e-6);
        let dir = Vec3::new(u.sun_dir[0], u.sun_dir[1], u.sun_dir[2]);
        assert!((dir - Vec3::new(4.5, 10.0, 6.5).normalize()).length() < 1e-5);
        assert!((u.ambient[0] - 0.08).abs() < 1e-6);
        assert!((u.params[0] - 1.12).abs() < 1e-6);
        assert_eq!(u.env_sky[3], 0.0);
    }

    #[test]
    fn environment_flag_follows_toggle() {
        let mut s = scene();
        s.lighting.environment = Some(EnvironmentLight { sky: [0.4; 3], ground: [0.1; 3] });
        s.lighting.environment_enabled = true;
        assert_eq!(LightingUniform::from_scene(&s, Vec3::ZERO).env_sky[3], 1.0);
        s.lighting.environment_enabled = false;
        assert_eq!(LightingUniform::from_scene(&s, Vec3::ZERO).env_sky, [0.0; 4]);
    }

    #[test]
    fn character_stands_on_player() {
        let bounds = Bounds { min: Vec3::new(-1.0, -2.0, -1.0), max: Vec3::new(1.0, 2.0, 1.0) };
        let fit = fit_character(&bounds, 1.8, 1.0);
        let player = PlayerPose::new(Vec3::new(3.0, 1.0, -2.0));
        let feet = character_transform(&player, &fit).transform_point3(Vec3::new(0.0, -2.0, 0.0));
        assert!((feet - player.position).length() < 1e-5, "feet at {:?}", feet);
    }

    #[test]
    fn blob_sits_just_above_feet() {
        let player = PlayerPose::new(Vec3::new(1.0, 2.0, 3.0));
        let center = blob_transform(&player, 0.9).transform_point3(Vec3::ZERO);
        assert!((center - Vec3::new(1.0, 2.04, 3.0)).length() < 1e-6);
        let rim = blob_transform(&player, 0.9).transform_point3(Vec3::new(0.5, 0.0, 0.0));
        assert!((rim.x - 1.45).abs() < 1e-6);
    }
}
