//! wgpu render backend: owns the surface, device and every GPU resource handle.

use crate::{
    backend::{sort_draws, Capabilities, FrameScene, RenderBackend, RenderError, RenderInfo, Viewport},
    camera::CameraUniform,
    material::Material,
    mesh::{Geometry, Mesh, PointBuffer},
    pipeline::{
        create_frame_bind_group_layout, create_material_bind_group_layout, create_material_pipeline,
        create_object_bind_group_layout, LightsUniform, ObjectUniform, PipelineKey, OBJECT_UNIFORM_STRIDE,
    },
    texture::{Texture, TextureImage, TextureOptions},
};
use engine_core::{GeometryId, MaterialId, TextureId};
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

/// Draw slots allocated up front; the object buffer grows past this on demand.
const INITIAL_OBJECT_CAPACITY: u32 = 256;

enum GpuGeometry {
    Mesh { mesh: Mesh, triangles: u32 },
    Points(PointBuffer),
}

struct GpuMaterial {
    key: PipelineKey,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    transparent: bool,
}

/// Render backend drawing into a window surface.
pub struct WgpuBackend {
    surface: Option<wgpu::Surface<'static>>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    viewport: Viewport,
    capabilities: Capabilities,

    frame_bind_group_layout: wgpu::BindGroupLayout,
    object_bind_group_layout: wgpu::BindGroupLayout,
    material_bind_group_layout: wgpu::BindGroupLayout,

    camera_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,

    object_buffer: wgpu::Buffer,
    object_bind_group: wgpu::BindGroup,
    object_capacity: u32,

    depth_texture: Texture,
    /// Bound wherever a material channel has no texture.
    placeholder: Texture,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    geometries: HashMap<u32, GpuGeometry>,
    textures: HashMap<u32, Texture>,
    materials: HashMap<u32, GpuMaterial>,
    next_id: u32,
    info: RenderInfo,
    released: bool,
}

impl WgpuBackend {
    /// Create a backend for the given window. `panel_width` pixels on the left are left to the UI.
    pub async fn new(window: Arc<Window>, panel_width: u32, vsync: bool) -> Result<Self, RenderError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(RenderError::NoAdapter)?;

        // Prefer Mailbox (low-latency vsync) if available; otherwise AutoVsync.
        let present_mode = if vsync {
            surface_caps
                .present_modes
                .iter()
                .find(|m| matches!(m, wgpu::PresentMode::Mailbox))
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoVsync)
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let capabilities = Capabilities {
            max_anisotropy: 16,
            max_texture_size: device.limits().max_texture_dimension_2d,
        };

        let frame_bind_group_layout = create_frame_bind_group_layout(&device);
        let object_bind_group_layout = create_object_bind_group_layout(&device);
        let material_bind_group_layout = create_material_bind_group_layout(&device);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[CameraUniform::new()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let lights_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lights Buffer"),
            contents: bytemuck::cast_slice(&[LightsUniform::from_lights(&[])]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights_buffer.as_entire_binding(),
                },
            ],
        });

        let (object_buffer, object_bind_group) =
            Self::create_object_buffer(&device, &object_bind_group_layout, INITIAL_OBJECT_CAPACITY);

        let depth_texture = Texture::create_depth_texture(&device, config.width, config.height, "Depth Texture");
        let placeholder = Texture::solid(&device, &queue, [255, 255, 255, 255], "Placeholder Texture");

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            viewport: Viewport::with_panel(config.width, config.height, panel_width),
            config,
            capabilities,
            frame_bind_group_layout,
            object_bind_group_layout,
            material_bind_group_layout,
            camera_buffer,
            lights_buffer,
            frame_bind_group,
            object_buffer,
            object_bind_group,
            object_capacity: INITIAL_OBJECT_CAPACITY,
            depth_texture,
            placeholder,
            pipelines: HashMap::new(),
            geometries: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            next_id: 0,
            info: RenderInfo::default(),
            released: false,
        })
    }

    /// Blocking constructor for use from a winit event handler.
    pub fn new_blocking(window: Arc<Window>, panel_width: u32, vsync: bool) -> Result<Self, RenderError> {
        pollster::block_on(Self::new(window, panel_width, vsync))
    }

    fn create_object_buffer(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniform Buffer"),
            size: OBJECT_UNIFORM_STRIDE * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<ObjectUniform>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn ensure_object_capacity(&mut self, draws: u32) {
        if draws <= self.object_capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        log::debug!("WgpuBackend: growing object buffer to {} slots", capacity);
        let (buffer, bind_group) = Self::create_object_buffer(&self.device, &self.object_bind_group_layout, capacity);
        self.object_buffer.destroy();
        self.object_buffer = buffer;
        self.object_bind_group = bind_group;
        self.object_capacity = capacity;
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn refresh_memory(&mut self) {
        self.info.geometries = self.geometries.len() as u32;
        self.info.textures = self.textures.len() as u32;
        self.info.materials = self.materials.len() as u32;
    }

    fn texture_or_placeholder(&self, id: Option<TextureId>) -> Result<&Texture, RenderError> {
        match id {
            None => Ok(&self.placeholder),
            Some(id) => self.textures.get(&id.0).ok_or(RenderError::UnknownHandle {
                kind: "texture",
                id: id.0,
            }),
        }
    }

    fn acquire_frame(&self) -> Result<wgpu::SurfaceTexture, RenderError> {
        let surface = self.surface.as_ref().ok_or(RenderError::Released)?;
        match surface.get_current_texture() {
            Ok(texture) => Ok(texture),
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                surface.configure(&self.device, &self.config);
                surface.get_current_texture().map_err(|_| RenderError::SurfaceLost)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(RenderError::OutOfMemory),
            Err(other) => {
                log::warn!("Surface error: {other}; skipping frame");
                Err(RenderError::SurfaceLost)
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        if viewport.surface_width == 0 || viewport.surface_height == 0 {
            return;
        }
        self.config.width = viewport.surface_width;
        self.config.height = viewport.surface_height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
        self.depth_texture =
            Texture::create_depth_texture(&self.device, self.config.width, self.config.height, "Depth Texture");
    }

    fn create_geometry(&mut self, geometry: &Geometry, label: &str) -> Result<GeometryId, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let gpu = match geometry {
            Geometry::Mesh(mesh) if !mesh.indices.is_empty() => GpuGeometry::Mesh {
                mesh: mesh.upload(&self.device),
                triangles: mesh.triangle_count(),
            },
            Geometry::Points(cloud) if !cloud.is_empty() => GpuGeometry::Points(PointBuffer::new(&self.device, cloud)),
            _ => return Err(RenderError::EmptyGeometry(label.to_string())),
        };
        let id = self.allocate();
        self.geometries.insert(id, gpu);
        self.refresh_memory();
        Ok(GeometryId(id))
    }

    fn dispose_geometry(&mut self, id: GeometryId) -> bool {
        let Some(geometry) = self.geometries.remove(&id.0) else {
            return false;
        };
        match geometry {
            GpuGeometry::Mesh { mesh, .. } => {
                mesh.vertex_buffer.destroy();
                mesh.index_buffer.destroy();
            }
            GpuGeometry::Points(points) => points.instance_buffer.destroy(),
        }
        self.refresh_memory();
        true
    }

    fn create_texture(
        &mut self,
        image: &TextureImage,
        options: TextureOptions,
        label: &str,
    ) -> Result<TextureId, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let texture = Texture::from_image(
            &self.device,
            &self.queue,
            image,
            options,
            self.capabilities.max_anisotropy,
            label,
        );
        let id = self.allocate();
        self.textures.insert(id, texture);
        self.refresh_memory();
        Ok(TextureId(id))
    }

    fn dispose_texture(&mut self, id: TextureId) -> bool {
        let Some(texture) = self.textures.remove(&id.0) else {
            return false;
        };
        texture.texture.destroy();
        self.refresh_memory();
        true
    }

    fn create_material(&mut self, material: &Material, label: &str) -> Result<MaterialId, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let (map, bump, specular, emissive) = match material {
            Material::Phong(m) => (m.map, m.bump_map, m.specular_map, m.emissive_map),
            _ => (None, None, None, None),
        };
        let slots = [
            self.texture_or_placeholder(map)?,
            self.texture_or_placeholder(bump)?,
            self.texture_or_placeholder(specular)?,
            self.texture_or_placeholder(emissive)?,
        ];

        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[material.uniform()]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }];
        for (slot, texture) in slots.iter().enumerate() {
            let slot = slot as u32;
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + slot * 2,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + slot * 2,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.material_bind_group_layout,
            entries: &entries,
        });

        let key = PipelineKey::for_material(material);
        if !self.pipelines.contains_key(&key) {
            let pipeline = create_material_pipeline(
                &self.device,
                self.config.format,
                [
                    &self.frame_bind_group_layout,
                    &self.object_bind_group_layout,
                    &self.material_bind_group_layout,
                ],
                key,
            );
            self.pipelines.insert(key, pipeline);
        }

        let id = self.allocate();
        self.materials.insert(
            id,
            GpuMaterial {
                key,
                bind_group,
                uniform_buffer,
                transparent: material.is_transparent(),
            },
        );
        self.refresh_memory();
        Ok(MaterialId(id))
    }

    fn dispose_material(&mut self, id: MaterialId) -> bool {
        let Some(material) = self.materials.remove(&id.0) else {
            return false;
        };
        material.uniform_buffer.destroy();
        self.refresh_memory();
        true
    }

    fn render(&mut self, frame: &FrameScene) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }

        let mut draws: Vec<_> = frame
            .draws
            .iter()
            .filter(|d| self.geometries.contains_key(&d.geometry.0) && self.materials.contains_key(&d.material.0))
            .copied()
            .collect();
        sort_draws(&mut draws, frame.camera_position, |m| {
            self.materials.get(&m.0).map(|g| g.transparent).unwrap_or(false)
        });

        self.ensure_object_capacity(draws.len() as u32);
        let mut objects = vec![0u8; draws.len() * OBJECT_UNIFORM_STRIDE as usize];
        for (slot, draw) in draws.iter().enumerate() {
            let uniform = ObjectUniform::new(draw.model, draw.time);
            let start = slot * OBJECT_UNIFORM_STRIDE as usize;
            objects[start..start + std::mem::size_of::<ObjectUniform>()].copy_from_slice(bytemuck::bytes_of(&uniform));
        }
        if !objects.is_empty() {
            self.queue.write_buffer(&self.object_buffer, 0, &objects);
        }
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[frame.camera]));
        self.queue.write_buffer(
            &self.lights_buffer,
            0,
            bytemuck::cast_slice(&[LightsUniform::from_lights(&frame.lights)]),
        );

        let output = self.acquire_frame()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        let (mut triangles, mut points, mut draw_calls) = (0u32, 0u32, 0u32);
        {
            let [r, g, b, a] = frame.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let vp = self.viewport;
            let max_x = self.config.width;
            let max_y = self.config.height;
            let x = vp.x.min(max_x.saturating_sub(1));
            let y = vp.y.min(max_y.saturating_sub(1));
            let width = vp.width.min(max_x - x).max(1);
            let height = vp.height.min(max_y - y).max(1);
            pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
            pass.set_scissor_rect(x, y, width, height);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);

            for (slot, draw) in draws.iter().enumerate() {
                let (Some(geometry), Some(material)) =
                    (self.geometries.get(&draw.geometry.0), self.materials.get(&draw.material.0))
                else {
                    continue;
                };
                let Some(pipeline) = self.pipelines.get(&material.key) else {
                    continue;
                };
                let offset = (slot as u64 * OBJECT_UNIFORM_STRIDE) as u32;
                pass.set_pipeline(pipeline);
                pass.set_bind_group(1, &self.object_bind_group, &[offset]);
                pass.set_bind_group(2, &material.bind_group, &[]);
                match geometry {
                    GpuGeometry::Mesh { mesh, triangles: count } => {
                        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..mesh.num_indices, 0, 0..1);
                        triangles += count;
                    }
                    GpuGeometry::Points(buffer) => {
                        pass.set_vertex_buffer(0, buffer.instance_buffer.slice(..));
                        pass.draw(0..6, 0..buffer.num_points);
                        points += buffer.num_points;
                    }
                }
                draw_calls += 1;
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.info.triangles = triangles;
        self.info.points = points;
        self.info.lines = 0;
        self.info.draw_calls = draw_calls;
        self.info.frames += 1;
        Ok(())
    }

    fn info(&self) -> RenderInfo {
        self.info
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        for (_, geometry) in self.geometries.drain() {
            match geometry {
                GpuGeometry::Mesh { mesh, .. } => {
                    mesh.vertex_buffer.destroy();
                    mesh.index_buffer.destroy();
                }
                GpuGeometry::Points(points) => points.instance_buffer.destroy(),
            }
        }
        for (_, texture) in self.textures.drain() {
            texture.texture.destroy();
        }
        self.materials.clear();
        self.pipelines.clear();
        self.surface = None;
        self.released = true;
        self.refresh_memory();
        log::info!("WgpuBackend: surface detached and context released");
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
