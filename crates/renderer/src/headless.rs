//! Render backend without a GPU. Tracks every resource and frame so tests and
//! tooling can observe what a scene would have drawn.

use crate::backend::{sort_draws, Capabilities, FrameScene, RenderBackend, RenderError, RenderInfo, Viewport};
use crate::material::Material;
use crate::mesh::Geometry;
use crate::texture::{TextureImage, TextureOptions};
use engine_core::{GeometryId, MaterialId, TextureId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Geometry,
    Texture,
    Material,
}

#[derive(Debug, Clone)]
struct GeometryRecord {
    label: String,
    triangles: u32,
    points: u32,
}

#[derive(Debug, Clone)]
struct TextureRecord {
    label: String,
    options: TextureOptions,
    srgb: bool,
}

#[derive(Debug, Clone)]
struct MaterialRecord {
    label: String,
    material: Material,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u32,
    geometries: HashMap<u32, GeometryRecord>,
    textures: HashMap<u32, TextureRecord>,
    materials: HashMap<u32, MaterialRecord>,
    disposed: Vec<(ResourceKind, String)>,
    last_frame: Option<FrameScene>,
    info: RenderInfo,
    released: bool,
}

/// Shared view into a [`HeadlessBackend`], usable after the backend itself is dropped.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessProbe {
    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn info(&self) -> RenderInfo {
        self.lock().info
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn frames_rendered(&self) -> u64 {
        self.lock().info.frames
    }

    pub fn last_frame(&self) -> Option<FrameScene> {
        self.lock().last_frame.clone()
    }

    pub fn material(&self, id: MaterialId) -> Option<Material> {
        self.lock().materials.get(&id.0).map(|r| r.material.clone())
    }

    pub fn material_label(&self, id: MaterialId) -> Option<String> {
        self.lock().materials.get(&id.0).map(|r| r.label.clone())
    }

    pub fn geometry_label(&self, id: GeometryId) -> Option<String> {
        self.lock().geometries.get(&id.0).map(|r| r.label.clone())
    }

    pub fn texture_options(&self, id: TextureId) -> Option<TextureOptions> {
        self.lock().textures.get(&id.0).map(|r| r.options)
    }

    pub fn texture_is_srgb(&self, id: TextureId) -> Option<bool> {
        self.lock().textures.get(&id.0).map(|r| r.srgb)
    }

    /// Number of live resources of all kinds.
    pub fn live_resources(&self) -> usize {
        let state = self.lock();
        state.geometries.len() + state.textures.len() + state.materials.len()
    }

    /// Labels of disposed resources of one kind, in disposal order.
    pub fn disposed(&self, kind: ResourceKind) -> Vec<String> {
        self.lock()
            .disposed
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, label)| label.clone())
            .collect()
    }
}

/// In-memory render backend.
pub struct HeadlessBackend {
    viewport: Viewport,
    capabilities: Capabilities,
    probe: HeadlessProbe,
}

impl HeadlessBackend {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            capabilities: Capabilities {
                max_anisotropy: 16,
                max_texture_size: 8192,
            },
            probe: HeadlessProbe::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn probe(&self) -> HeadlessProbe {
        self.probe.clone()
    }

    fn live_state(&self) -> Result<MutexGuard<'_, HeadlessState>, RenderError> {
        let state = self.probe.lock();
        if state.released {
            return Err(RenderError::Released);
        }
        Ok(state)
    }

    fn refresh_memory(state: &mut HeadlessState) {
        state.info.geometries = state.geometries.len() as u32;
        state.info.textures = state.textures.len() as u32;
        state.info.materials = state.materials.len() as u32;
    }

    fn allocate(state: &mut HeadlessState) -> u32 {
        state.next_id += 1;
        state.next_id
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn create_geometry(&mut self, geometry: &Geometry, label: &str) -> Result<GeometryId, RenderError> {
        if geometry.triangle_count() == 0 && geometry.point_count() == 0 {
            return Err(RenderError::EmptyGeometry(label.to_string()));
        }
        let mut state = self.live_state()?;
        let id = Self::allocate(&mut state);
        state.geometries.insert(
            id,
            GeometryRecord {
                label: label.to_string(),
                triangles: geometry.triangle_count(),
                points: geometry.point_count(),
            },
        );
        Self::refresh_memory(&mut state);
        Ok(GeometryId(id))
    }

    fn dispose_geometry(&mut self, id: GeometryId) -> bool {
        let mut state = self.probe.lock();
        let Some(record) = state.geometries.remove(&id.0) else {
            return false;
        };
        state.disposed.push((ResourceKind::Geometry, record.label));
        Self::refresh_memory(&mut state);
        true
    }

    fn create_texture(
        &mut self,
        image: &TextureImage,
        options: TextureOptions,
        label: &str,
    ) -> Result<TextureId, RenderError> {
        let mut options = options;
        options.anisotropy = options.anisotropy.clamp(1, self.capabilities.max_anisotropy.max(1));
        let mut state = self.live_state()?;
        let id = Self::allocate(&mut state);
        state.textures.insert(
            id,
            TextureRecord {
                label: label.to_string(),
                options,
                srgb: image.format().is_srgb(),
            },
        );
        Self::refresh_memory(&mut state);
        Ok(TextureId(id))
    }

    fn dispose_texture(&mut self, id: TextureId) -> bool {
        let mut state = self.probe.lock();
        let Some(record) = state.textures.remove(&id.0) else {
            return false;
        };
        state.disposed.push((ResourceKind::Texture, record.label));
        Self::refresh_memory(&mut state);
        true
    }

    fn create_material(&mut self, material: &Material, label: &str) -> Result<MaterialId, RenderError> {
        let mut state = self.live_state()?;
        for texture in material.textures() {
            if !state.textures.contains_key(&texture.0) {
                return Err(RenderError::UnknownHandle {
                    kind: "texture",
                    id: texture.0,
                });
            }
        }
        let id = Self::allocate(&mut state);
        state.materials.insert(
            id,
            MaterialRecord {
                label: label.to_string(),
                material: material.clone(),
            },
        );
        Self::refresh_memory(&mut state);
        Ok(MaterialId(id))
    }

    fn dispose_material(&mut self, id: MaterialId) -> bool {
        let mut state = self.probe.lock();
        let Some(record) = state.materials.remove(&id.0) else {
            return false;
        };
        state.disposed.push((ResourceKind::Material, record.label));
        Self::refresh_memory(&mut state);
        true
    }

    fn render(&mut self, frame: &FrameScene) -> Result<(), RenderError> {
        let mut state = self.live_state()?;
        let mut frame = frame.clone();
        let transparent: HashMap<u32, bool> = state
            .materials
            .iter()
            .map(|(id, record)| (*id, record.material.is_transparent()))
            .collect();
        sort_draws(&mut frame.draws, frame.camera_position, |m| {
            transparent.get(&m.0).copied().unwrap_or(false)
        });

        let (mut triangles, mut points, mut draw_calls) = (0, 0, 0);
        for draw in &frame.draws {
            let Some(geometry) = state.geometries.get(&draw.geometry.0) else {
                log::warn!("HeadlessBackend: draw references unknown geometry {:?}", draw.geometry);
                continue;
            };
            if !state.materials.contains_key(&draw.material.0) {
                log::warn!("HeadlessBackend: draw references unknown material {:?}", draw.material);
                continue;
            }
            triangles += geometry.triangles;
            points += geometry.points;
            draw_calls += 1;
        }
        state.info.triangles = triangles;
        state.info.points = points;
        state.info.lines = 0;
        state.info.draw_calls = draw_calls;
        state.info.frames += 1;
        state.last_frame = Some(frame);
        Ok(())
    }

    fn info(&self) -> RenderInfo {
        self.probe.info()
    }

    fn release(&mut self) {
        let mut state = self.probe.lock();
        if !state.released {
            log::info!("HeadlessBackend: context released");
        }
        state.released = true;
    }

    fn is_released(&self) -> bool {
        self.probe.is_released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraUniform;
    use crate::material::PhongMaterial;
    use crate::mesh::MeshData;
    use crate::texture::ColorSpace;
    use crate::backend::DrawItem;
    use glam::{Mat4, Vec3};

    fn frame(draws: Vec<DrawItem>) -> FrameScene {
        FrameScene {
            camera: CameraUniform::new(),
            camera_position: Vec3::new(0.0, 0.0, 5.0),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            draws,
            lights: Vec::new(),
        }
    }

    #[test]
    fn counters_track_resources_and_frames() {
        let mut backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        let probe = backend.probe();
        let geometry = backend
            .create_geometry(&Geometry::Mesh(MeshData::cuboid(1.0, 1.0, 1.0)), "box")
            .unwrap();
        let material = backend
            .create_material(&Material::Phong(PhongMaterial::default()), "grey")
            .unwrap();
        let draw = DrawItem {
            geometry,
            material,
            model: Mat4::IDENTITY,
            render_order: 0,
            time: 0.0,
        };
        backend.render(&frame(vec![draw, draw])).unwrap();

        let info = probe.info();
        assert_eq!((info.geometries, info.materials, info.textures), (1, 1, 0));
        assert_eq!(info.triangles, 24);
        assert_eq!(info.draw_calls, 2);
        assert_eq!(info.frames, 1);

        assert!(backend.dispose_geometry(geometry));
        assert!(!backend.dispose_geometry(geometry));
        assert_eq!(probe.disposed(ResourceKind::Geometry), vec!["box".to_string()]);
    }

    #[test]
    fn anisotropy_is_clamped_to_capability() {
        let mut backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380)).with_capabilities(Capabilities {
            max_anisotropy: 2,
            max_texture_size: 4096,
        });
        let image = TextureImage::solid([255; 4], ColorSpace::Srgb);
        let options = TextureOptions {
            anisotropy: 4,
            ..Default::default()
        };
        let id = backend.create_texture(&image, options, "albedo").unwrap();
        let probe = backend.probe();
        assert_eq!(probe.texture_options(id).map(|o| o.anisotropy), Some(2));
        assert_eq!(probe.texture_is_srgb(id), Some(true));
    }

    #[test]
    fn material_with_unknown_texture_is_rejected() {
        let mut backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        let material = Material::Phong(PhongMaterial {
            map: Some(TextureId(99)),
            ..Default::default()
        });
        assert!(matches!(
            backend.create_material(&material, "broken"),
            Err(RenderError::UnknownHandle { kind: "texture", id: 99 })
        ));
    }

    #[test]
    fn released_backend_refuses_work() {
        let mut backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        backend.release();
        assert!(backend.is_released());
        assert!(matches!(backend.render(&frame(Vec::new())), Err(RenderError::Released)));
    }
}
