//! The rendering-context seam: everything the scene layer needs from a GPU.
//!
//! Resources live behind handle ids so scene code never holds GPU objects
//! directly. A frame is described as a flat list of draws and lights that the
//! backend submits in one go.

use crate::camera::CameraUniform;
use crate::material::Material;
use crate::mesh::Geometry;
use crate::texture::{TextureImage, TextureOptions};
use engine_core::{GeometryId, LightKind, MaterialId, TextureId};
use glam::{Mat4, Vec3};

/// Errors raised by render backends.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),

    /// Surface lost and could not be recovered.
    #[error("surface lost")]
    SurfaceLost,

    #[error("out of GPU memory")]
    OutOfMemory,

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },

    #[error("empty geometry: {0}")]
    EmptyGeometry(String),

    /// The rendering context was released; nothing can be created or drawn.
    #[error("render context released")]
    Released,
}

/// Drawable rectangle inside the surface. Everything left of `x` belongs to the side panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub surface_width: u32,
    pub surface_height: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Full surface minus a fixed-width panel on the left.
    pub fn with_panel(surface_width: u32, surface_height: u32, panel_width: u32) -> Self {
        let x = panel_width.min(surface_width.saturating_sub(1));
        Self {
            surface_width,
            surface_height,
            x,
            y: 0,
            width: surface_width.saturating_sub(panel_width).max(1),
            height: surface_height.max(1),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// True if the surface pixel lies inside the drawable rectangle.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x as f32
            && py >= self.y as f32
            && px < (self.x + self.width) as f32
            && py < (self.y + self.height) as f32
    }

    /// Surface pixel to normalized device coordinates of the viewport (y up).
    pub fn to_ndc(&self, px: f32, py: f32) -> glam::Vec2 {
        glam::Vec2::new(
            (px - self.x as f32) / self.width as f32 * 2.0 - 1.0,
            1.0 - (py - self.y as f32) / self.height as f32 * 2.0,
        )
    }
}

/// What the backend can do; queried by loaders to clamp texture options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub max_anisotropy: u16,
    pub max_texture_size: u32,
}

/// Renderer counters. Memory counters persist; frame counters describe the last submitted frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    pub geometries: u32,
    pub textures: u32,
    pub materials: u32,
    pub triangles: u32,
    pub draw_calls: u32,
    pub points: u32,
    pub lines: u32,
    pub frames: u64,
}

/// One mesh to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub model: Mat4,
    pub render_order: i32,
    /// Shader animation clock in seconds.
    pub time: f32,
}

/// A light resolved to world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightItem {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone)]
pub struct FrameScene {
    pub camera: CameraUniform,
    pub camera_position: Vec3,
    pub clear_color: [f64; 4],
    pub draws: Vec<DrawItem>,
    pub lights: Vec<LightItem>,
}

/// Order draws the way a forward renderer needs them: opaque first by render order,
/// then transparent by render order and back to front.
pub fn sort_draws(draws: &mut [DrawItem], camera_position: Vec3, is_transparent: impl Fn(MaterialId) -> bool) {
    draws.sort_by(|a, b| {
        let ta = is_transparent(a.material);
        let tb = is_transparent(b.material);
        ta.cmp(&tb).then(a.render_order.cmp(&b.render_order)).then_with(|| {
            if ta {
                let da = a.model.w_axis.truncate().distance_squared(camera_position);
                let db = b.model.w_axis.truncate().distance_squared(camera_position);
                db.total_cmp(&da)
            } else {
                std::cmp::Ordering::Equal
            }
        })
    });
}

/// A rendering context. All GPU-resident objects are created and disposed through it;
/// whoever creates a handle disposes it.
pub trait RenderBackend {
    /// Short human-readable identifier ("wgpu", "headless").
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn viewport(&self) -> Viewport;

    /// Resize the surface and drawable rectangle. Never interrupts the loop.
    fn resize(&mut self, viewport: Viewport);

    fn create_geometry(&mut self, geometry: &Geometry, label: &str) -> Result<GeometryId, RenderError>;

    /// Returns false if the handle was unknown (already disposed).
    fn dispose_geometry(&mut self, id: GeometryId) -> bool;

    fn create_texture(
        &mut self,
        image: &TextureImage,
        options: TextureOptions,
        label: &str,
    ) -> Result<TextureId, RenderError>;

    fn dispose_texture(&mut self, id: TextureId) -> bool;

    fn create_material(&mut self, material: &Material, label: &str) -> Result<MaterialId, RenderError>;

    fn dispose_material(&mut self, id: MaterialId) -> bool;

    /// Submit one frame.
    fn render(&mut self, frame: &FrameScene) -> Result<(), RenderError>;

    fn info(&self) -> RenderInfo;

    /// Detach the surface and release the context. Later calls fail with `Released`.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}
