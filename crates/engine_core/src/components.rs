//! Scene-graph components stored on hecs entities.

use glam::Vec3;
use std::fmt;
use std::sync::Arc;

/// Handle to a geometry owned by the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// Handle to a material owned by the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Handle to a texture owned by the render backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Human-readable node name ("earth-group", "clouds-mesh", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Whether a node (and therefore its subtree) is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility(pub bool);

impl Default for Visibility {
    fn default() -> Self {
        Self(true)
    }
}

/// Parent link of a node in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub hecs::Entity);

/// Ordered child list of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children(pub Vec<hecs::Entity>);

/// Mesh reference component - links a node to a backend geometry and material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInstance {
    pub geometry: GeometryId,
    pub material: MaterialId,
    /// Lower values draw first within the same blend class.
    pub render_order: i32,
}

impl MeshInstance {
    pub fn new(geometry: GeometryId, material: MaterialId) -> Self {
        Self {
            geometry,
            material,
            render_order: 0,
        }
    }

    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.render_order = render_order;
        self
    }
}

/// Kind of light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Shines from the node's world position towards the origin.
    Directional,
    /// Omni light with a falloff range (0 = infinite).
    Point { range: f32 },
}

/// Light attached to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Ambient, color, intensity }
    }

    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Directional, color, intensity }
    }

    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self { kind: LightKind::Point { range }, color, intensity }
    }
}

/// Callback invoked with the satellite id when a tagged object is picked.
pub type ClickCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Marks a node as a pick target routed by satellite id.
#[derive(Clone)]
pub struct ClickTarget {
    pub satellite_id: String,
    pub on_click: Option<ClickCallback>,
}

impl ClickTarget {
    pub fn new(satellite_id: impl Into<String>, on_click: Option<ClickCallback>) -> Self {
        Self {
            satellite_id: satellite_id.into(),
            on_click,
        }
    }

    /// Fire the callback, if any.
    pub fn click(&self) {
        if let Some(callback) = &self.on_click {
            callback(&self.satellite_id);
        }
    }
}

impl fmt::Debug for ClickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickTarget")
            .field("satellite_id", &self.satellite_id)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

/// Per-node animation clock in seconds, fed to shaders that animate on the GPU.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShaderClock(pub f32);

/// Local-space bounding sphere used for picking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vec3,
    pub radius: f32,
}

/// Textures owned by a mesh node's material; released together with the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedTextures(pub Vec<TextureId>);

/// Convert a 0xRRGGBB sRGB hex colour to linear RGB.
pub fn hex_color(hex: u32) -> Vec3 {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    Vec3::new(channel(16), channel(8), channel(0))
}
