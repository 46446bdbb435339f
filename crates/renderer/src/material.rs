//! Material descriptions handed to a render backend.

use bytemuck::{Pod, Zeroable};
use engine_core::TextureId;
use glam::Vec3;

/// How a material's fragments combine with the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
}

/// Which triangle faces are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Blinn-Phong surface with optional colour, bump, specular and emission maps.
#[derive(Debug, Clone, PartialEq)]
pub struct PhongMaterial {
    pub color: Vec3,
    pub map: Option<TextureId>,
    pub bump_map: Option<TextureId>,
    pub bump_scale: f32,
    pub specular_map: Option<TextureId>,
    pub specular: Vec3,
    pub shininess: f32,
    pub emissive: Vec3,
    pub emissive_map: Option<TextureId>,
    pub emissive_intensity: f32,
    pub opacity: f32,
    pub transparent: bool,
    pub side: Side,
}

impl Default for PhongMaterial {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            map: None,
            bump_map: None,
            bump_scale: 1.0,
            specular_map: None,
            specular: Vec3::splat(0.0067),
            shininess: 30.0,
            emissive: Vec3::ZERO,
            emissive_map: None,
            emissive_intensity: 1.0,
            opacity: 1.0,
            transparent: false,
            side: Side::Front,
        }
    }
}

/// Fresnel glow rendered on the back faces of a shell around a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphereMaterial {
    pub opacity: f32,
    pub pow_factor: f32,
    pub multiplier: f32,
}

/// Camera-facing round sprites with additive blending and a time-driven vertical wobble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsMaterial {
    /// Screen-size scale: pixels = size * attenuation / view depth.
    pub size_attenuation: f32,
    pub twinkle_amplitude: f32,
}

impl Default for PointsMaterial {
    fn default() -> Self {
        Self {
            size_attenuation: 300.0,
            twinkle_amplitude: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Phong(PhongMaterial),
    Atmosphere(AtmosphereMaterial),
    Points(PointsMaterial),
}

impl Material {
    pub fn blend(&self) -> BlendMode {
        match self {
            Material::Phong(m) if m.transparent => BlendMode::Alpha,
            Material::Phong(_) => BlendMode::Opaque,
            Material::Atmosphere(_) => BlendMode::Alpha,
            Material::Points(_) => BlendMode::Additive,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Material::Phong(m) => m.side,
            Material::Atmosphere(_) => Side::Back,
            Material::Points(_) => Side::Double,
        }
    }

    pub fn depth_write(&self) -> bool {
        !matches!(self, Material::Points(_))
    }

    pub fn is_transparent(&self) -> bool {
        self.blend() != BlendMode::Opaque
    }

    /// Textures referenced by this material, in binding order.
    pub fn textures(&self) -> Vec<TextureId> {
        match self {
            Material::Phong(m) => [m.map, m.bump_map, m.specular_map, m.emissive_map]
                .into_iter()
                .flatten()
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn uniform(&self) -> MaterialUniform {
        let mut uniform = MaterialUniform::zeroed();
        match self {
            Material::Phong(m) => {
                uniform.color = [m.color.x, m.color.y, m.color.z, m.opacity];
                uniform.specular = [m.specular.x, m.specular.y, m.specular.z, m.shininess];
                uniform.emissive = [m.emissive.x, m.emissive.y, m.emissive.z, m.emissive_intensity];
                let flag = |t: Option<TextureId>| if t.is_some() { 1.0 } else { 0.0 };
                uniform.maps = [
                    flag(m.map),
                    flag(m.bump_map),
                    flag(m.specular_map),
                    flag(m.emissive_map),
                ];
                uniform.params = [m.bump_scale, 0.0, 0.0, 0.0];
            }
            Material::Atmosphere(m) => {
                uniform.color = [1.0, 1.0, 1.0, m.opacity];
                uniform.params = [0.0, m.pow_factor, m.multiplier, 0.0];
            }
            Material::Points(m) => {
                uniform.color = [1.0, 1.0, 1.0, 1.0];
                uniform.params = [0.0, 0.0, m.size_attenuation, m.twinkle_amplitude];
            }
        }
        uniform
    }
}

/// Material uniform (must match `MaterialUniform` in the WGSL sources).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// rgb + opacity
    pub color: [f32; 4],
    /// rgb + shininess
    pub specular: [f32; 4],
    /// rgb + intensity
    pub emissive: [f32; 4],
    /// 1.0 where the map/bump/specular/emissive texture is bound
    pub maps: [f32; 4],
    /// bump scale, atmosphere pow, atmosphere multiplier / point attenuation, twinkle amplitude
    pub params: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_phong_blends() {
        let clouds = Material::Phong(PhongMaterial {
            opacity: 0.4,
            transparent: true,
            ..Default::default()
        });
        assert_eq!(clouds.blend(), BlendMode::Alpha);
        assert!(clouds.depth_write());
        assert_eq!(Material::Phong(PhongMaterial::default()).blend(), BlendMode::Opaque);
    }

    #[test]
    fn atmosphere_draws_back_faces() {
        let atmosphere = Material::Atmosphere(AtmosphereMaterial {
            opacity: 0.4,
            pow_factor: 4.1,
            multiplier: 9.5,
        });
        assert_eq!(atmosphere.side(), Side::Back);
        let uniform = atmosphere.uniform();
        assert_eq!(uniform.color[3], 0.4);
        assert_eq!(uniform.params[1], 4.1);
        assert_eq!(uniform.params[2], 9.5);
    }

    #[test]
    fn uniform_flags_bound_maps() {
        let material = Material::Phong(PhongMaterial {
            map: Some(TextureId(1)),
            emissive_map: Some(TextureId(4)),
            ..Default::default()
        });
        assert_eq!(material.uniform().maps, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(material.textures(), vec![TextureId(1), TextureId(4)]);
    }

    #[test]
    fn points_are_additive_without_depth_write() {
        let points = Material::Points(PointsMaterial::default());
        assert_eq!(points.blend(), BlendMode::Additive);
        assert!(!points.depth_write());
        assert!(points.is_transparent());
    }
}
