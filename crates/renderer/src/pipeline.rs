//! WGSL sources, uniform layouts and pipeline construction.

use crate::backend::LightItem;
use crate::material::{BlendMode, Material, Side};
use crate::texture::Texture;
use crate::vertex::{PointVertex, Vertex};
use bytemuck::{Pod, Zeroable};
use engine_core::LightKind;
use glam::Mat4;

pub const MAX_LIGHTS: usize = 8;

/// Per-draw uniform slots are spaced to the default dynamic-offset alignment.
pub const OBJECT_UNIFORM_STRIDE: u64 = 256;

const COMMON_WGSL: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    position: vec4<f32>,
    viewport: vec4<f32>,
};

struct Light {
    position: vec4<f32>,
    color: vec4<f32>,
};

struct Lights {
    ambient: vec4<f32>,
    count: vec4<u32>,
    lights: array<Light, 8>,
};

struct Object {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    params: vec4<f32>,
};

struct Material {
    color: vec4<f32>,
    specular: vec4<f32>,
    emissive: vec4<f32>,
    maps: vec4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<uniform> lights: Lights;
@group(1) @binding(0) var<uniform> node: Object;
@group(2) @binding(0) var<uniform> material: Material;
@group(2) @binding(1) var color_map: texture_2d<f32>;
@group(2) @binding(2) var color_sampler: sampler;
@group(2) @binding(3) var bump_map: texture_2d<f32>;
@group(2) @binding(4) var bump_sampler: sampler;
@group(2) @binding(5) var specular_map: texture_2d<f32>;
@group(2) @binding(6) var specular_sampler: sampler;
@group(2) @binding(7) var emissive_map: texture_2d<f32>;
@group(2) @binding(8) var emissive_sampler: sampler;
"#;

const PHONG_WGSL: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = node.model * vec4<f32>(in.position, 1.0);
    out.world_position = world.xyz;
    out.normal = normalize((node.normal * vec4<f32>(in.normal, 0.0)).xyz);
    out.uv = in.uv;
    out.clip = camera.view_proj * world;
    return out;
}

// Screen-space derivative bump mapping; no tangents required.
fn perturb_normal(position: vec3<f32>, normal: vec3<f32>, height: f32) -> vec3<f32> {
    let dhdx = dpdx(height);
    let dhdy = dpdy(height);
    let sigma_x = dpdx(position);
    let sigma_y = dpdy(position);
    let r1 = cross(sigma_y, normal);
    let r2 = cross(normal, sigma_x);
    let det = dot(sigma_x, r1);
    let grad = sign(det) * (dhdx * r1 + dhdy * r2);
    return normalize(abs(det) * normal - grad);
}

@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    let base_sample = textureSample(color_map, color_sampler, in.uv);
    let bump_sample = textureSample(bump_map, bump_sampler, in.uv);
    let spec_sample = textureSample(specular_map, specular_sampler, in.uv);
    let emissive_sample = textureSample(emissive_map, emissive_sampler, in.uv);

    var normal = normalize(in.normal);
    normal = select(-normal, normal, front);
    let bumped = perturb_normal(in.world_position, normal, bump_sample.r * material.params.x);
    normal = select(normal, bumped, material.maps.y > 0.5);

    let base = material.color.rgb * select(vec3<f32>(1.0), base_sample.rgb, material.maps.x > 0.5);
    let alpha = material.color.a * select(1.0, base_sample.a, material.maps.x > 0.5);
    let specular_strength = select(1.0, spec_sample.r, material.maps.z > 0.5);
    let view_dir = normalize(camera.position.xyz - in.world_position);

    var diffuse = lights.ambient.rgb;
    var specular = vec3<f32>(0.0);
    for (var i = 0u; i < lights.count.x; i = i + 1u) {
        let light = lights.lights[i];
        var dir = normalize(light.position.xyz);
        var attenuation = 1.0;
        if (light.position.w > 0.5) {
            let to_light = light.position.xyz - in.world_position;
            let d = length(to_light);
            dir = to_light / max(d, 0.0001);
            if (light.color.w > 0.0) {
                attenuation = pow(clamp(1.0 - d / light.color.w, 0.0, 1.0), 2.0);
            }
        }
        let irradiance = light.color.rgb * attenuation * max(dot(normal, dir), 0.0);
        diffuse += irradiance;
        let half_dir = normalize(dir + view_dir);
        specular += irradiance * pow(max(dot(normal, half_dir), 0.0), max(material.specular.w, 1.0));
    }

    let emissive = material.emissive.rgb * material.emissive.w
        * select(vec3<f32>(1.0), emissive_sample.rgb, material.maps.w > 0.5);
    let color = base * diffuse + material.specular.rgb * specular_strength * specular + emissive;
    return vec4<f32>(color, alpha);
}
"#;

const ATMOSPHERE_WGSL: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) eye: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let mv_position = camera.view * node.model * vec4<f32>(in.position, 1.0);
    out.normal = normalize((camera.view * node.normal * vec4<f32>(in.normal, 0.0)).xyz);
    out.eye = normalize(mv_position.xyz);
    out.clip = camera.proj * mv_position;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let d = max(dot(normalize(in.normal), normalize(in.eye)), 0.0);
    let factor = pow(d, material.params.y) * material.params.z;
    let atmosphere = vec3<f32>(0.27 + d / 15.0, 0.35 + d / 15.0, 0.5 + d / 12.0);
    let color = vec4<f32>(atmosphere, material.color.a) * factor;
    return vec4<f32>(color.rgb, clamp(color.a, 0.0, 1.0));
}
"#;

const POINTS_WGSL: &str = r#"
struct PointInput {
    @location(0) position_size: vec4<f32>,
    @location(1) color_phase: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32, point: PointInput) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0), vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, 1.0), vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];
    let time = node.params.x;
    let phase = point.color_phase.w;
    let flicker = sin(time * 2.0 + phase * 0.1) * 0.1 + 0.9;
    let wobble = sin(time + phase) * material.params.w * flicker;
    let local = point.position_size.xyz + vec3<f32>(0.0, wobble, 0.0);

    let mv_position = camera.view * node.model * vec4<f32>(local, 1.0);
    let pixels = point.position_size.w * material.params.z / max(-mv_position.z, 0.001);
    var clip = camera.proj * mv_position;
    let offset = corner * pixels / camera.viewport.xy;
    clip = vec4<f32>(clip.xy + offset * clip.w, clip.zw);

    var out: VertexOutput;
    out.clip = clip;
    out.color = point.color_phase.rgb;
    out.uv = corner * 0.5 + vec2<f32>(0.5);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let d = length(in.uv - vec2<f32>(0.5));
    if (d > 0.5) {
        discard;
    }
    return vec4<f32>(in.color, 1.0 - d * 2.0);
}
"#;

/// One light as laid out in the lights uniform.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct LightRaw {
    /// xyz position; w = 0 directional (xyz points at the light), 1 point
    pub position: [f32; 4],
    /// rgb pre-multiplied by intensity; w = range (0 = infinite)
    pub color: [f32; 4],
}

/// Light uniform (must match `Lights` in the WGSL sources).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightsUniform {
    pub ambient: [f32; 4],
    pub count: [u32; 4],
    pub lights: [LightRaw; MAX_LIGHTS],
}

impl LightsUniform {
    /// Pack world-space lights. Ambient lights are summed; the rest are truncated to `MAX_LIGHTS`.
    pub fn from_lights(items: &[LightItem]) -> Self {
        let mut uniform = Self::zeroed();
        let mut count = 0;
        for item in items {
            let radiance = item.color * item.intensity;
            match item.kind {
                LightKind::Ambient => {
                    uniform.ambient[0] += radiance.x;
                    uniform.ambient[1] += radiance.y;
                    uniform.ambient[2] += radiance.z;
                }
                LightKind::Directional | LightKind::Point { .. } => {
                    if count == MAX_LIGHTS {
                        log::warn!("LightsUniform: more than {} lights, extra lights ignored", MAX_LIGHTS);
                        continue;
                    }
                    let (w, range) = match item.kind {
                        LightKind::Point { range } => (1.0, range),
                        _ => (0.0, 0.0),
                    };
                    let p = item.position;
                    uniform.lights[count] = LightRaw {
                        position: [p.x, p.y, p.z, w],
                        color: [radiance.x, radiance.y, radiance.z, range],
                    };
                    count += 1;
                }
            }
        }
        uniform.count = [count as u32, 0, 0, 0];
        uniform
    }
}

/// Per-draw uniform (must match `Object` in the WGSL sources).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    /// x = shader clock in seconds
    pub params: [f32; 4],
}

impl ObjectUniform {
    pub fn new(model: Mat4, time: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            params: [time, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Phong,
    Atmosphere,
    Points,
}

/// Everything that distinguishes one render pipeline from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderKind,
    pub blend: BlendMode,
    pub side: Side,
    pub depth_write: bool,
}

impl PipelineKey {
    pub fn for_material(material: &Material) -> Self {
        let shader = match material {
            Material::Phong(_) => ShaderKind::Phong,
            Material::Atmosphere(_) => ShaderKind::Atmosphere,
            Material::Points(_) => ShaderKind::Points,
        };
        Self {
            shader,
            blend: material.blend(),
            side: material.side(),
            depth_write: material.depth_write(),
        }
    }

    fn cull_mode(&self) -> Option<wgpu::Face> {
        match self.side {
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        }
    }

    fn blend_state(&self) -> wgpu::BlendState {
        match self.blend {
            BlendMode::Opaque => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }
}

fn shader_source(kind: ShaderKind) -> String {
    let body = match kind {
        ShaderKind::Phong => PHONG_WGSL,
        ShaderKind::Atmosphere => ATMOSPHERE_WGSL,
        ShaderKind::Points => POINTS_WGSL,
    };
    format!("{COMMON_WGSL}\n{body}")
}

fn uniform_entry(binding: u32, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Group 0: camera + lights.
pub fn create_frame_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Frame Bind Group Layout"),
        entries: &[uniform_entry(0, false), uniform_entry(1, false)],
    })
}

/// Group 1: per-draw object uniform addressed by dynamic offset.
pub fn create_object_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Object Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<ObjectUniform>() as u64),
            },
            count: None,
        }],
    })
}

/// Group 2: material uniform plus four texture/sampler pairs (colour, bump, specular, emissive).
pub fn create_material_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let mut entries = vec![uniform_entry(0, false)];
    for slot in 0..4u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 1 + slot * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2 + slot * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Material Bind Group Layout"),
        entries: &entries,
    })
}

/// Build the pipeline for one material configuration.
pub fn create_material_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    layouts: [&wgpu::BindGroupLayout; 3],
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    let label = format!("{:?} Pipeline", key.shader);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(shader_source(key.shader).into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&label),
        bind_group_layouts: &layouts,
        push_constant_ranges: &[],
    });

    let buffers = match key.shader {
        ShaderKind::Points => [PointVertex::layout()],
        ShaderKind::Phong | ShaderKind::Atmosphere => [Vertex::layout()],
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(key.blend_state()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.cull_mode(),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: key.depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{AtmosphereMaterial, PhongMaterial, PointsMaterial};
    use glam::Vec3;

    #[test]
    fn ambient_lights_are_summed() {
        let lights = [
            LightItem {
                kind: LightKind::Ambient,
                color: Vec3::ONE,
                intensity: 0.5,
                position: Vec3::ZERO,
            },
            LightItem {
                kind: LightKind::Ambient,
                color: Vec3::new(1.0, 0.0, 0.0),
                intensity: 0.25,
                position: Vec3::ZERO,
            },
            LightItem {
                kind: LightKind::Point { range: 10.0 },
                color: Vec3::ONE,
                intensity: 0.5,
                position: Vec3::new(0.0, 0.0, 3.0),
            },
        ];
        let uniform = LightsUniform::from_lights(&lights);
        assert_eq!(uniform.ambient, [0.75, 0.5, 0.5, 0.0]);
        assert_eq!(uniform.count[0], 1);
        assert_eq!(uniform.lights[0].position, [0.0, 0.0, 3.0, 1.0]);
        assert_eq!(uniform.lights[0].color, [0.5, 0.5, 0.5, 10.0]);
    }

    #[test]
    fn lights_beyond_capacity_are_dropped() {
        let light = LightItem {
            kind: LightKind::Directional,
            color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::Z,
        };
        let uniform = LightsUniform::from_lights(&vec![light; MAX_LIGHTS + 3]);
        assert_eq!(uniform.count[0] as usize, MAX_LIGHTS);
    }

    #[test]
    fn object_uniform_fits_stride() {
        assert!(std::mem::size_of::<ObjectUniform>() as u64 <= OBJECT_UNIFORM_STRIDE);
        assert_eq!(std::mem::size_of::<LightsUniform>() % 16, 0);
    }

    #[test]
    fn pipeline_keys_follow_material() {
        let atmosphere = PipelineKey::for_material(&Material::Atmosphere(AtmosphereMaterial {
            opacity: 0.4,
            pow_factor: 4.1,
            multiplier: 9.5,
        }));
        assert_eq!(atmosphere.cull_mode(), Some(wgpu::Face::Front));
        let points = PipelineKey::for_material(&Material::Points(PointsMaterial::default()));
        assert_eq!(points.cull_mode(), None);
        assert!(!points.depth_write);
        let body = PipelineKey::for_material(&Material::Phong(PhongMaterial::default()));
        assert_eq!(body.blend_state(), wgpu::BlendState::REPLACE);
    }

    #[test]
    fn every_shader_shares_the_common_bindings() {
        for kind in [ShaderKind::Phong, ShaderKind::Atmosphere, ShaderKind::Points] {
            let source = shader_source(kind);
            assert!(source.contains("@group(2) @binding(8)"));
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
        }
    }
}
