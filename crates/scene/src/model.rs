//! glTF/GLB models decoded on a loader thread into a CPU-side node tree, then
//! turned into scene nodes and backend resources on the render thread.

use crate::entity::dispose_subtree;
use crate::error::LoadError;
use engine_core::{Bounds, Entity, MeshInstance, OwnedTextures, SceneGraph, Transform};
use glam::{Quat, Vec3};
use renderer::{
    ColorSpace, Geometry, Material, MeshData, PhongMaterial, RenderBackend, RenderError, TextureImage, TextureOptions,
    Vertex,
};

/// One drawable part of a model node.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrimitive {
    pub mesh: MeshData,
    /// Linear base colour.
    pub color: Vec3,
    pub opacity: f32,
    pub texture: Option<TextureImage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub primitives: Vec<ModelPrimitive>,
    /// Indices into [`ModelData::nodes`].
    pub children: Vec<usize>,
}

/// Decoded model, ready to be instantiated any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub nodes: Vec<ModelNode>,
    pub roots: Vec<usize>,
}

/// True if the reference names a format the model loader understands.
pub fn is_supported_model(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".glb") || lower.ends_with(".gltf")
}

impl ModelData {
    /// Decode GLB or self-contained glTF bytes.
    pub fn parse(path: &str, bytes: Vec<u8>) -> Result<Self, LoadError> {
        let (document, buffers, images) = gltf::import_slice(&bytes).map_err(|e| LoadError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let mut model = ModelData::default();
        let mut index_of = vec![usize::MAX; document.nodes().len()];
        for node in document.nodes() {
            let (translation, rotation, scale) = node.transform().decomposed();
            let mut primitives = Vec::new();
            if let Some(mesh) = node.mesh() {
                for primitive in mesh.primitives() {
                    if primitive.mode() != gltf::mesh::Mode::Triangles {
                        log::debug!("{}: skipping non-triangle primitive in mesh {}", path, mesh.index());
                        continue;
                    }
                    if let Some(p) = read_primitive(&primitive, &buffers, &images) {
                        primitives.push(p);
                    }
                }
            }
            index_of[node.index()] = model.nodes.len();
            model.nodes.push(ModelNode {
                name: node.name().map(str::to_string).unwrap_or_else(|| format!("node-{}", node.index())),
                transform: Transform {
                    position: Vec3::from(translation),
                    rotation: Quat::from_array(rotation),
                    scale: Vec3::from(scale),
                },
                primitives,
                children: Vec::new(),
            });
        }
        for node in document.nodes() {
            let children: Vec<usize> = node.children().map(|c| index_of[c.index()]).collect();
            model.nodes[index_of[node.index()]].children = children;
        }
        let scene = document.default_scene().or_else(|| document.scenes().next());
        model.roots = match scene {
            Some(scene) => scene.nodes().map(|n| index_of[n.index()]).collect(),
            None => Vec::new(),
        };

        if model.triangle_count() == 0 {
            return Err(LoadError::Decode {
                path: path.to_string(),
                reason: "model has no triangles".into(),
            });
        }
        log::info!("Decoded model {}: {} nodes, {} triangles", path, model.nodes.len(), model.triangle_count());
        Ok(model)
    }

    pub fn triangle_count(&self) -> u32 {
        self.nodes
            .iter()
            .flat_map(|n| n.primitives.iter())
            .map(|p| p.mesh.triangle_count())
            .sum()
    }

    /// Create a group node named `name` holding the whole model. Nothing is attached
    /// to the scene root. On failure everything created so far is released.
    pub fn instantiate(
        &self,
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        name: &str,
    ) -> Result<Entity, RenderError> {
        let group = graph.spawn(name, Transform::default());
        for &root in &self.roots {
            if let Err(e) = self.instantiate_node(graph, backend, group, root, name) {
                dispose_subtree(graph, backend, group);
                return Err(e);
            }
        }
        Ok(group)
    }

    fn instantiate_node(
        &self,
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        parent: Entity,
        index: usize,
        label: &str,
    ) -> Result<(), RenderError> {
        let Some(node) = self.nodes.get(index) else {
            return Ok(());
        };
        let entity = graph.spawn(node.name.clone(), node.transform);
        graph.add_child(parent, entity);
        for (i, primitive) in node.primitives.iter().enumerate() {
            let part = graph.spawn(format!("{}-primitive-{}", node.name, i), Transform::default());
            graph.add_child(entity, part);
            let part_label = format!("{}/{}#{}", label, node.name, i);
            let map = match &primitive.texture {
                Some(image) => {
                    let texture = backend.create_texture(image, TextureOptions::default(), &part_label)?;
                    graph.insert(part, OwnedTextures(vec![texture]));
                    Some(texture)
                }
                None => None,
            };
            let material = backend.create_material(
                &Material::Phong(PhongMaterial {
                    color: primitive.color,
                    map,
                    opacity: primitive.opacity,
                    transparent: primitive.opacity < 1.0,
                    ..PhongMaterial::default()
                }),
                &part_label,
            )?;
            let geometry = match backend.create_geometry(&Geometry::Mesh(primitive.mesh.clone()), &part_label) {
                Ok(geometry) => geometry,
                Err(e) => {
                    backend.dispose_material(material);
                    return Err(e);
                }
            };
            let (center, radius) = primitive.mesh.bounding_sphere();
            graph.insert(part, MeshInstance::new(geometry, material));
            graph.insert(part, Bounds { center, radius });
        }
        for &child in &node.children {
            self.instantiate_node(graph, backend, entity, child, label)?;
        }
        Ok(())
    }
}

fn read_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> Option<ModelPrimitive> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|n| n.collect());
    let tex_coords: Option<Vec<[f32; 2]>> = reader.read_tex_coords(0).map(|t| t.into_f32().collect());
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            Vertex::new(
                *p,
                normals.as_ref().and_then(|n| n.get(i).copied()).unwrap_or([0.0; 3]),
                tex_coords.as_ref().and_then(|t| t.get(i).copied()).unwrap_or([0.0; 2]),
            )
        })
        .collect();
    let mut mesh = MeshData { vertices, indices };
    if normals.is_none() {
        compute_normals(&mut mesh);
    }

    let pbr = primitive.material().pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let texture = pbr
        .base_color_texture()
        .and_then(|info| images.get(info.texture().source().index()))
        .and_then(image_to_texture);
    Some(ModelPrimitive {
        mesh,
        color: Vec3::new(r, g, b),
        opacity: a,
        texture,
    })
}

fn image_to_texture(data: &gltf::image::Data) -> Option<TextureImage> {
    let rgba: Vec<u8> = match data.format {
        gltf::image::Format::R8G8B8A8 => data.pixels.clone(),
        gltf::image::Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        other => {
            log::debug!("Unsupported glTF image format {:?}, using base colour only", other);
            return None;
        }
    };
    let image = image::RgbaImage::from_raw(data.width, data.height, rgba)?;
    Some(TextureImage::from_rgba(image, ColorSpace::Srgb))
}

/// Smooth vertex normals from triangle faces.
fn compute_normals(mesh: &mut MeshData) {
    let mut sums = vec![Vec3::ZERO; mesh.vertices.len()];
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= sums.len() || b >= sums.len() || c >= sums.len() {
            continue;
        }
        let pa = Vec3::from(mesh.vertices[a].position);
        let pb = Vec3::from(mesh.vertices[b].position);
        let pc = Vec3::from(mesh.vertices[c].position);
        let face = (pb - pa).cross(pc - pa);
        sums[a] += face;
        sums[b] += face;
        sums[c] += face;
    }
    for (vertex, sum) in mesh.vertices.iter_mut().zip(sums) {
        vertex.normal = sum.normalize_or_zero().to_array();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::gltf_bytes;
    use renderer::{HeadlessBackend, Viewport};

    #[test]
    fn parses_embedded_gltf_into_node_tree() {
        let model = ModelData::parse("/models/test.gltf", gltf_bytes()).unwrap();
        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.roots, vec![0]);
        assert_eq!(model.nodes[0].children, vec![1]);
        assert_eq!(model.nodes[1].transform.position, Vec3::X);
        assert_eq!(model.triangle_count(), 2);
        let normal = model.nodes[0].primitives[0].mesh.vertices[0].normal;
        assert!((Vec3::from(normal) - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = ModelData::parse("/models/bad.glb", b"not a model".to_vec()).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn instantiate_builds_detached_group() {
        let model = ModelData::parse("/models/test.gltf", gltf_bytes()).unwrap();
        let mut graph = SceneGraph::new();
        let mut backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        let probe = backend.probe();
        let group = model.instantiate(&mut graph, &mut backend, "satellite-x").unwrap();
        assert!(!graph.is_attached(group));
        let meshes = graph
            .descendants(group)
            .into_iter()
            .filter(|e| graph.get::<MeshInstance>(*e).is_some())
            .count();
        assert_eq!(meshes, 2);
        assert_eq!(probe.info().geometries, 2);
        assert_eq!(probe.info().materials, 2);
    }

    #[test]
    fn model_extensions() {
        assert!(is_supported_model("/models/satellite.glb"));
        assert!(is_supported_model("/models/a.GLTF"));
        assert!(!is_supported_model("/models/a.obj"));
    }
}
