//! Named, typed index of the top-level objects in a scene. Each entry owns a node
//! subtree and knows how to release it.

use engine_core::{Entity, MeshInstance, OwnedTextures, SceneGraph};
use renderer::RenderBackend;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// What a registered entity is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Earth,
    Satellite,
    Stars,
    Light,
    Other(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Earth => "earth",
            EntityKind::Satellite => "satellite",
            EntityKind::Stars => "stars",
            EntityKind::Light => "light",
            EntityKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Releases an entity's GPU resources and nodes. Runs at most once.
pub type DisposeFn = Box<dyn FnOnce(&mut SceneGraph, &mut dyn RenderBackend)>;

/// One registry entry.
pub struct RegisteredEntity {
    pub id: String,
    pub kind: EntityKind,
    /// Root node of the entity's subtree.
    pub object: Entity,
    dispose: Option<DisposeFn>,
}

impl RegisteredEntity {
    pub fn new<F>(id: impl Into<String>, kind: EntityKind, object: Entity, dispose: F) -> Self
    where
        F: FnOnce(&mut SceneGraph, &mut dyn RenderBackend) + 'static,
    {
        Self {
            id: id.into(),
            kind,
            object,
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Entry whose disposal releases every mesh under `object` (see [`dispose_subtree`]).
    pub fn owning_subtree(id: impl Into<String>, kind: EntityKind, object: Entity) -> Self {
        Self::new(id, kind, object, move |graph: &mut SceneGraph, backend: &mut dyn RenderBackend| {
            dispose_subtree(graph, backend, object);
        })
    }

    fn dispose(&mut self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend) {
        if let Some(dispose) = self.dispose.take() {
            dispose(graph, backend);
        }
    }
}

impl fmt::Debug for RegisteredEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredEntity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("object", &self.object)
            .field("disposed", &self.dispose.is_none())
            .finish()
    }
}

/// Counts of what [`dispose_subtree`] released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disposed {
    pub nodes: usize,
    pub geometries: usize,
    pub materials: usize,
    pub textures: usize,
}

/// Walk the whole subtree under `root`, dispose every geometry, material and owned
/// texture exactly once, then detach and despawn the nodes.
pub fn dispose_subtree(graph: &mut SceneGraph, backend: &mut dyn RenderBackend, root: Entity) -> Disposed {
    let mut geometries = HashSet::new();
    let mut materials = HashSet::new();
    let mut textures = HashSet::new();
    for node in graph.descendants(root) {
        if let Some(mesh) = graph.get::<MeshInstance>(node) {
            geometries.insert(mesh.geometry);
            materials.insert(mesh.material);
        }
        if let Some(owned) = graph.get::<OwnedTextures>(node) {
            textures.extend(owned.0);
        }
    }
    let mut disposed = Disposed::default();
    for id in materials {
        disposed.materials += backend.dispose_material(id) as usize;
    }
    for id in textures {
        disposed.textures += backend.dispose_texture(id) as usize;
    }
    for id in geometries {
        disposed.geometries += backend.dispose_geometry(id) as usize;
    }
    disposed.nodes = graph.despawn_recursive(root).len();
    disposed
}

/// Id-keyed index of scene entities. Re-registering an id disposes the previous
/// occupant before the new one goes into the scene.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, RegisteredEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity`, attaching its root node to the scene root if it has no parent yet.
    /// Returns true if an existing entity with the same id was replaced.
    pub fn register(
        &mut self,
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        entity: RegisteredEntity,
    ) -> bool {
        let replaced = match self.entities.remove(&entity.id) {
            Some(mut old) => {
                log::warn!("Entity id conflict: replacing existing entity {}", old.id);
                graph.detach(old.object);
                old.dispose(graph, backend);
                true
            }
            None => false,
        };
        if graph.parent(entity.object).is_none() {
            graph.add_child(graph.root(), entity.object);
        }
        log::info!("Registered entity [{}] id: {}", entity.kind, entity.id);
        self.entities.insert(entity.id.clone(), entity);
        replaced
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredEntity> {
        self.entities.get(id)
    }

    pub fn get_by_type(&self, kind: &EntityKind) -> Vec<&RegisteredEntity> {
        self.entities.values().filter(|e| &e.kind == kind).collect()
    }

    /// Detach, dispose and forget. Unknown ids are ignored.
    pub fn remove(&mut self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend, id: &str) -> bool {
        let Some(mut entity) = self.entities.remove(id) else {
            return false;
        };
        graph.detach(entity.object);
        entity.dispose(graph, backend);
        log::info!("Removed entity id: {}", id);
        true
    }

    pub fn has(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Remove every entity.
    pub fn clear(&mut self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend) -> usize {
        let ids: Vec<String> = self.entities.keys().cloned().collect();
        let count = ids.len();
        for id in ids {
            self.remove(graph, backend, &id);
        }
        log::info!("Cleared {} entities", count);
        count
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Transform;
    use renderer::{
        Geometry, HeadlessBackend, Material, MeshData, PhongMaterial, ResourceKind, TextureImage, TextureOptions,
        Viewport,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (SceneGraph, HeadlessBackend) {
        (SceneGraph::new(), HeadlessBackend::new(Viewport::with_panel(800, 600, 380)))
    }

    fn spawn_box(graph: &mut SceneGraph, backend: &mut HeadlessBackend, name: &str) -> Entity {
        let geometry = backend
            .create_geometry(&Geometry::Mesh(MeshData::cuboid(1.0, 1.0, 1.0)), name)
            .unwrap();
        let material = backend
            .create_material(&Material::Phong(PhongMaterial::default()), name)
            .unwrap();
        graph.spawn_mesh(name, Transform::default(), MeshInstance::new(geometry, material))
    }

    #[test]
    fn register_attaches_and_lookups_work() {
        let (mut graph, mut backend) = setup();
        let mut registry = EntityRegistry::new();
        let node = spawn_box(&mut graph, &mut backend, "a");
        assert!(!registry.register(
            &mut graph,
            &mut backend,
            RegisteredEntity::owning_subtree("a", EntityKind::Satellite, node)
        ));
        assert!(graph.is_attached(node));
        assert!(registry.has("a"));
        assert_eq!(registry.get("a").map(|e| e.object), Some(node));
        assert_eq!(registry.get_by_type(&EntityKind::Satellite).len(), 1);
        assert!(registry.get_by_type(&EntityKind::Earth).is_empty());
    }

    #[test]
    fn replacing_disposes_old_occupant_before_attaching_new() {
        let (mut graph, mut backend) = setup();
        let mut registry = EntityRegistry::new();
        let first = graph.spawn("first", Transform::default());
        let second = graph.spawn("second", Transform::default());
        let calls = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&calls);
        registry.register(
            &mut graph,
            &mut backend,
            RegisteredEntity::new(
                "sat",
                EntityKind::Satellite,
                first,
                move |graph: &mut SceneGraph, _: &mut dyn RenderBackend| {
                    log.borrow_mut().push(("dispose-first", graph.is_attached(second)));
                },
            ),
        );
        assert!(registry.register(
            &mut graph,
            &mut backend,
            RegisteredEntity::owning_subtree("sat", EntityKind::Satellite, second)
        ));
        assert_eq!(*calls.borrow(), vec![("dispose-first", false)]);
        assert!(!graph.is_attached(first));
        assert!(graph.is_attached(second));
        assert_eq!(registry.len(), 1);

        registry.remove(&mut graph, &mut backend, "sat");
        assert_eq!(calls.borrow().len(), 1, "old occupant disposed exactly once");
    }

    #[test]
    fn remove_releases_the_whole_subtree() {
        let (mut graph, mut backend) = setup();
        let probe = backend.probe();
        let mut registry = EntityRegistry::new();
        let parent = spawn_box(&mut graph, &mut backend, "hull");
        let child = spawn_box(&mut graph, &mut backend, "panel");
        let texture = backend
            .create_texture(&TextureImage::solid([255; 4], Default::default()), TextureOptions::default(), "tex")
            .unwrap();
        graph.insert(child, OwnedTextures(vec![texture]));
        graph.add_child(parent, child);
        registry.register(
            &mut graph,
            &mut backend,
            RegisteredEntity::owning_subtree("sat", EntityKind::Satellite, parent),
        );

        assert!(registry.remove(&mut graph, &mut backend, "sat"));
        assert!(!registry.remove(&mut graph, &mut backend, "sat"));
        assert_eq!(probe.live_resources(), 0);
        assert_eq!(probe.disposed(ResourceKind::Geometry).len(), 2);
        assert_eq!(probe.disposed(ResourceKind::Texture), vec!["tex".to_string()]);
        assert!(!graph.contains(child));
    }

    #[test]
    fn shared_resources_are_disposed_once() {
        let (mut graph, mut backend) = setup();
        let probe = backend.probe();
        let a = spawn_box(&mut graph, &mut backend, "a");
        let mesh = graph.get::<MeshInstance>(a).unwrap();
        let b = graph.spawn_mesh("b", Transform::default(), mesh);
        graph.add_child(a, b);
        let disposed = dispose_subtree(&mut graph, &mut backend, a);
        assert_eq!((disposed.nodes, disposed.geometries, disposed.materials), (2, 1, 1));
        assert_eq!(probe.live_resources(), 0);
    }

    #[test]
    fn clear_empties_registry() {
        let (mut graph, mut backend) = setup();
        let mut registry = EntityRegistry::new();
        for id in ["a", "b", "c"] {
            let node = spawn_box(&mut graph, &mut backend, id);
            registry.register(
                &mut graph,
                &mut backend,
                RegisteredEntity::owning_subtree(id, EntityKind::Other("test".into()), node),
            );
        }
        assert_eq!(registry.clear(&mut graph, &mut backend), 3);
        assert!(registry.is_empty());
        assert_eq!(graph.children(graph.root()).len(), 0);
    }
}
