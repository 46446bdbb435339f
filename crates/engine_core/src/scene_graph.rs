//! Arena-style scene graph: hecs entities linked by `Parent`/`Children` components
//! under a single root node.

use crate::components::{Children, Light, MeshInstance, Name, Parent, Visibility};
use crate::transform::Transform;
use glam::Mat4;
use hecs::{Component, Entity, World};

/// Owned node hierarchy. Nodes that are not reachable from the root are not drawn.
pub struct SceneGraph {
    world: World,
    root: Entity,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut world = World::new();
        let root = world.spawn((
            Name::new("scene"),
            Transform::default(),
            Visibility::default(),
            Children::default(),
        ));
        Self { world, root }
    }

    /// The scene root. It is never despawned.
    pub fn root(&self) -> Entity {
        self.root
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Spawn a detached group node.
    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> Entity {
        self.world.spawn((
            Name::new(name),
            transform,
            Visibility::default(),
            Children::default(),
        ))
    }

    /// Spawn a detached node that draws `mesh`.
    pub fn spawn_mesh(&mut self, name: impl Into<String>, transform: Transform, mesh: MeshInstance) -> Entity {
        let entity = self.spawn(name, transform);
        self.insert(entity, mesh);
        entity
    }

    /// Spawn a detached light node.
    pub fn spawn_light(&mut self, name: impl Into<String>, transform: Transform, light: Light) -> Entity {
        let entity = self.spawn(name, transform);
        self.insert(entity, light);
        entity
    }

    /// Attach (or replace) a component. Returns false if the node does not exist.
    pub fn insert<C: Component>(&mut self, entity: Entity, component: C) -> bool {
        self.world.insert_one(entity, component).is_ok()
    }

    /// Clone a component out of a node.
    pub fn get<C: Component + Clone>(&self, entity: Entity) -> Option<C> {
        self.world.get::<&C>(entity).ok().map(|c| (*c).clone())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> u32 {
        self.world.len()
    }

    pub fn name(&self, entity: Entity) -> Option<String> {
        self.get::<Name>(entity).map(|n| n.0)
    }

    /// Re-parent `child` under `parent`, detaching it from any previous parent.
    /// Refuses links that would create a cycle.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) || child == self.root {
            return false;
        }
        if self.is_ancestor(child, parent) {
            log::warn!("SceneGraph: refusing cyclic attach of {:?} under {:?}", child, parent);
            return false;
        }
        self.detach(child);
        match self.world.query_one_mut::<&mut Children>(parent) {
            Ok(children) => children.0.push(child),
            Err(_) => {
                self.insert(parent, Children(vec![child]));
            }
        }
        self.insert(child, Parent(parent))
    }

    /// Remove `child` from its parent. Returns true if it had one.
    pub fn detach(&mut self, child: Entity) -> bool {
        let Ok(Parent(parent)) = self.world.remove_one::<Parent>(child) else {
            return false;
        };
        if let Ok(children) = self.world.query_one_mut::<&mut Children>(parent) {
            children.0.retain(|c| *c != child);
        }
        true
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.get::<Parent>(entity).map(|p| p.0)
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.get::<Children>(entity).map(|c| c.0).unwrap_or_default()
    }

    /// True if `ancestor` appears on the parent chain of `entity`.
    pub fn is_ancestor(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut current = self.parent(entity);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// True if the node is reachable from the root.
    pub fn is_attached(&self, entity: Entity) -> bool {
        entity == self.root || self.is_ancestor(self.root, entity)
    }

    /// The node and its whole subtree, pre-order.
    pub fn descendants(&self, entity: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        if !self.contains(entity) {
            return out;
        }
        let mut stack = vec![entity];
        while let Some(node) = stack.pop() {
            out.push(node);
            let children = self.children(node);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Detach and despawn a subtree. Returns the despawned nodes, pre-order.
    /// The root itself is kept; only its children go.
    pub fn despawn_recursive(&mut self, entity: Entity) -> Vec<Entity> {
        if entity == self.root {
            let mut removed = Vec::new();
            for child in self.children(entity) {
                removed.extend(self.despawn_recursive(child));
            }
            return removed;
        }
        self.detach(entity);
        let nodes = self.descendants(entity);
        for node in &nodes {
            self.world.despawn(*node).ok();
        }
        nodes
    }

    pub fn set_visible(&mut self, entity: Entity, visible: bool) -> bool {
        self.insert(entity, Visibility(visible))
    }

    pub fn is_visible(&self, entity: Entity) -> bool {
        self.get::<Visibility>(entity).map(|v| v.0).unwrap_or(false)
    }

    pub fn transform(&self, entity: Entity) -> Option<Transform> {
        self.get::<Transform>(entity)
    }

    pub fn transform_mut(&mut self, entity: Entity) -> Option<&mut Transform> {
        self.world.query_one_mut::<&mut Transform>(entity).ok()
    }

    /// Local-to-world matrix of a node (parent chain applied).
    pub fn world_matrix(&self, entity: Entity) -> Mat4 {
        let mut matrix = self.transform(entity).map(|t| t.to_matrix()).unwrap_or(Mat4::IDENTITY);
        let mut current = self.parent(entity);
        while let Some(node) = current {
            if let Some(t) = self.transform(node) {
                matrix = t.to_matrix() * matrix;
            }
            current = self.parent(node);
        }
        matrix
    }

    /// First node with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.world
            .query::<&Name>()
            .iter()
            .find(|(_, n)| n.0 == name)
            .map(|(entity, _)| entity)
    }

    /// Walk every visible node reachable from the root with its world matrix.
    /// Hidden nodes prune their whole subtree.
    pub fn visit_visible(&self, mut visit: impl FnMut(Entity, Mat4)) {
        let mut stack = vec![(self.root, Mat4::IDENTITY)];
        while let Some((node, parent_matrix)) = stack.pop() {
            if !self.is_visible(node) {
                continue;
            }
            let local = self.transform(node).map(|t| t.to_matrix()).unwrap_or(Mat4::IDENTITY);
            let world = parent_matrix * local;
            visit(node, world);
            for child in self.children(node).into_iter().rev() {
                stack.push((child, world));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn add_child_links_both_sides() {
        let mut graph = SceneGraph::new();
        let group = graph.spawn("group", Transform::default());
        assert!(!graph.is_attached(group));
        assert!(graph.add_child(graph.root(), group));
        assert_eq!(graph.parent(group), Some(graph.root()));
        assert_eq!(graph.children(graph.root()), vec![group]);
        assert!(graph.is_attached(group));
    }

    #[test]
    fn reparent_detaches_from_old_parent() {
        let mut graph = SceneGraph::new();
        let a = graph.spawn("a", Transform::default());
        let b = graph.spawn("b", Transform::default());
        let leaf = graph.spawn("leaf", Transform::default());
        graph.add_child(a, leaf);
        graph.add_child(b, leaf);
        assert!(graph.children(a).is_empty());
        assert_eq!(graph.children(b), vec![leaf]);
    }

    #[test]
    fn cyclic_attach_is_refused() {
        let mut graph = SceneGraph::new();
        let a = graph.spawn("a", Transform::default());
        let b = graph.spawn("b", Transform::default());
        graph.add_child(a, b);
        assert!(!graph.add_child(b, a));
    }

    #[test]
    fn despawn_recursive_removes_subtree() {
        let mut graph = SceneGraph::new();
        let group = graph.spawn("group", Transform::default());
        let child = graph.spawn("child", Transform::default());
        let grandchild = graph.spawn("grandchild", Transform::default());
        graph.add_child(graph.root(), group);
        graph.add_child(group, child);
        graph.add_child(child, grandchild);

        let removed = graph.despawn_recursive(group);
        assert_eq!(removed, vec![group, child, grandchild]);
        assert!(!graph.contains(grandchild));
        assert!(graph.children(graph.root()).is_empty());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let group = graph.spawn("group", Transform::from_position(Vec3::new(1.0, 0.0, 0.0)));
        let child = graph.spawn("child", Transform::from_position(Vec3::new(0.0, 2.0, 0.0)));
        graph.add_child(graph.root(), group);
        graph.add_child(group, child);
        let p = graph.world_matrix(child).transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn hidden_group_prunes_subtree() {
        let mut graph = SceneGraph::new();
        let group = graph.spawn("group", Transform::default());
        let child = graph.spawn("child", Transform::default());
        graph.add_child(graph.root(), group);
        graph.add_child(group, child);
        graph.set_visible(group, false);

        let mut seen = Vec::new();
        graph.visit_visible(|e, _| seen.push(e));
        assert_eq!(seen, vec![graph.root()]);

        graph.set_visible(group, true);
        seen.clear();
        graph.visit_visible(|e, _| seen.push(e));
        assert_eq!(seen, vec![graph.root(), group, child]);
    }

    #[test]
    fn find_by_name_returns_node() {
        let mut graph = SceneGraph::new();
        let earth = graph.spawn("earth-group", Transform::default());
        assert_eq!(graph.find_by_name("earth-group"), Some(earth));
        assert_eq!(graph.find_by_name("missing"), None);
    }
}
