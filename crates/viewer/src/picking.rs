//! Pointer picking against the click tags satellites put on their nodes.

use engine_core::{Bounds, ClickTarget, SceneGraph, Vec3};
use renderer::{Camera, Viewport};

/// Nearest visible click target under the surface pixel `(px, py)`, if any.
pub fn pick(graph: &SceneGraph, camera: &Camera, viewport: &Viewport, px: f32, py: f32) -> Option<ClickTarget> {
    if !viewport.contains(px, py) {
        return None;
    }
    let (origin, direction) = camera.ray(viewport.to_ndc(px, py));
    let mut best: Option<(f32, ClickTarget)> = None;
    graph.visit_visible(|entity, world| {
        let (Some(target), Some(bounds)) = (graph.get::<ClickTarget>(entity), graph.get::<Bounds>(entity)) else {
            return;
        };
        let center = world.transform_point3(bounds.center);
        let (scale, _, _) = world.to_scale_rotation_translation();
        let radius = bounds.radius * scale.abs().max_element();
        if let Some(t) = ray_sphere(origin, direction, center, radius) {
            if best.as_ref().map_or(true, |(nearest, _)| t < *nearest) {
                best = Some((t, target));
            }
        }
    });
    best.map(|(_, target)| target)
}

/// Distance along a unit-length ray to the first hit with a sphere in front of the origin.
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let to_center = origin - center;
    let b = to_center.dot(direction);
    let c = to_center.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let near = -b - root;
    let far = -b + root;
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        Some(0.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Transform;

    fn camera() -> Camera {
        let mut camera = Camera::new(40.0, 1.0, 0.1, 2000.0);
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.look_at(Vec3::ZERO);
        camera
    }

    fn tagged(graph: &mut SceneGraph, id: &str, position: Vec3) {
        let node = graph.spawn(id, Transform::from_position(position));
        graph.insert(node, ClickTarget::new(id, None));
        graph.insert(
            node,
            Bounds {
                center: Vec3::ZERO,
                radius: 0.5,
            },
        );
        graph.add_child(graph.root(), node);
    }

    #[test]
    fn centre_click_hits_the_nearest_target() {
        let mut graph = SceneGraph::new();
        tagged(&mut graph, "far", Vec3::new(0.0, 0.0, -2.0));
        tagged(&mut graph, "near", Vec3::ZERO);
        let viewport = Viewport::with_panel(980, 600, 380);
        let hit = pick(&graph, &camera(), &viewport, 380.0 + 300.0, 300.0).unwrap();
        assert_eq!(hit.satellite_id, "near");
    }

    #[test]
    fn clicks_on_the_panel_or_empty_space_miss() {
        let mut graph = SceneGraph::new();
        tagged(&mut graph, "sat", Vec3::ZERO);
        let viewport = Viewport::with_panel(980, 600, 380);
        assert!(pick(&graph, &camera(), &viewport, 100.0, 300.0).is_none());
        assert!(pick(&graph, &camera(), &viewport, 380.0 + 5.0, 5.0).is_none());
    }

    #[test]
    fn hidden_targets_are_not_picked() {
        let mut graph = SceneGraph::new();
        tagged(&mut graph, "sat", Vec3::ZERO);
        let node = graph.find_by_name("sat").unwrap();
        graph.set_visible(node, false);
        let viewport = Viewport::with_panel(980, 600, 380);
        assert!(pick(&graph, &camera(), &viewport, 680.0, 300.0).is_none());
    }

    #[test]
    fn ray_sphere_cases() {
        assert_eq!(ray_sphere(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z, Vec3::ZERO, 1.0), Some(4.0));
        assert_eq!(ray_sphere(Vec3::ZERO, Vec3::Z, Vec3::ZERO, 1.0), Some(0.0));
        assert_eq!(ray_sphere(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, Vec3::ZERO, 1.0), None);
        assert_eq!(ray_sphere(Vec3::new(3.0, 0.0, 5.0), -Vec3::Z, Vec3::ZERO, 1.0), None);
    }
}
