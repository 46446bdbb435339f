//! Background star field: a random point cloud on a spherical shell. The twinkle
//! runs in the point shader, driven by a clock the render loop advances.

use crate::config::StarsConfig;
use crate::context::SceneContext;
use crate::entity::{EntityKind, RegisteredEntity};
use crate::resources::UpdateId;
use engine_core::{Entity, MeshInstance, SceneGraph, ShaderClock, Transform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use renderer::{Geometry, Material, PointCloud, PointVertex, PointsMaterial, RenderError};
use std::f32::consts::TAU;

pub const STARS_ENTITY_ID: &str = "stars";

/// Generate `count` stars uniformly distributed over the shell between `inner` and
/// `outer`. The polar angle is `acos` of a uniform variate so the poles are not
/// oversampled.
pub fn generate_star_field(count: usize, inner: f32, outer: f32, rng: &mut impl Rng) -> PointCloud {
    let band = (outer - inner).max(0.0);
    let points = (0..count)
        .map(|i| {
            let radius = inner + rng.gen::<f32>() * band;
            let theta = rng.gen::<f32>() * TAU;
            let phi = (rng.gen::<f32>() * 2.0 - 1.0).clamp(-1.0, 1.0).acos();
            let position = [
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ];
            let color = hsl_to_rgb(0.6 + rng.gen::<f32>() * 0.1, 0.8, 0.8 + rng.gen::<f32>() * 0.2);
            let size = rng.gen::<f32>() * 2.0 + 0.5;
            PointVertex::new(position, color, size, (i * 3) as f32)
        })
        .collect();
    PointCloud { points }
}

/// HSL in [0, 1] to RGB.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    if s <= 0.0 {
        return [l; 3];
    }
    let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |t: f32| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * 6.0 * (2.0 / 3.0 - t)
        } else {
            p
        }
    };
    [hue(h + 1.0 / 3.0), hue(h), hue(h - 1.0 / 3.0)]
}

/// Vertical offset the point shader applies at `time` seconds. Mirrors the WGSL.
pub fn twinkle_offset(time: f32, phase: f32, amplitude: f32) -> f32 {
    let flicker = (time * 2.0 + phase * 0.1).sin() * 0.1 + 0.9;
    (time + phase).sin() * amplitude * flicker
}

pub struct Stars {
    config: StarsConfig,
    node: Option<Entity>,
    clock: Option<UpdateId>,
}

impl Stars {
    pub fn new(config: StarsConfig) -> Self {
        Self {
            config,
            node: None,
            clock: None,
        }
    }

    pub fn node(&self) -> Option<Entity> {
        self.node
    }

    pub fn mount(&mut self, ctx: &mut SceneContext) -> Result<(), RenderError> {
        if self.node.is_some() {
            self.unmount(ctx);
        }
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let cloud = generate_star_field(
            self.config.count,
            self.config.inner_radius,
            self.config.outer_radius,
            &mut rng,
        );

        let (graph, backend, resources) = ctx.parts();
        let material = backend.create_material(&Material::Points(PointsMaterial::default()), "stars")?;
        let geometry = match backend.create_geometry(&Geometry::Points(cloud), "stars") {
            Ok(geometry) => geometry,
            Err(e) => {
                backend.dispose_material(material);
                return Err(e);
            }
        };
        let node = graph.spawn_mesh("stars", Transform::default(), MeshInstance::new(geometry, material));
        graph.insert(node, ShaderClock(0.0));
        resources
            .entities
            .register(graph, backend, RegisteredEntity::owning_subtree(STARS_ENTITY_ID, EntityKind::Stars, node));

        let id = resources.register_update_function(move |now, graph: &mut SceneGraph| {
            graph.insert(node, ShaderClock((now / 1000.0) as f32));
            Ok(())
        });
        self.node = Some(node);
        self.clock = Some(id);
        log::info!("Stars: {} points mounted", self.config.count);
        Ok(())
    }

    pub fn unmount(&mut self, ctx: &mut SceneContext) {
        if let Some(id) = self.clock.take() {
            ctx.resources.unregister_update_function(id);
        }
        if self.node.take().is_some() {
            let (graph, backend, resources) = ctx.parts();
            resources.entities.remove(graph, backend, STARS_ENTITY_ID);
            log::info!("Stars: unmounted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::config::SceneConfig;
    use renderer::{HeadlessBackend, HeadlessProbe, Viewport};
    use std::sync::Arc;

    fn context() -> (SceneContext, HeadlessProbe) {
        let backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        let probe = backend.probe();
        let ctx = SceneContext::new(Box::new(backend), &SceneConfig::default(), Arc::new(MemorySource::new()));
        (ctx, probe)
    }

    #[test]
    fn points_stay_inside_the_shell() {
        let mut rng = StdRng::seed_from_u64(7);
        let cloud = generate_star_field(2000, 50.0, 100.0, &mut rng);
        assert_eq!(cloud.len(), 2000);
        for p in &cloud.points {
            let r = glam::Vec3::from(p.position).length();
            assert!((49.99..=100.01).contains(&r), "radius {}", r);
            assert!((0.5..=2.5).contains(&p.size));
        }
    }

    #[test]
    fn polar_distribution_has_uniform_area_density() {
        // Uniform on the sphere means cos(polar angle) is uniform in [-1, 1].
        let mut rng = StdRng::seed_from_u64(42);
        let cloud = generate_star_field(2000, 50.0, 100.0, &mut rng);
        let mut bins = [0usize; 10];
        for p in &cloud.points {
            let v = glam::Vec3::from(p.position);
            let cos = (v.z / v.length()).clamp(-1.0, 1.0);
            let bin = (((cos + 1.0) / 2.0 * 10.0) as usize).min(9);
            bins[bin] += 1;
        }
        for (i, count) in bins.iter().enumerate() {
            assert!((140..=260).contains(count), "bin {} has {} points", i, count);
        }
        // Naive uniform-angle sampling would put ~3x more points in the polar bins.
        assert!((bins[0] as f32 / bins[5] as f32) < 1.6);
    }

    #[test]
    fn colours_are_pale_blue() {
        let [r, g, b] = hsl_to_rgb(0.6, 0.8, 0.8);
        assert!(b > g && g > r);
        assert_eq!(hsl_to_rgb(0.3, 0.0, 0.5), [0.5; 3]);
    }

    #[test]
    fn twinkle_is_bounded_and_not_cumulative() {
        for step in 0..1000 {
            let t = step as f32 * 0.016;
            assert!(twinkle_offset(t, 12.0, 0.05).abs() <= 0.05 + 1e-6);
        }
        assert_eq!(twinkle_offset(3.0, 5.0, 0.05), twinkle_offset(3.0, 5.0, 0.05));
        assert_eq!(twinkle_offset(-5.0, 5.0, 0.05), 0.0);
    }

    #[test]
    fn mount_registers_clock_and_unmount_disposes() {
        let (mut ctx, probe) = context();
        let mut stars = Stars::new(StarsConfig {
            seed: Some(1),
            ..StarsConfig::default()
        });
        stars.mount(&mut ctx).unwrap();
        assert_eq!(probe.info().geometries, 1);
        assert_eq!(ctx.resources.update_function_count(), 1);
        assert_eq!(ctx.resources.entities.get_by_type(&EntityKind::Stars).len(), 1);

        ctx.tick(2500.0);
        let node = stars.node().unwrap();
        assert_eq!(ctx.graph.get::<ShaderClock>(node), Some(ShaderClock(2.5)));
        let frame = probe.last_frame().unwrap();
        assert_eq!(frame.draws[0].time, 2.5);
        assert_eq!(probe.info().points, 2000);

        stars.unmount(&mut ctx);
        assert_eq!(ctx.resources.update_function_count(), 0);
        assert!(!ctx.resources.entities.has(STARS_ENTITY_ID));
        assert_eq!(probe.live_resources(), 0);
    }
}
