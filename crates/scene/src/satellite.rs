//! Satellite models: one asynchronous glTF load per descriptor, a grey box in its
//! place when the model is unavailable, and click tags on everything pickable.

use crate::context::SceneContext;
use crate::entity::{EntityKind, RegisteredEntity};
use crate::error::LoadError;
use crate::loader::{LoadStatus, Liveness, PendingLoad};
use crate::model::{is_supported_model, ModelData};
use engine_core::{hex_color, Bounds, ClickCallback, ClickTarget, Entity, Light, MeshInstance, SceneGraph, Transform, Vec3};
use renderer::{Geometry, Material, MeshData, PhongMaterial, RenderBackend, RenderError};
use serde::{Deserialize, Serialize};

/// Registry id of the per-batch light pair.
pub const SATELLITE_LIGHTS_ID: &str = "satellite-lights";

const FALLBACK_COLOR: u32 = 0x444444;
const FALLBACK_SHININESS: f32 = 100.0;
/// Box used when a model fails to load.
const FALLBACK_SIZE: [f32; 3] = [1.5, 0.8, 3.0];
/// Box used when no loader exists for the model format.
const NO_LOADER_SIZE: [f32; 3] = [1.0, 0.5, 2.0];
const DEFAULT_SCALE: f32 = 2.0;

/// A satellite the scene can show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteDescriptor {
    pub id: String,
    pub name: String,
    /// Model asset path, e.g. `/models/satellite.glb`.
    pub model: String,
    pub position: [f32; 3],
    pub description: String,
}

impl SatelliteDescriptor {
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }
}

pub fn default_catalogue() -> Vec<SatelliteDescriptor> {
    let entry = |id: &str, name: &str, model: &str, description: &str| SatelliteDescriptor {
        id: id.into(),
        name: name.into(),
        model: model.into(),
        position: [0.0, 0.0, 0.0],
        description: description.into(),
    };
    vec![
        entry(
            "satellite-1",
            "Gaofen-1",
            "/models/satellite.glb",
            "High-resolution optical remote sensing satellite for land resource surveys and environmental monitoring.",
        ),
        entry(
            "satellite-2",
            "Gaofen-2",
            "/models/0.75m.glb",
            "Sub-metre optical imaging satellite with high resolution and wide coverage.",
        ),
        entry(
            "satellite-3",
            "Gaofen-3",
            "/models/base_satellite.glb",
            "C-band synthetic aperture radar satellite for all-weather, day-and-night observation.",
        ),
        entry(
            "satellite-4",
            "BeiDou",
            "/models/base_satellite_demo01.glb",
            "Navigation satellite of the BeiDou system providing global positioning.",
        ),
        entry(
            "satellite-5",
            "Fengyun",
            "/models/base_satellite_low.glb",
            "Meteorological satellite for weather forecasting and climate monitoring.",
        ),
    ]
}

/// Model scale by satellite id.
pub fn scale_for(id: &str) -> f32 {
    match id {
        "satellite-1" => 3.0,
        "satellite-2" => 1.0,
        "satellite-3" => 3.0,
        "satellite-4" => 2.5,
        "satellite-5" => 3.5,
        _ => DEFAULT_SCALE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatelliteState {
    Loading,
    Loaded,
    Fallback,
}

struct Slot {
    descriptor: SatelliteDescriptor,
    state: SatelliteState,
    pending: Option<PendingLoad<ModelData>>,
}

/// The currently shown batch of satellites.
pub struct SatelliteLayer {
    on_click: Option<ClickCallback>,
    token: Liveness,
    slots: Vec<Slot>,
}

impl SatelliteLayer {
    pub fn new(on_click: Option<ClickCallback>) -> Self {
        Self {
            on_click,
            token: Liveness::new(),
            slots: Vec::new(),
        }
    }

    /// Replace the current batch with `satellites` and start their model loads.
    pub fn load(&mut self, ctx: &mut SceneContext, satellites: &[SatelliteDescriptor]) {
        self.clear(ctx);
        if satellites.is_empty() {
            return;
        }
        log::info!("Satellite: loading {} models", satellites.len());
        self.token = Liveness::new();
        add_batch_lights(ctx);

        for descriptor in satellites {
            let mut slot = Slot {
                descriptor: descriptor.clone(),
                state: SatelliteState::Loading,
                pending: None,
            };
            if is_supported_model(&descriptor.model) {
                slot.pending = Some(ctx.resources.load_model(&descriptor.model, self.token.clone()));
            } else {
                log::error!("Satellite {}: no loader for {}", descriptor.id, descriptor.model);
                slot.state = self.attach_fallback(ctx, descriptor, NO_LOADER_SIZE);
            }
            self.slots.push(slot);
        }
    }

    /// Attach models whose loads finished. Returns true once nothing is loading.
    pub fn poll(&mut self, ctx: &mut SceneContext) -> bool {
        for i in 0..self.slots.len() {
            let Some(pending) = self.slots[i].pending.as_mut() else {
                continue;
            };
            let status = pending.poll();
            let descriptor = self.slots[i].descriptor.clone();
            let state = match status {
                LoadStatus::Pending => continue,
                LoadStatus::Ready(Ok(model)) => match self.attach_model(ctx, &descriptor, &model) {
                    Ok(()) => SatelliteState::Loaded,
                    Err(e) => {
                        log::error!("Satellite {}: could not build model: {}", descriptor.id, e);
                        self.attach_fallback(ctx, &descriptor, FALLBACK_SIZE)
                    }
                },
                LoadStatus::Ready(Err(LoadError::Cancelled(_))) | LoadStatus::Taken => {
                    self.slots[i].pending = None;
                    continue;
                }
                LoadStatus::Ready(Err(e)) => {
                    log::error!("Satellite {}: load failed, using fallback box: {}", descriptor.id, e);
                    self.attach_fallback(ctx, &descriptor, FALLBACK_SIZE)
                }
            };
            self.slots[i].pending = None;
            self.slots[i].state = state;
        }
        self.is_settled()
    }

    pub fn is_settled(&self) -> bool {
        self.slots.iter().all(|s| s.state != SatelliteState::Loading)
    }

    pub fn state(&self, id: &str) -> Option<SatelliteState> {
        self.slots.iter().find(|s| s.descriptor.id == id).map(|s| s.state)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.descriptor.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn attach_model(
        &self,
        ctx: &mut SceneContext,
        descriptor: &SatelliteDescriptor,
        model: &ModelData,
    ) -> Result<(), RenderError> {
        let (graph, backend, resources) = ctx.parts();
        let root = model.instantiate(graph, backend, &format!("satellite-{}", descriptor.id))?;
        let scale = scale_for(&descriptor.id);
        if let Some(transform) = graph.transform_mut(root) {
            *transform = Transform::from_position(descriptor.position()).with_uniform_scale(scale);
        }
        self.tag(graph, root, &descriptor.id);
        resources.entities.register(
            graph,
            backend,
            RegisteredEntity::owning_subtree(descriptor.id.clone(), EntityKind::Satellite, root),
        );
        log::info!(
            "Satellite {}: model attached at {:?} (scale {}, {} triangles)",
            descriptor.id,
            descriptor.position,
            scale,
            model.triangle_count()
        );
        Ok(())
    }

    fn attach_fallback(&self, ctx: &mut SceneContext, descriptor: &SatelliteDescriptor, size: [f32; 3]) -> SatelliteState {
        let (graph, backend, resources) = ctx.parts();
        match build_fallback_box(graph, backend, descriptor, size) {
            Ok(node) => {
                self.tag(graph, node, &descriptor.id);
                resources.entities.register(
                    graph,
                    backend,
                    RegisteredEntity::owning_subtree(descriptor.id.clone(), EntityKind::Satellite, node),
                );
                log::info!("Satellite {}: fallback box attached at {:?}", descriptor.id, descriptor.position);
            }
            Err(e) => log::error!("Satellite {}: fallback box failed: {}", descriptor.id, e),
        }
        SatelliteState::Fallback
    }

    /// Tag the root and every mesh below it.
    fn tag(&self, graph: &mut SceneGraph, root: Entity, id: &str) {
        let target = ClickTarget::new(id, self.on_click.clone());
        for node in graph.descendants(root) {
            if node == root || graph.get::<MeshInstance>(node).is_some() {
                graph.insert(node, target.clone());
            }
        }
    }

    /// Drop pending loads and remove every satellite and the batch lights.
    pub fn clear(&mut self, ctx: &mut SceneContext) {
        self.token.revoke();
        if self.slots.is_empty() {
            return;
        }
        let (graph, backend, resources) = ctx.parts();
        for slot in self.slots.drain(..) {
            resources.entities.remove(graph, backend, &slot.descriptor.id);
        }
        resources.entities.remove(graph, backend, SATELLITE_LIGHTS_ID);
        log::info!("Satellite: batch cleared");
    }
}

fn build_fallback_box(
    graph: &mut SceneGraph,
    backend: &mut dyn RenderBackend,
    descriptor: &SatelliteDescriptor,
    [width, height, depth]: [f32; 3],
) -> Result<Entity, RenderError> {
    let mesh = MeshData::cuboid(width, height, depth);
    let (center, radius) = mesh.bounding_sphere();
    let label = format!("satellite-{}-fallback", descriptor.id);
    let material = backend.create_material(
        &Material::Phong(PhongMaterial {
            color: hex_color(FALLBACK_COLOR),
            shininess: FALLBACK_SHININESS,
            ..PhongMaterial::default()
        }),
        &label,
    )?;
    let geometry = match backend.create_geometry(&Geometry::Mesh(mesh), &label) {
        Ok(geometry) => geometry,
        Err(e) => {
            backend.dispose_material(material);
            return Err(e);
        }
    };
    let node = graph.spawn_mesh(
        label,
        Transform::from_position(descriptor.position()),
        MeshInstance::new(geometry, material),
    );
    graph.insert(node, Bounds { center, radius });
    Ok(node)
}

fn add_batch_lights(ctx: &mut SceneContext) {
    let (graph, backend, resources) = ctx.parts();
    let group = graph.spawn(SATELLITE_LIGHTS_ID, Transform::default());
    let key = graph.spawn_light(
        "satellite-key",
        Transform::from_position(Vec3::new(5.0, 5.0, 5.0)),
        Light::directional(Vec3::ONE, 1.0),
    );
    let ambient = graph.spawn_light(
        "satellite-ambient",
        Transform::default(),
        Light::ambient(hex_color(0x404040), 0.6),
    );
    graph.add_child(group, key);
    graph.add_child(group, ambient);
    resources
        .entities
        .register(graph, backend, RegisteredEntity::owning_subtree(SATELLITE_LIGHTS_ID, EntityKind::Light, group));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetSource, MemorySource};
    use crate::config::SceneConfig;
    use crate::testing::gltf_bytes;
    use renderer::{HeadlessBackend, HeadlessProbe, Viewport};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn context(source: impl AssetSource + 'static) -> (SceneContext, HeadlessProbe) {
        let backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        let probe = backend.probe();
        let ctx = SceneContext::new(Box::new(backend), &SceneConfig::default(), Arc::new(source));
        (ctx, probe)
    }

    fn descriptor(id: &str, model: &str, position: [f32; 3]) -> SatelliteDescriptor {
        SatelliteDescriptor {
            id: id.into(),
            name: id.into(),
            model: model.into(),
            position,
            description: String::new(),
        }
    }

    fn settle(layer: &mut SatelliteLayer, ctx: &mut SceneContext) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !layer.poll(ctx) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn click_ids(ctx: &SceneContext, root: Entity) -> Vec<String> {
        ctx.graph
            .descendants(root)
            .into_iter()
            .filter_map(|n| ctx.graph.get::<ClickTarget>(n))
            .map(|t| t.satellite_id)
            .collect()
    }

    #[test]
    fn scale_table() {
        assert_eq!(scale_for("satellite-1"), 3.0);
        assert_eq!(scale_for("satellite-2"), 1.0);
        assert_eq!(scale_for("satellite-4"), 2.5);
        assert_eq!(scale_for("satellite-5"), 3.5);
        assert_eq!(scale_for("unknown"), 2.0);
        assert_eq!(default_catalogue().len(), 5);
    }

    #[test]
    fn loaded_model_is_scaled_positioned_and_tagged() {
        let source = MemorySource::new().with("/models/satellite.glb", gltf_bytes());
        let (mut ctx, _) = context(source);
        let mut layer = SatelliteLayer::new(None);
        layer.load(&mut ctx, &[descriptor("satellite-1", "/models/satellite.glb", [1.0, 2.0, 3.0])]);
        settle(&mut layer, &mut ctx);

        assert_eq!(layer.state("satellite-1"), Some(SatelliteState::Loaded));
        let root = ctx.resources.entities.get("satellite-1").unwrap().object;
        assert_eq!(ctx.graph.name(root).as_deref(), Some("satellite-satellite-1"));
        let transform = ctx.graph.transform(root).unwrap();
        assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.scale, Vec3::splat(3.0));
        // root plus two mesh parts
        assert_eq!(click_ids(&ctx, root), vec!["satellite-1"; 3]);
        assert!(ctx.resources.entities.has(SATELLITE_LIGHTS_ID));
    }

    #[test]
    fn failed_load_leaves_a_fallback_with_the_same_id_and_position() {
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let on_click: ClickCallback = {
            let clicks = Arc::clone(&clicks);
            Arc::new(move |id: &str| clicks.lock().unwrap().push(id.to_string()))
        };
        let (mut ctx, probe) = context(MemorySource::new());
        let mut layer = SatelliteLayer::new(Some(on_click));
        layer.load(&mut ctx, &[descriptor("satellite-3", "/models/missing.glb", [0.5, 0.0, -1.0])]);
        settle(&mut layer, &mut ctx);

        assert_eq!(layer.state("satellite-3"), Some(SatelliteState::Fallback));
        let node = ctx.resources.entities.get("satellite-3").unwrap().object;
        assert_eq!(ctx.graph.name(node).as_deref(), Some("satellite-satellite-3-fallback"));
        assert_eq!(ctx.graph.transform(node).unwrap().position, Vec3::new(0.5, 0.0, -1.0));
        assert_eq!(ctx.graph.transform(node).unwrap().scale, Vec3::ONE);

        let target = ctx.graph.get::<ClickTarget>(node).unwrap();
        target.click();
        assert_eq!(*clicks.lock().unwrap(), vec!["satellite-3".to_string()]);

        let mesh = ctx.graph.get::<MeshInstance>(node).unwrap();
        let Some(Material::Phong(material)) = probe.material(mesh.material) else {
            panic!("fallback is not phong");
        };
        assert_eq!(material.shininess, 100.0);
        assert!((ctx.graph.get::<Bounds>(node).unwrap().radius - Vec3::new(0.75, 0.4, 1.5).length()).abs() < 1e-5);
    }

    #[test]
    fn unsupported_format_gets_the_small_box_immediately() {
        let (mut ctx, _) = context(MemorySource::new());
        let mut layer = SatelliteLayer::new(None);
        layer.load(&mut ctx, &[descriptor("satellite-2", "/models/satellite.obj", [0.0; 3])]);
        assert!(layer.is_settled());
        assert_eq!(layer.state("satellite-2"), Some(SatelliteState::Fallback));
        let node = ctx.resources.entities.get("satellite-2").unwrap().object;
        let radius = ctx.graph.get::<Bounds>(node).unwrap().radius;
        assert!((radius - Vec3::new(0.5, 0.25, 1.0).length()).abs() < 1e-5);
    }

    #[test]
    fn clear_releases_models_fallbacks_and_lights() {
        let source = MemorySource::new().with("/models/satellite.glb", gltf_bytes());
        let (mut ctx, probe) = context(source);
        let mut layer = SatelliteLayer::new(None);
        layer.load(
            &mut ctx,
            &[
                descriptor("satellite-1", "/models/satellite.glb", [0.0; 3]),
                descriptor("satellite-5", "/models/missing.glb", [2.0, 0.0, 0.0]),
            ],
        );
        settle(&mut layer, &mut ctx);
        assert_eq!(ctx.resources.entities.len(), 3);
        assert!(probe.live_resources() > 0);

        layer.clear(&mut ctx);
        assert!(layer.is_empty());
        assert!(ctx.resources.entities.is_empty());
        assert_eq!(probe.live_resources(), 0);
        assert!(ctx.graph.children(ctx.graph.root()).is_empty());
    }

    #[test]
    fn clearing_mid_load_discards_the_late_model() {
        let source = MemorySource::new().with("/models/satellite.glb", gltf_bytes());
        let (mut ctx, probe) = context(source);
        let mut layer = SatelliteLayer::new(None);
        layer.load(&mut ctx, &[descriptor("satellite-1", "/models/satellite.glb", [0.0; 3])]);
        layer.clear(&mut ctx);
        std::thread::sleep(Duration::from_millis(50));
        assert!(layer.poll(&mut ctx));
        assert!(ctx.resources.entities.is_empty());
        assert_eq!(probe.live_resources(), 0);
    }
}
