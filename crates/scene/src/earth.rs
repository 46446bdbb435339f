//! The planet: a textured body, an optional cloud shell, a fresnel atmosphere and
//! its own light rig, all under one group that spins at a fixed angular rate.

use crate::config::PlanetConfig;
use crate::context::SceneContext;
use crate::entity::{dispose_subtree, EntityKind, RegisteredEntity};
use crate::error::LoadError;
use crate::loader::{LoadStatus, Liveness, PendingLoad};
use crate::resources::{ResourceManager, UpdateId};
use engine_core::{
    hex_color, Entity, GeometryId, Light, MaterialId, MeshInstance, OwnedTextures, SceneGraph, TextureId, Transform, Vec3,
};
use renderer::{
    AtmosphereMaterial, Geometry, Material, MeshData, PhongMaterial, RenderBackend, RenderError, TextureImage,
};
use std::cell::Cell;
use std::rc::Rc;

/// Registry id of the planet entity.
pub const EARTH_ENTITY_ID: &str = "earth";

const BUMP_SCALE: f32 = 0.1;
const SHININESS: f32 = 25.0;
const EMISSIVE_INTENSITY: f32 = 3.5;
const CLOUDS_OPACITY: f32 = 0.4;
const ATMOSPHERE: AtmosphereMaterial = AtmosphereMaterial {
    opacity: 0.4,
    pow_factor: 4.1,
    multiplier: 9.5,
};
const FALLBACK_COLOR: u32 = 0x4a90e2;
const FALLBACK_SHININESS: f32 = 30.0;

/// The five texture channels of the planet material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureChannel {
    Albedo,
    NightLights,
    Bump,
    /// Ocean mask used as the specular map.
    Ocean,
    Clouds,
}

impl TextureChannel {
    pub const ALL: [TextureChannel; 5] = [
        TextureChannel::Albedo,
        TextureChannel::NightLights,
        TextureChannel::Bump,
        TextureChannel::Ocean,
        TextureChannel::Clouds,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn path(self, config: &PlanetConfig) -> &str {
        let textures = &config.textures;
        match self {
            TextureChannel::Albedo => &textures.albedo,
            TextureChannel::NightLights => &textures.night_lights,
            TextureChannel::Bump => &textures.bump,
            TextureChannel::Ocean => &textures.ocean,
            TextureChannel::Clouds => &textures.clouds,
        }
    }
}

/// Planet load state. Moves forward only, back to `Idle` on unmount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarthState {
    Idle,
    Loading,
    Loaded,
    /// Every texture channel failed; a flat-coloured planet is shown instead.
    Degraded,
    /// Not even the fallback could be built.
    Failed,
}

/// Frame-rate independent rotation: the angle is proportional to elapsed time,
/// and updates closer together than `frame_limit_ms` are skipped while the
/// elapsed time keeps accumulating.
#[derive(Debug, Clone)]
pub struct Spin {
    speed: f32,
    frame_limit_ms: f64,
    last: Option<f64>,
}

impl Spin {
    /// `speed` is in radians per millisecond.
    pub fn new(speed: f32, frame_limit_ms: f64) -> Self {
        Self {
            speed,
            frame_limit_ms,
            last: None,
        }
    }

    /// Angle to rotate by at `now_ms`. The first call only starts the clock.
    pub fn advance(&mut self, now_ms: f64) -> Option<f32> {
        let Some(last) = self.last else {
            self.last = Some(now_ms);
            return None;
        };
        let delta = now_ms - last;
        if delta < self.frame_limit_ms {
            return None;
        }
        self.last = Some(now_ms);
        Some((delta * self.speed as f64) as f32)
    }
}

pub struct Earth {
    config: PlanetConfig,
    state: EarthState,
    token: Liveness,
    group: Option<Entity>,
    /// Body sphere created at mount, until a mesh takes it. Shared with the
    /// registry entry so disposal releases it even mid-load.
    body_geometry: Rc<Cell<Option<GeometryId>>>,
    pending: Vec<(TextureChannel, PendingLoad<TextureImage>)>,
    images: [Option<TextureImage>; 5],
    settled: usize,
    rotation: Option<UpdateId>,
    rotating: bool,
    hidden: bool,
}

impl Earth {
    pub fn new(config: PlanetConfig) -> Self {
        Self {
            config,
            state: EarthState::Idle,
            token: Liveness::new(),
            group: None,
            body_geometry: Rc::new(Cell::new(None)),
            pending: Vec::new(),
            images: Default::default(),
            settled: 0,
            rotation: None,
            rotating: true,
            hidden: false,
        }
    }

    pub fn state(&self) -> EarthState {
        self.state
    }

    pub fn group(&self) -> Option<Entity> {
        self.group
    }

    pub fn radius(&self) -> f32 {
        self.config.radius
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    /// Load progress in percent: settled channels out of five.
    pub fn progress(&self) -> f32 {
        match self.state {
            EarthState::Idle => 0.0,
            EarthState::Loading => self.settled as f32 / TextureChannel::ALL.len() as f32 * 100.0,
            _ => 100.0,
        }
    }

    /// Build the group and body geometry and start the texture loads.
    pub fn mount(&mut self, ctx: &mut SceneContext) {
        if self.state != EarthState::Idle {
            self.unmount(ctx);
        }
        log::info!("Earth: loading (radius {})", self.config.radius);
        ctx.set_loaded(false);
        self.rotating = ctx.is_rotating();
        self.state = EarthState::Loading;
        self.token = Liveness::new();
        self.settled = 0;
        self.images = Default::default();

        let (graph, backend, resources) = ctx.parts();
        let group = graph.spawn("earth-group", Transform::from_euler(0.0, 0.0, 0.0));
        let body = Rc::clone(&self.body_geometry);
        let token = self.token.clone();
        let entry = RegisteredEntity::new(
            EARTH_ENTITY_ID,
            EntityKind::Earth,
            group,
            move |graph: &mut SceneGraph, backend: &mut dyn RenderBackend| {
                token.revoke();
                if let Some(id) = body.take() {
                    backend.dispose_geometry(id);
                }
                dispose_subtree(graph, backend, group);
            },
        );
        resources.entities.register(graph, backend, entry);
        graph.set_visible(group, !self.hidden);
        self.group = Some(group);

        let segments = self.config.segments;
        match backend.create_geometry(
            &Geometry::Mesh(MeshData::sphere(self.config.radius, segments, segments)),
            "earth-body",
        ) {
            Ok(id) => self.body_geometry.set(Some(id)),
            Err(e) => {
                log::error!("Earth: could not create body geometry: {}", e);
                self.state = EarthState::Failed;
                return;
            }
        }

        for channel in TextureChannel::ALL {
            let pending = resources.load_texture(channel.path(&self.config), self.token.clone());
            self.pending.push((channel, pending));
        }

        if self.rotating {
            self.start_rotation(ctx);
        }
    }

    /// Collect finished texture loads; build the planet once all five settled.
    pub fn poll(&mut self, ctx: &mut SceneContext) -> EarthState {
        if self.state != EarthState::Loading {
            return self.state;
        }
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for (channel, mut load) in self.pending.drain(..) {
            match load.poll() {
                LoadStatus::Pending => still_pending.push((channel, load)),
                LoadStatus::Ready(Ok(image)) => {
                    self.images[channel.index()] = Some(image);
                    self.settled += 1;
                }
                LoadStatus::Ready(Err(LoadError::Cancelled(_))) | LoadStatus::Taken => {}
                LoadStatus::Ready(Err(e)) => {
                    log::warn!("Earth: {:?} channel unavailable: {}", channel, e);
                    self.settled += 1;
                }
            }
        }
        self.pending = still_pending;
        if self.pending.is_empty() {
            self.finish(ctx);
        }
        self.state
    }

    fn finish(&mut self, ctx: &mut SceneContext) {
        let Some(group) = self.group else {
            return;
        };
        let images = std::mem::take(&mut self.images);
        let any_texture = images.iter().any(Option::is_some);
        let (graph, backend, resources) = ctx.parts();

        if any_texture {
            let textures = upload_channels(backend, resources, &images);
            match self.build_textured(graph, backend, group, textures) {
                Ok(()) => {
                    self.state = EarthState::Loaded;
                    log::info!("Earth: loaded");
                }
                Err(e) => {
                    log::error!("Earth: textured build failed, using fallback: {}", e);
                    clear_children(graph, backend, group);
                    self.build_fallback_or_fail(graph, backend, group);
                }
            }
        } else {
            log::warn!("Earth: every texture channel failed, using fallback");
            self.build_fallback_or_fail(graph, backend, group);
        }
        ctx.set_loaded(self.state != EarthState::Failed);
    }

    fn build_fallback_or_fail(&mut self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend, group: Entity) {
        match self.build_fallback(graph, backend, group) {
            Ok(()) => self.state = EarthState::Degraded,
            Err(e) => {
                log::error!("Earth: fallback failed: {}", e);
                self.state = EarthState::Failed;
            }
        }
    }

    fn take_body_geometry(&mut self, backend: &mut dyn RenderBackend) -> Result<GeometryId, RenderError> {
        match self.body_geometry.take() {
            Some(id) => Ok(id),
            None => {
                let segments = self.config.segments;
                backend.create_geometry(
                    &Geometry::Mesh(MeshData::sphere(self.config.radius, segments, segments)),
                    "earth-body",
                )
            }
        }
    }

    fn build_textured(
        &mut self,
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        group: Entity,
        textures: ChannelTextures,
    ) -> Result<(), RenderError> {
        let uploaded: Vec<_> = [textures.albedo, textures.night, textures.bump, textures.ocean, textures.clouds]
            .into_iter()
            .flatten()
            .collect();
        // Attach ownership first so a failure below still releases the uploads.
        let holder = graph.spawn("earth-textures", Transform::default());
        graph.insert(holder, OwnedTextures(uploaded));
        graph.add_child(group, holder);

        let material = backend.create_material(
            &Material::Phong(PhongMaterial {
                color: hex_color(0xf0f8ff),
                map: textures.albedo,
                bump_map: textures.bump,
                bump_scale: BUMP_SCALE,
                specular_map: textures.ocean,
                specular: hex_color(0x2266aa),
                shininess: SHININESS,
                emissive: if textures.night.is_some() { hex_color(0xffac00) } else { Vec3::ZERO },
                emissive_map: textures.night,
                emissive_intensity: EMISSIVE_INTENSITY,
                ..PhongMaterial::default()
            }),
            "earth-body",
        )?;
        let geometry = match self.take_body_geometry(backend) {
            Ok(geometry) => geometry,
            Err(e) => {
                backend.dispose_material(material);
                return Err(e);
            }
        };
        spawn_child_mesh(
            graph,
            group,
            "earth-mesh",
            MeshInstance::new(geometry, material).with_render_order(1),
        );

        let segments = self.config.segments;
        if let Some(clouds) = textures.clouds {
            let material = backend.create_material(
                &Material::Phong(PhongMaterial {
                    map: Some(clouds),
                    transparent: true,
                    opacity: CLOUDS_OPACITY,
                    ..PhongMaterial::default()
                }),
                "clouds",
            )?;
            let geometry = create_or_release(
                backend,
                material,
                MeshData::sphere(self.config.radius + self.config.cloud_offset, segments, segments),
                "clouds",
            )?;
            spawn_child_mesh(graph, group, "clouds-mesh", MeshInstance::new(geometry, material));
        }

        let material = backend.create_material(&Material::Atmosphere(ATMOSPHERE), "atmosphere")?;
        let geometry = create_or_release(
            backend,
            material,
            MeshData::sphere(self.config.radius + self.config.atmosphere_offset, segments, segments),
            "atmosphere",
        )?;
        spawn_child_mesh(graph, group, "atmosphere-mesh", MeshInstance::new(geometry, material));

        add_lights(graph, group, &full_light_rig());
        Ok(())
    }

    fn build_fallback(
        &mut self,
        graph: &mut SceneGraph,
        backend: &mut dyn RenderBackend,
        group: Entity,
    ) -> Result<(), RenderError> {
        let material = backend.create_material(
            &Material::Phong(PhongMaterial {
                color: hex_color(FALLBACK_COLOR),
                shininess: FALLBACK_SHININESS,
                ..PhongMaterial::default()
            }),
            "earth-fallback",
        )?;
        let geometry = match self.take_body_geometry(backend) {
            Ok(geometry) => geometry,
            Err(e) => {
                backend.dispose_material(material);
                return Err(e);
            }
        };
        spawn_child_mesh(graph, group, "earth-mesh-fallback", MeshInstance::new(geometry, material));
        add_lights(graph, group, &fallback_light_rig());
        Ok(())
    }

    /// Hide or show the planet without touching its resources.
    pub fn set_hidden(&mut self, ctx: &mut SceneContext, hidden: bool) {
        self.hidden = hidden;
        if let Some(group) = self.group {
            ctx.graph.set_visible(group, !hidden);
            log::info!("Earth: {}", if hidden { "hidden" } else { "shown" });
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Pause or resume rotation by unregistering or re-registering the update function.
    pub fn set_rotating(&mut self, ctx: &mut SceneContext, rotating: bool) {
        self.rotating = rotating;
        ctx.set_rotating(rotating);
        if rotating {
            if self.rotation.is_none() && self.group.is_some() {
                self.start_rotation(ctx);
            }
        } else if let Some(id) = self.rotation.take() {
            ctx.resources.unregister_update_function(id);
        }
    }

    /// Rebuild the planet at a new radius.
    pub fn set_radius(&mut self, ctx: &mut SceneContext, radius: f32) {
        if (radius - self.config.radius).abs() <= f32::EPSILON {
            return;
        }
        self.config.radius = radius;
        if self.state != EarthState::Idle {
            self.mount(ctx);
        }
    }

    fn start_rotation(&mut self, ctx: &mut SceneContext) {
        let Some(group) = self.group else {
            return;
        };
        let axis = Vec3::from(self.config.rotation_axis).normalize_or_zero();
        let mut spin = Spin::new(self.config.rotation_speed, self.config.frame_limit_ms);
        let id = ctx.resources.register_update_function(move |now, graph: &mut SceneGraph| {
            if let Some(angle) = spin.advance(now) {
                if let Some(transform) = graph.transform_mut(group) {
                    transform.rotate_on_axis(axis, angle);
                }
            }
            Ok(())
        });
        self.rotation = Some(id);
    }

    /// Stop loads, unregister rotation and release every resource.
    pub fn unmount(&mut self, ctx: &mut SceneContext) {
        self.token.revoke();
        self.pending.clear();
        self.images = Default::default();
        if let Some(id) = self.rotation.take() {
            ctx.resources.unregister_update_function(id);
        }
        let (graph, backend, resources) = ctx.parts();
        resources.entities.remove(graph, backend, EARTH_ENTITY_ID);
        self.group = None;
        self.state = EarthState::Idle;
        log::info!("Earth: unmounted");
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelTextures {
    albedo: Option<TextureId>,
    night: Option<TextureId>,
    bump: Option<TextureId>,
    ocean: Option<TextureId>,
    clouds: Option<TextureId>,
}

fn upload_channels(
    backend: &mut dyn RenderBackend,
    resources: &ResourceManager,
    images: &[Option<TextureImage>; 5],
) -> ChannelTextures {
    let mut upload = |channel: TextureChannel| {
        let image = images[channel.index()].as_ref()?;
        match resources.upload_texture(backend, image, &format!("earth-{:?}", channel).to_lowercase()) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Earth: could not upload {:?}: {}", channel, e);
                None
            }
        }
    };
    ChannelTextures {
        albedo: upload(TextureChannel::Albedo),
        night: upload(TextureChannel::NightLights),
        bump: upload(TextureChannel::Bump),
        ocean: upload(TextureChannel::Ocean),
        clouds: upload(TextureChannel::Clouds),
    }
}

fn create_or_release(
    backend: &mut dyn RenderBackend,
    material: MaterialId,
    mesh: MeshData,
    label: &str,
) -> Result<GeometryId, RenderError> {
    backend.create_geometry(&Geometry::Mesh(mesh), label).inspect_err(|_| {
        backend.dispose_material(material);
    })
}

fn spawn_child_mesh(graph: &mut SceneGraph, parent: Entity, name: &str, mesh: MeshInstance) -> Entity {
    let node = graph.spawn_mesh(name, Transform::default(), mesh);
    graph.add_child(parent, node);
    node
}

fn clear_children(graph: &mut SceneGraph, backend: &mut dyn RenderBackend, group: Entity) {
    for child in graph.children(group) {
        dispose_subtree(graph, backend, child);
    }
}

/// (name, light, position)
type LightRig = Vec<(&'static str, Light, Vec3)>;

fn full_light_rig() -> LightRig {
    vec![
        ("earth-ambient", Light::ambient(hex_color(0x606060), 1.5), Vec3::ZERO),
        ("earth-fill", Light::ambient(hex_color(0x404040), 0.4), Vec3::ZERO),
        ("earth-key", Light::directional(Vec3::ONE, 0.8), Vec3::new(0.0, 0.0, 5.0)),
        ("earth-side-right", Light::directional(hex_color(0x404040), 0.6), Vec3::new(5.0, 0.0, 0.0)),
        ("earth-side-left", Light::directional(hex_color(0x404040), 0.4), Vec3::new(-5.0, 0.0, 0.0)),
        ("earth-point", Light::point(Vec3::ONE, 0.5, 10.0), Vec3::new(0.0, 0.0, 3.0)),
    ]
}

fn fallback_light_rig() -> LightRig {
    vec![
        ("earth-ambient", Light::ambient(hex_color(0x606060), 0.6), Vec3::ZERO),
        ("earth-key", Light::directional(Vec3::ONE, 0.8), Vec3::new(5.0, 3.0, 5.0)),
    ]
}

fn add_lights(graph: &mut SceneGraph, group: Entity, rig: &LightRig) {
    for (name, light, position) in rig {
        let node = graph.spawn_light(*name, Transform::from_position(*position), *light);
        graph.add_child(group, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetSource, MemorySource};
    use crate::config::{SceneConfig, TextureLoadConfig};
    use crate::testing::png_bytes;
    use renderer::{HeadlessBackend, HeadlessProbe, Viewport};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn fast_config() -> SceneConfig {
        SceneConfig {
            textures: TextureLoadConfig {
                max_retries: 1,
                backoff_ms: 1,
                timeout_ms: 500,
                anisotropy: 4,
            },
            ..SceneConfig::default()
        }
    }

    fn context(source: impl AssetSource + 'static) -> (SceneContext, HeadlessProbe) {
        let backend = HeadlessBackend::new(Viewport::with_panel(800, 600, 380));
        let probe = backend.probe();
        let ctx = SceneContext::new(Box::new(backend), &fast_config(), Arc::new(source));
        (ctx, probe)
    }

    fn all_textures() -> MemorySource {
        let textures = PlanetConfig::default().textures;
        let source = MemorySource::new();
        for path in [textures.albedo, textures.night_lights, textures.bump, textures.ocean, textures.clouds] {
            source.insert(path, png_bytes());
        }
        source
    }

    fn settle(earth: &mut Earth, ctx: &mut SceneContext) -> EarthState {
        let deadline = Instant::now() + Duration::from_secs(5);
        while earth.poll(ctx) == EarthState::Loading && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        earth.state()
    }

    fn child_names(ctx: &SceneContext, group: Entity) -> Vec<String> {
        ctx.graph
            .children(group)
            .into_iter()
            .filter_map(|c| ctx.graph.name(c))
            .collect()
    }

    #[test]
    fn spin_is_frame_rate_independent() {
        let mut many = Spin::new(0.000_01, 16.0);
        let mut one = Spin::new(0.000_01, 16.0);
        many.advance(0.0);
        one.advance(0.0);
        let small: f32 = (1..=10).filter_map(|i| many.advance(16.0 * i as f64)).sum();
        let big = one.advance(160.0).unwrap();
        assert!((small - big).abs() < 1e-7);
        assert!((big - 0.0016).abs() < 1e-7);
    }

    #[test]
    fn spin_coalesces_without_losing_time() {
        let mut spin = Spin::new(1.0, 16.0);
        spin.advance(0.0);
        assert_eq!(spin.advance(10.0), None);
        assert_eq!(spin.advance(20.0), Some(20.0));
    }

    #[test]
    fn full_load_builds_body_clouds_atmosphere_and_lights() {
        let (mut ctx, probe) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        assert_eq!(earth.state(), EarthState::Loading);
        assert!(!ctx.is_loaded());
        assert_eq!(settle(&mut earth, &mut ctx), EarthState::Loaded);
        assert!(ctx.is_loaded());
        assert_eq!(earth.progress(), 100.0);

        let names = child_names(&ctx, earth.group().unwrap());
        for expected in ["earth-mesh", "clouds-mesh", "atmosphere-mesh", "earth-point"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        let earths = ctx.resources.entities.get_by_type(&EntityKind::Earth);
        assert_eq!(earths.len(), 1);
        assert_eq!(probe.info().textures, 5);

        ctx.tick(0.0);
        let frame = probe.last_frame().unwrap();
        assert_eq!(frame.draws.len(), 3);
        assert_eq!(frame.lights.len(), 6);
    }

    #[test]
    fn colour_textures_are_srgb_and_data_textures_linear() {
        let (mut ctx, probe) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        settle(&mut earth, &mut ctx);
        let body = ctx.graph.find_by_name("earth-mesh").unwrap();
        let mesh = ctx.graph.get::<MeshInstance>(body).unwrap();
        let Some(Material::Phong(material)) = probe.material(mesh.material) else {
            panic!("body is not phong");
        };
        assert_eq!(probe.texture_is_srgb(material.map.unwrap()), Some(true));
        assert_eq!(probe.texture_is_srgb(material.emissive_map.unwrap()), Some(true));
        assert_eq!(probe.texture_is_srgb(material.bump_map.unwrap()), Some(false));
        assert_eq!(probe.texture_options(material.map.unwrap()).unwrap().anisotropy, 4);
    }

    #[test]
    fn missing_clouds_only_drops_the_cloud_layer() {
        let textures = PlanetConfig::default().textures;
        let source = MemorySource::new();
        for path in [textures.albedo, textures.night_lights, textures.bump, textures.ocean] {
            source.insert(path, png_bytes());
        }
        let (mut ctx, _) = context(source);
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        assert_eq!(settle(&mut earth, &mut ctx), EarthState::Loaded);
        let names = child_names(&ctx, earth.group().unwrap());
        assert!(names.iter().any(|n| n == "earth-mesh"));
        assert!(!names.iter().any(|n| n == "clouds-mesh"));
    }

    #[test]
    fn exhausted_retries_degrade_to_flat_planet() {
        let (mut ctx, probe) = context(MemorySource::new());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        assert_eq!(settle(&mut earth, &mut ctx), EarthState::Degraded);
        assert!(ctx.is_loaded());
        let group = earth.group().unwrap();
        let names = child_names(&ctx, group);
        assert!(names.iter().any(|n| n == "earth-mesh-fallback"));
        assert!(!names.iter().any(|n| n == "clouds-mesh"));

        let fallback = ctx.graph.find_by_name("earth-mesh-fallback").unwrap();
        let mesh = ctx.graph.get::<MeshInstance>(fallback).unwrap();
        let Some(Material::Phong(material)) = probe.material(mesh.material) else {
            panic!("fallback is not phong");
        };
        assert_eq!(material.color, hex_color(FALLBACK_COLOR));
        assert!(material.map.is_none());
    }

    #[test]
    fn visibility_toggle_does_not_reload() {
        let (mut ctx, probe) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        settle(&mut earth, &mut ctx);
        let geometries = probe.info().geometries;
        earth.set_hidden(&mut ctx, true);
        assert_eq!(earth.poll(&mut ctx), EarthState::Loaded);
        ctx.tick(0.0);
        assert!(probe.last_frame().unwrap().draws.is_empty());
        earth.set_hidden(&mut ctx, false);
        ctx.tick(100.0);
        assert_eq!(probe.last_frame().unwrap().draws.len(), 3);
        assert_eq!(probe.info().geometries, geometries);
    }

    #[test]
    fn rotation_runs_through_the_loop_and_can_be_paused() {
        let (mut ctx, _) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        let group = earth.group().unwrap();
        assert_eq!(ctx.resources.update_function_count(), 1);
        ctx.tick(0.0);
        ctx.tick(1000.0);
        let rotated = ctx.graph.transform(group).unwrap().rotation;
        assert!(rotated.angle_between(glam::Quat::IDENTITY) > 0.0);

        earth.set_rotating(&mut ctx, false);
        assert_eq!(ctx.resources.update_function_count(), 0);
        ctx.tick(2000.0);
        assert_eq!(ctx.graph.transform(group).unwrap().rotation, rotated);
        earth.set_rotating(&mut ctx, true);
        assert_eq!(ctx.resources.update_function_count(), 1);
    }

    #[test]
    fn unmount_mid_load_releases_everything() {
        let (mut ctx, probe) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        earth.unmount(&mut ctx);
        assert_eq!(earth.state(), EarthState::Idle);
        assert!(!ctx.resources.entities.has(EARTH_ENTITY_ID));
        assert_eq!(ctx.resources.update_function_count(), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(earth.poll(&mut ctx), EarthState::Idle);
        assert_eq!(probe.live_resources(), 0);
    }

    #[test]
    fn context_teardown_mid_load_releases_body_and_stops_loads() {
        let (mut ctx, probe) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        assert!(probe.live_resources() > 0);
        let report = ctx.teardown();
        assert_eq!(report.entities_removed, 1);
        assert!(!earth.token.is_alive());
        assert_eq!(probe.live_resources(), 0);
    }

    #[test]
    fn radius_change_remounts() {
        let (mut ctx, probe) = context(all_textures());
        let mut earth = Earth::new(PlanetConfig::default());
        earth.mount(&mut ctx);
        settle(&mut earth, &mut ctx);
        earth.set_radius(&mut ctx, 2.0);
        assert_eq!(earth.state(), EarthState::Loading);
        assert_eq!(settle(&mut earth, &mut ctx), EarthState::Loaded);
        assert_eq!(ctx.resources.entities.len(), 1);
        assert_eq!(probe.info().geometries, 3);
    }
}
