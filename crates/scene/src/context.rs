//! The scene context owns the rendering context, camera, controls and the single
//! render loop. The provider mounts and tears it down.

use crate::assets::AssetSource;
use crate::config::SceneConfig;
use crate::error::SceneError;
use crate::resources::ResourceManager;
use engine_core::{FpsWindow, FrameLimiter, Light, MeshInstance, SceneGraph, ShaderClock, Vec2, Vec3};
use renderer::{
    Camera, CameraUniform, DrawItem, FrameScene, LightItem, OrbitControls, RenderBackend, RenderError, RenderInfo,
    Viewport,
};
use std::sync::Arc;

/// Background colour of the 3D view.
const CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

/// What teardown did, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub entities_removed: usize,
    pub cleanups_run: usize,
    pub cleanup_failures: usize,
    pub update_functions_cleared: usize,
    /// Entities still registered after teardown (always zero).
    pub entities_left: usize,
    /// Update functions still registered after teardown (always zero).
    pub update_functions_left: usize,
    pub surface_released: bool,
}

/// One mounted scene. Consumers get `&mut SceneContext` explicitly; the camera and
/// surface size are only read by them, never written, except through the controls.
pub struct SceneContext {
    backend: Box<dyn RenderBackend>,
    pub graph: SceneGraph,
    camera: Camera,
    controls: OrbitControls,
    pub resources: ResourceManager,
    limiter: FrameLimiter,
    fps: FpsWindow,
    low_fps_warning: f32,
    panel_width: u32,
    loaded: bool,
    rotating: bool,
    ticks: u64,
    update_failures: u64,
}

impl SceneContext {
    /// Build a context around an already created rendering context.
    pub fn new(backend: Box<dyn RenderBackend>, config: &SceneConfig, source: Arc<dyn AssetSource>) -> Self {
        let viewport = backend.viewport();
        let mut camera = Camera::new(
            config.camera.fov_degrees,
            viewport.aspect(),
            config.camera.near,
            config.camera.far,
        );
        camera.position = Vec3::from(config.camera.position);
        camera.look_at(Vec3::ZERO);

        let mut controls = OrbitControls::default();
        controls.enable_damping = config.controls.damping_factor > 0.0;
        controls.damping_factor = config.controls.damping_factor;
        controls.min_distance = config.controls.min_distance;
        controls.max_distance = config.controls.max_distance;
        controls.rotate_speed = config.controls.rotate_speed;
        controls.zoom_speed = config.controls.zoom_speed;
        controls.enable_pan = config.controls.enable_pan;

        let resources = ResourceManager::new(source, &config.textures, backend.capabilities().max_anisotropy);
        Self {
            backend,
            graph: SceneGraph::new(),
            camera,
            controls,
            resources,
            limiter: FrameLimiter::new(config.render_loop.target_fps),
            fps: FpsWindow::default(),
            low_fps_warning: config.render_loop.low_fps_warning,
            panel_width: config.viewport.panel_width,
            loaded: false,
            rotating: true,
            ticks: 0,
            update_failures: 0,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Direct camera access for scripted camera moves such as a fly-to.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    /// Borrow graph, backend and resources at the same time.
    pub fn parts(&mut self) -> (&mut SceneGraph, &mut dyn RenderBackend, &mut ResourceManager) {
        (&mut self.graph, self.backend.as_mut(), &mut self.resources)
    }

    pub fn viewport(&self) -> Viewport {
        self.backend.viewport()
    }

    pub fn render_info(&self) -> RenderInfo {
        self.backend.info()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    pub fn set_rotating(&mut self, rotating: bool) {
        self.rotating = rotating;
    }

    /// Admitted ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn update_failures(&self) -> u64 {
        self.update_failures
    }

    /// React to a container size change. The loop keeps running.
    pub fn resize(&mut self, width: u32, height: u32) {
        let viewport = Viewport::with_panel(width, height, self.panel_width);
        self.backend.resize(viewport);
        self.camera.set_aspect(viewport.width, viewport.height);
        log::debug!(
            "Resized to {}x{} (viewport {}x{})",
            width,
            height,
            viewport.width,
            viewport.height
        );
    }

    /// One loop iteration at `now_ms`. Ticks closer together than the frame interval
    /// are dropped. Order: controls, update functions in registration order, one
    /// render submission. Returns true if the tick did work.
    pub fn tick(&mut self, now_ms: f64) -> bool {
        if !self.limiter.admit(now_ms) {
            return false;
        }
        if let Some(fps) = self.fps.frame(now_ms) {
            if fps < self.low_fps_warning {
                log::warn!("Low frame rate: {:.0} FPS", fps);
            }
        }

        self.controls.update(&mut self.camera);
        self.update_failures += self.resources.run_update_functions(now_ms, &mut self.graph) as u64;

        let frame = self.build_frame();
        if let Err(e) = self.backend.render(&frame) {
            match e {
                RenderError::Released => log::debug!("Render skipped: context released"),
                other => log::error!("Render failed: {}", other),
            }
        }
        self.ticks += 1;
        true
    }

    /// Snapshot the visible part of the scene graph.
    pub fn build_frame(&self) -> FrameScene {
        let viewport = self.backend.viewport();
        let mut draws = Vec::new();
        let mut lights = Vec::new();
        self.graph.visit_visible(|entity, world| {
            if let Some(mesh) = self.graph.get::<MeshInstance>(entity) {
                draws.push(DrawItem {
                    geometry: mesh.geometry,
                    material: mesh.material,
                    model: world,
                    render_order: mesh.render_order,
                    time: self.graph.get::<ShaderClock>(entity).map(|c| c.0).unwrap_or(0.0),
                });
            }
            if let Some(light) = self.graph.get::<Light>(entity) {
                lights.push(LightItem {
                    kind: light.kind,
                    color: light.color,
                    intensity: light.intensity,
                    position: world.w_axis.truncate(),
                });
            }
        });
        FrameScene {
            camera: CameraUniform::from_camera(
                &self.camera,
                Vec2::new(viewport.width as f32, viewport.height as f32),
            ),
            camera_position: self.camera.position,
            clear_color: CLEAR_COLOR,
            draws,
            lights,
        }
    }

    /// Tear everything down: entity registry, cleanups in order, update functions,
    /// then the render surface and context.
    pub fn teardown(mut self) -> TeardownReport {
        log::info!("Tearing down scene");
        let mut report = TeardownReport::default();

        let (graph, backend, resources) = self.parts();
        report.entities_removed = resources.entities.clear(graph, backend);
        let (ran, failed) = resources.run_cleanups(graph, backend);
        report.cleanups_run = ran;
        report.cleanup_failures = failed;
        report.update_functions_cleared = resources.clear_update_functions();
        report.entities_left = resources.entities.len();
        report.update_functions_left = resources.update_function_count();

        let leftover = graph.despawn_recursive(graph.root());
        if !leftover.is_empty() {
            log::debug!("Dropped {} unregistered nodes", leftover.len());
        }
        self.backend.release();
        report.surface_released = self.backend.is_released();
        log::info!("Scene teardown complete: {:?}", report);
        report
    }
}

/// Builds the rendering context for a viewport. Fails when no GPU context can be had.
pub type BackendFactory<'a> = Box<dyn FnOnce(Viewport) -> Result<Box<dyn RenderBackend>, RenderError> + 'a>;

/// Owner of at most one mounted [`SceneContext`].
pub struct SceneProvider {
    config: SceneConfig,
    source: Arc<dyn AssetSource>,
    context: Option<SceneContext>,
    error: Option<SceneError>,
}

impl SceneProvider {
    pub fn new(config: SceneConfig, source: Arc<dyn AssetSource>) -> Self {
        Self {
            config,
            source,
            context: None,
            error: None,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Initialize a scene for a container of `width`×`height`. A previous scene is torn
    /// down first. Failure is recorded in [`Self::error`], not returned.
    pub fn mount<F>(&mut self, width: u32, height: u32, factory: F) -> bool
    where
        F: FnOnce(Viewport) -> Result<Box<dyn RenderBackend>, RenderError>,
    {
        if self.context.is_some() {
            self.unmount();
        }
        let viewport = Viewport::with_panel(width, height, self.config.viewport.panel_width);
        match factory(viewport) {
            Ok(backend) => {
                log::info!("Scene initialized on {} backend ({}x{})", backend.name(), width, height);
                let mut context = SceneContext::new(backend, &self.config, Arc::clone(&self.source));
                context.resize(width, height);
                self.context = Some(context);
                self.error = None;
                true
            }
            Err(e) => {
                log::error!("Scene initialization failed: {}", e);
                self.error = Some(SceneError::Init(e));
                false
            }
        }
    }

    /// Tear down the mounted scene, if any.
    pub fn unmount(&mut self) -> Option<TeardownReport> {
        self.context.take().map(SceneContext::teardown)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(context) = self.context.as_mut() {
            context.resize(width, height);
        }
    }

    /// Drive the loop. Does nothing while unmounted.
    pub fn tick(&mut self, now_ms: f64) -> bool {
        self.context.as_mut().map(|c| c.tick(now_ms)).unwrap_or(false)
    }

    pub fn context(&self) -> Option<&SceneContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut SceneContext> {
        self.context.as_mut()
    }

    /// Like [`Self::context_mut`] but as an error for `?` users.
    pub fn require(&mut self) -> Result<&mut SceneContext, SceneError> {
        self.context.as_mut().ok_or(SceneError::NotMounted)
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.context.as_ref().map(SceneContext::is_loaded).unwrap_or(false)
    }

    pub fn error(&self) -> Option<&SceneError> {
        self.error.as_ref()
    }
}

impl Drop for SceneProvider {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::entity::{EntityKind, RegisteredEntity};
    use engine_core::Transform;
    use renderer::{HeadlessBackend, HeadlessProbe};
    use std::cell::Cell;
    use std::rc::Rc;

    fn mounted(width: u32, height: u32) -> (SceneProvider, HeadlessProbe) {
        let mut provider = SceneProvider::new(SceneConfig::default(), Arc::new(MemorySource::new()));
        let mut probe = None;
        assert!(provider.mount(width, height, |viewport| {
            let backend = HeadlessBackend::new(viewport);
            probe = Some(backend.probe());
            Ok(Box::new(backend) as Box<dyn RenderBackend>)
        }));
        (provider, probe.unwrap())
    }

    #[test]
    fn mount_sizes_camera_to_viewport_minus_panel() {
        let (provider, _) = mounted(800, 600);
        let context = provider.context().unwrap();
        assert!((context.camera().aspect - 420.0 / 600.0).abs() < 1e-6);
        assert_eq!(context.camera().fov_degrees, 40.0);
        assert_eq!(context.viewport().x, 380);
        assert!(provider.is_initialized());
        assert!(!provider.is_loaded());
    }

    #[test]
    fn controls_follow_the_configured_limits() {
        let mut config = SceneConfig::default();
        config.controls.damping_factor = 0.0;
        config.controls.min_distance = 2.0;
        config.controls.max_distance = 12.0;
        let ctx = SceneContext::new(
            Box::new(HeadlessBackend::new(Viewport::with_panel(800, 600, 380))),
            &config,
            Arc::new(MemorySource::new()),
        );
        let controls = ctx.controls();
        assert!(!controls.enable_damping);
        assert_eq!(controls.min_distance, 2.0);
        assert_eq!(controls.max_distance, 12.0);
        assert!(!controls.enable_pan);
        assert!(controls.clamp_distance);
    }

    #[test]
    fn failed_initialization_is_exposed_not_thrown() {
        let mut provider = SceneProvider::new(SceneConfig::default(), Arc::new(MemorySource::new()));
        assert!(!provider.mount(800, 600, |_| Err(RenderError::NoAdapter)));
        assert!(!provider.is_initialized());
        assert!(matches!(provider.error(), Some(SceneError::Init(RenderError::NoAdapter))));
        assert!(!provider.tick(0.0));
        assert!(matches!(provider.require(), Err(SceneError::NotMounted)));
    }

    #[test]
    fn ticks_are_coalesced_to_the_frame_interval() {
        let (mut provider, probe) = mounted(800, 600);
        assert!(provider.tick(0.0));
        assert!(!provider.tick(5.0));
        assert!(!provider.tick(16.0));
        assert!(provider.tick(17.0));
        assert_eq!(probe.frames_rendered(), 2);
    }

    #[test]
    fn tick_order_is_controls_then_updates_then_one_render() {
        let (mut provider, probe) = mounted(800, 600);
        let context = provider.context_mut().unwrap();
        context.controls_mut().zoom(-10.0);
        let frames_seen = Rc::new(Cell::new(u64::MAX));
        {
            let probe = probe.clone();
            let frames_seen = Rc::clone(&frames_seen);
            context.resources.register_update_function(move |_, _| {
                frames_seen.set(probe.frames_rendered());
                Ok(())
            });
        }
        context.resources.register_update_function(|_, _| anyhow::bail!("broken"));
        assert!(context.tick(0.0));
        assert_eq!(frames_seen.get(), 0, "updates run before the render");
        assert_eq!(probe.frames_rendered(), 1);
        assert_eq!(context.update_failures(), 1);
        assert!(context.camera().position.length() < 5.0, "controls applied in the tick");
    }

    #[test]
    fn resize_keeps_loop_and_recomputes_aspect() {
        let (mut provider, probe) = mounted(800, 600);
        provider.tick(0.0);
        provider.resize(1380, 500);
        provider.tick(100.0);
        let context = provider.context().unwrap();
        assert_eq!(context.ticks(), 2);
        assert!((context.camera().aspect - 1000.0 / 500.0).abs() < 1e-6);
        assert_eq!(probe.last_frame().unwrap().camera.viewport[0], 1000.0);
    }

    #[test]
    fn frame_contains_visible_meshes_and_lights() {
        let (mut provider, probe) = mounted(800, 600);
        let context = provider.context_mut().unwrap();
        let (graph, _, _) = context.parts();
        let group = graph.spawn("group", Transform::from_position(Vec3::X));
        let light = graph.spawn_light("sun", Transform::from_position(Vec3::Z), Light::directional(Vec3::ONE, 1.0));
        graph.add_child(group, light);
        let root = graph.root();
        graph.add_child(root, group);
        context.tick(0.0);
        let frame = probe.last_frame().unwrap();
        assert_eq!(frame.lights.len(), 1);
        assert_eq!(frame.lights[0].position, Vec3::new(1.0, 0.0, 1.0));

        context.graph.set_visible(group, false);
        context.tick(100.0);
        assert!(probe.last_frame().unwrap().lights.is_empty());
    }

    #[test]
    fn unmount_empties_registries_and_releases_surface() {
        let (mut provider, probe) = mounted(800, 600);
        let context = provider.context_mut().unwrap();
        let (graph, backend, resources) = context.parts();
        let node = graph.spawn("thing", Transform::default());
        resources
            .entities
            .register(graph, backend, RegisteredEntity::owning_subtree("thing", EntityKind::Other("t".into()), node));
        resources.register_update_function(|_, _| Ok(()));
        resources.register_for_cleanup(|_, _| anyhow::bail!("fails"));
        resources.register_for_cleanup(|_, _| Ok(()));

        let report = provider.unmount().unwrap();
        assert_eq!(report.entities_removed, 1);
        assert_eq!(report.entities_left, 0);
        assert_eq!(report.update_functions_cleared, 1);
        assert_eq!(report.update_functions_left, 0);
        assert_eq!((report.cleanups_run, report.cleanup_failures), (2, 1));
        assert!(report.surface_released);
        assert!(probe.is_released());
        assert!(!provider.is_initialized());
        assert!(provider.unmount().is_none());
    }
}
