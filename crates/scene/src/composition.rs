//! The satellite viewer scene: stars, the planet, at most one selected satellite and
//! the camera moves between them.

use crate::config::SceneConfig;
use crate::context::SceneContext;
use crate::earth::{Earth, EarthState};
use crate::performance::{PerformanceMonitor, PerformanceStats};
use crate::satellite::{SatelliteDescriptor, SatelliteLayer};
use crate::stars::Stars;
use engine_core::{ClickCallback, Vec3};

/// Camera offset from a selected satellite.
const FLY_TO_OFFSET: Vec3 = Vec3::new(5.0, 2.0, 5.0);
const FLY_TO_DURATION_MS: f64 = 1500.0;

pub fn ease_out_cubic(t: f32) -> f32 {
    1.0 - (1.0 - t.clamp(0.0, 1.0)).powi(3)
}

/// A timed camera move. The clock starts on the first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FlyTo {
    from: Vec3,
    to: Vec3,
    look_at: Vec3,
    duration_ms: f64,
    started_ms: Option<f64>,
}

impl FlyTo {
    pub fn new(from: Vec3, to: Vec3, look_at: Vec3, duration_ms: f64) -> Self {
        Self {
            from,
            to,
            look_at,
            duration_ms,
            started_ms: None,
        }
    }

    /// Camera position at `now_ms` and whether the move is finished.
    pub fn sample(&mut self, now_ms: f64) -> (Vec3, bool) {
        let start = *self.started_ms.get_or_insert(now_ms);
        let progress = if self.duration_ms > 0.0 {
            ((now_ms - start) / self.duration_ms).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        (self.from.lerp(self.to, ease_out_cubic(progress)), progress >= 1.0)
    }

    pub fn look_at(&self) -> Vec3 {
        self.look_at
    }
}

pub struct SatelliteScene {
    earth: Earth,
    stars: Stars,
    satellites: SatelliteLayer,
    monitor: PerformanceMonitor,
    selected: Option<SatelliteDescriptor>,
    fly: Option<FlyTo>,
    home: Vec3,
}

impl SatelliteScene {
    pub fn new(config: &SceneConfig, on_click: Option<ClickCallback>) -> Self {
        Self {
            earth: Earth::new(config.planet.clone()),
            stars: Stars::new(config.stars.clone()),
            satellites: SatelliteLayer::new(on_click),
            monitor: PerformanceMonitor::new(),
            selected: None,
            fly: None,
            home: Vec3::from(config.camera.position),
        }
    }

    pub fn mount(&mut self, ctx: &mut SceneContext) {
        let camera = ctx.camera_mut();
        camera.position = self.home;
        camera.look_at(Vec3::ZERO);
        ctx.controls_mut().target = Vec3::ZERO;
        if let Err(e) = self.stars.mount(ctx) {
            log::error!("Stars could not be created: {}", e);
        }
        self.earth.mount(ctx);
    }

    /// Per-frame work outside the render loop: collect finished loads, advance the
    /// camera move and sample performance. Call before [`SceneContext::tick`].
    pub fn update(&mut self, ctx: &mut SceneContext, now_ms: f64) {
        self.earth.poll(ctx);
        self.satellites.poll(ctx);
        if let Some(fly) = self.fly.as_mut() {
            let (position, done) = fly.sample(now_ms);
            let target = fly.look_at();
            let camera = ctx.camera_mut();
            camera.position = position;
            camera.look_at(target);
            let controls = ctx.controls_mut();
            controls.target = target;
            if done {
                controls.clamp_distance = true;
                self.fly = None;
            }
        }
        self.monitor.sample(ctx, now_ms);
    }

    /// Show one satellite instead of the planet, or go back to the planet with `None`.
    pub fn select(&mut self, ctx: &mut SceneContext, satellite: Option<&SatelliteDescriptor>) {
        if self.selected.as_ref().map(|s| &s.id) == satellite.map(|s| &s.id) {
            return;
        }
        let from = ctx.camera().position;
        // The eased path may leave the orbit distance band; clamping resumes on arrival.
        ctx.controls_mut().clamp_distance = false;
        match satellite {
            Some(descriptor) => {
                log::info!("Selected satellite {} ({})", descriptor.id, descriptor.name);
                self.earth.set_hidden(ctx, true);
                self.satellites.load(ctx, std::slice::from_ref(descriptor));
                let focus = descriptor.position();
                self.fly = Some(FlyTo::new(from, focus + FLY_TO_OFFSET, focus, FLY_TO_DURATION_MS));
                self.selected = Some(descriptor.clone());
            }
            None => {
                log::info!("Selection cleared");
                self.satellites.clear(ctx);
                self.earth.set_hidden(ctx, false);
                self.fly = Some(FlyTo::new(from, self.home, Vec3::ZERO, FLY_TO_DURATION_MS));
                self.selected = None;
            }
        }
    }

    pub fn set_rotating(&mut self, ctx: &mut SceneContext, rotating: bool) {
        self.earth.set_rotating(ctx, rotating);
    }

    /// Release everything this scene created. The context stays usable.
    pub fn unmount(&mut self, ctx: &mut SceneContext) {
        self.fly = None;
        ctx.controls_mut().clamp_distance = true;
        self.selected = None;
        self.satellites.clear(ctx);
        self.stars.unmount(ctx);
        self.earth.unmount(ctx);
    }

    pub fn selected(&self) -> Option<&SatelliteDescriptor> {
        self.selected.as_ref()
    }

    pub fn is_flying(&self) -> bool {
        self.fly.is_some()
    }

    pub fn earth(&self) -> &Earth {
        &self.earth
    }

    pub fn earth_state(&self) -> EarthState {
        self.earth.state()
    }

    pub fn satellites(&self) -> &SatelliteLayer {
        &self.satellites
    }

    pub fn stars(&self) -> &Stars {
        &self.stars
    }

    pub fn stats(&self) -> Option<PerformanceStats> {
        self.monitor.stats()
    }
}
