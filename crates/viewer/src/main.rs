//! satview: a desktop window showing the planet, a star field and one selectable
//! satellite at a time.

mod input;
mod picking;

use anyhow::Result;
use engine_core::{ClickCallback, FrameClock};
use input::InputState;
use renderer::{RenderBackend, WgpuBackend};
use scene::{source_for, SatelliteDescriptor, SatelliteScene, SceneConfig, SceneProvider};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::{MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const TITLE: &str = "satview";
const SELECT_KEYS: [KeyCode; 5] = [
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
];

/// Everything that lives as long as the window.
struct Viewer {
    window: Arc<Window>,
    provider: SceneProvider,
    scene: Option<SatelliteScene>,
    input: InputState,
    clock: FrameClock,
    catalogue: Vec<SatelliteDescriptor>,
    clicked: Arc<Mutex<Vec<String>>>,
    rotating: bool,
    status: String,
}

impl Viewer {
    fn new(window: Arc<Window>, config: SceneConfig) -> Self {
        let source = source_for(&config.assets, Duration::from_millis(config.textures.timeout_ms));
        log::info!("Assets from {}", source.describe());
        let catalogue = config.satellites.clone();
        let mut viewer = Self {
            window,
            provider: SceneProvider::new(config, source),
            scene: None,
            input: InputState::new(),
            clock: FrameClock::new(),
            catalogue,
            clicked: Arc::new(Mutex::new(Vec::new())),
            rotating: true,
            status: String::new(),
        };
        viewer.mount();
        viewer
    }

    /// Build the rendering context and the scene. On failure the error goes to the
    /// title bar and `R` retries.
    fn mount(&mut self) {
        self.unmount();
        let size = self.window.inner_size();
        let window = Arc::clone(&self.window);
        let vsync = self.provider.config().window.vsync;
        let mounted = self.provider.mount(size.width, size.height, |viewport| {
            WgpuBackend::new_blocking(window, viewport.x, vsync).map(|b| Box::new(b) as Box<dyn RenderBackend>)
        });
        if !mounted {
            let reason = self
                .provider
                .error()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".into());
            self.set_title(&format!("{} - 3D scene unavailable: {} (press R to retry)", TITLE, reason));
            return;
        }

        let clicked = Arc::clone(&self.clicked);
        let on_click: ClickCallback = Arc::new(move |id: &str| {
            clicked.lock().unwrap_or_else(|e| e.into_inner()).push(id.to_string());
        });
        let mut scene = SatelliteScene::new(self.provider.config(), Some(on_click));
        if let Some(ctx) = self.provider.context_mut() {
            scene.mount(ctx);
            scene.set_rotating(ctx, self.rotating);
        }
        self.scene = Some(scene);
        self.window.request_redraw();
    }

    fn unmount(&mut self) {
        if let (Some(mut scene), Some(ctx)) = (self.scene.take(), self.provider.context_mut()) {
            scene.unmount(ctx);
        }
        self.provider.unmount();
    }

    fn set_title(&mut self, title: &str) {
        if self.status != title {
            self.window.set_title(title);
            self.status = title.to_string();
        }
    }

    /// Returns true when the window should close.
    fn handle_window_event(&mut self, event: WindowEvent) -> bool {
        match event {
            WindowEvent::CloseRequested => {
                self.unmount();
                return true;
            }
            WindowEvent::Resized(size) => self.provider.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.input.process_keyboard(key, event.state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => self.input.process_mouse_button(button, state),
            WindowEvent::CursorMoved { position, .. } => self.input.process_cursor_position((position.x, position.y)),
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 50.0) as f32,
                };
                self.input.process_scroll(steps);
            }
            WindowEvent::RedrawRequested => {
                self.frame();
                self.window.request_redraw();
            }
            _ => {}
        }
        false
    }

    fn frame(&mut self) {
        let now = self.clock.now_ms();
        self.apply_input();
        if let (Some(scene), Some(ctx)) = (self.scene.as_mut(), self.provider.context_mut()) {
            scene.update(ctx, now);
        }
        self.provider.tick(now);
        self.route_clicks();
        self.update_title();
        self.input.end_frame();
    }

    fn apply_input(&mut self) {
        if self.input.is_key_pressed(KeyCode::KeyR) {
            log::info!("Reloading scene");
            self.mount();
            return;
        }
        let (Some(scene), Some(ctx)) = (self.scene.as_mut(), self.provider.context_mut()) else {
            return;
        };

        if self.input.is_key_pressed(KeyCode::Escape) {
            scene.select(ctx, None);
        }
        for (key, descriptor) in SELECT_KEYS.iter().zip(&self.catalogue) {
            if self.input.is_key_pressed(*key) {
                scene.select(ctx, Some(descriptor));
            }
        }
        if self.input.is_key_pressed(KeyCode::Space) {
            self.rotating = !self.rotating;
            scene.set_rotating(ctx, self.rotating);
        }

        let viewport = ctx.viewport();
        let drag = self.input.drag_delta();
        if drag != glam::Vec2::ZERO {
            ctx.controls_mut().rotate(drag, viewport.height as f32);
        }
        let scroll = self.input.scroll();
        if scroll != 0.0 {
            // Wheel away from the user zooms in.
            ctx.controls_mut().zoom(-scroll);
        }
        if let Some(click) = self.input.click() {
            if let Some(target) = picking::pick(&ctx.graph, ctx.camera(), &viewport, click.x, click.y) {
                target.click();
            }
        }
    }

    fn route_clicks(&mut self) {
        let ids: Vec<String> = std::mem::take(&mut *self.clicked.lock().unwrap_or_else(|e| e.into_inner()));
        for id in ids {
            match self.catalogue.iter().find(|s| s.id == id) {
                Some(satellite) => log::info!("Clicked {} ({}): {}", satellite.name, satellite.id, satellite.description),
                None => log::info!("Clicked {}", id),
            }
        }
    }

    fn update_title(&mut self) {
        let Some(scene) = self.scene.as_ref() else {
            return;
        };
        let loading = if self.provider.is_loaded() {
            String::new()
        } else {
            format!(" | loading planet {:.0}%", scene.earth().progress())
        };
        let selected = scene
            .selected()
            .map(|s| format!(" | {}", s.name))
            .unwrap_or_default();
        let stats = scene.stats().map(|s| format!(" | {}", s.summary())).unwrap_or_default();
        let title = format!("{}{}{}{}", TITLE, selected, loading, stats);
        self.set_title(&title);
    }
}

/// Application handler for winit.
struct App {
    viewer: Option<Viewer>,
}

impl App {
    fn new() -> Self {
        Self { viewer: None }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        let config = SceneConfig::load();
        let window_attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(config.window.width, config.window.height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.viewer = Some(Viewer::new(window, config));
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(viewer) = &mut self.viewer {
            if viewer.handle_window_event(event) {
                event_loop.exit();
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("satview controls:");
    println!("  1-5         select a satellite");
    println!("  Esc         back to the planet");
    println!("  Space       pause / resume rotation");
    println!("  Drag        orbit the camera");
    println!("  Wheel       zoom");
    println!("  Click       inspect a satellite");
    println!("  R           reload the scene");

    log::info!("Starting satview");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
