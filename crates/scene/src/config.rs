//! Scene configuration. Loaded from `satview.ron` at startup.

use crate::error::SceneError;
use crate::satellite::{default_catalogue, SatelliteDescriptor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the scene reads at mount time. Every section and field falls back to
/// its default when missing from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub render_loop: LoopConfig,
    #[serde(default)]
    pub textures: TextureLoadConfig,
    #[serde(default)]
    pub assets: AssetRoot,
    #[serde(default)]
    pub planet: PlanetConfig,
    #[serde(default)]
    pub stars: StarsConfig,
    #[serde(default = "default_catalogue")]
    pub satellites: Vec<SatelliteDescriptor>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            viewport: ViewportConfig::default(),
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            render_loop: LoopConfig::default(),
            textures: TextureLoadConfig::default(),
            assets: AssetRoot::default(),
            planet: PlanetConfig::default(),
            stars: StarsConfig::default(),
            satellites: default_catalogue(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window width in logical pixels.
    #[serde(default = "default_window_width")]
    pub width: u32,
    /// Window height in logical pixels.
    #[serde(default = "default_window_height")]
    pub height: u32,
    #[serde(default = "default_true")]
    pub vsync: bool,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_true() -> bool {
    true
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
            vsync: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Width reserved on the left for the info panel; the 3D view gets the rest.
    #[serde(default = "default_panel_width")]
    pub panel_width: u32,
}

fn default_panel_width() -> u32 {
    380
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            panel_width: default_panel_width(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 40.0,
            near: 0.1,
            far: 2000.0,
            position: [0.0, 0.0, 5.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub enable_pan: bool,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.05,
            min_distance: 3.0,
            max_distance: 8.0,
            rotate_speed: 0.5,
            zoom_speed: 0.5,
            enable_pan: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Tick cap in Hz. Faster ticks are coalesced.
    pub target_fps: f64,
    /// The render loop logs a warning when the measured rate drops below this.
    pub low_fps_warning: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            low_fps_warning: 30.0,
        }
    }
}

/// Texture fetch policy. The numbers are tunable defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureLoadConfig {
    /// Extra attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_ms * n`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Hard limit for one attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Requested anisotropy, clamped to what the backend supports.
    #[serde(default = "default_anisotropy")]
    pub anisotropy: u16,
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_anisotropy() -> u16 {
    4
}

impl Default for TextureLoadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_ms: default_timeout_ms(),
            anisotropy: default_anisotropy(),
        }
    }
}

/// Where asset paths such as `/textures/Albedo.jpg` are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetRoot {
    Directory(PathBuf),
    /// Base URL; assets are fetched with plain HTTP GET.
    Http(String),
}

impl Default for AssetRoot {
    fn default() -> Self {
        AssetRoot::Directory(PathBuf::from("public"))
    }
}

/// Texture paths for the five planet channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetTextures {
    pub albedo: String,
    pub night_lights: String,
    pub bump: String,
    pub ocean: String,
    pub clouds: String,
}

impl Default for PlanetTextures {
    fn default() -> Self {
        Self {
            albedo: "/textures/Albedo.jpg".into(),
            night_lights: "/textures/night_lights.png".into(),
            bump: "/textures/Bump.jpg".into(),
            ocean: "/textures/Ocean.png".into(),
            clouds: "/textures/Clouds.png".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    pub radius: f32,
    pub segments: u32,
    pub cloud_offset: f32,
    pub atmosphere_offset: f32,
    /// Radians per millisecond.
    pub rotation_speed: f32,
    /// Rotation updates closer together than this are skipped.
    pub frame_limit_ms: f64,
    /// Rotation axis in the group's local space.
    pub rotation_axis: [f32; 3],
    pub textures: PlanetTextures,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            radius: 1.5,
            segments: 24,
            cloud_offset: 0.01,
            atmosphere_offset: 0.1,
            rotation_speed: 0.000_01,
            frame_limit_ms: 16.0,
            rotation_axis: [0.0, 1.0, 0.0],
            textures: PlanetTextures::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarsConfig {
    pub count: usize,
    pub inner_radius: f32,
    pub outer_radius: f32,
    /// Fixed seed for a reproducible sky; random when absent.
    pub seed: Option<u64>,
}

impl Default for StarsConfig {
    fn default() -> Self {
        Self {
            count: 2000,
            inner_radius: 50.0,
            outer_radius: 100.0,
            seed: None,
        }
    }
}

impl SceneConfig {
    /// Load config from `satview.ron`. A missing file is created with the defaults;
    /// an invalid one is left alone and the defaults are used.
    pub fn load() -> Self {
        let path = config_path();
        let missing = !path.exists();
        let config = Self::load_from(&path);
        if missing {
            config.save();
        }
        config
    }

    /// Like [`Self::load`] without writing anything. Falls back to defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        match Self::read_from(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                log::warn!("No config at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                log::warn!("{} in {:?}, using defaults", e, path);
                Self::default()
            }
        }
    }

    /// `Ok(None)` when the file cannot be read.
    pub fn read_from(path: &Path) -> Result<Option<Self>, SceneError> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(Some(Self::from_ron_str(&data)?)),
            Err(_) => Ok(None),
        }
    }

    pub fn from_ron_str(data: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(data)
    }

    /// Save current config to `satview.ron`. Logs on error.
    pub fn save(&self) {
        self.save_to(&config_path());
    }

    pub fn save_to(&self, path: &Path) {
        match ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            Ok(s) => match std::fs::write(path, s) {
                Ok(()) => log::info!("Wrote config to {:?}", path),
                Err(e) => log::warn!("Could not write config to {:?}: {}", path, e),
            },
            Err(e) => log::warn!("Could not serialize config: {}", e),
        }
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("satview.ron")
}
