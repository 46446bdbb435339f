//! Scene lifecycle for satview: the scene context and its render loop, the
//! resource manager handed to scene consumers, and the consumers themselves
//! (planet, satellites, star field, performance monitor).

pub mod assets;
pub mod composition;
pub mod config;
pub mod context;
pub mod earth;
pub mod entity;
pub mod error;
pub mod loader;
pub mod model;
pub mod performance;
pub mod resources;
pub mod satellite;
pub mod stars;

#[cfg(test)]
mod testing;

pub use assets::{source_for, AssetSource, DirectorySource, HttpSource, MemorySource};
pub use composition::{FlyTo, SatelliteScene};
pub use config::SceneConfig;
pub use context::{SceneContext, SceneProvider, TeardownReport};
pub use earth::{Earth, EarthState, Spin, TextureChannel};
pub use entity::{EntityKind, EntityRegistry, RegisteredEntity};
pub use error::{LoadError, SceneError};
pub use loader::{Liveness, LoadStatus, PendingLoad, RetryPolicy};
pub use model::ModelData;
pub use performance::{PerformanceMonitor, PerformanceStats};
pub use resources::{ResourceManager, UpdateId};
pub use satellite::{SatelliteDescriptor, SatelliteLayer, SatelliteState};
pub use stars::Stars;
