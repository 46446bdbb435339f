//! The capability object handed to scene consumers: texture and model loading,
//! the per-frame update registry, teardown callbacks and the entity registry.

use crate::assets::AssetSource;
use crate::config::TextureLoadConfig;
use crate::entity::EntityRegistry;
use crate::error::LoadError;
use crate::loader::{spawn_load, Liveness, PendingLoad, RetryPolicy};
use crate::model::ModelData;
use engine_core::{SceneGraph, TextureId};
use renderer::{ColorSpace, RenderBackend, RenderError, TextureImage, TextureOptions, Wrap};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-frame callback. Receives the loop timestamp in milliseconds.
pub type UpdateFn = Box<dyn FnMut(f64, &mut SceneGraph) -> anyhow::Result<()>>;

/// Teardown callback, run once when the context goes away.
pub type CleanupFn = Box<dyn FnOnce(&mut SceneGraph, &mut dyn RenderBackend) -> anyhow::Result<()>>;

/// Handle returned by [`ResourceManager::register_update_function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(u64);

impl UpdateId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Colour-managed textures are sampled as sRGB; everything else is data.
pub fn color_space_for(path: &str) -> ColorSpace {
    if path.contains("Albedo") || path.contains("night_lights") {
        ColorSpace::Srgb
    } else {
        ColorSpace::Linear
    }
}

pub struct ResourceManager {
    source: Arc<dyn AssetSource>,
    texture_policy: RetryPolicy,
    anisotropy: u16,
    max_anisotropy: u16,
    update_functions: BTreeMap<UpdateId, UpdateFn>,
    next_update_id: u64,
    cleanups: Vec<CleanupFn>,
    pub entities: EntityRegistry,
}

impl ResourceManager {
    /// `max_anisotropy` is what the render surface reports; requests are clamped to it.
    pub fn new(source: Arc<dyn AssetSource>, config: &TextureLoadConfig, max_anisotropy: u16) -> Self {
        Self {
            source,
            texture_policy: RetryPolicy::from_config(config),
            anisotropy: config.anisotropy,
            max_anisotropy: max_anisotropy.max(1),
            update_functions: BTreeMap::new(),
            next_update_id: 1,
            cleanups: Vec::new(),
            entities: EntityRegistry::new(),
        }
    }

    pub fn source(&self) -> &Arc<dyn AssetSource> {
        &self.source
    }

    pub fn texture_policy(&self) -> RetryPolicy {
        self.texture_policy
    }

    /// Start loading and decoding a texture in the background.
    pub fn load_texture(&self, path: &str, token: Liveness) -> PendingLoad<TextureImage> {
        let color_space = color_space_for(path);
        log::debug!("Loading texture {} ({:?}) from {}", path, color_space, self.source.describe());
        spawn_load(
            Arc::clone(&self.source),
            path,
            self.texture_policy,
            token,
            move |path, bytes| {
                TextureImage::decode(&bytes, color_space).map_err(|e| LoadError::Decode {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
            },
        )
    }

    /// Start loading a glTF/GLB model. Models get one attempt under the texture timeout.
    pub fn load_model(&self, path: &str, token: Liveness) -> PendingLoad<ModelData> {
        spawn_load(
            Arc::clone(&self.source),
            path,
            RetryPolicy::single_attempt(self.texture_policy.timeout),
            token,
            ModelData::parse,
        )
    }

    /// Sampling options for loaded textures: trilinear mips, clamped anisotropy.
    pub fn texture_options(&self) -> TextureOptions {
        TextureOptions {
            generate_mipmaps: true,
            anisotropy: self.anisotropy.clamp(1, self.max_anisotropy),
            wrap: Wrap::ClampToEdge,
        }
    }

    /// Upload a loaded image with [`Self::texture_options`].
    pub fn upload_texture(
        &self,
        backend: &mut dyn RenderBackend,
        image: &TextureImage,
        label: &str,
    ) -> Result<TextureId, RenderError> {
        backend.create_texture(image, self.texture_options(), label)
    }

    /// Add a per-frame callback. Ids are never reused within one context.
    pub fn register_update_function<F>(&mut self, f: F) -> UpdateId
    where
        F: FnMut(f64, &mut SceneGraph) -> anyhow::Result<()> + 'static,
    {
        let id = UpdateId(self.next_update_id);
        self.next_update_id += 1;
        self.update_functions.insert(id, Box::new(f));
        log::info!("Registered update function id: {}", id.0);
        id
    }

    /// Remove a callback. Unknown or already removed ids are ignored.
    pub fn unregister_update_function(&mut self, id: UpdateId) -> bool {
        let removed = self.update_functions.remove(&id).is_some();
        if removed {
            log::info!("Unregistered update function id: {}", id.0);
        }
        removed
    }

    pub fn update_function_count(&self) -> usize {
        self.update_functions.len()
    }

    /// Run every callback in registration order. A failing callback is logged and
    /// the rest still run. Returns the number of failures.
    pub fn run_update_functions(&mut self, now_ms: f64, graph: &mut SceneGraph) -> usize {
        let mut failures = 0;
        for (id, f) in self.update_functions.iter_mut() {
            if let Err(e) = f(now_ms, graph) {
                failures += 1;
                log::error!("Update function {} failed: {:#}", id.0, e);
            }
        }
        failures
    }

    pub fn register_for_cleanup<F>(&mut self, f: F)
    where
        F: FnOnce(&mut SceneGraph, &mut dyn RenderBackend) -> anyhow::Result<()> + 'static,
    {
        self.cleanups.push(Box::new(f));
        log::info!("Registered cleanup function ({} total)", self.cleanups.len());
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.len()
    }

    /// Run and drop all cleanups in registration order; failures are logged and
    /// skipped. Returns (ran, failed).
    pub(crate) fn run_cleanups(&mut self, graph: &mut SceneGraph, backend: &mut dyn RenderBackend) -> (usize, usize) {
        let cleanups = std::mem::take(&mut self.cleanups);
        log::info!("Running {} cleanup functions", cleanups.len());
        let mut failed = 0;
        let total = cleanups.len();
        for cleanup in cleanups {
            if let Err(e) = cleanup(graph, backend) {
                failed += 1;
                log::error!("Cleanup function failed: {:#}", e);
            }
        }
        (total, failed)
    }

    pub(crate) fn clear_update_functions(&mut self) -> usize {
        let count = self.update_functions.len();
        self.update_functions.clear();
        count
    }
}
