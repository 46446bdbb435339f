//! Error types for asset loading and scene lifecycle.

use renderer::RenderError;

/// Why an asset could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("timed out after {timeout_ms} ms loading {path}")]
    Timeout { path: String, timeout_ms: u64 },

    #[error("gave up on {path} after {attempts} attempts: {last}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last: Box<LoadError>,
    },

    /// The owner went away before the load finished.
    #[error("load of {0} cancelled")]
    Cancelled(String),

    #[error("loader for {0} stopped without a result")]
    Disconnected(String),
}

impl LoadError {
    /// Failures that another attempt cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, LoadError::Cancelled(_) | LoadError::RetriesExhausted { .. })
    }
}

/// Scene lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// No rendering context could be obtained.
    #[error("scene initialization failed: {0}")]
    Init(#[from] RenderError),

    #[error("invalid config: {0}")]
    Config(#[from] ron::error::SpannedError),

    #[error("scene is not mounted")]
    NotMounted,
}
