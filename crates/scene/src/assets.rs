//! Asset sources. Paths are plain strings like `/textures/Albedo.jpg`, resolved
//! against a directory on disk or an HTTP base URL.

use crate::config::AssetRoot;
use crate::error::LoadError;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Blocking byte fetch. Called from loader threads, never from the render loop.
pub trait AssetSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError>;

    /// Where this source reads from, for logs.
    fn describe(&self) -> String;
}

/// Build the source configured by `root`. `timeout` bounds each HTTP request.
pub fn source_for(root: &AssetRoot, timeout: Duration) -> Arc<dyn AssetSource> {
    match root {
        AssetRoot::Directory(dir) => Arc::new(DirectorySource::new(dir.clone())),
        AssetRoot::Http(base) => Arc::new(HttpSource::new(base.clone(), timeout)),
    }
}

/// Reads assets from a directory tree.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map an asset path into the root. Paths escaping the root are rejected.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl AssetSource for DirectorySource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let full = self.resolve(path).ok_or_else(|| LoadError::NotFound(path.to_string()))?;
        std::fs::read(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_string()),
            _ => LoadError::Fetch {
                path: path.to_string(),
                reason: e.to_string(),
            },
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Fetches assets with HTTP GET relative to a base URL. Every request, including
/// connecting and reading the body, finishes within the agent's timeout.
#[derive(Clone)]
pub struct HttpSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource").field("base_url", &self.base_url).finish()
    }
}

impl AssetSource for HttpSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let url = self.url_for(path);
        let resp = self.agent.get(&url).call().map_err(|e| match e {
            ureq::Error::Status(404, _) => LoadError::NotFound(path.to_string()),
            other => LoadError::Fetch {
                path: path.to_string(),
                reason: other.to_string(),
            },
        })?;
        let mut bytes = Vec::new();
        resp.into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| LoadError::Fetch {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!("http {}", self.base_url)
    }
}

/// Assets held in memory. Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        let mut files = self.files.write().unwrap_or_else(|p| p.into_inner());
        files.insert(path.into(), bytes);
    }

    pub fn with(self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let files = self.files.read().unwrap_or_else(|p| p.into_inner());
        files.get(path).cloned().ok_or_else(|| LoadError::NotFound(path.to_string()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
