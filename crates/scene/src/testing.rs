//! Test fixtures: misbehaving asset sources and tiny encoded assets.

use crate::assets::AssetSource;
use crate::error::LoadError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fails the first `failures` fetches, then returns `bytes`.
pub struct FlakySource {
    failures: u32,
    bytes: Vec<u8>,
    calls: Arc<AtomicU32>,
}

impl FlakySource {
    pub fn new(failures: u32, bytes: Vec<u8>) -> Self {
        Self {
            failures,
            bytes,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl AssetSource for FlakySource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(LoadError::Fetch {
                path: path.to_string(),
                reason: format!("flaky failure {}", call + 1),
            });
        }
        Ok(self.bytes.clone())
    }

    fn describe(&self) -> String {
        "flaky".into()
    }
}

/// Answers every fetch after `delay` with an empty body.
pub struct SlowSource {
    delay: Duration,
}

impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl AssetSource for SlowSource {
    fn fetch(&self, _path: &str) -> Result<Vec<u8>, LoadError> {
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }

    fn describe(&self) -> String {
        "slow".into()
    }
}

/// A 2x2 PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

/// Two-node glTF (a triangle with a child triangle) with an embedded buffer.
pub fn gltf_bytes() -> Vec<u8> {
    r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [
            {"name": "body", "mesh": 0, "children": [1]},
            {"name": "panel", "mesh": 0, "translation": [1.0, 0.0, 0.0]}
        ],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1}]}],
        "buffers": [{
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        }],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962},
            {"buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963}
        ],
        "accessors": [
            {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
             "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
            {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
        ]
    }"#
    .as_bytes()
    .to_vec()
}
