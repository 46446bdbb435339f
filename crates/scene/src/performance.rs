//! Frame-rate and renderer counter sampling. Read-only with respect to the scene.

use crate::context::SceneContext;
use engine_core::FpsWindow;
use renderer::RenderInfo;

/// One closed sampling window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
    pub fps: f32,
    pub geometries: u32,
    pub textures: u32,
    pub materials: u32,
    pub triangles: u32,
    pub draw_calls: u32,
    pub points: u32,
    pub lines: u32,
}

impl PerformanceStats {
    fn new(fps: f32, info: RenderInfo) -> Self {
        Self {
            fps,
            geometries: info.geometries,
            textures: info.textures,
            materials: info.materials,
            triangles: info.triangles,
            draw_calls: info.draw_calls,
            points: info.points,
            lines: info.lines,
        }
    }

    /// Short status line for a title bar or overlay.
    pub fn summary(&self) -> String {
        format!(
            "FPS: {:.0} | geometries: {} | textures: {} | triangles: {}",
            self.fps, self.geometries, self.textures, self.triangles
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceMonitor {
    window: FpsWindow,
    stats: Option<PerformanceStats>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame. When a one-second window closes, snapshot the counters.
    pub fn frame(&mut self, now_ms: f64, info: RenderInfo) -> Option<PerformanceStats> {
        let fps = self.window.frame(now_ms)?;
        let stats = PerformanceStats::new(fps, info);
        log::debug!("{}", stats.summary());
        self.stats = Some(stats);
        Some(stats)
    }

    pub fn sample(&mut self, ctx: &SceneContext, now_ms: f64) -> Option<PerformanceStats> {
        self.frame(now_ms, ctx.render_info())
    }

    /// Stats of the last closed window.
    pub fn stats(&self) -> Option<PerformanceStats> {
        self.stats
    }
}
