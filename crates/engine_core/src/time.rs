//! Frame timing for the render loop: monotonic clock, frame-rate gate and FPS window.

use std::time::{Duration, Instant};

/// Monotonic high-resolution clock. Timestamps are milliseconds since creation,
/// the same unit every per-frame callback receives.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    start: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created.
    pub fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Duration elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Caps how often the loop does work. Ticks arriving sooner than the interval
/// after the last admitted tick are dropped (coalesced), never queued.
#[derive(Debug, Clone)]
pub struct FrameLimiter {
    interval_ms: f64,
    last_admitted: Option<f64>,
    admitted: u64,
}

impl FrameLimiter {
    /// Create a limiter for the given target rate in Hz. Non-positive rates disable the cap.
    pub fn new(target_fps: f64) -> Self {
        let interval_ms = if target_fps > 0.0 { 1000.0 / target_fps } else { 0.0 };
        Self {
            interval_ms,
            last_admitted: None,
            admitted: 0,
        }
    }

    /// Returns true if a tick at `now_ms` should run. The first tick always runs.
    pub fn admit(&mut self, now_ms: f64) -> bool {
        if let Some(last) = self.last_admitted {
            if now_ms - last < self.interval_ms {
                return false;
            }
        }
        self.last_admitted = Some(now_ms);
        self.admitted += 1;
        true
    }

    /// Minimum spacing between admitted ticks.
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Number of ticks admitted so far.
    pub fn admitted(&self) -> u64 {
        self.admitted
    }
}

/// Frame-counting accumulator that reports FPS once per window (default one second).
#[derive(Debug, Clone)]
pub struct FpsWindow {
    window_ms: f64,
    window_start: Option<f64>,
    frames: u32,
    last_fps: Option<f32>,
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

impl FpsWindow {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            window_start: None,
            frames: 0,
            last_fps: None,
        }
    }

    /// Count a frame at `now_ms`. Returns the FPS when a window closes:
    /// frames-this-window × 1000 / elapsed-ms.
    pub fn frame(&mut self, now_ms: f64) -> Option<f32> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now_ms);
            return None;
        };
        self.frames += 1;
        let elapsed = now_ms - start;
        if elapsed < self.window_ms {
            return None;
        }
        let fps = (self.frames as f64 * 1000.0 / elapsed) as f32;
        self.frames = 0;
        self.window_start = Some(now_ms);
        self.last_fps = Some(fps);
        Some(fps)
    }

    /// FPS reported by the last closed window.
    pub fn last_fps(&self) -> Option<f32> {
        self.last_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_coalesces_early_ticks() {
        let mut limiter = FrameLimiter::new(60.0);
        assert!(limiter.admit(0.0));
        assert!(!limiter.admit(5.0));
        assert!(!limiter.admit(16.0));
        assert!(limiter.admit(17.0));
        assert_eq!(limiter.admitted(), 2);
    }

    #[test]
    fn limiter_without_cap_admits_everything() {
        let mut limiter = FrameLimiter::new(0.0);
        assert!(limiter.admit(0.0));
        assert!(limiter.admit(0.0));
        assert!(limiter.admit(0.5));
    }

    #[test]
    fn fps_window_reports_once_per_second() {
        let mut window = FpsWindow::default();
        let mut reports = Vec::new();
        for k in 0..=50 {
            if let Some(fps) = window.frame(k as f64 * 20.0) {
                reports.push(fps);
            }
        }
        assert_eq!(reports.len(), 1);
        assert!((reports[0] - 50.0).abs() < 1e-3);
        assert_eq!(window.last_fps(), Some(reports[0]));
    }
}
