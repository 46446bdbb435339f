//! Keyboard and pointer state for the viewer window.

use glam::Vec2;
use std::collections::HashSet;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Pointer travel, in pixels, below which a press and release count as a click.
const CLICK_SLOP: f32 = 4.0;

/// Input state for the current frame.
#[derive(Debug, Default)]
pub struct InputState {
    /// Keys pressed this frame.
    keys_pressed: HashSet<KeyCode>,
    keys_held: HashSet<KeyCode>,

    mouse_held: HashSet<MouseButton>,
    /// Cursor position in window pixels.
    mouse_position: Vec2,
    /// Cursor travel while the left button is held, this frame.
    drag_delta: Vec2,
    /// Total travel since the left button went down.
    drag_distance: f32,
    /// Release position of a left click this frame.
    click: Option<Vec2>,
    /// Wheel steps this frame, positive away from the user.
    scroll: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call after the frame consumed it.
    pub fn end_frame(&mut self) {
        self.keys_pressed.clear();
        self.drag_delta = Vec2::ZERO;
        self.click = None;
        self.scroll = 0.0;
    }

    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if !self.keys_held.contains(&key) {
                    self.keys_pressed.insert(key);
                }
                self.keys_held.insert(key);
            }
            ElementState::Released => {
                self.keys_held.remove(&key);
            }
        }
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.mouse_held.insert(button);
                if button == MouseButton::Left {
                    self.drag_distance = 0.0;
                }
            }
            ElementState::Released => {
                let was_held = self.mouse_held.remove(&button);
                if was_held && button == MouseButton::Left && self.drag_distance < CLICK_SLOP {
                    self.click = Some(self.mouse_position);
                }
            }
        }
    }

    pub fn process_cursor_position(&mut self, position: (f64, f64)) {
        let position = Vec2::new(position.0 as f32, position.1 as f32);
        if self.mouse_held.contains(&MouseButton::Left) {
            let delta = position - self.mouse_position;
            self.drag_delta += delta;
            self.drag_distance += delta.length();
        }
        self.mouse_position = position;
    }

    pub fn process_scroll(&mut self, steps: f32) {
        self.scroll += steps;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn drag_delta(&self) -> Vec2 {
        self.drag_delta
    }

    pub fn click(&self) -> Option<Vec2> {
        self.click
    }

    pub fn scroll(&self) -> f32 {
        self.scroll
    }
}
