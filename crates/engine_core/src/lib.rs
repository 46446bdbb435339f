//! Core engine types and utilities for satview.
//!
//! This crate provides the foundational types used across all engine systems:
//! - Transform and spatial components
//! - Frame timing (clock, frame-rate gate, FPS window)
//! - The hecs-backed scene graph and its node components

pub mod components;
pub mod scene_graph;
pub mod time;
pub mod transform;

pub use components::*;
pub use scene_graph::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use hecs::{Entity, World};
