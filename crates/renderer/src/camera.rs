//! Perspective camera and orbit-style camera controls.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Perspective camera looking at a target point.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Aspect ratio (width / height) of the viewport, not the surface.
    pub aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_degrees: 40.0,
            near: 0.1,
            far: 2000.0,
            aspect: 1.0,
        }
    }
}

impl Camera {
    pub fn new(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_degrees,
            aspect,
            near,
            far,
            ..Default::default()
        }
    }

    /// Update aspect ratio (call on viewport resize).
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// World-space ray through a point in normalized device coordinates (x right, y up, [-1, 1]).
    pub fn ray(&self, ndc: Vec2) -> (Vec3, Vec3) {
        let inverse = self.view_projection_matrix().inverse();
        let near = inverse.project_point3(ndc.extend(0.0));
        let far = inverse.project_point3(ndc.extend(1.0));
        (self.position, (far - near).normalize_or_zero())
    }
}

/// Orbit controls: rotate around a target on a sphere, dolly in and out within
/// distance bounds. Input accumulates into deltas that `update` applies, with
/// optional exponential damping so motion eases out over several frames.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub enable_pan: bool,
    /// Keep the camera within `[min_distance, max_distance]` of the target. Turned
    /// off while something else drives the camera.
    pub clamp_distance: bool,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vec3,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            enable_damping: true,
            damping_factor: 0.05,
            min_distance: 3.0,
            max_distance: 8.0,
            rotate_speed: 0.5,
            zoom_speed: 0.5,
            enable_pan: false,
            clamp_distance: true,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }
}

impl OrbitControls {
    const POLE_EPSILON: f32 = 1e-6;

    /// Rotate by a pointer drag of `delta` pixels inside a viewport `viewport_height` pixels tall.
    pub fn rotate(&mut self, delta: Vec2, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        self.theta_delta -= std::f32::consts::TAU * delta.x / height * self.rotate_speed;
        self.phi_delta -= std::f32::consts::TAU * delta.y / height * self.rotate_speed;
    }

    /// Wheel input: positive steps zoom out, negative steps zoom in.
    pub fn zoom(&mut self, steps: f32) {
        if steps == 0.0 {
            return;
        }
        let zoom_scale = 0.95_f32.powf(self.zoom_speed * steps.abs());
        if steps > 0.0 {
            self.scale /= zoom_scale;
        } else {
            self.scale *= zoom_scale;
        }
    }

    /// Pan the target in view space. Returns false when panning is disabled.
    pub fn pan(&mut self, camera: &Camera, delta: Vec2, viewport_height: f32) -> bool {
        if !self.enable_pan {
            return false;
        }
        let distance = (camera.position - self.target).length();
        let half_fov = (camera.fov_degrees.to_radians() / 2.0).tan();
        let world_per_pixel = 2.0 * distance * half_fov / viewport_height.max(1.0);
        let right = camera.forward().cross(camera.up).normalize_or_zero();
        let up = right.cross(camera.forward()).normalize_or_zero();
        self.pan_offset += (-right * delta.x + up * delta.y) * world_per_pixel;
        true
    }

    /// Apply accumulated input to the camera. Call once per frame.
    pub fn update(&mut self, camera: &mut Camera) {
        let offset = camera.position - self.target;
        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, std::f32::consts::FRAC_PI_2)
        };

        let step = if self.enable_damping { self.damping_factor } else { 1.0 };
        theta += self.theta_delta * step;
        phi = (phi + self.phi_delta * step)
            .clamp(Self::POLE_EPSILON, std::f32::consts::PI - Self::POLE_EPSILON);

        radius *= self.scale;
        if self.clamp_distance {
            radius = radius.clamp(self.min_distance, self.max_distance);
        }

        if self.enable_pan {
            self.target += self.pan_offset * step;
        }

        let sin_phi = phi.sin();
        let spherical = Vec3::new(radius * sin_phi * theta.sin(), radius * phi.cos(), radius * sin_phi * theta.cos());
        camera.position = self.target + spherical;
        camera.look_at(self.target);

        if self.enable_damping {
            self.theta_delta *= 1.0 - self.damping_factor;
            self.phi_delta *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;
    }

    /// True while damped rotation is still settling.
    pub fn is_moving(&self) -> bool {
        self.theta_delta.abs() > 1e-5 || self.phi_delta.abs() > 1e-5
    }
}

/// Camera uniform data for GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub position: [f32; 4], // w unused, padding
    /// Viewport size in pixels (xy), zw unused.
    pub viewport: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            view: Mat4::IDENTITY.to_cols_array_2d(),
            proj: Mat4::IDENTITY.to_cols_array_2d(),
            position: [0.0, 0.0, 0.0, 1.0],
            viewport: [1.0, 1.0, 0.0, 0.0],
        }
    }

    pub fn update(&mut self, camera: &Camera, viewport_size: Vec2) {
        self.view = camera.view_matrix().to_cols_array_2d();
        self.proj = camera.projection_matrix().to_cols_array_2d();
        self.view_proj = camera.view_projection_matrix().to_cols_array_2d();
        let pos = camera.position;
        self.position = [pos.x, pos.y, pos.z, 1.0];
        self.viewport = [viewport_size.x.max(1.0), viewport_size.y.max(1.0), 0.0, 0.0];
    }

    pub fn from_camera(camera: &Camera, viewport_size: Vec2) -> Self {
        let mut uniform = Self::new();
        uniform.update(camera, viewport_size);
        uniform
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}
