//! Orbit camera sized to the bounding sphere.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

const MIN_PITCH: f32 = -1.5;
const MAX_PITCH: f32 = 1.5;

/// Camera block bound at `@group(1) @binding(0)` in both render stages.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub particle_size: f32,
    pub line_width: f32,
    pub _padding: [f32; 2],
}

/// Orbit camera looking at the origin.
pub struct Camera {
    /// Horizontal rotation angle in radians.
    pub yaw: f32,
    /// Vertical rotation angle in radians.
    pub pitch: f32,
    /// Distance from the target point.
    pub distance: f32,
    pub target: Vec3,
    radius: f32,
}

impl Camera {
    /// Camera framing a sphere of `radius` around the origin.
    pub fn for_radius(radius: f32) -> Self {
        let radius = radius.max(1.0);
        Self {
            yaw: 0.0,
            pitch: 0.3,
            distance: radius * 3.0,
            target: Vec3::ZERO,
            radius,
        }
    }

    pub fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    /// Perspective projection with near and far planes that keep the whole
    /// sphere in range at any zoom level.
    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let near = (self.radius * 0.001).max(0.01);
        let far = self.distance + self.radius * 4.0;
        Mat4::perspective_rh(45.0_f32.to_radians(), aspect.max(0.01), near, far) * self.view_matrix()
    }

    /// Rotate by a drag of `dx`, `dy` pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * 0.005;
        self.pitch = (self.pitch + dy * 0.005).clamp(MIN_PITCH, MAX_PITCH);
    }

    /// Zoom by `steps` wheel notches. Positive moves closer.
    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * (1.0 - steps * 0.1)).clamp(self.radius * 0.2, self.radius * 20.0);
    }

    /// Uniform block for the current view.
    pub fn uniform(&self, aspect: f32) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_proj(aspect).to_cols_array_2d(),
            particle_size: self.radius * 0.006,
            line_width: self.radius * 0.0015,
            _padding: [0.0; 2],
        }
    }
}
