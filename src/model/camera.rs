use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32, config: &CameraConfig) -> Self {
        Self {
            eye: Vec3::new(0.0, config.height, config.distance),
            target: Vec3::new(0.0, config.height, 0.0),
            yaw: 0.0,
            pitch: config.initial_pitch,
            up: Vec3::Y,
            fov_y: config.fov_y_degrees.to_radians(),
            aspect: aspect_ratio(width, height),
            z_near: config.z_near,
            z_far: config.z_far,
        }
    }

    /// View direction; -Z when eye and target coincide.
    pub fn forward(&self) -> Vec3 {
        let dir = (self.target - self.eye).normalize_or_zero();
        if dir == Vec3::ZERO { Vec3::NEG_Z } else { dir }
    }

    /// View direction flattened onto the ground plane.
    pub fn horizontal_forward(&self) -> Vec3 {
        let mut f = self.forward();
        f.y = 0.0;
        if f.length_squared() == 0.0 {
            return Vec3::NEG_Z;
        }
        f.normalize()
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
    }

    pub fn view_proj(&self) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.eye + self.forward(), self.up);
        let proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far);
        proj * view
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_behind_origin_looking_forward() {
        let cam = Camera::new(800, 600, &CameraConfig::default());
        assert_eq!(cam.forward(), Vec3::NEG_Z);
        assert_eq!(cam.horizontal_forward(), Vec3::NEG_Z);
    }

    #[test]
    fn straight_down_view_falls_back_to_neg_z() {
        let mut cam = Camera::new(800, 600, &CameraConfig::default());
        cam.eye = Vec3::new(0.0, 10.0, 0.0);
        cam.look_at(Vec3::ZERO);
        assert_eq!(cam.horizontal_forward(), Vec3::NEG_Z);
    }

    #[test]
    fn horizontal_forward_is_unit_length() {
        let mut cam = Camera::new(800, 600, &CameraConfig::default());
        cam.eye = Vec3::new(3.0, 5.0, 3.0);
        cam.look_at(Vec3::new(0.0, 1.0, 0.0));
        let f = cam.horizontal_forward();
        assert!((f.length() - 1.0).abs() < 1e-6);
        assert_eq!(f.y, 0.0);
    }

    #[test]
    fn zero_height_window_does_not_divide_by_zero() {
        let mut cam = Camera::new(800, 600, &CameraConfig::default());
        cam.set_aspect(800, 0);
        assert!(cam.aspect.is_finite());
    }
}
