use glam::{EulerRot, Quat, Vec2, Vec3};

use crate::config::CameraConfig;
use crate::model::Camera;

/// Orbiting third-person camera that trails the player.
pub struct CameraFollowController {
    pub distance: f32,
    pub height: f32,
    pub look_height_factor: f32,
    pub pitch_limit: f32,
    pub smoothing_base: f32,
}

impl CameraFollowController {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            distance: config.distance,
            height: config.height,
            look_height_factor: config.look_height_factor,
            pitch_limit: config.pitch_limit,
            smoothing_base: config.smoothing_base,
        }
    }

    /// Apply a look delta in radians.
    pub fn apply_look(&self, camera: &mut Camera, look: Vec2) {
        camera.yaw -= look.x;
        camera.pitch = (camera.pitch - look.y).clamp(-self.pitch_limit, self.pitch_limit);
    }

    /// Lerp factor for one frame; independent of frame rate.
    pub fn smoothing_factor(&self, dt: f32) -> f32 {
        1.0 - self.smoothing_base.powf(dt.max(0.0))
    }

    pub fn offset(&self, yaw: f32, pitch: f32) -> Vec3 {
        let rot = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
        rot * Vec3::new(0.0, self.height, self.distance)
    }

    pub fn desired_eye(&self, camera: &Camera, subject: Vec3) -> Vec3 {
        subject + self.offset(camera.yaw, camera.pitch)
    }

    pub fn look_target(&self, subject: Vec3) -> Vec3 {
        subject + Vec3::new(0.0, self.height * self.look_height_factor, 0.0)
    }

    /// Ease the eye toward its orbit position and aim at the subject.
    pub fn follow(&self, camera: &mut Camera, subject: Vec3, dt: f32) {
        let desired = self.desired_eye(camera, subject);
        camera.eye = camera.eye.lerp(desired, self.smoothing_factor(dt));
        camera.look_at(self.look_target(subject));
    }

    /// Jump straight to the orbit position, e.g. after a teleport.
    pub fn snap(&self, camera: &mut Camera, subject: Vec3) {
        camera.eye = self.desired_eye(camera, subject);
        camera.look_at(self.look_target(subject));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (CameraFollowController, Camera) {
        let config = CameraConfig::default();
        (CameraFollowController::new(&config), Camera::new(800, 600, &config))
    }

    #[test]
    fn pitch_stays_clamped() {
        let (ctrl, mut cam) = setup();
        let deltas = [5.0, -0.3, -12.0, 0.59, 0.02, 100.0, -0.61, -3.3];
        for (i, dy) in deltas.iter().enumerate() {
            ctrl.apply_look(&mut cam, Vec2::new(i as f32 * 0.1, *dy));
            assert!(cam.pitch.abs() <= 0.6, "pitch {} after {}", cam.pitch, dy);
        }
    }

    #[test]
    fn look_right_decreases_yaw() {
        let (ctrl, mut cam) = setup();
        ctrl.apply_look(&mut cam, Vec2::new(0.25, 0.0));
        assert!((cam.yaw + 0.25).abs() < 1e-6);
    }

    #[test]
    fn zero_rotation_offset_is_behind_and_above() {
        let (ctrl, _) = setup();
        let o = ctrl.offset(0.0, 0.0);
        assert!((o - Vec3::new(0.0, 1.6, 4.0)).length() < 1e-6);
    }

    #[test]
    fn yaw_orbits_horizontally() {
        let (ctrl, _) = setup();
        let o = ctrl.offset(std::f32::consts::FRAC_PI_2, 0.0);
        assert!((o - Vec3::new(4.0, 1.6, 0.0)).length() < 1e-5, "got {:?}", o);
    }

    #[test]
    fn smoothing_is_frame_rate_independent() {
        let (ctrl, _) = setup();
        let one = ctrl.smoothing_factor(0.1);
        let two = ctrl.smoothing_factor(0.05);
        // two half steps leave the same remainder as one full step
        assert!(((1.0 - two) * (1.0 - two) - (1.0 - one)).abs() < 1e-6);
        assert_eq!(ctrl.smoothing_factor(0.0), 0.0);
    }

    #[test]
    fn follow_converges_and_aims_at_subject() {
        let (ctrl, mut cam) = setup();
        let subject = Vec3::new(10.0, 2.0, -3.0);
        for _ in 0..300 {
            ctrl.follow(&mut cam, subject, 1.0 / 60.0);
        }
        let desired = ctrl.desired_eye(&cam, subject);
        assert!((cam.eye - desired).length() < 1e-3);
        assert!((cam.target - Vec3::new(10.0, 2.0 + 1.44, -3.0)).length() < 1e-5);
    }
}
