use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use super::input::FrameInput;
use crate::config::MovementConfig;
use crate::model::{GroundQuery, PlayerPose};

/// Wrap an angle into (-PI, PI].
pub fn wrap_angle(a: f32) -> f32 {
    let w = (a + PI).rem_euclid(TAU) - PI;
    if w <= -PI { w + TAU } else { w }
}

/// Rotate `current` toward `target` along the shortest arc by `fraction` of the gap.
pub fn turn_toward(current: f32, target: f32, fraction: f32) -> f32 {
    let diff = wrap_angle(target - current);
    wrap_angle(current + diff * fraction.clamp(0.0, 1.0))
}

/// Camera-relative walking, gravity and jumping over a [`GroundQuery`].
pub struct LocomotionIntegrator {
    pub walk_speed: f32,
    pub jump_speed: f32,
    pub gravity: f32,
    pub turn_rate: f32,
    pub max_dt: f32,
    pub ground_epsilon: f32,
    pub move_epsilon: f32,
}

impl LocomotionIntegrator {
    pub fn new(config: &MovementConfig) -> Self {
        Self {
            walk_speed: config.walk_speed,
            jump_speed: config.jump_speed,
            gravity: config.gravity,
            turn_rate: config.turn_rate,
            max_dt: config.max_dt,
            ground_epsilon: config.ground_epsilon,
            move_epsilon: config.move_epsilon,
        }
    }

    /// World-space walk direction for `movement` relative to `camera_forward`.
    /// The result is not normalized.
    pub fn direction(&self, movement: Vec2, camera_forward: Vec3) -> Vec3 {
        let mut forward = Vec3::new(camera_forward.x, 0.0, camera_forward.z);
        forward = if forward.length_squared() > 0.0 { forward.normalize() } else { Vec3::NEG_Z };
        let lateral = Vec3::new(forward.z, 0.0, -forward.x);
        forward * movement.y + lateral * movement.x
    }

    /// Advance `pose` by one frame. Returns true if a jump started.
    pub fn step(
        &self,
        pose: &mut PlayerPose,
        input: &FrameInput,
        camera_forward: Vec3,
        ground: &GroundQuery,
        dt: f32,
    ) -> bool {
        let dt = dt.clamp(0.0, self.max_dt);

        let dir = self.direction(input.movement.unwrap_or(Vec2::ZERO), camera_forward);
        if dir.length_squared() > self.move_epsilon {
            let v = dir.normalize() * self.walk_speed;
            pose.velocity.x = v.x;
            pose.velocity.z = v.z;
            let target_yaw = v.x.atan2(v.z);
            pose.yaw = turn_toward(pose.yaw, target_yaw, self.turn_rate * dt);
        } else {
            pose.velocity.x = 0.0;
            pose.velocity.z = 0.0;
        }

        pose.position.x += pose.velocity.x * dt;
        pose.position.z += pose.velocity.z * dt;

        pose.velocity.y += self.gravity * dt;
        let tentative = pose.position.y + pose.velocity.y * dt;
        let ground_y = ground.height_at(pose.position.x, pose.position.z);
        if tentative <= ground_y + self.ground_epsilon {
            pose.position.y = ground_y;
            pose.velocity.y = 0.0;
            pose.on_ground = true;
        } else {
            pose.position.y = tentative;
            pose.on_ground = false;
        }

        // requests were already consumed upstream, so an airborne one is dropped
        if (input.jump_request || input.jump_held) && pose.on_ground {
            pose.velocity.y = self.jump_speed;
            pose.on_ground = false;
            tracing::debug!("Jump at {:?}", pose.position);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrator() -> LocomotionIntegrator {
        LocomotionIntegrator::new(&MovementConfig::default())
    }

    fn forward_input() -> FrameInput {
        FrameInput { movement: Some(Vec2::new(0.0, 1.0)), ..FrameInput::default() }
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-6);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-6);
        for i in -50..50 {
            let w = wrap_angle(i as f32 * 0.77);
            assert!(w > -PI && w <= PI, "{} out of range", w);
        }
    }

    #[test]
    fn turn_takes_shortest_path() {
        // from just below +PI to just above -PI is a short positive step
        let yaw = turn_toward(3.0, -3.0, 0.5);
        assert!(yaw > 3.0 || yaw < -3.0, "turned the long way: {}", yaw);
    }

    #[test]
    fn walks_at_walk_speed() {
        let loco = integrator();
        let mut pose = PlayerPose::default();
        pose.on_ground = true;
        let ground = GroundQuery::flat(0.0);
        for _ in 0..30 {
            loco.step(&mut pose, &forward_input(), Vec3::NEG_Z, &ground, 1.0 / 60.0);
            assert!((pose.horizontal_speed() - 4.0).abs() < 1e-5);
        }
        assert!(pose.position.z < 0.0);
        assert_eq!(pose.position.y, 0.0);
    }

    #[test]
    fn diagonal_is_normalized() {
        let loco = integrator();
        let mut pose = PlayerPose::default();
        let input = FrameInput { movement: Some(Vec2::new(1.0, 1.0)), ..FrameInput::default() };
        loco.step(&mut pose, &input, Vec3::NEG_Z, &GroundQuery::flat(0.0), 0.016);
        assert!((pose.horizontal_speed() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn positive_lane_is_camera_left() {
        let loco = integrator();
        let dir = loco.direction(Vec2::new(1.0, 0.0), Vec3::NEG_Z);
        assert!((dir - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn no_input_stops_horizontally() {
        let loco = integrator();
        let mut pose = PlayerPose::default();
        pose.velocity = Vec3::new(3.0, 0.0, 3.0);
        let input = FrameInput { movement: Some(Vec2::splat(0.001)), ..FrameInput::default() };
        loco.step(&mut pose, &input, Vec3::NEG_Z, &GroundQuery::flat(0.0), 0.016);
        assert_eq!(pose.horizontal_speed(), 0.0);
    }

    #[test]
    fn vertical_camera_falls_back_to_neg_z() {
        let loco = integrator();
        let dir = loco.direction(Vec2::new(0.0, 1.0), Vec3::NEG_Y);
        assert_eq!(dir, Vec3::NEG_Z);
    }

    #[test]
    fn facing_turns_toward_motion() {
        let loco = integrator();
        let mut pose = PlayerPose::default();
        for _ in 0..200 {
            loco.step(&mut pose, &forward_input(), Vec3::X, &GroundQuery::flat(0.0), 0.02);
        }
        // moving along +X faces atan2(1, 0)
        assert!((pose.yaw - PI / 2.0).abs() < 1e-3, "yaw {}", pose.yaw);
    }

    #[test]
    fn free_fall_matches_closed_form() {
        let loco = integrator();
        let ground = GroundQuery::flat(-1000.0);
        let mut pose = PlayerPose::default();
        pose.position.y = 10.0;
        let dt = 0.02;
        for n in 1..=40u32 {
            loco.step(&mut pose, &FrameInput::default(), Vec3::NEG_Z, &ground, dt);
            let n = n as f32;
            let expected = 10.0 + loco.gravity * dt * dt * n * (n + 1.0) / 2.0;
            assert!((pose.position.y - expected).abs() < 1e-3, "step {}: {} vs {}", n, pose.position.y, expected);
            assert!(!pose.on_ground);
        }
    }

    #[test]
    fn ground_clamp_is_immediate() {
        let loco = integrator();
        let ground = GroundQuery::flat(0.0);
        let mut pose = PlayerPose::default();
        pose.position.y = 0.05;
        pose.velocity.y = -5.0;
        loco.step(&mut pose, &FrameInput::default(), Vec3::NEG_Z, &ground, 0.02);
        assert_eq!(pose.position.y, 0.0);
        assert_eq!(pose.velocity.y, 0.0);
        assert!(pose.on_ground);
    }

    #[test]
    fn jump_from_ground_sets_velocity() {
        let loco = integrator();
        let ground = GroundQuery::flat(0.0);
        let mut pose = PlayerPose::default();
        let input = FrameInput { jump_request: true, ..FrameInput::default() };
        assert!(loco.step(&mut pose, &input, Vec3::NEG_Z, &ground, 0.016));
        assert_eq!(pose.velocity.y, 8.0);
        assert!(!pose.on_ground);
    }

    #[test]
    fn airborne_jump_does_nothing() {
        let loco = integrator();
        let ground = GroundQuery::flat(0.0);
        let mut pose = PlayerPose::default();
        pose.position.y = 5.0;
        let mut reference = pose;
        let input = FrameInput { jump_request: true, ..FrameInput::default() };
        assert!(!loco.step(&mut pose, &input, Vec3::NEG_Z, &ground, 0.016));
        loco.step(&mut reference, &FrameInput::default(), Vec3::NEG_Z, &ground, 0.016);
        assert_eq!(pose, reference);
    }

    #[test]
    fn held_jump_fires_on_landing() {
        let loco = integrator();
        let ground = GroundQuery::flat(0.0);
        let mut pose = PlayerPose::default();
        pose.position.y = 1.0;
        let held = FrameInput { jump_held: true, ..FrameInput::default() };

        assert!(!loco.step(&mut pose, &held, Vec3::NEG_Z, &ground, 0.016));
        assert!(pose.velocity.y < 0.0);

        let mut steps = 0;
        while !loco.step(&mut pose, &held, Vec3::NEG_Z, &ground, 0.016) {
            assert!(!pose.on_ground);
            steps += 1;
            assert!(steps < 200, "never landed");
        }
        assert_eq!(pose.position.y, 0.0);
        assert_eq!(pose.velocity.y, 8.0);
        assert!(!pose.on_ground);
    }

    #[test]
    fn dt_is_clamped() {
        let loco = integrator();
        let mut pose = PlayerPose::default();
        loco.step(&mut pose, &forward_input(), Vec3::NEG_Z, &GroundQuery::flat(0.0), 2.0);
        assert!((pose.position.z + 4.0 * 0.05).abs() < 1e-6);
    }

    #[test]
    fn lands_on_raised_ground() {
        use crate::model::Surface;
        let y = 2.0;
        let p = |x, z| Vec3::new(x, y, z);
        let ground = GroundQuery::from_surfaces(vec![
            Surface::new(p(-5.0, -5.0), p(5.0, 5.0), p(5.0, -5.0), false),
            Surface::new(p(-5.0, -5.0), p(-5.0, 5.0), p(5.0, 5.0), false),
        ]);
        let mut pose = PlayerPose::default();
        pose.position.y = 3.0;
        for _ in 0..100 {
            loco_step(&ground, &mut pose);
        }
        assert!((pose.position.y - 2.0).abs() < 1e-6);
        assert!(pose.on_ground);

        fn loco_step(ground: &GroundQuery, pose: &mut PlayerPose) {
            integrator().step(pose, &FrameInput::default(), Vec3::NEG_Z, ground, 0.016);
        }
    }
}
