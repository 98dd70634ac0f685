use super::camera_controller::CameraFollowController;
use super::input::{FrameInput, InputState};
use super::locomotion::LocomotionIntegrator;
use crate::config::DemoConfig;
use crate::model::{Camera, GroundQuery, PlayerPose};

/// Everything the per-frame simulation touches, without any GPU or DOM state.
pub struct GameState {
    pub player: PlayerPose,
    pub camera: Camera,
    pub input: InputState,
    pub locomotion: LocomotionIntegrator,
    pub follow: CameraFollowController,
}

/// What happened during one [`GameState::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    pub input: FrameInput,
    pub jumped: bool,
}

impl GameState {
    pub fn new(config: &DemoConfig, width: u32, height: u32) -> Self {
        let camera = Camera::new(width, height, &config.camera);
        Self {
            player: PlayerPose::default(),
            camera,
            input: InputState::new(&config.input),
            locomotion: LocomotionIntegrator::new(&config.movement),
            follow: CameraFollowController::new(&config.camera),
        }
    }

    /// Advance one frame.
    ///
    /// Movement is resolved against last frame's camera direction; the camera
    /// then follows the new pose.
    pub fn step(&mut self, dt: f32, ground: &GroundQuery) -> StepReport {
        let dt = dt.clamp(0.0, self.locomotion.max_dt);
        let input = self.input.consume_frame();

        self.follow.apply_look(&mut self.camera, input.look);
        let forward = self.camera.horizontal_forward();
        let jumped = self.locomotion.step(&mut self.player, &input, forward, ground, dt);
        self.follow.follow(&mut self.camera, self.player.position, dt);

        StepReport { input, jumped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input::InputEvent;

    fn state() -> GameState {
        GameState::new(&DemoConfig::default(), 800, 600)
    }

    #[test]
    fn forward_key_walks_away_from_camera() {
        let mut game = state();
        let ground = GroundQuery::flat(0.0);
        game.input.process_event(&InputEvent::KeyDown("KeyW".into()));
        for _ in 0..60 {
            game.step(1.0 / 60.0, &ground);
        }
        assert!((game.player.horizontal_speed() - 4.0).abs() < 1e-4);
        // initial camera sits at +Z looking toward -Z
        assert!(game.player.position.z < -3.5, "z = {}", game.player.position.z);
        assert!(game.player.position.x.abs() < 1e-4);
    }

    #[test]
    fn jump_request_is_consumed_once() {
        let mut game = state();
        let ground = GroundQuery::flat(0.0);
        game.input.process_event(&InputEvent::JumpPressed);
        assert!(game.step(0.016, &ground).jumped);
        assert!(!game.step(0.016, &ground).jumped);
        assert!(game.player.position.y > 0.0);
    }

    #[test]
    fn holding_space_jumps_again_after_landing() {
        let mut game = state();
        let ground = GroundQuery::flat(0.0);
        game.input.process_event(&InputEvent::KeyDown("Space".into()));

        let jumps = (0..180).filter(|_| game.step(1.0 / 60.0, &ground).jumped).count();
        assert!(jumps >= 2, "only {} jumps while held", jumps);

        game.input.process_event(&InputEvent::KeyUp("Space".into()));
        for _ in 0..120 {
            game.step(1.0 / 60.0, &ground);
        }
        assert!(game.player.on_ground);
        assert!(!game.step(1.0 / 60.0, &ground).jumped);
    }

    #[test]
    fn look_is_drained_each_frame() {
        let mut game = state();
        let ground = GroundQuery::flat(0.0);
        game.input.process_event(&InputEvent::StickLook { dx: 10.0, dy: 0.0 });
        game.step(0.016, &ground);
        let yaw = game.camera.yaw;
        assert!(yaw < 0.0);
        game.step(0.016, &ground);
        assert_eq!(game.camera.yaw, yaw);
    }

    #[test]
    fn large_frame_gap_is_clamped() {
        let mut game = state();
        game.input.process_event(&InputEvent::KeyDown("KeyW".into()));
        game.step(5.0, &GroundQuery::flat(0.0));
        assert!((game.player.position.z + 0.2).abs() < 1e-5);
    }
}
