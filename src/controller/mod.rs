// CONTROLLER: Input, locomotion, camera follow and the update loop
pub mod input;
pub mod touch;
pub mod gamepad;
pub mod locomotion;
pub mod camera_controller;
pub mod game_state;
pub mod frame_loop;

pub use input::{DebugAction, FrameInput, InputEvent, InputProcessor, InputQueue, InputState, MoveSource};
pub use touch::TouchControls;
pub use gamepad::{GamepadPoller, GamepadSnapshot};
pub use locomotion::LocomotionIntegrator;
pub use camera_controller::CameraFollowController;
pub use game_state::{GameState, StepReport};
pub use frame_loop::{FrameClock, FrameLoopContext};
