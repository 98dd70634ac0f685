// MODEL: Subject, camera and ground data
pub mod camera;
pub mod ground;
pub mod player;

pub use camera::Camera;
pub use ground::{GroundQuery, Surface};
pub use player::PlayerPose;
