use glam::Vec3;

/// Position, facing and velocity of the walking character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPose {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Facing angle around +Y; zero faces +Z.
    pub yaw: f32,
    pub on_ground: bool,
}

impl PlayerPose {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            yaw: 0.0,
            on_ground: true,
        }
    }

    pub fn horizontal_speed(&self) -> f32 {
        Vec3::new(self.velocity.x, 0.0, self.velocity.z).length()
    }
}

impl Default for PlayerPose {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}
