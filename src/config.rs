//! Demo tunables, loaded from `config.ron` when one is available.
//!
//! Every section carries `#[serde(default)]`, so a partial file only overrides
//! the fields it names and everything else keeps the built-in value.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::controller::input::MoveSource;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub movement: MovementConfig,
    pub camera: CameraConfig,
    pub input: InputConfig,
    pub lighting: LightingConfig,
    pub assets: AssetConfig,
}

/// Locomotion constants (units per second, radians).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub walk_speed: f32,
    pub jump_speed: f32,
    pub gravity: f32,
    /// Fraction of the remaining heading error closed per second.
    pub turn_rate: f32,
    /// Upper bound on a single integration step, in seconds.
    pub max_dt: f32,
    pub ground_epsilon: f32,
    pub move_epsilon: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 4.0,
            jump_speed: 8.0,
            gravity: -20.0,
            turn_rate: 10.0,
            max_dt: 0.05,
            ground_epsilon: 0.001,
            move_epsilon: 0.0001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub distance: f32,
    pub height: f32,
    /// The camera aims at `height * look_height_factor` above the subject.
    pub look_height_factor: f32,
    pub initial_pitch: f32,
    pub pitch_limit: f32,
    /// Remaining distance fraction after one second of smoothing.
    pub smoothing_base: f32,
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 4.0,
            height: 1.6,
            look_height_factor: 0.9,
            initial_pitch: 0.2,
            pitch_limit: 0.6,
            smoothing_base: 0.01,
            fov_y_degrees: 60.0,
            z_near: 0.1,
            z_far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dead_zone: f32,
    /// Radians per pixel of pointer-locked mouse motion.
    pub mouse_sensitivity: f32,
    /// Radians per look unit reported by touch and gamepad sticks.
    pub look_sensitivity: f32,
    pub stick_radius: f32,
    pub knob_radius: f32,
    pub touch_look_scale: f32,
    pub gamepad_look_scale: f32,
    /// Mirror the lateral component of stick movement.
    pub invert_move_x: bool,
    /// Movement providers, highest priority first.
    pub precedence: Vec<MoveSource>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.15,
            mouse_sensitivity: 0.0025,
            look_sensitivity: 0.0025 + 0.025,
            stick_radius: 56.0,
            knob_radius: 28.0,
            touch_look_scale: 12.0,
            gamepad_look_scale: 6.0,
            invert_move_x: true,
            precedence: vec![MoveSource::Touch, MoveSource::Gamepad, MoveSource::Keyboard],
        }
    }
}

/// Light rig, colors in linear RGB.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub sky_color: [f32; 3],
    pub ground_color: [f32; 3],
    pub hemisphere_intensity: f32,
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub sun_color: [f32; 3],
    pub sun_intensity: f32,
    pub sun_position: [f32; 3],
    /// Sun offset from the player once the character model is in place.
    pub sun_follow_offset: [f32; 3],
    pub exposure: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            sky_color: hex_rgb(0xccccff),
            ground_color: hex_rgb(0x555555),
            hemisphere_intensity: 1.0,
            ambient_color: [1.0, 1.0, 1.0],
            ambient_intensity: 0.08,
            sun_color: [1.0, 1.0, 1.0],
            sun_intensity: 1.25,
            sun_position: [4.5, 10.0, 6.5],
            sun_follow_offset: [5.0, 10.0, 7.0],
            exposure: 1.12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub environment: String,
    pub map: String,
    pub default_model: String,
    /// Base that relative model preferences are joined onto.
    pub model_root: String,
    /// Storage key holding the selected character model.
    pub model_preference_key: String,
    pub skip_environment: bool,
    pub character_height: f32,
    pub character_max_footprint: f32,
    pub ground_size: f32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            environment: "assets/park.hdr".to_string(),
            map: "assets/map/scene.gltf".to_string(),
            default_model: "assets/skins/test/test.gltf".to_string(),
            model_root: "./".to_string(),
            model_preference_key: "Model".to_string(),
            skip_environment: false,
            character_height: 1.8,
            character_max_footprint: 1.0,
            ground_size: 200.0,
        }
    }
}

impl DemoConfig {
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Parse `text`, falling back to defaults with a warning if it is invalid.
    pub fn from_ron_or_default(text: &str, origin: &str) -> Self {
        match Self::from_ron(text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid config at {}: {}, using defaults", origin, e);
                Self::default()
            }
        }
    }

    /// Load from a file on disk. Missing files silently yield defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ron_or_default(&text, &path.display().to_string()),
            Err(_) => Self::default(),
        }
    }
}

/// Convert a `0xRRGGBB` sRGB color into linear RGB.
pub fn hex_rgb(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
