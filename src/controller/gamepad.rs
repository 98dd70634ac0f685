//! Gamepad polling, once per frame.

use glam::Vec2;

use super::input::{InputEvent, MoveSource};
use super::touch::{apply_radial_dead_zone, stick_to_movement};
use crate::config::InputConfig;

/// State of the first connected pad: left stick x/y, right stick x/y, button 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub axes: [f32; 4],
    pub button_a: bool,
}

impl GamepadSnapshot {
    pub fn left_stick(&self) -> Vec2 {
        Vec2::new(self.axes[0], self.axes[1])
    }

    pub fn right_stick(&self) -> Vec2 {
        Vec2::new(self.axes[2], self.axes[3])
    }
}

/// Turns successive snapshots into input events.
pub struct GamepadPoller {
    connected: bool,
    previous_a: bool,
    dead_zone: f32,
    look_scale: f32,
    invert_move_x: bool,
}

impl GamepadPoller {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            connected: false,
            previous_a: false,
            dead_zone: config.dead_zone,
            look_scale: config.gamepad_look_scale,
            invert_move_x: config.invert_move_x,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn poll(&mut self, pad: Option<GamepadSnapshot>, out: &mut Vec<InputEvent>) {
        let Some(pad) = pad else {
            if self.connected {
                tracing::info!("Gamepad disconnected");
                self.connected = false;
                self.previous_a = false;
                out.push(InputEvent::GamepadConnected(false));
            }
            return;
        };

        if !self.connected {
            tracing::info!("Gamepad connected");
            self.connected = true;
            out.push(InputEvent::GamepadConnected(true));
        }

        let raw = pad.left_stick();
        let raw = if raw.length_squared() > 1.0 { raw.normalize() } else { raw };
        let movement = apply_radial_dead_zone(raw, self.dead_zone);
        out.push(InputEvent::MoveAxis {
            source: MoveSource::Gamepad,
            vector: Some(stick_to_movement(movement, self.invert_move_x)),
        });

        let look = pad.right_stick() * self.look_scale;
        if look != Vec2::ZERO {
            out.push(InputEvent::StickLook { dx: look.x, dy: look.y });
        }

        if pad.button_a && !self.previous_a {
            out.push(InputEvent::JumpPressed);
        }
        self.previous_a = pad.button_a;
    }
}

/// Read the first connected pad from the Gamepad API.
#[cfg(target_arch = "wasm32")]
pub fn read_first_gamepad(navigator: &web_sys::Navigator) -> Option<GamepadSnapshot> {
    use wasm_bindgen::JsCast;

    let pads = navigator.get_gamepads().ok()?;
    let pad = pads
        .iter()
        .filter_map(|p| p.dyn_into::<web_sys::Gamepad>().ok())
        .find(|p| p.connected())?;

    let axes = pad.axes();
    let mut snapshot = GamepadSnapshot::default();
    for (i, axis) in snapshot.axes.iter_mut().enumerate() {
        *axis = axes.get(i as u32).as_f64().unwrap_or(0.0) as f32;
    }
    snapshot.button_a = pad
        .buttons()
        .get(0)
        .dyn_into::<web_sys::GamepadButton>()
        .map(|b| b.pressed())
        .unwrap_or(false);
    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(axes: [f32; 4], button_a: bool) -> Option<GamepadSnapshot> {
        Some(GamepadSnapshot { axes, button_a })
    }

    fn poll(p: &mut GamepadPoller, snapshot: Option<GamepadSnapshot>) -> Vec<InputEvent> {
        let mut out = Vec::new();
        p.poll(snapshot, &mut out);
        out
    }

    #[test]
    fn jump_fires_once_per_press() {
        let mut p = GamepadPoller::new(&InputConfig::default());
        let jumps = |events: &[InputEvent]| events.iter().filter(|e| **e == InputEvent::JumpPressed).count();
        assert_eq!(jumps(&poll(&mut p, pad([0.0; 4], true))), 1);
        assert_eq!(jumps(&poll(&mut p, pad([0.0; 4], true))), 0);
        assert_eq!(jumps(&poll(&mut p, pad([0.0; 4], true))), 0);
        assert_eq!(jumps(&poll(&mut p, pad([0.0; 4], false))), 0);
        assert_eq!(jumps(&poll(&mut p, pad([0.0; 4], true))), 1);
    }

    #[test]
    fn connection_changes_are_reported() {
        let mut p = GamepadPoller::new(&InputConfig::default());
        assert!(poll(&mut p, None).is_empty());
        let events = poll(&mut p, pad([0.0; 4], false));
        assert_eq!(events[0], InputEvent::GamepadConnected(true));
        assert!(p.connected());
        assert_eq!(poll(&mut p, None), vec![InputEvent::GamepadConnected(false)]);
    }

    #[test]
    fn resting_stick_is_neutral() {
        let mut p = GamepadPoller::new(&InputConfig::default());
        let events = poll(&mut p, pad([0.1, -0.08, 0.0, 0.0], false));
        assert!(events.contains(&InputEvent::MoveAxis { source: MoveSource::Gamepad, vector: Some(Vec2::ZERO) }));
        assert!(!events.iter().any(|e| matches!(e, InputEvent::StickLook { .. })));
    }

    #[test]
    fn stick_up_moves_forward_and_is_bounded() {
        let mut p = GamepadPoller::new(&InputConfig::default());
        let events = poll(&mut p, pad([1.0, -1.0, 0.5, 0.0], false));
        let v = events
            .iter()
            .find_map(|e| match e {
                InputEvent::MoveAxis { vector, .. } => *vector,
                _ => None,
            })
            .unwrap();
        assert!(v.length() <= 1.0 + 1e-6, "magnitude {}", v.length());
        assert!(v.y > 0.0 && v.x < 0.0);
        assert!(events.contains(&InputEvent::StickLook { dx: 3.0, dy: 0.0 }));
    }
}
