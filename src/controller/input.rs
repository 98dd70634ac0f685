/// Platform-agnostic input handling.
///
/// Every source (keyboard, mouse, touch sticks, gamepad) reports typed
/// [`InputEvent`]s into an [`InputQueue`]. The frame loop is the only consumer:
/// it drains the queue into [`InputState`] once per frame and then takes a
/// [`FrameInput`], which resets the look accumulator and the jump latch.
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::InputConfig;

/// Input devices able to drive movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveSource {
    Touch,
    Gamepad,
    Keyboard,
}

/// One-shot commands bound to keys, applied to the scene rather than the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    SunDimmer,
    SunBrighter,
    AmbientDimmer,
    AmbientBrighter,
    ToggleEnvironment,
    ToggleBlobShadow,
    ToggleTouchControls,
}

/// Platform-independent input events
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    // Keyboard events (physical key codes, e.g. "KeyW")
    KeyDown(String),
    KeyUp(String),
    Action(DebugAction),

    /// Pointer-locked mouse motion in pixels.
    MouseLook { dx: f32, dy: f32 },
    /// Look-stick motion in stick units (touch or gamepad).
    StickLook { dx: f32, dy: f32 },
    /// Latest movement reported by a stick; `None` releases the source.
    MoveAxis { source: MoveSource, vector: Option<Vec2> },
    JumpPressed,
    GamepadConnected(bool),

    // Window events
    FocusLost,
    VisibilityChanged { visible: bool },
    PointerLockChanged { locked: bool },
}

/// Single-consumer event queue shared between event callbacks and the frame loop.
#[derive(Clone, Default)]
pub struct InputQueue {
    events: Rc<RefCell<Vec<InputEvent>>>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: InputEvent) {
        self.events.borrow_mut().push(event);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = InputEvent>) {
        self.events.borrow_mut().extend(events);
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<InputEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

/// What the integrator and camera consume for one frame.
///
/// Movement is `x` = lateral lane, `y` = forward lane; look is in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub movement: Option<Vec2>,
    pub look: Vec2,
    pub jump_request: bool,
    pub jump_held: bool,
}

/// Unified input state, fed only through [`InputState::process_event`].
pub struct InputState {
    pub pressed_keys: HashSet<String>,
    pub touch_move: Option<Vec2>,
    pub gamepad_move: Option<Vec2>,
    /// Radians accumulated since the last [`InputState::consume_frame`].
    pub look_delta: Vec2,
    pub jump_request: bool,
    pub look_sensitivity: f32,
    pub mouse_sensitivity: f32,
    pub use_gamepad: bool,
    pub pointer_locked: bool,
    precedence: Vec<MoveSource>,
    bindings: KeyBindings,
}

impl InputState {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            pressed_keys: HashSet::new(),
            touch_move: None,
            gamepad_move: None,
            look_delta: Vec2::ZERO,
            jump_request: false,
            look_sensitivity: config.look_sensitivity,
            mouse_sensitivity: config.mouse_sensitivity,
            use_gamepad: false,
            pointer_locked: false,
            precedence: config.precedence.clone(),
            bindings: KeyBindings::default(),
        }
    }

    /// Process an input event and update state
    pub fn process_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown(code) => {
                self.pressed_keys.insert(code.clone());
            }
            InputEvent::KeyUp(code) => {
                self.pressed_keys.remove(code.as_str());
            }
            InputEvent::MouseLook { dx, dy } => {
                if self.pointer_locked {
                    self.look_delta += Vec2::new(*dx, *dy) * self.mouse_sensitivity;
                }
            }
            InputEvent::StickLook { dx, dy } => {
                self.look_delta += Vec2::new(*dx, *dy) * self.look_sensitivity;
            }
            InputEvent::MoveAxis { source, vector } => match source {
                MoveSource::Touch => self.touch_move = *vector,
                MoveSource::Gamepad => self.gamepad_move = *vector,
                // keyboard movement is derived from held keys
                MoveSource::Keyboard => {}
            },
            InputEvent::JumpPressed => {
                self.jump_request = true;
            }
            InputEvent::GamepadConnected(connected) => {
                self.use_gamepad = *connected;
                if !connected {
                    self.gamepad_move = None;
                }
            }
            InputEvent::FocusLost | InputEvent::VisibilityChanged { .. } => {
                self.clear_keys();
            }
            InputEvent::PointerLockChanged { locked } => {
                self.pointer_locked = *locked;
            }
            InputEvent::Action(_) => {}
        }
    }

    pub fn is_key_pressed(&self, code: &str) -> bool {
        self.pressed_keys.contains(code)
    }

    pub fn clear_keys(&mut self) {
        self.pressed_keys.clear();
    }

    /// Raw keyboard axes; diagonals are left un-normalized.
    pub fn keyboard_vector(&self) -> Vec2 {
        let b = &self.bindings;
        let held = |codes: &[&str]| codes.iter().any(|c| self.is_key_pressed(c));
        let mut v = Vec2::ZERO;
        if held(&b.forward) {
            v.y += 1.0;
        }
        if held(&b.backward) {
            v.y -= 1.0;
        }
        if held(&b.lane_positive) {
            v.x += 1.0;
        }
        if held(&b.lane_negative) {
            v.x -= 1.0;
        }
        v
    }

    pub fn source_vector(&self, source: MoveSource) -> Option<Vec2> {
        match source {
            MoveSource::Touch => self.touch_move,
            MoveSource::Gamepad => self.gamepad_move,
            MoveSource::Keyboard => Some(self.keyboard_vector()),
        }
    }

    /// Movement from the highest-priority source that is not neutral.
    ///
    /// A released source (`None`) and a centered stick (zero vector) are both
    /// neutral, so they fall through to the next provider in the list.
    pub fn move_vector(&self) -> Option<Vec2> {
        self.precedence
            .iter()
            .filter_map(|&s| self.source_vector(s))
            .find(|v| *v != Vec2::ZERO)
    }

    /// Which provider won [`InputState::move_vector`] this frame.
    pub fn active_source(&self) -> Option<MoveSource> {
        self.precedence
            .iter()
            .copied()
            .find(|&s| self.source_vector(s).is_some_and(|v| v != Vec2::ZERO))
    }

    pub fn jump_held(&self) -> bool {
        self.bindings.jump.iter().any(|c| self.is_key_pressed(c))
    }

    /// Snapshot this frame's input and reset the transient fields.
    pub fn consume_frame(&mut self) -> FrameInput {
        FrameInput {
            movement: self.move_vector(),
            look: std::mem::take(&mut self.look_delta),
            jump_request: std::mem::take(&mut self.jump_request),
            jump_held: self.jump_held(),
        }
    }
}

/// Key mapping configuration (physical key codes)
#[derive(Clone)]
pub struct KeyBindings {
    pub forward: Vec<&'static str>,
    pub backward: Vec<&'static str>,
    // KeyA feeds the +x lane and KeyD the -x lane. The integrator's lateral
    // basis points to the camera's left, so A still strafes left on screen.
    pub lane_positive: Vec<&'static str>,
    pub lane_negative: Vec<&'static str>,
    pub jump: Vec<&'static str>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: vec!["KeyW", "ArrowUp"],
            backward: vec!["KeyS", "ArrowDown"],
            lane_positive: vec!["KeyA", "ArrowLeft"],
            lane_negative: vec!["KeyD", "ArrowRight"],
            jump: vec!["Space"],
        }
    }
}

/// Maps key presses to scene commands
#[derive(Clone, Default)]
pub struct InputProcessor {
    bindings: KeyBindings,
}

impl InputProcessor {
    /// Debug command for a key press. Auto-repeat never triggers one.
    pub fn action_for(&self, code: &str, repeat: bool) -> Option<DebugAction> {
        if repeat {
            return None;
        }
        match code {
            "BracketLeft" => Some(DebugAction::SunDimmer),
            "BracketRight" => Some(DebugAction::SunBrighter),
            "KeyK" => Some(DebugAction::AmbientDimmer),
            "KeyL" => Some(DebugAction::AmbientBrighter),
            "KeyE" => Some(DebugAction::ToggleEnvironment),
            "KeyB" => Some(DebugAction::ToggleBlobShadow),
            "KeyM" => Some(DebugAction::ToggleTouchControls),
            _ => None,
        }
    }

    pub fn is_escape(&self, code: &str) -> bool {
        code == "Escape"
    }

    /// Keys whose browser default (scrolling) should be suppressed.
    pub fn is_navigation_key(&self, code: &str) -> bool {
        let b = &self.bindings;
        [&b.forward, &b.backward, &b.lane_positive, &b.lane_negative, &b.jump]
            .iter()
            .any(|codes| codes.contains(&code))
    }
}

pub mod wasm {
    use super::*;
    use web_sys::KeyboardEvent;

    pub fn keyboard_event_to_input(e: &KeyboardEvent, is_down: bool) -> InputEvent {
        let code = e.code();
        if is_down {
            InputEvent::KeyDown(code)
        } else {
            InputEvent::KeyUp(code)
        }
    }

    pub fn mouse_move_to_input(dx: f32, dy: f32) -> InputEvent {
        InputEvent::MouseLook { dx, dy }
    }
}
