//! On-screen virtual joysticks.
//!
//! The left half of the viewport is the movement stick and the right half the
//! look stick; the jump button's rectangle takes priority over both. Positions
//! are in CSS pixels with y pointing down.

use glam::Vec2;

use super::input::{InputEvent, MoveSource};
use crate::config::InputConfig;

/// Side length of the square jump button.
pub const JUMP_BUTTON_SIZE: f32 = 56.0;
const JUMP_BUTTON_RIGHT: f32 = 138.0;
const JUMP_BUTTON_BOTTOM: f32 = 34.0;

/// Pixel displacement as a stick vector, capped at unit length.
pub fn displacement_to_vector(delta: Vec2, travel: f32) -> Vec2 {
    if travel <= 0.0 {
        return Vec2::ZERO;
    }
    let v = delta / travel;
    if v.length_squared() > 1.0 { v.normalize() } else { v }
}

/// Radial dead zone: magnitudes up to `dead_zone` become exactly zero and the
/// rest of the range is stretched back over [0, 1] along the same direction.
pub fn apply_radial_dead_zone(v: Vec2, dead_zone: f32) -> Vec2 {
    let m = v.length();
    if m <= dead_zone || m == 0.0 {
        return Vec2::ZERO;
    }
    let scaled = (m.min(1.0) - dead_zone) / (1.0 - dead_zone);
    v / m * scaled
}

/// Stick vector (screen axes) to movement lanes: up is forward.
pub fn stick_to_movement(v: Vec2, invert_x: bool) -> Vec2 {
    let x = if invert_x { -v.x } else { v.x };
    Vec2::new(x, -v.y)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickState {
    pub touch_id: i32,
    pub origin: Vec2,
    pub current: Vec2,
}

impl StickState {
    fn new(touch_id: i32, at: Vec2) -> Self {
        Self { touch_id, origin: at, current: at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.y >= self.min.y && p.x <= self.max.x && p.y <= self.max.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

pub struct TouchControls {
    pub move_stick: Option<StickState>,
    pub look_stick: Option<StickState>,
    jump_touch: Option<i32>,
    viewport: Vec2,
    stick_radius: f32,
    knob_radius: f32,
    dead_zone: f32,
    look_scale: f32,
    invert_move_x: bool,
    /// Widgets drawn; toggled with the debug key.
    pub visible: bool,
    /// Set once the first touch arrives.
    pub touch_seen: bool,
}

impl TouchControls {
    pub fn new(config: &InputConfig, width: f32, height: f32) -> Self {
        Self {
            move_stick: None,
            look_stick: None,
            jump_touch: None,
            viewport: Vec2::new(width, height),
            stick_radius: config.stick_radius,
            knob_radius: config.knob_radius,
            dead_zone: config.dead_zone,
            look_scale: config.touch_look_scale,
            invert_move_x: config.invert_move_x,
            visible: true,
            touch_seen: false,
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport = Vec2::new(width, height);
    }

    /// Maximum knob displacement in pixels.
    pub fn travel(&self) -> f32 {
        self.stick_radius - self.knob_radius
    }

    pub fn stick_radius(&self) -> f32 {
        self.stick_radius
    }

    pub fn knob_radius(&self) -> f32 {
        self.knob_radius
    }

    pub fn jump_rect(&self) -> Rect {
        let min = Vec2::new(
            self.viewport.x - JUMP_BUTTON_RIGHT - JUMP_BUTTON_SIZE,
            self.viewport.y - JUMP_BUTTON_BOTTOM - JUMP_BUTTON_SIZE,
        );
        Rect { min, max: min + Vec2::splat(JUMP_BUTTON_SIZE) }
    }

    pub fn jump_held(&self) -> bool {
        self.jump_touch.is_some()
    }

    /// Knob position relative to the stick origin, in pixels.
    pub fn knob_offset(&self, stick: &StickState) -> Vec2 {
        displacement_to_vector(stick.current - stick.origin, self.travel()) * self.travel()
    }

    pub fn touch_start(&mut self, touch_id: i32, at: Vec2) -> Option<InputEvent> {
        self.touch_seen = true;
        if self.visible && self.jump_rect().contains(at) {
            self.jump_touch = Some(touch_id);
            return Some(InputEvent::JumpPressed);
        }
        if at.x < self.viewport.x * 0.5 {
            if self.move_stick.is_none() {
                self.move_stick = Some(StickState::new(touch_id, at));
            }
        } else if self.look_stick.is_none() {
            self.look_stick = Some(StickState::new(touch_id, at));
        }
        None
    }

    pub fn touch_move(&mut self, touch_id: i32, at: Vec2) -> Option<InputEvent> {
        let travel = self.travel();
        if let Some(stick) = self.move_stick.as_mut().filter(|s| s.touch_id == touch_id) {
            stick.current = at;
            let raw = displacement_to_vector(at - stick.origin, travel);
            let v = apply_radial_dead_zone(raw, self.dead_zone);
            return Some(InputEvent::MoveAxis {
                source: MoveSource::Touch,
                vector: Some(stick_to_movement(v, self.invert_move_x)),
            });
        }
        if let Some(stick) = self.look_stick.as_mut().filter(|s| s.touch_id == touch_id) {
            let v = displacement_to_vector(at - stick.origin, travel) * self.look_scale;
            // look is relative: each move measures from the previous position
            stick.origin = at;
            stick.current = at;
            return Some(InputEvent::StickLook { dx: v.x, dy: v.y });
        }
        None
    }

    /// Touch end or cancel.
    pub fn touch_end(&mut self, touch_id: i32) -> Option<InputEvent> {
        if self.jump_touch == Some(touch_id) {
            self.jump_touch = None;
        }
        if self.look_stick.is_some_and(|s| s.touch_id == touch_id) {
            self.look_stick = None;
        }
        if self.move_stick.is_some_and(|s| s.touch_id == touch_id) {
            self.move_stick = None;
            return Some(InputEvent::MoveAxis { source: MoveSource::Touch, vector: None });
        }
        None
    }

    /// Drop every active touch, e.g. when the page loses focus.
    pub fn reset(&mut self) -> Option<InputEvent> {
        self.look_stick = None;
        self.jump_touch = None;
        self.move_stick
            .take()
            .map(|_| InputEvent::MoveAxis { source: MoveSource::Touch, vector: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> TouchControls {
        TouchControls::new(&InputConfig::default(), 800.0, 600.0)
    }

    fn moved(event: Option<InputEvent>) -> Option<Vec2> {
        match event {
            Some(InputEvent::MoveAxis { vector, .. }) => vector,
            other => panic!("expected a move event, got {:?}", other),
        }
    }

    #[test]
    fn dead_zone_is_exactly_zero() {
        for i in 0..=15 {
            let m = i as f32 / 100.0;
            let out = apply_radial_dead_zone(Vec2::new(m * 0.6, m * 0.8), 0.15);
            assert_eq!(out, Vec2::ZERO, "magnitude {} should be inside the dead zone", m);
        }
    }

    #[test]
    fn dead_zone_remap_is_monotonic_and_continuous() {
        let mut previous = 0.0;
        for i in 16..=100 {
            let m = i as f32 / 100.0;
            let out = apply_radial_dead_zone(Vec2::new(m, 0.0), 0.15).length();
            assert!(out > previous, "not increasing at {}", m);
            previous = out;
        }
        assert!((previous - 1.0).abs() < 1e-6);
        let just_above = apply_radial_dead_zone(Vec2::new(0.1501, 0.0), 0.15).length();
        assert!(just_above < 1e-3, "jump at the boundary: {}", just_above);
    }

    #[test]
    fn dead_zone_keeps_direction() {
        let out = apply_radial_dead_zone(Vec2::new(0.0, -0.8), 0.15);
        assert_eq!(out.x, 0.0);
        assert!(out.y < 0.0);
    }

    #[test]
    fn displacement_is_capped_at_travel() {
        let v = displacement_to_vector(Vec2::new(300.0, 400.0), 28.0);
        assert!((v.length() - 1.0).abs() < 1e-6);
        let half = displacement_to_vector(Vec2::new(14.0, 0.0), 28.0);
        assert!((half.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn left_half_drives_movement() {
        let mut t = controls();
        assert!(t.touch_start(1, Vec2::new(100.0, 400.0)).is_none());
        // drag straight up by the full travel
        let v = moved(t.touch_move(1, Vec2::new(100.0, 372.0))).unwrap();
        assert!((v - Vec2::new(0.0, 1.0)).length() < 1e-6, "got {:?}", v);
        // drag right, mirrored into the -x lane
        let v = moved(t.touch_move(1, Vec2::new(128.0, 400.0))).unwrap();
        assert!((v - Vec2::new(-1.0, 0.0)).length() < 1e-6, "got {:?}", v);
        assert_eq!(moved(t.touch_end(1)), None);
        assert!(t.move_stick.is_none());
    }

    #[test]
    fn movement_stays_within_unit_square() {
        let mut t = controls();
        t.touch_start(4, Vec2::new(200.0, 300.0));
        for &(dx, dy) in &[(500.0, -20.0), (-3.0, 900.0), (41.0, 41.0), (5.0, 2.0)] {
            let v = moved(t.touch_move(4, Vec2::new(200.0 + dx, 300.0 + dy))).unwrap();
            assert!(v.length() <= 1.0 + 1e-6);
            assert!(v.x.abs() <= 1.0 && v.y.abs() <= 1.0);
        }
    }

    #[test]
    fn right_half_looks_and_rebases() {
        let mut t = controls();
        t.touch_start(2, Vec2::new(600.0, 200.0));
        let first = t.touch_move(2, Vec2::new(614.0, 200.0));
        assert_eq!(first, Some(InputEvent::StickLook { dx: 6.0, dy: 0.0 }));
        // no further motion since the last event means no look
        let second = t.touch_move(2, Vec2::new(614.0, 200.0));
        assert_eq!(second, Some(InputEvent::StickLook { dx: 0.0, dy: 0.0 }));
        assert!(t.touch_end(2).is_none());
    }

    #[test]
    fn jump_button_wins_over_sticks() {
        let mut t = controls();
        let center = t.jump_rect().center();
        assert!(center.x > 400.0);
        assert_eq!(t.touch_start(3, center), Some(InputEvent::JumpPressed));
        assert!(t.look_stick.is_none());
        assert!(t.jump_held());
        t.touch_end(3);
        assert!(!t.jump_held());
    }

    #[test]
    fn hidden_jump_button_falls_through_to_look_stick() {
        let mut t = controls();
        t.visible = false;
        let center = t.jump_rect().center();
        assert_eq!(t.touch_start(3, center), None);
        assert!(!t.jump_held());
        assert_eq!(t.look_stick.map(|s| s.touch_id), Some(3));
    }

    #[test]
    fn second_touch_does_not_steal_stick() {
        let mut t = controls();
        t.touch_start(1, Vec2::new(100.0, 100.0));
        t.touch_start(2, Vec2::new(150.0, 150.0));
        assert_eq!(t.move_stick.map(|s| s.touch_id), Some(1));
        assert!(t.touch_move(2, Vec2::new(170.0, 150.0)).is_none());
    }

    #[test]
    fn knob_offset_is_clamped() {
        let mut t = controls();
        t.touch_start(1, Vec2::new(100.0, 100.0));
        t.touch_move(1, Vec2::new(300.0, 100.0));
        let stick = t.move_stick.unwrap();
        assert!((t.knob_offset(&stick).x - t.travel()).abs() < 1e-4);
    }
}
