use egui::{Color32, Context, Pos2, Stroke};
use glam::{Vec2, Vec3};

use crate::controller::input::MoveSource;
use crate::controller::touch::{StickState, TouchControls};
use crate::scene::LoadProgress;

const STICK_FILL: Color32 = Color32::from_rgba_premultiplied(40, 40, 40, 60);
const KNOB_FILL: Color32 = Color32::from_rgba_premultiplied(180, 180, 180, 140);
const JUMP_FILL: Color32 = Color32::from_rgba_premultiplied(60, 60, 60, 90);
const JUMP_PRESSED_FILL: Color32 = Color32::from_rgba_premultiplied(120, 120, 120, 160);

/// Per-frame numbers for the debug panel.
#[derive(Debug, Clone, Copy)]
pub struct HudInfo {
    pub fps: f32,
    pub position: Vec3,
    pub on_ground: bool,
    pub gamepad_connected: bool,
    pub active_source: Option<MoveSource>,
    pub pointer_locked: bool,
}

/// Build the complete UI and return egui output
pub fn build_ui(
    egui_ctx: &Context,
    raw_input: egui::RawInput,
    progress: &LoadProgress,
    now_ms: f64,
    touch: &TouchControls,
    hud: &HudInfo,
) -> egui::FullOutput {
    egui_ctx.run(raw_input, |ctx| {
        draw_debug_window(ctx, hud);
        if touch.touch_seen && touch.visible {
            draw_touch_controls(ctx, touch);
        }
        if progress.overlay_visible(now_ms) {
            draw_loading_overlay(ctx, progress.overlay_opacity(now_ms), progress.dots(now_ms));
        }
    })
}

pub fn loading_text(dots: &str) -> String {
    format!("Loading{dots}")
}

fn faded(color: Color32, opacity: f32) -> Color32 {
    color.gamma_multiply(opacity.clamp(0.0, 1.0))
}

fn draw_loading_overlay(ctx: &Context, opacity: f32, dots: &str) {
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Foreground, egui::Id::new("loading")));
    let screen = ctx.screen_rect();
    painter.rect_filled(screen, 0.0, faded(Color32::BLACK, opacity));
    painter.text(
        screen.center(),
        egui::Align2::CENTER_CENTER,
        loading_text(dots),
        egui::FontId::proportional(24.0),
        faded(Color32::WHITE, opacity),
    );
}

fn pos(v: Vec2) -> Pos2 {
    Pos2::new(v.x, v.y)
}

fn draw_stick(painter: &egui::Painter, touch: &TouchControls, stick: &StickState) {
    painter.circle_filled(pos(stick.origin), touch.stick_radius(), STICK_FILL);
    let knob = stick.origin + touch.knob_offset(stick);
    painter.circle_filled(pos(knob), touch.knob_radius(), KNOB_FILL);
}

fn draw_touch_controls(ctx: &Context, touch: &TouchControls) {
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Middle, egui::Id::new("touch_controls")));

    for stick in [touch.move_stick, touch.look_stick].iter().flatten() {
        draw_stick(&painter, touch, stick);
    }

    let jump = touch.jump_rect();
    let rect = egui::Rect::from_min_max(pos(jump.min), pos(jump.max));
    let fill = if touch.jump_held() { JUMP_PRESSED_FILL } else { JUMP_FILL };
    painter.rect_filled(rect, 12.0, fill);
    painter.rect_stroke(rect, 12.0, Stroke::new(1.0, Color32::from_white_alpha(90)), egui::StrokeKind::Inside);
    painter.text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        "Jump",
        egui::FontId::proportional(14.0),
        Color32::WHITE,
    );
}

fn source_label(source: Option<MoveSource>) -> &'static str {
    match source {
        Some(MoveSource::Touch) => "touch",
        Some(MoveSource::Gamepad) => "gamepad",
        Some(MoveSource::Keyboard) => "keyboard",
        None => "idle",
    }
}

fn draw_debug_window(ctx: &Context, hud: &HudInfo) {
    let p = hud.position;
    egui::Window::new("Debug")
        .default_pos([8.0, 8.0])
        .default_open(false)
        .show(ctx, |ui| {
            ui.label(egui::RichText::new(format!("FPS: {:.0}", hud.fps)).small());
            ui.label(egui::RichText::new(format!("Pos: x: {:.2} y: {:.2} z: {:.2}", p.x, p.y, p.z)).small());
            ui.label(egui::RichText::new(format!("On ground: {}", hud.on_ground)).small());
            ui.label(egui::RichText::new(format!("Input: {}", source_label(hud.active_source))).small());
            ui.label(egui::RichText::new(format!("Gamepad: {}", if hud.gamepad_connected { "connected" } else { "none" })).small());
            ui.label(egui::RichText::new(format!("Mouse look: {}", if hud.pointer_locked { "locked" } else { "click to lock" })).small());
            ui.separator();
            ui.label(egui::RichText::new("Controls:").small());
            ui.label(egui::RichText::new("WASD / Arrows - Move").small());
            ui.label(egui::RichText::new("Space - Jump").small());
            ui.label(egui::RichText::new("[ ] - Sun intensity").small());
            ui.label(egui::RichText::new("K L - Ambient intensity").small());
            ui.label(egui::RichText::new("E - Environment light").small());
            ui.label(egui::RichText::new("B - Blob shadow").small());
            ui.label(egui::RichText::new("M - Touch controls").small());
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetKind;
    use crate::config::InputConfig;

    fn hud() -> HudInfo {
        HudInfo {
            fps: 60.0,
            position: Vec3::ZERO,
            on_ground: true,
            gamepad_connected: false,
            active_source: None,
            pointer_locked: false,
        }
    }

    #[test]
    fn loading_text_appends_dots() {
        assert_eq!(loading_text("..."), "Loading...");
    }

    #[test]
    fn source_labels() {
        assert_eq!(source_label(Some(MoveSource::Gamepad)), "gamepad");
        assert_eq!(source_label(None), "idle");
    }

    #[test]
    fn ui_builds_headless_with_touch_and_overlay() {
        let ctx = Context::default();
        let progress = LoadProgress::new(vec![AssetKind::Map], 0.0);
        let mut touch = TouchControls::new(&InputConfig::default(), 800.0, 600.0);
        touch.touch_start(1, Vec2::new(100.0, 400.0));
        assert!(touch.touch_seen);
        let output = build_ui(&ctx, egui::RawInput::default(), &progress, 100.0, &touch, &hud());
        assert!(!output.shapes.is_empty());
    }
}
