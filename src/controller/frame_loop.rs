use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use wgpu::{Device, Queue};

use super::game_state::{GameState, StepReport};
use super::gamepad::{GamepadPoller, GamepadSnapshot};
use super::input::{DebugAction, InputEvent, InputQueue};
use super::touch::TouchControls;
use crate::assets::{AssetInbox, AssetKind};
use crate::config::DemoConfig;
use crate::scene::Scene;
use crate::ui::{self, HudInfo};
use crate::view::render::{self, CameraUniform, LightingUniform};
use crate::view::{CameraResources, GpuContext, RenderState, SceneDrawables};

const FPS_SMOOTHING: f32 = 0.1;

/// Turns frame timestamps into step lengths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    last_ms: Option<f64>,
    pub fps: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous tick; zero on the first one or if time runs backwards.
    pub fn tick(&mut self, now_ms: f64) -> f32 {
        let dt = match self.last_ms {
            Some(last) => ((now_ms - last) / 1000.0).max(0.0) as f32,
            None => 0.0,
        };
        self.last_ms = Some(now_ms);
        if dt > 0.0 {
            let instant = 1.0 / dt;
            self.fps = if self.fps == 0.0 { instant } else { self.fps + (instant - self.fps) * FPS_SMOOTHING };
        }
        dt
    }
}

/// Main game loop state and update logic
pub struct FrameLoopContext {
    pub game: GameState,
    pub scene: Scene,
    pub touch: Rc<RefCell<TouchControls>>,
    pub gamepad: GamepadPoller,
    pub events: InputQueue,
    pub inbox: AssetInbox,
    pub drawables: SceneDrawables,
    pub camera_resources: CameraResources,
    pub clock: FrameClock,
    pub egui_ctx: egui::Context,
}

impl FrameLoopContext {
    /// Set up simulation state and the scene's GPU resources. `css_size` is the
    /// logical viewport the touch controls are laid out in.
    pub fn new(gpu: &GpuContext, config: &DemoConfig, pending: Vec<AssetKind>, now_ms: f64, css_size: Vec2) -> Self {
        let device = gpu.device.as_ref();
        let queue = gpu.queue.as_ref();

        let mut game = GameState::new(config, gpu.config.width, gpu.config.height);
        game.follow.snap(&mut game.camera, game.player.position);

        let camera_resources = render::create_camera_resources(device);
        let model_layout = render::create_model_layout(device);
        let drawables = SceneDrawables::new(device, queue, model_layout, config.assets.ground_size);

        Self {
            game,
            scene: Scene::new(&config.lighting, &config.assets, pending, now_ms),
            touch: Rc::new(RefCell::new(TouchControls::new(&config.input, css_size.x, css_size.y))),
            gamepad: GamepadPoller::new(&config.input),
            events: InputQueue::new(),
            inbox: AssetInbox::new(),
            drawables,
            camera_resources,
            clock: FrameClock::new(),
            egui_ctx: egui::Context::default(),
        }
    }

    /// Viewport changed. `width`/`height` are device pixels, `css_*` the logical size touches arrive in.
    pub fn resize(&mut self, width: u32, height: u32, css_width: f32, css_height: f32) {
        self.game.camera.set_aspect(width, height);
        self.touch.borrow_mut().resize(css_width, css_height);
    }

    /// Route queued input to its owner. Scene and touch actions are handled here;
    /// everything else feeds the input state.
    pub fn dispatch_events(&mut self, pad: Option<GamepadSnapshot>) {
        let mut events = self.events.drain();
        self.gamepad.poll(pad, &mut events);

        for event in events {
            match event {
                InputEvent::Action(action) => self.apply_action(action),
                InputEvent::FocusLost | InputEvent::VisibilityChanged { visible: false } => {
                    if let Some(release) = self.touch.borrow_mut().reset() {
                        self.game.input.process_event(&release);
                    }
                    self.game.input.process_event(&event);
                }
                other => self.game.input.process_event(&other),
            }
        }
    }

    fn apply_action(&mut self, action: DebugAction) {
        if self.scene.apply_action(action) {
            return;
        }
        if action == DebugAction::ToggleTouchControls {
            let mut touch = self.touch.borrow_mut();
            touch.visible = !touch.visible;
            tracing::info!("Touch controls visible -> {}", touch.visible);
        }
    }

    /// Hand finished loads to the scene and upload whatever it produces.
    pub fn receive_assets(&mut self, device: &Device, queue: &Queue, now_ms: f64) {
        for asset in self.inbox.drain() {
            if let Some(upload) = self.scene.receive(asset, &mut self.game.player, now_ms) {
                self.drawables.upload(device, queue, upload);
            }
        }
    }

    /// Advance one frame and prepare everything `RenderState::draw_frame` needs.
    pub fn update(
        &mut self,
        device: &Device,
        queue: &Queue,
        now_ms: f64,
        pad: Option<GamepadSnapshot>,
        raw_input: egui::RawInput,
        render_state: &mut RenderState,
    ) -> StepReport {
        let dt = self.clock.tick(now_ms);

        self.dispatch_events(pad);
        self.receive_assets(device, queue, now_ms);

        let report = self.game.step(dt, &self.scene.ground);
        if report.jumped {
            tracing::trace!("Jump at {:?}", self.game.player.position);
        }

        self.drawables.update(queue, &self.scene, &self.game.player);

        let camera = CameraUniform::from_camera(&self.game.camera);
        queue.write_buffer(&self.camera_resources.camera_buffer, 0, bytemuck::bytes_of(&camera));
        let lighting = LightingUniform::from_scene(&self.scene, self.game.player.position);
        queue.write_buffer(&self.camera_resources.lighting_buffer, 0, bytemuck::bytes_of(&lighting));

        let hud = HudInfo {
            fps: self.clock.fps,
            position: self.game.player.position,
            on_ground: self.game.player.on_ground,
            gamepad_connected: self.gamepad.connected(),
            active_source: self.game.input.active_source(),
            pointer_locked: self.game.input.pointer_locked,
        };

        // Build UI and store output for rendering
        let dpr = render_state.egui_dpr;
        let mut full_output = ui::build_ui(
            &self.egui_ctx,
            raw_input,
            &self.scene.progress,
            now_ms,
            &self.touch.borrow(),
            &hud,
        );
        let primitives = self.egui_ctx.tessellate(std::mem::take(&mut full_output.shapes), dpr);
        render_state.egui_primitives = Some(primitives);
        render_state.egui_full_output = Some(full_output);

        report
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::{start_frame_loop, FrameHandle};

#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::Window;

    type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

    /// Keeps the animation-frame chain alive; `stop` ends it.
    pub struct FrameHandle {
        window: Window,
        pending: Rc<Cell<Option<i32>>>,
        running: Rc<Cell<bool>>,
    }

    impl FrameHandle {
        pub fn stop(&self) {
            self.running.set(false);
            if let Some(id) = self.pending.take() {
                if let Err(e) = self.window.cancel_animation_frame(id) {
                    tracing::warn!("cancelAnimationFrame failed: {e:?}");
                }
            }
        }

        pub fn is_running(&self) -> bool {
            self.running.get()
        }
    }

    /// Call `tick` with the frame timestamp (ms) on every animation frame.
    pub fn start_frame_loop(window: Window, mut tick: impl FnMut(f64) + 'static) -> Result<FrameHandle, JsValue> {
        let pending = Rc::new(Cell::new(None));
        let running = Rc::new(Cell::new(true));
        let callback: FrameCallback = Rc::new(RefCell::new(None));

        {
            let callback_ref = callback.clone();
            let window = window.clone();
            let pending = pending.clone();
            let running = running.clone();
            *callback.borrow_mut() = Some(Closure::wrap(Box::new(move |now: f64| {
                pending.set(None);
                if !running.get() {
                    return;
                }
                tick(now);

                // Recursively schedule next frame
                let next = callback_ref
                    .borrow()
                    .as_ref()
                    .map(|cb| window.request_animation_frame(cb.as_ref().unchecked_ref()));
                match next {
                    Some(Ok(id)) => pending.set(Some(id)),
                    Some(Err(e)) => {
                        tracing::error!("requestAnimationFrame failed, stopping: {e:?}");
                        running.set(false);
                    }
                    None => running.set(false),
                }
            }) as Box<dyn FnMut(f64)>));
        }

        let first = callback
            .borrow()
            .as_ref()
            .map(|cb| window.request_animation_frame(cb.as_ref().unchecked_ref()))
            .ok_or_else(|| JsValue::from_str("frame callback missing"))??;
        pending.set(Some(first));

        // The closure owns a handle to itself; leak it to keep the chain alive
        std::mem::forget(callback);

        Ok(FrameHandle { window, pending, running })
    }
}
