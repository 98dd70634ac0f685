use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::Vec2;
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

// Import from the library crate
use strider::assets::{self, FsSource, LoadedAsset};
use strider::config::DemoConfig;
use strider::controller::{FrameLoopContext, InputEvent, InputProcessor};
use strider::logging;
use strider::view::{GpuContext, RenderState};

const CONFIG_PATH: &str = "config.ron";

/// Walk around a glTF map in a native window.
#[derive(Parser, Debug, Default)]
#[command(name = "strider", version, about)]
struct Options {
    /// Skip the HDR environment map
    #[arg(long = "nohdr")]
    skip_environment: bool,
    /// Character model path, relative to the model root unless absolute
    #[arg(long)]
    model: Option<String>,
    /// Directory assets are read from
    asset_root: Option<PathBuf>,
}

/// winit key codes share their names with DOM `KeyboardEvent.code`.
fn key_code_name(code: KeyCode) -> String {
    format!("{code:?}")
}

struct Running {
    window: Arc<Window>,
    gpu: GpuContext,
    frame_ctx: FrameLoopContext,
    render_state: RenderState,
    egui_state: egui_winit::State,
    loads: Receiver<LoadedAsset>,
    mouse_locked: bool,
}

struct App {
    config: DemoConfig,
    options: Options,
    input_processor: InputProcessor,
    started: Instant,
    running: Option<Running>,
}

impl App {
    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> Result<Running, Box<dyn std::error::Error>> {
        let window_attributes = Window::default_attributes()
            .with_title("Strider")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let size = window.inner_size();
        let dpr = window.scale_factor() as f32;
        let logical = size.to_logical::<f32>(window.scale_factor());

        let gpu = pollster::block_on(GpuContext::new_native(window.clone(), size.width, size.height))?;

        let model_url = assets::resolve_model_url(None, self.options.model.as_deref(), &self.config.assets);
        let requests = assets::startup_requests(&self.config.assets, model_url, self.options.skip_environment);
        let pending = requests.iter().map(|r| r.kind).collect();

        let frame_ctx =
            FrameLoopContext::new(&gpu, &self.config, pending, self.now_ms(), Vec2::new(logical.width, logical.height));
        let render_state = RenderState::new(
            &gpu,
            &frame_ctx.camera_resources.bind_group_layout,
            frame_ctx.drawables.model_layout(),
            dpr,
        );

        let egui_state = egui_winit::State::new(
            frame_ctx.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(dpr),
            None,
            None,
        );

        // Each load runs on its own thread; results are picked up by the frame loop
        let root = self.options.asset_root.clone().unwrap_or_else(|| PathBuf::from("."));
        let (sender, loads) = mpsc::channel();
        for request in requests {
            let sender = sender.clone();
            let source = FsSource { root: root.clone() };
            std::thread::spawn(move || {
                let loaded = pollster::block_on(assets::load_asset(&source, &request));
                // the receiver only goes away on shutdown
                let _ = sender.send(loaded);
            });
        }

        Ok(Running {
            window,
            gpu,
            frame_ctx,
            render_state,
            egui_state,
            loads,
            mouse_locked: false,
        })
    }
}

impl Running {
    fn set_mouse_locked(&mut self, locked: bool) {
        if locked {
            let grabbed = self
                .window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(e) = grabbed {
                tracing::warn!("Cursor grab failed: {e}");
                return;
            }
        } else if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
            tracing::warn!("Cursor release failed: {e}");
        }
        self.window.set_cursor_visible(!locked);
        self.mouse_locked = locked;
        self.frame_ctx.events.push(InputEvent::PointerLockChanged { locked });
    }

    fn handle_key(&mut self, processor: &InputProcessor, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let name = key_code_name(code);
        match event.state {
            ElementState::Pressed => {
                if processor.is_escape(&name) && self.mouse_locked {
                    self.set_mouse_locked(false);
                }
                if let Some(action) = processor.action_for(&name, event.repeat) {
                    self.frame_ctx.events.push(InputEvent::Action(action));
                }
                self.frame_ctx.events.push(InputEvent::KeyDown(name));
            }
            ElementState::Released => self.frame_ctx.events.push(InputEvent::KeyUp(name)),
        }
    }

    fn resize(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        if self.render_state.resize(self.gpu.device.as_ref(), &self.gpu.surface, size.width, size.height) {
            let logical = size.to_logical::<f32>(self.window.scale_factor());
            self.frame_ctx.resize(size.width, size.height, logical.width, logical.height);
        }
    }

    fn redraw(&mut self, now_ms: f64) {
        for loaded in self.loads.try_iter() {
            self.frame_ctx.inbox.push(loaded);
        }

        let raw_input = self.egui_state.take_egui_input(&self.window);
        self.frame_ctx.update(
            self.gpu.device.as_ref(),
            self.gpu.queue.as_ref(),
            now_ms,
            None,
            raw_input,
            &mut self.render_state,
        );

        if let Some(output) = self.render_state.egui_full_output.as_mut() {
            let platform_output = std::mem::take(&mut output.platform_output);
            self.egui_state.handle_platform_output(&self.window, platform_output);
        }

        self.render_state.draw_frame(
            self.gpu.device.as_ref(),
            self.gpu.queue.as_ref(),
            &self.gpu.surface,
            &self.frame_ctx.drawables,
            &self.frame_ctx.camera_resources.camera_bind_group,
        );
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(e) => {
                tracing::error!("Startup failed: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let now_ms = self.now_ms();
        let Some(app) = self.running.as_mut() else {
            return;
        };

        // First let egui process the event
        if app.egui_state.on_window_event(app.window.as_ref(), &event).consumed {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => app.resize(size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                app.render_state.egui_dpr = scale_factor as f32;
                app.resize(app.window.inner_size());
            }
            WindowEvent::KeyboardInput { event, .. } => app.handle_key(&self.input_processor, &event),
            WindowEvent::MouseInput { state: ElementState::Pressed, button: MouseButton::Left, .. } => {
                if !app.mouse_locked {
                    app.set_mouse_locked(true);
                }
            }
            WindowEvent::Focused(false) => {
                if app.mouse_locked {
                    app.set_mouse_locked(false);
                }
                app.frame_ctx.events.push(InputEvent::FocusLost);
            }
            WindowEvent::Occluded(occluded) => {
                app.frame_ctx.events.push(InputEvent::VisibilityChanged { visible: !occluded });
            }
            WindowEvent::RedrawRequested => app.redraw(now_ms),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let (Some(app), DeviceEvent::MouseMotion { delta }) = (self.running.as_mut(), event) {
            if app.mouse_locked {
                app.frame_ctx.events.push(InputEvent::MouseLook { dx: delta.0 as f32, dy: delta.1 as f32 });
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(app) = &self.running {
            app.window.request_redraw();
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = DemoConfig::load(Path::new(CONFIG_PATH));
    let options = Options::parse();
    tracing::info!("Starting with {:?}", options);

    let event_loop = EventLoop::new()?;
    let mut app = App {
        config,
        options,
        input_processor: InputProcessor::default(),
        started: Instant::now(),
        running: None,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_match_dom_codes() {
        assert_eq!(key_code_name(KeyCode::KeyW), "KeyW");
        assert_eq!(key_code_name(KeyCode::ArrowLeft), "ArrowLeft");
        assert_eq!(key_code_name(KeyCode::Space), "Space");
        assert_eq!(key_code_name(KeyCode::BracketLeft), "BracketLeft");
    }

    #[test]
    fn options_parse_flags_and_root() {
        let options = Options::try_parse_from(["strider", "--nohdr", "--model=skins/red.glb", "/srv/assets"]).unwrap();
        assert!(options.skip_environment);
        assert_eq!(options.model.as_deref(), Some("skins/red.glb"));
        assert_eq!(options.asset_root, Some(PathBuf::from("/srv/assets")));
    }

    #[test]
    fn options_default_to_everything_enabled() {
        let options = Options::try_parse_from(["strider"]).unwrap();
        assert!(!options.skip_environment);
        assert!(options.model.is_none());
        assert!(options.asset_root.is_none());
        assert!(Options::try_parse_from(["strider", "--bogus"]).is_err());
    }
}
