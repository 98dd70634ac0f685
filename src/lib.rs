// Re-export all public modules so they can be used from main.rs
pub mod logging;
pub mod config;
pub mod utils;
pub mod assets;
pub mod scene;
pub mod ui;

// MVC Architecture
pub mod model;
pub mod view;
pub mod controller;

#[cfg(target_arch = "wasm32")]
pub use web_app::start;

#[cfg(target_arch = "wasm32")]
mod web_app {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec2;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::convert::FromWasmAbi;
    use wasm_bindgen::{prelude::wasm_bindgen, JsCast, JsValue};
    use web_sys::{
        AddEventListenerOptions, Document, Event, HtmlCanvasElement, KeyboardEvent, MouseEvent, TouchEvent,
        UrlSearchParams, Window,
    };

    use crate::assets::{self, AssetSource, WebSource};
    use crate::config::DemoConfig;
    use crate::controller::frame_loop::start_frame_loop;
    use crate::controller::gamepad::read_first_gamepad;
    use crate::controller::input::wasm::{keyboard_event_to_input, mouse_move_to_input};
    use crate::controller::{FrameLoopContext, InputEvent, InputProcessor, InputQueue, TouchControls};
    use crate::logging;
    use crate::view::{GpuContext, RenderState};

    const CONFIG_URL: &str = "config.ron";

    #[wasm_bindgen(start)]
    pub async fn start() -> Result<(), JsValue> {
        logging::init();
        let (window, document, canvas) = init_canvas()?;
        setup_app(&window, &document, &canvas).await
    }

    /// Viewport size in CSS pixels and the device pixel ratio.
    fn viewport(window: &Window) -> (Vec2, f32) {
        let read = |v: Result<JsValue, JsValue>, fallback: f64| v.ok().and_then(|v| v.as_f64()).unwrap_or(fallback);
        let css = Vec2::new(read(window.inner_width(), 800.0) as f32, read(window.inner_height(), 600.0) as f32);
        (css, window.device_pixel_ratio() as f32)
    }

    fn physical_size(css: Vec2, dpr: f32) -> (u32, u32) {
        (((css.x * dpr).round() as u32).max(1), ((css.y * dpr).round() as u32).max(1))
    }

    fn now_ms(window: &Window) -> f64 {
        window.performance().map(|p| p.now()).unwrap_or(0.0)
    }

    async fn load_config() -> DemoConfig {
        match WebSource.fetch(CONFIG_URL).await {
            Ok(bytes) => DemoConfig::from_ron_or_default(&String::from_utf8_lossy(&bytes), CONFIG_URL),
            Err(e) => {
                tracing::info!("No {} ({}), using defaults", CONFIG_URL, e);
                DemoConfig::default()
            }
        }
    }

    /// `?model=` and `?nohdr` from the page URL.
    fn query_options(window: &Window) -> (Option<String>, bool) {
        let params = window
            .location()
            .search()
            .ok()
            .and_then(|search| UrlSearchParams::new_with_str(&search).ok());
        match params {
            Some(p) => (p.get("model"), p.has("nohdr")),
            None => (None, false),
        }
    }

    fn stored_model(window: &Window, key: &str) -> Option<String> {
        window.local_storage().ok().flatten()?.get_item(key).ok().flatten()
    }

    /// Main application setup for WASM
    async fn setup_app(window: &Window, document: &Document, canvas: &HtmlCanvasElement) -> Result<(), JsValue> {
        let config = load_config().await;

        let (query_model, skip_environment) = query_options(window);
        let stored = stored_model(window, &config.assets.model_preference_key);
        let model_url = assets::resolve_model_url(stored.as_deref(), query_model.as_deref(), &config.assets);
        let requests = assets::startup_requests(&config.assets, model_url, skip_environment);

        // Initialize GPU
        let (css, dpr) = viewport(window);
        let (width, height) = physical_size(css, dpr);
        canvas.set_width(width);
        canvas.set_height(height);
        let gpu = GpuContext::new(canvas, width, height)
            .await
            .map_err(|e| js_error(format!("GPU init failed: {e}")))?;

        let pending = requests.iter().map(|r| r.kind).collect();
        let mut frame_ctx = FrameLoopContext::new(&gpu, &config, pending, now_ms(window), css);
        let mut render_state = RenderState::new(
            &gpu,
            &frame_ctx.camera_resources.bind_group_layout,
            frame_ctx.drawables.model_layout(),
            dpr,
        );
        frame_ctx.egui_ctx.set_pixels_per_point(dpr);

        let egui_events: Rc<RefCell<Vec<egui::Event>>> = Rc::new(RefCell::new(Vec::new()));
        setup_input_listeners(
            document,
            window,
            canvas,
            frame_ctx.events.clone(),
            frame_ctx.touch.clone(),
            egui_events.clone(),
        )?;

        for request in requests {
            let inbox = frame_ctx.inbox.clone();
            wasm_bindgen_futures::spawn_local(async move {
                inbox.push(assets::load_asset(&WebSource, &request).await);
            });
        }

        let navigator = window.navigator();
        let window_for_loop = window.clone();
        let canvas = canvas.clone();
        let handle = start_frame_loop(window.clone(), move |now| {
            let (css, dpr) = viewport(&window_for_loop);
            let (w, h) = physical_size(css, dpr);
            if w != render_state.width || h != render_state.height {
                canvas.set_width(w);
                canvas.set_height(h);
                if render_state.resize(gpu.device.as_ref(), &gpu.surface, w, h) {
                    frame_ctx.resize(w, h, css.x, css.y);
                }
            }
            if dpr != render_state.egui_dpr {
                render_state.egui_dpr = dpr;
                frame_ctx.egui_ctx.set_pixels_per_point(dpr);
            }

            // Build egui input from queued events
            let mut raw_input = egui::RawInput::default();
            raw_input.time = Some(now / 1000.0);
            raw_input.screen_rect = Some(egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(css.x, css.y)));
            raw_input.events.extend(egui_events.borrow_mut().drain(..));

            let pad = read_first_gamepad(&navigator);
            frame_ctx.update(gpu.device.as_ref(), gpu.queue.as_ref(), now, pad, raw_input, &mut render_state);
            render_state.draw_frame(
                gpu.device.as_ref(),
                gpu.queue.as_ref(),
                &gpu.surface,
                &frame_ctx.drawables,
                &frame_ctx.camera_resources.camera_bind_group,
            );
        })?;

        // Stop rendering when the page is torn down
        {
            let pagehide = Closure::wrap(Box::new(move |_e: Event| {
                if handle.is_running() {
                    tracing::info!("Page hidden, stopping frame loop");
                    handle.stop();
                }
            }) as Box<dyn FnMut(Event)>);
            window.add_event_listener_with_callback("pagehide", pagehide.as_ref().unchecked_ref())?;
            pagehide.forget();
        }

        Ok(())
    }

    fn for_each_changed_touch(e: &TouchEvent, mut f: impl FnMut(i32, Vec2)) {
        let touches = e.changed_touches();
        for i in 0..touches.length() {
            if let Some(t) = touches.get(i) {
                f(t.identifier(), Vec2::new(t.client_x() as f32, t.client_y() as f32));
            }
        }
    }

    fn listen<E: FromWasmAbi + 'static>(
        target: &web_sys::EventTarget,
        name: &str,
        handler: impl FnMut(E) + 'static,
    ) -> Result<(), JsValue> {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(E)>);
        target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
        closure.forget();
        Ok(())
    }

    /// Setup all input event listeners; every callback only enqueues events.
    fn setup_input_listeners(
        document: &Document,
        window: &Window,
        canvas: &HtmlCanvasElement,
        events: InputQueue,
        touch: Rc<RefCell<TouchControls>>,
        egui_events: Rc<RefCell<Vec<egui::Event>>>,
    ) -> Result<(), JsValue> {
        let input_processor = InputProcessor::default();

        // Keyboard down
        {
            let events = events.clone();
            let document_for_exit = document.clone();
            let input_processor = input_processor.clone();
            listen(document, "keydown", move |e: KeyboardEvent| {
                let code = e.code();
                if input_processor.is_escape(&code) {
                    document_for_exit.exit_pointer_lock();
                }
                // Prevent default for navigation keys
                if input_processor.is_navigation_key(&code) {
                    e.prevent_default();
                }
                if let Some(action) = input_processor.action_for(&code, e.repeat()) {
                    events.push(InputEvent::Action(action));
                }
                events.push(keyboard_event_to_input(&e, true));
            })?;
        }

        // Keyboard up
        {
            let events = events.clone();
            listen(document, "keyup", move |e: KeyboardEvent| {
                events.push(keyboard_event_to_input(&e, false));
            })?;
        }

        // Focus loss - clear all keys
        {
            let events = events.clone();
            listen(window, "blur", move |_e: Event| events.push(InputEvent::FocusLost))?;
        }

        {
            let events = events.clone();
            let doc = document.clone();
            listen(document, "visibilitychange", move |_e: Event| {
                events.push(InputEvent::VisibilityChanged { visible: !doc.hidden() });
            })?;
        }

        // Pointer lock change
        {
            let events = events.clone();
            let doc = document.clone();
            listen(document, "pointerlockchange", move |_e: Event| {
                events.push(InputEvent::PointerLockChanged { locked: doc.pointer_lock_element().is_some() });
            })?;
        }

        // Canvas click to enter pointer lock
        {
            let canvas_click = canvas.clone();
            listen(canvas, "click", move |_e: MouseEvent| canvas_click.request_pointer_lock())?;
        }

        // Mouse move: look while locked, otherwise drive the egui pointer
        {
            let events = events.clone();
            let egui_events = egui_events.clone();
            let doc = document.clone();
            listen(document, "mousemove", move |e: MouseEvent| {
                if doc.pointer_lock_element().is_some() {
                    events.push(mouse_move_to_input(e.movement_x() as f32, e.movement_y() as f32));
                } else {
                    let p = egui::pos2(e.client_x() as f32, e.client_y() as f32);
                    egui_events.borrow_mut().push(egui::Event::PointerMoved(p));
                }
            })?;
        }

        for (name, pressed) in [("mousedown", true), ("mouseup", false)] {
            let egui_events = egui_events.clone();
            listen(document, name, move |e: MouseEvent| {
                if e.button() != 0 {
                    return;
                }
                egui_events.borrow_mut().push(egui::Event::PointerButton {
                    pos: egui::pos2(e.client_x() as f32, e.client_y() as f32),
                    button: egui::PointerButton::Primary,
                    pressed,
                    modifiers: egui::Modifiers::default(),
                });
            })?;
        }

        // Context menu prevention
        listen(document, "contextmenu", |e: MouseEvent| e.prevent_default())?;

        // Touch sticks; non-passive so the page does not scroll or zoom
        let options = AddEventListenerOptions::new();
        options.set_passive(false);
        for name in ["touchstart", "touchmove", "touchend", "touchcancel"] {
            let events = events.clone();
            let touch = touch.clone();
            let handler = Closure::wrap(Box::new(move |e: TouchEvent| {
                e.prevent_default();
                let mut touch = touch.borrow_mut();
                for_each_changed_touch(&e, |id, at| {
                    let event = match name {
                        "touchstart" => touch.touch_start(id, at),
                        "touchmove" => touch.touch_move(id, at),
                        _ => touch.touch_end(id),
                    };
                    if let Some(event) = event {
                        events.push(event);
                    }
                });
            }) as Box<dyn FnMut(TouchEvent)>);
            canvas.add_event_listener_with_callback_and_add_event_listener_options(
                name,
                handler.as_ref().unchecked_ref(),
                &options,
            )?;
            handler.forget();
        }

        Ok(())
    }

    fn init_canvas() -> Result<(Window, Document, HtmlCanvasElement), JsValue> {
        let window = web_sys::window().ok_or(js_error("no global `window`"))?;
        let document = window.document().ok_or(js_error("no document on window"))?;
        let body = document.body().ok_or(js_error("no body on document"))?;
        let canvas_el = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| js_error("failed to create canvas"))?;
        canvas_el.set_attribute("style", "display:block;width:100vw;height:100vh;touch-action:none;background:#000")?;
        body.set_attribute("style", "margin:0;overflow:hidden;background:#000")?;
        body.append_child(&canvas_el)?;
        Ok((window, document, canvas_el))
    }

    fn js_error<E: Into<String>>(msg: E) -> JsValue {
        JsValue::from_str(&msg.into())
    }
}
