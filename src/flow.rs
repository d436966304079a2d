//! Frame loop and application event loop.
//!
//! A [`Loop`] advances one scene per frame: optional input controller, scene
//! update, then the renderer. [`run`] opens a window, builds the resource
//! library and the scene, and drives a `Loop` from winit redraw requests.
//!
//! # Lifecycle
//!
//! Each frame the loop moves through [`LoopStatus`] in order:
//! 1. `Controller`: the controller, if any, moves the camera or objects
//! 2. `Scene`: the scene advances by the frame time
//! 3. `Render`: the renderer draws the scene
//! 4. `Request`: waiting for the next redraw

use std::fmt::Debug;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    config::Settings,
    context::Context,
    data_structures::scene_graph::Scene,
    pipelines::register_builtin_shaders,
    render::{GraphicsContext, Renderer},
    resources::{
        Resources,
        loader::{FileLoader, FileProvider},
    },
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Frame timing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeWatch {
    ticks: u64,
    delta: Duration,
    elapsed: Duration,
    last: Option<Instant>,
}

impl TimeWatch {
    /// Starts a frame at `now` and returns the time since the previous one.
    /// The first frame has no delta.
    pub fn tick(&mut self, now: Instant) -> Duration {
        self.delta = match self.last {
            Some(last) => now.duration_since(last),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        self.ticks += 1;
        self.elapsed += self.delta;
        self.delta
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LoopStatus {
    #[default]
    Stopped = 0,
    Controller = 1,
    Scene = 2,
    Render = 3,
    Request = 4,
}

/// Input handling run before the scene update.
pub type Controller = Box<dyn FnMut(&mut dyn Scene, Duration)>;

pub type SceneFuture = LocalBoxFuture<'static, anyhow::Result<Box<dyn Scene>>>;

pub type SceneConstructor = Box<dyn FnOnce(Rc<Resources>) -> SceneFuture>;

pub struct Loop {
    pub renderer: Renderer,
    resources: Rc<Resources>,
    scene: Box<dyn Scene>,
    controller: Option<Controller>,
    watch: TimeWatch,
    status: LoopStatus,
    cursor: Option<[f32; 2]>,
    tick_duration: Duration,
    since_tick: Duration,
    draws_since_tick: u64,
}

impl Debug for Loop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loop")
            .field("status", &self.status)
            .field("watch", &self.watch)
            .field("renderer", &self.renderer)
            .field("controller", &self.controller.is_some())
            .finish()
    }
}

impl Loop {
    pub fn new(settings: &Settings, resources: Rc<Resources>, scene: Box<dyn Scene>) -> Self {
        Self {
            renderer: Renderer::new(settings),
            resources,
            scene,
            controller: None,
            watch: TimeWatch::default(),
            status: LoopStatus::Stopped,
            cursor: None,
            tick_duration: Duration::from_millis(settings.tick_duration_millis),
            since_tick: Duration::ZERO,
            draws_since_tick: 0,
        }
    }

    /// Binds the renderer to `ctx` and waits for the first frame.
    pub fn start(&mut self, ctx: &dyn GraphicsContext) {
        self.renderer.initialize(ctx);
        self.watch.reset();
        self.since_tick = Duration::ZERO;
        self.draws_since_tick = 0;
        self.status = LoopStatus::Request;
    }

    pub fn stop(&mut self) {
        self.status = LoopStatus::Stopped;
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn watch(&self) -> &TimeWatch {
        &self.watch
    }

    pub fn resources(&self) -> &Rc<Resources> {
        &self.resources
    }

    pub fn scene(&self) -> &dyn Scene {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> &mut dyn Scene {
        self.scene.as_mut()
    }

    pub fn set_controller(&mut self, controller: Option<Controller>) {
        self.controller = controller;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.setup_viewport(width, height);
    }

    /// Cursor position in window pixels, `None` once it leaves the window.
    pub fn set_cursor(&mut self, pixels: Option<[f32; 2]>) {
        self.cursor = pixels.map(|pixels| self.renderer.cursor_to_screen_space(pixels));
    }

    /// Cursor in screen space.
    pub fn cursor(&self) -> Option<[f32; 2]> {
        self.cursor
    }

    /// Runs one frame at `now`. Returns whether the renderer drew it.
    pub fn frame(&mut self, ctx: &mut dyn GraphicsContext, now: Instant) -> bool {
        if self.status == LoopStatus::Stopped {
            return false;
        }
        let dt = self.watch.tick(now);

        self.status = LoopStatus::Controller;
        if let Some(controller) = self.controller.as_mut() {
            controller(self.scene.as_mut(), dt);
        }

        self.status = LoopStatus::Scene;
        self.scene.update(dt);

        self.status = LoopStatus::Render;
        let drawn = self
            .renderer
            .draw_scene(ctx, &self.resources, self.scene.as_ref(), self.cursor);
        self.draws_since_tick += self.renderer.draw_count() as u64;

        self.status = LoopStatus::Request;
        self.since_tick += dt;
        if self.since_tick >= self.tick_duration {
            log::debug!(
                "frame {}: {} draws in the last {:?}, {} parts under the cursor",
                self.renderer.frame_count(),
                self.draws_since_tick,
                self.since_tick,
                self.renderer.picked().len()
            );
            self.since_tick = Duration::ZERO;
            self.draws_since_tick = 0;
        }
        drawn
    }
}

pub struct AppState {
    pub ctx: Context,
    pub flow: Loop,
}

impl AppState {
    async fn new(
        window: Arc<Window>,
        settings: Settings,
        constructor: SceneConstructor,
    ) -> anyhow::Result<Self> {
        let ctx = Context::new(window).await?;

        let provider = Rc::new(FileProvider::new(settings.asset_root.clone()));
        let resources = Rc::new(Resources::new(FileLoader::new(provider)));
        register_builtin_shaders(&resources);

        let scene = constructor(resources.clone()).await?;
        let mut flow = Loop::new(&settings, resources, scene);
        flow.start(&ctx);

        Ok(Self { ctx, flow })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
        self.flow.resize(width, height);
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<FlowEvent>,
    settings: Settings,
    state: Option<AppState>,
    // Taken once the window exists.
    constructor: Option<SceneConstructor>,
}

impl App {
    fn new(
        event_loop: &EventLoop<FlowEvent>,
        settings: Settings,
        constructor: SceneConstructor,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy,
            settings,
            state: None,
            constructor: Some(constructor),
        })
    }

    fn start(&mut self, mut state: AppState) {
        // Important: Trigger a resize and redraw now that we are initialized
        let size = state.ctx.window.inner_size();
        state.resize(size.width, size.height);
        state.ctx.window.request_redraw();
        self.state = Some(state);
    }
}

pub enum FlowEvent {
    #[allow(dead_code)]
    Initialized(Box<AppState>),
    #[allow(dead_code)]
    Failed(String),
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

impl ApplicationHandler<FlowEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(constructor) = self.constructor.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("glancer");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                log::error!("Could not create a window: {error}");
                event_loop.exit();
                return;
            }
        };

        let init_future = AppState::new(window, self.settings.clone(), constructor);

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(state) => self.start(state),
                Err(error) => {
                    log::error!("Could not start: {error:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = match init_future.await {
                    Ok(state) => FlowEvent::Initialized(Box::new(state)),
                    Err(error) => FlowEvent::Failed(format!("{error:#}")),
                };
                if proxy.send_event(event).is_err() {
                    log::error!("event loop closed before the scene was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            FlowEvent::Initialized(state) => self.start(*state),
            FlowEvent::Failed(error) => {
                log::error!("Could not start: {error}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                state.flow.stop();
                state.flow.resources().loader().abort("closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::CursorMoved { position, .. } => {
                state.flow.set_cursor(Some([position.x as f32, position.y as f32]));
            }
            WindowEvent::CursorLeft { .. } => state.flow.set_cursor(None),
            WindowEvent::RedrawRequested => {
                if !state.ctx.is_surface_configured() {
                    return;
                }
                state.flow.frame(&mut state.ctx, Instant::now());
                state.ctx.window.request_redraw();
            }
            _ => {}
        }
    }
}

/// Opens a window and runs the scene `constructor` builds in it until the
/// window closes.
pub fn run(settings: Settings, constructor: SceneConstructor) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;

    let mut app = App::new(&event_loop, settings, constructor)?;

    event_loop.run_app(&mut app)?;

    Ok(())
}
