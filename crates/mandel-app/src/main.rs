// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use mandel_core::init_tracing;
use mandel_platform::{is_zero_area, open_window, DEFAULT_TITLE};
use mandel_render::{DrawParameters, FractalRenderer, RenderSize};
use mandel_render_vk::{ErrorKind, FractalEngine};
use tracing::{debug, error, info, warn};

use mandel_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

mod config;
mod reload;
mod view;

use reload::ShaderWatch;
use view::View;

/// Pixels moved per arrow-key press.
const KEY_PAN_PIXELS: f64 = 40.0;
/// Pixel-delta scroll distance that counts as one zoom step.
const PIXELS_PER_ZOOM_STEP: f64 = 60.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable validation layers and capture driver debug messages
    #[arg(long)]
    debug: bool,
    /// Config file (default: ./mandel.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Replace the built-in fragment program; reloaded when the file changes
    #[arg(long)]
    shader: Option<PathBuf>,
    #[arg(long, default_value_t = 1024)]
    width: u32,
    #[arg(long, default_value_t = 768)]
    height: u32,
}

struct App {
    args: Args,
    /// Coloring from the config; rect and size are updated per draw.
    params: DrawParameters,
    home: View,
    view: View,

    window: Option<Window>,
    engine: Option<FractalEngine>,
    watch: Option<ShaderWatch>,
    watch_failing: bool,

    cursor: (f64, f64),
    dragging: bool,
    scroll_accum: f64,
    exiting: bool,
}

impl App {
    fn new(args: Args) -> Result<Self> {
        let cfg = config::load(args.config.as_deref())?;
        let coloring = cfg.coloring.resolve()?;
        let home = cfg.view.to_view();
        let params = coloring.parameters(home.rect(RenderSize::default()).into(), RenderSize::default());
        let watch = args.shader.clone().map(ShaderWatch::new);
        Ok(App {
            args,
            params,
            home,
            view: home,
            window: None,
            engine: None,
            watch,
            watch_failing: false,
            cursor: (0.0, 0.0),
            dragging: false,
            scroll_accum: 0.0,
            exiting: false,
        })
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn size(&self) -> RenderSize {
        self.window.as_ref().map_or(RenderSize::default(), |w| {
            let s = w.inner_size();
            RenderSize {
                width: s.width,
                height: s.height,
            }
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = open_window(event_loop, DEFAULT_TITLE, self.args.width, self.args.height)?;
        let engine = FractalEngine::new(&window, &window, self.args.debug).context("engine init")?;
        self.window = Some(window);
        self.engine = Some(engine);
        self.poll_shader();
        Ok(())
    }

    /// Loads the watched fragment program if it changed. A failed compile
    /// keeps the installed program.
    fn poll_shader(&mut self) {
        let (Some(watch), Some(engine)) = (self.watch.as_mut(), self.engine.as_mut()) else {
            return;
        };
        let source = match watch.poll() {
            Ok(Some(s)) => s,
            Ok(None) => return,
            Err(e) => {
                if !self.watch_failing {
                    warn!("shader watch: {e:#}");
                    self.watch_failing = true;
                }
                return;
            }
        };
        self.watch_failing = false;
        match engine.load_fragment_shader(&source, DrawParameters::SIZE) {
            Ok(()) => {
                info!("loaded {}", watch.path().display());
                self.request_redraw();
            }
            Err(e) if e.kind() == ErrorKind::ShaderCompile => error!("{e}"),
            Err(e) => error!("shader load failed: {e}"),
        }
    }

    fn draw(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let size = engine.surface_extent();
        if size.is_zero_area() {
            return;
        }
        self.params.set_rect(self.view.rect(size).into());
        self.params.set_surface_size(size);
        match engine.draw(&self.params) {
            Ok(outcome) => debug!(?outcome, "frame"),
            Err(e) => error!("render error: {e}"),
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
            let messages = engine.debug_messages();
            if !messages.is_empty() {
                info!("{} debug messages captured", messages.len());
                for m in &messages {
                    info!("{m}");
                }
            }
        }
        self.window = None;
    }

    fn on_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed {
            return false;
        }
        let size = self.size();
        match &event.logical_key {
            Key::Named(NamedKey::ArrowLeft) => self.view.pan_pixels(size, KEY_PAN_PIXELS, 0.0),
            Key::Named(NamedKey::ArrowRight) => self.view.pan_pixels(size, -KEY_PAN_PIXELS, 0.0),
            Key::Named(NamedKey::ArrowUp) => self.view.pan_pixels(size, 0.0, KEY_PAN_PIXELS),
            Key::Named(NamedKey::ArrowDown) => self.view.pan_pixels(size, 0.0, -KEY_PAN_PIXELS),
            Key::Named(NamedKey::F5) => {
                if let Some(w) = self.watch.as_mut() {
                    w.invalidate();
                }
                self.poll_shader();
            }
            Key::Character(c) => match c.as_str() {
                "+" | "=" => self.view.zoom = self.view.zoom.saturating_add(1),
                "-" | "_" => self.view.zoom = self.view.zoom.saturating_sub(1),
                "r" | "R" => self.view = self.home,
                _ => return false,
            },
            _ => return false,
        }
        true
    }

    fn on_scroll(&mut self, delta: MouseScrollDelta) -> bool {
        self.scroll_accum += match delta {
            MouseScrollDelta::LineDelta(_, y) => f64::from(y),
            MouseScrollDelta::PixelDelta(p) => p.y / PIXELS_PER_ZOOM_STEP,
        };
        let steps = self.scroll_accum.trunc();
        if steps == 0.0 {
            return false;
        }
        self.scroll_accum -= steps;
        let size = self.size();
        let (x, y) = self.cursor;
        self.view.zoom_to_pixel(size, x, y, steps as i32);
        true
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("startup failed: {e:#}");
                self.exiting = true;
                event_loop.exit();
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        let changed = match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.exiting = true;
                self.shutdown();
                event_loop.exit();
                false
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width == 0 || new_size.height == 0 {
                    debug!("minimized; drawing paused");
                    false
                } else {
                    if let Some(engine) = self.engine.as_mut() {
                        if let Err(e) = engine.refresh_surface() {
                            error!("surface refresh failed: {e}");
                        }
                    }
                    true
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                let (px, py) = self.cursor;
                self.cursor = (position.x, position.y);
                if self.dragging {
                    let size = self.size();
                    self.view.pan_pixels(size, position.x - px, position.y - py);
                }
                self.dragging
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
                false
            }

            WindowEvent::MouseWheel { delta, .. } => self.on_scroll(delta),

            WindowEvent::KeyboardInput { event: ref key, .. } => self.on_key(key),

            WindowEvent::RedrawRequested => {
                if !self.exiting && !self.window.as_ref().is_some_and(is_zero_area) {
                    self.draw();
                }
                false
            }

            _ => false,
        };

        if changed {
            self.request_redraw();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        let Some(next) = self.watch.as_ref().map(ShaderWatch::next_poll) else {
            return;
        };
        if Instant::now() >= next {
            self.poll_shader();
        }
        if let Some(w) = &self.watch {
            event_loop.set_control_flow(ControlFlow::WaitUntil(w.next_poll()));
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    info!(debug = args.debug, "starting mandel");

    let mut app = App::new(args)?;
    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
