// =============================================================================
// FRAME RENDERER - Vulkan bring-up and a per-frame clear/draw loop
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, config, hooks)                          │
// │    └── Renderer                                                 │
// │          └── Instance + Surface + Device + Swapchain            │
// │                └── Render pass, pipeline, framebuffers          │
// │                      └── Command buffer + frame sync            │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (one frame in flight):
// 1. Hooks update (client logic)
// 2. Wait for the previous frame's fence
// 3. Acquire swapchain image
// 4. Re-record and submit the command buffer
// 5. Present
//
// =============================================================================

mod app;
mod backend;
mod color;
mod config;
mod renderer;

use anyhow::Result;
use app::{AppHooks, Sandbox};
use config::Config;
use renderer::{Renderer, RendererSettings};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, source) = Config::load();

    init_logging(&config);
    log::info!("Starting frame renderer");
    source.report();
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let hooks = Sandbox::new(config.graphics.clear_color);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, Box::new(hooks));
    event_loop.run_app(&mut app)?;

    if app.failed {
        anyhow::bail!("Renderer stopped after an unrecoverable error");
    }
    Ok(())
}

/// Level comes from the config file; RUST_LOG overrides it
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    let mut builder = Builder::new();
    builder.filter_level(config.debug.level_filter());
    builder.parse_env(Env::default());
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer must go before the window it
/// presents to.
struct App {
    config: Config,
    hooks: Box<dyn AppHooks>,
    renderer: Option<Renderer>,
    window: Option<Window>,
    /// Set when initialization or a frame fails
    failed: bool,
}

impl App {
    fn new(config: Config, hooks: Box<dyn AppHooks>) -> Self {
        Self {
            config,
            hooks,
            renderer: None,
            window: None,
            failed: false,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop) {
        self.failed = true;
        event_loop.exit();
    }

    /// A failed frame may leave the fence unsignaled forever, so nothing is
    /// drawn after a failure even if redraws are still queued.
    fn ready_to_draw(&self) -> bool {
        !self.failed && self.renderer.is_some()
    }

    /// Run the hooks and one frame
    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if !self.ready_to_draw() {
            return;
        }

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        self.hooks.on_update(renderer);

        if let Err(e) = renderer.update() {
            log::error!(
                "Frame {} failed in state {:?}: {}",
                renderer.frames_presented(),
                renderer.frame_state(),
                e
            );
            self.fail(event_loop);
        }
    }

    /// Hooks first, then the full Vulkan teardown
    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            self.hooks.on_cleanup();
            log::info!("Presented {} frames", renderer.frames_presented());
            drop(renderer);
            log::info!("Cleanup complete");
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.fail(event_loop);
                return;
            }
        };

        let settings = RendererSettings::from_config(&self.config);
        let mut renderer = match Renderer::new(&window, &settings) {
            Ok(r) => r,
            Err(_) => {
                // Already reported by the renderer
                self.fail(event_loop);
                return;
            }
        };

        let extent = renderer.extent();
        log::info!("Rendering at {}x{}", extent.width, extent.height);

        self.hooks.on_init(&mut renderer);

        self.renderer = Some(renderer);
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::warn!("Device did not go idle: {}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(Config::default(), Box::new(Sandbox::new([0, 0, 0, 255])))
    }

    #[test]
    fn nothing_to_draw_before_init() {
        assert!(!app().ready_to_draw());
    }

    #[test]
    fn failure_stops_drawing() {
        let mut app = app();
        app.failed = true;
        assert!(!app.ready_to_draw());
    }
}
