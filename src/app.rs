// Application hooks - the points where a client plugs into the frame loop

use crate::renderer::Renderer;

/// Called by the window shell around the renderer's lifetime. Every method
/// has an empty default.
pub trait AppHooks {
    /// Once, right after the renderer is up
    fn on_init(&mut self, _renderer: &mut Renderer) {}

    /// Every frame, before the renderer records it
    fn on_update(&mut self, _renderer: &mut Renderer) {}

    /// Once, before the renderer is torn down
    fn on_cleanup(&mut self) {}
}

/// Default client: paints the configured background
pub struct Sandbox {
    clear_color: [u8; 4],
}

impl Sandbox {
    pub fn new(clear_color: [u8; 4]) -> Self {
        Self { clear_color }
    }
}

impl AppHooks for Sandbox {
    fn on_init(&mut self, renderer: &mut Renderer) {
        let [r, g, b, a] = self.clear_color;
        renderer.set_clear_color(r, g, b, a);
        log::info!("Sandbox initialized, clear color {:?}", renderer.clear_color());
    }

    fn on_cleanup(&mut self) {
        log::info!("Sandbox shutting down");
    }
}
