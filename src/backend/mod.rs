// Backend module - Vulkan abstraction layer
//
// Design: Thin RAII wrappers around ash. Each wrapper holds an Arc to the
// object it must not outlive, so teardown runs in reverse creation order.

pub mod commands;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::LogicalDevice;
pub use error::{RenderError, RenderResult};
pub use instance::Instance;
pub use surface::{DrawableWindow, Surface};
pub use swapchain::Swapchain;
