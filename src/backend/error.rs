// Backend error type
//
// Every fallible Vulkan call maps into RenderError. Nothing in the backend
// retries: an error ends the operation it occurred in.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    /// The Vulkan loader library could not be found or opened
    #[error("Failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Validation layers requested, but {0} is not available")]
    ValidationLayersUnavailable(&'static str),

    /// A Vulkan entry point returned an error code
    #[error("{call} failed: {result:?}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("Failed to find a GPU with Vulkan support")]
    NoDeviceFound,

    #[error("Failed to find a suitable GPU")]
    NoSuitableDevice,

    #[error("Surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("Failed to read shader {path:?}: {source}")]
    ShaderRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Shader {path:?} is not valid SPIR-V: {reason}")]
    ShaderMalformed { path: PathBuf, reason: String },

    /// Acquire or present found the swapchain no longer matches the surface
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    #[error("Name contains an interior NUL byte: {0}")]
    InvalidName(#[from] std::ffi::NulError),
}

impl RenderError {
    /// Adapter for `map_err` that tags a `vk::Result` with the failing call.
    pub fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { call, result }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_adapter_keeps_call_and_code() {
        let err: RenderError = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST)
            .map_err(RenderError::vk("vkQueueSubmit"))
            .unwrap_err();

        match err {
            RenderError::Vulkan { call, result } => {
                assert_eq!(call, "vkQueueSubmit");
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn messages_name_the_failing_call() {
        let err = RenderError::Vulkan {
            call: "vkCreateRenderPass",
            result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        };
        assert!(err.to_string().starts_with("vkCreateRenderPass failed"));
    }
}
