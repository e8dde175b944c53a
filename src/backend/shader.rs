// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Blobs are compiled ahead of time by
// build.rs and read from disk when the pipeline is built.

use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::device::LogicalDevice;
use super::error::{RenderError, RenderResult};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a SPIR-V blob into words. Rejects lengths that are not a multiple
/// of four and blobs that do not start with the SPIR-V magic number.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| e.to_string())?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(format!("bad magic number {other:#010x}")),
        None => Err("empty blob".to_string()),
    }
}

/// A shader module that lives only until the pipeline using it is created
pub struct ShaderModule {
    pub raw: vk::ShaderModule,
    device: Arc<LogicalDevice>,
}

impl ShaderModule {
    pub fn from_file(device: Arc<LogicalDevice>, path: &Path) -> RenderResult<Self> {
        let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderRead {
            path: path.to_path_buf(),
            source,
        })?;

        let code = parse_spirv(&bytes).map_err(|reason| RenderError::ShaderMalformed {
            path: path.to_path_buf(),
            reason,
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let raw = unsafe { device.raw.create_shader_module(&create_info, None) }
            .map_err(RenderError::vk("vkCreateShaderModule"))?;

        log::debug!("Loaded shader {:?} ({} words)", path, code.len());

        Ok(Self { raw, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_shader_module(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = blob(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_misaligned_length() {
        let mut bytes = blob(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.push(0);
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = blob(&[0xdead_beef, 0]);
        let err = parse_spirv(&bytes).unwrap_err();
        assert!(err.contains("magic"));
    }

    #[test]
    fn rejects_empty() {
        assert!(parse_spirv(&[]).is_err());
    }
}
