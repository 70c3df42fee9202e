// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Coarse failure class, for hosts that map errors onto their own result types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Initialization,
    ShaderCompile,
    Draw,
    Disposed,
    InvalidArgument,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{op} failed: {result}")]
    Vulkan { op: &'static str, result: vk::Result },

    #[error("engine initialization failed: {0}")]
    Init(#[source] Box<EngineError>),

    #[error("window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("no suitable physical device (needs graphics + present queues)")]
    NoSuitableDevice,

    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("surface reports no present modes")]
    NoPresentModes,

    #[error("surface extent is undefined")]
    UndefinedExtent,

    #[error("device lacks required feature {0}")]
    MissingFeature(&'static str),

    #[error("no memory type for {0}")]
    NoMemoryType(&'static str),

    #[error("shader compiler unavailable: {0}")]
    CompilerUnavailable(String),

    #[error("Failed to compile shader: {name}\n{message}")]
    ShaderCompile { name: String, message: String },

    #[error("fragment program rejected: {0}")]
    Program(#[source] Box<EngineError>),

    #[error("invalid SPIR-V: {0}")]
    Spirv(#[source] std::io::Error),

    #[error("parameter block of {size} bytes exceeds the {max}-byte push-constant budget")]
    BlockTooLarge { size: u32, max: u32 },

    #[error("parameter block size {0} is not a multiple of 4")]
    BlockMisaligned(u32),

    #[error("parameter block has {got} bytes, the fragment program expects {want}")]
    BlockTooShort { got: usize, want: u32 },

    #[error("no swapchain; the last rebuild failed")]
    NoSwapchain,

    #[error("engine has been disposed")]
    Disposed,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Init(_)
            | Self::Handle(_)
            | Self::NoSuitableDevice
            | Self::NoSurfaceFormats
            | Self::NoPresentModes
            | Self::UndefinedExtent
            | Self::MissingFeature(_)
            | Self::NoMemoryType(_)
            | Self::CompilerUnavailable(_)
            | Self::Spirv(_) => ErrorKind::Initialization,
            Self::ShaderCompile { .. } | Self::Program(_) => ErrorKind::ShaderCompile,
            Self::Vulkan { .. } | Self::NoSwapchain => ErrorKind::Draw,
            Self::BlockTooLarge { .. } | Self::BlockMisaligned(_) | Self::BlockTooShort { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Disposed => ErrorKind::Disposed,
        }
    }

    /// The raw Vulkan result, if this wraps a failed API call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vulkan { result, .. } => Some(*result),
            Self::Init(inner) | Self::Program(inner) => inner.vk_result(),
            _ => None,
        }
    }

    pub(crate) fn during_init(self) -> Self {
        match self {
            e @ Self::Init(_) => e,
            e => Self::Init(Box::new(e)),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Tags a raw `VkResult` with the name of the call that produced it.
pub(crate) trait VkContext<T> {
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T> VkContext<T> for std::result::Result<T, vk::Result> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|result| EngineError::Vulkan { op, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_errors_name_the_call() {
        let r: std::result::Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let e = r.context("queue_submit").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Draw);
        assert_eq!(e.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
        assert!(e.to_string().starts_with("queue_submit failed"));
    }

    #[test]
    fn init_wrapping_reclassifies_once() {
        let e = EngineError::Vulkan {
            op: "create_device",
            result: vk::Result::ERROR_INITIALIZATION_FAILED,
        }
        .during_init()
        .during_init();
        assert_eq!(e.kind(), ErrorKind::Initialization);
        assert!(matches!(&e, EngineError::Init(inner) if !matches!(**inner, EngineError::Init(_))));
        assert_eq!(e.vk_result(), Some(vk::Result::ERROR_INITIALIZATION_FAILED));
    }

    #[test]
    fn compile_error_message_embeds_name() {
        let e = EngineError::ShaderCompile {
            name: "custom_fragment_shader".into(),
            message: "0:3: error".into(),
        };
        assert_eq!(e.kind(), ErrorKind::ShaderCompile);
        assert_eq!(
            e.to_string(),
            "Failed to compile shader: custom_fragment_shader\n0:3: error"
        );
    }

    #[test]
    fn rejected_program_is_a_load_failure() {
        let e = EngineError::Program(Box::new(EngineError::Vulkan {
            op: "create_graphics_pipelines",
            result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        }));
        assert_eq!(e.kind(), ErrorKind::ShaderCompile);
        assert_eq!(e.vk_result(), Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
    }

    #[test]
    fn bad_spirv_only_happens_at_startup() {
        let e = EngineError::Spirv(std::io::Error::new(std::io::ErrorKind::InvalidData, "magic"));
        assert_eq!(e.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn argument_errors_are_classified() {
        assert_eq!(EngineError::BlockTooLarge { size: 132, max: 128 }.kind(), ErrorKind::InvalidArgument);
        assert_eq!(EngineError::BlockMisaligned(6).kind(), ErrorKind::InvalidArgument);
        assert_eq!(EngineError::Disposed.kind(), ErrorKind::Disposed);
    }
}
