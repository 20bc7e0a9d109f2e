// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Unrecoverable failures raised while bringing the renderer up or while a
/// frame is in flight. Everything else from the driver travels as
/// `anyhow::Error` with a context line naming the step.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("failed to find GPUs with Vulkan support")]
    NoDevices,

    #[error("failed to find a suitable GPU")]
    NoSuitableDevice,

    #[error("validation layer {0} requested, but not available")]
    ValidationLayerUnavailable(String),

    #[error("no memory type in {type_bits:#b} has {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("failed to open shader file {path}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not valid SPIR-V")]
    InvalidShaderBytecode(String),

    #[error("frame slot {slot} fence not signaled within {timeout_ms} ms")]
    FenceTimeout { slot: usize, timeout_ms: u64 },
}
