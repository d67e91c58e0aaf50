// GPU errors - one variant per initialization step
//
// The backend never aborts: every fallible step returns one of these and the
// engine decides whether to report or bail out.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    /// The Vulkan loader library could not be found or loaded.
    #[error("Failed to load Vulkan library: {0}")]
    EntryLoad(String),

    /// Raw Vulkan error from a call that has no more specific step.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Instance creation failed: {0}")]
    InstanceCreation(vk::Result),

    #[error("Debug messenger creation failed: {0}")]
    DebugMessenger(vk::Result),

    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// No physical device met the requirements. Holds one line per rejected device.
    #[error("No suitable GPU found: {}", .0.join("; "))]
    NoSuitableDevice(Vec<String>),

    #[error("Logical device creation failed: {0}")]
    DeviceCreation(vk::Result),

    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    #[error("Cannot create a swapchain with zero extent ({width}x{height})")]
    ZeroExtent { width: u32, height: u32 },

    /// A name passed to Vulkan contained an interior NUL byte.
    #[error("Invalid name for Vulkan: {0}")]
    InvalidName(#[from] std::ffi::NulError),
}

pub type Result<T> = std::result::Result<T, GpuError>;
