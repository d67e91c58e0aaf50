// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one owner type per Vulkan object category.
// Dependents hold an Arc to what they depend on, so dropping releases
// swapchain -> surface -> device -> debug messenger -> instance.

pub mod device;
pub mod error;
pub mod instance;
pub mod selection;
pub mod surface;
pub mod swapchain;

pub use device::VulkanDevice;
pub use error::GpuError;
pub use instance::GpuInstance;
pub use surface::Surface;
pub use swapchain::Swapchain;
