// Surface - the window as seen by Vulkan
//
// Created through ash-window so every platform raw-window-handle supports
// works. Holds the instance alive until the surface is destroyed.

use super::error::{GpuError, Result};
use super::GpuInstance;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
    // Keeps the instance alive until the surface is gone
    _instance: Arc<GpuInstance>,
}

/// What a physical device can do with this surface
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl Surface {
    pub fn new<W>(instance: Arc<GpuInstance>, window: &W) -> Result<Arc<Self>>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display_handle = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("no window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);

        log::info!("Created window surface");

        Ok(Arc::new(Self {
            surface,
            loader,
            _instance: instance,
        }))
    }

    /// Can `queue_family` of `physical_device` present to this surface?
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        let supported = unsafe {
            self.loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                self.surface,
            )
        }?;
        Ok(supported)
    }

    pub fn support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(physical_device, self.surface)?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::info!("Destroying window surface");
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
