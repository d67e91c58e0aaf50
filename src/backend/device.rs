// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Describe every physical device as a DeviceCandidate
// - Let the selection policy pick one (1.3, required features, present support)
// - Logical device + graphics/present queue creation

use super::error::{GpuError, Result};
use super::selection::{self, DeviceCandidate, DeviceFeatures};
use super::{GpuInstance, Surface};
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// Logical device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles (one family does both graphics and present)
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    pub device_name: String,
    pub api_version: u32,

    instance: Arc<GpuInstance>,
}

impl VulkanDevice {
    /// Select a physical device able to present to `surface` and create the logical device
    pub fn new(instance: Arc<GpuInstance>, surface: &Surface) -> Result<Arc<Self>> {
        let physical_devices = unsafe { instance.instance.enumerate_physical_devices() }?;

        let candidates: Vec<DeviceCandidate> = physical_devices
            .iter()
            .map(|&physical_device| Self::describe(&instance.instance, physical_device, surface))
            .collect();

        let index = selection::select(&candidates).map_err(GpuError::NoSuitableDevice)?;
        let chosen = &candidates[index];
        let physical_device = physical_devices[index];
        let graphics_queue_family = chosen
            .present_queue_family
            .ok_or_else(|| GpuError::NoSuitableDevice(vec![chosen.name.clone()]))?;

        log::info!("Selected GPU: {} ({:?})", chosen.name, chosen.device_type);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(chosen.api_version),
            vk::api_version_minor(chosen.api_version),
            vk::api_version_patch(chosen.api_version)
        );

        let (device, graphics_queue) =
            Self::create_logical_device(&instance.instance, physical_device, graphics_queue_family)?;

        Ok(Arc::new(Self {
            device,
            physical_device,
            graphics_queue,
            graphics_queue_family,
            device_name: chosen.name.clone(),
            api_version: chosen.api_version,
            instance,
        }))
    }

    /// Describe one physical device. A failing query does not abort
    /// selection, it only rules this device out.
    fn describe(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> DeviceCandidate {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        // The 1.3 feature struct is only valid to query on 1.3 devices
        let features = if properties.api_version >= super::instance::MIN_API_VERSION {
            Self::query_features(instance, physical_device)
        } else {
            DeviceFeatures::default()
        };

        let mut candidate = DeviceCandidate {
            name,
            api_version: properties.api_version,
            device_type: properties.device_type,
            features,
            has_swapchain_extension: false,
            present_queue_family: None,
            query_error: None,
        };

        let presentation = Self::query_presentation(instance, physical_device, surface);
        match presentation {
            Ok((has_swapchain_extension, present_queue_family)) => {
                candidate.has_swapchain_extension = has_swapchain_extension;
                candidate.present_queue_family = present_queue_family;
            }
            Err(e) => {
                log::warn!("Querying GPU {} failed: {}", candidate.name, e);
                candidate.query_error = Some(e.to_string());
            }
        }

        candidate
    }

    /// Swapchain extension support and the first graphics family that can present
    fn query_presentation(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> Result<(bool, Option<u32>)> {
        let extensions =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }?;
        let has_swapchain_extension = extensions.iter().any(|ext| {
            (unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }) == ash::khr::swapchain::NAME
        });

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surface.supports_present(physical_device, index)?
            {
                return Ok((has_swapchain_extension, Some(index)));
            }
        }

        Ok((has_swapchain_extension, None))
    }

    fn query_features(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> DeviceFeatures {
        let mut vulkan_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut vulkan_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan_1_2)
                .push_next(&mut vulkan_1_3);
            unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        }

        DeviceFeatures {
            dynamic_rendering: vulkan_1_3.dynamic_rendering == vk::TRUE,
            synchronization2: vulkan_1_3.synchronization2 == vk::TRUE,
            buffer_device_address: vulkan_1_2.buffer_device_address == vk::TRUE,
            descriptor_indexing: vulkan_1_2.descriptor_indexing == vk::TRUE,
        }
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities);

        let extensions = [ash::khr::swapchain::NAME.as_ptr()];

        // Enable exactly what selection required
        let required = DeviceFeatures::REQUIRED;
        let mut vulkan_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(required.dynamic_rendering)
            .synchronization2(required.synchronization2);
        let mut vulkan_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(required.buffer_device_address)
            .descriptor_indexing(required.descriptor_indexing);
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut vulkan_1_3)
            .push_next(&mut vulkan_1_2);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut features2);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(GpuError::DeviceCreation)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }

    pub fn instance(&self) -> &Arc<GpuInstance> {
        &self.instance
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("Device wait before destroy failed: {}", e);
        }

        unsafe {
            self.device.destroy_device(None);
        }
    }
}
