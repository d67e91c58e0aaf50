// Swapchain - Window presentation
//
// Manages the chain of images we present to the screen.
// Fixed policy: BGRA8 UNORM / sRGB non-linear, FIFO (vsync), and
// TRANSFER_DST usage so images can be filled by blits from compute output.
//
// Invariant: images.len() == image_views.len(), created and destroyed together.

use super::error::{GpuError, Result};
use super::{Surface, VulkanDevice};
use ash::vk;
use std::sync::Arc;

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub const IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
    surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: Arc<Surface>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let swapchain_loader =
            ash::khr::swapchain::Device::new(&device.instance().instance, &device.device);

        let mut swapchain = Self {
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: PREFERRED_FORMAT.format,
            extent: vk::Extent2D::default(),
            device,
            surface,
        };
        swapchain.create(width, height)?;

        Ok(swapchain)
    }

    /// Create the swapchain, its images and one view per image.
    ///
    /// Must only be called while nothing is alive (after `new` or `destroy`).
    fn create(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(GpuError::ZeroExtent { width, height });
        }

        log::info!("Creating swapchain: {}x{}", width, height);

        let support = self.surface.support(self.device.physical_device)?;

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| GpuError::SwapchainCreation("surface reports no formats".into()))?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::ZeroExtent {
                width: extent.width,
                height: extent.height,
            });
        }
        let image_count = choose_image_count(&support.capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(IMAGE_USAGE)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(GpuError::SwapchainCreation(format!("get images: {e}")));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            match unsafe { self.device.device.create_image_view(&create_info, None) } {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    // Release what was made so far, nothing escapes half-built
                    unsafe {
                        for view in image_views {
                            self.device.device.destroy_image_view(view, None);
                        }
                        self.swapchain_loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(GpuError::SwapchainCreation(format!("image view: {e}")));
                }
            }
        }

        log::info!(
            "Created swapchain with {} images, {:?} {:?}, {}x{}",
            images.len(),
            surface_format.format,
            present_mode,
            extent.width,
            extent.height
        );

        self.swapchain = swapchain;
        self.images = images;
        self.image_views = image_views;
        self.format = surface_format.format;
        self.extent = extent;

        Ok(())
    }

    /// Destroy views and the swapchain. Device and surface stay alive.
    pub fn destroy(&mut self) {
        if self.swapchain == vk::SwapchainKHR::null() {
            return;
        }

        log::debug!("Destroying swapchain ({} views)", self.image_views.len());

        unsafe {
            for view in self.image_views.drain(..) {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }

        self.images.clear();
        self.swapchain = vk::SwapchainKHR::null();
    }

    /// Rebuild at a new size after the window changed.
    ///
    /// The old views are released before new ones are made. On error the
    /// swapchain is left destroyed.
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        self.device.wait_idle()?;
        self.destroy();
        self.create(width, height)
    }

    pub fn image_count(&self) -> usize {
        debug_assert_eq!(self.images.len(), self.image_views.len());
        self.images.len()
    }

    pub fn is_alive(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Pick BGRA8 UNORM / sRGB non-linear, else whatever the surface lists first
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| {
            let fallback = available.first().copied();
            if let Some(format) = fallback {
                log::warn!("B8G8R8A8_UNORM unavailable, falling back to {:?}", format.format);
            }
            fallback
        })
}

/// Always FIFO: vsync-locked, no tearing, and the one mode every driver must offer
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if !available.contains(&vk::PresentModeKHR::FIFO) {
        log::warn!("Surface does not list FIFO ({:?}), using it anyway", available);
    }
    vk::PresentModeKHR::FIFO
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    // u32::MAX means the surface size is decided by the swapchain
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum so we never wait on the driver, capped by max (0 = no cap)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_images,
            max_image_count: max_images,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_unorm() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            PREFERRED_FORMAT,
        ];
        let chosen = choose_surface_format(&formats).map(|f| (f.format, f.color_space));
        assert_eq!(
            chosen,
            Some((vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR))
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let only = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let chosen = choose_surface_format(&[only]).map(|f| f.format);
        assert_eq!(chosen, Some(vk::Format::R8G8B8A8_UNORM));
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_is_always_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let caps = capabilities((1700, 900), 2, 3);
        assert_eq!(choose_extent(&caps, 800, 600), vk::Extent2D { width: 1700, height: 900 });
    }

    #[test]
    fn extent_clamps_request_when_surface_undecided() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 3);
        assert_eq!(choose_extent(&caps, 1700, 900), vk::Extent2D { width: 1700, height: 900 });
        assert_eq!(choose_extent(&caps, 8000, 0), vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 3, 3)), 3);
    }

    #[test]
    fn usage_allows_blits_into_images() {
        assert!(IMAGE_USAGE.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(IMAGE_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }
}
