// Physical device selection policy
//
// Pure data in, index out, so the policy can be tested without a GPU.
// device.rs gathers a DeviceCandidate per physical device and asks
// `select` which one to use.

use super::instance::MIN_API_VERSION;
use ash::vk;
use std::fmt;

/// Feature bits the engine requires from Vulkan 1.2 / 1.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFeatures {
    /// 1.3: render without render pass / framebuffer objects
    pub dynamic_rendering: bool,
    /// 1.3: the reworked barrier and submit API
    pub synchronization2: bool,
    /// 1.2: GPU pointers to buffers
    pub buffer_device_address: bool,
    /// 1.2: bindless descriptor arrays
    pub descriptor_indexing: bool,
}

impl DeviceFeatures {
    pub const REQUIRED: Self = Self {
        dynamic_rendering: true,
        synchronization2: true,
        buffer_device_address: true,
        descriptor_indexing: true,
    };

    /// Names of features in `required` that `self` lacks
    pub fn missing(&self, required: &Self) -> Vec<&'static str> {
        [
            (required.dynamic_rendering, self.dynamic_rendering, "dynamicRendering"),
            (required.synchronization2, self.synchronization2, "synchronization2"),
            (required.buffer_device_address, self.buffer_device_address, "bufferDeviceAddress"),
            (required.descriptor_indexing, self.descriptor_indexing, "descriptorIndexing"),
        ]
        .into_iter()
        .filter(|&(wanted, present, _)| wanted && !present)
        .map(|(_, _, name)| name)
        .collect()
    }
}

/// Everything the policy needs to know about one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub api_version: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub features: DeviceFeatures,
    pub has_swapchain_extension: bool,
    /// First queue family with graphics and present support for our surface
    pub present_queue_family: Option<u32>,
    /// Set when a driver query for this device failed
    pub query_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    QueryFailed(String),
    ApiVersion(u32),
    MissingFeatures(Vec<&'static str>),
    NoSwapchainExtension,
    NoPresentQueue,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::QueryFailed(error) => write!(f, "driver query failed: {}", error),
            Rejection::ApiVersion(version) => write!(
                f,
                "API version {}.{} below 1.3",
                vk::api_version_major(*version),
                vk::api_version_minor(*version)
            ),
            Rejection::MissingFeatures(names) => write!(f, "missing {}", names.join(", ")),
            Rejection::NoSwapchainExtension => write!(f, "no VK_KHR_swapchain"),
            Rejection::NoPresentQueue => {
                write!(f, "no graphics queue that can present to the surface")
            }
        }
    }
}

impl DeviceCandidate {
    /// Check the candidate against the engine's minimum requirements
    pub fn evaluate(&self) -> Result<(), Rejection> {
        if let Some(error) = &self.query_error {
            return Err(Rejection::QueryFailed(error.clone()));
        }

        if self.api_version < MIN_API_VERSION {
            return Err(Rejection::ApiVersion(self.api_version));
        }

        let missing = self.features.missing(&DeviceFeatures::REQUIRED);
        if !missing.is_empty() {
            return Err(Rejection::MissingFeatures(missing));
        }

        if !self.has_swapchain_extension {
            return Err(Rejection::NoSwapchainExtension);
        }

        if self.present_queue_family.is_none() {
            return Err(Rejection::NoPresentQueue);
        }

        Ok(())
    }
}

/// Preference among device types (higher wins)
pub fn type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Pick the best suitable candidate.
///
/// Returns its index, or one "name: reason" line per rejected device.
/// Among equally ranked devices the first enumerated wins.
pub fn select(candidates: &[DeviceCandidate]) -> Result<usize, Vec<String>> {
    let mut best: Option<(usize, u32)> = None;
    let mut rejections = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        if let Err(reason) = candidate.evaluate() {
            log::debug!("Skipping GPU {}: {}", candidate.name, reason);
            rejections.push(format!("{}: {}", candidate.name, reason));
            continue;
        }

        let rank = type_rank(candidate.device_type);
        if best.map_or(true, |(_, best_rank)| rank > best_rank) {
            best = Some((index, rank));
        }
    }

    match best {
        Some((index, _)) => Ok(index),
        None if candidates.is_empty() => Err(vec!["no Vulkan devices enumerated".to_string()]),
        None => Err(rejections),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            api_version: vk::API_VERSION_1_3,
            device_type,
            features: DeviceFeatures::REQUIRED,
            has_swapchain_extension: true,
            present_queue_family: Some(0),
            query_error: None,
        }
    }

    #[test]
    fn prefers_discrete_over_integrated() {
        let devices = [
            candidate("iGPU", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("dGPU", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select(&devices), Ok(1));
    }

    #[test]
    fn first_device_wins_a_tie() {
        let devices = [
            candidate("first", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate("second", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select(&devices), Ok(0));
    }

    #[test]
    fn unsuitable_discrete_loses_to_suitable_cpu() {
        let mut old = candidate("old dGPU", vk::PhysicalDeviceType::DISCRETE_GPU);
        old.api_version = vk::API_VERSION_1_2;
        let devices = [old, candidate("llvmpipe", vk::PhysicalDeviceType::CPU)];
        assert_eq!(select(&devices), Ok(1));
    }

    #[test]
    fn reports_why_each_device_was_rejected() {
        let mut old = candidate("old", vk::PhysicalDeviceType::DISCRETE_GPU);
        old.api_version = vk::API_VERSION_1_1;

        let mut no_sync2 = candidate("no-sync2", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_sync2.features.synchronization2 = false;

        let mut headless = candidate("headless", vk::PhysicalDeviceType::DISCRETE_GPU);
        headless.present_queue_family = None;

        let reasons = select(&[old, no_sync2, headless]).unwrap_err();
        assert_eq!(
            reasons,
            vec![
                "old: API version 1.1 below 1.3".to_string(),
                "no-sync2: missing synchronization2".to_string(),
                "headless: no graphics queue that can present to the surface".to_string(),
            ]
        );
    }

    #[test]
    fn empty_device_list_is_an_error() {
        assert!(select(&[]).is_err());
    }

    #[test]
    fn missing_lists_only_required_features() {
        let have = DeviceFeatures {
            dynamic_rendering: true,
            ..Default::default()
        };
        assert_eq!(
            have.missing(&DeviceFeatures::REQUIRED),
            vec!["synchronization2", "bufferDeviceAddress", "descriptorIndexing"]
        );
        assert!(have.missing(&DeviceFeatures::default()).is_empty());
    }

    #[test]
    fn swapchain_extension_is_required() {
        let mut device = candidate("no-wsi", vk::PhysicalDeviceType::INTEGRATED_GPU);
        device.has_swapchain_extension = false;
        assert_eq!(device.evaluate(), Err(Rejection::NoSwapchainExtension));
    }

    #[test]
    fn failed_query_rules_out_only_that_device() {
        let mut broken = candidate("broken dGPU", vk::PhysicalDeviceType::DISCRETE_GPU);
        broken.query_error = Some("ERROR_SURFACE_LOST_KHR".to_string());
        let devices = [broken, candidate("iGPU", vk::PhysicalDeviceType::INTEGRATED_GPU)];
        assert_eq!(select(&devices), Ok(1));

        let reasons = select(&devices[..1]).unwrap_err();
        assert_eq!(
            reasons,
            vec!["broken dGPU: driver query failed: ERROR_SURFACE_LOST_KHR".to_string()]
        );
    }
}
