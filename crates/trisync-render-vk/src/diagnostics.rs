// SPDX-License-Identifier: CEPL-1.0
//! Capability dumps emitted during device selection. Each is gated by the
//! caller on a [`LogProfile`] flag.

use std::ffi::CString;

use ash::vk;
use tracing::{debug, info};
use trisync_core::LogProfile;

use crate::swapchain::SwapchainSupport;

pub fn device_type_name(t: vk::PhysicalDeviceType) -> &'static str {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "other",
    }
}

pub fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_owned())
}

fn version(v: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(v),
        vk::api_version_minor(v),
        vk::api_version_patch(v)
    )
}

pub fn log_properties(props: &vk::PhysicalDeviceProperties) {
    info!(
        "device '{}': {} vendor={:#06x} id={:#06x} api={} driver={:#x}",
        device_name(props),
        device_type_name(props.device_type),
        props.vendor_id,
        props.device_id,
        version(props.api_version),
        props.driver_version,
    );
    debug!("pipeline cache uuid: {:02x?}", props.pipeline_cache_uuid);
}

pub fn log_limits(limits: &vk::PhysicalDeviceLimits) {
    debug!("device limits: {limits:#?}");
}

pub fn log_sparse_properties(sparse: &vk::PhysicalDeviceSparseProperties) {
    debug!("sparse properties: {sparse:#?}");
}

pub fn log_features(features: &vk::PhysicalDeviceFeatures) {
    debug!("device features: {features:#?}");
}

pub fn log_queue_family(role: &str, index: u32, family: &vk::QueueFamilyProperties) {
    let g = family.min_image_transfer_granularity;
    info!(
        "queue family {index} ({role}): flags={:?} count={} timestamp_bits={} granularity={}x{}x{}",
        family.queue_flags,
        family.queue_count,
        family.timestamp_valid_bits,
        g.width,
        g.height,
        g.depth,
    );
}

pub fn log_surface_capabilities(caps: &vk::SurfaceCapabilitiesKHR) {
    debug!(
        "surface caps: images {}..{} current={}x{} min={}x{} max={}x{} transform={:?} alpha={:?} usage={:?}",
        caps.min_image_count,
        caps.max_image_count,
        caps.current_extent.width,
        caps.current_extent.height,
        caps.min_image_extent.width,
        caps.min_image_extent.height,
        caps.max_image_extent.width,
        caps.max_image_extent.height,
        caps.current_transform,
        caps.supported_composite_alpha,
        caps.supported_usage_flags,
    );
}

pub fn log_surface_formats(formats: &[vk::SurfaceFormatKHR]) {
    for f in formats {
        debug!("surface format: {:?} / {:?}", f.format, f.color_space);
    }
}

pub fn log_present_modes(modes: &[vk::PresentModeKHR]) {
    debug!("present modes: {modes:?}");
}

pub fn log_surface_support(support: &SwapchainSupport, profile: LogProfile) {
    if profile.contains(LogProfile::SURFACE_CAPS) {
        log_surface_capabilities(&support.capabilities);
    }
    if profile.contains(LogProfile::SURFACE_FORMATS) {
        log_surface_formats(&support.formats);
    }
    if profile.contains(LogProfile::PRESENT_MODES) {
        log_present_modes(&support.present_modes);
    }
}

pub fn log_extensions(extensions: &[CString]) {
    debug!("{} device extensions", extensions.len());
    for e in extensions {
        debug!("  {}", e.to_string_lossy());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_device_types() {
        assert_eq!(device_type_name(vk::PhysicalDeviceType::DISCRETE_GPU), "discrete GPU");
        assert_eq!(device_type_name(vk::PhysicalDeviceType::OTHER), "other");
    }

    #[test]
    fn formats_api_version() {
        assert_eq!(version(vk::make_api_version(0, 1, 3, 275)), "1.3.275");
    }

    #[test]
    fn zeroed_name_is_empty() {
        let props = vk::PhysicalDeviceProperties::default();
        assert_eq!(device_name(&props), "");
    }
}
