// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and logical device creation.
//!
//! Every enumerated device is snapshotted into a [`DeviceCandidate`], scored
//! by [`rate_device`] and placed in a score-ordered ranking. A score of zero
//! marks a device that misses a hard requirement; it still takes part in the
//! ranking but can never win.

use std::collections::BTreeMap;
use std::ffi::{CStr, CString};

use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use tracing::{debug, info};
use trisync_core::{LogProfile, RenderCfg, ShaderStageRequirement};

use crate::diagnostics;
use crate::error::SetupError;
use crate::instance::InstanceContext;
use crate::queues::{resolve_queue_families, QueueFamilyIndices, QueueRole};
use crate::swapchain::SwapchainSupport;

pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[swapchain::NAME];

/// Discrete GPUs get this on top of their max 2D image dimension.
pub const DISCRETE_GPU_BONUS: u32 = 1000;

/// Immutable inputs to device selection.
#[derive(Clone, Debug)]
pub struct SelectionPolicy {
    pub required_extensions: Vec<&'static CStr>,
    pub shader_stage: ShaderStageRequirement,
    pub require_compute: bool,
    pub log_profile: LogProfile,
}

impl SelectionPolicy {
    pub fn new(cfg: &RenderCfg, log_profile: LogProfile) -> Self {
        SelectionPolicy {
            required_extensions: REQUIRED_DEVICE_EXTENSIONS.to_vec(),
            shader_stage: cfg.shader_stage,
            require_compute: cfg.require_compute_queue,
            log_profile,
        }
    }
}

/// One physical device and what it can do, as seen through one surface.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
    pub queue_families: QueueFamilyIndices,
    pub support: SwapchainSupport,
}

impl DeviceCandidate {
    pub fn query(ctx: &InstanceContext, phys: vk::PhysicalDevice, profile: LogProfile) -> Result<Self> {
        let instance = ctx.instance();
        let (properties, features, family_props, ext_props) = unsafe {
            (
                instance.get_physical_device_properties(phys),
                instance.get_physical_device_features(phys),
                instance.get_physical_device_queue_family_properties(phys),
                instance
                    .enumerate_device_extension_properties(phys)
                    .context("enumerate_device_extension_properties")?,
            )
        };

        if profile.contains(LogProfile::PROPS) {
            diagnostics::log_properties(&properties);
        }
        if profile.contains(LogProfile::LIMITS) {
            diagnostics::log_limits(&properties.limits);
        }
        if profile.contains(LogProfile::SPARSE_PROPS) {
            diagnostics::log_sparse_properties(&properties.sparse_properties);
        }
        if profile.contains(LogProfile::FEATURES) {
            diagnostics::log_features(&features);
        }

        let extensions: Vec<CString> = ext_props
            .iter()
            .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect();
        if profile.contains(LogProfile::EXTENSIONS) {
            diagnostics::log_extensions(&extensions);
        }

        let support = SwapchainSupport::query(ctx.surface_loader(), phys, ctx.surface())?;
        diagnostics::log_surface_support(&support, profile);

        let queue_families = resolve_queue_families(
            &family_props,
            |i| unsafe {
                ctx.surface_loader()
                    .get_physical_device_surface_support(phys, i, ctx.surface())
                    .context("get_physical_device_surface_support")
            },
            profile,
        )?;

        Ok(DeviceCandidate {
            handle: phys,
            properties,
            features,
            extensions,
            queue_families,
            support,
        })
    }

    pub fn name(&self) -> String {
        diagnostics::device_name(&self.properties)
    }
}

/// Required names absent from `available`.
pub fn missing_extensions<'a>(available: &[CString], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|r| !available.iter().any(|a| a.as_c_str() == *r))
        .collect()
}

fn has_shader_stage(features: &vk::PhysicalDeviceFeatures, stage: ShaderStageRequirement) -> bool {
    let bit = match stage {
        ShaderStageRequirement::Geometry => features.geometry_shader,
        ShaderStageRequirement::Tessellation => features.tessellation_shader,
    };
    bit == vk::TRUE
}

/// Zero when any hard requirement fails; otherwise the discrete bonus plus
/// `max_image_dimension2_d`.
pub fn rate_device(c: &DeviceCandidate, policy: &SelectionPolicy) -> u32 {
    if !has_shader_stage(&c.features, policy.shader_stage) {
        debug!("{}: missing {:?} shader support", c.name(), policy.shader_stage);
        return 0;
    }
    let missing = missing_extensions(&c.extensions, &policy.required_extensions);
    if !missing.is_empty() {
        debug!("{}: missing extensions {:?}", c.name(), missing);
        return 0;
    }
    if !c.support.is_adequate() {
        debug!("{}: no surface formats or present modes", c.name());
        return 0;
    }
    if !c.queue_families.is_complete(policy.require_compute) {
        debug!("{}: incomplete queue families {:?}", c.name(), c.queue_families);
        return 0;
    }

    let mut score = 0u32;
    if c.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }
    score.saturating_add(c.properties.limits.max_image_dimension2_d)
}

/// Score-keyed ranking. Among equal top scores the last one inserted wins.
pub fn pick_best<T>(scored: impl IntoIterator<Item = (u32, T)>) -> Result<T, SetupError> {
    let mut ranking: BTreeMap<u32, Vec<T>> = BTreeMap::new();
    for (score, item) in scored {
        ranking.entry(score).or_default().push(item);
    }
    match ranking.pop_last() {
        None => Err(SetupError::NoDevices),
        Some((0, _)) => Err(SetupError::NoSuitableDevice),
        Some((_, mut best)) => best.pop().ok_or(SetupError::NoSuitableDevice),
    }
}

pub fn select_physical_device(ctx: &InstanceContext, policy: &SelectionPolicy) -> Result<DeviceCandidate> {
    let devices = unsafe { ctx.instance().enumerate_physical_devices() }
        .context("enumerate_physical_devices")?;
    if devices.is_empty() {
        return Err(SetupError::NoDevices.into());
    }
    info!("found {} GPU(s)", devices.len());

    let mut scored = Vec::with_capacity(devices.len());
    for phys in devices {
        let candidate = DeviceCandidate::query(ctx, phys, policy.log_profile)?;
        let score = rate_device(&candidate, policy);
        info!("GPU '{}' score {}", candidate.name(), score);
        scored.push((score, candidate));
    }

    let best = pick_best(scored)?;
    info!(
        "selected GPU '{}' ({})",
        best.name(),
        diagnostics::device_type_name(best.properties.device_type)
    );
    Ok(best)
}

/// Logical device plus one queue handle per resolved role.
pub struct DeviceContext {
    device: ash::Device,
    physical: vk::PhysicalDevice,
    families: QueueFamilyIndices,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: Option<vk::Queue>,
    transfer_queue: Option<vk::Queue>,
}

impl DeviceContext {
    pub fn new(ctx: &InstanceContext, candidate: &DeviceCandidate, policy: &SelectionPolicy) -> Result<Self> {
        let families = candidate.queue_families;
        let graphics = families.graphics.context("no graphics queue family")?;
        let present = families.present.context("no present queue family")?;

        let priorities = [QueueRole::Graphics.priority()];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique_families()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let ext_names: Vec<_> = policy.required_extensions.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_names.len() as u32,
            pp_enabled_extension_names: ext_names.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let instance = ctx.instance();
        let device = unsafe { instance.create_device(candidate.handle, &dinfo, None) }
            .context("failed to create logical device")?;
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(candidate.handle) };

        let queue = |family: u32| unsafe { device.get_device_queue(family, 0) };
        let dc = DeviceContext {
            physical: candidate.handle,
            families,
            memory_properties,
            graphics_queue: queue(graphics),
            present_queue: queue(present),
            compute_queue: families.compute.map(queue),
            transfer_queue: families.transfer.map(queue),
            device,
        };

        info!(
            "logical device ready: {} queue(s) over families {:?}",
            queue_infos.len(),
            families
        );
        Ok(dc)
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn families(&self) -> &QueueFamilyIndices {
        &self.families
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Same handle as the graphics queue when the families alias.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn compute_queue(&self) -> Option<vk::Queue> {
        self.compute_queue
    }

    pub fn transfer_queue(&self) -> Option<vk::Queue> {
        self.transfer_queue
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
        debug!("logical device destroyed");
    }
}
