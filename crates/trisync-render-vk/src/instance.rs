// SPDX-License-Identifier: CEPL-1.0
//! Instance, validation layer and window surface.
//!
//! Creation order matters: the surface is made from this instance, and device
//! selection later queries present support against this surface.

use std::ffi::{c_void, CStr};

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::SetupError;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the loader entry, the instance, the optional debug messenger and the
/// window surface. Dropped last.
pub struct InstanceContext {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
}

impl InstanceContext {
    pub fn new(display: RawDisplayHandle, window: RawWindowHandle, validation: bool) -> Result<Self> {
        let entry = unsafe { Entry::load() }.context("failed to load the Vulkan library")?;

        if validation && !validation_layer_available(&entry)? {
            return Err(SetupError::ValidationLayerUnavailable(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            )
            .into());
        }

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: c"Hello Triangle".as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: c"No Engine".as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("enumerate_required_extensions")?
            .to_vec();
        if validation {
            extensions.push(debug_utils::NAME.as_ptr());
        }
        let layers = [VALIDATION_LAYER.as_ptr()];

        // Chained into the create info so instance create/destroy is validated too.
        let debug_ci = messenger_create_info();
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_next: if validation {
                (&debug_ci as *const vk::DebugUtilsMessengerCreateInfoEXT).cast::<c_void>()
            } else {
                std::ptr::null()
            },
            p_application_info: &app_info,
            enabled_layer_count: if validation { layers.len() as u32 } else { 0 },
            pp_enabled_layer_names: layers.as_ptr(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            ..Default::default()
        };

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("failed to create instance")?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        // From here on Drop cleans up whatever has been created.
        let mut ctx = InstanceContext {
            entry,
            instance,
            debug_utils: None,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
        };

        if validation {
            let loader = debug_utils::Instance::new(&ctx.entry, &ctx.instance);
            let messenger = unsafe { loader.create_debug_utils_messenger(&debug_ci, None) }
                .context("failed to set up debug messenger")?;
            ctx.debug_utils = Some((loader, messenger));
        }

        ctx.surface = unsafe {
            ash_window::create_surface(&ctx.entry, &ctx.instance, display, window, None)
        }
        .context("failed to create window surface")?;

        info!(validation, "Vulkan instance ready");
        Ok(ctx)
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    #[inline]
    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn has_validation(&self) -> bool {
        self.debug_utils.is_some()
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("instance destroyed");
    }
}

fn validation_layer_available(entry: &Entry) -> Result<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .context("enumerate_instance_layer_properties")?;
    Ok(has_layer(&layers, VALIDATION_LAYER))
}

fn has_layer(layers: &[vk::LayerProperties], name: &CStr) -> bool {
    layers
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == name))
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

/// Forwards validation-layer messages to `tracing`.
///
/// # Safety
///
/// Invoked by the loader; `data` is either null or valid for the duration of
/// the call. No user-data pointer is registered, so the callback holds no
/// reference that could outlive the instance.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { data.as_ref() } {
        Some(d) if !d.p_message.is_null() => unsafe { CStr::from_ptr(d.p_message) }.to_string_lossy(),
        _ => return vk::FALSE,
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("validation layer: {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("validation layer: {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("validation layer: {message}");
    } else {
        trace!("validation layer: {message}");
    }
    vk::FALSE
}
