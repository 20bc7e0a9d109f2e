// SPDX-License-Identifier: CEPL-1.0
//! Swap chain negotiation and the swapchain-scoped resources.
//!
//! Negotiation is pure over the queried [`SwapchainSupport`], so the policy
//! functions are tested without a device. [`SwapchainResources`] owns the
//! swap chain, one view per image and one framebuffer per view; it is the only
//! thing rebuilt on resize.

use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, info};
use trisync_core::{ImageCountPolicy, PresentModePolicy, RenderCfg};
use trisync_render::RenderSize;

use crate::queues::QueueFamilyIndices;

/// Surface capabilities, formats and present modes for one
/// (physical device, surface) pair. Queried fresh every time.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(SwapchainSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(phys, surface)
                    .context("get_physical_device_surface_capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(phys, surface)
                    .context("get_physical_device_surface_formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(phys, surface)
                    .context("get_physical_device_surface_present_modes")?,
            })
        }
    }

    /// At least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Prefers `B8G8R8A8_SRGB` / `SRGB_NONLINEAR` wherever it appears, otherwise
/// the first pair the surface lists.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// FIFO is always available; MAILBOX only when present and wanted.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    policy: PresentModePolicy,
) -> vk::PresentModeKHR {
    let want_mailbox = match policy {
        PresentModePolicy::Auto => cfg!(windows),
        PresentModePolicy::Mailbox => true,
        PresentModePolicy::Fifo => false,
    };
    if want_mailbox && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A definite `current_extent` is returned verbatim; `u32::MAX` means the
/// surface takes its size from the swap chain, so the framebuffer size is
/// clamped into the supported range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: framebuffer
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// `max_image_count == 0` means no upper bound.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, policy: ImageCountPolicy) -> u32 {
    let target = match policy {
        ImageCountPolicy::Fixed3 => 3,
        ImageCountPolicy::MinPlusOne => caps.min_image_count + 1,
    };
    let count = target.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharingPlan {
    Exclusive,
    /// Images are used by both the graphics and the present family.
    Concurrent([u32; 2]),
}

pub fn sharing_plan(graphics: u32, present: u32) -> SharingPlan {
    if graphics == present {
        SharingPlan::Exclusive
    } else {
        SharingPlan::Concurrent([graphics, present])
    }
}

/// Everything `vkCreateSwapchainKHR` needs that is decided by policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: SharingPlan,
}

impl SwapchainPlan {
    /// `surface_format` is fixed for the life of the render pass, so it is
    /// chosen once by the caller rather than renegotiated here.
    pub fn negotiate(
        support: &SwapchainSupport,
        surface_format: vk::SurfaceFormatKHR,
        cfg: &RenderCfg,
        families: &QueueFamilyIndices,
        framebuffer: RenderSize,
    ) -> Result<Self> {
        let graphics = families.graphics.context("no graphics queue family")?;
        let present = families.present.context("no present queue family")?;
        let caps = &support.capabilities;
        Ok(SwapchainPlan {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes, cfg.present_mode),
            extent: choose_extent(caps, framebuffer),
            image_count: choose_image_count(caps, cfg.image_count),
            pre_transform: caps.current_transform,
            sharing: sharing_plan(graphics, present),
        })
    }
}

/// The swap chain and everything derived from its images.
///
/// Fields are released in reverse creation order: framebuffers, views, then
/// the swap chain. The render pass the framebuffers were made against must
/// outlive this value.
pub struct SwapchainResources {
    device: ash::Device,
    loader: swapchain::Device,
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainResources {
    /// Passing the previous swap chain as `old` lets the presentation engine
    /// hand over in-flight images; the caller drops the old value afterwards.
    pub fn new(
        device: &ash::Device,
        loader: &swapchain::Device,
        surface: vk::SurfaceKHR,
        plan: &SwapchainPlan,
        render_pass: vk::RenderPass,
        old: vk::SwapchainKHR,
    ) -> Result<Self> {
        let (sharing_mode, family_indices): (vk::SharingMode, &[u32]) = match &plan.sharing {
            SharingPlan::Exclusive => (vk::SharingMode::EXCLUSIVE, &[]),
            SharingPlan::Concurrent(pair) => (vk::SharingMode::CONCURRENT, pair),
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: plan.image_count,
            image_format: plan.surface_format.format,
            image_color_space: plan.surface_format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: plan.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let handle = unsafe { loader.create_swapchain(&swap_info, None) }
            .context("failed to create swapchain")?;

        let mut res = SwapchainResources {
            device: device.clone(),
            loader: loader.clone(),
            swapchain: handle,
            format: plan.surface_format.format,
            extent: plan.extent,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };

        res.images = unsafe { loader.get_swapchain_images(handle) }
            .context("get_swapchain_images")?;

        for &image in &res.images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: res.format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { device.create_image_view(&iv_info, None) }
                .context("failed to create image view")?;
            res.views.push(view);
        }

        for &view in &res.views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: plan.extent.width,
                height: plan.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { device.create_framebuffer(&fb_info, None) }
                .context("failed to create framebuffer")?;
            res.framebuffers.push(fb);
        }

        info!(
            "swapchain: {}x{} {:?}/{:?} {:?}, {} images, {:?}",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.surface_format.color_space,
            plan.present_mode,
            res.images.len(),
            plan.sharing,
        );
        Ok(res)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        unsafe {
            for &fb in &self.framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
            for &iv in &self.views {
                self.device.destroy_image_view(iv, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        debug!("swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2160,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn preferred_format_wins_from_any_position() {
        let preferred = fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            preferred,
        ];
        assert_eq!(choose_surface_format(&formats), Some(preferred));
    }

    #[test]
    fn format_falls_back_to_first() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_policy() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo_only = [vk::PresentModeKHR::FIFO];

        assert_eq!(
            choose_present_mode(&both, PresentModePolicy::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&fifo_only, PresentModePolicy::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&both, PresentModePolicy::Fifo),
            vk::PresentModeKHR::FIFO
        );
        let auto = choose_present_mode(&both, PresentModePolicy::Auto);
        if cfg!(windows) {
            assert_eq!(auto, vk::PresentModeKHR::MAILBOX);
        } else {
            assert_eq!(auto, vk::PresentModeKHR::FIFO);
        }
    }

    #[test]
    fn definite_extent_is_returned_verbatim() {
        let mut c = caps(2, 8);
        c.current_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        // Even when outside [min, max] and unrelated to the window size.
        let e = choose_extent(&c, RenderSize::new(10, 10));
        assert_eq!((e.width, e.height), (1920, 1080));
    }

    #[test]
    fn free_extent_is_clamped() {
        let c = caps(2, 8);
        let e = choose_extent(&c, RenderSize::new(8000, 10));
        assert_eq!((e.width, e.height), (4096, 64));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn image_count_policies() {
        assert_eq!(choose_image_count(&caps(2, 8), ImageCountPolicy::Fixed3), 3);
        assert_eq!(choose_image_count(&caps(2, 8), ImageCountPolicy::MinPlusOne), 3);
        assert_eq!(choose_image_count(&caps(3, 0), ImageCountPolicy::MinPlusOne), 4);
        // Clamped to max.
        assert_eq!(choose_image_count(&caps(2, 2), ImageCountPolicy::Fixed3), 2);
        assert_eq!(choose_image_count(&caps(3, 3), ImageCountPolicy::MinPlusOne), 3);
        // Raised to min.
        assert_eq!(choose_image_count(&caps(4, 0), ImageCountPolicy::Fixed3), 4);
    }

    #[test]
    fn sharing_depends_on_family_aliasing() {
        assert_eq!(sharing_plan(0, 0), SharingPlan::Exclusive);
        assert_eq!(sharing_plan(0, 2), SharingPlan::Concurrent([0, 2]));
    }

    #[test]
    fn adequacy_needs_formats_and_modes() {
        let mut s = SwapchainSupport::default();
        assert!(!s.is_adequate());
        s.formats.push(fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR));
        assert!(!s.is_adequate());
        s.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(s.is_adequate());
    }

    #[test]
    fn negotiate_combines_policies() {
        let support = SwapchainSupport {
            capabilities: caps(2, 0),
            formats: vec![fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(1),
            ..Default::default()
        };
        let cfg = RenderCfg::default();
        let plan = SwapchainPlan::negotiate(
            &support,
            support.formats[0],
            &cfg,
            &families,
            RenderSize::new(1024, 768),
        )
        .unwrap();
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(plan.extent, vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(plan.image_count, 3);
        assert_eq!(plan.sharing, SharingPlan::Concurrent([0, 1]));
        assert_eq!(plan.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);

        let no_present = QueueFamilyIndices {
            graphics: Some(0),
            ..Default::default()
        };
        assert!(SwapchainPlan::negotiate(
            &support,
            support.formats[0],
            &cfg,
            &no_present,
            RenderSize::new(1, 1)
        )
        .is_err());
    }
}
