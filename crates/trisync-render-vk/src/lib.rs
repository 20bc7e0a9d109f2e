// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend: device selection, swap chain management and the
//! [`FrameBackend`] implementation the scheduler drives.

use anyhow::{anyhow, Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use trisync_core::{AppConfig, RenderCfg};
use trisync_render::{Acquire, FrameBackend, RenderSize, SwapchainStatus};

pub mod device;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod queues;
pub mod shader;
pub mod swapchain;
pub mod vertex;

pub use device::{DeviceCandidate, DeviceContext, SelectionPolicy};
pub use error::SetupError;
pub use queues::{QueueFamilyIndices, QueueRole};
pub use shader::ShaderSource;
pub use swapchain::{SwapchainPlan, SwapchainSupport};

use crate::frame::{CommandPool, FrameSlot, FrameSlots};
use crate::instance::InstanceContext;
use crate::pipeline::{GraphicsPipeline, RenderPass};
use crate::swapchain::{choose_surface_format, SwapchainResources};
use crate::vertex::{VertexBuffer, TRIANGLE};

/// Owns every Vulkan object of the triangle renderer.
///
/// Fields drop top to bottom, which is the teardown order the objects need:
/// slots, swap chain resources, pipeline, render pass, vertex buffer,
/// command pool, device, then surface, messenger and instance.
pub struct VkRenderer {
    slots: FrameSlots,
    swapchain: SwapchainResources,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    vertex_buffer: VertexBuffer,
    command_pool: CommandPool,
    device: DeviceContext,
    instance: InstanceContext,

    surface_format: vk::SurfaceFormatKHR,
    device_name: String,
    cfg: RenderCfg,
    clear: vk::ClearValue,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &AppConfig,
    ) -> Result<Self> {
        let dh = display.display_handle().context("display_handle")?.as_raw();
        let wh = window.window_handle().context("window_handle")?.as_raw();
        let render_cfg = cfg.render.clone();
        let profile = cfg.log_profile();

        let instance = InstanceContext::new(dh, wh, render_cfg.validation.enabled())?;

        let policy = SelectionPolicy::new(&render_cfg, profile);
        let candidate = device::select_physical_device(&instance, &policy)?;
        let device = DeviceContext::new(&instance, &candidate, &policy)?;
        let d = device.handle();

        let surface_format = choose_surface_format(&candidate.support.formats)
            .context("surface reports no formats")?;
        let render_pass = RenderPass::new(d, surface_format.format)?;

        let shaders = ShaderSource::load(render_cfg.shader_dir.as_deref())?;
        let pipeline = GraphicsPipeline::new(d, render_pass.handle(), &shaders)?;

        let graphics = device.families().graphics.context("no graphics queue family")?;
        let command_pool = CommandPool::new(d, graphics)?;
        let vertex_buffer = VertexBuffer::new(d, device.memory_properties(), &TRIANGLE)?;

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.instance(), d);
        let plan = SwapchainPlan::negotiate(
            &candidate.support,
            surface_format,
            &render_cfg,
            device.families(),
            size,
        )?;
        let swapchain = SwapchainResources::new(
            d,
            &swapchain_loader,
            instance.surface(),
            &plan,
            render_pass.handle(),
            vk::SwapchainKHR::null(),
        )?;
        let slots = FrameSlots::new(d, &command_pool, swapchain.image_count())?;

        let [r, g, b, a] = render_cfg.clear_color;
        let clear = vk::ClearValue {
            color: vk::ClearColorValue { float32: [r, g, b, a] },
        };

        let renderer = VkRenderer {
            slots,
            swapchain,
            pipeline,
            render_pass,
            vertex_buffer,
            command_pool,
            device,
            instance,
            surface_format,
            device_name: candidate.name(),
            cfg: render_cfg,
            clear,
        };
        debug!(
            compute = ?renderer.device.compute_queue(),
            transfer = ?renderer.device.transfer_queue(),
            "optional queues"
        );
        info!(
            validation = renderer.instance.has_validation(),
            "Vulkan renderer ready on '{}' ({}x{}, {} frames in flight)",
            renderer.device_name,
            renderer.extent().width,
            renderer.extent().height,
            renderer.slots.count()
        );
        Ok(renderer)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn slot(&self, slot: usize) -> Result<FrameSlot> {
        self.slots
            .get(slot)
            .copied()
            .ok_or_else(|| anyhow!("frame slot {slot} out of range ({} slots)", self.slots.count()))
    }
}

/// Maps the fence wait result; an expired bounded wait is fatal.
fn fence_wait_outcome(waited: VkResult<()>, slot: usize, timeout_ms: u64) -> Result<()> {
    match waited {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(SetupError::FenceTimeout { slot, timeout_ms }.into()),
        Err(e) => Err(e).context("wait_for_fences"),
    }
}

/// Out-of-date is reported to the scheduler, not raised.
fn acquire_outcome(acquired: VkResult<(u32, bool)>) -> Result<Acquire> {
    match acquired {
        Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            debug!("acquire: swapchain out of date");
            Ok(Acquire::OutOfDate)
        }
        Err(e) => Err(e).context("failed to acquire swap chain image"),
    }
}

fn present_outcome(presented: VkResult<bool>) -> Result<SwapchainStatus> {
    match presented {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(e) => Err(e).context("failed to present swap chain image"),
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe { self.device.handle().device_wait_idle().ok() };
    }
}

impl FrameBackend for VkRenderer {
    fn slot_count(&self) -> usize {
        self.slots.count()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.slot(slot)?.in_flight;
        let timeout = self.cfg.fence_timeout_ns();
        let waited = unsafe { self.device.handle().wait_for_fences(&[fence], true, timeout) };
        fence_wait_outcome(waited, slot, self.cfg.fence_timeout_ms)
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<Acquire> {
        let sem = self.slot(slot)?.image_available;
        let acquired = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                sem,
                vk::Fence::null(),
            )
        };
        acquire_outcome(acquired)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.slot(slot)?.in_flight;
        unsafe { self.device.handle().reset_fences(&[fence]) }.context("reset_fences")
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let cmd = self.slot(slot)?.command_buffer;
        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .with_context(|| format!("no framebuffer for image {image_index}"))?;
        let extent = self.extent();
        let d = self.device.handle();

        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("reset_command_buffer")?;

            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .context("failed to begin recording command buffer")?;

            let clears = [self.clear];
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: self.render_pass.handle(),
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            d.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.handle()], &[0]);
            d.cmd_draw(cmd, self.vertex_buffer.vertex_count(), 1, 0, 0);
            d.cmd_end_render_pass(cmd);

            d.end_command_buffer(cmd).context("failed to record command buffer")?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let s = self.slot(slot)?;
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                std::slice::from_ref(&submit),
                s.in_flight,
            )
        }
        .context("failed to submit draw command buffer")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<SwapchainStatus> {
        let s = self.slot(slot)?;
        let swapchain = self.swapchain.handle();
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.render_finished,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let presented = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.device.present_queue(), &present)
        };
        present_outcome(presented)
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.handle().device_wait_idle() }.context("device_wait_idle")
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()> {
        let support = SwapchainSupport::query(
            self.instance.surface_loader(),
            self.device.physical(),
            self.instance.surface(),
        )?;
        let plan = SwapchainPlan::negotiate(
            &support,
            self.surface_format,
            &self.cfg,
            self.device.families(),
            size,
        )?;

        let d = self.device.handle();
        let next = SwapchainResources::new(
            d,
            self.swapchain.loader(),
            self.instance.surface(),
            &plan,
            self.render_pass.handle(),
            self.swapchain.handle(),
        )?;
        // Retires the old swap chain only after the new one exists.
        self.swapchain = next;
        self.slots = FrameSlots::new(d, &self.command_pool, self.swapchain.image_count())?;

        debug!(
            "swapchain recreated: {}x{}, {} slots",
            plan.extent.width,
            plan.extent.height,
            self.slots.count()
        );
        Ok(())
    }
}
