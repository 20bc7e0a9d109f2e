// SPDX-License-Identifier: CEPL-1.0
//! Command pool and per-slot synchronization.

use anyhow::{Context, Result};
use ash::vk;
use tracing::debug;

pub struct CommandPool {
    device: ash::Device,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Buffers from this pool can be reset one at a time.
    pub fn new(device: &ash::Device, family: u32) -> Result<Self> {
        let ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        let pool = unsafe { device.create_command_pool(&ci, None) }
            .context("failed to create command pool")?;
        Ok(CommandPool {
            device: device.clone(),
            pool,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Fences start signaled so the first wait on each slot returns at once.
fn fence_create_info() -> vk::FenceCreateInfo<'static> {
    vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    }
}

pub struct FrameSlots {
    device: ash::Device,
    pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    /// Allocates `count` primary command buffers and their sync objects.
    /// Must not be called while any previous slot is still in use.
    pub fn new(device: &ash::Device, pool: &CommandPool, count: usize) -> Result<Self> {
        let mut out = FrameSlots {
            device: device.clone(),
            pool: pool.handle(),
            slots: Vec::with_capacity(count),
        };

        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool.handle(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let buffers = unsafe { device.allocate_command_buffers(&ai) }
            .context("failed to allocate command buffers")?;

        let sci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let fci = fence_create_info();

        let mut pending = buffers.into_iter();
        while let Some(command_buffer) = pending.next() {
            match create_sync(device, &sci, &fci) {
                Ok((image_available, render_finished, in_flight)) => out.slots.push(FrameSlot {
                    command_buffer,
                    image_available,
                    render_finished,
                    in_flight,
                }),
                Err(e) => {
                    let rest: Vec<_> = std::iter::once(command_buffer).chain(pending).collect();
                    unsafe { device.free_command_buffers(pool.handle(), &rest) };
                    return Err(e);
                }
            }
        }

        debug!("frame slots: {}", out.slots.len());
        Ok(out)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> Option<&FrameSlot> {
        self.slots.get(slot)
    }
}

/// Creates the two semaphores and the fence for one slot, destroying any
/// that were made if a later one fails.
fn create_sync(
    device: &ash::Device,
    sci: &vk::SemaphoreCreateInfo,
    fci: &vk::FenceCreateInfo,
) -> Result<(vk::Semaphore, vk::Semaphore, vk::Fence)> {
    let image_available =
        unsafe { device.create_semaphore(sci, None) }.context("failed to create semaphore")?;
    let render_finished = match unsafe { device.create_semaphore(sci, None) } {
        Ok(s) => s,
        Err(e) => {
            unsafe { device.destroy_semaphore(image_available, None) };
            return Err(e).context("failed to create semaphore");
        }
    };
    match unsafe { device.create_fence(fci, None) } {
        Ok(f) => Ok((image_available, render_finished, f)),
        Err(e) => {
            unsafe {
                device.destroy_semaphore(render_finished, None);
                device.destroy_semaphore(image_available, None);
            }
            Err(e).context("failed to create fence")
        }
    }
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        unsafe {
            for s in &self.slots {
                self.device.destroy_fence(s.in_flight, None);
                self.device.destroy_semaphore(s.render_finished, None);
                self.device.destroy_semaphore(s.image_available, None);
            }
            let buffers: Vec<_> = self.slots.iter().map(|s| s.command_buffer).collect();
            if !buffers.is_empty() {
                self.device.free_command_buffers(self.pool, &buffers);
            }
        }
    }
}
