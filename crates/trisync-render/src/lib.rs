// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic half of the renderer: the seams the frame loop talks
//! through and the [`FrameScheduler`] that drives them.
use anyhow::Result;

pub mod scheduler;

pub use scheduler::{FrameOutcome, FrameScheduler, FrameStats, ResizeFlag, SlotPhase};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        RenderSize { width, height }
    }

    /// A minimized window reports a zero-sized framebuffer.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Result of a presentation-engine call that may report staleness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl SwapchainStatus {
    pub fn is_stale(self) -> bool {
        !matches!(self, SwapchainStatus::Optimal)
    }
}

/// Outcome of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image { index: u32, suboptimal: bool },
    /// No image was acquired and the slot's semaphore will not be signaled.
    OutOfDate,
}

/// The window collaborator as seen by the frame loop.
pub trait WindowSystem {
    fn poll_events(&mut self);
    /// Blocks until at least one event arrives.
    fn wait_events(&mut self);
    fn framebuffer_size(&self) -> RenderSize;
    fn should_close(&self) -> bool;
}

/// Device-side operations the frame loop sequences. Slots are indices in
/// `0..slot_count()`; each owns one command buffer, two semaphores and a fence.
pub trait FrameBackend {
    fn slot_count(&self) -> usize;

    /// Host wait on the slot's fence.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Signals the slot's image-available semaphore when the image is ready.
    fn acquire_next_image(&mut self, slot: usize) -> Result<Acquire>;

    /// Returns the slot's fence to the unsignaled state.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Waits on image-available, signals render-finished and the slot fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Waits on render-finished.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<SwapchainStatus>;

    fn wait_idle(&mut self) -> Result<()>;

    /// Rebuilds the swapchain, its views/framebuffers and every frame slot.
    /// Pipeline, render pass and command pool survive.
    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()>;
}
