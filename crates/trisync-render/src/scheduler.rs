// SPDX-License-Identifier: CEPL-1.0
//! Frames-in-flight loop.
//!
//! Each slot cycles through [`SlotPhase`]:
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presented
//!                ^                                      |
//!                +------------- (fence wait) -----------+
//! ```
//!
//! A slot is `Idle` only before its first use and after a swapchain rebuild;
//! once used, the fence wait takes it from `Presented` straight to `Acquiring`.
//!
//! Per iteration the host blocks on the current slot's fence, acquires an
//! image, resets the fence, re-records and submits the slot's command buffer,
//! presents, then either advances `current = (current + 1) % N` or rebuilds
//! the swapchain and restarts at slot 0.
use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info};

use crate::{Acquire, FrameBackend, WindowSystem};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPhase {
    /// Never used since creation or the last rebuild.
    Idle,
    Acquiring,
    Recording,
    /// Fence reset, work queued on the device.
    Submitted,
    Presented,
}

/// Sticky "framebuffer resized" flag. Clones share state, so the window's
/// resize callback can hold one while the scheduler holds another.
#[derive(Clone, Debug, Default)]
pub struct ResizeFlag(Rc<Cell<bool>>);

impl ResizeFlag {
    pub fn notify(&self) {
        self.0.set(true);
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    fn clear(&self) {
        self.0.set(false);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub recreations: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image_index: u32 },
    /// The image went out, but the swapchain was stale and has been rebuilt.
    PresentedThenRecreated { slot: usize, image_index: u32 },
    /// Acquire reported out-of-date; nothing was drawn.
    Recreated,
    /// The window closed while minimized; recreation is still pending.
    Deferred,
}

pub struct FrameScheduler {
    current_slot: usize,
    phases: Vec<SlotPhase>,
    resized: ResizeFlag,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(slot_count: usize) -> Self {
        FrameScheduler {
            current_slot: 0,
            phases: vec![SlotPhase::Idle; slot_count.max(1)],
            resized: ResizeFlag::default(),
            stats: FrameStats::default(),
        }
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn slot_count(&self) -> usize {
        self.phases.len()
    }

    pub fn slot_phase(&self, slot: usize) -> Option<SlotPhase> {
        self.phases.get(slot).copied()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Handle for the window's resize callback.
    pub fn resize_flag(&self) -> ResizeFlag {
        self.resized.clone()
    }

    /// Runs one iteration of the loop.
    pub fn draw_frame<B, W>(&mut self, backend: &mut B, window: &mut W) -> Result<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
        W: WindowSystem + ?Sized,
    {
        self.sync_slot_count(backend.slot_count());
        let slot = self.current_slot;

        backend.wait_for_slot(slot)?;
        self.phases[slot] = SlotPhase::Acquiring;
        let (image_index, suboptimal) = match backend.acquire_next_image(slot)? {
            Acquire::Image { index, suboptimal } => (index, suboptimal),
            Acquire::OutOfDate => {
                // The fence was never reset, so the slot stays Idle.
                self.phases[slot] = SlotPhase::Idle;
                debug!(slot, "acquire: swapchain out of date");
                self.resized.clear();
                return self.recreate(backend, window, FrameOutcome::Recreated);
            }
        };
        let mut must_recreate = suboptimal || self.resized.is_set();

        // Only now is a submit guaranteed to follow.
        backend.reset_slot(slot)?;
        self.phases[slot] = SlotPhase::Recording;
        backend.record(slot, image_index)?;

        backend.submit(slot)?;
        self.phases[slot] = SlotPhase::Submitted;

        let status = backend.present(slot, image_index)?;
        self.phases[slot] = SlotPhase::Presented;
        self.stats.frames_presented += 1;
        must_recreate |= status.is_stale() || self.resized.is_set();

        if must_recreate {
            debug!(slot, ?status, suboptimal, "swapchain stale after present");
            self.resized.clear();
            return self.recreate(
                backend,
                window,
                FrameOutcome::PresentedThenRecreated { slot, image_index },
            );
        }

        self.current_slot = (slot + 1) % self.phases.len();
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    /// Polls events and draws until the window asks to close or `max_frames`
    /// frames have been presented, then drains the device.
    pub fn run<B, W>(
        &mut self,
        backend: &mut B,
        window: &mut W,
        max_frames: Option<u64>,
    ) -> Result<FrameStats>
    where
        B: FrameBackend + ?Sized,
        W: WindowSystem + ?Sized,
    {
        loop {
            window.poll_events();
            if window.should_close() {
                break;
            }
            self.draw_frame(backend, window)?;
            if max_frames.is_some_and(|n| self.stats.frames_presented >= n) {
                info!("frame limit reached");
                break;
            }
        }

        backend.wait_idle()?;
        info!(
            "frame loop done: {} frames presented, {} swapchain rebuilds",
            self.stats.frames_presented, self.stats.recreations
        );
        Ok(self.stats)
    }

    fn recreate<B, W>(
        &mut self,
        backend: &mut B,
        window: &mut W,
        outcome: FrameOutcome,
    ) -> Result<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
        W: WindowSystem + ?Sized,
    {
        let mut size = window.framebuffer_size();
        while size.is_empty() {
            if window.should_close() {
                self.resized.notify();
                return Ok(FrameOutcome::Deferred);
            }
            window.wait_events();
            size = window.framebuffer_size();
        }

        backend.wait_idle()?;
        backend.recreate_swapchain(size)?;

        self.current_slot = 0;
        self.phases = vec![SlotPhase::Idle; backend.slot_count().max(1)];
        self.stats.recreations += 1;
        debug!(
            "swapchain rebuilt at {}x{} with {} slots",
            size.width,
            size.height,
            self.phases.len()
        );
        Ok(outcome)
    }

    fn sync_slot_count(&mut self, n: usize) {
        let n = n.max(1);
        if self.phases.len() != n {
            self.phases = vec![SlotPhase::Idle; n];
            self.current_slot = 0;
        }
    }
}
