// SPDX-License-Identifier: CEPL-1.0
//! Queue family roles.
//!
//! Families are visited once, in order, through a mutually exclusive chain:
//! a GRAPHICS family never counts as compute or transfer, and a COMPUTE family
//! never counts as transfer. Present is only considered on graphics families.

use std::collections::BTreeSet;

use anyhow::Result;
use ash::vk;
use trisync_core::LogProfile;

use crate::diagnostics;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueRole {
    Graphics,
    Present,
    Compute,
    Transfer,
}

impl QueueRole {
    pub const ALL: [QueueRole; 4] = [
        QueueRole::Graphics,
        QueueRole::Present,
        QueueRole::Compute,
        QueueRole::Transfer,
    ];

    pub const fn priority(self) -> f32 {
        1.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn has_graphics(&self) -> bool {
        self.graphics.is_some()
    }

    pub fn has_present(&self) -> bool {
        self.present.is_some()
    }

    pub fn has_compute(&self) -> bool {
        self.compute.is_some()
    }

    pub fn has_transfer(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn get(&self, role: QueueRole) -> Option<u32> {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Present => self.present,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
        }
    }

    /// Graphics and present are always required; compute unless relaxed.
    pub fn is_complete(&self, require_compute: bool) -> bool {
        self.has_graphics() && self.has_present() && (!require_compute || self.has_compute())
    }

    /// Distinct family indices across all resolved roles, ascending. One
    /// queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        QueueRole::ALL
            .iter()
            .filter_map(|&r| self.get(r))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Assigns each role the first family that qualifies for it. `can_present`
/// is asked only about graphics families, and only until one answers yes.
pub fn resolve_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut can_present: F,
    profile: LogProfile,
) -> Result<QueueFamilyIndices>
where
    F: FnMut(u32) -> Result<bool>,
{
    let mut idx = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        let flags = family.queue_flags;

        if flags.contains(vk::QueueFlags::GRAPHICS) {
            if idx.graphics.is_none() {
                idx.graphics = Some(i);
                if profile.contains(LogProfile::GRAPHICS_QUEUE) {
                    diagnostics::log_queue_family("graphics", i, family);
                }
            }
            if idx.present.is_none() && can_present(i)? {
                idx.present = Some(i);
            }
        } else if flags.contains(vk::QueueFlags::COMPUTE) {
            if idx.compute.is_none() {
                idx.compute = Some(i);
                if profile.contains(LogProfile::COMPUTE_QUEUE) {
                    diagnostics::log_queue_family("compute", i, family);
                }
            }
        } else if flags.contains(vk::QueueFlags::TRANSFER) && idx.transfer.is_none() {
            idx.transfer = Some(i);
            if profile.contains(LogProfile::TRANSFER_QUEUE) {
                diagnostics::log_queue_family("transfer", i, family);
            }
        }
    }

    Ok(idx)
}
