// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use ttkmd_if::{Hugepage, PciDevice};

use crate::error::PlatformError;

/// Hugepage-backed host memory channels visible to one MMIO device.
///
/// Used both as the DMA target and as the staging area for large
/// ethernet-tunneled transfers. Concurrent access to disjoint offsets is
/// safe; overlapping writers are the caller's problem.
pub struct SysmemManager {
    channels: Vec<Hugepage>,
}

impl SysmemManager {
    pub fn new(
        device: &Arc<Mutex<PciDevice>>,
        num_host_mem_channels: u32,
    ) -> Result<Self, PlatformError> {
        let mut channels = Vec::new();

        let device = device.lock().unwrap();
        for channel in 0..num_host_mem_channels.min(ttkmd_if::kmdif::MAX_HUGEPAGE_CHANNELS) {
            match device.allocate_hugepage(ttkmd_if::kmdif::HUGEPAGE_SIZE) {
                Ok(hugepage) => channels.push(hugepage),
                Err(err) => {
                    tracing::warn!(
                        "Failed to allocate hugepage channel {channel} for device {}: {err}",
                        device.id
                    );
                    return Err(err.into());
                }
            }
        }

        Ok(Self { channels })
    }

    pub fn num_host_mem_channels(&self) -> usize {
        self.channels.len()
    }

    fn channel(&self, channel: u16) -> Result<&Hugepage, PlatformError> {
        self.channels
            .get(channel as usize)
            .ok_or(PlatformError::InvalidAddress {
                addr: channel as u64,
                reason: format!("device has {} sysmem channels", self.channels.len()),
            })
    }

    fn check_bounds(hugepage: &Hugepage, offset: u64, len: usize) -> Result<(), PlatformError> {
        if offset + len as u64 > hugepage.size {
            return Err(PlatformError::InvalidAddress {
                addr: offset,
                reason: format!(
                    "{len} bytes at {offset:#x} exceed the {:#x}-byte channel",
                    hugepage.size
                ),
            });
        }
        Ok(())
    }

    pub fn write_to_sysmem(
        &mut self,
        channel: u16,
        data: &[u8],
        offset: u64,
    ) -> Result<(), PlatformError> {
        let hugepage = self
            .channels
            .get_mut(channel as usize)
            .ok_or(PlatformError::InvalidAddress {
                addr: channel as u64,
                reason: "no such sysmem channel".to_string(),
            })?;
        Self::check_bounds(hugepage, offset, data.len())?;

        hugepage.buffer[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_from_sysmem(
        &self,
        channel: u16,
        data: &mut [u8],
        offset: u64,
    ) -> Result<(), PlatformError> {
        let hugepage = self.channel(channel)?;
        Self::check_bounds(hugepage, offset, data.len())?;

        data.copy_from_slice(&hugepage.buffer[offset as usize..offset as usize + data.len()]);
        Ok(())
    }

    /// The device-visible address and size of one channel, for DMA setup and
    /// the ERISC staging path.
    pub fn get_hugepage_mapping(&self, channel: u16) -> Option<(u64, u64)> {
        self.channels
            .get(channel as usize)
            .map(|hugepage| (hugepage.device_address, hugepage.size))
    }
}
