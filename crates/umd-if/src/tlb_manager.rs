// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Window allocator over the per-device TLB pool.
//!
//! Each [`TlbWindow`] owns one translation register for its lifetime; drop
//! returns the index to the free pool. Reconfiguration rewrites the register
//! and is serialized by the `&mut` receiver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ttkmd_if::{PciDevice, Tlb};
use umd_core::Arch;

use crate::{arch, coords::XyPair, error::PlatformError};

/// How host accesses through the window reach memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlbMapping {
    WriteCombining,
    Uncached,
    /// Window used as the device-side alias of a DMA transfer.
    DmaAlias,
}

pub use ttkmd_if::Ordering;

struct TlbPool {
    free: HashMap<u64, Vec<u32>>,
}

pub struct TlbManager {
    device: Arc<Mutex<PciDevice>>,
    pool: Arc<Mutex<TlbPool>>,
    arch: Arch,
}

impl TlbManager {
    pub fn new(device: Arc<Mutex<PciDevice>>) -> Self {
        let arch = device.lock().unwrap().arch;

        let mut free: HashMap<u64, Vec<u32>> = HashMap::new();
        let info = ttkmd_if::tlb::get_tlb_info(&device.lock().unwrap());
        let mut index = 0u32;
        for class in info.tlb_config.iter() {
            for _ in 0..class.count {
                if index != arch::cached_tlb_index(arch) {
                    free.entry(class.size).or_default().push(index);
                }
                index += 1;
            }
        }
        // Hand out low indices first.
        for indices in free.values_mut() {
            indices.reverse();
        }

        Self {
            device,
            pool: Arc::new(Mutex::new(TlbPool { free })),
            arch,
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Reserve a window of exactly `size` bytes.
    pub fn allocate(&self, size: u64, mapping: TlbMapping) -> Result<TlbWindow, PlatformError> {
        if !arch::tlb_window_sizes(self.arch).contains(&size) {
            return Err(PlatformError::InvalidAddress {
                addr: size,
                reason: format!(
                    "{size:#x} is not a window size of {}; valid sizes are {:x?}",
                    self.arch,
                    arch::tlb_window_sizes(self.arch)
                ),
            });
        }

        let index = self
            .pool
            .lock()
            .unwrap()
            .free
            .get_mut(&size)
            .and_then(|indices| indices.pop())
            .ok_or(PlatformError::OutOfTlbs { size })?;

        Ok(TlbWindow {
            device: self.device.clone(),
            pool: self.pool.clone(),
            index,
            size,
            mapping,
            reserved: false,
            bar_addr: None,
        })
    }

    /// Build a window around a reserved index without touching the pool.
    /// Used for the per-device cached window.
    pub(crate) fn cached_window(&self) -> TlbWindow {
        TlbWindow {
            device: self.device.clone(),
            pool: self.pool.clone(),
            index: arch::cached_tlb_index(self.arch),
            size: 0,
            mapping: TlbMapping::Uncached,
            reserved: true,
            bar_addr: None,
        }
    }
}

pub struct TlbWindow {
    device: Arc<Mutex<PciDevice>>,
    pool: Arc<Mutex<TlbPool>>,
    pub index: u32,
    pub size: u64,
    pub mapping: TlbMapping,
    reserved: bool,

    // (bar offset, usable bytes) of the last configuration.
    bar_addr: Option<(u64, u64)>,
}

impl TlbWindow {
    /// Point the window at `offset` on `core` (coordinates as wired on the
    /// selected NoC).
    pub fn reconfigure(
        &mut self,
        core: XyPair,
        offset: u64,
        noc_sel: u8,
        ordering: Ordering,
    ) -> Result<(), PlatformError> {
        self.reconfigure_tlb(Tlb {
            local_offset: offset,
            x_end: core.x,
            y_end: core.y,
            noc_sel,
            ordering,
            ..Default::default()
        })
    }

    /// Multicast variant covering the `start..=end` rectangle.
    pub fn reconfigure_multicast(
        &mut self,
        start: XyPair,
        end: XyPair,
        offset: u64,
        noc_sel: u8,
        ordering: Ordering,
    ) -> Result<(), PlatformError> {
        self.reconfigure_tlb(Tlb {
            local_offset: offset,
            x_start: start.x,
            y_start: start.y,
            x_end: end.x,
            y_end: end.y,
            noc_sel,
            mcast: true,
            ordering,
            ..Default::default()
        })
    }

    pub fn reconfigure_tlb(&mut self, tlb: Tlb) -> Result<(), PlatformError> {
        let mut device = self.device.lock().unwrap();
        let (bar_addr, len) = ttkmd_if::tlb::setup_tlb(&mut device, self.index, tlb)?;
        self.bar_addr = Some((bar_addr, len));
        Ok(())
    }

    fn configured(&self) -> Result<(u64, u64), PlatformError> {
        self.bar_addr.ok_or(PlatformError::InvalidAddress {
            addr: self.index as u64,
            reason: "window accessed before first reconfigure".to_string(),
        })
    }

    /// Usable bytes from the configured offset to the end of the aperture.
    pub fn usable_len(&self) -> u64 {
        self.bar_addr.map(|(_, len)| len).unwrap_or(0)
    }

    pub fn write_block(&mut self, offset: u64, data: &[u8]) -> Result<(), PlatformError> {
        let (bar_addr, len) = self.configured()?;
        if offset + data.len() as u64 > len {
            return Err(PlatformError::InvalidAddress {
                addr: offset,
                reason: format!("{} bytes at {offset:#x} overrun the window", data.len()),
            });
        }

        self.device
            .lock()
            .unwrap()
            .write_block64(bar_addr + offset, data)?;

        // Strict windows promise completion before return.
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    pub fn read_block(&mut self, offset: u64, data: &mut [u8]) -> Result<(), PlatformError> {
        let (bar_addr, len) = self.configured()?;
        if offset + data.len() as u64 > len {
            return Err(PlatformError::InvalidAddress {
                addr: offset,
                reason: format!("{} bytes at {offset:#x} overrun the window", data.len()),
            });
        }

        self.device
            .lock()
            .unwrap()
            .read_block64(bar_addr + offset, data)?;
        Ok(())
    }

    /// The current bar offset, for DMA aliasing.
    pub fn bar_offset(&self) -> Result<u64, PlatformError> {
        self.configured().map(|(addr, _)| addr)
    }
}

impl Drop for TlbWindow {
    fn drop(&mut self) {
        // The cached window's reserved index never enters the pool.
        if self.reserved {
            return;
        }
        self.pool
            .lock()
            .unwrap()
            .free
            .entry(self.size)
            .or_default()
            .push(self.index);
    }
}
