// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{PciDevice, PciError};

mod blackhole;
mod wormhole;

/// AXI ordering mode selected when a window is programmed.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum Ordering {
    Relaxed,
    #[default]
    Strict,
    Posted,
}

impl From<u8> for Ordering {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Relaxed,
            2 => Self::Posted,
            _ => Self::Strict,
        }
    }
}

impl From<Ordering> for u8 {
    fn from(value: Ordering) -> Self {
        match value {
            Ordering::Relaxed => 0,
            Ordering::Strict => 1,
            Ordering::Posted => 2,
        }
    }
}

/// Architecture-neutral description of a TLB translation register.
///
/// `local_offset` carries the full chip-side address; `setup_tlb` splits it
/// into the register prefix and the offset within the aperture.
#[derive(Debug, Clone, Default)]
pub struct Tlb {
    pub local_offset: u64,
    pub x_end: u8,
    pub y_end: u8,
    pub x_start: u8,
    pub y_start: u8,
    pub noc_sel: u8,
    pub mcast: bool,
    pub ordering: Ordering,
    pub linked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryType {
    Uc,
    Wc,
}

#[derive(Debug)]
pub struct TlbInfo {
    pub count: u64,
    pub size: u64,
    pub memory_type: MemoryType,
}

pub struct DeviceTlbInfo {
    pub device_id: u32,
    pub total_count: u32,
    pub tlb_config: Vec<TlbInfo>,
}

/// Program the translation register for `index` and return
/// `(bar0 offset of the aperture adjusted for the in-window offset, usable bytes)`.
pub fn setup_tlb(device: &mut PciDevice, index: u32, tlb: Tlb) -> Result<(u64, u64), PciError> {
    match device.arch {
        umd_core::Arch::WormholeB0 => wormhole::setup_tlb(device, index, tlb),
        umd_core::Arch::Blackhole => blackhole::setup_tlb(device, index, tlb),
        umd_core::Arch::Unknown(_) => Err(PciError::TlbAllocationError(
            "unknown architecture has no tlb layout".to_string(),
        )),
    }
}

pub fn get_tlb(device: &PciDevice, index: u32) -> Result<Tlb, PciError> {
    match device.arch {
        umd_core::Arch::WormholeB0 => wormhole::get_tlb(device, index),
        umd_core::Arch::Blackhole => blackhole::get_tlb(device, index),
        umd_core::Arch::Unknown(_) => Err(PciError::TlbAllocationError(
            "unknown architecture has no tlb layout".to_string(),
        )),
    }
}

pub fn get_tlb_info(device: &PciDevice) -> DeviceTlbInfo {
    match device.arch {
        umd_core::Arch::Blackhole => blackhole::tlb_info(device),
        _ => wormhole::tlb_info(device),
    }
}
