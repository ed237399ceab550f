// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

pub const MAX_DMA_BYTES: u32 = 4 * 1024 * 1024;

// Portion of BAR0 that the kernel driver exposes write-combined.
pub const WH_BAR0_WC_MAPPING_SIZE: u64 = (156 << 20) + (10 << 21) + (18 << 24);
pub const BH_BAR0_WC_MAPPING_SIZE: u64 = 188 << 21;

// Known-live registers probed when a read returns the all-ones sentinel.
pub const WH_ARC_SCRATCH6_ADDR: u32 = 0x1ff30078;
pub const BH_NOC_NODE_ID_OFFSET: u32 = 0x1FD04044;

pub const HUGEPAGE_SIZE: u64 = 1 << 30;
pub const MAX_HUGEPAGE_CHANNELS: u32 = 4;

// Device addresses at or above this sit in the blackhole 4GB apertures,
// reachable through the BAR4 mapping rather than BAR0.
pub const BH_4G_TLB_BASE: u64 = 202 * (1 << 21);

#[repr(u32)]
#[derive(Debug, Clone, Copy)]
pub enum MappingId {
    Unused = 0,
    Resource0Uc = 1,
    Resource0Wc = 2,
    Resource1Uc = 3,
    Resource1Wc = 4,
    Resource2Uc = 5,
    Resource2Wc = 6,
    Unknown(u32),
}

impl MappingId {
    pub fn from_u32(value: u32) -> MappingId {
        match value {
            0 => MappingId::Unused,
            1 => MappingId::Resource0Uc,
            2 => MappingId::Resource0Wc,
            3 => MappingId::Resource1Uc,
            4 => MappingId::Resource1Wc,
            5 => MappingId::Resource2Uc,
            6 => MappingId::Resource2Wc,
            v => MappingId::Unknown(v),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            MappingId::Unused => 0,
            MappingId::Resource0Uc => 1,
            MappingId::Resource0Wc => 2,
            MappingId::Resource1Uc => 3,
            MappingId::Resource1Wc => 4,
            MappingId::Resource2Uc => 5,
            MappingId::Resource2Wc => 6,
            MappingId::Unknown(v) => *v,
        }
    }
}

pub fn getpagesize() -> Option<i64> {
    nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
}

#[bitfield_struct::bitfield(u32)]
pub struct DmaPack {
    #[bits(28)]
    pub size_bytes: u32,
    pub write: bool, // 0 = Chip -> Host, 1 = Host -> Chip
    pub pcie_msi_on_done: bool,
    pub pcie_write_on_done: bool,
    pub trigger: bool,
}

/// Request block written into ARC CSM to kick the PCIe DMA engine.
#[repr(C)]
pub struct ArcPcieCtrlDmaRequest {
    pub chip_addr: u32,
    pub host_phys_addr_lo: u32,
    pub completion_flag_phys_addr: u32,
    pub dma_pack: DmaPack,
    pub repeat: u32, // bit31 marks a 64-bit transfer request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dma_pack_layout() {
        let pack = DmaPack::new()
            .with_size_bytes(0x1000)
            .with_write(true)
            .with_pcie_write_on_done(true)
            .with_trigger(true);

        assert_eq!(pack.0 & 0x0FFF_FFFF, 0x1000);
        assert!(pack.0 & (1 << 28) != 0);
        assert!(pack.0 & (1 << 29) == 0);
        assert!(pack.0 & (1 << 30) != 0);
        assert!(pack.0 & (1 << 31) != 0);
    }

    #[test]
    fn mapping_id_round_trip() {
        for id in 0..8u32 {
            assert_eq!(MappingId::from_u32(id).as_u32(), id);
        }
    }
}
