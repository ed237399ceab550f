// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! The chip-level public API.
//!
//! The set of chip kinds is closed, so this is a plain enum rather than a
//! trait object: a `Local` chip fronts its own PCIe endpoint, a `Remote`
//! chip routes every access through a tunnel anchored on its closest MMIO
//! peer.

mod local;
mod remote;

pub use local::LocalChip;
pub use remote::RemoteChip;

use crate::{
    coords::{CoreCoord, CoreType},
    error::PlatformError,
    soc_descriptor::SocDescriptor,
};

/// Default deadline for tunneled accesses; direct MMIO does not poll.
pub const REMOTE_IO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

pub enum Chip {
    Local(LocalChip),
    Remote(RemoteChip),
}

impl Chip {
    pub fn soc_descriptor(&self) -> &SocDescriptor {
        match self {
            Chip::Local(chip) => chip.soc_descriptor(),
            Chip::Remote(chip) => chip.soc_descriptor(),
        }
    }

    pub fn is_mmio_capable(&self) -> bool {
        matches!(self, Chip::Local(_))
    }

    pub fn as_local(&self) -> Option<&LocalChip> {
        match self {
            Chip::Local(chip) => Some(chip),
            Chip::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteChip> {
        match self {
            Chip::Remote(chip) => Some(chip),
            Chip::Local(_) => None,
        }
    }

    pub fn read_from_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        match self {
            Chip::Local(chip) => chip.read_from_device(core, addr, data),
            Chip::Remote(chip) => chip.read_from_device(core, addr, data),
        }
    }

    pub fn write_to_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        match self {
            Chip::Local(chip) => chip.write_to_device(core, addr, data),
            Chip::Remote(chip) => chip.write_to_device(core, addr, data),
        }
    }

    pub fn wait_for_non_mmio_flush(&self) -> Result<(), PlatformError> {
        match self {
            Chip::Local(_) => Ok(()),
            Chip::Remote(chip) => chip.wait_for_non_mmio_flush(),
        }
    }

    pub fn l1_membar(&self, cores: &[CoreCoord]) -> Result<(), PlatformError> {
        match self {
            Chip::Local(chip) => chip.l1_membar(cores),
            // Ethernet ordering subsumes the barrier for tunneled chips.
            Chip::Remote(chip) => chip.wait_for_non_mmio_flush(),
        }
    }

    pub fn dram_membar(&self, channels: &[u32]) -> Result<(), PlatformError> {
        match self {
            Chip::Local(chip) => chip.dram_membar(channels),
            Chip::Remote(chip) => chip.wait_for_non_mmio_flush(),
        }
    }

    pub fn assert_risc_resets(&self) -> Result<(), PlatformError> {
        let cores = self
            .soc_descriptor()
            .get_cores(CoreType::Tensix, crate::coords::CoordSystem::Translated);
        for core in cores {
            self.write_to_device(
                core,
                crate::arch::tensix_soft_reset_addr(self.soc_descriptor().arch),
                &crate::tensix::TENSIX_ASSERT_SOFT_RESET.to_le_bytes(),
            )?;
        }
        Ok(())
    }

    pub fn deassert_risc_resets(&self, staggered_start: bool) -> Result<(), PlatformError> {
        let mut bits = crate::tensix::TENSIX_DEASSERT_SOFT_RESET;
        if staggered_start {
            bits |= crate::tensix::SOFT_RESET_STAGGERED_START;
        }

        let cores = self
            .soc_descriptor()
            .get_cores(CoreType::Tensix, crate::coords::CoordSystem::Translated);
        for core in cores {
            self.write_to_device(
                core,
                crate::arch::tensix_soft_reset_addr(self.soc_descriptor().arch),
                &bits.to_le_bytes(),
            )?;
        }
        Ok(())
    }
}
