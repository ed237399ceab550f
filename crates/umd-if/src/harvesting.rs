// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use umd_core::Arch;

use crate::{arch, cluster_descriptor::BoardType, error::PlatformError};

/// Disabled cores, one mask per core type.
///
/// Bit `i` of a mask disables the i-th core of that type in the ordered
/// logical numbering of the SoC descriptor. This is the only form the driver
/// stores or accepts; raw ARC readouts must go through
/// [`HarvestingMasks::from_arc_readout`] first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestingMasks {
    pub tensix: u32,
    pub dram: u32,
    pub eth: u32,
    pub pcie: u32,
    pub l2cpu: u32,
}

impl HarvestingMasks {
    /// Ingest the tensix mask as reported by ARC telemetry.
    ///
    /// ARC numbers fuse slots by physical layout; slot `i` corresponds to the
    /// NOC0 row/column `HARVESTING_NOC_LOCATIONS[i]`. This is the single
    /// place where that shuffle happens.
    pub fn from_arc_readout(
        arch: Arch,
        physical_tensix_mask: u32,
        dram: u32,
        eth: u32,
        pcie: u32,
        l2cpu: u32,
    ) -> Result<Self, PlatformError> {
        let locations = arch::harvesting_noc_locations(arch);
        let mut ordered: Vec<u8> = locations.to_vec();
        ordered.sort();

        if physical_tensix_mask >> locations.len() != 0 {
            return Err(PlatformError::HarvestingInvalid(format!(
                "tensix mask {physical_tensix_mask:#x} exceeds the {} harvestable slots of {arch}",
                locations.len()
            )));
        }

        let mut tensix = 0u32;
        for (slot, location) in locations.iter().enumerate() {
            if physical_tensix_mask & (1 << slot) != 0 {
                let logical = ordered.iter().position(|l| l == location).unwrap();
                tensix |= 1 << logical;
            }
        }

        let masks = Self {
            tensix,
            dram,
            eth,
            pcie,
            l2cpu,
        };
        masks.validate(arch)?;
        Ok(masks)
    }

    pub fn validate(&self, arch: Arch) -> Result<(), PlatformError> {
        if self.dram.count_ones() > 1 {
            return Err(PlatformError::HarvestingInvalid(format!(
                "at most one DRAM bank may be harvested, mask is {:#x}",
                self.dram
            )));
        }

        let num_slots = arch::harvesting_noc_locations(arch).len();
        if self.tensix >> num_slots != 0 {
            return Err(PlatformError::HarvestingInvalid(format!(
                "tensix mask {:#x} exceeds the {num_slots}-wide grid of {arch}",
                self.tensix
            )));
        }

        if self.dram >> arch::num_dram_channels(arch) != 0 {
            return Err(PlatformError::HarvestingInvalid(format!(
                "dram mask {:#x} names a channel {arch} does not have",
                self.dram
            )));
        }

        if self.eth >> arch::num_eth_channels(arch) != 0 {
            return Err(PlatformError::HarvestingInvalid(format!(
                "eth mask {:#x} names a channel {arch} does not have",
                self.eth
            )));
        }

        if self.pcie >> arch::pcie_locations(arch).len() != 0 {
            return Err(PlatformError::HarvestingInvalid(format!(
                "pcie mask {:#x} names an endpoint {arch} does not have",
                self.pcie
            )));
        }

        Ok(())
    }

    /// The PCIe mask is fused per board variant; reject combinations that
    /// disagree with the board we are actually talking to.
    pub fn validate_pcie_for_board(
        &self,
        arch: Arch,
        board_type: BoardType,
    ) -> Result<(), PlatformError> {
        if !arch.is_blackhole() {
            return if self.pcie == 0 {
                Ok(())
            } else {
                Err(PlatformError::HarvestingInvalid(format!(
                    "pcie mask {:#x} is not valid for single-endpoint {arch}",
                    self.pcie
                )))
            };
        }

        let expected = match board_type {
            // Single-port boards fuse off the second endpoint.
            BoardType::P100 => 0b10,
            BoardType::P150 | BoardType::P300 => 0b01,
            _ => return Ok(()),
        };

        if self.pcie != 0 && self.pcie != expected {
            return Err(PlatformError::HarvestingInvalid(format!(
                "pcie mask {:#x} does not match board {board_type:?} (expected {expected:#x})",
                self.pcie
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_readout_shuffles_into_logical_order() {
        // Wormhole fuse slot 0 is NOC0 row 11 which is the last logical row.
        let masks =
            HarvestingMasks::from_arc_readout(Arch::WormholeB0, 0b1, 0, 0, 0, 0).unwrap();
        assert_eq!(masks.tensix, 1 << 9);

        // Fuse slot 1 is NOC0 row 1, the first logical row.
        let masks =
            HarvestingMasks::from_arc_readout(Arch::WormholeB0, 0b10, 0, 0, 0, 0).unwrap();
        assert_eq!(masks.tensix, 1 << 0);
    }

    #[test]
    fn arc_readout_is_a_bijection_on_mask_bits() {
        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            let slots = arch::harvesting_noc_locations(arch).len();
            let mut seen = 0u32;
            for slot in 0..slots {
                let masks =
                    HarvestingMasks::from_arc_readout(arch, 1 << slot, 0, 0, 0, 0).unwrap();
                assert_eq!(masks.tensix.count_ones(), 1);
                assert_eq!(seen & masks.tensix, 0);
                seen |= masks.tensix;
            }
            assert_eq!(seen, (1 << slots) - 1);
        }
    }

    #[test]
    fn more_than_one_dram_bank_is_rejected() {
        let masks = HarvestingMasks {
            dram: 0b11,
            ..Default::default()
        };
        assert!(matches!(
            masks.validate(Arch::WormholeB0),
            Err(PlatformError::HarvestingInvalid(_))
        ));

        let masks = HarvestingMasks {
            dram: 0b10,
            ..Default::default()
        };
        assert!(masks.validate(Arch::WormholeB0).is_ok());
    }

    #[test]
    fn oversized_tensix_mask_is_rejected() {
        let masks = HarvestingMasks {
            tensix: 1 << 10,
            ..Default::default()
        };
        assert!(masks.validate(Arch::WormholeB0).is_err());
        // Fourteen columns on blackhole, so the same bit is fine there.
        assert!(masks.validate(Arch::Blackhole).is_ok());
    }

    #[test]
    fn pcie_mask_must_match_board() {
        let masks = HarvestingMasks {
            pcie: 0b01,
            ..Default::default()
        };
        assert!(masks
            .validate_pcie_for_board(Arch::Blackhole, BoardType::P150)
            .is_ok());
        assert!(masks
            .validate_pcie_for_board(Arch::Blackhole, BoardType::P100)
            .is_err());
    }
}
