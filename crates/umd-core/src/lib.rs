// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

/// The ASIC generation a chip belongs to.
///
/// The generation decides the TLB aperture layout, the ARC message protocol
/// (scratch registers vs. CSM queue) and parts of the core grid.
#[derive(Clone, Hash, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    WormholeB0,
    Blackhole,
    Unknown(u16),
}

impl Arch {
    pub fn is_wormhole(&self) -> bool {
        matches!(self, Arch::WormholeB0)
    }

    pub fn is_blackhole(&self) -> bool {
        matches!(self, Arch::Blackhole)
    }

    /// Decode the architecture from a PCIe device id.
    pub fn from_pci_device_id(device_id: u16) -> Self {
        match device_id {
            0x401e => Arch::WormholeB0,
            0xb140 => Arch::Blackhole,
            id => Arch::Unknown(id),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::WormholeB0 => write!(f, "wormhole_b0"),
            Arch::Blackhole => write!(f, "blackhole"),
            Arch::Unknown(id) => write!(f, "unknown({id:#06x})"),
        }
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wormhole_b0" | "wormhole" => Ok(Arch::WormholeB0),
            "blackhole" => Ok(Arch::Blackhole),
            other => Err(format!("unknown architecture {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_from_pci_device_id() {
        assert_eq!(Arch::from_pci_device_id(0x401e), Arch::WormholeB0);
        assert_eq!(Arch::from_pci_device_id(0xb140), Arch::Blackhole);
        assert_eq!(Arch::from_pci_device_id(0xfaca), Arch::Unknown(0xfaca));
    }

    #[test]
    fn arch_string_round_trip() {
        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            assert_eq!(arch.to_string().parse::<Arch>().unwrap(), arch);
        }
    }
}
