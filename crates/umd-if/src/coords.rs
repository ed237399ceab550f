// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// A bare (x, y) pair on the NoC grid.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct XyPair {
    pub x: u8,
    pub y: u8,
}

impl XyPair {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

impl From<(u8, u8)> for XyPair {
    fn from(value: (u8, u8)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl std::fmt::Display for XyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

impl std::str::FromStr for XyPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once('-')
            .ok_or_else(|| format!("expected x-y, got {s}"))?;
        Ok(Self {
            x: x.trim().parse().map_err(|e| format!("{e}"))?,
            y: y.trim().parse().map_err(|e| format!("{e}"))?,
        })
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreType {
    Tensix,
    Dram,
    Eth,
    Arc,
    Pcie,
    RouterOnly,
    Security,
    L2Cpu,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSystem {
    Logical,
    Noc0,
    Translated,
    Noc1,
}

/// A core location. Two coords compare equal only when the position, the
/// core type and the coordinate system all match.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoreCoord {
    pub x: u8,
    pub y: u8,
    pub core_type: CoreType,
    pub coord_system: CoordSystem,
}

impl CoreCoord {
    pub const fn new(x: u8, y: u8, core_type: CoreType, coord_system: CoordSystem) -> Self {
        Self {
            x,
            y,
            core_type,
            coord_system,
        }
    }

    pub fn xy(&self) -> XyPair {
        XyPair {
            x: self.x,
            y: self.y,
        }
    }
}

impl std::fmt::Display for CoreCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}) [{:?}, {:?}]",
            self.x, self.y, self.core_type, self.coord_system
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xy_pair_parses_descriptor_notation() {
        assert_eq!("3-11".parse::<XyPair>().unwrap(), XyPair::new(3, 11));
        assert_eq!(XyPair::new(3, 11).to_string(), "3-11");
        assert!("3".parse::<XyPair>().is_err());
    }

    #[test]
    fn core_coord_equality_requires_all_fields() {
        let a = CoreCoord::new(1, 1, CoreType::Tensix, CoordSystem::Noc0);
        let b = CoreCoord::new(1, 1, CoreType::Tensix, CoordSystem::Noc1);
        let c = CoreCoord::new(1, 1, CoreType::Eth, CoordSystem::Noc0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, CoreCoord::new(1, 1, CoreType::Tensix, CoordSystem::Noc0));
    }
}
