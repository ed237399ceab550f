// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// The ethernet-fabric location of a chip.
///
/// `cluster_id` is the disjoint-set root over all chips reachable from each
/// other by ethernet; chips in different clusters never route to each other.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EthCoord {
    pub cluster_id: u32,
    pub x: u8,
    pub y: u8,
    pub rack: u8,
    pub shelf: u8,
}

impl std::fmt::Display for EthCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(cluster {}, x {}, y {}, rack {}, shelf {})",
            self.cluster_id, self.x, self.y, self.rack, self.shelf
        )
    }
}
