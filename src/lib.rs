// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! User-mode driver for Tenstorrent AI accelerators.
//!
//! The [`Cluster`] handle enumerates every chip reachable from this host,
//! whether it has its own PCIe endpoint or sits behind an ethernet tunnel,
//! and exposes a uniform core-addressed read/write model over all of them.
//!
//! ```no_run
//! use ttumd::{open_cluster, CoordSystem, CoreCoord, CoreType};
//!
//! let cluster = open_cluster()?;
//! for chip in cluster.chip_ids() {
//!     let core = CoreCoord::new(0, 0, CoreType::Tensix, CoordSystem::Logical);
//!     cluster.write_to_device(chip, core, 0x1000, &0xdeadbeefu32.to_le_bytes())?;
//! }
//! # Ok::<(), ttumd::PlatformError>(())
//! ```

pub use ttkmd_if as kmd;
pub use umd_core::Arch;
pub use umd_if as device;

pub use umd_if::{
    BoardType, Chip, ChipId, ChipInfo, ChipType, Cluster, ClusterDescriptor, ClusterOptions,
    CoordSystem, CoreCoord, CoreType, EthCoord, HarvestingMasks, IoDeviceType, PlatformError,
    SocDescriptor, XyPair,
};

/// Open every chip the kernel driver exposes, with default options.
pub fn open_cluster() -> Result<Cluster, PlatformError> {
    Cluster::open(ClusterOptions::default())
}

/// The PCI interface indices present on this host.
pub fn scan() -> Vec<usize> {
    ttkmd_if::PciDevice::scan()
}
