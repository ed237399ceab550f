// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chip-facing interface of the Tenstorrent user-mode driver.

pub mod arc;
pub mod arch;
pub mod chip;
pub mod cluster;
pub mod cluster_descriptor;
pub mod coordinate_manager;
pub mod coords;
pub mod error;
pub mod eth_addr;
pub mod harvesting;
pub mod lock_manager;
pub mod remote;
pub mod soc_descriptor;
pub mod sysmem;
pub mod tensix;
pub mod tlb_manager;
pub mod topology;
pub mod tt_device;

pub use arc::{ArcMsg, ArcMsgOk, PowerState, Telemetry};
pub use chip::{Chip, LocalChip, RemoteChip};
pub use cluster::{ChipType, Cluster, ClusterOptions, IoDeviceType};
pub use cluster_descriptor::{BoardType, ChipId, ChipInfo, ClusterDescriptor};
pub use coordinate_manager::CoordinateManager;
pub use coords::{CoordSystem, CoreCoord, CoreType, XyPair};
pub use error::PlatformError;
pub use eth_addr::EthCoord;
pub use harvesting::HarvestingMasks;
pub use soc_descriptor::SocDescriptor;
pub use tt_device::TTDevice;
