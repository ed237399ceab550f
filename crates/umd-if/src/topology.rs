// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cluster graph construction from live link tables.
//!
//! Starting from the MMIO-capable endpoints, walk each chip's ethernet
//! connection table, probe newly seen peers through the tunnel and keep
//! going until the frontier is empty. Untrained links are skipped, so a chip
//! with no trained path to any MMIO endpoint never enters the graph.

use std::collections::{BTreeMap, HashMap, VecDeque};

use umd_core::Arch;

use crate::{
    arch,
    cluster_descriptor::{BoardType, ChipId, ChipInfo, ClusterDescriptor},
    coords::XyPair,
    error::PlatformError,
    eth_addr::EthCoord,
    harvesting::HarvestingMasks,
    remote::RemoteCommunication,
    tt_device::TTDevice,
};

/// Ethernet-firmware L1 layout, keyed off the running firmware version.
#[derive(Clone, Copy, Debug)]
pub struct EthAddresses {
    pub node_info: u64,
    pub eth_conn_info: u64,
    pub results_buf: u64,
}

impl EthAddresses {
    pub fn new(eth_fw_version: u32) -> Self {
        let masked_version = eth_fw_version & 0x00FF_FFFF;

        if masked_version >= 0x050000 {
            EthAddresses {
                node_info: 0x1100,
                eth_conn_info: 0x1200,
                results_buf: 0x1ec0,
            }
        } else {
            EthAddresses {
                node_info: 0x5100,
                eth_conn_info: 0x5200,
                results_buf: 0x5e40,
            }
        }
    }
}

// eth_conn_info values below this mean no trained link on the channel.
const ETH_UNKNOWN: u32 = 0;
const ETH_UNCONNECTED: u32 = 1;

// Word offsets in the node-info block.
const NODE_INFO_LOCAL_COORD: u64 = 2;
const NODE_INFO_REMOTE_SHELF: u64 = 9;
const NODE_INFO_REMOTE_RACK: u64 = 10;
const NODE_INFO_BOARD_ID_LO: u64 = 12;
const NODE_INFO_BOARD_ID_HI: u64 = 13;
const NODE_INFO_HARVESTING: u64 = 14;
const NODE_INFO_NOC_TRANSLATION: u64 = 15;
const NODE_INFO_ASIC_LOCATION: u64 = 16;

fn coord_key(coord: &EthCoord) -> (u8, u8, u8, u8) {
    (coord.rack, coord.shelf, coord.x, coord.y)
}

/// Reads 32-bit words from one chip's ethernet cores, either directly over
/// MMIO or through a tunnel.
enum EthReader<'a> {
    Local(&'a TTDevice),
    Remote(&'a RemoteCommunication),
}

impl EthReader<'_> {
    fn read32(&self, eth_core: XyPair, addr: u64) -> Result<u32, PlatformError> {
        match self {
            EthReader::Local(device) => device.read32(eth_core, addr),
            EthReader::Remote(remote) => {
                let mut word = [0u8; 4];
                remote.read_non_mmio(
                    eth_core,
                    addr,
                    &mut word,
                    crate::chip::REMOTE_IO_TIMEOUT,
                )?;
                Ok(u32::from_le_bytes(word))
            }
        }
    }
}

struct LinkEntry {
    channel: u32,
    remote_coord: EthCoord,
    remote_channel: u32,
}

fn decode_local_coord(word: u32) -> EthCoord {
    EthCoord {
        cluster_id: 0,
        rack: (word & 0xFF) as u8,
        shelf: ((word >> 8) & 0xFF) as u8,
        x: ((word >> 16) & 0xFF) as u8,
        y: ((word >> 24) & 0xFF) as u8,
    }
}

fn walk_links(
    arch_: Arch,
    reader: &EthReader<'_>,
    addrs: &EthAddresses,
) -> Result<Vec<LinkEntry>, PlatformError> {
    let eth_cores = arch::eth_locations(arch_);
    let mut links = Vec::new();

    for (channel, eth_core) in eth_cores.iter().enumerate() {
        let port_status =
            reader.read32(*eth_core, addrs.eth_conn_info + 4 * channel as u64)?;
        if port_status == ETH_UNKNOWN || port_status == ETH_UNCONNECTED {
            continue;
        }

        let rack_word =
            reader.read32(*eth_core, addrs.node_info + 4 * NODE_INFO_REMOTE_RACK)?;
        let shelf_word =
            reader.read32(*eth_core, addrs.node_info + 4 * NODE_INFO_REMOTE_SHELF)?;

        let remote_noc_x = ((shelf_word >> 4) & 0x3F) as u8;
        let remote_noc_y = ((shelf_word >> 10) & 0x3F) as u8;
        let remote_coord = EthCoord {
            cluster_id: 0,
            rack: (rack_word & 0xFF) as u8,
            shelf: ((rack_word >> 8) & 0xFF) as u8,
            x: ((shelf_word >> 16) & 0x3F) as u8,
            y: ((shelf_word >> 22) & 0x3F) as u8,
        };

        let remote_channel = eth_cores
            .iter()
            .position(|c| *c == XyPair::new(remote_noc_x, remote_noc_y))
            .ok_or_else(|| {
                PlatformError::TopologyError(format!(
                    "remote endpoint ({remote_noc_x}, {remote_noc_y}) is not an ethernet core"
                ))
            })? as u32;

        links.push(LinkEntry {
            channel: channel as u32,
            remote_coord,
            remote_channel,
        });
    }

    Ok(links)
}

fn read_chip_info(
    arch_: Arch,
    reader: &EthReader<'_>,
    addrs: &EthAddresses,
) -> Result<ChipInfo, PlatformError> {
    let eth_core = arch::eth_locations(arch_)[0];

    let board_id_lo = reader.read32(eth_core, addrs.node_info + 4 * NODE_INFO_BOARD_ID_LO)? as u64;
    let board_id_hi = reader.read32(eth_core, addrs.node_info + 4 * NODE_INFO_BOARD_ID_HI)? as u64;
    let harvesting = reader.read32(eth_core, addrs.node_info + 4 * NODE_INFO_HARVESTING)?;
    let noc_translation =
        reader.read32(eth_core, addrs.node_info + 4 * NODE_INFO_NOC_TRANSLATION)? != 0;
    let asic_location = reader.read32(eth_core, addrs.node_info + 4 * NODE_INFO_ASIC_LOCATION)?;

    let board_id = (board_id_hi << 32) | board_id_lo;

    Ok(ChipInfo {
        noc_translation_enabled: noc_translation,
        harvesting_masks: HarvestingMasks::from_arc_readout(arch_, harvesting, 0, 0, 0, 0)?,
        board_type: BoardType::from_board_id(board_id),
        board_id,
        asic_location,
    })
}

/// Build the cluster descriptor for a set of opened, initialized devices.
///
/// `devices` maps the PCI interface index to its device handle.
pub fn discover_cluster(
    devices: &BTreeMap<usize, std::sync::Arc<TTDevice>>,
) -> Result<ClusterDescriptor, PlatformError> {
    let mut descriptor = ClusterDescriptor::default();

    let mut next_chip_id: ChipId = 0;
    let mut chip_by_coord: HashMap<(u8, u8, u8, u8), ChipId> = HashMap::new();
    // Remote chips keep the mmio device they were first seen through.
    let mut tunnel_anchor: HashMap<ChipId, usize> = HashMap::new();
    let mut frontier: VecDeque<ChipId> = VecDeque::new();

    // Seed with every MMIO chip.
    for (pci_index, device) in devices.iter() {
        let telemetry = device.telemetry()?.read()?;

        let (location, info) = if device.arch.is_blackhole() {
            // No fabric coordinates without routing firmware; synthesize a
            // unique slot from the host-side index.
            let location = EthCoord {
                cluster_id: 0,
                x: next_chip_id as u8,
                y: 0,
                rack: 0,
                shelf: 0,
            };
            let info = ChipInfo {
                noc_translation_enabled: telemetry.noc_translation_enabled,
                harvesting_masks: HarvestingMasks::from_arc_readout(
                    device.arch,
                    telemetry.harvesting_state,
                    0,
                    0,
                    0,
                    0,
                )?,
                board_type: telemetry.board_type(),
                board_id: telemetry.board_id,
                asic_location: telemetry.asic_location,
            };
            (location, info)
        } else {
            let addrs = EthAddresses::new(telemetry.eth_fw_version);
            let reader = EthReader::Local(device);
            let eth_core = arch::eth_locations(device.arch)[0];

            let local_word =
                reader.read32(eth_core, addrs.node_info + 4 * NODE_INFO_LOCAL_COORD)?;
            let info = ChipInfo {
                noc_translation_enabled: telemetry.noc_translation_enabled,
                harvesting_masks: HarvestingMasks::from_arc_readout(
                    device.arch,
                    telemetry.harvesting_state,
                    0,
                    0,
                    0,
                    0,
                )?,
                board_type: telemetry.board_type(),
                board_id: telemetry.board_id,
                asic_location: telemetry.asic_location,
            };
            (decode_local_coord(local_word), info)
        };

        let chip = next_chip_id;
        next_chip_id += 1;
        chip_by_coord.insert(coord_key(&location), chip);
        tunnel_anchor.insert(chip, *pci_index);
        descriptor.add_chip(chip, device.arch, location, info, Some(*pci_index));

        if device.arch.is_wormhole() {
            frontier.push_back(chip);
        }
    }

    // Walk outward until every trained link has been followed.
    while let Some(chip) = frontier.pop_front() {
        let anchor_pci = tunnel_anchor[&chip];
        let device = &devices[&anchor_pci];
        let arch_ = descriptor.get_arch(chip).unwrap();
        let telemetry = device.telemetry()?.read()?;
        let addrs = EthAddresses::new(telemetry.eth_fw_version);

        let chip_location = descriptor.chip_locations[&chip];

        let tunnel;
        let reader = if descriptor.is_chip_mmio_capable(chip) {
            EthReader::Local(device.as_ref())
        } else {
            tunnel = RemoteCommunication::create(
                device.clone(),
                chip_location,
                arch::eth_locations(arch_).to_vec(),
                None,
                false,
            )?
            .ok_or_else(|| {
                PlatformError::UnsupportedOperation(
                    "remote discovery is not supported on this generation".to_string(),
                )
            })?;
            EthReader::Remote(&tunnel)
        };

        for link in walk_links(arch_, &reader, &addrs)? {
            let remote_key = coord_key(&link.remote_coord);

            let remote_chip = match chip_by_coord.get(&remote_key) {
                Some(existing) => *existing,
                None => {
                    // First sighting: probe it through this chip's anchor.
                    let probe = RemoteCommunication::create(
                        device.clone(),
                        link.remote_coord,
                        arch::eth_locations(arch_).to_vec(),
                        None,
                        false,
                    )?
                    .ok_or_else(|| {
                        PlatformError::UnsupportedOperation(
                            "remote discovery is not supported on this generation".to_string(),
                        )
                    })?;

                    let info =
                        read_chip_info(arch_, &EthReader::Remote(&probe), &addrs)?;

                    let new_chip = next_chip_id;
                    next_chip_id += 1;
                    chip_by_coord.insert(remote_key, new_chip);
                    tunnel_anchor.insert(new_chip, anchor_pci);
                    descriptor.add_chip(new_chip, arch_, link.remote_coord, info, None);
                    frontier.push_back(new_chip);
                    new_chip
                }
            };

            descriptor.add_ethernet_connection(
                chip,
                link.channel,
                remote_chip,
                link.remote_channel,
            );
        }
    }

    descriptor.assign_cluster_ids();
    descriptor.populate_exit_chips()?;
    descriptor.verify()?;

    tracing::debug!(
        "Topology discovery found {} chips ({} with mmio)",
        descriptor.all_chips.len(),
        descriptor.chips_with_mmio.len()
    );

    Ok(descriptor)
}
