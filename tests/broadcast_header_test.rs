// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Broadcast header generation over synthetic cluster graphs.

use std::collections::BTreeSet;

use ttumd::device::cluster::compute_ethernet_broadcast_headers;
use ttumd::device::cluster_descriptor::ChipInfo;
use ttumd::{Arch, BoardType, ClusterDescriptor, EthCoord, HarvestingMasks};

fn chip_info() -> ChipInfo {
    ChipInfo {
        noc_translation_enabled: true,
        harvesting_masks: HarvestingMasks::default(),
        board_type: BoardType::N300,
        board_id: 0,
        asic_location: 0,
    }
}

fn n300_pair() -> ClusterDescriptor {
    let mut desc = ClusterDescriptor::default();
    desc.add_chip(
        0,
        Arch::WormholeB0,
        EthCoord {
            cluster_id: 0,
            x: 0,
            y: 0,
            rack: 0,
            shelf: 0,
        },
        chip_info(),
        Some(0),
    );
    desc.add_chip(
        1,
        Arch::WormholeB0,
        EthCoord {
            cluster_id: 0,
            x: 1,
            y: 0,
            rack: 0,
            shelf: 0,
        },
        chip_info(),
        None,
    );
    desc.add_ethernet_connection(0, 8, 1, 0);
    desc.assign_cluster_ids();
    desc
}

#[test]
fn pair_collapses_into_one_header_group() {
    let desc = n300_pair();
    let headers = compute_ethernet_broadcast_headers(&desc, &BTreeSet::new());

    // Both chips sit on shelf 0 / rack 0 of the same mmio group.
    assert_eq!(headers.len(), 1);
    let group = &headers[&0];
    assert_eq!(group.len(), 1);

    let header = group[0];
    // Shelf mask before inversion: bit 0 of byte 0 in word 0.
    assert_eq!(header[0], !0b1);
    assert_eq!(header[1], !0u32);
    assert_eq!(header[2], !0u32);
    // Both shelf-local chip ids selected.
    assert_eq!(header[3], !0b11);
}

#[test]
fn excluded_chips_drop_out_of_the_chip_mask() {
    let desc = n300_pair();
    let exclude: BTreeSet<u32> = [1u32].into_iter().collect();
    let headers = compute_ethernet_broadcast_headers(&desc, &exclude);

    let header = headers[&0][0];
    assert_eq!(header[3], !0b1);
}

#[test]
fn second_shelf_sets_a_distinct_shelf_bit() {
    let mut desc = n300_pair();
    desc.add_chip(
        2,
        Arch::WormholeB0,
        EthCoord {
            cluster_id: 0,
            x: 0,
            y: 0,
            rack: 0,
            shelf: 1,
        },
        chip_info(),
        None,
    );
    desc.add_ethernet_connection(1, 9, 2, 1);
    desc.assign_cluster_ids();

    let headers = compute_ethernet_broadcast_headers(&desc, &BTreeSet::new());
    let group = &headers[&0];

    // Shelf-1 traffic rides a separate header whose shelf bit is bit 1.
    assert!(group.iter().any(|h| h[0] == !0b10));
    // Shelf-0 chips still present with shelf bit 0.
    assert!(group.iter().any(|h| h[0] == !0b01));
}

#[test]
fn chips_with_identical_masks_merge_into_one_header() {
    // Two remotes at distinct shelf-local positions on the same shelf should
    // merge into a single header with both id bits set.
    let mut desc = n300_pair();
    desc.add_chip(
        2,
        Arch::WormholeB0,
        EthCoord {
            cluster_id: 0,
            x: 2,
            y: 0,
            rack: 0,
            shelf: 0,
        },
        chip_info(),
        None,
    );
    desc.add_ethernet_connection(1, 9, 2, 1);
    desc.assign_cluster_ids();

    let headers = compute_ethernet_broadcast_headers(&desc, &BTreeSet::new());
    let group = &headers[&0];
    assert_eq!(group.len(), 1);
    assert_eq!(group[0][3], !0b111);
}
