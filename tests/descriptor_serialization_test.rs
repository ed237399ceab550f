// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Round-trip laws of the SoC and cluster descriptor YAML forms.

use ttumd::device::cluster_descriptor::ChipInfo;
use ttumd::{
    Arch, BoardType, ClusterDescriptor, CoordSystem, CoreType, EthCoord, HarvestingMasks,
    SocDescriptor,
};

#[test]
fn soc_descriptor_round_trips_for_every_arch_and_mask() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        for tensix_mask in [0u32, 0b1, 0b1010] {
            let desc = SocDescriptor::from_arch(
                arch,
                true,
                HarvestingMasks {
                    tensix: tensix_mask,
                    dram: 0b1,
                    eth: 0b10,
                    ..Default::default()
                },
                BoardType::Unknown,
            )
            .unwrap();

            let text = desc.to_yaml_string().unwrap();
            let loaded = SocDescriptor::from_yaml_str(&text).unwrap();

            for core_type in [CoreType::Tensix, CoreType::Eth, CoreType::Dram] {
                assert_eq!(
                    loaded.get_cores(core_type, CoordSystem::Noc0),
                    desc.get_cores(core_type, CoordSystem::Noc0),
                    "{arch:?} mask {tensix_mask:#b} {core_type:?}"
                );
                assert_eq!(
                    loaded.get_cores(core_type, CoordSystem::Logical),
                    desc.get_cores(core_type, CoordSystem::Logical),
                );
            }

            // Serialization is a fixed point after one round trip.
            assert_eq!(loaded.to_yaml_string().unwrap(), text);
        }
    }
}

#[test]
fn soc_descriptor_yaml_uses_the_documented_keys() {
    let desc = SocDescriptor::from_arch(
        Arch::WormholeB0,
        true,
        HarvestingMasks::default(),
        BoardType::N150,
    )
    .unwrap();

    let text = desc.to_yaml_string().unwrap();
    for key in [
        "grid:",
        "arch:",
        "functional_workers:",
        "harvested_workers:",
        "dram:",
        "eth:",
        "arc:",
        "pcie:",
        "router_only:",
        "worker_l1_size:",
        "eth_l1_size:",
        "dram_bank_size:",
        "noc0_x_to_noc1_x:",
        "noc0_y_to_noc1_y:",
        "features:",
        "translation_id_enabled:",
    ] {
        assert!(text.contains(key), "missing {key} in:\n{text}");
    }
}

fn sample_cluster() -> ClusterDescriptor {
    let mut desc = ClusterDescriptor::default();
    let info = ChipInfo {
        noc_translation_enabled: true,
        harvesting_masks: HarvestingMasks {
            tensix: 0b1,
            ..Default::default()
        },
        board_type: BoardType::N300,
        board_id: 0x14u64 << 36,
        asic_location: 0,
    };

    for (chip, x, pci) in [(0u32, 0u8, Some(0usize)), (1, 1, None), (2, 2, None)] {
        desc.add_chip(
            chip,
            Arch::WormholeB0,
            EthCoord {
                cluster_id: 0,
                x,
                y: 0,
                rack: 0,
                shelf: 0,
            },
            info.clone(),
            pci,
        );
    }
    desc.add_ethernet_connection(0, 8, 1, 0);
    desc.add_ethernet_connection(1, 8, 2, 0);
    desc.assign_cluster_ids();
    desc.populate_exit_chips().unwrap();
    desc
}

#[test]
fn cluster_descriptor_round_trips_the_graph() {
    let desc = sample_cluster();
    desc.verify().unwrap();

    let text = desc.serialize_to_yaml().unwrap();
    let loaded = ClusterDescriptor::from_yaml_str(&text).unwrap();
    loaded.verify().unwrap();

    assert_eq!(loaded.all_chips, desc.all_chips);
    assert_eq!(loaded.chips_with_mmio, desc.chips_with_mmio);
    assert_eq!(loaded.ethernet_connections, desc.ethernet_connections);
    for chip in desc.all_chips.iter() {
        assert_eq!(
            loaded.chip_locations[chip].x,
            desc.chip_locations[chip].x
        );
        assert_eq!(
            loaded.chip_info[chip].board_type,
            desc.chip_info[chip].board_type
        );
        assert_eq!(
            loaded.chip_info[chip].harvesting_masks.tensix,
            desc.chip_info[chip].harvesting_masks.tensix
        );
        assert_eq!(
            loaded.get_closest_mmio_chip(*chip).unwrap(),
            desc.get_closest_mmio_chip(*chip).unwrap()
        );
    }
}

#[test]
fn cluster_descriptor_yaml_uses_the_documented_keys() {
    let text = sample_cluster().serialize_to_yaml().unwrap();
    for key in [
        "arch:",
        "chips:",
        "chips_with_mmio:",
        "ethernet_connections:",
        "harvesting:",
        "boardtype:",
        "noc_translation:",
        "harvest_mask:",
    ] {
        assert!(text.contains(key), "missing {key} in:\n{text}");
    }
}

#[test]
fn chained_remote_routes_to_the_single_mmio_chip() {
    let desc = sample_cluster();
    assert_eq!(desc.get_closest_mmio_chip(2).unwrap(), 0);
}
