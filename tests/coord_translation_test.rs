// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Translation laws of the coordinate manager, checked over both
//! architectures and a sweep of harvesting masks. These run everywhere; no
//! hardware involved.

use ttumd::device::coordinate_manager::CoordinateManager;
use ttumd::{Arch, CoordSystem, CoreCoord, CoreType, HarvestingMasks};

fn manager(arch: Arch, tensix_mask: u32) -> CoordinateManager {
    CoordinateManager::new(
        arch,
        true,
        HarvestingMasks {
            tensix: tensix_mask,
            ..Default::default()
        },
    )
    .unwrap()
}

fn axis_width(arch: Arch) -> u32 {
    match arch {
        Arch::Blackhole => 14,
        _ => 10,
    }
}

#[test]
fn translation_composition_holds_for_every_system_pair() {
    let systems = [
        CoordSystem::Noc0,
        CoordSystem::Noc1,
        CoordSystem::Translated,
    ];

    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        for mask in [0u32, 0b1, 0b11, 0b1001, 0b10101] {
            let cm = manager(arch, mask);

            for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
                for s1 in systems {
                    for s2 in systems {
                        let direct = cm.translate(core, s2).unwrap();
                        let indirect = cm
                            .translate(cm.translate(core, s1).unwrap(), s2)
                            .unwrap();
                        assert_eq!(
                            direct, indirect,
                            "{arch:?} mask {mask:#b}: {core} via {s1:?} to {s2:?}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn surviving_cores_have_dense_logical_coordinates() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        for mask in 0u32..(1 << 6) {
            let cm = manager(arch, mask);
            let harvested = mask.count_ones();

            for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
                let logical = cm.translate(core, CoordSystem::Logical).unwrap();
                let harvested_axis = if arch.is_blackhole() {
                    logical.x as u32
                } else {
                    logical.y as u32
                };
                assert!(
                    harvested_axis < axis_width(arch) - harvested,
                    "{arch:?} mask {mask:#b}: {core} -> {logical}"
                );
            }
        }
    }
}

#[test]
fn harvested_cores_have_no_logical_coordinate() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        let cm = manager(arch, 0b101);
        let harvested = cm.get_harvested_cores(CoreType::Tensix);
        assert!(!harvested.is_empty());

        for core in harvested {
            assert!(
                cm.translate(core, CoordSystem::Logical).is_err(),
                "{arch:?}: harvested {core} must not translate to logical"
            );
        }
    }
}

#[test]
fn identity_translation_is_the_identity() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        let cm = manager(arch, 0b1);
        for system in [
            CoordSystem::Noc0,
            CoordSystem::Noc1,
            CoordSystem::Translated,
            CoordSystem::Logical,
        ] {
            for core in cm.get_cores(CoreType::Tensix, system) {
                assert_eq!(cm.translate(core, system).unwrap(), core);
            }
        }
    }
}

#[test]
fn non_logical_translations_are_injective() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        for mask in [0u32, 0b11, 0b110011] {
            let cm = manager(arch, mask);
            for system in [CoordSystem::Noc1, CoordSystem::Translated] {
                let mut seen = std::collections::HashSet::new();
                for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
                    let translated = cm.translate(core, system).unwrap();
                    assert!(
                        seen.insert((translated.x, translated.y)),
                        "{arch:?} mask {mask:#b} duplicate in {system:?}: {translated}"
                    );
                }
            }
        }
    }
}

#[test]
fn translated_collapses_to_noc0_when_translation_is_disabled() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        let cm = CoordinateManager::new(
            arch,
            false,
            HarvestingMasks {
                tensix: 0b11,
                ..Default::default()
            },
        )
        .unwrap();

        for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
            let translated = cm.translate(core, CoordSystem::Translated).unwrap();
            assert_eq!((translated.x, translated.y), (core.x, core.y));
        }
    }
}

#[test]
fn more_than_one_harvested_dram_bank_is_rejected() {
    for arch in [Arch::WormholeB0, Arch::Blackhole] {
        let result = CoordinateManager::new(
            arch,
            true,
            HarvestingMasks {
                dram: 0b101,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }
}

#[test]
fn dram_and_eth_channel_queries_respect_harvesting() {
    let cm = CoordinateManager::new(
        Arch::WormholeB0,
        true,
        HarvestingMasks {
            dram: 0b1,
            eth: 0b11,
            ..Default::default()
        },
    )
    .unwrap();

    // 6 banks of 3 endpoints, one bank harvested.
    assert_eq!(cm.get_cores(CoreType::Dram, CoordSystem::Noc0).len(), 15);
    // 16 channels, two harvested.
    assert_eq!(cm.get_cores(CoreType::Eth, CoordSystem::Noc0).len(), 14);

    // Logical channels renumber densely over the survivors.
    let eth = cm.get_cores(CoreType::Eth, CoordSystem::Logical);
    let max_chan = eth.iter().map(|c| c.x).max().unwrap();
    assert_eq!(max_chan as usize, eth.len() - 1);
}

#[test]
fn every_grid_position_resolves_through_get_coord_at() {
    let cm = manager(Arch::WormholeB0, 0);
    for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
        let at = cm
            .get_coord_at(core.xy(), CoordSystem::Noc0)
            .unwrap();
        assert_eq!(at.core_type, CoreType::Tensix);
        assert_eq!((at.x, at.y), (core.x, core.y));
    }

    // A position outside the grid errors.
    assert!(cm
        .get_coord_at(ttumd::XyPair::new(40, 40), CoordSystem::Noc0)
        .is_err());
}

#[test]
fn core_coord_display_is_stable() {
    let c = CoreCoord::new(3, 4, CoreType::Tensix, CoordSystem::Noc0);
    assert_eq!(format!("{c}"), "(3, 4) [Tensix, Noc0]");
}

#[test]
fn random_masks_round_trip_through_every_system() {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(0x7357);

    for _ in 0..64 {
        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            let mask = rng.gen_range(0u32..(1 << axis_width(arch)));
            let cm = manager(arch, mask);

            for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
                for system in [
                    CoordSystem::Noc1,
                    CoordSystem::Translated,
                    CoordSystem::Logical,
                ] {
                    let there = cm.translate(core, system).unwrap();
                    let back = cm.translate(there, CoordSystem::Noc0).unwrap();
                    assert_eq!(
                        (back.x, back.y),
                        (core.x, core.y),
                        "{arch:?} mask {mask:#b} via {system:?}"
                    );
                }
            }
        }
    }
}
