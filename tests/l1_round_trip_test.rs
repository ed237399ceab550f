// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Single-chip L1 read/write against real hardware.
//!
//! These tests need a physical device and are ignored unless the hardware
//! test features are enabled:
//!
//!   cargo test --features test_hardware,test_wormhole -- --ignored

use serial_test::serial;

use ttumd::{open_cluster, CoordSystem, CoreType};

const L1_SCRATCH: u64 = 0x1000;

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware"
)]
fn l1_round_trip_on_every_surviving_core() {
    let cluster = open_cluster().expect("cluster should open");
    let chip = cluster.chip_ids()[0];

    let pattern: Vec<u8> = (0u8..40).collect();

    for core in cluster
        .get_soc_descriptor(chip)
        .unwrap()
        .get_cores(CoreType::Tensix, CoordSystem::Translated)
    {
        cluster
            .write_to_device(chip, core, L1_SCRATCH, &pattern)
            .expect("write should succeed");
        cluster.l1_membar(chip, &[core]).expect("membar");

        let mut readback = vec![0u8; pattern.len()];
        cluster
            .read_from_device(chip, core, L1_SCRATCH, &mut readback)
            .expect("read should succeed");

        assert_eq!(pattern, readback, "mismatch on core {core}");
    }
}

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware"
)]
fn zero_byte_access_is_a_no_op() {
    let cluster = open_cluster().expect("cluster should open");
    let chip = cluster.chip_ids()[0];
    let core = cluster
        .get_soc_descriptor(chip)
        .unwrap()
        .get_cores(CoreType::Tensix, CoordSystem::Translated)[0];

    cluster
        .write_to_device(chip, core, L1_SCRATCH, &[])
        .expect("empty write should succeed");
    let mut empty = [0u8; 0];
    cluster
        .read_from_device(chip, core, L1_SCRATCH, &mut empty)
        .expect("empty read should succeed");
}

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware"
)]
fn misaligned_access_is_byte_exact() {
    let cluster = open_cluster().expect("cluster should open");
    let chip = cluster.chip_ids()[0];
    let core = cluster
        .get_soc_descriptor(chip)
        .unwrap()
        .get_cores(CoreType::Tensix, CoordSystem::Translated)[0];

    let backdrop = [0xcdu8; 16];
    cluster
        .write_to_device(chip, core, L1_SCRATCH, &backdrop)
        .expect("backdrop write");

    // Two bytes at a +1 offset must not disturb the neighbours.
    cluster
        .write_to_device(chip, core, L1_SCRATCH + 1, &[0xad, 0xde])
        .expect("misaligned write");
    cluster.l1_membar(chip, &[core]).expect("membar");

    let mut readback = [0u8; 4];
    cluster
        .read_from_device(chip, core, L1_SCRATCH, &mut readback)
        .expect("readback");
    assert_eq!(readback, [0xcd, 0xad, 0xde, 0xcd]);

    // A misaligned read sees the same bytes.
    let mut shifted = [0u8; 2];
    cluster
        .read_from_device(chip, core, L1_SCRATCH + 1, &mut shifted)
        .expect("misaligned read");
    assert_eq!(shifted, [0xad, 0xde]);
}
