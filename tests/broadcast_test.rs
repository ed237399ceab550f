// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cluster-wide broadcast writes, excluding the DRAM columns.

use std::collections::BTreeSet;

use serial_test::serial;

use ttumd::{open_cluster, Arch, CoordSystem, CoreType};

const BROADCAST_ADDR: u64 = 0x1000;
const BROADCAST_VALUE: u32 = 0xDEADBEEF;

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware"
)]
fn broadcast_reaches_every_included_tensix() {
    let cluster = open_cluster().expect("cluster should open");
    if cluster.chip_ids().len() < 2 {
        println!("Test SKIPPED: needs a cluster of at least two chips");
        return;
    }

    let (cols, rows): (Vec<u32>, Vec<u32>) = match cluster.arch() {
        Arch::Blackhole => (vec![0, 8, 9], vec![0, 1]),
        _ => (vec![0, 5], vec![0, 6]),
    };
    let cols_to_exclude: BTreeSet<u32> = cols.into_iter().collect();
    let rows_to_exclude: BTreeSet<u32> = rows.into_iter().collect();
    let chips_to_exclude = BTreeSet::new();

    cluster
        .broadcast_write_to_cluster(
            &BROADCAST_VALUE.to_le_bytes(),
            BROADCAST_ADDR,
            &chips_to_exclude,
            &rows_to_exclude,
            &cols_to_exclude,
        )
        .expect("broadcast should succeed");
    cluster.wait_for_non_mmio_flush().expect("flush");

    for chip in cluster.chip_ids() {
        let soc = cluster.get_soc_descriptor(chip).unwrap();
        for core in soc.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
            if rows_to_exclude.contains(&(core.y as u32))
                || cols_to_exclude.contains(&(core.x as u32))
            {
                continue;
            }

            let mut word = [0u8; 4];
            cluster
                .read_from_device(chip, core, BROADCAST_ADDR, &mut word)
                .expect("readback");
            assert_eq!(
                u32::from_le_bytes(word),
                BROADCAST_VALUE,
                "chip {chip} core {core} missed the broadcast"
            );
        }
    }
}
