// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tunneled transfers to a chip with no MMIO endpoint, with host staging
//! disabled so the driver must chunk through the ERISC scratch buffer.

use serial_test::serial;

use ttumd::{Cluster, ClusterOptions, CoordSystem, CoreType};

const L1_ADDR: u64 = 0x100;
const TRANSFER_BYTES: usize = 2048;

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", feature = "test_wormhole")),
    ignore = "Requires wormhole hardware with a remote chip"
)]
fn remote_transfer_without_sysmem() {
    let cluster = Cluster::open(ClusterOptions {
        num_host_mem_ch_per_mmio_device: 0,
        ..Default::default()
    })
    .expect("cluster should open");

    let remote_chip = match cluster
        .chip_ids()
        .into_iter()
        .find(|chip| !cluster.get_chip(*chip).unwrap().is_mmio_capable())
    {
        Some(chip) => chip,
        None => {
            println!("Test SKIPPED: no remote chip in this cluster");
            return;
        }
    };

    let core = cluster
        .get_soc_descriptor(remote_chip)
        .unwrap()
        .get_cores(CoreType::Tensix, CoordSystem::Translated)[0];

    // Zero fill, flush, verify.
    let zeros = vec![0u8; TRANSFER_BYTES];
    cluster
        .write_to_device(remote_chip, core, L1_ADDR, &zeros)
        .expect("zero write");
    cluster.wait_for_non_mmio_flush().expect("flush");

    let mut readback = vec![0xffu8; TRANSFER_BYTES];
    cluster
        .read_from_device(remote_chip, core, L1_ADDR, &mut readback)
        .expect("zero readback");
    assert_eq!(zeros, readback);

    // Word pattern, flush, verify.
    let mut pattern = Vec::with_capacity(TRANSFER_BYTES);
    for word in 0u32..(TRANSFER_BYTES / 4) as u32 {
        pattern.extend_from_slice(&word.to_le_bytes());
    }
    cluster
        .write_to_device(remote_chip, core, L1_ADDR, &pattern)
        .expect("pattern write");
    cluster.wait_for_non_mmio_flush().expect("flush");

    let mut readback = vec![0u8; TRANSFER_BYTES];
    cluster
        .read_from_device(remote_chip, core, L1_ADDR, &mut readback)
        .expect("pattern readback");
    assert_eq!(pattern, readback);
}
