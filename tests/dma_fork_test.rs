// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Four processes DMA-ing through one PCIe device at disjoint ranges.
//!
//! Overlapping cross-process DMA is documented-unsupported; every child here
//! owns a disjoint 2KB-strided slice of the target core's L1.

use serial_test::serial;

use ttumd::{open_cluster, CoordSystem, CoreType};

const CHILDREN: usize = 4;
const PATTERN_BYTES: usize = 1024;
const STRIDE: u64 = 2048;
const BASE_ADDR: u64 = 0x4000;

fn child_body(slot: usize) -> i32 {
    let cluster = match open_cluster() {
        Ok(cluster) => cluster,
        Err(err) => {
            eprintln!("child {slot} failed to open cluster: {err}");
            return 1;
        }
    };

    let chip = cluster.chip_ids()[0];
    let core = cluster
        .get_soc_descriptor(chip)
        .unwrap()
        .get_cores(CoreType::Tensix, CoordSystem::Translated)[0];

    let pid = std::process::id();
    let addr = BASE_ADDR + slot as u64 * STRIDE;

    let mut pattern = Vec::with_capacity(PATTERN_BYTES);
    for i in 0u32..(PATTERN_BYTES / 4) as u32 {
        pattern.extend_from_slice(&((pid << 24) | (i & 0xFFFFFF)).to_le_bytes());
    }

    if let Err(err) = cluster.dma_write_to_device(chip, core, addr, &pattern) {
        eprintln!("child {slot} dma write failed: {err}");
        return 1;
    }

    let mut readback = vec![0u8; PATTERN_BYTES];
    if let Err(err) = cluster.dma_read_from_device(chip, core, addr, &mut readback) {
        eprintln!("child {slot} dma read failed: {err}");
        return 1;
    }

    if pattern != readback {
        eprintln!("child {slot} readback mismatch");
        return 1;
    }

    0
}

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware"
)]
fn dma_from_four_processes_over_disjoint_ranges() {
    let mut children = Vec::new();

    for slot in 0..CHILDREN {
        match unsafe { nix::unistd::fork() }.expect("fork should succeed") {
            nix::unistd::ForkResult::Child => {
                std::process::exit(child_body(slot));
            }
            nix::unistd::ForkResult::Parent { child } => {
                children.push(child);
            }
        }
    }

    for child in children {
        let status = nix::sys::wait::waitpid(child, None).expect("waitpid");
        match status {
            nix::sys::wait::WaitStatus::Exited(_, 0) => {}
            other => panic!("child did not exit cleanly: {other:?}"),
        }
    }
}
