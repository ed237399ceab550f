// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Run a tiny counter loop on BRISC and watch it count.
//!
//! The program increments the word at L1 offset 0x10000 forever:
//!
//!   lui   a4, 0x10
//!   sw    zero, 0(a4)
//!   loop: lw    a5, 0(a4)
//!   addi  a5, a5, 1
//!   sw    a5, 0(a4)
//!   j     loop

use serial_test::serial;

use ttumd::{open_cluster, CoordSystem, CoreType};

const COUNTER_PROGRAM: [u32; 6] = [
    0x00010737, 0x00072023, 0x00072783, 0x00178793, 0x00f72023, 0xff5ff06f,
];
const COUNTER_ADDR: u64 = 0x10000;

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware"
)]
fn counter_program_advances_until_reset() {
    let cluster = open_cluster().expect("cluster should open");

    let mut program = Vec::with_capacity(COUNTER_PROGRAM.len() * 4);
    for word in COUNTER_PROGRAM {
        program.extend_from_slice(&word.to_le_bytes());
    }

    for chip in cluster.chip_ids() {
        let soc = cluster.get_soc_descriptor(chip).unwrap();
        let reset_addr = ttumd::device::arch::tensix_soft_reset_addr(soc.arch);

        for core in soc.get_cores(CoreType::Tensix, CoordSystem::Translated) {
            // Hold every risc, zero the landing zone, place the program.
            cluster
                .write_to_device(
                    chip,
                    core,
                    reset_addr,
                    &ttumd::device::tensix::TENSIX_ASSERT_SOFT_RESET.to_le_bytes(),
                )
                .expect("assert reset");
            cluster
                .write_to_device(chip, core, 0, &[0u8; 32])
                .expect("zero L1");
            cluster
                .write_to_device(chip, core, 0, &program)
                .expect("load program");
            cluster.l1_membar(chip, &[core]).expect("membar");

            // Release BRISC only.
            let run = ttumd::device::tensix::TENSIX_ASSERT_SOFT_RESET
                & !ttumd::device::tensix::SOFT_RESET_BRISC;
            cluster
                .write_to_device(chip, core, reset_addr, &run.to_le_bytes())
                .expect("deassert brisc");

            let mut word = [0u8; 4];
            cluster
                .read_from_device(chip, core, COUNTER_ADDR, &mut word)
                .expect("first sample");
            let first = u32::from_le_bytes(word);
            cluster
                .read_from_device(chip, core, COUNTER_ADDR, &mut word)
                .expect("second sample");
            let second = u32::from_le_bytes(word);

            assert!(
                second > first,
                "counter must advance on chip {chip} core {core}: {first} -> {second}"
            );

            // Back in reset the counter freezes.
            cluster
                .write_to_device(
                    chip,
                    core,
                    reset_addr,
                    &ttumd::device::tensix::TENSIX_ASSERT_SOFT_RESET.to_le_bytes(),
                )
                .expect("re-assert reset");
            cluster.l1_membar(chip, &[core]).expect("membar");

            cluster
                .read_from_device(chip, core, COUNTER_ADDR, &mut word)
                .expect("frozen sample a");
            let frozen_a = u32::from_le_bytes(word);
            cluster
                .read_from_device(chip, core, COUNTER_ADDR, &mut word)
                .expect("frozen sample b");
            let frozen_b = u32::from_le_bytes(word);

            assert_eq!(
                frozen_a, frozen_b,
                "counter must freeze in reset on chip {chip} core {core}"
            );
        }
    }
}
