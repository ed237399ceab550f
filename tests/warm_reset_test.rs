// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Warm reset clears the ARC scratch registers.

use serial_test::serial;

use ttumd::open_cluster;

const RESET_SENTINEL: u32 = 0xDEADBEEF;

#[test]
#[serial]
#[cfg_attr(
    not(all(feature = "test_hardware", any(feature = "test_wormhole", feature = "test_blackhole"))),
    ignore = "Requires real hardware and resets it"
)]
fn warm_reset_clears_scratch() {
    let scratch_addr = {
        let cluster = open_cluster().expect("cluster should open");
        let chip = cluster.chip_ids()[0];
        let local = cluster.get_local_chip(chip).expect("an mmio chip");
        let device = local.tt_device();

        if !device.query_warm_reset_support() {
            println!("Test SKIPPED: kernel driver cannot warm reset this device");
            return;
        }

        let params = ttumd::device::arch::arc_params(device.arch);
        let scratch_addr = params.reset_scratch(2);

        device
            .bar_write32(scratch_addr, RESET_SENTINEL)
            .expect("scratch write");
        assert_eq!(
            device.bar_read32(scratch_addr).expect("scratch read"),
            RESET_SENTINEL
        );

        cluster.trigger_warm_reset(chip).expect("warm reset");
        scratch_addr
        // Cluster handle drops here; the device comes back reinitialized.
    };

    let cluster = open_cluster().expect("cluster should reopen after reset");
    let chip = cluster.chip_ids()[0];
    let device = cluster.get_local_chip(chip).expect("an mmio chip").tt_device();

    assert_ne!(
        device.bar_read32(scratch_addr).expect("scratch read"),
        RESET_SENTINEL,
        "warm reset must clear the scratch sentinel"
    );
}
