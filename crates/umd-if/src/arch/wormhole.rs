// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::coords::XyPair;

use super::{ArcParams, EthInterfaceParams, HostAddressParams};

pub const GRID_SIZE_X: u8 = 10;
pub const GRID_SIZE_Y: u8 = 12;

pub const TENSIX_X_LOCATIONS: [u8; 8] = [1, 2, 3, 4, 6, 7, 8, 9];
pub const TENSIX_Y_LOCATIONS: [u8; 10] = [1, 2, 3, 4, 5, 7, 8, 9, 10, 11];

// Six banks, three NoC endpoints each.
pub const DRAM_LOCATIONS: [[XyPair; 3]; 6] = [
    [XyPair::new(0, 0), XyPair::new(0, 1), XyPair::new(0, 11)],
    [XyPair::new(0, 5), XyPair::new(0, 6), XyPair::new(0, 7)],
    [XyPair::new(5, 0), XyPair::new(5, 1), XyPair::new(5, 11)],
    [XyPair::new(5, 2), XyPair::new(5, 9), XyPair::new(5, 10)],
    [XyPair::new(5, 3), XyPair::new(5, 4), XyPair::new(5, 8)],
    [XyPair::new(5, 5), XyPair::new(5, 6), XyPair::new(5, 7)],
];

// Channel order is the firmware's, interleaved across the two rows.
pub const ETH_LOCATIONS: [XyPair; 16] = [
    XyPair::new(9, 0),
    XyPair::new(1, 0),
    XyPair::new(8, 0),
    XyPair::new(2, 0),
    XyPair::new(7, 0),
    XyPair::new(3, 0),
    XyPair::new(6, 0),
    XyPair::new(4, 0),
    XyPair::new(9, 6),
    XyPair::new(1, 6),
    XyPair::new(8, 6),
    XyPair::new(2, 6),
    XyPair::new(7, 6),
    XyPair::new(3, 6),
    XyPair::new(6, 6),
    XyPair::new(4, 6),
];

pub const ARC_LOCATION: XyPair = XyPair::new(0, 10);
pub const PCIE_LOCATIONS: [XyPair; 1] = [XyPair::new(0, 3)];

pub const ROUTER_ONLY_LOCATIONS: [XyPair; 4] = [
    XyPair::new(0, 2),
    XyPair::new(0, 4),
    XyPair::new(0, 8),
    XyPair::new(0, 9),
];

// ARC reports tensix harvesting per physical fuse slot; slot i maps to this
// NOC0 row.
pub const HARVESTING_NOC_LOCATIONS: [u8; 10] = [11, 1, 10, 2, 9, 3, 8, 4, 7, 5];

pub const WORKER_L1_SIZE: u64 = 1464 * 1024;
pub const ETH_L1_SIZE: u64 = 256 * 1024;
pub const DRAM_BANK_SIZE: u64 = 2 * 1024 * 1024 * 1024;

pub const ARC_PARAMS: ArcParams = ArcParams {
    apb_base: 0x1FF3_0000,
    apb_size: 0x1_0000,
    csm_base: 0x1FE8_0000,
    csm_size: 0x8_0000,

    reset_scratch_base: 0x1FF3_0060,
    arc_misc_cntl: 0x1FF3_0100,

    queue_control_scratch: 0,
};

pub const ETH_INTERFACE_PARAMS: EthInterfaceParams = EthInterfaceParams {
    eth_rack_coord_width: 8,

    cmd_buf_size: 4,
    cmd_buf_size_mask: 0x3,
    cmd_buf_ptr_mask: 0x7,

    max_block_size: 1024,

    queue_size: 192,
    cmd_counters_size_bytes: 32,
    remote_update_ptr_size_bytes: 16,

    request_cmd_queue_base: 0x80,
    response_cmd_queue_base: 0x80 + 2 * 192,

    eth_routing_data_buffer_addr: 0x1_2000,

    command_q_reg_addr: 0x170,

    cmd_wr_req: 0x1,
    cmd_wr_ack: 0x2,
    cmd_rd_req: 0x4,
    cmd_rd_data: 0x8,
    cmd_data_block_dram: 0x1 << 4,
    cmd_data_block: 0x1 << 6,
    cmd_broadcast: 0x1 << 7,
    cmd_noc_bit: 0x1 << 9,
    cmd_data_block_unavailable: 0x1 << 30,
    cmd_dest_unreachable: 0x1 << 31,
};

pub const HOST_ADDRESS_PARAMS: HostAddressParams = HostAddressParams {
    eth_routing_block_size: 0x1000,
    eth_routing_buffers_start: 0x0,
};
