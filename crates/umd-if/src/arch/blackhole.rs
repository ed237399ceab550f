// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::coords::XyPair;

use super::{ArcParams, EthInterfaceParams, HostAddressParams};

pub const GRID_SIZE_X: u8 = 17;
pub const GRID_SIZE_Y: u8 = 12;

pub const TENSIX_X_LOCATIONS: [u8; 14] = [1, 2, 3, 4, 5, 6, 7, 10, 11, 12, 13, 14, 15, 16];
pub const TENSIX_Y_LOCATIONS: [u8; 10] = [2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

// Eight banks on columns 0 and 9, three NoC endpoints each.
pub const DRAM_LOCATIONS: [[XyPair; 3]; 8] = [
    [XyPair::new(0, 0), XyPair::new(0, 1), XyPair::new(0, 11)],
    [XyPair::new(0, 2), XyPair::new(0, 10), XyPair::new(0, 3)],
    [XyPair::new(0, 9), XyPair::new(0, 4), XyPair::new(0, 8)],
    [XyPair::new(0, 5), XyPair::new(0, 7), XyPair::new(0, 6)],
    [XyPair::new(9, 0), XyPair::new(9, 1), XyPair::new(9, 11)],
    [XyPair::new(9, 2), XyPair::new(9, 10), XyPair::new(9, 3)],
    [XyPair::new(9, 9), XyPair::new(9, 4), XyPair::new(9, 8)],
    [XyPair::new(9, 5), XyPair::new(9, 7), XyPair::new(9, 6)],
];

// Fourteen channels on row 1, paired outside-in.
pub const ETH_LOCATIONS: [XyPair; 14] = [
    XyPair::new(1, 1),
    XyPair::new(16, 1),
    XyPair::new(2, 1),
    XyPair::new(15, 1),
    XyPair::new(3, 1),
    XyPair::new(14, 1),
    XyPair::new(4, 1),
    XyPair::new(13, 1),
    XyPair::new(5, 1),
    XyPair::new(12, 1),
    XyPair::new(6, 1),
    XyPair::new(11, 1),
    XyPair::new(7, 1),
    XyPair::new(10, 1),
];

pub const ARC_LOCATION: XyPair = XyPair::new(8, 0);

// Both wired endpoints; the board type selects the active one and the other
// degrades to a router-only core.
pub const PCIE_LOCATIONS: [XyPair; 2] = [XyPair::new(2, 0), XyPair::new(11, 0)];

pub const L2CPU_LOCATIONS: [XyPair; 4] = [
    XyPair::new(8, 2),
    XyPair::new(8, 3),
    XyPair::new(8, 9),
    XyPair::new(8, 10),
];

pub const SECURITY_LOCATIONS: [XyPair; 1] = [XyPair::new(8, 11)];

pub const ROUTER_ONLY_LOCATIONS: [XyPair; 12] = [
    XyPair::new(1, 0),
    XyPair::new(3, 0),
    XyPair::new(4, 0),
    XyPair::new(5, 0),
    XyPair::new(6, 0),
    XyPair::new(7, 0),
    XyPair::new(10, 0),
    XyPair::new(12, 0),
    XyPair::new(13, 0),
    XyPair::new(14, 0),
    XyPair::new(15, 0),
    XyPair::new(16, 0),
];

// ARC reports tensix harvesting per physical fuse slot; slot i maps to this
// NOC0 column.
pub const HARVESTING_NOC_LOCATIONS: [u8; 14] = [16, 1, 15, 2, 14, 3, 13, 4, 12, 5, 11, 6, 10, 7];

pub const WORKER_L1_SIZE: u64 = 1536 * 1024;
pub const ETH_L1_SIZE: u64 = 256 * 1024;
pub const DRAM_BANK_SIZE: u64 = 4 * 1024 * 1024 * 1024;

pub const ARC_PARAMS: ArcParams = ArcParams {
    apb_base: 0x1FF3_0000,
    apb_size: 0x1_0000,
    csm_base: 0x1FE8_0000,
    csm_size: 0x8_0000,

    reset_scratch_base: 0x1FF3_0060,
    arc_misc_cntl: 0x1FF3_0100,

    // SCRATCH_RAM[11] points at the message-queue control block.
    queue_control_scratch: 0x1FF3_0400 + 11 * 4,
};

// Remote tunneling is not supported on this generation; the queue layout is
// still published so discovery can read link state through it.
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
