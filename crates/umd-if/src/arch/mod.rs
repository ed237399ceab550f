// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-architecture constant tables.
//!
//! Everything the driver needs to know about a chip generation that is not
//! discoverable at runtime lives here, dispatched by a plain enum match.

use umd_core::Arch;

use crate::coords::XyPair;

pub mod blackhole;
pub mod wormhole;

/// Constants of the ERISC routing firmware command queue.
///
/// All queue offsets are relative to the command-queue block whose address
/// the firmware publishes in the ethernet core's L1.
#[derive(Clone, Copy, Debug)]
pub struct EthInterfaceParams {
    pub eth_rack_coord_width: u32,

    pub cmd_buf_size: u32,
    pub cmd_buf_size_mask: u32,
    pub cmd_buf_ptr_mask: u32,

    /// Largest block payload when staging through the ERISC scratch buffer.
    pub max_block_size: u32,

    pub queue_size: u32,
    pub cmd_counters_size_bytes: u32,
    pub remote_update_ptr_size_bytes: u32,

    pub request_cmd_queue_base: u32,
    pub response_cmd_queue_base: u32,

    /// Ethernet-core L1 address of the scratch data buffer used for block
    /// transfers when no host staging memory is available.
    pub eth_routing_data_buffer_addr: u32,

    /// Ethernet-core L1 register holding the command-queue block address.
    pub command_q_reg_addr: u32,

    pub cmd_wr_req: u32,
    pub cmd_wr_ack: u32,
    pub cmd_rd_req: u32,
    pub cmd_rd_data: u32,
    pub cmd_data_block_dram: u32,
    pub cmd_data_block: u32,
    pub cmd_broadcast: u32,
    pub cmd_noc_bit: u32,
    pub cmd_data_block_unavailable: u32,
    pub cmd_dest_unreachable: u32,
}

impl EthInterfaceParams {
    /// Offset of the command slots within a request or response queue.
    pub fn routing_cmd_offset(&self) -> u32 {
        self.cmd_counters_size_bytes + 2 * self.remote_update_ptr_size_bytes
    }

    pub fn request_routing_cmd_queue_base(&self) -> u32 {
        self.request_cmd_queue_base + self.routing_cmd_offset()
    }

    pub fn response_routing_cmd_queue_base(&self) -> u32 {
        self.response_cmd_queue_base + self.routing_cmd_offset()
    }
}

/// Layout of the ERISC staging region inside hugepage channel 0.
#[derive(Clone, Copy, Debug)]
pub struct HostAddressParams {
    pub eth_routing_block_size: u64,
    pub eth_routing_buffers_start: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct NocParams {
    pub noc_addr_local_bits: u32,
    pub noc_addr_node_id_bits: u32,
}

/// BAR-visible addresses of the ARC management core.
#[derive(Clone, Copy, Debug)]
pub struct ArcParams {
    pub apb_base: u32,
    pub apb_size: u32,
    pub csm_base: u32,
    pub csm_size: u32,

    pub reset_scratch_base: u32,
    pub arc_misc_cntl: u32,

    /// Blackhole only: scratch RAM word carrying the message-queue control
    /// block address. Zero on architectures using the scratch protocol.
    pub queue_control_scratch: u32,
}

impl ArcParams {
    pub fn reset_scratch(&self, index: u32) -> u32 {
        self.reset_scratch_base + index * 4
    }
}

pub fn grid_size(arch: Arch) -> XyPair {
    match arch {
        Arch::Blackhole => XyPair::new(blackhole::GRID_SIZE_X, blackhole::GRID_SIZE_Y),
        _ => XyPair::new(wormhole::GRID_SIZE_X, wormhole::GRID_SIZE_Y),
    }
}

pub fn tensix_x_locations(arch: Arch) -> &'static [u8] {
    match arch {
        Arch::Blackhole => &blackhole::TENSIX_X_LOCATIONS,
        _ => &wormhole::TENSIX_X_LOCATIONS,
    }
}

pub fn tensix_y_locations(arch: Arch) -> &'static [u8] {
    match arch {
        Arch::Blackhole => &blackhole::TENSIX_Y_LOCATIONS,
        _ => &wormhole::TENSIX_Y_LOCATIONS,
    }
}

/// DRAM endpoints, outer index is the channel.
pub fn dram_locations(arch: Arch) -> &'static [[XyPair; 3]] {
    match arch {
        Arch::Blackhole => &blackhole::DRAM_LOCATIONS,
        _ => &wormhole::DRAM_LOCATIONS,
    }
}

/// Ethernet cores in channel order.
pub fn eth_locations(arch: Arch) -> &'static [XyPair] {
    match arch {
        Arch::Blackhole => &blackhole::ETH_LOCATIONS,
        _ => &wormhole::ETH_LOCATIONS,
    }
}

pub fn arc_location(arch: Arch) -> XyPair {
    match arch {
        Arch::Blackhole => blackhole::ARC_LOCATION,
        _ => wormhole::ARC_LOCATION,
    }
}

/// All wired PCIe endpoints. Board type decides which one is in use.
pub fn pcie_locations(arch: Arch) -> &'static [XyPair] {
    match arch {
        Arch::Blackhole => &blackhole::PCIE_LOCATIONS,
        _ => &wormhole::PCIE_LOCATIONS,
    }
}

pub fn l2cpu_locations(arch: Arch) -> &'static [XyPair] {
    match arch {
        Arch::Blackhole => &blackhole::L2CPU_LOCATIONS,
        _ => &[],
    }
}

pub fn security_locations(arch: Arch) -> &'static [XyPair] {
    match arch {
        Arch::Blackhole => &blackhole::SECURITY_LOCATIONS,
        _ => &[],
    }
}

pub fn router_only_locations(arch: Arch) -> &'static [XyPair] {
    match arch {
        Arch::Blackhole => &blackhole::ROUTER_ONLY_LOCATIONS,
        _ => &wormhole::ROUTER_ONLY_LOCATIONS,
    }
}

/// Order in which the ARC firmware reports tensix harvesting bits.
/// Entry `i` is the NOC0 row (Wormhole) or column (Blackhole) that bit `i`
/// of the raw readout refers to.
pub fn harvesting_noc_locations(arch: Arch) -> &'static [u8] {
    match arch {
        Arch::Blackhole => &blackhole::HARVESTING_NOC_LOCATIONS,
        _ => &wormhole::HARVESTING_NOC_LOCATIONS,
    }
}

pub fn noc0_x_to_noc1_x(arch: Arch) -> Vec<u8> {
    let size = grid_size(arch).x;
    (0..size).map(|x| size - 1 - x).collect()
}

pub fn noc0_y_to_noc1_y(arch: Arch) -> Vec<u8> {
    let size = grid_size(arch).y;
    (0..size).map(|y| size - 1 - y).collect()
}

pub fn worker_l1_size(arch: Arch) -> u64 {
    match arch {
        Arch::Blackhole => blackhole::WORKER_L1_SIZE,
        _ => wormhole::WORKER_L1_SIZE,
    }
}

pub fn eth_l1_size(arch: Arch) -> u64 {
    match arch {
        Arch::Blackhole => blackhole::ETH_L1_SIZE,
        _ => wormhole::ETH_L1_SIZE,
    }
}

pub fn dram_bank_size(arch: Arch) -> u64 {
    match arch {
        Arch::Blackhole => blackhole::DRAM_BANK_SIZE,
        _ => wormhole::DRAM_BANK_SIZE,
    }
}

pub fn tensix_soft_reset_addr(_arch: Arch) -> u64 {
    // Same RISC reset register block on both generations.
    0xFFB1_21B0
}

/// Well-known L1 scratch address used by host-side memory barriers.
pub fn l1_barrier_base(_arch: Arch) -> u64 {
    0x1_2FF4
}

pub fn eth_l1_barrier_base(_arch: Arch) -> u64 {
    0x3_9FF4
}

pub fn dram_barrier_base(_arch: Arch) -> u64 {
    0x20
}

pub fn arc_params(arch: Arch) -> ArcParams {
    match arch {
        Arch::Blackhole => blackhole::ARC_PARAMS,
        _ => wormhole::ARC_PARAMS,
    }
}

pub fn eth_interface_params(arch: Arch) -> EthInterfaceParams {
    match arch {
        Arch::Blackhole => blackhole::ETH_INTERFACE_PARAMS,
        _ => wormhole::ETH_INTERFACE_PARAMS,
    }
}

pub fn host_address_params(arch: Arch) -> HostAddressParams {
    match arch {
        Arch::Blackhole => blackhole::HOST_ADDRESS_PARAMS,
        _ => wormhole::HOST_ADDRESS_PARAMS,
    }
}

pub fn noc_params(_arch: Arch) -> NocParams {
    // Common across both generations.
    NocParams {
        noc_addr_local_bits: 36,
        noc_addr_node_id_bits: 6,
    }
}

/// TLB aperture sizes a window allocation may request.
pub fn tlb_window_sizes(arch: Arch) -> &'static [u64] {
    match arch {
        Arch::Blackhole => &[1 << 21, 1 << 32],
        _ => &[1 << 20, 1 << 21, 1 << 24],
    }
}

/// Index of the window reserved as the per-device cached window.
pub fn cached_tlb_index(arch: Arch) -> u32 {
    match arch {
        Arch::Blackhole => 190,
        // Last 16MB window.
        _ => 184,
    }
}

pub fn num_eth_channels(arch: Arch) -> usize {
    eth_locations(arch).len()
}

pub fn num_dram_channels(arch: Arch) -> usize {
    dram_locations(arch).len()
}

/// Pack a chip-local NoC access into the 64-bit system address the ERISC
/// routing firmware understands.
pub fn get_sys_addr(
    noc_params: NocParams,
    chip_x: u8,
    chip_y: u8,
    noc_x: u8,
    noc_y: u8,
    offset: u64,
) -> u64 {
    let id_bits = noc_params.noc_addr_node_id_bits;

    let mut result = chip_y as u64;
    result = (result << id_bits) | chip_x as u64;
    result = (result << id_bits) | noc_y as u64;
    result = (result << id_bits) | noc_x as u64;
    result = (result << noc_params.noc_addr_local_bits) | offset;
    result
}

/// Pack (rack, shelf) into the 16-bit rack field of a routing command.
pub fn get_sys_rack(eth_interface_params: EthInterfaceParams, rack: u8, shelf: u8) -> u16 {
    ((shelf as u16) << eth_interface_params.eth_rack_coord_width) | rack as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_addr_packs_fields_in_order() {
        let params = noc_params(Arch::WormholeB0);
        let addr = get_sys_addr(params, 1, 2, 3, 4, 0x1000);

        assert_eq!(addr & ((1 << 36) - 1), 0x1000);
        assert_eq!((addr >> 36) & 0x3F, 3); // noc_x
        assert_eq!((addr >> 42) & 0x3F, 4); // noc_y
        assert_eq!((addr >> 48) & 0x3F, 1); // chip_x
        assert_eq!((addr >> 54) & 0x3F, 2); // chip_y
    }

    #[test]
    fn sys_rack_packs_rack_and_shelf() {
        let params = eth_interface_params(Arch::WormholeB0);
        assert_eq!(get_sys_rack(params, 2, 3), (3 << 8) | 2);
    }

    #[test]
    fn noc1_maps_are_involutions() {
        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            let xs = noc0_x_to_noc1_x(arch);
            let ys = noc0_y_to_noc1_y(arch);
            for (i, &x) in xs.iter().enumerate() {
                assert_eq!(xs[x as usize] as usize, i);
            }
            for (i, &y) in ys.iter().enumerate() {
                assert_eq!(ys[y as usize] as usize, i);
            }
        }
    }

    #[test]
    fn harvesting_locations_cover_the_tensix_axis() {
        let mut wh: Vec<u8> = harvesting_noc_locations(Arch::WormholeB0).to_vec();
        wh.sort();
        assert_eq!(wh, tensix_y_locations(Arch::WormholeB0));

        let mut bh: Vec<u8> = harvesting_noc_locations(Arch::Blackhole).to_vec();
        bh.sort();
        assert_eq!(bh, tensix_x_locations(Arch::Blackhole));
    }
}
