// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tunneled access to chips without their own PCIe endpoint.
//!
//! Reads and writes are encoded into routing commands pushed onto an ERISC
//! command queue of a nearby MMIO chip, which forwards them over ethernet.
//! There is no host-side atomic for the queue write pointer, so every entry
//! into this module holds the interprocess `NonMmio` mutex for the whole
//! call; see the lock manager for the crash-recovery story.
//!
//! The firmware contract for one slot, as the host observes it:
//! 1. firmware clears the response flags
//! 2. starts the operation and advances the response wptr
//! 3. completes, writes data into the response slot or buffer
//! 4. sets the response flags
//! So a reader waits for the wptr, then for nonzero flags, then takes data.

use std::sync::atomic::{fence, AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use crate::{
    arch::{self, EthInterfaceParams, HostAddressParams, NocParams},
    coords::XyPair,
    error::PlatformError,
    eth_addr::EthCoord,
    lock_manager::{LockManager, MutexKind, NamedMutex},
    sysmem::SysmemManager,
    tt_device::TTDevice,
};

const DATA_WORD_SIZE: u32 = 4;
const BROADCAST_HEADER_BYTES: u32 = 32;

/// Transfers larger than this want host staging; without it we warn and chunk
/// through the ERISC scratch buffer instead.
const HOST_STAGING_THRESHOLD: u32 = 256 * DATA_WORD_SIZE;

/// One 8-word routing command slot as laid out in ERISC L1.
#[derive(Default, Clone, Copy)]
struct RoutingCmd {
    sys_addr: u64,
    data: u32,
    flags: u32,
    rack: u16,
    src_addr_tag: u32,
}

impl RoutingCmd {
    fn to_words(self) -> [u32; 8] {
        [
            (self.sys_addr & 0xFFFF_FFFF) as u32,
            (self.sys_addr >> 32) as u32,
            self.data,
            self.flags,
            self.rack as u32,
            0, // local_buf_index
            0, // src_resp_q_id / host_mem_txn_id
            self.src_addr_tag,
        ]
    }
}

pub struct RemoteCommunication {
    local_device: Arc<TTDevice>,
    sysmem: Option<Arc<Mutex<SysmemManager>>>,
    target_chip: EthCoord,

    /// Carrier ethernet cores on the MMIO chip, translated coordinates,
    /// paired with the command-queue base each one published.
    carriers: Vec<(XyPair, u32)>,
    active_carrier: Mutex<usize>,

    eth_params: EthInterfaceParams,
    host_params: HostAddressParams,
    noc_params: NocParams,

    non_mmio_mutex: Arc<NamedMutex>,
    flush_needed: AtomicBool,
    use_noc1: bool,
}

impl RemoteCommunication {
    /// Build a tunnel anchored on `local_device`. Returns `None` on
    /// generations whose firmware has no routing queue (blackhole).
    pub fn create(
        local_device: Arc<TTDevice>,
        target_chip: EthCoord,
        carrier_cores: Vec<XyPair>,
        sysmem: Option<Arc<Mutex<SysmemManager>>>,
        use_noc1: bool,
    ) -> Result<Option<Self>, PlatformError> {
        if local_device.arch.is_blackhole() {
            return Ok(None);
        }
        if carrier_cores.is_empty() {
            return Err(PlatformError::TopologyError(
                "remote tunnel needs at least one carrier ethernet core".to_string(),
            ));
        }

        let eth_params = arch::eth_interface_params(local_device.arch);

        // Cap the carrier set; the firmware services eight host queues.
        let mut carriers = Vec::new();
        for core in carrier_cores.into_iter().take(8) {
            let command_q_addr =
                local_device.read32(core, eth_params.command_q_reg_addr as u64)?;
            carriers.push((core, command_q_addr));
        }

        let non_mmio_mutex =
            LockManager::get(MutexKind::NonMmio, local_device.device_index)?;

        let comm = Self {
            eth_params,
            host_params: arch::host_address_params(local_device.arch),
            noc_params: arch::noc_params(local_device.arch),
            local_device,
            sysmem,
            target_chip,
            carriers,
            active_carrier: Mutex::new(0),
            non_mmio_mutex,
            flush_needed: AtomicBool::new(false),
            use_noc1,
        };

        comm.fixup_response_queues()?;

        Ok(Some(comm))
    }

    pub fn target_chip(&self) -> EthCoord {
        self.target_chip
    }

    fn req_base(&self, cmdq: u32) -> u32 {
        cmdq + self.eth_params.request_cmd_queue_base
    }

    fn resp_base(&self, cmdq: u32) -> u32 {
        cmdq + self.eth_params.response_cmd_queue_base
    }

    fn req_wptr_addr(&self, cmdq: u32) -> u32 {
        self.req_base(cmdq) + self.eth_params.cmd_counters_size_bytes
    }

    fn req_rptr_addr(&self, cmdq: u32) -> u32 {
        self.req_wptr_addr(cmdq) + self.eth_params.remote_update_ptr_size_bytes
    }

    fn resp_wptr_addr(&self, cmdq: u32) -> u32 {
        self.resp_base(cmdq) + self.eth_params.cmd_counters_size_bytes
    }

    fn resp_rptr_addr(&self, cmdq: u32) -> u32 {
        self.resp_wptr_addr(cmdq) + self.eth_params.remote_update_ptr_size_bytes
    }

    fn req_slot_addr(&self, cmdq: u32, slot: u32) -> u32 {
        cmdq + self.eth_params.request_routing_cmd_queue_base() + 32 * slot
    }

    fn resp_slot_addr(&self, cmdq: u32, slot: u32) -> u32 {
        cmdq + self.eth_params.response_routing_cmd_queue_base() + 32 * slot
    }

    fn is_cmd_q_full(&self, wptr: u32, rptr: u32) -> bool {
        wptr != rptr && (wptr & self.eth_params.cmd_buf_size_mask) == (rptr & self.eth_params.cmd_buf_size_mask)
    }

    /// A dead process can leave a response queue with an unconsumed entry;
    /// resynchronize the pointers before first use.
    fn fixup_response_queues(&self) -> Result<(), PlatformError> {
        for (core, cmdq) in self.carriers.iter() {
            let wptr = self.local_device.read32(*core, self.resp_wptr_addr(*cmdq) as u64)?;
            let rptr = self.local_device.read32(*core, self.resp_rptr_addr(*cmdq) as u64)?;
            if wptr != rptr {
                tracing::warn!(
                    "Response queue out of sync on carrier ({}, {}): wptr {wptr} rptr {rptr}, resetting",
                    core.x,
                    core.y
                );
                self.local_device
                    .write32(*core, self.resp_rptr_addr(*cmdq) as u64, wptr)?;
            }
        }
        Ok(())
    }

    fn check_deadline(
        start: std::time::Instant,
        timeout: std::time::Duration,
    ) -> Result<(), PlatformError> {
        if start.elapsed() > timeout {
            return Err(PlatformError::Timeout(timeout));
        }
        std::thread::yield_now();
        Ok(())
    }

    fn sysmem_available(&self) -> bool {
        self.sysmem
            .as_ref()
            .map(|s| s.lock().unwrap().num_host_mem_channels() > 0)
            .unwrap_or(false)
    }

    fn noc_flag(&self) -> u32 {
        if self.use_noc1 {
            self.eth_params.cmd_noc_bit
        } else {
            0
        }
    }

    /// Tunneled read of `dest.len()` bytes from `(target_core, core_src)` on
    /// the remote chip.
    pub fn read_non_mmio(
        &self,
        target_core: XyPair,
        core_src: u64,
        dest: &mut [u8],
        timeout: std::time::Duration,
    ) -> Result<(), PlatformError> {
        if dest.is_empty() {
            return Ok(());
        }

        let _lock = self.non_mmio_mutex.lock()?;

        let (carrier, cmdq) = self.carriers[*self.active_carrier.lock().unwrap()];
        let params = self.eth_params;

        let use_host_dram =
            dest.len() as u32 > HOST_STAGING_THRESHOLD && self.sysmem_available();
        if dest.len() as u32 > HOST_STAGING_THRESHOLD && !self.sysmem_available() {
            tracing::warn!("Large transfer without system memory setup. Performance will be degraded.");
        }
        let max_block_size = if use_host_dram {
            self.host_params.eth_routing_block_size as u32
        } else {
            params.max_block_size
        };

        let size_in_bytes = dest.len() as u32;
        let mut req_wptr = self.local_device.read32(carrier, self.req_wptr_addr(cmdq) as u64)?;
        let mut req_rptr = self.local_device.read32(carrier, self.req_rptr_addr(cmdq) as u64)?;
        let mut full = self.is_cmd_q_full(req_wptr, req_rptr);

        let mut resp_wptr = self.local_device.read32(carrier, self.resp_wptr_addr(cmdq) as u64)?;
        let mut resp_rptr = self.local_device.read32(carrier, self.resp_rptr_addr(cmdq) as u64)?;

        let start = std::time::Instant::now();
        let mut offset = 0u32;
        while offset < size_in_bytes {
            while full {
                req_rptr = self.local_device.read32(carrier, self.req_rptr_addr(cmdq) as u64)?;
                full = self.is_cmd_q_full(req_wptr, req_rptr);
                Self::check_deadline(start, timeout)?;
            }

            let req_slot = req_wptr & params.cmd_buf_size_mask;
            // Misaligned addresses fall back to single-word commands.
            let block_size = if (core_src + offset as u64) & 0x1F != 0 {
                DATA_WORD_SIZE
            } else {
                let block = (size_in_bytes - offset).min(max_block_size);
                (block + 3) & !3
            };

            let mut req_flags = if block_size > DATA_WORD_SIZE {
                params.cmd_data_block | params.cmd_rd_req
            } else {
                params.cmd_rd_req
            };
            let mut resp_flags = if block_size > DATA_WORD_SIZE {
                params.cmd_data_block | params.cmd_rd_data
            } else {
                params.cmd_rd_data
            };

            let resp_slot = resp_rptr & params.cmd_buf_size_mask;
            let host_dram_block_addr = (self.host_params.eth_routing_buffers_start
                + (resp_slot * max_block_size) as u64) as u32;
            let host_dram_channel: u16 = 0;

            if use_host_dram && block_size > DATA_WORD_SIZE {
                req_flags |= params.cmd_data_block_dram;
                resp_flags |= params.cmd_data_block_dram;
            }

            let cmd = RoutingCmd {
                sys_addr: arch::get_sys_addr(
                    self.noc_params,
                    self.target_chip.x,
                    self.target_chip.y,
                    target_core.x,
                    target_core.y,
                    core_src + offset as u64,
                ),
                rack: arch::get_sys_rack(params, self.target_chip.rack, self.target_chip.shelf),
                data: block_size,
                flags: req_flags | self.noc_flag(),
                src_addr_tag: if use_host_dram { host_dram_block_addr } else { 0 },
            };

            let words = cmd.to_words();
            let mut bytes = Vec::with_capacity(32);
            for word in words {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
            self.local_device
                .write_to_device(carrier, self.req_slot_addr(cmdq, req_slot) as u64, &bytes)?;
            fence(AtomicOrdering::SeqCst);

            req_wptr = (req_wptr + 1) & params.cmd_buf_ptr_mask;
            self.local_device
                .write32(carrier, self.req_wptr_addr(cmdq) as u64, req_wptr)?;
            fence(AtomicOrdering::SeqCst);

            // Only poll the read pointer again when this push may have
            // filled the queue.
            if self.is_cmd_q_full(req_wptr, req_rptr) {
                req_rptr = self.local_device.read32(carrier, self.req_rptr_addr(cmdq) as u64)?;
                full = self.is_cmd_q_full(req_wptr, req_rptr);
            }

            // Wait for the response entry, then for its flags.
            while resp_rptr == resp_wptr {
                resp_wptr = self.local_device.read32(carrier, self.resp_wptr_addr(cmdq) as u64)?;
                Self::check_deadline(start, timeout)?;
            }
            let mut erisc_resp_flags = 0u32;
            while erisc_resp_flags == 0 {
                erisc_resp_flags = self
                    .local_device
                    .read32(carrier, (self.resp_slot_addr(cmdq, resp_slot) + 12) as u64)?;
                Self::check_deadline(start, timeout)?;
            }

            if erisc_resp_flags & params.cmd_dest_unreachable != 0 {
                return Err(PlatformError::TopologyError(format!(
                    "remote chip {} unreachable over ethernet",
                    self.target_chip
                )));
            }
            if erisc_resp_flags & params.cmd_data_block_unavailable != 0 {
                return Err(PlatformError::UnsupportedOperation(
                    "no data block available on the destination route".to_string(),
                ));
            }

            if erisc_resp_flags == resp_flags {
                fence(AtomicOrdering::SeqCst);
                if block_size == DATA_WORD_SIZE {
                    let word = self
                        .local_device
                        .read32(carrier, (self.resp_slot_addr(cmdq, resp_slot) + 8) as u64)?;
                    let remaining = (size_in_bytes - offset).min(4) as usize;
                    dest[offset as usize..offset as usize + remaining]
                        .copy_from_slice(&word.to_le_bytes()[..remaining]);
                } else {
                    let copy_len = block_size.min(size_in_bytes - offset) as usize;
                    let mut block = vec![0u8; block_size as usize];
                    if use_host_dram {
                        self.sysmem.as_ref().unwrap().lock().unwrap().read_from_sysmem(
                            host_dram_channel,
                            &mut block,
                            host_dram_block_addr as u64,
                        )?;
                    } else {
                        let buf_address = params.eth_routing_data_buffer_addr
                            + resp_slot * params.max_block_size;
                        self.local_device.read_from_device(
                            carrier,
                            buf_address as u64,
                            &mut block,
                        )?;
                    }
                    dest[offset as usize..offset as usize + copy_len]
                        .copy_from_slice(&block[..copy_len]);
                }
            }

            resp_rptr = (resp_rptr + 1) & params.cmd_buf_ptr_mask;
            self.local_device
                .write32(carrier, self.resp_rptr_addr(cmdq) as u64, resp_rptr)?;
            fence(AtomicOrdering::SeqCst);

            offset += block_size;
        }

        Ok(())
    }

    /// Tunneled write; `broadcast_header` selects the broadcast path, which
    /// requires host staging memory.
    pub fn write_to_non_mmio(
        &self,
        target_core: XyPair,
        core_dest: u64,
        src: &[u8],
        broadcast_header: Option<&[u32; 8]>,
        timeout: std::time::Duration,
    ) -> Result<(), PlatformError> {
        if src.is_empty() {
            return Ok(());
        }

        let _lock = self.non_mmio_mutex.lock()?;
        self.flush_needed.store(true, AtomicOrdering::SeqCst);

        let params = self.eth_params;
        let broadcast = broadcast_header.is_some();
        let size_in_bytes = src.len() as u32;

        let system_mem_available = self.sysmem_available();
        let use_host_dram =
            (broadcast || size_in_bytes > HOST_STAGING_THRESHOLD) && system_mem_available;
        if size_in_bytes > HOST_STAGING_THRESHOLD && !system_mem_available {
            tracing::warn!("Large transfer without system memory setup. Performance will be degraded.");
        }
        if broadcast && !system_mem_available {
            return Err(PlatformError::UnsupportedOperation(
                "broadcasts are not available without system memory".to_string(),
            ));
        }

        let max_block_size = if use_host_dram {
            self.host_params.eth_routing_block_size as u32
        } else {
            params.max_block_size
        };

        let mut carrier_idx = *self.active_carrier.lock().unwrap();
        let (mut carrier, mut cmdq) = self.carriers[carrier_idx];

        let mut req_wptr = self.local_device.read32(carrier, self.req_wptr_addr(cmdq) as u64)?;
        let mut req_rptr = self.local_device.read32(carrier, self.req_rptr_addr(cmdq) as u64)?;
        let mut full = self.is_cmd_q_full(req_wptr, req_rptr);

        let start = std::time::Instant::now();
        let mut offset = 0u32;
        while offset < size_in_bytes {
            while full {
                req_rptr = self.local_device.read32(carrier, self.req_rptr_addr(cmdq) as u64)?;
                full = self.is_cmd_q_full(req_wptr, req_rptr);
                Self::check_deadline(start, timeout)?;
            }

            let req_slot = req_wptr & params.cmd_buf_size_mask;
            let broadcast_adjust = if broadcast { BROADCAST_HEADER_BYTES } else { 0 };
            let block_size = if (core_dest + offset as u64) & 0x1F != 0 {
                DATA_WORD_SIZE
            } else {
                let block = (size_in_bytes - offset).min(max_block_size - broadcast_adjust);
                (block + 3) & !3
            };
            let transfer_size = block_size.min(size_in_bytes - offset);

            let mut req_flags = if broadcast || block_size > DATA_WORD_SIZE {
                params.cmd_data_block | params.cmd_wr_req
            } else {
                params.cmd_wr_req
            };
            if broadcast {
                req_flags |= params.cmd_broadcast;
            }

            let host_dram_block_addr = (self.host_params.eth_routing_buffers_start
                + ((carrier_idx as u32 * params.cmd_buf_size + req_slot) * max_block_size) as u64)
                as u32;
            let host_dram_channel: u16 = 0;

            let mut cmd = RoutingCmd::default();

            if req_flags & params.cmd_data_block != 0 {
                // Stage the payload before publishing the command.
                if use_host_dram {
                    req_flags |= params.cmd_data_block_dram;

                    let mut sysmem = self.sysmem.as_ref().unwrap().lock().unwrap();
                    if let Some(header) = broadcast_header {
                        let mut header_bytes = Vec::with_capacity(32);
                        for word in header {
                            header_bytes.extend_from_slice(&word.to_le_bytes());
                        }
                        sysmem.write_to_sysmem(
                            host_dram_channel,
                            &header_bytes,
                            host_dram_block_addr as u64,
                        )?;
                    }
                    sysmem.write_to_sysmem(
                        host_dram_channel,
                        &src[offset as usize..(offset + transfer_size) as usize],
                        (host_dram_block_addr + broadcast_adjust) as u64,
                    )?;
                } else {
                    let buf_address =
                        params.eth_routing_data_buffer_addr + req_slot * params.max_block_size;
                    self.local_device.write_to_device(
                        carrier,
                        buf_address as u64,
                        &src[offset as usize..(offset + transfer_size) as usize],
                    )?;
                }
                fence(AtomicOrdering::SeqCst);

                cmd.data = block_size + broadcast_adjust;
                cmd.src_addr_tag = host_dram_block_addr;
            } else if size_in_bytes - offset < DATA_WORD_SIZE {
                // Assemble a padded word from the unaligned tail.
                let mut word = [0u8; 4];
                let remaining = (size_in_bytes - offset) as usize;
                word[..remaining].copy_from_slice(&src[offset as usize..]);
                cmd.data = u32::from_le_bytes(word);
            } else {
                cmd.data = u32::from_le_bytes(
                    src[offset as usize..offset as usize + 4].try_into().unwrap(),
                );
            }

            if broadcast {
                // Broadcast routes by header; sys_addr carries only the
                // endpoint-local offset.
                cmd.sys_addr = core_dest + offset as u64;
            } else {
                cmd.sys_addr = arch::get_sys_addr(
                    self.noc_params,
                    self.target_chip.x,
                    self.target_chip.y,
                    target_core.x,
                    target_core.y,
                    core_dest + offset as u64,
                );
                cmd.rack =
                    arch::get_sys_rack(params, self.target_chip.rack, self.target_chip.shelf);
            }
            cmd.flags = req_flags | self.noc_flag();

            let words = cmd.to_words();
            let mut bytes = Vec::with_capacity(32);
            for word in words {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
            self.local_device
                .write_to_device(carrier, self.req_slot_addr(cmdq, req_slot) as u64, &bytes)?;
            fence(AtomicOrdering::SeqCst);

            req_wptr = (req_wptr + 1) & params.cmd_buf_ptr_mask;
            self.local_device
                .write32(carrier, self.req_wptr_addr(cmdq) as u64, req_wptr)?;
            fence(AtomicOrdering::SeqCst);

            offset += transfer_size;

            // When this push filled the queue, rotate to the next carrier
            // instead of stalling on this one.
            if self.is_cmd_q_full(req_wptr, req_rptr) {
                carrier_idx = (carrier_idx + 1) % self.carriers.len();
                *self.active_carrier.lock().unwrap() = carrier_idx;
                (carrier, cmdq) = self.carriers[carrier_idx];

                req_wptr = self.local_device.read32(carrier, self.req_wptr_addr(cmdq) as u64)?;
                req_rptr = self.local_device.read32(carrier, self.req_rptr_addr(cmdq) as u64)?;
                full = self.is_cmd_q_full(req_wptr, req_rptr);
            }

            Self::check_deadline(start, timeout)?;
        }

        Ok(())
    }

    /// Block until every carrier queue is drained and every posted write has
    /// been acknowledged.
    pub fn wait_for_non_mmio_flush(
        &self,
        timeout: std::time::Duration,
    ) -> Result<(), PlatformError> {
        if !self.flush_needed.load(AtomicOrdering::SeqCst) {
            return Ok(());
        }

        let _lock = self.non_mmio_mutex.lock()?;
        let start = std::time::Instant::now();

        // All request queues empty.
        for (carrier, cmdq) in self.carriers.iter() {
            loop {
                let wptr = self.local_device.read32(*carrier, self.req_wptr_addr(*cmdq) as u64)?;
                let rptr = self.local_device.read32(*carrier, self.req_rptr_addr(*cmdq) as u64)?;
                if wptr == rptr {
                    break;
                }
                Self::check_deadline(start, timeout)?;
            }
        }

        // All posted transactions acknowledged.
        for (carrier, cmdq) in self.carriers.iter() {
            loop {
                let mut counters = [0u8; 8];
                self.local_device
                    .read_from_device(*carrier, self.req_base(*cmdq) as u64, &mut counters)?;
                let posted = u32::from_le_bytes(counters[..4].try_into().unwrap());
                let acked = u32::from_le_bytes(counters[4..].try_into().unwrap());
                if posted == acked {
                    break;
                }
                Self::check_deadline(start, timeout)?;
            }
        }

        self.flush_needed.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_cmd_layout_matches_the_wire_format() {
        let cmd = RoutingCmd {
            sys_addr: 0x1234_5678_9abc_def0,
            data: 0x400,
            flags: 0x45,
            rack: 0x0102,
            src_addr_tag: 0xdead_0000,
        };

        let words = cmd.to_words();
        assert_eq!(words[0], 0x9abc_def0);
        assert_eq!(words[1], 0x1234_5678);
        assert_eq!(words[2], 0x400);
        assert_eq!(words[3], 0x45);
        assert_eq!(words[4], 0x0102);
        assert_eq!(words[7], 0xdead_0000);
    }

    #[test]
    fn queue_full_uses_the_wraparound_pointer_space() {
        // Pointers live in a 2*size modular space; full means equal slot
        // with different wrap bits.
        let params = arch::eth_interface_params(umd_core::Arch::WormholeB0);
        let is_full = |wptr: u32, rptr: u32| {
            wptr != rptr && (wptr & params.cmd_buf_size_mask) == (rptr & params.cmd_buf_size_mask)
        };

        assert!(!is_full(0, 0));
        assert!(!is_full(3, 0));
        assert!(is_full(4, 0));
        assert!(!is_full(4, 1));
        assert!(is_full(7, 3));
        assert!(!is_full(7, 7));
    }
}
