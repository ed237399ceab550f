// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use crate::{
    arc::{ArcMsg, PowerState},
    arch,
    coords::{CoordSystem, CoreCoord, CoreType, XyPair},
    error::PlatformError,
    eth_addr::EthCoord,
    lock_manager::{LockManager, MutexKind, NamedMutex},
    remote::RemoteCommunication,
    soc_descriptor::SocDescriptor,
    sysmem::SysmemManager,
    tensix,
    tt_device::TTDevice,
};

const MEMBAR_SENTINEL: u32 = 0xc0de_beef;
const MEMBAR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// A chip the host reaches directly through its own PCIe endpoint.
pub struct LocalChip {
    device: Arc<TTDevice>,
    soc_descriptor: SocDescriptor,
    sysmem: Option<Arc<Mutex<SysmemManager>>>,
    membar_mutex: Arc<NamedMutex>,
    eth_coord: EthCoord,
}

impl LocalChip {
    pub fn new(
        device: Arc<TTDevice>,
        soc_descriptor: SocDescriptor,
        eth_coord: EthCoord,
        num_host_mem_channels: u32,
    ) -> Result<Self, PlatformError> {
        let sysmem = if num_host_mem_channels > 0 {
            Some(Arc::new(Mutex::new(SysmemManager::new(
                &device.pci_device(),
                num_host_mem_channels,
            )?)))
        } else {
            None
        };

        let membar_mutex = LockManager::get(MutexKind::MemBarrier, device.device_index)?;

        Ok(Self {
            device,
            soc_descriptor,
            sysmem,
            membar_mutex,
            eth_coord,
        })
    }

    pub fn soc_descriptor(&self) -> &SocDescriptor {
        &self.soc_descriptor
    }

    pub fn tt_device(&self) -> &Arc<TTDevice> {
        &self.device
    }

    pub fn eth_coord(&self) -> EthCoord {
        self.eth_coord
    }

    pub fn sysmem(&self) -> Option<Arc<Mutex<SysmemManager>>> {
        self.sysmem.clone()
    }

    fn translated(&self, core: CoreCoord) -> Result<XyPair, PlatformError> {
        Ok(self
            .soc_descriptor
            .translate(core, CoordSystem::Translated)?
            .xy())
    }

    pub fn read_from_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        let core = self.translated(core)?;
        self.device.read_from_device(core, addr, data)
    }

    pub fn write_to_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        let core = self.translated(core)?;
        self.device.write_to_device(core, addr, data)
    }

    pub fn dma_read_from_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        let core = self.translated(core)?;
        self.device.dma_read_from_device(core, addr, data)
    }

    pub fn dma_write_to_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        let core = self.translated(core)?;
        self.device.dma_write_to_device(core, addr, data)
    }

    pub fn write_to_sysmem(
        &self,
        channel: u16,
        data: &[u8],
        offset: u64,
    ) -> Result<(), PlatformError> {
        match &self.sysmem {
            Some(sysmem) => sysmem.lock().unwrap().write_to_sysmem(channel, data, offset),
            None => Err(PlatformError::UnsupportedOperation(
                "chip was opened without sysmem channels".to_string(),
            )),
        }
    }

    pub fn read_from_sysmem(
        &self,
        channel: u16,
        data: &mut [u8],
        offset: u64,
    ) -> Result<(), PlatformError> {
        match &self.sysmem {
            Some(sysmem) => sysmem.lock().unwrap().read_from_sysmem(channel, data, offset),
            None => Err(PlatformError::UnsupportedOperation(
                "chip was opened without sysmem channels".to_string(),
            )),
        }
    }

    /// Sentinel write + readback against every target core's L1. Returning
    /// means every prior write to those cores has landed.
    pub fn l1_membar(&self, cores: &[CoreCoord]) -> Result<(), PlatformError> {
        let _guard = self.membar_mutex.lock()?;

        let barrier_addr = arch::l1_barrier_base(self.device.arch);
        let targets: Vec<XyPair> = if cores.is_empty() {
            self.soc_descriptor
                .get_cores(CoreType::Tensix, CoordSystem::Translated)
                .into_iter()
                .map(|c| c.xy())
                .collect()
        } else {
            cores
                .iter()
                .map(|c| self.translated(*c))
                .collect::<Result<_, _>>()?
        };

        for core in targets.iter() {
            self.device.write32(*core, barrier_addr, MEMBAR_SENTINEL)?;
        }
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);

        let start = std::time::Instant::now();
        for core in targets.iter() {
            loop {
                if self.device.read32(*core, barrier_addr)? == MEMBAR_SENTINEL {
                    break;
                }
                if start.elapsed() > MEMBAR_TIMEOUT {
                    return Err(PlatformError::Timeout(MEMBAR_TIMEOUT));
                }
                std::thread::yield_now();
            }
        }

        Ok(())
    }

    /// The same barrier against a DRAM-bank address per channel.
    pub fn dram_membar(&self, channels: &[u32]) -> Result<(), PlatformError> {
        let _guard = self.membar_mutex.lock()?;

        let barrier_addr = arch::dram_barrier_base(self.device.arch);
        let dram = self.soc_descriptor.get_dram_cores();

        let all_channels: Vec<u32> = if channels.is_empty() {
            (0..dram.len() as u32).collect()
        } else {
            channels.to_vec()
        };

        let mut targets = Vec::new();
        for channel in all_channels {
            let cores = dram.get(channel as usize).ok_or(PlatformError::InvalidAddress {
                addr: channel as u64,
                reason: format!("chip has {} dram channels", dram.len()),
            })?;
            targets.push(self.translated(cores[0])?);
        }

        for core in targets.iter() {
            self.device.write32(*core, barrier_addr, MEMBAR_SENTINEL)?;
        }
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);

        let start = std::time::Instant::now();
        for core in targets.iter() {
            loop {
                if self.device.read32(*core, barrier_addr)? == MEMBAR_SENTINEL {
                    break;
                }
                if start.elapsed() > MEMBAR_TIMEOUT {
                    return Err(PlatformError::Timeout(MEMBAR_TIMEOUT));
                }
                std::thread::yield_now();
            }
        }

        Ok(())
    }

    pub fn deassert_risc_resets(&self, staggered_start: bool) -> Result<(), PlatformError> {
        for core in self
            .soc_descriptor
            .get_cores(CoreType::Tensix, CoordSystem::Translated)
        {
            tensix::deassert_risc_reset(&self.device, core.xy(), staggered_start)?;
        }
        Ok(())
    }

    pub fn set_power_state(&self, state: PowerState) -> Result<(), PlatformError> {
        // The power microservice moved off ARC on blackhole.
        if self.device.arch.is_blackhole() {
            return Ok(());
        }

        self.device
            .send_arc_msg(ArcMsg::SetPowerState(state), std::time::Duration::from_secs(1))?;
        Ok(())
    }

    pub fn get_clock(&self) -> Result<u32, PlatformError> {
        self.device.get_clock()
    }

    /// The translated ethernet cores this chip can use as tunnel carriers.
    pub fn remote_transfer_eth_cores(&self) -> Vec<XyPair> {
        self.soc_descriptor
            .get_cores(CoreType::Eth, CoordSystem::Translated)
            .into_iter()
            .map(|c| c.xy())
            .collect()
    }

    /// Build a tunnel from this chip to `target`. `None` when the
    /// generation does not support remote routing.
    pub fn remote_communication(
        &self,
        target: EthCoord,
    ) -> Result<Option<RemoteCommunication>, PlatformError> {
        RemoteCommunication::create(
            self.device.clone(),
            target,
            self.remote_transfer_eth_cores(),
            self.sysmem.clone(),
            false,
        )
    }
}
