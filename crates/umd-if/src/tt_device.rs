// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-ASIC façade over one PCIe endpoint.
//!
//! `read_from_device`/`write_to_device` take **translated** coordinates and
//! route every access through the per-device cached TLB window, paying one
//! register rewrite per target change instead of an allocation per call.

use std::sync::{Arc, Mutex};

use ttkmd_if::PciDevice;
use umd_core::Arch;

use crate::{
    arc::{ArcMessenger, ArcMsg, ArcMsgOk, ArcTelemetryReader, FirmwareInfoProvider},
    arch,
    coords::XyPair,
    error::PlatformError,
    tlb_manager::{Ordering, TlbManager, TlbMapping, TlbWindow},
};

pub const ARC_STARTUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

// Raw BAR accesses below the register space would alias TLB data windows.
const BAR0_REGISTER_BASE: u32 = 0x1F00_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Created,
    Initialized,
}

pub struct TTDevice {
    pub arch: Arch,
    pub device_index: usize,

    device: Arc<Mutex<PciDevice>>,
    tlb_manager: TlbManager,
    cached_window: Mutex<TlbWindow>,
    dma_window: Mutex<Option<TlbWindow>>,

    noc_id: u8,

    state: DeviceState,
    arc_messenger: Option<ArcMessenger>,
    telemetry: Option<ArcTelemetryReader>,
    firmware_info: Option<FirmwareInfoProvider>,
}

impl TTDevice {
    pub fn open(device_index: usize) -> Result<Self, PlatformError> {
        let device = PciDevice::open(device_index)?;
        let arch = device.arch;

        let device = Arc::new(Mutex::new(device));
        let tlb_manager = TlbManager::new(device.clone());
        let cached_window = Mutex::new(tlb_manager.cached_window());

        Ok(Self {
            arch,
            device_index,
            device,
            tlb_manager,
            cached_window,
            dma_window: Mutex::new(None),
            noc_id: 0,
            state: DeviceState::Created,
            arc_messenger: None,
            telemetry: None,
            firmware_info: None,
        })
    }

    pub fn set_noc_id(&mut self, noc_id: u8) {
        self.noc_id = noc_id;
    }

    fn hang(&self, err: PlatformError) -> PlatformError {
        match err {
            PlatformError::HardwareHung { .. } => PlatformError::HardwareHung {
                id: self.device_index,
            },
            other => other,
        }
    }

    /// Wait for the ARC core to come up, then bring up the messaging stack.
    pub fn init_tt_device(&mut self) -> Result<(), PlatformError> {
        self.wait_arc_ready(ARC_STARTUP_TIMEOUT)?;

        let messenger = ArcMessenger::new(self.device.clone(), self.device_index)?;
        let telemetry = ArcTelemetryReader::new(self.device.clone(), &messenger)?;
        let firmware_info = FirmwareInfoProvider::new(&telemetry)?;

        self.arc_messenger = Some(messenger);
        self.telemetry = Some(telemetry);
        self.firmware_info = Some(firmware_info);
        self.state = DeviceState::Initialized;

        Ok(())
    }

    fn wait_arc_ready(&self, timeout: std::time::Duration) -> Result<(), PlatformError> {
        let params = arch::arc_params(self.arch);
        let start = std::time::Instant::now();

        loop {
            let ready = if self.arch.is_blackhole() {
                let control = self
                    .device
                    .lock()
                    .unwrap()
                    .read32(params.queue_control_scratch)
                    .map_err(PlatformError::from)
                    .map_err(|e| self.hang(e))?;
                control != 0 && control != 0xFFFF_FFFF
            } else {
                // Boot postcode lands in scratch[0] once firmware is up.
                let postcode = self
                    .device
                    .lock()
                    .unwrap()
                    .read32(params.reset_scratch(0))
                    .map_err(PlatformError::from)
                    .map_err(|e| self.hang(e))?;
                (postcode >> 16) == 0xC0DE
            };

            if ready {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(PlatformError::Timeout(timeout));
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    fn initialized(&self) -> Result<(), PlatformError> {
        if self.state != DeviceState::Initialized {
            return Err(PlatformError::UnsupportedOperation(
                "device has not been initialized".to_string(),
            ));
        }
        Ok(())
    }

    pub fn arc_messenger(&self) -> Result<&ArcMessenger, PlatformError> {
        self.initialized()?;
        Ok(self.arc_messenger.as_ref().unwrap())
    }

    pub fn telemetry(&self) -> Result<&ArcTelemetryReader, PlatformError> {
        self.initialized()?;
        Ok(self.telemetry.as_ref().unwrap())
    }

    pub fn firmware_info(&self) -> Result<&FirmwareInfoProvider, PlatformError> {
        self.initialized()?;
        Ok(self.firmware_info.as_ref().unwrap())
    }

    pub fn tlb_manager(&self) -> &TlbManager {
        &self.tlb_manager
    }

    pub fn pci_device(&self) -> Arc<Mutex<PciDevice>> {
        self.device.clone()
    }

    /// Write to `(core, addr)` where `core` is a translated coordinate.
    pub fn write_to_device(
        &self,
        core: XyPair,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut window = self.cached_window.lock().unwrap();

        let mut written = 0usize;
        while written < data.len() {
            window
                .reconfigure(core, addr + written as u64, self.noc_id, Ordering::default())
                .map_err(|e| self.hang(e))?;

            let span = (data.len() - written).min(window.usable_len() as usize);
            window
                .write_block(0, &data[written..written + span])
                .map_err(|e| self.hang(e))?;
            written += span;
        }

        Ok(())
    }

    /// Read from `(core, addr)` where `core` is a translated coordinate.
    pub fn read_from_device(
        &self,
        core: XyPair,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut window = self.cached_window.lock().unwrap();

        let mut read = 0usize;
        while read < data.len() {
            window
                .reconfigure(core, addr + read as u64, self.noc_id, Ordering::default())
                .map_err(|e| self.hang(e))?;

            let span = (data.len() - read).min(window.usable_len() as usize);
            window
                .read_block(0, &mut data[read..read + span])
                .map_err(|e| self.hang(e))?;
            read += span;
        }

        Ok(())
    }

    pub fn read32(&self, core: XyPair, addr: u64) -> Result<u32, PlatformError> {
        let mut data = [0u8; 4];
        self.read_from_device(core, addr, &mut data)?;
        Ok(u32::from_le_bytes(data))
    }

    pub fn write32(&self, core: XyPair, addr: u64, value: u32) -> Result<(), PlatformError> {
        self.write_to_device(core, addr, &value.to_le_bytes())
    }

    /// Write `data` to every core in the `start..=end` rectangle at once.
    pub fn noc_multicast_write(
        &self,
        start: XyPair,
        end: XyPair,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        if data.is_empty() {
            return Ok(());
        }

        let smallest = arch::tlb_window_sizes(self.arch)[0];
        let mut window = self
            .tlb_manager
            .allocate(smallest, TlbMapping::WriteCombining)?;

        let mut written = 0usize;
        while written < data.len() {
            window.reconfigure_multicast(
                start,
                end,
                addr + written as u64,
                self.noc_id,
                Ordering::Strict,
            )?;

            let span = (data.len() - written).min(window.usable_len() as usize);
            window.write_block(0, &data[written..written + span])?;
            written += span;
        }

        Ok(())
    }

    fn check_arc_range(
        base: u32,
        size: u32,
        offset: u64,
        len: usize,
        what: &str,
    ) -> Result<u32, PlatformError> {
        if offset % 4 != 0 {
            return Err(PlatformError::InvalidAddress {
                addr: offset,
                reason: format!("{what} access must be 4-byte aligned"),
            });
        }
        if offset + len as u64 > size as u64 {
            return Err(PlatformError::InvalidAddress {
                addr: offset,
                reason: format!("{len} bytes at {offset:#x} overrun {what}"),
            });
        }
        Ok(base + offset as u32)
    }

    pub fn read_from_arc_apb(&self, offset: u64, data: &mut [u8]) -> Result<(), PlatformError> {
        let params = arch::arc_params(self.arch);
        let addr = Self::check_arc_range(params.apb_base, params.apb_size, offset, data.len(), "ARC APB")?;
        self.device
            .lock()
            .unwrap()
            .read_block(addr, data)
            .map_err(PlatformError::from)
            .map_err(|e| self.hang(e))
    }

    pub fn write_to_arc_apb(&self, offset: u64, data: &[u8]) -> Result<(), PlatformError> {
        let params = arch::arc_params(self.arch);
        let addr = Self::check_arc_range(params.apb_base, params.apb_size, offset, data.len(), "ARC APB")?;
        self.device
            .lock()
            .unwrap()
            .write_block(addr, data)
            .map_err(PlatformError::from)
            .map_err(|e| self.hang(e))
    }

    pub fn read_from_arc_csm(&self, offset: u64, data: &mut [u8]) -> Result<(), PlatformError> {
        let params = arch::arc_params(self.arch);
        let addr = Self::check_arc_range(params.csm_base, params.csm_size, offset, data.len(), "ARC CSM")?;
        self.device
            .lock()
            .unwrap()
            .read_block(addr, data)
            .map_err(PlatformError::from)
            .map_err(|e| self.hang(e))
    }

    pub fn write_to_arc_csm(&self, offset: u64, data: &[u8]) -> Result<(), PlatformError> {
        let params = arch::arc_params(self.arch);
        let addr = Self::check_arc_range(params.csm_base, params.csm_size, offset, data.len(), "ARC CSM")?;
        self.device
            .lock()
            .unwrap()
            .write_block(addr, data)
            .map_err(PlatformError::from)
            .map_err(|e| self.hang(e))
    }

    pub fn bar_read32(&self, addr: u32) -> Result<u32, PlatformError> {
        if addr < BAR0_REGISTER_BASE {
            return Err(PlatformError::InvalidAddress {
                addr: addr as u64,
                reason: "raw BAR access below the register space".to_string(),
            });
        }
        self.device
            .lock()
            .unwrap()
            .read32(addr)
            .map_err(PlatformError::from)
            .map_err(|e| self.hang(e))
    }

    pub fn bar_write32(&self, addr: u32, value: u32) -> Result<(), PlatformError> {
        if addr < BAR0_REGISTER_BASE {
            return Err(PlatformError::InvalidAddress {
                addr: addr as u64,
                reason: "raw BAR access below the register space".to_string(),
            });
        }
        self.device
            .lock()
            .unwrap()
            .write32(addr, value)
            .map_err(PlatformError::from)
            .map_err(|e| self.hang(e))
    }

    fn with_dma_window<R>(
        &self,
        f: impl FnOnce(&mut TlbWindow, &mut PciDevice) -> Result<R, PlatformError>,
    ) -> Result<R, PlatformError> {
        // One DMA window per device; the mutex also serializes the engine.
        let mut slot = self.dma_window.lock().unwrap();
        if slot.is_none() {
            let size = *arch::tlb_window_sizes(self.arch).first().unwrap();
            *slot = Some(self.tlb_manager.allocate(size, TlbMapping::DmaAlias)?);
        }

        let window = slot.as_mut().unwrap();
        let device = self.device.clone();
        let mut device = device.lock().unwrap();
        f(window, &mut device)
    }

    /// Bulk write through the PCIe DMA engine.
    pub fn dma_write_to_device(
        &self,
        core: XyPair,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        if data.is_empty() {
            return Ok(());
        }

        let noc_id = self.noc_id;
        self.with_dma_window(|window, device| {
            let mut written = 0usize;
            while written < data.len() {
                // Cannot go through TlbWindow::reconfigure here, the device
                // lock is already held.
                let (bar_addr, len) = ttkmd_if::tlb::setup_tlb(
                    device,
                    window.index,
                    ttkmd_if::Tlb {
                        local_offset: addr + written as u64,
                        x_end: core.x,
                        y_end: core.y,
                        noc_sel: noc_id,
                        ..Default::default()
                    },
                )?;

                let span = (data.len() - written).min(len as usize);
                device.dma_write_block(bar_addr as u32, &data[written..written + span])?;
                written += span;
            }
            Ok(())
        })
        .map_err(|e| self.hang(e))
    }

    /// Bulk read through the PCIe DMA engine.
    pub fn dma_read_from_device(
        &self,
        core: XyPair,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        if data.is_empty() {
            return Ok(());
        }

        let noc_id = self.noc_id;
        self.with_dma_window(|window, device| {
            let mut read = 0usize;
            while read < data.len() {
                let (bar_addr, len) = ttkmd_if::tlb::setup_tlb(
                    device,
                    window.index,
                    ttkmd_if::Tlb {
                        local_offset: addr + read as u64,
                        x_end: core.x,
                        y_end: core.y,
                        noc_sel: noc_id,
                        ..Default::default()
                    },
                )?;

                let span = (data.len() - read).min(len as usize);
                device.dma_read_block(bar_addr as u32, &mut data[read..read + span])?;
                read += span;
            }
            Ok(())
        })
        .map_err(|e| self.hang(e))
    }

    pub fn send_arc_msg(
        &self,
        msg: ArcMsg,
        timeout: std::time::Duration,
    ) -> Result<ArcMsgOk, PlatformError> {
        self.arc_messenger()?.send_message(msg, timeout)
    }

    /// Current AI clock in MHz.
    pub fn get_clock(&self) -> Result<u32, PlatformError> {
        let ok = self.send_arc_msg(ArcMsg::GetAiclk, std::time::Duration::from_secs(1))?;
        Ok(ok.arg & 0xffff)
    }

    pub fn query_warm_reset_support(&self) -> bool {
        self.device.lock().unwrap().query_warm_reset_support()
    }

    pub fn trigger_warm_reset(&self) -> Result<(), PlatformError> {
        Ok(self.device.lock().unwrap().trigger_warm_reset()?)
    }
}
