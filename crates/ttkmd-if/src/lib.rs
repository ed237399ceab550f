// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::os::{
    fd::{AsRawFd, RawFd},
    unix::prelude::FileTypeExt,
};

mod error;
pub mod ioctl;
pub mod kmdif;
mod pci;
pub mod tlb;

pub use error::{CfgFailType, PciError, PciOpenError};
use ioctl::{query_mappings, AllocateDmaBuffer, GetDeviceInfo, GetDeviceInfoOut, Mapping, QueryMappings};
use umd_core::Arch;
pub use tlb::{DeviceTlbInfo, MemoryType, Ordering, Tlb, TlbInfo};

impl From<&GetDeviceInfoOut> for Arch {
    fn from(value: &GetDeviceInfoOut) -> Self {
        Arch::from_pci_device_id(value.device_id)
    }
}

/// Kernel-allocated DMA buffer mapped into this process.
pub struct DmaBuffer {
    pub buffer: memmap2::MmapMut,
    pub physical_address: u64,
    pub size: u64,
}

/// Hugepage-backed host memory pinned into the device's IOMMU domain.
///
/// `device_address` is the address the device must use to reach the buffer;
/// with an IOMMU it is a DMA address, otherwise the physical address.
pub struct Hugepage {
    pub buffer: memmap2::MmapMut,
    pub device_address: u64,
    pub size: u64,
}

#[derive(Clone)]
pub struct DmaConfig {
    /// Address in CSM where the DMA request structure resides
    pub csm_pcie_ctrl_dma_request_offset: u32,

    /// To trigger ARC interrupt
    pub arc_misc_cntl_addr: u32,

    /// DMA host phys addr high
    pub dma_host_phys_addr_high: u32,

    pub support_64_bit_dma: bool,

    pub use_msi_for_dma: bool,

    pub read_threshold: u32,
    pub write_threshold: u32,
}

pub struct PhysicalDevice {
    pub vendor_id: u16,
    pub device_id: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_id: u16,

    pub pci_bus: u16,
    pub slot: u16,
    pub pci_function: u16,
    pub pci_domain: u16,
    pub numa_node: i16,

    pub bar_addr: u64,
    pub bar_size_bytes: u64,
}

/// The mapped PCIe BARs of one endpoint.
pub struct BarMapping {
    pub bar0_uc: memmap2::MmapMut,
    pub bar0_uc_size: u64,
    pub bar0_uc_offset: u64,

    pub bar0_wc: Option<memmap2::MmapMut>,
    pub bar0_wc_size: u64,

    // Blackhole: BAR4 carries the 4GB apertures.
    pub bar4_uc: Option<memmap2::MmapMut>,
    pub bar4_uc_size: u64,

    // Wormhole: registers above this bar0 offset live in the BAR4 mapping.
    pub system_reg_mapping: Option<memmap2::MmapMut>,
    pub system_reg_start_offset: u32,
    pub system_reg_offset_adjust: u32,
}

/// A TLB window reserved through the kernel driver's allocator.
pub struct TlbAllocation {
    pub id: u32,
    pub uc_mapping: memmap2::MmapMut,
    pub wc_mapping: Option<memmap2::MmapMut>,
    pub size: u64,
}

pub struct PciDevice {
    pub id: usize,

    pub physical: PhysicalDevice,
    pub arch: Arch,

    pub read_checking_enabled: bool,
    pub read_checking_addr: u32,

    next_dma_buf: usize,

    device_fd: std::fs::File,
    pub pci_bar: Option<BarMapping>,

    config_space: std::fs::File,

    max_dma_buf_size_log2: u16,

    completion_flag_buffer: Option<DmaBuffer>,
    transfer_buffer: Option<DmaBuffer>,

    pub dma_config: Option<DmaConfig>,
}

fn map_bar(
    fd: RawFd,
    mapping: &Mapping,
    len: u64,
    offset: u64,
) -> Result<memmap2::MmapMut, std::io::Error> {
    unsafe {
        memmap2::MmapOptions::default()
            .len(len as usize)
            .offset(mapping.mapping_base + offset)
            .map_mut(fd)
    }
}

fn allocate_dma_buffer(
    device_id: usize,
    device_fd: RawFd,
    max_dma_buf_size_log2: u32,
    buffer_index: usize,
    size: u32,
) -> Result<DmaBuffer, PciError> {
    let page_size = kmdif::getpagesize().unwrap_or(4096) as u32;

    let mut allocate_dma_buf = AllocateDmaBuffer::default();
    allocate_dma_buf.input.requested_size = size.min(1 << max_dma_buf_size_log2).max(page_size);
    allocate_dma_buf.input.buf_index = buffer_index as u8;

    if let Err(err) = unsafe { ioctl::allocate_dma_buffer(device_fd, &mut allocate_dma_buf) } {
        return Err(PciError::DmaAllocationFailed {
            id: device_id,
            size: allocate_dma_buf.input.requested_size,
            err,
        });
    }

    let map = unsafe {
        memmap2::MmapOptions::default()
            .len(allocate_dma_buf.output.size as usize)
            .offset(allocate_dma_buf.output.mapping_offset)
            .map_mut(device_fd)
    }
    .map_err(|err| PciError::DmaBufferMappingFailed {
        id: device_id,
        source: err,
    })?;

    Ok(DmaBuffer {
        buffer: map,
        physical_address: allocate_dma_buf.output.physical_address,
        size: allocate_dma_buf.output.size as u64,
    })
}

impl PciDevice {
    pub fn open(device_id: usize) -> Result<PciDevice, PciOpenError> {
        let fd = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/tenstorrent/{device_id}"))
            .map_err(|err| PciOpenError::DeviceOpenFailed {
                id: device_id,
                source: err,
            })?;

        let mut device_info = GetDeviceInfo::default();
        if let Err(errno) = unsafe { ioctl::get_device_info(fd.as_raw_fd(), &mut device_info) } {
            return Err(PciOpenError::IoctlError {
                name: "get_device_info".to_string(),
                id: device_id,
                source: errno,
            });
        }

        let arch = Arch::from(&device_info.output);
        if let Arch::Unknown(device) = arch {
            return Err(PciOpenError::UnrecognizedDeviceId {
                pci_id: device_id,
                device_id: device,
            });
        }

        let max_dma_buf_size_log2 = device_info.output.max_dma_buf_size_log2;

        let mut mappings = QueryMappings::<8>::default();
        if let Err(errno) = unsafe { query_mappings(fd.as_raw_fd(), &mut mappings) } {
            return Err(PciOpenError::IoctlError {
                name: "query_mappings".to_string(),
                id: device_id,
                source: errno,
            });
        }

        let mut bar0_uc_mapping = Mapping::default();
        let mut bar0_wc_mapping = Mapping::default();
        let mut bar1_uc_mapping = Mapping::default();
        let mut bar2_uc_mapping = Mapping::default();

        for mapping in mappings.output.mappings.iter().take(mappings.input.output_mapping_count as usize) {
            match kmdif::MappingId::from_u32(mapping.mapping_id) {
                kmdif::MappingId::Resource0Uc => bar0_uc_mapping = *mapping,
                kmdif::MappingId::Resource0Wc => bar0_wc_mapping = *mapping,
                kmdif::MappingId::Resource1Uc => bar1_uc_mapping = *mapping,
                kmdif::MappingId::Resource2Uc => bar2_uc_mapping = *mapping,
                kmdif::MappingId::Resource1Wc | kmdif::MappingId::Resource2Wc => {}
                kmdif::MappingId::Unused => {}
                kmdif::MappingId::Unknown(v) => {
                    tracing::warn!("Received unknown mapping id {v} for device {device_id}");
                }
            }
        }

        if bar0_uc_mapping.mapping_id != kmdif::MappingId::Resource0Uc.as_u32() {
            return Err(PciOpenError::BarMappingError {
                name: "bar0_uc".to_string(),
                id: device_id,
            });
        }

        let wc_mapping_size = if arch.is_blackhole() {
            kmdif::BH_BAR0_WC_MAPPING_SIZE
        } else {
            kmdif::WH_BAR0_WC_MAPPING_SIZE
        };

        let mut bar0_wc = None;
        let mut bar0_wc_size = 0;
        if bar0_wc_mapping.mapping_id == kmdif::MappingId::Resource0Wc.as_u32() {
            bar0_wc_size = bar0_wc_mapping.mapping_size.min(wc_mapping_size);
            match map_bar(fd.as_raw_fd(), &bar0_wc_mapping, bar0_wc_size, 0) {
                Ok(map) => bar0_wc = Some(map),
                Err(err) => {
                    tracing::warn!("Failed to map bar0_wc for device {device_id}: {err}");
                    bar0_wc_size = 0;
                }
            }
        }

        // With a WC mapping in place only the tail of BAR0 is mapped uncached.
        let (bar0_uc_size, bar0_uc_offset) = if bar0_wc.is_some() {
            (
                bar0_uc_mapping.mapping_size.saturating_sub(wc_mapping_size),
                wc_mapping_size,
            )
        } else {
            (bar0_uc_mapping.mapping_size, 0)
        };

        let bar0_uc = map_bar(fd.as_raw_fd(), &bar0_uc_mapping, bar0_uc_size, bar0_uc_offset)
            .map_err(|_| PciOpenError::BarMappingError {
                name: "bar0_uc".to_string(),
                id: device_id,
            })?;

        let mut system_reg_mapping = None;
        let mut system_reg_start_offset = 0;
        let mut system_reg_offset_adjust = 0;
        if arch.is_wormhole() {
            if bar2_uc_mapping.mapping_id != kmdif::MappingId::Resource2Uc.as_u32() {
                return Err(PciOpenError::BarMappingError {
                    name: "bar4_system_regs".to_string(),
                    id: device_id,
                });
            }

            system_reg_mapping = Some(
                map_bar(
                    fd.as_raw_fd(),
                    &bar2_uc_mapping,
                    bar2_uc_mapping.mapping_size,
                    0,
                )
                .map_err(|_| PciOpenError::BarMappingError {
                    name: "bar4_system_regs".to_string(),
                    id: device_id,
                })?,
            );

            system_reg_start_offset = (512 - 16) * 1024 * 1024;
            system_reg_offset_adjust = (512 - 32) * 1024 * 1024;
        }

        let mut bar4_uc = None;
        let mut bar4_uc_size = 0;
        if arch.is_blackhole() {
            if bar1_uc_mapping.mapping_id != kmdif::MappingId::Resource1Uc.as_u32() {
                return Err(PciOpenError::BarMappingError {
                    name: "bar4_uc".to_string(),
                    id: device_id,
                });
            }

            bar4_uc_size = bar1_uc_mapping.mapping_size;
            bar4_uc = Some(
                map_bar(
                    fd.as_raw_fd(),
                    &bar1_uc_mapping,
                    bar1_uc_mapping.mapping_size,
                    0,
                )
                .map_err(|_| PciOpenError::BarMappingError {
                    name: "bar4_uc".to_string(),
                    id: device_id,
                })?,
            );
        }

        let pci_bus = device_info.output.bus_dev_fn >> 8;
        let slot = (device_info.output.bus_dev_fn >> 3) & 0x1f;
        let pci_function = device_info.output.bus_dev_fn & 0x7;
        let pci_domain = device_info.output.pci_domain;

        let config_space = std::fs::OpenOptions::new()
            .read(true)
            .write(false)
            .open(format!(
                "/sys/bus/pci/devices/{pci_domain:04x}:{pci_bus:02x}:{slot:02x}.{pci_function:01x}/config"
            ))
            .map_err(|err| PciOpenError::DeviceOpenFailed {
                id: device_id,
                source: err,
            })?;

        let mut device = PciDevice {
            id: device_id,
            arch,

            physical: PhysicalDevice {
                vendor_id: device_info.output.vendor_id,
                device_id: device_info.output.device_id,
                subsystem_vendor_id: device_info.output.subsystem_vendor_id,
                subsystem_id: device_info.output.subsystem_id,
                pci_bus,
                slot,
                pci_function,
                pci_domain,
                numa_node: device_info.output.numa_node,
                bar_addr: pci::read_bar0_base(&config_space),
                bar_size_bytes: bar0_uc_mapping.mapping_size,
            },

            read_checking_enabled: true,
            read_checking_addr: if arch.is_blackhole() {
                kmdif::BH_NOC_NODE_ID_OFFSET
            } else {
                kmdif::WH_ARC_SCRATCH6_ADDR
            },

            next_dma_buf: 0,

            device_fd: fd,

            pci_bar: Some(BarMapping {
                bar0_uc,
                bar0_uc_size,
                bar0_uc_offset,
                bar0_wc,
                bar0_wc_size,
                bar4_uc,
                bar4_uc_size,
                system_reg_mapping,
                system_reg_start_offset,
                system_reg_offset_adjust,
            }),

            config_space,

            max_dma_buf_size_log2,

            dma_config: None,
            completion_flag_buffer: None,
            transfer_buffer: None,
        };

        // Allocate the DMA staging buffers eagerly so the first dma access
        // does not pay for them.
        device.allocate_transfer_buffers();

        Ok(device)
    }

    pub fn allocate_transfer_buffers(&mut self) -> bool {
        if self.transfer_buffer.is_none() {
            self.transfer_buffer = self
                .allocate_dma_buffer_range(
                    kmdif::getpagesize().unwrap_or(4096) as u32,
                    kmdif::MAX_DMA_BYTES,
                )
                .ok();
        }

        if self.transfer_buffer.is_some() && self.completion_flag_buffer.is_none() {
            self.completion_flag_buffer = self
                .allocate_dma_buffer(std::mem::size_of::<u64>() as u32)
                .ok();
        }

        self.transfer_buffer.is_some() && self.completion_flag_buffer.is_some()
    }

    pub fn allocate_dma_buffer_range(
        &mut self,
        min_size: u32,
        max_size: u32,
    ) -> Result<DmaBuffer, PciError> {
        let page_size = kmdif::getpagesize().unwrap_or(4096) as u32;

        let mut page_aligned_size = (max_size + page_size - 1) & !(page_size - 1);
        let min_aligned_page_size = (min_size + page_size - 1) & !(page_size - 1);

        // The kernel may not have a buffer of the requested size available;
        // halve until it does or we hit the floor.
        loop {
            match allocate_dma_buffer(
                self.id,
                self.device_fd.as_raw_fd(),
                self.max_dma_buf_size_log2 as u32,
                self.next_dma_buf,
                page_aligned_size,
            ) {
                Ok(buf) => {
                    self.next_dma_buf += 1;
                    return Ok(buf);
                }
                Err(err) => {
                    if page_aligned_size <= min_aligned_page_size {
                        return Err(err);
                    }

                    page_aligned_size = (page_aligned_size / 2).max(min_aligned_page_size);
                }
            }
        }
    }

    pub fn allocate_dma_buffer(&mut self, size: u32) -> Result<DmaBuffer, PciError> {
        self.allocate_dma_buffer_range(size, size)
    }

    /// Allocate one hugepage-backed channel and pin it for device DMA.
    pub fn allocate_hugepage(&self, size: u64) -> Result<Hugepage, PciError> {
        let buffer = memmap2::MmapOptions::new()
            .len(size as usize)
            .huge(Some(30))
            .map_anon()
            .map_err(|err| PciError::HugepageMappingFailed {
                id: self.id,
                source: err,
            })?;

        let mut data = ioctl::PinPages {
            input: ioctl::PinPagesIn {
                output_size_bytes: std::mem::size_of::<ioctl::PinPagesOut>() as u32,
                flags: ioctl::PIN_PAGES_INTO_IOMMU,
                virtual_address: buffer.as_ptr() as u64,
                size,
            },
            ..Default::default()
        };

        let result = unsafe { ioctl::pin_pages(self.device_fd.as_raw_fd(), &mut data) };
        match result {
            Ok(_) => {}
            // No IOMMU available; fall back to pinned contiguous memory.
            Err(nix::errno::Errno::EINVAL) => {
                data.input.flags = ioctl::PIN_PAGES_CONTIGUOUS;
                unsafe { ioctl::pin_pages(self.device_fd.as_raw_fd(), &mut data) }.map_err(
                    |err| PciError::HugepageAllocationFailed {
                        id: self.id,
                        size,
                        err,
                    },
                )?;
            }
            Err(err) => {
                return Err(PciError::HugepageAllocationFailed {
                    id: self.id,
                    size,
                    err,
                });
            }
        }

        Ok(Hugepage {
            buffer,
            device_address: data.output.physical_address,
            size,
        })
    }

    pub fn free_hugepage(&self, hugepage: &Hugepage) -> Result<(), PciError> {
        let mut data = ioctl::UnpinPages {
            input: ioctl::UnpinPagesIn {
                virtual_address: hugepage.buffer.as_ptr() as u64,
                size: hugepage.size,
                ..Default::default()
            },
        };

        unsafe { ioctl::unpin_pages(self.device_fd.as_raw_fd(), &mut data) }
            .map(|_| ())
            .map_err(PciError::IoctlError)
    }

    pub fn allocate_tlb(&self, size: u64) -> Result<TlbAllocation, PciError> {
        let mut data = ioctl::AllocateTlb {
            input: ioctl::AllocateTlbIn {
                size,
                ..Default::default()
            },
            ..Default::default()
        };

        unsafe { ioctl::allocate_tlb(self.device_fd.as_raw_fd(), &mut data) }
            .map_err(PciError::IoctlError)?;

        let uc_mapping = unsafe {
            memmap2::MmapOptions::default()
                .len(size as usize)
                .offset(data.output.mmap_offset_uc)
                .map_mut(self.device_fd.as_raw_fd())
        }
        .map_err(|_| PciError::TlbAllocationError("failed to map uc aperture".to_string()))?;

        let wc_mapping = unsafe {
            memmap2::MmapOptions::default()
                .len(size as usize)
                .offset(data.output.mmap_offset_wc)
                .map_mut(self.device_fd.as_raw_fd())
        }
        .ok();

        Ok(TlbAllocation {
            id: data.output.id,
            uc_mapping,
            wc_mapping,
            size,
        })
    }

    pub fn free_tlb(&self, alloc: &TlbAllocation) -> Result<bool, PciError> {
        let result = unsafe {
            ioctl::free_tlb(
                self.device_fd.as_raw_fd(),
                (&mut ioctl::FreeTlb {
                    input: ioctl::FreeTlbIn { id: alloc.id },
                    output: ioctl::FreeTlbOut {},
                }) as *mut _,
            )
        };

        match result {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(nix::errno::Errno::EINVAL) => Ok(false),
            Err(errno) => Err(PciError::IoctlError(errno)),
        }
    }

    pub fn configure_tlb(
        &self,
        alloc: &TlbAllocation,
        config: ioctl::NocTlbConfig,
    ) -> Result<bool, PciError> {
        let result = unsafe {
            ioctl::configure_tlb(
                self.device_fd.as_raw_fd(),
                (&mut ioctl::ConfigureTlb {
                    input: ioctl::ConfigureTlbIn {
                        id: alloc.id,
                        config,
                    },
                    output: ioctl::ConfigureTlbOut {
                        ..Default::default()
                    },
                }) as *mut _,
            )
        };

        match result {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(nix::errno::Errno::EINVAL) => Ok(false),
            Err(errno) => Err(PciError::IoctlError(errno)),
        }
    }

    pub fn query_warm_reset_support(&self) -> bool {
        let mut data = ioctl::ResetDevice {
            input: ioctl::ResetDeviceIn {
                flags: ioctl::RESET_DEVICE_RESTORE_STATE,
                ..Default::default()
            },
            ..Default::default()
        };

        match unsafe { ioctl::reset_device(self.device_fd.as_raw_fd(), &mut data) } {
            Ok(_) => data.output.result == 0,
            Err(_) => false,
        }
    }

    pub fn trigger_warm_reset(&self) -> Result<(), PciError> {
        let mut data = ioctl::ResetDevice {
            input: ioctl::ResetDeviceIn {
                flags: ioctl::RESET_DEVICE_RESET_PCIE_LINK,
                ..Default::default()
            },
            ..Default::default()
        };

        unsafe { ioctl::reset_device(self.device_fd.as_raw_fd(), &mut data) }
            .map_err(PciError::IoctlError)?;

        if data.output.result != 0 {
            return Err(PciError::WarmResetUnsupported { id: self.id });
        }

        Ok(())
    }

    pub fn scan() -> Vec<usize> {
        let output = match std::fs::read_dir("/dev/tenstorrent") {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!("When reading /dev/tenstorrent for a scan hit error: {err}");
                return Vec::new();
            }
        };

        let mut output = output
            .filter_map(|entry| {
                let entry = entry.ok()?;

                if !entry.file_type().ok()?.is_char_device() {
                    return None;
                }

                let path = entry.path();
                let file_name = path.file_name()?.to_str()?;
                file_name.parse::<usize>().ok()
            })
            .collect::<Vec<_>>();

        output.sort();

        output
    }
}
