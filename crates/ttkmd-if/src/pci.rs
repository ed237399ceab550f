// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::os::fd::AsRawFd;

use crate::{error::PciError, kmdif, BarMapping, PciDevice};

const ERROR_VALUE: u32 = 0xffffffff;

pub(crate) fn read_bar0_base(config_space: &std::fs::File) -> u64 {
    const BAR_ADDRESS_MASK: u64 = !0xFu64;
    const BAR0_CONFIG_OFFSET: i64 = 0x10;

    let mut bar01 = [0u8; std::mem::size_of::<u64>()];
    match nix::sys::uio::pread(config_space.as_raw_fd(), &mut bar01, BAR0_CONFIG_OFFSET) {
        Ok(size) if size == bar01.len() => u64::from_ne_bytes(bar01) & BAR_ADDRESS_MASK,
        _ => 0,
    }
}

impl BarMapping {
    unsafe fn register_address_mut<T>(&self, mut register_addr: u32) -> *mut T {
        let reg_mapping: *mut u8;

        if self.system_reg_mapping.is_some() && register_addr >= self.system_reg_start_offset {
            let mapping = self.system_reg_mapping.as_ref().unwrap_unchecked();

            register_addr -= self.system_reg_offset_adjust;
            reg_mapping = mapping.as_ptr() as *mut u8;
        } else if self.bar0_wc.is_some() && (register_addr as u64) < self.bar0_wc_size {
            let mapping = self.bar0_wc.as_ref().unwrap_unchecked();

            reg_mapping = mapping.as_ptr() as *mut u8;
        } else {
            register_addr -= self.bar0_uc_offset as u32;
            reg_mapping = self.bar0_uc.as_ptr() as *mut u8;
        }

        reg_mapping.offset(register_addr as isize) as *mut T
    }

    unsafe fn register_address<T>(&self, register_addr: u32) -> *const T {
        self.register_address_mut(register_addr) as *const T
    }
}

impl PciDevice {
    pub fn read_cfg(&self, byte_offset: u32, data: &mut [u8]) -> Result<(), PciError> {
        match nix::sys::uio::pread(self.config_space.as_raw_fd(), data, byte_offset as i64) {
            Ok(size) if size == data.len() => Ok(()),
            Ok(size) => Err(PciError::CfgReadFailed {
                id: self.id,
                offset: byte_offset as usize,
                size: data.len(),
                source: crate::error::CfgFailType::SizeMismatch(size),
            }),
            Err(err) => Err(PciError::CfgReadFailed {
                id: self.id,
                offset: byte_offset as usize,
                size: data.len(),
                source: crate::error::CfgFailType::Nix(err),
            }),
        }
    }

    /// A sentinel read is only a hang when a known-live register also reads
    /// as the sentinel. Probing costs one extra uncached read so it only
    /// happens on the sentinel path.
    #[inline]
    pub fn detect_ffffffff_read(&self, data_read: Option<u32>) -> Result<(), PciError> {
        let data_read = data_read.unwrap_or(ERROR_VALUE);

        if self.read_checking_enabled && data_read == ERROR_VALUE {
            let scratch_data = match &self.pci_bar {
                Some(bar) => unsafe {
                    bar.register_address::<u32>(self.read_checking_addr)
                        .read_volatile()
                },
                None => {
                    return Err(PciError::BarUnmapped);
                }
            };

            if scratch_data == ERROR_VALUE {
                return Err(PciError::BrokenConnection);
            }
        }

        Ok(())
    }

    #[inline]
    pub fn read32(&self, addr: u32) -> Result<u32, PciError> {
        let read_pointer = match &self.pci_bar {
            Some(bar) => unsafe { bar.register_address::<u32>(addr) as usize },
            None => {
                return Err(PciError::BarUnmapped);
            }
        };

        let data = if read_pointer % 4 != 0 {
            // The pcie controller only issues aligned 4-byte reads;
            // reconstruct the unaligned word from its two neighbours.
            let aligned = read_pointer & !3;
            let shift = (read_pointer % 4) * 8;
            unsafe {
                let lo = (aligned as *const u32).read_volatile();
                let hi = (aligned as *const u32).add(1).read_volatile();
                (lo >> shift) | (hi << (32 - shift))
            }
        } else {
            unsafe { (read_pointer as *const u32).read_volatile() }
        };
        self.detect_ffffffff_read(Some(data))?;

        Ok(data)
    }

    #[inline]
    pub fn write32(&mut self, addr: u32, data: u32) -> Result<(), PciError> {
        let write_pointer = match &self.pci_bar {
            Some(bar) => unsafe { bar.register_address_mut::<u32>(addr) as usize },
            None => {
                return Err(PciError::BarUnmapped);
            }
        };

        if write_pointer % 4 != 0 {
            let aligned = write_pointer & !3;
            let byte_offset = write_pointer % 4;
            unsafe {
                let mut bytes = [0u8; 8];
                bytes[..4].copy_from_slice(&(aligned as *const u32).read_volatile().to_le_bytes());
                bytes[4..]
                    .copy_from_slice(&(aligned as *const u32).add(1).read_volatile().to_le_bytes());
                bytes[byte_offset..byte_offset + 4].copy_from_slice(&data.to_le_bytes());

                (aligned as *mut u32)
                    .write_volatile(u32::from_le_bytes(bytes[..4].try_into().unwrap()));
                (aligned as *mut u32)
                    .add(1)
                    .write_volatile(u32::from_le_bytes(bytes[4..].try_into().unwrap()));
            }
        } else {
            unsafe { (write_pointer as *mut u32).write_volatile(data) };
        }
        self.detect_ffffffff_read(None)?;

        Ok(())
    }

    pub fn write_block(&mut self, addr: u32, data: &[u8]) -> Result<(), PciError> {
        if let Some(dma_config) = self.dma_config.clone() {
            if dma_config.write_threshold > 0
                && data.len() > dma_config.write_threshold as usize
                && self.allocate_transfer_buffers()
            {
                return self.dma_write_block(addr, data);
            }
        }

        self.write_block_no_dma(addr, data)
    }

    pub fn read_block(&mut self, addr: u32, data: &mut [u8]) -> Result<(), PciError> {
        if let Some(dma_config) = self.dma_config.clone() {
            if dma_config.read_threshold > 0
                && data.len() > dma_config.read_threshold as usize
                && self.allocate_transfer_buffers()
            {
                return self.dma_read_block(addr, data);
            }
        }

        self.read_block_no_dma(addr, data)
    }

    fn bar4_pointer(&self, addr: u64, len: usize) -> Option<*mut u8> {
        let bar = self.pci_bar.as_ref()?;
        let mapping = bar.bar4_uc.as_ref()?;

        if addr < kmdif::BH_4G_TLB_BASE {
            return None;
        }
        let offset = addr - kmdif::BH_4G_TLB_BASE;
        if offset + len as u64 > bar.bar4_uc_size {
            return None;
        }

        Some(unsafe { (mapping.as_ptr() as *mut u8).add(offset as usize) })
    }

    /// Block write with a full 64-bit device address; addresses inside the
    /// blackhole 4GB apertures route through BAR4.
    pub fn write_block64(&mut self, addr: u64, data: &[u8]) -> Result<(), PciError> {
        if let Some(ptr) = self.bar4_pointer(addr, data.len()) {
            unsafe { Self::memcpy_to_device(ptr, data) };
            return Ok(());
        }
        self.write_block(addr as u32, data)
    }

    /// Block read with a full 64-bit device address; see [`Self::write_block64`].
    pub fn read_block64(&mut self, addr: u64, data: &mut [u8]) -> Result<(), PciError> {
        if let Some(ptr) = self.bar4_pointer(addr, data.len()) {
            unsafe { Self::memcpy_from_device(data, ptr) };
            if data.len() >= std::mem::size_of::<u32>() {
                self.detect_ffffffff_read(Some(u32::from_le_bytes(
                    data[..4].try_into().unwrap(),
                )))?;
            }
            return Ok(());
        }
        self.read_block(addr as u32, data)
    }

    pub fn write_block_no_dma(&self, addr: u32, data: &[u8]) -> Result<(), PciError> {
        unsafe {
            let ptr = match &self.pci_bar {
                Some(bar) => bar.register_address_mut(addr),
                None => {
                    return Err(PciError::BarUnmapped);
                }
            };
            Self::memcpy_to_device(ptr, data);
        }

        Ok(())
    }

    pub fn read_block_no_dma(&self, addr: u32, data: &mut [u8]) -> Result<(), PciError> {
        unsafe {
            let ptr = match &self.pci_bar {
                Some(bar) => bar.register_address(addr),
                None => {
                    return Err(PciError::BarUnmapped);
                }
            };
            Self::memcpy_from_device(data, ptr);
        }

        if data.len() >= std::mem::size_of::<u32>() {
            self.detect_ffffffff_read(Some(u32::from_le_bytes(data[..4].try_into().unwrap())))?;
        }

        Ok(())
    }

    /// Copy to device memory. The pcie controller requires 4-byte accesses
    /// aligned to 4-byte boundaries; unaligned head/tail bytes go through a
    /// read-modify-write of the surrounding word.
    ///
    /// # Safety
    /// `dest` must come from `BarMapping::register_address_mut`.
    pub unsafe fn memcpy_to_device(dest: *mut u8, src: &[u8]) {
        let mut offset = 0usize;

        while offset < src.len() {
            let addr = dest as usize + offset;
            let byte_offset = addr % 4;
            let remaining = src.len() - offset;

            if byte_offset != 0 || remaining < 4 {
                let aligned = (addr & !3) as *mut u32;
                let count = (4 - byte_offset).min(remaining);

                let mut word = aligned.read_volatile().to_le_bytes();
                word[byte_offset..byte_offset + count]
                    .copy_from_slice(&src[offset..offset + count]);
                aligned.write_volatile(u32::from_le_bytes(word));

                offset += count;
            } else {
                let words = remaining / 4;
                let dest_words = addr as *mut u32;
                for i in 0..words {
                    let value =
                        (src.as_ptr().add(offset + i * 4) as *const u32).read_unaligned();
                    dest_words.add(i).write_volatile(value);
                }
                offset += words * 4;
            }
        }
    }

    /// Copy from device memory, 4-byte aligned accesses only on the device
    /// side.
    ///
    /// # Safety
    /// `src` must come from `BarMapping::register_address`.
    pub unsafe fn memcpy_from_device(dest: &mut [u8], src: *const u8) {
        let mut offset = 0usize;

        while offset < dest.len() {
            let addr = src as usize + offset;
            let byte_offset = addr % 4;
            let remaining = dest.len() - offset;

            if byte_offset != 0 || remaining < 4 {
                let aligned = (addr & !3) as *const u32;
                let count = (4 - byte_offset).min(remaining);

                let word = aligned.read_volatile().to_le_bytes();
                dest[offset..offset + count]
                    .copy_from_slice(&word[byte_offset..byte_offset + count]);

                offset += count;
            } else {
                let words = remaining / 4;
                let src_words = addr as *const u32;
                for i in 0..words {
                    let value = src_words.add(i).read_volatile();
                    (dest.as_mut_ptr().add(offset + i * 4) as *mut u32).write_unaligned(value);
                }
                offset += words * 4;
            }
        }
    }
}

impl PciDevice {
    /// Run one transfer through the ARC-driven PCIe DMA engine.
    pub fn pcie_dma_transfer_turbo(
        &mut self,
        chip_addr: u32,
        host_buffer_addr: u64,
        size: u32,
        write: bool,
    ) -> Result<(), PciError> {
        const DMA_COMPLETION_VALUE: u32 = 0xfaca;
        const DMA_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

        if self.dma_config.is_none() || !self.allocate_transfer_buffers() {
            return Err(PciError::DmaNotConfigured { id: self.id });
        }

        let dma_config = self.dma_config.as_ref().unwrap().clone();

        let host_phys_addr_hi = (host_buffer_addr >> 32) as u32;
        if host_phys_addr_hi != 0 && !dma_config.support_64_bit_dma {
            return Err(PciError::DmaNotConfigured { id: self.id });
        }

        if size > (1 << 28) - 1 {
            return Err(PciError::DmaTooLarge {
                id: self.id,
                size: size as usize,
            });
        }

        let completion_flag_buffer = self.completion_flag_buffer.as_mut().unwrap();
        let req = kmdif::ArcPcieCtrlDmaRequest {
            chip_addr,
            host_phys_addr_lo: (host_buffer_addr & 0xffffffff) as u32,
            completion_flag_phys_addr: completion_flag_buffer.physical_address as u32,
            dma_pack: kmdif::DmaPack::new()
                .with_size_bytes(size)
                .with_write(write)
                .with_pcie_msi_on_done(dma_config.use_msi_for_dma)
                .with_pcie_write_on_done(!dma_config.use_msi_for_dma)
                .with_trigger(true),
            repeat: 1 | (((host_phys_addr_hi != 0) as u32) << 31),
        };

        let complete_flag = completion_flag_buffer.buffer.as_ptr() as *mut u32;
        unsafe { complete_flag.write_volatile(0) };

        if dma_config.support_64_bit_dma {
            self.write32(dma_config.dma_host_phys_addr_high, host_phys_addr_hi)?;
        }

        let request_words = unsafe {
            std::slice::from_raw_parts(
                &req as *const _ as *const u8,
                std::mem::size_of::<kmdif::ArcPcieCtrlDmaRequest>(),
            )
        };
        self.write_block_no_dma(dma_config.csm_pcie_ctrl_dma_request_offset, request_words)?;

        // IRQ0 on ARC core 0 kicks the engine.
        self.write32(dma_config.arc_misc_cntl_addr, 1 << 16)?;

        let start = std::time::Instant::now();
        loop {
            if unsafe { complete_flag.read_volatile() } == DMA_COMPLETION_VALUE {
                break;
            }
            if start.elapsed() > DMA_TIMEOUT {
                return Err(PciError::BrokenConnection);
            }
            std::hint::spin_loop();
        }

        Ok(())
    }

    pub fn dma_write_block(&mut self, addr: u32, data: &[u8]) -> Result<(), PciError> {
        let mut num_bytes = data.len();
        let mut offset = 0;
        while num_bytes > 0 {
            let buffer = self.transfer_buffer.as_mut().unwrap();
            let chunk_size = num_bytes.min(buffer.size as usize);
            buffer.buffer[..chunk_size].copy_from_slice(&data[offset..(offset + chunk_size)]);

            let buffer_addr = buffer.physical_address;
            self.pcie_dma_transfer_turbo(addr + offset as u32, buffer_addr, chunk_size as u32, true)?;

            num_bytes -= chunk_size;
            offset += chunk_size;
        }

        Ok(())
    }

    pub fn dma_read_block(&mut self, addr: u32, data: &mut [u8]) -> Result<(), PciError> {
        let mut num_bytes = data.len();
        let mut offset = 0;
        while num_bytes > 0 {
            let buffer = self.transfer_buffer.as_ref().unwrap();
            let chunk_size = num_bytes.min(buffer.size as usize);
            let buffer_addr = buffer.physical_address;

            self.pcie_dma_transfer_turbo(addr + offset as u32, buffer_addr, chunk_size as u32, false)?;

            let buffer = self.transfer_buffer.as_ref().unwrap();
            data[offset..(offset + chunk_size)].copy_from_slice(&buffer.buffer[..chunk_size]);

            num_bytes -= chunk_size;
            offset += chunk_size;
        }

        Ok(())
    }
}
