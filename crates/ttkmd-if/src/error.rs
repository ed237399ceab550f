// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PciOpenError {
    #[error("Failed to open device /dev/tenstorrent/{id}: {source}")]
    DeviceOpenFailed { id: usize, source: std::io::Error },

    #[error("Failed to recognize id for device /dev/tenstorrent/{pci_id}: {device_id:x}")]
    UnrecognizedDeviceId { pci_id: usize, device_id: u16 },

    #[error("ioctl {name} failed for device {id} with: {source}")]
    IoctlError {
        name: String,
        id: usize,
        source: nix::Error,
    },

    #[error("Failed to map {name} from device {id}")]
    BarMappingError { name: String, id: usize },
}

#[derive(Error, Debug)]
pub enum CfgFailType {
    #[error("Nix error: {0}")]
    Nix(#[from] nix::Error),

    #[error("Size mismatch: transferred {0} bytes")]
    SizeMismatch(usize),
}

#[derive(Error, Debug)]
pub enum PciError {
    #[error("Read 0xffffffff from a known-live register: the device is hung")]
    BrokenConnection,

    #[error("During PciDevice initialization the PCI bar could not be mapped")]
    BarUnmapped,

    #[error("Ioctl failed with {0}")]
    IoctlError(Errno),

    #[error("DMA buffer mapping failed for device {id} with error {source}")]
    DmaBufferMappingFailed { id: usize, source: std::io::Error },

    #[error("DMA buffer allocation on device {id} failed ({size} bytes) with error {err}")]
    DmaAllocationFailed { id: usize, size: u32, err: Errno },

    #[error("DMA for device {id} is not configured")]
    DmaNotConfigured { id: usize },

    #[error("On device {id} tried to transfer {size} bytes, but DMA only allows a max of 28 bits")]
    DmaTooLarge { id: usize, size: usize },

    #[error("Hugepage allocation on device {id} failed ({size} bytes) with error {err}")]
    HugepageAllocationFailed { id: usize, size: u64, err: Errno },

    #[error("Hugepage mapping failed for device {id} with error {source}")]
    HugepageMappingFailed { id: usize, source: std::io::Error },

    #[error("Failed to reserve a tlb window for NOC IO; {0}")]
    TlbAllocationError(String),

    #[error("Warm reset is not supported by the kernel driver for device {id}")]
    WarmResetUnsupported { id: usize },

    #[error("Failed to read from device {id} config space[offset: {offset}, size: {size}]; Failed with {source}")]
    CfgReadFailed {
        id: usize,
        offset: usize,
        size: usize,

        source: CfgFailType,
    },

    #[error("{0}")]
    DeviceOpenError(#[from] PciOpenError),
}
