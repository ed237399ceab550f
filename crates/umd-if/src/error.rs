// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;

use thiserror::Error;

#[derive(Debug)]
pub struct BtWrapper(pub std::backtrace::Backtrace);

impl BtWrapper {
    #[inline(always)]
    pub fn capture() -> Self {
        Self(std::backtrace::Backtrace::capture())
    }
}

impl Display for BtWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let std::backtrace::BacktraceStatus::Captured = self.0.status() {
            self.0.fmt(f)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Device {id} is hung: a known-live register reads as the all-ones sentinel")]
    HardwareHung { id: usize },

    #[error("No free tlb window of size {size:#x}")]
    OutOfTlbs { size: u64 },

    #[error("ARC responded with status {0:#04x}")]
    ArcMessageFailed(u8),

    #[error("Invalid address {addr:#x}: {reason}")]
    InvalidAddress { addr: u64, reason: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Topology discovery failed: {0}")]
    TopologyError(String),

    #[error("Invalid harvesting specification: {0}")]
    HarvestingInvalid(String),

    #[error("Interprocess mutex recovery failed: {0}")]
    MutexOwnerDead(String),

    #[error(transparent)]
    IoError(ttkmd_if::PciError),

    #[error("{0}\n{1}")]
    Generic(String, BtWrapper),
}

impl From<ttkmd_if::PciError> for PlatformError {
    fn from(value: ttkmd_if::PciError) -> Self {
        match value {
            // The sentinel probe already confirmed the device is gone.
            ttkmd_if::PciError::BrokenConnection => PlatformError::HardwareHung { id: usize::MAX },
            other => PlatformError::IoError(other),
        }
    }
}

impl From<ttkmd_if::PciOpenError> for PlatformError {
    fn from(value: ttkmd_if::PciOpenError) -> Self {
        PlatformError::IoError(ttkmd_if::PciError::DeviceOpenError(value))
    }
}

impl From<String> for PlatformError {
    #[inline]
    fn from(e: String) -> Self {
        Self::Generic(e, BtWrapper::capture())
    }
}
