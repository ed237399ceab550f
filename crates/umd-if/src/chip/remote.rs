// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    chip::REMOTE_IO_TIMEOUT,
    cluster_descriptor::ChipId,
    coords::{CoordSystem, CoreCoord, XyPair},
    error::PlatformError,
    remote::RemoteCommunication,
    soc_descriptor::SocDescriptor,
};

/// A chip reachable only through an MMIO peer's ethernet tunnel.
///
/// Holds its peer by id; the actual device handle lives inside the owned
/// [`RemoteCommunication`].
pub struct RemoteChip {
    soc_descriptor: SocDescriptor,
    remote: RemoteCommunication,
    local_peer: ChipId,
}

impl RemoteChip {
    pub fn new(
        soc_descriptor: SocDescriptor,
        remote: RemoteCommunication,
        local_peer: ChipId,
    ) -> Self {
        Self {
            soc_descriptor,
            remote,
            local_peer,
        }
    }

    pub fn soc_descriptor(&self) -> &SocDescriptor {
        &self.soc_descriptor
    }

    pub fn local_peer(&self) -> ChipId {
        self.local_peer
    }

    pub fn remote_communication(&self) -> &RemoteCommunication {
        &self.remote
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
        self.remote.read_non_mmio(core, addr, data, REMOTE_IO_TIMEOUT)
    }

    pub fn write_to_device(
        &self,
        core: CoreCoord,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        let core = self.translated(core)?;
        self.remote
            .write_to_non_mmio(core, addr, data, None, REMOTE_IO_TIMEOUT)
    }

    pub fn dma_read_from_device(
        &self,
        _core: CoreCoord,
        _addr: u64,
        _data: &mut [u8],
    ) -> Result<(), PlatformError> {
        Err(PlatformError::UnsupportedOperation(
            "DMA is not available on a remote chip".to_string(),
        ))
    }

    pub fn dma_write_to_device(
        &self,
        _core: CoreCoord,
        _addr: u64,
        _data: &[u8],
    ) -> Result<(), PlatformError> {
        Err(PlatformError::UnsupportedOperation(
            "DMA is not available on a remote chip".to_string(),
        ))
    }

    pub fn wait_for_non_mmio_flush(&self) -> Result<(), PlatformError> {
        self.remote.wait_for_non_mmio_flush(REMOTE_IO_TIMEOUT)
    }

    /// Quiesce the chip while its MMIO peer is still alive: drain the
    /// tunnel, then hold every tensix risc in reset.
    pub fn close_device(&self) -> Result<(), PlatformError> {
        self.wait_for_non_mmio_flush()?;

        let reset_addr = crate::arch::tensix_soft_reset_addr(self.soc_descriptor.arch);
        for core in self
            .soc_descriptor
            .get_cores(crate::coords::CoreType::Tensix, CoordSystem::Translated)
        {
            self.write_to_device(
                core,
                reset_addr,
                &crate::tensix::TENSIX_ASSERT_SOFT_RESET.to_le_bytes(),
            )?;
        }

        self.wait_for_non_mmio_flush()
    }
}
