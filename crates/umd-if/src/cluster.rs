// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! The public handle over every reachable chip.
//!
//! Chips live in an id-indexed map; local chips are built before remote ones
//! so a remote chip can anchor its tunnel on an already-opened MMIO peer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use umd_core::Arch;

use crate::{
    arc::PowerState,
    arch,
    chip::{Chip, LocalChip, RemoteChip},
    cluster_descriptor::{ChipId, ClusterDescriptor},
    coords::{CoordSystem, CoreCoord, CoreType},
    error::PlatformError,
    harvesting::HarvestingMasks,
    lock_manager::{LockManager, MutexKind},
    soc_descriptor::SocDescriptor,
    tensix,
    topology,
    tt_device::TTDevice,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipType {
    Silicon,
    Mock,
    Simulation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoDeviceType {
    Pcie,
    Jtag,
}

/// Construction options; the field set is exhaustive.
pub struct ClusterOptions {
    /// Logical chip ids to open; empty means every discovered chip.
    pub target_devices: BTreeSet<ChipId>,
    pub num_host_mem_ch_per_mmio_device: u32,
    pub simulated_harvesting_masks: Option<HarvestingMasks>,
    pub simulated_harvesting_masks_per_chip: BTreeMap<ChipId, HarvestingMasks>,
    pub chip_type: ChipType,
    pub sdesc_path: Option<PathBuf>,
    pub io_device_type: IoDeviceType,
    /// When false the driver behaves as if every chip were unharvested.
    pub perform_harvesting: bool,
    /// Bypass live discovery with a pre-built descriptor.
    pub cluster_descriptor: Option<ClusterDescriptor>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            target_devices: BTreeSet::new(),
            num_host_mem_ch_per_mmio_device: 1,
            simulated_harvesting_masks: None,
            simulated_harvesting_masks_per_chip: BTreeMap::new(),
            chip_type: ChipType::Silicon,
            sdesc_path: None,
            io_device_type: IoDeviceType::Pcie,
            perform_harvesting: true,
            cluster_descriptor: None,
        }
    }
}

pub type BroadcastHeaders = HashMap<ChipId, Vec<[u32; 8]>>;

/// Build the per-MMIO-group broadcast headers for one exclusion set, without
/// the grid-exclusion word (the caller stamps that per call).
///
/// Grouping follows the fabric: shelf 0 / rack 0 chips are reached through
/// their own closest MMIO peer, every other shelf of a galaxy is fully
/// connected and rides through the first MMIO chip. Chips whose rack/shelf
/// masks agree collapse into one header with a merged chip-id mask.
pub fn compute_ethernet_broadcast_headers(
    descriptor: &ClusterDescriptor,
    chips_to_exclude: &BTreeSet<ChipId>,
) -> BroadcastHeaders {
    let first_mmio_chip = *descriptor
        .chips_with_mmio
        .keys()
        .next()
        .expect("a cluster always has one MMIO chip");

    let mut masks_per_group: HashMap<ChipId, HashMap<u32, [u32; 8]>> = HashMap::new();
    for chip in descriptor.all_chips.iter() {
        if chips_to_exclude.contains(chip) {
            continue;
        }

        let location = descriptor.chip_locations[chip];
        let physical_chip_id = descriptor.get_shelf_local_physical_chip_id(*chip);
        let rack_word = (location.rack >> 2) as usize;
        let rack_byte = (location.rack % 4) as u32;

        let closest_mmio = if location.rack == 0 && location.shelf == 0 {
            descriptor
                .get_closest_mmio_chip(*chip)
                .unwrap_or(first_mmio_chip)
        } else {
            first_mmio_chip
        };

        let entry = masks_per_group
            .entry(closest_mmio)
            .or_default()
            .entry(physical_chip_id)
            .or_insert([0u32; 8]);
        entry[rack_word] |= (1u32 << location.shelf) << (rack_byte * 8);
        entry[3] |= 1 << physical_chip_id;
    }

    let mut headers: BroadcastHeaders = HashMap::new();
    for (mmio_chip, masks) in masks_per_group.into_iter() {
        let mut merged: BTreeMap<[u32; 3], [u32; 8]> = BTreeMap::new();
        for (_, mask) in masks.into_iter() {
            let key = [mask[0], mask[1], mask[2]];
            let slot = merged.entry(key).or_insert(mask);
            slot[3] |= mask[3];
        }

        let group = headers.entry(mmio_chip).or_default();
        for (_, mut header) in merged.into_iter() {
            // Firmware convention: the selector words travel inverted.
            for word in header.iter_mut().take(4) {
                *word = !*word;
            }
            group.push(header);
        }
    }

    headers
}

pub struct Cluster {
    arch: Arch,
    chips: BTreeMap<ChipId, Chip>,
    descriptor: ClusterDescriptor,

    use_ethernet_broadcast: bool,
    use_translated_coords_for_broadcast: bool,

    bcast_header_cache: Mutex<HashMap<Vec<ChipId>, BroadcastHeaders>>,
}

impl Cluster {
    pub fn open(mut options: ClusterOptions) -> Result<Self, PlatformError> {
        match options.chip_type {
            ChipType::Silicon => {}
            other => {
                return Err(PlatformError::UnsupportedOperation(format!(
                    "{other:?} chips are provided by an external backend"
                )));
            }
        }
        if options.io_device_type == IoDeviceType::Jtag {
            return Err(PlatformError::UnsupportedOperation(
                "the JTAG transport backend is not built into this driver".to_string(),
            ));
        }

        // Open and initialize every endpoint the kernel driver exposes.
        let mut devices: BTreeMap<usize, Arc<TTDevice>> = BTreeMap::new();
        for pci_index in ttkmd_if::PciDevice::scan() {
            let mut device = TTDevice::open(pci_index)?;
            device.init_tt_device()?;
            devices.insert(pci_index, Arc::new(device));
        }

        let descriptor = match options.cluster_descriptor.take() {
            Some(descriptor) => descriptor,
            None => topology::discover_cluster(&devices)?,
        };

        let target_chips: BTreeSet<ChipId> = if options.target_devices.is_empty() {
            descriptor.all_chips.clone()
        } else {
            options.target_devices.clone()
        };

        for chip in target_chips.iter() {
            if !descriptor.all_chips.contains(chip) {
                return Err(PlatformError::TopologyError(format!(
                    "target chip {chip} was not discovered"
                )));
            }
            let peer = descriptor.get_closest_mmio_chip(*chip)?;
            if !target_chips.contains(&peer) {
                return Err(PlatformError::TopologyError(format!(
                    "target chip {chip} needs MMIO peer {peer} which is not in the target set"
                )));
            }
        }

        let arch = descriptor
            .chip_arch
            .values()
            .next()
            .copied()
            .unwrap_or(Arch::WormholeB0);

        let mut cluster = Self {
            arch,
            chips: BTreeMap::new(),
            descriptor,
            use_ethernet_broadcast: false,
            use_translated_coords_for_broadcast: false,
            bcast_header_cache: Mutex::new(HashMap::new()),
        };

        // Local chips first; remote construction borrows their devices.
        for chip_id in target_chips.iter() {
            if !cluster.descriptor.is_chip_mmio_capable(*chip_id) {
                continue;
            }

            let pci_index = cluster.descriptor.chips_with_mmio[chip_id];
            let device = devices.remove(&pci_index).ok_or_else(|| {
                PlatformError::TopologyError(format!(
                    "descriptor names PCI device {pci_index} which is not present"
                ))
            })?;

            LockManager::initialize_for_device(pci_index)?;
            LockManager::get(
                MutexKind::Tlb(arch::cached_tlb_index(device.arch)),
                pci_index,
            )?;

            let soc = cluster.build_soc_descriptor(&options, *chip_id, device.arch)?;
            let location = cluster.descriptor.chip_locations[chip_id];

            let chip = LocalChip::new(
                device,
                soc,
                location,
                options.num_host_mem_ch_per_mmio_device,
            )?;
            cluster.chips.insert(*chip_id, Chip::Local(chip));
        }

        for chip_id in target_chips.iter() {
            if cluster.descriptor.is_chip_mmio_capable(*chip_id) {
                continue;
            }

            let peer = cluster.descriptor.get_closest_mmio_chip(*chip_id)?;
            let peer_chip = cluster
                .chips
                .get(&peer)
                .and_then(|c| c.as_local())
                .ok_or_else(|| {
                    PlatformError::TopologyError(format!(
                        "remote chip {chip_id} has no constructed MMIO peer"
                    ))
                })?;

            let location = cluster.descriptor.chip_locations[chip_id];
            let remote_comm = peer_chip.remote_communication(location)?.ok_or_else(|| {
                PlatformError::UnsupportedOperation(
                    "remote chips are not supported on this generation".to_string(),
                )
            })?;

            let remote_arch = cluster.descriptor.get_arch(*chip_id).unwrap();
            let soc = cluster.build_soc_descriptor(&options, *chip_id, remote_arch)?;

            cluster.chips.insert(
                *chip_id,
                Chip::Remote(RemoteChip::new(soc, remote_comm, peer)),
            );
        }

        // Firmware decides whether ERISC broadcast is usable at all.
        if arch.is_wormhole() {
            if let Some(local) = cluster
                .chips
                .values()
                .find_map(|c| c.as_local())
            {
                let fw = local.tt_device().firmware_info()?;
                cluster.use_ethernet_broadcast = fw.eth_broadcast_supported();
                cluster.use_translated_coords_for_broadcast =
                    fw.translated_broadcast_headers_supported()
                        && cluster
                            .descriptor
                            .chip_info
                            .values()
                            .all(|info| info.noc_translation_enabled);
            }
        }

        Ok(cluster)
    }

    fn build_soc_descriptor(
        &self,
        options: &ClusterOptions,
        chip_id: ChipId,
        chip_arch: Arch,
    ) -> Result<SocDescriptor, PlatformError> {
        if let Some(path) = &options.sdesc_path {
            return SocDescriptor::from_yaml_file(path);
        }

        let info = &self.descriptor.chip_info[&chip_id];

        let mut harvesting = if options.perform_harvesting {
            info.harvesting_masks
        } else {
            HarvestingMasks::default()
        };

        if let Some(simulated) = options
            .simulated_harvesting_masks_per_chip
            .get(&chip_id)
            .or(options.simulated_harvesting_masks.as_ref())
        {
            harvesting.tensix |= simulated.tensix;
            harvesting.dram |= simulated.dram;
            harvesting.eth |= simulated.eth;
            harvesting.pcie |= simulated.pcie;
            harvesting.l2cpu |= simulated.l2cpu;
        }

        SocDescriptor::from_arch(
            chip_arch,
            info.noc_translation_enabled,
            harvesting,
            info.board_type,
        )
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn cluster_descriptor(&self) -> &ClusterDescriptor {
        &self.descriptor
    }

    pub fn chip_ids(&self) -> Vec<ChipId> {
        self.chips.keys().copied().collect()
    }

    pub fn get_chip(&self, chip: ChipId) -> Result<&Chip, PlatformError> {
        self.chips.get(&chip).ok_or_else(|| {
            PlatformError::TopologyError(format!("chip {chip} is not part of this cluster"))
        })
    }

    pub fn get_local_chip(&self, chip: ChipId) -> Result<&LocalChip, PlatformError> {
        self.get_chip(chip)?.as_local().ok_or_else(|| {
            PlatformError::UnsupportedOperation(format!("chip {chip} has no MMIO endpoint"))
        })
    }

    pub fn get_soc_descriptor(&self, chip: ChipId) -> Result<&SocDescriptor, PlatformError> {
        Ok(self.get_chip(chip)?.soc_descriptor())
    }

    pub fn read_from_device(
        &self,
        chip: ChipId,
        core: CoreCoord,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        self.get_chip(chip)?.read_from_device(core, addr, data)
    }

    pub fn write_to_device(
        &self,
        chip: ChipId,
        core: CoreCoord,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        self.get_chip(chip)?.write_to_device(core, addr, data)
    }

    pub fn dma_read_from_device(
        &self,
        chip: ChipId,
        core: CoreCoord,
        addr: u64,
        data: &mut [u8],
    ) -> Result<(), PlatformError> {
        match self.get_chip(chip)? {
            Chip::Local(local) => local.dma_read_from_device(core, addr, data),
            Chip::Remote(remote) => remote.dma_read_from_device(core, addr, data),
        }
    }

    pub fn dma_write_to_device(
        &self,
        chip: ChipId,
        core: CoreCoord,
        addr: u64,
        data: &[u8],
    ) -> Result<(), PlatformError> {
        match self.get_chip(chip)? {
            Chip::Local(local) => local.dma_write_to_device(core, addr, data),
            Chip::Remote(remote) => remote.dma_write_to_device(core, addr, data),
        }
    }

    pub fn write_to_sysmem(
        &self,
        chip: ChipId,
        channel: u16,
        data: &[u8],
        offset: u64,
    ) -> Result<(), PlatformError> {
        self.get_local_chip(chip)?.write_to_sysmem(channel, data, offset)
    }

    pub fn read_from_sysmem(
        &self,
        chip: ChipId,
        channel: u16,
        data: &mut [u8],
        offset: u64,
    ) -> Result<(), PlatformError> {
        self.get_local_chip(chip)?.read_from_sysmem(channel, data, offset)
    }

    pub fn l1_membar(&self, chip: ChipId, cores: &[CoreCoord]) -> Result<(), PlatformError> {
        self.get_chip(chip)?.l1_membar(cores)
    }

    pub fn dram_membar(&self, chip: ChipId, channels: &[u32]) -> Result<(), PlatformError> {
        self.get_chip(chip)?.dram_membar(channels)
    }

    pub fn wait_for_non_mmio_flush(&self) -> Result<(), PlatformError> {
        for chip in self.chips.values() {
            chip.wait_for_non_mmio_flush()?;
        }
        Ok(())
    }

    pub fn get_clock(&self, chip: ChipId) -> Result<u32, PlatformError> {
        self.get_local_chip(chip)?.get_clock()
    }

    /// Generate the per-MMIO-group broadcast headers for one exclusion set.
    ///
    /// Header layout: words 0..=2 are the rack/shelf mask (bit `shelf` of
    /// byte `rack % 4` in word `rack / 4`), word 3 the shelf-local chip-id
    /// mask; all four are inverted per the firmware convention. Word 4
    /// carries the row excludes in its low half and the column excludes in
    /// its high half.
    fn get_ethernet_broadcast_headers(
        &self,
        chips_to_exclude: &BTreeSet<ChipId>,
        rows_to_exclude: &BTreeSet<u32>,
        cols_to_exclude: &BTreeSet<u32>,
    ) -> BroadcastHeaders {
        let cache_key: Vec<ChipId> = chips_to_exclude.iter().copied().collect();

        let mut exclusion_word = 0u32;
        for row in rows_to_exclude.iter() {
            exclusion_word |= 1 << row;
        }
        for col in cols_to_exclude.iter() {
            exclusion_word |= 1 << (col + 16);
        }

        if let Some(cached) = self.bcast_header_cache.lock().unwrap().get(&cache_key) {
            let mut headers = cached.clone();
            for group in headers.values_mut() {
                for header in group.iter_mut() {
                    header[4] = exclusion_word;
                }
            }
            return headers;
        }

        let headers = compute_ethernet_broadcast_headers(&self.descriptor, chips_to_exclude);

        self.bcast_header_cache
            .lock()
            .unwrap()
            .insert(cache_key, headers.clone());

        let mut headers = headers;
        for group in headers.values_mut() {
            for header in group.iter_mut() {
                header[4] = exclusion_word;
            }
        }
        headers
    }

    fn ethernet_broadcast_write(
        &self,
        data: &[u8],
        addr: u64,
        chips_to_exclude: &BTreeSet<ChipId>,
        rows_to_exclude: &BTreeSet<u32>,
        cols_to_exclude: &BTreeSet<u32>,
    ) -> Result<(), PlatformError> {
        if self.use_ethernet_broadcast {
            let headers =
                self.get_ethernet_broadcast_headers(chips_to_exclude, rows_to_exclude, cols_to_exclude);

            for (mmio_chip, group_headers) in headers.iter() {
                let local = self.get_local_chip(*mmio_chip)?;
                let broadcaster = local
                    .remote_communication(local.eth_coord())?
                    .ok_or_else(|| {
                        PlatformError::UnsupportedOperation(
                            "ethernet broadcast needs routing firmware".to_string(),
                        )
                    })?;

                for header in group_headers.iter() {
                    broadcaster.write_to_non_mmio(
                        crate::coords::XyPair::new(0, 0),
                        addr,
                        data,
                        Some(header),
                        crate::chip::REMOTE_IO_TIMEOUT,
                    )?;
                }
            }

            return Ok(());
        }

        // Fan-out fallback: per-chip, per-core writes honoring the grid
        // exclusions in NOC0 space.
        for (chip_id, chip) in self.chips.iter() {
            if chips_to_exclude.contains(chip_id) {
                continue;
            }

            let soc = chip.soc_descriptor();
            for core_type in [CoreType::Tensix, CoreType::Eth, CoreType::Dram] {
                for core in soc.get_cores(core_type, CoordSystem::Noc0) {
                    if rows_to_exclude.contains(&(core.y as u32))
                        || cols_to_exclude.contains(&(core.x as u32))
                    {
                        continue;
                    }
                    chip.write_to_device(core, addr, data)?;
                }
            }
        }

        Ok(())
    }

    /// Cluster-wide broadcast write.
    ///
    /// Tensix/eth and DRAM cannot ride in one routing packet, so broadcasts
    /// touching the DRAM columns are split into per-column legs.
    pub fn broadcast_write_to_cluster(
        &self,
        data: &[u8],
        addr: u64,
        chips_to_exclude: &BTreeSet<ChipId>,
        rows_to_exclude: &BTreeSet<u32>,
        cols_to_exclude: &BTreeSet<u32>,
    ) -> Result<(), PlatformError> {
        // DRAM columns per generation.
        let (dram_col_a, dram_col_b) = if self.arch.is_blackhole() {
            (0u32, 9u32)
        } else {
            (0u32, 5u32)
        };

        if !cols_to_exclude.contains(&dram_col_a) || !cols_to_exclude.contains(&dram_col_b) {
            let tensix_in_broadcast = arch::tensix_x_locations(self.arch)
                .iter()
                .any(|col| !cols_to_exclude.contains(&(*col as u32)));
            if tensix_in_broadcast {
                return Err(PlatformError::UnsupportedOperation(
                    "cannot broadcast to tensix/eth and DRAM simultaneously".to_string(),
                ));
            }

            if !cols_to_exclude.contains(&dram_col_a) {
                let mut cols = cols_to_exclude.clone();
                cols.insert(dram_col_b);
                let mut rows = rows_to_exclude.clone();
                if self.arch.is_wormhole() {
                    // Writing the PCIe/ARC/router rows in column zero is
                    // unsafe; the firmware does not filter them.
                    for row in [2u32, 3, 4, 8, 9, 10] {
                        rows.insert(row);
                    }
                }
                self.ethernet_broadcast_write(data, addr, chips_to_exclude, &rows, &cols)?;
            }
            if !cols_to_exclude.contains(&dram_col_b) {
                let mut cols = cols_to_exclude.clone();
                cols.insert(dram_col_a);
                self.ethernet_broadcast_write(
                    data,
                    addr,
                    chips_to_exclude,
                    rows_to_exclude,
                    &cols,
                )?;
            }

            return Ok(());
        }

        if !self.use_translated_coords_for_broadcast {
            // Old firmware routes broadcast grids in NOC0; a partial tensix
            // grid would hit harvested rows.
            let full_grid = self.chips.values().all(|chip| {
                chip.soc_descriptor().harvesting.tensix == 0
            });
            if !full_grid && !rows_to_exclude.is_empty() {
                return Err(PlatformError::UnsupportedOperation(
                    "partial tensix broadcast needs translated-coordinate firmware".to_string(),
                ));
            }
        }

        self.ethernet_broadcast_write(
            data,
            addr,
            chips_to_exclude,
            rows_to_exclude,
            cols_to_exclude,
        )
    }

    fn broadcast_tensix_risc_reset(&self, reset_bits: u32) -> Result<(), PlatformError> {
        let chips_to_exclude = BTreeSet::new();
        let mut rows_to_exclude = BTreeSet::new();
        let mut cols_to_exclude = BTreeSet::new();

        // Constrain the broadcast to the tensix grid.
        let grid = arch::grid_size(self.arch);
        let tensix_cols: Vec<u8> = arch::tensix_x_locations(self.arch).to_vec();
        let tensix_rows: Vec<u8> = arch::tensix_y_locations(self.arch).to_vec();
        for col in 0..grid.x {
            if !tensix_cols.contains(&col) {
                cols_to_exclude.insert(col as u32);
            }
        }
        for row in 0..grid.y {
            if !tensix_rows.contains(&row) {
                rows_to_exclude.insert(row as u32);
            }
        }

        if self.use_ethernet_broadcast {
            match self.broadcast_write_to_cluster(
                &reset_bits.to_le_bytes(),
                arch::tensix_soft_reset_addr(self.arch),
                &chips_to_exclude,
                &rows_to_exclude,
                &cols_to_exclude,
            ) {
                Ok(()) => return Ok(()),
                // Firmware too old for this grid shape; write one by one.
                Err(PlatformError::UnsupportedOperation(_)) => {}
                Err(err) => return Err(err),
            }
        }

        for chip in self.chips.values() {
            match reset_bits {
                tensix::TENSIX_ASSERT_SOFT_RESET => chip.assert_risc_resets()?,
                _ => chip.deassert_risc_resets(
                    reset_bits & tensix::SOFT_RESET_STAGGERED_START != 0,
                )?,
            }
        }
        Ok(())
    }

    pub fn assert_risc_reset(&self) -> Result<(), PlatformError> {
        self.broadcast_tensix_risc_reset(tensix::TENSIX_ASSERT_SOFT_RESET)
    }

    pub fn deassert_risc_reset(&self, staggered_start: bool) -> Result<(), PlatformError> {
        let mut bits = tensix::TENSIX_DEASSERT_SOFT_RESET;
        if staggered_start {
            bits |= tensix::SOFT_RESET_STAGGERED_START;
        }
        self.broadcast_tensix_risc_reset(bits)
    }

    pub fn set_power_state(&self, state: PowerState) -> Result<(), PlatformError> {
        for chip in self.chips.values() {
            if let Chip::Local(local) = chip {
                local.set_power_state(state)?;
            }
        }
        Ok(())
    }

    /// Bring the cluster into a runnable state: everything held in reset,
    /// then the ARC cores told to clock up.
    pub fn start_device(&self) -> Result<(), PlatformError> {
        self.assert_risc_reset()?;
        self.set_power_state(PowerState::Busy)?;
        Ok(())
    }

    /// Quiesce: remote chips first so their tunnels still have a live peer.
    pub fn close_device(&self) -> Result<(), PlatformError> {
        for chip in self.chips.values() {
            if let Chip::Remote(remote) = chip {
                remote.close_device()?;
            }
        }

        for chip in self.chips.values() {
            if let Chip::Local(local) = chip {
                local.set_power_state(PowerState::LongIdle)?;
                for core in local
                    .soc_descriptor()
                    .get_cores(CoreType::Tensix, CoordSystem::Translated)
                {
                    local.write_to_device(
                        core,
                        arch::tensix_soft_reset_addr(self.arch),
                        &tensix::TENSIX_ASSERT_SOFT_RESET.to_le_bytes(),
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn trigger_warm_reset(&self, chip: ChipId) -> Result<(), PlatformError> {
        self.get_local_chip(chip)?.tt_device().trigger_warm_reset()
    }
}
