// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bijective translation between the four per-chip coordinate systems.
//!
//! Wormhole harvests tensix rows, blackhole harvests tensix columns. The
//! translated system renumbers the harvested axis so survivors occupy the
//! first grid positions; every other core type keeps its NOC0 position in
//! translated space.

use std::collections::HashMap;

use umd_core::Arch;

use crate::{
    arch,
    coords::{CoordSystem, CoreCoord, CoreType, XyPair},
    error::PlatformError,
    harvesting::HarvestingMasks,
};

pub struct CoordinateManager {
    arch: Arch,
    noc_translation_enabled: bool,
    harvesting: HarvestingMasks,

    tensix_x: Vec<u8>,
    tensix_y: Vec<u8>,

    dram_cores: Vec<Vec<XyPair>>,
    eth_cores: Vec<XyPair>,
    arc_cores: Vec<XyPair>,
    pcie_cores: Vec<XyPair>,
    router_only_cores: Vec<XyPair>,
    security_cores: Vec<XyPair>,
    l2cpu_cores: Vec<XyPair>,

    noc1_x: Vec<u8>,
    noc1_y: Vec<u8>,

    // noc0 position -> core type, for get_coord_at
    core_at: HashMap<XyPair, CoreType>,
}

impl CoordinateManager {
    pub fn new(
        arch: Arch,
        noc_translation_enabled: bool,
        harvesting: HarvestingMasks,
    ) -> Result<Self, PlatformError> {
        harvesting.validate(arch)?;

        Self::from_parts(
            arch,
            noc_translation_enabled,
            harvesting,
            arch::tensix_x_locations(arch).to_vec(),
            arch::tensix_y_locations(arch).to_vec(),
            arch::dram_locations(arch)
                .iter()
                .map(|chan| chan.to_vec())
                .collect(),
            arch::eth_locations(arch).to_vec(),
            vec![arch::arc_location(arch)],
            arch::pcie_locations(arch).to_vec(),
            arch::router_only_locations(arch).to_vec(),
            arch::security_locations(arch).to_vec(),
            arch::l2cpu_locations(arch).to_vec(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        arch: Arch,
        noc_translation_enabled: bool,
        harvesting: HarvestingMasks,
        tensix_x: Vec<u8>,
        tensix_y: Vec<u8>,
        dram_cores: Vec<Vec<XyPair>>,
        eth_cores: Vec<XyPair>,
        arc_cores: Vec<XyPair>,
        pcie_cores: Vec<XyPair>,
        router_only_cores: Vec<XyPair>,
        security_cores: Vec<XyPair>,
        l2cpu_cores: Vec<XyPair>,
    ) -> Result<Self, PlatformError> {
        let mut core_at = HashMap::new();
        for y in tensix_y.iter() {
            for x in tensix_x.iter() {
                core_at.insert(XyPair::new(*x, *y), CoreType::Tensix);
            }
        }
        for (cores, core_type) in [
            (&eth_cores, CoreType::Eth),
            (&arc_cores, CoreType::Arc),
            (&pcie_cores, CoreType::Pcie),
            (&router_only_cores, CoreType::RouterOnly),
            (&security_cores, CoreType::Security),
            (&l2cpu_cores, CoreType::L2Cpu),
        ] {
            for core in cores.iter() {
                core_at.insert(*core, core_type);
            }
        }
        for chan in dram_cores.iter() {
            for core in chan.iter() {
                core_at.insert(*core, CoreType::Dram);
            }
        }

        Ok(Self {
            arch,
            noc_translation_enabled,
            harvesting,
            tensix_x,
            tensix_y,
            dram_cores,
            eth_cores,
            arc_cores,
            pcie_cores,
            router_only_cores,
            security_cores,
            l2cpu_cores,
            noc1_x: arch::noc0_x_to_noc1_x(arch),
            noc1_y: arch::noc0_y_to_noc1_y(arch),
            core_at,
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn noc_translation_enabled(&self) -> bool {
        self.noc_translation_enabled
    }

    pub fn harvesting(&self) -> HarvestingMasks {
        self.harvesting
    }

    // The harvested axis of the tensix grid: rows on wormhole, columns on
    // blackhole.
    fn harvested_axis_locations(&self) -> Vec<u8> {
        let axis = if self.arch.is_blackhole() {
            &self.tensix_x
        } else {
            &self.tensix_y
        };

        axis.iter()
            .enumerate()
            .filter(|(i, _)| self.harvesting.tensix & (1 << i) != 0)
            .map(|(_, loc)| *loc)
            .collect()
    }

    fn surviving_axis_locations(&self) -> Vec<u8> {
        let axis = if self.arch.is_blackhole() {
            &self.tensix_x
        } else {
            &self.tensix_y
        };

        axis.iter()
            .enumerate()
            .filter(|(i, _)| self.harvesting.tensix & (1 << i) == 0)
            .map(|(_, loc)| *loc)
            .collect()
    }

    /// Map a NOC0 axis location to its translated counterpart: survivors are
    /// packed to the front of the axis location list, harvested entries to
    /// the back.
    fn translated_axis_map(&self) -> HashMap<u8, u8> {
        let axis: &Vec<u8> = if self.arch.is_blackhole() {
            &self.tensix_x
        } else {
            &self.tensix_y
        };

        let surviving = self.surviving_axis_locations();
        let harvested = self.harvested_axis_locations();

        let mut map = HashMap::new();
        for (i, loc) in surviving.iter().chain(harvested.iter()).enumerate() {
            map.insert(*loc, axis[i]);
        }
        map
    }

    pub fn is_tensix_location_harvested(&self, xy: XyPair) -> bool {
        let loc = if self.arch.is_blackhole() { xy.x } else { xy.y };
        self.harvested_axis_locations().contains(&loc)
    }

    fn missing(coord: CoreCoord) -> PlatformError {
        PlatformError::InvalidAddress {
            addr: ((coord.x as u64) << 8) | coord.y as u64,
            reason: format!("no {:?} core at {coord}", coord.core_type),
        }
    }

    /// Reduce any coordinate to its NOC0 position, validating existence.
    fn to_noc0(&self, coord: CoreCoord) -> Result<XyPair, PlatformError> {
        match coord.coord_system {
            CoordSystem::Noc0 => {
                let xy = coord.xy();
                if self.core_at.get(&xy) != Some(&coord.core_type) {
                    return Err(Self::missing(coord));
                }
                Ok(xy)
            }
            CoordSystem::Noc1 => {
                let x = self
                    .noc1_x
                    .iter()
                    .position(|v| *v == coord.x)
                    .ok_or_else(|| Self::missing(coord))? as u8;
                let y = self
                    .noc1_y
                    .iter()
                    .position(|v| *v == coord.y)
                    .ok_or_else(|| Self::missing(coord))? as u8;
                self.to_noc0(CoreCoord::new(x, y, coord.core_type, CoordSystem::Noc0))
            }
            CoordSystem::Translated => {
                if coord.core_type == CoreType::Tensix && self.noc_translation_enabled {
                    let map = self.translated_axis_map();
                    // Invert the axis renumbering.
                    let loc = if self.arch.is_blackhole() { coord.x } else { coord.y };
                    let noc0_loc = map
                        .iter()
                        .find(|(_, translated)| **translated == loc)
                        .map(|(noc0, _)| *noc0)
                        .ok_or_else(|| Self::missing(coord))?;

                    let (x, y) = if self.arch.is_blackhole() {
                        (noc0_loc, coord.y)
                    } else {
                        (coord.x, noc0_loc)
                    };
                    self.to_noc0(CoreCoord::new(x, y, coord.core_type, CoordSystem::Noc0))
                } else {
                    self.to_noc0(CoreCoord::new(
                        coord.x,
                        coord.y,
                        coord.core_type,
                        CoordSystem::Noc0,
                    ))
                }
            }
            CoordSystem::Logical => self.logical_to_noc0(coord),
        }
    }

    fn logical_to_noc0(&self, coord: CoreCoord) -> Result<XyPair, PlatformError> {
        match coord.core_type {
            CoreType::Tensix => {
                let (cols, rows): (Vec<u8>, Vec<u8>) = if self.arch.is_blackhole() {
                    (self.surviving_axis_locations(), self.tensix_y.clone())
                } else {
                    (self.tensix_x.clone(), self.surviving_axis_locations())
                };

                let x = *cols.get(coord.x as usize).ok_or_else(|| Self::missing(coord))?;
                let y = *rows.get(coord.y as usize).ok_or_else(|| Self::missing(coord))?;
                Ok(XyPair::new(x, y))
            }
            CoreType::Dram => {
                let surviving: Vec<usize> = (0..self.dram_cores.len())
                    .filter(|chan| self.harvesting.dram & (1 << chan) == 0)
                    .collect();
                let chan = *surviving
                    .get(coord.x as usize)
                    .ok_or_else(|| Self::missing(coord))?;
                self.dram_cores[chan]
                    .get(coord.y as usize)
                    .copied()
                    .ok_or_else(|| Self::missing(coord))
            }
            CoreType::Eth => {
                let surviving: Vec<usize> = (0..self.eth_cores.len())
                    .filter(|chan| self.harvesting.eth & (1 << chan) == 0)
                    .collect();
                if coord.y != 0 {
                    return Err(Self::missing(coord));
                }
                let chan = *surviving
                    .get(coord.x as usize)
                    .ok_or_else(|| Self::missing(coord))?;
                Ok(self.eth_cores[chan])
            }
            _ => {
                let cores = self.surviving_of_type(coord.core_type);
                if coord.y != 0 {
                    return Err(Self::missing(coord));
                }
                cores
                    .get(coord.x as usize)
                    .copied()
                    .ok_or_else(|| Self::missing(coord))
            }
        }
    }

    fn surviving_of_type(&self, core_type: CoreType) -> Vec<XyPair> {
        match core_type {
            CoreType::Tensix => {
                let harvested = self.harvested_axis_locations();
                let mut cores = Vec::new();
                for y in self.tensix_y.iter() {
                    for x in self.tensix_x.iter() {
                        let loc = if self.arch.is_blackhole() { *x } else { *y };
                        if !harvested.contains(&loc) {
                            cores.push(XyPair::new(*x, *y));
                        }
                    }
                }
                cores
            }
            CoreType::Dram => self
                .dram_cores
                .iter()
                .enumerate()
                .filter(|(chan, _)| self.harvesting.dram & (1 << chan) == 0)
                .flat_map(|(_, cores)| cores.iter().copied())
                .collect(),
            CoreType::Eth => self
                .eth_cores
                .iter()
                .enumerate()
                .filter(|(chan, _)| self.harvesting.eth & (1 << chan) == 0)
                .map(|(_, core)| *core)
                .collect(),
            CoreType::Pcie => self
                .pcie_cores
                .iter()
                .enumerate()
                .filter(|(i, _)| self.harvesting.pcie & (1 << i) == 0)
                .map(|(_, core)| *core)
                .collect(),
            CoreType::L2Cpu => self
                .l2cpu_cores
                .iter()
                .enumerate()
                .filter(|(i, _)| self.harvesting.l2cpu & (1 << i) == 0)
                .map(|(_, core)| *core)
                .collect(),
            CoreType::Arc => self.arc_cores.clone(),
            CoreType::RouterOnly => self.router_only_cores.clone(),
            CoreType::Security => self.security_cores.clone(),
        }
    }

    fn noc0_to(&self, xy: XyPair, core_type: CoreType, target: CoordSystem) -> Result<CoreCoord, PlatformError> {
        match target {
            CoordSystem::Noc0 => Ok(CoreCoord::new(xy.x, xy.y, core_type, CoordSystem::Noc0)),
            CoordSystem::Noc1 => Ok(CoreCoord::new(
                self.noc1_x[xy.x as usize],
                self.noc1_y[xy.y as usize],
                core_type,
                CoordSystem::Noc1,
            )),
            CoordSystem::Translated => {
                if core_type == CoreType::Tensix && self.noc_translation_enabled {
                    let map = self.translated_axis_map();
                    let (x, y) = if self.arch.is_blackhole() {
                        (map[&xy.x], xy.y)
                    } else {
                        (xy.x, map[&xy.y])
                    };
                    Ok(CoreCoord::new(x, y, core_type, CoordSystem::Translated))
                } else {
                    Ok(CoreCoord::new(xy.x, xy.y, core_type, CoordSystem::Translated))
                }
            }
            CoordSystem::Logical => self.noc0_to_logical(xy, core_type),
        }
    }

    fn noc0_to_logical(&self, xy: XyPair, core_type: CoreType) -> Result<CoreCoord, PlatformError> {
        let harvested_err = || {
            PlatformError::HarvestingInvalid(format!(
                "core ({}, {}) is harvested and has no logical coordinate",
                xy.x, xy.y
            ))
        };

        match core_type {
            CoreType::Tensix => {
                if self.is_tensix_location_harvested(xy) {
                    return Err(harvested_err());
                }

                let (cols, rows) = if self.arch.is_blackhole() {
                    (self.surviving_axis_locations(), self.tensix_y.clone())
                } else {
                    (self.tensix_x.clone(), self.surviving_axis_locations())
                };

                let x = cols.iter().position(|v| *v == xy.x).ok_or_else(harvested_err)? as u8;
                let y = rows.iter().position(|v| *v == xy.y).ok_or_else(harvested_err)? as u8;
                Ok(CoreCoord::new(x, y, core_type, CoordSystem::Logical))
            }
            CoreType::Dram => {
                let (chan, subcore) = self
                    .dram_cores
                    .iter()
                    .enumerate()
                    .find_map(|(chan, cores)| {
                        cores.iter().position(|c| *c == xy).map(|sub| (chan, sub))
                    })
                    .ok_or_else(harvested_err)?;

                if self.harvesting.dram & (1 << chan) != 0 {
                    return Err(harvested_err());
                }

                let logical_chan = (0..chan)
                    .filter(|c| self.harvesting.dram & (1 << c) == 0)
                    .count();
                Ok(CoreCoord::new(
                    logical_chan as u8,
                    subcore as u8,
                    core_type,
                    CoordSystem::Logical,
                ))
            }
            CoreType::Eth => {
                let chan = self
                    .eth_cores
                    .iter()
                    .position(|c| *c == xy)
                    .ok_or_else(harvested_err)?;
                if self.harvesting.eth & (1 << chan) != 0 {
                    return Err(harvested_err());
                }
                let logical_chan = (0..chan)
                    .filter(|c| self.harvesting.eth & (1 << c) == 0)
                    .count();
                Ok(CoreCoord::new(
                    logical_chan as u8,
                    0,
                    core_type,
                    CoordSystem::Logical,
                ))
            }
            _ => {
                let cores = self.surviving_of_type(core_type);
                let index = cores.iter().position(|c| *c == xy).ok_or_else(harvested_err)?;
                Ok(CoreCoord::new(index as u8, 0, core_type, CoordSystem::Logical))
            }
        }
    }

    /// Translate `coord` into `target`, failing for positions that do not
    /// exist and for harvested cores targeting `Logical`.
    pub fn translate(&self, coord: CoreCoord, target: CoordSystem) -> Result<CoreCoord, PlatformError> {
        let noc0 = self.to_noc0(coord)?;
        self.noc0_to(noc0, coord.core_type, target)
    }

    /// The core whose position in `system` equals `xy`.
    pub fn get_coord_at(&self, xy: XyPair, system: CoordSystem) -> Result<CoreCoord, PlatformError> {
        // Logical positions are ambiguous without a core type; resolve the
        // others through the NOC0 occupancy map.
        const ALL_TYPES: [CoreType; 8] = [
            CoreType::Tensix,
            CoreType::Dram,
            CoreType::Eth,
            CoreType::Arc,
            CoreType::Pcie,
            CoreType::RouterOnly,
            CoreType::Security,
            CoreType::L2Cpu,
        ];

        let noc0 = match system {
            CoordSystem::Noc0 | CoordSystem::Translated | CoordSystem::Noc1 => {
                let mut found = None;
                for core_type in ALL_TYPES {
                    let candidate = CoreCoord::new(xy.x, xy.y, core_type, system);
                    if let Ok(noc0) = self.to_noc0(candidate) {
                        found = Some((noc0, core_type));
                        break;
                    }
                }
                found
            }
            CoordSystem::Logical => None,
        };

        let (noc0, core_type) = noc0.ok_or(PlatformError::InvalidAddress {
            addr: ((xy.x as u64) << 8) | xy.y as u64,
            reason: format!("no core at ({}, {}) in {system:?}", xy.x, xy.y),
        })?;

        self.noc0_to(noc0, core_type, system)
    }

    /// Surviving cores of one type, in canonical (logical) order.
    pub fn get_cores(&self, core_type: CoreType, system: CoordSystem) -> Vec<CoreCoord> {
        self.surviving_of_type(core_type)
            .into_iter()
            .filter_map(|xy| self.noc0_to(xy, core_type, system).ok())
            .collect()
    }

    /// Harvested cores of one type in NOC0 coordinates.
    pub fn get_harvested_cores(&self, core_type: CoreType) -> Vec<CoreCoord> {
        match core_type {
            CoreType::Tensix => {
                let harvested = self.harvested_axis_locations();
                let mut cores = Vec::new();
                for y in self.tensix_y.iter() {
                    for x in self.tensix_x.iter() {
                        let loc = if self.arch.is_blackhole() { *x } else { *y };
                        if harvested.contains(&loc) {
                            cores.push(CoreCoord::new(*x, *y, core_type, CoordSystem::Noc0));
                        }
                    }
                }
                cores
            }
            CoreType::Dram => self
                .dram_cores
                .iter()
                .enumerate()
                .filter(|(chan, _)| self.harvesting.dram & (1 << chan) != 0)
                .flat_map(|(_, cores)| {
                    cores
                        .iter()
                        .map(|c| CoreCoord::new(c.x, c.y, core_type, CoordSystem::Noc0))
                })
                .collect(),
            CoreType::Eth => self
                .eth_cores
                .iter()
                .enumerate()
                .filter(|(chan, _)| self.harvesting.eth & (1 << chan) != 0)
                .map(|(_, c)| CoreCoord::new(c.x, c.y, core_type, CoordSystem::Noc0))
                .collect(),
            CoreType::Pcie => self
                .pcie_cores
                .iter()
                .enumerate()
                .filter(|(i, _)| self.harvesting.pcie & (1 << i) != 0)
                .map(|(_, c)| CoreCoord::new(c.x, c.y, core_type, CoordSystem::Noc0))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// All dram endpoints, outer index is the wired channel.
    pub fn dram_cores(&self) -> &[Vec<XyPair>] {
        &self.dram_cores
    }

    pub fn eth_cores(&self) -> &[XyPair] {
        &self.eth_cores
    }

    pub fn grid_size(&self, core_type: CoreType) -> XyPair {
        match core_type {
            CoreType::Tensix => {
                if self.arch.is_blackhole() {
                    XyPair::new(
                        self.surviving_axis_locations().len() as u8,
                        self.tensix_y.len() as u8,
                    )
                } else {
                    XyPair::new(
                        self.tensix_x.len() as u8,
                        self.surviving_axis_locations().len() as u8,
                    )
                }
            }
            CoreType::Dram => XyPair::new(
                self.dram_cores
                    .iter()
                    .enumerate()
                    .filter(|(chan, _)| self.harvesting.dram & (1 << chan) == 0)
                    .count() as u8,
                self.dram_cores.first().map(|c| c.len()).unwrap_or(0) as u8,
            ),
            other => XyPair::new(self.surviving_of_type(other).len() as u8, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(arch: Arch, tensix_mask: u32, translation: bool) -> CoordinateManager {
        CoordinateManager::new(
            arch,
            translation,
            HarvestingMasks {
                tensix: tensix_mask,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn identity_translation() {
        let cm = manager(Arch::WormholeB0, 0, true);
        let c = CoreCoord::new(1, 1, CoreType::Tensix, CoordSystem::Noc0);
        assert_eq!(cm.translate(c, CoordSystem::Noc0).unwrap(), c);
    }

    #[test]
    fn translated_equals_noc0_when_translation_disabled() {
        let cm = manager(Arch::WormholeB0, 0b11, false);
        for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
            let translated = cm.translate(core, CoordSystem::Translated).unwrap();
            assert_eq!((translated.x, translated.y), (core.x, core.y));
        }
    }

    #[test]
    fn wormhole_harvested_rows_move_to_the_end_of_translated_space() {
        // Harvest the first two logical rows (noc0 rows 1 and 2).
        let cm = manager(Arch::WormholeB0, 0b11, true);

        // A survivor on noc0 row 3 moves up to the first row location.
        let c = CoreCoord::new(1, 3, CoreType::Tensix, CoordSystem::Noc0);
        let translated = cm.translate(c, CoordSystem::Translated).unwrap();
        assert_eq!(translated.y, 1);
        assert_eq!(translated.x, 1);

        // And back.
        let back = cm.translate(translated, CoordSystem::Noc0).unwrap();
        assert_eq!((back.x, back.y), (1, 3));
    }

    #[test]
    fn logical_fails_for_harvested_cores() {
        let cm = manager(Arch::WormholeB0, 0b1, true);
        let harvested = CoreCoord::new(1, 1, CoreType::Tensix, CoordSystem::Noc0);
        assert!(matches!(
            cm.translate(harvested, CoordSystem::Logical),
            Err(PlatformError::HarvestingInvalid(_))
        ));
    }

    #[test]
    fn logical_grid_is_dense() {
        for mask in [0u32, 0b1, 0b101, 0b1100000000] {
            let cm = manager(Arch::WormholeB0, mask, true);
            let grid = cm.grid_size(CoreType::Tensix);
            assert_eq!(grid.y as u32, 10 - mask.count_ones());

            let cores = cm.get_cores(CoreType::Tensix, CoordSystem::Logical);
            assert_eq!(cores.len(), (grid.x as usize) * (grid.y as usize));
            for core in cores {
                assert!(core.x < grid.x && core.y < grid.y);
            }
        }
    }

    #[test]
    fn translation_composes_across_all_systems() {
        let systems = [CoordSystem::Noc0, CoordSystem::Noc1, CoordSystem::Translated];

        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            let cm = manager(arch, 0b101, true);
            for core in cm.get_cores(CoreType::Tensix, CoordSystem::Noc0) {
                for s1 in systems {
                    for s2 in systems {
                        let direct = cm.translate(core, s2).unwrap();
                        let via = cm
                            .translate(cm.translate(core, s1).unwrap(), s2)
                            .unwrap();
                        assert_eq!(direct, via, "{arch} {core} via {s1:?} to {s2:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn translation_is_injective_on_survivors() {
        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            let cm = manager(arch, 0b1010, true);
            for system in [CoordSystem::Noc1, CoordSystem::Translated, CoordSystem::Logical] {
                let cores = cm.get_cores(CoreType::Tensix, system);
                let mut seen = std::collections::HashSet::new();
                for core in cores {
                    assert!(seen.insert((core.x, core.y)), "{arch} {system:?} {core}");
                }
            }
        }
    }

    #[test]
    fn blackhole_harvests_columns() {
        let cm = manager(Arch::Blackhole, 0b1, true);
        // Logical x 0 now starts at noc0 column 2.
        let c = CoreCoord::new(0, 0, CoreType::Tensix, CoordSystem::Logical);
        let noc0 = cm.translate(c, CoordSystem::Noc0).unwrap();
        assert_eq!(noc0.x, 2);
        assert_eq!(noc0.y, 2);
    }

    #[test]
    fn noc1_is_the_grid_mirror() {
        let cm = manager(Arch::WormholeB0, 0, true);
        let c = CoreCoord::new(1, 1, CoreType::Tensix, CoordSystem::Noc0);
        let noc1 = cm.translate(c, CoordSystem::Noc1).unwrap();
        assert_eq!((noc1.x, noc1.y), (8, 10));

        let back = cm.translate(noc1, CoordSystem::Noc0).unwrap();
        assert_eq!((back.x, back.y), (1, 1));
    }

    #[test]
    fn dram_logical_skips_harvested_bank() {
        let cm = CoordinateManager::new(
            Arch::WormholeB0,
            true,
            HarvestingMasks {
                dram: 0b1,
                ..Default::default()
            },
        )
        .unwrap();

        // Logical channel 0 is wired channel 1.
        let c = CoreCoord::new(0, 0, CoreType::Dram, CoordSystem::Logical);
        let noc0 = cm.translate(c, CoordSystem::Noc0).unwrap();
        assert_eq!(noc0.xy(), XyPair::new(0, 5));

        // The harvested bank has no logical coordinate.
        let harvested = CoreCoord::new(0, 0, CoreType::Dram, CoordSystem::Noc0);
        assert!(cm.translate(harvested, CoordSystem::Logical).is_err());
    }

    #[test]
    fn get_coord_at_finds_cores_and_rejects_gaps() {
        let cm = manager(Arch::WormholeB0, 0, true);
        let found = cm.get_coord_at(XyPair::new(1, 1), CoordSystem::Noc0).unwrap();
        assert_eq!(found.core_type, CoreType::Tensix);

        let arc = cm.get_coord_at(XyPair::new(0, 10), CoordSystem::Noc0).unwrap();
        assert_eq!(arc.core_type, CoreType::Arc);

        // (0, 0) is dram on wormhole.
        let dram = cm.get_coord_at(XyPair::new(0, 0), CoordSystem::Noc0).unwrap();
        assert_eq!(dram.core_type, CoreType::Dram);
    }
}
