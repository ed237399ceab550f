// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use serde::{Deserialize, Serialize};
use umd_core::Arch;

use crate::{
    arch,
    cluster_descriptor::BoardType,
    coordinate_manager::CoordinateManager,
    coords::{CoordSystem, CoreCoord, CoreType, XyPair},
    error::PlatformError,
    harvesting::HarvestingMasks,
};

/// Immutable per-chip bundle: the full core layout, the harvested subset and
/// the coordinate manager derived from both.
pub struct SocDescriptor {
    pub arch: Arch,
    pub noc_translation_enabled: bool,
    pub harvesting: HarvestingMasks,
    pub board_type: BoardType,

    pub worker_l1_size: u64,
    pub eth_l1_size: u64,
    pub dram_bank_size: u64,

    grid: XyPair,
    coordinate_manager: CoordinateManager,
}

impl SocDescriptor {
    /// Build from the per-arch constants table.
    pub fn from_arch(
        arch: Arch,
        noc_translation_enabled: bool,
        harvesting: HarvestingMasks,
        board_type: BoardType,
    ) -> Result<Self, PlatformError> {
        harvesting.validate(arch)?;
        harvesting.validate_pcie_for_board(arch, board_type)?;

        let mut pcie: Vec<XyPair> = arch::pcie_locations(arch).to_vec();
        let mut router_only: Vec<XyPair> = arch::router_only_locations(arch).to_vec();

        // Boards wire two PCIe endpoints but use one; the spare routes only.
        if arch.is_blackhole() && pcie.len() == 2 {
            let retained = match board_type {
                BoardType::P100 => Some(0),
                BoardType::P150 | BoardType::P300 | BoardType::Ubb => Some(1),
                _ => None,
            };
            if let Some(retained) = retained {
                let spare = pcie.remove(1 - retained);
                router_only.push(spare);
            }
        }

        let coordinate_manager = CoordinateManager::from_parts(
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
            pcie,
            router_only,
            arch::security_locations(arch).to_vec(),
            arch::l2cpu_locations(arch).to_vec(),
        )?;

        Ok(Self {
            arch,
            noc_translation_enabled,
            harvesting,
            board_type,
            worker_l1_size: arch::worker_l1_size(arch),
            eth_l1_size: arch::eth_l1_size(arch),
            dram_bank_size: arch::dram_bank_size(arch),
            grid: arch::grid_size(arch),
            coordinate_manager,
        })
    }

    pub fn coordinate_manager(&self) -> &CoordinateManager {
        &self.coordinate_manager
    }

    pub fn translate(
        &self,
        coord: CoreCoord,
        target: CoordSystem,
    ) -> Result<CoreCoord, PlatformError> {
        self.coordinate_manager.translate(coord, target)
    }

    pub fn get_coord_at(
        &self,
        xy: XyPair,
        system: CoordSystem,
    ) -> Result<CoreCoord, PlatformError> {
        self.coordinate_manager.get_coord_at(xy, system)
    }

    pub fn get_cores(&self, core_type: CoreType, system: CoordSystem) -> Vec<CoreCoord> {
        self.coordinate_manager.get_cores(core_type, system)
    }

    pub fn get_harvested_cores(&self, core_type: CoreType) -> Vec<CoreCoord> {
        self.coordinate_manager.get_harvested_cores(core_type)
    }

    /// Surviving DRAM endpoints; the outer index is the channel.
    pub fn get_dram_cores(&self) -> Vec<Vec<CoreCoord>> {
        self.coordinate_manager
            .dram_cores()
            .iter()
            .enumerate()
            .filter(|(chan, _)| self.harvesting.dram & (1 << chan) == 0)
            .map(|(_, cores)| {
                cores
                    .iter()
                    .map(|c| CoreCoord::new(c.x, c.y, CoreType::Dram, CoordSystem::Noc0))
                    .collect()
            })
            .collect()
    }

    pub fn get_eth_core_for_channel(
        &self,
        channel: usize,
        system: CoordSystem,
    ) -> Result<CoreCoord, PlatformError> {
        let cores = self.coordinate_manager.eth_cores();
        let xy = cores.get(channel).ok_or(PlatformError::InvalidAddress {
            addr: channel as u64,
            reason: format!("chip has {} eth channels", cores.len()),
        })?;

        self.translate(
            CoreCoord::new(xy.x, xy.y, CoreType::Eth, CoordSystem::Noc0),
            system,
        )
    }

    pub fn get_grid_size(&self, core_type: CoreType) -> XyPair {
        self.coordinate_manager.grid_size(core_type)
    }

    pub fn full_grid_size(&self) -> XyPair {
        self.grid
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, PlatformError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlatformError::Generic(format!("failed to read {path:?}: {e}"), crate::error::BtWrapper::capture()))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, PlatformError> {
        let yaml: SocDescriptorYaml = serde_yaml::from_str(text)
            .map_err(|e| PlatformError::Generic(format!("soc descriptor parse failure: {e}"), crate::error::BtWrapper::capture()))?;
        yaml.try_into()
    }

    pub fn to_yaml_string(&self) -> Result<String, PlatformError> {
        let yaml = SocDescriptorYaml::from(self);
        serde_yaml::to_string(&yaml)
            .map_err(|e| PlatformError::Generic(format!("soc descriptor serialize failure: {e}"), crate::error::BtWrapper::capture()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GridYaml {
    x_size: u8,
    y_size: u8,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NocFeaturesYaml {
    translation_id_enabled: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeaturesYaml {
    noc: NocFeaturesYaml,
}

#[derive(Debug, Serialize, Deserialize)]
struct SocDescriptorYaml {
    grid: GridYaml,
    arch: String,
    functional_workers: Vec<String>,
    #[serde(default)]
    harvested_workers: Vec<String>,
    dram: Vec<Vec<String>>,
    #[serde(default)]
    harvested_dram: Vec<Vec<String>>,
    eth: Vec<String>,
    #[serde(default)]
    harvested_eth: Vec<String>,
    #[serde(default)]
    arc: Vec<String>,
    #[serde(default)]
    pcie: Vec<String>,
    #[serde(default)]
    router_only: Vec<String>,
    #[serde(default)]
    l2cpu: Vec<String>,
    #[serde(default)]
    security: Vec<String>,
    worker_l1_size: u64,
    eth_l1_size: u64,
    dram_bank_size: u64,
    noc0_x_to_noc1_x: Vec<u8>,
    noc0_y_to_noc1_y: Vec<u8>,
    #[serde(default)]
    features: FeaturesYaml,
}

fn parse_pairs(strings: &[String]) -> Result<Vec<XyPair>, PlatformError> {
    strings
        .iter()
        .map(|s| {
            s.parse::<XyPair>().map_err(|e| {
                PlatformError::Generic(
                    format!("bad core location {s:?}: {e}"),
                    crate::error::BtWrapper::capture(),
                )
            })
        })
        .collect()
}

fn format_pairs(pairs: impl IntoIterator<Item = XyPair>) -> Vec<String> {
    pairs.into_iter().map(|p| p.to_string()).collect()
}

impl TryFrom<SocDescriptorYaml> for SocDescriptor {
    type Error = PlatformError;

    fn try_from(yaml: SocDescriptorYaml) -> Result<Self, Self::Error> {
        let arch: Arch = yaml
            .arch
            .parse()
            .map_err(|e: String| PlatformError::Generic(e, crate::error::BtWrapper::capture()))?;

        let functional_workers = parse_pairs(&yaml.functional_workers)?;
        let harvested_workers = parse_pairs(&yaml.harvested_workers)?;

        // The worker axis lists come from the union of functional and
        // harvested workers; the harvested axis entries become mask bits.
        let mut tensix_x: Vec<u8> = functional_workers
            .iter()
            .chain(harvested_workers.iter())
            .map(|p| p.x)
            .collect();
        tensix_x.sort();
        tensix_x.dedup();
        let mut tensix_y: Vec<u8> = functional_workers
            .iter()
            .chain(harvested_workers.iter())
            .map(|p| p.y)
            .collect();
        tensix_y.sort();
        tensix_y.dedup();

        let mut tensix_mask = 0u32;
        if arch.is_blackhole() {
            for p in harvested_workers.iter() {
                let bit = tensix_x.iter().position(|x| *x == p.x).unwrap();
                tensix_mask |= 1 << bit;
            }
        } else {
            for p in harvested_workers.iter() {
                let bit = tensix_y.iter().position(|y| *y == p.y).unwrap();
                tensix_mask |= 1 << bit;
            }
        }

        let mut dram_cores: Vec<Vec<XyPair>> = Vec::new();
        for chan in yaml.dram.iter() {
            dram_cores.push(parse_pairs(chan)?);
        }
        let mut dram_mask = 0u32;
        for chan in yaml.harvested_dram.iter() {
            dram_mask |= 1 << dram_cores.len();
            dram_cores.push(parse_pairs(chan)?);
        }

        let mut eth_cores = parse_pairs(&yaml.eth)?;
        let mut eth_mask = 0u32;
        for core in parse_pairs(&yaml.harvested_eth)? {
            eth_mask |= 1 << eth_cores.len();
            eth_cores.push(core);
        }

        let harvesting = HarvestingMasks {
            tensix: tensix_mask,
            dram: dram_mask,
            eth: eth_mask,
            pcie: 0,
            l2cpu: 0,
        };
        harvesting.validate(arch)?;

        let coordinate_manager = CoordinateManager::from_parts(
            arch,
            yaml.features.noc.translation_id_enabled,
            harvesting,
            tensix_x,
            tensix_y,
            dram_cores,
            eth_cores,
            parse_pairs(&yaml.arc)?,
            parse_pairs(&yaml.pcie)?,
            parse_pairs(&yaml.router_only)?,
            parse_pairs(&yaml.security)?,
            parse_pairs(&yaml.l2cpu)?,
        )?;

        Ok(SocDescriptor {
            arch,
            noc_translation_enabled: yaml.features.noc.translation_id_enabled,
            harvesting,
            board_type: BoardType::Unknown,
            worker_l1_size: yaml.worker_l1_size,
            eth_l1_size: yaml.eth_l1_size,
            dram_bank_size: yaml.dram_bank_size,
            grid: XyPair::new(yaml.grid.x_size, yaml.grid.y_size),
            coordinate_manager,
        })
    }
}

impl From<&SocDescriptor> for SocDescriptorYaml {
    fn from(desc: &SocDescriptor) -> Self {
        let cm = desc.coordinate_manager();

        let dram: Vec<Vec<String>> = cm
            .dram_cores()
            .iter()
            .enumerate()
            .filter(|(chan, _)| desc.harvesting.dram & (1 << chan) == 0)
            .map(|(_, cores)| format_pairs(cores.iter().copied()))
            .collect();
        let harvested_dram: Vec<Vec<String>> = cm
            .dram_cores()
            .iter()
            .enumerate()
            .filter(|(chan, _)| desc.harvesting.dram & (1 << chan) != 0)
            .map(|(_, cores)| format_pairs(cores.iter().copied()))
            .collect();

        let eth: Vec<String> = format_pairs(
            cm.get_cores(CoreType::Eth, CoordSystem::Noc0)
                .into_iter()
                .map(|c| c.xy()),
        );
        let harvested_eth: Vec<String> = format_pairs(
            cm.get_harvested_cores(CoreType::Eth).into_iter().map(|c| c.xy()),
        );

        SocDescriptorYaml {
            grid: GridYaml {
                x_size: desc.grid.x,
                y_size: desc.grid.y,
            },
            arch: desc.arch.to_string(),
            functional_workers: format_pairs(
                cm.get_cores(CoreType::Tensix, CoordSystem::Noc0)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            harvested_workers: format_pairs(
                cm.get_harvested_cores(CoreType::Tensix)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            dram,
            harvested_dram,
            eth,
            harvested_eth,
            arc: format_pairs(
                cm.get_cores(CoreType::Arc, CoordSystem::Noc0)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            pcie: format_pairs(
                cm.get_cores(CoreType::Pcie, CoordSystem::Noc0)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            router_only: format_pairs(
                cm.get_cores(CoreType::RouterOnly, CoordSystem::Noc0)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            l2cpu: format_pairs(
                cm.get_cores(CoreType::L2Cpu, CoordSystem::Noc0)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            security: format_pairs(
                cm.get_cores(CoreType::Security, CoordSystem::Noc0)
                    .into_iter()
                    .map(|c| c.xy()),
            ),
            worker_l1_size: desc.worker_l1_size,
            eth_l1_size: desc.eth_l1_size,
            dram_bank_size: desc.dram_bank_size,
            noc0_x_to_noc1_x: arch::noc0_x_to_noc1_x(desc.arch),
            noc0_y_to_noc1_y: arch::noc0_y_to_noc1_y(desc.arch),
            features: FeaturesYaml {
                noc: NocFeaturesYaml {
                    translation_id_enabled: desc.noc_translation_enabled,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_default_descriptor_round_trips_through_yaml() {
        for arch in [Arch::WormholeB0, Arch::Blackhole] {
            let desc = SocDescriptor::from_arch(
                arch,
                true,
                HarvestingMasks {
                    tensix: 0b1,
                    dram: 0b10,
                    ..Default::default()
                },
                BoardType::Unknown,
            )
            .unwrap();

            let text = desc.to_yaml_string().unwrap();
            let loaded = SocDescriptor::from_yaml_str(&text).unwrap();

            assert_eq!(loaded.arch, desc.arch);
            assert_eq!(loaded.noc_translation_enabled, desc.noc_translation_enabled);
            assert_eq!(loaded.worker_l1_size, desc.worker_l1_size);
            assert_eq!(loaded.dram_bank_size, desc.dram_bank_size);
            assert_eq!(
                loaded.get_cores(CoreType::Tensix, CoordSystem::Noc0),
                desc.get_cores(CoreType::Tensix, CoordSystem::Noc0)
            );
            assert_eq!(
                loaded.get_harvested_cores(CoreType::Tensix),
                desc.get_harvested_cores(CoreType::Tensix)
            );
            assert_eq!(loaded.get_dram_cores().len(), desc.get_dram_cores().len());

            // Second generation serialization is stable.
            assert_eq!(loaded.to_yaml_string().unwrap(), text);
        }
    }

    #[test]
    fn board_type_retains_exactly_one_pcie_core_on_blackhole() {
        let desc = SocDescriptor::from_arch(
            Arch::Blackhole,
            true,
            HarvestingMasks::default(),
            BoardType::P150,
        )
        .unwrap();

        let pcie = desc.get_cores(CoreType::Pcie, CoordSystem::Noc0);
        assert_eq!(pcie.len(), 1);
        assert_eq!(pcie[0].xy(), XyPair::new(11, 0));

        // The spare endpoint becomes a router-only core.
        let router = desc.get_cores(CoreType::RouterOnly, CoordSystem::Noc0);
        assert!(router.iter().any(|c| c.xy() == XyPair::new(2, 0)));
    }

    #[test]
    fn eth_core_for_channel_matches_wired_order() {
        let desc = SocDescriptor::from_arch(
            Arch::WormholeB0,
            false,
            HarvestingMasks::default(),
            BoardType::N300,
        )
        .unwrap();

        let chan0 = desc
            .get_eth_core_for_channel(0, CoordSystem::Noc0)
            .unwrap();
        assert_eq!(chan0.xy(), XyPair::new(9, 0));
        assert!(desc.get_eth_core_for_channel(16, CoordSystem::Noc0).is_err());
    }
}
