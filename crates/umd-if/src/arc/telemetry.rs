// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use ttkmd_if::PciDevice;
use umd_core::Arch;

use crate::{arch, cluster_descriptor::BoardType, error::PlatformError};

use super::{ArcMessenger, ArcMsg};

/// The subset of the ARC telemetry block the driver itself consumes.
#[derive(Debug, Default, Clone)]
pub struct Telemetry {
    pub board_id: u64,
    pub arc_fw_version: u32,
    pub eth_fw_version: u32,
    pub fw_bundle_version: u32,
    pub aiclk: u32,
    pub harvesting_state: u32,
    pub noc_translation_enabled: bool,
    pub asic_location: u32,
}

impl Telemetry {
    pub fn board_serial_number_hex(&self) -> String {
        format!("{:016x}", self.board_id)
    }

    pub fn board_type(&self) -> BoardType {
        BoardType::from_board_id(self.board_id)
    }

    /// Ethernet firmware version in MAJOR.MINOR.PATCH form.
    pub fn eth_fw_version_str(&self) -> String {
        let major = (self.eth_fw_version >> 16) & 0x0FF;
        let minor = (self.eth_fw_version >> 12) & 0x00F;
        let patch = self.eth_fw_version & 0xFFF;
        format!("{major}.{minor}.{patch}")
    }

    pub fn ai_clk(&self) -> u32 {
        self.aiclk & 0xffff
    }
}

// Word offsets within the telemetry block.
const BOARD_ID_HIGH: u32 = 1;
const BOARD_ID_LOW: u32 = 2;
const ARC_FW_VERSION: u32 = 5;
const ETH_FW_VERSION: u32 = 6;
const FW_BUNDLE_VERSION: u32 = 7;
const AICLK: u32 = 14;
const HARVESTING_STATE: u32 = 16;
const NOC_TRANSLATION: u32 = 17;
const ASIC_LOCATION: u32 = 18;

pub struct ArcTelemetryReader {
    device: Arc<Mutex<PciDevice>>,
    arch: Arch,
    /// BAR offset of the telemetry block.
    telemetry_base: u32,
}

impl ArcTelemetryReader {
    pub fn new(
        device: Arc<Mutex<PciDevice>>,
        messenger: &ArcMessenger,
    ) -> Result<Self, PlatformError> {
        let arch = device.lock().unwrap().arch;
        let params = arch::arc_params(arch);

        let telemetry_csm_addr = if arch.is_blackhole() {
            // Published by firmware in scratch RAM, next to the queue block.
            let addr_reg = params.queue_control_scratch + 2 * 4;
            device.lock().unwrap().read32(addr_reg)?
        } else {
            messenger
                .send_message(ArcMsg::GetTelemetryAddr, std::time::Duration::from_secs(1))?
                .arg
        };

        let telemetry_base = ArcMessenger::csm_to_bar(&params, telemetry_csm_addr)?;

        Ok(Self {
            device,
            arch,
            telemetry_base,
        })
    }

    fn read_entry(&self, device: &PciDevice, offset: u32) -> Result<u32, PlatformError> {
        Ok(device.read32(self.telemetry_base + offset * 4)?)
    }

    /// Take a fresh snapshot; nothing is cached.
    pub fn read(&self) -> Result<Telemetry, PlatformError> {
        let device = self.device.lock().unwrap();

        let board_id_high = self.read_entry(&device, BOARD_ID_HIGH)? as u64;
        let board_id_low = self.read_entry(&device, BOARD_ID_LOW)? as u64;

        Ok(Telemetry {
            board_id: (board_id_high << 32) | board_id_low,
            arc_fw_version: self.read_entry(&device, ARC_FW_VERSION)?,
            eth_fw_version: self.read_entry(&device, ETH_FW_VERSION)?,
            fw_bundle_version: self.read_entry(&device, FW_BUNDLE_VERSION)?,
            aiclk: self.read_entry(&device, AICLK)?,
            harvesting_state: self.read_entry(&device, HARVESTING_STATE)?,
            noc_translation_enabled: self.read_entry(&device, NOC_TRANSLATION)? != 0,
            asic_location: self.read_entry(&device, ASIC_LOCATION)?,
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }
}

/// Answers capability questions from the firmware versions in telemetry.
pub struct FirmwareInfoProvider {
    telemetry: Telemetry,
}

impl FirmwareInfoProvider {
    pub fn new(reader: &ArcTelemetryReader) -> Result<Self, PlatformError> {
        Ok(Self {
            telemetry: reader.read()?,
        })
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    fn eth_fw_at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        let version = self.telemetry.eth_fw_version & 0x00FF_FFFF;
        version >= (major << 16) | (minor << 12) | patch
    }

    /// ERISC broadcast needs 6.5.0 or newer.
    pub fn eth_broadcast_supported(&self) -> bool {
        self.eth_fw_at_least(6, 5, 0)
    }

    /// Translated coordinates in broadcast headers need 6.8.0 or newer.
    pub fn translated_broadcast_headers_supported(&self) -> bool {
        self.eth_fw_at_least(6, 8, 0)
    }

    pub fn fw_bundle_version(&self) -> u32 {
        self.telemetry.fw_bundle_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_fw_version_formats_as_semver() {
        let telemetry = Telemetry {
            eth_fw_version: (6 << 16) | (9 << 12) | 2,
            ..Default::default()
        };
        assert_eq!(telemetry.eth_fw_version_str(), "6.9.2");
    }

    #[test]
    fn board_type_decodes_from_serial() {
        let telemetry = Telemetry {
            board_id: 0x18u64 << 36,
            ..Default::default()
        };
        assert_eq!(telemetry.board_type(), BoardType::N150);
    }
}
