// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

//! Request/response messaging with the ARC management core.
//!
//! Wormhole talks through the reset-unit scratch registers; blackhole runs an
//! 8-entry request/response ring in ARC CSM. Both sit behind the same
//! [`ArcMessenger::send_message`] call, serialized by the interprocess
//! `ArcMsg` mutex.

use std::sync::{Arc, Mutex};

use ttkmd_if::PciDevice;

use crate::{
    arch::{self, ArcParams},
    error::PlatformError,
    lock_manager::{LockManager, MutexKind, NamedMutex},
};

mod telemetry;

pub use telemetry::{ArcTelemetryReader, FirmwareInfoProvider, Telemetry};

#[derive(Debug, Clone, Copy)]
pub enum PowerState {
    Busy,
    ShortIdle,
    LongIdle,
}

#[derive(Debug, Clone, Copy)]
pub enum ArcMsg {
    Nop,
    Test { arg: u32 },
    ArcGoToSleep,

    SetPowerState(PowerState),

    GetAiclk,
    GetHarvesting,
    GetTelemetryAddr,

    ToggleTensixReset { arg: u32 },
    DeassertRiscVReset,
}

impl ArcMsg {
    pub fn msg_code(&self) -> u16 {
        let code = match self {
            ArcMsg::Nop => 0x11,
            ArcMsg::GetTelemetryAddr => 0x2C,
            ArcMsg::GetAiclk => 0x34,
            ArcMsg::SetPowerState(state) => match state {
                PowerState::Busy => 0x52,
                PowerState::ShortIdle => 0x53,
                PowerState::LongIdle => 0x54,
            },
            ArcMsg::ArcGoToSleep => 0x55,
            ArcMsg::GetHarvesting => 0x57,
            ArcMsg::Test { .. } => 0x90,
            ArcMsg::ToggleTensixReset { .. } => 0xaf,
            ArcMsg::DeassertRiscVReset => 0xba,
        };

        0xaa00 | code
    }

    pub fn args(&self) -> (u16, u16) {
        match self {
            ArcMsg::Test { arg } | ArcMsg::ToggleTensixReset { arg } => {
                ((arg & 0xFFFF) as u16, ((arg >> 16) & 0xFFFF) as u16)
            }
            _ => (0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArcMsgOk {
    pub rc: u32,
    pub arg: u32,
}

enum Protocol {
    Scratch,
    Queue {
        /// BAR offset of this queue's header.
        queue_base: u32,
        num_entries: u32,
    },
}

pub struct ArcMessenger {
    device: Arc<Mutex<PciDevice>>,
    params: ArcParams,
    mutex: Arc<NamedMutex>,
    protocol: Protocol,
}

const MSG_REG: u32 = 5;
const RETURN_REG: u32 = 3;

// Queue header word offsets; request slots follow the 8-word header,
// response slots follow the request ring.
const QUEUE_HEADER_LEN: u32 = 8;
const QUEUE_ENTRY_LEN: u32 = 8;
const REQUEST_WPTR_OFFSET: u32 = 0;
const RESPONSE_RPTR_OFFSET: u32 = 1;
const REQUEST_RPTR_OFFSET: u32 = 4;
const RESPONSE_WPTR_OFFSET: u32 = 5;

// The queue used for host API messages.
const API_MSG_QUEUE_INDEX: u32 = 2;

// CSM as the ARC core sees it; BAR offset = csm_base + (addr - this).
const CSM_NOC_BASE: u32 = 0x1000_0000;

impl ArcMessenger {
    pub fn new(
        device: Arc<Mutex<PciDevice>>,
        device_index: usize,
    ) -> Result<Self, PlatformError> {
        let arch = device.lock().unwrap().arch;
        let params = arch::arc_params(arch);
        let mutex = LockManager::get(MutexKind::ArcMsg, device_index)?;

        let protocol = if arch.is_blackhole() {
            Self::discover_queue(&device, &params)?
        } else {
            Protocol::Scratch
        };

        Ok(Self {
            device,
            params,
            mutex,
            protocol,
        })
    }

    fn csm_to_bar(params: &ArcParams, csm_addr: u32) -> Result<u32, PlatformError> {
        let offset = csm_addr.wrapping_sub(CSM_NOC_BASE);
        if offset >= params.csm_size {
            return Err(PlatformError::InvalidAddress {
                addr: csm_addr as u64,
                reason: "address is outside ARC CSM".to_string(),
            });
        }
        Ok(params.csm_base + offset)
    }

    fn discover_queue(
        device: &Arc<Mutex<PciDevice>>,
        params: &ArcParams,
    ) -> Result<Protocol, PlatformError> {
        let mut dev = device.lock().unwrap();

        let control_block_addr = dev.read32(params.queue_control_scratch)?;
        let control_bar = Self::csm_to_bar(params, control_block_addr)?;

        let lo = dev.read32(control_bar)? as u64;
        let hi = dev.read32(control_bar + 4)? as u64;
        let control = (hi << 32) | lo;

        let queue_base_addr = (control & 0xFFFF_FFFF) as u32;
        let num_entries = ((control >> 32) & 0xFF) as u32;
        let num_queues = ((control >> 40) & 0xFF) as u32;

        if num_entries == 0 || API_MSG_QUEUE_INDEX >= num_queues {
            return Err(PlatformError::UnsupportedOperation(format!(
                "ARC queue control block reports {num_queues} queues of {num_entries} entries"
            )));
        }

        let queue_size_bytes =
            (2 * num_entries * QUEUE_ENTRY_LEN + QUEUE_HEADER_LEN) * 4;
        let queue_base = Self::csm_to_bar(
            params,
            queue_base_addr + API_MSG_QUEUE_INDEX * queue_size_bytes,
        )?;

        Ok(Protocol::Queue {
            queue_base,
            num_entries,
        })
    }

    /// Send one message and wait for its response.
    pub fn send_message(
        &self,
        msg: ArcMsg,
        timeout: std::time::Duration,
    ) -> Result<ArcMsgOk, PlatformError> {
        let _guard = self.mutex.lock()?;

        match self.protocol {
            Protocol::Scratch => self.send_scratch(msg, timeout),
            Protocol::Queue {
                queue_base,
                num_entries,
            } => self.send_queue(queue_base, num_entries, msg, timeout),
        }
    }

    fn trigger_fw_int(&self, device: &mut PciDevice) -> Result<bool, PlatformError> {
        let misc = device.read32(self.params.arc_misc_cntl)?;
        if misc & (1 << 16) != 0 {
            return Ok(false);
        }

        device.write32(self.params.arc_misc_cntl, misc | (1 << 16))?;
        Ok(true)
    }

    fn send_scratch(
        &self,
        msg: ArcMsg,
        timeout: std::time::Duration,
    ) -> Result<ArcMsgOk, PlatformError> {
        const MSG_ERROR_REPLY: u32 = 0xffffffff;

        let code = msg.msg_code();
        let (arg0, arg1) = msg.args();

        let mut device = self.device.lock().unwrap();

        let current = device.read32(self.params.reset_scratch(MSG_REG))?;
        if (current & 0xFFFF) as u16 == ArcMsg::ArcGoToSleep.msg_code() {
            return Err(PlatformError::UnsupportedOperation(
                "ARC is asleep".to_string(),
            ));
        }

        device.write32(
            self.params.reset_scratch(RETURN_REG),
            arg0 as u32 | ((arg1 as u32) << 16),
        )?;
        device.write32(self.params.reset_scratch(MSG_REG), code as u32)?;

        if !self.trigger_fw_int(&mut device)? {
            return Err(PlatformError::ArcMessageFailed(0xFE));
        }

        let start = std::time::Instant::now();
        loop {
            let status = device.read32(self.params.reset_scratch(MSG_REG))?;
            if (status & 0xFFFF) as u16 == code & 0xFF {
                let rc = (status >> 16) & 0xFFFF;
                let arg = device.read32(self.params.reset_scratch(RETURN_REG))?;
                return Ok(ArcMsgOk { rc, arg });
            } else if status == MSG_ERROR_REPLY {
                return Err(PlatformError::ArcMessageFailed(0xFF));
            }

            std::thread::sleep(std::time::Duration::from_millis(1));
            if start.elapsed() > timeout {
                return Err(PlatformError::Timeout(timeout));
            }
        }
    }

    fn send_queue(
        &self,
        queue_base: u32,
        num_entries: u32,
        msg: ArcMsg,
        timeout: std::time::Duration,
    ) -> Result<ArcMsgOk, PlatformError> {
        let code = (msg.msg_code() & 0xFF) as u32;
        let (arg0, arg1) = msg.args();
        let arg = arg0 as u32 | ((arg1 as u32) << 16);

        let word_addr = |offset: u32| queue_base + offset * 4;

        let mut device = self.device.lock().unwrap();
        let start = std::time::Instant::now();

        // Wait for a free request slot: |wptr - rptr| == size means full in
        // the 2*size modular pointer space.
        let wptr = device.read32(word_addr(REQUEST_WPTR_OFFSET))?;
        loop {
            let rptr = device.read32(word_addr(REQUEST_RPTR_OFFSET))?;
            if (wptr.wrapping_sub(rptr)) % (2 * num_entries) != num_entries {
                break;
            }
            if start.elapsed() > timeout {
                return Err(PlatformError::Timeout(timeout));
            }
            std::thread::yield_now();
        }

        let request = [code, arg, 0, 0, 0, 0, 0, 0];
        let entry_offset = QUEUE_HEADER_LEN + (wptr % num_entries) * QUEUE_ENTRY_LEN;
        for (i, word) in request.iter().enumerate() {
            device.write32(word_addr(entry_offset + i as u32), *word)?;
        }

        device.write32(
            word_addr(REQUEST_WPTR_OFFSET),
            (wptr + 1) % (2 * num_entries),
        )?;
        self.trigger_fw_int(&mut device)?;

        // Pop the response.
        let rptr = device.read32(word_addr(RESPONSE_RPTR_OFFSET))?;
        loop {
            let resp_wptr = device.read32(word_addr(RESPONSE_WPTR_OFFSET))?;
            if resp_wptr != rptr {
                break;
            }
            if start.elapsed() > timeout {
                return Err(PlatformError::Timeout(timeout));
            }
            std::thread::yield_now();
        }

        let response_offset =
            QUEUE_HEADER_LEN + (num_entries + (rptr % num_entries)) * QUEUE_ENTRY_LEN;
        let response = device.read32(word_addr(response_offset))?;

        device.write32(
            word_addr(RESPONSE_RPTR_OFFSET),
            (rptr + 1) % (2 * num_entries),
        )?;

        let status = response & 0xFF;
        if status < 0x80 {
            Ok(ArcMsgOk {
                rc: status,
                arg: response >> 16,
            })
        } else {
            // 0xFF is "unknown message", anything else a firmware fault.
            Err(PlatformError::ArcMessageFailed(status as u8))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_codes_carry_the_protocol_prefix() {
        assert_eq!(ArcMsg::Nop.msg_code(), 0xaa11);
        assert_eq!(ArcMsg::GetAiclk.msg_code(), 0xaa34);
        assert_eq!(
            ArcMsg::SetPowerState(PowerState::LongIdle).msg_code(),
            0xaa54
        );
    }

    #[test]
    fn toggle_reset_splits_its_argument() {
        let msg = ArcMsg::ToggleTensixReset { arg: 0xdead_beef };
        assert_eq!(msg.args(), (0xbeef, 0xdead));
    }
}
