// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    tlb::{MemoryType, TlbInfo},
    DeviceTlbInfo, PciDevice, PciError, Tlb,
};

const TLB_CONFIG_BASE: u64 = 0x1FC0_0000;
// Three 32-bit config words per window.
const TLB_CONFIG_SIZE: u64 = 12;

const TLB_COUNT_2M: u64 = 202;
const TLB_COUNT_4G: u64 = 8;

const TLB_BASE_2M: u64 = 0;
const TLB_BASE_4G: u64 = TLB_COUNT_2M * (1 << 21);

#[bitfield_struct::bitfield(u128)]
pub struct Tlb2M {
    #[bits(43)]
    local_offset: u64,
    #[bits(6)]
    x_end: u8,
    #[bits(6)]
    y_end: u8,
    #[bits(6)]
    x_start: u8,
    #[bits(6)]
    y_start: u8,
    #[bits(2)]
    noc_sel: u8,
    mcast: bool,
    #[bits(2)]
    ordering: u8,
    linked: bool,
    #[bits(55)]
    padding: u64,
}

#[bitfield_struct::bitfield(u128)]
pub struct Tlb4G {
    local_offset: u32,
    #[bits(6)]
    x_end: u8,
    #[bits(6)]
    y_end: u8,
    #[bits(6)]
    x_start: u8,
    #[bits(6)]
    y_start: u8,
    #[bits(2)]
    noc_sel: u8,
    mcast: bool,
    #[bits(2)]
    ordering: u8,
    linked: bool,
    #[bits(66)]
    padding: u128,
}

impl From<Tlb> for Tlb2M {
    fn from(value: Tlb) -> Self {
        Self::new()
            .with_local_offset(value.local_offset)
            .with_x_end(value.x_end)
            .with_y_end(value.y_end)
            .with_x_start(value.x_start)
            .with_y_start(value.y_start)
            .with_noc_sel(value.noc_sel)
            .with_mcast(value.mcast)
            .with_ordering(value.ordering.into())
            .with_linked(value.linked)
    }
}

impl From<Tlb2M> for Tlb {
    fn from(value: Tlb2M) -> Self {
        Tlb {
            local_offset: value.local_offset(),
            x_end: value.x_end(),
            y_end: value.y_end(),
            x_start: value.x_start(),
            y_start: value.y_start(),
            noc_sel: value.noc_sel(),
            mcast: value.mcast(),
            ordering: super::Ordering::from(value.ordering()),
            linked: value.linked(),
        }
    }
}

impl From<Tlb> for Tlb4G {
    fn from(value: Tlb) -> Self {
        Self::new()
            .with_local_offset(value.local_offset as u32)
            .with_x_end(value.x_end)
            .with_y_end(value.y_end)
            .with_x_start(value.x_start)
            .with_y_start(value.y_start)
            .with_noc_sel(value.noc_sel)
            .with_mcast(value.mcast)
            .with_ordering(value.ordering.into())
            .with_linked(value.linked)
    }
}

impl From<Tlb4G> for Tlb {
    fn from(value: Tlb4G) -> Self {
        Tlb {
            local_offset: value.local_offset() as u64,
            x_end: value.x_end(),
            y_end: value.y_end(),
            x_start: value.x_start(),
            y_start: value.y_start(),
            noc_sel: value.noc_sel(),
            mcast: value.mcast(),
            ordering: super::Ordering::from(value.ordering()),
            linked: value.linked(),
        }
    }
}

// 202 2MB windows followed by 8 4GB windows. The 4GB apertures live on BAR4;
// only the 2MB range is reachable through BAR0 so that is all we program here.
pub fn setup_tlb(
    device: &mut PciDevice,
    tlb_index: u32,
    mut tlb: Tlb,
) -> Result<(u64, u64), PciError> {
    let tlb_config_addr = TLB_CONFIG_BASE + (tlb_index as u64 * TLB_CONFIG_SIZE);

    let (tlb_value, mmio_addr, size, addr_offset) = match tlb_index as u64 {
        0..=201 => {
            let size = 1u64 << 21;
            let local_offset = tlb.local_offset % size;
            tlb.local_offset /= size;

            (
                Tlb2M::from(tlb).0,
                TLB_BASE_2M + size * tlb_index as u64,
                size,
                local_offset,
            )
        }
        202..=209 => {
            let size = 1u64 << 32;
            let local_offset = tlb.local_offset % size;
            tlb.local_offset /= size;

            (
                Tlb4G::from(tlb).0,
                TLB_BASE_4G + size * (tlb_index as u64 - TLB_COUNT_2M),
                size,
                local_offset,
            )
        }
        _ => {
            panic!("TLB index out of range");
        }
    };

    device.write32(tlb_config_addr as u32, (tlb_value & 0xFFFF_FFFF) as u32)?;
    device.write32(
        tlb_config_addr as u32 + 4,
        ((tlb_value >> 32) & 0xFFFF_FFFF) as u32,
    )?;
    device.write32(
        tlb_config_addr as u32 + 8,
        ((tlb_value >> 64) & 0xFFFF_FFFF) as u32,
    )?;

    Ok((mmio_addr + addr_offset, size - addr_offset))
}

pub fn get_tlb(device: &PciDevice, tlb_index: u32) -> Result<Tlb, PciError> {
    let tlb_config_addr = (TLB_CONFIG_BASE as u32) + (tlb_index * TLB_CONFIG_SIZE as u32);

    let tlb = ((device.read32(tlb_config_addr + 8)? as u128) << 64)
        | ((device.read32(tlb_config_addr + 4)? as u128) << 32)
        | (device.read32(tlb_config_addr)? as u128);

    let output = match tlb_index {
        0..=201 => Tlb2M::from(tlb).into(),
        202..=209 => Tlb4G::from(tlb).into(),
        _ => {
            panic!("TLB index out of range");
        }
    };

    Ok(output)
}

pub fn tlb_info(device: &PciDevice) -> DeviceTlbInfo {
    DeviceTlbInfo {
        device_id: device.id as u32,
        total_count: (TLB_COUNT_2M + TLB_COUNT_4G) as u32,
        tlb_config: vec![
            TlbInfo {
                count: TLB_COUNT_2M,
                size: 1 << 21,
                memory_type: MemoryType::Wc,
            },
            TlbInfo {
                count: TLB_COUNT_4G,
                size: 1 << 32,
                memory_type: MemoryType::Uc,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlb::Ordering;

    #[test]
    fn tlb_2m_encoding() {
        let tlb = Tlb2M::from(Tlb {
            local_offset: 0x3,
            x_end: 2,
            y_end: 11,
            ordering: Ordering::Strict,
            ..Default::default()
        });

        // 43-bit local offset, then x_end and y_end.
        assert_eq!(tlb.0 & ((1 << 43) - 1), 0x3);
        assert_eq!((tlb.0 >> 43) & 0x3F, 2);
        assert_eq!((tlb.0 >> 49) & 0x3F, 11);
    }

    #[test]
    fn tlb_4g_round_trip() {
        let tlb = Tlb {
            local_offset: 7,
            x_end: 16,
            y_end: 11,
            noc_sel: 1,
            mcast: true,
            ordering: Ordering::Posted,
            ..Default::default()
        };

        let back: Tlb = Tlb4G::from(tlb.clone()).into();
        assert_eq!(back.local_offset, tlb.local_offset);
        assert_eq!(back.x_end, tlb.x_end);
        assert_eq!(back.noc_sel, tlb.noc_sel);
        assert!(back.mcast);
        assert_eq!(back.ordering, Ordering::Posted);
    }
}
