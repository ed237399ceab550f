// SPDX-FileCopyrightText: © 2025 Tenstorrent Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    tlb::{MemoryType, TlbInfo},
    DeviceTlbInfo, PciDevice, PciError, Tlb,
};

const TLB_CONFIG_BASE: u64 = 0x1FC0_0000;

const TLB_COUNT_1M: u64 = 156;
const TLB_COUNT_2M: u64 = 10;
const TLB_COUNT_16M: u64 = 20;

const TLB_BASE_1M: u64 = 0;
const TLB_BASE_2M: u64 = TLB_COUNT_1M * (1 << 20);
const TLB_BASE_16M: u64 = TLB_BASE_2M + TLB_COUNT_2M * (1 << 21);

#[bitfield_struct::bitfield(u64)]
pub struct Tlb1M {
    local_offset: u16,
    #[bits(6)]
    x_end: u8,
    #[bits(6)]
    y_end: u8,
    #[bits(6)]
    x_start: u8,
    #[bits(6)]
    y_start: u8,
    #[bits(1)]
    noc_sel: u8,
    mcast: bool,
    #[bits(2)]
    ordering: u8,
    linked: bool,
    #[bits(19)]
    padding: u64,
}

#[bitfield_struct::bitfield(u64)]
pub struct Tlb2M {
    #[bits(15)]
    local_offset: u16,
    #[bits(6)]
    x_end: u8,
    #[bits(6)]
    y_end: u8,
    #[bits(6)]
    x_start: u8,
    #[bits(6)]
    y_start: u8,
    #[bits(1)]
    noc_sel: u8,
    mcast: bool,
    #[bits(2)]
    ordering: u8,
    linked: bool,
    #[bits(20)]
    padding: u64,
}

#[bitfield_struct::bitfield(u64)]
pub struct Tlb16M {
    #[bits(12)]
    local_offset: u16,
    #[bits(6)]
    x_end: u8,
    #[bits(6)]
    y_end: u8,
    #[bits(6)]
    x_start: u8,
    #[bits(6)]
    y_start: u8,
    #[bits(1)]
    noc_sel: u8,
    mcast: bool,
    #[bits(2)]
    ordering: u8,
    linked: bool,
    #[bits(23)]
    padding: u64,
}

macro_rules! tlb_conversions {
    ($name:ident) => {
        impl From<Tlb> for $name {
            fn from(value: Tlb) -> Self {
                Self::new()
                    .with_local_offset(value.local_offset as u16)
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

        impl From<$name> for Tlb {
            fn from(value: $name) -> Self {
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
    };
}

tlb_conversions!(Tlb1M);
tlb_conversions!(Tlb2M);
tlb_conversions!(Tlb16M);

// 156 1MB windows, then 10 2MB windows, then 20 16MB windows packed back to
// back in BAR0; the config registers sit in one array of 8-byte entries.
pub fn setup_tlb(
    device: &mut PciDevice,
    tlb_index: u32,
    mut tlb: Tlb,
) -> Result<(u64, u64), PciError> {
    let tlb_config_addr = TLB_CONFIG_BASE + (tlb_index as u64 * 8);

    let (tlb_value, mmio_addr, size, addr_offset) = match tlb_index as u64 {
        0..=155 => {
            let size = 1 << 20;
            let local_offset = tlb.local_offset % size;
            tlb.local_offset /= size;

            (
                Tlb1M::from(tlb).0,
                TLB_BASE_1M + size * tlb_index as u64,
                size,
                local_offset,
            )
        }
        156..=165 => {
            let size = 1 << 21;
            let local_offset = tlb.local_offset % size;
            tlb.local_offset /= size;

            (
                Tlb2M::from(tlb).0,
                TLB_BASE_2M + size * (tlb_index as u64 - TLB_COUNT_1M),
                size,
                local_offset,
            )
        }
        166..=185 => {
            let size = 1 << 24;
            let local_offset = tlb.local_offset % size;
            tlb.local_offset /= size;

            (
                Tlb16M::from(tlb).0,
                TLB_BASE_16M + size * (tlb_index as u64 - TLB_COUNT_1M - TLB_COUNT_2M),
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

    Ok((mmio_addr + addr_offset, size - addr_offset))
}

pub fn get_tlb(device: &PciDevice, tlb_index: u32) -> Result<Tlb, PciError> {
    let tlb_config_addr = (TLB_CONFIG_BASE as u32) + (tlb_index * 8);

    let tlb = ((device.read32(tlb_config_addr + 4)? as u64) << 32)
        | device.read32(tlb_config_addr)? as u64;

    let output = match tlb_index {
        0..=155 => Tlb1M::from(tlb).into(),
        156..=165 => Tlb2M::from(tlb).into(),
        166..=185 => Tlb16M::from(tlb).into(),
        _ => {
            panic!("TLB index out of range");
        }
    };

    Ok(output)
}

pub fn tlb_info(device: &PciDevice) -> DeviceTlbInfo {
    DeviceTlbInfo {
        device_id: device.id as u32,
        total_count: (TLB_COUNT_1M + TLB_COUNT_2M + TLB_COUNT_16M) as u32,
        tlb_config: vec![
            TlbInfo {
                count: TLB_COUNT_1M,
                size: 1 << 20,
                memory_type: MemoryType::Wc,
            },
            TlbInfo {
                count: TLB_COUNT_2M,
                size: 1 << 21,
                memory_type: MemoryType::Wc,
            },
            TlbInfo {
                count: TLB_COUNT_16M,
                size: 1 << 24,
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
    fn tlb_1m_encoding() {
        let tlb = Tlb1M::from(Tlb {
            local_offset: 0x2,
            x_end: 1,
            y_end: 1,
            ordering: Ordering::Relaxed,
            ..Default::default()
        });

        // local_offset in bits 0..16, x_end at 16, y_end at 22.
        assert_eq!(tlb.0 & 0xFFFF, 0x2);
        assert_eq!((tlb.0 >> 16) & 0x3F, 1);
        assert_eq!((tlb.0 >> 22) & 0x3F, 1);
    }

    #[test]
    fn tlb_16m_multicast_encoding() {
        let tlb = Tlb16M::from(Tlb {
            x_start: 1,
            y_start: 1,
            x_end: 8,
            y_end: 11,
            mcast: true,
            ordering: Ordering::Strict,
            ..Default::default()
        });

        let decoded: Tlb = tlb.into();
        assert!(decoded.mcast);
        assert_eq!(decoded.x_start, 1);
        assert_eq!(decoded.x_end, 8);
        assert_eq!(decoded.y_end, 11);
        assert_eq!(decoded.ordering, Ordering::Strict);
    }

    #[test]
    fn tlb_round_trips_through_register_image() {
        let tlb = Tlb {
            local_offset: 0x5,
            x_end: 3,
            y_end: 7,
            noc_sel: 1,
            ordering: Ordering::Posted,
            ..Default::default()
        };

        let reg = Tlb2M::from(tlb.clone());
        let back: Tlb = reg.into();
        assert_eq!(back.local_offset, tlb.local_offset);
        assert_eq!(back.x_end, tlb.x_end);
        assert_eq!(back.y_end, tlb.y_end);
        assert_eq!(back.noc_sel, tlb.noc_sel);
        assert_eq!(back.ordering, tlb.ordering);
    }
}
