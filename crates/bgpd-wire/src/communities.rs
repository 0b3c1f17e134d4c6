//! COMMUNITIES and its extended/large variants (RFC 1997, RFC 4360, RFC 5668, RFC 8092,
//! RFC 5701). All four share the same structural idea — an opaque tagged tuple attached to a
//! route — but differ in width and in whether the "administrator" half is an ASN or address.

use alloc::vec::Vec;
use bgpd_common::Asn;
use bitflags::bitflags;
use core::net::{
    Ipv4Addr,
    Ipv6Addr,
};
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u16,
        be_u32,
    },
    IResult,
};

/// RFC 1997 BGP Communities Attribute: type code 8, optional transitive.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct Community {
    pub global_administrator: u16,
    pub local_administrator: u16,
}

impl Community {
    pub const NO_EXPORT: Community = Community { global_administrator: 0xFFFF, local_administrator: 0xFF01 };
    pub const NO_ADVERTISE: Community = Community { global_administrator: 0xFFFF, local_administrator: 0xFF02 };
    pub const NO_EXPORT_SUBCONFED: Community = Community { global_administrator: 0xFFFF, local_administrator: 0xFF03 };

    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, global_administrator) = be_u16(input)?;
        let (input, local_administrator) = be_u16(input)?;
        Ok((input, Self { global_administrator, local_administrator }))
    }

    pub fn pack(&self) -> [u8; 4] {
        let mut buffer = [0u8; 4];
        buffer[0..2].copy_from_slice(&self.global_administrator.to_be_bytes());
        buffer[2..4].copy_from_slice(&self.local_administrator.to_be_bytes());
        buffer
    }
}

bitflags! {
    /// High bits of an extended community's type byte (RFC 4360 section 3).
    #[derive(Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash, Copy)]
    pub struct ExtendedCommunityFlags: u8 {
        const TRANSITIVE = 0b0100_0000;
    }
}

/// RFC 4360 / RFC 5668 8-byte Extended Community: type code 16, optional transitive; type
/// code 25 carries the IPv6-address-specific variant (RFC 5701).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub enum ExtendedCommunity {
    /// Two-octet-AS-specific (RFC 4360 section 3.1): subtype + 2-byte ASN + 4-byte local.
    Asn2 { subtype: u8, transitive: bool, global_administrator: u16, local_administrator: u32 },
    /// IPv4-address-specific (RFC 4360 section 3.2): subtype + IPv4 + 2-byte local.
    Ipv4 { subtype: u8, transitive: bool, global_administrator: Ipv4Addr, local_administrator: u16 },
    /// Four-octet-AS-specific (RFC 5668 section 2): subtype + 4-byte ASN + 2-byte local.
    Asn4 { subtype: u8, transitive: bool, global_administrator: Asn, local_administrator: u16 },
    /// Opaque (RFC 4360 section 3.3): subtype + 6 raw bytes, used by Flow-Spec traffic
    /// actions (RFC 8955 section 7) among others.
    Opaque { subtype: u8, transitive: bool, value: [u8; 6] },
}

impl ExtendedCommunity {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, type_byte) = nom::number::complete::be_u8(input)?;
        let (input, subtype) = nom::number::complete::be_u8(input)?;
        let transitive = type_byte & 0x40 == 0;
        let kind = type_byte & !0x40;
        match kind {
            0x00 => {
                let (input, global_administrator) = be_u16(input)?;
                let (input, local_administrator) = be_u32(input)?;
                Ok((input, Self::Asn2 { subtype, transitive, global_administrator, local_administrator }))
            }
            0x01 => {
                let (input, global_administrator) = be_u32(input)?;
                let (input, local_administrator) = be_u16(input)?;
                Ok((
                    input,
                    Self::Ipv4 {
                        subtype,
                        transitive,
                        global_administrator: Ipv4Addr::from_bits(global_administrator),
                        local_administrator,
                    },
                ))
            }
            0x02 => {
                let (input, global_administrator) = be_u32(input)?;
                let (input, local_administrator) = be_u16(input)?;
                Ok((
                    input,
                    Self::Asn4 { subtype, transitive, global_administrator: Asn(global_administrator), local_administrator },
                ))
            }
            _ => {
                let (input, value) = take(6usize)(input)?;
                Ok((input, Self::Opaque { subtype, transitive, value: value.try_into().unwrap() }))
            }
        }
    }

    pub fn pack(&self) -> [u8; 8] {
        let mut buffer = [0u8; 8];
        let (kind, transitive) = match self {
            Self::Asn2 { transitive, .. } => (0x00, *transitive),
            Self::Ipv4 { transitive, .. } => (0x01, *transitive),
            Self::Asn4 { transitive, .. } => (0x02, *transitive),
            Self::Opaque { transitive, .. } => (0x03, *transitive),
        };
        buffer[0] = kind | if transitive { 0 } else { 0x40 };
        buffer[1] = match self {
            Self::Asn2 { subtype, .. } => *subtype,
            Self::Ipv4 { subtype, .. } => *subtype,
            Self::Asn4 { subtype, .. } => *subtype,
            Self::Opaque { subtype, .. } => *subtype,
        };
        match self {
            Self::Asn2 { global_administrator, local_administrator, .. } => {
                buffer[2..4].copy_from_slice(&global_administrator.to_be_bytes());
                buffer[4..8].copy_from_slice(&local_administrator.to_be_bytes());
            }
            Self::Ipv4 { global_administrator, local_administrator, .. } => {
                buffer[2..6].copy_from_slice(&global_administrator.octets());
                buffer[6..8].copy_from_slice(&local_administrator.to_be_bytes());
            }
            Self::Asn4 { global_administrator, local_administrator, .. } => {
                buffer[2..6].copy_from_slice(&global_administrator.0.to_be_bytes());
                buffer[6..8].copy_from_slice(&local_administrator.to_be_bytes());
            }
            Self::Opaque { value, .. } => buffer[2..8].copy_from_slice(value),
        }
        buffer
    }
}

/// RFC 5701 IPv6-Address-Specific Extended Community: type code 25, 20 bytes (16-byte IPv6 +
/// 2-byte subtype prefix + 2-byte local administrator).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct Ipv6ExtendedCommunity {
    pub subtype: u8,
    pub transitive: bool,
    pub global_administrator: Ipv6Addr,
    pub local_administrator: u16,
}

impl Ipv6ExtendedCommunity {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, type_byte) = nom::number::complete::be_u8(input)?;
        let (input, subtype) = nom::number::complete::be_u8(input)?;
        let (input, address) = nom::number::complete::be_u128(input)?;
        let (input, local_administrator) = be_u16(input)?;
        Ok((
            input,
            Self {
                subtype,
                transitive: type_byte & 0x40 == 0,
                global_administrator: Ipv6Addr::from_bits(address),
                local_administrator,
            },
        ))
    }

    pub fn pack(&self) -> [u8; 20] {
        let mut buffer = [0u8; 20];
        buffer[0] = 0x00 | if self.transitive { 0 } else { 0x40 };
        buffer[1] = self.subtype;
        buffer[2..18].copy_from_slice(&self.global_administrator.octets());
        buffer[18..20].copy_from_slice(&self.local_administrator.to_be_bytes());
        buffer
    }
}

/// RFC 8092 Large Community: type code 32, optional transitive, three 4-byte fields.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct LargeCommunity {
    pub global_administrator: u32,
    pub local_data_part_1: u32,
    pub local_data_part_2: u32,
}

impl LargeCommunity {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, global_administrator) = be_u32(input)?;
        let (input, local_data_part_1) = be_u32(input)?;
        let (input, local_data_part_2) = be_u32(input)?;
        Ok((input, Self { global_administrator, local_data_part_1, local_data_part_2 }))
    }

    pub fn pack(&self) -> [u8; 12] {
        let mut buffer = [0u8; 12];
        buffer[0..4].copy_from_slice(&self.global_administrator.to_be_bytes());
        buffer[4..8].copy_from_slice(&self.local_data_part_1.to_be_bytes());
        buffer[8..12].copy_from_slice(&self.local_data_part_2.to_be_bytes());
        buffer
    }
}

pub fn unpack_many_communities(mut input: &[u8]) -> IResult<&[u8], Vec<Community>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (rest, community) = Community::unpack(input)?;
        out.push(community);
        input = rest;
    }
    Ok((input, out))
}

pub fn unpack_many_extended(mut input: &[u8]) -> IResult<&[u8], Vec<ExtendedCommunity>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (rest, community) = ExtendedCommunity::unpack(input)?;
        out.push(community);
        input = rest;
    }
    Ok((input, out))
}

pub fn unpack_many_ipv6_extended(mut input: &[u8]) -> IResult<&[u8], Vec<Ipv6ExtendedCommunity>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (rest, community) = Ipv6ExtendedCommunity::unpack(input)?;
        out.push(community);
        input = rest;
    }
    Ok((input, out))
}

pub fn unpack_many_large(mut input: &[u8]) -> IResult<&[u8], Vec<LargeCommunity>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (rest, community) = LargeCommunity::unpack(input)?;
        out.push(community);
        input = rest;
    }
    Ok((input, out))
}
