//! Path attributes defined by the base RFC (RFC 4271 section 5) plus the 4-byte ASN
//! transition attributes (RFC 6793 section 4.2.3) that travel alongside AS_PATH/AGGREGATOR
//! when a session has not negotiated 4-byte ASNs end to end.

use alloc::vec::Vec;
use bgpd_common::Asn;
use bitflags::bitflags;
use core::net::{
    Ipv4Addr,
    Ipv6Addr,
};
use nom::{
    bytes::complete::take,
    error::{
        Error,
        ErrorKind,
    },
    multi::many_m_n,
    number::complete::{
        be_u16,
        be_u32,
        be_u8,
    },
    IResult,
    Parser,
};

bitflags! {
    /// Path attribute flags (RFC 4271 section 4.3).
    #[derive(Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash, Copy)]
    pub struct PathAttributeFlags: u8 {
        const OPTIONAL = 0b1000_0000;
        const TRANSITIVE = 0b0100_0000;
        const PARTIAL = 0b0010_0000;
        const EXTENDED_LENGTH = 0b0001_0000;
    }
}

/// ORIGIN (RFC 4271 section 5.1.1): well-known mandatory, type code 1.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl From<u8> for Origin {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Igp,
            1 => Self::Egp,
            _ => Self::Incomplete,
        }
    }
}

impl From<Origin> for u8 {
    fn from(value: Origin) -> Self {
        value as u8
    }
}

/// One segment of an AS_PATH (RFC 4271 section 4.3, types extended by RFC 5065
/// confederations). Segment values are 2 or 4 bytes wide depending on whether the session
/// negotiated 4-byte ASNs (RFC 6793).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum AsPathSegment {
    Sequence(Vec<u32>),
    Set(Vec<u32>),
    ConfedSequence(Vec<u32>),
    ConfedSet(Vec<u32>),
}

impl AsPathSegment {
    fn kind(&self) -> u8 {
        match self {
            Self::Set(_) => 1,
            Self::Sequence(_) => 2,
            Self::ConfedSequence(_) => 3,
            Self::ConfedSet(_) => 4,
        }
    }

    fn values(&self) -> &[u32] {
        match self {
            Self::Sequence(v) | Self::Set(v) | Self::ConfedSequence(v) | Self::ConfedSet(v) => v,
        }
    }

    fn from_kind(kind: u8, values: Vec<u32>) -> Option<Self> {
        match kind {
            1 => Some(Self::Set(values)),
            2 => Some(Self::Sequence(values)),
            3 => Some(Self::ConfedSequence(values)),
            4 => Some(Self::ConfedSet(values)),
            _ => None,
        }
    }

    pub fn unpack(input: &[u8], four_octet_asn: bool) -> IResult<&[u8], Self> {
        let (input, kind) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, values) = if four_octet_asn {
            many_m_n(length as usize, length as usize, be_u32).parse(input)?
        } else {
            let (input, values) = many_m_n(length as usize, length as usize, be_u16).parse(input)?;
            (input, values.into_iter().map(u32::from).collect())
        };
        let segment =
            Self::from_kind(kind, values).ok_or_else(|| nom::Err::Error(Error::new(input, ErrorKind::Tag)))?;
        Ok((input, segment))
    }

    pub fn pack(&self, four_octet_asn: bool) -> Vec<u8> {
        let values = self.values();
        let mut buffer = Vec::new();
        buffer.push(self.kind());
        buffer.push(values.len() as u8);
        for value in values {
            if four_octet_asn {
                buffer.extend_from_slice(&value.to_be_bytes());
            } else {
                buffer.extend_from_slice(&(*value as u16).to_be_bytes());
            }
        }
        buffer
    }
}

/// AS_PATH (RFC 4271 section 5.1.2): well-known mandatory, type code 2.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Default)]
pub struct AsPath(pub Vec<AsPathSegment>);

impl AsPath {
    pub fn unpack(mut input: &[u8], four_octet_asn: bool) -> IResult<&[u8], Self> {
        let mut segments = Vec::new();
        while !input.is_empty() {
            let (rest, segment) = AsPathSegment::unpack(input, four_octet_asn)?;
            segments.push(segment);
            input = rest;
        }
        Ok((input, Self(segments)))
    }

    pub fn pack(&self, four_octet_asn: bool) -> Vec<u8> {
        let mut buffer = Vec::new();
        for segment in &self.0 {
            buffer.extend(segment.pack(four_octet_asn));
        }
        buffer
    }

    /// Every ASN named by this path, in path order, flattening segment structure. Used by the
    /// daemon to prepend the local ASN on eBGP egress.
    pub fn iter_asns(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().flat_map(|segment| segment.values().iter().copied())
    }
}

/// AS4_PATH (RFC 6793 section 4.2.3): optional transitive, type code 17. Carries the real
/// 4-byte-ASN path when the session is not itself 4-byte-ASN-capable and AS_PATH had to
/// substitute AS_TRANS.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Default)]
pub struct As4Path(pub Vec<AsPathSegment>);

impl As4Path {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        AsPath::unpack(input, true).map(|(rest, path)| (rest, Self(path.0)))
    }

    pub fn pack(&self) -> Vec<u8> {
        AsPath(self.0.clone()).pack(true)
    }
}

/// Reconciles a legacy 2-byte AS_PATH (with AS_TRANS placeholders) against the parallel
/// AS4_PATH attribute, per RFC 6793 section 4.2.3: the AS4_PATH segments replace the trailing
/// portion of AS_PATH that they cover, preferring the 4-byte values wherever both are present.
pub fn merge_as4_path(as_path: &AsPath, as4_path: Option<&As4Path>) -> AsPath {
    let Some(as4_path) = as4_path else {
        return as_path.clone();
    };
    let as_path_len: usize = as_path.iter_asns().count();
    let as4_len: usize = as4_path.0.iter().flat_map(|s| s.values().iter()).count();
    if as4_len == 0 || as4_len > as_path_len {
        return as_path.clone();
    }
    let keep = as_path_len - as4_len;
    let mut merged = Vec::new();
    let mut remaining = keep;
    for segment in &as_path.0 {
        let values = segment.values();
        if remaining >= values.len() {
            merged.push(segment.clone());
            remaining -= values.len();
        } else if remaining > 0 {
            let kept: Vec<u32> = values[..remaining].to_vec();
            merged.push(AsPathSegment::from_kind(
                match segment {
                    AsPathSegment::Sequence(_) => 2,
                    AsPathSegment::Set(_) => 1,
                    AsPathSegment::ConfedSequence(_) => 3,
                    AsPathSegment::ConfedSet(_) => 4,
                },
                kept,
            )
            .expect("segment kind round-trips"));
            remaining = 0;
        }
    }
    merged.extend(as4_path.0.iter().cloned());
    AsPath(merged)
}

/// NEXT_HOP (RFC 4271 section 5.1.3): well-known mandatory for IPv4 unicast, type code 3.
/// Non-IPv4-unicast next hops travel inside MP_REACH_NLRI instead (RFC 4760 section 3).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct NextHop(pub Ipv4Addr);

/// AGGREGATOR (RFC 4271 section 5.1.7, widened by RFC 6793 section 4.2.3): optional
/// transitive, type code 7.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct Aggregator {
    pub asn: Asn,
    pub address: Ipv4Addr,
}

/// AS4_AGGREGATOR (RFC 6793 section 4.2.3): optional transitive, type code 18. Parallels
/// AGGREGATOR the same way AS4_PATH parallels AS_PATH.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct As4Aggregator {
    pub asn: Asn,
    pub address: Ipv4Addr,
}

pub fn unpack_origin(data: &[u8]) -> IResult<&[u8], Origin> {
    let (rest, value) = be_u8(data)?;
    Ok((rest, Origin::from(value)))
}

pub fn unpack_next_hop(data: &[u8]) -> IResult<&[u8], NextHop> {
    let (rest, value) = be_u32(data)?;
    Ok((rest, NextHop(Ipv4Addr::from_bits(value))))
}

pub fn unpack_aggregator(data: &[u8], four_octet_asn: bool) -> IResult<&[u8], Aggregator> {
    if four_octet_asn {
        let (data, asn) = be_u32(data)?;
        let (data, addr) = be_u32(data)?;
        Ok((data, Aggregator { asn: Asn(asn), address: Ipv4Addr::from_bits(addr) }))
    } else {
        let (data, asn) = be_u16(data)?;
        let (data, addr) = be_u32(data)?;
        Ok((data, Aggregator { asn: Asn(asn as u32), address: Ipv4Addr::from_bits(addr) }))
    }
}

pub fn unpack_as4_aggregator(data: &[u8]) -> IResult<&[u8], As4Aggregator> {
    let (data, asn) = be_u32(data)?;
    let (data, addr) = be_u32(data)?;
    Ok((data, As4Aggregator { asn: Asn(asn), address: Ipv4Addr::from_bits(addr) }))
}

pub fn pack_aggregator(aggregator: &Aggregator, four_octet_asn: bool) -> Vec<u8> {
    let mut buffer = Vec::new();
    if four_octet_asn || !aggregator.asn.is_representable_as_2byte() {
        buffer.extend_from_slice(&aggregator.asn.0.to_be_bytes());
    } else {
        buffer.extend_from_slice(&(aggregator.asn.0 as u16).to_be_bytes());
    }
    buffer.extend_from_slice(&aggregator.address.octets());
    buffer
}

/// Next hop as carried inside MP_REACH_NLRI (RFC 4760 section 3): length-prefixed, and for
/// IPv6 optionally followed by a link-local address (two 16-byte addresses back to back).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct MpNextHop {
    pub global: core::net::IpAddr,
    pub link_local: Option<Ipv6Addr>,
}

pub fn unpack_mp_next_hop(input: &[u8], afi: crate::afi_safi::Afi) -> IResult<&[u8], MpNextHop> {
    use crate::afi_safi::Afi;
    let (input, length) = be_u8(input)?;
    let (input, data) = take(length)(input)?;
    match (afi, length) {
        (Afi::Ipv4, 4) => {
            let (_, value) = be_u32(data)?;
            Ok((input, MpNextHop { global: core::net::IpAddr::V4(Ipv4Addr::from_bits(value)), link_local: None }))
        }
        (Afi::Ipv6, 16) => {
            let (_, value) = nom::number::complete::be_u128(data)?;
            Ok((input, MpNextHop { global: core::net::IpAddr::V6(Ipv6Addr::from_bits(value)), link_local: None }))
        }
        (Afi::Ipv6, 32) => {
            let (rest, global) = nom::number::complete::be_u128(data)?;
            let (_, local) = nom::number::complete::be_u128(rest)?;
            Ok((
                input,
                MpNextHop {
                    global: core::net::IpAddr::V6(Ipv6Addr::from_bits(global)),
                    link_local: Some(Ipv6Addr::from_bits(local)),
                },
            ))
        }
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Fail))),
    }
}

pub fn pack_mp_next_hop(next_hop: &MpNextHop) -> Vec<u8> {
    let mut body = Vec::new();
    match next_hop.global {
        core::net::IpAddr::V4(addr) => body.extend_from_slice(&addr.octets()),
        core::net::IpAddr::V6(addr) => body.extend_from_slice(&addr.octets()),
    }
    if let Some(local) = next_hop.link_local {
        body.extend_from_slice(&local.octets());
    }
    let mut buffer = Vec::new();
    buffer.push(body.len() as u8);
    buffer.extend(body);
    buffer
}
