//! BGP Prefix-SID attribute (draft-ietf-idr-bgp-prefix-sid): sub-TLVs binding a prefix to a
//! segment-routing index or SRGB. Label-Index and Originator SRGB (the two sub-TLVs an eBGP
//! SR deployment actually needs) are modeled; SRv6-specific sub-TLVs travel opaque.

use alloc::vec::Vec;
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u16,
        be_u24,
        be_u32,
        be_u8,
    },
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct SrgbRange {
    pub base: u32,
    pub range: u32,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum PrefixSidTlv {
    /// Type 1: a flat index into the advertising node's SRGB.
    LabelIndex(u32),
    /// Type 3: the advertising node's own SRGB(s), for resolving a received Label-Index.
    OriginatorSrgb(Vec<SrgbRange>),
    Unknown { tlv_type: u8, data: Vec<u8> },
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Default)]
pub struct PrefixSid(pub Vec<PrefixSidTlv>);

impl PrefixSid {
    pub fn unpack(mut input: &[u8]) -> IResult<&[u8], Self> {
        let mut tlvs = Vec::new();
        while !input.is_empty() {
            let (rest, tlv_type) = be_u8(input)?;
            let (rest, length) = be_u16(rest)?;
            let (rest, body) = take(length as usize)(rest)?;
            let tlv = match tlv_type {
                1 if body.len() == 7 => {
                    let (body, _flags) = be_u16(body)?;
                    let (_, index) = be_u32(body)?;
                    PrefixSidTlv::LabelIndex(index)
                }
                3 => {
                    let (mut body, _flags) = be_u16(body)?;
                    let mut ranges = Vec::new();
                    while body.len() >= 6 {
                        let (rest, _reserved) = be_u8(body)?;
                        let (rest, base) = be_u24(rest)?;
                        let (rest, range) = be_u24(rest)?;
                        ranges.push(SrgbRange { base, range });
                        body = rest;
                    }
                    PrefixSidTlv::OriginatorSrgb(ranges)
                }
                _ => PrefixSidTlv::Unknown { tlv_type, data: body.to_vec() },
            };
            tlvs.push(tlv);
            input = rest;
        }
        Ok((input, Self(tlvs)))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        for tlv in &self.0 {
            match tlv {
                PrefixSidTlv::LabelIndex(index) => {
                    buffer.push(1);
                    buffer.extend_from_slice(&7u16.to_be_bytes());
                    buffer.extend_from_slice(&0u16.to_be_bytes());
                    buffer.extend_from_slice(&index.to_be_bytes());
                }
                PrefixSidTlv::OriginatorSrgb(ranges) => {
                    buffer.push(3);
                    buffer.extend_from_slice(&((2 + ranges.len() * 6) as u16).to_be_bytes());
                    buffer.extend_from_slice(&0u16.to_be_bytes());
                    for range in ranges {
                        buffer.push(0);
                        buffer.extend_from_slice(&range.base.to_be_bytes()[1..4]);
                        buffer.extend_from_slice(&range.range.to_be_bytes()[1..4]);
                    }
                }
                PrefixSidTlv::Unknown { tlv_type, data } => {
                    buffer.push(*tlv_type);
                    buffer.extend_from_slice(&(data.len() as u16).to_be_bytes());
                    buffer.extend_from_slice(data);
                }
            }
        }
        buffer
    }
}
