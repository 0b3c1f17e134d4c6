//! Labeled Unicast NLRI (RFC 8277 section 2): an MPLS label stack prepended to an otherwise
//! ordinary unicast prefix, with the stack's bits folded into the single length byte.

use super::decode_prefix;
use crate::afi_safi::Afi;
use alloc::vec::Vec;
use bgpd_common::Prefix;
use nom::{
    bytes::complete::take,
    number::complete::be_u8,
    IResult,
};

/// RFC 8277 section 2.1's "Compatibility" withdraw label: a session withdrawing a labeled
/// prefix is not expected to know which label it originally advertised, so it sends this value
/// back instead.
pub const WITHDRAW_COMPATIBILITY_LABEL: u32 = 0x80_0000;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct LabeledPrefix {
    pub labels: Vec<u32>,
    pub prefix: Prefix,
}

impl LabeledPrefix {
    pub fn unpack(input: &[u8], afi: Afi) -> IResult<&[u8], Self> {
        let (mut input, total_bits) = be_u8(input)?;
        let mut labels = Vec::new();
        let mut consumed_bits: u32 = 0;
        loop {
            let (rest, raw) = take(3usize)(input)?;
            input = rest;
            let value = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
            labels.push(value >> 4);
            consumed_bits += 24;
            let bottom_of_stack = raw[2] & 0x01 != 0;
            if bottom_of_stack || value >> 4 == WITHDRAW_COMPATIBILITY_LABEL {
                break;
            }
        }
        let prefix_bits = (total_bits as u32).saturating_sub(consumed_bits) as u8;
        let (input, prefix) = decode_prefix(input, prefix_bits, afi)?;
        Ok((input, Self { labels, prefix }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let total_bits = (self.labels.len() as u32 * 24) + self.prefix.mask as u32;
        buffer.push(total_bits as u8);
        let last = self.labels.len().saturating_sub(1);
        for (index, label) in self.labels.iter().enumerate() {
            let mut raw = (label << 4).to_be_bytes();
            if index == last {
                raw[3] |= 0x01;
            }
            buffer.extend_from_slice(&raw[1..4]);
        }
        let length = self.prefix.byte_length();
        match self.prefix.address {
            core::net::IpAddr::V4(address) => buffer.extend_from_slice(&address.octets()[..length]),
            core::net::IpAddr::V6(address) => buffer.extend_from_slice(&address.octets()[..length]),
        }
        buffer
    }
}
