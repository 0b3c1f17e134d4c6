//! MPLS L3VPN NLRI (RFC 4364 section 4.3.4): a label stack as in RFC 8277, then an 8-byte
//! Route Distinguisher, then the customer prefix, all folded into one length-in-bits field.

use super::decode_prefix;
use crate::afi_safi::Afi;
use alloc::vec::Vec;
use bgpd_common::{
    Prefix,
    RouteDistinguisher,
};
use nom::{
    bytes::complete::take,
    number::complete::be_u8,
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct VpnPrefix {
    pub labels: Vec<u32>,
    pub route_distinguisher: RouteDistinguisher,
    pub prefix: Prefix,
}

impl VpnPrefix {
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
            if raw[2] & 0x01 != 0 {
                break;
            }
        }
        let (input, rd_bytes) = take(8usize)(input)?;
        consumed_bits += 64;
        let route_distinguisher = RouteDistinguisher::from_bytes(rd_bytes.try_into().unwrap());
        let prefix_bits = (total_bits as u32).saturating_sub(consumed_bits) as u8;
        let (input, prefix) = decode_prefix(input, prefix_bits, afi)?;
        Ok((input, Self { labels, route_distinguisher, prefix }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let total_bits = (self.labels.len() as u32 * 24) + 64 + self.prefix.mask as u32;
        buffer.push(total_bits as u8);
        let last = self.labels.len().saturating_sub(1);
        for (index, label) in self.labels.iter().enumerate() {
            let mut raw = (label << 4).to_be_bytes();
            if index == last {
                raw[3] |= 0x01;
            }
            buffer.extend_from_slice(&raw[1..4]);
        }
        buffer.extend_from_slice(&self.route_distinguisher.to_bytes());
        let length = self.prefix.byte_length();
        match self.prefix.address {
            core::net::IpAddr::V4(address) => buffer.extend_from_slice(&address.octets()[..length]),
            core::net::IpAddr::V6(address) => buffer.extend_from_slice(&address.octets()[..length]),
        }
        buffer
    }
}
