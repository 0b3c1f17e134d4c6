//! Plain IPv4/IPv6 Unicast and Multicast NLRI (RFC 4271 section 4.3, widened to IPv6 by
//! RFC 4760): just a bit length followed by that many address bits.

use super::{
    decode_prefix,
    encode_prefix,
};
use crate::afi_safi::Afi;
use alloc::vec::Vec;
use bgpd_common::Prefix;
use nom::{
    number::complete::be_u8,
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct UnicastPrefix(pub Prefix);

impl UnicastPrefix {
    pub fn unpack(input: &[u8], afi: Afi) -> IResult<&[u8], Self> {
        let (input, bits) = be_u8(input)?;
        let (input, prefix) = decode_prefix(input, bits, afi)?;
        Ok((input, Self(prefix)))
    }

    pub fn pack(&self) -> Vec<u8> {
        encode_prefix(&self.0)
    }

    /// Legacy IPv4 NLRI as it appears directly in the withdrawn-routes and NLRI fields of an
    /// UPDATE message (RFC 4271 section 4.3), rather than inside an MP_REACH/MP_UNREACH
    /// attribute. Always IPv4; IPv6 and everything else travels via RFC 4760 instead.
    pub fn unpack_legacy(input: &[u8]) -> IResult<&[u8], Prefix> {
        let (input, bits) = be_u8(input)?;
        let (input, prefix) = decode_prefix(input, bits, Afi::Ipv4)?;
        Ok((input, prefix))
    }

    pub fn pack_legacy(prefix: &Prefix) -> Vec<u8> {
        encode_prefix(prefix)
    }
}
