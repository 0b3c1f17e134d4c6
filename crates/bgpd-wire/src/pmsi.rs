//! PMSI_TUNNEL attribute (RFC 6514 section 5): names the P-Multicast Service Interface tunnel
//! used to carry a multicast VPN route's traffic. Modeled only far enough to extract the
//! upstream-assigned MPLS label; tunnel-type-specific identifiers are kept opaque.

use alloc::vec::Vec;
use nom::{
    number::complete::{
        be_u24,
        be_u8,
    },
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct PmsiTunnel {
    pub leaf_information_required: bool,
    pub tunnel_type: u8,
    pub mpls_label: u32,
    pub tunnel_identifier: Vec<u8>,
}

impl PmsiTunnel {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, flags) = be_u8(input)?;
        let (input, tunnel_type) = be_u8(input)?;
        let (input, mpls_label) = be_u24(input)?;
        Ok((
            &[],
            Self {
                leaf_information_required: flags & 0x01 != 0,
                tunnel_type,
                mpls_label,
                tunnel_identifier: input.to_vec(),
            },
        ))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.push(if self.leaf_information_required { 0x01 } else { 0 });
        buffer.push(self.tunnel_type);
        buffer.extend_from_slice(&self.mpls_label.to_be_bytes()[1..4]);
        buffer.extend_from_slice(&self.tunnel_identifier);
        buffer
    }
}
