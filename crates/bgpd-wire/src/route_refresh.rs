//! ROUTE-REFRESH message (RFC 2918): asks a peer to resend all routes for one family, used to
//! re-apply policy without tearing the session down.

use crate::afi_safi::{
    Afi,
    Safi,
};
use crate::BGPElement;
use alloc::vec::Vec;
use nom::number::complete::be_u8;
use nom::IResult;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct RouteRefreshMessage {
    pub afi: Afi,
    pub safi: Safi,
}

impl BGPElement for RouteRefreshMessage {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, afi) = Afi::unpack(input)?;
        let (input, _reserved) = be_u8(input)?;
        let (input, safi) = Safi::unpack(input)?;
        Ok((input, Self { afi, safi }))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend(self.afi.pack());
        buffer.push(0);
        buffer.extend(self.safi.pack());
        buffer
    }
}
