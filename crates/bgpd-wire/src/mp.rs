//! MP_REACH_NLRI / MP_UNREACH_NLRI (RFC 4760 sections 3-4): the path attributes that carry
//! reachability for every address family other than legacy IPv4 Unicast.

use crate::afi_safi::{
    Afi,
    Safi,
};
use crate::context::Context;
use crate::nlri::{
    Nlri,
    PathInfo,
};
use crate::path_attr::{
    pack_mp_next_hop,
    unpack_mp_next_hop,
    MpNextHop,
};
use alloc::vec::Vec;
use nom::{
    number::complete::be_u32,
    IResult,
};

/// One NLRI entry, optionally prefixed with an ADD-PATH path identifier (RFC 7911 section 3)
/// when the negotiated family has ADD-PATH enabled in the relevant direction.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct AddressedNlri {
    pub path_info: Option<PathInfo>,
    pub nlri: Nlri,
}

fn unpack_many_addressed(
    mut input: &[u8],
    afi: Afi,
    safi: Safi,
    add_path: bool,
) -> IResult<&[u8], Vec<AddressedNlri>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (rest, path_info) = if add_path {
            let (rest, id) = be_u32(input)?;
            (rest, Some(PathInfo(id)))
        } else {
            (input, None)
        };
        let (rest, nlri) = Nlri::unpack(rest, afi, safi)?;
        out.push(AddressedNlri { path_info, nlri });
        input = rest;
    }
    Ok((input, out))
}

fn pack_many_addressed(entries: &[AddressedNlri]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for entry in entries {
        if let Some(path_info) = entry.path_info {
            buffer.extend_from_slice(&path_info.0.to_be_bytes());
        }
        buffer.extend(entry.nlri.pack());
    }
    buffer
}

/// MP_REACH_NLRI (RFC 4760 section 3): type code 14, optional non-transitive.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct MpReachNlri {
    pub afi: Afi,
    pub safi: Safi,
    pub next_hop: MpNextHop,
    pub nlri: Vec<AddressedNlri>,
}

impl MpReachNlri {
    pub fn unpack<'a>(input: &'a [u8], context: &Context) -> IResult<&'a [u8], Self> {
        let (input, afi) = Afi::unpack(input)?;
        let (input, safi) = Safi::unpack(input)?;
        let (input, next_hop) = unpack_mp_next_hop(input, afi)?;
        let (input, _reserved) = nom::number::complete::be_u8(input)?;
        let add_path = context.add_path_for(afi, safi).receive;
        let (input, nlri) = unpack_many_addressed(input, afi, safi, add_path)?;
        Ok((input, Self { afi, safi, next_hop, nlri }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend(self.afi.pack());
        buffer.extend(self.safi.pack());
        buffer.extend(pack_mp_next_hop(&self.next_hop));
        buffer.push(0);
        buffer.extend(pack_many_addressed(&self.nlri));
        buffer
    }
}

/// MP_UNREACH_NLRI (RFC 4760 section 4): type code 15, optional non-transitive.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct MpUnreachNlri {
    pub afi: Afi,
    pub safi: Safi,
    pub nlri: Vec<AddressedNlri>,
}

impl MpUnreachNlri {
    pub fn unpack<'a>(input: &'a [u8], context: &Context) -> IResult<&'a [u8], Self> {
        let (input, afi) = Afi::unpack(input)?;
        let (input, safi) = Safi::unpack(input)?;
        let add_path = context.add_path_for(afi, safi).receive;
        let (input, nlri) = unpack_many_addressed(input, afi, safi, add_path)?;
        Ok((input, Self { afi, safi, nlri }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend(self.afi.pack());
        buffer.extend(self.safi.pack());
        buffer.extend(pack_many_addressed(&self.nlri));
        buffer
    }
}
