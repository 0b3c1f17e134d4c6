//! BGP Mobile User Plane NLRI (draft-ietf-bess-bgp-mup-safi), carried opaque: the draft is
//! still evolving at the time of writing, so only the route-type tag and Route Distinguisher
//! needed to route these NLRI to the right VRF are parsed; the rest travels as raw bytes.

use alloc::vec::Vec;
use bgpd_common::RouteDistinguisher;
use nom::{
    bytes::complete::take,
    number::complete::be_u8,
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct MupNlri {
    pub route_type: u8,
    pub route_distinguisher: RouteDistinguisher,
    pub data: Vec<u8>,
}

impl MupNlri {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, architecture_type) = be_u8(input)?;
        let (input, route_type) = be_u8(input)?;
        let _ = architecture_type;
        let (input, length) = be_u8(input)?;
        let (input, body) = take(length as usize)(input)?;
        let (body, rd_raw) = take(8usize)(body)?;
        let route_distinguisher = RouteDistinguisher::from_bytes(rd_raw.try_into().unwrap());
        Ok((input, Self { route_type, route_distinguisher, data: body.to_vec() }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.route_distinguisher.to_bytes());
        body.extend_from_slice(&self.data);
        let mut buffer = Vec::new();
        buffer.push(1);
        buffer.push(self.route_type);
        buffer.push(body.len() as u8);
        buffer.extend(body);
        buffer
    }
}
