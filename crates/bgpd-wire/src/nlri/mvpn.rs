//! MVPN NLRI (RFC 6514 section 4): multicast VPN auto-discovery and join routes. The two
//! route types a typical ASM/SSM deployment actually sends are modeled; the others (Shared/
//! Source Tree Join, Leaf A-D) are preserved opaque.

use alloc::vec::Vec;
use bgpd_common::{
    Asn,
    RouteDistinguisher,
};
use core::net::IpAddr;
use nom::{
    bytes::complete::take,
    number::complete::be_u8,
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct IntraAsIPmsiAd {
    pub route_distinguisher: RouteDistinguisher,
    pub originator_as: Asn,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct SourceActiveAd {
    pub route_distinguisher: RouteDistinguisher,
    pub source: IpAddr,
    pub group: IpAddr,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum MvpnNlri {
    IntraAsIPmsiAd(IntraAsIPmsiAd),
    SourceActiveAd(SourceActiveAd),
    Unknown { route_type: u8, data: Vec<u8> },
}

fn take_addr(input: &[u8], v6: bool) -> IResult<&[u8], IpAddr> {
    if v6 {
        let (input, raw) = take(16usize)(input)?;
        Ok((input, IpAddr::from(<[u8; 16]>::try_from(raw).unwrap())))
    } else {
        let (input, raw) = take(4usize)(input)?;
        Ok((input, IpAddr::from(<[u8; 4]>::try_from(raw).unwrap())))
    }
}

impl MvpnNlri {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, route_type) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, body) = take(length as usize)(input)?;
        let value = match route_type {
            1 => {
                let (body, raw) = take(8usize)(body)?;
                let route_distinguisher = RouteDistinguisher::from_bytes(raw.try_into().unwrap());
                let (_, originator_as) = nom::number::complete::be_u32(body)?;
                Self::IntraAsIPmsiAd(IntraAsIPmsiAd { route_distinguisher, originator_as: Asn(originator_as) })
            }
            5 => {
                let (body, raw) = take(8usize)(body)?;
                let route_distinguisher = RouteDistinguisher::from_bytes(raw.try_into().unwrap());
                let (body, source_len_bits) = be_u8(body)?;
                let (body, source) = take_addr(body, source_len_bits > 32)?;
                let (body, group_len_bits) = be_u8(body)?;
                let (_, group) = take_addr(body, group_len_bits > 32)?;
                Self::SourceActiveAd(SourceActiveAd { route_distinguisher, source, group })
            }
            _ => Self::Unknown { route_type, data: body.to_vec() },
        };
        Ok((input, value))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let route_type = match self {
            Self::IntraAsIPmsiAd(route) => {
                body.extend_from_slice(&route.route_distinguisher.to_bytes());
                body.extend_from_slice(&route.originator_as.0.to_be_bytes());
                1
            }
            Self::SourceActiveAd(route) => {
                body.extend_from_slice(&route.route_distinguisher.to_bytes());
                match route.source {
                    IpAddr::V4(address) => {
                        body.push(32);
                        body.extend_from_slice(&address.octets());
                    }
                    IpAddr::V6(address) => {
                        body.push(128);
                        body.extend_from_slice(&address.octets());
                    }
                }
                match route.group {
                    IpAddr::V4(address) => {
                        body.push(32);
                        body.extend_from_slice(&address.octets());
                    }
                    IpAddr::V6(address) => {
                        body.push(128);
                        body.extend_from_slice(&address.octets());
                    }
                }
                5
            }
            Self::Unknown { route_type, data } => {
                body.extend_from_slice(data);
                *route_type
            }
        };
        let mut buffer = Vec::new();
        buffer.push(route_type);
        buffer.push(body.len() as u8);
        buffer.extend(body);
        buffer
    }
}
