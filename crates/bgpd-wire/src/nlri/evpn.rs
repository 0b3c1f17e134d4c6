//! EVPN NLRI (RFC 7432 section 7): a route-type tag followed by a length-prefixed,
//! per-type-shaped body. The four route types defined by the base RFC are modeled; anything
//! else (e.g. the RFC 9136 IP Prefix route) is kept opaque.

use alloc::vec::Vec;
use bgpd_common::{
    Esi,
    RouteDistinguisher,
};
use core::net::IpAddr;
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u24,
        be_u32,
        be_u8,
    },
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct EthernetAutoDiscovery {
    pub route_distinguisher: RouteDistinguisher,
    pub esi: Esi,
    pub ethernet_tag_id: u32,
    pub mpls_label: u32,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct MacIpAdvertisement {
    pub route_distinguisher: RouteDistinguisher,
    pub esi: Esi,
    pub ethernet_tag_id: u32,
    pub mac_address: [u8; 6],
    pub ip_address: Option<IpAddr>,
    pub mpls_label_1: u32,
    pub mpls_label_2: Option<u32>,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct InclusiveMulticastEthernetTag {
    pub route_distinguisher: RouteDistinguisher,
    pub ethernet_tag_id: u32,
    pub originator_ip: IpAddr,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct EthernetSegment {
    pub route_distinguisher: RouteDistinguisher,
    pub esi: Esi,
    pub originator_ip: IpAddr,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum EvpnNlri {
    EthernetAutoDiscovery(EthernetAutoDiscovery),
    MacIpAdvertisement(MacIpAdvertisement),
    InclusiveMulticastEthernetTag(InclusiveMulticastEthernetTag),
    EthernetSegment(EthernetSegment),
    Unknown { route_type: u8, data: Vec<u8> },
}

fn take_esi(input: &[u8]) -> IResult<&[u8], Esi> {
    let (input, raw) = take(10usize)(input)?;
    Ok((input, Esi(raw.try_into().unwrap())))
}

fn take_rd(input: &[u8]) -> IResult<&[u8], RouteDistinguisher> {
    let (input, raw) = take(8usize)(input)?;
    Ok((input, RouteDistinguisher::from_bytes(raw.try_into().unwrap())))
}

fn take_ip(input: &[u8]) -> IResult<&[u8], Option<IpAddr>> {
    let (input, length) = be_u8(input)?;
    match length {
        0 => Ok((input, None)),
        4 => {
            let (input, raw) = take(4usize)(input)?;
            Ok((input, Some(IpAddr::from(<[u8; 4]>::try_from(raw).unwrap()))))
        }
        16 => {
            let (input, raw) = take(16usize)(input)?;
            Ok((input, Some(IpAddr::from(<[u8; 16]>::try_from(raw).unwrap()))))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::LengthValue))),
    }
}

impl EvpnNlri {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, route_type) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, body) = take(length as usize)(input)?;
        let value = match route_type {
            1 => {
                let (body, route_distinguisher) = take_rd(body)?;
                let (body, esi) = take_esi(body)?;
                let (body, ethernet_tag_id) = be_u32(body)?;
                let (_, mpls_label) = be_u24(body)?;
                Self::EthernetAutoDiscovery(EthernetAutoDiscovery {
                    route_distinguisher,
                    esi,
                    ethernet_tag_id,
                    mpls_label,
                })
            }
            2 => {
                let (body, route_distinguisher) = take_rd(body)?;
                let (body, esi) = take_esi(body)?;
                let (body, ethernet_tag_id) = be_u32(body)?;
                let (body, mac_length) = be_u8(body)?;
                let (body, mac_raw) = take(mac_length as usize / 8)(body)?;
                let (body, ip_address) = take_ip(body)?;
                let (body, mpls_label_1) = be_u24(body)?;
                let mpls_label_2 = if body.len() >= 3 {
                    let (_, label) = be_u24(body)?;
                    Some(label)
                } else {
                    None
                };
                Self::MacIpAdvertisement(MacIpAdvertisement {
                    route_distinguisher,
                    esi,
                    ethernet_tag_id,
                    mac_address: mac_raw.try_into().unwrap_or([0u8; 6]),
                    ip_address,
                    mpls_label_1,
                    mpls_label_2,
                })
            }
            3 => {
                let (body, route_distinguisher) = take_rd(body)?;
                let (body, ethernet_tag_id) = be_u32(body)?;
                let (_, originator_ip) = take_ip(body)?;
                Self::InclusiveMulticastEthernetTag(InclusiveMulticastEthernetTag {
                    route_distinguisher,
                    ethernet_tag_id,
                    originator_ip: originator_ip.unwrap_or(IpAddr::V4(core::net::Ipv4Addr::UNSPECIFIED)),
                })
            }
            4 => {
                let (body, route_distinguisher) = take_rd(body)?;
                let (body, esi) = take_esi(body)?;
                let (_, originator_ip) = take_ip(body)?;
                Self::EthernetSegment(EthernetSegment {
                    route_distinguisher,
                    esi,
                    originator_ip: originator_ip.unwrap_or(IpAddr::V4(core::net::Ipv4Addr::UNSPECIFIED)),
                })
            }
            _ => Self::Unknown { route_type, data: body.to_vec() },
        };
        Ok((input, value))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let route_type = match self {
            Self::EthernetAutoDiscovery(route) => {
                body.extend_from_slice(&route.route_distinguisher.to_bytes());
                body.extend_from_slice(&route.esi.0);
                body.extend_from_slice(&route.ethernet_tag_id.to_be_bytes());
                body.extend_from_slice(&route.mpls_label.to_be_bytes()[1..4]);
                1
            }
            Self::MacIpAdvertisement(route) => {
                body.extend_from_slice(&route.route_distinguisher.to_bytes());
                body.extend_from_slice(&route.esi.0);
                body.extend_from_slice(&route.ethernet_tag_id.to_be_bytes());
                body.push(48);
                body.extend_from_slice(&route.mac_address);
                match route.ip_address {
                    None => body.push(0),
                    Some(IpAddr::V4(address)) => {
                        body.push(4);
                        body.extend_from_slice(&address.octets());
                    }
                    Some(IpAddr::V6(address)) => {
                        body.push(16);
                        body.extend_from_slice(&address.octets());
                    }
                }
                body.extend_from_slice(&route.mpls_label_1.to_be_bytes()[1..4]);
                if let Some(label) = route.mpls_label_2 {
                    body.extend_from_slice(&label.to_be_bytes()[1..4]);
                }
                2
            }
            Self::InclusiveMulticastEthernetTag(route) => {
                body.extend_from_slice(&route.route_distinguisher.to_bytes());
                body.extend_from_slice(&route.ethernet_tag_id.to_be_bytes());
                match route.originator_ip {
                    IpAddr::V4(address) => {
                        body.push(4);
                        body.extend_from_slice(&address.octets());
                    }
                    IpAddr::V6(address) => {
                        body.push(16);
                        body.extend_from_slice(&address.octets());
                    }
                }
                3
            }
            Self::EthernetSegment(route) => {
                body.extend_from_slice(&route.route_distinguisher.to_bytes());
                body.extend_from_slice(&route.esi.0);
                match route.originator_ip {
                    IpAddr::V4(address) => {
                        body.push(4);
                        body.extend_from_slice(&address.octets());
                    }
                    IpAddr::V6(address) => {
                        body.push(16);
                        body.extend_from_slice(&address.octets());
                    }
                }
                4
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
