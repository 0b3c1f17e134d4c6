//! Flow Specification NLRI (RFC 8955 section 4): an ordered list of typed match components
//! describing a traffic pattern, instead of a destination to route towards. RFC 8955bis VPN
//! Flow-Spec (SAFI 134) prepends a Route Distinguisher ahead of the same component list.

use alloc::vec::Vec;
use bgpd_common::{
    Prefix,
    RouteDistinguisher,
};
use core::net::{
    IpAddr,
    Ipv4Addr,
};
use nom::{
    bytes::complete::take,
    number::complete::be_u8,
    IResult,
};

/// A single numeric-comparison operator run (RFC 8955 section 4.2.1): protocol, port, ICMP
/// type/code, packet length and DSCP components all share this shape.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct NumericOp {
    pub and: bool,
    pub lt: bool,
    pub gt: bool,
    pub eq: bool,
    pub value: u64,
    pub value_len: u8,
}

impl NumericOp {
    fn unpack(input: &[u8]) -> IResult<&[u8], (bool, Self)> {
        let (input, op) = be_u8(input)?;
        let length = 1usize << ((op & 0x30) >> 4);
        let (input, raw) = take(length)(input)?;
        let mut value = 0u64;
        for byte in raw {
            value = (value << 8) | *byte as u64;
        }
        let end = op & 0x80 != 0;
        let parsed = Self {
            and: op & 0x40 != 0,
            lt: op & 0x04 != 0,
            gt: op & 0x02 != 0,
            eq: op & 0x01 != 0,
            value,
            value_len: length as u8,
        };
        Ok((input, (end, parsed)))
    }

    fn pack(&self, end: bool) -> Vec<u8> {
        let length_bits = match self.value_len {
            1 => 0,
            2 => 1,
            4 => 2,
            _ => 3,
        };
        let mut op = (length_bits << 4)
            | (if self.and { 0x40 } else { 0 })
            | (if self.lt { 0x04 } else { 0 })
            | (if self.gt { 0x02 } else { 0 })
            | (if self.eq { 0x01 } else { 0 });
        if end {
            op |= 0x80;
        }
        let mut buffer = alloc::vec![op];
        buffer.extend_from_slice(&self.value.to_be_bytes()[8 - self.value_len as usize..]);
        buffer
    }
}

/// A single bitmask-comparison operator run (RFC 8955 section 4.2.2): TCP flags and fragment
/// type components share this shape.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct BitmaskOp {
    pub and: bool,
    pub not: bool,
    pub matches: bool,
    pub value: u16,
    pub value_len: u8,
}

impl BitmaskOp {
    fn unpack(input: &[u8]) -> IResult<&[u8], (bool, Self)> {
        let (input, op) = be_u8(input)?;
        let length = 1usize << ((op & 0x30) >> 4);
        let (input, raw) = take(length)(input)?;
        let mut value = 0u16;
        for byte in raw {
            value = (value << 8) | *byte as u16;
        }
        let end = op & 0x80 != 0;
        let parsed = Self {
            and: op & 0x40 != 0,
            not: op & 0x02 != 0,
            matches: op & 0x01 != 0,
            value,
            value_len: length as u8,
        };
        Ok((input, (end, parsed)))
    }

    fn pack(&self, end: bool) -> Vec<u8> {
        let length_bits = match self.value_len {
            1 => 0,
            2 => 1,
            4 => 2,
            _ => 3,
        };
        let mut op =
            (length_bits << 4) | (if self.and { 0x40 } else { 0 }) | (if self.not { 0x02 } else { 0 }) | (if self.matches { 0x01 } else { 0 });
        if end {
            op |= 0x80;
        }
        let mut buffer = alloc::vec![op];
        buffer.extend_from_slice(&self.value.to_be_bytes()[2 - self.value_len as usize..]);
        buffer
    }
}

fn unpack_numeric_ops(mut input: &[u8]) -> IResult<&[u8], Vec<NumericOp>> {
    let mut out = Vec::new();
    loop {
        let (rest, (end, op)) = NumericOp::unpack(input)?;
        out.push(op);
        input = rest;
        if end {
            break;
        }
    }
    Ok((input, out))
}

fn unpack_bitmask_ops(mut input: &[u8]) -> IResult<&[u8], Vec<BitmaskOp>> {
    let mut out = Vec::new();
    loop {
        let (rest, (end, op)) = BitmaskOp::unpack(input)?;
        out.push(op);
        input = rest;
        if end {
            break;
        }
    }
    Ok((input, out))
}

fn pack_numeric_ops(ops: &[NumericOp]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for (index, op) in ops.iter().enumerate() {
        buffer.extend(op.pack(index + 1 == ops.len()));
    }
    buffer
}

fn pack_bitmask_ops(ops: &[BitmaskOp]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for (index, op) in ops.iter().enumerate() {
        buffer.extend(op.pack(index + 1 == ops.len()));
    }
    buffer
}

fn unpack_flow_prefix(input: &[u8]) -> IResult<&[u8], Prefix> {
    let (input, bits) = be_u8(input)?;
    let byte_length = ((bits as usize) + 7) / 8;
    let (input, raw) = take(byte_length)(input)?;
    let mut octets = [0u8; 4];
    octets[..raw.len()].copy_from_slice(raw);
    Ok((input, Prefix { address: IpAddr::V4(Ipv4Addr::from(octets)), mask: bits }))
}

fn pack_flow_prefix(prefix: &Prefix) -> Vec<u8> {
    let mut buffer = alloc::vec![prefix.mask];
    if let IpAddr::V4(address) = prefix.address {
        buffer.extend_from_slice(&address.octets()[..prefix.byte_length()]);
    }
    buffer
}

/// One RFC 8955 section 4.2 component. Components 1/2 (prefix match) are structurally
/// different from the rest, which are all lists of comparison operators over a u8 type code.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum FlowComponent {
    DestinationPrefix(Prefix),
    SourcePrefix(Prefix),
    Protocol(Vec<NumericOp>),
    Port(Vec<NumericOp>),
    DestinationPort(Vec<NumericOp>),
    SourcePort(Vec<NumericOp>),
    IcmpType(Vec<NumericOp>),
    IcmpCode(Vec<NumericOp>),
    TcpFlags(Vec<BitmaskOp>),
    PacketLength(Vec<NumericOp>),
    Dscp(Vec<NumericOp>),
    Fragment(Vec<BitmaskOp>),
    Unknown { component_type: u8, data: Vec<u8> },
}

impl FlowComponent {
    fn component_type(&self) -> u8 {
        match self {
            Self::DestinationPrefix(_) => 1,
            Self::SourcePrefix(_) => 2,
            Self::Protocol(_) => 3,
            Self::Port(_) => 4,
            Self::DestinationPort(_) => 5,
            Self::SourcePort(_) => 6,
            Self::IcmpType(_) => 7,
            Self::IcmpCode(_) => 8,
            Self::TcpFlags(_) => 9,
            Self::PacketLength(_) => 10,
            Self::Dscp(_) => 11,
            Self::Fragment(_) => 12,
            Self::Unknown { component_type, .. } => *component_type,
        }
    }

    fn pack_body(&self) -> Vec<u8> {
        match self {
            Self::DestinationPrefix(prefix) | Self::SourcePrefix(prefix) => pack_flow_prefix(prefix),
            Self::Protocol(ops)
            | Self::Port(ops)
            | Self::DestinationPort(ops)
            | Self::SourcePort(ops)
            | Self::IcmpType(ops)
            | Self::IcmpCode(ops)
            | Self::PacketLength(ops)
            | Self::Dscp(ops) => pack_numeric_ops(ops),
            Self::TcpFlags(ops) | Self::Fragment(ops) => pack_bitmask_ops(ops),
            Self::Unknown { data, .. } => data.clone(),
        }
    }
}

fn unpack_component(input: &[u8]) -> IResult<&[u8], FlowComponent> {
    let (input, component_type) = be_u8(input)?;
    match component_type {
        1 => unpack_flow_prefix(input).map(|(rest, prefix)| (rest, FlowComponent::DestinationPrefix(prefix))),
        2 => unpack_flow_prefix(input).map(|(rest, prefix)| (rest, FlowComponent::SourcePrefix(prefix))),
        3 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::Protocol(ops))),
        4 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::Port(ops))),
        5 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::DestinationPort(ops))),
        6 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::SourcePort(ops))),
        7 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::IcmpType(ops))),
        8 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::IcmpCode(ops))),
        9 => unpack_bitmask_ops(input).map(|(rest, ops)| (rest, FlowComponent::TcpFlags(ops))),
        10 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::PacketLength(ops))),
        11 => unpack_numeric_ops(input).map(|(rest, ops)| (rest, FlowComponent::Dscp(ops))),
        12 => unpack_bitmask_ops(input).map(|(rest, ops)| (rest, FlowComponent::Fragment(ops))),
        _ => Ok((&[], FlowComponent::Unknown { component_type, data: input.to_vec() })),
    }
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct FlowspecNlri {
    pub route_distinguisher: Option<RouteDistinguisher>,
    pub components: Vec<FlowComponent>,
}

impl FlowspecNlri {
    pub fn unpack(input: &[u8], vpn: bool) -> IResult<&[u8], Self> {
        let (input, route_distinguisher) = if vpn {
            let (input, raw) = take(8usize)(input)?;
            (input, Some(RouteDistinguisher::from_bytes(raw.try_into().unwrap())))
        } else {
            (input, None)
        };
        let (input, first) = be_u8(input)?;
        let (input, length) = if first & 0xF0 == 0xF0 {
            let (input, second) = be_u8(input)?;
            (input, (((first & 0x0F) as usize) << 8) | second as usize)
        } else {
            (input, first as usize)
        };
        let (input, mut body) = take(length)(input)?;
        let mut components = Vec::new();
        while !body.is_empty() {
            let (rest, component) = unpack_component(body)?;
            components.push(component);
            body = rest;
        }
        Ok((input, Self { route_distinguisher, components }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for component in &self.components {
            body.push(component.component_type());
            body.extend(component.pack_body());
        }
        let mut buffer = Vec::new();
        if let Some(route_distinguisher) = &self.route_distinguisher {
            buffer.extend_from_slice(&route_distinguisher.to_bytes());
        }
        if body.len() < 240 {
            buffer.push(body.len() as u8);
        } else {
            let length = body.len() as u16;
            buffer.extend_from_slice(&(0xF000 | length).to_be_bytes());
        }
        buffer.extend(body);
        buffer
    }
}
