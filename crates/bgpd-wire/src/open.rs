//! OPEN message (RFC 4271 section 4.2): the first message exchanged on a new TCP connection,
//! carrying the speaker's version, ASN, hold time, router-id and capabilities.

use crate::capabilities::Capability;
use crate::BGPElement;
use alloc::vec::Vec;
use nom::{
    bytes::complete::take,
    multi::many0,
    number::complete::{
        be_u16,
        be_u32,
        be_u8,
    },
    IResult,
    Parser,
};

/// RFC 3392/RFC 5492: optional parameters in the OPEN message. Only the Capabilities
/// parameter (type 2) is standard today; anything else is preserved opaque.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum OptionalParameter {
    Capabilities(Vec<Capability>),
    Unknown { kind: u8, data: Vec<u8> },
}

impl BGPElement for OptionalParameter {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, kind) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, data) = take(length as usize)(input)?;
        Ok((
            input,
            match kind {
                2 => Self::Capabilities(many0(Capability::unpack).parse(data)?.1),
                _ => Self::Unknown { kind, data: data.to_vec() },
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        match self {
            Self::Capabilities(capabilities) => {
                let mut body = Vec::new();
                for capability in capabilities {
                    body.extend(capability.pack());
                }
                buffer.push(2);
                buffer.push(body.len() as u8);
                buffer.extend(body);
            }
            Self::Unknown { kind, data } => {
                buffer.push(*kind);
                buffer.push(data.len() as u8);
                buffer.extend(data);
            }
        }
        buffer
    }
}

/// The OPEN message itself (RFC 4271 section 4.2).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct OpenMessage {
    pub version: u8,
    /// Legacy 2-byte ASN field; AS_TRANS (23456) when the real ASN needs 4 bytes (RFC 6793).
    pub autonomous_system: u16,
    pub hold_time: u16,
    pub bgp_identifier: u32,
    pub optional_parameters: Vec<OptionalParameter>,
}

impl OpenMessage {
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.optional_parameters.iter().flat_map(|parameter| match parameter {
            OptionalParameter::Capabilities(capabilities) => capabilities.iter(),
            OptionalParameter::Unknown { .. } => [].iter(),
        })
    }
}

impl BGPElement for OpenMessage {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, version) = be_u8(input)?;
        let (input, autonomous_system) = be_u16(input)?;
        let (input, hold_time) = be_u16(input)?;
        let (input, bgp_identifier) = be_u32(input)?;
        let (input, optional_parameters_length) = be_u8(input)?;
        let (input, optional_parameters) = take(optional_parameters_length as usize)(input)?;
        Ok((
            input,
            Self {
                version,
                autonomous_system,
                hold_time,
                bgp_identifier,
                optional_parameters: many0(OptionalParameter::unpack).parse(optional_parameters)?.1,
            },
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.push(self.version);
        buffer.extend_from_slice(&self.autonomous_system.to_be_bytes());
        buffer.extend_from_slice(&self.hold_time.to_be_bytes());
        buffer.extend_from_slice(&self.bgp_identifier.to_be_bytes());

        let mut parameters_data = Vec::new();
        for parameter in &self.optional_parameters {
            parameters_data.extend(parameter.pack());
        }
        buffer.push(parameters_data.len() as u8);
        buffer.extend(parameters_data);
        buffer
    }
}
