//! BGP-LS NLRI (RFC 7752 section 3.2), simplified: the NLRI type and protocol/identifier
//! header are parsed so the route can be grouped and logged sensibly, but the descriptor and
//! attribute TLVs that follow are kept as opaque bytes rather than fully modeled.

use alloc::vec::Vec;
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u16,
        be_u64,
        be_u8,
    },
    IResult,
};

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
#[repr(u8)]
pub enum ProtocolId {
    IsIsLevel1 = 1,
    IsIsLevel2 = 2,
    Ospfv2 = 3,
    Direct = 4,
    Static = 5,
    Ospfv3 = 6,
    BgpEpe = 7,
}

impl From<u8> for ProtocolId {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::IsIsLevel1,
            2 => Self::IsIsLevel2,
            3 => Self::Ospfv2,
            4 => Self::Direct,
            5 => Self::Static,
            6 => Self::Ospfv3,
            _ => Self::BgpEpe,
        }
    }
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct BgpLsNlri {
    pub nlri_type: u16,
    pub protocol_id: u8,
    pub identifier: u64,
    pub descriptors: Vec<u8>,
}

impl BgpLsNlri {
    pub fn protocol_id(&self) -> ProtocolId {
        ProtocolId::from(self.protocol_id)
    }

    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, nlri_type) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        let (input, body) = take(length)(input)?;
        let (body, protocol_id) = be_u8(body)?;
        let (descriptors, identifier) = be_u64(body)?;
        Ok((input, Self { nlri_type, protocol_id, identifier, descriptors: descriptors.to_vec() }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.protocol_id);
        body.extend_from_slice(&self.identifier.to_be_bytes());
        body.extend_from_slice(&self.descriptors);
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&self.nlri_type.to_be_bytes());
        buffer.extend_from_slice(&(body.len() as u16).to_be_bytes());
        buffer.extend(body);
        buffer
    }
}
