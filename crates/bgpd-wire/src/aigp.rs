//! AIGP attribute (RFC 7311): a TLV container carrying an accumulated IGP metric so that
//! metric-sensitive path selection survives crossing a BGP boundary between IGP domains.

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

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum AigpTlv {
    /// Type 1 (RFC 7311 section 3): the accumulated metric itself.
    AccumulatedIgpMetric(u64),
    Unknown { tlv_type: u8, data: Vec<u8> },
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Default)]
pub struct Aigp(pub Vec<AigpTlv>);

impl Aigp {
    pub fn metric(&self) -> Option<u64> {
        self.0.iter().find_map(|tlv| match tlv {
            AigpTlv::AccumulatedIgpMetric(value) => Some(*value),
            AigpTlv::Unknown { .. } => None,
        })
    }

    pub fn unpack(mut input: &[u8]) -> IResult<&[u8], Self> {
        let mut tlvs = Vec::new();
        while !input.is_empty() {
            let (rest, tlv_type) = be_u8(input)?;
            let (rest, length) = be_u16(rest)?;
            let body_length = (length as usize).saturating_sub(3);
            let (rest, body) = take(body_length)(rest)?;
            let tlv = if tlv_type == 1 && body.len() == 8 {
                let (_, value) = be_u64(body)?;
                AigpTlv::AccumulatedIgpMetric(value)
            } else {
                AigpTlv::Unknown { tlv_type, data: body.to_vec() }
            };
            tlvs.push(tlv);
            input = rest;
        }
        Ok((input, Self(tlvs)))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        for tlv in &self.0 {
            match tlv {
                AigpTlv::AccumulatedIgpMetric(value) => {
                    buffer.push(1);
                    buffer.extend_from_slice(&11u16.to_be_bytes());
                    buffer.extend_from_slice(&value.to_be_bytes());
                }
                AigpTlv::Unknown { tlv_type, data } => {
                    buffer.push(*tlv_type);
                    buffer.extend_from_slice(&((data.len() + 3) as u16).to_be_bytes());
                    buffer.extend_from_slice(data);
                }
            }
        }
        buffer
    }
}
