//! OPEN message capabilities (RFC 3392/RFC 5492 "Capabilities Optional Parameter"), and the
//! extensions this speaker negotiates: Multiprotocol Extensions (RFC 4760), Route Refresh
//! (RFC 2918), 4-byte ASN (RFC 6793), ADD-PATH (RFC 7911), Graceful Restart (RFC 4724) and
//! Extended Message (draft-ietf-idr-bgp-extended-messages, referenced by spec section 4.1).

use crate::afi_safi::{
    Afi,
    Safi,
};
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

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct GracefulRestartFamily {
    pub afi: Afi,
    pub safi: Safi,
    pub forwarding_state_preserved: bool,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct GracefulRestartCapability {
    pub restarting: bool,
    pub restart_time_secs: u16,
    pub families: Vec<GracefulRestartFamily>,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub struct AddPathFamily {
    pub afi: Afi,
    pub safi: Safi,
    pub send: bool,
    pub receive: bool,
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum Capability {
    /// RFC 4760 section 8: AFI (2) + reserved (1) + SAFI (1).
    MultiprotocolExtensions { afi: Afi, safi: Safi },
    /// RFC 2918 section 3: value-less.
    RouteRefresh,
    /// RFC 6793 section 3: 4-byte ASN.
    FourOctetAsn(u32),
    /// RFC 7911 section 3: repeated (AFI, SAFI, send/receive) triples.
    AddPath(Vec<AddPathFamily>),
    /// RFC 4724 section 3: restart flags/time, then per-family forwarding-state flags.
    GracefulRestart(GracefulRestartCapability),
    /// Raises the maximum message size from 4096 to 65535 (spec section 4.1 framing).
    ExtendedMessage,
    Unknown { code: u8, data: Vec<u8> },
}

impl Capability {
    pub fn code(&self) -> u8 {
        match self {
            Self::MultiprotocolExtensions { .. } => 1,
            Self::RouteRefresh => 2,
            Self::FourOctetAsn(_) => 65,
            Self::AddPath(_) => 69,
            Self::GracefulRestart(_) => 64,
            Self::ExtendedMessage => 6,
            Self::Unknown { code, .. } => *code,
        }
    }

    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, code) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, data) = take(length as usize)(input)?;
        let value = match code {
            1 if data.len() == 4 => {
                let (data, afi) = Afi::unpack(data)?;
                let (data, _reserved) = be_u8(data)?;
                let (_, safi) = Safi::unpack(data)?;
                Self::MultiprotocolExtensions { afi, safi }
            }
            2 => Self::RouteRefresh,
            65 if data.len() == 4 => {
                let (_, asn) = be_u32(data)?;
                Self::FourOctetAsn(asn)
            }
            69 if data.len() % 4 == 0 => {
                let (_, families) = many0(unpack_add_path_family).parse(data)?;
                Self::AddPath(families)
            }
            64 if data.len() >= 2 => {
                let (data, flags_and_time) = be_u16(data)?;
                let restarting = flags_and_time & 0x8000 != 0;
                let restart_time_secs = flags_and_time & 0x0FFF;
                let (_, families) = many0(unpack_graceful_restart_family).parse(data)?;
                Self::GracefulRestart(GracefulRestartCapability { restarting, restart_time_secs, families })
            }
            6 => Self::ExtendedMessage,
            _ => Self::Unknown { code, data: data.to_vec() },
        };
        Ok((input, value))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::new();
        match self {
            Self::MultiprotocolExtensions { afi, safi } => {
                data.extend(afi.pack());
                data.push(0);
                data.extend(safi.pack());
            }
            Self::RouteRefresh | Self::ExtendedMessage => {}
            Self::FourOctetAsn(asn) => data.extend_from_slice(&asn.to_be_bytes()),
            Self::AddPath(families) => {
                for family in families {
                    data.extend(family.afi.pack());
                    data.extend(family.safi.pack());
                    let flags = (if family.send { 0x01 } else { 0 }) | (if family.receive { 0x02 } else { 0 });
                    data.push(flags);
                }
            }
            Self::GracefulRestart(gr) => {
                let flags_and_time = (if gr.restarting { 0x8000 } else { 0 }) | (gr.restart_time_secs & 0x0FFF);
                data.extend_from_slice(&flags_and_time.to_be_bytes());
                for family in &gr.families {
                    data.extend(family.afi.pack());
                    data.extend(family.safi.pack());
                    data.push(if family.forwarding_state_preserved { 0x80 } else { 0 });
                }
            }
            Self::Unknown { data: raw, .. } => data.extend_from_slice(raw),
        }
        let mut buffer = Vec::new();
        buffer.push(self.code());
        buffer.push(data.len() as u8);
        buffer.extend(data);
        buffer
    }
}

fn unpack_add_path_family(input: &[u8]) -> IResult<&[u8], AddPathFamily> {
    let (input, afi) = Afi::unpack(input)?;
    let (input, safi) = Safi::unpack(input)?;
    let (input, flags) = be_u8(input)?;
    Ok((input, AddPathFamily { afi, safi, send: flags & 0x01 != 0, receive: flags & 0x02 != 0 }))
}

fn unpack_graceful_restart_family(input: &[u8]) -> IResult<&[u8], GracefulRestartFamily> {
    let (input, afi) = Afi::unpack(input)?;
    let (input, safi) = Safi::unpack(input)?;
    let (input, flags) = be_u8(input)?;
    Ok((input, GracefulRestartFamily { afi, safi, forwarding_state_preserved: flags & 0x80 != 0 }))
}
