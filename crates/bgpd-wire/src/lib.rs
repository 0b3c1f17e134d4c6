//! This crate (bgpd project module) implements serialization and deserialization APIs for the Border Gateway Protocol (BGP), that is
//! **the** EGP (Exterior Gateway Protocol) used in the Internet for the exchange of routes between two networks. BGP itself is an unsafe
//! and limited protocol but there are many RFCs used as extensions for that protocol.
//!
//! ## RFCs currently implemented
//! | RFC                                                        | Title                                        |
//! |-------------------------------------------------------------|-----------------------------------------------|
//! | [RFC 1997](https://datatracker.ietf.org/doc/html/rfc1997)  | BGP Communities Attribute                    |
//! | [RFC 2918](https://datatracker.ietf.org/doc/html/rfc2918)  | Route Refresh Capability for BGP-4           |
//! | [RFC 3392](https://datatracker.ietf.org/doc/html/rfc3392)  | Capabilities Advertisement with BGP-4        |
//! | [RFC 4271](https://datatracker.ietf.org/doc/html/rfc4271)  | A Border Gateway Protocol 4 (BGP-4)          |
//! | [RFC 4360](https://datatracker.ietf.org/doc/html/rfc4360)  | BGP Extended Communities Attribute           |
//! | [RFC 4364](https://datatracker.ietf.org/doc/html/rfc4364)  | BGP/MPLS IP VPNs                             |
//! | [RFC 4724](https://datatracker.ietf.org/doc/html/rfc4724)  | Graceful Restart Mechanism for BGP           |
//! | [RFC 4760](https://datatracker.ietf.org/doc/html/rfc4760)  | Multiprotocol Extensions for BGP-4           |
//! | [RFC 5668](https://datatracker.ietf.org/doc/html/rfc5668)  | 4-Octet AS-specific BGP Extended Community   |
//! | [RFC 5701](https://datatracker.ietf.org/doc/html/rfc5701)  | IPv6 Address Specific BGP Extended Community |
//! | [RFC 6514](https://datatracker.ietf.org/doc/html/rfc6514)  | BGP Encodings for Multicast VPN              |
//! | [RFC 6793](https://datatracker.ietf.org/doc/html/rfc6793)  | BGP Support for Four-Octet AS Numbers        |
//! | [RFC 7311](https://datatracker.ietf.org/doc/html/rfc7311)  | Accumulated IGP Metric Attribute             |
//! | [RFC 7432](https://datatracker.ietf.org/doc/html/rfc7432)  | BGP MPLS-Based Ethernet VPN                  |
//! | [RFC 7606](https://datatracker.ietf.org/doc/html/rfc7606)  | Revised Error Handling for BGP UPDATE        |
//! | [RFC 7752](https://datatracker.ietf.org/doc/html/rfc7752)  | Distribution of Link-State Information (BGP-LS) |
//! | [RFC 7911](https://datatracker.ietf.org/doc/html/rfc7911)  | Advertisement of Multiple Paths (ADD-PATH)   |
//! | [RFC 8092](https://datatracker.ietf.org/doc/html/rfc8092)  | BGP Large Communities                        |
//! | [RFC 8277](https://datatracker.ietf.org/doc/html/rfc8277)  | Using BGP to Bind MPLS Labels to Address Prefixes |
//! | [RFC 8955](https://datatracker.ietf.org/doc/html/rfc8955)  | Dissemination of Flow Specification Rules    |
//!
//! ## References
//! - [Standards documents, Wikipedia "Border Gateway Protocol"](https://en.wikipedia.org/wiki/Border_Gateway_Protocol#Standards_documents)
//! - [RFC 4271 - A Border Gateway Protocol 4 (BGP-4)](https://datatracker.ietf.org/doc/html/rfc4271)

#![no_std]
extern crate alloc;

pub mod afi_safi;
pub mod aigp;
pub mod capabilities;
pub mod communities;
pub mod context;
pub mod errors;
pub mod mp;
pub mod nlri;
pub mod notification;
pub mod open;
pub mod path_attr;
pub mod pmsi;
pub mod prefix_sid;
pub mod route_refresh;
pub mod update;

#[cfg(all(feature = "std", test))]
mod tests;

use crate::context::Context;
use crate::errors::{
    DecodeError,
    Diagnostics,
    NotifyCode,
};
use crate::notification::NotificationMessage;
use crate::open::OpenMessage;
use crate::route_refresh::RouteRefreshMessage;
use crate::update::UpdateMessage;
use alloc::vec::Vec;
use nom::{
    bytes::complete::take,
    number::complete::{
        be_u16,
        be_u8,
    },
    IResult,
};

/// Elements that decode/encode without any per-session context (spec section 4.1 "Wire codec"
/// contract: pure functions, bit-exact, round-trip).
pub trait BGPElement {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self>
    where
        Self: Sized;
    fn pack(&self) -> Vec<u8>;
}

/// Elements whose shape depends on an out-of-band parameter carried alongside the bytes (an
/// address family for a prefix, negotiated session state for an attribute).
pub trait ParameterizedBGPElement {
    type Parameter;

    fn unpack(input: &[u8], parameter: Self::Parameter) -> IResult<&[u8], Self>
    where
        Self: Sized;

    fn pack(&self) -> Vec<u8>;
}

/// The 16-byte BGP message marker (RFC 4271 section 4.1): always all-ones once a session has
/// established (authentication TLVs that varied this byte string predate RFC 4271 and are not
/// implemented).
pub const MARKER: [u8; 16] = [0xFF; 16];

/// Message type codes (RFC 4271 section 4.1, RFC 2918 section 3).
pub mod message_type {
    pub const OPEN: u8 = 1;
    pub const UPDATE: u8 = 2;
    pub const NOTIFICATION: u8 = 3;
    pub const KEEPALIVE: u8 = 4;
    pub const ROUTE_REFRESH: u8 = 5;
}

/// The 19-byte fixed header every BGP message begins with (RFC 4271 section 4.1).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct MessageHeader {
    pub marker: [u8; 16],
    pub length: u16,
    pub kind: u8,
}

impl MessageHeader {
    pub const LENGTH: usize = 19;

    /// Bounds a header's `length` field against the negotiated `max_message_size` (4096 unless
    /// the Extended Message capability raised it to 65535, spec section 4.1 "Framing") and the
    /// RFC 4271 section 4.1 floor of 19 bytes.
    pub fn validate(&self, max_message_size: u16) -> Result<(), DecodeError> {
        if self.marker != MARKER {
            return Err(DecodeError::header(1, "bad marker"));
        }
        if self.length < Self::LENGTH as u16 || self.length > max_message_size {
            return Err(DecodeError::header(2, "bad message length"));
        }
        if self.kind == message_type::KEEPALIVE && self.length != Self::LENGTH as u16 {
            return Err(DecodeError::header(2, "KEEPALIVE length must be exactly 19"));
        }
        Ok(())
    }
}

impl BGPElement for MessageHeader {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, marker) = take(16usize)(input)?;
        let (input, length) = be_u16(input)?;
        let (input, kind) = be_u8(input)?;
        Ok((input, Self { marker: marker.try_into().unwrap(), length, kind }))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = self.marker.to_vec();
        buffer.extend_from_slice(&self.length.to_be_bytes());
        buffer.push(self.kind);
        buffer
    }
}

/// Every BGP-4 message this speaker understands (spec section 4.1). `Unknown` preserves the
/// raw body of an unrecognized message type rather than rejecting the connection outright,
/// consistent with the crate's general "unknown but preserved" posture; the type-code decode
/// step itself still rejects genuinely malformed headers per RFC 4271 section 6.1.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum BgpMessage {
    Open(OpenMessage),
    Update(UpdateMessage),
    Notification(NotificationMessage),
    KeepAlive,
    RouteRefresh(RouteRefreshMessage),
    Unknown { kind: u8, data: Vec<u8> },
}

impl BgpMessage {
    pub fn kind(&self) -> u8 {
        match self {
            Self::Open(_) => message_type::OPEN,
            Self::Update(_) => message_type::UPDATE,
            Self::Notification(_) => message_type::NOTIFICATION,
            Self::KeepAlive => message_type::KEEPALIVE,
            Self::RouteRefresh(_) => message_type::ROUTE_REFRESH,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    /// Decodes one full message (header + body) given the negotiated session `context`. Returns
    /// a classified [`DecodeError`] rather than panicking or propagating an opaque parser error,
    /// per spec section 4.1/section 9 "Exception-for-control-flow": callers (the peer FSM) use
    /// the error's `(code, subcode)` to build the NOTIFICATION they send back.
    ///
    /// UPDATE messages may decode successfully while still carrying [`Diagnostics`] describing
    /// RFC 7606 soft failures found along the way; the caller inspects `diagnostics.worst()` to
    /// decide whether to reset the session, discard attributes, or treat NLRI as withdrawn.
    pub fn decode<'a>(
        input: &'a [u8],
        context: &Context,
    ) -> Result<(&'a [u8], Self, Diagnostics), DecodeError> {
        if input.len() < MessageHeader::LENGTH {
            return Err(DecodeError::header(2, "input shorter than fixed header"));
        }
        let (body_and_rest, header) =
            MessageHeader::unpack(input).map_err(|_| DecodeError::header(2, "malformed header"))?;
        header.validate(context.max_message_size)?;
        let body_length = header.length as usize - MessageHeader::LENGTH;
        let (rest, body) = take::<_, _, nom::error::Error<&[u8]>>(body_length)(body_and_rest)
            .map_err(|_| DecodeError::header(2, "message shorter than declared length"))?;

        let mut diagnostics = Diagnostics::default();
        let message = match header.kind {
            message_type::OPEN => {
                let (_, open) = OpenMessage::unpack(body).map_err(|_| DecodeError::open(0, "malformed OPEN body"))?;
                Self::Open(open)
            }
            message_type::UPDATE => {
                let (_, update) = UpdateMessage::unpack(body, context, &mut diagnostics)
                    .map_err(|_| DecodeError::update(1, "malformed attribute list"))?;
                Self::Update(update)
            }
            message_type::NOTIFICATION => {
                let (_, notification) = NotificationMessage::unpack(body)
                    .map_err(|_| DecodeError::new(NotifyCode::MessageHeaderError, 2, "malformed NOTIFICATION body"))?;
                Self::Notification(notification)
            }
            message_type::KEEPALIVE => {
                if !body.is_empty() {
                    return Err(DecodeError::header(2, "KEEPALIVE body must be empty"));
                }
                Self::KeepAlive
            }
            message_type::ROUTE_REFRESH => {
                let (_, refresh) = RouteRefreshMessage::unpack(body)
                    .map_err(|_| DecodeError::header(3, "malformed ROUTE-REFRESH body"))?;
                Self::RouteRefresh(refresh)
            }
            kind => Self::Unknown { kind, data: body.to_vec() },
        };
        Ok((rest, message, diagnostics))
    }

    /// Serializes one full message (header + body). Bit-exact inverse of [`Self::decode`] for
    /// every variant (spec section 8 invariant 1). `context` is only consulted by UPDATE, whose
    /// AS_PATH/AGGREGATOR width depends on whether 4-byte ASNs were negotiated (RFC 6793).
    pub fn encode(&self, context: &Context) -> Vec<u8> {
        let body = match self {
            Self::Open(open) => open.pack(),
            Self::Update(update) => update.pack(context.four_octet_asn),
            Self::Notification(notification) => notification.pack(),
            Self::KeepAlive => Vec::new(),
            Self::RouteRefresh(refresh) => refresh.pack(),
            Self::Unknown { data, .. } => data.clone(),
        };
        let header = MessageHeader { marker: MARKER, length: (MessageHeader::LENGTH + body.len()) as u16, kind: self.kind() };
        let mut buffer = header.pack();
        buffer.extend(body);
        buffer
    }
}
