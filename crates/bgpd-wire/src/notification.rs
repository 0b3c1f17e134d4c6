//! NOTIFICATION message (RFC 4271 section 4.5): sent immediately before a session is torn
//! down, carrying an error code, subcode and optional diagnostic data. Unknown
//! (code, subcode) pairs are accepted and forwarded rather than rejected, per spec section 4.1.

use crate::BGPElement;
use alloc::vec::Vec;
use nom::number::complete::be_u8;
use nom::IResult;

/// Cease subcodes (RFC 4486), the ones this daemon actually sends.
pub mod cease {
    pub const ADMINISTRATIVE_SHUTDOWN: u8 = 2;
    pub const CONNECTION_COLLISION_RESOLUTION: u8 = 7;
}

/// OPEN Message Error subcodes (RFC 4271 section 6.2).
pub mod open_error {
    pub const UNSUPPORTED_VERSION_NUMBER: u8 = 1;
    pub const BAD_PEER_AS: u8 = 2;
    pub const BAD_BGP_IDENTIFIER: u8 = 3;
    pub const UNSUPPORTED_OPTIONAL_PARAMETER: u8 = 4;
    pub const UNACCEPTABLE_HOLD_TIME: u8 = 6;
}

/// Message Header Error subcodes (RFC 4271 section 6.1).
pub mod header_error {
    pub const CONNECTION_NOT_SYNCHRONIZED: u8 = 1;
    pub const BAD_MESSAGE_LENGTH: u8 = 2;
    pub const BAD_MESSAGE_TYPE: u8 = 3;
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct NotificationMessage {
    pub error_code: u8,
    pub error_subcode: u8,
    pub data: Vec<u8>,
}

impl NotificationMessage {
    pub fn cease(subcode: u8) -> Self {
        Self { error_code: 6, error_subcode: subcode, data: Vec::new() }
    }

    pub fn hold_timer_expired() -> Self {
        Self { error_code: 4, error_subcode: 0, data: Vec::new() }
    }
}

impl BGPElement for NotificationMessage {
    fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, error_code) = be_u8(input)?;
        let (data, error_subcode) = be_u8(input)?;
        Ok((&[], Self { error_code, error_subcode, data: data.to_vec() }))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.push(self.error_code);
        buffer.push(self.error_subcode);
        buffer.extend_from_slice(&self.data);
        buffer
    }
}
