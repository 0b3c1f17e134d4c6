//! Per-session negotiated state that the codec needs in order to encode or decode a message
//! correctly: whether 4-byte ASNs are in use, how large a message may be, and which families
//! have ADD-PATH enabled in which direction. One `Context` is built once capability
//! negotiation completes (RFC 4271 section 4.2, RFC 6793, RFC 7911) and is threaded through
//! every `ParameterizedBGPElement` call for the life of the session.

use crate::afi_safi::{
    Afi,
    Safi,
};
use alloc::vec::Vec;

/// Send/receive ADD-PATH flags negotiated for a single address family (RFC 7911 section 3).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct AddPathFlags {
    pub send: bool,
    pub receive: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Both peers advertised the 4-byte ASN capability (RFC 6793).
    pub four_octet_asn: bool,
    /// Largest encodable/decodable message, 4096 unless Extended Message was negotiated,
    /// in which case it is 65535 (spec section 4.1 "Framing").
    pub max_message_size: u16,
    /// ADD-PATH flags per negotiated family (RFC 7911).
    pub add_path: Vec<(Afi, Safi, AddPathFlags)>,
}

impl Context {
    pub const DEFAULT_MAX_MESSAGE_SIZE: u16 = 4096;
    pub const EXTENDED_MAX_MESSAGE_SIZE: u16 = 65535;

    pub fn legacy() -> Self {
        Self {
            four_octet_asn: false,
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
            add_path: Vec::new(),
        }
    }

    pub fn add_path_for(&self, afi: Afi, safi: Safi) -> AddPathFlags {
        self.add_path
            .iter()
            .find(|(a, s, _)| *a == afi && *s == safi)
            .map(|(_, _, flags)| *flags)
            .unwrap_or_default()
    }
}
