//! Classified decode failures (spec section 7 / 9 "Exception-for-control-flow"). Every
//! decode path returns one of these instead of unwinding, so the peer FSM can decide reset vs.
//! treat-as-withdraw vs. discard without the codec knowing anything about sessions.

use alloc::vec::Vec;
use core::fmt::{
    self,
    Display,
    Formatter,
};

/// BGP NOTIFICATION error codes (RFC 4271 section 4.5 / section 6).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum NotifyCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
}

/// A decode failure classified with the `(code, subcode)` pair spec section 4.1 says a bad
/// marker/length/type produces, plus enough context for a log line.
#[derive(Debug, Clone)]
pub struct DecodeError {
    pub code: NotifyCode,
    pub subcode: u8,
    pub context: &'static str,
}

impl DecodeError {
    pub const fn new(code: NotifyCode, subcode: u8, context: &'static str) -> Self {
        Self { code, subcode, context }
    }

    pub const fn header(subcode: u8, context: &'static str) -> Self {
        Self::new(NotifyCode::MessageHeaderError, subcode, context)
    }

    pub const fn open(subcode: u8, context: &'static str) -> Self {
        Self::new(NotifyCode::OpenMessageError, subcode, context)
    }

    pub const fn update(subcode: u8, context: &'static str) -> Self {
        Self::new(NotifyCode::UpdateMessageError, subcode, context)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}): {}", self.code as u8, self.subcode, self.context)
    }
}

impl core::error::Error for DecodeError {}

/// RFC 7606 disposition for a malformed UPDATE attribute: reset the whole session, discard
/// just the offending attribute and keep going, or treat every NLRI carried by this UPDATE as
/// withdrawn.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Disposition {
    SessionReset,
    DiscardAttribute,
    TreatAsWithdraw,
}

/// A soft (potentially recoverable) attribute-level error, classified per RFC 7606 section 7.
#[derive(Debug, Clone)]
pub enum AttributeError {
    /// The same well-known or optional-transitive attribute type code appeared twice.
    DuplicateAttribute { type_code: u8 },
    /// AS_PATH segment length/encoding does not match the negotiated 4-byte-ASN state.
    MalformedAsPath,
    /// MP_REACH_NLRI's NEXT_HOP length does not match any valid encoding for its AFI/SAFI.
    InvalidNextHopLength { afi: u16, safi: u8, length: usize },
    /// A well-known mandatory attribute required for this NLRI's family was absent.
    MissingMandatory { type_code: u8 },
    /// AIGP present on a session where it is not meaningful (attached to a non-IGP-metric
    /// family, or otherwise not applicable).
    MisplacedAigp,
    /// The flags byte on a *known* attribute type does not match its registered expectation.
    BadFlags { type_code: u8 },
}

impl AttributeError {
    /// The source's own attribute-by-attribute table is the oracle here (spec section 9, Open
    /// Questions); this mirrors RFC 7606 section 7's worked examples.
    pub fn classify(&self) -> Disposition {
        match self {
            Self::DuplicateAttribute { .. } => Disposition::DiscardAttribute,
            Self::MalformedAsPath => Disposition::SessionReset,
            Self::InvalidNextHopLength { .. } => Disposition::TreatAsWithdraw,
            Self::MissingMandatory { .. } => Disposition::TreatAsWithdraw,
            Self::MisplacedAigp => Disposition::DiscardAttribute,
            Self::BadFlags { .. } => Disposition::SessionReset,
        }
    }
}

/// Outcome of decoding one UPDATE message: the best-effort message plus whatever soft errors
/// were found along the way (spec section 4.1 "RFC 7606 treat-as-withdraw").
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(pub Vec<AttributeError>);

impl Diagnostics {
    pub fn push(&mut self, error: AttributeError) {
        self.0.push(error);
    }

    pub fn worst(&self) -> Option<Disposition> {
        self.0
            .iter()
            .map(AttributeError::classify)
            .max_by_key(|d| match d {
                Disposition::DiscardAttribute => 0,
                Disposition::TreatAsWithdraw => 1,
                Disposition::SessionReset => 2,
            })
    }
}
