//! Error types for the reactor and API transport layers (spec section 7 "Error handling
//! design", SPEC_FULL section 2.2). Wire decode failures are classified by
//! `bgpd_wire::errors::DecodeError`/`Diagnostics` and never reach these types directly; these
//! cover everything above the codec: connection setup, protocol framing, and the API command
//! surface.

use std::io;
use std::net::IpAddr;

/// Failures the reactor can encounter running a peer or its own I/O, none of which are
/// allowed to crash the reactor (spec section 7 propagation policy): every variant is caught
/// at the peer's turn boundary, logged with the peer's identity, and the peer is reset to
/// `Idle` rather than unwinding.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error("connect to {peer} timed out")]
    ConnectTimeout { peer: IpAddr },
    #[error("i/o error talking to {peer}: {source}")]
    Io { peer: IpAddr, #[source] source: io::Error },
    #[error("peer {peer} sent a message that failed to decode: {source}")]
    Decode { peer: IpAddr, source: bgpd_wire::errors::DecodeError },
    #[error("peer {peer} is restarting and was closed administratively")]
    AdministrativeClose { peer: IpAddr },
    #[error("outgoing RIB for {peer} exceeded its configured watermark")]
    RibFull { peer: IpAddr },
    #[error("write backlog to {peer} exceeded 15000 queued messages")]
    BacklogFull { peer: IpAddr },
    #[error("peer {peer} sent a NOTIFICATION: {code:?}/{subcode}")]
    PeerNotified { peer: IpAddr, code: bgpd_wire::errors::NotifyCode, subcode: u8 },
}

/// Failures surfaced to an API client (spec section 4.6, section 7 "API command parse/semantic
/// error"): the session always stays open after one of these; the client receives
/// `error <reason>` and may issue another command.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("i/o error on API transport: {0}")]
    Io(#[from] io::Error),
    #[error("malformed command: {0}")]
    ParseError(String),
    #[error("no neighbor matches selector '{0}'")]
    NoSuchNeighbor(String),
    #[error("rib-full")]
    RibFull,
    #[error("too many concurrent API sessions (limit {limit})")]
    TooManySessions { limit: usize },
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}
