//! Minimal configuration surface (SPEC_FULL section 2.3). `spec.md` treats a configuration
//! file tokenizer as an external collaborator; this module only provides the fully-constructed
//! `Neighbor`/`Config` values that collaborator is said to hand the reactor, so the binary and
//! the tests have something to construct a [`crate::reactor::Reactor`] from.

use bgpd_common::Asn;
use bgpd_wire::afi_safi::{
    Afi,
    Safi,
};
use std::net::{
    IpAddr,
    Ipv4Addr,
};
use std::time::Duration;

/// One configured BGP neighbor (spec section 3 "Neighbor"), immutable once loaded.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub local_address: IpAddr,
    pub peer_address: IpAddr,
    pub local_asn: Asn,
    pub peer_asn: Asn,
    pub hold_time: u16,
    pub router_id: Ipv4Addr,
    /// Address families negotiated via Multiprotocol Extensions (RFC 4760).
    pub families: Vec<(Afi, Safi)>,
    /// `true`: wait for the peer to connect (FSM's `start` event goes to ACTIVE).
    /// `false`: actively dial the peer (FSM's `start` event goes to CONNECT).
    pub passive: bool,
    /// Default on (spec section 4.2 "Grouping switch"): aggressively group same-attribute
    /// routes into one UPDATE rather than emitting one NLRI per UPDATE.
    pub group_updates: bool,
    /// TCP MD5 signature (RFC 2385); not implemented at the socket layer here, carried so a
    /// future protocol-handler extension has somewhere to read it from.
    pub md5_password: Option<String>,
    /// GTSM minimum accepted TTL (RFC 5082); same caveat as `md5_password`.
    pub ttl_security: Option<u8>,
    /// Per-attempt connect timeout (spec section 5 "Cancellation & timeouts", default 10s).
    pub connect_timeout: Duration,
    /// Per-peer outgoing-RIB size watermark (spec section 5 "Shared resources"); `None` means
    /// unbounded.
    pub rib_watermark: Option<usize>,
}

impl Neighbor {
    pub fn is_ebgp(&self) -> bool {
        self.local_asn != self.peer_asn
    }
}

/// All configured neighbors, handed to the reactor once at startup (spec section 3 "Lifetime/
/// ownership": `Neighbor` is loaded by the config collaborator and owned by the reactor for the
/// process lifetime).
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub neighbors: Vec<Neighbor>,
}

impl Config {
    pub fn from_neighbors(neighbors: Vec<Neighbor>) -> Self {
        Self { neighbors }
    }

    pub fn find(&self, peer_address: IpAddr) -> Option<&Neighbor> {
        self.neighbors.iter().find(|n| n.peer_address == peer_address)
    }
}

/// Built-in example configuration, gated behind its own module so a future configuration-file
/// tokenizer can replace `main.rs`'s call site without touching the reactor (SPEC_FULL section
/// 2.3).
pub mod configs {
    use super::*;

    pub fn sample() -> Config {
        Config::from_neighbors(vec![Neighbor {
            local_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            peer_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            local_asn: Asn(65001),
            peer_asn: Asn(65002),
            hold_time: 90,
            router_id: Ipv4Addr::new(10, 0, 0, 1),
            families: vec![(Afi::Ipv4, Safi::Unicast)],
            passive: false,
            group_updates: true,
            md5_password: None,
            ttl_security: None,
            connect_timeout: Duration::from_secs(10),
            rib_watermark: None,
        }])
    }
}
