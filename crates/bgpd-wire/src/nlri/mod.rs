//! NLRI encodings, one module per address family (spec section 3 "NLRI"/"Prefix"). Families
//! that are not fully modeled carry their payload opaque rather than being rejected, matching
//! the codec's general unknown-but-preserved posture (spec section 4.1).

pub mod bgpls;
pub mod evpn;
pub mod flowspec;
pub mod labeled;
pub mod mup;
pub mod mvpn;
pub mod unicast;
pub mod vpn;

use crate::afi_safi::{
    Afi,
    Safi,
};
use alloc::vec::Vec;
use bgpd_common::Prefix;
use core::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
};
use nom::{
    bytes::complete::take,
    IResult,
};

/// Reads a prefix encoded as `(bits, ceil(bits / 8) bytes)` (RFC 4271 section 4.3), zero-padding
/// the trailing partial byte out to the family's full address width.
pub(crate) fn decode_prefix(input: &[u8], bits: u8, afi: Afi) -> IResult<&[u8], Prefix> {
    let byte_length = ((bits as usize) + 7) / 8;
    let (input, raw) = take(byte_length)(input)?;
    let address = match afi {
        Afi::Ipv6 => {
            let mut octets = [0u8; 16];
            octets[..raw.len()].copy_from_slice(raw);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => {
            let mut octets = [0u8; 4];
            octets[..raw.len()].copy_from_slice(raw);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
    };
    Ok((input, Prefix { address, mask: bits }))
}

/// Encodes a prefix as `(bits, ceil(bits / 8) bytes)`, the inverse of [`decode_prefix`].
pub(crate) fn encode_prefix(prefix: &Prefix) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.push(prefix.mask);
    let length = prefix.byte_length();
    match prefix.address {
        IpAddr::V4(address) => buffer.extend_from_slice(&address.octets()[..length]),
        IpAddr::V6(address) => buffer.extend_from_slice(&address.octets()[..length]),
    }
    buffer
}

/// Whether a withdrawal/announcement direction applies to a route (spec section 3 "Action").
/// `Unset` is the default for an NLRI that has not yet been assigned a direction by its owning
/// RIB (e.g. one just decoded off the wire, before the peer FSM has classified it).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy, Default)]
pub enum Action {
    #[default]
    Unset,
    Announce,
    Withdraw,
}

/// ADD-PATH path identifier (RFC 7911 section 3), prepended to the NLRI itself when ADD-PATH
/// is negotiated send-or-receive for a family.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy, Default)]
pub struct PathInfo(pub u32);

/// One route's worth of reachability information, dispatched by (AFI, SAFI) to the codec that
/// understands that family's wire shape. `Unknown` preserves the raw bytes of a family this
/// build does not model so it can still be logged or relayed.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum Nlri {
    Unicast(unicast::UnicastPrefix),
    Labeled(labeled::LabeledPrefix),
    Vpn(vpn::VpnPrefix),
    Evpn(evpn::EvpnNlri),
    BgpLs(bgpls::BgpLsNlri),
    Flowspec(flowspec::FlowspecNlri),
    Mvpn(mvpn::MvpnNlri),
    Mup(mup::MupNlri),
    Unknown { afi: Afi, safi: Safi, data: Vec<u8> },
}

impl Nlri {
    pub fn afi_safi(&self) -> (Afi, Safi) {
        match self {
            Self::Unicast(prefix) => (
                if prefix.0.address.is_ipv4() { Afi::Ipv4 } else { Afi::Ipv6 },
                Safi::Unicast,
            ),
            Self::Labeled(labeled) => (
                if labeled.prefix.address.is_ipv4() { Afi::Ipv4 } else { Afi::Ipv6 },
                Safi::MplsLabel,
            ),
            Self::Vpn(vpn) => (
                if vpn.prefix.address.is_ipv4() { Afi::Ipv4 } else { Afi::Ipv6 },
                Safi::MplsVpn,
            ),
            Self::Evpn(_) => (Afi::L2vpn, Safi::Evpn),
            Self::BgpLs(_) => (Afi::BgpLs, Safi::BgpLs),
            Self::Flowspec(flowspec) => {
                (Afi::Ipv4, if flowspec.route_distinguisher.is_some() { Safi::FlowspecVpn } else { Safi::Flowspec })
            }
            Self::Mvpn(_) => (Afi::Ipv4, Safi::MulticastVpn),
            Self::Mup(_) => (Afi::Ipv4, Safi::Mup),
            Self::Unknown { afi, safi, .. } => (*afi, *safi),
        }
    }

    /// Decode one NLRI entry for `(afi, safi)`, consuming as many bytes from `input` as that
    /// family's encoding needs and leaving the rest for the next entry (MP_REACH/MP_UNREACH and
    /// legacy IPv4 NLRI are both flat sequences of these, spec section 3).
    pub fn unpack(input: &[u8], afi: Afi, safi: Safi) -> IResult<&[u8], Self> {
        match (afi, safi) {
            (Afi::Ipv4 | Afi::Ipv6, Safi::Unicast | Safi::Multicast) => {
                unicast::UnicastPrefix::unpack(input, afi).map(|(rest, p)| (rest, Self::Unicast(p)))
            }
            (Afi::Ipv4 | Afi::Ipv6, Safi::MplsLabel) => {
                labeled::LabeledPrefix::unpack(input, afi).map(|(rest, p)| (rest, Self::Labeled(p)))
            }
            (Afi::Ipv4 | Afi::Ipv6, Safi::MplsVpn) => {
                vpn::VpnPrefix::unpack(input, afi).map(|(rest, p)| (rest, Self::Vpn(p)))
            }
            (Afi::L2vpn, Safi::Evpn) => evpn::EvpnNlri::unpack(input).map(|(rest, p)| (rest, Self::Evpn(p))),
            (Afi::BgpLs, Safi::BgpLs) => bgpls::BgpLsNlri::unpack(input).map(|(rest, p)| (rest, Self::BgpLs(p))),
            (_, Safi::Flowspec) => {
                flowspec::FlowspecNlri::unpack(input, false).map(|(rest, p)| (rest, Self::Flowspec(p)))
            }
            (_, Safi::FlowspecVpn) => {
                flowspec::FlowspecNlri::unpack(input, true).map(|(rest, p)| (rest, Self::Flowspec(p)))
            }
            (_, Safi::MulticastVpn) => mvpn::MvpnNlri::unpack(input).map(|(rest, p)| (rest, Self::Mvpn(p))),
            (_, Safi::Mup) => mup::MupNlri::unpack(input).map(|(rest, p)| (rest, Self::Mup(p))),
            _ => Ok((&[], Self::Unknown { afi, safi, data: input.to_vec() })),
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        match self {
            Self::Unicast(prefix) => prefix.pack(),
            Self::Labeled(labeled) => labeled.pack(),
            Self::Vpn(vpn) => vpn.pack(),
            Self::Evpn(evpn) => evpn.pack(),
            Self::BgpLs(bgpls) => bgpls.pack(),
            Self::Flowspec(flowspec) => flowspec.pack(),
            Self::Mvpn(mvpn) => mvpn.pack(),
            Self::Mup(mup) => mup.pack(),
            Self::Unknown { data, .. } => data.clone(),
        }
    }
}

/// Splits a flat run of length-prefixed NLRI entries (the legacy IPv4 NLRI field, and the body
/// of MP_REACH/MP_UNREACH after the next hop) into individual [`Nlri`] values.
pub fn unpack_many(mut input: &[u8], afi: Afi, safi: Safi) -> IResult<&[u8], Vec<Nlri>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (rest, nlri) = Nlri::unpack(input, afi, safi)?;
        out.push(nlri);
        input = rest;
    }
    Ok((input, out))
}
