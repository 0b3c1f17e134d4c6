//! Address Family Identifier / Subsequent Address Family Identifier (RFC 4760 section 6,
//! IANA "Address Family Numbers" / "Subsequent Address Family Identifiers" registries). The
//! pair selects which per-family NLRI codec `mp::dispatch` and `update::Nlri` use.

use bgpd_common::type_enum;

type_enum! {
    #[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
    pub enum Afi: be_u16(u16) {
        Ipv4 = 1,
        Ipv6 = 2,
        L2vpn = 25,
        BgpLs = 16388
    }
}

type_enum! {
    #[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
    pub enum Safi: be_u8(u8) {
        Unicast = 1,
        Multicast = 2,
        MplsLabel = 4,
        MplsVpn = 128,
        Flowspec = 133,
        FlowspecVpn = 134,
        MulticastVpn = 5,
        Vpls = 65,
        Evpn = 70,
        BgpLs = 71,
        BgpLsVpn = 72,
        Mup = 85
    }
}

impl Afi {
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, Afi::Ipv4)
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, Afi::Ipv6)
    }
}
