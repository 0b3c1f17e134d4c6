//! UPDATE message (RFC 4271 section 4.3): withdrawn routes, path attributes, and newly
//! reachable routes, plus the [`PathAttribute`] enum that dispatches every attribute type
//! this speaker understands, and the soft-error collection described by RFC 7606.

use crate::aigp::Aigp;
use crate::context::Context;
use crate::errors::{
    AttributeError,
    Diagnostics,
};
use crate::mp::{
    MpReachNlri,
    MpUnreachNlri,
};
use crate::nlri::unicast::UnicastPrefix;
use crate::path_attr::{
    merge_as4_path,
    pack_aggregator,
    unpack_aggregator,
    unpack_as4_aggregator,
    unpack_next_hop,
    unpack_origin,
    Aggregator,
    As4Aggregator,
    As4Path,
    AsPath,
    NextHop,
    Origin,
    PathAttributeFlags,
};
use crate::pmsi::PmsiTunnel;
use crate::prefix_sid::PrefixSid;
use crate::communities::{
    unpack_many_communities,
    unpack_many_extended,
    unpack_many_ipv6_extended,
    unpack_many_large,
    Community,
    ExtendedCommunity,
    Ipv6ExtendedCommunity,
    LargeCommunity,
};
use alloc::vec::Vec;
use bgpd_common::Prefix;
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

/// Attribute type codes (IANA "BGP Path Attributes" registry) that get their own variant
/// below; everything else falls through to [`PathAttribute::Unknown`].
pub mod type_code {
    pub const ORIGIN: u8 = 1;
    pub const AS_PATH: u8 = 2;
    pub const NEXT_HOP: u8 = 3;
    pub const MULTI_EXIT_DISC: u8 = 4;
    pub const LOCAL_PREF: u8 = 5;
    pub const ATOMIC_AGGREGATE: u8 = 6;
    pub const AGGREGATOR: u8 = 7;
    pub const COMMUNITY: u8 = 8;
    pub const ORIGINATOR_ID: u8 = 9;
    pub const CLUSTER_LIST: u8 = 10;
    pub const MP_REACH_NLRI: u8 = 14;
    pub const MP_UNREACH_NLRI: u8 = 15;
    pub const EXTENDED_COMMUNITIES: u8 = 16;
    pub const AS4_PATH: u8 = 17;
    pub const AS4_AGGREGATOR: u8 = 18;
    pub const PMSI_TUNNEL: u8 = 22;
    pub const IPV6_EXTENDED_COMMUNITIES: u8 = 25;
    pub const AIGP: u8 = 26;
    pub const LARGE_COMMUNITY: u8 = 32;
    pub const PREFIX_SID: u8 = 40;
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub enum PathAttribute {
    Origin(Origin),
    AsPath(AsPath),
    As4Path(As4Path),
    NextHop(NextHop),
    MultiExitDisc(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator(Aggregator),
    As4Aggregator(As4Aggregator),
    Community(Vec<Community>),
    ExtendedCommunities(Vec<ExtendedCommunity>),
    Ipv6ExtendedCommunities(Vec<Ipv6ExtendedCommunity>),
    LargeCommunity(Vec<LargeCommunity>),
    OriginatorId(u32),
    ClusterList(Vec<u32>),
    MpReachNlri(MpReachNlri),
    MpUnreachNlri(MpUnreachNlri),
    PmsiTunnel(PmsiTunnel),
    Aigp(Aigp),
    PrefixSid(PrefixSid),
    Unknown { type_code: u8, flags: PathAttributeFlags, data: Vec<u8> },
}

impl PathAttribute {
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Origin(_) => type_code::ORIGIN,
            Self::AsPath(_) => type_code::AS_PATH,
            Self::As4Path(_) => type_code::AS4_PATH,
            Self::NextHop(_) => type_code::NEXT_HOP,
            Self::MultiExitDisc(_) => type_code::MULTI_EXIT_DISC,
            Self::LocalPref(_) => type_code::LOCAL_PREF,
            Self::AtomicAggregate => type_code::ATOMIC_AGGREGATE,
            Self::Aggregator(_) => type_code::AGGREGATOR,
            Self::As4Aggregator(_) => type_code::AS4_AGGREGATOR,
            Self::Community(_) => type_code::COMMUNITY,
            Self::ExtendedCommunities(_) => type_code::EXTENDED_COMMUNITIES,
            Self::Ipv6ExtendedCommunities(_) => type_code::IPV6_EXTENDED_COMMUNITIES,
            Self::LargeCommunity(_) => type_code::LARGE_COMMUNITY,
            Self::OriginatorId(_) => type_code::ORIGINATOR_ID,
            Self::ClusterList(_) => type_code::CLUSTER_LIST,
            Self::MpReachNlri(_) => type_code::MP_REACH_NLRI,
            Self::MpUnreachNlri(_) => type_code::MP_UNREACH_NLRI,
            Self::PmsiTunnel(_) => type_code::PMSI_TUNNEL,
            Self::Aigp(_) => type_code::AIGP,
            Self::PrefixSid(_) => type_code::PREFIX_SID,
            Self::Unknown { type_code, .. } => *type_code,
        }
    }

    fn default_flags(type_code: u8) -> PathAttributeFlags {
        match type_code {
            self::type_code::ORIGIN
            | self::type_code::AS_PATH
            | self::type_code::NEXT_HOP
            | self::type_code::ATOMIC_AGGREGATE => PathAttributeFlags::TRANSITIVE,
            self::type_code::MULTI_EXIT_DISC | self::type_code::ORIGINATOR_ID | self::type_code::CLUSTER_LIST => {
                PathAttributeFlags::OPTIONAL
            }
            self::type_code::MP_REACH_NLRI | self::type_code::MP_UNREACH_NLRI => PathAttributeFlags::OPTIONAL,
            self::type_code::LOCAL_PREF => PathAttributeFlags::empty(),
            _ => PathAttributeFlags::OPTIONAL | PathAttributeFlags::TRANSITIVE,
        }
    }

    /// Decodes one attribute, returning `Ok(None)` (instead of an error) for a recoverable
    /// problem so the caller can apply RFC 7606's per-attribute disposition instead of
    /// aborting the whole UPDATE.
    pub fn unpack<'a>(
        input: &'a [u8],
        context: &Context,
        diagnostics: &mut Diagnostics,
    ) -> IResult<&'a [u8], Option<Self>> {
        let (input, raw_flags) = be_u8(input)?;
        let flags = PathAttributeFlags::from_bits_truncate(raw_flags);
        let (input, type_code) = be_u8(input)?;
        let (input, length) = if flags.contains(PathAttributeFlags::EXTENDED_LENGTH) {
            be_u16(input)?
        } else {
            let (input, length) = be_u8(input)?;
            (input, length as u16)
        };
        let (input, data) = take(length as usize)(input)?;

        if type_code == self::type_code::AS_PATH && data.len() % 2 != 0 && context.four_octet_asn {
            diagnostics.push(AttributeError::MalformedAsPath);
            return Ok((input, None));
        }

        let value = match type_code {
            self::type_code::ORIGIN => unpack_origin(data).ok().map(|(_, o)| Self::Origin(o)),
            self::type_code::AS_PATH => {
                AsPath::unpack(data, context.four_octet_asn).ok().map(|(_, path)| Self::AsPath(path))
            }
            self::type_code::AS4_PATH => As4Path::unpack(data).ok().map(|(_, path)| Self::As4Path(path)),
            self::type_code::NEXT_HOP => unpack_next_hop(data).ok().map(|(_, nh)| Self::NextHop(nh)),
            self::type_code::MULTI_EXIT_DISC => be_u32::<_, nom::error::Error<&[u8]>>(data)
                .ok()
                .map(|(_, med)| Self::MultiExitDisc(med)),
            self::type_code::LOCAL_PREF => {
                be_u32::<_, nom::error::Error<&[u8]>>(data).ok().map(|(_, pref)| Self::LocalPref(pref))
            }
            self::type_code::ATOMIC_AGGREGATE => Some(Self::AtomicAggregate),
            self::type_code::AGGREGATOR => unpack_aggregator(data, context.four_octet_asn)
                .ok()
                .map(|(_, aggregator)| Self::Aggregator(aggregator)),
            self::type_code::AS4_AGGREGATOR => {
                unpack_as4_aggregator(data).ok().map(|(_, aggregator)| Self::As4Aggregator(aggregator))
            }
            self::type_code::COMMUNITY => {
                unpack_many_communities(data).ok().map(|(_, communities)| Self::Community(communities))
            }
            self::type_code::EXTENDED_COMMUNITIES => {
                unpack_many_extended(data).ok().map(|(_, communities)| Self::ExtendedCommunities(communities))
            }
            self::type_code::IPV6_EXTENDED_COMMUNITIES => unpack_many_ipv6_extended(data)
                .ok()
                .map(|(_, communities)| Self::Ipv6ExtendedCommunities(communities)),
            self::type_code::LARGE_COMMUNITY => {
                unpack_many_large(data).ok().map(|(_, communities)| Self::LargeCommunity(communities))
            }
            self::type_code::ORIGINATOR_ID => {
                be_u32::<_, nom::error::Error<&[u8]>>(data).ok().map(|(_, id)| Self::OriginatorId(id))
            }
            self::type_code::CLUSTER_LIST => {
                many0(be_u32::<_, nom::error::Error<&[u8]>>).parse(data).ok().map(|(_, ids)| Self::ClusterList(ids))
            }
            self::type_code::MP_REACH_NLRI => {
                MpReachNlri::unpack(data, context).ok().map(|(_, mp)| Self::MpReachNlri(mp))
            }
            self::type_code::MP_UNREACH_NLRI => {
                MpUnreachNlri::unpack(data, context).ok().map(|(_, mp)| Self::MpUnreachNlri(mp))
            }
            self::type_code::PMSI_TUNNEL => PmsiTunnel::unpack(data).ok().map(|(_, tunnel)| Self::PmsiTunnel(tunnel)),
            self::type_code::AIGP => Aigp::unpack(data).ok().map(|(_, aigp)| Self::Aigp(aigp)),
            self::type_code::PREFIX_SID => PrefixSid::unpack(data).ok().map(|(_, sid)| Self::PrefixSid(sid)),
            _ => Some(Self::Unknown { type_code, flags, data: data.to_vec() }),
        };

        let value = match value {
            Some(value) => value,
            None => {
                diagnostics.push(AttributeError::BadFlags { type_code });
                return Ok((input, None));
            }
        };
        Ok((input, Some(value)))
    }

    pub fn pack(&self, four_octet_asn: bool) -> Vec<u8> {
        let flags = Self::default_flags(self.type_code());
        let mut data = Vec::new();
        match self {
            Self::Origin(origin) => data.push((*origin).into()),
            Self::AsPath(path) => data.extend(path.pack(four_octet_asn)),
            Self::As4Path(path) => data.extend(path.pack()),
            Self::NextHop(next_hop) => data.extend_from_slice(&next_hop.0.octets()),
            Self::MultiExitDisc(med) => data.extend_from_slice(&med.to_be_bytes()),
            Self::LocalPref(pref) => data.extend_from_slice(&pref.to_be_bytes()),
            Self::AtomicAggregate => {}
            Self::Aggregator(aggregator) => data.extend(pack_aggregator(aggregator, four_octet_asn)),
            Self::As4Aggregator(aggregator) => {
                data.extend_from_slice(&aggregator.asn.0.to_be_bytes());
                data.extend_from_slice(&aggregator.address.octets());
            }
            Self::Community(communities) => {
                for community in communities {
                    data.extend_from_slice(&community.pack());
                }
            }
            Self::ExtendedCommunities(communities) => {
                for community in communities {
                    data.extend_from_slice(&community.pack());
                }
            }
            Self::Ipv6ExtendedCommunities(communities) => {
                for community in communities {
                    data.extend_from_slice(&community.pack());
                }
            }
            Self::LargeCommunity(communities) => {
                for community in communities {
                    data.extend_from_slice(&community.pack());
                }
            }
            Self::OriginatorId(id) => data.extend_from_slice(&id.to_be_bytes()),
            Self::ClusterList(ids) => {
                for id in ids {
                    data.extend_from_slice(&id.to_be_bytes());
                }
            }
            Self::MpReachNlri(mp) => data.extend(mp.pack()),
            Self::MpUnreachNlri(mp) => data.extend(mp.pack()),
            Self::PmsiTunnel(tunnel) => data.extend(tunnel.pack()),
            Self::Aigp(aigp) => data.extend(aigp.pack()),
            Self::PrefixSid(sid) => data.extend(sid.pack()),
            Self::Unknown { data: raw, .. } => data.extend_from_slice(raw),
        };

        let flags = if let Self::Unknown { flags, .. } = self { *flags } else { flags };
        let extended = data.len() > u8::MAX as usize;
        let flags = if extended { flags | PathAttributeFlags::EXTENDED_LENGTH } else { flags - PathAttributeFlags::EXTENDED_LENGTH };

        let mut buffer = Vec::new();
        buffer.push(flags.bits());
        buffer.push(self.type_code());
        if extended {
            buffer.extend_from_slice(&(data.len() as u16).to_be_bytes());
        } else {
            buffer.push(data.len() as u8);
        }
        buffer.extend(data);
        buffer
    }
}

/// The UPDATE message itself (RFC 4271 section 4.3): legacy IPv4 withdrawn routes and NLRI
/// travel inline; every other family rides inside an MP_REACH_NLRI/MP_UNREACH_NLRI attribute.
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Default)]
pub struct UpdateMessage {
    pub withdrawn_routes: Vec<Prefix>,
    pub path_attributes: Vec<PathAttribute>,
    pub nlri: Vec<Prefix>,
}

impl UpdateMessage {
    /// End-of-RIB marker (RFC 4724 section 2): an UPDATE with no withdrawn routes, no path
    /// attributes and no NLRI, for either the legacy IPv4 family or (via MP_UNREACH_NLRI with
    /// an empty NLRI list) any other negotiated family.
    pub fn is_end_of_rib(&self) -> bool {
        self.withdrawn_routes.is_empty()
            && self.nlri.is_empty()
            && (self.path_attributes.is_empty()
                || (self.path_attributes.len() == 1
                    && matches!(
                        &self.path_attributes[0],
                        PathAttribute::MpUnreachNlri(mp) if mp.nlri.is_empty()
                    )))
    }

    pub fn unpack<'a>(
        input: &'a [u8],
        context: &Context,
        diagnostics: &mut Diagnostics,
    ) -> IResult<&'a [u8], Self> {
        let (input, withdrawn_length) = be_u16(input)?;
        let (input, withdrawn_data) = take(withdrawn_length as usize)(input)?;
        let (_, withdrawn_routes) = many0(UnicastPrefix::unpack_legacy).parse(withdrawn_data)?;

        let (input, attributes_length) = be_u16(input)?;
        let (input, mut attributes_data) = take(attributes_length as usize)(input)?;
        let mut path_attributes = Vec::new();
        while !attributes_data.is_empty() {
            let (rest, attribute) = PathAttribute::unpack(attributes_data, context, diagnostics)?;
            attributes_data = rest;
            if let Some(attribute) = attribute {
                path_attributes.push(attribute);
            }
        }

        if let Some(as_path) = path_attributes.iter().find_map(|a| match a {
            PathAttribute::AsPath(path) => Some(path.clone()),
            _ => None,
        }) {
            let as4_path = path_attributes.iter().find_map(|a| match a {
                PathAttribute::As4Path(path) => Some(path.clone()),
                _ => None,
            });
            if as4_path.is_some() && !context.four_octet_asn {
                let merged = merge_as4_path(&as_path, as4_path.as_ref());
                for attribute in path_attributes.iter_mut() {
                    if let PathAttribute::AsPath(path) = attribute {
                        *path = merged.clone();
                        break;
                    }
                }
            }
        }

        let (input, nlri) = many0(UnicastPrefix::unpack_legacy).parse(input)?;

        Ok((input, Self { withdrawn_routes, path_attributes, nlri }))
    }

    pub fn pack(&self, four_octet_asn: bool) -> Vec<u8> {
        let mut withdrawn = Vec::new();
        for prefix in &self.withdrawn_routes {
            withdrawn.extend(UnicastPrefix::pack_legacy(prefix));
        }
        let mut attributes = Vec::new();
        for attribute in &self.path_attributes {
            attributes.extend(attribute.pack(four_octet_asn));
        }
        let mut nlri = Vec::new();
        for prefix in &self.nlri {
            nlri.extend(UnicastPrefix::pack_legacy(prefix));
        }

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
        buffer.extend(withdrawn);
        buffer.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        buffer.extend(attributes);
        buffer.extend(nlri);
        buffer
    }
}
