//! Outgoing RIB / adj-RIB-out (spec section 4.2). One instance per peer; the peer FSM
//! (`crate::peer`) is the only caller, from the reactor's single thread, so everything here is
//! plain `HashMap`s rather than anything synchronized.

use bgpd_wire::afi_safi::{
    Afi,
    Safi,
};
use bgpd_wire::context::Context;
use bgpd_wire::mp::{
    AddressedNlri,
    MpReachNlri,
    MpUnreachNlri,
};
use bgpd_wire::nlri::{
    Nlri,
    PathInfo,
};
use bgpd_wire::path_attr::{
    pack_mp_next_hop,
    MpNextHop,
};
use bgpd_wire::update::{
    PathAttribute,
    UpdateMessage,
};
use bgpd_wire::BgpMessage;
use std::collections::HashMap;

pub type Family = (Afi, Safi);

/// One route's worth of reachability plus the attribute set it is announced with (spec section
/// 3 "Change"). `next_hop` is only meaningful for families other than IPv4 Unicast, whose
/// next hop travels inside the legacy NEXT_HOP path attribute instead of MP_REACH_NLRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub nlri: Nlri,
    pub path_info: Option<PathInfo>,
    pub next_hop: Option<MpNextHop>,
    pub attributes: Vec<PathAttribute>,
}

impl Change {
    pub fn family(&self) -> Family {
        self.nlri.afi_safi()
    }

    fn key(&self) -> Vec<u8> {
        let mut key = self.nlri.pack();
        if let Some(path_info) = self.path_info {
            key.extend_from_slice(&path_info.0.to_be_bytes());
        }
        key
    }

    /// Identifies the attribute set (plus, for MP families, the next hop that rides along
    /// with it in one MP_REACH_NLRI) so that routes sharing both can be packed into one UPDATE
    /// (spec section 4.2 "Attribute fingerprints with identical bytes MUST share one UPDATE").
    /// The ASN width used here is arbitrary (it never reaches the wire) as long as it is
    /// consistent, so attribute sets that differ only by negotiated width still group together.
    fn fingerprint(&self) -> Vec<u8> {
        let mut sorted: Vec<&PathAttribute> = self.attributes.iter().collect();
        sorted.sort_by_key(|attribute| attribute.type_code());
        let mut bytes: Vec<u8> = sorted.into_iter().flat_map(|attribute| attribute.pack(true)).collect();
        if let Some(next_hop) = self.next_hop {
            bytes.extend(pack_mp_next_hop(&next_hop));
        }
        bytes
    }
}

type NlriKey = Vec<u8>;
type Fingerprint = Vec<u8>;

/// Per-peer adj-RIB-out state (spec section 3 "Outgoing RIB state per peer"). Maintains the
/// two invariants spec.md names: a key is never present in both maps at once, and an
/// attribute-fingerprint bucket is dropped the instant it becomes empty.
#[derive(Debug, Default)]
pub struct OutgoingRib {
    announce: HashMap<Fingerprint, HashMap<Family, HashMap<NlriKey, Change>>>,
    withdraw: HashMap<Family, HashMap<NlriKey, Change>>,
    /// Families an EOR is still owed for (spec section 4.2 "Emitted exactly once per family
    /// after initial convergence").
    pub eor_owed: std::collections::HashSet<Family>,
    group_updates: bool,
}

impl OutgoingRib {
    pub fn new(group_updates: bool) -> Self {
        Self { group_updates, ..Default::default() }
    }

    fn remove_from_announce(&mut self, family: Family, key: &NlriKey) {
        let mut drained_fingerprints = Vec::new();
        for (fingerprint, families) in self.announce.iter_mut() {
            if let Some(keys) = families.get_mut(&family) {
                keys.remove(key);
                if keys.is_empty() {
                    families.remove(&family);
                }
            }
            if families.is_empty() {
                drained_fingerprints.push(fingerprint.clone());
            }
        }
        for fingerprint in drained_fingerprints {
            self.announce.remove(&fingerprint);
        }
    }

    /// Inserts/replaces `change` under `(fingerprint, family, key)`; any pending withdrawal for
    /// the same key is superseded (spec section 4.2 `queue_announce`).
    pub fn queue_announce(&mut self, change: Change) {
        let family = change.family();
        let key = change.key();
        if let Some(keys) = self.withdraw.get_mut(&family) {
            keys.remove(&key);
            if keys.is_empty() {
                self.withdraw.remove(&family);
            }
        }
        self.remove_from_announce(family, &key);
        let fingerprint = change.fingerprint();
        self.announce.entry(fingerprint).or_default().entry(family).or_default().insert(key, change);
    }

    /// Inserts a withdrawal under `(family, key)`, removing any pending announcement for the
    /// same key (spec section 4.2 `queue_withdraw`).
    pub fn queue_withdraw(&mut self, nlri: Nlri, path_info: Option<PathInfo>) {
        let change = Change { nlri, path_info, next_hop: None, attributes: Vec::new() };
        let family = change.family();
        let key = change.key();
        self.remove_from_announce(family, &key);
        self.withdraw.entry(family).or_default().insert(key, change);
    }

    /// Families with anything pending a drain (used by the peer FSM to decide whether to emit
    /// an EOR after this drain, spec section 4.2 `mark_eor`).
    pub fn pending_families(&self) -> std::collections::HashSet<Family> {
        let mut families: std::collections::HashSet<Family> =
            self.withdraw.keys().copied().collect();
        for per_family in self.announce.values() {
            families.extend(per_family.keys().copied());
        }
        families
    }

    pub fn is_empty(&self) -> bool {
        self.withdraw.is_empty() && self.announce.is_empty()
    }

    /// Total number of distinct NLRI keys pending in either direction, used to enforce a
    /// per-peer RIB watermark (spec section 5 "Shared resources").
    pub fn len(&self) -> usize {
        let announced: usize =
            self.announce.values().flat_map(|families| families.values()).map(|keys| keys.len()).sum();
        let withdrawn: usize = self.withdraw.values().map(|keys| keys.len()).sum();
        announced + withdrawn
    }

    /// Drops every pending announcement and withdrawal without touching `eor_owed` (the
    /// `flush adj-rib-out` API command, spec section 4.6).
    pub fn clear(&mut self) {
        self.announce.clear();
        self.withdraw.clear();
    }

    /// Packs every pending change into bounded-size UPDATE messages: withdrawals first, then
    /// one or more announcement UPDATEs per attribute bucket (spec section 4.2 "Drain
    /// algorithm"). Drained entries are removed from the RIB.
    pub fn drain(&mut self, context: &Context) -> Vec<(Family, Vec<u8>)> {
        let mut out = Vec::new();
        let max_message_size = context.max_message_size;

        let mut families: Vec<Family> = self.pending_families().into_iter().collect();
        families.sort();

        for family in families {
            if let Some(keys) = self.withdraw.remove(&family) {
                let changes: Vec<Change> = keys.into_values().collect();
                for bytes in build_withdraw_updates(family, &changes, max_message_size, self.group_updates, context) {
                    out.push((family, bytes));
                }
            }

            let fingerprints: Vec<Fingerprint> = self
                .announce
                .iter()
                .filter(|(_, families)| families.contains_key(&family))
                .map(|(fingerprint, _)| fingerprint.clone())
                .collect();
            for fingerprint in fingerprints {
                let Some(keys) = self.announce.get_mut(&fingerprint).and_then(|f| f.remove(&family)) else {
                    continue;
                };
                if self.announce.get(&fingerprint).is_some_and(|f| f.is_empty()) {
                    self.announce.remove(&fingerprint);
                }
                let changes: Vec<Change> = keys.into_values().collect();
                for bytes in build_announce_updates(family, &changes, max_message_size, self.group_updates, context) {
                    out.push((family, bytes));
                }
            }
        }
        out
    }

    /// Builds the end-of-RIB sentinel for `family` (spec section 4.2 "EOR"). Does not mutate
    /// RIB state; the caller (peer FSM) is responsible for calling this at most once per family
    /// once `pending_families()` no longer contains it.
    pub fn mark_eor(&mut self, family: Family, context: &Context) -> Vec<u8> {
        self.eor_owed.remove(&family);
        if family == (Afi::Ipv4, Safi::Unicast) {
            BgpMessage::Update(UpdateMessage::default()).encode(context)
        } else {
            let (afi, safi) = family;
            let update = UpdateMessage {
                withdrawn_routes: Vec::new(),
                path_attributes: vec![PathAttribute::MpUnreachNlri(MpUnreachNlri { afi, safi, nlri: Vec::new() })],
                nlri: Vec::new(),
            };
            BgpMessage::Update(update).encode(context)
        }
    }
}

fn batch_by_encoded_size<T>(
    items: &[T],
    max_message_size: u16,
    group_updates: bool,
    build: impl Fn(&[T]) -> Vec<u8>,
) -> Vec<Vec<u8>> {
    if items.is_empty() {
        return Vec::new();
    }
    if !group_updates {
        return items.iter().map(|item| build(std::slice::from_ref(item))).collect();
    }
    let mut batches = Vec::new();
    let mut start = 0;
    while start < items.len() {
        let mut end = start + 1;
        while end < items.len() {
            if build(&items[start..end + 1]).len() > max_message_size as usize {
                break;
            }
            end += 1;
        }
        batches.push(build(&items[start..end]));
        start = end;
    }
    batches
}

fn build_withdraw_updates(
    family: Family,
    changes: &[Change],
    max_message_size: u16,
    group_updates: bool,
    context: &Context,
) -> Vec<Vec<u8>> {
    if family == (Afi::Ipv4, Safi::Unicast) {
        let prefixes: Vec<bgpd_common::Prefix> = changes
            .iter()
            .filter_map(|change| match &change.nlri {
                Nlri::Unicast(prefix) => Some(prefix.0),
                _ => None,
            })
            .collect();
        batch_by_encoded_size(&prefixes, max_message_size, group_updates, |batch| {
            let update = UpdateMessage { withdrawn_routes: batch.to_vec(), path_attributes: Vec::new(), nlri: Vec::new() };
            BgpMessage::Update(update).encode(context)
        })
    } else {
        let (afi, safi) = family;
        let addressed: Vec<AddressedNlri> = changes
            .iter()
            .map(|change| AddressedNlri { path_info: change.path_info, nlri: change.nlri.clone() })
            .collect();
        batch_by_encoded_size(&addressed, max_message_size, group_updates, |batch| {
            let update = UpdateMessage {
                withdrawn_routes: Vec::new(),
                path_attributes: vec![PathAttribute::MpUnreachNlri(MpUnreachNlri {
                    afi,
                    safi,
                    nlri: batch.to_vec(),
                })],
                nlri: Vec::new(),
            };
            BgpMessage::Update(update).encode(context)
        })
    }
}

fn build_announce_updates(
    family: Family,
    changes: &[Change],
    max_message_size: u16,
    group_updates: bool,
    context: &Context,
) -> Vec<Vec<u8>> {
    if changes.is_empty() {
        return Vec::new();
    }
    let attributes = changes[0].attributes.clone();
    if family == (Afi::Ipv4, Safi::Unicast) {
        let prefixes: Vec<bgpd_common::Prefix> = changes
            .iter()
            .filter_map(|change| match &change.nlri {
                Nlri::Unicast(prefix) => Some(prefix.0),
                _ => None,
            })
            .collect();
        batch_by_encoded_size(&prefixes, max_message_size, group_updates, |batch| {
            let update =
                UpdateMessage { withdrawn_routes: Vec::new(), path_attributes: attributes.clone(), nlri: batch.to_vec() };
            BgpMessage::Update(update).encode(context)
        })
    } else {
        let (afi, safi) = family;
        let next_hop = changes[0].next_hop.unwrap_or(MpNextHop {
            global: match afi {
                Afi::Ipv6 => core::net::IpAddr::V6(core::net::Ipv6Addr::UNSPECIFIED),
                _ => core::net::IpAddr::V4(core::net::Ipv4Addr::UNSPECIFIED),
            },
            link_local: None,
        });
        let addressed: Vec<AddressedNlri> = changes
            .iter()
            .map(|change| AddressedNlri { path_info: change.path_info, nlri: change.nlri.clone() })
            .collect();
        batch_by_encoded_size(&addressed, max_message_size, group_updates, |batch| {
            let mut path_attributes = attributes.clone();
            path_attributes.push(PathAttribute::MpReachNlri(MpReachNlri {
                afi,
                safi,
                next_hop,
                nlri: batch.to_vec(),
            }));
            let update = UpdateMessage { withdrawn_routes: Vec::new(), path_attributes, nlri: Vec::new() };
            BgpMessage::Update(update).encode(context)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgpd_wire::nlri::unicast::UnicastPrefix;
    use bgpd_wire::path_attr::{
        NextHop,
        Origin,
    };
    use std::str::FromStr;

    fn ipv4_change(prefix: &str, local_pref: u32) -> Change {
        let prefix = bgpd_common::Prefix::from_str(prefix).unwrap();
        Change {
            nlri: Nlri::Unicast(UnicastPrefix(prefix)),
            path_info: None,
            next_hop: None,
            attributes: vec![
                PathAttribute::Origin(Origin::Igp),
                PathAttribute::NextHop(NextHop(core::net::Ipv4Addr::new(10, 0, 0, 1))),
                PathAttribute::LocalPref(local_pref),
            ],
        }
    }

    #[test]
    fn announce_is_idempotent() {
        let mut rib = OutgoingRib::new(true);
        rib.queue_announce(ipv4_change("192.0.2.0/24", 100));
        rib.queue_announce(ipv4_change("192.0.2.0/24", 100));
        assert_eq!(rib.announce.values().map(|f| f.values().map(|k| k.len()).sum::<usize>()).sum::<usize>(), 1);
    }

    #[test]
    fn withdraw_after_announce_leaves_only_withdraw_map() {
        let mut rib = OutgoingRib::new(true);
        let change = ipv4_change("192.0.2.0/24", 100);
        rib.queue_announce(change.clone());
        rib.queue_withdraw(change.nlri.clone(), change.path_info);
        assert!(rib.announce.is_empty());
        assert_eq!(rib.withdraw.len(), 1);
    }

    #[test]
    fn different_attribute_sets_do_not_merge() {
        let mut rib = OutgoingRib::new(true);
        rib.queue_announce(ipv4_change("192.0.2.0/24", 100));
        rib.queue_announce(ipv4_change("198.51.100.0/24", 200));
        assert_eq!(rib.announce.len(), 2);
    }

    #[test]
    fn drain_produces_updates_within_max_message_size() {
        let mut rib = OutgoingRib::new(true);
        for i in 0..50u8 {
            rib.queue_announce(ipv4_change(&format!("10.{i}.0.0/24"), 100));
        }
        let context = Context::legacy();
        let updates = rib.drain(&context);
        assert!(!updates.is_empty());
        for (_, bytes) in &updates {
            assert!(bytes.len() <= context.max_message_size as usize);
        }
        assert!(rib.is_empty());
    }

    #[test]
    fn eor_for_ipv4_unicast_is_zero_length_update() {
        let mut rib = OutgoingRib::new(true);
        let bytes = rib.mark_eor((Afi::Ipv4, Safi::Unicast), &Context::legacy());
        assert_eq!(bytes.len(), bgpd_wire::MessageHeader::LENGTH + 4);
    }
}
