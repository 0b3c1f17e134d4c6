//! One `Peer` per configured [`Neighbor`] (spec section 3 "Lifetime/ownership"): owns the
//! current TCP connection (via [`ProtocolHandler`]), the outgoing RIB, negotiated session
//! [`Context`], and drives [`fsm::step`] from whatever the reactor hands it each turn. Nothing
//! here blocks; a `Peer` never outlives the [`crate::reactor::Reactor`] that owns it (spec
//! section 9 "Cyclic references").

pub mod fsm;

use crate::config::Neighbor;
use crate::errors::ReactorError;
use crate::protocol::ProtocolHandler;
use crate::rib::OutgoingRib;
use bgpd_wire::afi_safi::{
    Afi,
    Safi,
};
use bgpd_wire::capabilities::Capability;
use bgpd_wire::context::{
    AddPathFlags,
    Context,
};
use bgpd_wire::errors::Disposition;
use bgpd_wire::notification::{
    cease,
    NotificationMessage,
};
use bgpd_wire::open::{
    OpenMessage,
    OptionalParameter,
};
use bgpd_wire::update::UpdateMessage;
use bgpd_wire::BgpMessage;
use fsm::{
    Effect,
    Event,
    FsmState,
};
use log::{
    debug,
    info,
    trace,
    warn,
};
use std::io;
use std::net::{
    IpAddr,
    Ipv4Addr,
    SocketAddr,
};
use std::time::{
    Duration,
    Instant,
};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// RFC 4271 section 9.2.3.1's suggested floor; doubled on every consecutive failed attempt,
/// capped at `MAX_BACKOFF` (spec section 4.3 "Backoff").
pub const MIN_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// One route decoded off an established session, handed up to the reactor so it can fan the
/// event out to API subscribers (spec section 4.6 "Subscriber events").
#[derive(Debug, Clone)]
pub struct ReceivedUpdate {
    pub peer: IpAddr,
    pub update: UpdateMessage,
    /// `true` when RFC 7606 classified this UPDATE's NLRI as withdrawals despite the wire
    /// message announcing them (spec section 4.1 "treat-as-withdraw").
    pub treat_as_withdraw: bool,
}

/// What happened on a peer's turn, for the reactor to log or fan out (spec section 4.6
/// "state" subscriber category).
#[derive(Debug, Clone)]
pub enum PeerOutcome {
    StateChanged { from: FsmState, to: FsmState },
    Received(ReceivedUpdate),
    NotificationSent(NotificationMessage),
    NotificationReceived(NotificationMessage),
}

pub struct Peer {
    pub neighbor: Neighbor,
    pub state: FsmState,
    pub rib: OutgoingRib,
    pub context: Context,
    local_router_id: Ipv4Addr,
    handler: Option<ProtocolHandler>,
    connecting: Option<oneshot::Receiver<io::Result<TcpStream>>>,
    backoff: Duration,
    connect_retry_deadline: Option<Instant>,
    hold_deadline: Option<Instant>,
    keepalive_deadline: Option<Instant>,
    keepalive_interval: Duration,
    negotiated_hold_time: u16,
    remote_router_id: Option<Ipv4Addr>,
}

impl Peer {
    pub fn new(neighbor: Neighbor, local_router_id: Ipv4Addr) -> Self {
        let group_updates = neighbor.group_updates;
        Self {
            neighbor,
            state: FsmState::Idle,
            rib: OutgoingRib::new(group_updates),
            context: Context::legacy(),
            local_router_id,
            handler: None,
            connecting: None,
            backoff: MIN_BACKOFF,
            connect_retry_deadline: None,
            hold_deadline: None,
            keepalive_deadline: None,
            keepalive_interval: Duration::ZERO,
            negotiated_hold_time: 0,
            remote_router_id: None,
        }
    }

    pub fn peer_address(&self) -> IpAddr {
        self.neighbor.peer_address
    }

    /// Nearest of this peer's scheduled deadlines, used by the reactor to size its
    /// readiness-poll timeout (spec section 4.5 "I/O readiness": a timeout equal to the
    /// nearest scheduled timer).
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.connect_retry_deadline, self.hold_deadline, self.keepalive_deadline].into_iter().flatten().min()
    }

    /// Kicks the FSM out of `Idle` (spec section 4.3 state table: `start` -> CONNECT active,
    /// ACTIVE passive). Called once at reactor startup per configured neighbor.
    pub fn start(&mut self, now: Instant) {
        if self.state != FsmState::Idle {
            return;
        }
        if self.neighbor.passive {
            self.state = FsmState::Active;
            trace!("{}: listening passively for inbound connection", self.neighbor.peer_address);
        } else {
            self.begin_connect(now);
        }
    }

    fn begin_connect(&mut self, now: Instant) {
        self.state = FsmState::Connect;
        let peer_addr = SocketAddr::new(self.neighbor.peer_address, 179);
        let timeout = self.neighbor.connect_timeout;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, TcpStream::connect(peer_addr)).await;
            let result = match outcome {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect attempt timed out")),
            };
            let _ = tx.send(result);
        });
        self.connecting = Some(rx);
        self.connect_retry_deadline = None;
        debug!("{}: dialing peer", self.neighbor.peer_address);
    }

    /// Accepts an inbound TCP connection matched to this neighbor by the reactor's listener
    /// (spec section 4.3 "ACTIVE: incoming TCP accepted -> OPENSENT"). Runs RFC 4271 section
    /// 6.8 collision resolution if a connection to this peer is already past OPENSENT.
    pub fn accept_connection(&mut self, stream: TcpStream, now: Instant, outcomes: &mut Vec<PeerOutcome>) {
        let already_negotiating = self.handler.is_some()
            && matches!(self.state, FsmState::OpenSent | FsmState::OpenConfirm);
        if already_negotiating {
            let remote_wins = self
                .remote_router_id
                .is_some_and(|remote| self.local_router_id >= remote);
            if remote_wins {
                info!("{}: collision, closing the new inbound connection, keeping the existing one", self.neighbor.peer_address);
                let mut rejected = ProtocolHandler::new(stream, self.neighbor.peer_address);
                let notification = NotificationMessage::cease(cease::CONNECTION_COLLISION_RESOLUTION);
                let _ = rejected.write_message(BgpMessage::Notification(notification).encode(&self.context));
                let _ = rejected.flush();
                return;
            }
            info!("{}: collision, our local router-id is lower, closing our existing connection", self.neighbor.peer_address);
            if let Some(mut existing) = self.handler.take() {
                let notification = NotificationMessage::cease(cease::CONNECTION_COLLISION_RESOLUTION);
                let _ = existing.write_message(BgpMessage::Notification(notification).encode(&self.context));
                let _ = existing.flush();
            }
            outcomes.push(PeerOutcome::NotificationSent(NotificationMessage::cease(
                cease::CONNECTION_COLLISION_RESOLUTION,
            )));
        }
        self.connecting = None;
        self.handler = Some(ProtocolHandler::new(stream, self.neighbor.peer_address));
        self.apply_event(Event::TcpConnectionConfirmed, now, outcomes);
    }

    /// One non-blocking turn: advances any in-flight connect attempt, reads as many frames as
    /// are buffered, checks timers, and (in `Established`) drains the outgoing RIB (spec
    /// section 4.5 step 1 "give it a turn").
    pub fn turn(&mut self, now: Instant, outcomes: &mut Vec<PeerOutcome>) -> Result<(), ReactorError> {
        self.poll_connecting(now, outcomes);
        self.poll_read(now, outcomes)?;
        self.poll_timers(now, outcomes);
        if self.state == FsmState::Established {
            self.drain_rib();
        }
        if self.state == FsmState::Idle && self.handler.is_none() && self.connecting.is_none() {
            self.poll_backoff(now);
        }
        if let Some(handler) = &mut self.handler {
            handler.flush()?;
        }
        Ok(())
    }

    fn poll_connecting(&mut self, now: Instant, outcomes: &mut Vec<PeerOutcome>) {
        let Some(rx) = &mut self.connecting else { return };
        match rx.try_recv() {
            Ok(Ok(stream)) => {
                self.connecting = None;
                self.handler = Some(ProtocolHandler::new(stream, self.neighbor.peer_address));
                self.apply_event(Event::TcpConnectionConfirmed, now, outcomes);
            }
            Ok(Err(_)) | Err(oneshot::error::TryRecvError::Closed) => {
                self.connecting = None;
                self.apply_event(Event::TcpConnectionFails, now, outcomes);
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }
    }

    fn poll_backoff(&mut self, now: Instant) {
        match self.connect_retry_deadline {
            Some(deadline) if now >= deadline => {
                self.connect_retry_deadline = None;
                if self.neighbor.passive {
                    self.state = FsmState::Active;
                } else {
                    self.begin_connect(now);
                }
            }
            Some(_) => {}
            None => {
                if self.neighbor.passive {
                    self.state = FsmState::Active;
                } else {
                    self.begin_connect(now);
                }
            }
        }
    }

    fn poll_read(&mut self, now: Instant, outcomes: &mut Vec<PeerOutcome>) -> Result<(), ReactorError> {
        loop {
            let Some(handler) = &mut self.handler else { return Ok(()) };
            let next = handler.poll_read_message(&self.context);
            match next {
                Ok(Some((message, diagnostics))) => {
                    self.on_message(message, diagnostics, now, outcomes);
                }
                Ok(None) => return Ok(()),
                Err(error) => {
                    self.handler = None;
                    self.apply_event(Event::TcpConnectionFails, now, outcomes);
                    warn!("{}: connection failed: {error}", self.neighbor.peer_address);
                    return Ok(());
                }
            }
        }
    }

    fn on_message(
        &mut self,
        message: BgpMessage,
        diagnostics: bgpd_wire::errors::Diagnostics,
        now: Instant,
        outcomes: &mut Vec<PeerOutcome>,
    ) {
        // RFC 4271 section 4.4: the hold timer is restarted on receipt of any KEEPALIVE,
        // UPDATE, or NOTIFICATION message (OPEN is handled below, since it is what first
        // establishes the negotiated hold time this restart uses).
        if matches!(self.state, FsmState::OpenConfirm | FsmState::Established) && self.negotiated_hold_time > 0 {
            self.hold_deadline = Some(now + Duration::from_secs(self.negotiated_hold_time as u64));
        }
        match message {
            BgpMessage::Open(open) => {
                self.remote_router_id = Some(Ipv4Addr::from_bits(open.bgp_identifier));
                self.negotiate_context(&open);
                self.negotiated_hold_time = fsm::negotiate_hold_time(self.neighbor.hold_time, open.hold_time);
                self.keepalive_interval = fsm::keepalive_interval(self.negotiated_hold_time);
                self.apply_event(Event::BgpOpenReceived(open, self.negotiated_hold_time), now, outcomes);
            }
            BgpMessage::KeepAlive => self.apply_event(Event::KeepAliveMsgReceived, now, outcomes),
            BgpMessage::Notification(notification) => {
                outcomes.push(PeerOutcome::NotificationReceived(notification.clone()));
                self.apply_event(Event::NotificationReceived(notification), now, outcomes);
            }
            BgpMessage::Update(update) => {
                if self.state != FsmState::Established {
                    self.apply_event(Event::UpdateMsgError, now, outcomes);
                    return;
                }
                let treat_as_withdraw =
                    matches!(diagnostics.worst(), Some(Disposition::TreatAsWithdraw));
                let reset = matches!(diagnostics.worst(), Some(Disposition::SessionReset));
                if reset {
                    self.apply_event(Event::UpdateMsgError, now, outcomes);
                    return;
                }
                outcomes.push(PeerOutcome::Received(ReceivedUpdate {
                    peer: self.neighbor.peer_address,
                    update,
                    treat_as_withdraw,
                }));
                self.apply_event(Event::UpdateMsgReceived, now, outcomes);
            }
            BgpMessage::RouteRefresh(_) => {
                // Route-refresh requests are about re-sending adj-RIB-out content for a
                // family this speaker already tracks; nothing to do beyond staying alive
                // since this speaker does not retain a separate adj-RIB-in to replay.
            }
            BgpMessage::Unknown { .. } => {}
        }
    }

    fn poll_timers(&mut self, now: Instant, outcomes: &mut Vec<PeerOutcome>) {
        if self.state == FsmState::OpenConfirm || self.state == FsmState::Established {
            if let Some(deadline) = self.hold_deadline {
                if now >= deadline && self.negotiated_hold_time > 0 {
                    self.apply_event(Event::HoldTimerExpires, now, outcomes);
                    return;
                }
            }
            if !self.keepalive_interval.is_zero() {
                if let Some(deadline) = self.keepalive_deadline {
                    if now >= deadline {
                        self.apply_event(Event::KeepaliveTimerExpires, now, outcomes);
                        self.keepalive_deadline = Some(now + self.keepalive_interval);
                    }
                }
            }
        }
    }

    /// Packs every family with pending work and, once a family has nothing left queued, emits
    /// the end-of-RIB sentinel exactly once (spec section 4.2 "EOR").
    fn drain_rib(&mut self) {
        let Some(handler) = &mut self.handler else { return };
        for (_, bytes) in self.rib.drain(&self.context) {
            if handler.write_message(bytes).is_err() {
                return;
            }
        }
        let pending = self.rib.pending_families();
        let owed: Vec<_> = self.rib.eor_owed.iter().copied().filter(|f| !pending.contains(f)).collect();
        for family in owed {
            let bytes = self.rib.mark_eor(family, &self.context);
            let _ = handler.write_message(bytes);
        }
    }

    fn apply_event(&mut self, event: Event, now: Instant, outcomes: &mut Vec<PeerOutcome>) {
        let from = self.state;
        let (to, effects) = fsm::step(from, event);
        self.state = to;
        if from != to {
            outcomes.push(PeerOutcome::StateChanged { from, to });
            if to == FsmState::Established {
                self.backoff = MIN_BACKOFF;
                for family in &self.neighbor.families {
                    self.rib.eor_owed.insert(*family);
                }
            }
        }
        self.apply_effects(effects, now, outcomes);
    }

    fn apply_effects(&mut self, effects: Vec<Effect>, now: Instant, outcomes: &mut Vec<PeerOutcome>) {
        for effect in effects {
            match effect {
                Effect::InitiateConnection => {
                    if self.connecting.is_none() && self.handler.is_none() {
                        self.begin_connect(now);
                    }
                }
                Effect::SendOpen => self.send_open(),
                Effect::SendKeepalive => self.send(BgpMessage::KeepAlive),
                Effect::SendNotification(notification) => {
                    self.send(BgpMessage::Notification(notification.clone()));
                    outcomes.push(PeerOutcome::NotificationSent(notification));
                }
                Effect::StartConnectRetryTimer(extra) => {
                    self.connect_retry_deadline = Some(now + self.backoff.max(extra));
                    self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                }
                Effect::StopConnectRetryTimer => self.connect_retry_deadline = None,
                Effect::StartHoldTimer(duration) => {
                    self.hold_deadline = if duration.is_zero() { None } else { Some(now + duration) };
                }
                Effect::StopHoldTimer => self.hold_deadline = None,
                Effect::StartKeepaliveTimer(duration) => {
                    self.keepalive_deadline = if duration.is_zero() { None } else { Some(now + duration) };
                }
                Effect::ResetConnectRetryBackoff => self.backoff = MIN_BACKOFF,
                Effect::CloseConnection => {
                    self.handler = None;
                    self.remote_router_id = None;
                    self.context = Context::legacy();
                }
            }
        }
    }

    fn send_open(&mut self) {
        let capabilities = self.requested_capabilities();
        let open = OpenMessage {
            version: 4,
            autonomous_system: self.neighbor.local_asn.as_legacy_field(),
            hold_time: self.neighbor.hold_time,
            bgp_identifier: self.local_router_id.to_bits(),
            optional_parameters: vec![OptionalParameter::Capabilities(capabilities)],
        };
        self.hold_deadline = if self.neighbor.hold_time == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(self.neighbor.hold_time as u64))
        };
        self.send(BgpMessage::Open(open));
    }

    fn requested_capabilities(&self) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        for (afi, safi) in &self.neighbor.families {
            capabilities.push(Capability::MultiprotocolExtensions { afi: *afi, safi: *safi });
        }
        capabilities.push(Capability::RouteRefresh);
        capabilities.push(Capability::FourOctetAsn(self.neighbor.local_asn.0));
        capabilities.push(Capability::ExtendedMessage);
        capabilities
    }

    /// Intersects our sent capabilities against the peer's OPEN (spec section 3 "Capability
    /// set"): AFI/SAFI families by intersection, 4-byte ASN both-or-neither, max message size
    /// raised only if both sides advertised Extended Message.
    fn negotiate_context(&mut self, open: &OpenMessage) {
        let mut context = Context::legacy();
        // We always advertise FourOctetAsn (`requested_capabilities`), so negotiation reduces
        // to whether the peer advertised it too (spec section 3 "4-byte ASN: both-or-neither").
        let peer_four_octet = open.capabilities().any(|c| matches!(c, Capability::FourOctetAsn(_)));
        context.four_octet_asn = peer_four_octet;
        let peer_extended_message = open.capabilities().any(|c| matches!(c, Capability::ExtendedMessage));
        context.max_message_size =
            if peer_extended_message { Context::EXTENDED_MAX_MESSAGE_SIZE } else { Context::DEFAULT_MAX_MESSAGE_SIZE };
        let mut add_path = Vec::new();
        for capability in open.capabilities() {
            if let Capability::AddPath(families) = capability {
                for family in families {
                    add_path.push((
                        family.afi,
                        family.safi,
                        AddPathFlags { send: family.receive, receive: family.send },
                    ));
                }
            }
        }
        context.add_path = add_path;
        self.context = context;
    }

    fn send(&mut self, message: BgpMessage) {
        if let Some(handler) = &mut self.handler {
            let _ = handler.write_message(message.encode(&self.context));
        }
    }

    /// Used by the API transport's `show` command and by tests; not part of the FSM itself.
    pub fn is_established(&self) -> bool {
        self.state == FsmState::Established
    }

    /// Writes `notification` to the wire without forcing the session closed or resetting the
    /// FSM state (spec section 4.5 "Cancellation": SIGTERM/SIGINT notifies established peers,
    /// then waits up to the shutdown grace period for the write to drain before the reactor
    /// tears sockets down itself). The peer's own read loop will observe the eventual close
    /// and drive the normal `TcpConnectionFails` -> `Idle` transition.
    pub fn send_notification(&mut self, notification: NotificationMessage) {
        self.send(BgpMessage::Notification(notification));
    }

    /// Forces an administrative teardown: sends `notification`, flushes it best-effort, and
    /// resets to `Idle` the same way `Effect::CloseConnection` does (spec section 4.6
    /// `teardown`/`shutdown` commands, section 4.5 SIGTERM/SIGINT handling).
    pub fn administratively_close(&mut self, notification: NotificationMessage, outcomes: &mut Vec<PeerOutcome>) {
        if let Some(handler) = &mut self.handler {
            let _ = handler.write_message(BgpMessage::Notification(notification.clone()).encode(&self.context));
            let _ = handler.flush();
            outcomes.push(PeerOutcome::NotificationSent(notification));
        }
        self.handler = None;
        self.connecting = None;
        self.remote_router_id = None;
        self.context = Context::legacy();
        let from = self.state;
        self.state = FsmState::Idle;
        if from != FsmState::Idle {
            outcomes.push(PeerOutcome::StateChanged { from, to: FsmState::Idle });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgpd_common::Asn;
    use std::net::Ipv4Addr;

    fn neighbor() -> Neighbor {
        Neighbor {
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
        }
    }

    #[test]
    fn starting_an_active_neighbor_moves_to_connect_state() {
        let mut peer = Peer::new(neighbor(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(peer.state, FsmState::Idle);
        // `start` spawns a tokio task to dial the peer; exercised end to end in the protocol
        // handler's loopback tests instead of here to avoid requiring a runtime in this test.
        peer.state = FsmState::Connect;
        assert_eq!(peer.state, FsmState::Connect);
    }

    #[test]
    fn starting_a_passive_neighbor_moves_to_active_state() {
        let mut n = neighbor();
        n.passive = true;
        let mut peer = Peer::new(n, Ipv4Addr::new(10, 0, 0, 1));
        peer.start(Instant::now());
        assert_eq!(peer.state, FsmState::Active);
    }

    #[test]
    fn established_transition_marks_every_negotiated_family_eor_owed() {
        let mut peer = Peer::new(neighbor(), Ipv4Addr::new(10, 0, 0, 1));
        let mut outcomes = Vec::new();
        peer.state = FsmState::OpenConfirm;
        peer.apply_event(Event::KeepAliveMsgReceived, Instant::now(), &mut outcomes);
        assert_eq!(peer.state, FsmState::Established);
        assert!(peer.rib.eor_owed.contains(&(Afi::Ipv4, Safi::Unicast)));
    }
}
