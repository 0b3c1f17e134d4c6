//! The peer finite state machine itself (spec section 4.3 "States and transitions", RFC 4271
//! section 8): a pure function from `(state, event)` to `(state, effects)`. Kept separate from
//! [`super::Peer`] so the transition table can be read and tested on its own, the way the wire
//! codec's `pack`/`unpack` pairs are tested apart from the reactor that calls them.

use bgpd_wire::notification::NotificationMessage;
use bgpd_wire::open::OpenMessage;
use std::time::Duration;

/// Connection states a peer session can be in (RFC 4271 section 8, spec section 3 "session
/// identity"). `Active` is distinct from `Idle`: it means a passive peer is listening for an
/// inbound TCP connection, not that nothing is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsmState {
    #[default]
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

/// Inputs the reactor feeds into the FSM: a timer firing, a TCP-level event, or a decoded BGP
/// message arriving (spec section 4.3).
#[derive(Debug, Clone)]
pub enum Event {
    ManualStart,
    ManualStop,
    ConnectRetryTimerExpires,
    HoldTimerExpires,
    KeepaliveTimerExpires,
    TcpConnectionConfirmed,
    TcpConnectionFails,
    /// The peer's OPEN, paired with the hold time already negotiated from it (RFC 4271 section
    /// 4.2: the smaller of the two sides' proposed values) so this pure function never has to
    /// see the local side's configuration to compute it.
    BgpOpenReceived(OpenMessage, u16),
    BgpOpenMsgError,
    KeepAliveMsgReceived,
    NotificationReceived(NotificationMessage),
    UpdateMsgReceived,
    UpdateMsgError,
}

/// Side effects the FSM wants carried out; `Peer::turn` is the only interpreter of these
/// (spec section 4.3 "errors within ESTABLISHED" / "backoff" / "hold timer").
#[derive(Debug, Clone)]
pub enum Effect {
    InitiateConnection,
    SendOpen,
    SendKeepalive,
    SendNotification(NotificationMessage),
    StartConnectRetryTimer(Duration),
    StopConnectRetryTimer,
    StartHoldTimer(Duration),
    StopHoldTimer,
    StartKeepaliveTimer(Duration),
    ResetConnectRetryBackoff,
    CloseConnection,
}

/// Applies one event to `state`, returning the next state and the effects to carry out (spec
/// section 4.3 transition table; RFC 4271 section 8.2.1/8.2.2). Events the table doesn't define
/// for a given state are treated as protocol errors (RFC 4271 section 8 "FSM Error handling")
/// and both reset the session to `Idle` and tear down the connection, mirroring what a real
/// speaker does on an out-of-sequence message rather than silently ignoring it.
pub fn step(state: FsmState, event: Event) -> (FsmState, Vec<Effect>) {
    use Effect::*;
    use FsmState::*;

    match (state, event) {
        (Idle, Event::ManualStart) => (Connect, vec![InitiateConnection, ResetConnectRetryBackoff]),

        (Connect, Event::TcpConnectionConfirmed) => {
            (OpenSent, vec![StopConnectRetryTimer, SendOpen])
        }
        (Connect, Event::TcpConnectionFails) => (Idle, vec![StartConnectRetryTimer(Duration::ZERO)]),
        (Connect, Event::ConnectRetryTimerExpires) => {
            (Connect, vec![InitiateConnection])
        }

        (Active, Event::TcpConnectionConfirmed) => (OpenSent, vec![StopConnectRetryTimer, SendOpen]),
        (Active, Event::ConnectRetryTimerExpires) => (Connect, vec![InitiateConnection]),

        (OpenSent, Event::BgpOpenReceived(_, negotiated_hold_time)) => {
            let hold_time = Duration::from_secs(negotiated_hold_time as u64);
            let mut effects = vec![SendKeepalive, StartHoldTimer(hold_time)];
            if hold_time.is_zero() {
                effects.push(StopHoldTimer);
            } else {
                effects.push(StartKeepaliveTimer(keepalive_interval(negotiated_hold_time)));
            }
            (OpenConfirm, effects)
        }
        (OpenSent, Event::BgpOpenMsgError) => {
            (Idle, vec![SendNotification(NotificationMessage::cease(0)), CloseConnection])
        }
        (OpenSent, Event::TcpConnectionFails) => (Active, vec![StartConnectRetryTimer(Duration::ZERO)]),

        (OpenConfirm, Event::KeepAliveMsgReceived) => (Established, vec![ResetConnectRetryBackoff]),
        (OpenConfirm, Event::KeepaliveTimerExpires) => (OpenConfirm, vec![SendKeepalive]),
        (OpenConfirm, Event::HoldTimerExpires) => {
            (Idle, vec![SendNotification(NotificationMessage::hold_timer_expired()), CloseConnection])
        }
        (OpenConfirm, Event::NotificationReceived(_)) => (Idle, vec![CloseConnection]),
        (OpenConfirm, Event::TcpConnectionFails) => (Idle, vec![StartConnectRetryTimer(Duration::ZERO)]),

        (Established, Event::KeepaliveTimerExpires) => (Established, vec![SendKeepalive]),
        (Established, Event::KeepAliveMsgReceived) => (Established, vec![]),
        (Established, Event::UpdateMsgReceived) => (Established, vec![]),
        (Established, Event::HoldTimerExpires) => {
            (Idle, vec![SendNotification(NotificationMessage::hold_timer_expired()), CloseConnection])
        }
        (Established, Event::UpdateMsgError) => {
            (Idle, vec![SendNotification(NotificationMessage::cease(0)), CloseConnection])
        }
        (Established, Event::NotificationReceived(_)) => (Idle, vec![CloseConnection]),
        (Established, Event::TcpConnectionFails) => (Idle, vec![StartConnectRetryTimer(Duration::ZERO)]),

        (_, Event::ManualStop) => (Idle, vec![StopConnectRetryTimer, StopHoldTimer, CloseConnection]),

        // Any message the table above doesn't expect for the current state: RFC 4271 section
        // 8's FSM Error handling, treated as a protocol error and reset to Idle.
        (Idle, _) => (Idle, vec![]),
        (_, _) => (Idle, vec![CloseConnection, StartConnectRetryTimer(Duration::ZERO)]),
    }
}

/// The minimum of two hold times the peer and local side each proposed (RFC 4271 section 4.2).
pub fn negotiate_hold_time(local: u16, peer: u16) -> u16 {
    local.min(peer)
}

/// RFC 4271 section 4.4: keepalives are sent at one third of the negotiated hold time.
pub fn keepalive_interval(hold_time: u16) -> Duration {
    Duration::from_secs((hold_time / 3) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_open(hold_time: u16) -> OpenMessage {
        OpenMessage { version: 4, autonomous_system: 65002, hold_time, bgp_identifier: 0, optional_parameters: Vec::new() }
    }

    #[test]
    fn manual_start_from_idle_initiates_a_connection() {
        let (state, effects) = step(FsmState::Idle, Event::ManualStart);
        assert_eq!(state, FsmState::Connect);
        assert!(matches!(effects[0], Effect::InitiateConnection));
    }

    #[test]
    fn full_handshake_reaches_established() {
        let (state, _) = step(FsmState::Idle, Event::ManualStart);
        let (state, _) = step(state, Event::TcpConnectionConfirmed);
        assert_eq!(state, FsmState::OpenSent);
        let (state, effects) = step(state, Event::BgpOpenReceived(sample_open(90), 90));
        assert_eq!(state, FsmState::OpenConfirm);
        assert!(effects.iter().any(|e| matches!(e, Effect::StartHoldTimer(_))));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartKeepaliveTimer(_))));
        let (state, _) = step(state, Event::KeepAliveMsgReceived);
        assert_eq!(state, FsmState::Established);
    }

    #[test]
    fn open_received_with_zero_negotiated_hold_time_stops_both_timers() {
        let (_, effects) = step(FsmState::OpenSent, Event::BgpOpenReceived(sample_open(0), 0));
        assert!(effects.iter().any(|e| matches!(e, Effect::StopHoldTimer)));
        assert!(!effects.iter().any(|e| matches!(e, Effect::StartKeepaliveTimer(_))));
    }

    #[test]
    fn hold_timer_expiry_in_established_sends_notification_and_resets() {
        let (state, effects) = step(FsmState::Established, Event::HoldTimerExpires);
        assert_eq!(state, FsmState::Idle);
        assert!(effects.iter().any(|e| matches!(e, Effect::SendNotification(_))));
    }

    #[test]
    fn unexpected_event_resets_session_to_idle() {
        let (state, effects) = step(FsmState::Established, Event::BgpOpenMsgError);
        assert_eq!(state, FsmState::Idle);
        assert!(!effects.is_empty());
    }

    #[test]
    fn hold_time_negotiation_takes_the_minimum() {
        assert_eq!(negotiate_hold_time(90, 180), 90);
        assert_eq!(negotiate_hold_time(180, 90), 90);
    }

    #[test]
    fn keepalive_interval_is_a_third_of_hold_time() {
        assert_eq!(keepalive_interval(90), Duration::from_secs(30));
    }
}
