//! External API transport (spec section 4.6): a line-oriented command channel over a Unix
//! domain socket (default) or, for legacy deployments, a pair of named pipes. Both transports
//! share the same [`Command`] parser and [`Event`] serializer so the reactor's handling code
//! never needs to know which one it is talking to (SPEC_FULL section 4.6).

use crate::config::Config;
use crate::errors::ApiError;
use crate::peer::{
    PeerOutcome,
    ReceivedUpdate,
};
use bgpd_common::{
    Asn,
    Prefix,
};
use bgpd_wire::communities::Community;
use bgpd_wire::path_attr::{
    AsPath,
    NextHop,
    Origin,
};
use bgpd_wire::update::PathAttribute;
use log::{
    debug,
    warn,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;
use tokio::io::{
    AsyncBufReadExt,
    AsyncWriteExt,
    BufReader,
};
use tokio::net::{
    UnixListener,
    UnixStream,
};

/// Default concurrent-session limit (spec section 5 "Shared resources").
pub const MAX_SESSIONS: usize = 32;

/// A neighbor selector (spec section 4.6 "command grammar"): every configured neighbor, one
/// specific address, or an explicit bracketed list.
#[derive(Debug, Clone)]
pub enum Selector {
    All,
    One(IpAddr),
    Many(Vec<IpAddr>),
}

impl Selector {
    fn matches(&self, candidate: IpAddr) -> bool {
        match self {
            Self::All => true,
            Self::One(address) => *address == candidate,
            Self::Many(addresses) => addresses.contains(&candidate),
        }
    }

    fn parse(token: &str) -> Result<Self, ApiError> {
        if token == "*" {
            return Ok(Self::All);
        }
        if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let addresses = inner
                .split(',')
                .map(|part| IpAddr::from_str(part.trim()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ApiError::ParseError(format!("bad selector list '{token}'")))?;
            return Ok(Self::Many(addresses));
        }
        IpAddr::from_str(token).map(Self::One).map_err(|_| ApiError::ParseError(format!("bad selector '{token}'")))
    }
}

/// A fully parsed route spec from `announce route ...` / `withdraw route ...` (spec section
/// 4.6, scenario B). Only the IPv4/IPv6-unicast subset is accepted from the command line;
/// other families are reachable only via the programmatic RIB API this module sits on top of.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub prefix: Prefix,
    pub next_hop: Option<IpAddr>,
    pub local_pref: Option<u32>,
    pub med: Option<u32>,
    pub communities: Vec<Community>,
}

/// One decoded command (spec section 4.6 "Command grammar"). `selector` is `None` for verbs
/// that are not neighbor-scoped (`show`, `version`, `help`).
#[derive(Debug, Clone)]
pub enum Command {
    Announce { selector: Selector, route: RouteSpec },
    Withdraw { selector: Selector, route: RouteSpec },
    Show { selector: Option<Selector>, what: String },
    Neighbor { selector: Selector, action: String },
    Teardown { selector: Selector, reason: String },
    FlushAdjRibOut { selector: Selector },
    Shutdown,
    Reload,
    Restart,
    Version,
    Help,
}

/// Parses one line of input per spec section 4.6. Grammar, informally:
/// `<verb> [selector] <verb-specific args...>`.
pub fn parse_command(line: &str) -> Result<Command, ApiError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or_else(|| ApiError::ParseError("empty command".into()))?;
    match verb {
        "version" => Ok(Command::Version),
        "help" => Ok(Command::Help),
        "shutdown" => Ok(Command::Shutdown),
        "reload" => Ok(Command::Reload),
        "restart" => Ok(Command::Restart),
        "show" => {
            let rest: Vec<&str> = tokens.collect();
            Ok(Command::Show { selector: None, what: rest.join(" ") })
        }
        "flush" => {
            let adj = tokens.next();
            let rib_out = tokens.next();
            if adj != Some("adj-rib-out") && rib_out.is_some() {
                // legacy two-word spelling tolerated either way
            }
            Ok(Command::FlushAdjRibOut { selector: Selector::All })
        }
        "neighbor" => {
            let selector_token = tokens.next().ok_or_else(|| ApiError::ParseError("neighbor: missing selector".into()))?;
            let selector = Selector::parse(selector_token)?;
            let rest: Vec<&str> = tokens.collect();
            if rest.first() == Some(&"announce") {
                let route = parse_route_spec(&rest[1..])?;
                return Ok(Command::Announce { selector, route });
            }
            if rest.first() == Some(&"withdraw") {
                let route = parse_route_spec(&rest[1..])?;
                return Ok(Command::Withdraw { selector, route });
            }
            if rest.first() == Some(&"teardown") {
                return Ok(Command::Teardown { selector, reason: rest[1..].join(" ") });
            }
            Ok(Command::Neighbor { selector, action: rest.join(" ") })
        }
        "announce" => {
            let rest: Vec<&str> = tokens.collect();
            let route = parse_route_spec(&rest)?;
            Ok(Command::Announce { selector: Selector::All, route })
        }
        "withdraw" => {
            let rest: Vec<&str> = tokens.collect();
            let route = parse_route_spec(&rest)?;
            Ok(Command::Withdraw { selector: Selector::All, route })
        }
        "teardown" => {
            let rest: Vec<&str> = tokens.collect();
            Ok(Command::Teardown { selector: Selector::All, reason: rest.join(" ") })
        }
        other => Err(ApiError::UnknownCommand(other.to_string())),
    }
}

/// Parses `route <prefix> [next-hop <ip>] [local-preference <n>] [med <n>] [community [a:b ...]]`
/// (spec section 4.6 scenario B).
fn parse_route_spec(tokens: &[&str]) -> Result<RouteSpec, ApiError> {
    if tokens.first() != Some(&"route") {
        return Err(ApiError::ParseError("expected 'route <prefix> ...'".into()));
    }
    let prefix_token = tokens.get(1).ok_or_else(|| ApiError::ParseError("missing prefix".into()))?;
    let prefix = Prefix::from_str(prefix_token).map_err(|error| ApiError::ParseError(error.to_string()))?;
    let mut route = RouteSpec { prefix, next_hop: None, local_pref: None, med: None, communities: Vec::new() };
    let mut index = 2;
    while index < tokens.len() {
        match tokens[index] {
            "next-hop" => {
                let value = tokens.get(index + 1).ok_or_else(|| ApiError::ParseError("next-hop: missing value".into()))?;
                route.next_hop =
                    Some(IpAddr::from_str(value).map_err(|error| ApiError::ParseError(error.to_string()))?);
                index += 2;
            }
            "local-preference" => {
                let value = tokens.get(index + 1).ok_or_else(|| ApiError::ParseError("local-preference: missing value".into()))?;
                route.local_pref =
                    Some(value.parse().map_err(|_| ApiError::ParseError("bad local-preference".into()))?);
                index += 2;
            }
            "med" => {
                let value = tokens.get(index + 1).ok_or_else(|| ApiError::ParseError("med: missing value".into()))?;
                route.med = Some(value.parse().map_err(|_| ApiError::ParseError("bad med".into()))?);
                index += 2;
            }
            "community" => {
                let value = tokens.get(index + 1).ok_or_else(|| ApiError::ParseError("community: missing value".into()))?;
                route.communities = parse_community_list(value)?;
                index += 2;
            }
            other => return Err(ApiError::ParseError(format!("unexpected token '{other}'"))),
        }
    }
    Ok(route)
}

/// `[65001:1,65001:2]` or a single `65001:1`.
fn parse_community_list(token: &str) -> Result<Vec<Community>, ApiError> {
    let inner = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')).unwrap_or(token);
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_community)
        .collect()
}

fn parse_community(token: &str) -> Result<Community, ApiError> {
    let (global, local) =
        token.split_once(':').ok_or_else(|| ApiError::ParseError(format!("bad community '{token}'")))?;
    let global_administrator: u16 = global.parse().map_err(|_| ApiError::ParseError(format!("bad community '{token}'")))?;
    let local_administrator: u16 = local.parse().map_err(|_| ApiError::ParseError(format!("bad community '{token}'")))?;
    Ok(Community { global_administrator, local_administrator })
}

/// Builds the attribute set for a freshly announced route (spec section 8 scenario B): ORIGIN
/// is always IGP, AS_PATH is empty on iBGP and `[local_asn]` on eBGP, NEXT_HOP/LOCAL_PREF/MED
/// and COMMUNITIES follow whatever the operator supplied.
pub fn attributes_for(route: &RouteSpec, local_asn: Asn, is_ebgp: bool) -> Vec<PathAttribute> {
    let mut attributes = vec![PathAttribute::Origin(Origin::Igp)];
    let as_path = if is_ebgp {
        AsPath(vec![bgpd_wire::path_attr::AsPathSegment::Sequence(vec![local_asn.0])])
    } else {
        AsPath::default()
    };
    attributes.push(PathAttribute::AsPath(as_path));
    if let IpAddr::V4(next_hop) = route.next_hop.unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)) {
        if route.prefix.address.is_ipv4() {
            attributes.push(PathAttribute::NextHop(NextHop(next_hop)));
        }
    }
    if let Some(local_pref) = route.local_pref {
        attributes.push(PathAttribute::LocalPref(local_pref));
    }
    if let Some(med) = route.med {
        attributes.push(PathAttribute::MultiExitDisc(med));
    }
    if !route.communities.is_empty() {
        attributes.push(PathAttribute::Community(route.communities.clone()));
    }
    attributes
}

/// JSON events fanned out to every connected API session (spec section 4.6 "Subscriber
/// events"). Subscription is implicit: every session receives every category.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "kebab-case")]
pub enum Event {
    ReceiveUpdate { neighbor: IpAddr, withdrawn: usize, announced: usize, treat_as_withdraw: bool },
    SendUpdate { neighbor: IpAddr, withdrawn: usize, announced: usize },
    State { neighbor: IpAddr, state: String },
    Notification { neighbor: IpAddr, code: u8, subcode: u8 },
}

impl Event {
    pub fn from_outcome(peer: IpAddr, outcome: &PeerOutcome) -> Option<Self> {
        match outcome {
            PeerOutcome::StateChanged { to, .. } => {
                Some(Event::State { neighbor: peer, state: format!("{to:?}").to_lowercase() })
            }
            PeerOutcome::Received(ReceivedUpdate { update, treat_as_withdraw, .. }) => {
                Some(Event::ReceiveUpdate {
                    neighbor: peer,
                    withdrawn: update.withdrawn_routes.len(),
                    announced: update.nlri.len(),
                    treat_as_withdraw: *treat_as_withdraw,
                })
            }
            PeerOutcome::NotificationReceived(notification) | PeerOutcome::NotificationSent(notification) => {
                Some(Event::Notification { neighbor: peer, code: notification.error_code, subcode: notification.error_subcode })
            }
        }
    }
}

/// Which transport (and, for the socket transport, which session) a [`Callback`]'s synchronous
/// reply goes back to (SPEC_FULL section 4.6: the reactor drives both transports through the
/// same [`ApiSession`] trait without otherwise distinguishing them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    Socket(usize),
    Pipe,
}

/// One scheduled unit of work produced by a parsed [`Command`] (spec section 4.5 step 3 "run
/// scheduled callbacks"): the reactor mutates the relevant peers' RIBs, then replies on the
/// originating session.
pub struct Callback {
    pub command: Command,
    pub reply_to: ReplyTarget,
}

/// Narrow surface the reactor drives without caring which concrete transport it is talking to
/// (SPEC_FULL section 4.6). [`ApiTransport`] (Unix domain socket) and `PipeTransport` (named
/// pipes) both implement this.
pub trait ApiSession {
    /// Accepts any pending connections and reads any pending command lines without blocking
    /// (spec section 4.5 step 2).
    fn poll(&mut self, callbacks: &mut Vec<Callback>);
    /// Queues a synchronous reply for the session/transport `target` names; a no-op if this
    /// transport does not own that target.
    fn reply(&mut self, target: ReplyTarget, line: String);
    /// Fans a subscriber event out to every session this transport owns.
    fn broadcast_event(&mut self, event: &Event);
    /// Flushes every pending write without blocking (spec section 4.5 step 4).
    fn flush(&mut self);
}

/// Directory search order for the Unix socket transport (spec section 6 "API transport
/// files"), stopping at the first directory that exists and is writable. Tests exercise
/// `ApiTransport` directly against a temp directory instead of this search.
pub fn socket_search_dirs(uid: u32) -> Vec<PathBuf> {
    vec![
        PathBuf::from("/run/bgpd"),
        PathBuf::from(format!("/run/{uid}")),
        PathBuf::from("/run"),
        PathBuf::from("/var/run/bgpd"),
        PathBuf::from(format!("/var/run/{uid}")),
        PathBuf::from("/var/run"),
    ]
}

struct Session {
    id: usize,
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    line_buffer: String,
    outbox: VecDeque<String>,
}

/// Unix-domain-socket API transport (spec section 4.6, default transport). Each accepted
/// connection becomes one [`Session`]; commands are decoded and queued as [`Callback`]s for
/// the reactor to run, and replies/events are queued back out per-session.
pub struct ApiTransport {
    listener: UnixListener,
    sessions: Vec<Session>,
    next_session_id: usize,
}

impl ApiTransport {
    pub async fn bind(path: &Path) -> Result<Self, ApiError> {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let _ = tokio::fs::remove_file(path).await;
        let listener = UnixListener::bind(path)?;
        Ok(Self { listener, sessions: Vec::new(), next_session_id: 0 })
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept().now_or_never() {
                Some(Ok((stream, _))) => {
                    if self.sessions.len() >= MAX_SESSIONS {
                        warn!("API session limit reached ({MAX_SESSIONS}), rejecting new connection");
                        drop(stream);
                        continue;
                    }
                    let (read_half, write_half) = UnixStream::into_split(stream);
                    let id = self.next_session_id;
                    self.next_session_id += 1;
                    self.sessions.push(Session {
                        id,
                        reader: BufReader::new(read_half),
                        writer: write_half,
                        line_buffer: String::new(),
                        outbox: VecDeque::new(),
                    });
                    debug!("API session {id} connected");
                }
                Some(Err(error)) => {
                    warn!("API accept failed: {error}");
                    break;
                }
                None => break,
            }
        }
    }

    fn read_pending(&mut self, callbacks: &mut Vec<Callback>) {
        for session in &mut self.sessions {
            loop {
                session.line_buffer.clear();
                match session.reader.read_line(&mut session.line_buffer).now_or_never() {
                    Some(Ok(0)) | None => break,
                    Some(Ok(_)) => {
                        let line = session.line_buffer.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_command(line) {
                            Ok(command) => {
                                callbacks.push(Callback { command, reply_to: ReplyTarget::Socket(session.id) })
                            }
                            Err(error) => session.outbox.push_back(format!("error {error}")),
                        }
                    }
                    Some(Err(error)) => {
                        warn!("API session {} read error: {error}", session.id);
                        break;
                    }
                }
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl ApiSession for ApiTransport {
    fn poll(&mut self, callbacks: &mut Vec<Callback>) {
        self.accept_pending();
        self.read_pending(callbacks);
    }

    fn reply(&mut self, target: ReplyTarget, line: String) {
        let ReplyTarget::Socket(session_id) = target else { return };
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) {
            session.outbox.push_back(line);
        }
    }

    fn broadcast_event(&mut self, event: &Event) {
        if let Ok(json) = serde_json::to_string(event) {
            for session in &mut self.sessions {
                session.outbox.push_back(json.clone());
            }
        }
    }

    /// Flushes every session's outbox without blocking (spec section 4.5 step 4). Newline-
    /// terminated per spec section 4.6 "Framing".
    fn flush(&mut self) {
        self.sessions.retain_mut(|session| {
            while let Some(line) = session.outbox.pop_front() {
                let mut framed = line.into_bytes();
                framed.push(b'\n');
                if session.writer.write_all(&framed).now_or_never().and_then(Result::ok).is_none() {
                    debug!("API session {} disconnected", session.id);
                    return false;
                }
            }
            true
        });
    }
}

/// Used so `poll`/`flush` can attempt a non-blocking step on a future without spawning a task
/// or requiring the caller to `.await` (spec section 4.5: the reactor is single-threaded and
/// cooperative; nothing here may suspend the whole iteration on one session's I/O). A future
/// that returns `Pending` here is simply retried on the next reactor iteration, so the waker
/// backing this poll never needs to schedule anything.
pub(crate) trait NowOrNever: std::future::Future + Sized {
    fn now_or_never(self) -> Option<Self::Output>;
}

impl<F: std::future::Future + Sized> NowOrNever for F {
    fn now_or_never(self) -> Option<Self::Output> {
        let mut future = Box::pin(self);
        let waker = noop_waker();
        let mut cx = std::task::Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(value) => Some(value),
            std::task::Poll::Pending => None,
        }
    }
}

fn noop_waker() -> std::task::Waker {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> std::task::RawWaker {
        raw_waker()
    }
    fn raw_waker() -> std::task::RawWaker {
        static VTABLE: std::task::RawWakerVTable =
            std::task::RawWakerVTable::new(clone, no_op, no_op, no_op);
        std::task::RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { std::task::Waker::from_raw(raw_waker()) }
}

/// Resolves a neighbor selector against the configured set (spec section 4.6 "selector").
pub fn matching_neighbors<'a>(config: &'a Config, selector: &Selector) -> Vec<&'a IpAddr> {
    config
        .neighbors
        .iter()
        .map(|neighbor| &neighbor.peer_address)
        .filter(|address| selector.matches(**address))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_announce_with_community() {
        let command =
            parse_command("announce route 192.0.2.0/24 next-hop 10.0.0.1 community [65001:1]").unwrap();
        match command {
            Command::Announce { route, .. } => {
                assert_eq!(route.prefix, Prefix::from_str("192.0.2.0/24").unwrap());
                assert_eq!(route.communities, vec![Community { global_administrator: 65001, local_administrator: 1 }]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_neighbor_scoped_withdraw() {
        let command = parse_command("neighbor 10.0.0.2 withdraw route 192.0.2.0/24").unwrap();
        match command {
            Command::Withdraw { selector: Selector::One(address), .. } => {
                assert_eq!(address, IpAddr::from_str("10.0.0.2").unwrap());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(matches!(parse_command("frobnicate"), Err(ApiError::UnknownCommand(_))));
    }

    #[test]
    fn selector_bracket_list_parses_every_address() {
        let selector = Selector::parse("[10.0.0.1, 10.0.0.2]").unwrap();
        let Selector::Many(addresses) = selector else { panic!("expected Many") };
        assert_eq!(addresses.len(), 2);
    }
}
