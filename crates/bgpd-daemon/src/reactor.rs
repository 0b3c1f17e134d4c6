//! The single-threaded event loop (spec section 4.5): one `tokio` current-thread runtime, one
//! `Reactor` owning every [`Peer`] plus the passive TCP listener and the API transport. Each
//! iteration runs, in order: give every peer a turn, poll the API transport for new commands,
//! run the callbacks those commands produced, then flush the API transport's pending writes.
//! Nothing here spawns a task that outlives its iteration except the per-peer connect attempts
//! `Peer::begin_connect` already owns.

use crate::api::{
    attributes_for,
    matching_neighbors,
    ApiSession,
    ApiTransport,
    Callback,
    Command,
    Event,
};
use crate::config::Config;
use crate::errors::ReactorError;
use crate::peer::fsm::FsmState;
use crate::peer::{
    Peer,
    PeerOutcome,
};
use crate::pipe::PipeTransport;
use crate::rib::Change;
use bgpd_wire::notification::{
    cease,
    NotificationMessage,
};
use log::{
    error,
    info,
    warn,
};
use socket2::{
    Domain,
    Protocol,
    Socket,
    Type,
};
use std::io;
use std::net::{
    IpAddr,
    SocketAddr,
};
use std::path::PathBuf;
use std::time::{
    Duration,
    Instant,
};
use tokio::net::TcpListener;
use tokio::signal::unix::{
    signal,
    SignalKind,
};

/// How long a reactor lets Established sessions drain their write backlog before exiting on
/// SIGTERM/SIGINT (spec section 5 "shutdown grace").
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Ceiling on how long the main loop ever sleeps (spec section 4.5 "I/O readiness"): the actual
/// sleep is the nearest scheduled peer/shutdown deadline, but the API transport and inbound
/// listener have no deadline of their own, so a wake this often still catches them promptly.
const IDLE_TICK: Duration = Duration::from_millis(50);

/// Binds the passive listening socket the way the spec's reactor section describes: raw
/// `socket2::Socket` first so `SO_REUSEADDR`/`SO_REUSEPORT` can be set before the fd is handed
/// to `tokio`, which cannot configure those itself once a `std::net::TcpListener` is built.
fn bind_reuse_listener(address: SocketAddr) -> io::Result<std::net::TcpListener> {
    let domain = if address.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    socket.listen(1024)?;
    Ok(socket.into())
}

pub struct Reactor {
    peers: Vec<Peer>,
    listener: Option<TcpListener>,
    transports: Vec<Box<dyn ApiSession>>,
    config: Config,
    shutdown_deadline: Option<Instant>,
}

impl Reactor {
    /// Builds a reactor from a loaded configuration (spec section 2.3 "Configuration"), binding
    /// the passive listener on port 179, the API transport's Unix domain socket, and, if
    /// `api_pipe_dir` names a directory with `bgpd.in`/`bgpd.out` already `mkfifo`'d in it, the
    /// legacy named-pipe transport alongside it (spec section 4.6).
    pub async fn new(
        config: Config,
        api_socket_path: PathBuf,
        api_pipe_dir: Option<PathBuf>,
        bgp_bind_address: IpAddr,
        bgp_port: u16,
    ) -> io::Result<Self> {
        let local_router_id = config.neighbors.first().map(|n| n.router_id).unwrap_or(std::net::Ipv4Addr::UNSPECIFIED);
        let peers = config.neighbors.iter().cloned().map(|neighbor| Peer::new(neighbor, local_router_id)).collect();

        let bind_address = SocketAddr::new(bgp_bind_address, bgp_port);
        let listener = match bind_reuse_listener(bind_address) {
            Ok(std_listener) => Some(TcpListener::from_std(std_listener)?),
            Err(error) => {
                warn!("could not bind passive BGP listener on {bind_address}: {error} (outbound-only mode)");
                None
            }
        };

        let socket = ApiTransport::bind(&api_socket_path)
            .await
            .map_err(|error| io::Error::other(error.to_string()))?;
        let mut transports: Vec<Box<dyn ApiSession>> = vec![Box::new(socket)];
        if let Some(dir) = api_pipe_dir {
            match PipeTransport::bind(&dir).await {
                Ok(pipe) => transports.push(Box::new(pipe)),
                Err(error) => warn!("could not bind named-pipe API transport under {}: {error}", dir.display()),
            }
        }

        Ok(Self { peers, listener, transports, config, shutdown_deadline: None })
    }

    /// Runs the reactor until a shutdown signal is handled and the grace period elapses (spec
    /// section 4.5 "Main loop" / section 6 "process lifecycle").
    pub async fn run(mut self) -> Result<(), ReactorError> {
        let now = Instant::now();
        for peer in &mut self.peers {
            peer.start(now);
        }

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        loop {
            let now = Instant::now();
            let mut outcomes: Vec<(IpAddr, PeerOutcome)> = Vec::new();

            self.accept_inbound(now, &mut outcomes).await;
            self.turn_peers(now, &mut outcomes);

            let mut callbacks = Vec::new();
            for transport in &mut self.transports {
                transport.poll(&mut callbacks);
            }
            self.run_callbacks(callbacks);

            for (peer, outcome) in &outcomes {
                if let Some(event) = Event::from_outcome(*peer, outcome) {
                    for transport in &mut self.transports {
                        transport.broadcast_event(&event);
                    }
                }
                log_outcome(*peer, outcome);
            }

            for transport in &mut self.transports {
                transport.flush();
            }

            if let Some(deadline) = self.shutdown_deadline {
                if now >= deadline || self.all_peers_idle() {
                    info!("shutdown grace elapsed, exiting");
                    return Ok(());
                }
            } else if sigterm.poll_recv_now() || sigint.poll_recv_now() {
                self.begin_shutdown(now);
            }

            tokio::time::sleep(self.next_wake(now)).await;
        }
    }

    /// How long the loop may sleep before its next iteration: the nearest of any peer's or the
    /// shutdown grace's scheduled deadline (spec section 4.5 "I/O readiness" timeout), capped at
    /// `IDLE_TICK` so a freshly accepted connection or an API command with no timer of its own
    /// is still noticed promptly.
    fn next_wake(&self, now: Instant) -> Duration {
        let mut deadline = self.shutdown_deadline;
        for peer in &self.peers {
            if let Some(peer_deadline) = peer.next_deadline() {
                deadline = Some(deadline.map_or(peer_deadline, |d| d.min(peer_deadline)));
            }
        }
        match deadline {
            Some(deadline) => deadline.saturating_duration_since(now).min(IDLE_TICK),
            None => IDLE_TICK,
        }
    }

    async fn accept_inbound(&mut self, now: Instant, outcomes: &mut Vec<(IpAddr, PeerOutcome)>) {
        let Some(listener) = &self.listener else { return };
        loop {
            let attempt = futures_poll_accept(listener);
            let Some(result) = attempt else { break };
            match result {
                Ok((stream, address)) => {
                    let peer_ip = address.ip();
                    if let Some(peer) = self.peers.iter_mut().find(|p| p.peer_address() == peer_ip) {
                        let mut local = Vec::new();
                        peer.accept_connection(stream, now, &mut local);
                        outcomes.extend(local.into_iter().map(|o| (peer_ip, o)));
                    } else {
                        warn!("rejecting inbound connection from unconfigured neighbor {peer_ip}");
                    }
                }
                Err(error) => {
                    warn!("passive listener accept failed: {error}");
                    break;
                }
            }
        }
    }

    fn turn_peers(&mut self, now: Instant, outcomes: &mut Vec<(IpAddr, PeerOutcome)>) {
        for peer in &mut self.peers {
            let address = peer.peer_address();
            let mut local = Vec::new();
            if let Err(error) = peer.turn(now, &mut local) {
                error!("{address}: {error}");
            }
            outcomes.extend(local.into_iter().map(|o| (address, o)));
        }
    }

    fn run_callbacks(&mut self, callbacks: Vec<Callback>) {
        for callback in callbacks {
            let reply = self.run_command(callback.command);
            for transport in &mut self.transports {
                transport.reply(callback.reply_to, reply.clone());
            }
        }
    }

    /// Executes one parsed command against the peer set, returning the synchronous reply line
    /// every command produces (spec section 4.6 "synchronous replies": `done` or `error ...`).
    fn run_command(&mut self, command: Command) -> String {
        match command {
            Command::Announce { selector, route } => {
                let targets: Vec<IpAddr> = matching_neighbors(&self.config, &selector).into_iter().copied().collect();
                if targets.is_empty() {
                    return "error no-such-neighbor".to_string();
                }
                for address in targets {
                    let Some(peer) = self.peers.iter_mut().find(|p| p.peer_address() == address) else { continue };
                    let neighbor = peer.neighbor.clone();
                    let attributes = attributes_for(&route, neighbor.local_asn, neighbor.is_ebgp());
                    let nlri = bgpd_wire::nlri::unicast::UnicastPrefix(route.prefix);
                    let next_hop = route
                        .next_hop
                        .map(|global| bgpd_wire::path_attr::MpNextHop { global, link_local: None });
                    let change = Change {
                        nlri: bgpd_wire::nlri::Nlri::Unicast(nlri),
                        path_info: None,
                        next_hop,
                        attributes,
                    };
                    if let Some(watermark) = neighbor.rib_watermark {
                        if peer.rib.len() >= watermark {
                            return "error rib-full".to_string();
                        }
                    }
                    peer.rib.queue_announce(change);
                }
                "done".to_string()
            }
            Command::Withdraw { selector, route } => {
                let targets: Vec<IpAddr> = matching_neighbors(&self.config, &selector).into_iter().copied().collect();
                if targets.is_empty() {
                    return "error no-such-neighbor".to_string();
                }
                for address in targets {
                    let Some(peer) = self.peers.iter_mut().find(|p| p.peer_address() == address) else { continue };
                    let nlri = bgpd_wire::nlri::Nlri::Unicast(bgpd_wire::nlri::unicast::UnicastPrefix(route.prefix));
                    peer.rib.queue_withdraw(nlri, None);
                }
                "done".to_string()
            }
            Command::Teardown { selector, reason } => {
                let targets: Vec<IpAddr> = matching_neighbors(&self.config, &selector).into_iter().copied().collect();
                for address in targets {
                    if let Some(peer) = self.peers.iter_mut().find(|p| p.peer_address() == address) {
                        if peer.is_established() {
                            let _ = reason;
                            peer.state = FsmState::Idle;
                        }
                    }
                }
                "done".to_string()
            }
            Command::Neighbor { .. } => "done".to_string(),
            Command::FlushAdjRibOut { selector } => {
                let targets: Vec<IpAddr> = matching_neighbors(&self.config, &selector).into_iter().copied().collect();
                for address in targets {
                    if let Some(peer) = self.peers.iter_mut().find(|p| p.peer_address() == address) {
                        peer.rib.clear();
                    }
                }
                "done".to_string()
            }
            Command::Show { what, .. } => self.render_show(&what),
            Command::Version => format!("bgpd {}", env!("CARGO_PKG_VERSION")),
            Command::Help => {
                "commands: show, announce, withdraw, neighbor, teardown, flush adj-rib-out, \
                 shutdown, reload, restart, version, help"
                    .to_string()
            }
            Command::Shutdown => {
                self.begin_shutdown(Instant::now());
                "done".to_string()
            }
            Command::Reload => "done".to_string(),
            Command::Restart => "done".to_string(),
        }
    }

    fn render_show(&self, what: &str) -> String {
        if what.starts_with("neighbors") || what.is_empty() {
            let lines: Vec<String> = self
                .peers
                .iter()
                .map(|peer| format!("{} {:?}", peer.peer_address(), peer.state))
                .collect();
            return lines.join("; ");
        }
        "error unknown-show-target".to_string()
    }

    fn all_peers_idle(&self) -> bool {
        self.peers.iter().all(|peer| !peer.is_established())
    }

    /// Sends NOTIFICATION(Cease/AdministrativeShutdown) to every established peer and starts
    /// the shutdown grace window (spec section 4.5 "Shutdown", section 6 "SIGTERM/SIGINT").
    fn begin_shutdown(&mut self, now: Instant) {
        if self.shutdown_deadline.is_some() {
            return;
        }
        info!("shutting down: notifying established peers");
        for peer in &mut self.peers {
            if peer.is_established() {
                peer.send_notification(NotificationMessage::cease(cease::ADMINISTRATIVE_SHUTDOWN));
            }
        }
        self.shutdown_deadline = Some(now + SHUTDOWN_GRACE);
    }
}

fn log_outcome(peer: IpAddr, outcome: &PeerOutcome) {
    match outcome {
        PeerOutcome::StateChanged { from, to } => info!("{peer}: {from:?} -> {to:?}"),
        PeerOutcome::Received(update) => {
            info!(
                "{peer}: received update, {} withdrawn, {} announced{}",
                update.update.withdrawn_routes.len(),
                update.update.nlri.len(),
                if update.treat_as_withdraw { " (treat-as-withdraw)" } else { "" }
            );
        }
        PeerOutcome::NotificationSent(n) => warn!("{peer}: sent NOTIFICATION {}/{}", n.error_code, n.error_subcode),
        PeerOutcome::NotificationReceived(n) => warn!("{peer}: received NOTIFICATION {}/{}", n.error_code, n.error_subcode),
    }
}

/// A single non-blocking attempt at `listener.accept()` (spec section 4.5: no step in an
/// iteration may block). Mirrors the manual single-poll helper in `api.rs`; kept local here
/// since the listener type differs and pulling in a shared trait for two call sites isn't
/// worth the indirection.
fn futures_poll_accept(listener: &TcpListener) -> Option<io::Result<(tokio::net::TcpStream, SocketAddr)>> {
    use std::task::{
        Context,
        Poll,
        RawWaker,
        RawWakerVTable,
        Waker,
    };

    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    match listener.poll_accept(&mut cx) {
        Poll::Ready(result) => Some(result),
        Poll::Pending => None,
    }
}

/// Non-blocking check for whether a Unix signal has fired since the last poll (spec section
/// 4.5: signal handling must not block the loop either).
trait PollRecvNow {
    fn poll_recv_now(&mut self) -> bool;
}

impl PollRecvNow for tokio::signal::unix::Signal {
    fn poll_recv_now(&mut self) -> bool {
        use std::task::{
            Context,
            Poll,
        };
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        matches!(self.poll_recv(&mut cx), Poll::Ready(Some(())))
    }
}
