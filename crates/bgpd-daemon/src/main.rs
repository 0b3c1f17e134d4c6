//! Binary entry point. Spec section 1 carves configuration tokenizing, CLI shells, logging
//! sinks and packaging out of scope as external collaborators, but something still has to
//! install a logging sink, obtain a [`Config`], and hand it to a [`Reactor`] — that's all this
//! file does (SPEC_FULL section 1). A future configuration-file tokenizer replaces
//! [`config::configs::sample`] without touching anything below `main`.

mod api;
mod config;
mod errors;
mod peer;
mod pipe;
mod protocol;
mod reactor;
mod rib;

use config::configs;
use log::{
    error,
    info,
    LevelFilter,
};
use reactor::Reactor;
use simple_logger::SimpleLogger;
use std::env;
use std::path::PathBuf;
use std::process::exit;

/// Default BGP listener port (spec section 6 "TCP transport").
const DEFAULT_BGP_PORT: u16 = 179;

/// Parses `BGPD_LOG_LEVEL` (SPEC_FULL section 2.1, spec section 6 `exabgp_log_enable`
/// renamed); unrecognized or absent values fall back to `Info`.
fn log_level_from_env() -> LevelFilter {
    match env::var("BGPD_LOG_LEVEL").ok().as_deref().map(str::to_lowercase).as_deref() {
        Some("trace") => LevelFilter::Trace,
        Some("debug") => LevelFilter::Debug,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        Some("off") => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// `BGPD_TCP_PORT` overrides the passive listener port (spec section 6 `exabgp_tcp_port`,
/// test/dev use).
fn bgp_port_from_env() -> u16 {
    env::var("BGPD_TCP_PORT").ok().and_then(|value| value.parse().ok()).unwrap_or(DEFAULT_BGP_PORT)
}

/// `BGPD_TCP_BIND` overrides the passive listener's bind address (spec section 6
/// `exabgp_tcp_bind`); defaults to the unspecified IPv4 address (listen on every interface).
fn bgp_bind_address_from_env() -> std::net::IpAddr {
    env::var("BGPD_TCP_BIND")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

/// `BGPD_CLI_SOCKET` overrides the API transport's Unix socket directory (spec section 6
/// `exabgp_cli_socket`); otherwise the first writable directory in
/// [`api::socket_search_dirs`] is used.
fn api_socket_path_from_env() -> PathBuf {
    if let Ok(dir) = env::var("BGPD_CLI_SOCKET") {
        return PathBuf::from(dir).join("bgpd.sock");
    }
    let uid = unsafe { libc_getuid() };
    for dir in api::socket_search_dirs(uid) {
        if dir.is_dir() || std::fs::create_dir_all(&dir).is_ok() {
            return dir.join("bgpd.sock");
        }
    }
    PathBuf::from("/tmp/bgpd.sock")
}

/// `BGPD_CLI_PIPE` names the directory holding the legacy `bgpd.in`/`bgpd.out` FIFO pair (spec
/// section 6 `exabgp_cli_pipe` renamed); absent disables the pipe transport entirely.
fn api_pipe_dir_from_env() -> Option<PathBuf> {
    env::var("BGPD_CLI_PIPE").ok().map(PathBuf::from)
}

/// Avoids pulling in the `libc` crate for a single syscall the daemon otherwise has no use for
/// (SPEC_FULL keeps the dependency stack aligned with the teacher's; `libc` was never one of
/// its dependencies). `getuid()` cannot fail.
unsafe fn libc_getuid() -> u32 {
    extern "C" {
        fn getuid() -> u32;
    }
    getuid()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = SimpleLogger::new().with_level(log_level_from_env()).init() {
        println!("unable to initialize logging: {error}");
        exit(2);
    }

    let config = configs::sample();
    if config.neighbors.is_empty() {
        error!("no neighbors configured");
        exit(1);
    }

    let api_socket_path = api_socket_path_from_env();
    let api_pipe_dir = api_pipe_dir_from_env();
    let bgp_bind_address = bgp_bind_address_from_env();
    let bgp_port = bgp_port_from_env();
    info!(
        "starting bgpd: {} neighbor(s), BGP listener {bgp_bind_address}:{bgp_port}, API socket {}{}",
        config.neighbors.len(),
        api_socket_path.display(),
        api_pipe_dir.as_ref().map(|dir| format!(", API pipes under {}", dir.display())).unwrap_or_default()
    );

    let reactor = match Reactor::new(config, api_socket_path, api_pipe_dir, bgp_bind_address, bgp_port).await {
        Ok(reactor) => reactor,
        Err(error) => {
            error!("failed to start reactor: {error}");
            exit(2);
        }
    };

    match reactor.run().await {
        Ok(()) => exit(0),
        Err(error) => {
            error!("reactor exited with a fatal error: {error}");
            exit(2);
        }
    }
}
