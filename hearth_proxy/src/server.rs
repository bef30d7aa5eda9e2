// Listener, per-connection setup, and process-level lifecycle.
//
// Architecture: one proxy thread plus threads per player.
//
// - **Proxy thread** (`Proxy::run`): probes the upstream until it answers,
//   binds the listener, then polls a non-blocking `accept()` every 50 ms so
//   it notices cancellation. A transient accept error raises a staff alert,
//   drops the listener, and goes back to probing. Only a failed bind is
//   fatal. The retry is a loop with a cancellable backoff, never recursion.
// - **Connection threads** (one per accepted socket): read the `Login`
//   (or answer a status query), run the allow-list and admission checks,
//   dial the upstream, run the two-sided handshake, register the session,
//   and then supervise the two relay threads (scoped, one per direction)
//   until both have exited. Panics are caught at the thread boundary.
//
// Shutdown (`ShutdownHandle::shutdown`): run cleanup hooks, cancel the shared
// token, then close every registered session's sockets so blocked relay
// reads return. The accept loop sees the token within one poll interval and
// drops the listener.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hearth_commands::{MergeStrategy, PreserveNative};
use hearth_protocol::packet::{CommandRequest, Login, Packet};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::admission::{AllowList, admit};
use crate::claims::{ClaimStore, ClaimsError, HttpClaimSource, spawn_refresher};
use crate::config::Config;
use crate::conn::{Conn, ConnError};
use crate::handler::{HandlerChain, Origin};
use crate::handlers::{HandlerDeps, NativeCommands, build_chain};
use crate::handshake;
use crate::items::ItemRegistry;
use crate::notify::{Notification, Notifier, WebhookNotifier};
use crate::obfuscate::obfuscate;
use crate::playerlist::PlayerList;
use crate::profile::{ProfileCache, ProfileError};
use crate::relay::relay;
pub use crate::session::REASON_SHUTTING_DOWN;
use crate::session::{REASON_INTERNAL, REASON_REPLACED, Session, SessionRegistry};
use crate::shutdown::{CancelToken, CleanupHooks};
use crate::store::StoreError;
use crate::upstream::{self, DialOptions};

pub const REASON_NOT_WHITELISTED: &str = "You are not whitelisted on this server!";
pub const REASON_UPSTREAM_OFFLINE: &str = "Server just went offline, please try again later!";
pub const REASON_NO_XUID: &str = "Failed to get your XUID, please try again!";

const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("failed to build webhook client: {0}")]
    Webhook(#[source] reqwest::Error),
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

/// The collaborators a proxy runs with. Production code builds them with
/// `from_config`; tests and embedders can fill the fields directly.
#[derive(Clone)]
pub struct Services {
    pub notifier: Arc<dyn Notifier>,
    pub allow_list: Arc<AllowList>,
    pub player_list: Arc<PlayerList>,
    pub claims: Arc<ClaimStore>,
    pub items: Arc<ItemRegistry>,
    pub native_commands: Arc<NativeCommands>,
    pub merge: Arc<dyn MergeStrategy>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self, ProxyError> {
        let profiles = Arc::new(ProfileCache::new(config.api.xbox_api_key.clone())?);
        let notifier = WebhookNotifier::new(config, profiles).map_err(ProxyError::Webhook)?;
        Self::with_notifier(config, Arc::new(notifier))
    }

    /// File-backed stores from `config`, events to `notifier`.
    pub fn with_notifier(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self, ProxyError> {
        Ok(Self {
            notifier,
            allow_list: Arc::new(AllowList::load(&config.storage.allowlist_path)?),
            player_list: Arc::new(PlayerList::load(&config.storage.playerlist_path)?),
            claims: Arc::default(),
            items: Arc::default(),
            native_commands: Arc::default(),
            merge: Arc::new(PreserveNative),
        })
    }
}

struct Shared {
    config: Config,
    services: Services,
    chain: Arc<HandlerChain>,
    registry: SessionRegistry,
    cancel: CancelToken,
    cleanup: CleanupHooks,
    listening: Mutex<Option<SocketAddr>>,
    listening_changed: Condvar,
}

pub struct Proxy {
    shared: Arc<Shared>,
}

/// Stops a running proxy from another thread (e.g. a signal watcher).
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    /// Cleanup hooks, then cancellation, then session teardown. Every live
    /// session is disconnected with `REASON_SHUTTING_DOWN`.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.shared.cleanup.run();
        self.shared.cancel.cancel();
        self.shared.registry.close_all(REASON_SHUTTING_DOWN);
    }

    /// Register a callback to run once when shutdown starts.
    pub fn on_cleanup(&self, hook: impl FnOnce() + Send + 'static) {
        self.shared.cleanup.register(hook);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

/// A proxy running on its own thread.
pub struct ProxyHandle {
    shutdown: ShutdownHandle,
    thread: JoinHandle<Result<(), ProxyError>>,
}

impl ProxyHandle {
    /// Wait until the listener is bound and return its address.
    pub fn wait_listening(&self, timeout: Duration) -> Option<SocketAddr> {
        let shared = &self.shutdown.shared;
        let deadline = Instant::now() + timeout;
        let mut listening = shared.listening.lock();
        while listening.is_none() {
            if shared.listening_changed.wait_until(&mut listening, deadline).timed_out() {
                break;
            }
        }
        *listening
    }

    pub fn session_count(&self) -> usize {
        self.shutdown.shared.registry.len()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Shut down and wait for the proxy thread to exit.
    pub fn stop(self) -> Result<(), ProxyError> {
        self.shutdown.shutdown();
        self.thread.join().unwrap_or_else(|_| {
            error!("proxy thread panicked");
            Ok(())
        })
    }
}

impl Proxy {
    pub fn new(config: Config, services: Services) -> Self {
        let deps = HandlerDeps {
            claims: services.claims.clone(),
            items: services.items.clone(),
            native_commands: services.native_commands.clone(),
            merge: services.merge.clone(),
        };
        let chain = Arc::new(build_chain(&config, &deps));
        Self {
            shared: Arc::new(Shared {
                config,
                services,
                chain,
                registry: SessionRegistry::default(),
                cancel: CancelToken::new(),
                cleanup: CleanupHooks::default(),
                listening: Mutex::new(None),
                listening_changed: Condvar::new(),
            }),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run on a background thread.
    pub fn spawn(self) -> Result<ProxyHandle, ProxyError> {
        let shutdown = self.shutdown_handle();
        let thread = thread::Builder::new()
            .name("proxy".into())
            .spawn(move || self.run())
            .map_err(|source| ProxyError::Spawn { what: "proxy", source })?;
        Ok(ProxyHandle { shutdown, thread })
    }

    /// Probe, bind, and accept until shutdown. Returns an error only if the
    /// listener cannot be bound or a background service cannot start.
    pub fn run(&self) -> Result<(), ProxyError> {
        let shared = &self.shared;
        start_claims_refresher(shared)?;
        let remote = shared.config.connection.remote_address.as_str();
        let proxy_address = shared.config.connection.proxy_address.as_str();

        loop {
            if shared.cancel.is_cancelled() {
                return Ok(());
            }
            match upstream::probe_status(remote, shared.config.server.probe_timeout()) {
                Ok(status) => info!(
                    server = %status.server_name,
                    players = status.player_count,
                    max = status.max_players,
                    "upstream is online"
                ),
                Err(e) => {
                    warn!(upstream = remote, error = %e, "upstream unreachable, retrying");
                    if shared.cancel.wait_timeout(shared.config.server.probe_backoff()) {
                        return Ok(());
                    }
                    continue;
                }
            }

            let bind_error = |source| ProxyError::Bind {
                addr: proxy_address.to_string(),
                source,
            };
            let listener = TcpListener::bind(proxy_address).map_err(bind_error)?;
            listener.set_nonblocking(true).map_err(bind_error)?;
            let local = listener.local_addr().map_err(bind_error)?;
            info!(address = %local, upstream = remote, "proxy listening");
            self.set_listening(Some(local));

            let result = self.accept_loop(&listener);
            self.set_listening(None);
            drop(listener);
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "accept failed, restarting listener");
                    shared.services.notifier.notify(Notification::StaffAlert {
                        title: "Proxy Listener Error".into(),
                        description: "The proxy stopped accepting connections and is restarting its listener.".into(),
                        fields: vec![("Error".into(), e.to_string())],
                    });
                }
            }
        }
    }

    fn set_listening(&self, addr: Option<SocketAddr>) {
        *self.shared.listening.lock() = addr;
        self.shared.listening_changed.notify_all();
    }

    /// Returns `Ok` on shutdown and the error on a transient accept failure.
    fn accept_loop(&self, listener: &TcpListener) -> io::Result<()> {
        while !self.shared.cancel.is_cancelled() {
            match listener.accept() {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted) => {
                    debug!(error = %e, "accept interrupted");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("conn-{peer}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| handle_connection(&shared, stream, peer)));
                if result.is_err() {
                    error!(%peer, "connection thread panicked");
                }
            });
        if let Err(e) = spawned {
            error!(%peer, error = %e, "failed to spawn connection thread");
        }
    }
}

fn start_claims_refresher(shared: &Shared) -> Result<(), ProxyError> {
    let db = &shared.config.database;
    if db.host.is_empty() {
        debug!("region database not configured, claims disabled");
        return Ok(());
    }
    let stop = CancelToken::new();
    let source = HttpClaimSource::new(&db.host, &db.name, &db.key)?.with_cancel(stop.clone());
    let refresher = spawn_refresher(
        shared.services.claims.clone(),
        Box::new(source),
        Duration::from_secs(db.refresh_secs),
        stop.clone(),
    )
    .map_err(|source| ProxyError::Spawn {
        what: "claims refresher",
        source,
    })?;
    shared.cleanup.register(move || {
        stop.cancel();
        if refresher.join().is_err() {
            warn!("claims refresher panicked");
        }
    });
    Ok(())
}

/// Everything from the first packet to the end of the session.
fn handle_connection(shared: &Shared, stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.set_nonblocking(false) {
        warn!(%peer, error = %e, "failed to configure accepted socket");
        return;
    }
    let client = match Conn::new(stream) {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            debug!(%peer, error = %e, "connection dropped before login");
            return;
        }
    };
    let config = &shared.config;

    let first = client
        .set_read_timeout(Some(config.server.login_timeout()))
        .and_then(|()| client.read_packet());
    let login = match first {
        Ok(Packet::Login(login)) => login,
        Ok(Packet::StatusRequest(_)) => {
            answer_status(shared, &client);
            return;
        }
        Ok(other) => {
            debug!(%peer, id = other.id(), "expected Login, dropping connection");
            client.close();
            return;
        }
        Err(e) => {
            debug!(%peer, error = %e, "no login received");
            client.close();
            return;
        }
    };

    let Some((session, deferred)) = establish(shared, client, login, peer) else {
        return;
    };
    run_session(shared, session, deferred);
}

/// Reply to a status query with the upstream's live status.
fn answer_status(shared: &Shared, client: &Conn) {
    let config = &shared.config;
    match upstream::probe_status(&config.connection.remote_address, config.server.probe_timeout()) {
        Ok(status) => {
            if let Err(e) = client.write_packet(&Packet::from(status)) {
                debug!(error = %e, "failed to answer status query");
            }
        }
        Err(e) => debug!(error = %e, "status query while upstream unreachable"),
    }
    client.close();
}

/// Admission, dial, and handshake. On failure the client has been told why
/// and both connections are closed.
fn establish(
    shared: &Shared,
    client: Arc<Conn>,
    login: Login,
    peer: SocketAddr,
) -> Option<(Arc<Session>, handshake::Deferred)> {
    let config = &shared.config;
    let services = &shared.services;
    let name = login.identity.display_name.clone();
    let xuid = login.identity.xuid.clone();

    let allow_listed = services.allow_list.contains(&name, &xuid);
    if config.server.whitelist && !allow_listed {
        info!(player = %name, %xuid, "rejected: not whitelisted");
        client.disconnect(REASON_NOT_WHITELISTED);
        return None;
    }

    let status = match upstream::probe_status(&config.connection.remote_address, config.server.probe_timeout()) {
        Ok(status) => status,
        Err(e) => {
            warn!(player = %name, error = %e, "upstream unreachable during login");
            client.disconnect(REASON_UPSTREAM_OFFLINE);
            return None;
        }
    };
    if let Err(reason) = admit(&status, config.server.secured_slots, allow_listed, &name) {
        info!(player = %name, %reason, "rejected by admission");
        client.disconnect(&reason);
        return None;
    }

    let (identity, client_data) = match services.player_list.remember(&login.identity, &login.client_data) {
        Ok(presented) => presented,
        Err(e) => {
            warn!(player = %name, error = %e, "failed to update playerlist");
            (login.identity.clone(), login.client_data.clone())
        }
    };
    let upstream_login = Login {
        protocol_version: login.protocol_version,
        identity,
        client_data,
    };
    let options = DialOptions {
        attempts: config.server.dial_attempts,
        delay: config.server.dial_delay(),
        timeout: config.server.handshake_timeout(),
    };
    let (server, mut game_data) = match upstream::dial(&config.connection.remote_address, upstream_login, options) {
        Ok(dialed) => dialed,
        Err(ConnError::Disconnected(reason)) => {
            info!(player = %name, %reason, "upstream refused login");
            client.disconnect(&reason);
            return None;
        }
        Err(e) => {
            error!(player = %name, error = %e, "failed to dial upstream");
            client.disconnect(REASON_UPSTREAM_OFFLINE);
            return None;
        }
    };
    let server = Arc::new(server);

    services.items.populate(&game_data.items);
    game_data.world_seed = 0;
    game_data.client_side_generation = false;
    let (dimension, position) = (game_data.dimension, game_data.player_position);

    let deferred = match handshake::run(
        &client,
        &server,
        game_data,
        config.server.view_distance,
        config.server.handshake_timeout(),
    ) {
        Ok(deferred) => deferred,
        Err(e) => {
            debug!(player = %name, error = %e, "handshake did not complete");
            return None;
        }
    };

    if xuid.is_empty() {
        warn!(player = %name, "login carried no xuid");
        client.disconnect(REASON_NO_XUID);
        server.close();
        return None;
    }

    let session = Arc::new(Session::new(
        login.identity,
        client,
        server,
        services.notifier.clone(),
        config.server.disconnect_grace(),
    ));
    {
        let mut data = session.data();
        data.dimension = dimension;
        data.position = position;
    }
    if let Some(previous) = shared.registry.insert(session.clone()) {
        info!(player = %name, %xuid, "replacing existing session");
        previous.disconnect(Origin::Server, REASON_REPLACED);
    }
    if shared.cancel.is_cancelled() {
        session.disconnect(Origin::Server, REASON_SHUTTING_DOWN);
        shared.registry.remove(&session);
        return None;
    }

    info!(player = %name, %xuid, ip = %peer.ip(), "player joined");
    services.notifier.notify(Notification::PlayerDetails {
        xuid: xuid.clone(),
        name: name.clone(),
        ip: peer.ip().to_string(),
    });
    announce_xuid(config, &session);
    Some((session, deferred))
}

/// Tell the server-side addon which xuid this connection belongs to.
fn announce_xuid(config: &Config, session: &Session) {
    let secret = &config.commands.addon_secret;
    if secret.is_empty() {
        return;
    }
    let request = CommandRequest {
        command_line: format!("/scriptevent proxy:xuid {}", obfuscate(session.xuid(), secret)),
        internal: false,
    };
    if let Err(e) = session.send_to_server(&Packet::from(request)) {
        warn!(player = session.name(), error = %e, "failed to announce xuid");
    }
}

/// Run both relay directions and wait for them to finish.
fn run_session(shared: &Shared, session: Arc<Session>, deferred: handshake::Deferred) {
    thread::scope(|s| {
        for (origin, pending) in [
            (Origin::Client, deferred.from_client),
            (Origin::Server, deferred.from_server),
        ] {
            let worker = session.clone();
            let chain = shared.chain.clone();
            let cancel = shared.cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("relay-{}-{}", origin.as_str(), session.id()))
                .spawn_scoped(s, move || relay(worker, chain, origin, pending, cancel));
            if let Err(e) = spawned {
                error!(player = session.name(), error = %e, "failed to spawn relay thread");
                session.disconnect(origin, REASON_INTERNAL);
            }
        }
    });
    shared.registry.remove(&session);
    info!(player = session.name(), xuid = session.xuid(), "player left");
}
