// Test-only peers for proxy integration tests.
//
// - `FakeUpstream`: a minimal authoritative server. It answers status
//   probes on its own, replies to every `Login` with `StartGame`, and hands
//   the logged-in connection to the test as an `UpstreamPlayer`.
// - `TestClient`: a game client talking to the proxy.
// - `TestProxy`: a real `Proxy` on a random port, wired to a fake upstream,
//   temp-dir stores, and an in-memory notifier.
//
// Everything here uses the same `Conn` and packet types as the proxy; the
// only test-specific code is the blocking "wait for packet" helpers.

use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hearth_protocol::packet::{
    ChunkRadiusUpdated, Login, Packet, PlayStatus, SetLocalPlayerAsInitialised, StartGame,
    StatusResponse,
};
use hearth_protocol::types::{ClientData, GameData, IdentityData, PLAY_STATUS_PLAYER_SPAWN};
use hearth_proxy::conn::Conn;
use hearth_proxy::notify::MemoryNotifier;
use hearth_proxy::{Config, Proxy, ProxyHandle, Services};
use tempfile::TempDir;

/// Default timeout for blocking waits.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read from `conn` until `pick` accepts a packet, skipping the rest.
pub fn read_until<T>(conn: &Conn, what: &str, mut pick: impl FnMut(Packet) -> Option<T>) -> T {
    conn.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();
    let start = Instant::now();
    loop {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        let packet = conn
            .read_packet()
            .unwrap_or_else(|e| panic!("connection failed waiting for {what}: {e}"));
        if let Some(found) = pick(packet) {
            return found;
        }
    }
}

/// Poll `condition` until it holds or the timeout expires.
pub fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        thread::sleep(POLL_INTERVAL);
    }
}

pub struct FakeUpstream {
    addr: SocketAddr,
    status: Arc<Mutex<StatusResponse>>,
    players: Receiver<UpstreamPlayer>,
}

/// The upstream's side of one logged-in player.
pub struct UpstreamPlayer {
    pub conn: Conn,
    pub login: Login,
}

impl FakeUpstream {
    pub fn start(game_data: GameData) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let status = Arc::new(Mutex::new(StatusResponse {
            server_name: "Fake".into(),
            motd: "integration".into(),
            player_count: 0,
            max_players: 20,
        }));
        let (tx, players) = mpsc::channel();

        let shared_status = status.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let status = shared_status.clone();
                let game_data = game_data.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    let conn = Conn::new(stream).unwrap();
                    conn.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();
                    match conn.read_packet() {
                        Ok(Packet::StatusRequest(_)) => {
                            let reply = status.lock().unwrap().clone();
                            let _ = conn.write_packet(&Packet::from(reply));
                        }
                        Ok(Packet::Login(login)) => {
                            conn.write_packet(&Packet::from(StartGame { game_data })).unwrap();
                            conn.set_read_timeout(None).unwrap();
                            let _ = tx.send(UpstreamPlayer { conn, login });
                        }
                        _ => {}
                    }
                });
            }
        });

        Self { addr, status, players }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_player_count(&self, current: u32, max: u32) {
        let mut status = self.status.lock().unwrap();
        status.player_count = current;
        status.max_players = max;
    }

    /// Wait for the proxy to log a player in.
    pub fn next_player(&self) -> UpstreamPlayer {
        self.players
            .recv_timeout(POLL_TIMEOUT)
            .expect("timed out waiting for an upstream login")
    }
}

impl UpstreamPlayer {
    /// Server side of the spawn handshake.
    pub fn spawn(&self) {
        read_until(&self.conn, "RequestChunkRadius", |p| match p {
            Packet::RequestChunkRadius(req) => Some(req.radius),
            _ => None,
        });
        self.conn
            .write_packet(&Packet::from(ChunkRadiusUpdated { radius: 8 }))
            .unwrap();
        self.conn
            .write_packet(&Packet::from(PlayStatus {
                status: PLAY_STATUS_PLAYER_SPAWN,
            }))
            .unwrap();
        read_until(&self.conn, "SetLocalPlayerAsInitialised", |p| match p {
            Packet::SetLocalPlayerAsInitialised(_) => Some(()),
            _ => None,
        });
    }

    pub fn send(&self, packet: impl Into<Packet>) {
        self.conn.write_packet(&packet.into()).unwrap();
    }
}

pub struct TestClient {
    pub conn: Conn,
}

impl TestClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let conn = Conn::connect(addr, POLL_TIMEOUT).unwrap();
        Self { conn }
    }

    pub fn login(addr: SocketAddr, name: &str, xuid: &str) -> Self {
        let client = Self::connect(addr);
        client.send(Login {
            protocol_version: 1,
            identity: IdentityData {
                xuid: xuid.into(),
                display_name: name.into(),
                identity: format!("uuid-{xuid}"),
                title_id: String::new(),
            },
            client_data: ClientData {
                self_signed_id: format!("ssid-{xuid}"),
                ..ClientData::default()
            },
        });
        client
    }

    /// Client side of the spawn handshake. Returns the game data the proxy
    /// presented.
    pub fn spawn(&self) -> GameData {
        let game_data = read_until(&self.conn, "StartGame", |p| match p {
            Packet::StartGame(start) => Some(start.game_data),
            _ => None,
        });
        self.send(SetLocalPlayerAsInitialised {
            entity_runtime_id: game_data.entity_runtime_id,
        });
        game_data
    }

    pub fn send(&self, packet: impl Into<Packet>) {
        self.conn.write_packet(&packet.into()).unwrap();
    }

    /// Wait for a `Disconnect` and return its message.
    pub fn expect_disconnect(&self) -> String {
        read_until(&self.conn, "Disconnect", |p| match p {
            Packet::Disconnect(d) => Some(d.message),
            _ => None,
        })
    }
}

pub struct TestProxy {
    pub handle: ProxyHandle,
    pub addr: SocketAddr,
    pub notifier: Arc<MemoryNotifier>,
    _dir: TempDir,
}

impl TestProxy {
    /// A proxy config pointing at `upstream` with stores in `dir`.
    pub fn config(upstream: &FakeUpstream, dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.connection.proxy_address = "127.0.0.1:0".into();
        config.connection.remote_address = upstream.addr().to_string();
        config.server.whitelist = false;
        config.server.probe_backoff_secs = 1;
        config.server.dial_attempts = 2;
        config.server.dial_delay_ms = 20;
        config.server.handshake_timeout_secs = 5;
        config.server.disconnect_grace_ms = 10;
        config.storage.allowlist_path = dir.path().join("allowlist.json");
        config.storage.playerlist_path = dir.path().join("playerlist.json");
        config
    }

    pub fn start(upstream: &FakeUpstream) -> Self {
        Self::start_with(upstream, |_| {})
    }

    /// Start with config tweaks applied after the defaults.
    pub fn start_with(upstream: &FakeUpstream, tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Self::config(upstream, &dir);
        tweak(&mut config);
        let notifier = Arc::new(MemoryNotifier::default());
        let services = Services::with_notifier(&config, notifier.clone()).unwrap();
        let handle = Proxy::new(config, services).spawn().unwrap();
        let addr = handle
            .wait_listening(POLL_TIMEOUT)
            .expect("proxy did not start listening");
        Self {
            handle,
            addr,
            notifier,
            _dir: dir,
        }
    }

    /// Log a player in through the whole handshake.
    pub fn join(&self, upstream: &FakeUpstream, name: &str, xuid: &str) -> (TestClient, UpstreamPlayer) {
        let client = TestClient::login(self.addr, name, xuid);
        let player = upstream.next_player();
        player.spawn();
        client.spawn();
        (client, player)
    }
}
