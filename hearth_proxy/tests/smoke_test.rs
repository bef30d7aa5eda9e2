// Integration smoke test for the proxy lifecycle.
//
// Starts a proxy against a bare-bones upstream that only answers status
// probes, checks that it waits for the upstream before listening, answers a
// status query through the listener, turns away a login when the whitelist
// is on, and shuts down cleanly. Full join/relay scenarios live in the
// `proxy_tests` crate.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hearth_protocol::packet::{Login, Packet, StatusRequest, StatusResponse};
use hearth_protocol::types::IdentityData;
use hearth_proxy::conn::Conn;
use hearth_proxy::notify::MemoryNotifier;
use hearth_proxy::server::REASON_NOT_WHITELISTED;
use hearth_proxy::{Config, Proxy, Services};

/// Answer every connection's `StatusRequest`; ignore anything else.
fn status_only_upstream(listener: TcpListener) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || {
                let conn = Conn::new(stream).unwrap();
                if let Ok(Packet::StatusRequest(_)) = conn.read_packet() {
                    let _ = conn.write_packet(&Packet::from(StatusResponse {
                        server_name: "Smoke".into(),
                        motd: String::new(),
                        player_count: 1,
                        max_players: 10,
                    }));
                }
            });
        }
    });
}

#[test]
fn proxy_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    // Reserve the upstream address but start answering only later.
    let upstream = TcpListener::bind("127.0.0.1:0").unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    drop(upstream);

    let mut config = Config::default();
    config.connection.proxy_address = "127.0.0.1:0".into();
    config.connection.remote_address = upstream_addr.to_string();
    config.server.probe_backoff_secs = 1;
    config.server.probe_timeout_ms = 200;
    config.storage.allowlist_path = dir.path().join("allowlist.json");
    config.storage.playerlist_path = dir.path().join("playerlist.json");

    let notifier = Arc::new(MemoryNotifier::default());
    let services = Services::with_notifier(&config, notifier).unwrap();
    let handle = Proxy::new(config, services).spawn().unwrap();

    // Upstream down: no listener yet.
    assert!(handle.wait_listening(Duration::from_millis(300)).is_none());

    status_only_upstream(TcpListener::bind(upstream_addr).unwrap());
    let addr = handle
        .wait_listening(Duration::from_secs(5))
        .expect("proxy never started listening");

    // Status queries are answered from the upstream.
    let conn = Conn::connect(addr, Duration::from_secs(2)).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    conn.write_packet(&Packet::from(StatusRequest {})).unwrap();
    match conn.read_packet().unwrap() {
        Packet::StatusResponse(status) => {
            assert_eq!(status.server_name, "Smoke");
            assert_eq!(status.player_count, 1);
        }
        other => panic!("expected StatusResponse, got {other:?}"),
    }

    // Whitelist is on by default and the allow-list is empty.
    let conn = Conn::connect(addr, Duration::from_secs(2)).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    conn.write_packet(&Packet::from(Login {
        protocol_version: 1,
        identity: IdentityData {
            xuid: "1".into(),
            display_name: "Steve".into(),
            ..IdentityData::default()
        },
        ..Login::default()
    }))
    .unwrap();
    match conn.read_packet().unwrap() {
        Packet::Disconnect(d) => assert_eq!(d.message, REASON_NOT_WHITELISTED),
        other => panic!("expected Disconnect, got {other:?}"),
    }

    handle.stop().unwrap();
    // The allow-list file was created on startup.
    assert!(dir.path().join("allowlist.json").exists());
}
