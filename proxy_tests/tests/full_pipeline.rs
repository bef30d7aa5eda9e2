// End-to-end tests for the proxy pipeline.
//
// Each test starts a fake upstream and a real proxy on random ports, then
// drives a fake game client through: status query / login → admission →
// upstream dial → two-sided handshake → relay through the handler chain →
// teardown.

use hearth_commands::COMMANDS_TRIGGER_PREFIX;
use hearth_protocol::AvailableCommands;
use hearth_protocol::packet::{CommandRequest, Packet, RequestChunkRadius, StatusRequest, Text};
use hearth_protocol::types::{GameData, TextType, Vec3};
use hearth_proxy::notify::Notification;
use hearth_proxy::obfuscate::reveal;
use hearth_proxy::server::{REASON_NOT_WHITELISTED, REASON_SHUTTING_DOWN};
use hearth_proxy::session::REASON_REPLACED;
use proxy_tests::{FakeUpstream, TestClient, TestProxy, read_until, wait_for};
use serde_json::json;

fn game_data() -> GameData {
    GameData {
        entity_runtime_id: 11,
        world_name: "fake world".into(),
        world_seed: 1234,
        client_side_generation: true,
        player_position: Vec3::new(0.5, 70.0, 0.5),
        ..GameData::default()
    }
}

fn chat(source: &str, message: &str) -> Text {
    Text {
        text_type: TextType::Chat,
        source_name: source.into(),
        ..Text::raw(message)
    }
}

#[test]
fn join_relay_and_notifications() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start(&upstream);
    let client = TestClient::login(proxy.addr, "Steve", "1001");

    let player = upstream.next_player();
    assert_eq!(player.login.identity.xuid, "1001");
    player.spawn();
    let presented = client.spawn();
    assert_eq!(presented.world_seed, 0);
    assert!(!presented.client_side_generation);
    assert_eq!(presented.world_name, "fake world");
    wait_for("session registration", || proxy.handle.session_count() == 1);

    // Client to server, with the chat mirrored.
    client.send(chat("Steve", "hello"));
    let relayed = read_until(&player.conn, "chat", |p| match p {
        Packet::Text(text) => Some(text.message),
        _ => None,
    });
    assert_eq!(relayed, "hello");

    // Server to client.
    player.send(Text::raw("welcome back"));
    let received = read_until(&client.conn, "server text", |p| match p {
        Packet::Text(text) => Some(text.message),
        _ => None,
    });
    assert_eq!(received, "welcome back");

    // Chunk radius requests are clamped to the view distance.
    client.send(RequestChunkRadius { radius: 64 });
    let radius = read_until(&player.conn, "radius request", |p| match p {
        Packet::RequestChunkRadius(req) => Some(req.radius),
        _ => None,
    });
    assert_eq!(radius, 10);

    let events = proxy.notifier.events();
    assert!(events.contains(&Notification::PlayerDetails {
        xuid: "1001".into(),
        name: "Steve".into(),
        ip: "127.0.0.1".into(),
    }));
    assert!(events.contains(&Notification::ChatMirror {
        player: "Steve".into(),
        xuid: "1001".into(),
        message: "hello".into(),
    }));

    proxy.handle.stop().unwrap();
}

#[test]
fn custom_commands_are_merged_and_trigger_hidden() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start(&upstream);
    let (client, player) = proxy.join(&upstream, "Alex", "2002");

    let native = AvailableCommands {
        enum_values: vec!["survival".into(), "creative".into()],
        ..AvailableCommands::default()
    };
    player.send(native.clone());
    let schema = json!({"warp": {"name": "warp", "type": "literal", "children": [
        {"name": "location", "type": "string", "children": []}
    ]}});
    let trigger = json!({"rawtext": [{"text": format!("{COMMANDS_TRIGGER_PREFIX}{schema}")}]});
    player.send(Text {
        text_type: TextType::Object,
        ..Text::raw(trigger.to_string())
    });
    player.send(Text::raw("marker"));

    let mut tables = Vec::new();
    read_until(&client.conn, "marker", |p| match p {
        Packet::AvailableCommands(table) => {
            tables.push(table);
            None
        }
        Packet::Text(text) => {
            assert!(
                !text.message.contains(COMMANDS_TRIGGER_PREFIX),
                "trigger leaked to the client"
            );
            (text.message == "marker").then_some(())
        }
        _ => None,
    });

    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0], native);
    let merged = &tables[1];
    assert!(merged.command("warp").is_some());
    // Native values keep their indices.
    assert_eq!(&merged.enum_values[..2], &native.enum_values[..]);

    proxy.handle.stop().unwrap();
}

#[test]
fn xuid_is_announced_to_addon() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start_with(&upstream, |config| {
        config.commands.addon_secret = "hunter2".into();
    });
    let (_client, player) = proxy.join(&upstream, "Steve", "3003");

    let command = read_until(&player.conn, "xuid announcement", |p| match p {
        Packet::CommandRequest(CommandRequest { command_line, .. }) => Some(command_line),
        _ => None,
    });
    let token = command
        .strip_prefix("/scriptevent proxy:xuid ")
        .expect("unexpected command");
    assert_eq!(reveal(token, "hunter2").unwrap(), "3003");

    proxy.handle.stop().unwrap();
}

#[test]
fn status_query_is_answered_from_upstream() {
    let upstream = FakeUpstream::start(game_data());
    upstream.set_player_count(3, 20);
    let proxy = TestProxy::start(&upstream);

    let client = TestClient::connect(proxy.addr);
    client.send(StatusRequest {});
    let status = read_until(&client.conn, "status", |p| match p {
        Packet::StatusResponse(status) => Some(status),
        _ => None,
    });
    assert_eq!(status.server_name, "Fake");
    assert_eq!(status.player_count, 3);

    proxy.handle.stop().unwrap();
}

#[test]
fn whitelist_rejects_unknown_players() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start_with(&upstream, |config| config.server.whitelist = true);

    let client = TestClient::login(proxy.addr, "Stranger", "4004");
    assert_eq!(client.expect_disconnect(), REASON_NOT_WHITELISTED);

    proxy.handle.stop().unwrap();
}

#[test]
fn reserved_slots_turn_players_away() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start(&upstream);
    // 16 of 20 with 5 secured slots: only allow-listed players may join.
    upstream.set_player_count(16, 20);

    let client = TestClient::login(proxy.addr, "Latecomer", "5005");
    let reason = client.expect_disconnect();
    assert!(reason.contains("reserved for our staff"), "{reason}");
    assert!(reason.ends_with("(16/20)"), "{reason}");

    proxy.handle.stop().unwrap();
}

#[test]
fn second_login_replaces_first_session() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start(&upstream);
    let (first, _first_player) = proxy.join(&upstream, "Steve", "6006");
    wait_for("first session", || proxy.handle.session_count() == 1);

    let (_second, second_player) = proxy.join(&upstream, "Steve", "6006");
    assert_eq!(first.expect_disconnect(), REASON_REPLACED);

    // The new session still relays.
    second_player.send(Text::raw("still here"));
    wait_for("single session", || proxy.handle.session_count() == 1);

    proxy.handle.stop().unwrap();
}

#[test]
fn shutdown_closes_sessions() {
    let upstream = FakeUpstream::start(game_data());
    let proxy = TestProxy::start(&upstream);
    let (client, _player) = proxy.join(&upstream, "Steve", "7007");
    wait_for("session", || proxy.handle.session_count() == 1);

    proxy.handle.stop().unwrap();

    // The player is told why, then the connection ends.
    assert_eq!(client.expect_disconnect(), REASON_SHUTTING_DOWN);
    let err = client.conn.read_packet().unwrap_err();
    assert!(err.is_disconnect(), "unexpected error: {err}");
}
