// Two-sided spawn handshake.
//
// After the upstream accepted the login, both peers have to be brought to
// the "spawned" state before relaying starts:
//
// - client side: send `StartGame`, answer `RequestChunkRadius` with a
//   clamped `ChunkRadiusUpdated`, wait for `SetLocalPlayerAsInitialised`;
// - server side: send `RequestChunkRadius`, wait for
//   `PlayStatus(PlayerSpawn)`, send `SetLocalPlayerAsInitialised`.
//
// The two sides run on scoped threads and `run` returns only after both
// finish (join barrier). When one side fails it closes the other so the
// barrier is not held up by a blocked read. Packets that arrive during the
// handshake but are not part of it are kept, in order, and replayed through
// the relay once it starts.

use std::thread;
use std::time::Duration;

use hearth_protocol::packet::{
    ChunkRadiusUpdated, Packet, RequestChunkRadius, SetLocalPlayerAsInitialised, StartGame,
};
use hearth_protocol::types::{GameData, PLAY_STATUS_PLAYER_SPAWN};
use tracing::{debug, error};

use crate::conn::{Conn, ConnError};

pub const REASON_HANDSHAKE_FAILED: &str = "Failed to establish a connection, please try again!";

/// Packets read during the handshake that belong to the relay.
#[derive(Debug, Default)]
pub struct Deferred {
    pub from_client: Vec<Packet>,
    pub from_server: Vec<Packet>,
}

pub fn start_game(client: &Conn, game_data: GameData, view_distance: i32) -> Result<Vec<Packet>, ConnError> {
    client.write_packet(&Packet::from(StartGame { game_data }))?;
    let mut deferred = Vec::new();
    loop {
        match client.read_packet()? {
            Packet::RequestChunkRadius(req) => {
                let radius = req.radius.min(view_distance);
                client.write_packet(&Packet::from(ChunkRadiusUpdated { radius }))?;
            }
            Packet::SetLocalPlayerAsInitialised(_) => return Ok(deferred),
            Packet::Disconnect(d) => return Err(ConnError::Disconnected(d.message)),
            other => deferred.push(other),
        }
    }
}

pub fn spawn(server: &Conn, view_distance: i32, entity_runtime_id: u64) -> Result<Vec<Packet>, ConnError> {
    server.write_packet(&Packet::from(RequestChunkRadius {
        radius: view_distance,
    }))?;
    let mut deferred = Vec::new();
    loop {
        match server.read_packet()? {
            Packet::PlayStatus(status) if status.status == PLAY_STATUS_PLAYER_SPAWN => {
                server.write_packet(&Packet::from(SetLocalPlayerAsInitialised {
                    entity_runtime_id,
                }))?;
                return Ok(deferred);
            }
            Packet::ChunkRadiusUpdated(_) => {}
            Packet::Disconnect(d) => return Err(ConnError::Disconnected(d.message)),
            other => deferred.push(other),
        }
    }
}

/// Run both sides concurrently. On failure both peers are torn down, the
/// client with `REASON_HANDSHAKE_FAILED`, and the first error is returned.
pub fn run(
    client: &Conn,
    server: &Conn,
    game_data: GameData,
    view_distance: i32,
    timeout: Duration,
) -> Result<Deferred, ConnError> {
    client.set_read_timeout(Some(timeout))?;
    server.set_read_timeout(Some(timeout))?;
    let entity_runtime_id = game_data.entity_runtime_id;

    let (client_result, server_result) = thread::scope(|s| {
        let client_side = s.spawn(|| {
            let result = start_game(client, game_data, view_distance);
            if result.is_err() {
                server.close();
            }
            result
        });
        let server_side = s.spawn(|| {
            let result = spawn(server, view_distance, entity_runtime_id);
            if result.is_err() {
                client.disconnect(REASON_HANDSHAKE_FAILED);
            }
            result
        });
        (join(client_side), join(server_side))
    });

    match (client_result, server_result) {
        (Ok(from_client), Ok(from_server)) => {
            client.set_read_timeout(None)?;
            server.set_read_timeout(None)?;
            debug!(
                deferred_client = from_client.len(),
                deferred_server = from_server.len(),
                "handshake complete"
            );
            Ok(Deferred {
                from_client,
                from_server,
            })
        }
        (client_result, server_result) => {
            client.disconnect(REASON_HANDSHAKE_FAILED);
            server.close();
            let errors = [
                ("client", client_result.err()),
                ("server", server_result.err()),
            ];
            let mut first = None;
            for (side, err) in errors {
                let Some(err) = err else { continue };
                if !err.is_disconnect() {
                    error!(side, error = %err, "handshake failed");
                }
                // Prefer the root cause over the Closed it caused on the other side.
                if first.as_ref().is_none_or(|e| matches!(e, ConnError::Closed)) {
                    first = Some(err);
                }
            }
            Err(first.unwrap_or(ConnError::Closed))
        }
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, Result<T, ConnError>>) -> Result<T, ConnError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ConnError::Disconnected("handshake thread panicked".into())))
}
