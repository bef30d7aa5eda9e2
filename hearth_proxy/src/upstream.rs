// Connections out to the upstream server.
//
// - `probe_status` is the liveness check: connect, send `StatusRequest`,
//   expect `StatusResponse`, close. The listener is only bound while it
//   succeeds, and admission reads player counts from it.
// - `dial` opens the session's server-facing connection: connect with
//   bounded retries, send the player's `Login`, and wait for `StartGame`
//   (or a `Disconnect`, which becomes `ConnError::Disconnected`).
//
// Both block the calling thread for at most their timeouts; neither spawns.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use hearth_protocol::packet::{Login, Packet, StatusRequest, StatusResponse};
use hearth_protocol::types::GameData;
use tracing::{debug, warn};

use crate::conn::{Conn, ConnError};

/// Resolve a `host:port` string to the first socket address.
pub fn resolve(addr: &str) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{addr} did not resolve to an address"),
        )
    })
}

pub fn probe_status(addr: &str, timeout: Duration) -> Result<StatusResponse, ConnError> {
    let conn = Conn::connect(resolve(addr)?, timeout)?;
    conn.set_read_timeout(Some(timeout))?;
    conn.write_packet(&Packet::from(StatusRequest {}))?;
    let reply = conn.read_packet();
    conn.close();
    match reply? {
        Packet::StatusResponse(status) => Ok(status),
        other => Err(ConnError::Unexpected {
            expected: "StatusResponse",
            got: other.id(),
        }),
    }
}

/// How `dial` reaches the server.
#[derive(Clone, Copy, Debug)]
pub struct DialOptions {
    pub attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

/// Connect and log in. Returns the connection and the game data the server
/// sent in `StartGame`.
pub fn dial(addr: &str, login: Login, options: DialOptions) -> Result<(Conn, GameData), ConnError> {
    let target = resolve(addr)?;
    let conn = connect_with_retry(target, options)?;
    conn.set_read_timeout(Some(options.timeout))?;
    conn.write_packet(&Packet::from(login))?;
    let game_data = match conn.read_packet() {
        Ok(Packet::StartGame(start)) => start.game_data,
        Ok(Packet::Disconnect(d)) => {
            conn.close();
            return Err(ConnError::Disconnected(d.message));
        }
        Ok(other) => {
            conn.close();
            return Err(ConnError::Unexpected {
                expected: "StartGame",
                got: other.id(),
            });
        }
        Err(e) => {
            conn.close();
            return Err(e);
        }
    };
    debug!(server = %target, world = %game_data.world_name, "upstream login accepted");
    Ok((conn, game_data))
}

fn connect_with_retry(target: SocketAddr, options: DialOptions) -> Result<Conn, ConnError> {
    let attempts = options.attempts.max(1);
    let mut attempt = 1;
    loop {
        match Conn::connect(target, options.timeout) {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < attempts => {
                warn!(server = %target, attempt, error = %e, "upstream unavailable, retrying");
                thread::sleep(options.delay);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_protocol::packet::{Disconnect, StartGame};
    use std::net::TcpListener;

    fn options() -> DialOptions {
        DialOptions {
            attempts: 3,
            delay: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        }
    }

    /// Accept one connection, read one packet, answer with `reply`.
    fn one_shot_server(reply: Packet) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let conn = Conn::new(stream).unwrap();
            let _ = conn.read_packet().unwrap();
            conn.write_packet(&reply).unwrap();
        });
        addr.to_string()
    }

    #[test]
    fn probe_reads_status() {
        let addr = one_shot_server(Packet::from(StatusResponse {
            server_name: "Hearth".into(),
            motd: "hi".into(),
            player_count: 3,
            max_players: 20,
        }));
        let status = probe_status(&addr, Duration::from_secs(2)).unwrap();
        assert_eq!(status.player_count, 3);
        assert_eq!(status.max_players, 20);
    }

    #[test]
    fn probe_fails_when_nothing_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(probe_status(&addr, Duration::from_millis(200)).is_err());
    }

    #[test]
    fn dial_returns_game_data() {
        let addr = one_shot_server(Packet::from(StartGame {
            game_data: GameData {
                world_name: "world".into(),
                world_seed: 1234,
                ..GameData::default()
            },
        }));
        let (_conn, game_data) = dial(&addr, Login::default(), options()).unwrap();
        assert_eq!(game_data.world_seed, 1234);
    }

    #[test]
    fn dial_surfaces_server_disconnect() {
        let addr = one_shot_server(Packet::from(Disconnect {
            message: "banned".into(),
            hide_screen: false,
        }));
        match dial(&addr, Login::default(), options()) {
            Err(ConnError::Disconnected(reason)) => assert_eq!(reason, "banned"),
            other => panic!("expected Disconnected, got {:?}", other.map(|(_, g)| g)),
        }
    }
}
