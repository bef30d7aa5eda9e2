// Directional relay loops.
//
// Each session runs two loops, one per direction, on their own threads. An
// iteration reads one packet from the source peer, runs it through the
// handler chain, and writes it to the destination peer if it is still
// forwardable. Survivors keep their read order.
//
// A loop ends on cancellation, a read error, a write error, or a
// `Disconnect` from the server (whose message becomes the reason). Every
// exit, including a panic anywhere in the loop or in a handler, ends in
// `Session::disconnect` with the loop's side as initiator. Panics are caught
// at this boundary and reported to the player as a generic internal error.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hearth_protocol::packet::Packet;
use tracing::{debug, error};

use crate::conn::ConnError;
use crate::handler::{HandlerChain, Origin, Verdict};
use crate::session::{
    REASON_CLIENT_CLOSED, REASON_INTERNAL, REASON_SERVER_CLOSED, REASON_SHUTTING_DOWN, Session,
};
use crate::shutdown::CancelToken;

/// Run the loop for packets coming from `origin` until it ends, then tear
/// the session down. `pending` packets are processed before reading.
pub fn relay(
    session: Arc<Session>,
    chain: Arc<HandlerChain>,
    origin: Origin,
    pending: Vec<Packet>,
    cancel: CancelToken,
) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        relay_loop(&session, &chain, origin, pending, &cancel)
    }));
    let reason = match result {
        Ok(reason) => reason,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!(player = session.name(), side = origin.as_str(), panic = %message, "relay loop panicked");
            REASON_INTERNAL.to_string()
        }
    };
    session.disconnect(origin, &reason);
}

fn closed_reason(origin: Origin) -> String {
    match origin {
        Origin::Client => REASON_CLIENT_CLOSED,
        Origin::Server => REASON_SERVER_CLOSED,
    }
    .to_string()
}

/// Returns the disconnect reason.
fn relay_loop(
    session: &Session,
    chain: &HandlerChain,
    origin: Origin,
    pending: Vec<Packet>,
    cancel: &CancelToken,
) -> String {
    let source = session.source(origin);
    let destination = session.destination(origin);
    let mut pending = pending.into_iter();

    loop {
        if cancel.is_cancelled() {
            return REASON_SHUTTING_DOWN.to_string();
        }
        if session.is_disconnecting() {
            return closed_reason(origin);
        }
        let packet = match pending.next() {
            Some(packet) => packet,
            None => match source.read_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    log_conn_error(session, origin, "read", &e);
                    return closed_reason(origin);
                }
            },
        };

        if origin == Origin::Server {
            if let Packet::Disconnect(d) = &packet {
                debug!(player = session.name(), reason = %d.message, "server disconnected player");
                return d.message.clone();
            }
        }

        match chain.dispatch(packet, session, origin) {
            Ok(Verdict::Forward(packet)) => {
                if let Err(e) = destination.write_packet(&packet) {
                    log_conn_error(session, origin, "write", &e);
                    return closed_reason(origin);
                }
            }
            Ok(Verdict::Suppress(packet)) => {
                debug!(player = session.name(), side = origin.as_str(), id = packet.id(), "packet suppressed");
            }
            Err(e) => {
                error!(player = session.name(), side = origin.as_str(), error = %e, "handler failed, packet dropped");
            }
        }
    }
}

fn log_conn_error(session: &Session, origin: Origin, op: &str, err: &ConnError) {
    if err.is_disconnect() || session.is_disconnecting() {
        debug!(player = session.name(), side = origin.as_str(), op, error = %err, "connection ended");
    } else {
        error!(player = session.name(), side = origin.as_str(), op, error = %err, "relay i/o failed");
    }
}
