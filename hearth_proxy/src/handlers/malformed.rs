use hearth_protocol::packet::Packet;
use tracing::error;

use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::session::Session;

/// Logs the client's reports of packets it could not parse.
pub struct MalformedLog;

impl PacketHandler for MalformedLog {
    fn name(&self) -> &'static str {
        "malformed_log"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        if let Packet::PacketViolationWarning(warning) = &packet {
            error!(
                player = session.name(),
                sender = origin.as_str(),
                kind = warning.kind,
                severity = warning.severity,
                packet_id = warning.packet_id,
                context = %warning.context,
                "peer reported a malformed packet"
            );
        }
        Ok(Verdict::Forward(packet))
    }
}
