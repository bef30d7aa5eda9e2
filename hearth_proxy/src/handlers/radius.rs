// Chunk radius clamp. Both the client's request and the server's answer are
// capped at the configured view distance.

use hearth_protocol::packet::{ChunkRadiusUpdated, Packet, RequestChunkRadius};

use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::session::Session;

pub struct RadiusClamp {
    view_distance: i32,
}

impl RadiusClamp {
    pub fn new(view_distance: i32) -> Self {
        Self { view_distance }
    }
}

impl PacketHandler for RadiusClamp {
    fn name(&self) -> &'static str {
        "radius_clamp"
    }

    fn handle(&self, packet: Packet, _session: &Session, _origin: Origin) -> Result<Verdict, HandlerError> {
        let packet = match packet {
            Packet::RequestChunkRadius(req) => Packet::from(RequestChunkRadius {
                radius: req.radius.min(self.view_distance),
            }),
            Packet::ChunkRadiusUpdated(upd) => Packet::from(ChunkRadiusUpdated {
                radius: upd.radius.min(self.view_distance),
            }),
            other => other,
        };
        Ok(Verdict::Forward(packet))
    }
}
