// Session-state tracker.
//
// Mirrors the parts of the player's state other components need: the open
// container and the transient slots filled while it is open (flushed on
// disconnect), inventory slots reported by the server (held-item check), and
// dimension/position (claim lookups). It never changes or suppresses a packet.

use hearth_protocol::packet::Packet;
use hearth_protocol::types::{StackRequestAction, StackSlot, TRANSIENT_CONTAINERS};

use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::session::{PlayerData, Session};

pub struct StateTracker;

impl PacketHandler for StateTracker {
    fn name(&self) -> &'static str {
        "state_tracker"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        let mut data = session.data();
        match (&packet, origin) {
            (Packet::ContainerOpen(open), Origin::Server) => {
                data.open_container = Some(open.window_id);
                data.items_in_containers.clear();
            }
            (Packet::ContainerClose(_), _) => {
                data.open_container = None;
                data.items_in_containers.clear();
            }
            (Packet::ItemStackRequest(request), Origin::Client) if data.open_container.is_some() => {
                for action in request.requests.iter().flat_map(|r| &r.actions) {
                    track_action(&mut data, action);
                }
            }
            (Packet::InventorySlot(slot), Origin::Server) => {
                data.inventory.insert((slot.container_id, slot.slot), slot.item);
            }
            (Packet::InventoryContent(content), Origin::Server) => {
                for (slot, item) in content.content.iter().enumerate() {
                    data.inventory.insert((content.container_id, slot as u32), *item);
                }
            }
            (Packet::ChangeDimension(change), Origin::Server) => {
                data.dimension = change.dimension;
                data.position = change.position;
            }
            (Packet::PlayerAuthInput(input), Origin::Client) => {
                data.position = input.position;
            }
            _ => {}
        }
        drop(data);
        Ok(Verdict::Forward(packet))
    }
}

fn is_transient(slot: &StackSlot) -> bool {
    TRANSIENT_CONTAINERS.contains(&slot.container_id)
}

/// Remember transient slots that received items; forget ones emptied by a
/// drop or destroy.
fn track_action(data: &mut PlayerData, action: &StackRequestAction) {
    match action {
        StackRequestAction::Take { destination, .. } | StackRequestAction::Place { destination, .. } => {
            if is_transient(destination)
                && !data
                    .items_in_containers
                    .iter()
                    .any(|s| s.container_id == destination.container_id && s.slot == destination.slot)
            {
                data.items_in_containers.push(*destination);
            }
        }
        StackRequestAction::Drop { source, .. } | StackRequestAction::Destroy { source, .. } => {
            if is_transient(source) {
                data.items_in_containers
                    .retain(|s| !(s.container_id == source.container_id && s.slot == source.slot));
            }
        }
    }
}
