// Anti-cheat and world-border guard for inventory transactions.
//
// Two checks, in order:
// - a transaction whose first action claims the creative-menu source
//   (type 99999) is a known exploit and is dropped silently;
// - a click-block use whose target (the face-adjacent block) lies outside
//   the configured border is dropped and the player is told why.

use hearth_protocol::packet::Packet;
use hearth_protocol::types::{TransactionData, USE_ITEM_CLICK_BLOCK};
use tracing::{debug, warn};

use crate::config::WorldBorderConfig;
use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::session::Session;

/// Inventory source type forged by item-spawning clients.
pub const FORGED_SOURCE_TYPE: u32 = 99999;

pub const MESSAGE_OUTSIDE_BORDER: &str = "§cActions outside the world are prohibited!";

pub struct BorderGuard {
    border: WorldBorderConfig,
}

impl BorderGuard {
    pub fn new(border: WorldBorderConfig) -> Self {
        Self { border }
    }
}

impl PacketHandler for BorderGuard {
    fn name(&self) -> &'static str {
        "border_guard"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        if origin != Origin::Client {
            return Ok(Verdict::Forward(packet));
        }
        let Packet::InventoryTransaction(tx) = &packet else {
            return Ok(Verdict::Forward(packet));
        };

        if tx.actions.first().is_some_and(|a| a.source_type == FORGED_SOURCE_TYPE) {
            warn!(player = session.name(), xuid = session.xuid(), "dropping transaction with forged source type");
            return Ok(Verdict::Suppress(packet));
        }

        if let TransactionData::UseItem(use_item) = &tx.transaction {
            if use_item.action_type == USE_ITEM_CLICK_BLOCK {
                let target = use_item.block_position.side(use_item.block_face);
                if !self.border.contains_xz(target.x, target.z) {
                    debug!(player = session.name(), x = target.x, z = target.z, "block use outside world border");
                    session.send_message(MESSAGE_OUTSIDE_BORDER).map_err(|source| HandlerError::Send {
                        handler: self.name(),
                        source,
                    })?;
                    return Ok(Verdict::Suppress(packet));
                }
            }
        }
        Ok(Verdict::Forward(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::harness;
    use hearth_protocol::packet::InventoryTransaction;
    use hearth_protocol::types::{BlockPos, InventoryAction, ItemStack, USE_ITEM_CLICK_AIR, UseItemData, Vec3};

    fn border() -> WorldBorderConfig {
        WorldBorderConfig {
            enabled: true,
            min_x: -100,
            max_x: 100,
            min_z: -100,
            max_z: 100,
        }
    }

    fn use_item(action_type: u32, block_position: BlockPos, block_face: i32) -> Packet {
        Packet::from(InventoryTransaction {
            actions: Vec::new(),
            transaction: TransactionData::UseItem(UseItemData {
                action_type,
                block_position,
                block_face,
                hot_bar_slot: 0,
                held_item: ItemStack::default(),
                position: Vec3::default(),
            }),
        })
    }

    #[test]
    fn forged_source_is_dropped() {
        let h = harness("Steve", "1");
        let packet = Packet::from(InventoryTransaction {
            actions: vec![InventoryAction {
                source_type: FORGED_SOURCE_TYPE,
                ..InventoryAction::default()
            }],
            transaction: TransactionData::Normal,
        });
        let verdict = BorderGuard::new(border())
            .handle(packet, &h.session, Origin::Client)
            .unwrap();
        assert!(!verdict.is_forward());
    }

    #[test]
    fn click_outside_border_is_refused_with_message() {
        let h = harness("Steve", "1");
        // The east face of x=100 targets x=101.
        let verdict = BorderGuard::new(border())
            .handle(use_item(USE_ITEM_CLICK_BLOCK, BlockPos::new(100, 64, 0), 5), &h.session, Origin::Client)
            .unwrap();
        assert!(!verdict.is_forward());
        match h.client_peer.read_packet().unwrap() {
            Packet::Text(text) => assert_eq!(text.message, MESSAGE_OUTSIDE_BORDER),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn clicks_inside_border_and_air_clicks_pass() {
        let h = harness("Steve", "1");
        let guard = BorderGuard::new(border());
        let inside = guard
            .handle(use_item(USE_ITEM_CLICK_BLOCK, BlockPos::new(100, 64, 0), 4), &h.session, Origin::Client)
            .unwrap();
        assert!(inside.is_forward());
        let air = guard
            .handle(use_item(USE_ITEM_CLICK_AIR, BlockPos::new(5000, 64, 0), 1), &h.session, Origin::Client)
            .unwrap();
        assert!(air.is_forward());
    }
}
