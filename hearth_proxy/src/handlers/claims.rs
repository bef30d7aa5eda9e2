// Claim guards.
//
// `ClaimBlockGuard` checks every block action in a player's auth input
// against the claim covering the block; one refused action suppresses the
// whole packet. `ClaimThrowableGuard` refuses using a throwable item while
// standing in a claim the player may not use items in.
//
// Lookups use the dimension tracked on the session.

use std::sync::Arc;

use hearth_protocol::packet::Packet;
use hearth_protocol::types::{
    BLOCK_ACTION_ABORT_BREAK, BLOCK_ACTION_START_BREAK, BLOCK_ACTION_STOP_BREAK, TransactionData,
};
use tracing::debug;

use crate::claims::{ClaimAction, ClaimStore};
use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::items::ItemRegistry;
use crate::session::Session;

pub const MESSAGE_THROWABLE_REFUSED: &str = "§cYou cannot use throwable items in this claim!";

fn block_action_kind(action: i32) -> ClaimAction {
    // Deliberately wider than a single break action: every break stage counts,
    // so a StartBreak inside an admin claim is refused as well.
    match action {
        BLOCK_ACTION_START_BREAK | BLOCK_ACTION_ABORT_BREAK | BLOCK_ACTION_STOP_BREAK => ClaimAction::BreakBlock,
        _ => ClaimAction::InteractWithBlock,
    }
}

pub struct ClaimBlockGuard {
    claims: Arc<ClaimStore>,
}

impl ClaimBlockGuard {
    pub fn new(claims: Arc<ClaimStore>) -> Self {
        Self { claims }
    }
}

impl PacketHandler for ClaimBlockGuard {
    fn name(&self) -> &'static str {
        "claim_block_guard"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        let Packet::PlayerAuthInput(input) = &packet else {
            return Ok(Verdict::Forward(packet));
        };
        if origin != Origin::Client || input.block_actions.is_empty() {
            return Ok(Verdict::Forward(packet));
        }
        let dimension = session.data().dimension;
        for action in &input.block_actions {
            let pos = action.block_pos;
            let Some(claim) = self.claims.claim_at(dimension, pos.x, pos.z) else {
                continue;
            };
            let kind = block_action_kind(action.action);
            if !claim.allows(session.xuid(), kind) {
                debug!(
                    player = session.name(),
                    claim = %claim.id,
                    ?kind,
                    x = pos.x,
                    y = pos.y,
                    z = pos.z,
                    "block action refused in claim"
                );
                return Ok(Verdict::Suppress(packet));
            }
        }
        Ok(Verdict::Forward(packet))
    }
}

pub struct ClaimThrowableGuard {
    claims: Arc<ClaimStore>,
    items: Arc<ItemRegistry>,
}

impl ClaimThrowableGuard {
    pub fn new(claims: Arc<ClaimStore>, items: Arc<ItemRegistry>) -> Self {
        Self { claims, items }
    }
}

impl PacketHandler for ClaimThrowableGuard {
    fn name(&self) -> &'static str {
        "claim_throwable_guard"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        if origin != Origin::Client {
            return Ok(Verdict::Forward(packet));
        }
        let Packet::InventoryTransaction(tx) = &packet else {
            return Ok(Verdict::Forward(packet));
        };
        let TransactionData::UseItem(use_item) = &tx.transaction else {
            return Ok(Verdict::Forward(packet));
        };
        let network_id = use_item.held_item.network_id;
        if network_id == 0 {
            return Ok(Verdict::Forward(packet));
        }

        let dimension = session.data().dimension;
        let (x, z) = (use_item.position.x as i32, use_item.position.z as i32);
        let Some(claim) = self.claims.claim_at(dimension, x, z) else {
            return Ok(Verdict::Forward(packet));
        };
        if claim.allows(session.xuid(), ClaimAction::UseItem) || !self.items.is_throwable(network_id) {
            return Ok(Verdict::Forward(packet));
        }

        debug!(player = session.name(), claim = %claim.id, network_id, "throwable refused in claim");
        session
            .send_message(MESSAGE_THROWABLE_REFUSED)
            .map_err(|source| HandlerError::Send {
                handler: self.name(),
                source,
            })?;
        Ok(Verdict::Suppress(packet))
    }
}
