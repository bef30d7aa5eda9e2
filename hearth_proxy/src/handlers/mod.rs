// Built-in packet handlers and their registration.
//
// `build_chain` registers every handler the proxy runs, per packet id, in
// the order the chain must apply them:
//
// | packet                                   | handlers                              |
// |------------------------------------------|---------------------------------------|
// | container/inventory/dimension packets    | state tracker                         |
// | PlayerAuthInput                          | state tracker, claim block guard      |
// | InventoryTransaction                     | border guard (if enabled), throwables |
// | AvailableCommands                        | native command capture                |
// | CommandRequest                           | command log                           |
// | Text                                     | command trigger, chat mirror          |
// | RequestChunkRadius / ChunkRadiusUpdated  | radius clamp                          |
// | PacketViolationWarning                   | malformed log                         |

pub mod border;
pub mod chat;
pub mod claims;
pub mod commands;
pub mod malformed;
pub mod radius;
pub mod state;

use std::sync::Arc;

use hearth_commands::MergeStrategy;
use hearth_protocol::packet::id;

use crate::claims::ClaimStore;
use crate::config::Config;
use crate::handler::{HandlerChain, HandlerChainBuilder};
use crate::items::ItemRegistry;

pub use commands::NativeCommands;

/// Shared services the handlers are built with.
#[derive(Clone)]
pub struct HandlerDeps {
    pub claims: Arc<ClaimStore>,
    pub items: Arc<ItemRegistry>,
    pub native_commands: Arc<NativeCommands>,
    pub merge: Arc<dyn MergeStrategy>,
}

pub fn build_chain(config: &Config, deps: &HandlerDeps) -> HandlerChain {
    let mut builder = HandlerChainBuilder::new().trace(config.server.packet_trace.clone());

    for packet_id in [
        id::CONTAINER_OPEN,
        id::CONTAINER_CLOSE,
        id::ITEM_STACK_REQUEST,
        id::INVENTORY_SLOT,
        id::INVENTORY_CONTENT,
        id::CHANGE_DIMENSION,
        id::PLAYER_AUTH_INPUT,
    ] {
        builder = builder.register(packet_id, Box::new(state::StateTracker));
    }
    builder = builder.register(
        id::PLAYER_AUTH_INPUT,
        Box::new(claims::ClaimBlockGuard::new(deps.claims.clone())),
    );

    if config.world_border.enabled {
        builder = builder.register(
            id::INVENTORY_TRANSACTION,
            Box::new(border::BorderGuard::new(config.world_border.clone())),
        );
    }
    builder = builder.register(
        id::INVENTORY_TRANSACTION,
        Box::new(claims::ClaimThrowableGuard::new(deps.claims.clone(), deps.items.clone())),
    );

    let view_distance = config.server.view_distance;
    builder
        .register(
            id::AVAILABLE_COMMANDS,
            Box::new(commands::NativeCommandCapture::new(deps.native_commands.clone())),
        )
        .register(id::COMMAND_REQUEST, Box::new(commands::CommandLog))
        .register(
            id::TEXT,
            Box::new(commands::CommandRegisterTrigger::new(
                config.commands.trigger_prefix.clone(),
                deps.native_commands.clone(),
                deps.merge.clone(),
            )),
        )
        .register(id::TEXT, Box::new(chat::ChatMirror))
        .register(id::REQUEST_CHUNK_RADIUS, Box::new(radius::RadiusClamp::new(view_distance)))
        .register(id::CHUNK_RADIUS_UPDATED, Box::new(radius::RadiusClamp::new(view_distance)))
        .register(id::PACKET_VIOLATION_WARNING, Box::new(malformed::MalformedLog))
        .build()
}
