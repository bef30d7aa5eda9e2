// Shared data types carried inside packet bodies.
//
// These are plain serde structs used by `packet.rs` and by the proxy's
// session bookkeeping (`hearth_proxy::session`). They mirror the subset of
// the game's data model the proxy actually inspects: player identity, the
// world/game data handed over at spawn, inventory stacks and slots, and the
// transaction payloads the claim and border guards look at.
//
// Container ids follow the game's numbering so that slot references produced
// by the proxy (e.g. the open-container flush) are understood by the server.

use serde::{Deserialize, Serialize};

/// Container id of the combined hot-bar and inventory.
pub const CONTAINER_COMBINED_HOTBAR_AND_INVENTORY: u8 = 12;
/// Container id of the crafting grid input slots.
pub const CONTAINER_CRAFTING_INPUT: u8 = 13;
pub const CONTAINER_ANVIL_INPUT: u8 = 0;
pub const CONTAINER_ANVIL_MATERIAL: u8 = 1;
pub const CONTAINER_SMITHING_TABLE_INPUT: u8 = 3;
pub const CONTAINER_SMITHING_TABLE_MATERIAL: u8 = 4;
pub const CONTAINER_SMITHING_TABLE_TEMPLATE: u8 = 62;
pub const CONTAINER_GRINDSTONE_INPUT: u8 = 24;
pub const CONTAINER_GRINDSTONE_ADDITIONAL: u8 = 25;
pub const CONTAINER_LOOM_INPUT: u8 = 33;
pub const CONTAINER_LOOM_DYE: u8 = 34;
pub const CONTAINER_STONECUTTER_INPUT: u8 = 57;
pub const CONTAINER_CARTOGRAPHY_INPUT: u8 = 18;
pub const CONTAINER_CARTOGRAPHY_ADDITIONAL: u8 = 19;

/// Containers whose contents the game does not persist: anything left in
/// them when the UI closes (or the player vanishes) is returned or dropped.
pub const TRANSIENT_CONTAINERS: &[u8] = &[
    CONTAINER_ANVIL_INPUT,
    CONTAINER_ANVIL_MATERIAL,
    CONTAINER_SMITHING_TABLE_INPUT,
    CONTAINER_SMITHING_TABLE_MATERIAL,
    CONTAINER_SMITHING_TABLE_TEMPLATE,
    CONTAINER_CRAFTING_INPUT,
    CONTAINER_CARTOGRAPHY_INPUT,
    CONTAINER_CARTOGRAPHY_ADDITIONAL,
    CONTAINER_GRINDSTONE_INPUT,
    CONTAINER_GRINDSTONE_ADDITIONAL,
    CONTAINER_LOOM_INPUT,
    CONTAINER_LOOM_DYE,
    CONTAINER_STONECUTTER_INPUT,
];

/// Dimension ids as used in `GameData::dimension` and `ChangeDimension`.
pub const DIMENSION_OVERWORLD: i32 = 0;
pub const DIMENSION_NETHER: i32 = 1;
pub const DIMENSION_END: i32 = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The neighbouring block on the given face (0 down, 1 up, 2 north,
    /// 3 south, 4 west, 5 east). Unknown faces return the block itself.
    pub fn side(self, face: i32) -> Self {
        let Self { x, y, z } = self;
        match face {
            0 => Self::new(x, y - 1, z),
            1 => Self::new(x, y + 1, z),
            2 => Self::new(x, y, z - 1),
            3 => Self::new(x, y, z + 1),
            4 => Self::new(x - 1, y, z),
            5 => Self::new(x + 1, y, z),
            _ => self,
        }
    }
}

/// Identity claims presented by a client at login.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityData {
    pub xuid: String,
    pub display_name: String,
    /// Stable UUID of the account.
    pub identity: String,
    #[serde(default)]
    pub title_id: String,
}

/// Device/client information presented at login.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientData {
    pub self_signed_id: String,
    #[serde(default)]
    pub device_model: String,
    #[serde(default)]
    pub game_version: String,
    #[serde(default)]
    pub language_code: String,
}

/// One entry of the item table sent with the game data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub name: String,
    pub runtime_id: i32,
    #[serde(default)]
    pub component_based: bool,
    /// Raw component document, e.g. `{"components": {"minecraft:throwable": {}}}`.
    #[serde(default)]
    pub components: Option<serde_json::Value>,
}

/// World state handed to a player when they spawn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    /// Runtime id of the player's own entity.
    #[serde(default)]
    pub entity_runtime_id: u64,
    pub world_name: String,
    pub world_seed: i64,
    pub dimension: i32,
    pub player_position: Vec3,
    #[serde(default)]
    pub client_side_generation: bool,
    #[serde(default)]
    pub items: Vec<ItemEntry>,
}

/// An item stack as it appears on the wire. `network_id == 0` is air.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub network_id: i32,
    pub count: u16,
    pub stack_network_id: i32,
}

impl ItemStack {
    pub fn is_empty(&self) -> bool {
        self.network_id == 0 && self.stack_network_id == 0
    }
}

/// A slot reference inside an item-stack request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackSlot {
    pub container_id: u8,
    pub slot: u8,
    pub stack_network_id: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StackRequestAction {
    Take {
        count: u8,
        source: StackSlot,
        destination: StackSlot,
    },
    Place {
        count: u8,
        source: StackSlot,
        destination: StackSlot,
    },
    Drop {
        count: u8,
        source: StackSlot,
        randomly: bool,
    },
    Destroy {
        count: u8,
        source: StackSlot,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStackRequestEntry {
    pub request_id: i32,
    pub actions: Vec<StackRequestAction>,
}

/// A single inventory action in a legacy inventory transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryAction {
    pub source_type: u32,
    pub window_id: i32,
    pub slot: u32,
    pub old_item: ItemStack,
    pub new_item: ItemStack,
}

/// Action type of a use-item transaction that clicked a block.
pub const USE_ITEM_CLICK_BLOCK: u32 = 0;
pub const USE_ITEM_CLICK_AIR: u32 = 1;
pub const USE_ITEM_BREAK_BLOCK: u32 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UseItemData {
    pub action_type: u32,
    pub block_position: BlockPos,
    pub block_face: i32,
    pub hot_bar_slot: i32,
    pub held_item: ItemStack,
    pub position: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransactionData {
    Normal,
    Mismatch,
    UseItem(UseItemData),
    UseItemOnEntity { entity_runtime_id: u64, action_type: u32 },
    ReleaseItem { action_type: u32 },
}

/// A block interaction reported inside player auth input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerBlockAction {
    /// 0 start break, 1 abort break, 2 stop break, others are interactions.
    pub action: i32,
    pub block_pos: BlockPos,
    pub face: i32,
}

/// Block action ids for the three stages of breaking a block.
pub const BLOCK_ACTION_START_BREAK: i32 = 0;
pub const BLOCK_ACTION_ABORT_BREAK: i32 = 1;
pub const BLOCK_ACTION_STOP_BREAK: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextType {
    Raw,
    Chat,
    Translation,
    Popup,
    JukeboxPopup,
    Tip,
    System,
    Whisper,
    Announcement,
    Object,
    ObjectWhisper,
    ObjectAnnouncement,
}

/// `PlayStatus` value telling the client it has spawned.
pub const PLAY_STATUS_PLAYER_SPAWN: i32 = 3;
pub const PLAY_STATUS_LOGIN_SUCCESS: i32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_side_moves_one_step() {
        let pos = BlockPos::new(5, 64, -3);
        assert_eq!(pos.side(0), BlockPos::new(5, 63, -3));
        assert_eq!(pos.side(1), BlockPos::new(5, 65, -3));
        assert_eq!(pos.side(2), BlockPos::new(5, 64, -4));
        assert_eq!(pos.side(5), BlockPos::new(6, 64, -3));
        assert_eq!(pos.side(9), pos);
    }

    #[test]
    fn empty_item_stack() {
        assert!(ItemStack::default().is_empty());
        let stack = ItemStack {
            network_id: 5,
            count: 1,
            stack_network_id: 77,
        };
        assert!(!stack.is_empty());
    }

    #[test]
    fn crafting_input_is_transient() {
        assert!(TRANSIENT_CONTAINERS.contains(&CONTAINER_CRAFTING_INPUT));
        assert!(!TRANSIENT_CONTAINERS.contains(&CONTAINER_COMBINED_HOTBAR_AND_INVENTORY));
    }
}
