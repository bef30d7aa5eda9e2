// Packet families exchanged between game clients, the proxy, and the server.
//
// `Packet` is a closed sum type: one variant per message family the proxy
// models, plus `Unknown` for everything else. Unknown packets keep their raw
// body and are forwarded byte-for-byte, so the proxy stays transparent to
// protocol features it does not care about.
//
// Payload layout (inside one frame, see `framing.rs`): a 4-byte big-endian
// packet id, then the body. Modelled families use a JSON body; `Unknown`
// bodies are opaque bytes.
//
// The `packet_families!` macro below keeps the id table, the enum, and the
// codec dispatch in one place so adding a family is a one-line change plus
// its body struct.

use serde::{Deserialize, Serialize};

use crate::commands::AvailableCommands;
use crate::types::{
    BlockPos, ClientData, GameData, IdentityData, InventoryAction, ItemStack,
    ItemStackRequestEntry, PlayerBlockAction, TextType, TransactionData, Vec3,
};

/// Numeric packet ids.
pub mod id {
    pub const LOGIN: u32 = 0x01;
    pub const PLAY_STATUS: u32 = 0x02;
    pub const DISCONNECT: u32 = 0x05;
    pub const TEXT: u32 = 0x09;
    pub const START_GAME: u32 = 0x0b;
    pub const INVENTORY_TRANSACTION: u32 = 0x1e;
    pub const CONTAINER_OPEN: u32 = 0x2e;
    pub const CONTAINER_CLOSE: u32 = 0x2f;
    pub const INVENTORY_CONTENT: u32 = 0x31;
    pub const INVENTORY_SLOT: u32 = 0x32;
    pub const CHANGE_DIMENSION: u32 = 0x3d;
    pub const REQUEST_CHUNK_RADIUS: u32 = 0x45;
    pub const CHUNK_RADIUS_UPDATED: u32 = 0x46;
    pub const AVAILABLE_COMMANDS: u32 = 0x4c;
    pub const COMMAND_REQUEST: u32 = 0x4d;
    pub const SET_TITLE: u32 = 0x58;
    pub const SET_LOCAL_PLAYER_AS_INITIALISED: u32 = 0x71;
    pub const PLAYER_AUTH_INPUT: u32 = 0x90;
    pub const ITEM_STACK_REQUEST: u32 = 0x93;
    pub const PACKET_VIOLATION_WARNING: u32 = 0x9c;
    pub const STATUS_REQUEST: u32 = 0xf0;
    pub const STATUS_RESPONSE: u32 = 0xf1;
}

/// Errors produced while encoding or decoding a packet payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload too short for a packet id: {len} bytes")]
    Truncated { len: usize },
    #[error("malformed body for packet {id:#04x}: {source}")]
    Body {
        id: u32,
        #[source]
        source: serde_json::Error,
    },
}

macro_rules! packet_families {
    ($($variant:ident => $id:path),* $(,)?) => {
        /// A single protocol message.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Packet {
            $($variant($variant),)*
            /// A packet family the proxy does not model.
            Unknown { id: u32, payload: Vec<u8> },
        }

        impl Packet {
            /// Numeric id of this packet.
            pub fn id(&self) -> u32 {
                match self {
                    $(Packet::$variant(_) => $id,)*
                    Packet::Unknown { id, .. } => *id,
                }
            }

            fn encode_body(&self) -> Result<Vec<u8>, CodecError> {
                let id = self.id();
                match self {
                    $(Packet::$variant(body) => {
                        serde_json::to_vec(body).map_err(|source| CodecError::Body { id, source })
                    })*
                    Packet::Unknown { payload, .. } => Ok(payload.clone()),
                }
            }

            fn decode_body(id: u32, body: &[u8]) -> Result<Self, CodecError> {
                match id {
                    $($id => serde_json::from_slice(body)
                        .map(Packet::$variant)
                        .map_err(|source| CodecError::Body { id, source }),)*
                    _ => Ok(Packet::Unknown { id, payload: body.to_vec() }),
                }
            }
        }

        $(impl From<$variant> for Packet {
            fn from(body: $variant) -> Self {
                Packet::$variant(body)
            }
        })*
    };
}

packet_families! {
    Login => id::LOGIN,
    PlayStatus => id::PLAY_STATUS,
    Disconnect => id::DISCONNECT,
    Text => id::TEXT,
    StartGame => id::START_GAME,
    InventoryTransaction => id::INVENTORY_TRANSACTION,
    ContainerOpen => id::CONTAINER_OPEN,
    ContainerClose => id::CONTAINER_CLOSE,
    InventoryContent => id::INVENTORY_CONTENT,
    InventorySlot => id::INVENTORY_SLOT,
    ChangeDimension => id::CHANGE_DIMENSION,
    RequestChunkRadius => id::REQUEST_CHUNK_RADIUS,
    ChunkRadiusUpdated => id::CHUNK_RADIUS_UPDATED,
    AvailableCommands => id::AVAILABLE_COMMANDS,
    CommandRequest => id::COMMAND_REQUEST,
    SetTitle => id::SET_TITLE,
    SetLocalPlayerAsInitialised => id::SET_LOCAL_PLAYER_AS_INITIALISED,
    PlayerAuthInput => id::PLAYER_AUTH_INPUT,
    ItemStackRequest => id::ITEM_STACK_REQUEST,
    PacketViolationWarning => id::PACKET_VIOLATION_WARNING,
    StatusRequest => id::STATUS_REQUEST,
    StatusResponse => id::STATUS_RESPONSE,
}

impl Packet {
    /// Encode into a frame payload: id, then body.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let body = self.encode_body()?;
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&self.id().to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a frame payload produced by `encode`.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let Some((id_bytes, body)) = payload.split_first_chunk::<4>() else {
            return Err(CodecError::Truncated {
                len: payload.len(),
            });
        };
        Self::decode_body(u32::from_be_bytes(*id_bytes), body)
    }
}

// ---------------------------------------------------------------------------
// Packet bodies
// ---------------------------------------------------------------------------

/// First packet of every connection (client → proxy, proxy → server).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub protocol_version: i32,
    pub identity: IdentityData,
    pub client_data: ClientData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayStatus {
    pub status: i32,
}

/// Native disconnect mechanism: the message is shown to the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disconnect {
    pub message: String,
    #[serde(default)]
    pub hide_screen: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text_type: TextType,
    #[serde(default)]
    pub needs_translation: bool,
    #[serde(default)]
    pub source_name: String,
    pub message: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub xuid: String,
}

impl Text {
    /// A plain server-originated message shown in the player's chat.
    pub fn raw(message: impl Into<String>) -> Self {
        Self {
            text_type: TextType::Raw,
            needs_translation: false,
            source_name: String::new(),
            message: message.into(),
            parameters: Vec::new(),
            xuid: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartGame {
    pub game_data: GameData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    #[serde(default)]
    pub actions: Vec<InventoryAction>,
    pub transaction: TransactionData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerOpen {
    pub window_id: u8,
    pub container_type: u8,
    pub position: BlockPos,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerClose {
    pub window_id: u8,
    #[serde(default)]
    pub server_side: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryContent {
    pub container_id: u8,
    pub content: Vec<ItemStack>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub container_id: u8,
    pub slot: u32,
    pub item: ItemStack,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeDimension {
    pub dimension: i32,
    pub position: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestChunkRadius {
    pub radius: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRadiusUpdated {
    pub radius: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command_line: String,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetTitle {
    pub action: i32,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetLocalPlayerAsInitialised {
    pub entity_runtime_id: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerAuthInput {
    pub tick: u64,
    pub position: Vec3,
    #[serde(default)]
    pub block_actions: Vec<PlayerBlockAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemStackRequest {
    pub requests: Vec<ItemStackRequestEntry>,
}

/// Sent by the client when it failed to parse a packet from the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PacketViolationWarning {
    pub kind: i32,
    pub severity: i32,
    pub packet_id: i32,
    #[serde(default)]
    pub context: String,
}

/// Liveness probe; answered with `StatusResponse` and no session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRequest {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub server_name: String,
    pub motd: String,
    pub player_count: u32,
    pub max_players: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefix_is_big_endian() {
        let bytes = Packet::from(PlayStatus { status: 3 }).encode().unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 0, 0x02]);
        assert_eq!(&bytes[4..], br#"{"status":3}"#);
    }

    #[test]
    fn unknown_packets_pass_through_untouched() {
        let mut payload = 0x7au32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let packet = Packet::decode(&payload).unwrap();
        assert_eq!(
            packet,
            Packet::Unknown {
                id: 0x7a,
                payload: vec![0xde, 0xad, 0xbe, 0xef],
            }
        );
        assert_eq!(packet.encode().unwrap(), payload);
    }

    #[test]
    fn truncated_payload_rejected() {
        let err = Packet::decode(&[0, 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { len: 2 }));
    }

    #[test]
    fn malformed_known_body_reports_id() {
        let mut payload = id::TEXT.to_be_bytes().to_vec();
        payload.extend_from_slice(b"{not json");
        let err = Packet::decode(&payload).unwrap_err();
        assert!(matches!(err, CodecError::Body { id: id::TEXT, .. }));
    }

    #[test]
    fn text_defaults_fill_missing_fields() {
        let mut payload = id::TEXT.to_be_bytes().to_vec();
        payload.extend_from_slice(br#"{"text_type":"Chat","message":"hi"}"#);
        match Packet::decode(&payload).unwrap() {
            Packet::Text(text) => {
                assert_eq!(text.text_type, TextType::Chat);
                assert_eq!(text.message, "hi");
                assert!(text.source_name.is_empty());
            }
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn available_commands_keeps_its_id() {
        let packet = Packet::from(AvailableCommands::default());
        assert_eq!(packet.id(), id::AVAILABLE_COMMANDS);
        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }
}
