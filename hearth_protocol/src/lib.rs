// hearth_protocol — wire protocol spoken by the hearth proxy.
//
// This crate defines the packet families, shared data types, framing, and
// command-table representation used by the proxy (`hearth_proxy`), by the
// command synthesizer (`hearth_commands`), and by the fake server and client
// in `proxy_tests`. It has no networking of its own.
//
// Module overview:
// - `types.rs`:    Data carried inside packets: identity, game data, item
//                  stacks, inventory transactions, container ids.
// - `commands.rs`: The `AvailableCommands` table and its parameter flag bits.
// - `packet.rs`:   The `Packet` sum type, packet ids, and the payload codec.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then packet payload.
//
// Design decisions:
// - **JSON bodies.** Modelled packets serialize their body with serde_json.
//   Unmodelled packets keep raw bytes and pass through unchanged.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`, compatible with
//   blocking TCP streams and buffered wrappers.

pub mod commands;
pub mod framing;
pub mod packet;
pub mod types;

pub use commands::{
    AvailableCommands, Command, CommandEnum, CommandOverload, CommandParameter, DynamicEnum,
};
pub use framing::{MAX_FRAME_SIZE, WireError, read_frame, read_packet, write_frame, write_packet};
pub use packet::{CodecError, Packet};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::packet::{Login, StartGame};
    use crate::types::{ClientData, GameData, IdentityData, ItemEntry, Vec3};

    fn roundtrip(packet: Packet) {
        let mut wire = Vec::new();
        write_packet(&mut wire, &packet).unwrap();
        let recovered = read_packet(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(recovered, packet);
    }

    #[test]
    fn login_survives_the_wire() {
        roundtrip(Packet::from(Login {
            protocol_version: 712,
            identity: IdentityData {
                xuid: "2535400000000001".into(),
                display_name: "Steve".into(),
                identity: "6f0b4c1a-0000-0000-0000-000000000001".into(),
                title_id: String::new(),
            },
            client_data: ClientData {
                self_signed_id: "aa".into(),
                ..Default::default()
            },
        }));
    }

    #[test]
    fn start_game_keeps_item_components() {
        roundtrip(Packet::from(StartGame {
            game_data: GameData {
                entity_runtime_id: 1,
                world_name: "Bedrock level".into(),
                world_seed: 0,
                dimension: 1,
                player_position: Vec3::new(0.5, 70.0, -12.5),
                client_side_generation: false,
                items: vec![ItemEntry {
                    name: "minecraft:snowball".into(),
                    runtime_id: 374,
                    component_based: true,
                    components: Some(serde_json::json!({
                        "components": { "minecraft:throwable": {} }
                    })),
                }],
            },
        }));
    }
}
