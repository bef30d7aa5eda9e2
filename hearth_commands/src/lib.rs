// hearth_commands — compiles declarative command schemas into the wire
// command table.
//
// A server-side addon describes its custom commands as nested JSON trees and
// broadcasts them in a tagged chat message. This crate turns such a schema
// into an `AvailableCommands` table the game client understands, then merges
// it with the server's own command list. It is pure: no I/O, no global state,
// and every enum index it assigns is local to one `compile` call.
//
// Module overview:
// - `schema.rs`:  Schema model (`CommandNode`, `CommandType`) and trigger
//                 message parsing.
// - `flatten.rs`: Depth-first expansion of a tree into overloads, plus node
//                 typing and enum derivation keys.
// - `pool.rs`:    Case-insensitive enum and option-string interning.
// - `synth.rs`:   Overload assembly into a standalone `AvailableCommands`.
// - `merge.rs`:   `MergeStrategy` and the default `PreserveNative` policy.

pub mod flatten;
pub mod merge;
pub mod pool;
pub mod schema;
pub mod synth;

use hearth_protocol::AvailableCommands;

pub use merge::{MergeStrategy, PreserveNative};
pub use schema::{
    COMMANDS_TRIGGER_PREFIX, CommandNode, CommandSchema, CommandType, SchemaError, parse_trigger,
};
pub use synth::synthesize;

/// Synthesize `schema` and merge the result with the native command set.
pub fn compile(
    schema: &CommandSchema,
    native: &AvailableCommands,
    strategy: &dyn MergeStrategy,
) -> Result<AvailableCommands, SchemaError> {
    let synthesized = synthesize(schema)?;
    strategy.merge(&synthesized, native)
}
