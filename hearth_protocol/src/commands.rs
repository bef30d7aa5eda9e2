// Wire representation of the client's command list.
//
// The game transmits commands as a flattened table rather than a tree: every
// command carries a list of overloads, each overload a list of typed
// parameters. A parameter's `param_type` packs a base type code together with
// flag bits; when `ARG_ENUM` (or `ARG_SOFT_ENUM`) is set, the low 16 bits are
// an index into `enums` (or `dynamic_enums`) instead of a primitive code.
// Enum options are themselves stored once in `enum_values` and referenced by
// index.
//
// `hearth_commands` produces these structures from declarative schemas and
// merges them with the set the server sends natively.

use serde::{Deserialize, Serialize};

/// Set on every parameter the client should accept.
pub const ARG_VALID: u32 = 0x10_0000;
/// Low bits index `AvailableCommands::enums`.
pub const ARG_ENUM: u32 = 0x20_0000;
pub const ARG_SUFFIXED: u32 = 0x100_0000;
/// Low bits index `AvailableCommands::dynamic_enums`.
pub const ARG_SOFT_ENUM: u32 = 0x400_0000;
/// Bits holding the enum index when an enum flag is set.
pub const ENUM_INDEX_MASK: u32 = 0xFFFF;

pub const ARG_TYPE_INT: u32 = 1;
pub const ARG_TYPE_FLOAT: u32 = 3;
pub const ARG_TYPE_VALUE: u32 = 4;
pub const ARG_TYPE_WILDCARD_INT: u32 = 5;
pub const ARG_TYPE_OPERATOR: u32 = 6;
pub const ARG_TYPE_TARGET: u32 = 8;
pub const ARG_TYPE_WILDCARD_TARGET: u32 = 10;
pub const ARG_TYPE_FILEPATH: u32 = 17;
pub const ARG_TYPE_STRING: u32 = 56;
pub const ARG_TYPE_BLOCK_POSITION: u32 = 64;
pub const ARG_TYPE_POSITION: u32 = 65;
pub const ARG_TYPE_MESSAGE: u32 = 68;
pub const ARG_TYPE_RAW_TEXT: u32 = 70;
pub const ARG_TYPE_JSON: u32 = 74;
pub const ARG_TYPE_COMMAND: u32 = 87;

/// `Command::aliases_offset` value meaning "no alias enum".
pub const NO_ALIASES: u32 = u32::MAX;

/// The full command table sent to a client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailableCommands {
    pub enum_values: Vec<String>,
    pub enums: Vec<CommandEnum>,
    pub commands: Vec<Command>,
    pub dynamic_enums: Vec<DynamicEnum>,
}

impl AvailableCommands {
    /// Look up a command by name (case-insensitive).
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Resolve the option strings of the static enum at `index`.
    pub fn enum_options(&self, index: usize) -> Option<Vec<&str>> {
        let e = self.enums.get(index)?;
        e.value_indices
            .iter()
            .map(|&vi| self.enum_values.get(vi as usize).map(String::as_str))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub description: String,
    pub flags: u16,
    pub permission_level: u8,
    /// Index into `AvailableCommands::enums` of the alias enum, or `NO_ALIASES`.
    pub aliases_offset: u32,
    pub overloads: Vec<CommandOverload>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOverload {
    pub parameters: Vec<CommandParameter>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    pub param_type: u32,
    pub optional: bool,
    pub options: u8,
}

impl CommandParameter {
    /// Index into the static enum table, if this parameter is a static enum.
    pub fn enum_index(&self) -> Option<u32> {
        (self.param_type & ARG_ENUM != 0 && self.param_type & ARG_SOFT_ENUM == 0)
            .then_some(self.param_type & ENUM_INDEX_MASK)
    }

    /// Index into the dynamic enum table, if this parameter is a soft enum.
    pub fn dynamic_enum_index(&self) -> Option<u32> {
        (self.param_type & ARG_SOFT_ENUM != 0).then_some(self.param_type & ENUM_INDEX_MASK)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandEnum {
    pub enum_type: String,
    pub value_indices: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynamicEnum {
    pub enum_type: String,
    pub values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(param_type: u32) -> CommandParameter {
        CommandParameter {
            name: "p".into(),
            param_type,
            optional: false,
            options: 0,
        }
    }

    #[test]
    fn enum_index_reads_low_bits() {
        assert_eq!(param(ARG_VALID | ARG_ENUM | 7).enum_index(), Some(7));
        assert_eq!(param(ARG_VALID | ARG_ENUM | 7).dynamic_enum_index(), None);
        assert_eq!(param(ARG_VALID | ARG_SOFT_ENUM | 2).dynamic_enum_index(), Some(2));
        assert_eq!(param(ARG_VALID | ARG_TYPE_STRING).enum_index(), None);
    }

    #[test]
    fn enum_options_resolve_through_value_table() {
        let cmds = AvailableCommands {
            enum_values: vec!["true".into(), "false".into(), "warp".into()],
            enums: vec![CommandEnum {
                enum_type: "bool".into(),
                value_indices: vec![0, 1],
            }],
            ..Default::default()
        };
        assert_eq!(cmds.enum_options(0), Some(vec!["true", "false"]));
        assert_eq!(cmds.enum_options(1), None);
    }
}
