// Combining a synthesized command table with the server's native one.
//
// The collision policy is pluggable through `MergeStrategy`. Strategies take
// both inputs by shared reference and build a new table. Appending to the
// native enum tables can push an index past the 16-bit parameter field, which
// is reported as `SchemaError::EnumOverflow`.

use std::collections::{HashMap, HashSet};

use hearth_protocol::commands::{
    ARG_ENUM, ARG_SOFT_ENUM, AvailableCommands, CommandEnum, DynamicEnum, ENUM_INDEX_MASK,
    NO_ALIASES,
};
use tracing::debug;

use crate::pool::{ValuePool, next_index};
use crate::schema::SchemaError;

/// Policy for combining synthesized and native command tables.
pub trait MergeStrategy: Send + Sync {
    fn merge(
        &self,
        synthesized: &AvailableCommands,
        native: &AvailableCommands,
    ) -> Result<AvailableCommands, SchemaError>;
}

/// Keeps every native command, enum and value at its original index and
/// appends synthesized entries. A synthesized command whose name already
/// exists natively is dropped; a synthesized enum whose key exists natively
/// resolves to the native enum.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreserveNative;

impl MergeStrategy for PreserveNative {
    fn merge(
        &self,
        synthesized: &AvailableCommands,
        native: &AvailableCommands,
    ) -> Result<AvailableCommands, SchemaError> {
        let mut out = native.clone();
        let mut values = ValuePool::from_values(std::mem::take(&mut out.enum_values));

        let mut enum_keys: HashMap<String, u32> = HashMap::new();
        for (i, e) in out.enums.iter().enumerate() {
            enum_keys.entry(e.enum_type.to_lowercase()).or_insert(i as u32);
        }
        let mut enum_map = Vec::with_capacity(synthesized.enums.len());
        for e in &synthesized.enums {
            let key = e.enum_type.to_lowercase();
            if let Some(&index) = enum_keys.get(&key) {
                enum_map.push(index);
                continue;
            }
            let index = next_index(out.enums.len())?;
            let value_indices = e
                .value_indices
                .iter()
                .filter_map(|&vi| synthesized.enum_values.get(vi as usize))
                .map(|v| values.intern(v))
                .collect();
            out.enums.push(CommandEnum {
                enum_type: e.enum_type.clone(),
                value_indices,
            });
            enum_keys.insert(key, index);
            enum_map.push(index);
        }

        let mut dynamic_keys: HashMap<String, u32> = HashMap::new();
        for (i, e) in out.dynamic_enums.iter().enumerate() {
            dynamic_keys
                .entry(e.enum_type.to_lowercase())
                .or_insert(i as u32);
        }
        let mut dynamic_map = Vec::with_capacity(synthesized.dynamic_enums.len());
        for e in &synthesized.dynamic_enums {
            let key = e.enum_type.to_lowercase();
            if let Some(&index) = dynamic_keys.get(&key) {
                dynamic_map.push(index);
                continue;
            }
            let index = next_index(out.dynamic_enums.len())?;
            out.dynamic_enums.push(DynamicEnum {
                enum_type: e.enum_type.clone(),
                values: e.values.clone(),
            });
            dynamic_keys.insert(key, index);
            dynamic_map.push(index);
        }

        out.enum_values = values.into_values();

        let native_names: HashSet<String> = native
            .commands
            .iter()
            .map(|c| c.name.to_lowercase())
            .collect();
        for command in &synthesized.commands {
            if native_names.contains(&command.name.to_lowercase()) {
                debug!(command = %command.name, "native command wins name clash");
                continue;
            }
            let mut command = command.clone();
            if command.aliases_offset != NO_ALIASES {
                command.aliases_offset = enum_map
                    .get(command.aliases_offset as usize)
                    .copied()
                    .unwrap_or(NO_ALIASES);
            }
            for param in command
                .overloads
                .iter_mut()
                .flat_map(|o| o.parameters.iter_mut())
            {
                let remapped = if param.param_type & ARG_SOFT_ENUM != 0 {
                    dynamic_map.get((param.param_type & ENUM_INDEX_MASK) as usize)
                } else if param.param_type & ARG_ENUM != 0 {
                    enum_map.get((param.param_type & ENUM_INDEX_MASK) as usize)
                } else {
                    None
                };
                if let Some(&index) = remapped {
                    param.param_type = (param.param_type & !ENUM_INDEX_MASK) | index;
                }
            }
            out.commands.push(command);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CommandSchema;
    use crate::synth::synthesize;
    use hearth_protocol::commands::{
        ARG_TYPE_INT, ARG_VALID, Command, CommandOverload, CommandParameter,
    };

    fn native() -> AvailableCommands {
        AvailableCommands {
            enum_values: vec!["gamemode".into(), "survival".into(), "creative".into()],
            enums: vec![
                CommandEnum {
                    enum_type: "gamemode".into(),
                    value_indices: vec![1, 2],
                },
                CommandEnum {
                    enum_type: "bool".into(),
                    value_indices: vec![],
                },
            ],
            commands: vec![Command {
                name: "gamemode".into(),
                description: "Sets a player's game mode.".into(),
                flags: 0,
                permission_level: 1,
                aliases_offset: NO_ALIASES,
                overloads: vec![CommandOverload {
                    parameters: vec![CommandParameter {
                        name: "mode".into(),
                        param_type: ARG_VALID | ARG_ENUM,
                        optional: false,
                        options: 0,
                    }],
                }],
            }],
            dynamic_enums: vec![],
        }
    }

    fn synthesized() -> AvailableCommands {
        let schema: CommandSchema = serde_json::from_str(
            r#"{
              "gamemode":{"name":"gamemode","type":"literal"},
              "sethome":{"name":"sethome","type":"literal","children":[
                {"name":"public","type":"boolean"},
                {"name":"n","type":"array","dynamic":true,"allowedTypeValues":["a"]},
                {"name":"radius","type":"int"},
                {"name":"creative","type":"literal"}]}
            }"#,
        )
        .unwrap();
        synthesize(&schema).unwrap()
    }

    #[test]
    fn inputs_are_not_mutated() {
        let (n, s) = (native(), synthesized());
        let (n_before, s_before) = (n.clone(), s.clone());
        PreserveNative.merge(&s, &n).unwrap();
        assert_eq!(n, n_before);
        assert_eq!(s, s_before);
    }

    #[test]
    fn native_entries_keep_their_indices() {
        let n = native();
        let merged = PreserveNative.merge(&synthesized(), &n).unwrap();
        assert_eq!(merged.enum_values[..3], n.enum_values[..]);
        assert_eq!(merged.enums[..2], n.enums[..]);
        assert_eq!(merged.commands[0], n.commands[0]);
    }

    #[test]
    fn native_command_wins_name_clash() {
        let merged = PreserveNative.merge(&synthesized(), &native()).unwrap();
        let gamemodes: Vec<_> = merged
            .commands
            .iter()
            .filter(|c| c.name == "gamemode")
            .collect();
        assert_eq!(gamemodes.len(), 1);
        assert_eq!(gamemodes[0].description, "Sets a player's game mode.");
    }

    #[test]
    fn synthesized_enums_are_remapped() {
        let merged = PreserveNative.merge(&synthesized(), &native()).unwrap();
        let sethome = merged.command("sethome").unwrap();
        assert_eq!(sethome.overloads.len(), 4);

        let literal = sethome.overloads[0].parameters[0].enum_index().unwrap();
        assert_eq!(merged.enum_options(literal as usize), Some(vec!["sethome"]));

        // Same key as the native "bool" enum: reuses index 1.
        assert_eq!(sethome.overloads[0].parameters[1].enum_index(), Some(1));

        let soft = sethome.overloads[1].parameters[1]
            .dynamic_enum_index()
            .unwrap();
        assert_eq!(merged.dynamic_enums[soft as usize].enum_type, "n_f0");

        assert_eq!(
            sethome.overloads[2].parameters[1].param_type,
            ARG_TYPE_INT | ARG_VALID
        );
    }

    #[test]
    fn shared_values_reuse_native_strings() {
        let merged = PreserveNative.merge(&synthesized(), &native()).unwrap();
        let sethome = merged.command("sethome").unwrap();
        let literal = sethome.overloads[3].parameters[1].enum_index().unwrap();
        assert_eq!(merged.enums[literal as usize].value_indices, vec![2]);
        assert_eq!(
            merged
                .enum_values
                .iter()
                .filter(|v| *v == "creative")
                .count(),
            1
        );
    }

    #[test]
    fn appended_enum_past_index_field_is_rejected() {
        let mut n = native();
        n.enums = (0..=ENUM_INDEX_MASK)
            .map(|i| CommandEnum {
                enum_type: format!("native{i}"),
                value_indices: vec![],
            })
            .collect();
        let err = PreserveNative.merge(&synthesized(), &n).unwrap_err();
        assert!(matches!(err, SchemaError::EnumOverflow { max: 0x1_0000 }));
    }
}
