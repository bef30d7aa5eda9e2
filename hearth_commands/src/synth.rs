// Overload assembly: schema → `AvailableCommands`.
//
// Every root entry becomes one wire command. Flattened parameters with a
// derived enum are interned into the static or dynamic pool and get the
// matching enum flag OR-ed with the pool index. Static enum options are
// finally resolved through a shared `ValuePool`; dynamic enums carry their
// values inline.

use hearth_protocol::commands::{
    ARG_ENUM, ARG_SOFT_ENUM, AvailableCommands, Command, CommandEnum, CommandOverload,
    CommandParameter, DynamicEnum, NO_ALIASES,
};
use tracing::trace;

use crate::flatten::flatten;
use crate::pool::{EnumPool, ValuePool};
use crate::schema::{CommandSchema, SchemaError};

/// Permission level required by commands flagged `requiresOp`.
pub const OPERATOR_PERMISSION: u8 = 1;

/// Compile a schema into a standalone command table.
pub fn synthesize(schema: &CommandSchema) -> Result<AvailableCommands, SchemaError> {
    let mut enums = EnumPool::default();
    let mut dynamic = EnumPool::default();
    let mut commands = Vec::with_capacity(schema.len());

    for (key, root) in schema {
        if !root.name.is_empty() && root.name != *key {
            trace!(alias = %key, command = %root.name, "skipping alias entry");
            continue;
        }
        let name = key.to_lowercase();

        let mut overloads = Vec::new();
        for branch in flatten(&name, root) {
            let mut parameters = Vec::with_capacity(branch.len());
            for param in branch {
                let mut param_type = param.arg_type;
                if let Some(derived) = &param.derived {
                    param_type |= if derived.dynamic {
                        ARG_SOFT_ENUM | dynamic.intern(&derived.key, &derived.options)?
                    } else {
                        ARG_ENUM | enums.intern(&derived.key, &derived.options)?
                    };
                }
                parameters.push(CommandParameter {
                    name: param.name,
                    param_type,
                    optional: false,
                    options: 0,
                });
            }
            overloads.push(CommandOverload { parameters });
        }

        let aliases_offset = if root.aliases.is_empty() {
            NO_ALIASES
        } else {
            let mut options = vec![name.clone()];
            options.extend(root.aliases.iter().cloned());
            enums.intern(&format!("{name}aliases"), &options)?
        };

        commands.push(Command {
            description: root.description.clone(),
            flags: 0,
            permission_level: if root.requires_op {
                OPERATOR_PERMISSION
            } else {
                0
            },
            aliases_offset,
            overloads,
            name,
        });
    }

    let mut values = ValuePool::default();
    let enums = enums
        .into_entries()
        .into_iter()
        .map(|e| CommandEnum {
            value_indices: e.options.iter().map(|o| values.intern(o)).collect(),
            enum_type: e.key,
        })
        .collect();
    let dynamic_enums = dynamic
        .into_entries()
        .into_iter()
        .map(|e| DynamicEnum {
            enum_type: e.key,
            values: e.options,
        })
        .collect();

    Ok(AvailableCommands {
        enum_values: values.into_values(),
        enums,
        commands,
        dynamic_enums,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_protocol::commands::{ARG_TYPE_STRING, ARG_VALID};

    fn schema(json: &str) -> CommandSchema {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn warp_example() {
        let out = synthesize(&schema(
            r#"{"warp":{"name":"warp","type":"literal","children":[
                {"name":"location","type":"string","children":[]}]}}"#,
        ))
        .unwrap();

        assert_eq!(out.commands.len(), 1);
        let warp = &out.commands[0];
        assert_eq!(warp.name, "warp");
        assert_eq!(warp.aliases_offset, NO_ALIASES);
        assert_eq!(warp.overloads.len(), 1);

        let params = &warp.overloads[0].parameters;
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "warp");
        let idx = params[0].enum_index().unwrap();
        assert_eq!(out.enums[idx as usize].enum_type, "warp_f0");
        assert_eq!(out.enum_options(idx as usize), Some(vec!["warp"]));
        assert_eq!(params[1].name, "location");
        assert_eq!(params[1].param_type, ARG_TYPE_STRING | ARG_VALID);
    }

    #[test]
    fn shared_literal_is_one_enum() {
        let out = synthesize(&schema(
            r#"{"kit":{"name":"kit","type":"literal","children":[
                {"name":"give","type":"literal","children":[{"name":"who","type":"player"}]},
                {"name":"give","type":"literal","children":[{"name":"amount","type":"int"}]}
            ]}}"#,
        ))
        .unwrap();

        let overloads = &out.commands[0].overloads;
        assert_eq!(overloads.len(), 2);
        let a = overloads[0].parameters[1].enum_index().unwrap();
        let b = overloads[1].parameters[1].enum_index().unwrap();
        assert_eq!(a, b);
        assert_eq!(
            out.enums.iter().filter(|e| e.enum_type == "give_f0").count(),
            1
        );
    }

    #[test]
    fn arrays_with_different_parents_stay_apart() {
        let out = synthesize(&schema(
            r#"{
              "kit":{"name":"kit","type":"literal","children":[
                {"name":"mode","type":"array","parent":"kit","allowedTypeValues":["a","b"]}]},
              "zone":{"name":"zone","type":"literal","children":[
                {"name":"mode","type":"array","parent":"zone","allowedTypeValues":["a","b"]}]}
            }"#,
        ))
        .unwrap();

        let kit = out.command("kit").unwrap().overloads[0].parameters[1].enum_index();
        let zone = out.command("zone").unwrap().overloads[0].parameters[1].enum_index();
        assert_ne!(kit, zone);
        assert_eq!(out.enums[kit.unwrap() as usize].enum_type, "kit_mode_f0");
        assert_eq!(out.enums[zone.unwrap() as usize].enum_type, "zone_mode_f0");
        // Options are stored once in the value table.
        assert_eq!(out.enum_values.iter().filter(|v| *v == "a").count(), 1);
    }

    #[test]
    fn dynamic_arrays_use_soft_enums() {
        let out = synthesize(&schema(
            r#"{"home":{"name":"home","type":"literal","children":[
                {"name":"Name","type":"array","dynamic":true,"allowedTypeValues":["Base","Farm"]}]}}"#,
        ))
        .unwrap();

        let param = &out.commands[0].overloads[0].parameters[1];
        assert_eq!(param.enum_index(), None);
        let idx = param.dynamic_enum_index().unwrap();
        assert_eq!(out.dynamic_enums[idx as usize].enum_type, "name_f0");
        assert_eq!(out.dynamic_enums[idx as usize].values, vec!["base", "farm"]);
    }

    #[test]
    fn alias_entries_are_skipped_and_aliases_get_an_enum() {
        let out = synthesize(&schema(
            r#"{
              "Spawn":{"name":"Spawn","type":"literal","aliases":["s"],"requiresOp":true},
              "s":{"name":"Spawn","type":"literal"}
            }"#,
        ))
        .unwrap();

        assert_eq!(out.commands.len(), 1);
        let spawn = &out.commands[0];
        assert_eq!(spawn.name, "spawn");
        assert_eq!(spawn.permission_level, OPERATOR_PERMISSION);
        assert_ne!(spawn.aliases_offset, NO_ALIASES);
        assert_eq!(
            out.enum_options(spawn.aliases_offset as usize),
            Some(vec!["spawn", "s"])
        );
    }

    #[test]
    fn booleans_share_the_bool_enum() {
        let out = synthesize(&schema(
            r#"{
              "pvp":{"name":"pvp","type":"literal","children":[{"name":"on","type":"boolean"}]},
              "fly":{"name":"fly","type":"literal","children":[{"name":"on","type":"boolean"}]}
            }"#,
        ))
        .unwrap();

        assert_eq!(out.enums.iter().filter(|e| e.enum_type == "bool").count(), 1);
        let idx = out.command("fly").unwrap().overloads[0].parameters[1]
            .enum_index()
            .unwrap();
        assert_eq!(out.enum_options(idx as usize), Some(vec!["true", "false"]));
    }

    #[test]
    fn output_is_deterministic() {
        let s = schema(
            r#"{"b":{"name":"b","type":"literal"},"a":{"name":"a","type":"literal"}}"#,
        );
        let first = synthesize(&s).unwrap();
        assert_eq!(first, synthesize(&s).unwrap());
        assert_eq!(first.commands[0].name, "a");
    }
}
