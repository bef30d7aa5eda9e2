// Tree flattening and parameter typing.
//
// A command tree is expanded depth-first into overloads: each leaf-to-root
// path becomes one ordered parameter list, starting with the root command's
// own literal. Every node contributes exactly one parameter, except
// continuation nodes (`pos_y*`, `pos_z*`) that stand for the remaining
// components of a preceding `location` argument. Those contribute nothing,
// but their subtrees are still walked with the unchanged prefix.
//
// Typing maps each node to a base wire type plus, for literal, boolean and
// array nodes, a derived enum identified by a derivation key. Keys are what
// the enum pools deduplicate on.

use hearth_protocol::commands::{
    ARG_TYPE_FLOAT, ARG_TYPE_INT, ARG_TYPE_POSITION, ARG_TYPE_STRING, ARG_TYPE_TARGET, ARG_VALID,
};

use crate::schema::{CommandNode, CommandType};

/// Derivation suffix used unless a command appears in `SUFFIX_OVERRIDES`.
pub const DEFAULT_SUFFIX: &str = "f0";

/// Commands whose enums need a separate derivation suffix so they never
/// share an enum with a same-named native argument.
const SUFFIX_OVERRIDES: &[(&str, &str)] = &[("schedule", "f2")];

/// Key of the synthetic `true`/`false` enum.
pub const BOOL_ENUM_KEY: &str = "bool";

/// An enum a parameter refers to, before pool interning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedEnum {
    pub key: String,
    pub options: Vec<String>,
    pub dynamic: bool,
}

/// One parameter of a flattened overload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatParam {
    pub name: String,
    /// Base wire type with `ARG_VALID` set; enum flags are added at assembly.
    pub arg_type: u32,
    pub derived: Option<DerivedEnum>,
}

impl FlatParam {
    fn is_location(&self) -> bool {
        self.derived.is_none() && self.arg_type & !ARG_VALID == ARG_TYPE_POSITION
    }
}

pub fn derivation_suffix(name: &str) -> &'static str {
    SUFFIX_OVERRIDES
        .iter()
        .find(|(command, _)| command.eq_ignore_ascii_case(name))
        .map_or(DEFAULT_SUFFIX, |&(_, suffix)| suffix)
}

/// True for nodes naming the 2nd or 3rd component of a location argument.
pub fn is_continuation(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with("_y*") || lower.ends_with("_z*")
}

/// Type a single node.
pub fn param_for(node: &CommandNode) -> FlatParam {
    let name = node.name.to_lowercase();
    let (base, derived) = match node.kind {
        CommandType::Literal => (0, Some(literal_enum(&node.name))),
        CommandType::Boolean => (
            0,
            Some(DerivedEnum {
                key: BOOL_ENUM_KEY.to_string(),
                options: vec!["true".to_string(), "false".to_string()],
                dynamic: false,
            }),
        ),
        CommandType::Array => {
            let base_key = if node.parent.is_empty() {
                name.clone()
            } else {
                format!("{}_{name}", node.parent.to_lowercase())
            };
            (
                0,
                Some(DerivedEnum {
                    key: format!("{base_key}_{}", derivation_suffix(&node.name)),
                    options: node
                        .allowed_type_values
                        .iter()
                        .map(|v| v.to_lowercase())
                        .collect(),
                    dynamic: node.dynamic,
                }),
            )
        }
        CommandType::Int => (ARG_TYPE_INT, None),
        CommandType::Float => (ARG_TYPE_FLOAT, None),
        CommandType::Location => (ARG_TYPE_POSITION, None),
        CommandType::Player | CommandType::Target => (ARG_TYPE_TARGET, None),
        CommandType::String
        | CommandType::Duration
        | CommandType::PlayerName
        | CommandType::Unknown => (ARG_TYPE_STRING, None),
    };
    FlatParam {
        name,
        arg_type: base | ARG_VALID,
        derived,
    }
}

fn literal_enum(name: &str) -> DerivedEnum {
    let lit = name.to_lowercase();
    DerivedEnum {
        key: format!("{lit}_{}", derivation_suffix(name)),
        options: vec![lit],
        dynamic: false,
    }
}

/// Expand one root command into its overloads.
///
/// `name` is the command's registered name; the root always contributes a
/// literal parameter for it, whatever its declared type.
pub fn flatten(name: &str, root: &CommandNode) -> Vec<Vec<FlatParam>> {
    let mut prefix = vec![FlatParam {
        name: name.to_lowercase(),
        arg_type: ARG_VALID,
        derived: Some(literal_enum(name)),
    }];
    let mut overloads = Vec::new();
    if root.children.is_empty() {
        overloads.push(prefix);
    } else {
        walk(&root.children, &mut prefix, &mut overloads);
    }
    overloads
}

fn walk(children: &[CommandNode], prefix: &mut Vec<FlatParam>, out: &mut Vec<Vec<FlatParam>>) {
    // Sibling continuations (`pos_y*`, `pos_z*`) close the same overload once.
    let mut closed_by_continuation = false;
    for child in children {
        if is_continuation(&child.name) {
            if !child.children.is_empty() {
                walk(&child.children, prefix, out);
            } else if !closed_by_continuation && prefix.last().is_some_and(FlatParam::is_location) {
                out.push(prefix.clone());
                closed_by_continuation = true;
            }
            continue;
        }
        prefix.push(param_for(child));
        if child.children.is_empty() {
            out.push(prefix.clone());
        } else {
            walk(&child.children, prefix, out);
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, kind: CommandType) -> CommandNode {
        CommandNode::new(name, kind)
    }

    fn names(overload: &[FlatParam]) -> Vec<&str> {
        overload.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn root_without_children_is_one_overload() {
        let overloads = flatten("Spawn", &node("Spawn", CommandType::Literal));
        assert_eq!(overloads.len(), 1);
        assert_eq!(names(&overloads[0]), vec!["spawn"]);
        assert_eq!(overloads[0][0].derived.as_ref().unwrap().key, "spawn_f0");
    }

    #[test]
    fn each_leaf_path_is_an_overload() {
        let root = node("claim", CommandType::Literal).with_children(vec![
            node("create", CommandType::Literal).with_children(vec![node("size", CommandType::Int)]),
            node("delete", CommandType::Literal),
        ]);
        let overloads = flatten("claim", &root);
        assert_eq!(overloads.len(), 2);
        assert_eq!(names(&overloads[0]), vec!["claim", "create", "size"]);
        assert_eq!(names(&overloads[1]), vec!["claim", "delete"]);
        assert_eq!(overloads[0][2].arg_type, ARG_TYPE_INT | ARG_VALID);
    }

    #[test]
    fn location_continuations_flatten_to_one_parameter() {
        let root = node("tp", CommandType::Literal).with_children(vec![
            node("pos", CommandType::Location).with_children(vec![
                node("pos_y*", CommandType::Location)
                    .with_children(vec![node("pos_z*", CommandType::Location)]),
            ]),
        ]);
        let overloads = flatten("tp", &root);
        assert_eq!(overloads.len(), 1);
        assert_eq!(names(&overloads[0]), vec!["tp", "pos"]);
        assert_eq!(overloads[0][1].arg_type, ARG_TYPE_POSITION | ARG_VALID);
    }

    #[test]
    fn sibling_continuations_close_once() {
        let root = node("tp", CommandType::Literal).with_children(vec![
            node("pos", CommandType::Location).with_children(vec![
                node("pos_y*", CommandType::Location),
                node("pos_z*", CommandType::Location),
            ]),
        ]);
        assert_eq!(flatten("tp", &root).len(), 1);
    }

    #[test]
    fn arguments_after_a_location_survive() {
        let root = node("fill", CommandType::Literal).with_children(vec![
            node("from", CommandType::Location).with_children(vec![
                node("from_y*", CommandType::Location).with_children(vec![
                    node("from_z*", CommandType::Location)
                        .with_children(vec![node("block", CommandType::String)]),
                ]),
            ]),
        ]);
        let overloads = flatten("fill", &root);
        assert_eq!(overloads.len(), 1);
        assert_eq!(names(&overloads[0]), vec!["fill", "from", "block"]);
    }

    #[test]
    fn schedule_uses_its_own_suffix() {
        assert_eq!(derivation_suffix("schedule"), "f2");
        assert_eq!(derivation_suffix("Schedule"), "f2");
        assert_eq!(derivation_suffix("warp"), DEFAULT_SUFFIX);
        let p = param_for(&node("schedule", CommandType::Literal));
        assert_eq!(p.derived.unwrap().key, "schedule_f2");
    }

    #[test]
    fn array_key_includes_parent() {
        let mut arr = node("Mode", CommandType::Array);
        arr.parent = "Kit".into();
        arr.allowed_type_values = vec!["PvP".into(), "Build".into()];
        let derived = param_for(&arr).derived.unwrap();
        assert_eq!(derived.key, "kit_mode_f0");
        assert_eq!(derived.options, vec!["pvp", "build"]);
        assert!(!derived.dynamic);

        arr.parent.clear();
        assert_eq!(param_for(&arr).derived.unwrap().key, "mode_f0");
    }

    #[test]
    fn primitive_types_map_to_wire_codes() {
        let cases = [
            (CommandType::String, ARG_TYPE_STRING),
            (CommandType::Duration, ARG_TYPE_STRING),
            (CommandType::PlayerName, ARG_TYPE_STRING),
            (CommandType::Unknown, ARG_TYPE_STRING),
            (CommandType::Float, ARG_TYPE_FLOAT),
            (CommandType::Player, ARG_TYPE_TARGET),
            (CommandType::Target, ARG_TYPE_TARGET),
        ];
        for (kind, code) in cases {
            let p = param_for(&node("x", kind));
            assert_eq!(p.arg_type, code | ARG_VALID, "{kind:?}");
            assert!(p.derived.is_none());
        }
        let b = param_for(&node("enabled", CommandType::Boolean));
        assert_eq!(b.arg_type, ARG_VALID);
        assert_eq!(b.derived.unwrap().key, BOOL_ENUM_KEY);
    }
}
