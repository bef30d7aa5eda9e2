// Declarative command schema and the chat trigger that carries it.
//
// A server-side addon announces its custom commands by broadcasting an object
// text message: `{"rawtext":[{"text":"<prefix>{...schema...}"}]}`. The schema
// is a JSON object mapping command names to `CommandNode` trees. Aliases
// appear as extra map entries whose key differs from the node's `name`.
//
// Schemas arrive from a scripting runtime that serializes absent lists as
// `null`, so every list field tolerates `null` as empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Default prefix marking a command-schema broadcast.
pub const COMMANDS_TRIGGER_PREFIX: &str = "[PROXY_SYSTEM][COMMANDS]=";

/// Semantic type tag of a schema node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandType {
    Literal,
    #[default]
    String,
    Int,
    Float,
    Location,
    Boolean,
    Player,
    Target,
    Array,
    Duration,
    PlayerName,
    /// Any tag this build does not know; typed as a string argument.
    #[serde(other)]
    Unknown,
}

/// One node of a command tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandNode {
    pub base_command: String,
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub aliases: Vec<String>,
    #[serde(rename = "type")]
    pub kind: CommandType,
    /// Options of an `array` node.
    #[serde(deserialize_with = "null_as_empty")]
    pub allowed_type_values: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub children: Vec<CommandNode>,
    pub can_be_called: bool,
    pub requires_op: bool,
    /// Name of the enclosing argument, used to keep array enums apart.
    pub parent: String,
    pub depth: u32,
    /// Array options change at runtime (soft enum).
    pub dynamic: bool,
}

impl CommandNode {
    pub fn new(name: impl Into<String>, kind: CommandType) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<CommandNode>) -> Self {
        self.children = children;
        self
    }
}

/// Root command name → tree. Ordered so synthesis output is deterministic.
pub type CommandSchema = BTreeMap<String, CommandNode>;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("message is not a rawtext document: {0}")]
    RawText(#[source] serde_json::Error),
    #[error("malformed command schema: {0}")]
    Schema(#[source] serde_json::Error),
    #[error("enum table overflow: more than {max} entries")]
    EnumOverflow { max: u32 },
}

#[derive(Deserialize)]
struct RawTextMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    rawtext: Vec<RawTextEntry>,
}

#[derive(Deserialize)]
struct RawTextEntry {
    #[serde(default)]
    text: String,
}

/// Extract the command schema from an object text message.
///
/// `Ok(None)` means the message is an ordinary rawtext broadcast that should
/// be forwarded. A message that is not rawtext JSON, or whose payload after
/// `prefix` is not a schema, is an error.
pub fn parse_trigger(message: &str, prefix: &str) -> Result<Option<CommandSchema>, SchemaError> {
    let doc: RawTextMessage = serde_json::from_str(message).map_err(SchemaError::RawText)?;
    let Some(first) = doc.rawtext.first() else {
        return Ok(None);
    };
    let Some(payload) = first.text.strip_prefix(prefix) else {
        return Ok(None);
    };
    serde_json::from_str(payload)
        .map(Some)
        .map_err(SchemaError::Schema)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rawtext(text: &str) -> String {
        serde_json::json!({ "rawtext": [{ "text": text }] }).to_string()
    }

    #[test]
    fn parses_camel_case_nodes() {
        let schema: CommandSchema = serde_json::from_str(
            r#"{"home":{"name":"home","type":"literal","requiresOp":true,
                "aliases":["h"],"children":[
                  {"name":"target","type":"playerName","children":null,"parent":"home","depth":1}
                ]}}"#,
        )
        .unwrap();
        let home = &schema["home"];
        assert!(home.requires_op);
        assert_eq!(home.aliases, vec!["h"]);
        assert_eq!(home.children[0].kind, CommandType::PlayerName);
        assert!(home.children[0].children.is_empty());
        assert_eq!(home.children[0].parent, "home");
    }

    #[test]
    fn unknown_type_tag_is_tolerated() {
        let node: CommandNode =
            serde_json::from_str(r#"{"name":"x","type":"blockState"}"#).unwrap();
        assert_eq!(node.kind, CommandType::Unknown);
    }

    #[test]
    fn trigger_with_prefix_yields_schema() {
        let msg = rawtext(&format!(
            "{COMMANDS_TRIGGER_PREFIX}{}",
            r#"{"spawn":{"name":"spawn","type":"literal","children":[]}}"#
        ));
        let schema = parse_trigger(&msg, COMMANDS_TRIGGER_PREFIX)
            .unwrap()
            .unwrap();
        assert!(schema.contains_key("spawn"));
    }

    #[test]
    fn ordinary_rawtext_is_not_a_trigger() {
        let msg = rawtext("§aWelcome back!");
        assert!(parse_trigger(&msg, COMMANDS_TRIGGER_PREFIX).unwrap().is_none());

        let empty = r#"{"rawtext":[]}"#;
        assert!(parse_trigger(empty, COMMANDS_TRIGGER_PREFIX).unwrap().is_none());
    }

    #[test]
    fn non_json_message_is_rawtext_error() {
        let err = parse_trigger("plain chat", COMMANDS_TRIGGER_PREFIX).unwrap_err();
        assert!(matches!(err, SchemaError::RawText(_)));
    }

    #[test]
    fn broken_schema_is_schema_error() {
        let msg = rawtext(&format!("{COMMANDS_TRIGGER_PREFIX}{{\"warp\":"));
        let err = parse_trigger(&msg, COMMANDS_TRIGGER_PREFIX).unwrap_err();
        assert!(matches!(err, SchemaError::Schema(_)));
    }
}
