// Item registry built from the upstream's game data.
//
// The server sends its item table once per dial inside `StartGame`. The
// registry keeps the most recent table, keyed by runtime (network) id, so
// handlers can look up the item a player is holding. Custom items carry a
// component document; an item is throwable when that document has a
// `minecraft:throwable` component.

use std::collections::HashMap;

use hearth_protocol::types::ItemEntry;
use parking_lot::RwLock;

const THROWABLE_COMPONENT: &str = "minecraft:throwable";

#[derive(Default)]
pub struct ItemRegistry {
    by_network_id: RwLock<HashMap<i32, ItemEntry>>,
}

impl ItemRegistry {
    /// Replace the registry contents with `items`.
    pub fn populate(&self, items: &[ItemEntry]) {
        let table = items
            .iter()
            .map(|item| (item.runtime_id, item.clone()))
            .collect();
        *self.by_network_id.write() = table;
    }

    pub fn get(&self, network_id: i32) -> Option<ItemEntry> {
        self.by_network_id.read().get(&network_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_network_id.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// False for unknown items and items without components.
    pub fn is_throwable(&self, network_id: i32) -> bool {
        self.by_network_id
            .read()
            .get(&network_id)
            .and_then(|item| item.components.as_ref())
            .and_then(|doc| doc.get("components"))
            .and_then(|components| components.as_object())
            .is_some_and(|components| components.contains_key(THROWABLE_COMPONENT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(name: &str, runtime_id: i32, components: Option<serde_json::Value>) -> ItemEntry {
        ItemEntry {
            name: name.into(),
            runtime_id,
            component_based: components.is_some(),
            components,
        }
    }

    #[test]
    fn throwable_requires_component() {
        let registry = ItemRegistry::default();
        registry.populate(&[
            entry("custom:grenade", 900, Some(json!({"components": {"minecraft:throwable": {}}}))),
            entry("custom:wand", 901, Some(json!({"components": {"minecraft:icon": "wand"}}))),
            entry("minecraft:stone", 1, None),
        ]);
        assert!(registry.is_throwable(900));
        assert!(!registry.is_throwable(901));
        assert!(!registry.is_throwable(1));
        assert!(!registry.is_throwable(12345));
    }

    #[test]
    fn populate_replaces_previous_table() {
        let registry = ItemRegistry::default();
        registry.populate(&[entry("a", 1, None), entry("b", 2, None)]);
        registry.populate(&[entry("c", 3, None)]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(1).is_none());
        assert_eq!(registry.get(3).unwrap().name, "c");
    }
}
