// Interning pools for enum definitions and enum option strings.
//
// `EnumPool` assigns indices to enums by derivation key. Keys compare
// case-insensitively; the first occurrence of a key fixes its options and
// every later reference reuses the same index. `ValuePool` does the same for
// individual option strings so the wire value table holds each string once.
//
// Indices are local to one synthesis run and must fit the 16-bit enum index
// field of a parameter type.

use std::collections::HashMap;

use hearth_protocol::commands::ENUM_INDEX_MASK;

use crate::schema::SchemaError;

/// An interned enum: its lower-cased key and lower-cased options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PooledEnum {
    pub key: String,
    pub options: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EnumPool {
    by_key: HashMap<String, u32>,
    entries: Vec<PooledEnum>,
}

impl EnumPool {
    /// Index of the enum with `key`, allocating it with `options` on first use.
    pub fn intern(&mut self, key: &str, options: &[String]) -> Result<u32, SchemaError> {
        let key = key.to_lowercase();
        if let Some(&index) = self.by_key.get(&key) {
            return Ok(index);
        }
        let index = next_index(self.entries.len())?;
        self.entries.push(PooledEnum {
            key: key.clone(),
            options: options.iter().map(|o| o.to_lowercase()).collect(),
        });
        self.by_key.insert(key, index);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PooledEnum] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PooledEnum> {
        self.entries
    }
}

/// Deduplicated option strings, in first-seen order.
#[derive(Debug, Default)]
pub struct ValuePool {
    by_value: HashMap<String, u32>,
    values: Vec<String>,
}

impl ValuePool {
    /// Seed the pool with an existing value table, keeping its indices.
    /// Duplicate entries resolve to their first position.
    pub fn from_values(values: Vec<String>) -> Self {
        let mut by_value = HashMap::with_capacity(values.len());
        for (i, v) in values.iter().enumerate() {
            by_value.entry(v.to_lowercase()).or_insert(i as u32);
        }
        Self { by_value, values }
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        let value = value.to_lowercase();
        if let Some(&index) = self.by_value.get(&value) {
            return index;
        }
        let index = self.values.len() as u32;
        self.values.push(value.clone());
        self.by_value.insert(value, index);
        index
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

/// Index for the entry appended after `len` existing ones, if it still fits
/// the 16-bit index field.
pub(crate) fn next_index(len: usize) -> Result<u32, SchemaError> {
    match u32::try_from(len) {
        Ok(index) if index <= ENUM_INDEX_MASK => Ok(index),
        _ => Err(SchemaError::EnumOverflow {
            max: ENUM_INDEX_MASK + 1,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn same_key_any_case_reuses_index() {
        let mut pool = EnumPool::default();
        let a = pool.intern("Warp_f0", &opts(&["Warp"])).unwrap();
        let b = pool.intern("warp_F0", &opts(&["ignored"])).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.entries()[0].options, vec!["warp"]);
    }

    #[test]
    fn distinct_keys_get_sequential_indices() {
        let mut pool = EnumPool::default();
        assert_eq!(pool.intern("bool", &opts(&["true", "false"])).unwrap(), 0);
        assert_eq!(pool.intern("mode_f0", &opts(&["true", "false"])).unwrap(), 1);
    }

    #[test]
    fn value_pool_deduplicates_across_enums() {
        let mut values = ValuePool::default();
        assert_eq!(values.intern("true"), 0);
        assert_eq!(values.intern("false"), 1);
        assert_eq!(values.intern("TRUE"), 0);
        assert_eq!(values.into_values(), vec!["true", "false"]);
    }

    #[test]
    fn seeded_value_pool_keeps_native_positions() {
        let mut values = ValuePool::from_values(opts(&["gamemode", "survival", "survival"]));
        assert_eq!(values.intern("survival"), 1);
        assert_eq!(values.intern("creative"), 3);
    }

    #[test]
    fn index_overflow_is_reported() {
        assert_eq!(next_index(0xFFFF).unwrap(), 0xFFFF);
        assert!(matches!(
            next_index(0x1_0000),
            Err(SchemaError::EnumOverflow { .. })
        ));
    }
}
