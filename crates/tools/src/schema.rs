// SPDX-License-Identifier: MIT

//! Compiled JSON Schema cache, keyed by the SHA-256 hash of the schema
//! document so repeated calls against the same manifest reuse a compiled
//! validator instead of recompiling on every tool invocation.

use indexmap::IndexMap;
use jsonschema::Validator;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Bounded, LRU-evicted cache of compiled validators.
pub struct SchemaCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, std::sync::Arc<Validator>>>,
}

impl SchemaCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(IndexMap::new()) }
    }

    /// Validates `instance` against `schema`, compiling and caching the
    /// validator on first use. Returns the list of validation error
    /// messages (empty means valid).
    pub fn validate(&self, schema: &Value, instance: &Value) -> Vec<String> {
        let key = hash_schema(schema);
        let validator = self.get_or_compile(&key, schema);
        match validator {
            Some(validator) => validator.iter_errors(instance).map(|e| e.to_string()).collect(),
            None => vec!["schema failed to compile".to_string()],
        }
    }

    fn get_or_compile(&self, key: &str, schema: &Value) -> Option<std::sync::Arc<Validator>> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.shift_remove(key) {
            entries.insert(key.to_string(), existing.clone());
            return Some(existing);
        }
        let compiled = jsonschema::validator_for(schema).ok()?;
        let compiled = std::sync::Arc::new(compiled);
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(key.to_string(), compiled.clone());
        Some(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_schema(schema: &Value) -> String {
    let bytes = serde_json::to_vec(schema).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
