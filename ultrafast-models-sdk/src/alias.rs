//! Resolves short model aliases (`"fast"`) to `provider:model` pairs. The
//! lookup map is an atomically-swapped snapshot so updates from a config
//! reload never block concurrent resolutions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderModel {
    pub provider: String,
    pub model: String,
}

/// Snapshot-based lookup: readers clone an `Arc` under a read lock (cheap,
/// never blocked by a concurrent reload) and consult it without holding
/// the lock; a reload swaps in a whole new map under a write lock.
pub struct AliasResolver {
    table: RwLock<Arc<HashMap<String, ProviderModel>>>,
}

impl AliasResolver {
    pub fn new(entries: HashMap<String, ProviderModel>) -> Self {
        Self {
            table: RwLock::new(Arc::new(entries)),
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Atomically replaces the entire lookup table; in-flight resolutions
    /// holding the previous snapshot are unaffected.
    pub fn reload(&self, entries: HashMap<String, ProviderModel>) {
        *self.table.write().unwrap() = Arc::new(entries);
    }

    /// Resolution is case-sensitive. An unknown alias is not an error: the
    /// raw string is returned unchanged so a later `provider:model` parse
    /// can still succeed or fail on its own.
    pub fn resolve<'a>(&self, name: &'a str) -> ResolvedAlias<'a> {
        let snapshot = self.table.read().unwrap().clone();
        match snapshot.get(name) {
            Some(pm) => ResolvedAlias::Alias(pm.clone()),
            None => ResolvedAlias::Passthrough(name),
        }
    }
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAlias<'a> {
    Alias(ProviderModel),
    Passthrough(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> HashMap<String, ProviderModel> {
        let mut m = HashMap::new();
        m.insert(
            "fast".to_string(),
            ProviderModel {
                provider: "groq".to_string(),
                model: "llama3-8b-8192".to_string(),
            },
        );
        m
    }

    #[test]
    fn resolves_known_alias() {
        let resolver = AliasResolver::new(entries());
        let resolved = resolver.resolve("fast");
        assert_eq!(
            resolved,
            ResolvedAlias::Alias(ProviderModel {
                provider: "groq".to_string(),
                model: "llama3-8b-8192".to_string(),
            })
        );
    }

    #[test]
    fn unknown_alias_passes_through_unchanged() {
        let resolver = AliasResolver::new(entries());
        assert_eq!(
            resolver.resolve("openai:gpt-4o"),
            ResolvedAlias::Passthrough("openai:gpt-4o")
        );
    }

    #[test]
    fn resolution_is_case_sensitive() {
        let resolver = AliasResolver::new(entries());
        assert_eq!(resolver.resolve("Fast"), ResolvedAlias::Passthrough("Fast"));
    }

    #[test]
    fn reload_swaps_table_atomically() {
        let resolver = AliasResolver::new(entries());
        let mut updated = HashMap::new();
        updated.insert(
            "fast".to_string(),
            ProviderModel {
                provider: "cerebras".to_string(),
                model: "llama3.1-8b".to_string(),
            },
        );
        resolver.reload(updated);
        match resolver.resolve("fast") {
            ResolvedAlias::Alias(pm) => assert_eq!(pm.provider, "cerebras"),
            ResolvedAlias::Passthrough(_) => panic!("expected alias hit"),
        }
    }
}
