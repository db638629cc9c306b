//! Cache & Index (C1) — per-file cache, global symbol index, name index.
//!
//! Indices are read-mostly; writes are serialized per file via `DashMap`'s
//! per-shard locking, so read paths never block on concurrent writes to
//! *other* files.

use crate::model::{CachedFileInfo, Symbol};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Process-wide cache and symbol/name indices.
///
/// Cheaply cloneable: internally `Arc`-backed, so every worker and handler
/// holding a `CacheIndex` shares the same underlying shards.
#[derive(Clone, Default)]
pub struct CacheIndex {
    files: Arc<DashMap<String, CachedFileInfo>>,
    /// `{fileRelPath}:{symbolName}` -> symbol entity.
    symbol_index: Arc<DashMap<String, Symbol>>,
    /// bare symbol name -> candidate symbol map keys.
    name_index: Arc<DashMap<String, HashSet<String>>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_rel: &str) -> Option<CachedFileInfo> {
        self.files.get(file_rel).map(|r| r.clone())
    }

    pub fn contains(&self, file_rel: &str) -> bool {
        self.files.contains_key(file_rel)
    }

    /// Replace the cache entry for a file and refresh its index entries.
    /// Invalidates stale entries for the file first, so renamed/removed
    /// symbols don't linger in the name index.
    pub fn put(&self, file_rel: &str, info: CachedFileInfo) {
        self.invalidate_file(file_rel);
        self.add_symbols_for_file(file_rel, info.symbol_map.values().cloned());
        self.files.insert(file_rel.to_string(), info);
    }

    /// Remove all index entries for a file before re-indexing it, or when
    /// the file is deleted.
    pub fn invalidate_file(&self, file_rel: &str) {
        if let Some((_, old)) = self.files.remove(file_rel) {
            for key in old.symbol_map.keys() {
                self.symbol_index.remove(key);
            }
            for name in old.symbol_map.values().map(|s| s.name.clone()) {
                if let Some(mut set) = self.name_index.get_mut(&name) {
                    let key_prefix = format!("{file_rel}:{name}");
                    set.remove(&key_prefix);
                }
            }
        }
    }

    pub fn add_symbols_for_file(&self, file_rel: &str, symbols: impl IntoIterator<Item = Symbol>) {
        for symbol in symbols {
            let key = symbol.symbol_map_key();
            self.name_index
                .entry(symbol.name.clone())
                .or_default()
                .insert(key.clone());
            self.symbol_index.insert(key, symbol);
            let _ = file_rel;
        }
    }

    /// Concretize a `fileSymbol` ref: exact lookup by `{file}:{name}`.
    pub fn lookup_file_symbol(&self, file: &str, name: &str) -> Option<Symbol> {
        self.symbol_index
            .get(&format!("{file}:{name}"))
            .map(|r| r.clone())
    }

    /// Resolve an `external` ref: exactly one candidate under the bare name
    /// index concretizes; more than one stays external with a candidate
    /// count.
    pub fn resolve_by_name(&self, name: &str) -> NameResolution {
        match self.name_index.get(name) {
            None => NameResolution::NoCandidates,
            Some(keys) if keys.len() == 1 => {
                let key = keys.iter().next().unwrap().clone();
                match self.symbol_index.get(&key) {
                    Some(sym) => NameResolution::Unique(sym.clone()),
                    None => NameResolution::NoCandidates,
                }
            }
            Some(keys) => NameResolution::Ambiguous(keys.len()),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn clear(&self) {
        self.files.clear();
        self.symbol_index.clear();
        self.name_index.clear();
    }
}

#[derive(Debug, Clone)]
pub enum NameResolution {
    NoCandidates,
    Unique(Symbol),
    Ambiguous(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::SymbolDetail;
    use crate::types::{SymbolKind, Visibility};

    fn symbol(file: &str, name: &str) -> Symbol {
        Symbol::new(
            file.to_string(),
            name.to_string(),
            SymbolKind::Class,
            format!("class {name}"),
            Visibility::Public,
            true,
            false,
            None,
            SymbolDetail::Class {
                extends: None,
                implements: vec![],
                methods: vec![],
                properties: vec![],
                is_abstract: false,
            },
        )
    }

    #[test]
    fn unique_name_resolves() {
        let cache = CacheIndex::new();
        cache.add_symbols_for_file("src/a.ts", vec![symbol("src/a.ts", "A")]);
        match cache.resolve_by_name("A") {
            NameResolution::Unique(s) => assert_eq!(s.name, "A"),
            other => panic!("expected unique resolution, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_name_is_ambiguous() {
        let cache = CacheIndex::new();
        cache.add_symbols_for_file("src/a.ts", vec![symbol("src/a.ts", "Dup")]);
        cache.add_symbols_for_file("src/b.ts", vec![symbol("src/b.ts", "Dup")]);
        match cache.resolve_by_name("Dup") {
            NameResolution::Ambiguous(n) => assert_eq!(n, 2),
            other => panic!("expected ambiguous resolution, got {other:?}"),
        }
    }

    #[test]
    fn invalidate_removes_stale_index_entries() {
        let cache = CacheIndex::new();
        let info = CachedFileInfo::new(
            "src/a.ts".into(),
            "h1".into(),
            vec![symbol("src/a.ts", "A")],
            vec![],
        );
        cache.put("src/a.ts", info);
        assert!(matches!(
            cache.resolve_by_name("A"),
            NameResolution::Unique(_)
        ));
        cache.invalidate_file("src/a.ts");
        assert!(matches!(
            cache.resolve_by_name("A"),
            NameResolution::NoCandidates
        ));
        assert!(!cache.contains("src/a.ts"));
    }
}
