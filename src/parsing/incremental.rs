//! Incremental Parser (C2) — the `parseFile` contract.
//!
//! Three paths: cache hit (O(1), empty delta), full parse (no cached entry),
//! and delta (set-diff against the cached record). Never holds a parse tree
//! beyond this call.

use crate::cache::{CacheIndex, NameResolution};
use crate::model::entity::short_hash;
use crate::model::{
    CachedFileInfo, DirectoryEntity, Entity, FileEntity, Relationship, Symbol, ToRef,
};
use crate::parsing::export_map::ExportMap;
use crate::parsing::stoplist::StopList;
use crate::parsing::typescript::{self, ParseIssue, Severity};
use crate::resolution::{scaled_cap, TypeResolutionBudget, DEFAULT_CAP};
use crate::types::{EntityId, RelationKind};
use std::collections::{HashMap, HashSet};

/// Result of one `parse_file` call.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub errors: Vec<ParseIssue>,
    pub is_incremental: bool,
    pub added_entities: Vec<EntityId>,
    pub removed_entities: Vec<EntityId>,
    pub updated_entities: Vec<EntityId>,
    pub added_relationships: Vec<String>,
    pub removed_relationships: Vec<String>,
}

impl ParseResult {
    fn empty_incremental() -> Self {
        Self {
            is_incremental: true,
            ..Default::default()
        }
    }

    fn has_changes(&self) -> bool {
        !self.added_entities.is_empty()
            || !self.removed_entities.is_empty()
            || !self.updated_entities.is_empty()
            || !self.added_relationships.is_empty()
            || !self.removed_relationships.is_empty()
    }
}

/// Whether directory entities are synthesized along the path to a file.
/// Inclusion is configurable per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub emit_directory_entities: bool,
}

/// Read a file's current content, returning `None` to signal a missing file
/// (the deletion path). Abstracted so tests can supply in-memory sources
/// without touching a real filesystem.
pub trait FileSource {
    fn read(&self, file_rel: &str) -> std::io::Result<Option<String>>;
}

/// Reads files relative to a workspace root on the real filesystem.
pub struct FsFileSource {
    root: std::path::PathBuf,
}

impl FsFileSource {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSource for FsFileSource {
    fn read(&self, file_rel: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.root.join(file_rel)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Parse (or re-parse) one file, diffing against the cache.
///
/// The type-resolution budget (C3) is constructed here, scaled to this
/// file's size and a text-based complexity estimate, rather than shared
/// across files — a large, branch-heavy file earns more semantic-lookup
/// tokens than a small one.
pub fn parse_file(
    file_rel: &str,
    source: &dyn FileSource,
    cache: &CacheIndex,
    export_map: &mut ExportMap,
    stoplist: &StopList,
    opts: ParseOptions,
) -> ParseResult {
    let file_rel = file_rel.replace('\\', "/");
    let content = match source.read(&file_rel) {
        Ok(Some(c)) => c,
        Ok(None) => return handle_deletion(&file_rel, cache),
        Err(e) => {
            return ParseResult {
                errors: vec![ParseIssue {
                    severity: Severity::Error,
                    message: format!("failed to read '{file_rel}': {e}"),
                }],
                ..Default::default()
            };
        }
    };

    let content_hash = short_hash(content.as_bytes());

    if let Some(cached) = cache.get(&file_rel) {
        if cached.content_hash == content_hash {
            return ParseResult::empty_incremental();
        }
    }

    let cap = scaled_cap(DEFAULT_CAP, content.len() as u64, estimate_text_complexity(&content));
    let budget = TypeResolutionBudget::new(cap);

    let extracted = typescript::extract(&file_rel, &content, stoplist, &budget, cache);
    export_map.set_file_imports(&file_rel, extracted.imports.clone());

    let file_entity = FileEntity {
        id: FileEntity::compute_id(&file_rel),
        path: file_rel.clone(),
        extension: file_rel.rsplit_once('.').map(|(_, e)| e.to_string()).unwrap_or_default(),
        size: content.len() as u64,
        line_count: content.lines().count() as u32,
        language: "typescript".to_string(),
        dependencies: extracted.imports.iter().map(|i| i.source.clone()).collect(),
        is_test: file_rel.contains(".test.") || file_rel.contains(".spec.") || file_rel.contains("__tests__"),
        is_config: file_rel.ends_with(".config.ts") || file_rel.ends_with("tsconfig.json"),
        hash: content_hash.clone(),
    };

    let mut entities: Vec<Entity> = Vec::with_capacity(extracted.symbols.len() + 1);
    let mut relationships = extracted.relationships.clone();

    for symbol in &extracted.symbols {
        relationships.push(Relationship::new(
            RelationKind::Contains,
            file_entity.id.clone(),
            ToRef::Entity { id: symbol.id.clone() },
            1.0,
        ));
    }

    if opts.emit_directory_entities {
        let (dir_entities, dir_rels) = synthesize_directory_chain(&file_rel, &file_entity.id);
        entities.extend(dir_entities.into_iter().map(Entity::Directory));
        relationships.extend(dir_rels);
    }

    entities.push(Entity::File(file_entity.clone()));
    entities.extend(extracted.symbols.iter().cloned().map(Entity::Symbol));

    let new_cached = CachedFileInfo::new(
        file_rel.clone(),
        content_hash,
        extracted.symbols.clone(),
        relationships.clone(),
    );

    let result = match cache.get(&file_rel) {
        None => full_parse_result(entities, relationships, extracted.issues, &new_cached),
        Some(old_cached) => {
            diff_against_cache(&old_cached, &new_cached, entities, relationships, extracted.issues)
        }
    };

    cache.put(&file_rel, new_cached);
    result
}

fn full_parse_result(
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    errors: Vec<ParseIssue>,
    new_cached: &CachedFileInfo,
) -> ParseResult {
    ParseResult {
        added_entities: new_cached.entity_ids.clone(),
        added_relationships: new_cached.relationship_keys.clone(),
        entities,
        relationships,
        errors,
        is_incremental: false,
        removed_entities: Vec::new(),
        updated_entities: Vec::new(),
        removed_relationships: Vec::new(),
    }
}

/// Entity/relationship diff: bucket symbols by symbol map key, compare
/// signature hashes; compare relationship canonical keys textually.
fn diff_against_cache(
    old: &CachedFileInfo,
    new: &CachedFileInfo,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    errors: Vec<ParseIssue>,
) -> ParseResult {
    let mut added_entities = Vec::new();
    let mut updated_entities = Vec::new();
    let mut removed_entities = Vec::new();

    for (key, new_symbol) in &new.symbol_map {
        match old.symbol_map.get(key) {
            None => added_entities.push(new_symbol.id.clone()),
            Some(old_symbol) if old_symbol.hash != new_symbol.hash => {
                updated_entities.push(new_symbol.id.clone())
            }
            Some(_) => {}
        }
    }
    for (key, old_symbol) in &old.symbol_map {
        if !new.symbol_map.contains_key(key) {
            removed_entities.push(old_symbol.id.clone());
        }
    }

    let old_keys: HashSet<&str> = old.relationship_keys.iter().map(String::as_str).collect();
    let new_keys: HashSet<&str> = new.relationship_keys.iter().map(String::as_str).collect();

    let added_relationships: Vec<String> = new_keys
        .difference(&old_keys)
        .map(|s| s.to_string())
        .collect();
    let removed_relationships: Vec<String> = old_keys
        .difference(&new_keys)
        .map(|s| s.to_string())
        .collect();

    ParseResult {
        entities,
        relationships,
        errors,
        is_incremental: true,
        added_entities,
        removed_entities,
        updated_entities,
        added_relationships,
        removed_relationships,
    }
}

/// Deletion path: a missing file surfaces removedEntities and
/// removedRelationships sourced from the cached record, then purges the
/// cache/indices for it.
fn handle_deletion(file_rel: &str, cache: &CacheIndex) -> ParseResult {
    let Some(cached) = cache.get(file_rel) else {
        return ParseResult {
            errors: vec![ParseIssue {
                severity: Severity::Warning,
                message: format!("'{file_rel}' missing and not cached; nothing to remove"),
            }],
            ..Default::default()
        };
    };

    let removed_entities = cached.entity_ids.clone();
    let removed_relationships = cached.relationship_keys.clone();
    cache.invalidate_file(file_rel);

    ParseResult {
        is_incremental: true,
        removed_entities,
        removed_relationships,
        errors: vec![ParseIssue {
            severity: Severity::Warning,
            message: format!("'{file_rel}' no longer exists"),
        }],
        ..Default::default()
    }
}

/// Build the directory-entity chain from the shallowest ancestor to the
/// file's immediate parent, each CONTAINS-linked to the next, terminating
/// in a CONTAINS edge from the deepest directory to the file.
fn synthesize_directory_chain(
    file_rel: &str,
    file_id: &EntityId,
) -> (Vec<DirectoryEntity>, Vec<Relationship>) {
    let Some((dir_path, _)) = file_rel.rsplit_once('/') else {
        return (Vec::new(), Vec::new());
    };

    let segments: Vec<&str> = dir_path.split('/').filter(|s| !s.is_empty()).collect();
    let mut entities = Vec::with_capacity(segments.len());
    let mut relationships = Vec::with_capacity(segments.len());
    let mut path_so_far = String::new();
    let mut prev_id: Option<EntityId> = None;

    for (depth, segment) in segments.iter().enumerate() {
        if !path_so_far.is_empty() {
            path_so_far.push('/');
        }
        path_so_far.push_str(segment);
        let id = DirectoryEntity::compute_id(&path_so_far);

        if let Some(parent) = &prev_id {
            relationships.push(Relationship::new(
                RelationKind::Contains,
                parent.clone(),
                ToRef::Entity { id: id.clone() },
                1.0,
            ));
        }

        entities.push(DirectoryEntity {
            id: id.clone(),
            path: path_so_far.clone(),
            depth: depth as u32,
            children: Vec::new(),
        });
        prev_id = Some(id);
    }

    if let Some(deepest) = prev_id {
        relationships.push(Relationship::new(
            RelationKind::Contains,
            deepest,
            ToRef::Entity { id: file_id.clone() },
            1.0,
        ));
    }

    (entities, relationships)
}

/// Rough complexity proxy computed from raw source text, ahead of
/// tree-sitter parsing, to scale the per-file type-resolution budget before
/// `typescript::extract` runs.
fn estimate_text_complexity(content: &str) -> u32 {
    const BRANCH_MARKERS: &[&str] = &["if (", "if(", "for (", "for(", "while (", "while(", "switch (", "switch(", "catch (", "catch("];
    BRANCH_MARKERS.iter().map(|m| content.matches(m).count() as u32).sum()
}

/// Resolver sweep (C2.a + C1): rewrite any `FileSymbol`/`Placeholder` target
/// still unresolved after extraction, now that the name index and export map
/// may know more than they did when the relationship was first emitted.
/// Called by the parse handler after `parse_file` returns, so it also picks
/// up symbols from files parsed earlier in the same run.
pub fn concretize_pending(relationships: &mut [Relationship], cache: &CacheIndex, export_map: &mut ExportMap) {
    for rel in relationships.iter_mut() {
        let Some(to_ref) = rel.to_ref.clone() else { continue };
        match to_ref {
            ToRef::FileSymbol { file, name } => {
                if let Some(symbol) = cache.lookup_file_symbol(&file, &name) {
                    rel.concretize(symbol.id);
                } else if let Some(resolved) = export_map.resolve(&file, &name) {
                    if let Some(symbol) = cache.lookup_file_symbol(&resolved.origin_file, &resolved.origin_name) {
                        rel.concretize(symbol.id);
                    }
                }
            }
            ToRef::Placeholder { name, .. } => {
                if let NameResolution::Unique(symbol) = cache.resolve_by_name(&name) {
                    rel.concretize(symbol.id);
                }
            }
            ToRef::Entity { .. } | ToRef::External { .. } => {}
        }
    }
}

/// Records how many times a symbol map key appeared across a full batch, a
/// helper for the name index's ambiguity metadata when two files declare a
/// same-named top-level symbol.
pub fn tally_name_collisions(symbols: &[Symbol]) -> HashMap<String, u32> {
    let mut tally = HashMap::new();
    for symbol in symbols {
        *tally.entry(symbol.name.clone()).or_insert(0u32) += 1;
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;

    struct MemorySource {
        files: RefCell<StdHashMap<String, String>>,
    }

    impl MemorySource {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: RefCell::new(
                    files.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                ),
            }
        }

        fn remove(&self, key: &str) {
            self.files.borrow_mut().remove(key);
        }

        fn set(&self, key: &str, value: &str) {
            self.files.borrow_mut().insert(key.to_string(), value.to_string());
        }
    }

    impl FileSource for MemorySource {
        fn read(&self, file_rel: &str) -> std::io::Result<Option<String>> {
            Ok(self.files.borrow().get(file_rel).cloned())
        }
    }

    #[test]
    fn first_parse_is_full_parse_with_everything_added() {
        let cache = CacheIndex::new();
        let mut export_map = ExportMap::new();
        let stoplist = StopList::default();
        let source = MemorySource::new(&[("src/a.ts", "export class A {}\n")]);

        let result = parse_file(
            "src/a.ts",
            &source,
            &cache,
            &mut export_map,
            &stoplist,
            ParseOptions::default(),
        );

        assert!(!result.is_incremental);
        assert!(result.added_entities.len() >= 2); // file + class
        assert!(result.removed_entities.is_empty());
    }

    #[test]
    fn unchanged_content_is_a_cache_hit() {
        let cache = CacheIndex::new();
        let mut export_map = ExportMap::new();
        let stoplist = StopList::default();
        let source = MemorySource::new(&[("src/a.ts", "export class A {}\n")]);

        parse_file("src/a.ts", &source, &cache, &mut export_map, &stoplist, ParseOptions::default());
        let second = parse_file(
            "src/a.ts",
            &source,
            &cache,
            &mut export_map,
            &stoplist,
            ParseOptions::default(),
        );

        assert!(second.is_incremental);
        assert!(!second.has_changes());
    }

    #[test]
    fn changed_content_yields_updated_entity() {
        let cache = CacheIndex::new();
        let mut export_map = ExportMap::new();
        let stoplist = StopList::default();
        let source = MemorySource::new(&[("src/a.ts", "export class A {}\n")]);

        parse_file("src/a.ts", &source, &cache, &mut export_map, &stoplist, ParseOptions::default());
        source.set("src/a.ts", "export class A extends B {}\n");
        let second = parse_file(
            "src/a.ts",
            &source,
            &cache,
            &mut export_map,
            &stoplist,
            ParseOptions::default(),
        );

        assert!(second.is_incremental);
        assert!(!second.updated_entities.is_empty());
        assert!(!second.added_relationships.is_empty());
    }

    #[test]
    fn deleted_file_removes_cached_entities_and_purges_cache() {
        let cache = CacheIndex::new();
        let mut export_map = ExportMap::new();
        let stoplist = StopList::default();
        let source = MemorySource::new(&[("src/a.ts", "export class A {}\n")]);

        parse_file("src/a.ts", &source, &cache, &mut export_map, &stoplist, ParseOptions::default());
        source.remove("src/a.ts");
        let result = parse_file(
            "src/a.ts",
            &source,
            &cache,
            &mut export_map,
            &stoplist,
            ParseOptions::default(),
        );

        assert!(!result.removed_entities.is_empty());
        assert!(!cache.contains("src/a.ts"));
    }

    #[test]
    fn directory_chain_is_opt_in() {
        let cache = CacheIndex::new();
        let mut export_map = ExportMap::new();
        let stoplist = StopList::default();
        let source = MemorySource::new(&[("src/nested/a.ts", "export class A {}\n")]);

        let result = parse_file(
            "src/nested/a.ts",
            &source,
            &cache,
            &mut export_map,
            &stoplist,
            ParseOptions {
                emit_directory_entities: true,
            },
        );

        assert!(result
            .entities
            .iter()
            .any(|e| matches!(e, Entity::Directory(_))));
    }

    #[test]
    fn concretize_pending_resolves_placeholder_once_target_is_indexed() {
        let cache = CacheIndex::new();
        let mut export_map = ExportMap::new();
        let stoplist = StopList::default();

        let a = MemorySource::new(&[("src/a.ts", "export class A extends B {}\n")]);
        let first = parse_file("src/a.ts", &a, &cache, &mut export_map, &stoplist, ParseOptions::default());
        let mut relationships = first.relationships;
        assert!(relationships
            .iter()
            .any(|r| matches!(r.to_ref, Some(ToRef::Placeholder { .. }))));

        let b = MemorySource::new(&[("src/b.ts", "export class B {}\n")]);
        parse_file("src/b.ts", &b, &cache, &mut export_map, &stoplist, ParseOptions::default());

        concretize_pending(&mut relationships, &cache, &mut export_map);
        let extends = relationships
            .iter()
            .find(|r| r.r#type == RelationKind::Extends)
            .expect("expected an EXTENDS relationship");
        assert!(matches!(extends.to_ref, Some(ToRef::Entity { .. })));
    }
}
