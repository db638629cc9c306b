//! Re-export resolution (C2.a) — follows `export * from` / `export { x as
//! y } from` chains so a placeholder created in file A can concretize to
//! the symbol actually defined in file C, several re-exports away.
//!
//! Built lazily per module root and memoized: chain depth is bounded so a
//! cyclic re-export graph cannot spin the resolver.

use crate::parsing::typescript::ImportStatement;
use std::collections::HashMap;

pub const MAX_CHAIN_DEPTH: u32 = 8;

/// Where an exported name ultimately resolves to, after following re-export
/// chains, or `None` if the chain exceeded [`MAX_CHAIN_DEPTH`] or dead-ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExport {
    pub origin_file: String,
    pub origin_name: String,
    pub depth: u32,
}

/// One file's import/re-export statements, keyed by file path, forming the
/// edges the chain-follower walks.
#[derive(Debug, Default)]
pub struct ExportMap {
    by_file: HashMap<String, Vec<ImportStatement>>,
    memo: HashMap<(String, String), Option<ResolvedExport>>,
}

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a file's import/re-export edges, invalidating any memoized
    /// resolution that passed through it.
    pub fn set_file_imports(&mut self, file_rel: &str, imports: Vec<ImportStatement>) {
        self.by_file.insert(file_rel.to_string(), imports);
        // Conservative invalidation: a changed file's edges could affect any
        // chain passing through it, and reverse edges aren't tracked.
        self.memo.clear();
    }

    pub fn remove_file(&mut self, file_rel: &str) {
        self.by_file.remove(file_rel);
        self.memo.clear();
    }

    /// Resolve `name` as exported from `file_rel`, following `export *
    /// from` and aliased `export { a as b } from` chains up to
    /// [`MAX_CHAIN_DEPTH`] hops. Memoizes the result.
    pub fn resolve(&mut self, file_rel: &str, name: &str) -> Option<ResolvedExport> {
        let key = (file_rel.to_string(), name.to_string());
        if let Some(cached) = self.memo.get(&key) {
            return cached.clone();
        }
        let resolved = self.resolve_uncached(file_rel, name, 0);
        self.memo.insert(key, resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, file_rel: &str, name: &str, depth: u32) -> Option<ResolvedExport> {
        if depth >= MAX_CHAIN_DEPTH {
            return None;
        }
        let imports = self.by_file.get(file_rel)?;

        for import in imports {
            if !import.is_re_export {
                continue;
            }
            let matches_name = import
                .imported_name
                .as_deref()
                .map(|n| n == name)
                .unwrap_or(false)
                || import.local_alias == name;
            if !matches_name {
                continue;
            }
            let upstream_name = import.imported_name.as_deref().unwrap_or(name);
            let origin = resolve_relative(file_rel, &import.source);

            return match self.resolve_uncached(&origin, upstream_name, depth + 1) {
                Some(deeper) => Some(deeper),
                None => Some(ResolvedExport {
                    origin_file: origin,
                    origin_name: upstream_name.to_string(),
                    depth: depth + 1,
                }),
            };
        }
        None
    }
}

/// Resolve a TypeScript-style relative import specifier against the
/// importing file's directory. Non-relative specifiers (bare package
/// names) pass through unchanged; those are left external rather than
/// followed into `node_modules`.
fn resolve_relative(from_file: &str, specifier: &str) -> String {
    if !specifier.starts_with('.') {
        return specifier.to_string();
    }
    let base_dir = from_file.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();

    for part in specifier.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if joined.ends_with(".ts") || joined.ends_with(".tsx") {
        joined
    } else {
        format!("{joined}.ts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re_export(source: &str, imported: &str, alias: &str) -> ImportStatement {
        ImportStatement {
            source: source.to_string(),
            imported_name: Some(imported.to_string()),
            local_alias: alias.to_string(),
            is_namespace: false,
            is_re_export: true,
        }
    }

    #[test]
    fn follows_single_hop_re_export() {
        let mut map = ExportMap::new();
        map.set_file_imports("src/index.ts", vec![re_export("./widget", "Widget", "Widget")]);

        let resolved = map.resolve("src/index.ts", "Widget").expect("should resolve");
        assert_eq!(resolved.origin_file, "src/widget.ts");
        assert_eq!(resolved.origin_name, "Widget");
        assert_eq!(resolved.depth, 1);
    }

    #[test]
    fn follows_multi_hop_aliased_chain() {
        let mut map = ExportMap::new();
        map.set_file_imports(
            "src/index.ts",
            vec![re_export("./mid", "Mid", "Public")],
        );
        map.set_file_imports(
            "src/mid.ts",
            vec![re_export("./impl", "Impl", "Mid")],
        );

        let resolved = map.resolve("src/index.ts", "Public").expect("should resolve");
        assert_eq!(resolved.origin_file, "src/impl.ts");
        assert_eq!(resolved.origin_name, "Impl");
        assert_eq!(resolved.depth, 2);
    }

    #[test]
    fn missing_chain_member_stops_at_last_known_hop() {
        let mut map = ExportMap::new();
        map.set_file_imports("src/index.ts", vec![re_export("./gone", "X", "X")]);
        let resolved = map.resolve("src/index.ts", "X").expect("should resolve to last hop");
        assert_eq!(resolved.origin_file, "src/gone.ts");
        assert_eq!(resolved.depth, 1);
    }

    #[test]
    fn unrelated_name_does_not_resolve() {
        let mut map = ExportMap::new();
        map.set_file_imports("src/index.ts", vec![re_export("./widget", "Widget", "Widget")]);
        assert!(map.resolve("src/index.ts", "Other").is_none());
    }
}
