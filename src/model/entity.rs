//! `Entity` — polymorphic node in the code graph.

use crate::types::{EntityId, SymbolKind, Visibility};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A parameter in a function/method signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub r#type: Option<String>,
    pub optional: bool,
    pub default: Option<String>,
}

/// Kind-specific payload for a [`Symbol`] entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SymbolDetail {
    Function {
        parameters: Vec<Parameter>,
        return_type: Option<String>,
        is_async: bool,
        is_generator: bool,
        complexity: u32,
        call_sites: Vec<String>,
    },
    Class {
        extends: Option<String>,
        implements: Vec<String>,
        methods: Vec<String>,
        properties: Vec<String>,
        is_abstract: bool,
    },
    Interface {
        extends: Vec<String>,
        methods: Vec<String>,
        properties: Vec<String>,
    },
    TypeAlias {
        aliased_type: String,
        is_union: bool,
        is_intersection: bool,
    },
    Property,
    Variable,
}

/// A function, class, interface, type alias, property, or variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: EntityId,
    pub file_rel: String,
    pub name: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub visibility: Visibility,
    pub is_exported: bool,
    pub is_deprecated: bool,
    pub docstring: Option<String>,
    pub detail: SymbolDetail,
    /// Hash of `signature`, used for the entity/content-change diff (§4.2).
    pub hash: String,
}

impl Symbol {
    /// `sym:{file}#{name}@{short-hash(signature)}` — deterministic across
    /// runs and machines given the same name/signature/file.
    pub fn compute_id(file_rel: &str, name: &str, signature: &str) -> EntityId {
        let short_hash = short_hash(signature.as_bytes());
        EntityId::new(format!("sym:{file_rel}#{name}@{short_hash}"))
    }

    pub fn new(
        file_rel: String,
        name: String,
        kind: SymbolKind,
        signature: String,
        visibility: Visibility,
        is_exported: bool,
        is_deprecated: bool,
        docstring: Option<String>,
        detail: SymbolDetail,
    ) -> Self {
        let id = Self::compute_id(&file_rel, &name, &signature);
        let hash = short_hash(signature.as_bytes());
        Self {
            id,
            file_rel,
            name,
            kind,
            signature,
            visibility,
            is_exported,
            is_deprecated,
            docstring,
            detail,
            hash,
        }
    }

    /// Key into C1's global symbol index: `{fileRelPath}:{symbolName}`.
    pub fn symbol_map_key(&self) -> String {
        format!("{}:{}", self.file_rel, self.name)
    }
}

/// A source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntity {
    pub id: EntityId,
    pub path: String,
    pub extension: String,
    pub size: u64,
    pub line_count: u32,
    pub language: String,
    pub dependencies: Vec<String>,
    pub is_test: bool,
    pub is_config: bool,
    /// Content hash; drives the parse cache hit/miss decision (§4.2).
    pub hash: String,
}

impl FileEntity {
    pub fn compute_id(path_posix: &str) -> EntityId {
        EntityId::new(format!("file:{path_posix}"))
    }
}

/// A directory, emitted only when directory-entity inclusion is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntity {
    pub id: EntityId,
    pub path: String,
    pub depth: u32,
    pub children: Vec<EntityId>,
}

impl DirectoryEntity {
    pub fn compute_id(path_posix: &str) -> EntityId {
        EntityId::new(format!("dir:{path_posix}"))
    }
}

/// A logical package/module, e.g. derived from a `package.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntity {
    pub id: EntityId,
    pub name: String,
    pub version: Option<String>,
    pub entry_point: Option<String>,
    pub manifest: serde_json::Value,
}

impl ModuleEntity {
    pub fn compute_id(name: &str) -> EntityId {
        EntityId::new(format!("module:{name}"))
    }
}

/// Polymorphic entity variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "camelCase")]
pub enum Entity {
    File(FileEntity),
    Directory(DirectoryEntity),
    Module(ModuleEntity),
    Symbol(Symbol),
}

impl Entity {
    pub fn id(&self) -> &EntityId {
        match self {
            Entity::File(f) => &f.id,
            Entity::Directory(d) => &d.id,
            Entity::Module(m) => &m.id,
            Entity::Symbol(s) => &s.id,
        }
    }

    /// Content hash driving the change-detection invariant: "`hash` depends
    /// only on variant content".
    pub fn hash(&self) -> &str {
        match self {
            Entity::File(f) => &f.hash,
            Entity::Directory(_) => "",
            Entity::Module(_) => "",
            Entity::Symbol(s) => &s.hash,
        }
    }
}

/// Short, stable hex hash used for symbol identities and content hashes.
/// Truncated to 8 hex chars: collision risk is negligible at file scope and
/// keeps ids readable.
pub fn short_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_id_is_deterministic() {
        let a = Symbol::compute_id("src/a.ts", "A", "class A extends B");
        let b = Symbol::compute_id("src/a.ts", "A", "class A extends B");
        assert_eq!(a, b);
    }

    #[test]
    fn symbol_id_changes_with_signature() {
        let a = Symbol::compute_id("src/a.ts", "A", "class A extends B");
        let b = Symbol::compute_id("src/a.ts", "A", "class A extends C");
        assert_ne!(a, b);
    }

    #[test]
    fn file_id_is_prefixed() {
        assert_eq!(FileEntity::compute_id("src/a.ts").as_str(), "file:src/a.ts");
    }
}
