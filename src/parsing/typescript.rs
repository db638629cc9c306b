//! TypeScript symbol and relationship extraction via tree-sitter (C2).
//!
//! The one statically-typed source language this system parses. Extraction
//! is a single-pass tree-sitter traversal producing symbols plus
//! heritage/decorator/signature/call relationships; nothing here holds the
//! tree beyond this function call.

use crate::cache::{CacheIndex, NameResolution};
use crate::model::entity::{Parameter, SymbolDetail};
use crate::model::{Relationship, Symbol, ToRef};
use crate::parsing::stoplist::StopList;
use crate::resolution::{LookupContext, TypeResolutionBudget};
use crate::types::{DependencyScope, RelationKind, SymbolKind, Visibility};
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone)]
pub struct ParseIssue {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A raw `import`/re-export statement, consumed by the file's local import
/// alias map and by C2.a's re-export chain follower.
#[derive(Debug, Clone)]
pub struct ImportStatement {
    pub source: String,
    /// `Some(imported_name)` for a named import/re-export; `None` for a
    /// default or namespace import.
    pub imported_name: Option<String>,
    pub local_alias: String,
    pub is_namespace: bool,
    pub is_re_export: bool,
}

pub struct ExtractedFile {
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
    pub imports: Vec<ImportStatement>,
    pub issues: Vec<ParseIssue>,
}

/// Extract symbols and relationships from TypeScript source.
///
/// `budget`/`cache` gate the semantic-resolver fallback step of heritage and
/// signature-type resolution: when the local symbol table and import alias
/// map both miss, a budget-permitting lookup is attempted against the
/// process-wide name index before a placeholder is emitted.
pub fn extract(
    file_rel: &str,
    source: &str,
    stoplist: &StopList,
    budget: &TypeResolutionBudget,
    cache: &CacheIndex,
) -> ExtractedFile {
    let mut parser = Parser::new();
    let language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT;
    if parser.set_language(&language.into()).is_err() {
        return ExtractedFile {
            symbols: vec![],
            relationships: vec![],
            imports: vec![],
            issues: vec![ParseIssue {
                severity: Severity::Error,
                message: "failed to initialize TypeScript grammar".to_string(),
            }],
        };
    }

    let tree = match parser.parse(source, None) {
        Some(t) => t,
        None => {
            return ExtractedFile {
                symbols: vec![],
                relationships: vec![],
                imports: vec![],
                issues: vec![ParseIssue {
                    severity: Severity::Error,
                    message: "tree-sitter failed to produce a parse tree".to_string(),
                }],
            };
        }
    };

    let local_names = collect_local_names(tree.root_node(), source);

    let mut ctx = ExtractCtx {
        file_rel,
        source,
        stoplist,
        budget,
        cache,
        local_names,
        symbols: Vec::new(),
        relationships: Vec::new(),
        imports: Vec::new(),
        issues: Vec::new(),
    };

    ctx.walk_program(tree.root_node());

    ExtractedFile {
        symbols: ctx.symbols,
        relationships: ctx.relationships,
        imports: ctx.imports,
        issues: ctx.issues,
    }
}

struct ExtractCtx<'a> {
    file_rel: &'a str,
    source: &'a str,
    stoplist: &'a StopList,
    budget: &'a TypeResolutionBudget,
    cache: &'a CacheIndex,
    /// Top-level declaration names found in this file by a pre-pass, so
    /// heritage/type resolution sees forward references regardless of
    /// declaration order.
    local_names: HashSet<String>,
    symbols: Vec<Symbol>,
    relationships: Vec<Relationship>,
    imports: Vec<ImportStatement>,
    issues: Vec<ParseIssue>,
}

/// Collects the names of every top-level class/interface/function/type
/// alias/variable declaration, unwrapping `export`/`export default` so
/// exported and non-exported declarations are treated alike.
fn collect_local_names(root: Node, source: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        collect_local_names_from(child, source, &mut names);
    }
    names
}

fn collect_local_names_from<'a>(node: Node<'a>, source: &'a str, names: &mut HashSet<String>) {
    match node.kind() {
        "export_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_local_names_from(child, source, names);
            }
        }
        "class_declaration" | "interface_declaration" | "function_declaration" | "type_alias_declaration" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                if let Ok(text) = name_node.utf8_text(source.as_bytes()) {
                    names.insert(text.to_string());
                }
            }
        }
        "lexical_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(name_node) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if name_node.kind() != "identifier" {
                    continue;
                }
                if let Ok(text) = name_node.utf8_text(source.as_bytes()) {
                    names.insert(text.to_string());
                }
            }
        }
        _ => {}
    }
}

impl<'a> ExtractCtx<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn walk_program(&mut self, root: Node<'a>) {
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.walk_top_level(child);
        }
    }

    /// Handles `export`/`export default` wrappers transparently, then
    /// dispatches to the declaration-specific extractor.
    fn walk_top_level(&mut self, node: Node<'a>) {
        match node.kind() {
            "export_statement" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if matches!(
                        child.kind(),
                        "class_declaration"
                            | "interface_declaration"
                            | "function_declaration"
                            | "type_alias_declaration"
                            | "lexical_declaration"
                    ) {
                        self.walk_declaration(child, true);
                    } else if child.kind() == "export_clause" {
                        self.record_re_export(node, child);
                    }
                }
            }
            "import_statement" => self.record_import(node),
            "class_declaration"
            | "interface_declaration"
            | "function_declaration"
            | "type_alias_declaration"
            | "lexical_declaration" => self.walk_declaration(node, false),
            "expression_statement" => self.walk_expression_statement(node),
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.walk_expression_statement_like(child);
                }
            }
        }
    }

    fn walk_expression_statement_like(&mut self, node: Node<'a>) {
        if node.kind() == "call_expression" {
            self.record_call(node);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_expression_statement_like(child);
        }
    }

    fn walk_expression_statement(&mut self, node: Node<'a>) {
        self.walk_expression_statement_like(node);
    }

    fn walk_declaration(&mut self, node: Node<'a>, is_exported: bool) {
        match node.kind() {
            "class_declaration" => self.extract_class(node, is_exported),
            "interface_declaration" => self.extract_interface(node, is_exported),
            "function_declaration" => self.extract_function(node, is_exported),
            "type_alias_declaration" => self.extract_type_alias(node, is_exported),
            "lexical_declaration" => self.extract_variables(node, is_exported),
            _ => {}
        }
    }

    fn doc_comment(&self, node: Node<'a>) -> Option<String> {
        let mut sib = node.prev_sibling();
        while let Some(s) = sib {
            if s.kind() == "comment" {
                let text = self.text(s);
                if text.starts_with("/**") {
                    return Some(text.to_string());
                }
                return None;
            }
            if s.kind() == "decorator" {
                sib = s.prev_sibling();
                continue;
            }
            break;
        }
        None
    }

    fn decorators_of(&mut self, node: Node<'a>, owner_id: &crate::types::EntityId) {
        let mut sib = node.prev_sibling();
        while let Some(s) = sib {
            if s.kind() == "decorator" {
                let path = self.text(s).trim_start_matches('@').to_string();
                self.relationships.push(Relationship::new(
                    RelationKind::References,
                    owner_id.clone(),
                    ToRef::External {
                        name: format!("decorator:{path}"),
                        ambiguous: false,
                        candidate_count: 0,
                    },
                    0.7,
                ));
                sib = s.prev_sibling();
            } else {
                break;
            }
        }
    }

    fn extract_class(&mut self, node: Node<'a>, is_exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let signature = self.text(node).to_string();
        let is_abstract = self.has_modifier(node, "abstract");

        let mut extends: Option<String> = None;
        let mut implements: Vec<String> = Vec::new();
        if let Some(heritage) = find_child_by_kind(node, "class_heritage") {
            let mut cursor = heritage.walk();
            for child in heritage.children(&mut cursor) {
                match child.kind() {
                    "extends_clause" => {
                        if let Some(value) = child.child(1) {
                            extends = Some(self.text(value).to_string());
                        }
                    }
                    "implements_clause" => {
                        let mut ic = child.walk();
                        for t in child.children(&mut ic) {
                            if t.kind() == "type_identifier" || t.kind() == "identifier" {
                                implements.push(self.text(t).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut methods = Vec::new();
        let mut properties = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "method_definition" => {
                        if let Some(m) = self.extract_method(member, &name) {
                            methods.push(m.name.clone());
                            self.symbols.push(m);
                        }
                    }
                    "public_field_definition" => {
                        if let Some(p) = self.extract_property(member, &name) {
                            properties.push(p.name.clone());
                            self.symbols.push(p);
                        }
                    }
                    _ => {}
                }
            }
        }

        let symbol = Symbol::new(
            self.file_rel.to_string(),
            name.clone(),
            SymbolKind::Class,
            signature,
            Visibility::Public,
            is_exported,
            false,
            self.doc_comment(node),
            SymbolDetail::Class {
                extends: extends.clone(),
                implements: implements.clone(),
                methods,
                properties,
                is_abstract,
            },
        );
        let symbol_id = symbol.id.clone();
        self.decorators_of(node, &symbol_id);

        if let Some(parent) = extends {
            self.emit_heritage(&symbol_id, RelationKind::Extends, &parent, "class");
        }
        for iface in implements {
            self.emit_heritage(&symbol_id, RelationKind::Implements, &iface, "interface");
        }

        self.symbols.push(symbol);
    }

    fn extract_interface(&mut self, node: Node<'a>, is_exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let signature = self.text(node).to_string();

        let mut extends = Vec::new();
        if let Some(heritage) = find_child_by_kind(node, "extends_type_clause") {
            let mut cursor = heritage.walk();
            for t in heritage.children(&mut cursor) {
                if t.kind() == "type_identifier" || t.kind() == "identifier" {
                    extends.push(self.text(t).to_string());
                }
            }
        }

        let mut methods = Vec::new();
        let mut properties = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "method_signature" => {
                        if let Some(name) = member
                            .child_by_field_name("name")
                            .map(|n| self.text(n).to_string())
                        {
                            methods.push(name);
                        }
                    }
                    "property_signature" => {
                        if let Some(name) = member
                            .child_by_field_name("name")
                            .map(|n| self.text(n).to_string())
                        {
                            properties.push(name);
                        }
                    }
                    _ => {}
                }
            }
        }

        let symbol = Symbol::new(
            self.file_rel.to_string(),
            name,
            SymbolKind::Interface,
            signature,
            Visibility::Public,
            is_exported,
            false,
            self.doc_comment(node),
            SymbolDetail::Interface {
                extends: extends.clone(),
                methods,
                properties,
            },
        );
        let symbol_id = symbol.id.clone();
        for parent in extends {
            self.emit_heritage(&symbol_id, RelationKind::Extends, &parent, "interface");
        }
        self.symbols.push(symbol);
    }

    fn extract_function(&mut self, node: Node<'a>, is_exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let signature = self.text(node).to_string();
        let is_async = self.has_leading_keyword(node, "async");
        let is_generator = node.child(1).map(|n| n.kind() == "*").unwrap_or(false);

        let params = self.extract_params(node);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| self.text(n).trim_start_matches(':').trim().to_string());

        let symbol = Symbol::new(
            self.file_rel.to_string(),
            name.clone(),
            SymbolKind::Function,
            signature,
            Visibility::Public,
            is_exported,
            false,
            self.doc_comment(node),
            SymbolDetail::Function {
                parameters: params.clone(),
                return_type: return_type.clone(),
                is_async,
                is_generator,
                complexity: estimate_complexity(node),
                call_sites: Vec::new(),
            },
        );
        let symbol_id = symbol.id.clone();
        self.decorators_of(node, &symbol_id);
        self.emit_signature_edges(&symbol_id, &params, return_type.as_deref());
        self.symbols.push(symbol);

        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &symbol_id);
        }
    }

    fn extract_method(&mut self, node: Node<'a>, owner_class: &str) -> Option<Symbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(name_node).to_string();
        let qualified_name = format!("{owner_class}.{name}");
        let signature = self.text(node).to_string();
        let is_async = self.has_leading_keyword(node, "async");
        let visibility = if self.has_modifier(node, "private") {
            Visibility::Private
        } else if self.has_modifier(node, "protected") {
            Visibility::Protected
        } else {
            Visibility::Public
        };

        let params = self.extract_params(node);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| self.text(n).trim_start_matches(':').trim().to_string());

        let symbol = Symbol::new(
            self.file_rel.to_string(),
            qualified_name,
            SymbolKind::Method,
            signature,
            visibility,
            false,
            false,
            self.doc_comment(node),
            SymbolDetail::Function {
                parameters: params.clone(),
                return_type: return_type.clone(),
                is_async,
                is_generator: false,
                complexity: estimate_complexity(node),
                call_sites: Vec::new(),
            },
        );
        let symbol_id = symbol.id.clone();
        self.decorators_of(node, &symbol_id);
        self.emit_signature_edges(&symbol_id, &params, return_type.as_deref());
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &symbol_id);
        }
        Some(symbol)
    }

    fn extract_property(&mut self, node: Node<'a>, owner_class: &str) -> Option<Symbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(name_node).to_string();
        let qualified_name = format!("{owner_class}.{name}");
        let signature = self.text(node).to_string();
        let visibility = if self.has_modifier(node, "private") {
            Visibility::Private
        } else if self.has_modifier(node, "protected") {
            Visibility::Protected
        } else {
            Visibility::Public
        };
        Some(Symbol::new(
            self.file_rel.to_string(),
            qualified_name,
            SymbolKind::Property,
            signature,
            visibility,
            false,
            false,
            self.doc_comment(node),
            SymbolDetail::Property,
        ))
    }

    fn extract_type_alias(&mut self, node: Node<'a>, is_exported: bool) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let signature = self.text(node).to_string();
        let value = node
            .child_by_field_name("value")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let is_union = value.contains(" | ");
        let is_intersection = value.contains(" & ");

        self.symbols.push(Symbol::new(
            self.file_rel.to_string(),
            name,
            SymbolKind::TypeAlias,
            signature,
            Visibility::Public,
            is_exported,
            false,
            self.doc_comment(node),
            SymbolDetail::TypeAlias {
                aliased_type: value,
                is_union,
                is_intersection,
            },
        ));
    }

    fn extract_variables(&mut self, node: Node<'a>, is_exported: bool) {
        let mut cursor = node.walk();
        for declarator in node.children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = self.text(name_node).to_string();
            let signature = self.text(declarator).to_string();
            self.symbols.push(Symbol::new(
                self.file_rel.to_string(),
                name,
                SymbolKind::Variable,
                signature,
                Visibility::Public,
                is_exported,
                false,
                self.doc_comment(node),
                SymbolDetail::Variable,
            ));
        }
    }

    fn extract_params(&self, node: Node<'a>) -> Vec<Parameter> {
        let mut out = Vec::new();
        let Some(params) = node.child_by_field_name("parameters") else {
            return out;
        };
        let mut cursor = params.walk();
        for p in params.children(&mut cursor) {
            match p.kind() {
                "required_parameter" | "optional_parameter" => {
                    let name = p
                        .child_by_field_name("pattern")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let ty = p
                        .child_by_field_name("type")
                        .map(|n| self.text(n).trim_start_matches(':').trim().to_string());
                    let default = p
                        .child_by_field_name("value")
                        .map(|n| self.text(n).to_string());
                    out.push(Parameter {
                        name,
                        r#type: ty,
                        optional: p.kind() == "optional_parameter" || default.is_some(),
                        default,
                    });
                }
                "identifier" => out.push(Parameter {
                    name: self.text(p).to_string(),
                    r#type: None,
                    optional: false,
                    default: None,
                }),
                _ => {}
            }
        }
        out
    }

    fn emit_signature_edges(
        &mut self,
        owner: &crate::types::EntityId,
        params: &[Parameter],
        return_type: Option<&str>,
    ) {
        for param in params {
            let Some(ty) = &param.r#type else { continue };
            let ty = clean_type(ty);
            if ty.is_empty() {
                continue;
            }
            self.relationships.push(Relationship::new(
                RelationKind::ParamType,
                owner.clone(),
                self.resolve_type_ref(&ty),
                0.9,
            ));
            self.emit_depends_on(owner, &ty);
        }
        if let Some(ty) = return_type {
            let ty = clean_type(ty);
            if !ty.is_empty() {
                self.relationships.push(Relationship::new(
                    RelationKind::ReturnsType,
                    owner.clone(),
                    self.resolve_type_ref(&ty),
                    0.9,
                ));
                self.emit_depends_on(owner, &ty);
            }
        }
    }

    fn emit_depends_on(&mut self, owner: &crate::types::EntityId, type_name: &str) {
        let scope = if self.imports.iter().any(|i| {
            i.local_alias == type_name || i.imported_name.as_deref() == Some(type_name)
        }) {
            DependencyScope::Imported
        } else if is_builtin_type(type_name) {
            DependencyScope::External
        } else {
            DependencyScope::Local
        };
        self.relationships.push(Relationship::new(
            RelationKind::DependsOn,
            owner.clone(),
            self.resolve_type_ref(type_name),
            scope.confidence(),
        ));
    }

    /// Resolution order: (a) the file's own locally-declared symbols, (b)
    /// the import alias map, (c) a budget-gated name-index lookup, (d) a
    /// placeholder (re-export resolution runs in a later sweep once the
    /// export map has this file's imports — see `parsing::export_map`).
    fn resolve_type_ref(&self, name: &str) -> ToRef {
        if self.local_names.contains(name) {
            return ToRef::FileSymbol {
                file: self.file_rel.to_string(),
                name: name.to_string(),
            };
        }
        if self
            .imports
            .iter()
            .any(|i| i.local_alias == name || i.imported_name.as_deref() == Some(name))
        {
            return ToRef::FileSymbol {
                file: self.file_rel.to_string(),
                name: name.to_string(),
            };
        }
        if let Some(resolved) = self.semantic_lookup(name) {
            return resolved;
        }
        ToRef::Placeholder {
            category: crate::model::PlaceholderCategory::TypeAlias,
            name: name.to_string(),
        }
    }

    /// Last-resort lookup before falling back to a placeholder: spends one
    /// budget token to probe the process-wide name index. `None` means the
    /// budget denied the lookup or the name index has nothing for it.
    fn semantic_lookup(&self, name: &str) -> Option<ToRef> {
        let lookup_ctx = LookupContext {
            name,
            crosses_file_boundary: true,
            is_ambiguous: false,
        };
        if !self.budget.try_use(&lookup_ctx) {
            return None;
        }
        match self.cache.resolve_by_name(name) {
            NameResolution::Unique(symbol) => Some(ToRef::Entity { id: symbol.id }),
            NameResolution::Ambiguous(count) => Some(ToRef::External {
                name: name.to_string(),
                ambiguous: true,
                candidate_count: count as u32,
            }),
            NameResolution::NoCandidates => None,
        }
    }

    fn emit_heritage(
        &mut self,
        owner: &crate::types::EntityId,
        kind: RelationKind,
        parent_name: &str,
        category: &str,
    ) {
        let placeholder_category = match category {
            "interface" => crate::model::PlaceholderCategory::Interface,
            _ => crate::model::PlaceholderCategory::Class,
        };
        let to_ref = if self.local_names.contains(parent_name) {
            ToRef::FileSymbol {
                file: self.file_rel.to_string(),
                name: parent_name.to_string(),
            }
        } else if self
            .imports
            .iter()
            .any(|i| i.local_alias == parent_name || i.imported_name.as_deref() == Some(parent_name))
        {
            ToRef::FileSymbol {
                file: self.file_rel.to_string(),
                name: parent_name.to_string(),
            }
        } else if let Some(resolved) = self.semantic_lookup(parent_name) {
            resolved
        } else {
            ToRef::Placeholder {
                category: placeholder_category,
                name: parent_name.to_string(),
            }
        };
        self.relationships
            .push(Relationship::new(kind, owner.clone(), to_ref, 0.8));
    }

    fn collect_calls(&mut self, node: Node<'a>, owner: &crate::types::EntityId) {
        if node.kind() == "call_expression" {
            if let Some(target) = self.call_target_name(node) {
                if !self.stoplist.is_filtered(&target) {
                    self.relationships.push(Relationship::new(
                        RelationKind::Calls,
                        owner.clone(),
                        ToRef::External {
                            name: target,
                            ambiguous: false,
                            candidate_count: 0,
                        },
                        0.6,
                    ));
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_calls(child, owner);
        }
    }

    fn record_call(&mut self, node: Node<'a>) {
        if let Some(target) = self.call_target_name(node) {
            if !self.stoplist.is_filtered(&target) {
                self.relationships.push(Relationship::new(
                    RelationKind::Calls,
                    crate::types::EntityId::new(format!("file:{}", self.file_rel)),
                    ToRef::External {
                        name: target,
                        ambiguous: false,
                        candidate_count: 0,
                    },
                    0.5,
                ));
            }
        }
    }

    fn call_target_name(&self, node: Node<'a>) -> Option<String> {
        let func = node.child_by_field_name("function")?;
        match func.kind() {
            "identifier" => Some(self.text(func).to_string()),
            "member_expression" => func
                .child_by_field_name("property")
                .map(|n| self.text(n).to_string()),
            _ => None,
        }
    }

    fn record_import(&mut self, node: Node<'a>) {
        let Some(source_node) = node.child_by_field_name("source") else {
            return;
        };
        let source = self.text(source_node).trim_matches('"').trim_matches('\'').to_string();

        if let Some(clause) = find_child_by_kind(node, "import_clause") {
            let mut cursor = clause.walk();
            for child in clause.children(&mut cursor) {
                match child.kind() {
                    "identifier" => self.imports.push(ImportStatement {
                        source: source.clone(),
                        imported_name: None,
                        local_alias: self.text(child).to_string(),
                        is_namespace: false,
                        is_re_export: false,
                    }),
                    "namespace_import" => {
                        if let Some(alias) = child.child(1) {
                            self.imports.push(ImportStatement {
                                source: source.clone(),
                                imported_name: None,
                                local_alias: self.text(alias).to_string(),
                                is_namespace: true,
                                is_re_export: false,
                            });
                        }
                    }
                    "named_imports" => {
                        let mut nc = child.walk();
                        for spec in child.children(&mut nc) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let imported = spec
                                .child_by_field_name("name")
                                .map(|n| self.text(n).to_string());
                            let alias = spec
                                .child_by_field_name("alias")
                                .map(|n| self.text(n).to_string())
                                .or_else(|| imported.clone());
                            if let Some(alias) = alias {
                                self.imports.push(ImportStatement {
                                    source: source.clone(),
                                    imported_name: imported,
                                    local_alias: alias,
                                    is_namespace: false,
                                    is_re_export: false,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        self.relationships.push(Relationship::new(
            RelationKind::Imports,
            crate::types::EntityId::new(format!("file:{}", self.file_rel)),
            ToRef::External {
                name: source,
                ambiguous: false,
                candidate_count: 0,
            },
            0.9,
        ));
    }

    fn record_re_export(&mut self, export_node: Node<'a>, clause: Node<'a>) {
        let source = find_child_by_kind(export_node, "string")
            .map(|n| self.text(n).trim_matches('"').trim_matches('\'').to_string());
        let Some(source) = source else { return };

        let mut cursor = clause.walk();
        for spec in clause.children(&mut cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let imported = spec
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string());
            let alias = spec
                .child_by_field_name("alias")
                .map(|n| self.text(n).to_string())
                .or_else(|| imported.clone());
            if let (Some(imported), Some(alias)) = (imported, alias) {
                self.imports.push(ImportStatement {
                    source: source.clone(),
                    imported_name: Some(imported),
                    local_alias: alias,
                    is_namespace: false,
                    is_re_export: true,
                });
            }
        }
    }

    fn has_modifier(&self, node: Node<'a>, modifier: &str) -> bool {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .any(|c| c.kind() == modifier || self.text(c) == modifier)
    }

    fn has_leading_keyword(&self, node: Node<'a>, keyword: &str) -> bool {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "statement_block" || child.kind() == "formal_parameters" {
                break;
            }
            if self.text(child) == keyword {
                return true;
            }
        }
        false
    }
}

fn find_child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

fn clean_type(raw: &str) -> String {
    raw.trim()
        .trim_end_matches("[]")
        .trim_end_matches('?')
        .split(['<', '[', '|', '&'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string()
}

fn is_builtin_type(name: &str) -> bool {
    matches!(
        name,
        "string"
            | "number"
            | "boolean"
            | "void"
            | "any"
            | "unknown"
            | "never"
            | "object"
            | "undefined"
            | "null"
            | "Promise"
            | "Array"
            | "Record"
            | "Map"
            | "Set"
    )
}

/// Rough cyclomatic-complexity proxy: count branching keywords in the
/// function body's source text. Good enough to feed the type-resolution
/// budget's size/complexity scaling; not a precise metric.
fn estimate_complexity(node: Node) -> u32 {
    let mut count = 1u32;
    let mut cursor = node.walk();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        if matches!(
            n.kind(),
            "if_statement"
                | "for_statement"
                | "for_in_statement"
                | "while_statement"
                | "do_statement"
                | "switch_case"
                | "catch_clause"
                | "ternary_expression"
        ) {
            count += 1;
        }
        for child in n.children(&mut cursor) {
            stack.push(child);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_with_unresolved_extends() {
        let stoplist = StopList::default();
        let budget = TypeResolutionBudget::with_default_cap();
        let cache = CacheIndex::new();
        let src = "export class A extends B {}\n";
        let extracted = extract("src/a.ts", src, &stoplist, &budget, &cache);
        assert!(extracted.symbols.iter().any(|s| s.name == "A"));
        let extends = extracted
            .relationships
            .iter()
            .find(|r| r.r#type == RelationKind::Extends)
            .expect("expected an EXTENDS relationship");
        match extends.to_ref.as_ref().unwrap() {
            ToRef::Placeholder { category, name } => {
                assert_eq!(name, "B");
                assert!(matches!(category, crate::model::PlaceholderCategory::Class));
            }
            other => panic!("expected placeholder ref, got {other:?}"),
        }
    }

    #[test]
    fn extends_clause_resolves_against_a_later_same_file_declaration() {
        let stoplist = StopList::default();
        let budget = TypeResolutionBudget::with_default_cap();
        let cache = CacheIndex::new();
        let src = "export class Subclass extends Base {}\nexport class Base {}\n";
        let extracted = extract("src/a.ts", src, &stoplist, &budget, &cache);
        let extends = extracted
            .relationships
            .iter()
            .find(|r| r.r#type == RelationKind::Extends)
            .expect("expected an EXTENDS relationship");
        match extends.to_ref.as_ref().unwrap() {
            ToRef::FileSymbol { file, name } => {
                assert_eq!(file, "src/a.ts");
                assert_eq!(name, "Base");
            }
            other => panic!("expected a same-file symbol ref, got {other:?}"),
        }
    }

    #[test]
    fn extracts_function_signature_edges() {
        let stoplist = StopList::default();
        let budget = TypeResolutionBudget::with_default_cap();
        let cache = CacheIndex::new();
        let src = "export function add(a: number, b: number): number { return a + b; }\n";
        let extracted = extract("src/math.ts", src, &stoplist, &budget, &cache);
        assert!(extracted
            .relationships
            .iter()
            .any(|r| r.r#type == RelationKind::ParamType));
        assert!(extracted
            .relationships
            .iter()
            .any(|r| r.r#type == RelationKind::ReturnsType));
    }

    #[test]
    fn empty_file_yields_no_symbols_or_errors() {
        let stoplist = StopList::default();
        let budget = TypeResolutionBudget::with_default_cap();
        let cache = CacheIndex::new();
        let extracted = extract("src/empty.ts", "", &stoplist, &budget, &cache);
        assert!(extracted.symbols.is_empty());
        assert!(extracted.issues.is_empty());
    }
}
