//! Tree-sitter backed code unit extraction
//!
//! Splits source files into functions, methods, classes and type declarations so the
//! storage policy can deduplicate bodies that did not change between commits.

mod language;

pub use language::detect_language;

use crate::error::{HistoryError, Result};
use crate::source::{CodeUnit, UnitKind, UnitParser};
use tree_sitter::{Language, Node, Parser};

/// Parser for all grammars compiled into the crate
///
/// A fresh `tree_sitter::Parser` is created per call, so one instance can be shared
/// across ingestion workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterUnitParser;

impl TreeSitterUnitParser {
    pub fn new() -> Self {
        Self
    }

    fn grammar(language: &str) -> Option<Language> {
        let grammar = match language {
            "Rust" => tree_sitter_rust::LANGUAGE.into(),
            "Python" => tree_sitter_python::LANGUAGE.into(),
            "JavaScript" => tree_sitter_javascript::LANGUAGE.into(),
            "TypeScript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            "Go" => tree_sitter_go::LANGUAGE.into(),
            "Java" => tree_sitter_java::LANGUAGE.into(),
            "Swift" => tree_sitter_swift::LANGUAGE.into(),
            "C" => tree_sitter_c::LANGUAGE.into(),
            "C++" => tree_sitter_cpp::LANGUAGE.into(),
            "C#" => tree_sitter_c_sharp::LANGUAGE.into(),
            "Ruby" => tree_sitter_ruby::LANGUAGE.into(),
            "PHP" => tree_sitter_php::LANGUAGE_PHP.into(),
            _ => return None,
        };
        Some(grammar)
    }
}

impl UnitParser for TreeSitterUnitParser {
    fn language_for(&self, path: &str) -> Option<String> {
        detect_language(path).map(str::to_string)
    }

    fn parse_units(&self, language: &str, content: &str) -> Result<Vec<CodeUnit>> {
        let grammar = Self::grammar(language).ok_or_else(|| {
            HistoryError::other(format!("Unsupported language for parsing: {}", language))
        })?;

        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| HistoryError::other(format!("Failed to set parser language: {}", e)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| HistoryError::other("Failed to parse source code"))?;

        let mut units = Vec::new();
        collect_units(tree.root_node(), language, content, false, &mut units);
        Ok(units)
    }
}

/// Map a grammar node kind to a unit kind, `None` for nodes that are not units
fn unit_kind(language: &str, kind: &str, inside_class: bool) -> Option<UnitKind> {
    let function = if inside_class {
        UnitKind::Method
    } else {
        UnitKind::Function
    };

    let unit = match (language, kind) {
        ("Rust", "function_item") => function,
        ("Rust", "impl_item" | "trait_item" | "struct_item" | "enum_item" | "mod_item") => {
            UnitKind::Type
        }
        ("Python", "function_definition") => function,
        ("Python", "class_definition") => UnitKind::Class,
        ("JavaScript" | "TypeScript", "function_declaration") => function,
        ("JavaScript" | "TypeScript", "method_definition") => UnitKind::Method,
        ("JavaScript" | "TypeScript", "class_declaration") => UnitKind::Class,
        ("TypeScript", "interface_declaration") => UnitKind::Type,
        ("Go", "function_declaration") => UnitKind::Function,
        ("Go", "method_declaration") => UnitKind::Method,
        ("Go", "type_declaration") => UnitKind::Type,
        ("Java", "method_declaration" | "constructor_declaration") => UnitKind::Method,
        ("Java", "class_declaration") => UnitKind::Class,
        ("Java", "interface_declaration") => UnitKind::Type,
        ("Swift", "function_declaration" | "initializer_declaration") => function,
        ("Swift", "class_declaration") => UnitKind::Class,
        ("Swift", "protocol_declaration") => UnitKind::Type,
        ("C", "function_definition") => UnitKind::Function,
        ("C", "struct_specifier" | "enum_specifier" | "union_specifier") => UnitKind::Type,
        ("C++", "function_definition") => function,
        ("C++", "class_specifier") => UnitKind::Class,
        ("C++", "struct_specifier" | "enum_specifier" | "namespace_definition") => {
            UnitKind::Type
        }
        ("C#", "method_declaration" | "constructor_declaration") => UnitKind::Method,
        ("C#", "class_declaration") => UnitKind::Class,
        ("C#", "struct_declaration" | "interface_declaration" | "enum_declaration") => {
            UnitKind::Type
        }
        ("Ruby", "method" | "singleton_method") => function,
        ("Ruby", "class") => UnitKind::Class,
        ("Ruby", "module") => UnitKind::Type,
        ("PHP", "function_definition") => UnitKind::Function,
        ("PHP", "method_declaration") => UnitKind::Method,
        ("PHP", "class_declaration") => UnitKind::Class,
        ("PHP", "interface_declaration" | "trait_declaration") => UnitKind::Type,
        _ => return None,
    };
    Some(unit)
}

fn collect_units(
    node: Node,
    language: &str,
    source: &str,
    inside_class: bool,
    result: &mut Vec<CodeUnit>,
) {
    let kind = unit_kind(language, node.kind(), inside_class);

    if let Some(kind) = kind {
        // A struct without a body is only a type reference in C-family grammars
        let is_declaration = !(matches!(language, "C" | "C++")
            && kind == UnitKind::Type
            && node.child_by_field_name("body").is_none());

        if is_declaration {
            result.push(CodeUnit {
                kind,
                name: unit_name(node, source),
                byte_range: node.start_byte()..node.end_byte(),
                line_range: (node.start_position().row + 1, node.end_position().row + 1),
            });
        }
    }

    let child_inside_class = inside_class
        || matches!(kind, Some(UnitKind::Class))
        || (language == "Rust" && matches!(node.kind(), "impl_item" | "trait_item"));

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_units(child, language, source, child_inside_class, result);
    }
}

/// Identifier of a unit: the `name` field, or the first identifier found through the
/// `declarator`/`type` fields (C-style declarations), or "unknown"
fn unit_name(node: Node, source: &str) -> String {
    let text = |n: Node| n.utf8_text(source.as_bytes()).ok().map(str::to_string);

    if let Some(name) = node.child_by_field_name("name").and_then(text) {
        return name;
    }

    let mut current = node
        .child_by_field_name("declarator")
        .or_else(|| node.child_by_field_name("type"));
    while let Some(candidate) = current {
        if candidate.kind().ends_with("identifier")
            && let Some(name) = text(candidate)
        {
            return name;
        }
        current = candidate
            .child_by_field_name("declarator")
            .or_else(|| candidate.child_by_field_name("name"))
            .or_else(|| candidate.named_child(0));
    }

    let mut cursor = node.walk();
    let first_identifier = node
        .named_children(&mut cursor)
        .find(|child| child.kind().ends_with("identifier") || child.kind() == "constant");
    first_identifier
        .and_then(text)
        .unwrap_or_else(|| "unknown".to_string())
}
