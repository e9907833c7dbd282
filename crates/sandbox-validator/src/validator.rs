//! Syntax-tree walk that gates submissions before any container exists.

use crate::denylist::{
    classify_attribute, classify_attribute_object, classify_builtin, classify_module, DenyClass,
    INTROSPECTION_ATTRIBUTES,
};
use serde::Serialize;
use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

/// Submissions larger than this are rejected without parsing.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Outcome of validating one submission. `is_valid()` holds exactly when
/// there are no violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    is_valid: bool,
    violations: Vec<String>,
}

impl ValidationResult {
    fn from_violations(mut violations: Vec<String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        violations.retain(|v| seen.insert(v.clone()));
        Self {
            is_valid: violations.is_empty(),
            violations,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<String> {
        self.violations
    }

    /// All violations on one line, for error messages.
    pub fn summary(&self) -> String {
        self.violations.join("; ")
    }
}

/// Rejects Python source that imports, calls or reaches deny-listed symbols.
///
/// Stateless and cheap to share; each call builds its own parser.
#[derive(Debug, Clone, Default)]
pub struct StaticCodeValidator {
    _private: (),
}

impl StaticCodeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, source: &str) -> ValidationResult {
        if source.len() > MAX_SOURCE_BYTES {
            return ValidationResult::from_violations(vec![format!(
                "Source is {} bytes, limit is {} bytes",
                source.len(),
                MAX_SOURCE_BYTES
            )]);
        }

        let tree = match parse(source) {
            Ok(tree) => tree,
            Err(message) => return ValidationResult::from_violations(vec![message]),
        };

        let root = tree.root_node();
        if root.has_error() {
            return ValidationResult::from_violations(vec![describe_syntax_error(root)]);
        }

        let mut walker = Walker {
            source: source.as_bytes(),
            violations: Vec::new(),
        };
        walker.walk(&tree);

        let result = ValidationResult::from_violations(walker.violations);
        debug!(
            "Validated {} bytes of source: {} violation(s)",
            source.len(),
            result.violations.len()
        );
        result
    }
}

fn parse(source: &str) -> Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(tree_sitter_python::language())
        .map_err(|e| format!("Python parser unavailable: {}", e))?;
    parser
        .parse(source, None)
        .ok_or_else(|| "Python parser produced no syntax tree".to_string())
}

fn describe_syntax_error(root: Node<'_>) -> String {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            let line = node.start_position().row + 1;
            return if node.is_missing() {
                format!("Syntax error at line {}: missing '{}'", line, node.kind())
            } else {
                format!("Syntax error at line {}", line)
            };
        }
        // Only descend into subtrees that contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return format!("Syntax error at line {}", root.start_position().row + 1);
            }
        }
    }
}

struct Walker<'a> {
    source: &'a [u8],
    violations: Vec<String>,
}

impl<'a> Walker<'a> {
    /// Pre-order walk with a cursor so deeply nested input cannot exhaust the stack.
    fn walk(&mut self, tree: &Tree) {
        let mut cursor = tree.walk();
        loop {
            self.inspect(cursor.node());
            if cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    fn inspect(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.check_import(node),
            "import_from_statement" => self.check_import_from(node),
            "attribute" => self.check_attribute(node),
            "identifier" => self.check_identifier(node),
            "string" => self.check_string(node),
            // Python 2 form, still accepted by the grammar.
            "exec_statement" => self.push(
                node,
                format!("call to builtin 'exec' ({})", DenyClass::DangerousBuiltin),
            ),
            _ => {}
        }
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source).unwrap_or_default()
    }

    fn push(&mut self, node: Node<'_>, message: String) {
        let line = node.start_position().row + 1;
        self.violations.push(format!("Line {}: {}", line, message));
    }

    fn check_import(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let module = match name.kind() {
                "aliased_import" => name.child_by_field_name("name"),
                _ => Some(name),
            };
            if let Some(module) = module {
                self.check_module(node, self.text(module));
            }
        }
    }

    fn check_import_from(&mut self, node: Node<'_>) {
        // Relative imports have no local package to resolve against.
        if let Some(module) = node.child_by_field_name("module_name") {
            if module.kind() == "dotted_name" {
                self.check_module(node, self.text(module));
            }
        }
    }

    fn check_module(&mut self, node: Node<'_>, module: &str) {
        if let Some(class) = classify_module(module) {
            self.push(node, format!("forbidden import '{}' ({})", module, class));
        }
    }

    fn check_attribute(&mut self, node: Node<'_>) {
        if let Some(attr) = node.child_by_field_name("attribute") {
            let name = self.text(attr);
            if let Some(class) = classify_attribute(name) {
                self.push(node, format!("forbidden attribute '{}' ({})", name, class));
            }
        }

        if let Some(object) = node.child_by_field_name("object") {
            if object.kind() == "identifier" {
                if let Some(class) = classify_attribute_object(self.text(object)) {
                    self.push(
                        node,
                        format!("forbidden module access '{}' ({})", self.text(node), class),
                    );
                }
            }
        }
    }

    fn check_identifier(&mut self, node: Node<'_>) {
        let Some(parent) = node.parent() else {
            return;
        };
        match parent.kind() {
            // Module paths are handled by the import checks.
            "dotted_name" | "aliased_import" => return,
            // `df.eval(...)` names a method, not the builtin.
            "attribute" if parent.child_by_field_name("attribute") == Some(node) => return,
            "keyword_argument" if parent.child_by_field_name("name") == Some(node) => return,
            _ => {}
        }

        let name = self.text(node);
        if let Some(class) = classify_builtin(name) {
            let is_call =
                parent.kind() == "call" && parent.child_by_field_name("function") == Some(node);
            let what = if is_call { "call to" } else { "reference to" };
            self.push(node, format!("{} builtin '{}' ({})", what, name, class));
        } else if let Some(class) = classify_attribute(name) {
            self.push(node, format!("forbidden name '{}' ({})", name, class));
        }
    }

    fn check_string(&mut self, node: Node<'_>) {
        let text = self.text(node);
        for name in INTROSPECTION_ATTRIBUTES.iter().filter(|n| n.starts_with("__")) {
            if text.contains(name) {
                self.push(
                    node,
                    format!(
                        "string literal references '{}' ({})",
                        name,
                        DenyClass::Introspection
                    ),
                );
            }
        }
    }
}
