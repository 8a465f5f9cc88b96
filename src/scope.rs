//! Scope & Name Module for the Lua translator
//!
//! Tracks local declarations per lexical scope while the parser runs and
//! records collisions in an `Annotations` side table. Also owns the name
//! tables shared by the generator: runtime-backed libraries, Lua globals
//! and JS reserved words.

use std::collections::{HashMap, HashSet};

use crate::ast::{Expression, Identifier, NodeId};
use crate::parse::ParseHooks;

pub const PLACEHOLDER: &str = "_";

lazy_static::lazy_static! {
    /// Library tables whose members route through `l2j.<lib>`.
    pub static ref LUA_SYSTEM_LIB: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("table");
        s.insert("io");
        s.insert("string");
        s.insert("package");
        s.insert("math");
        s.insert("debug");
        s.insert("os");
        s.insert("utf8");
        s.insert("json");
        s.insert("rapidjson");
        s
    };

    /// Names provided by the Lua runtime itself; never treated as user globals.
    pub static ref LUA_GLOBAL_LIB: HashSet<&'static str> = {
        let mut s: HashSet<&'static str> = LUA_SYSTEM_LIB.iter().copied().collect();
        for name in [
            "_G",
            "setmetatable",
            "rawget",
            "rawset",
            "rawlen",
            "type",
            "assert",
            "__VERSION",
            "dofile",
            "error",
            "getmetatable",
            "tonumber",
            "tostring",
            "xpcall",
            "pcall",
            "pairs",
            "ipairs",
            "print",
            "next",
            "select",
            "require",
        ] {
            s.insert(name);
        }
        s
    };

    /// Fixed renames for names that collide with JS keywords or runtime members.
    static ref IDENTIFIER_RENAMES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("constructor", "_constructor");
        m.insert("extends", "_extends");
        m.insert("class", "_class");
        m.insert("default", "_js_default");
        m.insert("debugger", "_debugger");
        m.insert("var", "varInfo");
        m.insert("super", "Super");
        m.insert("new", "New");
        m.insert("import", "Import");
        m.insert("package", "Package");
        m
    };

    /// JS reserved words that are legal Lua names and have no fixed rename.
    static ref JS_RESERVED: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "case", "catch", "const", "continue", "delete", "enum", "export",
            "finally", "instanceof", "null", "switch", "this", "throw", "try",
            "void", "with", "yield", "let", "static", "implements", "interface",
            "private", "protected", "public", "await",
        ] {
            s.insert(word);
        }
        s
    };
}

/// JS spelling of a Lua name used as a binding or bare reference.
pub fn escape_identifier(name: &str) -> String {
    if name == "typeof" {
        return "l2j.typeof".to_string();
    }
    if let Some(renamed) = IDENTIFIER_RENAMES.get(name) {
        return renamed.to_string();
    }
    if JS_RESERVED.contains(name) {
        return format!("_{}", name);
    }
    name.to_string()
}

/// JS spelling of a Lua name used after `.`; reserved words are legal there.
pub fn escape_property(name: &str) -> String {
    IDENTIFIER_RENAMES
        .get(name)
        .map(|renamed| renamed.to_string())
        .unwrap_or_else(|| name.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANNOTATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Facts computed during parsing, keyed by node identity.
#[derive(Debug, Default, Clone)]
pub struct Annotations {
    /// Local statements redeclaring at least one name of the same block.
    pub duplicated: HashSet<NodeId>,
    /// Identifiers inside duplicated statements that are the redeclared ones.
    pub redeclared: HashSet<NodeId>,
    /// Declared identifiers and references that use a generated JS name.
    pub renamed: HashMap<NodeId, String>,
    /// Identifier expressions resolving to a local binding.
    pub local_references: HashSet<NodeId>,
}

impl Annotations {
    pub fn is_duplicated(&self, statement: NodeId) -> bool {
        self.duplicated.contains(&statement)
    }

    pub fn is_redeclared(&self, identifier: NodeId) -> bool {
        self.redeclared.contains(&identifier)
    }

    pub fn is_local_reference(&self, expression: NodeId) -> bool {
        self.local_references.contains(&expression)
    }

    /// Declared name after disambiguation.
    pub fn name_of<'a>(&'a self, identifier: &'a Identifier) -> &'a str {
        self.resolve(identifier.id, &identifier.name)
    }

    /// JS name for the identifier node `id` spelled `name` in the source.
    pub fn resolve<'a>(&'a self, id: NodeId, name: &'a str) -> &'a str {
        self.renamed.get(&id).map(String::as_str).unwrap_or(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE TRACKER
// ═══════════════════════════════════════════════════════════════════════════════

/// One declared name in a scope mapping.
#[derive(Debug, Clone, Default)]
struct Binding {
    /// Generated JS name when the Lua name could not be kept.
    alias: Option<String>,
}

/// Mirrors the parser's scope stack. Each mapping holds the names declared
/// in one block; suffixes come from one counter per file so generated names
/// never repeat.
#[derive(Debug, Default)]
pub struct ScopeTracker {
    scopes: Vec<HashMap<String, Binding>>,
    annotations: Annotations,
    suffix: u32,
    /// Every reference seen so far, in parse order.
    reads: Vec<(NodeId, String)>,
    file: String,
}

impl ScopeTracker {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn into_annotations(self) -> Annotations {
        self.annotations
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn is_visible(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn in_innermost(&self, name: &str) -> Option<&Binding> {
        self.scopes.last().and_then(|scope| scope.get(name))
    }

    fn bind(&mut self, name: &str, alias: Option<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding { alias });
        }
    }

    /// Fresh generated name for `identifier`, bound in the innermost scope.
    fn rename(&mut self, identifier: &Identifier) {
        self.suffix += 1;
        let alias = if identifier.name == PLACEHOLDER {
            format!("{}{}", PLACEHOLDER, self.suffix)
        } else {
            format!("{}_{}", identifier.name, self.suffix)
        };
        self.annotations.renamed.insert(identifier.id, alias.clone());
        self.bind(&identifier.name, Some(alias));
    }

    /// `name` was referenced after `after` was allocated, i.e. by the
    /// initializer of the declaration being completed.
    fn read_since(&self, after: NodeId, name: &str) -> bool {
        self.reads
            .iter()
            .rev()
            .take_while(|(id, _)| *id > after)
            .any(|(_, read)| read == name)
    }

    /// Redeclaration inside the same block: keeps the existing binding's name.
    fn redeclare(&mut self, identifier: &Identifier) {
        self.annotations.redeclared.insert(identifier.id);
        let alias = self.in_innermost(&identifier.name).and_then(|b| b.alias.clone());
        if let Some(alias) = alias {
            self.annotations.renamed.insert(identifier.id, alias);
        }
    }
}

impl ParseHooks for ScopeTracker {
    fn on_create_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn on_destroy_scope(&mut self) {
        self.scopes.pop();
    }

    fn on_parameters(&mut self, parameters: &[Identifier]) {
        for parameter in parameters {
            // JS rejects repeated parameter names.
            if self.in_innermost(&parameter.name).is_some() {
                self.rename(parameter);
            } else {
                self.bind(&parameter.name, None);
            }
        }
    }

    fn on_local_declaration(
        &mut self,
        statement: NodeId,
        variables: &[Identifier],
        init: &[Expression],
    ) {
        let mut redeclared: Vec<&str> = Vec::new();
        let last_variable = variables.iter().map(|v| v.id).max().unwrap_or(statement);
        let bare_self_read = |name: &str| {
            variables.len() == 1 && init.len() == 1 && init[0].is_identifier(name)
        };

        for variable in variables {
            if variable.name == PLACEHOLDER {
                if self.is_visible(PLACEHOLDER) {
                    self.rename(variable);
                } else {
                    self.bind(PLACEHOLDER, None);
                }
                continue;
            }

            if self.in_innermost(&variable.name).is_some() {
                self.redeclare(variable);
                if !redeclared.contains(&variable.name.as_str()) {
                    redeclared.push(variable.name.as_str());
                }
                continue;
            }

            // `let a = a + 1` would read the new binding before it exists.
            let reads_itself = self.read_since(last_variable, &variable.name);
            let global_copy = !self.is_visible(&variable.name) && bare_self_read(&variable.name);
            if reads_itself && !global_copy {
                self.rename(variable);
            } else {
                self.bind(&variable.name, None);
            }
        }

        if redeclared.is_empty() {
            return;
        }
        self.annotations.duplicated.insert(statement);
        if redeclared.len() > 1 {
            tracing::warn!(
                file = %self.file,
                names = %redeclared.join(", "),
                "duplicated local declaration of several names in one statement"
            );
        }
    }

    fn on_local_function(&mut self, name: &Identifier) {
        if self.in_innermost(&name.name).is_some() {
            self.redeclare(name);
        } else {
            self.bind(&name.name, None);
        }
    }

    fn on_reference(&mut self, id: NodeId, name: &str) {
        self.reads.push((id, name.to_string()));
        let Some(binding) = self.lookup(name) else {
            return;
        };
        let alias = binding.alias.clone();
        self.annotations.local_references.insert(id);
        if let Some(alias) = alias {
            self.annotations.renamed.insert(id, alias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Chunk, StatementKind};
    use crate::parse::parse_chunk;

    fn track(source: &str) -> (Chunk, Annotations) {
        let mut tracker = ScopeTracker::new("test.lua");
        let chunk = parse_chunk(source, &mut tracker).unwrap();
        assert_eq!(tracker.depth(), 0);
        (chunk, tracker.into_annotations())
    }

    fn local_names(chunk: &Chunk, annotations: &Annotations) -> Vec<String> {
        chunk
            .body
            .iter()
            .filter_map(|s| match &s.kind {
                StatementKind::Local { variables, .. } => Some(variables),
                _ => None,
            })
            .flat_map(|vars| vars.iter().map(move |v| annotations.name_of(v).to_string()))
            .collect()
    }

    #[test]
    fn test_placeholder_gets_increasing_suffixes() {
        let (chunk, annotations) = track("local _ = 1\nlocal _ = 2\nlocal _, _ = 3, 4");
        assert_eq!(local_names(&chunk, &annotations), vec!["_", "_1", "_2", "_3"]);
        assert!(annotations.duplicated.is_empty());
    }

    #[test]
    fn test_placeholder_suffix_continues_from_outer_scope() {
        let (chunk, annotations) = track("local _ = 1\ndo local _ = 2 local _ = 3 end");
        let StatementKind::Do { body } = &chunk.body[1].kind else {
            panic!("expected do block");
        };
        let names: Vec<&str> = body
            .iter()
            .filter_map(|s| match &s.kind {
                StatementKind::Local { variables, .. } => Some(annotations.name_of(&variables[0])),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["_1", "_2"]);
    }

    #[test]
    fn test_same_block_redeclaration_is_duplicate() {
        let (chunk, annotations) = track("local a = 1\nlocal a = 2");
        assert!(!annotations.is_duplicated(chunk.body[0].id));
        assert!(annotations.is_duplicated(chunk.body[1].id));
    }

    #[test]
    fn test_inner_block_shadowing_is_not_duplicate() {
        let (chunk, annotations) = track("local a = 1\ndo local a = 2 end");
        let StatementKind::Do { body } = &chunk.body[1].kind else {
            panic!("expected do block");
        };
        assert!(!annotations.is_duplicated(body[0].id));
    }

    #[test]
    fn test_parameter_redeclaration_is_duplicate() {
        let (chunk, annotations) = track("function f(x)\nlocal x = x or 1\nend");
        let StatementKind::Function(function) = &chunk.body[0].kind else {
            panic!("expected function");
        };
        assert!(annotations.is_duplicated(function.body[0].id));
    }

    #[test]
    fn test_partial_duplicate_marks_only_redeclared_identifier() {
        let (chunk, annotations) = track("local a = 1\nlocal a, b = 2, 3");
        let StatementKind::Local { variables, .. } = &chunk.body[1].kind else {
            panic!("expected local");
        };
        assert!(annotations.is_redeclared(variables[0].id));
        assert!(!annotations.is_redeclared(variables[1].id));
    }

    #[test]
    fn test_parameter_placeholders_use_the_same_counter() {
        let (chunk, annotations) = track("local function f(_, _)\nlocal _ = 1\nend");
        let StatementKind::Function(function) = &chunk.body[0].kind else {
            panic!("expected function");
        };
        let params: Vec<&str> = function
            .parameters
            .iter()
            .map(|p| annotations.name_of(p))
            .collect();
        assert_eq!(params, vec!["_", "_1"]);
        let StatementKind::Local { variables, .. } = &function.body[0].kind else {
            panic!("expected local");
        };
        assert_eq!(annotations.name_of(&variables[0]), "_2");
    }

    #[test]
    fn test_local_function_name_is_declared() {
        let (chunk, annotations) = track("local function g() end\nlocal g = 1");
        assert!(annotations.is_duplicated(chunk.body[1].id));
    }

    #[test]
    fn test_shadow_reading_itself_gets_fresh_name() {
        let (chunk, annotations) = track("local a = 1\ndo local a = a + 1 print(a) end");
        let StatementKind::Do { body } = &chunk.body[1].kind else {
            panic!("expected do block");
        };
        let StatementKind::Local { variables, .. } = &body[0].kind else {
            panic!("expected local");
        };
        assert_eq!(annotations.name_of(&variables[0]), "a_1");
        assert!(!annotations.is_duplicated(body[0].id));
        assert!(annotations.renamed.values().filter(|n| n.as_str() == "a_1").count() >= 2);
    }

    #[test]
    fn test_global_copy_keeps_its_name() {
        let (chunk, annotations) = track("local print = print");
        assert_eq!(local_names(&chunk, &annotations), vec!["print"]);
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("class"), "_class");
        assert_eq!(escape_identifier("new"), "New");
        assert_eq!(escape_identifier("typeof"), "l2j.typeof");
        assert_eq!(escape_identifier("this"), "_this");
        assert_eq!(escape_identifier("value"), "value");
        assert_eq!(escape_property("this"), "this");
        assert_eq!(escape_property("default"), "_js_default");
    }
}
