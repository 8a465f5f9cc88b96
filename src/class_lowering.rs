//! Class Emulation Lowering
//!
//! Recognizes the Lua class idioms and lowers them:
//!
//! - `local M = {}` (or a local named like the file) becomes a runtime
//!   factory class named after the file.
//! - `class({...}, Parent)` / `class {...}` become native JS classes whose
//!   table fields are lowered in class mode.
//! - `class(Parent)` becomes a runtime factory class.
//! - `function T:m()` / `function T.m(self)` become prototype methods with
//!   the receiver bound to `this`.
//!
//! Factory classes declared at module level are sealed with one
//! `l2j.finishClass` call each before the module export.

use crate::ast::{Expression, ExpressionKind, Function, Identifier, Indexer, TableField, TableFieldKind};
use crate::classify::CallSite;
use crate::codegen::{GenResult, GenerateError, Generator};
use crate::scope::{escape_identifier, escape_property};

fn is_table(expression: &Expression) -> bool {
    matches!(expression.kind, ExpressionKind::Table { .. })
}

fn is_empty_table(expression: &Expression) -> bool {
    matches!(&expression.kind, ExpressionKind::Table { fields } if fields.is_empty())
}

/// `class(...)` with a table as first argument.
fn native_class_site(expression: &Expression) -> Option<CallSite<'_>> {
    let site = CallSite::from_expression(expression)?;
    let native = site.base.is_identifier("class")
        && site.arguments.first().map(|a| is_table(a)).unwrap_or(false);
    native.then_some(site)
}

impl<'a> Generator<'a> {
    // =========================================================================
    // Declared class set
    // =========================================================================

    pub(crate) fn declare_class(&mut self, name: &str) {
        if !self.declared_classes.iter().any(|c| c == name) {
            self.declared_classes.push(name.to_string());
        }
    }

    pub(crate) fn finish_classes(&self) -> String {
        self.declared_classes
            .iter()
            .map(|class| format!("l2j.finishClass({});\n", class))
            .collect()
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// `local X = {}` module tables and `local X = class(...)`.
    pub(crate) fn lower_local_class(
        &mut self,
        variables: &[Identifier],
        init: &[Expression],
    ) -> Result<Option<String>, GenerateError> {
        let ([variable], [value]) = (variables, init) else {
            return Ok(None);
        };
        let name = escape_identifier(self.annotations.name_of(variable));

        let is_module_name = variable.name == "M" || variable.name == self.file_name;
        if self.is_top_scope() && is_module_name && is_empty_table(value) {
            self.declare_class(&name);
            return Ok(Some(format!(
                "let {} = l2j.createClass(\"{}\")",
                name, self.file_name
            )));
        }

        if let Some(site) = native_class_site(value) {
            return self.lower_class(Some(&name), &site).map(Some);
        }

        let Some(site) = CallSite::from_expression(value) else {
            return Ok(None);
        };
        if !site.base.is_identifier("class") || site.arguments.is_empty() {
            return Ok(None);
        }
        if self.is_top_scope() {
            self.declare_class(&name);
        }
        let arguments = self.generate_list(&site.arguments)?.join(", ");
        Ok(Some(format!("let {} = l2j.createClass({})", name, arguments)))
    }

    /// `X = class {...}` and `a.X = class({...}, P)`.
    pub(crate) fn lower_assigned_class(
        &mut self,
        variables: &[Expression],
        init: &[Expression],
    ) -> Result<Option<String>, GenerateError> {
        let ([target], [value]) = (variables, init) else {
            return Ok(None);
        };
        let Some(site) = native_class_site(value) else {
            return Ok(None);
        };

        match &target.kind {
            ExpressionKind::Identifier { name } => {
                let class_name = escape_identifier(self.annotations.resolve(target.id, name));
                let is_global = self.registries.is_global_read(name)
                    && !self.annotations.is_local_reference(target.id)
                    && !self.is_parameter(name);
                let prefix = if is_global {
                    "globalThis."
                } else {
                    ""
                };
                let class = self.lower_class(Some(&class_name), &site)?;
                Ok(Some(format!("{}{} = {}", prefix, class_name, class)))
            }
            _ => {
                let target = self.generate_expression(target)?;
                let class = self.lower_class(None, &site)?;
                Ok(Some(format!("{} = {}", target, class)))
            }
        }
    }

    /// Native class from `class({fields}, Parent)`.
    pub(crate) fn lower_class(&mut self, name: Option<&str>, site: &CallSite<'_>) -> GenResult {
        let Some(ExpressionKind::Table { fields }) = site.arguments.first().map(|a| &a.kind) else {
            return Err(GenerateError::UnsupportedNode("ClassDeclaration"));
        };
        // Members first: the parent argument follows the table in the source.
        let members = self.lower_class_body(fields);
        let parent = match site.arguments.get(1) {
            Some(parent) => Some(self.generate_operand_base(parent)?),
            None => None,
        };

        let mut heading = "class".to_string();
        if let Some(name) = name {
            heading.push(' ');
            heading.push_str(name);
        }
        if let Some(parent) = parent {
            heading.push_str(" extends ");
            heading.push_str(&parent);
        }

        Ok(format!("{} {{\n{}\n}}", heading, members))
    }

    fn lower_class_body(&mut self, fields: &[TableField]) -> String {
        let saved = std::mem::replace(&mut self.value_context, true);
        let mut members = Vec::with_capacity(fields.len());
        for field in fields {
            let before = self.comments.before(field.loc);
            let member = match self.lower_class_member(field) {
                Ok(member) => member,
                Err(error) => self.contain(error, field.loc),
            };
            let after = self.comments.after(field.loc);
            members.push(format!("{}{}{}", before, member, after));
        }
        self.value_context = saved;
        members.join("\n")
    }

    fn lower_class_member(&mut self, field: &TableField) -> GenResult {
        match &field.kind {
            TableFieldKind::KeyString { key, value } => {
                self.lower_class_entry(escape_property(&key.name), value)
            }
            TableFieldKind::Key { key, value } => {
                let key = self.generate_expression(key)?;
                self.lower_class_entry(format!("[{}]", key), value)
            }
            TableFieldKind::Value { .. } => {
                Err(GenerateError::UnsupportedClassMember("positional field"))
            }
        }
    }

    fn lower_class_entry(&mut self, key: String, value: &Expression) -> GenResult {
        let ExpressionKind::Function(function) = &value.kind else {
            let value = self.generate_expression(value)?;
            return Ok(format!("{} = {};", key, value));
        };

        let (is_static, receiver, parameters) = match function.first_parameter() {
            Some("self") => (false, Some("self"), &function.parameters[1..]),
            Some("cls") => (true, Some("cls"), &function.parameters[1..]),
            _ => (false, None, &function.parameters[..]),
        };
        let (params, body) = self.lower_function_parts(function, parameters, receiver)?;
        let modifier = if is_static { "static " } else { "" };
        Ok(format!("{}{}({}) {{{}}}", modifier, key, params, body))
    }

    // =========================================================================
    // Function statements
    // =========================================================================

    pub(crate) fn lower_function_statement(&mut self, function: &Function) -> GenResult {
        let Some(target) = function.identifier.as_deref() else {
            return Err(GenerateError::UnsupportedNode("FunctionDeclaration"));
        };

        match &target.kind {
            ExpressionKind::Identifier { name } => {
                let (params, body) = self.lower_function_parts(function, &function.parameters, None)?;
                let name = escape_identifier(self.annotations.resolve(target.id, name));
                if function.is_local && self.annotations.is_redeclared(target.id) {
                    return Ok(format!("{} = function ({}){{{}}}", name, params, body));
                }
                let declaration = format!("function {}({}){{{}}}", name, params, body);
                if function.is_local {
                    Ok(declaration)
                } else {
                    Ok(format!("{0}\n_G.{1} = {1};\n", declaration, name))
                }
            }
            ExpressionKind::Member {
                base,
                indexer,
                identifier,
            } => {
                let (receiver, parameters, via_prototype) = match (indexer, function.first_parameter()) {
                    (Indexer::Colon, _) => (Some("self"), &function.parameters[..], true),
                    (Indexer::Dot, Some("self")) => (Some("self"), &function.parameters[1..], true),
                    (Indexer::Dot, Some("cls")) => (Some("cls"), &function.parameters[1..], false),
                    (Indexer::Dot, _) => (None, &function.parameters[..], false),
                };

                let base = self.generate_operand_base(base)?;
                let method = escape_property(&identifier.name);
                let target = if via_prototype {
                    format!("{}.prototype.{}", base, method)
                } else {
                    format!("{}.{}", base, method)
                };

                let (params, body) = self.lower_function_parts(function, parameters, receiver)?;
                Ok(format!("{} = function ({}){{{}}}", target, params, body))
            }
            _ => Err(GenerateError::UnsupportedNode("FunctionDeclaration")),
        }
    }
}
