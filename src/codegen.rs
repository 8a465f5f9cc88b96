//! Codegen Module for the Lua translator
//!
//! Single-pass recursive lowering of the Lua syntax tree into JavaScript
//! text. All per-file state lives in `Generator`; flags that change meaning
//! for a sub-tree (operator mode in loop headers, the receiver inside method
//! bodies, value context inside declarations) are saved and restored around
//! that sub-tree.
//!
//! Call-site lowering lives in `classify`, class emulation in
//! `class_lowering`; both extend `Generator` with further `impl` blocks.

use thiserror::Error;

use crate::ast::*;
use crate::comments::CommentInterleaver;
use crate::registry::Registries;
use crate::scope::{escape_identifier, escape_property, Annotations, LUA_GLOBAL_LIB, LUA_SYSTEM_LIB};
use crate::transform::TranspileOptions;

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS & RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure to lower one node. Contained at the statement (or class member)
/// boundary and rendered as an inline comment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    #[error("Unsupported AST node type: {0}")]
    UnsupportedNode(&'static str),
    #[error("Unsupported class member: {0}")]
    UnsupportedClassMember(&'static str),
    #[error("Unsupported iterator: {0}")]
    UnsupportedIterator(String),
    #[error("Unsupported goto target: {0}")]
    UnsupportedGoto(String),
    #[error("Unsupported {0} outside a function body")]
    OutsideFunction(&'static str),
}

pub type GenResult = Result<String, GenerateError>;

/// A contained generation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Everything one file's walk produced.
#[derive(Debug, Clone)]
pub struct GeneratedModule {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
    pub declared_classes: Vec<String>,
}

/// Where a call expression sits; `error(...)` lowers differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPosition {
    Statement,
    Expression,
}

/// Receiver (`self` / `cls`) of the method currently being generated.
#[derive(Debug, Clone)]
pub(crate) struct Receiver {
    pub(crate) name: String,
    /// Function depth of the method body itself.
    pub(crate) depth: usize,
    /// Set once a nested function referenced the receiver.
    pub(crate) captured: bool,
}

pub(crate) const RECEIVER_ALIAS: &str = "thisArg";

// ═══════════════════════════════════════════════════════════════════════════════
// GENERATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Generator<'a> {
    pub(crate) options: &'a TranspileOptions,
    pub(crate) registries: &'a mut Registries,
    pub(crate) annotations: &'a Annotations,
    pub(crate) comments: CommentInterleaver,
    pub(crate) file_path: String,
    /// Base name of the source file without extension.
    pub(crate) file_name: String,
    pub(crate) operator_mode: bool,
    pub(crate) declared_classes: Vec<String>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) exported: bool,

    // Traversal context
    pub(crate) block_depth: usize,
    pub(crate) function_depth: usize,
    pub(crate) receiver: Option<Receiver>,
    pub(crate) parameters: Vec<Vec<String>>,
    pub(crate) value_context: bool,
    /// Per enclosing loop: the label ending its body, if any.
    pub(crate) loop_labels: Vec<Option<String>>,
}

impl<'a> Generator<'a> {
    pub fn new(
        file_path: &str,
        options: &'a TranspileOptions,
        registries: &'a mut Registries,
        annotations: &'a Annotations,
        comments: Vec<Comment>,
    ) -> Self {
        let file_name = std::path::Path::new(&file_path.replace('\\', "/"))
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        Self {
            options,
            registries,
            annotations,
            comments: CommentInterleaver::new(comments),
            file_path: file_path.to_string(),
            file_name,
            operator_mode: options.operator_mode.is_enabled_for(file_path),
            declared_classes: Vec::new(),
            diagnostics: Vec::new(),
            exported: false,
            block_depth: 0,
            function_depth: 0,
            receiver: None,
            parameters: Vec::new(),
            value_context: false,
            loop_labels: Vec::new(),
        }
    }

    pub fn generate_chunk(mut self, chunk: &Chunk) -> GeneratedModule {
        let statements: Vec<String> = chunk
            .body
            .iter()
            .map(|s| self.generate_statement(s))
            .collect();
        let mut code = statements.join(";\n");

        // A module without a trailing return still seals its factory classes.
        if !self.exported && !self.declared_classes.is_empty() {
            if !code.is_empty() {
                code.push_str(";\n");
            }
            code.push_str(&self.finish_classes());
        }

        let tail = self.comments.flush();
        if !tail.is_empty() {
            code.push('\n');
            code.push_str(&tail);
        }

        GeneratedModule {
            code,
            diagnostics: self.diagnostics,
            declared_classes: self.declared_classes,
        }
    }

    // =========================================================================
    // Context queries
    // =========================================================================

    /// Directly in the chunk body, outside any block or function.
    pub(crate) fn is_top_scope(&self) -> bool {
        self.block_depth == 0
    }

    pub(crate) fn is_parameter(&self, name: &str) -> bool {
        self.parameters
            .iter()
            .any(|params| params.iter().any(|p| p == name))
    }

    pub(crate) fn is_value_type(&self, name: &str) -> bool {
        self.options.value_types.iter().any(|v| v == name)
    }

    /// Receiver token for `name` if it is the active method receiver.
    fn receiver_token(&mut self, name: &str) -> Option<&'static str> {
        let depth = self.function_depth;
        let receiver = self.receiver.as_mut()?;
        if receiver.name != name {
            return None;
        }
        if receiver.depth == depth {
            Some("this")
        } else {
            receiver.captured = true;
            Some(RECEIVER_ALIAS)
        }
    }

    /// Record a contained failure and render it in place of the node.
    pub(crate) fn contain(&mut self, error: GenerateError, loc: Location) -> String {
        let message = error.to_string();
        self.diagnostics.push(Diagnostic {
            message: message.clone(),
            line: loc.start.line,
            column: loc.start.column,
        });
        format!("/* {} */", message.replace("*/", "* /"))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn generate_statement(&mut self, statement: &Statement) -> String {
        let mut out = self.comments.before(statement.loc);
        match self.lower_statement(statement) {
            Ok(code) => out.push_str(&code),
            Err(error) => {
                let rendered = self.contain(error, statement.loc);
                out.push_str(&rendered);
            }
        }
        out.push_str(&self.comments.after(statement.loc));
        out
    }

    pub(crate) fn generate_block(&mut self, body: &[Statement]) -> String {
        self.block_depth += 1;
        let statements: Vec<String> = body.iter().map(|s| self.generate_statement(s)).collect();
        self.block_depth -= 1;
        statements.join(";\n")
    }

    fn generate_loop_body(&mut self, body: &[Statement]) -> String {
        let label = match body.last().map(|s| &s.kind) {
            Some(StatementKind::Label { label }) => Some(label.name.clone()),
            _ => None,
        };
        self.loop_labels.push(label);
        let code = self.generate_block(body);
        self.loop_labels.pop();
        code
    }

    fn lower_statement(&mut self, statement: &Statement) -> GenResult {
        match &statement.kind {
            StatementKind::Local { variables, init } => self.lower_local(statement, variables, init),
            StatementKind::Assignment { variables, init } => self.lower_assignment(variables, init),
            StatementKind::Call { expression } => {
                self.generate_call(expression, CallPosition::Statement)
            }
            StatementKind::Function(function) => self.lower_function_statement(function),
            StatementKind::Return { .. } if self.function_depth == 0 && !self.is_top_scope() => {
                // Modules cannot return early.
                Err(GenerateError::OutsideFunction(statement.kind.type_name()))
            }
            StatementKind::Return { arguments } => self.lower_return(arguments),
            StatementKind::Break => Ok("break".to_string()),
            StatementKind::Goto { label } => {
                if self.loop_labels.last() == Some(&Some(label.name.clone())) {
                    Ok("continue".to_string())
                } else {
                    Err(GenerateError::UnsupportedGoto(label.name.clone()))
                }
            }
            StatementKind::Label { label } => {
                if self.loop_labels.last() == Some(&Some(label.name.clone())) {
                    Ok(String::new())
                } else {
                    Err(GenerateError::UnsupportedNode("LabelStatement"))
                }
            }
            StatementKind::Do { body } => Ok(format!("{{{}}}", self.generate_block(body))),
            StatementKind::While { condition, body } => {
                let condition = self.generate_expression(condition)?;
                let body = self.generate_loop_body(body);
                Ok(format!("while ({}) {{{}}}", condition, body))
            }
            StatementKind::Repeat { body, condition } => {
                let body = self.generate_loop_body(body);
                let condition = self.generate_expression(condition)?;
                Ok(format!("do {{{}}} while (!({}))", body, condition))
            }
            StatementKind::If { clauses } => self.lower_if(clauses),
            StatementKind::ForNumeric {
                variable,
                start,
                end,
                step,
                body,
            } => self.lower_for_numeric(variable, start, end, step.as_ref(), body),
            StatementKind::ForGeneric {
                variables,
                iterators,
                body,
            } => self.lower_for_generic(variables, iterators, body),
        }
    }

    fn lower_if(&mut self, clauses: &[IfClause]) -> GenResult {
        let mut parts = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let condition = match &clause.condition {
                Some(condition) => Some(self.generate_expression(condition)?),
                None => None,
            };
            let body = self.generate_block(&clause.body);
            let code = match (clause.kind, condition) {
                (ClauseKind::If, Some(c)) => format!("if ({}) {{{}}}", c, body),
                (ClauseKind::ElseIf, Some(c)) => format!("else if ({}) {{{}}}", c, body),
                (ClauseKind::Else, _) => format!("else {{{}}}", body),
                _ => return Err(GenerateError::UnsupportedNode("IfClause")),
            };
            parts.push(code);
        }
        Ok(parts.join("\n"))
    }

    fn lower_for_numeric(
        &mut self,
        variable: &Identifier,
        start: &Expression,
        end: &Expression,
        step: Option<&Expression>,
        body: &[Statement],
    ) -> GenResult {
        // Loop bounds are numbers; operator mode stays off for the header.
        let saved = self.operator_mode;
        self.operator_mode = false;
        let header = self.for_numeric_header(variable, start, end, step);
        self.operator_mode = saved;
        let header = header?;

        let body = self.generate_loop_body(body);
        Ok(format!("{} {{{}}}", header, body))
    }

    fn for_numeric_header(
        &mut self,
        variable: &Identifier,
        start: &Expression,
        end: &Expression,
        step: Option<&Expression>,
    ) -> GenResult {
        let name = escape_identifier(self.annotations.name_of(variable));
        let descending = step.map(is_negative_literal).unwrap_or(false);

        // Heuristic: `for i = 1, n` is usually an index loop, rebase to 0.
        let (start_text, compare) = if start.is_number(1.0) {
            self.generate_expression(start)?;
            ("0".to_string(), if descending { ">" } else { "<" })
        } else {
            (
                self.generate_expression(start)?,
                if descending { ">=" } else { "<=" },
            )
        };
        let end_text = self.generate_expression(end)?;
        let step_text = match step {
            Some(step) => self.generate_expression(step)?,
            None => "1".to_string(),
        };

        Ok(format!(
            "for (let {v} = {start}; {v} {cmp} {end}; {v} = {v} + {step})",
            v = name,
            start = start_text,
            cmp = compare,
            end = end_text,
            step = step_text
        ))
    }

    fn lower_for_generic(
        &mut self,
        variables: &[Identifier],
        iterators: &[Expression],
        body: &[Statement],
    ) -> GenResult {
        if iterators.len() != 1 {
            return Err(GenerateError::UnsupportedIterator(format!(
                "{} iterator expressions",
                iterators.len()
            )));
        }
        let iterator = &iterators[0];

        let source = match &iterator.kind {
            ExpressionKind::Call { base, arguments }
                if base.is_identifier("pairs") || base.is_identifier("ipairs") =>
            {
                let name = base.identifier_name().unwrap_or("pairs");
                let refs: Vec<&Expression> = arguments.iter().collect();
                let arguments = self.generate_list(&refs)?.join(", ");
                format!("l2j.{}({})", name, arguments)
            }
            _ => self.generate_expression(iterator)?,
        };

        let names: Vec<String> = variables
            .iter()
            .map(|v| escape_identifier(self.annotations.name_of(v)))
            .collect();
        let target = if names.len() == 1 {
            names[0].clone()
        } else {
            format!("[{}]", names.join(", "))
        };

        let body = self.generate_loop_body(body);
        Ok(format!("for (let {} of {}) {{{}}}", target, source, body))
    }

    fn lower_return(&mut self, arguments: &[Expression]) -> GenResult {
        // `return nil, err` is the Lua failure convention.
        if arguments.len() == 2 && arguments[0].is_nil() {
            let message = self.generate_expression(&arguments[1])?;
            return Ok(format!("throw new Error({})", message));
        }

        let refs: Vec<&Expression> = arguments.iter().collect();
        let packed = self.pack(&refs)?;

        if self.is_top_scope() {
            self.exported = true;
            let finish = self.finish_classes();
            let value = if packed.trim().is_empty() {
                "undefined".to_string()
            } else {
                packed
            };
            let export = if self.options.as_esm {
                format!("export default {}", value)
            } else {
                format!("exports.default = {}", value)
            };
            return Ok(format!("{}{}", finish, export));
        }

        if packed.is_empty() {
            Ok("return".to_string())
        } else if packed.starts_with(['\n', '/']) {
            // Leading line breaks would end the statement after `return`.
            Ok(format!("return ({})", packed))
        } else {
            Ok(format!("return {}", packed))
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn lower_local(
        &mut self,
        statement: &Statement,
        variables: &[Identifier],
        init: &[Expression],
    ) -> GenResult {
        if let Some(code) = self.lower_local_class(variables, init)? {
            return Ok(code);
        }

        let names: Vec<String> = variables
            .iter()
            .map(|v| escape_identifier(self.annotations.name_of(v)))
            .collect();

        let duplicated = self.annotations.is_duplicated(statement.id);
        let mut preamble = String::new();
        let prefix = if !duplicated {
            "let "
        } else {
            // Fresh names of a partially redeclared group still need a binding.
            let fresh: Vec<&str> = variables
                .iter()
                .zip(&names)
                .filter(|(v, _)| !self.annotations.is_redeclared(v.id))
                .map(|(_, n)| n.as_str())
                .collect();
            if !fresh.is_empty() {
                preamble = format!("let {};\n", fresh.join(", "));
            }
            ""
        };

        if init.is_empty() {
            let code = if prefix.is_empty() {
                names
                    .iter()
                    .map(|n| format!("{} = undefined", n))
                    .collect::<Vec<_>>()
                    .join(";\n")
            } else {
                format!("let {}", names.join(", "))
            };
            return Ok(format!("{}{}", preamble, code));
        }

        let single = if variables.len() == 1 {
            Some(variables[0].name.as_str())
        } else {
            None
        };

        let saved = self.value_context;
        self.value_context = true;
        let result = self.lower_binding(true, prefix, names, single, init);
        self.value_context = saved;
        Ok(format!("{}{}", preamble, result?))
    }

    fn lower_assignment(&mut self, variables: &[Expression], init: &[Expression]) -> GenResult {
        if let Some(code) = self.lower_length_append(variables, init)? {
            return Ok(code);
        }
        if let Some(code) = self.lower_assigned_class(variables, init)? {
            return Ok(code);
        }

        let saved = self.value_context;
        self.value_context = true;
        let result = self.lower_assignment_inner(variables, init);
        self.value_context = saved;
        result
    }

    fn lower_assignment_inner(&mut self, variables: &[Expression], init: &[Expression]) -> GenResult {
        let mut targets = Vec::with_capacity(variables.len());
        for variable in variables {
            targets.push(self.generate_expression(variable)?);
        }
        let single = match variables {
            [only] => only.identifier_name(),
            _ => None,
        };
        let local_target = matches!(variables, [only] if self.annotations.is_local_reference(only.id));
        self.lower_binding(local_target, "", targets, single, init)
    }

    /// `t[#t + 1] = v`
    fn lower_length_append(&mut self, variables: &[Expression], init: &[Expression]) -> Result<Option<String>, GenerateError> {
        let ([target], [value]) = (variables, init) else {
            return Ok(None);
        };
        let ExpressionKind::Index { base, index } = &target.kind else {
            return Ok(None);
        };
        let ExpressionKind::Binary {
            operator: BinaryOp::Add,
            left,
            right,
        } = &index.kind
        else {
            return Ok(None);
        };

        let is_length_of = |e: &Expression| {
            matches!(&e.kind, ExpressionKind::Unary { operator: UnaryOp::Len, argument } if same_reference(argument, base))
        };
        let matches = (is_length_of(left) && right.is_number(1.0))
            || (is_length_of(right) && left.is_number(1.0));
        if !matches {
            return Ok(None);
        }

        self.registries.record_system_function("table", "insert");
        let table = self.generate_operand_base(base)?;
        let value = self.generate_expression(value)?;
        Ok(Some(format!("l2j.table.insert({}, {})", table, value)))
    }

    /// Shared tail of `local` and assignment lowering.
    fn lower_binding(
        &mut self,
        local: bool,
        prefix: &str,
        targets: Vec<String>,
        single: Option<&str>,
        init: &[Expression],
    ) -> GenResult {
        let vars = if targets.len() == 1 {
            targets[0].clone()
        } else {
            format!("[{}]", targets.join(", "))
        };

        if targets.len() > 1 || init.len() > 1 {
            let refs: Vec<&Expression> = init.iter().collect();
            let packed = match init {
                // A lone plain value cannot be destructured.
                [only] if !is_multi_value(only) => format!("[{}]", self.generate_expression(only)?),
                _ => self.pack(&refs)?,
            };
            let packed = packed.replacen("l2j.string.find(", "l2j.string.findWithRet(", 1);
            return Ok(format!("{}{} = {}", prefix, vars, packed));
        }

        let value_node = &init[0];
        let mut value = self.generate_expression(value_node)?;
        let mut prefix = prefix.to_string();
        let mut vars = vars;

        let Some(name) = single else {
            return Ok(format!("{}{} = {}", prefix, vars, value));
        };

        let mut create_class = false;
        if !local
            && (self.registries.is_global_read(name) || self.is_value_type(name))
            && !LUA_GLOBAL_LIB.contains(name)
            && !is_global_lib_value(value_node)
            && value.trim() != vars
            && !self.is_parameter(name)
        {
            prefix = "globalThis.".to_string();
            create_class = !value.contains("l2j.require");
            if !self.registries.record_initialized_global(name) {
                tracing::warn!(
                    file = %self.file_path,
                    global = %name,
                    "global initialized more than once in this run"
                );
                create_class = false;
            }
        }

        if name == "M" || name == self.file_name || create_class {
            if !self.is_top_scope() || !can_become_class(value_node, &value, name, &self.file_name) {
                return Ok(format!("{}{} = {}", prefix, vars, value));
            }
            self.declare_class(&vars);
            return Ok(format!("{}{} = l2j.createClass({})", prefix, vars, value));
        }

        if let Some(source) = value_node.identifier_name() {
            if (LUA_GLOBAL_LIB.contains(source) || source == name)
                && !LUA_SYSTEM_LIB.contains(source)
                && !self.annotations.is_local_reference(value_node.id)
                && !self.is_parameter(source)
            {
                value = format!("globalThis.{}", value);
            }
        } else if value.trim_start().starts_with("l2j.string.find(") {
            vars = format!("[{}]", vars);
            value = value.replacen("l2j.string.find(", "l2j.string.findWithRet(", 1);
        }

        Ok(format!("{}{} = {}", prefix, vars, value))
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Lowers parameters and body of `function`. When `receiver` names the
    /// method receiver, references to it become `this` (or the captured alias
    /// inside nested functions).
    pub(crate) fn lower_function_parts(
        &mut self,
        function: &Function,
        parameters: &[Identifier],
        receiver: Option<&str>,
    ) -> Result<(String, String), GenerateError> {
        self.function_depth += 1;
        let depth = self.function_depth;

        let shadows_receiver = receiver.is_none()
            && self
                .receiver
                .as_ref()
                .map(|r| parameters.iter().any(|p| p.name == r.name))
                .unwrap_or(false);
        let installed = match receiver {
            Some(name) => Some(self.receiver.replace(Receiver {
                name: name.to_string(),
                depth,
                captured: false,
            })),
            None if shadows_receiver => Some(self.receiver.take()),
            None => None,
        };

        let saved_value_context = std::mem::replace(&mut self.value_context, false);
        let saved_labels = std::mem::take(&mut self.loop_labels);
        self.parameters
            .push(function.parameters.iter().map(|p| p.name.clone()).collect());

        let params = parameter_list(self.annotations, parameters, function.is_vararg);
        let body = self.generate_block(&function.body);

        let captured = receiver.is_some() && self.receiver.as_ref().map(|r| r.captured).unwrap_or(false);

        self.parameters.pop();
        self.loop_labels = saved_labels;
        self.value_context = saved_value_context;
        if let Some(previous) = installed {
            self.receiver = previous;
        }
        self.function_depth -= 1;

        let body = if captured {
            format!("let {} = this;\n{}", RECEIVER_ALIAS, body)
        } else {
            body
        };
        Ok((params, body))
    }

    fn lower_function_expression(&mut self, function: &Function) -> GenResult {
        let (params, body) = self.lower_function_parts(function, &function.parameters, None)?;
        Ok(format!("function ({}){{{}}}", params, body))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub(crate) fn generate_expression(&mut self, expression: &Expression) -> GenResult {
        let before = self.comments.before(expression.loc);
        let code = self.lower_expression(expression)?;
        let after = self.comments.after(expression.loc);
        Ok(format!("{}{}{}", before, code, after))
    }

    fn lower_expression(&mut self, expression: &Expression) -> GenResult {
        match &expression.kind {
            ExpressionKind::Identifier { name } => {
                let annotations = self.annotations;
                Ok(self.identifier(annotations.resolve(expression.id, name)))
            }
            ExpressionKind::Nil => Ok("undefined".to_string()),
            ExpressionKind::Boolean { value } => Ok(value.to_string()),
            ExpressionKind::Number { value, raw } => Ok(number_literal(*value, raw)),
            ExpressionKind::String { raw } => Ok(translate_string(raw)),
            ExpressionKind::Vararg => Ok("varargs[0]".to_string()),
            ExpressionKind::Function(function) => self.lower_function_expression(function),
            ExpressionKind::Table { fields } => self.lower_table(fields),
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => self.lower_binary(*operator, left, right),
            ExpressionKind::Logical {
                operator,
                left,
                right,
            } => self.lower_logical(*operator, left, right),
            ExpressionKind::Unary { operator, argument } => self.lower_unary(*operator, argument),
            ExpressionKind::Member {
                base, identifier, ..
            } => self.lower_member(base, identifier),
            ExpressionKind::Index { base, index } => {
                let base = self.generate_operand_base(base)?;
                let index = self.generate_expression(index)?;
                Ok(format!("{}[{}]", base, index))
            }
            ExpressionKind::Call { .. }
            | ExpressionKind::TableCall { .. }
            | ExpressionKind::StringCall { .. } => {
                self.generate_call(expression, CallPosition::Expression)
            }
        }
    }

    pub(crate) fn identifier(&mut self, name: &str) -> String {
        if let Some(token) = self.receiver_token(name) {
            return token.to_string();
        }
        if LUA_SYSTEM_LIB.contains(name) && !self.is_parameter(name) {
            return format!("l2j.{}", name);
        }
        escape_identifier(name)
    }

    /// Base of a member, index or call, parenthesized where JS needs it.
    pub(crate) fn generate_operand_base(&mut self, base: &Expression) -> GenResult {
        let code = self.generate_expression(base)?;
        match base.kind {
            ExpressionKind::Number { .. }
            | ExpressionKind::String { .. }
            | ExpressionKind::Function(_)
            | ExpressionKind::Table { .. }
            | ExpressionKind::Unary { .. } => Ok(format!("({})", code)),
            _ => Ok(code),
        }
    }

    fn lower_member(&mut self, base: &Expression, identifier: &Identifier) -> GenResult {
        if let Some(library) = base.identifier_name() {
            if LUA_SYSTEM_LIB.contains(library) && !self.is_parameter(library) {
                self.registries
                    .record_system_function(library, &identifier.name);
            }
        }
        let base = self.generate_operand_base(base)?;
        Ok(format!("{}.{}", base, escape_property(&identifier.name)))
    }

    fn lower_binary(&mut self, operator: BinaryOp, left: &Expression, right: &Expression) -> GenResult {
        let has_string = left.is_string_literal() || right.is_string_literal();
        let left = self.binary_operand(operator, left)?;
        let right = self.binary_operand(operator, right)?;

        if self.operator_mode && !has_string {
            let runtime = match operator {
                BinaryOp::Add => Some("l2j.add"),
                BinaryOp::Sub => Some("l2j.sub"),
                BinaryOp::Mul => Some("l2j.mul"),
                BinaryOp::Div => Some("l2j.div"),
                BinaryOp::Eq => Some("l2j.eq"),
                BinaryOp::Ne => Some("!l2j.eq"),
                _ => None,
            };
            if let Some(runtime) = runtime {
                return Ok(format!("{}({}, {})", runtime, left, right));
            }
        }

        match operator {
            BinaryOp::FloorDiv => Ok(format!("Math.floor({} / {})", left, right)),
            _ => Ok(format!("({} {} {})", left, operator.as_js(), right)),
        }
    }

    fn binary_operand(&mut self, operator: BinaryOp, operand: &Expression) -> GenResult {
        // `type(x) == "table"`: tables are JS objects at runtime.
        if operator.is_comparison() && operand.string_token() == Some("table") {
            let before = self.comments.before(operand.loc);
            let after = self.comments.after(operand.loc);
            return Ok(format!("{}\"object\"{}", before, after));
        }
        self.generate_expression(operand)
    }

    fn lower_logical(&mut self, operator: LogicalOp, left: &Expression, right: &Expression) -> GenResult {
        // `a and b or c` is the Lua ternary.
        if operator == LogicalOp::Or && !matches!(right.kind, ExpressionKind::Logical { .. }) {
            if let ExpressionKind::Logical {
                operator: LogicalOp::And,
                left: condition,
                right: consequent,
            } = &left.kind
            {
                let condition = self.generate_expression(condition)?;
                let consequent = self.generate_expression(consequent)?;
                let alternate = self.generate_expression(right)?;
                return Ok(format!(
                    "(l2j.condition({}) ? ({}) : ({}))",
                    condition, consequent, alternate
                ));
            }
        }

        let repeatable = is_repeatable(left);
        let left = self.generate_expression(left)?;
        let right = self.generate_expression(right)?;
        if self.value_context {
            // The left operand is evaluated once; anything else goes through
            // the runtime with the right operand deferred.
            return Ok(match (operator, repeatable) {
                (LogicalOp::And, true) => format!("(l2j.condition({0}) ? {1} : {0})", left, right),
                (LogicalOp::Or, true) => format!("(l2j.condition({0}) ? {0} : {1})", left, right),
                (LogicalOp::And, false) => format!("l2j.and({}, () => ({}))", left, right),
                (LogicalOp::Or, false) => format!("l2j.or({}, () => ({}))", left, right),
            });
        }
        Ok(format!("({} {} {})", left, operator.as_js(), right))
    }

    fn lower_unary(&mut self, operator: UnaryOp, argument: &Expression) -> GenResult {
        let code = self.generate_expression(argument)?;
        match operator {
            UnaryOp::Not => Ok(format!("!{}", code)),
            UnaryOp::Len => Ok(format!("l2j.table.length({})", code)),
            UnaryOp::BitNot => Ok(format!("~{}", code)),
            UnaryOp::Neg if self.operator_mode => Ok(format!("l2j.neg({})", code)),
            UnaryOp::Neg if code.starts_with('-') => Ok(format!("-({})", code)),
            UnaryOp::Neg => Ok(format!("-{}", code)),
        }
    }

    fn lower_table(&mut self, fields: &[TableField]) -> GenResult {
        if fields.is_empty() {
            return Ok("{}".to_string());
        }

        if fields.iter().all(|f| f.kind.is_positional()) {
            let values: Vec<&Expression> = fields.iter().map(|f| f.kind.value()).collect();
            let spreads = values.last().map(|v| v.is_vararg()).unwrap_or(false);
            let items = self.generate_list(&values)?;
            if spreads {
                return Ok(format!("l2j.convertJsArrayToLuaTable([{}])", items.join(", ")));
            }
            let entries: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}: {}", i + 1, item))
                .collect();
            return Ok(format!("{{{}}}", entries.join(", ")));
        }

        let mut position = 0;
        let mut entries = Vec::with_capacity(fields.len());
        for field in fields {
            let entry = match &field.kind {
                TableFieldKind::Value { value } => {
                    position += 1;
                    format!("{}: {}", position, self.generate_expression(value)?)
                }
                TableFieldKind::KeyString { key, value } => {
                    format!("{}: {}", escape_property(&key.name), self.generate_expression(value)?)
                }
                TableFieldKind::Key { key, value } => {
                    let key = self.generate_expression(key)?;
                    format!("[{}]: {}", key, self.generate_expression(value)?)
                }
            };
            entries.push(entry);
        }
        Ok(format!("{{{}}}", entries.join(", ")))
    }

    // =========================================================================
    // Multi-value packing
    // =========================================================================

    /// Lowers a value list; a trailing vararg spreads the whole capture.
    pub(crate) fn generate_list(&mut self, values: &[&Expression]) -> Result<Vec<String>, GenerateError> {
        let mut out = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            if value.is_vararg() && i + 1 == values.len() {
                out.push(self.wrap_node(value.loc, "...varargs"));
            } else {
                out.push(self.generate_expression(value)?);
            }
        }
        Ok(out)
    }

    /// Collapses zero, one or many Lua values into one JS expression.
    pub(crate) fn pack(&mut self, values: &[&Expression]) -> GenResult {
        match values {
            [] => Ok(String::new()),
            [only] if only.is_vararg() => Ok(self.wrap_node(only.loc, "[...varargs]")),
            [only] => self.generate_expression(only),
            _ => Ok(format!("[{}]", self.generate_list(values)?.join(", "))),
        }
    }

    /// Fixed text for a node, with its surrounding comments.
    pub(crate) fn wrap_node(&mut self, loc: Location, text: &str) -> String {
        let before = self.comments.before(loc);
        let after = self.comments.after(loc);
        format!("{}{}{}", before, text, after)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static::lazy_static! {
    /// Values from host namespaces or metatable plumbing are never classes.
    static ref EXTERNAL_VALUE: regex::Regex =
        regex::Regex::new(r"^(?:CS\.|Tweening\.|setmetatable\b)").expect("valid pattern");
}

/// Whether `name = value` at top level may be wrapped in `l2j.createClass`.
fn can_become_class(node: &Expression, value: &str, name: &str, file_name: &str) -> bool {
    let value = value.trim();
    if EXTERNAL_VALUE.is_match(value) || value == "M" || value == "undefined" {
        return false;
    }
    if name == "M" && value == file_name {
        return false;
    }
    !matches!(
        node.kind,
        ExpressionKind::Nil
            | ExpressionKind::Boolean { .. }
            | ExpressionKind::Number { .. }
            | ExpressionKind::String { .. }
            | ExpressionKind::Function(_)
    )
}

/// Same identifier or member path, e.g. `t` / `self.items`.
fn same_reference(a: &Expression, b: &Expression) -> bool {
    match (&a.kind, &b.kind) {
        (ExpressionKind::Identifier { name: x }, ExpressionKind::Identifier { name: y }) => x == y,
        (
            ExpressionKind::Member {
                base: base_a,
                indexer: indexer_a,
                identifier: name_a,
            },
            ExpressionKind::Member {
                base: base_b,
                indexer: indexer_b,
                identifier: name_b,
            },
        ) => indexer_a == indexer_b && name_a.name == name_b.name && same_reference(base_a, base_b),
        _ => false,
    }
}

/// Operands that can be evaluated twice without observable effect.
fn is_repeatable(node: &Expression) -> bool {
    matches!(
        node.kind,
        ExpressionKind::Identifier { .. }
            | ExpressionKind::Nil
            | ExpressionKind::Boolean { .. }
            | ExpressionKind::Number { .. }
            | ExpressionKind::String { .. }
    )
}

fn is_global_lib_value(node: &Expression) -> bool {
    node.identifier_name()
        .map(|name| LUA_GLOBAL_LIB.contains(name))
        .unwrap_or(false)
}

/// Expressions that may produce several values.
fn is_multi_value(node: &Expression) -> bool {
    matches!(
        node.kind,
        ExpressionKind::Call { .. }
            | ExpressionKind::TableCall { .. }
            | ExpressionKind::StringCall { .. }
            | ExpressionKind::Vararg
    )
}

fn is_negative_literal(step: &Expression) -> bool {
    match &step.kind {
        ExpressionKind::Number { value, .. } => *value < 0.0,
        ExpressionKind::Unary {
            operator: UnaryOp::Neg,
            argument,
        } => matches!(argument.kind, ExpressionKind::Number { value, .. } if value > 0.0),
        _ => false,
    }
}

/// Parameter list using the names the scope tracker settled on.
pub(crate) fn parameter_list(annotations: &Annotations, parameters: &[Identifier], is_vararg: bool) -> String {
    let mut names: Vec<String> = parameters
        .iter()
        .map(|p| escape_identifier(annotations.name_of(p)))
        .collect();
    if is_vararg {
        names.push("...varargs".to_string());
    }
    names.join(", ")
}

/// Integer-valued numbers print without a fraction.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn number_literal(value: f64, raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("0x") && (lower.contains('.') || lower.contains('p')) {
        return format_number(value);
    }
    raw.to_string()
}

/// Lua string literal to JS: short strings become double-quoted strings,
/// long brackets become template literals.
pub fn translate_string(raw: &str) -> String {
    let token = lua_string_token(raw);
    if raw.starts_with('[') {
        let escaped = token
            .replace('\\', "\\\\")
            .replace('`', "\\`")
            .replace("${", "\\${");
        return format!("`{}`", escaped);
    }

    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    let mut chars = token.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => {
                let Some(next) = chars.next() else {
                    out.push_str("\\\\");
                    break;
                };
                match next {
                    'a' => out.push_str("\\x07"),
                    'n' | 't' | 'r' | 'b' | 'f' | 'v' | '\\' | '"' => {
                        out.push('\\');
                        out.push(next);
                    }
                    '\'' => out.push('\''),
                    '\n' => out.push_str("\\n"),
                    'z' => {
                        while chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
                            chars.next();
                        }
                    }
                    'x' => out.push_str("\\x"),
                    'u' => out.push_str("\\u"),
                    d if d.is_ascii_digit() => {
                        let mut digits = d.to_string();
                        while digits.len() < 3 && chars.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                            if let Some(c) = chars.next() {
                                digits.push(c);
                            }
                        }
                        let code = digits.parse::<u32>().unwrap_or(0);
                        out.push_str(&format!("\\x{:02x}", code.min(255)));
                    }
                    other => out.push(other),
                }
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_short_strings() {
        assert_eq!(translate_string("'a'"), "\"a\"");
        assert_eq!(translate_string(r#"'say "hi"'"#), r#""say \"hi\"""#);
        assert_eq!(translate_string(r"'it\'s'"), "\"it's\"");
        assert_eq!(translate_string(r#""tab\tnew\n""#), r#""tab\tnew\n""#);
        assert_eq!(translate_string(r#""\65\066""#), r#""\x41\x42""#);
        assert_eq!(translate_string("\"a\\z   b\""), "\"ab\"");
    }

    #[test]
    fn test_translate_long_strings() {
        assert_eq!(translate_string("[[line]]"), "`line`");
        assert_eq!(translate_string("[==[\n`${x}`\\]==]"), "`\\`\\${x}\\`\\\\`");
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(number_literal(255.0, "0xFF"), "0xFF");
        assert_eq!(number_literal(1.5, "0x1.8"), "1.5");
        assert_eq!(number_literal(1000.0, "1e3"), "1e3");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
    }

    #[test]
    fn test_parameter_list_reads_tracker_names() {
        let ident = |id: u32, name: &str| Identifier {
            id: NodeId(id),
            name: name.to_string(),
            loc: Location::default(),
        };
        let mut annotations = Annotations::default();
        annotations.renamed.insert(NodeId(2), "_1".to_string());
        assert_eq!(
            parameter_list(&annotations, &[ident(1, "_"), ident(2, "_"), ident(3, "x")], true),
            "_, _1, x, ...varargs"
        );
        assert_eq!(parameter_list(&annotations, &[ident(4, "class")], false), "_class");
    }

    #[test]
    fn test_repeatable_operands() {
        let node = |kind| Expression {
            id: NodeId(0),
            loc: Location::default(),
            kind,
        };
        assert!(is_repeatable(&node(ExpressionKind::Identifier { name: "a".to_string() })));
        assert!(!is_repeatable(&node(ExpressionKind::Vararg)));
    }

    #[test]
    fn test_external_values_never_become_classes() {
        let node = Expression {
            id: NodeId(0),
            loc: Location::default(),
            kind: ExpressionKind::Identifier {
                name: "x".to_string(),
            },
        };
        assert!(!can_become_class(&node, "CS.UnityEngine.Object", "Foo", "Foo"));
        assert!(!can_become_class(&node, "setmetatable({}, mt)", "Foo", "Foo"));
        assert!(!can_become_class(&node, "Foo", "M", "Foo"));
        assert!(can_become_class(&node, "Base", "Foo", "Foo"));
    }
}
