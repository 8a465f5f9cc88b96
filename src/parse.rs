//! Parse Module for the Lua translator
//!
//! Recursive descent over Lua 5.3 with precedence climbing for binary
//! operators. Produces a fully located `Chunk` with its comment list and
//! the globals it references.
//!
//! Scope structure is reported to a `ParseHooks` observer while parsing, in
//! nesting order, so declaration checks run with exactly the scope stack the
//! parser sees at that point.

use std::collections::HashSet;

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind};

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Structural callbacks fired synchronously while parsing.
pub trait ParseHooks {
    /// A function body or block scope was entered.
    fn on_create_scope(&mut self) {}

    /// The innermost scope was left.
    fn on_destroy_scope(&mut self) {}

    /// Parameters or loop variables bound by the scope just created.
    fn on_parameters(&mut self, _parameters: &[Identifier]) {}

    /// A `local` statement node was completed.
    fn on_local_declaration(&mut self, _statement: NodeId, _variables: &[Identifier], _init: &[Expression]) {}

    /// `local function name`, before its body is parsed.
    fn on_local_function(&mut self, _name: &Identifier) {}

    /// A name read or assigned; `id` is the identifier expression's id.
    fn on_reference(&mut self, _id: NodeId, _name: &str) {}
}

/// Observer that ignores every callback.
pub struct NoHooks;

impl ParseHooks for NoHooks {}

/// Parse a whole Lua source text.
pub fn parse_chunk(source: &str, hooks: &mut dyn ParseHooks) -> Result<Chunk, ParseError> {
    let mut parser = Parser::new(source, hooks)?;
    parser.parse_chunk()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

const UNARY_PRIORITY: u8 = 12;

struct Parser<'a, 'h> {
    lexer: Lexer<'a>,
    current: Token,
    prev_end: Position,
    next_id: u32,
    hooks: &'h mut dyn ParseHooks,
    /// Local names visible per scope, for global resolution.
    scopes: Vec<Vec<String>>,
    globals: Vec<String>,
    globals_seen: HashSet<String>,
}

impl<'a, 'h> Parser<'a, 'h> {
    fn new(source: &'a str, hooks: &'h mut dyn ParseHooks) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            prev_end: Position::new(1, 0),
            next_id: 0,
            hooks,
            scopes: Vec::new(),
            globals: Vec::new(),
            globals_seen: HashSet::new(),
        })
    }

    // =========================================================================
    // Token handling
    // =========================================================================

    fn peek(&self) -> &TokenKind {
        &self.current.kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        let prev = std::mem::replace(&mut self.current, next);
        self.prev_end = prev.loc.end;
        Ok(prev)
    }

    fn accept(&mut self, kind: &TokenKind) -> Result<bool, ParseError> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.unexpected(&format!("'{}' expected", what)))
        }
    }

    fn unexpected(&self, message: &str) -> ParseError {
        ParseError::new(
            format!("{} near {}", message, self.current.kind.describe()),
            self.current.loc.start.line,
            self.current.loc.start.column,
        )
    }

    fn start(&self) -> Position {
        self.current.loc.start
    }

    fn finish(&self, start: Position) -> Location {
        Location::new(start, self.prev_end)
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    fn create_scope(&mut self) {
        self.scopes.push(Vec::new());
        self.hooks.on_create_scope();
    }

    fn destroy_scope(&mut self) {
        self.scopes.pop();
        self.hooks.on_destroy_scope();
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
    }

    fn reference(&mut self, id: NodeId, name: &str) {
        self.hooks.on_reference(id, name);
        let is_local = self
            .scopes
            .iter()
            .rev()
            .any(|scope| scope.iter().any(|n| n == name));
        if !is_local && self.globals_seen.insert(name.to_string()) {
            self.globals.push(name.to_string());
        }
    }

    // =========================================================================
    // Chunk & blocks
    // =========================================================================

    fn parse_chunk(&mut self) -> Result<Chunk, ParseError> {
        let start = Position::new(1, 0);
        self.create_scope();
        let body = self.parse_block()?;
        self.destroy_scope();
        if !self.check(&TokenKind::Eof) {
            return Err(self.unexpected("'<eof>' expected"));
        }
        let loc = Location::new(start, self.current.loc.end);
        Ok(Chunk {
            body,
            comments: self.lexer.take_comments(),
            globals: std::mem::take(&mut self.globals),
            loc,
        })
    }

    fn is_block_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::End
                | TokenKind::Else
                | TokenKind::ElseIf
                | TokenKind::Until
                | TokenKind::Eof
        )
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut body = Vec::new();
        while !self.is_block_end() {
            if self.check(&TokenKind::Return) {
                body.push(self.parse_return()?);
                if !self.is_block_end() {
                    return Err(self.unexpected("'end' expected"));
                }
                break;
            }
            if self.accept(&TokenKind::Semicolon)? {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_scoped_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.create_scope();
        let body = self.parse_block();
        self.destroy_scope();
        body
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        let kind = match self.peek() {
            TokenKind::Local => {
                self.advance()?;
                if self.accept(&TokenKind::Function)? {
                    self.parse_local_function(start)?
                } else {
                    return self.parse_local(start);
                }
            }
            TokenKind::Function => {
                self.advance()?;
                let name = self.parse_function_name()?;
                let function = self.parse_function_body(start, Some(Box::new(name)), false)?;
                StatementKind::Function(function)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance()?;
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::Do, "do")?;
                let body = self.parse_scoped_block()?;
                self.expect(&TokenKind::End, "end")?;
                StatementKind::While { condition, body }
            }
            TokenKind::Do => {
                self.advance()?;
                let body = self.parse_scoped_block()?;
                self.expect(&TokenKind::End, "end")?;
                StatementKind::Do { body }
            }
            TokenKind::Repeat => {
                self.advance()?;
                self.create_scope();
                let body = self.parse_block()?;
                self.expect(&TokenKind::Until, "until")?;
                let condition = self.parse_expression()?;
                self.destroy_scope();
                StatementKind::Repeat { body, condition }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Break => {
                self.advance()?;
                StatementKind::Break
            }
            TokenKind::Goto => {
                self.advance()?;
                let label = self.parse_name()?;
                StatementKind::Goto { label }
            }
            TokenKind::DoubleColon => {
                self.advance()?;
                let label = self.parse_name()?;
                self.expect(&TokenKind::DoubleColon, "::")?;
                StatementKind::Label { label }
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(Statement {
            id: self.node_id(),
            loc: self.finish(start),
            kind,
        })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        self.advance()?;
        let arguments = if self.is_block_end() || self.check(&TokenKind::Semicolon) {
            Vec::new()
        } else {
            self.parse_expression_list()?
        };
        self.accept(&TokenKind::Semicolon)?;
        Ok(Statement {
            id: self.node_id(),
            loc: self.finish(start),
            kind: StatementKind::Return { arguments },
        })
    }

    fn parse_local(&mut self, start: Position) -> Result<Statement, ParseError> {
        let mut variables = vec![self.parse_name()?];
        self.skip_attribute()?;
        while self.accept(&TokenKind::Comma)? {
            variables.push(self.parse_name()?);
            self.skip_attribute()?;
        }
        let init = if self.accept(&TokenKind::Assign)? {
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        let id = self.node_id();
        self.hooks.on_local_declaration(id, &variables, &init);
        for variable in &variables {
            self.declare(&variable.name);
        }

        Ok(Statement {
            id,
            loc: self.finish(start),
            kind: StatementKind::Local { variables, init },
        })
    }

    /// Lua 5.4 `<const>` / `<close>` attributes carry no meaning for JS output.
    fn skip_attribute(&mut self) -> Result<(), ParseError> {
        if self.accept(&TokenKind::Lt)? {
            self.parse_name()?;
            self.expect(&TokenKind::Gt, ">")?;
        }
        Ok(())
    }

    fn parse_local_function(&mut self, start: Position) -> Result<StatementKind, ParseError> {
        let name = self.parse_name()?;
        self.hooks.on_local_function(&name);
        self.declare(&name.name);
        let identifier = Expression {
            id: name.id,
            loc: name.loc,
            kind: ExpressionKind::Identifier {
                name: name.name.clone(),
            },
        };
        let function = self.parse_function_body(start, Some(Box::new(identifier)), true)?;
        Ok(StatementKind::Function(function))
    }

    /// `Name {'.' Name} [':' Name]`
    fn parse_function_name(&mut self) -> Result<Expression, ParseError> {
        let root = self.parse_name()?;
        self.reference(root.id, &root.name);
        let mut expression = Expression {
            id: root.id,
            loc: root.loc,
            kind: ExpressionKind::Identifier { name: root.name },
        };

        loop {
            let indexer = if self.check(&TokenKind::Dot) {
                Indexer::Dot
            } else if self.check(&TokenKind::Colon) {
                Indexer::Colon
            } else {
                break;
            };
            self.advance()?;
            let identifier = self.parse_name()?;
            let loc = expression.loc.to(identifier.loc);
            expression = Expression {
                id: self.node_id(),
                loc,
                kind: ExpressionKind::Member {
                    base: Box::new(expression),
                    indexer,
                    identifier,
                },
            };
            if indexer == Indexer::Colon {
                break;
            }
        }
        Ok(expression)
    }

    fn parse_if(&mut self) -> Result<StatementKind, ParseError> {
        let mut clauses = Vec::new();

        let start = self.start();
        self.advance()?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::Then, "then")?;
        let body = self.parse_scoped_block()?;
        clauses.push(IfClause {
            id: self.node_id(),
            loc: self.finish(start),
            kind: ClauseKind::If,
            condition: Some(condition),
            body,
        });

        loop {
            let start = self.start();
            if self.accept(&TokenKind::ElseIf)? {
                let condition = self.parse_expression()?;
                self.expect(&TokenKind::Then, "then")?;
                let body = self.parse_scoped_block()?;
                clauses.push(IfClause {
                    id: self.node_id(),
                    loc: self.finish(start),
                    kind: ClauseKind::ElseIf,
                    condition: Some(condition),
                    body,
                });
            } else if self.accept(&TokenKind::Else)? {
                let body = self.parse_scoped_block()?;
                clauses.push(IfClause {
                    id: self.node_id(),
                    loc: self.finish(start),
                    kind: ClauseKind::Else,
                    condition: None,
                    body,
                });
                break;
            } else {
                break;
            }
        }

        self.expect(&TokenKind::End, "end")?;
        Ok(StatementKind::If { clauses })
    }

    fn parse_for(&mut self) -> Result<StatementKind, ParseError> {
        self.advance()?;
        let first = self.parse_name()?;

        if self.accept(&TokenKind::Assign)? {
            let start = self.parse_expression()?;
            self.expect(&TokenKind::Comma, ",")?;
            let end = self.parse_expression()?;
            let step = if self.accept(&TokenKind::Comma)? {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(&TokenKind::Do, "do")?;
            self.create_scope();
            self.declare(&first.name);
            self.hooks.on_parameters(std::slice::from_ref(&first));
            let body = self.parse_block();
            self.destroy_scope();
            let body = body?;
            self.expect(&TokenKind::End, "end")?;
            return Ok(StatementKind::ForNumeric {
                variable: first,
                start,
                end,
                step,
                body,
            });
        }

        let mut variables = vec![first];
        while self.accept(&TokenKind::Comma)? {
            variables.push(self.parse_name()?);
        }
        self.expect(&TokenKind::In, "in")?;
        let iterators = self.parse_expression_list()?;
        self.expect(&TokenKind::Do, "do")?;
        self.create_scope();
        for variable in &variables {
            self.declare(&variable.name);
        }
        self.hooks.on_parameters(&variables);
        let body = self.parse_block();
        self.destroy_scope();
        let body = body?;
        self.expect(&TokenKind::End, "end")?;
        Ok(StatementKind::ForGeneric {
            variables,
            iterators,
            body,
        })
    }

    fn parse_expression_statement(&mut self) -> Result<StatementKind, ParseError> {
        let first = self.parse_suffixed_expression()?;

        if self.check(&TokenKind::Assign) || self.check(&TokenKind::Comma) {
            let mut variables = vec![first];
            while self.accept(&TokenKind::Comma)? {
                variables.push(self.parse_suffixed_expression()?);
            }
            for variable in &variables {
                if !matches!(
                    variable.kind,
                    ExpressionKind::Identifier { .. }
                        | ExpressionKind::Member { .. }
                        | ExpressionKind::Index { .. }
                ) {
                    return Err(ParseError::new(
                        "cannot assign to this expression",
                        variable.loc.start.line,
                        variable.loc.start.column,
                    ));
                }
            }
            self.expect(&TokenKind::Assign, "=")?;
            let init = self.parse_expression_list()?;
            return Ok(StatementKind::Assignment { variables, init });
        }

        match first.kind {
            ExpressionKind::Call { .. }
            | ExpressionKind::TableCall { .. }
            | ExpressionKind::StringCall { .. } => Ok(StatementKind::Call { expression: first }),
            _ => Err(ParseError::new(
                "syntax error, expected a call or assignment",
                first.loc.start.line,
                first.loc.start.column,
            )),
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn parse_function_body(
        &mut self,
        start: Position,
        identifier: Option<Box<Expression>>,
        is_local: bool,
    ) -> Result<Function, ParseError> {
        let is_method = identifier
            .as_deref()
            .map(|e| {
                matches!(
                    e.kind,
                    ExpressionKind::Member {
                        indexer: Indexer::Colon,
                        ..
                    }
                )
            })
            .unwrap_or(false);

        self.create_scope();
        if is_method {
            self.declare("self");
        }

        self.expect(&TokenKind::LParen, "(")?;
        let mut parameters = Vec::new();
        let mut is_vararg = false;
        if !self.check(&TokenKind::RParen) {
            loop {
                if self.accept(&TokenKind::Ellipsis)? {
                    is_vararg = true;
                    break;
                }
                let name = self.parse_name()?;
                self.declare(&name.name);
                parameters.push(name);
                if !self.accept(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, ")")?;
        self.hooks.on_parameters(&parameters);

        let body = self.parse_block();
        self.destroy_scope();
        let body = body?;
        self.expect(&TokenKind::End, "end")?;

        Ok(Function {
            id: self.node_id(),
            loc: self.finish(start),
            identifier,
            is_local,
            parameters,
            is_vararg,
            body,
        })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut list = vec![self.parse_expression()?];
        while self.accept(&TokenKind::Comma)? {
            list.push(self.parse_expression()?);
        }
        Ok(list)
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_subexpression(0)
    }

    fn unary_operator(&self) -> Option<UnaryOp> {
        match self.peek() {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Hash => Some(UnaryOp::Len),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        }
    }

    /// Operator at the cursor with its (left, right) priority.
    fn binary_operator(&self) -> Option<(BinaryOrLogical, u8, u8)> {
        use BinaryOrLogical::*;
        let entry = match self.peek() {
            TokenKind::Or => (Logical(LogicalOp::Or), 1, 1),
            TokenKind::And => (Logical(LogicalOp::And), 2, 2),
            TokenKind::Lt => (Binary(BinaryOp::Lt), 3, 3),
            TokenKind::Gt => (Binary(BinaryOp::Gt), 3, 3),
            TokenKind::Le => (Binary(BinaryOp::Le), 3, 3),
            TokenKind::Ge => (Binary(BinaryOp::Ge), 3, 3),
            TokenKind::NotEq => (Binary(BinaryOp::Ne), 3, 3),
            TokenKind::EqEq => (Binary(BinaryOp::Eq), 3, 3),
            TokenKind::Pipe => (Binary(BinaryOp::BitOr), 4, 4),
            TokenKind::Tilde => (Binary(BinaryOp::BitXor), 5, 5),
            TokenKind::Amp => (Binary(BinaryOp::BitAnd), 6, 6),
            TokenKind::Shl => (Binary(BinaryOp::Shl), 7, 7),
            TokenKind::Shr => (Binary(BinaryOp::Shr), 7, 7),
            TokenKind::Concat => (Binary(BinaryOp::Concat), 9, 8),
            TokenKind::Plus => (Binary(BinaryOp::Add), 10, 10),
            TokenKind::Minus => (Binary(BinaryOp::Sub), 10, 10),
            TokenKind::Star => (Binary(BinaryOp::Mul), 11, 11),
            TokenKind::Slash => (Binary(BinaryOp::Div), 11, 11),
            TokenKind::DoubleSlash => (Binary(BinaryOp::FloorDiv), 11, 11),
            TokenKind::Percent => (Binary(BinaryOp::Mod), 11, 11),
            TokenKind::Caret => (Binary(BinaryOp::Pow), 14, 13),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_subexpression(&mut self, limit: u8) -> Result<Expression, ParseError> {
        let start = self.start();
        let mut left = if let Some(operator) = self.unary_operator() {
            self.advance()?;
            let argument = self.parse_subexpression(UNARY_PRIORITY)?;
            Expression {
                id: self.node_id(),
                loc: self.finish(start),
                kind: ExpressionKind::Unary {
                    operator,
                    argument: Box::new(argument),
                },
            }
        } else {
            self.parse_simple_expression()?
        };

        while let Some((operator, left_priority, right_priority)) = self.binary_operator() {
            if left_priority <= limit {
                break;
            }
            self.advance()?;
            let right = self.parse_subexpression(right_priority)?;
            let kind = match operator {
                BinaryOrLogical::Binary(operator) => ExpressionKind::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                BinaryOrLogical::Logical(operator) => ExpressionKind::Logical {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expression {
                id: self.node_id(),
                loc: self.finish(start),
                kind,
            };
        }
        Ok(left)
    }

    fn parse_simple_expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let kind = match self.peek().clone() {
            TokenKind::Nil => {
                self.advance()?;
                ExpressionKind::Nil
            }
            TokenKind::True => {
                self.advance()?;
                ExpressionKind::Boolean { value: true }
            }
            TokenKind::False => {
                self.advance()?;
                ExpressionKind::Boolean { value: false }
            }
            TokenKind::Number { value, raw } => {
                self.advance()?;
                ExpressionKind::Number { value, raw }
            }
            TokenKind::Str(raw) => {
                self.advance()?;
                ExpressionKind::String { raw }
            }
            TokenKind::Ellipsis => {
                self.advance()?;
                ExpressionKind::Vararg
            }
            TokenKind::LBrace => return self.parse_table(),
            TokenKind::Function => {
                self.advance()?;
                let function = self.parse_function_body(start, None, false)?;
                ExpressionKind::Function(function)
            }
            _ => return self.parse_suffixed_expression(),
        };
        Ok(Expression {
            id: self.node_id(),
            loc: self.finish(start),
            kind,
        })
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        match self.peek() {
            TokenKind::Name(_) => {
                let name = self.parse_name()?;
                self.reference(name.id, &name.name);
                Ok(Expression {
                    id: name.id,
                    loc: name.loc,
                    kind: ExpressionKind::Identifier { name: name.name },
                })
            }
            TokenKind::LParen => {
                self.advance()?;
                let mut inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, ")")?;
                inner.loc = self.finish(start);
                Ok(inner)
            }
            _ => Err(self.unexpected("unexpected symbol")),
        }
    }

    fn parse_suffixed_expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let mut expression = self.parse_primary_expression()?;

        loop {
            let kind = match self.peek() {
                TokenKind::Dot => {
                    self.advance()?;
                    let identifier = self.parse_name()?;
                    ExpressionKind::Member {
                        base: Box::new(expression),
                        indexer: Indexer::Dot,
                        identifier,
                    }
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "]")?;
                    ExpressionKind::Index {
                        base: Box::new(expression),
                        index: Box::new(index),
                    }
                }
                TokenKind::Colon => {
                    self.advance()?;
                    let identifier = self.parse_name()?;
                    let member = Expression {
                        id: self.node_id(),
                        loc: self.finish(start),
                        kind: ExpressionKind::Member {
                            base: Box::new(expression),
                            indexer: Indexer::Colon,
                            identifier,
                        },
                    };
                    self.parse_call_arguments(member)?
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::Str(_) => {
                    self.parse_call_arguments(expression)?
                }
                _ => return Ok(expression),
            };
            expression = Expression {
                id: self.node_id(),
                loc: self.finish(start),
                kind,
            };
        }
    }

    fn parse_call_arguments(&mut self, base: Expression) -> Result<ExpressionKind, ParseError> {
        match self.peek().clone() {
            TokenKind::LParen => {
                self.advance()?;
                let arguments = if self.check(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_expression_list()?
                };
                self.expect(&TokenKind::RParen, ")")?;
                Ok(ExpressionKind::Call {
                    base: Box::new(base),
                    arguments,
                })
            }
            TokenKind::LBrace => {
                let table = self.parse_table()?;
                Ok(ExpressionKind::TableCall {
                    base: Box::new(base),
                    argument: Box::new(table),
                })
            }
            TokenKind::Str(raw) => {
                let token = self.advance()?;
                let argument = Expression {
                    id: self.node_id(),
                    loc: token.loc,
                    kind: ExpressionKind::String { raw },
                };
                Ok(ExpressionKind::StringCall {
                    base: Box::new(base),
                    argument: Box::new(argument),
                })
            }
            _ => Err(self.unexpected("function arguments expected")),
        }
    }

    fn parse_table(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        self.expect(&TokenKind::LBrace, "{")?;
        let mut fields = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            let field_start = self.start();
            let kind = if self.check(&TokenKind::LBracket) {
                self.advance()?;
                let key = self.parse_expression()?;
                self.expect(&TokenKind::RBracket, "]")?;
                self.expect(&TokenKind::Assign, "=")?;
                let value = self.parse_expression()?;
                TableFieldKind::Key { key, value }
            } else if self.is_key_string_field()? {
                let key = self.parse_name()?;
                self.expect(&TokenKind::Assign, "=")?;
                let value = self.parse_expression()?;
                TableFieldKind::KeyString { key, value }
            } else {
                TableFieldKind::Value {
                    value: self.parse_expression()?,
                }
            };
            fields.push(TableField {
                id: self.node_id(),
                loc: self.finish(field_start),
                kind,
            });

            if !self.accept(&TokenKind::Comma)? && !self.accept(&TokenKind::Semicolon)? {
                break;
            }
        }

        self.expect(&TokenKind::RBrace, "}")?;
        Ok(Expression {
            id: self.node_id(),
            loc: self.finish(start),
            kind: ExpressionKind::Table { fields },
        })
    }

    /// `name =` inside a table constructor needs one token of lookahead.
    fn is_key_string_field(&mut self) -> Result<bool, ParseError> {
        if !matches!(self.peek(), TokenKind::Name(_)) {
            return Ok(false);
        }
        let mut lookahead = self.lexer.clone_for_lookahead();
        let next = lookahead.next_token()?;
        Ok(next.kind == TokenKind::Assign)
    }

    fn parse_name(&mut self) -> Result<Identifier, ParseError> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                let token = self.advance()?;
                Ok(Identifier {
                    id: self.node_id(),
                    name,
                    loc: token.loc,
                })
            }
            _ => Err(self.unexpected("<name> expected")),
        }
    }
}

enum BinaryOrLogical {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Chunk {
        parse_chunk(source, &mut NoHooks).unwrap()
    }

    #[test]
    fn test_parse_local_and_call() {
        let chunk = parse("local t = {}\ntable.insert(t, 1, \"a\")");
        assert_eq!(chunk.body.len(), 2);
        assert!(matches!(chunk.body[0].kind, StatementKind::Local { .. }));
        match &chunk.body[1].kind {
            StatementKind::Call { expression } => match &expression.kind {
                ExpressionKind::Call { base, arguments } => {
                    assert_eq!(base.as_qualified_name(), Some(("table", "insert")));
                    assert_eq!(arguments.len(), 3);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chunk.body[1].loc.start.line, 2);
    }

    #[test]
    fn test_precedence() {
        let chunk = parse("x = 1 + 2 * 3 .. 'a' .. 'b'");
        let StatementKind::Assignment { init, .. } = &chunk.body[0].kind else {
            panic!("expected assignment");
        };
        // `..` binds looser than `+` and is right associative.
        match &init[0].kind {
            ExpressionKind::Binary {
                operator, right, ..
            } => {
                assert_eq!(*operator, BinaryOp::Concat);
                assert!(matches!(
                    right.kind,
                    ExpressionKind::Binary {
                        operator: BinaryOp::Concat,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_unary() {
        let chunk = parse("x = -2 ^ 2");
        let StatementKind::Assignment { init, .. } = &chunk.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            init[0].kind,
            ExpressionKind::Unary {
                operator: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_method_definition_has_no_implicit_parameter() {
        let chunk = parse("function Foo:bar(x) return self.x + x end");
        let StatementKind::Function(function) = &chunk.body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(function.parameters.len(), 1);
        assert_eq!(function.parameters[0].name, "x");
        // `self` resolves to the implicit receiver, not a global.
        assert_eq!(chunk.globals, vec!["Foo".to_string()]);
    }

    #[test]
    fn test_globals_exclude_locals() {
        let chunk = parse("local a = b\nc = a\nprint(c)");
        assert_eq!(chunk.globals, vec!["b", "c", "print"]);
    }

    #[test]
    fn test_table_fields() {
        let chunk = parse("local t = { 1, x = 2, [k] = 3; 'v' }");
        let StatementKind::Local { init, .. } = &chunk.body[0].kind else {
            panic!("expected local");
        };
        let ExpressionKind::Table { fields } = &init[0].kind else {
            panic!("expected table");
        };
        assert_eq!(fields.len(), 4);
        assert!(fields[0].kind.is_positional());
        assert!(matches!(fields[1].kind, TableFieldKind::KeyString { .. }));
        assert!(matches!(fields[2].kind, TableFieldKind::Key { .. }));
        assert!(fields[3].kind.is_positional());
    }

    #[test]
    fn test_hooks_fire_in_nesting_order() {
        #[derive(Default)]
        struct Recorder {
            events: Vec<String>,
        }
        impl ParseHooks for Recorder {
            fn on_create_scope(&mut self) {
                self.events.push("enter".into());
            }
            fn on_destroy_scope(&mut self) {
                self.events.push("exit".into());
            }
            fn on_local_declaration(&mut self, _statement: NodeId, variables: &[Identifier], _init: &[Expression]) {
                let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
                self.events.push(format!("local {}", names.join(",")));
            }
        }

        let mut recorder = Recorder::default();
        parse_chunk("local a\ndo local b, c end", &mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec!["enter", "local a", "enter", "local b,c", "exit", "exit"]
        );
    }

    #[test]
    fn test_parse_error_has_position() {
        let err = parse_chunk("local = 1", &mut NoHooks).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("<name> expected"));
    }

    #[test]
    fn test_return_must_end_block() {
        assert!(parse_chunk("return 1 x = 2", &mut NoHooks).is_err());
    }
}
