//! Lua Syntax Tree
//!
//! Closed tagged variants over the Lua 5.3 grammar, produced by `parse` and
//! consumed read-only by `codegen`. Every node carries a `NodeId` so later
//! passes can attach facts in side tables instead of mutating the tree.

use serde::Serialize;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTITY & LOCATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Dense per-parse node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct NodeId(pub u32);

/// 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Location covering `self` through `other`.
    pub fn to(self, other: Location) -> Location {
        Location {
            start: self.start,
            end: other.end,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHUNK & COMMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Text without the `--` / long-bracket delimiters.
    pub value: String,
    /// Full source text including delimiters.
    pub raw: String,
    /// True for `--[[ ... ]]` style comments.
    pub is_block: bool,
    pub loc: Location,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub body: Vec<Statement>,
    /// Collected in source order of discovery; consumers sort before use.
    pub comments: Vec<Comment>,
    /// Names referenced without a visible local binding, first-seen order.
    pub globals: Vec<String>,
    pub loc: Location,
}

#[derive(Debug, Clone, Serialize)]
pub struct Identifier {
    pub id: NodeId,
    pub name: String,
    pub loc: Location,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub id: NodeId,
    pub loc: Location,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StatementKind {
    Local {
        variables: Vec<Identifier>,
        init: Vec<Expression>,
    },
    Assignment {
        variables: Vec<Expression>,
        init: Vec<Expression>,
    },
    Call {
        expression: Expression,
    },
    Function(Function),
    Return {
        arguments: Vec<Expression>,
    },
    Break,
    Goto {
        label: Identifier,
    },
    Label {
        label: Identifier,
    },
    Do {
        body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Repeat {
        body: Vec<Statement>,
        condition: Expression,
    },
    If {
        clauses: Vec<IfClause>,
    },
    ForNumeric {
        variable: Identifier,
        start: Expression,
        end: Expression,
        step: Option<Expression>,
        body: Vec<Statement>,
    },
    ForGeneric {
        variables: Vec<Identifier>,
        iterators: Vec<Expression>,
        body: Vec<Statement>,
    },
}

impl StatementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StatementKind::Local { .. } => "LocalStatement",
            StatementKind::Assignment { .. } => "AssignmentStatement",
            StatementKind::Call { .. } => "CallStatement",
            StatementKind::Function(_) => "FunctionDeclaration",
            StatementKind::Return { .. } => "ReturnStatement",
            StatementKind::Break => "BreakStatement",
            StatementKind::Goto { .. } => "GotoStatement",
            StatementKind::Label { .. } => "LabelStatement",
            StatementKind::Do { .. } => "DoStatement",
            StatementKind::While { .. } => "WhileStatement",
            StatementKind::Repeat { .. } => "RepeatStatement",
            StatementKind::If { .. } => "IfStatement",
            StatementKind::ForNumeric { .. } => "ForNumericStatement",
            StatementKind::ForGeneric { .. } => "ForGenericStatement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClauseKind {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, Serialize)]
pub struct IfClause {
    pub id: NodeId,
    pub loc: Location,
    pub kind: ClauseKind,
    pub condition: Option<Expression>,
    pub body: Vec<Statement>,
}

/// Function statement or function expression.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub id: NodeId,
    pub loc: Location,
    /// `Identifier` or `Member` chain for named statements, `None` for literals.
    pub identifier: Option<Box<Expression>>,
    pub is_local: bool,
    pub parameters: Vec<Identifier>,
    pub is_vararg: bool,
    pub body: Vec<Statement>,
}

impl Function {
    pub fn first_parameter(&self) -> Option<&str> {
        self.parameters.first().map(|p| p.name.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct Expression {
    pub id: NodeId,
    pub loc: Location,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ExpressionKind {
    Identifier {
        name: String,
    },
    Nil,
    Boolean {
        value: bool,
    },
    Number {
        value: f64,
        raw: String,
    },
    String {
        raw: String,
    },
    Vararg,
    Function(Function),
    Table {
        fields: Vec<TableField>,
    },
    Binary {
        operator: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        operator: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOp,
        argument: Box<Expression>,
    },
    Member {
        base: Box<Expression>,
        indexer: Indexer,
        identifier: Identifier,
    },
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Call {
        base: Box<Expression>,
        arguments: Vec<Expression>,
    },
    TableCall {
        base: Box<Expression>,
        argument: Box<Expression>,
    },
    StringCall {
        base: Box<Expression>,
        argument: Box<Expression>,
    },
}

impl Expression {
    pub fn identifier_name(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier { name } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_identifier(&self, expected: &str) -> bool {
        self.identifier_name() == Some(expected)
    }

    pub fn is_vararg(&self) -> bool {
        matches!(self.kind, ExpressionKind::Vararg)
    }

    pub fn is_string_literal(&self) -> bool {
        matches!(self.kind, ExpressionKind::String { .. })
    }

    pub fn is_number(&self, expected: f64) -> bool {
        matches!(self.kind, ExpressionKind::Number { value, .. } if value == expected)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.kind, ExpressionKind::Nil)
    }

    /// `lib.name` where `lib` is a bare identifier.
    pub fn as_qualified_name(&self) -> Option<(&str, &str)> {
        match &self.kind {
            ExpressionKind::Member {
                base, identifier, ..
            } => base
                .identifier_name()
                .map(|lib| (lib, identifier.name.as_str())),
            _ => None,
        }
    }

    /// Leftmost identifier of a member/index chain.
    pub fn root_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier { name } => Some(name.as_str()),
            ExpressionKind::Member { base, .. } | ExpressionKind::Index { base, .. } => {
                base.root_identifier()
            }
            _ => None,
        }
    }

    /// Source text of a string literal without its delimiters.
    pub fn string_token(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::String { raw } => Some(lua_string_token(raw)),
            _ => None,
        }
    }
}

/// Strip Lua string delimiters (`"..."`, `'...'`, `[==[...]==]`).
pub fn lua_string_token(raw: &str) -> &str {
    if raw.starts_with('[') {
        let level = raw[1..].chars().take_while(|c| *c == '=').count();
        let open = level + 2;
        let close = level + 2;
        if raw.len() < open + close {
            return "";
        }
        let inner = &raw[open..raw.len() - close];
        inner
            .strip_prefix("\r\n")
            .or_else(|| inner.strip_prefix('\n'))
            .unwrap_or(inner)
    } else if raw.len() >= 2 {
        &raw[1..raw.len() - 1]
    } else {
        ""
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Indexer {
    #[serde(rename = ".")]
    Dot,
    #[serde(rename = ":")]
    Colon,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableField {
    pub id: NodeId,
    pub loc: Location,
    pub kind: TableFieldKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TableFieldKind {
    /// `name = value`
    KeyString { key: Identifier, value: Expression },
    /// `[expr] = value`
    Key { key: Expression, value: Expression },
    /// positional `value`
    Value { value: Expression },
}

impl TableFieldKind {
    pub fn value(&self) -> &Expression {
        match self {
            TableFieldKind::KeyString { value, .. }
            | TableFieldKind::Key { value, .. }
            | TableFieldKind::Value { value } => value,
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, TableFieldKind::Value { .. })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn as_lua(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "~",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    /// Native JS spelling. `FloorDiv` has none and is lowered separately.
    pub fn as_js(self) -> &'static str {
        match self {
            BinaryOp::Concat => "+",
            BinaryOp::Eq => "===",
            BinaryOp::Ne => "!==",
            BinaryOp::Pow => "**",
            BinaryOp::BitXor => "^",
            BinaryOp::FloorDiv => "/",
            other => other.as_lua(),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_js(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Len,
    BitNot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lua_string_token() {
        assert_eq!(lua_string_token("'abc'"), "abc");
        assert_eq!(lua_string_token("\"a\""), "a");
        assert_eq!(lua_string_token("[[x]]"), "x");
        assert_eq!(lua_string_token("[==[\nline]==]"), "line");
    }

    #[test]
    fn test_binary_op_js_spelling() {
        assert_eq!(BinaryOp::Concat.as_js(), "+");
        assert_eq!(BinaryOp::Ne.as_js(), "!==");
        assert_eq!(BinaryOp::Pow.as_js(), "**");
        assert!(BinaryOp::Le.is_comparison());
        assert!(!BinaryOp::Add.is_comparison());
    }
}
