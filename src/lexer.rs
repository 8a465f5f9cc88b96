//! Lexer (tokenizer) for Lua 5.3.
//!
//! Called on demand by the parser. Comments never surface as tokens; they
//! are collected with their locations so the generator can re-insert them.

use crate::ast::{Comment, Location, Position};
use crate::parse::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number { value: f64, raw: String },
    /// Raw source text including delimiters.
    Str(String),

    // Keywords
    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // Punctuation
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    Amp,
    Tilde,
    Pipe,
    Shl,
    Shr,
    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(name) => format!("'{}'", name),
            TokenKind::Number { raw, .. } => format!("'{}'", raw),
            TokenKind::Str(raw) => raw.clone(),
            TokenKind::Eof => "<eof>".to_string(),
            other => format!("{:?}", other),
        }
    }
}

fn keyword_from_str(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "and" => TokenKind::And,
        "break" => TokenKind::Break,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "elseif" => TokenKind::ElseIf,
        "end" => TokenKind::End,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "function" => TokenKind::Function,
        "goto" => TokenKind::Goto,
        "if" => TokenKind::If,
        "in" => TokenKind::In,
        "local" => TokenKind::Local,
        "nil" => TokenKind::Nil,
        "not" => TokenKind::Not,
        "or" => TokenKind::Or,
        "repeat" => TokenKind::Repeat,
        "return" => TokenKind::Return,
        "then" => TokenKind::Then,
        "true" => TokenKind::True,
        "until" => TokenKind::Until,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Location,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    comments: Vec<Comment>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            comments: Vec::new(),
        };
        // Shebang line is not Lua syntax.
        if source.starts_with("#!") {
            while !lexer.is_eof() && lexer.current() != b'\n' {
                lexer.pos += 1;
            }
        }
        lexer
    }

    /// Comments seen so far, in discovery order.
    pub fn take_comments(&mut self) -> Vec<Comment> {
        std::mem::take(&mut self.comments)
    }

    /// Independent cursor for one-token lookahead. Comments it passes over
    /// are not recorded.
    pub fn clone_for_lookahead(&self) -> Lexer<'a> {
        Lexer {
            source: self.source,
            bytes: self.bytes,
            pos: self.pos,
            line: self.line,
            line_start: self.line_start,
            comments: Vec::new(),
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let start = self.position();

        if self.is_eof() {
            return Ok(Token {
                kind: TokenKind::Eof,
                loc: Location::new(start, start),
            });
        }

        let ch = self.current();
        let kind = match ch {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_name(),
            b'0'..=b'9' => self.scan_number(start)?,
            b'.' if self.peek_at(1).is_ascii_digit() => self.scan_number(start)?,
            b'"' | b'\'' => self.scan_short_string(ch, start)?,
            b'[' if self.long_bracket_level().is_some() => {
                let raw = self.scan_long_bracket(start, "string")?;
                TokenKind::Str(raw)
            }
            _ => self.scan_punctuation(start)?,
        };

        Ok(Token {
            kind,
            loc: Location::new(start, self.position()),
        })
    }

    // =========================================================================
    // Cursor helpers
    // =========================================================================

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn position(&self) -> Position {
        Position::new(self.line, (self.pos - self.line_start) as u32)
    }

    fn advance(&mut self) {
        if self.current() == b'\n' {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    fn error(&self, message: impl Into<String>, at: Position) -> ParseError {
        ParseError::new(message, at.line, at.column)
    }

    // =========================================================================
    // Trivia
    // =========================================================================

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            if self.is_eof() {
                return Ok(());
            }
            match self.current() {
                b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c => self.advance(),
                b'-' if self.peek_at(1) == b'-' => self.scan_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn scan_comment(&mut self) -> Result<(), ParseError> {
        let start = self.position();
        let start_pos = self.pos;
        self.pos += 2;

        if !self.is_eof() && self.current() == b'[' {
            if let Some(level) = self.long_bracket_level() {
                let raw = self.scan_long_bracket(start, "comment")?;
                let open = level + 2;
                let value = raw[2 + open..raw.len() - open].to_string();
                self.comments.push(Comment {
                    value,
                    raw,
                    is_block: true,
                    loc: Location::new(start, self.position()),
                });
                return Ok(());
            }
        }

        while !self.is_eof() && self.current() != b'\n' {
            self.pos += 1;
        }
        let raw = self.source[start_pos..self.pos].trim_end_matches('\r');
        self.comments.push(Comment {
            value: raw[2..].to_string(),
            raw: raw.to_string(),
            is_block: false,
            loc: Location::new(start, self.position()),
        });
        Ok(())
    }

    /// Level of a long bracket opening at the cursor (`[[` is 0, `[==[` is 2).
    fn long_bracket_level(&self) -> Option<usize> {
        let mut offset = 1;
        while self.peek_at(offset) == b'=' {
            offset += 1;
        }
        if self.peek_at(offset) == b'[' {
            Some(offset - 1)
        } else {
            None
        }
    }

    /// Scans `[==[ ... ]==]` starting at the cursor (or at `--` for comments,
    /// in which case `start` still points at the dashes). Returns raw text.
    fn scan_long_bracket(&mut self, start: Position, what: &str) -> Result<String, ParseError> {
        let raw_start = if what == "comment" {
            self.pos - 2
        } else {
            self.pos
        };
        let level = self.long_bracket_level().unwrap_or(0);
        for _ in 0..level + 2 {
            self.advance();
        }

        loop {
            if self.is_eof() {
                return Err(self.error(format!("unfinished long {}", what), start));
            }
            if self.current() == b']' {
                let mut offset = 1;
                while self.peek_at(offset) == b'=' {
                    offset += 1;
                }
                if offset - 1 == level && self.peek_at(offset) == b']' {
                    for _ in 0..level + 2 {
                        self.advance();
                    }
                    return Ok(self.source[raw_start..self.pos].to_string());
                }
            }
            self.advance();
        }
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    fn scan_name(&mut self) -> TokenKind {
        let start = self.pos;
        while !self.is_eof() && (self.current().is_ascii_alphanumeric() || self.current() == b'_')
        {
            self.pos += 1;
        }
        let name = &self.source[start..self.pos];
        keyword_from_str(name).unwrap_or_else(|| TokenKind::Name(name.to_string()))
    }

    fn scan_number(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.pos;
        let is_hex = self.current() == b'0' && matches!(self.peek_at(1), b'x' | b'X');

        if is_hex {
            self.pos += 2;
            while !self.is_eof() {
                let c = self.current();
                if c.is_ascii_hexdigit() || c == b'.' {
                    self.pos += 1;
                } else if matches!(c, b'p' | b'P') {
                    self.pos += 1;
                    if matches!(self.peek_at(0), b'+' | b'-') {
                        self.pos += 1;
                    }
                } else {
                    break;
                }
            }
        } else {
            while !self.is_eof() {
                let c = self.current();
                if c.is_ascii_digit() || c == b'.' {
                    self.pos += 1;
                } else if matches!(c, b'e' | b'E') {
                    self.pos += 1;
                    if matches!(self.peek_at(0), b'+' | b'-') {
                        self.pos += 1;
                    }
                } else {
                    break;
                }
            }
        }

        let raw = &self.source[begin..self.pos];
        let value = if is_hex {
            parse_hex_number(&raw[2..])
        } else {
            raw.parse::<f64>().ok()
        };

        match value {
            Some(value) => Ok(TokenKind::Number {
                value,
                raw: raw.to_string(),
            }),
            None => Err(self.error(format!("malformed number near '{}'", raw), start)),
        }
    }

    fn scan_short_string(&mut self, quote: u8, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.pos;
        self.pos += 1;
        loop {
            if self.is_eof() {
                return Err(self.error("unfinished string", start));
            }
            match self.current() {
                b'\\' => {
                    self.pos += 1;
                    if self.is_eof() {
                        continue;
                    }
                    let escaped = self.current();
                    self.advance();
                    if escaped == b'z' {
                        while !self.is_eof() && self.current().is_ascii_whitespace() {
                            self.advance();
                        }
                    }
                }
                b'\n' => return Err(self.error("unfinished string", start)),
                c if c == quote => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        Ok(TokenKind::Str(self.source[begin..self.pos].to_string()))
    }

    fn scan_punctuation(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let c = self.current();
        let next = self.peek_at(1);
        let (kind, width) = match (c, next) {
            (b'.', b'.') if self.peek_at(2) == b'.' => (TokenKind::Ellipsis, 3),
            (b'.', b'.') => (TokenKind::Concat, 2),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'/', b'/') => (TokenKind::DoubleSlash, 2),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'=', b'=') => (TokenKind::EqEq, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'~', b'=') => (TokenKind::NotEq, 2),
            (b'~', _) => (TokenKind::Tilde, 1),
            (b'<', b'=') => (TokenKind::Le, 2),
            (b'<', b'<') => (TokenKind::Shl, 2),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', b'=') => (TokenKind::Ge, 2),
            (b'>', b'>') => (TokenKind::Shr, 2),
            (b'>', _) => (TokenKind::Gt, 1),
            (b':', b':') => (TokenKind::DoubleColon, 2),
            (b':', _) => (TokenKind::Colon, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'#', _) => (TokenKind::Hash, 1),
            (b'&', _) => (TokenKind::Amp, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b',', _) => (TokenKind::Comma, 1),
            _ => {
                let found = self.source[self.pos..].chars().next().unwrap_or('?');
                return Err(self.error(format!("unexpected symbol near '{}'", found), start));
            }
        };
        self.pos += width;
        Ok(kind)
    }
}

fn parse_hex_number(digits: &str) -> Option<f64> {
    let lower = digits.to_ascii_lowercase();
    let (mantissa, exponent) = match lower.split_once('p') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().ok()?),
        None => (lower.clone(), 0),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (mantissa.clone(), String::new()),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value = 0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    Some(value * 2f64.powi(exponent))
}
