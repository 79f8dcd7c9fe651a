//! Parser for the SQL-like query dialect accepted by `get_all_by_query`.
//!
//! ```text
//! SELECT * FROM c [WHERE <expr>] [ORDER BY c.<path> [ASC|DESC]]
//! ```
//!
//! Expressions combine comparisons (`=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`)
//! against literals, `CONTAINS(c.path, 'text' [, ignore_case])`,
//! `STARTSWITH(c.path, 'text' [, ignore_case])`, `AND`, `OR`, `NOT` and
//! parentheses. Every field path must be qualified with the `FROM` alias.

use serde_json::{Number, Value};

use crate::dao::storage::{StorageError, StorageResult};

use super::{CompareOp, Filter, Sort, SortDirection};

/// Deepest run of `NOT`s and parentheses a query may nest.
const MAX_NESTING: usize = 64;

/// Outcome of parsing a raw query: an optional predicate and ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// The `WHERE` clause, if any.
    pub filter: Option<Filter>,
    /// The `ORDER BY` clause, if any.
    pub sort: Option<Sort>,
}

impl ParsedQuery {
    /// Parse query text, reporting the byte offset of the first problem.
    pub fn parse(text: &str) -> StorageResult<Self> {
        let tokens = Lexer::new(text).tokenize()?;
        Parser::new(tokens, text.len()).parse()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(Number),
    Op(CompareOp),
    Dot,
    Comma,
    LParen,
    RParen,
    Star,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn invalid(position: usize, message: impl Into<String>) -> StorageError {
    StorageError::InvalidQuery {
        position,
        message: message.into(),
    }
}

struct Lexer<'a> {
    text: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> StorageResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&(position, ch)) = self.chars.peek() {
            let kind = match ch {
                c if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                '.' => self.single(TokenKind::Dot),
                ',' => self.single(TokenKind::Comma),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '*' => self.single(TokenKind::Star),
                '=' => self.single(TokenKind::Op(CompareOp::Eq)),
                '!' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, '=')) => TokenKind::Op(CompareOp::Ne),
                        _ => return Err(invalid(position, "expected `=` after `!`")),
                    }
                }
                '<' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some((_, '=')) => {
                            self.chars.next();
                            TokenKind::Op(CompareOp::Le)
                        }
                        Some((_, '>')) => {
                            self.chars.next();
                            TokenKind::Op(CompareOp::Ne)
                        }
                        _ => TokenKind::Op(CompareOp::Lt),
                    }
                }
                '>' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some((_, '=')) => {
                            self.chars.next();
                            TokenKind::Op(CompareOp::Ge)
                        }
                        _ => TokenKind::Op(CompareOp::Gt),
                    }
                }
                '\'' => self.string(position)?,
                c if c.is_ascii_digit() || c == '-' => self.number(position)?,
                c if c.is_alphabetic() || c == '_' => self.ident(),
                other => return Err(invalid(position, format!("unexpected character `{other}`"))),
            };
            tokens.push(Token { kind, position });
        }
        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.chars.next();
        kind
    }

    fn string(&mut self, start: usize) -> StorageResult<TokenKind> {
        self.chars.next();
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\'')) => {
                    // `''` inside a literal is an escaped quote.
                    if matches!(self.chars.peek(), Some((_, '\''))) {
                        self.chars.next();
                        value.push('\'');
                    } else {
                        return Ok(TokenKind::Str(value));
                    }
                }
                Some((_, ch)) => value.push(ch),
                None => return Err(invalid(start, "unterminated string literal")),
            }
        }
    }

    fn number(&mut self, start: usize) -> StorageResult<TokenKind> {
        let mut end = start;
        while let Some(&(position, ch)) = self.chars.peek() {
            let leading_minus = ch == '-' && position == start;
            if ch.is_ascii_digit() || ch == '.' || leading_minus {
                end = position + ch.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let literal = &self.text[start..end];
        let parsed = if literal.contains('.') {
            literal
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
        } else {
            literal.parse::<i64>().ok().map(Number::from)
        };
        parsed
            .map(TokenKind::Number)
            .ok_or_else(|| invalid(start, format!("invalid number `{literal}`")))
    }

    fn ident(&mut self) -> TokenKind {
        let mut ident = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }
        TokenKind::Ident(ident)
    }
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    end: usize,
    depth: usize,
    alias: String,
}

impl Parser {
    fn new(tokens: Vec<Token>, end: usize) -> Self {
        Self {
            tokens,
            cursor: 0,
            end,
            depth: 0,
            alias: String::new(),
        }
    }

    fn parse(mut self) -> StorageResult<ParsedQuery> {
        self.expect_keyword("SELECT")?;
        self.expect(&TokenKind::Star, "`*`")?;
        self.expect_keyword("FROM")?;
        self.alias = self.expect_ident("collection alias")?;

        let filter = if self.eat_keyword("WHERE") {
            Some(self.expression()?)
        } else {
            None
        };

        let sort = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let path = self.path()?;
            let direction = if self.eat_keyword("DESC") {
                SortDirection::Descending
            } else {
                self.eat_keyword("ASC");
                SortDirection::Ascending
            };
            Some(Sort::from_query(path, direction))
        } else {
            None
        };

        if let Some(token) = self.peek() {
            return Err(invalid(token.position, "unexpected trailing input"));
        }

        Ok(ParsedQuery { filter, sort })
    }

    fn expression(&mut self) -> StorageResult<Filter> {
        let mut left = self.conjunction()?;
        while self.eat_keyword("OR") {
            let right = self.conjunction()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> StorageResult<Filter> {
        let mut left = self.unary()?;
        while self.eat_keyword("AND") {
            let right = self.unary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> StorageResult<Filter> {
        if self.eat_keyword("NOT") {
            return Ok(Filter::Not(Box::new(self.nested(Self::unary)?)));
        }
        if self.eat(&TokenKind::LParen) {
            let inner = self.nested(Self::expression)?;
            self.expect(&TokenKind::RParen, "`)`")?;
            return Ok(inner);
        }
        if self.eat_keyword("CONTAINS") {
            let (path, needle, ignore_case) = self.string_function()?;
            return Ok(Filter::Contains {
                path,
                needle,
                ignore_case,
            });
        }
        if self.eat_keyword("STARTSWITH") {
            let (path, prefix, ignore_case) = self.string_function()?;
            return Ok(Filter::StartsWith {
                path,
                prefix,
                ignore_case,
            });
        }
        self.comparison()
    }

    fn nested(&mut self, parse: fn(&mut Self) -> StorageResult<Filter>) -> StorageResult<Filter> {
        if self.depth >= MAX_NESTING {
            return Err(invalid(
                self.position(),
                format!("expression nests deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn comparison(&mut self) -> StorageResult<Filter> {
        let path = self.path()?;
        let position = self.position();
        let op = match self.next() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) => op,
            _ => return Err(invalid(position, "expected comparison operator")),
        };
        let value = self.literal()?;
        Ok(Filter::Compare { path, op, value })
    }

    fn string_function(&mut self) -> StorageResult<(String, String, bool)> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let path = self.path()?;
        self.expect(&TokenKind::Comma, "`,`")?;
        let position = self.position();
        let text = match self.literal()? {
            Value::String(text) => text,
            _ => return Err(invalid(position, "expected string literal")),
        };
        let mut ignore_case = false;
        if self.eat(&TokenKind::Comma) {
            let position = self.position();
            ignore_case = match self.literal()? {
                Value::Bool(flag) => flag,
                _ => return Err(invalid(position, "expected boolean literal")),
            };
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok((path, text, ignore_case))
    }

    fn path(&mut self) -> StorageResult<String> {
        let position = self.position();
        let root = self.expect_ident("field path")?;
        if root != self.alias {
            return Err(invalid(
                position,
                format!("field path must start with alias `{}`", self.alias),
            ));
        }
        let mut segments = Vec::new();
        while self.eat(&TokenKind::Dot) {
            segments.push(self.expect_ident("field name")?);
        }
        if segments.is_empty() {
            return Err(invalid(position, "expected field after alias"));
        }
        Ok(segments.join("."))
    }

    fn literal(&mut self) -> StorageResult<Value> {
        let position = self.position();
        match self.next() {
            Some(Token {
                kind: TokenKind::Str(text),
                ..
            }) => Ok(Value::String(text)),
            Some(Token {
                kind: TokenKind::Number(number),
                ..
            }) => Ok(Value::Number(number)),
            Some(Token {
                kind: TokenKind::Ident(ident),
                ..
            }) => match ident.to_ascii_uppercase().as_str() {
                "TRUE" => Ok(Value::Bool(true)),
                "FALSE" => Ok(Value::Bool(false)),
                "NULL" => Ok(Value::Null),
                _ => Err(invalid(position, format!("expected literal, found `{ident}`"))),
            },
            _ => Err(invalid(position, "expected literal")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map(|token| token.position).unwrap_or(self.end)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|token| &token.kind == kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> StorageResult<()> {
        let position = self.position();
        if self.eat(kind) {
            Ok(())
        } else {
            Err(invalid(position, format!("expected {what}")))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let matched = matches!(
            self.peek(),
            Some(Token { kind: TokenKind::Ident(ident), .. }) if ident.eq_ignore_ascii_case(keyword)
        );
        if matched {
            self.cursor += 1;
        }
        matched
    }

    fn expect_keyword(&mut self, keyword: &str) -> StorageResult<()> {
        let position = self.position();
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(invalid(position, format!("expected `{keyword}`")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> StorageResult<String> {
        let position = self.position();
        match self.next() {
            Some(Token {
                kind: TokenKind::Ident(ident),
                ..
            }) => Ok(ident),
            _ => Err(invalid(position, format!("expected {what}"))),
        }
    }
}
