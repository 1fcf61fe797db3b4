pub mod ast;
mod expr;
pub mod precedence;

use std::error::Error;
use std::fmt;

use crate::codegen::Context;
use crate::lexer::token::{Operator, Token, TokenKind};
use ast::{ConstEntry, ConstSection, Expr, Function, Item, Prototype, VarSection};
use precedence::DEFAULT_USER_PRECEDENCE;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, token: &Token) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for ParseError {}

/// Streaming parser: hands out one top-level [`Item`] at a time.
///
/// The parser reads operator precedences and records constant names through
/// the [`Context`] it is given, so what it accepts depends on what has been
/// lowered so far.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(token) if token.kind == TokenKind::Eof) {
            let (line, column) = tokens.last().map_or((1, 1), |t| (t.line, t.column));
            tokens.push(Token::new(TokenKind::Eof, String::new(), line, column));
        }
        Self { tokens, current: 0 }
    }

    /// Append more input behind the current position.
    pub fn push_tokens(&mut self, tokens: Vec<Token>) {
        if matches!(self.tokens.last(), Some(token) if token.kind == TokenKind::Eof) {
            self.tokens.pop();
        }
        self.current = self.current.min(self.tokens.len());
        self.tokens.extend(tokens);
        if !matches!(self.tokens.last(), Some(token) if token.kind == TokenKind::Eof) {
            self.tokens
                .push(Token::new(TokenKind::Eof, String::new(), 1, 1));
        }
    }

    /// Discard one token; used to resynchronize after a parse error.
    pub fn skip_token(&mut self) {
        self.advance();
    }

    pub fn parse_item(&mut self, ctx: &mut Context) -> Result<Item, ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Semicolon | TokenKind::Begin | TokenKind::End => {
                    self.advance();
                }
                TokenKind::Program => {
                    self.advance();
                    self.consume_identifier("expected program name after 'program'")?;
                    self.matches_symbol(TokenKind::Semicolon);
                }
                TokenKind::Dot => {
                    self.advance();
                    return Ok(Item::Eof);
                }
                TokenKind::Eof => return Ok(Item::Eof),
                TokenKind::Function | TokenKind::Procedure => return self.definition(ctx),
                TokenKind::Forward => {
                    self.advance();
                    let is_procedure = self.matches_keyword(TokenKind::Procedure);
                    if !is_procedure {
                        self.matches_keyword(TokenKind::Function);
                    }
                    let proto = self.prototype(is_procedure)?;
                    self.matches_symbol(TokenKind::Semicolon);
                    return Ok(Item::Forward(proto));
                }
                TokenKind::Var => {
                    self.advance();
                    return Ok(Item::Var(self.var_section()?));
                }
                TokenKind::Const => {
                    self.advance();
                    return Ok(Item::Const(self.const_section(ctx)?));
                }
                _ => {
                    let expr = self.expression(ctx)?;
                    self.matches_symbol(TokenKind::Semicolon);
                    return Ok(Item::Statement(expr));
                }
            }
        }
    }

    fn definition(&mut self, ctx: &mut Context) -> Result<Item, ParseError> {
        let is_procedure = self.matches_keyword(TokenKind::Procedure);
        if !is_procedure {
            self.consume_symbol(TokenKind::Function, "expected 'function'")?;
        }

        let proto = self.prototype(is_procedure)?;
        self.matches_symbol(TokenKind::Semicolon);

        if self.matches_keyword(TokenKind::Forward) {
            self.matches_symbol(TokenKind::Semicolon);
            return Ok(Item::Forward(proto));
        }

        let mut body = Vec::new();
        while self.matches_keyword(TokenKind::Var) {
            body.push(Expr::Var(self.var_section()?));
        }

        self.consume_symbol(TokenKind::Begin, "expected 'begin' before function body")?;
        body.extend(self.block_statements(ctx)?);
        self.matches_symbol(TokenKind::Semicolon);

        Ok(Item::Function(Function { proto, body }))
    }

    /// `name (params) [: integer]`, with `binary<op> [prec]` and
    /// `unary<op>` names for operator functions.
    fn prototype(&mut self, is_procedure: bool) -> Result<Prototype, ParseError> {
        let name_token = self.peek().clone();
        let mut name = self.consume_identifier("expected function name in prototype")?;
        let mut is_operator = false;
        let mut precedence = DEFAULT_USER_PRECEDENCE;

        if name == "binary" || name == "unary" {
            if let Some(c) = self.peek_operator_char() {
                self.advance();
                is_operator = true;
                if name == "binary" {
                    if let TokenKind::Number(value) = self.peek_kind() {
                        let value = *value;
                        if !(1..=100).contains(&value) {
                            return Err(ParseError::new(
                                "invalid precedence: must be 1..100",
                                self.peek(),
                            ));
                        }
                        precedence = value;
                        self.advance();
                    }
                }
                name.push(c);
            }
        }

        self.consume_symbol(TokenKind::LeftParen, "expected '(' in prototype")?;
        let params = self.parameters()?;
        self.consume_symbol(TokenKind::RightParen, "expected ')' in prototype")?;

        if self.matches_symbol(TokenKind::Colon) {
            self.consume_symbol(TokenKind::Integer, "expected 'integer' return type")?;
        }

        let mut proto = Prototype::new(name, params);
        proto.is_procedure = is_procedure;
        if is_operator {
            let expected = if proto.name.starts_with("binary") { 2 } else { 1 };
            if proto.params.len() != expected {
                return Err(ParseError::new(
                    format!(
                        "operator '{}' needs {} operand(s), found {}",
                        proto.name,
                        expected,
                        proto.params.len()
                    ),
                    &name_token,
                ));
            }
            proto.is_operator = true;
            proto.precedence = precedence;
        }
        Ok(proto)
    }

    fn parameters(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if self.check_kind(&TokenKind::RightParen) {
            return Ok(params);
        }

        let mut group = Vec::new();
        loop {
            group.push(self.consume_identifier("expected parameter name")?);
            if self.matches_symbol(TokenKind::Comma) {
                continue;
            }
            self.consume_symbol(TokenKind::Colon, "expected ':' after parameter name")?;
            self.consume_symbol(TokenKind::Integer, "expected 'integer' parameter type")?;
            params.append(&mut group);

            if !self.matches_symbol(TokenKind::Semicolon) && !self.matches_symbol(TokenKind::Comma)
            {
                break;
            }
        }
        Ok(params)
    }

    /// `a, b : integer; c : integer; ...` after the `var` keyword.
    pub(crate) fn var_section(&mut self) -> Result<VarSection, ParseError> {
        let mut names = Vec::new();
        loop {
            names.push(self.consume_identifier("expected variable name")?);
            while self.matches_symbol(TokenKind::Comma) {
                names.push(self.consume_identifier("expected variable name after ','")?);
            }
            self.consume_symbol(TokenKind::Colon, "expected ':' in var section")?;
            self.consume_symbol(TokenKind::Integer, "expected 'integer' in var section")?;
            self.matches_symbol(TokenKind::Semicolon);

            let continues = matches!(self.peek_kind(), TokenKind::Identifier(_))
                && matches!(
                    self.peek_kind_at(1),
                    Some(TokenKind::Comma) | Some(TokenKind::Colon)
                );
            if !continues {
                break;
            }
        }
        Ok(VarSection { names })
    }

    /// `A = expr; B = expr; ...` after the `const` keyword.
    fn const_section(&mut self, ctx: &mut Context) -> Result<ConstSection, ParseError> {
        let mut entries = Vec::new();
        loop {
            let name = self.consume_identifier("expected constant name")?;
            if !matches!(self.peek_kind(), TokenKind::Op(Operator::Assign)) {
                return Err(ParseError::new(
                    "expected '=' after constant name",
                    self.peek(),
                ));
            }
            self.advance();
            ctx.consts.insert(name.clone());
            let value = self.expression(ctx)?;
            entries.push(ConstEntry { name, value });
            self.matches_symbol(TokenKind::Semicolon);

            let continues = matches!(self.peek_kind(), TokenKind::Identifier(_))
                && self
                    .tokens
                    .get(self.current + 1)
                    .is_some_and(|t| t.lexeme == "=");
            if !continues {
                break;
            }
        }
        Ok(ConstSection { entries })
    }

    /// Statements up to and including the closing `end`.
    pub(crate) fn block_statements(&mut self, ctx: &mut Context) -> Result<Vec<Expr>, ParseError> {
        let mut statements = Vec::new();
        loop {
            if self.matches_keyword(TokenKind::End) {
                return Ok(statements);
            }
            if self.is_at_end() {
                return Err(ParseError::new("expected 'end' to close block", self.peek()));
            }
            if self.matches_symbol(TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.expression(ctx)?);
        }
    }

    pub(crate) fn matches_keyword(&mut self, kind: TokenKind) -> bool {
        self.matches_symbol(kind)
    }

    pub(crate) fn matches_symbol(&mut self, kind: TokenKind) -> bool {
        if self.check_kind(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume_symbol(&mut self, kind: TokenKind, message: &str) -> Result<(), ParseError> {
        if self.check_kind(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(message, self.peek()))
        }
    }

    pub(crate) fn consume_identifier(&mut self, message: &str) -> Result<String, ParseError> {
        match self.peek_kind() {
            TokenKind::Identifier(name) => {
                let value = name.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(ParseError::new(message, self.peek())),
        }
    }

    pub(crate) fn matches_identifier_literal(&mut self, expected: &str) -> bool {
        match self.peek_kind() {
            TokenKind::Identifier(name) if name == expected => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn peek_operator_char(&self) -> Option<char> {
        match self.peek_kind() {
            TokenKind::Op(op) => op.as_char(),
            _ => None,
        }
    }

    pub(crate) fn check_kind(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + offset).map(|token| &token.kind)
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
}
