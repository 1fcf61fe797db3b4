pub mod token;

use std::error::Error;
use std::fmt;

use token::{Operator, Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl LexError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lex error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for LexError {}

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).lex()
}

struct Lexer {
    chars: Vec<char>,
    current: usize,
    start: usize,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        while !self.is_at_end() {
            self.start_token();
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            ',' => self.add_token(TokenKind::Comma),
            ';' => self.add_token(TokenKind::Semicolon),
            '.' => self.add_token(TokenKind::Dot),
            ':' => {
                if self.matches('=') {
                    self.add_op(Operator::Assign);
                } else {
                    self.add_token(TokenKind::Colon);
                }
            }
            '=' => {
                if self.matches('=') {
                    self.add_op(Operator::Equal);
                } else {
                    self.add_op(Operator::Assign);
                }
            }
            '<' => {
                if self.matches('=') {
                    self.add_op(Operator::LessEqual);
                } else if self.matches('>') {
                    self.add_op(Operator::NotEqual);
                } else {
                    self.add_op(Operator::Less);
                }
            }
            '>' => {
                if self.matches('=') {
                    self.add_op(Operator::GreaterEqual);
                } else {
                    self.add_op(Operator::Greater);
                }
            }
            '!' => {
                if self.matches('=') {
                    self.add_op(Operator::NotEqual);
                } else {
                    self.add_op(Operator::Symbol('!'));
                }
            }
            '$' if self.peek().is_ascii_hexdigit() => self.number(16)?,
            '&' if is_octal_digit(self.peek()) => self.number(8)?,
            '#' => self.skip_line_comment(),
            d if d.is_ascii_digit() => self.number(10)?,
            a if is_ident_start(a) => self.identifier(),
            w if w.is_whitespace() => {}
            other if other.is_control() => {
                return Err(LexError::new(
                    format!("unexpected character {:?}", other),
                    self.token_line,
                    self.token_column,
                ))
            }
            other => self.add_op(Operator::from_char(other)),
        }

        Ok(())
    }

    fn number(&mut self, radix: u32) -> Result<(), LexError> {
        // The decimal case has already consumed its first digit.
        while self.peek().is_digit(radix) {
            self.advance();
        }

        let lexeme = self.current_lexeme();
        let digits = if radix == 10 { &lexeme[..] } else { &lexeme[1..] };
        let value = i32::from_str_radix(digits, radix).map_err(|_| {
            LexError::new(
                format!("integer literal '{}' does not fit in 32 bits", lexeme),
                self.token_line,
                self.token_column,
            )
        })?;
        self.add_token(TokenKind::Number(value));
        Ok(())
    }

    fn identifier(&mut self) {
        while is_ident_continue(self.peek()) {
            self.advance();
        }

        let lexeme = self.current_lexeme();
        let kind = TokenKind::keyword(&lexeme).unwrap_or(TokenKind::Identifier(lexeme));
        self.add_token(kind);
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn add_op(&mut self, op: Operator) {
        self.add_token(TokenKind::Op(op));
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.current_lexeme();
        self.tokens
            .push(Token::new(kind, lexeme, self.token_line, self.token_column));
    }

    fn start_token(&mut self) {
        self.start = self.current;
        self.token_line = self.line;
        self.token_column = self.column;
    }

    fn current_lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }
        self.advance();
        true
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn is_octal_digit(c: char) -> bool {
    c.is_digit(8)
}
