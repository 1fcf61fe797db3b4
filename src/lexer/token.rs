use std::fmt;

/// Operator-capable tokens.
///
/// Every character that is not a letter, digit, whitespace, control
/// character or punctuation lexes as an operator, so user-defined operators
/// such as `|` or `Æ` arrive here as [`Operator::Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `:=`, also spelled `=`
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// `==`
    Equal,
    /// `!=`, also spelled `<>`
    NotEqual,
    Symbol(char),
}

impl Operator {
    /// Single-character operators, the only ones usable as a prefix or as
    /// the name suffix of a `binary`/`unary` function.
    pub fn as_char(self) -> Option<char> {
        match self {
            Operator::Plus => Some('+'),
            Operator::Minus => Some('-'),
            Operator::Star => Some('*'),
            Operator::Slash => Some('/'),
            Operator::Less => Some('<'),
            Operator::Greater => Some('>'),
            Operator::Symbol(c) => Some(c),
            Operator::Assign
            | Operator::LessEqual
            | Operator::GreaterEqual
            | Operator::Equal
            | Operator::NotEqual => None,
        }
    }

    pub fn from_char(c: char) -> Self {
        match c {
            '+' => Operator::Plus,
            '-' => Operator::Minus,
            '*' => Operator::Star,
            '/' => Operator::Slash,
            '<' => Operator::Less,
            '>' => Operator::Greater,
            other => Operator::Symbol(other),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Assign => f.write_str(":="),
            Operator::LessEqual => f.write_str("<="),
            Operator::GreaterEqual => f.write_str(">="),
            Operator::Equal => f.write_str("=="),
            Operator::NotEqual => f.write_str("!="),
            single => match single.as_char() {
                Some(c) => write!(f, "{}", c),
                None => Ok(()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Op(Operator),
    Identifier(String),
    Number(i32),
    Program,
    Function,
    Procedure,
    Forward,
    Begin,
    End,
    Integer,
    If,
    Then,
    Else,
    For,
    To,
    Downto,
    Do,
    Var,
    Const,
    Eof,
}

impl TokenKind {
    pub fn keyword(text: &str) -> Option<Self> {
        let kind = match text {
            "program" => TokenKind::Program,
            "function" => TokenKind::Function,
            "procedure" => TokenKind::Procedure,
            "forward" => TokenKind::Forward,
            "begin" => TokenKind::Begin,
            "end" => TokenKind::End,
            "integer" => TokenKind::Integer,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "to" => TokenKind::To,
            "downto" => TokenKind::Downto,
            "do" => TokenKind::Do,
            "var" => TokenKind::Var,
            "const" => TokenKind::Const,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            column,
        }
    }
}
