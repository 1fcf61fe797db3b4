pub mod pretty;

use std::fmt;

use kiln::KilnError;

use crate::lexer::LexError;
use crate::parser::ParseError;

/// Everything that can go wrong while compiling a Mila program.
///
/// Most variants are recoverable: the session reports them and moves on to
/// the next top-level item. [`CompileError::is_fatal`] marks the ones that
/// abort the whole run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("'{name}' takes {expected} argument(s) but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("initializer of constant '{0}' is not a compile-time integer")]
    NonConstantInitializer(String),
    #[error("cannot assign to constant '{0}'")]
    AssignToConstant(String),
    #[error("unknown unary operator '{0}'")]
    UnknownOperator(char),
    #[error("argument {position} of '{callee}' must be a variable")]
    InvalidInputArgument { callee: String, position: usize },
    #[error("{0} produces no value")]
    VoidValue(String),
    #[error("function '{0}' is already defined")]
    FunctionRedefinition(String),
    #[error(transparent)]
    Backend(#[from] KilnError),
    #[error("no function implements binary operator '{0}'")]
    MissingBinaryOperator(char),
    #[error("left-hand side of ':=' must be a variable")]
    InvalidAssignmentTarget,
}

impl CompileError {
    /// Fatal errors stop the pipeline instead of being reported and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompileError::MissingBinaryOperator(_) | CompileError::InvalidAssignmentTarget
        )
    }
}

/// A recoverable error together with where its top-level item started.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub error: CompileError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            // These already carry their own position.
            CompileError::Lex(_) | CompileError::Parse(_) => write!(f, "{}", self.error),
            error => write!(
                f,
                "error at line {}, column {}: {}",
                self.line, self.column, error
            ),
        }
    }
}
