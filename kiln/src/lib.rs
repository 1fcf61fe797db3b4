//! Kiln - IR construction and native code emission for Mila
//!
//! The Mila front end lowers each top-level construct straight into a
//! [`ir::Module`] through the [`ModuleBuilder`] cursor. Once the pipeline has
//! drained the source, the module is verified and handed to a backend
//! (Cranelift object emission or JIT) or to the reference interpreter.

#![warn(missing_docs)]

pub mod backend;
pub mod interp;
pub mod ir;

pub use ir::builder::ModuleBuilder;
pub use ir::{BinOp, BlockId, CmpOp, Location, Module, Param, Type, Value};

/// Kiln version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors raised while building, verifying, emitting or executing IR.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KilnError {
    /// The builder has no function/block to insert into.
    #[error("no insertion point set")]
    NoInsertionPoint,
    /// An instruction was emitted after the block terminator.
    #[error("block '{0}' is already terminated")]
    BlockTerminated(String),
    /// A call or lookup named a function the module does not contain.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    /// A global lookup failed.
    #[error("unknown global '{0}'")]
    UnknownGlobal(String),
    /// IR validation failed
    #[error("invalid IR: {0}")]
    InvalidIR(String),
    /// Backend error
    #[error("backend error: {0}")]
    Backend(String),
    /// Interpreter failure
    #[error("execution error: {0}")]
    Execution(String),
}

/// Shorthand result type for kiln operations.
pub type Result<T> = std::result::Result<T, KilnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            KilnError::BlockTerminated("entry0".to_string()).to_string(),
            "block 'entry0' is already terminated"
        );
        assert_eq!(KilnError::NoInsertionPoint.to_string(), "no insertion point set");
    }
}
