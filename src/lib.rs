//! Mila: a single-pass compiler for a small Pascal-like language.
//!
//! Source is lexed up front, then the [`session::Session`] parses one
//! top-level item at a time and lowers it into a [`kiln`] module before
//! reading on, so operators defined by earlier functions change how later
//! text is parsed.

pub mod codegen;
pub mod errors;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod session;

use kiln::Module;

use errors::{CompileError, Diagnostic};
use session::Session;

/// A finished module plus the recoverable errors met on the way.
#[derive(Debug)]
pub struct Compilation {
    pub module: Module,
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compile a whole program with the standard I/O primitives declared.
pub fn compile_source(module_name: &str, source: &str) -> Result<Compilation, CompileError> {
    let mut session = Session::from_source(module_name, source)?;
    session.declare_io();
    session.run_pipeline()?;
    let diagnostics = session.diagnostics().to_vec();
    let module = session.finish()?;
    Ok(Compilation {
        module,
        diagnostics,
    })
}
