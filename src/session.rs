use kiln::ir::Function as IrFunction;
use kiln::{Module, Value};
use log::{debug, error, warn};

use crate::codegen::{Context, ENTRY_FUNCTION};
use crate::errors::{CompileError, Diagnostic};
use crate::lexer::{self, token::Token};
use crate::parser::ast::Item;
use crate::parser::Parser;

/// Name of the input primitive declared by [`Session::declare_io`].
pub const INPUT_INTRINSIC: &str = "readln";
/// Name of the output primitive declared by [`Session::declare_io`].
pub const OUTPUT_INTRINSIC: &str = "writeln";

/// One compilation run: parser, compiler context and the diagnostics
/// reported so far.
pub struct Session {
    parser: Parser,
    ctx: Context,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    pub fn new(module_name: &str, tokens: Vec<Token>) -> Self {
        Self {
            parser: Parser::new(tokens),
            ctx: Context::new(module_name),
            diagnostics: Vec::new(),
        }
    }

    pub fn from_source(module_name: &str, source: &str) -> Result<Self, CompileError> {
        let tokens = lexer::lex(source)?;
        Ok(Self::new(module_name, tokens))
    }

    /// Queue more source text behind what has been consumed so far.
    pub fn push_source(&mut self, source: &str) -> Result<(), CompileError> {
        let tokens = lexer::lex(source)?;
        self.parser.push_tokens(tokens);
        Ok(())
    }

    pub fn declare_intrinsic(&mut self, name: &str, is_input: bool) {
        self.ctx.declare_intrinsic(name, is_input);
    }

    /// Declare the standard `readln`/`writeln` pair.
    pub fn declare_io(&mut self) {
        self.declare_intrinsic(INPUT_INTRINSIC, true);
        self.declare_intrinsic(OUTPUT_INTRINSIC, false);
    }

    /// Parse and lower items until the input runs out.
    ///
    /// Recoverable errors are recorded and the loop moves on; a parse error
    /// additionally discards one token. Only fatal errors end the run early.
    pub fn run_pipeline(&mut self) -> Result<(), CompileError> {
        loop {
            let (line, column) = {
                let token = self.parser.peek();
                (token.line, token.column)
            };

            let item = match self.parser.parse_item(&mut self.ctx) {
                Ok(Item::Eof) => return Ok(()),
                Ok(item) => item,
                Err(err) => {
                    warn!("{}", err);
                    self.diagnostics.push(Diagnostic {
                        line: err.line,
                        column: err.column,
                        error: err.into(),
                    });
                    self.parser.skip_token();
                    continue;
                }
            };

            if let Err(err) = self.ctx.lower_item(&item) {
                if err.is_fatal() {
                    error!("line {}, column {}: {}", line, column, err);
                    return Err(err);
                }
                warn!("line {}, column {}: {}", line, column, err);
                self.diagnostics.push(Diagnostic {
                    line,
                    column,
                    error: err,
                });
            }
        }
    }

    pub fn entry_function(&mut self) -> Result<&IrFunction, CompileError> {
        self.ctx.entry_function()
    }

    /// Close the entry function with `return 0`, verify and hand the module
    /// over.
    pub fn finish(mut self) -> Result<Module, CompileError> {
        let block = self.ctx.entry_function()?.last_block();
        if let Some(block) = block {
            self.ctx.builder.position_at_end(ENTRY_FUNCTION, block)?;
            if !self.ctx.builder.is_terminated() {
                self.ctx.builder.ret(Some(Value::Const(0)))?;
            }
        }
        self.ctx.builder.clear_position();

        let module = self.ctx.builder.build();
        module.verify()?;
        debug!(
            "finished module '{}' with {} function(s)",
            module.name,
            module.functions.len()
        );
        Ok(module)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The module as built so far, without the closing return.
    pub fn module(&self) -> &Module {
        self.ctx.module()
    }
}
