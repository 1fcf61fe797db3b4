//! Code generation backends
//!
//! The Cranelift backend is the production path; the IR interpreter in
//! [`crate::interp`] serves as the reference semantics for tests.

#[cfg(feature = "cranelift-backend")]
pub mod cranelift;

use crate::ir::Module;
use crate::Result;

/// Code generation backend trait
pub trait Backend {
    /// Generate a relocatable object from verified IR
    fn generate(&self, module: &Module) -> Result<Vec<u8>>;

    /// Get backend name
    fn name(&self) -> &'static str;

    /// Get supported target architectures
    fn supported_targets(&self) -> &[&str];
}

/// Names of the runtime symbols every Mila program may import.
pub const RUNTIME_SYMBOLS: [&str; 2] = ["writeln", "readln"];

/// C source of the runtime linked into native executables.
///
/// `readln` reports 1 when a number was stored and 0 otherwise.
pub const C_RUNTIME: &str = r#"#include <stdio.h>

int writeln(int value) {
    printf("%d\n", value);
    return 0;
}

int readln(int *target) {
    return scanf("%d", target) == 1 ? 1 : 0;
}
"#;
