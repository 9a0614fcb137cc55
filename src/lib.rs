//! Sinter - an ahead-of-time compiler core for the Sinter language.
//!
//! The facade over the workspace crates:
//!
//! - [`ast`]: the tree the out-of-scope parser hands in
//! - [`compiler`]: resolution, type checking, annotations, pointer cleanup
//!   validation and IR generation
//! - [`runtime`]: D-string and serialization runtime support plus a
//!   reference evaluator for compiled modules
//!
//! ```no_run
//! use sinter::{Program, compile};
//!
//! let program = Program::default();
//! let output = compile(&program);
//! if output.is_success() {
//!     let module = output.module.expect("module emitted");
//!     println!("{module}");
//! } else {
//!     eprintln!("{}", output.diagnostics);
//! }
//! ```

pub use sinter_ast as ast;
pub use sinter_compiler as compiler;
pub use sinter_core as core;
pub use sinter_runtime as runtime;

pub use sinter_ast::Program;
pub use sinter_compiler::{CompilationOutput, Compiler, IrModule};
pub use sinter_core::{Diagnostic, Diagnostics, Severity, SinterError, Span};
pub use sinter_runtime::{Machine, Value};

/// Compile one unit: run every pipeline stage, accumulate diagnostics, and
/// emit the IR module when no stage reported an error.
pub fn compile(program: &Program) -> CompilationOutput {
    Compiler::compile(program)
}
