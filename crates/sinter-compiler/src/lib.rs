//! Sinter compiler core.
//!
//! The semantic-analysis and code-generation pipeline. The out-of-scope
//! parser hands in a complete [`Program`] AST; the pipeline runs strictly
//! forward through its stages and hands one textual IR module (plus the
//! accumulated diagnostics) to the out-of-scope backend:
//!
//! 1. [`resolver`] - scopes, symbol binding, inheritance graph
//! 2. [`typecheck`] - types for every expression, conformance, return paths
//! 3. [`annotations`] - accessor obligations and serialization plans
//! 4. [`cleanup`] - pointer ownership dataflow over the [`cfg`]
//! 5. [`codegen`] - class layouts, method bodies, runtime support, [`ir`]
//!
//! Each stage runs to completion over the whole unit, accumulating every
//! diagnostic it can produce; any error-severity diagnostic stops the next
//! stage from running. Warnings never block emission.

pub mod annotations;
pub mod cfg;
pub mod cleanup;
pub mod codegen;
pub mod dstring;
pub mod ir;
pub mod layout;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod typecheck;

use sinter_ast::Program;
use sinter_core::Diagnostics;

pub use annotations::{AnnotationOutput, SerializationPlan};
pub use ir::IrModule;
pub use registry::{Registry, Type};
pub use resolver::{Binding, Resolution};
pub use typecheck::TypeInfo;

/// Result of compiling one unit.
#[derive(Debug)]
pub struct CompilationOutput {
    /// The emitted module; `None` when any stage reported an error.
    pub module: Option<IrModule>,
    /// Every diagnostic produced, in stage order.
    pub diagnostics: Diagnostics,
}

impl CompilationOutput {
    /// Whether the unit compiled without error-severity diagnostics.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// The pipeline entry point.
pub struct Compiler;

impl Compiler {
    /// Compile one unit. Never panics on bad input; everything user-facing
    /// lands in the returned diagnostics.
    pub fn compile(program: &Program) -> CompilationOutput {
        let mut diagnostics = Diagnostics::new();

        let resolution = resolver::resolve(program, &mut diagnostics);
        if diagnostics.has_errors() {
            return CompilationOutput {
                module: None,
                diagnostics,
            };
        }

        let types = typecheck::check(program, &resolution, &mut diagnostics);
        if diagnostics.has_errors() {
            return CompilationOutput {
                module: None,
                diagnostics,
            };
        }

        let annotations = annotations::process(&types, &mut diagnostics);
        if diagnostics.has_errors() {
            return CompilationOutput {
                module: None,
                diagnostics,
            };
        }

        cleanup::validate(program, &resolution, &mut diagnostics);
        if diagnostics.has_errors() {
            return CompilationOutput {
                module: None,
                diagnostics,
            };
        }

        let module = codegen::generate(program, &resolution, &types, &annotations, &mut diagnostics);
        CompilationOutput {
            module,
            diagnostics,
        }
    }
}
