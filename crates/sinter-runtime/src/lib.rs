//! Runtime support for compiled Sinter modules.
//!
//! Reference implementations of the routines the code generator lowers to:
//! the D-string record with lazy re-evaluation ([`dstring`]), the JSON/XML
//! serialization helpers ([`serialize`]), and a small evaluator ([`eval`])
//! that executes IR modules directly - it stands in for the out-of-scope
//! native backend so end-to-end behavior is testable in-process.

pub mod dstring;
pub mod eval;
pub mod serialize;
pub mod value;

pub use eval::Machine;
pub use value::{Address, Value};
