//! Core types shared by every stage of the Sinter compiler.
//!
//! This crate carries no compiler logic. It provides:
//!
//! - [`Span`]: source location tracking for diagnostics
//! - [`Diagnostic`] / [`Diagnostics`]: severity-tagged message accumulation
//! - The per-phase error hierarchy ([`ResolutionError`], [`TypeError`],
//!   [`AnnotationError`], [`CleanupError`], [`CodegenError`], [`RuntimeError`])
//!   with the unified [`SinterError`] wrapper
//! - [`Visibility`]: member access levels

mod diagnostics;
mod error;
mod span;
mod visibility;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{
    AnnotationError, CleanupError, CodegenError, ResolutionError, RuntimeError, SinterError,
    TypeError,
};
pub use span::Span;
pub use visibility::Visibility;
