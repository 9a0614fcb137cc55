//! Error types for every phase of the Sinter pipeline.
//!
//! ## Hierarchy
//!
//! ```text
//! SinterError (top-level wrapper)
//! ├── ResolutionError - unresolved / duplicate / cyclic names
//! ├── TypeError       - mismatches, conformance, unknown members
//! ├── AnnotationError - conflicting or unsatisfied field annotations
//! ├── CleanupError    - unreleased / double-released / use-after-release
//! ├── CodegenError    - internal invariant violations, always fatal
//! └── RuntimeError    - evaluator / deserialization failures
//! ```
//!
//! Stages 2-5 convert these into severity-tagged diagnostics and keep going;
//! only `CodegenError` aborts on the spot.

use thiserror::Error;

use crate::Span;

// ============================================================================
// Resolution Errors
// ============================================================================

/// Errors produced by the scope & symbol resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// An identifier did not bind to any declaration.
    #[error("unresolved reference '{name}'")]
    UnresolvedReference { name: String, span: Span },

    /// A name was declared twice in the same scope.
    #[error("duplicate declaration of '{name}' (previous declaration at {previous})")]
    DuplicateDeclaration {
        name: String,
        span: Span,
        previous: Span,
    },

    /// The extends/implements graph contains a cycle through this type.
    #[error("cyclic inheritance involving '{name}'")]
    CyclicInheritance { name: String, span: Span },

    /// `extends` names something that is not a class.
    #[error("'{name}' is not a class and cannot be extended")]
    BaseNotClass { name: String, span: Span },

    /// `implements` names something that is not an interface.
    #[error("'{name}' is not an interface and cannot be implemented")]
    BaseNotInterface { name: String, span: Span },

    /// A D-string slot references something that has no storage.
    #[error("d-string slot '{{{name}}}' does not name a variable or field")]
    InvalidDStringRef { name: String, span: Span },

    /// `T.new()` where `T` is not a class.
    #[error("'{name}' is not a class and cannot be instantiated")]
    NotInstantiable { name: String, span: Span },
}

impl ResolutionError {
    pub fn span(&self) -> Span {
        match self {
            ResolutionError::UnresolvedReference { span, .. } => *span,
            ResolutionError::DuplicateDeclaration { span, .. } => *span,
            ResolutionError::CyclicInheritance { span, .. } => *span,
            ResolutionError::BaseNotClass { span, .. } => *span,
            ResolutionError::BaseNotInterface { span, .. } => *span,
            ResolutionError::InvalidDStringRef { span, .. } => *span,
            ResolutionError::NotInstantiable { span, .. } => *span,
        }
    }
}

// ============================================================================
// Type Errors
// ============================================================================

/// Errors produced by the type checker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    /// A type expression did not resolve to a known type.
    #[error("unknown type '{name}'")]
    UnknownType { name: String, span: Span },

    /// Pointers may only point at class or interface types.
    #[error("cannot form a pointer to primitive type '{name}'")]
    PointerToPrimitive { name: String, span: Span },

    /// Two types that had to agree did not.
    #[error("{message}")]
    Mismatch { message: String, span: Span },

    /// A class does not satisfy an interface it declares.
    #[error("class '{class}' does not conform to interface '{interface}': {detail}")]
    InterfaceConformance {
        class: String,
        interface: String,
        detail: String,
        span: Span,
    },

    /// Member lookup failed.
    #[error("unknown method '{method}' on type '{type_name}'")]
    UndefinedMethod {
        method: String,
        type_name: String,
        span: Span,
    },

    /// Field lookup failed.
    #[error("unknown field '{field}' on type '{type_name}'")]
    UndefinedField {
        field: String,
        type_name: String,
        span: Span,
    },

    /// No overload matched the argument list exactly.
    #[error("no matching overload for '{name}({args})'; candidates: {candidates}")]
    NoMatchingOverload {
        name: String,
        args: String,
        candidates: String,
        span: Span,
    },

    /// More than one overload matched exactly.
    #[error("ambiguous call to '{name}'; candidates: {candidates}")]
    AmbiguousOverload {
        name: String,
        candidates: String,
        span: Span,
    },

    /// Two methods in one class share an exact signature.
    #[error("duplicate signature for '{name}'")]
    DuplicateSignature { name: String, span: Span },

    /// The expression cannot appear on the left of an assignment.
    #[error("expression is not an lvalue")]
    NotAnLvalue { span: Span },

    /// Assignment to a `const` field.
    #[error("cannot assign to const field '{name}'")]
    AssignToConst { name: String, span: Span },

    /// A non-void function has a path that falls off the end.
    #[error("non-void function '{name}' does not return on every path")]
    MissingReturn { name: String, span: Span },

    /// Catch-all for rule violations with a bespoke message.
    #[error("{message}")]
    Invalid { message: String, span: Span },
}

impl TypeError {
    pub fn span(&self) -> Span {
        match self {
            TypeError::UnknownType { span, .. } => *span,
            TypeError::PointerToPrimitive { span, .. } => *span,
            TypeError::Mismatch { span, .. } => *span,
            TypeError::InterfaceConformance { span, .. } => *span,
            TypeError::UndefinedMethod { span, .. } => *span,
            TypeError::UndefinedField { span, .. } => *span,
            TypeError::NoMatchingOverload { span, .. } => *span,
            TypeError::AmbiguousOverload { span, .. } => *span,
            TypeError::DuplicateSignature { span, .. } => *span,
            TypeError::NotAnLvalue { span } => *span,
            TypeError::AssignToConst { span, .. } => *span,
            TypeError::MissingReturn { span, .. } => *span,
            TypeError::Invalid { span, .. } => *span,
        }
    }
}

// ============================================================================
// Annotation Errors
// ============================================================================

/// Errors produced by the annotation processor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    /// All conflicting flag pairs on one field, reported as one error.
    #[error("conflicting annotation flags on field '{field}': {conflicts}")]
    ConflictingFlags {
        field: String,
        conflicts: String,
        span: Span,
    },

    /// `derived=true` but no method with the field's name exists.
    #[error("field '{field}' is derived but class '{class}' defines no method '{field}()'")]
    DerivedMethodMissing {
        class: String,
        field: String,
        span: Span,
    },

    /// The derived method exists but has the wrong shape.
    #[error("derived method '{field}()' must take no parameters and return {expected}")]
    DerivedMethodMismatch {
        field: String,
        expected: String,
        span: Span,
    },

    /// A user-defined accessor contradicts the annotation.
    #[error("field '{field}' is {flag} but class defines '{method}'")]
    AccessorConflict {
        field: String,
        flag: &'static str,
        method: String,
        span: Span,
    },

    /// Serializable fields must be public.
    #[error("field '{field}' cannot be serializable because it is not public")]
    NonPublicSerializable { field: String, span: Span },
}

impl AnnotationError {
    pub fn span(&self) -> Span {
        match self {
            AnnotationError::ConflictingFlags { span, .. } => *span,
            AnnotationError::DerivedMethodMissing { span, .. } => *span,
            AnnotationError::DerivedMethodMismatch { span, .. } => *span,
            AnnotationError::AccessorConflict { span, .. } => *span,
            AnnotationError::NonPublicSerializable { span, .. } => *span,
        }
    }
}

// ============================================================================
// Cleanup Errors
// ============================================================================

/// Errors produced by the pointer cleanup validator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CleanupError {
    /// An allocation can reach a function exit while still owned.
    #[error(
        "pointer '{name}' allocated at {alloc_span} is not released on every path \
         out of '{function}'; call {name}.release() or {name}.clean() before returning"
    )]
    UnreleasedPointer {
        name: String,
        function: String,
        alloc_span: Span,
        span: Span,
    },

    /// A binding is read on a path where it may already be released.
    #[error("pointer '{name}' may be used after release")]
    UseAfterRelease { name: String, span: Span },

    /// A binding is released twice on some path.
    #[error("pointer '{name}' may be released twice")]
    DoubleRelease { name: String, span: Span },
}

impl CleanupError {
    pub fn span(&self) -> Span {
        match self {
            CleanupError::UnreleasedPointer { span, .. } => *span,
            CleanupError::UseAfterRelease { span, .. } => *span,
            CleanupError::DoubleRelease { span, .. } => *span,
        }
    }
}

// ============================================================================
// Codegen Errors
// ============================================================================

/// Internal invariant violations during code generation.
///
/// Anything the earlier stages should have rejected that still reaches the
/// code generator lands here. Always fatal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("internal codegen error: {message}")]
pub struct CodegenError {
    pub message: String,
    pub span: Span,
}

impl CodegenError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

// ============================================================================
// Runtime Errors
// ============================================================================

/// Errors raised by the runtime-support routines and the reference evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A required field was absent from serialized input.
    #[error("deserialization error: required field '{field}' is missing")]
    MissingField { field: String },

    /// Serialized input could not be parsed at all.
    #[error("deserialization error: {detail}")]
    MalformedInput { detail: String },

    /// A value had an unexpected shape.
    #[error("runtime type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An object was used after its record was deallocated.
    #[error("object #{index} used after deallocation")]
    StaleObject { index: usize },

    /// A call named a function the module does not define.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    /// Execution reached a block the compiler marked unreachable.
    #[error("executed unreachable code in '{function}'")]
    ReachedUnreachable { function: String },

    /// Catch-all for malformed IR encountered while evaluating.
    #[error("evaluation error: {0}")]
    Eval(String),
}

// ============================================================================
// Unified Error
// ============================================================================

/// Unified error for callers that drive the whole pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SinterError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_display() {
        let err = ResolutionError::UnresolvedReference {
            name: "counter".into(),
            span: Span::new(3, 9, 7),
        };
        assert_eq!(format!("{err}"), "unresolved reference 'counter'");
        assert_eq!(err.span(), Span::new(3, 9, 7));
    }

    #[test]
    fn cleanup_error_mentions_both_cleanup_calls() {
        let err = CleanupError::UnreleasedPointer {
            name: "fib".into(),
            function: "main".into(),
            alloc_span: Span::new(2, 5, 3),
            span: Span::new(8, 1, 1),
        };
        let text = format!("{err}");
        assert!(text.contains("fib.release()"));
        assert!(text.contains("fib.clean()"));
    }

    #[test]
    fn unified_error_is_transparent() {
        let err: SinterError = TypeError::UnknownType {
            name: "Foo".into(),
            span: Span::new(1, 1, 3),
        }
        .into();
        assert_eq!(format!("{err}"), "unknown type 'Foo'");
    }

    #[test]
    fn runtime_missing_field_display() {
        let err = RuntimeError::MissingField {
            field: "count".into(),
        };
        assert_eq!(
            format!("{err}"),
            "deserialization error: required field 'count' is missing"
        );
    }
}
