//! Declarations: classes, interfaces, functions, fields, annotations.

use bitflags::bitflags;
use sinter_core::{Span, Visibility};

use crate::{Block, Expr, Ident, NodeId};

/// A top-level item of a compilation unit.
#[derive(Debug)]
pub enum Item {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Function(FunctionDecl),
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Class(c) => &c.name.name,
            Item::Interface(i) => &i.name.name,
            Item::Function(f) => &f.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Item::Class(c) => c.span,
            Item::Interface(i) => i.span,
            Item::Function(f) => f.span,
        }
    }
}

// ============================================================================
// Classes and interfaces
// ============================================================================

/// A class declaration.
///
/// Fields are kept in declaration order; the code generator relies on that
/// order for record layout and serialization.
#[derive(Debug)]
pub struct ClassDecl {
    pub name: Ident,
    /// Type parameters are carried through but not instantiated.
    pub type_params: Vec<String>,
    pub extends: Option<Ident>,
    pub implements: Vec<Ident>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

impl ClassDecl {
    pub fn new(name: Ident, span: Span) -> Self {
        Self {
            name,
            type_params: Vec::new(),
            extends: None,
            implements: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            span,
        }
    }
}

/// An interface declaration: method signatures only.
#[derive(Debug)]
pub struct InterfaceDecl {
    pub name: Ident,
    pub methods: Vec<MethodSig>,
    pub span: Span,
}

/// A bodiless method signature inside an interface.
#[derive(Debug)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub span: Span,
}

// ============================================================================
// Fields and annotations
// ============================================================================

bitflags! {
    /// Flags of an `@attribute(...)` annotation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AnnotationFlags: u8 {
        const READ_ONLY    = 1 << 0;
        const WRITE_ONLY   = 1 << 1;
        const DERIVED      = 1 << 2;
        const SERIALIZABLE = 1 << 3;
    }
}

/// An `@attribute` annotation attached to a field.
///
/// A bare `@attribute` carries an empty flag set, which means both accessors
/// are synthesized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annotation {
    pub flags: AnnotationFlags,
    pub span: Span,
}

impl Annotation {
    pub fn new(flags: AnnotationFlags, span: Span) -> Self {
        Self { flags, span }
    }
}

/// A field declaration inside a class.
#[derive(Debug)]
pub struct FieldDecl {
    pub id: NodeId,
    pub vis: Visibility,
    pub is_const: bool,
    pub name: String,
    pub ty: TypeExpr,
    /// Constant initializer, if any.
    pub init: Option<Expr>,
    pub annotation: Option<Annotation>,
    pub span: Span,
}

impl FieldDecl {
    pub fn new(
        vis: Visibility,
        name: impl Into<String>,
        ty: TypeExpr,
        span: Span,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            vis,
            is_const: false,
            name: name.into(),
            ty,
            init: None,
            annotation: None,
            span,
        }
    }

    /// The flags of this field's annotation, or the empty set.
    pub fn flags(&self) -> AnnotationFlags {
        self.annotation.map(|a| a.flags).unwrap_or_default()
    }
}

// ============================================================================
// Functions and methods
// ============================================================================

/// A function or method declaration with a body.
///
/// Free functions leave `vis` at its default and `is_static` false; inside a
/// class, `is_static` distinguishes `function` members from `method` members.
#[derive(Debug)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub vis: Visibility,
    pub is_static: bool,
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub body: Block,
    pub span: Span,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, ret: TypeExpr, body: Block, span: Span) -> Self {
        Self {
            id: NodeId::fresh(),
            vis: Visibility::default(),
            is_static: false,
            name: name.into(),
            params: Vec::new(),
            ret,
            body,
            span,
        }
    }
}

/// A function/method parameter.
#[derive(Debug)]
pub struct Param {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr, span: Span) -> Self {
        Self {
            id: NodeId::fresh(),
            name: name.into(),
            ty,
            span,
        }
    }
}

// ============================================================================
// Type expressions
// ============================================================================

/// A syntactic type reference, resolved to a semantic type by the checker.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `int`, `Counter`, `Box<int>` - primitives are just well-known names.
    Named {
        name: String,
        args: Vec<TypeExpr>,
        span: Span,
    },
    /// `T*`
    Pointer { inner: Box<TypeExpr>, span: Span },
}

impl TypeExpr {
    pub fn named(name: impl Into<String>, span: Span) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
            span,
        }
    }

    pub fn pointer(inner: TypeExpr, span: Span) -> Self {
        TypeExpr::Pointer {
            inner: Box::new(inner),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. } => *span,
            TypeExpr::Pointer { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_annotation_has_empty_flags() {
        let field = FieldDecl {
            annotation: Some(Annotation::new(AnnotationFlags::empty(), Span::default())),
            ..FieldDecl::new(
                Visibility::Public,
                "count",
                TypeExpr::named("int", Span::default()),
                Span::default(),
            )
        };
        assert!(field.flags().is_empty());
    }

    #[test]
    fn conflicting_flags_can_coexist_in_the_tree() {
        // The tree itself carries whatever the parser saw; validation is the
        // annotation processor's job.
        let flags = AnnotationFlags::READ_ONLY | AnnotationFlags::WRITE_ONLY;
        assert!(flags.contains(AnnotationFlags::READ_ONLY));
        assert!(flags.contains(AnnotationFlags::WRITE_ONLY));
    }
}
