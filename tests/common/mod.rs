//! Shared AST-building helpers for the integration suites.
//!
//! The parser is out of scope, so tests construct the trees it would
//! produce.

#![allow(dead_code)]

use sinter::ast::{
    Annotation, AnnotationFlags, Block, ClassDecl, Expr, FieldDecl, FunctionDecl, Ident, Item,
    Lit, Param, Program, Stmt, StmtKind, TypeExpr,
};
use sinter::core::{Span, Visibility};

pub fn sp() -> Span {
    Span::default()
}

// ============================================================================
// Types
// ============================================================================

pub fn named(name: &str) -> TypeExpr {
    TypeExpr::named(name, sp())
}

pub fn ptr(name: &str) -> TypeExpr {
    TypeExpr::pointer(named(name), sp())
}

// ============================================================================
// Declarations
// ============================================================================

pub fn class(name: &str) -> ClassDecl {
    ClassDecl::new(Ident::new(name, sp()), sp())
}

pub fn func(name: &str, params: Vec<Param>, ret: TypeExpr, stmts: Vec<Stmt>) -> FunctionDecl {
    let mut f = FunctionDecl::new(name, ret, Block::new(stmts, sp()), sp());
    f.params = params;
    f
}

pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param::new(name, ty, sp())
}

pub fn field(vis: Visibility, name: &str, ty: TypeExpr) -> FieldDecl {
    FieldDecl::new(vis, name, ty, sp())
}

pub fn annotated_field(
    vis: Visibility,
    name: &str,
    ty: TypeExpr,
    flags: AnnotationFlags,
) -> FieldDecl {
    let mut f = FieldDecl::new(vis, name, ty, sp());
    f.annotation = Some(Annotation::new(flags, sp()));
    f
}

pub fn int_field(name: &str, value: i32) -> FieldDecl {
    let mut f = FieldDecl::new(Visibility::Private, name, named("int"), sp());
    f.init = Some(int(value));
    f
}

// ============================================================================
// Statements
// ============================================================================

pub fn var(name: &str, ty: Option<TypeExpr>, init: Option<Expr>) -> Stmt {
    Stmt::new(
        StmtKind::VarDecl {
            name: name.into(),
            ty,
            init,
        },
        sp(),
    )
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign { target, value }, sp())
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(expr), sp())
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::new(StmtKind::Return(value), sp())
}

pub fn if_else(cond: Expr, then_stmts: Vec<Stmt>, else_stmts: Option<Vec<Stmt>>) -> Stmt {
    Stmt::new(
        StmtKind::If {
            cond,
            then_block: Block::new(then_stmts, sp()),
            else_block: else_stmts.map(|stmts| Block::new(stmts, sp())),
        },
        sp(),
    )
}

pub fn for_loop(
    init: Stmt,
    cond: Expr,
    update: Stmt,
    body: Vec<Stmt>,
) -> Stmt {
    Stmt::new(
        StmtKind::For {
            init: Some(Box::new(init)),
            cond: Some(cond),
            update: Some(Box::new(update)),
            body: Block::new(body, sp()),
        },
        sp(),
    )
}

pub fn println(args: Vec<Expr>) -> Stmt {
    Stmt::new(
        StmtKind::Print {
            args,
            newline: true,
        },
        sp(),
    )
}

// ============================================================================
// Expressions
// ============================================================================

pub fn ident(name: &str) -> Expr {
    Expr::ident(name, sp())
}

pub fn int(value: i32) -> Expr {
    Expr::int(value, sp())
}

pub fn dbl(value: f64) -> Expr {
    Expr::literal(Lit::Double(value), sp())
}

pub fn strlit(value: &str) -> Expr {
    Expr::literal(Lit::Str(value.into()), sp())
}

pub fn dstr(template: &str) -> Expr {
    Expr::literal(Lit::DStr(template.into()), sp())
}

pub fn alloc(class: &str) -> Expr {
    Expr::alloc(class, sp())
}

/// `receiver.method(args)` with an identifier receiver.
pub fn mcall(receiver: &str, method: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::member(ident(receiver), method, sp()), args, sp())
}

/// `name(args)`
pub fn fcall(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(ident(name), args, sp())
}

/// `p.clean();` / `p.release();`
pub fn cleanup(name: &str, how: &str) -> Stmt {
    expr_stmt(mcall(name, how, vec![]))
}

// ============================================================================
// Pipeline drivers
// ============================================================================

pub fn compile_ok(items: Vec<Item>) -> sinter::IrModule {
    let _ = env_logger::builder().is_test(true).try_init();
    let output = sinter::compile(&Program::new(items));
    assert!(
        output.is_success(),
        "expected a clean compile, got:\n{}",
        output.diagnostics
    );
    output.module.expect("module emitted on success")
}

pub fn compile_err(items: Vec<Item>) -> sinter::Diagnostics {
    let _ = env_logger::builder().is_test(true).try_init();
    let output = sinter::compile(&Program::new(items));
    assert!(
        !output.is_success(),
        "expected diagnostics, module compiled cleanly"
    );
    assert!(output.module.is_none(), "errors must block emission");
    output.diagnostics
}
