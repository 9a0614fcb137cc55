//! Scope & symbol resolution.
//!
//! Two passes over the unit:
//!
//! 1. Register every top-level class / interface / function name, so forward
//!    references work, and reject duplicates. Then walk the
//!    `extends`/`implements` edges with gray/black coloring to reject
//!    inheritance cycles.
//! 2. Walk every body, opening a scope per block and per `for` header, and
//!    bind each identifier use to its declaration. Lookup order is: local
//!    scopes innermost-out, then the enclosing class's fields (instance
//!    methods only), then top-level names.
//!
//! The output is a set of side tables keyed by [`NodeId`]; the tree itself is
//! never touched.

use rustc_hash::FxHashMap;
use sinter_ast::{
    Block, ClassDecl, Expr, ExprKind, FunctionDecl, Item, Lit, NodeId, Program, Stmt, StmtKind,
};
use sinter_core::{Diagnostics, ResolutionError, Span};

use crate::dstring;
use crate::scope::{ScopeStack, Symbol, SymbolId, SymbolKind};

// ============================================================================
// Output
// ============================================================================

/// What an identifier use resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A parameter or local variable.
    Local(SymbolId),
    /// An unqualified field of the enclosing class.
    Field { class: String, field: String },
    /// A top-level function (overload set).
    Function(String),
    /// A class name (used as `Class.new()` receiver or static call target).
    Class(String),
    /// An interface name.
    Interface(String),
}

/// Side tables produced by resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    /// All local symbols, indexed by [`SymbolId`].
    pub symbols: Vec<Symbol>,
    /// Identifier expression -> what it bound to.
    pub bindings: FxHashMap<NodeId, Binding>,
    /// `Param` / `VarDecl` node -> the symbol it introduced.
    pub defs: FxHashMap<NodeId, SymbolId>,
    /// D-string literal -> bindings of its referenced names, in slot order.
    pub dstring_refs: FxHashMap<NodeId, Vec<Binding>>,
}

impl Resolution {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn binding(&self, node: NodeId) -> Option<&Binding> {
        self.bindings.get(&node)
    }
}

/// Resolve the whole unit, accumulating diagnostics.
pub fn resolve(program: &Program, diags: &mut Diagnostics) -> Resolution {
    log::debug!("resolving symbols");
    let mut resolver = Resolver::new(program, diags);
    resolver.register_top_level();
    resolver.check_inheritance();
    resolver.resolve_bodies();
    resolver.resolution
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum TopKind {
    Class,
    Interface,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Color {
    Gray,
    Black,
}

struct Resolver<'a> {
    program: &'a Program,
    diags: &'a mut Diagnostics,
    resolution: Resolution,
    top_level: FxHashMap<String, (TopKind, Span)>,
    classes: FxHashMap<String, &'a ClassDecl>,
    scopes: ScopeStack,
    current_class: Option<&'a ClassDecl>,
    in_static: bool,
}

impl<'a> Resolver<'a> {
    fn new(program: &'a Program, diags: &'a mut Diagnostics) -> Self {
        Self {
            program,
            diags,
            resolution: Resolution::default(),
            top_level: FxHashMap::default(),
            classes: FxHashMap::default(),
            scopes: ScopeStack::new(),
            current_class: None,
            in_static: false,
        }
    }

    fn report(&mut self, err: ResolutionError) {
        self.diags.error(err.span(), err.to_string());
    }

    // ==========================================================================
    // Pass 1: top-level registration
    // ==========================================================================

    fn register_top_level(&mut self) {
        for item in &self.program.items {
            let (kind, name, span) = match item {
                Item::Class(c) => (TopKind::Class, c.name.name.clone(), c.name.span),
                Item::Interface(i) => (TopKind::Interface, i.name.name.clone(), i.name.span),
                Item::Function(f) => (TopKind::Function, f.name.clone(), f.span),
            };
            if let Some(&(prior_kind, prior_span)) = self.top_level.get(&name) {
                // Same-named functions form an overload set; any other
                // collision is a duplicate declaration.
                if kind == TopKind::Function && prior_kind == TopKind::Function {
                    continue;
                }
                self.report(ResolutionError::DuplicateDeclaration {
                    name,
                    span,
                    previous: prior_span,
                });
                continue;
            }
            self.top_level.insert(name, (kind, span));
            if let Item::Class(c) = item {
                self.classes.insert(c.name.name.clone(), c);
                self.check_member_duplicates(c);
            }
        }
    }

    /// Duplicate fields within one class are declaration clashes; a method
    /// sharing a field's name is allowed (that is how derived fields work).
    fn check_member_duplicates(&mut self, class: &ClassDecl) {
        let mut seen: FxHashMap<&str, Span> = FxHashMap::default();
        let mut errors = Vec::new();
        for field in &class.fields {
            if let Some(&previous) = seen.get(field.name.as_str()) {
                errors.push(ResolutionError::DuplicateDeclaration {
                    name: field.name.clone(),
                    span: field.span,
                    previous,
                });
            } else {
                seen.insert(field.name.as_str(), field.span);
            }
        }
        for err in errors {
            self.report(err);
        }
    }

    // ==========================================================================
    // Pass 1b: inheritance graph
    // ==========================================================================

    fn check_inheritance(&mut self) {
        let mut errors = Vec::new();
        for class in self.program.classes() {
            if let Some(base) = &class.extends {
                match self.top_level.get(&base.name) {
                    None => errors.push(ResolutionError::UnresolvedReference {
                        name: base.name.clone(),
                        span: base.span,
                    }),
                    Some((TopKind::Class, _)) => {}
                    Some(_) => errors.push(ResolutionError::BaseNotClass {
                        name: base.name.clone(),
                        span: base.span,
                    }),
                }
            }
            for iface in &class.implements {
                match self.top_level.get(&iface.name) {
                    None => errors.push(ResolutionError::UnresolvedReference {
                        name: iface.name.clone(),
                        span: iface.span,
                    }),
                    Some((TopKind::Interface, _)) => {}
                    Some(_) => errors.push(ResolutionError::BaseNotInterface {
                        name: iface.name.clone(),
                        span: iface.span,
                    }),
                }
            }
        }
        for err in errors {
            self.report(err);
        }

        // Gray/black depth-first walk over extends edges. Interfaces cannot
        // appear in a cycle because they declare no edges of their own.
        let mut colors: FxHashMap<String, Color> = FxHashMap::default();
        let names: Vec<String> = self.classes.keys().cloned().collect();
        let mut cyclic = Vec::new();
        for name in names {
            self.visit_for_cycle(&name, &mut colors, &mut cyclic);
        }
        for (name, span) in cyclic {
            self.report(ResolutionError::CyclicInheritance { name, span });
        }
    }

    fn visit_for_cycle(
        &self,
        name: &str,
        colors: &mut FxHashMap<String, Color>,
        cyclic: &mut Vec<(String, Span)>,
    ) {
        match colors.get(name) {
            Some(Color::Black) => return,
            Some(Color::Gray) => {
                // Edge into a gray node: a cycle.
                if let Some(class) = self.classes.get(name) {
                    cyclic.push((name.to_string(), class.name.span));
                }
                return;
            }
            None => {}
        }
        colors.insert(name.to_string(), Color::Gray);
        if let Some(class) = self.classes.get(name) {
            if let Some(base) = &class.extends {
                if self.classes.contains_key(&base.name) {
                    self.visit_for_cycle(&base.name, colors, cyclic);
                }
            }
        }
        colors.insert(name.to_string(), Color::Black);
    }

    // ==========================================================================
    // Pass 2: body resolution
    // ==========================================================================

    fn resolve_bodies(&mut self) {
        for item in &self.program.items {
            match item {
                Item::Class(class) => {
                    self.current_class = Some(class);
                    for method in &class.methods {
                        self.resolve_function(method);
                    }
                    self.current_class = None;
                }
                Item::Function(func) => self.resolve_function(func),
                Item::Interface(_) => {}
            }
        }
    }

    fn resolve_function(&mut self, func: &'a FunctionDecl) {
        self.in_static = func.is_static;
        self.scopes.push();
        for param in &func.params {
            let id = self.define(&param.name, SymbolKind::Param, param.id, param.span);
            self.resolution.defs.insert(param.id, id);
        }
        self.resolve_block_inline(&func.body);
        self.scopes.pop();
        self.in_static = false;
    }

    fn define(&mut self, name: &str, kind: SymbolKind, decl: NodeId, span: Span) -> SymbolId {
        let id = SymbolId(self.resolution.symbols.len() as u32);
        self.resolution.symbols.push(Symbol {
            name: name.to_string(),
            kind,
            decl,
            span,
        });
        if let Err(prior) = self.scopes.declare(name, id) {
            let previous = self.resolution.symbol(prior).span;
            self.report(ResolutionError::DuplicateDeclaration {
                name: name.to_string(),
                span,
                previous,
            });
        }
        id
    }

    fn resolve_block(&mut self, block: &'a Block) {
        self.scopes.push();
        self.resolve_block_inline(block);
        self.scopes.pop();
    }

    /// Resolve a block's statements without opening a scope (the function
    /// scope already covers the outermost body block).
    fn resolve_block_inline(&mut self, block: &'a Block) {
        for stmt in &block.stmts {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { name, init, .. } => {
                if let Some(init) = init {
                    self.resolve_expr(init);
                }
                let id = self.define(name, SymbolKind::Local, stmt.id, stmt.span);
                self.resolution.defs.insert(stmt.id, id);
            }
            StmtKind::Assign { target, value } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            StmtKind::Expr(expr) => self.resolve_expr(expr),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.resolve_expr(cond);
                self.resolve_block(then_block);
                if let Some(else_block) = else_block {
                    self.resolve_block(else_block);
                }
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond);
                self.resolve_block(body);
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                // The loop header gets its own scope so the induction
                // variable is invisible after the loop.
                self.scopes.push();
                if let Some(init) = init {
                    self.resolve_stmt(init);
                }
                if let Some(cond) = cond {
                    self.resolve_expr(cond);
                }
                if let Some(update) = update {
                    self.resolve_stmt(update);
                }
                self.resolve_block(body);
                self.scopes.pop();
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Print { args, .. } => {
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
        }
    }

    fn resolve_expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Literal(Lit::DStr(raw)) => self.resolve_dstring(expr.id, raw, expr.span),
            ExprKind::Literal(_) => {}
            ExprKind::Ident(name) => {
                if let Some(binding) = self.lookup(name) {
                    self.resolution.bindings.insert(expr.id, binding);
                } else {
                    self.report(ResolutionError::UnresolvedReference {
                        name: name.clone(),
                        span: expr.span,
                    });
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Member { object, .. } => self.resolve_expr(object),
            ExprKind::Call { callee, args } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::New { class } => match self.top_level.get(class) {
                Some((TopKind::Class, _)) => {}
                Some(_) => self.report(ResolutionError::NotInstantiable {
                    name: class.clone(),
                    span: expr.span,
                }),
                None => self.report(ResolutionError::UnresolvedReference {
                    name: class.clone(),
                    span: expr.span,
                }),
            },
        }
    }

    fn resolve_dstring(&mut self, node: NodeId, raw: &str, span: Span) {
        let template = dstring::parse(raw);
        let mut refs = Vec::with_capacity(template.refs.len());
        for name in &template.refs {
            match self.lookup(name) {
                Some(binding @ (Binding::Local(_) | Binding::Field { .. })) => refs.push(binding),
                _ => {
                    self.report(ResolutionError::InvalidDStringRef {
                        name: name.clone(),
                        span,
                    });
                    return;
                }
            }
        }
        self.resolution.dstring_refs.insert(node, refs);
    }

    /// Lookup order: local scopes, then the enclosing class's fields
    /// (instance methods only), then top-level names.
    fn lookup(&self, name: &str) -> Option<Binding> {
        if let Some(id) = self.scopes.lookup(name) {
            return Some(Binding::Local(id));
        }
        if !self.in_static {
            if let Some(class) = self.current_class {
                if let Some(owner) = self.find_field_owner(class, name) {
                    return Some(Binding::Field {
                        class: owner,
                        field: name.to_string(),
                    });
                }
            }
        }
        match self.top_level.get(name) {
            Some((TopKind::Class, _)) => Some(Binding::Class(name.to_string())),
            Some((TopKind::Interface, _)) => Some(Binding::Interface(name.to_string())),
            Some((TopKind::Function, _)) => Some(Binding::Function(name.to_string())),
            None => None,
        }
    }

    /// Walk the extends chain looking for a field, returning the class that
    /// declares it.
    fn find_field_owner(&self, class: &ClassDecl, name: &str) -> Option<String> {
        let mut current = Some(class);
        while let Some(decl) = current {
            if decl.fields.iter().any(|f| f.name == name) {
                return Some(decl.name.name.clone());
            }
            current = decl
                .extends
                .as_ref()
                .and_then(|base| self.classes.get(&base.name).copied());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinter_ast::{Ident, Item, TypeExpr};
    use sinter_core::Visibility;

    fn span() -> Span {
        Span::default()
    }

    fn void_fn(name: &str, body: Vec<Stmt>) -> FunctionDecl {
        FunctionDecl::new(
            name,
            TypeExpr::named("void", span()),
            Block::new(body, span()),
            span(),
        )
    }

    #[test]
    fn duplicate_class_is_reported() {
        let program = Program::new(vec![
            Item::Class(ClassDecl::new(Ident::new("A", span()), span())),
            Item::Class(ClassDecl::new(Ident::new("A", span()), span())),
        ]);
        let mut diags = Diagnostics::new();
        resolve(&program, &mut diags);
        assert!(diags.has_errors());
        assert!(format!("{diags}").contains("duplicate declaration of 'A'"));
    }

    #[test]
    fn forward_reference_to_a_later_class_resolves() {
        let mut first = ClassDecl::new(Ident::new("First", span()), span());
        first.extends = Some(Ident::new("Second", span()));
        let program = Program::new(vec![
            Item::Class(first),
            Item::Class(ClassDecl::new(Ident::new("Second", span()), span())),
        ]);
        let mut diags = Diagnostics::new();
        resolve(&program, &mut diags);
        assert!(!diags.has_errors(), "{diags}");
    }

    #[test]
    fn extends_cycle_is_reported() {
        let mut a = ClassDecl::new(Ident::new("A", span()), span());
        a.extends = Some(Ident::new("B", span()));
        let mut b = ClassDecl::new(Ident::new("B", span()), span());
        b.extends = Some(Ident::new("A", span()));
        let program = Program::new(vec![Item::Class(a), Item::Class(b)]);
        let mut diags = Diagnostics::new();
        resolve(&program, &mut diags);
        assert!(format!("{diags}").contains("cyclic inheritance"));
    }

    #[test]
    fn unresolved_identifier_is_reported() {
        let body = vec![Stmt::new(
            StmtKind::Expr(Expr::ident("ghost", span())),
            span(),
        )];
        let program = Program::new(vec![Item::Function(void_fn("main", body))]);
        let mut diags = Diagnostics::new();
        resolve(&program, &mut diags);
        assert!(format!("{diags}").contains("unresolved reference 'ghost'"));
    }

    #[test]
    fn loop_variable_is_invisible_after_the_loop() {
        let for_loop = Stmt::new(
            StmtKind::For {
                init: Some(Box::new(Stmt::new(
                    StmtKind::VarDecl {
                        name: "i".into(),
                        ty: Some(TypeExpr::named("int", span())),
                        init: Some(Expr::int(0, span())),
                    },
                    span(),
                ))),
                cond: None,
                update: None,
                body: Block::new(
                    vec![Stmt::new(StmtKind::Break, span())],
                    span(),
                ),
            },
            span(),
        );
        let after = Stmt::new(StmtKind::Expr(Expr::ident("i", span())), span());
        let program = Program::new(vec![Item::Function(void_fn("main", vec![for_loop, after]))]);
        let mut diags = Diagnostics::new();
        resolve(&program, &mut diags);
        assert!(format!("{diags}").contains("unresolved reference 'i'"));
    }

    #[test]
    fn local_shadows_class_field() {
        let mut class = ClassDecl::new(Ident::new("Counter", span()), span());
        class.fields.push(sinter_ast::FieldDecl::new(
            Visibility::Private,
            "count",
            TypeExpr::named("int", span()),
            span(),
        ));
        let use_expr = Expr::ident("count", span());
        let use_id = use_expr.id;
        let body = vec![
            Stmt::new(
                StmtKind::VarDecl {
                    name: "count".into(),
                    ty: Some(TypeExpr::named("int", span())),
                    init: Some(Expr::int(1, span())),
                },
                span(),
            ),
            Stmt::new(StmtKind::Expr(use_expr), span()),
        ];
        class.methods.push(void_fn("bump", body));
        let program = Program::new(vec![Item::Class(class)]);
        let mut diags = Diagnostics::new();
        let resolution = resolve(&program, &mut diags);
        assert!(!diags.has_errors(), "{diags}");
        assert!(matches!(
            resolution.binding(use_id),
            Some(Binding::Local(_))
        ));
    }

    #[test]
    fn field_binds_before_global() {
        let mut class = ClassDecl::new(Ident::new("Counter", span()), span());
        class.fields.push(sinter_ast::FieldDecl::new(
            Visibility::Private,
            "count",
            TypeExpr::named("int", span()),
            span(),
        ));
        let use_expr = Expr::ident("count", span());
        let use_id = use_expr.id;
        class
            .methods
            .push(void_fn("read", vec![Stmt::new(StmtKind::Expr(use_expr), span())]));
        // A same-named free function must not win over the field.
        let program = Program::new(vec![
            Item::Class(class),
            Item::Function(void_fn("count", vec![])),
        ]);
        let mut diags = Diagnostics::new();
        let resolution = resolve(&program, &mut diags);
        assert!(!diags.has_errors(), "{diags}");
        assert!(matches!(
            resolution.binding(use_id),
            Some(Binding::Field { .. })
        ));
    }
}
