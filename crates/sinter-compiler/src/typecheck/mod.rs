//! Type checking.
//!
//! Runs after resolution in three steps:
//!
//! 1. Resolve every declared signature (interfaces, class members, free
//!    functions) into the [`Registry`], flattening inherited members and
//!    synthesizing the signatures implied by annotations and serialization.
//! 2. Verify interface conformance per class, per interface, per method.
//! 3. Check every function/method body: each expression gets a type in a
//!    side table, statements are verified, and non-void bodies must return
//!    on every path of their control-flow graph.
//!
//! Arithmetic never coerces: both operands of an arithmetic or comparison
//! operator must have the same type.

mod expr;
mod stmt;

use rustc_hash::FxHashMap;
use sinter_ast::{
    ClassDecl, Expr, ExprKind, FunctionDecl, Lit, NodeId, Program, TypeExpr, UnaryOp,
};
use sinter_core::{Diagnostics, TypeError, Visibility};

use crate::annotations;
use crate::cfg::ControlFlowGraph;
use crate::registry::{
    ClassInfo, ConstValue, FieldInfo, FunctionInfo, InterfaceInfo, MethodInfo, MethodOrigin,
    Registry, Type,
};
use crate::resolver::Resolution;
use crate::scope::SymbolId;

// ============================================================================
// Output
// ============================================================================

/// Everything the later stages need from type checking.
#[derive(Debug)]
pub struct TypeInfo {
    pub registry: Registry,
    /// Expression node -> its type.
    pub expr_types: FxHashMap<NodeId, Type>,
    /// Local symbol -> its declared (or inferred) type.
    pub symbol_types: FxHashMap<SymbolId, Type>,
}

impl TypeInfo {
    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.expr_types.get(&node)
    }
}

/// Check the whole unit, accumulating diagnostics.
pub fn check(program: &Program, resolution: &Resolution, diags: &mut Diagnostics) -> TypeInfo {
    log::debug!("type checking");
    let mut checker = TypeChecker {
        program,
        resolution,
        diags,
        registry: Registry::new(),
        expr_types: FxHashMap::default(),
        symbol_types: FxHashMap::default(),
        current_return: Type::Void,
        current_fn: String::new(),
    };
    checker.build_registry();
    checker.check_conformance();
    checker.check_bodies();
    TypeInfo {
        registry: checker.registry,
        expr_types: checker.expr_types,
        symbol_types: checker.symbol_types,
    }
}

// ============================================================================
// Checker
// ============================================================================

pub(crate) struct TypeChecker<'a> {
    pub(crate) program: &'a Program,
    pub(crate) resolution: &'a Resolution,
    pub(crate) diags: &'a mut Diagnostics,
    pub(crate) registry: Registry,
    pub(crate) expr_types: FxHashMap<NodeId, Type>,
    pub(crate) symbol_types: FxHashMap<SymbolId, Type>,
    pub(crate) current_return: Type,
    pub(crate) current_fn: String,
}

impl<'a> TypeChecker<'a> {
    pub(crate) fn report(&mut self, err: TypeError) {
        self.diags.error(err.span(), err.to_string());
    }

    // ==========================================================================
    // Step 1: signatures
    // ==========================================================================

    fn build_registry(&mut self) {
        let program = self.program;
        for iface in program.interfaces() {
            let mut methods = Vec::new();
            for sig in &iface.methods {
                let params = sig
                    .params
                    .iter()
                    .map(|p| self.resolve_type(&p.ty))
                    .collect::<Vec<_>>();
                let ret = self.resolve_type(&sig.ret);
                methods.push(MethodInfo {
                    name: sig.name.clone(),
                    params,
                    param_names: sig.params.iter().map(|p| p.name.clone()).collect(),
                    ret,
                    is_static: false,
                    vis: Visibility::Public,
                    origin: MethodOrigin::User,
                    declared_by: iface.name.name.clone(),
                    span: sig.span,
                });
            }
            self.registry.add_interface(InterfaceInfo {
                name: iface.name.name.clone(),
                methods,
                span: iface.span,
            });
        }

        // Parents before children so inherited members can be flattened in.
        let classes: Vec<&ClassDecl> = program.classes().collect();
        let mut done: FxHashMap<&str, ()> = FxHashMap::default();
        let mut remaining = classes;
        while !remaining.is_empty() {
            let mut progressed = false;
            let mut deferred = Vec::new();
            for class in remaining {
                let parent_ready = match &class.extends {
                    Some(base) => done.contains_key(base.name.as_str()),
                    None => true,
                };
                if parent_ready {
                    self.register_class(class);
                    done.insert(class.name.name.as_str(), ());
                    progressed = true;
                } else {
                    deferred.push(class);
                }
            }
            if !progressed {
                // Unresolvable parents; resolution already reported them.
                for class in &deferred {
                    self.register_class(class);
                }
                break;
            }
            remaining = deferred;
        }

        for func in program.functions() {
            let info = FunctionInfo {
                name: func.name.clone(),
                params: func
                    .params
                    .iter()
                    .map(|p| self.resolve_type(&p.ty))
                    .collect(),
                param_names: func.params.iter().map(|p| p.name.clone()).collect(),
                ret: self.resolve_type(&func.ret),
                span: func.span,
            };
            let clash = self
                .registry
                .functions(&func.name)
                .iter()
                .any(|f| f.params == info.params);
            if clash {
                self.report(TypeError::DuplicateSignature {
                    name: func.name.clone(),
                    span: func.span,
                });
            }
            self.registry.add_function(info);
        }
    }

    fn register_class(&mut self, class: &ClassDecl) {
        let name = class.name.name.clone();
        let mut fields = Vec::new();
        let mut methods = Vec::new();

        if let Some(base) = &class.extends {
            if let Some(parent) = self.registry.class(&base.name) {
                fields.extend(parent.fields.iter().cloned());
                methods.extend(
                    parent
                        .methods
                        .iter()
                        .filter(|m| m.origin != MethodOrigin::Serialization)
                        .cloned(),
                );
            }
        }

        for field in &class.fields {
            if fields.iter().any(|f: &FieldInfo| f.name == field.name) {
                self.report(TypeError::Invalid {
                    message: format!(
                        "field '{}' shadows an inherited field of the same name",
                        field.name
                    ),
                    span: field.span,
                });
                continue;
            }
            let ty = self.resolve_type(&field.ty);
            let init = field.init.as_ref().and_then(|e| {
                let value = self.const_eval(e);
                if value.is_none() {
                    self.report(TypeError::Invalid {
                        message: format!(
                            "initializer of field '{}' must be a constant expression",
                            field.name
                        ),
                        span: field.span,
                    });
                }
                value
            });
            if let Some(value) = &init {
                let init_ty = const_type(value);
                if !self.registry.assignable(&ty, &init_ty) {
                    self.report(TypeError::Mismatch {
                        message: format!(
                            "cannot initialize field '{}' of type {} with a {} value",
                            field.name, ty, init_ty
                        ),
                        span: field.span,
                    });
                }
            }
            fields.push(FieldInfo {
                name: field.name.clone(),
                ty,
                vis: field.vis,
                is_const: field.is_const,
                annotation: field.annotation.map(|a| a.flags),
                init,
                declared_by: name.clone(),
                span: field.span,
            });
        }

        // Entries below `own_flags[i] == false` were inherited; an own method
        // with an inherited method's exact signature overrides it, while two
        // own methods with one signature are a duplicate.
        let mut own_flags = vec![false; methods.len()];
        for method in &class.methods {
            let info = MethodInfo {
                name: method.name.clone(),
                params: method
                    .params
                    .iter()
                    .map(|p| self.resolve_type(&p.ty))
                    .collect(),
                param_names: method.params.iter().map(|p| p.name.clone()).collect(),
                ret: self.resolve_type(&method.ret),
                is_static: method.is_static,
                vis: method.vis,
                origin: MethodOrigin::User,
                declared_by: name.clone(),
                span: method.span,
            };
            match methods
                .iter()
                .position(|m| m.name == info.name && m.params == info.params)
            {
                Some(pos) if own_flags[pos] => {
                    self.report(TypeError::DuplicateSignature {
                        name: method.name.clone(),
                        span: method.span,
                    });
                }
                Some(pos) => {
                    methods[pos] = info;
                    own_flags[pos] = true;
                }
                None => {
                    methods.push(info);
                    own_flags.push(true);
                }
            }
        }

        // Accessors implied by annotations, unless a same-named method exists.
        for field in fields.iter().filter(|f| f.declared_by == name) {
            for (accessor_name, params, ret, _) in annotations::implied_accessor_signatures(field)
            {
                if methods.iter().any(|m| m.name == accessor_name) {
                    continue;
                }
                methods.push(MethodInfo {
                    name: accessor_name,
                    param_names: params.iter().map(|_| "value".to_string()).collect(),
                    params,
                    ret,
                    is_static: false,
                    vis: Visibility::Public,
                    origin: MethodOrigin::Accessor,
                    declared_by: name.clone(),
                    span: field.span,
                });
            }
        }

        // Serialization entry points every class exposes.
        let self_ptr = Type::pointer(Type::Class(name.clone()));
        for (ser_name, params, ret, is_static) in [
            ("as_json", vec![], Type::Str, false),
            ("as_xml", vec![], Type::Str, false),
            ("from_json", vec![Type::Str], self_ptr.clone(), true),
            ("from_xml", vec![Type::Str], self_ptr, true),
        ] {
            if methods.iter().any(|m| m.name == ser_name) {
                continue;
            }
            methods.push(MethodInfo {
                name: ser_name.to_string(),
                param_names: params.iter().map(|_| "input".to_string()).collect(),
                params,
                ret,
                is_static,
                vis: Visibility::Public,
                origin: MethodOrigin::Serialization,
                declared_by: name.clone(),
                span: class.span,
            });
        }

        self.registry.add_class(ClassInfo {
            name,
            type_params: class.type_params.clone(),
            extends: class.extends.as_ref().map(|i| i.name.clone()),
            implements: class.implements.iter().map(|i| i.name.clone()).collect(),
            fields,
            methods,
            span: class.span,
        });
    }

    // ==========================================================================
    // Step 2: interface conformance
    // ==========================================================================

    fn check_conformance(&mut self) {
        let mut errors = Vec::new();
        for class in self.registry.classes_in_order() {
            for iface_name in &class.implements {
                let Some(iface) = self.registry.interface(iface_name) else {
                    continue; // resolution already reported the bad name
                };
                for required in &iface.methods {
                    let found = class
                        .methods
                        .iter()
                        .filter(|m| !m.is_static && m.name == required.name)
                        .collect::<Vec<_>>();
                    if found.is_empty() {
                        errors.push(TypeError::InterfaceConformance {
                            class: class.name.clone(),
                            interface: iface_name.clone(),
                            detail: format!("missing method '{}'", required.describe()),
                            span: class.span,
                        });
                    } else if !found.iter().any(|m| m.signature_matches(required)) {
                        let got = found[0].describe();
                        errors.push(TypeError::InterfaceConformance {
                            class: class.name.clone(),
                            interface: iface_name.clone(),
                            detail: format!(
                                "method '{}' has signature '{}', expected '{}'",
                                required.name,
                                got,
                                required.describe()
                            ),
                            span: found[0].span,
                        });
                    }
                }
            }
        }
        for err in errors {
            self.report(err);
        }
    }

    // ==========================================================================
    // Step 3: bodies
    // ==========================================================================

    fn check_bodies(&mut self) {
        let program = self.program;
        for class in program.classes() {
            for method in &class.methods {
                self.check_function(method, Some(&class.name.name));
            }
        }
        for func in program.functions() {
            self.check_function(func, None);
        }
    }

    fn check_function(&mut self, func: &'a FunctionDecl, class: Option<&str>) {
        self.current_return = self.resolve_type(&func.ret);
        self.current_fn = match class {
            Some(class) => format!("{class}.{}", func.name),
            None => func.name.clone(),
        };
        for param in &func.params {
            let ty = self.resolve_type(&param.ty);
            if ty == Type::Void {
                self.report(TypeError::Invalid {
                    message: format!("parameter '{}' cannot have type void", param.name),
                    span: param.span,
                });
            }
            if let Some(&sym) = self.resolution.defs.get(&param.id) {
                self.symbol_types.insert(sym, ty);
            }
        }
        for stmt in &func.body.stmts {
            self.check_stmt(stmt);
        }
        if self.current_return != Type::Void {
            let cfg = ControlFlowGraph::build(&func.body);
            if cfg.falls_off_end() {
                self.report(TypeError::MissingReturn {
                    name: self.current_fn.clone(),
                    span: func.span,
                });
            }
        }
    }

    // ==========================================================================
    // Shared helpers
    // ==========================================================================

    /// Resolve a syntactic type to a semantic one. Unknown names fall back to
    /// `int` after reporting, so one bad type does not cascade.
    pub(crate) fn resolve_type(&mut self, ty: &TypeExpr) -> Type {
        match ty {
            TypeExpr::Named { name, span, .. } => {
                if let Some(builtin) = Type::builtin(name) {
                    builtin
                } else if self.registry.class(name).is_some() {
                    Type::Class(name.clone())
                } else if self.registry.interface(name).is_some() {
                    Type::Interface(name.clone())
                } else if self.program.classes().any(|c| c.name.name == *name) {
                    // Forward reference to a class registered later.
                    Type::Class(name.clone())
                } else if self.program.interfaces().any(|i| i.name.name == *name) {
                    Type::Interface(name.clone())
                } else {
                    self.report(TypeError::UnknownType {
                        name: name.clone(),
                        span: *span,
                    });
                    Type::Int
                }
            }
            TypeExpr::Pointer { inner, span } => {
                let pointee = self.resolve_type(inner);
                if pointee.is_named() {
                    Type::pointer(pointee)
                } else {
                    self.report(TypeError::PointerToPrimitive {
                        name: pointee.to_string(),
                        span: *span,
                    });
                    Type::pointer(Type::Class(String::new()))
                }
            }
        }
    }

    /// Evaluate a field initializer. Only literals (and negated numeric
    /// literals) are constants.
    fn const_eval(&mut self, expr: &Expr) -> Option<ConstValue> {
        match &expr.kind {
            ExprKind::Literal(lit) => match lit {
                Lit::Int(v) => Some(ConstValue::Int(*v)),
                Lit::Float(v) => Some(ConstValue::Float(*v)),
                Lit::Double(v) => Some(ConstValue::Double(*v)),
                Lit::Bool(v) => Some(ConstValue::Bool(*v)),
                Lit::Str(v) => Some(ConstValue::Str(v.clone())),
                Lit::Null => Some(ConstValue::Null),
                Lit::DStr(_) => None,
            },
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match self.const_eval(operand)? {
                ConstValue::Int(v) => Some(ConstValue::Int(v.wrapping_neg())),
                ConstValue::Float(v) => Some(ConstValue::Float(-v)),
                ConstValue::Double(v) => Some(ConstValue::Double(-v)),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn record(&mut self, node: NodeId, ty: Type) -> Option<Type> {
        self.expr_types.insert(node, ty.clone());
        Some(ty)
    }
}

pub(crate) fn const_type(value: &ConstValue) -> Type {
    match value {
        ConstValue::Int(_) => Type::Int,
        ConstValue::Float(_) => Type::Float,
        ConstValue::Double(_) => Type::Double,
        ConstValue::Bool(_) => Type::Boolean,
        ConstValue::Str(_) => Type::Str,
        ConstValue::Null => Type::Null,
    }
}
