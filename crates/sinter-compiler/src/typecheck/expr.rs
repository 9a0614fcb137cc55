//! Expression checking.
//!
//! Every successfully typed expression lands in the `expr_types` side table.
//! A `None` return means the error has already been reported; callers just
//! stop, so one bad leaf does not cascade into a wall of diagnostics.

use sinter_ast::{BinaryOp, Expr, ExprKind, Lit, UnaryOp};
use sinter_core::{Span, TypeError};

use crate::registry::Type;
use crate::resolver::Binding;

use super::TypeChecker;

/// One callable considered during overload resolution.
pub(crate) struct Candidate {
    pub desc: String,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl TypeChecker<'_> {
    pub(crate) fn check_expr(&mut self, expr: &Expr) -> Option<Type> {
        let ty = match &expr.kind {
            ExprKind::Literal(lit) => self.check_literal(expr, lit)?,
            ExprKind::Ident(name) => self.check_ident(expr, name)?,
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(expr, *op, lhs, rhs)?,
            ExprKind::Unary { op, operand } => self.check_unary(expr, *op, operand)?,
            ExprKind::Member { object, member } => self.check_member_read(expr, object, member)?,
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args)?,
            ExprKind::New { class } => Type::pointer(Type::Class(class.clone())),
        };
        self.record(expr.id, ty)
    }

    fn check_literal(&mut self, expr: &Expr, lit: &Lit) -> Option<Type> {
        match lit {
            Lit::Int(_) => Some(Type::Int),
            Lit::Float(_) => Some(Type::Float),
            Lit::Double(_) => Some(Type::Double),
            Lit::Bool(_) => Some(Type::Boolean),
            Lit::Str(_) => Some(Type::Str),
            Lit::Null => Some(Type::Null),
            Lit::DStr(_) => {
                // Every referenced location must have a renderable type.
                let refs = self
                    .resolution
                    .dstring_refs
                    .get(&expr.id)
                    .cloned()
                    .unwrap_or_default();
                for binding in refs {
                    let ty = match &binding {
                        Binding::Local(sym) => self.symbol_types.get(sym).cloned(),
                        Binding::Field { class, field } => self
                            .registry
                            .class(class)
                            .and_then(|c| c.field(field))
                            .map(|f| f.ty.clone()),
                        _ => None,
                    };
                    if let Some(Type::Void) = ty {
                        self.report(TypeError::Invalid {
                            message: "d-string cannot reference a void value".into(),
                            span: expr.span,
                        });
                        return None;
                    }
                }
                Some(Type::DStr)
            }
        }
    }

    fn check_ident(&mut self, expr: &Expr, name: &str) -> Option<Type> {
        match self.resolution.binding(expr.id).cloned() {
            Some(Binding::Local(sym)) => self.symbol_types.get(&sym).cloned(),
            Some(Binding::Field { class, field }) => self
                .registry
                .class(&class)
                .and_then(|c| c.field(&field))
                .map(|f| f.ty.clone()),
            Some(Binding::Function(_) | Binding::Class(_) | Binding::Interface(_)) => {
                self.report(TypeError::Invalid {
                    message: format!("'{name}' cannot be used as a value"),
                    span: expr.span,
                });
                None
            }
            // Resolution already reported the unresolved reference.
            None => None,
        }
    }

    fn check_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Option<Type> {
        let lt = self.check_expr(lhs);
        let rt = self.check_expr(rhs);
        let (lt, rt) = (lt?, rt?);

        if op.is_logical() {
            if lt != Type::Boolean || rt != Type::Boolean {
                self.report(TypeError::Mismatch {
                    message: format!("operator '{op}' requires boolean operands, got {lt} and {rt}"),
                    span: expr.span,
                });
                return None;
            }
            return Some(Type::Boolean);
        }

        if op.is_equality() {
            let null_ptr = (lt == Type::Null && rt.is_pointer())
                || (rt == Type::Null && lt.is_pointer());
            if lt != rt && !null_ptr {
                self.report(TypeError::Mismatch {
                    message: format!("operator '{op}' requires equal operand types, got {lt} and {rt}"),
                    span: expr.span,
                });
                return None;
            }
            return Some(Type::Boolean);
        }

        if op.is_comparison() {
            if !lt.is_numeric() || lt != rt {
                self.report(TypeError::Mismatch {
                    message: format!(
                        "operator '{op}' requires matching numeric operands, got {lt} and {rt}"
                    ),
                    span: expr.span,
                });
                return None;
            }
            return Some(Type::Boolean);
        }

        // Arithmetic. Both operands must have the same numeric type; there is
        // no implicit int/float coercion.
        if op == BinaryOp::Mod && lt != Type::Int {
            self.report(TypeError::Mismatch {
                message: format!("operator '%' requires int operands, got {lt}"),
                span: expr.span,
            });
            return None;
        }
        if !lt.is_numeric() || lt != rt {
            self.report(TypeError::Mismatch {
                message: format!(
                    "operator '{op}' requires matching numeric operands, got {lt} and {rt}"
                ),
                span: expr.span,
            });
            return None;
        }
        Some(lt)
    }

    fn check_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> Option<Type> {
        let ty = self.check_expr(operand)?;
        match op {
            UnaryOp::Not => {
                if ty != Type::Boolean {
                    self.report(TypeError::Mismatch {
                        message: format!("operator '!' requires a boolean operand, got {ty}"),
                        span: expr.span,
                    });
                    return None;
                }
                Some(Type::Boolean)
            }
            UnaryOp::Neg => {
                if !ty.is_numeric() {
                    self.report(TypeError::Mismatch {
                        message: format!("operator '-' requires a numeric operand, got {ty}"),
                        span: expr.span,
                    });
                    return None;
                }
                Some(ty)
            }
            UnaryOp::Deref => match ty {
                Type::Pointer(inner) => Some(*inner),
                other => {
                    self.report(TypeError::Mismatch {
                        message: format!("cannot dereference non-pointer type {other}"),
                        span: expr.span,
                    });
                    None
                }
            },
            UnaryOp::AddrOf => {
                if !is_lvalue(operand) {
                    self.report(TypeError::NotAnLvalue { span: expr.span });
                    return None;
                }
                if !ty.is_named() {
                    self.report(TypeError::PointerToPrimitive {
                        name: ty.to_string(),
                        span: expr.span,
                    });
                    return None;
                }
                Some(Type::pointer(ty))
            }
        }
    }

    fn check_member_read(&mut self, expr: &Expr, object: &Expr, member: &str) -> Option<Type> {
        if let ExprKind::Ident(name) = &object.kind {
            if matches!(
                self.resolution.binding(object.id),
                Some(Binding::Class(_) | Binding::Interface(_))
            ) {
                self.report(TypeError::Invalid {
                    message: format!("'{name}.{member}' is not a value; static members must be called"),
                    span: expr.span,
                });
                return None;
            }
        }
        let obj_ty = self.check_expr(object)?;
        let target = match &obj_ty {
            Type::Pointer(inner) => (**inner).clone(),
            other => other.clone(),
        };
        match target {
            Type::Class(class_name) => {
                let class = self.registry.class(&class_name)?;
                if let Some(field) = class.field(member) {
                    return Some(field.ty.clone());
                }
                let has_method = !class.methods_named(member).is_empty();
                if has_method {
                    self.report(TypeError::Invalid {
                        message: format!("method '{member}' must be called"),
                        span: expr.span,
                    });
                } else {
                    self.report(TypeError::UndefinedField {
                        field: member.to_string(),
                        type_name: class_name,
                        span: expr.span,
                    });
                }
                None
            }
            Type::Interface(iface_name) => {
                self.report(TypeError::UndefinedField {
                    field: member.to_string(),
                    type_name: iface_name,
                    span: expr.span,
                });
                None
            }
            other => {
                self.report(TypeError::Invalid {
                    message: format!("type {other} has no members"),
                    span: expr.span,
                });
                None
            }
        }
    }

    fn check_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> Option<Type> {
        let mut arg_types = Vec::with_capacity(args.len());
        let mut args_failed = false;
        for arg in args {
            match self.check_expr(arg) {
                Some(ty) => arg_types.push(ty),
                None => args_failed = true,
            }
        }

        match &callee.kind {
            ExprKind::Member { object, member } => {
                // Static call: the receiver names a class.
                if let ExprKind::Ident(_) = &object.kind {
                    if let Some(Binding::Class(class_name)) =
                        self.resolution.binding(object.id).cloned()
                    {
                        if args_failed {
                            return None;
                        }
                        return self.check_static_call(&class_name, member, &arg_types, expr.span);
                    }
                }
                let obj_ty = self.check_expr(object)?;
                if args_failed {
                    return None;
                }
                if member == "release" || member == "clean" {
                    return self.check_cleanup_call(&obj_ty, member, &arg_types, expr.span);
                }
                let target = match &obj_ty {
                    Type::Pointer(inner) => (**inner).clone(),
                    other => other.clone(),
                };
                match target {
                    Type::Class(class_name) => {
                        let candidates: Vec<Candidate> = self
                            .registry
                            .class(&class_name)
                            .map(|c| {
                                c.methods_named(member)
                                    .into_iter()
                                    .filter(|m| !m.is_static)
                                    .map(|m| Candidate {
                                        desc: m.describe(),
                                        params: m.params.clone(),
                                        ret: m.ret.clone(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        if candidates.is_empty() {
                            self.report(TypeError::UndefinedMethod {
                                method: member.to_string(),
                                type_name: class_name,
                                span: expr.span,
                            });
                            return None;
                        }
                        self.match_call(member, &candidates, &arg_types, expr.span)
                    }
                    Type::Interface(iface_name) => {
                        let candidates: Vec<Candidate> = self
                            .registry
                            .interface(&iface_name)
                            .map(|i| {
                                i.methods
                                    .iter()
                                    .filter(|m| m.name == *member)
                                    .map(|m| Candidate {
                                        desc: m.describe(),
                                        params: m.params.clone(),
                                        ret: m.ret.clone(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        if candidates.is_empty() {
                            self.report(TypeError::UndefinedMethod {
                                method: member.to_string(),
                                type_name: iface_name,
                                span: expr.span,
                            });
                            return None;
                        }
                        self.match_call(member, &candidates, &arg_types, expr.span)
                    }
                    other => {
                        self.report(TypeError::Invalid {
                            message: format!("type {other} has no methods"),
                            span: expr.span,
                        });
                        None
                    }
                }
            }
            ExprKind::Ident(name) => match self.resolution.binding(callee.id).cloned() {
                Some(Binding::Function(func_name)) => {
                    if args_failed {
                        return None;
                    }
                    let candidates: Vec<Candidate> = self
                        .registry
                        .functions(&func_name)
                        .iter()
                        .map(|f| Candidate {
                            desc: f.describe(),
                            params: f.params.clone(),
                            ret: f.ret.clone(),
                        })
                        .collect();
                    self.match_call(&func_name, &candidates, &arg_types, expr.span)
                }
                Some(_) => {
                    self.report(TypeError::Invalid {
                        message: format!("'{name}' is not callable"),
                        span: expr.span,
                    });
                    None
                }
                None => None,
            },
            _ => {
                self.check_expr(callee);
                self.report(TypeError::Invalid {
                    message: "expression is not callable".into(),
                    span: expr.span,
                });
                None
            }
        }
    }

    fn check_static_call(
        &mut self,
        class_name: &str,
        member: &str,
        args: &[Type],
        span: Span,
    ) -> Option<Type> {
        let class = self.registry.class(class_name)?;
        let candidates: Vec<Candidate> = class
            .methods_named(member)
            .into_iter()
            .filter(|m| m.is_static)
            .map(|m| Candidate {
                desc: m.describe(),
                params: m.params.clone(),
                ret: m.ret.clone(),
            })
            .collect();
        if candidates.is_empty() {
            let has_instance = !class.methods_named(member).is_empty();
            if has_instance {
                self.report(TypeError::Invalid {
                    message: format!("method '{member}' of '{class_name}' requires an instance"),
                    span,
                });
            } else {
                self.report(TypeError::UndefinedMethod {
                    method: member.to_string(),
                    type_name: class_name.to_string(),
                    span,
                });
            }
            return None;
        }
        self.match_call(member, &candidates, args, span)
    }

    fn check_cleanup_call(
        &mut self,
        obj_ty: &Type,
        member: &str,
        args: &[Type],
        span: Span,
    ) -> Option<Type> {
        if !matches!(obj_ty, Type::Pointer(_)) {
            self.report(TypeError::Invalid {
                message: format!(".{member}() requires a pointer receiver, got {obj_ty}"),
                span,
            });
            return None;
        }
        if !args.is_empty() {
            self.report(TypeError::Invalid {
                message: format!(".{member}() takes no arguments"),
                span,
            });
            return None;
        }
        Some(Type::Void)
    }

    /// Exact arity plus per-argument assignability; when several candidates
    /// remain viable, a single exact-type match wins, anything else is
    /// ambiguous.
    fn match_call(
        &mut self,
        name: &str,
        candidates: &[Candidate],
        args: &[Type],
        span: Span,
    ) -> Option<Type> {
        let viable: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| {
                c.params.len() == args.len()
                    && c.params
                        .iter()
                        .zip(args)
                        .all(|(param, arg)| self.registry.assignable(param, arg))
            })
            .collect();
        match viable.len() {
            0 => {
                let args_desc = args
                    .iter()
                    .map(Type::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let cand_desc = candidates
                    .iter()
                    .map(|c| c.desc.clone())
                    .collect::<Vec<_>>()
                    .join("; ");
                self.report(TypeError::NoMatchingOverload {
                    name: name.to_string(),
                    args: args_desc,
                    candidates: cand_desc,
                    span,
                });
                None
            }
            1 => Some(viable[0].ret.clone()),
            _ => {
                let exact: Vec<&&Candidate> = viable
                    .iter()
                    .filter(|c| c.params.as_slice() == args)
                    .collect();
                if exact.len() == 1 {
                    return Some(exact[0].ret.clone());
                }
                let cand_desc = viable
                    .iter()
                    .map(|c| c.desc.clone())
                    .collect::<Vec<_>>()
                    .join("; ");
                self.report(TypeError::AmbiguousOverload {
                    name: name.to_string(),
                    candidates: cand_desc,
                    span,
                });
                None
            }
        }
    }
}

/// Whether an expression designates storage.
pub(crate) fn is_lvalue(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Unary {
            op: UnaryOp::Deref,
            ..
        }
    )
}
