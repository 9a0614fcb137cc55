//! Statement checking.

use sinter_ast::{Expr, ExprKind, Stmt, StmtKind, UnaryOp};
use sinter_core::TypeError;

use crate::registry::Type;
use crate::resolver::Binding;

use super::TypeChecker;
use super::expr::is_lvalue;

impl TypeChecker<'_> {
    pub(crate) fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { name, ty, init } => {
                let declared = ty.as_ref().map(|t| self.resolve_type(t));
                let init_ty = init.as_ref().and_then(|e| self.check_expr(e));
                let final_ty = match (declared, init_ty) {
                    (Some(declared), Some(init_ty)) => {
                        if !self.registry.assignable(&declared, &init_ty) {
                            self.report(TypeError::Mismatch {
                                message: format!(
                                    "cannot initialize '{name}: {declared}' with a {init_ty} value"
                                ),
                                span: stmt.span,
                            });
                        }
                        declared
                    }
                    (Some(declared), None) => declared,
                    (None, Some(init_ty)) => {
                        if init_ty == Type::Null {
                            self.report(TypeError::Invalid {
                                message: format!("cannot infer a type for '{name}' from null"),
                                span: stmt.span,
                            });
                        }
                        init_ty
                    }
                    (None, None) => {
                        if init.is_none() {
                            self.report(TypeError::Invalid {
                                message: format!(
                                    "variable '{name}' needs a type or an initializer"
                                ),
                                span: stmt.span,
                            });
                        }
                        Type::Int
                    }
                };
                if final_ty == Type::Void {
                    self.report(TypeError::Invalid {
                        message: format!("variable '{name}' cannot have type void"),
                        span: stmt.span,
                    });
                }
                if let Some(&sym) = self.resolution.defs.get(&stmt.id) {
                    self.symbol_types.insert(sym, final_ty);
                }
            }
            StmtKind::Assign { target, value } => self.check_assign(stmt, target, value),
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::Return(value) => self.check_return(stmt, value.as_ref()),
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_condition(cond);
                for s in &then_block.stmts {
                    self.check_stmt(s);
                }
                if let Some(else_block) = else_block {
                    for s in &else_block.stmts {
                        self.check_stmt(s);
                    }
                }
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                for s in &body.stmts {
                    self.check_stmt(s);
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_condition(cond);
                }
                if let Some(update) = update {
                    self.check_stmt(update);
                }
                for s in &body.stmts {
                    self.check_stmt(s);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Print { args, .. } => {
                for arg in args {
                    if let Some(Type::Void) = self.check_expr(arg) {
                        self.report(TypeError::Invalid {
                            message: "cannot print a void value".into(),
                            span: arg.span,
                        });
                    }
                }
            }
        }
    }

    fn check_condition(&mut self, cond: &Expr) {
        if let Some(ty) = self.check_expr(cond) {
            if ty != Type::Boolean {
                self.report(TypeError::Mismatch {
                    message: format!("condition must be boolean, got {ty}"),
                    span: cond.span,
                });
            }
        }
    }

    fn check_assign(&mut self, stmt: &Stmt, target: &Expr, value: &Expr) {
        if !is_lvalue(target) {
            self.report(TypeError::NotAnLvalue { span: target.span });
            self.check_expr(value);
            return;
        }
        if matches!(
            target.kind,
            ExprKind::Unary {
                op: UnaryOp::Deref,
                ..
            }
        ) {
            self.report(TypeError::Invalid {
                message: "cannot assign through a dereferenced object".into(),
                span: target.span,
            });
            self.check_expr(value);
            return;
        }
        let target_ty = self.check_expr(target);
        // Direct stores into const or derived fields are rejected regardless
        // of where they happen.
        if let Some((class_name, field_name)) = self.assigned_field(target) {
            let traits = self
                .registry
                .class(&class_name)
                .and_then(|c| c.field(&field_name))
                .map(|f| (f.is_const, f.is_derived()));
            match traits {
                Some((true, _)) => self.report(TypeError::AssignToConst {
                    name: field_name.clone(),
                    span: target.span,
                }),
                Some((false, true)) => self.report(TypeError::Invalid {
                    message: format!("field '{field_name}' is derived and has no stored value"),
                    span: target.span,
                }),
                _ => {}
            }
        }
        let value_ty = self.check_expr(value);
        if let (Some(target_ty), Some(value_ty)) = (target_ty, value_ty) {
            if !self.registry.assignable(&target_ty, &value_ty) {
                self.report(TypeError::Mismatch {
                    message: format!("cannot assign a {value_ty} value to {target_ty}"),
                    span: stmt.span,
                });
            }
        }
    }

    fn assigned_field(&self, target: &Expr) -> Option<(String, String)> {
        match &target.kind {
            ExprKind::Ident(_) => match self.resolution.binding(target.id) {
                Some(Binding::Field { class, field }) => Some((class.clone(), field.clone())),
                _ => None,
            },
            ExprKind::Member { object, member } => {
                let obj_ty = self.expr_types.get(&object.id)?;
                obj_ty
                    .class_name()
                    .map(|c| (c.to_string(), member.clone()))
            }
            _ => None,
        }
    }

    fn check_return(&mut self, stmt: &Stmt, value: Option<&Expr>) {
        match value {
            Some(value) => {
                let Some(value_ty) = self.check_expr(value) else {
                    return;
                };
                if self.current_return == Type::Void {
                    self.report(TypeError::Mismatch {
                        message: format!(
                            "void function '{}' cannot return a value",
                            self.current_fn
                        ),
                        span: stmt.span,
                    });
                    return;
                }
                // Returns must match the declared type exactly; null is
                // accepted for pointer returns.
                let matches = value_ty == self.current_return
                    || (value_ty == Type::Null && self.current_return.is_pointer());
                if !matches {
                    self.report(TypeError::Mismatch {
                        message: format!(
                            "return type mismatch in '{}': expected {}, got {}",
                            self.current_fn, self.current_return, value_ty
                        ),
                        span: stmt.span,
                    });
                }
            }
            None => {
                if self.current_return != Type::Void {
                    self.report(TypeError::Mismatch {
                        message: format!(
                            "non-void function '{}' must return a value",
                            self.current_fn
                        ),
                        span: stmt.span,
                    });
                }
            }
        }
    }
}
