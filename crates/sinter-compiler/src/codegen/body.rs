//! Lowering of function and method bodies.

use sinter_ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, Lit, Stmt, StmtKind, UnaryOp,
};
use sinter_core::Span;

use crate::dstring::{self, Segment};
use crate::ir::{
    Constant, DStringDescriptor, Instr, IrBinOp, IrCmpOp, IrFunction, IrParam, IrSegment, IrType,
    Operand, TempId, Terminator,
};
use crate::registry::{ClassInfo, ConstValue, FunctionInfo, MethodInfo, Registry, Type};
use crate::resolver::Binding;

use super::{CodeGenerator, Emit, Result, internal};

/// Lower one user-written function or method.
pub(crate) fn lower_function(
    cg: &mut CodeGenerator,
    func: &FunctionDecl,
    class: Option<&ClassInfo>,
) -> Result<IrFunction> {
    let param_tys: Vec<Type> = func
        .params
        .iter()
        .map(|p| {
            cg.resolution
                .defs
                .get(&p.id)
                .and_then(|sym| cg.types.symbol_types.get(sym))
                .cloned()
                .ok_or_else(|| internal(p.span, "parameter without a resolved type"))
        })
        .collect::<Result<_>>()?;

    let registry = &cg.types.registry;
    let (symbol, ret) = match class {
        Some(info) => {
            let method = info
                .methods
                .iter()
                .find(|m| {
                    m.name == func.name && m.params == param_tys && m.declared_by == info.name
                })
                .ok_or_else(|| internal(func.span, "method not registered"))?;
            (registry.method_symbol(method), method.ret.clone())
        }
        None => {
            let function = registry
                .functions(&func.name)
                .iter()
                .find(|f| f.params == param_tys)
                .ok_or_else(|| internal(func.span, "function not registered"))?;
            (registry.function_symbol(function), function.ret.clone())
        }
    };

    let is_method = class.is_some() && !func.is_static;
    let reserved = func.params.len() as u32 + if is_method { 1 } else { 0 };
    let mut emit = Emit::new(symbol, cg.ir_type(&ret), reserved);
    if is_method {
        let class_name = class.map(|c| c.name.clone()).unwrap_or_default();
        emit.params.push(IrParam {
            name: "this".into(),
            ty: IrType::Ptr(class_name),
        });
        emit.this_temp = Some(TempId(0));
    }
    let offset = if is_method { 1 } else { 0 };
    for (i, (param, ty)) in func.params.iter().zip(&param_tys).enumerate() {
        let ir_ty = cg.ir_type(ty);
        emit.params.push(IrParam {
            name: param.name.clone(),
            ty: ir_ty.clone(),
        });
        // Give each parameter a stack cell so it is addressable (d-strings
        // snapshot referenced locations by address).
        let addr = emit.new_temp();
        emit.push(Instr::Alloca {
            dst: addr,
            ty: ir_ty,
        });
        emit.push(Instr::Store {
            addr: Operand::Temp(addr),
            value: Operand::Temp(TempId(i as u32 + offset)),
        });
        if let Some(&sym) = cg.resolution.defs.get(&param.id) {
            emit.locals.insert(sym, addr);
        }
    }

    for stmt in &func.body.stmts {
        lower_stmt(cg, &mut emit, stmt)?;
    }
    emit.terminate(if emit.ret == IrType::Void {
        Terminator::Ret(None)
    } else {
        Terminator::Unreachable
    });
    Ok(emit.finish())
}

// ============================================================================
// Statements
// ============================================================================

fn lower_stmt(cg: &mut CodeGenerator, e: &mut Emit, stmt: &Stmt) -> Result<()> {
    match &stmt.kind {
        StmtKind::VarDecl { init, .. } => {
            let sym = *cg
                .resolution
                .defs
                .get(&stmt.id)
                .ok_or_else(|| internal(stmt.span, "variable without a symbol"))?;
            let ty = cg
                .types
                .symbol_types
                .get(&sym)
                .cloned()
                .ok_or_else(|| internal(stmt.span, "variable without a type"))?;
            let addr = e.new_temp();
            e.push(Instr::Alloca {
                dst: addr,
                ty: cg.ir_type(&ty),
            });
            e.locals.insert(sym, addr);
            let value = match init {
                Some(init) => {
                    let op = lower_expr(cg, e, init)?;
                    let from = expr_ty(cg, init)?.clone();
                    coerce(e, op, &from, &ty)
                }
                None => cg.const_operand(&ConstValue::default_for(&ty)),
            };
            e.push(Instr::Store {
                addr: Operand::Temp(addr),
                value,
            });
        }
        StmtKind::Assign { target, value } => {
            let op = lower_expr(cg, e, value)?;
            let from = expr_ty(cg, value)?.clone();
            let to = expr_ty(cg, target)?.clone();
            let op = coerce(e, op, &from, &to);
            let addr = lower_address(cg, e, target)?;
            e.push(Instr::Store { addr, value: op });
        }
        StmtKind::Expr(expr) => {
            if let Some((object, member)) = as_cleanup_call(expr) {
                let recv = lower_expr(cg, e, object)?;
                if member == "clean" {
                    let class = expr_ty(cg, object)?
                        .class_name()
                        .ok_or_else(|| internal(object.span, "clean() on a non-class pointer"))?
                        .to_string();
                    e.push(Instr::Call {
                        dst: None,
                        callee: format!("{class}.__cleanup"),
                        args: vec![recv],
                    });
                    e.push(Instr::FreeRecord {
                        obj: recv,
                        class,
                    });
                }
                // release() transfers the obligation out of this scope and
                // lowers to no runtime code.
            } else {
                lower_expr(cg, e, expr)?;
            }
        }
        StmtKind::Return(value) => {
            let op = match value {
                Some(value) => Some(lower_expr(cg, e, value)?),
                None => None,
            };
            e.terminate(Terminator::Ret(op));
            let dead = e.new_label("dead");
            e.start_block(dead);
        }
        StmtKind::If {
            cond,
            then_block,
            else_block,
        } => {
            let cond_op = lower_expr(cg, e, cond)?;
            let then_label = e.new_label("then");
            let else_label = e.new_label("else");
            let join_label = e.new_label("join");
            let false_target = if else_block.is_some() {
                else_label.clone()
            } else {
                join_label.clone()
            };
            e.terminate(Terminator::Branch {
                cond: cond_op,
                then_label: then_label.clone(),
                else_label: false_target,
            });
            e.start_block(then_label);
            for s in &then_block.stmts {
                lower_stmt(cg, e, s)?;
            }
            e.terminate(Terminator::Jump(join_label.clone()));
            if let Some(else_block) = else_block {
                e.start_block(else_label);
                for s in &else_block.stmts {
                    lower_stmt(cg, e, s)?;
                }
                e.terminate(Terminator::Jump(join_label.clone()));
            }
            e.start_block(join_label);
        }
        StmtKind::While { cond, body } => {
            let cond_label = e.new_label("loop.cond");
            let body_label = e.new_label("loop.body");
            let after_label = e.new_label("loop.end");
            e.terminate(Terminator::Jump(cond_label.clone()));
            e.start_block(cond_label.clone());
            let cond_op = lower_expr(cg, e, cond)?;
            e.terminate(Terminator::Branch {
                cond: cond_op,
                then_label: body_label.clone(),
                else_label: after_label.clone(),
            });
            e.start_block(body_label);
            e.loop_stack.push((cond_label.clone(), after_label.clone()));
            for s in &body.stmts {
                lower_stmt(cg, e, s)?;
            }
            e.loop_stack.pop();
            e.terminate(Terminator::Jump(cond_label));
            e.start_block(after_label);
        }
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            if let Some(init) = init {
                lower_stmt(cg, e, init)?;
            }
            let cond_label = e.new_label("for.cond");
            let body_label = e.new_label("for.body");
            let update_label = e.new_label("for.step");
            let after_label = e.new_label("for.end");
            e.terminate(Terminator::Jump(cond_label.clone()));
            e.start_block(cond_label.clone());
            match cond {
                Some(cond) => {
                    let cond_op = lower_expr(cg, e, cond)?;
                    e.terminate(Terminator::Branch {
                        cond: cond_op,
                        then_label: body_label.clone(),
                        else_label: after_label.clone(),
                    });
                }
                None => e.terminate(Terminator::Jump(body_label.clone())),
            }
            e.start_block(body_label);
            e.loop_stack
                .push((update_label.clone(), after_label.clone()));
            for s in &body.stmts {
                lower_stmt(cg, e, s)?;
            }
            e.loop_stack.pop();
            e.terminate(Terminator::Jump(update_label.clone()));
            e.start_block(update_label);
            if let Some(update) = update {
                lower_stmt(cg, e, update)?;
            }
            e.terminate(Terminator::Jump(cond_label));
            e.start_block(after_label);
        }
        StmtKind::Break => {
            let target = e
                .loop_stack
                .last()
                .map(|(_, brk)| brk.clone())
                .ok_or_else(|| internal(stmt.span, "break outside a loop"))?;
            e.terminate(Terminator::Jump(target));
            let dead = e.new_label("dead");
            e.start_block(dead);
        }
        StmtKind::Continue => {
            let target = e
                .loop_stack
                .last()
                .map(|(cont, _)| cont.clone())
                .ok_or_else(|| internal(stmt.span, "continue outside a loop"))?;
            e.terminate(Terminator::Jump(target));
            let dead = e.new_label("dead");
            e.start_block(dead);
        }
        StmtKind::Print { args, newline } => {
            let mut ops = Vec::with_capacity(args.len());
            for arg in args {
                ops.push(lower_expr(cg, e, arg)?);
            }
            e.push(Instr::Print {
                args: ops,
                newline: *newline,
            });
        }
    }
    Ok(())
}

/// `p.release()` / `p.clean()` in statement position.
fn as_cleanup_call(expr: &Expr) -> Option<(&Expr, &str)> {
    if let ExprKind::Call { callee, args } = &expr.kind {
        if args.is_empty() {
            if let ExprKind::Member { object, member } = &callee.kind {
                if member == "release" || member == "clean" {
                    return Some((object, member));
                }
            }
        }
    }
    None
}

// ============================================================================
// Expressions
// ============================================================================

fn lower_expr(cg: &mut CodeGenerator, e: &mut Emit, expr: &Expr) -> Result<Operand> {
    match &expr.kind {
        ExprKind::Literal(lit) => lower_literal(cg, e, expr, lit),
        ExprKind::Ident(_) => lower_ident(cg, e, expr),
        ExprKind::Binary { op, lhs, rhs } => lower_binary(cg, e, expr, *op, lhs, rhs),
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Not => {
                let value = lower_expr(cg, e, operand)?;
                let dst = e.new_temp();
                e.push(Instr::Not { dst, value });
                Ok(Operand::Temp(dst))
            }
            UnaryOp::Neg => {
                let value = lower_expr(cg, e, operand)?;
                let ty = cg.ir_type(expr_ty(cg, operand)?);
                let dst = e.new_temp();
                e.push(Instr::Neg { dst, ty, value });
                Ok(Operand::Temp(dst))
            }
            // A pointer and the record it references share a representation.
            UnaryOp::Deref => lower_expr(cg, e, operand),
            UnaryOp::AddrOf => lower_address(cg, e, operand),
        },
        ExprKind::Member { object, member } => {
            let obj = lower_expr(cg, e, object)?;
            let class = expr_ty(cg, object)?
                .class_name()
                .ok_or_else(|| internal(expr.span, "member access on a non-class value"))?
                .to_string();
            lower_field_read(cg, e, obj, &class, member, expr.span)
        }
        ExprKind::Call { callee, args } => lower_call(cg, e, expr, callee, args),
        ExprKind::New { class } => {
            let dst = e.new_temp();
            e.push(Instr::Call {
                dst: Some(dst),
                callee: format!("{class}.new"),
                args: Vec::new(),
            });
            Ok(Operand::Temp(dst))
        }
    }
}

fn lower_literal(cg: &mut CodeGenerator, e: &mut Emit, expr: &Expr, lit: &Lit) -> Result<Operand> {
    Ok(match lit {
        Lit::Int(v) => Operand::Const(Constant::Int(*v)),
        Lit::Bool(v) => Operand::Const(Constant::Bool(*v)),
        Lit::Null => Operand::Const(Constant::Null),
        Lit::Float(v) => Operand::Const(Constant::F32(cg.module.pool.intern_f32(*v))),
        Lit::Double(v) => Operand::Const(Constant::F64(cg.module.pool.intern_f64(*v))),
        Lit::Str(v) => Operand::Const(Constant::Str(cg.module.pool.intern_str(v))),
        Lit::DStr(raw) => {
            let template = dstring::parse(raw);
            let segments = template
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Text(text) => IrSegment::Text(cg.module.pool.intern_str(text)),
                    Segment::Slot(slot) => IrSegment::Slot(*slot),
                })
                .collect();
            let descriptor = cg.module.dstrings.len();
            cg.module.dstrings.push(DStringDescriptor {
                segments,
                ref_count: template.refs.len(),
            });
            let bindings = cg
                .resolution
                .dstring_refs
                .get(&expr.id)
                .cloned()
                .ok_or_else(|| internal(expr.span, "d-string without resolved references"))?;
            let mut refs = Vec::with_capacity(bindings.len());
            for binding in &bindings {
                refs.push(binding_address(cg, e, binding, expr.span)?);
            }
            let dst = e.new_temp();
            e.push(Instr::DStrNew {
                dst,
                descriptor,
                refs,
            });
            Operand::Temp(dst)
        }
    })
}

fn lower_ident(cg: &mut CodeGenerator, e: &mut Emit, expr: &Expr) -> Result<Operand> {
    match cg.resolution.binding(expr.id).cloned() {
        Some(Binding::Local(sym)) => {
            let addr = *e
                .locals
                .get(&sym)
                .ok_or_else(|| internal(expr.span, "local without a stack cell"))?;
            let ty = cg
                .types
                .symbol_types
                .get(&sym)
                .cloned()
                .ok_or_else(|| internal(expr.span, "local without a type"))?;
            let dst = e.new_temp();
            e.push(Instr::Load {
                dst,
                ty: cg.ir_type(&ty),
                addr: Operand::Temp(addr),
            });
            Ok(Operand::Temp(dst))
        }
        Some(Binding::Field { class, field }) => {
            let this = e
                .this_temp
                .ok_or_else(|| internal(expr.span, "field access without a receiver"))?;
            lower_field_read(cg, e, Operand::Temp(this), &class, &field, expr.span)
        }
        _ => Err(internal(expr.span, "identifier is not a value")),
    }
}

/// Read a field: derived fields route through their method, stored fields
/// load their slot.
fn lower_field_read(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    obj: Operand,
    class: &str,
    field: &str,
    span: Span,
) -> Result<Operand> {
    let info = cg
        .types
        .registry
        .class(class)
        .ok_or_else(|| internal(span, "unknown class in field access"))?;
    let field_info = info
        .field(field)
        .ok_or_else(|| internal(span, "unknown field"))?;
    if field_info.is_derived() {
        let callee = cg
            .derived_method_symbol(class, field)
            .ok_or_else(|| internal(span, "derived field without its method"))?;
        let dst = e.new_temp();
        e.push(Instr::Call {
            dst: Some(dst),
            callee,
            args: vec![obj],
        });
        return Ok(Operand::Temp(dst));
    }
    let ty = cg.ir_type(&field_info.ty);
    let addr = e.new_temp();
    e.push(Instr::FieldAddr {
        dst: addr,
        obj,
        class: class.to_string(),
        field: field.to_string(),
    });
    let dst = e.new_temp();
    e.push(Instr::Load {
        dst,
        ty,
        addr: Operand::Temp(addr),
    });
    Ok(Operand::Temp(dst))
}

fn lower_binary(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    expr: &Expr,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
) -> Result<Operand> {
    if op.is_logical() {
        // Short-circuit through a stack cell.
        let cell = e.new_temp();
        e.push(Instr::Alloca {
            dst: cell,
            ty: IrType::I1,
        });
        let lhs_op = lower_expr(cg, e, lhs)?;
        let rhs_label = e.new_label("sc.rhs");
        let short_label = e.new_label("sc.short");
        let join_label = e.new_label("sc.join");
        let (then_label, else_label, short_value) = match op {
            BinaryOp::And => (rhs_label.clone(), short_label.clone(), false),
            _ => (short_label.clone(), rhs_label.clone(), true),
        };
        e.terminate(Terminator::Branch {
            cond: lhs_op,
            then_label,
            else_label,
        });
        e.start_block(rhs_label);
        let rhs_op = lower_expr(cg, e, rhs)?;
        e.push(Instr::Store {
            addr: Operand::Temp(cell),
            value: rhs_op,
        });
        e.terminate(Terminator::Jump(join_label.clone()));
        e.start_block(short_label);
        e.push(Instr::Store {
            addr: Operand::Temp(cell),
            value: Operand::Const(Constant::Bool(short_value)),
        });
        e.terminate(Terminator::Jump(join_label.clone()));
        e.start_block(join_label);
        let dst = e.new_temp();
        e.push(Instr::Load {
            dst,
            ty: IrType::I1,
            addr: Operand::Temp(cell),
        });
        return Ok(Operand::Temp(dst));
    }

    let lhs_op = lower_expr(cg, e, lhs)?;
    let rhs_op = lower_expr(cg, e, rhs)?;
    let dst = e.new_temp();
    if op.is_comparison() {
        let cmp = match op {
            BinaryOp::Eq => IrCmpOp::Eq,
            BinaryOp::Ne => IrCmpOp::Ne,
            BinaryOp::Lt => IrCmpOp::Lt,
            BinaryOp::Le => IrCmpOp::Le,
            BinaryOp::Gt => IrCmpOp::Gt,
            _ => IrCmpOp::Ge,
        };
        e.push(Instr::Compare {
            dst,
            op: cmp,
            lhs: lhs_op,
            rhs: rhs_op,
        });
    } else {
        let bin = match op {
            BinaryOp::Add => IrBinOp::Add,
            BinaryOp::Sub => IrBinOp::Sub,
            BinaryOp::Mul => IrBinOp::Mul,
            BinaryOp::Div => IrBinOp::Div,
            _ => IrBinOp::Mod,
        };
        let ty = cg.ir_type(expr_ty(cg, lhs)?);
        e.push(Instr::Binary {
            dst,
            op: bin,
            ty,
            lhs: lhs_op,
            rhs: rhs_op,
        });
    }
    Ok(Operand::Temp(dst))
}

fn lower_call(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    expr: &Expr,
    callee: &Expr,
    args: &[Expr],
) -> Result<Operand> {
    let arg_tys: Vec<Type> = args
        .iter()
        .map(|a| expr_ty(cg, a).cloned())
        .collect::<Result<_>>()?;

    match &callee.kind {
        ExprKind::Member { object, member } => {
            if let ExprKind::Ident(_) = &object.kind {
                if let Some(Binding::Class(class_name)) =
                    cg.resolution.binding(object.id).cloned()
                {
                    let method = pick_method(&cg.types.registry, &class_name, member, &arg_tys, true)
                        .ok_or_else(|| internal(expr.span, "static call did not re-resolve"))?;
                    let symbol = cg.types.registry.method_symbol(&method);
                    let ops = lower_args(cg, e, args, &arg_tys, &method.params, None)?;
                    return emit_call(e, symbol, ops, &method.ret);
                }
            }
            if member == "release" || member == "clean" {
                return Err(internal(
                    expr.span,
                    "cleanup call in expression position reached codegen",
                ));
            }
            let recv = lower_expr(cg, e, object)?;
            let recv_ty = expr_ty(cg, object)?.clone();
            let target = match &recv_ty {
                Type::Pointer(inner) => (**inner).clone(),
                other => other.clone(),
            };
            match target {
                Type::Class(class_name) => {
                    let method =
                        pick_method(&cg.types.registry, &class_name, member, &arg_tys, false)
                            .ok_or_else(|| internal(expr.span, "method call did not re-resolve"))?;
                    let symbol = cg.types.registry.method_symbol(&method);
                    let ops = lower_args(cg, e, args, &arg_tys, &method.params, Some(recv))?;
                    emit_call(e, symbol, ops, &method.ret)
                }
                Type::Interface(iface_name) => {
                    let iface = cg
                        .types
                        .registry
                        .interface(&iface_name)
                        .ok_or_else(|| internal(expr.span, "unknown interface"))?;
                    let slot = pick_interface_slot(&cg.types.registry, iface, member, &arg_tys)
                        .ok_or_else(|| internal(expr.span, "interface call did not re-resolve"))?;
                    let method = iface.methods[slot].clone();
                    let ops = lower_args(cg, e, args, &arg_tys, &method.params, Some(recv))?;
                    let dst = if method.ret == Type::Void {
                        None
                    } else {
                        Some(e.new_temp())
                    };
                    e.push(Instr::CallIface {
                        dst,
                        interface: iface_name,
                        method: member.clone(),
                        slot,
                        args: ops,
                    });
                    Ok(match dst {
                        Some(dst) => Operand::Temp(dst),
                        None => Operand::Const(Constant::Null),
                    })
                }
                other => Err(internal(
                    expr.span,
                    format!("method call on non-class type {other}"),
                )),
            }
        }
        ExprKind::Ident(_) => match cg.resolution.binding(callee.id).cloned() {
            Some(Binding::Function(name)) => {
                let function = pick_function(&cg.types.registry, &name, &arg_tys)
                    .ok_or_else(|| internal(expr.span, "call did not re-resolve"))?;
                let symbol = cg.types.registry.function_symbol(&function);
                let ops = lower_args(cg, e, args, &arg_tys, &function.params, None)?;
                emit_call(e, symbol, ops, &function.ret)
            }
            _ => Err(internal(expr.span, "callee is not a function")),
        },
        _ => Err(internal(expr.span, "unsupported callee expression")),
    }
}

fn lower_args(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    args: &[Expr],
    arg_tys: &[Type],
    params: &[Type],
    receiver: Option<Operand>,
) -> Result<Vec<Operand>> {
    let mut ops = Vec::with_capacity(args.len() + 1);
    if let Some(receiver) = receiver {
        ops.push(receiver);
    }
    for ((arg, from), to) in args.iter().zip(arg_tys).zip(params) {
        let op = lower_expr(cg, e, arg)?;
        ops.push(coerce(e, op, from, to));
    }
    Ok(ops)
}

fn emit_call(e: &mut Emit, callee: String, args: Vec<Operand>, ret: &Type) -> Result<Operand> {
    let dst = if *ret == Type::Void {
        None
    } else {
        Some(e.new_temp())
    };
    e.push(Instr::Call { dst, callee, args });
    Ok(match dst {
        Some(dst) => Operand::Temp(dst),
        None => Operand::Const(Constant::Null),
    })
}

/// Address of an lvalue (assignment targets, `&x`, d-string references).
fn lower_address(cg: &mut CodeGenerator, e: &mut Emit, expr: &Expr) -> Result<Operand> {
    match &expr.kind {
        ExprKind::Ident(_) => match cg.resolution.binding(expr.id).cloned() {
            Some(Binding::Local(sym)) => {
                let addr = *e
                    .locals
                    .get(&sym)
                    .ok_or_else(|| internal(expr.span, "local without a stack cell"))?;
                Ok(Operand::Temp(addr))
            }
            Some(Binding::Field { class, field }) => {
                let this = e
                    .this_temp
                    .ok_or_else(|| internal(expr.span, "field access without a receiver"))?;
                let dst = e.new_temp();
                e.push(Instr::FieldAddr {
                    dst,
                    obj: Operand::Temp(this),
                    class,
                    field,
                });
                Ok(Operand::Temp(dst))
            }
            _ => Err(internal(expr.span, "expression has no address")),
        },
        ExprKind::Member { object, member } => {
            let obj = lower_expr(cg, e, object)?;
            let class = expr_ty(cg, object)?
                .class_name()
                .ok_or_else(|| internal(expr.span, "member access on a non-class value"))?
                .to_string();
            let dst = e.new_temp();
            e.push(Instr::FieldAddr {
                dst,
                obj,
                class,
                field: member.clone(),
            });
            Ok(Operand::Temp(dst))
        }
        ExprKind::Unary {
            op: UnaryOp::Deref,
            operand,
        } => lower_expr(cg, e, operand),
        _ => Err(internal(expr.span, "expression has no address")),
    }
}

fn binding_address(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    binding: &Binding,
    span: Span,
) -> Result<Operand> {
    match binding {
        Binding::Local(sym) => {
            let addr = *e
                .locals
                .get(sym)
                .ok_or_else(|| internal(span, "d-string reference without a stack cell"))?;
            Ok(Operand::Temp(addr))
        }
        Binding::Field { class, field } => {
            let this = e
                .this_temp
                .ok_or_else(|| internal(span, "d-string field reference without a receiver"))?;
            let dst = e.new_temp();
            e.push(Instr::FieldAddr {
                dst,
                obj: Operand::Temp(this),
                class: class.clone(),
                field: field.clone(),
            });
            Ok(Operand::Temp(dst))
        }
        _ => Err(internal(span, "d-string reference has no storage")),
    }
}

/// A D-string flowing into a plain string slot is read (re-rendered if
/// stale) at that point.
pub(crate) fn coerce(e: &mut Emit, op: Operand, from: &Type, to: &Type) -> Operand {
    if *from == Type::DStr && *to == Type::Str {
        let dst = e.new_temp();
        e.push(Instr::DStrRead { dst, dstr: op });
        return Operand::Temp(dst);
    }
    op
}

pub(crate) fn expr_ty<'t>(cg: &CodeGenerator<'t>, expr: &Expr) -> Result<&'t Type> {
    cg.types
        .type_of(expr.id)
        .ok_or_else(|| internal(expr.span, "expression was not typed"))
}

// ============================================================================
// Overload re-resolution
// ============================================================================

fn pick_method(
    registry: &Registry,
    class: &str,
    name: &str,
    args: &[Type],
    want_static: bool,
) -> Option<MethodInfo> {
    let info = registry.class(class)?;
    let candidates: Vec<&MethodInfo> = info
        .methods
        .iter()
        .filter(|m| m.name == name && m.is_static == want_static)
        .collect();
    pick_signature(registry, &candidates, args, |m| &m.params).cloned()
}

fn pick_function(registry: &Registry, name: &str, args: &[Type]) -> Option<FunctionInfo> {
    let functions = registry.functions(name);
    let candidates: Vec<&FunctionInfo> = functions.iter().collect();
    pick_signature(registry, &candidates, args, |f| &f.params).cloned()
}

fn pick_interface_slot(
    registry: &Registry,
    iface: &crate::registry::InterfaceInfo,
    name: &str,
    args: &[Type],
) -> Option<usize> {
    let viable: Vec<usize> = iface
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| {
            m.name == name
                && m.params.len() == args.len()
                && m.params
                    .iter()
                    .zip(args)
                    .all(|(p, a)| registry.assignable(p, a))
        })
        .map(|(i, _)| i)
        .collect();
    viable
        .iter()
        .find(|&&i| iface.methods[i].params.as_slice() == args)
        .copied()
        .or_else(|| viable.first().copied())
}

fn pick_signature<'m, T>(
    registry: &Registry,
    candidates: &[&'m T],
    args: &[Type],
    params_of: impl Fn(&T) -> &Vec<Type>,
) -> Option<&'m T> {
    let viable: Vec<&&T> = candidates
        .iter()
        .filter(|c| {
            let params = params_of(c);
            params.len() == args.len()
                && params
                    .iter()
                    .zip(args)
                    .all(|(p, a)| registry.assignable(p, a))
        })
        .collect();
    viable
        .iter()
        .find(|c| params_of(c).as_slice() == args)
        .map(|c| **c)
        .or_else(|| viable.first().map(|c| **c))
}
