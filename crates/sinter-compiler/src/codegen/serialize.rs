//! Generated serialization routines.
//!
//! `as_json`/`as_xml` walk the class's serialization plan in declared field
//! order, emitting one `"name": value` / `<name>value</name>` pair per entry
//! and recursing into class-typed fields. `from_json`/`from_xml` parse the
//! input, allocate a fresh instance and populate each recognized stored
//! field; unknown keys are ignored by the runtime helpers and a missing
//! required field is a runtime deserialization error.

use crate::annotations::{SerialField, SerializationPlan};
use crate::ir::{Constant, Instr, IrCmpOp, IrType, Operand, TempId, Terminator};
use crate::registry::{ClassInfo, Type};

use super::{CodeGenerator, Emit, Result, internal};

pub(crate) fn gen_serialization(cg: &mut CodeGenerator, info: &ClassInfo) -> Result<()> {
    let plan = cg
        .annotations
        .plan(&info.name)
        .cloned()
        .unwrap_or_default();
    gen_as_json(cg, info, &plan)?;
    gen_as_xml(cg, info, &plan)?;
    gen_from(cg, info, &plan, "rt.json", "__from_json_doc", "from_json")?;
    gen_from(cg, info, &plan, "rt.xml", "__from_xml_doc", "from_xml")?;
    Ok(())
}

// ============================================================================
// Emission side
// ============================================================================

fn gen_as_json(cg: &mut CodeGenerator, info: &ClassInfo, plan: &SerializationPlan) -> Result<()> {
    let class = info.name.clone();
    let mut e = Emit::new(format!("{class}.as_json"), IrType::Str, 1);
    e.params.push(crate::ir::IrParam {
        name: "this".into(),
        ty: IrType::Ptr(class.clone()),
    });
    e.this_temp = Some(TempId(0));

    let begin = e.new_temp();
    e.push(Instr::Call {
        dst: Some(begin),
        callee: "rt.json.begin".into(),
        args: Vec::new(),
    });
    let mut buf = Operand::Temp(begin);
    for (i, field) in plan.fields.iter().enumerate() {
        let value = field_value(cg, &mut e, &class, field)?;
        let rendered = render_value(cg, &mut e, value, &field.ty, "rt.json", "as_json")?;
        let name = Operand::Const(Constant::Str(cg.module.pool.intern_str(&field.name)));
        let next = e.new_temp();
        e.push(Instr::Call {
            dst: Some(next),
            callee: "rt.json.field".into(),
            args: vec![
                buf,
                name,
                rendered,
                Operand::Const(Constant::Bool(i == 0)),
            ],
        });
        buf = Operand::Temp(next);
    }
    let done = e.new_temp();
    e.push(Instr::Call {
        dst: Some(done),
        callee: "rt.json.end".into(),
        args: vec![buf],
    });
    e.terminate(Terminator::Ret(Some(Operand::Temp(done))));
    cg.module.functions.push(e.finish());
    Ok(())
}

fn gen_as_xml(cg: &mut CodeGenerator, info: &ClassInfo, plan: &SerializationPlan) -> Result<()> {
    let class = info.name.clone();
    let mut e = Emit::new(format!("{class}.as_xml"), IrType::Str, 1);
    e.params.push(crate::ir::IrParam {
        name: "this".into(),
        ty: IrType::Ptr(class.clone()),
    });
    e.this_temp = Some(TempId(0));

    let class_const = Operand::Const(Constant::Str(cg.module.pool.intern_str(&class)));
    let begin = e.new_temp();
    e.push(Instr::Call {
        dst: Some(begin),
        callee: "rt.xml.begin".into(),
        args: vec![class_const],
    });
    let mut buf = Operand::Temp(begin);
    for field in &plan.fields {
        let value = field_value(cg, &mut e, &class, field)?;
        let rendered = render_value(cg, &mut e, value, &field.ty, "rt.xml", "as_xml")?;
        let name = Operand::Const(Constant::Str(cg.module.pool.intern_str(&field.name)));
        let next = e.new_temp();
        e.push(Instr::Call {
            dst: Some(next),
            callee: "rt.xml.element".into(),
            args: vec![buf, name, rendered],
        });
        buf = Operand::Temp(next);
    }
    let done = e.new_temp();
    e.push(Instr::Call {
        dst: Some(done),
        callee: "rt.xml.end".into(),
        args: vec![buf, class_const],
    });
    e.terminate(Terminator::Ret(Some(Operand::Temp(done))));
    cg.module.functions.push(e.finish());
    Ok(())
}

/// Load a plan entry's value: a stored slot, or the derived method's result.
fn field_value(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    class: &str,
    field: &SerialField,
) -> Result<Operand> {
    if field.derived {
        let callee = cg
            .derived_method_symbol(class, &field.name)
            .ok_or_else(|| internal(Default::default(), "derived field without its method"))?;
        let dst = e.new_temp();
        e.push(Instr::Call {
            dst: Some(dst),
            callee,
            args: vec![Operand::Temp(TempId(0))],
        });
        return Ok(Operand::Temp(dst));
    }
    let addr = e.new_temp();
    e.push(Instr::FieldAddr {
        dst: addr,
        obj: Operand::Temp(TempId(0)),
        class: class.to_string(),
        field: field.name.clone(),
    });
    let dst = e.new_temp();
    e.push(Instr::Load {
        dst,
        ty: cg.ir_type(&field.ty),
        addr: Operand::Temp(addr),
    });
    Ok(Operand::Temp(dst))
}

/// Render one value to its serialized text, recursing into class fields
/// (with a null check) via the nested class's own routine.
fn render_value(
    cg: &mut CodeGenerator,
    e: &mut Emit,
    value: Operand,
    ty: &Type,
    prefix: &str,
    recurse: &str,
) -> Result<Operand> {
    let simple = |name: &str| format!("{prefix}.{name}");
    let callee = match ty {
        Type::Int => simple("int"),
        Type::Float => simple("float"),
        Type::Double => simple("double"),
        Type::Boolean => simple("bool"),
        Type::Str => simple("str"),
        Type::DStr => {
            let read = e.new_temp();
            e.push(Instr::DStrRead { dst: read, dstr: value });
            let dst = e.new_temp();
            e.push(Instr::Call {
                dst: Some(dst),
                callee: simple("str"),
                args: vec![Operand::Temp(read)],
            });
            return Ok(Operand::Temp(dst));
        }
        Type::Class(_) | Type::Interface(_) | Type::Pointer(_) => {
            let nested = ty
                .class_name()
                .ok_or_else(|| internal(Default::default(), "cannot serialize this type"))?
                .to_string();
            // Null references serialize as null.
            let cell = e.new_temp();
            e.push(Instr::Alloca {
                dst: cell,
                ty: IrType::Str,
            });
            let is_null = e.new_temp();
            e.push(Instr::Compare {
                dst: is_null,
                op: IrCmpOp::Eq,
                lhs: value,
                rhs: Operand::Const(Constant::Null),
            });
            let null_label = e.new_label("ser.null");
            let obj_label = e.new_label("ser.obj");
            let join_label = e.new_label("ser.join");
            e.terminate(Terminator::Branch {
                cond: Operand::Temp(is_null),
                then_label: null_label.clone(),
                else_label: obj_label.clone(),
            });
            e.start_block(null_label);
            let null_text = e.new_temp();
            e.push(Instr::Call {
                dst: Some(null_text),
                callee: simple("null"),
                args: Vec::new(),
            });
            e.push(Instr::Store {
                addr: Operand::Temp(cell),
                value: Operand::Temp(null_text),
            });
            e.terminate(Terminator::Jump(join_label.clone()));
            e.start_block(obj_label);
            let obj_text = e.new_temp();
            e.push(Instr::Call {
                dst: Some(obj_text),
                callee: format!("{nested}.{recurse}"),
                args: vec![value],
            });
            e.push(Instr::Store {
                addr: Operand::Temp(cell),
                value: Operand::Temp(obj_text),
            });
            e.terminate(Terminator::Jump(join_label.clone()));
            e.start_block(join_label);
            let dst = e.new_temp();
            e.push(Instr::Load {
                dst,
                ty: IrType::Str,
                addr: Operand::Temp(cell),
            });
            return Ok(Operand::Temp(dst));
        }
        other => {
            return Err(internal(
                Default::default(),
                format!("cannot serialize a {other} value"),
            ));
        }
    };
    let dst = e.new_temp();
    e.push(Instr::Call {
        dst: Some(dst),
        callee,
        args: vec![value],
    });
    Ok(Operand::Temp(dst))
}

// ============================================================================
// Parsing side
// ============================================================================

fn gen_from(
    cg: &mut CodeGenerator,
    info: &ClassInfo,
    plan: &SerializationPlan,
    prefix: &str,
    doc_suffix: &str,
    entry_name: &str,
) -> Result<()> {
    let class = info.name.clone();

    // Entry point: parse the text, then populate from the document.
    let mut e = Emit::new(
        format!("{class}.{entry_name}"),
        IrType::Ptr(class.clone()),
        1,
    );
    e.params.push(crate::ir::IrParam {
        name: "input".into(),
        ty: IrType::Str,
    });
    let doc = e.new_temp();
    e.push(Instr::Call {
        dst: Some(doc),
        callee: format!("{prefix}.parse"),
        args: vec![Operand::Temp(TempId(0))],
    });
    let obj = e.new_temp();
    e.push(Instr::Call {
        dst: Some(obj),
        callee: format!("{class}.{doc_suffix}"),
        args: vec![Operand::Temp(doc)],
    });
    e.terminate(Terminator::Ret(Some(Operand::Temp(obj))));
    cg.module.functions.push(e.finish());

    // Document populator, shared by the entry point and nested fields.
    let mut e = Emit::new(format!("{class}.{doc_suffix}"), IrType::Ptr(class.clone()), 1);
    e.params.push(crate::ir::IrParam {
        name: "doc".into(),
        ty: IrType::Doc,
    });
    let obj = e.new_temp();
    e.push(Instr::Call {
        dst: Some(obj),
        callee: format!("{class}.new"),
        args: Vec::new(),
    });
    for field in plan.fields.iter().filter(|f| !f.derived) {
        let name = Operand::Const(Constant::Str(cg.module.pool.intern_str(&field.name)));
        let getter = match &field.ty {
            Type::Int => Some("get_int"),
            Type::Float => Some("get_float"),
            Type::Double => Some("get_double"),
            Type::Boolean => Some("get_bool"),
            Type::Str => Some("get_str"),
            // A d-string's variable references cannot be reconstructed from
            // serialized text; the field keeps its default.
            Type::DStr => None,
            _ => Some("get_doc"),
        };
        let Some(getter) = getter else { continue };
        let addr = e.new_temp();
        e.push(Instr::FieldAddr {
            dst: addr,
            obj: Operand::Temp(obj),
            class: class.clone(),
            field: field.name.clone(),
        });
        if getter == "get_doc" {
            let nested = field
                .ty
                .class_name()
                .ok_or_else(|| internal(Default::default(), "cannot deserialize this type"))?
                .to_string();
            let sub = e.new_temp();
            e.push(Instr::Call {
                dst: Some(sub),
                callee: format!("{prefix}.get_doc"),
                args: vec![Operand::Temp(TempId(0)), name],
            });
            let is_null = e.new_temp();
            e.push(Instr::Compare {
                dst: is_null,
                op: IrCmpOp::Eq,
                lhs: Operand::Temp(sub),
                rhs: Operand::Const(Constant::Null),
            });
            let null_label = e.new_label("de.null");
            let obj_label = e.new_label("de.obj");
            let join_label = e.new_label("de.join");
            e.terminate(Terminator::Branch {
                cond: Operand::Temp(is_null),
                then_label: null_label.clone(),
                else_label: obj_label.clone(),
            });
            e.start_block(null_label);
            e.push(Instr::Store {
                addr: Operand::Temp(addr),
                value: Operand::Const(Constant::Null),
            });
            e.terminate(Terminator::Jump(join_label.clone()));
            e.start_block(obj_label);
            let nested_obj = e.new_temp();
            e.push(Instr::Call {
                dst: Some(nested_obj),
                callee: format!("{nested}.{doc_suffix}"),
                args: vec![Operand::Temp(sub)],
            });
            e.push(Instr::Store {
                addr: Operand::Temp(addr),
                value: Operand::Temp(nested_obj),
            });
            e.terminate(Terminator::Jump(join_label.clone()));
            e.start_block(join_label);
        } else {
            let value = e.new_temp();
            e.push(Instr::Call {
                dst: Some(value),
                callee: format!("{prefix}.{getter}"),
                args: vec![Operand::Temp(TempId(0)), name],
            });
            e.push(Instr::Store {
                addr: Operand::Temp(addr),
                value: Operand::Temp(value),
            });
        }
    }
    e.terminate(Terminator::Ret(Some(Operand::Temp(obj))));
    cg.module.functions.push(e.finish());
    Ok(())
}
