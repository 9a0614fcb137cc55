//! Diagnostic-focused scenarios: accumulation, severities, and the
//! validator errors that block emission.

mod common;

use common::*;
use sinter::ast::{AnnotationFlags, BinaryOp, Expr, Ident, Item, Lit, Program};
use sinter::core::{Severity, Visibility};

#[test]
fn a_stage_accumulates_every_diagnostic_it_can() {
    // Two independent type errors in one body: both must be reported.
    let body = vec![
        var("a", Some(named("int")), Some(strlit("nope"))),
        var(
            "b",
            Some(named("boolean")),
            Some(Expr::binary(
                BinaryOp::Add,
                int(1),
                Expr::literal(Lit::Double(2.0), sp()),
                sp(),
            )),
        ),
    ];
    let diags = compile_err(vec![Item::Function(func("f", vec![], named("void"), body))]);
    assert!(diags.error_count() >= 2, "{diags}");
}

#[test]
fn warnings_do_not_block_emission() {
    // derived + read_only is redundant: warning-severity only.
    let mut sensor = class("Sensor");
    sensor.fields.push(annotated_field(
        Visibility::Public,
        "status",
        named("str"),
        AnnotationFlags::DERIVED | AnnotationFlags::READ_ONLY,
    ));
    sensor.methods.push(func(
        "status",
        vec![],
        named("str"),
        vec![ret(Some(strlit("ok")))],
    ));
    let output = sinter::compile(&Program::new(vec![Item::Class(sensor)]));
    assert!(output.is_success(), "{}", output.diagnostics);
    assert!(output.module.is_some());
    assert!(output.diagnostics.warning_count() >= 1);
    assert!(
        output
            .diagnostics
            .warnings()
            .all(|d| d.severity == Severity::Warning)
    );
}

#[test]
fn conflicting_annotation_flags_are_one_combined_error() {
    let mut holder = class("Holder");
    holder.fields.push(annotated_field(
        Visibility::Public,
        "secret",
        named("str"),
        AnnotationFlags::READ_ONLY | AnnotationFlags::WRITE_ONLY,
    ));
    let diags = compile_err(vec![Item::Class(holder)]);
    let text = format!("{diags}");
    assert_eq!(diags.error_count(), 1, "one combined error, not a cascade: {text}");
    assert!(text.contains("read_only with write_only"), "{text}");
}

#[test]
fn read_only_field_with_user_defined_setter_is_rejected() {
    let mut holder = class("Holder");
    holder.fields.push(annotated_field(
        Visibility::Public,
        "limit",
        named("int"),
        AnnotationFlags::READ_ONLY,
    ));
    holder.methods.push(func(
        "setLimit",
        vec![param("value", named("int"))],
        named("void"),
        vec![assign(ident("limit"), ident("value"))],
    ));
    let diags = compile_err(vec![Item::Class(holder)]);
    assert!(
        format!("{diags}").contains("is read_only but class defines 'setLimit'"),
        "{diags}"
    );
}

#[test]
fn serializable_fields_must_be_public() {
    let mut holder = class("Holder");
    holder.fields.push(annotated_field(
        Visibility::Private,
        "token",
        named("str"),
        AnnotationFlags::SERIALIZABLE,
    ));
    let diags = compile_err(vec![Item::Class(holder)]);
    assert!(
        format!("{diags}").contains("cannot be serializable because it is not public"),
        "{diags}"
    );
}

#[test]
fn leak_on_an_early_return_path_blocks_emission() {
    let mut res = class("Res");
    res.fields.push(int_field("v", 0));
    // if (flag) { return; }  <- leaks p
    // p.clean();
    let body = vec![
        var("p", Some(ptr("Res")), Some(alloc("Res"))),
        if_else(ident("flag"), vec![ret(None)], None),
        cleanup("p", "clean"),
    ];
    let f = func(
        "work",
        vec![param("flag", named("boolean"))],
        named("void"),
        body,
    );
    let diags = compile_err(vec![Item::Class(res), Item::Function(f)]);
    let text = format!("{diags}");
    assert!(text.contains("not released on every path"), "{text}");
    assert!(text.contains("p.release() or p.clean()"), "{text}");
}

#[test]
fn one_error_per_allocation_site() {
    let mut res = class("Res");
    res.fields.push(int_field("v", 0));
    // Two exits miss the cleanup, one allocation site: exactly one error.
    let body = vec![
        var("p", Some(ptr("Res")), Some(alloc("Res"))),
        if_else(ident("flag"), vec![ret(None)], Some(vec![ret(None)])),
    ];
    let f = func(
        "work",
        vec![param("flag", named("boolean"))],
        named("void"),
        body,
    );
    let diags = compile_err(vec![Item::Class(res), Item::Function(f)]);
    assert_eq!(diags.error_count(), 1, "{diags}");
}

#[test]
fn double_release_blocks_emission() {
    let mut res = class("Res");
    res.fields.push(int_field("v", 0));
    let body = vec![
        var("p", Some(ptr("Res")), Some(alloc("Res"))),
        cleanup("p", "release"),
        cleanup("p", "clean"),
    ];
    let diags = compile_err(vec![
        Item::Class(res),
        Item::Function(func("work", vec![], named("void"), body)),
    ]);
    assert!(format!("{diags}").contains("released twice"), "{diags}");
}

#[test]
fn use_after_release_blocks_emission() {
    let mut res = class("Res");
    res.fields.push(int_field("v", 0));
    let body = vec![
        var("p", Some(ptr("Res")), Some(alloc("Res"))),
        cleanup("p", "clean"),
        var("v", Some(named("int")), Some(mcall("p", "getV", vec![]))),
    ];
    let diags = compile_err(vec![
        Item::Class(res),
        Item::Function(func("work", vec![], named("void"), body)),
    ]);
    assert!(format!("{diags}").contains("used after release"), "{diags}");
}

#[test]
fn well_typed_program_without_allocations_has_no_cleanup_errors() {
    let body = vec![
        var("x", Some(named("int")), Some(int(1))),
        ret(Some(Expr::binary(BinaryOp::Add, ident("x"), int(1), sp()))),
    ];
    let output = sinter::compile(&Program::new(vec![Item::Function(func(
        "f",
        vec![],
        named("int"),
        body,
    ))]));
    assert!(output.is_success(), "{}", output.diagnostics);
}

#[test]
fn unresolved_reference_stops_the_pipeline() {
    let body = vec![expr_stmt(ident("ghost"))];
    let output = sinter::compile(&Program::new(vec![Item::Function(func(
        "f",
        vec![],
        named("void"),
        body,
    ))]));
    assert!(!output.is_success());
    assert!(output.module.is_none());
    assert!(
        format!("{}", output.diagnostics).contains("unresolved reference 'ghost'"),
        "{}",
        output.diagnostics
    );
}

#[test]
fn cyclic_inheritance_blocks_emission() {
    let mut a = class("A");
    a.extends = Some(Ident::new("B", sp()));
    let mut b = class("B");
    b.extends = Some(Ident::new("A", sp()));
    let diags = compile_err(vec![Item::Class(a), Item::Class(b)]);
    assert!(format!("{diags}").contains("cyclic inheritance"), "{diags}");
}

#[test]
fn ambiguous_overload_is_reported() {
    use sinter::ast::{InterfaceDecl, MethodSig};

    let marker = InterfaceDecl {
        name: Ident::new("Marker", sp()),
        methods: vec![MethodSig {
            name: "tag".into(),
            params: vec![],
            ret: named("int"),
            span: sp(),
        }],
        span: sp(),
    };
    let base = class("Base");
    let mut derived = class("Derived");
    derived.extends = Some(Ident::new("Base", sp()));
    derived.implements.push(Ident::new("Marker", sp()));
    derived.methods.push(func(
        "tag",
        vec![],
        named("int"),
        vec![ret(Some(int(1)))],
    ));
    // Both overloads accept a Derived*; neither is an exact match.
    let take_base = func("take", vec![param("x", ptr("Base"))], named("void"), vec![]);
    let take_marker = func("take", vec![param("x", ptr("Marker"))], named("void"), vec![]);
    let main = func(
        "main",
        vec![],
        named("void"),
        vec![
            var("d", Some(ptr("Derived")), Some(alloc("Derived"))),
            expr_stmt(fcall("take", vec![ident("d")])),
            cleanup("d", "clean"),
        ],
    );
    let diags = compile_err(vec![
        Item::Interface(marker),
        Item::Class(base),
        Item::Class(derived),
        Item::Function(take_base),
        Item::Function(take_marker),
        Item::Function(main),
    ]);
    assert!(format!("{diags}").contains("ambiguous call to 'take'"), "{diags}");
}
