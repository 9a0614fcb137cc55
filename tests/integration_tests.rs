//! End-to-end scenarios: compile a source tree and run the emitted module
//! under the reference evaluator.

mod common;

use common::*;
use sinter::ast::{AnnotationFlags, BinaryOp, Expr, Item};
use sinter::core::Visibility;
use sinter::runtime::{Machine, Value};

/// The iterative Fibonacci class from the language's benchmark suite.
fn fibonacci_class() -> Item {
    let mut fib = class("Fibonacci");
    fib.fields.push(int_field("n", 0));
    fib.fields.push(int_field("result", 0));

    fib.methods.push(func(
        "setN",
        vec![param("value", named("int"))],
        named("void"),
        vec![assign(ident("n"), ident("value"))],
    ));

    // if (n < 2) { result = n; return n; }
    // var a = 0; var b = 1;
    // for (var i = 2; i <= n; i = i + 1) { var temp = a + b; a = b; b = temp; }
    // result = b; return b;
    let body = vec![
        if_else(
            Expr::binary(BinaryOp::Lt, ident("n"), int(2), sp()),
            vec![assign(ident("result"), ident("n")), ret(Some(ident("n")))],
            None,
        ),
        var("a", Some(named("int")), Some(int(0))),
        var("b", Some(named("int")), Some(int(1))),
        for_loop(
            var("i", Some(named("int")), Some(int(2))),
            Expr::binary(BinaryOp::Le, ident("i"), ident("n"), sp()),
            assign(ident("i"), Expr::binary(BinaryOp::Add, ident("i"), int(1), sp())),
            vec![
                var(
                    "temp",
                    Some(named("int")),
                    Some(Expr::binary(BinaryOp::Add, ident("a"), ident("b"), sp())),
                ),
                assign(ident("a"), ident("b")),
                assign(ident("b"), ident("temp")),
            ],
        ),
        assign(ident("result"), ident("b")),
        ret(Some(ident("b"))),
    ];
    fib.methods.push(func("calculate", vec![], named("int"), body));
    Item::Class(fib)
}

#[test]
fn fibonacci_10_is_55() {
    let module = compile_ok(vec![fibonacci_class()]);
    let mut machine = Machine::new(&module);
    let obj = machine.call("Fibonacci.new", vec![]).unwrap();
    machine
        .call("Fibonacci.setN", vec![obj.clone(), Value::Int(10)])
        .unwrap();
    let result = machine.call("Fibonacci.calculate", vec![obj]).unwrap();
    assert_eq!(result, Value::Int(55));
}

#[test]
fn fibonacci_40_completes_under_wrapping_i32() {
    let module = compile_ok(vec![fibonacci_class()]);
    let mut machine = Machine::new(&module);
    let obj = machine.call("Fibonacci.new", vec![]).unwrap();
    machine
        .call("Fibonacci.setN", vec![obj.clone(), Value::Int(40)])
        .unwrap();
    let result = machine
        .call("Fibonacci.calculate", vec![obj.clone()])
        .unwrap();
    assert_eq!(result, Value::Int(102_334_155));
    assert_eq!(
        machine.field_value(&obj, "result").unwrap(),
        Value::Int(102_334_155)
    );
}

#[test]
fn counter_loop_with_cleanup() {
    let mut counter = class("Counter");
    counter.fields.push(int_field("count", 0));
    counter.fields.push(int_field("limit", 0));
    counter.methods.push(func(
        "run",
        vec![],
        named("int"),
        vec![
            for_loop(
                var("i", Some(named("int")), Some(int(0))),
                Expr::binary(BinaryOp::Lt, ident("i"), ident("limit"), sp()),
                assign(ident("i"), Expr::binary(BinaryOp::Add, ident("i"), int(1), sp())),
                vec![assign(
                    ident("count"),
                    Expr::binary(BinaryOp::Add, ident("count"), int(1), sp()),
                )],
            ),
            ret(Some(ident("count"))),
        ],
    ));
    // function main() -> int {
    //   var counter: Counter* = Counter.new();
    //   counter.setLimit(100);
    //   var result: int = counter.run();
    //   counter.clean();
    //   return result;
    // }
    let main = func(
        "main",
        vec![],
        named("int"),
        vec![
            var("counter", Some(ptr("Counter")), Some(alloc("Counter"))),
            expr_stmt(mcall("counter", "setLimit", vec![int(100)])),
            var("result", Some(named("int")), Some(mcall("counter", "run", vec![]))),
            cleanup("counter", "clean"),
            ret(Some(ident("result"))),
        ],
    );
    let module = compile_ok(vec![Item::Class(counter), Item::Function(main)]);
    let mut machine = Machine::new(&module);
    assert_eq!(machine.call("main", vec![]).unwrap(), Value::Int(100));
}

#[test]
fn dstring_liveness_and_idempotence() {
    // var count: int = 0;
    // var msg = D"The count is: {count}";
    // println(msg); count = 5; println(msg); println(msg);
    // count = 42; println(msg);
    let track = func(
        "track",
        vec![],
        named("void"),
        vec![
            var("count", Some(named("int")), Some(int(0))),
            var("msg", None, Some(dstr("The count is: {count}"))),
            println(vec![ident("msg")]),
            assign(ident("count"), int(5)),
            println(vec![ident("msg")]),
            println(vec![ident("msg")]),
            assign(ident("count"), int(42)),
            println(vec![ident("msg")]),
        ],
    );
    let module = compile_ok(vec![Item::Function(track)]);
    let mut machine = Machine::new(&module);
    machine.call("track", vec![]).unwrap();
    assert_eq!(
        machine.output,
        "The count is: 0\nThe count is: 5\nThe count is: 5\nThe count is: 42\n"
    );
    // Four reads, but the repeated read reused the cache.
    assert_eq!(machine.total_renders(), 3);
}

fn point_class() -> Item {
    let mut point = class("Point");
    point.fields.push(annotated_field(
        Visibility::Public,
        "x",
        named("int"),
        AnnotationFlags::SERIALIZABLE,
    ));
    point.fields.push(annotated_field(
        Visibility::Public,
        "y",
        named("int"),
        AnnotationFlags::SERIALIZABLE,
    ));
    Item::Class(point)
}

#[test]
fn json_round_trip_preserves_serializable_fields() {
    let module = compile_ok(vec![point_class()]);
    let mut machine = Machine::new(&module);
    let obj = machine.call("Point.new", vec![]).unwrap();
    machine
        .call("Point.setX", vec![obj.clone(), Value::Int(5)])
        .unwrap();
    machine
        .call("Point.setY", vec![obj.clone(), Value::Int(7)])
        .unwrap();

    let json = machine.call("Point.as_json", vec![obj]).unwrap();
    assert_eq!(json, Value::Str("{\"x\": 5, \"y\": 7}".into()));

    let rebuilt = machine.call("Point.from_json", vec![json]).unwrap();
    assert_eq!(machine.field_value(&rebuilt, "x").unwrap(), Value::Int(5));
    assert_eq!(machine.field_value(&rebuilt, "y").unwrap(), Value::Int(7));
}

#[test]
fn xml_round_trip_preserves_serializable_fields() {
    let module = compile_ok(vec![point_class()]);
    let mut machine = Machine::new(&module);
    let obj = machine.call("Point.new", vec![]).unwrap();
    machine
        .call("Point.setX", vec![obj.clone(), Value::Int(3)])
        .unwrap();
    machine
        .call("Point.setY", vec![obj.clone(), Value::Int(9)])
        .unwrap();

    let xml = machine.call("Point.as_xml", vec![obj]).unwrap();
    assert_eq!(
        xml,
        Value::Str("<Point><x>3</x><y>9</y></Point>".into())
    );

    let rebuilt = machine.call("Point.from_xml", vec![xml]).unwrap();
    assert_eq!(machine.field_value(&rebuilt, "x").unwrap(), Value::Int(3));
    assert_eq!(machine.field_value(&rebuilt, "y").unwrap(), Value::Int(9));
}

#[test]
fn unknown_json_keys_are_ignored_and_missing_fields_trap() {
    let module = compile_ok(vec![point_class()]);
    let mut machine = Machine::new(&module);

    let rebuilt = machine
        .call(
            "Point.from_json",
            vec![Value::Str("{\"x\": 1, \"y\": 2, \"mystery\": true}".into())],
        )
        .unwrap();
    assert_eq!(machine.field_value(&rebuilt, "x").unwrap(), Value::Int(1));

    let missing = machine.call("Point.from_json", vec![Value::Str("{\"x\": 1}".into())]);
    assert!(missing.is_err(), "missing required field must trap");
}

fn sensor_class() -> Item {
    let mut sensor = class("Sensor");
    sensor.fields.push(annotated_field(
        Visibility::Public,
        "temperature",
        named("double"),
        AnnotationFlags::SERIALIZABLE,
    ));
    sensor.fields.push(annotated_field(
        Visibility::Public,
        "status",
        named("str"),
        AnnotationFlags::DERIVED | AnnotationFlags::SERIALIZABLE,
    ));
    // method status() -> str { if (temperature > 100.0) { return "HOT"; } return "NORMAL"; }
    sensor.methods.push(func(
        "status",
        vec![],
        named("str"),
        vec![
            if_else(
                Expr::binary(BinaryOp::Gt, ident("temperature"), dbl(100.0), sp()),
                vec![ret(Some(strlit("HOT")))],
                None,
            ),
            ret(Some(strlit("NORMAL"))),
        ],
    ));
    Item::Class(sensor)
}

#[test]
fn derived_field_reads_route_through_the_method() {
    let mut item = sensor_class();
    // method report() -> str { return status; }
    if let Item::Class(sensor) = &mut item {
        sensor.methods.push(func(
            "report",
            vec![],
            named("str"),
            vec![ret(Some(ident("status")))],
        ));
    }
    let module = compile_ok(vec![item]);
    let mut machine = Machine::new(&module);
    let obj = machine.call("Sensor.new", vec![]).unwrap();
    assert_eq!(
        machine.call("Sensor.report", vec![obj.clone()]).unwrap(),
        Value::Str("NORMAL".into())
    );
    machine
        .call(
            "Sensor.setTemperature",
            vec![obj.clone(), Value::Double(150.0)],
        )
        .unwrap();
    // No stored slot: the read reflects the method's current result.
    assert_eq!(
        machine.call("Sensor.report", vec![obj]).unwrap(),
        Value::Str("HOT".into())
    );
}

#[test]
fn derived_serializable_field_uses_the_method_result() {
    let module = compile_ok(vec![sensor_class()]);
    let mut machine = Machine::new(&module);
    let obj = machine.call("Sensor.new", vec![]).unwrap();
    machine
        .call(
            "Sensor.setTemperature",
            vec![obj.clone(), Value::Double(150.0)],
        )
        .unwrap();
    let json = machine.call("Sensor.as_json", vec![obj]).unwrap();
    assert_eq!(
        json,
        Value::Str("{\"temperature\": 150, \"status\": \"HOT\"}".into())
    );
}

#[test]
fn derived_field_without_its_method_is_rejected() {
    let mut sensor = class("Sensor");
    sensor.fields.push(annotated_field(
        Visibility::Public,
        "status",
        named("str"),
        AnnotationFlags::DERIVED,
    ));
    let diags = compile_err(vec![Item::Class(sensor)]);
    assert!(
        format!("{diags}").contains("defines no method 'status()'"),
        "{diags}"
    );
}

#[test]
fn interface_dispatch_goes_through_the_itable() {
    use sinter::ast::{InterfaceDecl, MethodSig};

    let shape = InterfaceDecl {
        name: sinter::ast::Ident::new("Shape", sp()),
        methods: vec![MethodSig {
            name: "area".into(),
            params: vec![],
            ret: named("int"),
            span: sp(),
        }],
        span: sp(),
    };
    let mut square = class("Square");
    square.implements.push(sinter::ast::Ident::new("Shape", sp()));
    square.fields.push(int_field("side", 0));
    square.methods.push(func(
        "area",
        vec![],
        named("int"),
        vec![ret(Some(Expr::binary(
            BinaryOp::Mul,
            ident("side"),
            ident("side"),
            sp(),
        )))],
    ));
    // function measure(s: Shape*) -> int { return s.area(); }
    let measure = func(
        "measure",
        vec![param("s", ptr("Shape"))],
        named("int"),
        vec![ret(Some(mcall("s", "area", vec![])))],
    );
    let main = func(
        "main",
        vec![],
        named("int"),
        vec![
            var("sq", Some(ptr("Square")), Some(alloc("Square"))),
            expr_stmt(mcall("sq", "setSide", vec![int(4)])),
            var("a", Some(named("int")), Some(fcall("measure", vec![ident("sq")]))),
            cleanup("sq", "clean"),
            ret(Some(ident("a"))),
        ],
    );
    let module = compile_ok(vec![
        Item::Interface(shape),
        Item::Class(square),
        Item::Function(measure),
        Item::Function(main),
    ]);
    // The layout carries the populated dispatch slot.
    let text = module.to_string();
    assert!(text.contains("itable 0 Shape"), "{text}");
    assert!(text.contains("slot 0 area -> Square.area"), "{text}");

    let mut machine = Machine::new(&module);
    assert_eq!(machine.call("main", vec![]).unwrap(), Value::Int(16));
}

#[test]
fn release_discharges_without_freeing_the_record() {
    let mut holder = class("Holder");
    holder
        .fields
        .push(field(Visibility::Public, "item", ptr("Counter")));
    let mut counter = class("Counter");
    counter.fields.push(int_field("count", 0));

    // function stash(h: Holder*) -> void {
    //   var c: Counter* = Counter.new();
    //   h.setItem(c);
    //   c.release();
    // }
    let stash = func(
        "stash",
        vec![param("h", ptr("Holder"))],
        named("void"),
        vec![
            var("c", Some(ptr("Counter")), Some(alloc("Counter"))),
            expr_stmt(mcall("h", "setItem", vec![ident("c")])),
            cleanup("c", "release"),
        ],
    );
    let module = compile_ok(vec![
        Item::Class(holder),
        Item::Class(counter),
        Item::Function(stash),
    ]);
    let mut machine = Machine::new(&module);
    let holder = machine.call("Holder.new", vec![]).unwrap();
    machine.call("stash", vec![holder.clone()]).unwrap();
    let item = machine.field_value(&holder, "item").unwrap();
    assert!(machine.is_live(&item), "release() must not free the record");
}

#[test]
fn clean_frees_the_record() {
    let mut holder = class("Holder");
    holder
        .fields
        .push(field(Visibility::Public, "item", ptr("Counter")));
    let mut counter = class("Counter");
    counter.fields.push(int_field("count", 0));

    let stash = func(
        "stash",
        vec![param("h", ptr("Holder"))],
        named("void"),
        vec![
            var("c", Some(ptr("Counter")), Some(alloc("Counter"))),
            expr_stmt(mcall("h", "setItem", vec![ident("c")])),
            cleanup("c", "clean"),
        ],
    );
    let module = compile_ok(vec![
        Item::Class(holder),
        Item::Class(counter),
        Item::Function(stash),
    ]);
    let mut machine = Machine::new(&module);
    let holder = machine.call("Holder.new", vec![]).unwrap();
    machine.call("stash", vec![holder.clone()]).unwrap();
    let item = machine.field_value(&holder, "item").unwrap();
    assert!(!machine.is_live(&item), "clean() must free the record");
}

#[test]
fn emitted_module_is_textual() {
    let module = compile_ok(vec![fibonacci_class()]);
    let text = module.to_string();
    assert!(text.starts_with("module sinter"), "{text}");
    assert!(text.contains("layout Fibonacci"), "{text}");
    assert!(text.contains("func Fibonacci.new() -> ptr.Fibonacci {"), "{text}");
    assert!(text.contains("func Fibonacci.calculate(this: ptr.Fibonacci) -> i32 {"), "{text}");
    // Synthesized accessors and serialization routines are part of the module.
    assert!(text.contains("func Fibonacci.getResult(this: ptr.Fibonacci) -> i32 {"), "{text}");
    assert!(text.contains("func Fibonacci.as_json(this: ptr.Fibonacci) -> str {"), "{text}");
}

#[test]
fn nested_class_serialization_recurses() {
    let mut inner = class("Inner");
    inner.fields.push(annotated_field(
        Visibility::Public,
        "value",
        named("int"),
        AnnotationFlags::SERIALIZABLE,
    ));
    let mut outer = class("Outer");
    outer.fields.push(annotated_field(
        Visibility::Public,
        "inner",
        ptr("Inner"),
        AnnotationFlags::SERIALIZABLE,
    ));
    let module = compile_ok(vec![Item::Class(inner), Item::Class(outer)]);
    let mut machine = Machine::new(&module);

    let inner_obj = machine.call("Inner.new", vec![]).unwrap();
    machine
        .call("Inner.setValue", vec![inner_obj.clone(), Value::Int(11)])
        .unwrap();
    let outer_obj = machine.call("Outer.new", vec![]).unwrap();
    machine
        .call("Outer.setInner", vec![outer_obj.clone(), inner_obj])
        .unwrap();

    let json = machine.call("Outer.as_json", vec![outer_obj.clone()]).unwrap();
    assert_eq!(json, Value::Str("{\"inner\": {\"value\": 11}}".into()));

    let rebuilt = machine.call("Outer.from_json", vec![json]).unwrap();
    let rebuilt_inner = machine.field_value(&rebuilt, "inner").unwrap();
    assert_eq!(
        machine.field_value(&rebuilt_inner, "value").unwrap(),
        Value::Int(11)
    );

    // A fresh Outer serializes its null reference as null.
    let fresh = machine.call("Outer.new", vec![]).unwrap();
    let json = machine.call("Outer.as_json", vec![fresh]).unwrap();
    assert_eq!(json, Value::Str("{\"inner\": null}".into()));
}
