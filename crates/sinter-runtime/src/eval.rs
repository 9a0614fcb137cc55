//! Reference evaluator for IR modules.
//!
//! Executes compiled modules directly: frames of virtual registers, a cell
//! store for `alloca` slots (stable addresses, so D-string references stay
//! valid), an object heap, interface-table dispatch via the module's
//! layouts, and the `rt.*` runtime intrinsics the generated serialization
//! routines call. It stands in for the external native backend in tests.
//!
//! `i32` arithmetic wraps on overflow, matching the IR's documented
//! semantics.

use rustc_hash::FxHashMap;
use sinter_compiler::ir::{
    Constant, Instr, IrBinOp, IrCmpOp, IrFunction, IrModule, IrSegment, Operand, Terminator,
};
use sinter_core::RuntimeError;

use crate::dstring::{DString, Piece};
use crate::serialize as ser;
use crate::value::{Address, Value, mismatch};

type RtResult<T> = Result<T, RuntimeError>;

const MAX_CALL_DEPTH: usize = 256;

/// A live object record.
#[derive(Debug)]
pub struct ObjInstance {
    pub class: String,
    pub fields: Vec<Value>,
}

/// A parsed serialization document.
#[derive(Debug)]
pub enum Doc {
    Json(serde_json::Value),
    Xml(ser::Xml),
}

/// The evaluator.
pub struct Machine<'m> {
    module: &'m IrModule,
    cells: Vec<Value>,
    objects: Vec<Option<ObjInstance>>,
    dstrings: Vec<DString>,
    docs: Vec<Doc>,
    depth: usize,
    /// Everything `print`/`println` produced.
    pub output: String,
}

impl<'m> Machine<'m> {
    pub fn new(module: &'m IrModule) -> Self {
        Self {
            module,
            cells: Vec::new(),
            objects: Vec::new(),
            dstrings: Vec::new(),
            docs: Vec::new(),
            depth: 0,
            output: String::new(),
        }
    }

    /// Call a function by its emitted symbol.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> RtResult<Value> {
        if let Some(intrinsic) = name.strip_prefix("rt.") {
            return self.intrinsic(intrinsic, args);
        }
        let func = self
            .module
            .function(name)
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
            })?;
        self.run_function(func, args)
    }

    /// Total re-renders across every D-string record.
    pub fn total_renders(&self) -> u32 {
        self.dstrings.iter().map(|d| d.renders()).sum()
    }

    /// Borrow a live object (test convenience).
    pub fn object(&self, value: &Value) -> RtResult<&ObjInstance> {
        match value {
            Value::Obj(index) => self
                .objects
                .get(*index)
                .and_then(|o| o.as_ref())
                .ok_or(RuntimeError::StaleObject { index: *index }),
            other => Err(mismatch("object", other)),
        }
    }

    /// Read a live object's field by name (test convenience).
    pub fn field_value(&self, obj: &Value, field: &str) -> RtResult<Value> {
        let inst = self.object(obj)?;
        let layout = self
            .module
            .layout(&inst.class)
            .ok_or_else(|| RuntimeError::Eval(format!("no layout for '{}'", inst.class)))?;
        let index = layout
            .field_index(field)
            .ok_or_else(|| RuntimeError::Eval(format!("no field '{field}'")))?;
        Ok(inst.fields[index].clone())
    }

    /// Whether an object handle still points at a live record.
    pub fn is_live(&self, value: &Value) -> bool {
        matches!(value, Value::Obj(index) if self.objects.get(*index).is_some_and(|o| o.is_some()))
    }

    // ==========================================================================
    // Execution
    // ==========================================================================

    fn run_function(&mut self, func: &'m IrFunction, args: Vec<Value>) -> RtResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::Eval("call depth exceeded".into()));
        }
        self.depth += 1;
        let result = self.run_blocks(func, args);
        self.depth -= 1;
        result
    }

    fn run_blocks(&mut self, func: &'m IrFunction, args: Vec<Value>) -> RtResult<Value> {
        let mut temps: FxHashMap<u32, Value> = FxHashMap::default();
        for (i, arg) in args.into_iter().enumerate() {
            temps.insert(i as u32, arg);
        }
        let mut block = func
            .blocks
            .first()
            .ok_or_else(|| RuntimeError::Eval(format!("'{}' has no body", func.name)))?;
        loop {
            for instr in &block.instrs {
                self.exec(instr, &mut temps)?;
            }
            match &block.term {
                Terminator::Jump(label) => block = find_block(func, label)?,
                Terminator::Branch {
                    cond,
                    then_label,
                    else_label,
                } => {
                    let taken = self.operand(cond, &temps)?.as_bool()?;
                    let label = if taken { then_label } else { else_label };
                    block = find_block(func, label)?;
                }
                Terminator::Ret(Some(op)) => return self.operand(op, &temps),
                Terminator::Ret(None) => return Ok(Value::Null),
                Terminator::Unreachable => {
                    return Err(RuntimeError::ReachedUnreachable {
                        function: func.name.clone(),
                    });
                }
            }
        }
    }

    fn exec(&mut self, instr: &Instr, temps: &mut FxHashMap<u32, Value>) -> RtResult<()> {
        match instr {
            Instr::Alloca { dst, .. } => {
                self.cells.push(Value::Null);
                temps.insert(dst.0, Value::Addr(Address::Cell(self.cells.len() - 1)));
            }
            Instr::Load { dst, addr, .. } => {
                let addr = self.operand(addr, temps)?.as_addr()?;
                let value = self.read_addr(addr)?;
                temps.insert(dst.0, value);
            }
            Instr::Store { addr, value } => {
                let addr = self.operand(addr, temps)?.as_addr()?;
                let value = self.operand(value, temps)?;
                self.write_addr(addr, value)?;
            }
            Instr::Binary {
                dst, op, lhs, rhs, ..
            } => {
                let lhs = self.operand(lhs, temps)?;
                let rhs = self.operand(rhs, temps)?;
                temps.insert(dst.0, binary(*op, &lhs, &rhs)?);
            }
            Instr::Compare { dst, op, lhs, rhs } => {
                let lhs = self.operand(lhs, temps)?;
                let rhs = self.operand(rhs, temps)?;
                temps.insert(dst.0, Value::Bool(compare(*op, &lhs, &rhs)?));
            }
            Instr::Not { dst, value } => {
                let value = self.operand(value, temps)?.as_bool()?;
                temps.insert(dst.0, Value::Bool(!value));
            }
            Instr::Neg { dst, value, .. } => {
                let value = self.operand(value, temps)?;
                let negated = match value {
                    Value::Int(v) => Value::Int(v.wrapping_neg()),
                    Value::Float(v) => Value::Float(-v),
                    Value::Double(v) => Value::Double(-v),
                    other => return Err(mismatch("numeric", &other)),
                };
                temps.insert(dst.0, negated);
            }
            Instr::AllocRecord { dst, class } => {
                let layout = self
                    .module
                    .layout(class)
                    .ok_or_else(|| RuntimeError::Eval(format!("no layout for '{class}'")))?;
                let fields = layout.fields.iter().map(|f| default_value(&f.ty)).collect();
                self.objects.push(Some(ObjInstance {
                    class: class.clone(),
                    fields,
                }));
                temps.insert(dst.0, Value::Obj(self.objects.len() - 1));
            }
            Instr::FreeRecord { obj, .. } => match self.operand(obj, temps)? {
                Value::Obj(index) => {
                    let slot = self
                        .objects
                        .get_mut(index)
                        .ok_or(RuntimeError::StaleObject { index })?;
                    if slot.is_none() {
                        return Err(RuntimeError::StaleObject { index });
                    }
                    *slot = None;
                }
                Value::Null => {}
                other => return Err(mismatch("object", &other)),
            },
            // Dispatch reads the layout's interface tables directly; the
            // populated slot is observable in the textual module instead.
            Instr::InitItable { .. } => {}
            Instr::FieldAddr {
                dst, obj, field, ..
            } => {
                let obj = self.operand(obj, temps)?;
                let index = match &obj {
                    Value::Obj(index) => *index,
                    other => return Err(mismatch("object", other)),
                };
                let inst = self
                    .objects
                    .get(index)
                    .and_then(|o| o.as_ref())
                    .ok_or(RuntimeError::StaleObject { index })?;
                let layout = self
                    .module
                    .layout(&inst.class)
                    .ok_or_else(|| RuntimeError::Eval(format!("no layout for '{}'", inst.class)))?;
                let field_index = layout
                    .field_index(field)
                    .ok_or_else(|| RuntimeError::Eval(format!("no field '{field}'")))?;
                temps.insert(dst.0, Value::Addr(Address::Field(index, field_index)));
            }
            Instr::Call { dst, callee, args } => {
                let args = args
                    .iter()
                    .map(|a| self.operand(a, temps))
                    .collect::<RtResult<Vec<_>>>()?;
                let result = self.call(callee, args)?;
                if let Some(dst) = dst {
                    temps.insert(dst.0, result);
                }
            }
            Instr::CallIface {
                dst,
                interface,
                slot,
                args,
                ..
            } => {
                let args = args
                    .iter()
                    .map(|a| self.operand(a, temps))
                    .collect::<RtResult<Vec<_>>>()?;
                let receiver = args
                    .first()
                    .ok_or_else(|| RuntimeError::Eval("interface call without receiver".into()))?;
                let class = self.object(receiver)?.class.clone();
                let layout = self
                    .module
                    .layout(&class)
                    .ok_or_else(|| RuntimeError::Eval(format!("no layout for '{class}'")))?;
                let symbol = layout
                    .itable(interface)
                    .and_then(|t| t.entries.get(*slot))
                    .map(|e| e.symbol.clone())
                    .ok_or_else(|| {
                        RuntimeError::Eval(format!(
                            "'{class}' has no slot {slot} for interface '{interface}'"
                        ))
                    })?;
                let result = self.call(&symbol, args)?;
                if let Some(dst) = dst {
                    temps.insert(dst.0, result);
                }
            }
            Instr::DStrNew {
                dst,
                descriptor,
                refs,
            } => {
                let desc = self
                    .module
                    .dstrings
                    .get(*descriptor)
                    .ok_or_else(|| RuntimeError::Eval("unknown d-string descriptor".into()))?;
                let pieces = desc
                    .segments
                    .iter()
                    .map(|s| match s {
                        IrSegment::Text(id) => Piece::Text(self.module.pool.strings[*id].clone()),
                        IrSegment::Slot(slot) => Piece::Slot(*slot),
                    })
                    .collect();
                let refs = refs
                    .iter()
                    .map(|r| self.operand(r, temps)?.as_addr())
                    .collect::<RtResult<Vec<_>>>()?;
                self.dstrings.push(DString::new(pieces, refs));
                temps.insert(dst.0, Value::DStr(self.dstrings.len() - 1));
            }
            Instr::DStrRead { dst, dstr } => {
                let text = match self.operand(dstr, temps)? {
                    Value::DStr(index) => self.dstr_read(index)?,
                    other => return Err(mismatch("d_str", &other)),
                };
                temps.insert(dst.0, Value::Str(text));
            }
            Instr::Print { args, newline } => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    let value = self.operand(arg, temps)?;
                    parts.push(self.render(&value)?);
                }
                self.output.push_str(&parts.join(" "));
                if *newline {
                    self.output.push('\n');
                }
            }
        }
        Ok(())
    }

    fn operand(&self, op: &Operand, temps: &FxHashMap<u32, Value>) -> RtResult<Value> {
        match op {
            Operand::Temp(t) => temps
                .get(&t.0)
                .cloned()
                .ok_or_else(|| RuntimeError::Eval(format!("undefined temp t{}", t.0))),
            Operand::Const(c) => Ok(match c {
                Constant::Int(v) => Value::Int(*v),
                Constant::Bool(v) => Value::Bool(*v),
                Constant::Null => Value::Null,
                Constant::F32(i) => Value::Float(self.module.pool.f32s[*i]),
                Constant::F64(i) => Value::Double(self.module.pool.f64s[*i]),
                Constant::Str(i) => Value::Str(self.module.pool.strings[*i].clone()),
            }),
        }
    }

    fn read_addr(&self, addr: Address) -> RtResult<Value> {
        match addr {
            Address::Cell(i) => self
                .cells
                .get(i)
                .cloned()
                .ok_or_else(|| RuntimeError::Eval("dangling cell address".into())),
            Address::Field(index, field) => {
                let inst = self
                    .objects
                    .get(index)
                    .and_then(|o| o.as_ref())
                    .ok_or(RuntimeError::StaleObject { index })?;
                inst.fields
                    .get(field)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Eval("dangling field address".into()))
            }
        }
    }

    fn write_addr(&mut self, addr: Address, value: Value) -> RtResult<()> {
        match addr {
            Address::Cell(i) => {
                let cell = self
                    .cells
                    .get_mut(i)
                    .ok_or_else(|| RuntimeError::Eval("dangling cell address".into()))?;
                *cell = value;
            }
            Address::Field(index, field) => {
                let inst = self
                    .objects
                    .get_mut(index)
                    .and_then(|o| o.as_mut())
                    .ok_or(RuntimeError::StaleObject { index })?;
                let slot = inst
                    .fields
                    .get_mut(field)
                    .ok_or_else(|| RuntimeError::Eval("dangling field address".into()))?;
                *slot = value;
            }
        }
        Ok(())
    }

    /// Re-evaluate (when stale) and return a D-string's text.
    fn dstr_read(&mut self, index: usize) -> RtResult<String> {
        let refs = self
            .dstrings
            .get(index)
            .ok_or_else(|| RuntimeError::Eval("dangling d-string handle".into()))?
            .refs()
            .to_vec();
        let mut current = Vec::with_capacity(refs.len());
        let mut rendered = Vec::with_capacity(refs.len());
        for addr in refs {
            let value = self.read_addr(addr)?;
            rendered.push(self.render(&value)?);
            current.push(value);
        }
        Ok(self.dstrings[index].read(current, &rendered))
    }

    /// Textual form of a value, reading through D-strings.
    fn render(&mut self, value: &Value) -> RtResult<String> {
        if let Some(text) = value.plain_text() {
            return Ok(text);
        }
        match value {
            Value::DStr(index) => self.dstr_read(*index),
            Value::Obj(index) => {
                let class = self
                    .objects
                    .get(*index)
                    .and_then(|o| o.as_ref())
                    .map(|o| o.class.clone())
                    .ok_or(RuntimeError::StaleObject { index: *index })?;
                Ok(format!("<{class}#{index}>"))
            }
            other => Err(mismatch("printable value", other)),
        }
    }

    // ==========================================================================
    // Runtime intrinsics
    // ==========================================================================

    fn intrinsic(&mut self, name: &str, args: Vec<Value>) -> RtResult<Value> {
        match name {
            "json.begin" => Ok(Value::Str("{".into())),
            "json.end" => Ok(Value::Str(format!("{}}}", arg(&args, 0)?.as_str()?))),
            "json.field" => {
                let buf = arg(&args, 0)?.as_str()?;
                let field = arg(&args, 1)?.as_str()?;
                let value = arg(&args, 2)?.as_str()?;
                let first = arg(&args, 3)?.as_bool()?;
                Ok(Value::Str(ser::json_field(buf, field, value, first)))
            }
            "json.int" | "json.float" | "json.double" | "json.bool" => {
                let value = arg(&args, 0)?;
                let text = value
                    .plain_text()
                    .ok_or_else(|| mismatch("primitive", value))?;
                Ok(Value::Str(text))
            }
            "json.str" => Ok(Value::Str(ser::json_str(arg(&args, 0)?.as_str()?))),
            "json.null" => Ok(Value::Str("null".into())),
            "json.parse" => {
                let doc = ser::parse_json(arg(&args, 0)?.as_str()?)?;
                self.docs.push(Doc::Json(doc));
                Ok(Value::Doc(self.docs.len() - 1))
            }
            "json.get_int" => {
                let value = self.json_field_value(&args)?;
                value
                    .as_i64()
                    .map(|v| Value::Int(v as i32))
                    .ok_or_else(|| json_mismatch("int", &value))
            }
            "json.get_float" => {
                let value = self.json_field_value(&args)?;
                value
                    .as_f64()
                    .map(|v| Value::Float(v as f32))
                    .ok_or_else(|| json_mismatch("float", &value))
            }
            "json.get_double" => {
                let value = self.json_field_value(&args)?;
                value
                    .as_f64()
                    .map(Value::Double)
                    .ok_or_else(|| json_mismatch("double", &value))
            }
            "json.get_bool" => {
                let value = self.json_field_value(&args)?;
                value
                    .as_bool()
                    .map(Value::Bool)
                    .ok_or_else(|| json_mismatch("boolean", &value))
            }
            "json.get_str" => {
                let value = self.json_field_value(&args)?;
                value
                    .as_str()
                    .map(|v| Value::Str(v.to_string()))
                    .ok_or_else(|| json_mismatch("str", &value))
            }
            "json.get_doc" => {
                let value = self.json_field_value(&args)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                self.docs.push(Doc::Json(value));
                Ok(Value::Doc(self.docs.len() - 1))
            }
            "xml.begin" => Ok(Value::Str(format!("<{}>", arg(&args, 0)?.as_str()?))),
            "xml.end" => Ok(Value::Str(format!(
                "{}</{}>",
                arg(&args, 0)?.as_str()?,
                arg(&args, 1)?.as_str()?
            ))),
            "xml.element" => Ok(Value::Str(format!(
                "{}<{1}>{2}</{1}>",
                arg(&args, 0)?.as_str()?,
                arg(&args, 1)?.as_str()?,
                arg(&args, 2)?.as_str()?
            ))),
            "xml.int" | "xml.float" | "xml.double" | "xml.bool" => {
                let value = arg(&args, 0)?;
                let text = value
                    .plain_text()
                    .ok_or_else(|| mismatch("primitive", value))?;
                Ok(Value::Str(text))
            }
            "xml.str" => Ok(Value::Str(ser::xml_escape(arg(&args, 0)?.as_str()?))),
            "xml.null" => Ok(Value::Str("null".into())),
            "xml.parse" => {
                let doc = ser::parse_xml(arg(&args, 0)?.as_str()?)?;
                self.docs.push(Doc::Xml(doc));
                Ok(Value::Doc(self.docs.len() - 1))
            }
            "xml.get_int" => {
                let text = self.xml_field_text(&args)?;
                text.parse::<i32>()
                    .map(Value::Int)
                    .map_err(|_| xml_mismatch("int", &text))
            }
            "xml.get_float" => {
                let text = self.xml_field_text(&args)?;
                text.parse::<f32>()
                    .map(Value::Float)
                    .map_err(|_| xml_mismatch("float", &text))
            }
            "xml.get_double" => {
                let text = self.xml_field_text(&args)?;
                text.parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| xml_mismatch("double", &text))
            }
            "xml.get_bool" => {
                let text = self.xml_field_text(&args)?;
                match text.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(xml_mismatch("boolean", &text)),
                }
            }
            "xml.get_str" => Ok(Value::Str(self.xml_field_text(&args)?)),
            "xml.get_doc" => {
                let field = arg(&args, 1)?.as_str()?.to_string();
                let node = {
                    let doc = self.doc_xml(arg(&args, 0)?)?;
                    ser::xml_get(doc, &field)?.clone()
                };
                match node {
                    ser::Xml::Text(text) if text == "null" => Ok(Value::Null),
                    node => {
                        self.docs.push(Doc::Xml(node));
                        Ok(Value::Doc(self.docs.len() - 1))
                    }
                }
            }
            other => Err(RuntimeError::UnknownFunction {
                name: format!("rt.{other}"),
            }),
        }
    }

    fn doc_json(&self, value: &Value) -> RtResult<&serde_json::Value> {
        match value {
            Value::Doc(index) => match self.docs.get(*index) {
                Some(Doc::Json(doc)) => Ok(doc),
                _ => Err(RuntimeError::Eval("expected a JSON document".into())),
            },
            other => Err(mismatch("doc", other)),
        }
    }

    fn doc_xml(&self, value: &Value) -> RtResult<&ser::Xml> {
        match value {
            Value::Doc(index) => match self.docs.get(*index) {
                Some(Doc::Xml(doc)) => Ok(doc),
                _ => Err(RuntimeError::Eval("expected an XML document".into())),
            },
            other => Err(mismatch("doc", other)),
        }
    }

    fn json_field_value(&self, args: &[Value]) -> RtResult<serde_json::Value> {
        let doc = self.doc_json(arg(args, 0)?)?;
        let field = arg(args, 1)?.as_str()?;
        Ok(ser::json_get(doc, field)?.clone())
    }

    fn xml_field_text(&self, args: &[Value]) -> RtResult<String> {
        let doc = self.doc_xml(arg(args, 0)?)?;
        let field = arg(args, 1)?.as_str()?;
        match ser::xml_get(doc, field)? {
            ser::Xml::Text(text) => Ok(text.clone()),
            ser::Xml::Node(_) => Err(RuntimeError::TypeMismatch {
                expected: "text".into(),
                actual: "element".into(),
            }),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn arg(args: &[Value], index: usize) -> RtResult<&Value> {
    args.get(index)
        .ok_or_else(|| RuntimeError::Eval(format!("intrinsic missing argument {index}")))
}

fn find_block<'f>(
    func: &'f IrFunction,
    label: &str,
) -> RtResult<&'f sinter_compiler::ir::IrBlock> {
    func.blocks
        .iter()
        .find(|b| b.label == label)
        .ok_or_else(|| RuntimeError::Eval(format!("unknown label '{label}' in '{}'", func.name)))
}

fn default_value(ty: &sinter_compiler::registry::Type) -> Value {
    use sinter_compiler::registry::Type;
    match ty {
        Type::Int => Value::Int(0),
        Type::Float => Value::Float(0.0),
        Type::Double => Value::Double(0.0),
        Type::Boolean => Value::Bool(false),
        Type::Str => Value::Str(String::new()),
        _ => Value::Null,
    }
}

/// Wrapping two's-complement semantics for `i32`.
fn binary(op: IrBinOp, lhs: &Value, rhs: &Value) -> RtResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let v = match op {
                IrBinOp::Add => a.wrapping_add(*b),
                IrBinOp::Sub => a.wrapping_sub(*b),
                IrBinOp::Mul => a.wrapping_mul(*b),
                IrBinOp::Div => {
                    if *b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    a.wrapping_div(*b)
                }
                IrBinOp::Mod => {
                    if *b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    a.wrapping_rem(*b)
                }
            };
            Ok(Value::Int(v))
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(apply_float(op, *a, *b))),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(apply_double(op, *a, *b))),
        (a, b) => Err(RuntimeError::TypeMismatch {
            expected: format!("matching numeric operands, got {}", a.type_name()),
            actual: b.type_name().to_string(),
        }),
    }
}

fn apply_float(op: IrBinOp, a: f32, b: f32) -> f32 {
    match op {
        IrBinOp::Add => a + b,
        IrBinOp::Sub => a - b,
        IrBinOp::Mul => a * b,
        IrBinOp::Div => a / b,
        IrBinOp::Mod => a % b,
    }
}

fn apply_double(op: IrBinOp, a: f64, b: f64) -> f64 {
    match op {
        IrBinOp::Add => a + b,
        IrBinOp::Sub => a - b,
        IrBinOp::Mul => a * b,
        IrBinOp::Div => a / b,
        IrBinOp::Mod => a % b,
    }
}

fn compare(op: IrCmpOp, lhs: &Value, rhs: &Value) -> RtResult<bool> {
    match op {
        IrCmpOp::Eq => Ok(values_equal(lhs, rhs)),
        IrCmpOp::Ne => Ok(!values_equal(lhs, rhs)),
        _ => {
            let ordering = match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
                (a, b) => {
                    return Err(RuntimeError::TypeMismatch {
                        expected: format!("matching numeric operands, got {}", a.type_name()),
                        actual: b.type_name().to_string(),
                    });
                }
            };
            let Some(ordering) = ordering else {
                return Ok(false);
            };
            Ok(match op {
                IrCmpOp::Lt => ordering.is_lt(),
                IrCmpOp::Le => ordering.is_le(),
                IrCmpOp::Gt => ordering.is_gt(),
                IrCmpOp::Ge => ordering.is_ge(),
                IrCmpOp::Eq | IrCmpOp::Ne => unreachable!(),
            })
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Double(x), Value::Double(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Obj(x), Value::Obj(y)) => x == y,
        (Value::DStr(x), Value::DStr(y)) => x == y,
        (Value::Doc(x), Value::Doc(y)) => x == y,
        _ => false,
    }
}

fn json_mismatch(expected: &str, value: &serde_json::Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        actual: format!("{value}"),
    }
}

fn xml_mismatch(expected: &str, text: &str) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        actual: format!("'{text}'"),
    }
}
