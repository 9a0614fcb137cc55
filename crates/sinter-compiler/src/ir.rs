//! The intermediate representation.
//!
//! One [`IrModule`] per compilation unit: class record layouts, functions of
//! labelled basic blocks over a small instruction set, D-string descriptors,
//! and a module-level constant pool (strings and floats are interned and
//! referenced by index). The module is created empty, populated once by the
//! code generator, and emitted once - the textual form is what the external
//! backend consumes, the structured form is what the reference evaluator
//! runs.
//!
//! `i32` arithmetic in this IR wraps on overflow (two's complement).

use std::fmt;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::layout::ClassLayout;

// ============================================================================
// Operands and constants
// ============================================================================

/// A virtual register within one function. Parameters occupy the first ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub u32);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Value types carried by temps and record slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    I1,
    I32,
    F32,
    F64,
    Str,
    DStr,
    /// Reference to a class record.
    Ptr(String),
    /// Opaque parsed-document handle used by deserialization routines.
    Doc,
    Void,
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::I1 => f.write_str("i1"),
            IrType::I32 => f.write_str("i32"),
            IrType::F32 => f.write_str("f32"),
            IrType::F64 => f.write_str("f64"),
            IrType::Str => f.write_str("str"),
            IrType::DStr => f.write_str("dstr"),
            IrType::Ptr(class) => write!(f, "ptr.{class}"),
            IrType::Doc => f.write_str("doc"),
            IrType::Void => f.write_str("void"),
        }
    }
}

/// A constant operand. Strings and floats live in the module pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i32),
    Bool(bool),
    Null,
    F32(usize),
    F64(usize),
    Str(usize),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "i32 {v}"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Null => f.write_str("null"),
            Constant::F32(i) => write!(f, "f32#{i}"),
            Constant::F64(i) => write!(f, "f64#{i}"),
            Constant::Str(i) => write!(f, "str#{i}"),
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Temp(TempId),
    Const(Constant),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{t}"),
            Operand::Const(c) => write!(f, "{c}"),
        }
    }
}

/// Module-level constant pool with deduplication.
#[derive(Debug, Default)]
pub struct ConstantPool {
    pub strings: Vec<String>,
    string_ids: FxHashMap<String, usize>,
    pub f32s: Vec<f32>,
    f32_ids: FxHashMap<OrderedFloat<f32>, usize>,
    pub f64s: Vec<f64>,
    f64_ids: FxHashMap<OrderedFloat<f64>, usize>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_str(&mut self, value: &str) -> usize {
        if let Some(&id) = self.string_ids.get(value) {
            return id;
        }
        let id = self.strings.len();
        self.strings.push(value.to_string());
        self.string_ids.insert(value.to_string(), id);
        id
    }

    pub fn intern_f32(&mut self, value: f32) -> usize {
        if let Some(&id) = self.f32_ids.get(&OrderedFloat(value)) {
            return id;
        }
        let id = self.f32s.len();
        self.f32s.push(value);
        self.f32_ids.insert(OrderedFloat(value), id);
        id
    }

    pub fn intern_f64(&mut self, value: f64) -> usize {
        if let Some(&id) = self.f64_ids.get(&OrderedFloat(value)) {
            return id;
        }
        let id = self.f64s.len();
        self.f64s.push(value);
        self.f64_ids.insert(OrderedFloat(value), id);
        id
    }
}

// ============================================================================
// Instructions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for IrBinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IrBinOp::Add => "add",
            IrBinOp::Sub => "sub",
            IrBinOp::Mul => "mul",
            IrBinOp::Div => "div",
            IrBinOp::Mod => "mod",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrCmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for IrCmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IrCmpOp::Eq => "eq",
            IrCmpOp::Ne => "ne",
            IrCmpOp::Lt => "lt",
            IrCmpOp::Le => "le",
            IrCmpOp::Gt => "gt",
            IrCmpOp::Ge => "ge",
        })
    }
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Reserve a stack cell; `dst` holds its address.
    Alloca { dst: TempId, ty: IrType },
    Load {
        dst: TempId,
        ty: IrType,
        addr: Operand,
    },
    Store { addr: Operand, value: Operand },
    Binary {
        dst: TempId,
        op: IrBinOp,
        ty: IrType,
        lhs: Operand,
        rhs: Operand,
    },
    Compare {
        dst: TempId,
        op: IrCmpOp,
        lhs: Operand,
        rhs: Operand,
    },
    Not { dst: TempId, value: Operand },
    Neg {
        dst: TempId,
        ty: IrType,
        value: Operand,
    },
    /// Allocate a zeroed record of `class`.
    AllocRecord { dst: TempId, class: String },
    /// Deallocate a record previously allocated for `class`.
    FreeRecord { obj: Operand, class: String },
    /// Populate the record's interface-table slot for `interface`.
    InitItable {
        obj: Operand,
        class: String,
        interface: String,
    },
    /// Address of a named field of a record.
    FieldAddr {
        dst: TempId,
        obj: Operand,
        class: String,
        field: String,
    },
    /// Direct call: a module function or an `rt.*` runtime routine.
    Call {
        dst: Option<TempId>,
        callee: String,
        args: Vec<Operand>,
    },
    /// Virtual call through the receiver's interface table.
    CallIface {
        dst: Option<TempId>,
        interface: String,
        method: String,
        slot: usize,
        args: Vec<Operand>,
    },
    /// Create a D-string record from a descriptor and referenced addresses.
    DStrNew {
        dst: TempId,
        descriptor: usize,
        refs: Vec<Operand>,
    },
    /// Re-evaluate (if stale) and read a D-string's text.
    DStrRead { dst: TempId, dstr: Operand },
    Print { args: Vec<Operand>, newline: bool },
}

/// How a block ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(String),
    Branch {
        cond: Operand,
        then_label: String,
        else_label: String,
    },
    Ret(Option<Operand>),
    Unreachable,
}

/// A labelled basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub label: String,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrParam {
    pub name: String,
    pub ty: IrType,
}

/// A function body in IR form.
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<IrParam>,
    pub ret: IrType,
    pub blocks: Vec<IrBlock>,
}

// ============================================================================
// D-string descriptors
// ============================================================================

/// One piece of a D-string descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum IrSegment {
    /// Pooled literal text.
    Text(usize),
    /// Index into the record's reference list.
    Slot(usize),
}

/// Compile-time descriptor of a D-string literal: the template plus how many
/// variable locations its records snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DStringDescriptor {
    pub segments: Vec<IrSegment>,
    pub ref_count: usize,
}

// ============================================================================
// Module
// ============================================================================

/// One compilation unit's emitted IR.
#[derive(Debug, Default)]
pub struct IrModule {
    pub layouts: Vec<ClassLayout>,
    pub functions: Vec<IrFunction>,
    pub dstrings: Vec<DStringDescriptor>,
    pub pool: ConstantPool,
}

impl IrModule {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn layout(&self, class: &str) -> Option<&ClassLayout> {
        self.layouts.iter().find(|l| l.name == class)
    }
}

// ============================================================================
// Textual emission
// ============================================================================

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module sinter")?;
        writeln!(f)?;
        for (i, s) in self.pool.strings.iter().enumerate() {
            writeln!(f, "const str#{i} \"{}\"", escape(s))?;
        }
        for (i, v) in self.pool.f32s.iter().enumerate() {
            writeln!(f, "const f32#{i} {v}")?;
        }
        for (i, v) in self.pool.f64s.iter().enumerate() {
            writeln!(f, "const f64#{i} {v}")?;
        }
        if !self.pool.strings.is_empty() || !self.pool.f32s.is_empty() || !self.pool.f64s.is_empty()
        {
            writeln!(f)?;
        }
        for layout in &self.layouts {
            writeln!(f, "layout {} size {} {{", layout.name, layout.size)?;
            for itable in &layout.itables {
                writeln!(f, "  itable {} {} {{", itable.offset, itable.interface)?;
                for (slot, entry) in itable.entries.iter().enumerate() {
                    writeln!(f, "    slot {slot} {} -> {}", entry.method, entry.symbol)?;
                }
                writeln!(f, "  }}")?;
            }
            for field in &layout.fields {
                writeln!(
                    f,
                    "  field {} {} {}",
                    field.offset,
                    field.name,
                    type_word(&field.ty)
                )?;
            }
            writeln!(f, "}}")?;
            writeln!(f)?;
        }
        for (i, d) in self.dstrings.iter().enumerate() {
            write!(f, "dstring d{i} refs {} {{", d.ref_count)?;
            for segment in &d.segments {
                match segment {
                    IrSegment::Text(s) => write!(f, " str#{s}")?,
                    IrSegment::Slot(s) => write!(f, " slot{s}")?,
                }
            }
            writeln!(f, " }}")?;
        }
        if !self.dstrings.is_empty() {
            writeln!(f)?;
        }
        for func in &self.functions {
            write_function(f, func)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn type_word(ty: &crate::registry::Type) -> String {
    use crate::registry::Type;
    match ty {
        Type::Int => "i32".into(),
        Type::Float => "f32".into(),
        Type::Double => "f64".into(),
        Type::Boolean => "i1".into(),
        Type::Str => "str".into(),
        Type::DStr => "dstr".into(),
        Type::Pointer(inner) => format!("ptr.{inner}"),
        Type::Class(name) | Type::Interface(name) => format!("ptr.{name}"),
        Type::Void => "void".into(),
        Type::Null => "null".into(),
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, func: &IrFunction) -> fmt::Result {
    let params = func
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(f, "func {}({}) -> {} {{", func.name, params, func.ret)?;
    for block in &func.blocks {
        writeln!(f, "{}:", block.label)?;
        for instr in &block.instrs {
            writeln!(f, "  {}", render_instr(instr))?;
        }
        match &block.term {
            Terminator::Jump(label) => writeln!(f, "  jmp {label}")?,
            Terminator::Branch {
                cond,
                then_label,
                else_label,
            } => writeln!(f, "  br {cond} {then_label} {else_label}")?,
            Terminator::Ret(Some(value)) => writeln!(f, "  ret {value}")?,
            Terminator::Ret(None) => writeln!(f, "  ret")?,
            Terminator::Unreachable => writeln!(f, "  unreachable")?,
        }
    }
    writeln!(f, "}}")
}

fn render_instr(instr: &Instr) -> String {
    match instr {
        Instr::Alloca { dst, ty } => format!("{dst} = alloca {ty}"),
        Instr::Load { dst, ty, addr } => format!("{dst} = load {ty} {addr}"),
        Instr::Store { addr, value } => format!("store {addr} {value}"),
        Instr::Binary {
            dst,
            op,
            ty,
            lhs,
            rhs,
        } => format!("{dst} = {op}.{ty} {lhs} {rhs}"),
        Instr::Compare { dst, op, lhs, rhs } => format!("{dst} = cmp.{op} {lhs} {rhs}"),
        Instr::Not { dst, value } => format!("{dst} = not {value}"),
        Instr::Neg { dst, ty, value } => format!("{dst} = neg.{ty} {value}"),
        Instr::AllocRecord { dst, class } => format!("{dst} = new {class}"),
        Instr::FreeRecord { obj, class } => format!("free {class} {obj}"),
        Instr::InitItable {
            obj,
            class,
            interface,
        } => format!("itable.init {obj} {class}:{interface}"),
        Instr::FieldAddr {
            dst,
            obj,
            class,
            field,
        } => format!("{dst} = fieldaddr {obj} {class}.{field}"),
        Instr::Call { dst, callee, args } => {
            let args = args
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            match dst {
                Some(dst) => format!("{dst} = call {callee} {args}"),
                None => format!("call {callee} {args}"),
            }
        }
        Instr::CallIface {
            dst,
            interface,
            method,
            slot,
            args,
        } => {
            let args = args
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            match dst {
                Some(dst) => format!("{dst} = call.iface {interface}[{slot}]:{method} {args}"),
                None => format!("call.iface {interface}[{slot}]:{method} {args}"),
            }
        }
        Instr::DStrNew {
            dst,
            descriptor,
            refs,
        } => {
            let refs = refs
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            format!("{dst} = dstr.new d{descriptor} {refs}")
        }
        Instr::DStrRead { dst, dstr } => format!("{dst} = dstr.read {dstr}"),
        Instr::Print { args, newline } => {
            let args = args
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if *newline {
                format!("println {args}")
            } else {
                format!("print {args}")
            }
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_str("hello");
        let b = pool.intern_str("hello");
        assert_eq!(a, b);
        let x = pool.intern_f64(1.5);
        let y = pool.intern_f64(1.5);
        let z = pool.intern_f64(2.5);
        assert_eq!(x, y);
        assert_ne!(x, z);
    }

    #[test]
    fn module_renders_functions() {
        let mut module = IrModule::default();
        module.functions.push(IrFunction {
            name: "answer".into(),
            params: Vec::new(),
            ret: IrType::I32,
            blocks: vec![IrBlock {
                label: "entry".into(),
                instrs: Vec::new(),
                term: Terminator::Ret(Some(Operand::Const(Constant::Int(42)))),
            }],
        });
        let text = module.to_string();
        assert!(text.contains("module sinter"));
        assert!(text.contains("func answer() -> i32 {"));
        assert!(text.contains("ret i32 42"));
    }

    #[test]
    fn string_constants_are_escaped() {
        let mut module = IrModule::default();
        module.pool.intern_str("a\"b\nc");
        let text = module.to_string();
        assert!(text.contains("const str#0 \"a\\\"b\\nc\""));
    }
}
