//! Code generation.
//!
//! Lowers the resolved, typed, validated program into one [`IrModule`]:
//! class record layouts, `new`/cleanup routines, synthesized accessors,
//! serialization routines, user method and function bodies, and D-string
//! descriptors. Anything the earlier stages should have rejected that still
//! shows up here is a [`CodegenError`] - an internal invariant violation
//! that aborts emission.

mod body;
mod serialize;

use rustc_hash::FxHashMap;
use sinter_ast::{FunctionDecl, Program};
use sinter_core::{CodegenError, Diagnostics, Span};

use crate::annotations::{AccessorKind, AnnotationOutput};
use crate::ir::{
    Constant, Instr, IrBlock, IrCmpOp, IrFunction, IrModule, IrParam, IrType, Operand, TempId,
    Terminator,
};
use crate::layout::layout_class;
use crate::registry::{ClassInfo, ConstValue, MethodOrigin, Type};
use crate::resolver::Resolution;
use crate::scope::SymbolId;
use crate::typecheck::TypeInfo;

pub(crate) type Result<T> = std::result::Result<T, CodegenError>;

/// Generate the IR module, or `None` when an internal invariant broke.
pub fn generate(
    program: &Program,
    resolution: &Resolution,
    types: &TypeInfo,
    annotations: &AnnotationOutput,
    diags: &mut Diagnostics,
) -> Option<IrModule> {
    log::debug!("generating IR");
    let mut generator = CodeGenerator {
        program,
        resolution,
        types,
        annotations,
        module: IrModule::default(),
    };
    match generator.run() {
        Ok(()) => Some(generator.module),
        Err(err) => {
            diags.error(err.span, err.to_string());
            None
        }
    }
}

pub(crate) struct CodeGenerator<'a> {
    pub(crate) program: &'a Program,
    pub(crate) resolution: &'a Resolution,
    pub(crate) types: &'a TypeInfo,
    pub(crate) annotations: &'a AnnotationOutput,
    pub(crate) module: IrModule,
}

impl<'a> CodeGenerator<'a> {
    fn run(&mut self) -> Result<()> {
        for class in self.types.registry.classes_in_order() {
            self.module
                .layouts
                .push(layout_class(class, &self.types.registry));
        }

        let program = self.program;
        for decl in program.classes() {
            let Some(info) = self.types.registry.class(&decl.name.name) else {
                continue;
            };
            self.gen_new(info);
            self.gen_cleanup(info);
            self.gen_accessors(info);
            serialize::gen_serialization(self, info)?;
            for method in &decl.methods {
                self.gen_user_function(method, Some(info))?;
            }
        }
        for func in program.functions() {
            self.gen_user_function(func, None)?;
        }
        Ok(())
    }

    // ==========================================================================
    // Generated routines
    // ==========================================================================

    /// `Class.new() -> ptr.Class`: allocate, apply declared initializers,
    /// populate interface tables.
    fn gen_new(&mut self, info: &ClassInfo) {
        let class = info.name.clone();
        let mut emit = Emit::new(format!("{class}.new"), IrType::Ptr(class.clone()), 0);
        let obj = emit.new_temp();
        emit.push(Instr::AllocRecord {
            dst: obj,
            class: class.clone(),
        });
        for field in info.fields.iter().filter(|f| !f.is_derived()) {
            let Some(init) = &field.init else { continue };
            let value = self.const_operand(init);
            let addr = emit.new_temp();
            emit.push(Instr::FieldAddr {
                dst: addr,
                obj: Operand::Temp(obj),
                class: class.clone(),
                field: field.name.clone(),
            });
            emit.push(Instr::Store {
                addr: Operand::Temp(addr),
                value,
            });
        }
        let itables: Vec<String> = self
            .module
            .layout(&class)
            .map(|l| l.itables.iter().map(|t| t.interface.clone()).collect())
            .unwrap_or_default();
        for interface in itables {
            emit.push(Instr::InitItable {
                obj: Operand::Temp(obj),
                class: class.clone(),
                interface,
            });
        }
        emit.terminate(Terminator::Ret(Some(Operand::Temp(obj))));
        self.module.functions.push(emit.finish());
    }

    /// `Class.__cleanup(this)`: free still-held pointer fields. The record
    /// itself is deallocated by the `.clean()` call site.
    fn gen_cleanup(&mut self, info: &ClassInfo) {
        let class = info.name.clone();
        let mut emit = Emit::new(format!("{class}.__cleanup"), IrType::Void, 1);
        emit.params.push(IrParam {
            name: "this".into(),
            ty: IrType::Ptr(class.clone()),
        });
        for field in info.fields.iter().filter(|f| !f.is_derived()) {
            let Some(Type::Class(pointee)) = field.ty.pointee().cloned() else {
                continue;
            };
            let addr = emit.new_temp();
            emit.push(Instr::FieldAddr {
                dst: addr,
                obj: Operand::Temp(TempId(0)),
                class: class.clone(),
                field: field.name.clone(),
            });
            let value = emit.new_temp();
            emit.push(Instr::Load {
                dst: value,
                ty: IrType::Ptr(pointee.clone()),
                addr: Operand::Temp(addr),
            });
            let is_null = emit.new_temp();
            emit.push(Instr::Compare {
                dst: is_null,
                op: IrCmpOp::Eq,
                lhs: Operand::Temp(value),
                rhs: Operand::Const(Constant::Null),
            });
            let free_label = emit.new_label("free");
            let skip_label = emit.new_label("skip");
            emit.terminate(Terminator::Branch {
                cond: Operand::Temp(is_null),
                then_label: skip_label.clone(),
                else_label: free_label.clone(),
            });
            emit.start_block(free_label);
            emit.push(Instr::Call {
                dst: None,
                callee: format!("{pointee}.__cleanup"),
                args: vec![Operand::Temp(value)],
            });
            emit.push(Instr::FreeRecord {
                obj: Operand::Temp(value),
                class: pointee,
            });
            emit.terminate(Terminator::Jump(skip_label.clone()));
            emit.start_block(skip_label);
        }
        emit.terminate(Terminator::Ret(None));
        self.module.functions.push(emit.finish());
    }

    /// Synthesized accessors: a getter loads its field, a setter stores it.
    fn gen_accessors(&mut self, info: &ClassInfo) {
        let specs: Vec<_> = self
            .annotations
            .accessors
            .iter()
            .filter(|a| a.class == info.name)
            .cloned()
            .collect();
        for spec in specs {
            let Some(field) = info.field(&spec.field) else {
                continue;
            };
            let field_ty = self.ir_type(&field.ty);
            let class = info.name.clone();
            match spec.kind {
                AccessorKind::Getter => {
                    let mut emit =
                        Emit::new(format!("{class}.{}", spec.name), field_ty.clone(), 1);
                    emit.params.push(IrParam {
                        name: "this".into(),
                        ty: IrType::Ptr(class.clone()),
                    });
                    let addr = emit.new_temp();
                    emit.push(Instr::FieldAddr {
                        dst: addr,
                        obj: Operand::Temp(TempId(0)),
                        class: class.clone(),
                        field: spec.field.clone(),
                    });
                    let value = emit.new_temp();
                    emit.push(Instr::Load {
                        dst: value,
                        ty: field_ty,
                        addr: Operand::Temp(addr),
                    });
                    emit.terminate(Terminator::Ret(Some(Operand::Temp(value))));
                    self.module.functions.push(emit.finish());
                }
                AccessorKind::Setter => {
                    let mut emit = Emit::new(format!("{class}.{}", spec.name), IrType::Void, 2);
                    emit.params.push(IrParam {
                        name: "this".into(),
                        ty: IrType::Ptr(class.clone()),
                    });
                    emit.params.push(IrParam {
                        name: "value".into(),
                        ty: field_ty,
                    });
                    let addr = emit.new_temp();
                    emit.push(Instr::FieldAddr {
                        dst: addr,
                        obj: Operand::Temp(TempId(0)),
                        class: class.clone(),
                        field: spec.field.clone(),
                    });
                    emit.push(Instr::Store {
                        addr: Operand::Temp(addr),
                        value: Operand::Temp(TempId(1)),
                    });
                    emit.terminate(Terminator::Ret(None));
                    self.module.functions.push(emit.finish());
                }
            }
        }
    }

    // ==========================================================================
    // Shared helpers
    // ==========================================================================

    pub(crate) fn ir_type(&self, ty: &Type) -> IrType {
        match ty {
            Type::Int => IrType::I32,
            Type::Float => IrType::F32,
            Type::Double => IrType::F64,
            Type::Boolean => IrType::I1,
            Type::Str => IrType::Str,
            Type::DStr => IrType::DStr,
            Type::Void => IrType::Void,
            Type::Null => IrType::Ptr(String::new()),
            Type::Class(name) | Type::Interface(name) => IrType::Ptr(name.clone()),
            Type::Pointer(inner) => self.ir_type(inner),
        }
    }

    pub(crate) fn const_operand(&mut self, value: &ConstValue) -> Operand {
        Operand::Const(match value {
            ConstValue::Int(v) => Constant::Int(*v),
            ConstValue::Bool(v) => Constant::Bool(*v),
            ConstValue::Float(v) => Constant::F32(self.module.pool.intern_f32(*v)),
            ConstValue::Double(v) => Constant::F64(self.module.pool.intern_f64(*v)),
            ConstValue::Str(v) => Constant::Str(self.module.pool.intern_str(v)),
            ConstValue::Null => Constant::Null,
        })
    }

    pub(crate) fn derived_method_symbol(&self, class: &str, field: &str) -> Option<String> {
        let info = self.types.registry.class(class)?;
        info.methods
            .iter()
            .find(|m| {
                m.name == field
                    && m.origin == MethodOrigin::User
                    && !m.is_static
                    && m.params.is_empty()
            })
            .map(|m| self.types.registry.method_symbol(m))
    }

    fn gen_user_function(&mut self, func: &FunctionDecl, class: Option<&ClassInfo>) -> Result<()> {
        let function = body::lower_function(self, func, class)?;
        self.module.functions.push(function);
        Ok(())
    }
}

// ============================================================================
// Function emission state
// ============================================================================

/// An in-progress basic block.
struct OpenBlock {
    label: String,
    instrs: Vec<Instr>,
    term: Option<Terminator>,
}

/// Per-function emission state: blocks, temps, labels, local slots.
pub(crate) struct Emit {
    pub name: String,
    pub params: Vec<IrParam>,
    pub ret: IrType,
    blocks: Vec<OpenBlock>,
    current: usize,
    next_temp: u32,
    next_label: u32,
    /// Local symbol -> the temp holding its stack cell's address.
    pub locals: FxHashMap<SymbolId, TempId>,
    /// (continue label, break label), innermost last.
    pub loop_stack: Vec<(String, String)>,
    /// Receiver temp for instance methods.
    pub this_temp: Option<TempId>,
}

impl Emit {
    /// `reserved_temps` covers the parameters, which occupy the first ids.
    pub fn new(name: String, ret: IrType, reserved_temps: u32) -> Self {
        Self {
            name,
            params: Vec::new(),
            ret,
            blocks: vec![OpenBlock {
                label: "entry".into(),
                instrs: Vec::new(),
                term: None,
            }],
            current: 0,
            next_temp: reserved_temps,
            next_label: 0,
            locals: FxHashMap::default(),
            loop_stack: Vec::new(),
            this_temp: None,
        }
    }

    pub fn new_temp(&mut self) -> TempId {
        let id = TempId(self.next_temp);
        self.next_temp += 1;
        id
    }

    pub fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}{}", self.next_label);
        self.next_label += 1;
        label
    }

    pub fn push(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current];
        // Instructions after a terminator are dead; drop them.
        if block.term.is_none() {
            block.instrs.push(instr);
        }
    }

    /// Set the current block's terminator unless it already has one.
    pub fn terminate(&mut self, term: Terminator) {
        let block = &mut self.blocks[self.current];
        if block.term.is_none() {
            block.term = Some(term);
        }
    }

    /// Open a new block and make it current.
    pub fn start_block(&mut self, label: String) {
        self.blocks.push(OpenBlock {
            label,
            instrs: Vec::new(),
            term: None,
        });
        self.current = self.blocks.len() - 1;
    }

    pub fn finish(self) -> IrFunction {
        let fallback = if self.ret == IrType::Void {
            Terminator::Ret(None)
        } else {
            Terminator::Unreachable
        };
        IrFunction {
            name: self.name,
            params: self.params,
            ret: self.ret,
            blocks: self
                .blocks
                .into_iter()
                .map(|b| IrBlock {
                    label: b.label,
                    instrs: b.instrs,
                    term: b.term.unwrap_or_else(|| fallback.clone()),
                })
                .collect(),
        }
    }
}

pub(crate) fn internal(span: Span, message: impl Into<String>) -> CodegenError {
    CodegenError::new(span, message)
}
