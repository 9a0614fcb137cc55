//! Semantic types and the program registry.
//!
//! [`Type`] is the checker's view of a value: primitives, the two string
//! flavors, named class/interface types, and pointers to named types.
//! [`Registry`] holds the resolved picture of every declared type with
//! inherited members flattened in, and answers the nominal-subtyping
//! questions the rest of the pipeline asks.

use std::fmt;

use rustc_hash::FxHashMap;
use sinter_ast::AnnotationFlags;
use sinter_core::{Span, Visibility};

// ============================================================================
// Types
// ============================================================================

/// A semantic type.
///
/// Only named (class/interface) types may be pointed to; the checker rejects
/// pointers to primitives when it resolves type expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Float,
    Double,
    Boolean,
    Str,
    /// A D-string value; assignable wherever `str` is expected.
    DStr,
    Void,
    /// The type of the `null` literal; assignable to any pointer.
    Null,
    Class(String),
    Interface(String),
    Pointer(Box<Type>),
}

impl Type {
    pub fn pointer(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Double)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Interface(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// The class name behind this type, through one level of pointer.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) => Some(name),
            Type::Pointer(inner) => inner.class_name(),
            _ => None,
        }
    }

    /// Look up a builtin type by its source-level name.
    pub fn builtin(name: &str) -> Option<Type> {
        match name {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "double" => Some(Type::Double),
            "boolean" => Some(Type::Boolean),
            "str" => Some(Type::Str),
            "d_str" => Some(Type::DStr),
            "void" => Some(Type::Void),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Boolean => f.write_str("boolean"),
            Type::Str => f.write_str("str"),
            Type::DStr => f.write_str("d_str"),
            Type::Void => f.write_str("void"),
            Type::Null => f.write_str("null"),
            Type::Class(name) | Type::Interface(name) => f.write_str(name),
            Type::Pointer(inner) => write!(f, "{inner}*"),
        }
    }
}

/// A compile-time constant, used for field initializers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl ConstValue {
    /// The zero/default value for a type.
    pub fn default_for(ty: &Type) -> ConstValue {
        match ty {
            Type::Int => ConstValue::Int(0),
            Type::Float => ConstValue::Float(0.0),
            Type::Double => ConstValue::Double(0.0),
            Type::Boolean => ConstValue::Bool(false),
            Type::Str | Type::DStr => ConstValue::Str(String::new()),
            _ => ConstValue::Null,
        }
    }
}

// ============================================================================
// Member info
// ============================================================================

/// Where a method signature came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOrigin {
    /// Written by the user.
    User,
    /// Accessor synthesized from a field annotation.
    Accessor,
    /// Serialization entry point (`as_json` and friends).
    Serialization,
}

/// A field of a class, with its resolved type.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    pub vis: Visibility,
    pub is_const: bool,
    /// Flags of the field's annotation; `None` when unannotated.
    pub annotation: Option<AnnotationFlags>,
    /// Resolved constant initializer, if declared.
    pub init: Option<ConstValue>,
    /// The class that declared this field (differs from the owner for
    /// inherited fields).
    pub declared_by: String,
    pub span: Span,
}

impl FieldInfo {
    pub fn flags(&self) -> AnnotationFlags {
        self.annotation.unwrap_or_default()
    }

    pub fn is_derived(&self) -> bool {
        self.flags().contains(AnnotationFlags::DERIVED)
    }

    pub fn is_serializable(&self) -> bool {
        self.flags().contains(AnnotationFlags::SERIALIZABLE)
    }
}

/// A method signature of a class or interface.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<Type>,
    pub param_names: Vec<String>,
    pub ret: Type,
    pub is_static: bool,
    pub vis: Visibility,
    pub origin: MethodOrigin,
    /// The class (or interface) whose body defines this method; inherited
    /// entries keep the ancestor's name, which is also the emitted symbol's
    /// prefix.
    pub declared_by: String,
    pub span: Span,
}

impl MethodInfo {
    /// Exact signature equality: name, parameter types in order, return type.
    pub fn signature_matches(&self, other: &MethodInfo) -> bool {
        self.name == other.name && self.params == other.params && self.ret == other.ret
    }

    /// Render the signature for diagnostics, e.g. `getArea() -> double`.
    pub fn describe(&self) -> String {
        let params = self
            .params
            .iter()
            .map(Type::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({}) -> {}", self.name, params, self.ret)
    }
}

/// A free function signature. Overloads share a name in the registry.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<Type>,
    pub param_names: Vec<String>,
    pub ret: Type,
    pub span: Span,
}

impl FunctionInfo {
    pub fn describe(&self) -> String {
        let params = self
            .params
            .iter()
            .map(Type::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({}) -> {}", self.name, params, self.ret)
    }
}

// ============================================================================
// Class / interface info
// ============================================================================

/// The resolved picture of one class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub type_params: Vec<String>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    /// All fields, inherited first, each list in declaration order.
    pub fields: Vec<FieldInfo>,
    /// All methods, inherited and synthesized included.
    pub methods: Vec<MethodInfo>,
    pub span: Span,
}

impl ClassInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn methods_named(&self, name: &str) -> Vec<&MethodInfo> {
        self.methods.iter().filter(|m| m.name == name).collect()
    }

    pub fn has_user_method(&self, name: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m.name == name && m.origin == MethodOrigin::User)
    }
}

/// The resolved picture of one interface.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    /// Signatures in declaration order; the order fixes itable slots.
    pub methods: Vec<MethodInfo>,
    pub span: Span,
}

// ============================================================================
// Registry
// ============================================================================

/// All declared types and free functions of one compilation unit.
#[derive(Debug, Default)]
pub struct Registry {
    classes: FxHashMap<String, ClassInfo>,
    interfaces: FxHashMap<String, InterfaceInfo>,
    functions: FxHashMap<String, Vec<FunctionInfo>>,
    /// Class names in declaration order, for deterministic output.
    class_order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, info: ClassInfo) {
        self.class_order.push(info.name.clone());
        self.classes.insert(info.name.clone(), info);
    }

    pub fn add_interface(&mut self, info: InterfaceInfo) {
        self.interfaces.insert(info.name.clone(), info);
    }

    pub fn add_function(&mut self, info: FunctionInfo) {
        self.functions.entry(info.name.clone()).or_default().push(info);
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassInfo> {
        self.classes.get_mut(name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceInfo> {
        self.interfaces.get(name)
    }

    pub fn functions(&self, name: &str) -> &[FunctionInfo] {
        self.functions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Classes in declaration order.
    pub fn classes_in_order(&self) -> impl Iterator<Item = &ClassInfo> {
        self.class_order.iter().filter_map(|n| self.classes.get(n))
    }

    /// Whether `class` (or one of its superclasses) declares `implements iface`.
    pub fn class_implements(&self, class: &str, iface: &str) -> bool {
        let mut current = self.classes.get(class);
        while let Some(info) = current {
            if info.implements.iter().any(|i| i == iface) {
                return true;
            }
            current = info.extends.as_deref().and_then(|p| self.classes.get(p));
        }
        false
    }

    /// Whether `sub` names `sup` or a class derived from it.
    pub fn class_derives_from(&self, sub: &str, sup: &str) -> bool {
        let mut current = Some(sub);
        while let Some(name) = current {
            if name == sup {
                return true;
            }
            current = self
                .classes
                .get(name)
                .and_then(|info| info.extends.as_deref());
        }
        false
    }

    /// Nominal subtyping: identity, the single-inheritance class chain,
    /// class-to-implemented-interface, and pointer covariance over those.
    pub fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (Type::DStr, Type::Str) => true,
            (Type::Class(a), Type::Class(b)) => self.class_derives_from(a, b),
            (Type::Class(a), Type::Interface(i)) => self.class_implements(a, i),
            (Type::Pointer(a), Type::Pointer(b)) => self.is_subtype(a, b),
            _ => false,
        }
    }

    /// Whether a value of type `value` may be assigned to a slot of type
    /// `target`.
    pub fn assignable(&self, target: &Type, value: &Type) -> bool {
        if matches!(value, Type::Null) && target.is_pointer() {
            return true;
        }
        self.is_subtype(value, target)
    }

    /// The emitted symbol of a method: `Class.name`, with the parameter types
    /// appended when the declaring class overloads the name. Layout (itable
    /// slots) and call sites must agree on this.
    pub fn method_symbol(&self, method: &MethodInfo) -> String {
        let overloaded = self
            .class(&method.declared_by)
            .map(|c| c.methods_named(&method.name).len() > 1)
            .unwrap_or(false);
        if overloaded {
            let params = method
                .params
                .iter()
                .map(Type::to_string)
                .collect::<Vec<_>>()
                .join("$");
            format!("{}.{}${}", method.declared_by, method.name, params)
        } else {
            format!("{}.{}", method.declared_by, method.name)
        }
    }

    /// The emitted symbol of a free function, mangled when overloaded.
    pub fn function_symbol(&self, func: &FunctionInfo) -> String {
        if self.functions(&func.name).len() > 1 {
            let params = func
                .params
                .iter()
                .map(Type::to_string)
                .collect::<Vec<_>>()
                .join("$");
            format!("{}${}", func.name, params)
        } else {
            func.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, extends: Option<&str>, implements: &[&str]) -> ClassInfo {
        ClassInfo {
            name: name.into(),
            type_params: Vec::new(),
            extends: extends.map(Into::into),
            implements: implements.iter().map(|s| s.to_string()).collect(),
            fields: Vec::new(),
            methods: Vec::new(),
            span: Span::default(),
        }
    }

    #[test]
    fn type_display() {
        let ty = Type::pointer(Type::Class("Counter".into()));
        assert_eq!(ty.to_string(), "Counter*");
        assert_eq!(Type::DStr.to_string(), "d_str");
    }

    #[test]
    fn builtin_lookup() {
        assert_eq!(Type::builtin("int"), Some(Type::Int));
        assert_eq!(Type::builtin("Counter"), None);
    }

    #[test]
    fn subtyping_follows_the_class_chain() {
        let mut reg = Registry::new();
        reg.add_class(class("Base", None, &[]));
        reg.add_class(class("Mid", Some("Base"), &["Shape"]));
        reg.add_class(class("Leaf", Some("Mid"), &[]));
        reg.add_interface(InterfaceInfo {
            name: "Shape".into(),
            methods: Vec::new(),
            span: Span::default(),
        });

        let leaf = Type::pointer(Type::Class("Leaf".into()));
        let base = Type::pointer(Type::Class("Base".into()));
        let shape = Type::pointer(Type::Interface("Shape".into()));

        assert!(reg.is_subtype(&leaf, &base));
        assert!(!reg.is_subtype(&base, &leaf));
        assert!(reg.is_subtype(&leaf, &shape));
        assert!(reg.class_implements("Leaf", "Shape"));
        assert!(!reg.class_implements("Base", "Shape"));
    }

    #[test]
    fn null_assigns_to_pointers_only() {
        let reg = Registry::new();
        let ptr = Type::pointer(Type::Class("Counter".into()));
        assert!(reg.assignable(&ptr, &Type::Null));
        assert!(!reg.assignable(&Type::Int, &Type::Null));
    }

    #[test]
    fn dstring_assigns_to_str() {
        let reg = Registry::new();
        assert!(reg.assignable(&Type::Str, &Type::DStr));
        assert!(!reg.assignable(&Type::DStr, &Type::Str));
    }

    #[test]
    fn no_implicit_numeric_widening() {
        let reg = Registry::new();
        assert!(!reg.assignable(&Type::Double, &Type::Int));
        assert!(!reg.assignable(&Type::Int, &Type::Float));
    }
}
