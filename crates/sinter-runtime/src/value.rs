//! Runtime values.

use sinter_core::RuntimeError;

/// The address of a storage location: a stack cell or an object field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Cell(usize),
    Field(usize, usize),
}

/// A runtime value. Object, D-string and document values are handles into
/// the machine's heaps.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Obj(usize),
    DStr(usize),
    Doc(usize),
    Addr(Address),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "str",
            Value::Obj(_) => "object",
            Value::DStr(_) => "d_str",
            Value::Doc(_) => "doc",
            Value::Addr(_) => "address",
            Value::Null => "null",
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(mismatch("boolean", other)),
        }
    }

    pub fn as_int(&self) -> Result<i32, RuntimeError> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch("int", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, RuntimeError> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(mismatch("str", other)),
        }
    }

    pub fn as_addr(&self) -> Result<Address, RuntimeError> {
        match self {
            Value::Addr(a) => Ok(*a),
            other => Err(mismatch("address", other)),
        }
    }

    /// Text for values with no heap indirection; the machine formats the
    /// rest.
    pub fn plain_text(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Double(v) => Some(v.to_string()),
            Value::Bool(v) => Some(v.to_string()),
            Value::Str(v) => Some(v.clone()),
            Value::Null => Some("null".to_string()),
            _ => None,
        }
    }
}

pub(crate) fn mismatch(expected: &str, actual: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}
