
use std::fmt::{Display, Formatter};

use crate::error::{format_error, trap, VmResult};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub fn from_byte(byte: u8) -> VmResult<Self> {
        match byte {
            0x7f => Ok(ValType::I32),
            0x7e => Ok(ValType::I64),
            0x7d => Ok(ValType::F32),
            0x7c => Ok(ValType::F64),
            other => Err(format_error!("unsupported value type {other:#04x}")),
        }
    }

    pub fn zero(self) -> Value {
        match self {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0.0),
            ValType::F64 => Value::F64(0.0),
        }
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

/// One value-stack slot. Booleans are `I32` 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    pub fn as_i32(self) -> VmResult<i32> {
        match self {
            Value::I32(v) => Ok(v),
            other => Err(trap!(TypeMismatch, "expected i32, found {other}")),
        }
    }

    pub fn as_i64(self) -> VmResult<i64> {
        match self {
            Value::I64(v) => Ok(v),
            other => Err(trap!(TypeMismatch, "expected i64, found {other}")),
        }
    }

    pub fn as_f32(self) -> VmResult<f32> {
        match self {
            Value::F32(v) => Ok(v),
            other => Err(trap!(TypeMismatch, "expected f32, found {other}")),
        }
    }

    pub fn as_f64(self) -> VmResult<f64> {
        match self {
            Value::F64(v) => Ok(v),
            other => Err(trap!(TypeMismatch, "expected f64, found {other}")),
        }
    }

    pub fn is_truthy(self) -> VmResult<bool> {
        self.as_i32().map(|v| v != 0)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32 {v}"),
            Value::I64(v) => write!(f, "i64 {v}"),
            Value::F32(v) => write!(f, "f32 {v}"),
            Value::F64(v) => write!(f, "f64 {v}"),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::I32(i32::from(value))
    }
}
