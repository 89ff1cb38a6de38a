use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{kind}: {msg}")]
pub struct VmError {
    pub msg: String,
    pub kind: ErrorKind,
}

pub type VmResult<T> = Result<T, VmError>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Format,
    Structure,
    Trap(TrapCode),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrapCode {
    Unreachable,
    Unimplemented,
    DivisionByZero,
    IntegerOverflow,
    InvalidConversion,
    MemoryOutOfBounds,
    StackUnderflow,
    TypeMismatch,
    InvalidBranch,
    UnboundImport,
    Host,
    CallStackExhausted,
    UninitializedGlobal,
    UncaughtException,
    Interrupted,
    Reentrant,
}

impl VmError {
    pub fn is_trap(&self) -> bool {
        matches!(self.kind, ErrorKind::Trap(_))
    }

    pub fn trap_code(&self) -> Option<TrapCode> {
        match self.kind {
            ErrorKind::Trap(code) => Some(code),
            _ => None,
        }
    }

    /// Appends the execution site to a trap message. Only the innermost site is
    /// recorded; the interpreter calls this once, where the trap was raised.
    pub(crate) fn at(mut self, op: &str, function: &str, depth: usize) -> Self {
        self.msg = format!(
            "{msg} (at `{op}` in `{function}`, scope depth {depth})",
            msg = self.msg
        );
        self
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Format => write!(f, "Format Error"),
            ErrorKind::Structure => write!(f, "Structure Error"),
            ErrorKind::Trap(code) => write!(f, "Trap ({code})"),
        }
    }
}

impl Display for TrapCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TrapCode::Unreachable => "unreachable",
            TrapCode::Unimplemented => "unimplemented opcode",
            TrapCode::DivisionByZero => "integer divide by zero",
            TrapCode::IntegerOverflow => "integer overflow",
            TrapCode::InvalidConversion => "invalid conversion to integer",
            TrapCode::MemoryOutOfBounds => "out of bounds memory access",
            TrapCode::StackUnderflow => "value stack underflow",
            TrapCode::TypeMismatch => "type mismatch",
            TrapCode::InvalidBranch => "invalid branch depth",
            TrapCode::UnboundImport => "unbound import",
            TrapCode::Host => "host error",
            TrapCode::CallStackExhausted => "call stack exhausted",
            TrapCode::UninitializedGlobal => "uninitialized global",
            TrapCode::UncaughtException => "uncaught exception",
            TrapCode::Interrupted => "interrupted",
            TrapCode::Reentrant => "re-entrant call",
        };
        f.write_str(text)
    }
}

macro_rules! format_error {
    ($($format:tt)*) => {
        $crate::error::VmError {
            msg: format!($($format)*),
            kind: $crate::error::ErrorKind::Format,
        }
    };
}

macro_rules! structure_error {
    ($($format:tt)*) => {
        $crate::error::VmError {
            msg: format!($($format)*),
            kind: $crate::error::ErrorKind::Structure,
        }
    };
}

macro_rules! trap {
    ($code:ident, $($format:tt)*) => {
        $crate::error::VmError {
            msg: format!($($format)*),
            kind: $crate::error::ErrorKind::Trap($crate::error::TrapCode::$code),
        }
    };
}

pub(crate) use format_error;
pub(crate) use structure_error;
pub(crate) use trap;
