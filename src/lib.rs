//! A small WebAssembly virtual machine.
//!
//! Binary modules are decoded into [`Module`]s whose function bodies are trees
//! of [`Node`]s rather than flat instruction streams. An [`Instance`] binds a
//! module to host imports and runs its exports with a tree-walking interpreter.
//! [`consteval::evaluate`] runs a lone constant expression on the same
//! interpreter.

pub mod consteval;
#[cfg(feature = "debugger")]
pub mod debug;
pub mod error;
pub mod instance;
mod interpreter;
pub mod memory;
pub mod module;
pub mod observer;
pub mod opcode;
pub mod reader;
pub mod structure;
#[cfg(test)]
mod testing;
pub mod value;

pub use error::{ErrorKind, TrapCode, VmError, VmResult};
pub use instance::{ExportedFunc, Imports, Instance};
pub use interpreter::{Config, GlobalState, HostFunc, DEFAULT_MAX_CALL_DEPTH};
pub use memory::Memory;
pub use module::{decode_module, Module};
pub use observer::{Observer, Owner, Silent, Step};
pub use structure::Node;
pub use value::{ValType, Value};
