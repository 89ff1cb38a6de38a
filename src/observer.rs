//! Hook points inside the interpreter loop.
//!
//! The interpreter is generic over an [`Observer`]. With [`Silent`], the default,
//! `ACTIVE` is `false` and every hook call is compiled out of the loop.

use crate::error::VmResult;
use crate::interpreter::GlobalState;
use crate::module::Module;
use crate::structure::Node;
use crate::value::Value;

/// Who a frame is executing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Owner {
    Func(u32),
    Global(u32),
    Expr,
}

impl Owner {
    pub fn describe(self, module: &Module) -> String {
        match self {
            Owner::Func(func) => module.func_name(func),
            Owner::Global(index) => format!("global {index} initializer"),
            Owner::Expr => "constant expression".to_string(),
        }
    }
}

/// State visible at instruction fetch.
#[derive(Debug)]
pub struct Step<'a> {
    pub owner: Owner,
    pub node: &'a Node,
    pub scope_depth: usize,
    pub call_stack: &'a [Owner],
    pub locals: &'a [Value],
    pub stack: &'a [Value],
    pub globals: &'a [GlobalState],
}

pub trait Observer {
    const ACTIVE: bool = true;

    /// Called before `step.node` executes. An error aborts the call as a trap.
    fn step(&mut self, _step: &Step<'_>) -> VmResult<()> {
        Ok(())
    }

    fn enter(&mut self, _owner: Owner) {}

    fn leave(&mut self, _owner: Owner) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Observer for Silent {
    const ACTIVE: bool = false;
}
