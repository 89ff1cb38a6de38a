//! Evaluation of constant expressions such as global initializers and data
//! segment offsets.

#[cfg(test)]
mod test;

use std::sync::Arc;

use wasm_encoder::{CodeSection, Function, FunctionSection, TypeSection};

use crate::error::{trap, VmResult};
use crate::interpreter::{Config, Machine};
use crate::module::Module;
use crate::observer::Silent;
use crate::value::Value;

/// Runs `expr`, an instruction sequence ending in `end`, as the body of an
/// otherwise empty module and returns the first value it leaves.
pub fn evaluate(expr: &[u8]) -> VmResult<Value> {
    let bytes = wrap(expr);
    let module = Module::decode(&bytes)?;
    let mut machine = Machine::new(Arc::new(module), Config::default(), Silent);
    machine
        .evaluate(0)?
        .first()
        .copied()
        .ok_or_else(|| trap!(StackUnderflow, "constant expression left no value"))
}

fn wrap(expr: &[u8]) -> Vec<u8> {
    let mut types = TypeSection::new();
    types.function(vec![], vec![]);
    let mut functions = FunctionSection::new();
    functions.function(0);
    let mut body = Function::new(Vec::new());
    body.raw(expr.iter().copied());
    let mut codes = CodeSection::new();
    codes.function(&body);

    let mut module = wasm_encoder::Module::new();
    module.section(&types);
    module.section(&functions);
    module.section(&codes);
    module.finish()
}
