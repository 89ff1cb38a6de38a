//! Tree-walking interpreter over structured bodies.
//!
//! Guest calls never recurse on the host stack. Every call and every lazily
//! evaluated global initializer pushes a frame onto an explicit stack driven by
//! a single loop.

mod numeric;
#[cfg(test)]
mod test;

use std::sync::Arc;

use tracing::trace;

use crate::error::{trap, VmError, VmResult};
use crate::memory::Memory;
use crate::module::{DataMode, ImportKind, Module};
use crate::observer::{Observer, Owner, Step};
use crate::opcode::{self as op, Opcode};
use crate::structure::{Immediate, MemArg, Node};
use crate::value::Value;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 65536;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Config {
    /// Frames allowed on the call stack before a call traps.
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalState {
    /// An imported global the host has not provided.
    Unbound,
    /// A defined global whose initializer has not run yet.
    Pending,
    Evaluating,
    Ready(Value),
}

/// A host function bound to a function import. It gets the instance memory,
/// if there is one, next to the arguments.
pub type HostFunc = Box<dyn FnMut(Option<&mut Memory>, &[Value]) -> anyhow::Result<Option<Value>>>;

struct Scope<'m> {
    body: &'m [Node],
    pc: usize,
    height: usize,
    arity: usize,
    is_loop: bool,
}

struct Frame<'m> {
    owner: Owner,
    locals: Vec<Value>,
    stack: Vec<Value>,
    scopes: Vec<Scope<'m>>,
    /// How many values the caller receives; `None` hands over the whole stack.
    results: Option<usize>,
}

impl<'m> Frame<'m> {
    fn new(
        owner: Owner,
        module: &Module,
        root: &'m Node,
        locals: Vec<Value>,
        results: Option<usize>,
    ) -> Self {
        let (_, arity) = module.block_arity(root.block_type());
        Frame {
            owner,
            locals,
            stack: Vec::new(),
            scopes: vec![Scope {
                body: &root.body,
                pc: 0,
                height: 0,
                arity,
                is_loop: false,
            }],
            results,
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| trap!(StackUnderflow, "value stack is empty"))
    }

    fn peek(&self) -> VmResult<Value> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| trap!(StackUnderflow, "value stack is empty"))
    }

    fn pop_n(&mut self, count: usize) -> VmResult<Vec<Value>> {
        let len = self.stack.len();
        if len < count {
            return Err(trap!(
                StackUnderflow,
                "{count} value(s) needed but only {len} on the stack"
            ));
        }
        Ok(self.stack.split_off(len - count))
    }

    fn local(&self, index: u32) -> VmResult<Value> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or_else(|| trap!(StackUnderflow, "local {index} does not exist"))
    }

    fn local_mut(&mut self, index: u32) -> VmResult<&mut Value> {
        self.locals
            .get_mut(index as usize)
            .ok_or_else(|| trap!(StackUnderflow, "local {index} does not exist"))
    }

    fn enter(&mut self, module: &Module, node: &'m Node, body: &'m [Node]) {
        let (params, results) = module.block_arity(node.block_type());
        let is_loop = node.op == op::LOOP;
        self.scopes.push(Scope {
            body,
            pc: 0,
            height: self.stack.len().saturating_sub(params),
            arity: if is_loop { params } else { results },
            is_loop,
        });
    }

    /// Unwinds to the scope `depth` levels out. A loop is re-entered from its
    /// start; any other scope is left.
    fn branch(&mut self, depth: u32) -> VmResult<()> {
        let open = self.scopes.len();
        let depth = depth as usize;
        if depth >= open {
            return Err(trap!(
                InvalidBranch,
                "branch depth {depth} exceeds the {open} open scope(s)"
            ));
        }
        let target = open - 1 - depth;
        let scope = &self.scopes[target];
        let (height, arity, is_loop) = (scope.height, scope.arity, scope.is_loop);

        let kept = self.pop_n(arity)?;
        self.stack.truncate(height);
        self.stack.extend(kept);

        if is_loop {
            self.scopes.truncate(target + 1);
            self.scopes[target].pc = 0;
        } else {
            self.scopes.truncate(target);
        }
        Ok(())
    }

    fn finish(mut self) -> VmResult<Vec<Value>> {
        match self.results {
            None => Ok(self.stack),
            Some(count) => self.pop_n(count),
        }
    }
}

enum Flow {
    Next,
    Return,
    Call(u32, Vec<Value>),
    InitGlobal(u32),
}

pub(crate) struct Machine<O> {
    module: Arc<Module>,
    globals: Vec<GlobalState>,
    memory: Option<Memory>,
    datas: Vec<Option<Vec<u8>>>,
    host: Vec<Option<HostFunc>>,
    config: Config,
    observer: O,
}

impl<O: Observer> Machine<O> {
    pub(crate) fn new(module: Arc<Module>, config: Config, observer: O) -> Self {
        let globals = (0..module.imported_globals())
            .map(|_| GlobalState::Unbound)
            .chain(module.globals.iter().map(|_| GlobalState::Pending))
            .collect();
        let memory = module
            .imports
            .iter()
            .find_map(|import| match import.kind {
                ImportKind::Memory(limits) => Some(limits),
                _ => None,
            })
            .or_else(|| module.memories.first().copied())
            .map(Memory::new);
        let datas = module
            .datas
            .iter()
            .map(|data| match data.mode {
                DataMode::Passive => Some(data.bytes.clone()),
                DataMode::Active { .. } => None,
            })
            .collect();
        let host = (0..module.imported_funcs()).map(|_| None).collect();
        Machine {
            module,
            globals,
            memory,
            datas,
            host,
            config,
            observer,
        }
    }

    pub(crate) fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn globals(&self) -> &[GlobalState] {
        &self.globals
    }

    pub(crate) fn observer(&self) -> &O {
        &self.observer
    }

    pub(crate) fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub(crate) fn bind_func(&mut self, func: u32, host: HostFunc) {
        if let Some(slot) = self.host.get_mut(func as usize) {
            *slot = Some(host);
        }
    }

    pub(crate) fn bind_global(&mut self, index: u32, value: Value) {
        if let Some(slot) = self.globals.get_mut(index as usize) {
            *slot = GlobalState::Ready(value);
        }
    }

    pub(crate) fn write_active_data(&mut self) -> VmResult<()> {
        let module = Arc::clone(&self.module);
        for (index, data) in module.datas.iter().enumerate() {
            let DataMode::Active { offset, .. } = data.mode else {
                continue;
            };
            let memory = self.memory.as_mut().ok_or_else(|| {
                trap!(
                    MemoryOutOfBounds,
                    "data segment {index} targets a module without memory"
                )
            })?;
            memory.store(offset, 0, &data.bytes)?;
            trace!(index, offset, len = data.bytes.len(), "wrote data segment");
        }
        Ok(())
    }

    pub(crate) fn invoke(&mut self, func: u32, args: &[Value]) -> VmResult<Vec<Value>> {
        let module = Arc::clone(&self.module);
        let ty = module
            .func_type(func)
            .ok_or_else(|| trap!(Unimplemented, "function {func} does not exist"))?;
        if func < module.imported_funcs() {
            return self.call_host(&module, func, args);
        }
        let frame = function_frame(
            &module,
            Owner::Func(func),
            func,
            args.to_vec(),
            Some(ty.results.len()),
        )?;
        self.run(&module, frame)
    }

    /// Runs `func` and returns everything left on its value stack.
    pub(crate) fn evaluate(&mut self, func: u32) -> VmResult<Vec<Value>> {
        let module = Arc::clone(&self.module);
        let frame = function_frame(&module, Owner::Expr, func, Vec::new(), None)?;
        self.run(&module, frame)
    }

    pub(crate) fn read_global(&mut self, index: u32) -> VmResult<Value> {
        if let Some(value) = claim_global(&mut self.globals, index)? {
            return Ok(value);
        }
        let module = Arc::clone(&self.module);
        let frame = global_frame(&module, index)?;
        let values = self.run(&module, frame)?;
        values
            .first()
            .copied()
            .ok_or_else(|| trap!(UninitializedGlobal, "global {index} has no value"))
    }

    fn run<'m>(&mut self, module: &'m Module, entry: Frame<'m>) -> VmResult<Vec<Value>> {
        let result = self.execute(module, entry);
        if result.is_err() {
            for state in &mut self.globals {
                if *state == GlobalState::Evaluating {
                    *state = GlobalState::Pending;
                }
            }
        }
        result
    }

    fn execute<'m>(&mut self, module: &'m Module, entry: Frame<'m>) -> VmResult<Vec<Value>> {
        let mut owners = vec![entry.owner];
        let mut frames = vec![entry];
        if O::ACTIVE {
            self.observer.enter(owners[0]);
        }

        loop {
            let Some(frame) = frames.last_mut() else {
                return Ok(Vec::new());
            };

            let Some(scope) = frame.scopes.last_mut() else {
                let finished = frames.pop().expect("a frame is active");
                owners.pop();
                if O::ACTIVE {
                    self.observer.leave(finished.owner);
                }
                let owner = finished.owner;
                let values = finished
                    .finish()
                    .map_err(|error| error.at("end", &owner.describe(module), 0))?;
                let value = match owner {
                    Owner::Global(index) => {
                        let value = values.first().copied().ok_or_else(|| {
                            trap!(
                                UninitializedGlobal,
                                "initializer of global {index} left no value"
                            )
                        })?;
                        self.globals[index as usize] = GlobalState::Ready(value);
                        trace!(index, %value, "memoized global");
                        Some(value)
                    }
                    _ => None,
                };
                match (frames.last_mut(), value) {
                    (Some(caller), Some(value)) => caller.push(value),
                    (Some(caller), None) => caller.stack.extend(values),
                    (None, _) => return Ok(values),
                }
                continue;
            };

            let Some(node) = scope.body.get(scope.pc) else {
                frame.scopes.pop();
                continue;
            };
            scope.pc += 1;
            let depth = frame.scopes.len();

            if O::ACTIVE {
                let step = Step {
                    owner: frame.owner,
                    node,
                    scope_depth: depth,
                    call_stack: &owners,
                    locals: &frame.locals,
                    stack: &frame.stack,
                    globals: &self.globals,
                };
                self.observer
                    .step(&step)
                    .map_err(|error| annotate(error, module, frame.owner, node.op, depth))?;
            }

            let owner = frame.owner;
            let flow = self
                .step(module, frame, node)
                .map_err(|error| annotate(error, module, owner, node.op, depth))?;

            let callee = match flow {
                Flow::Next => continue,
                Flow::Return => {
                    frame.scopes.clear();
                    continue;
                }
                Flow::Call(func, args) => {
                    let results = module.func_type(func).map(|ty| ty.results.len());
                    function_frame(module, Owner::Func(func), func, args, results)
                }
                Flow::InitGlobal(index) => global_frame(module, index),
            }
            .map_err(|error| annotate(error, module, owner, node.op, depth))?;

            if frames.len() >= self.config.max_call_depth {
                let error = trap!(
                    CallStackExhausted,
                    "more than {} nested calls",
                    self.config.max_call_depth
                );
                return Err(annotate(error, module, owner, node.op, depth));
            }
            trace!(callee = %callee.owner.describe(module), depth = frames.len(), "push frame");
            if O::ACTIVE {
                self.observer.enter(callee.owner);
            }
            owners.push(callee.owner);
            frames.push(callee);
        }
    }

    fn step<'m>(
        &mut self,
        module: &'m Module,
        frame: &mut Frame<'m>,
        node: &'m Node,
    ) -> VmResult<Flow> {
        match (node.op, &node.imm) {
            (op::UNREACHABLE, _) => return Err(trap!(Unreachable, "`unreachable` executed")),
            // Handlers never run: nothing can be caught, so `try` is a block.
            (op::BLOCK | op::LOOP | op::TRY, _) => frame.enter(module, node, &node.body),
            (op::DELEGATE, _) => {}
            (op::IF, _) => {
                if frame.pop()?.is_truthy()? {
                    frame.enter(module, node, &node.body);
                } else if let Some(else_body) = &node.else_body {
                    frame.enter(module, node, else_body);
                }
            }
            (op::BR, Immediate::Depth(depth)) => frame.branch(*depth)?,
            (op::BR_IF, Immediate::Depth(depth)) => {
                if frame.pop()?.is_truthy()? {
                    frame.branch(*depth)?;
                }
            }
            (op::BR_TABLE, Immediate::Table { targets, default }) => {
                let index = frame.pop()?.as_i32()? as u32 as usize;
                frame.branch(targets.get(index).copied().unwrap_or(*default))?;
            }
            (op::RETURN, _) => return Ok(Flow::Return),
            (op::CALL, Immediate::Call(target)) => {
                let args = frame.pop_n(target.params)?;
                if target.import.is_none() {
                    return Ok(Flow::Call(target.func, args));
                }
                let values = self.call_host(module, target.func, &args)?;
                frame.stack.extend(values);
            }
            (op::CALL_INDIRECT, _) => {
                return Err(trap!(
                    Unimplemented,
                    "`call_indirect` needs a table and tables are not supported"
                ))
            }
            (op::THROW, Immediate::Tag(tag)) => {
                return Err(trap!(
                    UncaughtException,
                    "exception with tag {tag} thrown and never caught"
                ))
            }
            (op::RETHROW, _) => {
                return Err(trap!(
                    UncaughtException,
                    "`rethrow` outside a running handler"
                ))
            }
            (op::DROP, _) => {
                frame.pop()?;
            }
            (op::SELECT, _) => {
                let condition = frame.pop()?.is_truthy()?;
                let second = frame.pop()?;
                let first = frame.pop()?;
                frame.push(if condition { first } else { second });
            }
            (op::LOCAL_GET, Immediate::Local(index)) => {
                let value = frame.local(*index)?;
                frame.push(value);
            }
            (op::LOCAL_SET, Immediate::Local(index)) => {
                let value = frame.pop()?;
                *frame.local_mut(*index)? = value;
            }
            (op::LOCAL_TEE, Immediate::Local(index)) => {
                let value = frame.peek()?;
                *frame.local_mut(*index)? = value;
            }
            (op::GLOBAL_GET, Immediate::Global(index)) => {
                match claim_global(&mut self.globals, *index)? {
                    Some(value) => frame.push(value),
                    None => return Ok(Flow::InitGlobal(*index)),
                }
            }
            (op::GLOBAL_SET, Immediate::Global(index)) => {
                let value = frame.pop()?;
                let slot = self
                    .globals
                    .get_mut(*index as usize)
                    .ok_or_else(|| trap!(UninitializedGlobal, "global {index} does not exist"))?;
                *slot = GlobalState::Ready(value);
            }
            (op::I32_LOAD..=op::I64_LOAD32_U, Immediate::Memory(arg)) => {
                self.load(node.op, *arg, frame)?
            }
            (op::I32_STORE..=op::I64_STORE32, Immediate::Memory(arg)) => {
                self.store(node.op, *arg, frame)?
            }
            (op::MEMORY_SIZE, _) => {
                let pages = self.memory_mut()?.pages();
                frame.push(Value::I32(pages as i32));
            }
            (op::MEMORY_GROW, _) => {
                let delta = frame.pop()?.as_i32()? as u32;
                let old = self.memory_mut()?.grow(delta);
                frame.push(Value::I32(old.map_or(-1, |pages| pages as i32)));
            }
            (op::MEMORY_FILL, _) => {
                let len = frame.pop()?.as_i32()? as u32;
                let value = frame.pop()?.as_i32()? as u8;
                let dst = frame.pop()?.as_i32()? as u32;
                self.memory_mut()?.fill(dst, value, len)?;
            }
            (op::MEMORY_COPY, _) => {
                let len = frame.pop()?.as_i32()? as u32;
                let src = frame.pop()?.as_i32()? as u32;
                let dst = frame.pop()?.as_i32()? as u32;
                self.memory_mut()?.copy_within(dst, src, len)?;
            }
            (op::MEMORY_INIT, Immediate::Data(index)) => {
                let len = frame.pop()?.as_i32()? as u32 as usize;
                let src = frame.pop()?.as_i32()? as u32 as usize;
                let dst = frame.pop()?.as_i32()? as u32;
                let segment = match self.datas.get(*index as usize) {
                    Some(segment) => segment.as_deref().unwrap_or_default(),
                    None => {
                        return Err(trap!(
                            MemoryOutOfBounds,
                            "data segment {index} does not exist"
                        ))
                    }
                };
                let bytes = src
                    .checked_add(len)
                    .and_then(|end| segment.get(src..end))
                    .ok_or_else(|| {
                        trap!(
                            MemoryOutOfBounds,
                            "{len} byte(s) at {src} exceed data segment {index} of {} byte(s)",
                            segment.len()
                        )
                    })?
                    .to_vec();
                self.memory_mut()?.store(dst, 0, &bytes)?;
            }
            (op::DATA_DROP, Immediate::Data(index)) => {
                if let Some(segment) = self.datas.get_mut(*index as usize) {
                    *segment = None;
                }
            }
            (op::I32_CONST, Immediate::I32(value)) => frame.push(Value::I32(*value)),
            (op::I64_CONST, Immediate::I64(value)) => frame.push(Value::I64(*value)),
            (op::F32_CONST, Immediate::F32(value)) => frame.push(Value::F32(*value)),
            (op::F64_CONST, Immediate::F64(value)) => frame.push(Value::F64(*value)),
            (code, _) => {
                if !numeric::execute(code, &mut frame.stack)? {
                    return Err(trap!(
                        Unimplemented,
                        "opcode {code:#04x} is not implemented"
                    ));
                }
            }
        }
        Ok(Flow::Next)
    }

    fn memory_mut(&mut self) -> VmResult<&mut Memory> {
        self.memory
            .as_mut()
            .ok_or_else(|| trap!(MemoryOutOfBounds, "module has no memory"))
    }

    fn load(&mut self, code: Opcode, arg: MemArg, frame: &mut Frame) -> VmResult<()> {
        let addr = frame.pop()?.as_i32()? as u32;
        let memory = self.memory_mut()?;
        let offset = arg.offset;
        let value = match code {
            op::I32_LOAD => Value::I32(i32::from_le_bytes(memory.load(addr, offset)?)),
            op::I64_LOAD => Value::I64(i64::from_le_bytes(memory.load(addr, offset)?)),
            op::F32_LOAD => Value::F32(f32::from_le_bytes(memory.load(addr, offset)?)),
            op::F64_LOAD => Value::F64(f64::from_le_bytes(memory.load(addr, offset)?)),
            op::I32_LOAD8_S => Value::I32(i8::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I32_LOAD8_U => Value::I32(u8::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I32_LOAD16_S => Value::I32(i16::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I32_LOAD16_U => Value::I32(u16::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I64_LOAD8_S => Value::I64(i8::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I64_LOAD8_U => Value::I64(u8::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I64_LOAD16_S => Value::I64(i16::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I64_LOAD16_U => Value::I64(u16::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I64_LOAD32_S => Value::I64(i32::from_le_bytes(memory.load(addr, offset)?).into()),
            op::I64_LOAD32_U => Value::I64(u32::from_le_bytes(memory.load(addr, offset)?).into()),
            other => return Err(trap!(Unimplemented, "opcode {other:#04x} is not a load")),
        };
        frame.push(value);
        Ok(())
    }

    fn store(&mut self, code: Opcode, arg: MemArg, frame: &mut Frame) -> VmResult<()> {
        let value = frame.pop()?;
        let addr = frame.pop()?.as_i32()? as u32;
        let memory = self.memory_mut()?;
        let offset = arg.offset;
        match code {
            op::I32_STORE => memory.store(addr, offset, &value.as_i32()?.to_le_bytes()),
            op::I64_STORE => memory.store(addr, offset, &value.as_i64()?.to_le_bytes()),
            op::F32_STORE => memory.store(addr, offset, &value.as_f32()?.to_le_bytes()),
            op::F64_STORE => memory.store(addr, offset, &value.as_f64()?.to_le_bytes()),
            op::I32_STORE8 => memory.store(addr, offset, &[value.as_i32()? as u8]),
            op::I32_STORE16 => memory.store(addr, offset, &(value.as_i32()? as u16).to_le_bytes()),
            op::I64_STORE8 => memory.store(addr, offset, &[value.as_i64()? as u8]),
            op::I64_STORE16 => memory.store(addr, offset, &(value.as_i64()? as u16).to_le_bytes()),
            op::I64_STORE32 => memory.store(addr, offset, &(value.as_i64()? as u32).to_le_bytes()),
            other => Err(trap!(Unimplemented, "opcode {other:#04x} is not a store")),
        }
    }

    fn call_host(&mut self, module: &Module, func: u32, args: &[Value]) -> VmResult<Vec<Value>> {
        let results = module.func_type(func).map_or(0, |ty| ty.results.len());
        let host = self
            .host
            .get_mut(func as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| trap!(UnboundImport, "import `{}` is not bound", module.func_name(func)))?;
        let value = host(self.memory.as_mut(), args).map_err(|error| {
            trap!(Host, "import `{}` failed: {error:#}", module.func_name(func))
        })?;
        match (results, value) {
            (0, _) => Ok(Vec::new()),
            (_, Some(value)) => Ok(vec![value]),
            (_, None) => Err(trap!(
                Host,
                "import `{}` returned no value",
                module.func_name(func)
            )),
        }
    }
}

/// Returns the cached value of a global, or marks it as evaluating and returns
/// `None` when its initializer has to run first.
fn claim_global(globals: &mut [GlobalState], index: u32) -> VmResult<Option<Value>> {
    let state = globals.get(index as usize).copied();
    match state {
        Some(GlobalState::Ready(value)) => Ok(Some(value)),
        Some(GlobalState::Pending) => {
            globals[index as usize] = GlobalState::Evaluating;
            Ok(None)
        }
        Some(GlobalState::Evaluating) => Err(trap!(
            UninitializedGlobal,
            "global {index} is read while its own initializer is running"
        )),
        Some(GlobalState::Unbound) => Err(trap!(
            UnboundImport,
            "imported global {index} was not given a value"
        )),
        None => Err(trap!(UninitializedGlobal, "global {index} does not exist")),
    }
}

fn function_frame(
    module: &Module,
    owner: Owner,
    func: u32,
    args: Vec<Value>,
    results: Option<usize>,
) -> VmResult<Frame<'_>> {
    let code = module.code(func).ok_or_else(|| {
        trap!(
            UnboundImport,
            "`{}` has no body to execute",
            module.func_name(func)
        )
    })?;
    let mut locals: Vec<Value> = code.locals.iter().map(|ty| ty.zero()).collect();
    for (slot, arg) in locals.iter_mut().take(code.params).zip(args) {
        *slot = arg;
    }
    Ok(Frame::new(owner, module, &code.body, locals, results))
}

fn global_frame(module: &Module, index: u32) -> VmResult<Frame<'_>> {
    let global = index
        .checked_sub(module.imported_globals())
        .and_then(|local| module.globals.get(local as usize))
        .ok_or_else(|| trap!(UninitializedGlobal, "global {index} has no initializer"))?;
    Ok(Frame::new(
        Owner::Global(index),
        module,
        &global.body,
        Vec::new(),
        None,
    ))
}

fn annotate(error: VmError, module: &Module, owner: Owner, code: Opcode, depth: usize) -> VmError {
    if !error.is_trap() {
        return error;
    }
    let name = op::name(code).unwrap_or("unknown");
    error.at(name, &owner.describe(module), depth)
}
