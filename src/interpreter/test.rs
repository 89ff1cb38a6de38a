use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use wasm_encoder::{BlockType, Instruction as I, MemArg, ValType as T};

use super::{Config, GlobalState, Machine};
use crate::error::{ErrorKind, TrapCode, VmError};
use crate::memory::Memory;
use crate::module::{Module, MAGIC, VERSION};
use crate::observer::{Observer, Owner, Silent, Step};
use crate::testing::{print, TestModule};
use crate::value::Value;

fn machine<O: Observer>(test: &TestModule, config: Config, observer: O) -> Machine<O> {
    let bytes = test.finish();
    let module = Module::decode(&bytes).unwrap_or_else(|error| panic!("{error}\n{}", print(&bytes)));
    Machine::new(Arc::new(module), config, observer)
}

fn run(test: &TestModule, func: u32, args: &[Value]) -> Result<Vec<Value>, VmError> {
    let mut machine = machine(test, Config::default(), Silent);
    machine.write_active_data()?;
    machine.invoke(func, args)
}

fn trap_code(error: VmError) -> TrapCode {
    match error.kind {
        ErrorKind::Trap(code) => code,
        other => panic!("expected a trap, got {other}: {error}"),
    }
}

fn mem(offset: u64) -> MemArg {
    MemArg {
        offset,
        align: 0,
        memory_index: 0,
    }
}

#[test]
fn test_loop_br_if_counts_to_five() {
    let mut test = TestModule::new();
    let func = test.func(
        &[],
        &[T::I32],
        &[T::I32],
        &[
            I::Loop(BlockType::Empty),
            I::LocalGet(0),
            I::I32Const(1),
            I::I32Add,
            I::LocalTee(0),
            I::I32Const(5),
            I::I32LtS,
            I::BrIf(0),
            I::End,
            I::LocalGet(0),
        ],
    );
    assert_eq!(run(&test, func, &[]).unwrap(), vec![Value::I32(5)]);
}

#[test]
fn test_br_exits_block_and_continues_after_it() {
    let mut test = TestModule::new();
    let func = test.func(
        &[],
        &[T::I32],
        &[T::I32],
        &[
            I::Block(BlockType::Empty),
            I::I32Const(1),
            I::LocalSet(0),
            I::Br(0),
            I::I32Const(99),
            I::LocalSet(0),
            I::End,
            I::LocalGet(0),
            I::I32Const(10),
            I::I32Add,
        ],
    );
    assert_eq!(run(&test, func, &[]).unwrap(), vec![Value::I32(11)]);
}

#[test]
fn test_branch_keeps_block_results() {
    let mut test = TestModule::new();
    let func = test.func(
        &[],
        &[T::I32],
        &[],
        &[
            I::Block(BlockType::Result(T::I32)),
            I::I32Const(7),
            I::I32Const(8),
            I::Br(0),
            I::End,
        ],
    );
    assert_eq!(run(&test, func, &[]).unwrap(), vec![Value::I32(8)]);
}

#[test]
fn test_if_else() {
    let mut test = TestModule::new();
    let func = test.func(
        &[T::I32],
        &[T::I32],
        &[],
        &[
            I::LocalGet(0),
            I::If(BlockType::Result(T::I32)),
            I::I32Const(10),
            I::Else,
            I::I32Const(20),
            I::End,
        ],
    );
    assert_eq!(run(&test, func, &[Value::I32(3)]).unwrap(), vec![Value::I32(10)]);
    assert_eq!(run(&test, func, &[Value::I32(0)]).unwrap(), vec![Value::I32(20)]);
}

#[test]
fn test_br_table() {
    let mut test = TestModule::new();
    let func = test.func(
        &[T::I32],
        &[T::I32],
        &[],
        &[
            I::Block(BlockType::Empty),
            I::Block(BlockType::Empty),
            I::Block(BlockType::Empty),
            I::LocalGet(0),
            I::BrTable(Cow::Borrowed(&[0, 1]), 2),
            I::End,
            I::I32Const(100),
            I::Return,
            I::End,
            I::I32Const(200),
            I::Return,
            I::End,
            I::I32Const(300),
        ],
    );
    let results: Vec<Vec<Value>> = [0, 1, 2, 9]
        .iter()
        .map(|arg| run(&test, func, &[Value::I32(*arg)]).unwrap())
        .collect();
    assert_eq!(
        results,
        vec![
            vec![Value::I32(100)],
            vec![Value::I32(200)],
            vec![Value::I32(300)],
            vec![Value::I32(300)]
        ]
    );
}

#[test]
fn test_return_leaves_nested_scopes() {
    let mut test = TestModule::new();
    let func = test.func(
        &[],
        &[T::I32],
        &[],
        &[
            I::Block(BlockType::Empty),
            I::Loop(BlockType::Empty),
            I::I32Const(4),
            I::Return,
            I::End,
            I::End,
            I::I32Const(5),
        ],
    );
    assert_eq!(run(&test, func, &[]).unwrap(), vec![Value::I32(4)]);
}

#[test]
fn test_function_keeps_top_results() {
    // Leaves two values for a one-result signature. Not valid wasm, but the
    // interpreter does not validate.
    let mut bytes = [MAGIC, VERSION].concat();
    bytes.extend([0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f]);
    bytes.extend([0x03, 0x02, 0x01, 0x00]);
    bytes.extend([0x0a, 0x08, 0x01, 0x06, 0x00, 0x41, 0x01, 0x41, 0x02, 0x0b]);
    let module = Module::decode(&bytes).unwrap();
    let mut machine = Machine::new(Arc::new(module), Config::default(), Silent);
    assert_eq!(machine.invoke(0, &[]).unwrap(), vec![Value::I32(2)]);
    assert_eq!(
        machine.evaluate(0).unwrap(),
        vec![Value::I32(1), Value::I32(2)]
    );
}

#[test]
fn test_recursive_factorial() {
    let mut test = TestModule::new();
    let fac = test.func(
        &[T::I64],
        &[T::I64],
        &[],
        &[
            I::LocalGet(0),
            I::I64Const(1),
            I::I64LeS,
            I::If(BlockType::Result(T::I64)),
            I::I64Const(1),
            I::Else,
            I::LocalGet(0),
            I::LocalGet(0),
            I::I64Const(1),
            I::I64Sub,
            I::Call(0),
            I::I64Mul,
            I::End,
        ],
    );
    assert_eq!(
        run(&test, fac, &[Value::I64(20)]).unwrap(),
        vec![Value::I64(2_432_902_008_176_640_000)]
    );
}

#[test]
fn test_deep_recursion_does_not_use_the_host_stack() {
    let mut test = TestModule::new();
    let countdown = test.func(
        &[T::I32],
        &[T::I32],
        &[],
        &[
            I::LocalGet(0),
            I::I32Eqz,
            I::If(BlockType::Result(T::I32)),
            I::I32Const(0),
            I::Else,
            I::LocalGet(0),
            I::I32Const(1),
            I::I32Sub,
            I::Call(0),
            I::I32Const(1),
            I::I32Add,
            I::End,
        ],
    );
    assert_eq!(
        run(&test, countdown, &[Value::I32(50_000)]).unwrap(),
        vec![Value::I32(50_000)]
    );

    let mut machine = machine(&test, Config::default().with_max_call_depth(100), Silent);
    let error = machine.invoke(countdown, &[Value::I32(1000)]).unwrap_err();
    assert_eq!(trap_code(error), TrapCode::CallStackExhausted);
}

#[test]
fn test_argument_order() {
    let mut test = TestModule::new();
    let none = test.func(&[], &[T::I32], &[], &[I::I32Const(7)]);
    let one = test.func(&[T::I32], &[T::I32], &[], &[I::LocalGet(0)]);
    let two = test.func(
        &[T::I32, T::I32],
        &[T::I32],
        &[],
        &[I::LocalGet(0), I::LocalGet(1), I::I32Sub],
    );
    let three = test.func(
        &[T::I32, T::I32, T::I32],
        &[T::I32],
        &[],
        &[
            I::LocalGet(0),
            I::I32Const(100),
            I::I32Mul,
            I::LocalGet(1),
            I::I32Const(10),
            I::I32Mul,
            I::I32Add,
            I::LocalGet(2),
            I::I32Add,
        ],
    );
    let caller = test.func(
        &[],
        &[T::I32],
        &[],
        &[
            I::Call(none),
            I::Call(one),
            I::I32Const(3),
            I::Call(two),
            I::I32Const(5),
            I::I32Const(9),
            I::Call(three),
        ],
    );
    // (7 - 3) * 100 + 5 * 10 + 9
    assert_eq!(run(&test, caller, &[]).unwrap(), vec![Value::I32(459)]);
    assert_eq!(
        run(&test, three, &[Value::I32(1), Value::I32(2), Value::I32(3)]).unwrap(),
        vec![Value::I32(123)]
    );
}

#[test]
fn test_host_calls_receive_arguments_in_order() {
    let mut test = TestModule::new();
    let log = test.import_func("env", "log", &[T::I32, T::I32], &[T::I32]);
    let func = test.func(
        &[],
        &[T::I32],
        &[],
        &[I::I32Const(1), I::I32Const(2), I::Call(log)],
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut machine = machine(&test, Config::default(), Silent);
    let record = Rc::clone(&seen);
    machine.bind_func(
        log,
        Box::new(move |_: Option<&mut Memory>, args: &[Value]| {
            record.borrow_mut().extend_from_slice(args);
            Ok(Some(Value::I32(42)))
        }),
    );
    assert_eq!(machine.invoke(func, &[]).unwrap(), vec![Value::I32(42)]);
    assert_eq!(*seen.borrow(), vec![Value::I32(1), Value::I32(2)]);
}

#[test]
fn test_host_errors_and_unbound_imports_trap() {
    let mut test = TestModule::new();
    let fail = test.import_func("env", "fail", &[], &[]);
    let func = test.func(&[], &[], &[], &[I::Call(fail)]);

    let mut unbound = machine(&test, Config::default(), Silent);
    let error = unbound.invoke(func, &[]).unwrap_err();
    assert!(error.msg.contains("env.fail"), "{error}");
    assert_eq!(trap_code(error), TrapCode::UnboundImport);

    let mut bound = machine(&test, Config::default(), Silent);
    bound.bind_func(
        fail,
        Box::new(|_: Option<&mut Memory>, _: &[Value]| anyhow::bail!("disk on fire")),
    );
    let error = bound.invoke(func, &[]).unwrap_err();
    assert!(error.msg.contains("disk on fire"), "{error}");
    assert_eq!(trap_code(error), TrapCode::Host);
}

#[test]
fn test_traps_name_the_site() {
    let mut test = TestModule::new();
    let func = test.func(
        &[],
        &[],
        &[],
        &[I::Block(BlockType::Empty), I::Unreachable, I::End],
    );
    test.export("explode", func);
    let error = run(&test, func, &[]).unwrap_err();
    assert!(error.msg.contains("`unreachable`"), "{error}");
    assert!(error.msg.contains("`explode`"), "{error}");
    assert!(error.msg.contains("scope depth 2"), "{error}");
    assert_eq!(trap_code(error), TrapCode::Unreachable);

    let mut test = TestModule::new();
    let func = test.func(
        &[],
        &[T::I32],
        &[],
        &[I::I32Const(1), I::I32Const(0), I::I32DivU],
    );
    let error = run(&test, func, &[]).unwrap_err();
    assert!(error.msg.contains("i32.div_u"), "{error}");
    assert_eq!(trap_code(error), TrapCode::DivisionByZero);
}

#[test]
fn test_globals_are_initialized_lazily_and_once() {
    let mut test = TestModule::new();
    let tick = test.import_func("env", "tick", &[], &[T::I32]);
    let helper = test.func(&[], &[T::I32], &[], &[I::Call(tick)]);
    let first = test.global(T::I32, true, &[I::I32Const(5)]);
    let second = test.global(T::I32, false, &[I::Call(helper)]);
    let func = test.func(
        &[],
        &[T::I32],
        &[],
        &[
            I::GlobalGet(second),
            I::GlobalGet(second),
            I::I32Add,
            I::GlobalGet(first),
            I::I32Add,
        ],
    );
    let calls = Rc::new(RefCell::new(0));
    let mut machine = machine(&test, Config::default(), Silent);
    let counter = Rc::clone(&calls);
    machine.bind_func(
        tick,
        Box::new(move |_: Option<&mut Memory>, _: &[Value]| {
            *counter.borrow_mut() += 1;
            Ok(Some(Value::I32(10)))
        }),
    );
    assert_eq!(machine.globals()[first as usize], GlobalState::Pending);
    assert_eq!(machine.invoke(func, &[]).unwrap(), vec![Value::I32(25)]);
    assert_eq!(machine.invoke(func, &[]).unwrap(), vec![Value::I32(25)]);
    assert_eq!(*calls.borrow(), 1);
    assert_eq!(
        machine.globals()[second as usize],
        GlobalState::Ready(Value::I32(10))
    );
}

#[test]
fn test_global_set_overrides_initializer() {
    let mut test = TestModule::new();
    let global = test.global(T::I64, true, &[I::I64Const(1)]);
    let func = test.func(
        &[],
        &[T::I64],
        &[],
        &[I::I64Const(9), I::GlobalSet(global), I::GlobalGet(global)],
    );
    assert_eq!(run(&test, func, &[]).unwrap(), vec![Value::I64(9)]);
}

#[test]
fn test_cyclic_globals_trap() {
    let mut test = TestModule::new();
    let a = test.global(T::I32, false, &[I::GlobalGet(1)]);
    test.global(T::I32, false, &[I::GlobalGet(0)]);
    let func = test.func(&[], &[T::I32], &[], &[I::GlobalGet(a)]);
    let bytes = test.finish();
    let module = Module::decode(&bytes).unwrap();
    let mut machine = Machine::new(Arc::new(module), Config::default(), Silent);
    let error = machine.invoke(func, &[]).unwrap_err();
    assert_eq!(trap_code(error), TrapCode::UninitializedGlobal);
    assert!(machine
        .globals()
        .iter()
        .all(|state| *state == GlobalState::Pending));
}

#[test]
fn test_read_global() {
    let mut test = TestModule::new();
    let global = test.global(T::F64, false, &[I::F64Const(2.5)]);
    let mut machine = machine(&test, Config::default(), Silent);
    assert_eq!(machine.read_global(global).unwrap(), Value::F64(2.5));
    assert_eq!(machine.read_global(global).unwrap(), Value::F64(2.5));
}

#[test]
fn test_memory_load_store() {
    let mut test = TestModule::new();
    test.memory(1, None);
    test.active_data(16, &[0xff, 0x01]);
    let func = test.func(
        &[],
        &[T::I32, T::I32, T::I64],
        &[],
        &[
            I::I32Const(16),
            I::I32Load8S(mem(0)),
            I::I32Const(16),
            I::I32Load16U(mem(0)),
            I::I32Const(32),
            I::I64Const(-2),
            I::I64Store32(mem(4)),
            I::I32Const(36),
            I::I64Load32U(mem(0)),
        ],
    );
    assert_eq!(
        run(&test, func, &[]).unwrap(),
        vec![Value::I32(-1), Value::I32(0x01ff), Value::I64(0xffff_fffe)]
    );
}

#[test]
fn test_memory_out_of_bounds_traps() {
    let mut test = TestModule::new();
    test.memory(1, None);
    let func = test.func(
        &[],
        &[T::I32],
        &[],
        &[I::I32Const(65535), I::I32Load(mem(0))],
    );
    assert_eq!(
        trap_code(run(&test, func, &[]).unwrap_err()),
        TrapCode::MemoryOutOfBounds
    );
}

#[test]
fn test_memory_size_and_grow() {
    let mut test = TestModule::new();
    test.memory(1, Some(3));
    let func = test.func(
        &[],
        &[T::I32, T::I32, T::I32],
        &[],
        &[
            I::I32Const(2),
            I::MemoryGrow(0),
            I::I32Const(1),
            I::MemoryGrow(0),
            I::MemorySize(0),
        ],
    );
    assert_eq!(
        run(&test, func, &[]).unwrap(),
        vec![Value::I32(1), Value::I32(-1), Value::I32(3)]
    );
}

#[test]
fn test_bulk_memory() {
    let mut test = TestModule::new();
    test.memory(1, None);
    test.passive_data(b"hello");
    let func = test.func(
        &[],
        &[T::I32, T::I32],
        &[],
        &[
            I::I32Const(0),
            I::I32Const(0x61),
            I::I32Const(4),
            I::MemoryFill(0),
            I::I32Const(8),
            I::I32Const(1),
            I::I32Const(4),
            I::MemoryInit {
                mem: 0,
                data_index: 0,
            },
            I::I32Const(2),
            I::I32Const(8),
            I::I32Const(2),
            I::MemoryCopy {
                src_mem: 0,
                dst_mem: 0,
            },
            I::I32Const(0),
            I::I32Load(mem(0)),
            I::I32Const(8),
            I::I32Load(mem(0)),
        ],
    );
    assert_eq!(
        run(&test, func, &[]).unwrap(),
        vec![
            Value::I32(i32::from_le_bytes(*b"aael")),
            Value::I32(i32::from_le_bytes(*b"ello"))
        ]
    );
}

#[test]
fn test_dropped_data_cannot_be_copied() {
    let mut test = TestModule::new();
    test.memory(1, None);
    test.passive_data(b"abc");
    let func = test.func(
        &[],
        &[],
        &[],
        &[
            I::DataDrop(0),
            I::I32Const(0),
            I::I32Const(0),
            I::I32Const(1),
            I::MemoryInit {
                mem: 0,
                data_index: 0,
            },
        ],
    );
    assert_eq!(
        trap_code(run(&test, func, &[]).unwrap_err()),
        TrapCode::MemoryOutOfBounds
    );
}

#[test]
fn test_select_and_drop() {
    let mut test = TestModule::new();
    let func = test.func(
        &[T::I32],
        &[T::I32],
        &[],
        &[
            I::I32Const(99),
            I::Drop,
            I::I32Const(1),
            I::I32Const(2),
            I::LocalGet(0),
            I::Select,
        ],
    );
    assert_eq!(run(&test, func, &[Value::I32(1)]).unwrap(), vec![Value::I32(1)]);
    assert_eq!(run(&test, func, &[Value::I32(0)]).unwrap(), vec![Value::I32(2)]);
}

#[derive(Default)]
struct Recorder {
    steps: Vec<(Owner, u32, usize)>,
    events: Vec<String>,
}

impl Observer for Recorder {
    fn step(&mut self, step: &Step<'_>) -> crate::error::VmResult<()> {
        self.steps
            .push((step.owner, step.node.id, step.call_stack.len()));
        Ok(())
    }

    fn enter(&mut self, owner: Owner) {
        self.events.push(format!("enter {owner:?}"));
    }

    fn leave(&mut self, owner: Owner) {
        self.events.push(format!("leave {owner:?}"));
    }
}

#[test]
fn test_observer_sees_every_instruction() {
    let mut test = TestModule::new();
    let callee = test.func(&[], &[T::I32], &[], &[I::I32Const(1)]);
    let caller = test.func(
        &[],
        &[T::I32],
        &[],
        &[I::Call(callee), I::I32Const(2), I::I32Add],
    );
    let mut machine = machine(&test, Config::default(), Recorder::default());
    assert_eq!(machine.invoke(caller, &[]).unwrap(), vec![Value::I32(3)]);
    let recorder = machine.observer();
    assert_eq!(
        recorder.steps,
        vec![
            (Owner::Func(caller), 1, 1),
            (Owner::Func(callee), 1, 2),
            (Owner::Func(caller), 2, 1),
            (Owner::Func(caller), 3, 1),
        ]
    );
    assert_eq!(
        recorder.events,
        vec![
            "enter Func(1)",
            "enter Func(0)",
            "leave Func(0)",
            "leave Func(1)"
        ]
    );
}

struct Interrupt;

impl Observer for Interrupt {
    fn step(&mut self, _step: &Step<'_>) -> crate::error::VmResult<()> {
        Err(crate::error::trap!(Interrupted, "stopped"))
    }
}

#[test]
fn test_observer_can_abort() {
    let mut test = TestModule::new();
    let func = test.func(&[], &[], &[], &[I::Nop, I::I32Const(1), I::Drop]);
    let mut machine = machine(&test, Config::default(), Interrupt);
    let error = machine.invoke(func, &[]).unwrap_err();
    assert_eq!(trap_code(error), TrapCode::Interrupted);
}

#[test]
fn test_matches_wasmi() {
    let mut test = TestModule::new();
    let collatz = test.func(
        &[T::I32],
        &[T::I32],
        &[T::I32],
        &[
            I::Block(BlockType::Empty),
            I::Loop(BlockType::Empty),
            I::LocalGet(0),
            I::I32Const(1),
            I::I32LeU,
            I::BrIf(1),
            I::LocalGet(1),
            I::I32Const(1),
            I::I32Add,
            I::LocalSet(1),
            I::LocalGet(0),
            I::I32Const(2),
            I::I32RemU,
            I::If(BlockType::Result(T::I32)),
            I::LocalGet(0),
            I::I32Const(3),
            I::I32Mul,
            I::I32Const(1),
            I::I32Add,
            I::Else,
            I::LocalGet(0),
            I::I32Const(1),
            I::I32ShrU,
            I::End,
            I::LocalSet(0),
            I::Br(0),
            I::End,
            I::End,
            I::LocalGet(1),
        ],
    );
    test.export("collatz", collatz);
    let bytes = test.finish();

    let engine = wasmi::Engine::default();
    let module = wasmi::Module::new(&engine, &bytes).unwrap();
    let mut store = wasmi::Store::new(&engine, ());
    let linker = <wasmi::Linker<()>>::new(&engine);
    let instance = linker
        .instantiate(&mut store, &module)
        .unwrap()
        .start(&mut store)
        .unwrap();
    let reference = instance
        .get_typed_func::<i32, i32>(&store, "collatz")
        .unwrap();

    for n in [1, 2, 3, 7, 27, 97, 871] {
        let expected = reference.call(&mut store, n).unwrap();
        let actual = run(&test, collatz, &[Value::I32(n)]).unwrap();
        assert_eq!(actual, vec![Value::I32(expected)], "collatz({n})\n{}", print(&bytes));
    }
}
