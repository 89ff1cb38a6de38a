
use crate::error::{format_error, structure_error, VmResult};
use crate::module::Module;
use crate::opcode::{self, Opcode};
use crate::reader::ByteReader;
use crate::value::ValType;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    Func(u32),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImportRef {
    pub module: String,
    pub name: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CallTarget {
    pub func: u32,
    pub type_index: u32,
    pub params: usize,
    pub results: usize,
    pub import: Option<ImportRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Immediate {
    None,
    Block(BlockType),
    Depth(u32),
    Table { targets: Vec<u32>, default: u32 },
    Local(u32),
    Global(u32),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Call(CallTarget),
    CallIndirect { type_index: u32, table: u32 },
    Memory(MemArg),
    Data(u32),
    Tag(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Position in the body's instruction stream; the synthetic root is 0.
    pub id: u32,
    pub op: Opcode,
    pub imm: Immediate,
    pub body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
}

impl Node {
    fn new(id: u32, op: Opcode, imm: Immediate) -> Self {
        Node {
            id,
            op,
            imm,
            body: Vec::new(),
            else_body: None,
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self.imm {
            Immediate::Block(block_type) => block_type,
            _ => BlockType::Empty,
        }
    }
}

struct OpenScope {
    node: Node,
    in_else: bool,
}

impl OpenScope {
    fn children(&mut self) -> &mut Vec<Node> {
        if self.in_else {
            self.node.else_body.get_or_insert_with(Vec::new)
        } else {
            &mut self.node.body
        }
    }
}

/// Reads one instruction sequence up to and including its terminating `end` and
/// returns it as a tree under a synthetic root `block` of type `root_type`.
///
/// `owner` names the body in error messages.
pub fn structure(
    reader: &mut ByteReader,
    module: &Module,
    owner: &str,
    root_type: BlockType,
) -> VmResult<Node> {
    let mut parents = vec![OpenScope {
        node: Node::new(0, opcode::BLOCK, Immediate::Block(root_type)),
        in_else: false,
    }];
    let mut next_id = 1;

    loop {
        if reader.is_finished() {
            return Err(structure_error!(
                "{owner}: body ends without `end`, {} scope(s) still open",
                parents.len()
            ));
        }
        let offset = reader.offset();
        let op = read_opcode(reader, owner)?;
        let id = next_id;
        next_id += 1;

        match op {
            opcode::NOP => {}
            opcode::BLOCK | opcode::LOOP | opcode::IF | opcode::TRY => {
                let block_type = read_block_type(reader, module)?;
                parents.push(OpenScope {
                    node: Node::new(id, op, Immediate::Block(block_type)),
                    in_else: false,
                });
            }
            opcode::ELSE => {
                let nested = parents.len() > 1;
                let scope = top(&mut parents);
                if !nested || scope.node.op != opcode::IF || scope.in_else {
                    return Err(structure_error!(
                        "{owner}: `else` without a matching `if` at offset {offset:#x}"
                    ));
                }
                scope.in_else = true;
                scope.node.else_body = Some(Vec::new());
            }
            opcode::CATCH | opcode::CATCH_ALL => {
                let imm = match op {
                    opcode::CATCH => Immediate::Tag(reader.read_u32()?),
                    _ => Immediate::None,
                };
                let nested = parents.len() > 1;
                let scope = top(&mut parents);
                let after_catch_all = scope
                    .node
                    .else_body
                    .iter()
                    .flatten()
                    .any(|handler| handler.op == opcode::CATCH_ALL);
                if !nested || scope.node.op != opcode::TRY || after_catch_all {
                    return Err(structure_error!(
                        "{owner}: `{}` without a matching `try` at offset {offset:#x}",
                        opcode::name(op).unwrap_or("catch")
                    ));
                }
                scope.in_else = true;
                scope.children().push(Node::new(id, op, imm));
            }
            opcode::DELEGATE => {
                let depth = reader.read_u32()?;
                let nested = parents.len() > 1;
                let scope = top(&mut parents);
                if !nested || scope.node.op != opcode::TRY || scope.in_else {
                    return Err(structure_error!(
                        "{owner}: `delegate` without a matching `try` at offset {offset:#x}"
                    ));
                }
                scope.node.body.push(Node::new(id, op, Immediate::Depth(depth)));
                let scope = parents.pop().expect("checked above");
                top(&mut parents).children().push(scope.node);
            }
            opcode::END => {
                if parents.len() == 1 {
                    break;
                }
                let scope = parents.pop().expect("checked above");
                top(&mut parents).children().push(scope.node);
            }
            _ => {
                let (op, imm) = read_immediate(op, reader, module, owner)?;
                top(&mut parents).children().push(Node::new(id, op, imm));
            }
        }
    }

    let root = parents.pop().expect("the root scope is never popped");
    Ok(root.node)
}

fn top(parents: &mut [OpenScope]) -> &mut OpenScope {
    parents
        .last_mut()
        .expect("There should be at least one scope available")
}

fn read_opcode(reader: &mut ByteReader, owner: &str) -> VmResult<Opcode> {
    let offset = reader.offset();
    let byte = reader.read_byte()?;
    let op = if byte == opcode::PREFIX_FC {
        let sub = reader.read_u32()?;
        if sub > 0xff {
            return Err(format_error!(
                "{owner}: unknown opcode 0xfc {sub:#x} at offset {offset:#x}"
            ));
        }
        0xfc00 | sub as Opcode
    } else {
        Opcode::from(byte)
    };
    if opcode::name(op).is_none() {
        return Err(format_error!(
            "{owner}: unknown opcode {op:#04x} at offset {offset:#x}"
        ));
    }
    Ok(op)
}

fn read_block_type(reader: &mut ByteReader, module: &Module) -> VmResult<BlockType> {
    let offset = reader.offset();
    let block_type = match reader.read_s33()? {
        -64 => BlockType::Empty,
        -1 => BlockType::Value(ValType::I32),
        -2 => BlockType::Value(ValType::I64),
        -3 => BlockType::Value(ValType::F32),
        -4 => BlockType::Value(ValType::F64),
        index if index >= 0 && (index as usize) < module.types.len() => {
            BlockType::Func(index as u32)
        }
        other => {
            return Err(format_error!(
                "invalid block type {other} at offset {offset:#x}"
            ))
        }
    };
    Ok(block_type)
}

fn read_immediate(
    op: Opcode,
    reader: &mut ByteReader,
    module: &Module,
    owner: &str,
) -> VmResult<(Opcode, Immediate)> {
    let imm = match op {
        opcode::BR | opcode::BR_IF => Immediate::Depth(reader.read_u32()?),
        opcode::BR_TABLE => {
            let count = reader.read_u32()?;
            let mut targets = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                targets.push(reader.read_u32()?);
            }
            let default = reader.read_u32()?;
            Immediate::Table { targets, default }
        }
        opcode::CALL => {
            let offset = reader.offset();
            let func = reader.read_u32()?;
            let target = call_target(module, func).ok_or_else(|| {
                format_error!("{owner}: call to unknown function {func} at offset {offset:#x}")
            })?;
            Immediate::Call(target)
        }
        opcode::CALL_INDIRECT => {
            let type_index = reader.read_u32()?;
            let table = reader.read_u32()?;
            Immediate::CallIndirect { type_index, table }
        }
        opcode::SELECT_TYPED => {
            let count = reader.read_u32()?;
            for _ in 0..count {
                ValType::from_byte(reader.read_byte()?)?;
            }
            return Ok((opcode::SELECT, Immediate::None));
        }
        opcode::LOCAL_GET | opcode::LOCAL_SET | opcode::LOCAL_TEE => {
            Immediate::Local(reader.read_u32()?)
        }
        opcode::GLOBAL_GET | opcode::GLOBAL_SET => Immediate::Global(reader.read_u32()?),
        opcode::I32_LOAD..=opcode::I64_STORE32 => {
            let align = reader.read_u32()?;
            let offset = reader.read_u32()?;
            Immediate::Memory(MemArg { align, offset })
        }
        opcode::MEMORY_SIZE | opcode::MEMORY_GROW | opcode::MEMORY_FILL => {
            read_reserved(reader, owner)?;
            Immediate::None
        }
        opcode::MEMORY_COPY => {
            read_reserved(reader, owner)?;
            read_reserved(reader, owner)?;
            Immediate::None
        }
        opcode::MEMORY_INIT => {
            let data = reader.read_u32()?;
            read_reserved(reader, owner)?;
            Immediate::Data(data)
        }
        opcode::DATA_DROP => Immediate::Data(reader.read_u32()?),
        opcode::I32_CONST => Immediate::I32(reader.read_s32()?),
        opcode::I64_CONST => Immediate::I64(reader.read_s64()?),
        opcode::F32_CONST => Immediate::F32(reader.read_f32()?),
        opcode::F64_CONST => Immediate::F64(reader.read_f64()?),
        opcode::THROW => Immediate::Tag(reader.read_u32()?),
        opcode::RETHROW => Immediate::Depth(reader.read_u32()?),
        _ => Immediate::None,
    };
    Ok((op, imm))
}

fn read_reserved(reader: &mut ByteReader, owner: &str) -> VmResult<()> {
    let offset = reader.offset();
    match reader.read_byte()? {
        0 => Ok(()),
        other => Err(format_error!(
            "{owner}: memory index {other} at offset {offset:#x}, only memory 0 is supported"
        )),
    }
}

fn call_target(module: &Module, func: u32) -> Option<CallTarget> {
    let type_index = module.func_type_index(func)?;
    let ty = module.types.get(type_index as usize)?;
    let import = module.func_import(func).map(|import| ImportRef {
        module: import.module.clone(),
        name: import.name.clone(),
    });
    Some(CallTarget {
        func,
        type_index,
        params: ty.params.len(),
        results: ty.results.len(),
        import,
    })
}

#[derive(Debug, Clone, Copy)]
pub enum Flat<'a> {
    Op { node: &'a Node, depth: usize },
    Else { node: &'a Node, depth: usize },
    End { node: &'a Node, depth: usize },
}

impl<'a> Flat<'a> {
    pub fn node(&self) -> &'a Node {
        match self {
            Flat::Op { node, .. } | Flat::Else { node, .. } | Flat::End { node, .. } => node,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Flat::Op { depth, .. } | Flat::Else { depth, .. } | Flat::End { depth, .. } => *depth,
        }
    }
}

/// Walks a structured body back into instruction order. The root itself and the
/// body's final `end` are not included.
pub fn flatten(root: &Node) -> Vec<Flat<'_>> {
    let mut out = Vec::new();
    flatten_into(&root.body, 0, &mut out);
    out
}

fn flatten_into<'a>(body: &'a [Node], depth: usize, out: &mut Vec<Flat<'a>>) {
    for node in body {
        // Handlers sit at the depth of their `try`.
        let line = if opcode::is_handler(node.op) {
            depth.saturating_sub(1)
        } else {
            depth
        };
        out.push(Flat::Op { node, depth: line });
        if !opcode::is_scope(node.op) {
            continue;
        }
        flatten_into(&node.body, depth + 1, out);
        if let Some(else_body) = &node.else_body {
            if node.op != opcode::TRY {
                out.push(Flat::Else { node, depth });
            }
            flatten_into(else_body, depth + 1, out);
        }
        let delegated = node
            .body
            .last()
            .is_some_and(|last| last.op == opcode::DELEGATE);
        if !delegated {
            out.push(Flat::End { node, depth });
        }
    }
}
