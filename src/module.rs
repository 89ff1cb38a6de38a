
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::consteval;
use crate::error::{format_error, structure_error, VmError, VmResult};
use crate::memory::MAX_PAGES;
use crate::reader::ByteReader;
use crate::structure::{structure, BlockType, Node};
use crate::value::{ValType, Value};

pub const MAGIC: [u8; 4] = *b"\0asm";
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Declared locals per function, parameters included.
const MAX_LOCALS: u64 = 50_000;

mod section {
    pub const CUSTOM: u8 = 0;
    pub const TYPE: u8 = 1;
    pub const IMPORT: u8 = 2;
    pub const FUNC: u8 = 3;
    pub const MEMORY: u8 = 5;
    pub const GLOBAL: u8 = 6;
    pub const EXPORT: u8 = 7;
    pub const CODE: u8 = 10;
    pub const DATA: u8 = 11;
    pub const DATA_COUNT: u8 = 12;
    pub const TAG: u8 = 13;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    Func(u32),
    Table(Limits),
    Memory(Limits),
    Global { ty: ValType, mutable: bool },
    Tag(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Tag {
    pub type_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: ValType,
    pub mutable: bool,
    /// Init expression bytes, including the terminating `end`.
    pub init: Vec<u8>,
    pub body: Node,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    /// Parameters followed by the declared locals.
    pub locals: Vec<ValType>,
    pub params: usize,
    pub body: Node,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DataMode {
    Active { memory: u32, offset: u32 },
    Passive,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Data {
    pub mode: DataMode,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub funcs: Vec<u32>,
    pub memories: Vec<Limits>,
    pub tags: Vec<Tag>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub codes: Vec<Code>,
    pub datas: Vec<Data>,
    pub data_count: Option<u32>,
    pub names: HashMap<u32, String>,
}

pub fn decode_module(bytes: &[u8]) -> VmResult<Module> {
    Module::decode(bytes)
}

impl Module {
    pub fn decode(bytes: &[u8]) -> VmResult<Module> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader
            .read_bytes(4)
            .map_err(|_| format_error!("module is too short to hold a header"))?;
        if magic != MAGIC {
            return Err(format_error!("bad magic number {magic:02x?}"));
        }
        let version = reader
            .read_bytes(4)
            .map_err(|_| format_error!("module is too short to hold a header"))?;
        if version != VERSION {
            return Err(format_error!("unsupported version {version:02x?}"));
        }

        let mut module = Module::default();
        while !reader.is_finished() {
            let id = reader.read_byte()?;
            let size = reader.read_u32()? as usize;
            let start = reader.offset();
            let mut section = reader.sub_reader(size)?;
            match id {
                section::TYPE => module.decode_types(&mut section)?,
                section::IMPORT => module.decode_imports(&mut section)?,
                section::FUNC => module.decode_funcs(&mut section)?,
                section::MEMORY => module.decode_memories(&mut section)?,
                section::GLOBAL => module.decode_globals(&mut section)?,
                section::EXPORT => module.decode_exports(&mut section)?,
                section::CODE => module.decode_codes(&mut section)?,
                section::DATA => module.decode_datas(&mut section)?,
                section::DATA_COUNT => module.data_count = Some(section.read_u32()?),
                section::TAG => module.decode_tags(&mut section)?,
                section::CUSTOM => {
                    module.decode_custom(&mut section)?;
                    continue;
                }
                other => {
                    debug!(id = other, size, "skipping section");
                    continue;
                }
            }
            if !section.is_finished() {
                return Err(format_error!(
                    "section {id} at offset {start:#x} declares {size} bytes but {} were left unread",
                    section.remaining()
                ));
            }
            debug!(id, size, "decoded section");
        }

        if module.codes.len() != module.funcs.len() {
            return Err(format_error!(
                "{} function(s) declared but {} code bodies found",
                module.funcs.len(),
                module.codes.len()
            ));
        }
        Ok(module)
    }

    fn decode_types(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let form = reader.read_byte()?;
            if form != 0x60 {
                return Err(format_error!(
                    "expected function type 0x60, got {form:#04x} at offset {:#x}",
                    reader.offset() - 1
                ));
            }
            let params = read_val_types(reader)?;
            let results = read_val_types(reader)?;
            self.types.push(FuncType { params, results });
        }
        Ok(())
    }

    fn decode_imports(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let module = reader.read_name()?;
            let name = reader.read_name()?;
            let kind = match reader.read_byte()? {
                0x00 => ImportKind::Func(self.checked_type_index(reader)?),
                0x01 => {
                    let _ref_type = reader.read_byte()?;
                    ImportKind::Table(read_limits(reader)?)
                }
                0x02 => ImportKind::Memory(read_memory_limits(reader)?),
                0x03 => {
                    let ty = ValType::from_byte(reader.read_byte()?)?;
                    let mutable = read_mutability(reader)?;
                    ImportKind::Global { ty, mutable }
                }
                0x04 => {
                    let _attribute = reader.read_byte()?;
                    ImportKind::Tag(self.checked_type_index(reader)?)
                }
                other => {
                    return Err(format_error!(
                        "unknown import kind {other:#04x} for `{module}.{name}`"
                    ))
                }
            };
            self.imports.push(Import { module, name, kind });
        }
        Ok(())
    }

    fn decode_funcs(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let type_index = self.checked_type_index(reader)?;
            self.funcs.push(type_index);
        }
        Ok(())
    }

    fn decode_memories(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            self.memories.push(read_memory_limits(reader)?);
        }
        Ok(())
    }

    fn decode_tags(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let _attribute = reader.read_byte()?;
            let type_index = self.checked_type_index(reader)?;
            self.tags.push(Tag { type_index });
        }
        Ok(())
    }

    fn decode_globals(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let index = self.imported_globals() + self.globals.len() as u32;
            let ty = ValType::from_byte(reader.read_byte()?)?;
            let mutable = read_mutability(reader)?;
            let start = reader.position();
            let owner = format!("global {index} initializer");
            let body = structure(reader, self, &owner, BlockType::Value(ty))?;
            let init = reader.consumed_since(start).to_vec();
            self.globals.push(Global {
                ty,
                mutable,
                init,
                body,
            });
        }
        Ok(())
    }

    fn decode_exports(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let name = reader.read_name()?;
            let kind = match reader.read_byte()? {
                0x00 => ExportKind::Func,
                0x01 => ExportKind::Table,
                0x02 => ExportKind::Memory,
                0x03 => ExportKind::Global,
                0x04 => ExportKind::Tag,
                other => {
                    return Err(format_error!(
                        "unknown export kind {other:#04x} for `{name}`"
                    ))
                }
            };
            let index = reader.read_u32()?;
            self.exports.push(Export { name, kind, index });
        }
        Ok(())
    }

    fn decode_codes(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        if count as usize != self.funcs.len() {
            return Err(format_error!(
                "code section holds {count} bodies for {} declared function(s)",
                self.funcs.len()
            ));
        }
        for local_index in 0..count {
            let func = self.imported_funcs() + local_index;
            let size = reader.read_u32()? as usize;
            let mut entry = reader.sub_reader(size)?;
            let type_index = self.funcs[local_index as usize];
            let ty = &self.types[type_index as usize];

            let mut locals = ty.params.clone();
            let groups = entry.read_u32()?;
            for _ in 0..groups {
                let count = entry.read_u32()?;
                let ty = ValType::from_byte(entry.read_byte()?)?;
                if locals.len() as u64 + u64::from(count) > MAX_LOCALS {
                    return Err(format_error!(
                        "too many locals in function {func}, at most {MAX_LOCALS} allowed"
                    ));
                }
                locals.extend(std::iter::repeat(ty).take(count as usize));
            }
            let params = ty.params.len();

            let owner = format!("function `{}`", self.func_name(func));
            let body = structure(&mut entry, self, &owner, BlockType::Func(type_index))?;
            if !entry.is_finished() {
                return Err(structure_error!(
                    "{owner}: {} byte(s) after the final `end`",
                    entry.remaining()
                ));
            }
            trace!(func, locals = locals.len(), "structured function body");
            self.codes.push(Code {
                locals,
                params,
                body,
            });
        }
        Ok(())
    }

    fn decode_datas(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let count = reader.read_u32()?;
        for index in 0..count {
            let mode = match reader.read_u32()? {
                0 => self.active_data(reader, index, 0)?,
                1 => DataMode::Passive,
                2 => {
                    let memory = reader.read_u32()?;
                    self.active_data(reader, index, memory)?
                }
                other => {
                    return Err(format_error!(
                        "data segment {index} has unknown flags {other}"
                    ))
                }
            };
            let len = reader.read_u32()? as usize;
            let bytes = reader.read_bytes(len)?.to_vec();
            self.datas.push(Data { mode, bytes });
        }
        Ok(())
    }

    fn active_data(&self, reader: &mut ByteReader, index: u32, memory: u32) -> VmResult<DataMode> {
        let start = reader.position();
        let owner = format!("data segment {index} offset");
        structure(reader, self, &owner, BlockType::Value(ValType::I32))?;
        let expr = reader.consumed_since(start);
        let offset = match consteval::evaluate(expr) {
            Ok(Value::I32(offset)) => offset as u32,
            Ok(other) => {
                return Err(format_error!("{owner} evaluated to {other}, expected i32"))
            }
            Err(error) => return Err(format_error!("{owner} could not be evaluated: {error}")),
        };
        Ok(DataMode::Active { memory, offset })
    }

    fn decode_custom(&mut self, reader: &mut ByteReader) -> VmResult<()> {
        let name = reader.read_name()?;
        if name != "name" {
            debug!(name, "skipping custom section");
            return Ok(());
        }
        if let Err(error) = self.decode_names(reader) {
            warn!("ignoring malformed name section: {error}");
        }
        Ok(())
    }

    fn decode_names(&mut self, reader: &mut ByteReader) -> Result<(), VmError> {
        while !reader.is_finished() {
            let id = reader.read_byte()?;
            let size = reader.read_u32()? as usize;
            let mut subsection = reader.sub_reader(size)?;
            if id != 1 {
                continue;
            }
            let count = subsection.read_u32()?;
            for _ in 0..count {
                let index = subsection.read_u32()?;
                let name = subsection.read_name()?;
                self.names.insert(index, name);
            }
        }
        Ok(())
    }

    fn checked_type_index(&self, reader: &mut ByteReader) -> VmResult<u32> {
        let offset = reader.offset();
        let index = reader.read_u32()?;
        if index as usize >= self.types.len() {
            return Err(format_error!(
                "type index {index} out of range at offset {offset:#x}"
            ));
        }
        Ok(index)
    }

    pub fn imported_funcs(&self) -> u32 {
        self.imports
            .iter()
            .filter(|import| matches!(import.kind, ImportKind::Func(_)))
            .count() as u32
    }

    pub fn imported_globals(&self) -> u32 {
        self.imports
            .iter()
            .filter(|import| matches!(import.kind, ImportKind::Global { .. }))
            .count() as u32
    }

    /// The import backing function `func`, if it is imported.
    pub fn func_import(&self, func: u32) -> Option<&Import> {
        self.imports
            .iter()
            .filter(|import| matches!(import.kind, ImportKind::Func(_)))
            .nth(func as usize)
    }

    pub fn func_type_index(&self, func: u32) -> Option<u32> {
        let imported = self.imported_funcs();
        if func < imported {
            return match self.func_import(func)?.kind {
                ImportKind::Func(type_index) => Some(type_index),
                _ => None,
            };
        }
        self.funcs.get((func - imported) as usize).copied()
    }

    pub fn func_type(&self, func: u32) -> Option<&FuncType> {
        self.types.get(self.func_type_index(func)? as usize)
    }

    pub fn code(&self, func: u32) -> Option<&Code> {
        let local = func.checked_sub(self.imported_funcs())?;
        self.codes.get(local as usize)
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|export| export.name == name)
    }

    /// A readable name for diagnostics: the name section, then an export, then
    /// the import path, then the bare index.
    pub fn func_name(&self, func: u32) -> String {
        if let Some(name) = self.names.get(&func) {
            return name.clone();
        }
        let export = self
            .exports
            .iter()
            .find(|export| export.kind == ExportKind::Func && export.index == func);
        if let Some(export) = export {
            return export.name.clone();
        }
        if let Some(import) = self.func_import(func) {
            return format!("{}.{}", import.module, import.name);
        }
        format!("func[{func}]")
    }

    pub fn global_type(&self, global: u32) -> Option<ValType> {
        let imported = self.imported_globals();
        if global < imported {
            return self
                .imports
                .iter()
                .filter_map(|import| match import.kind {
                    ImportKind::Global { ty, .. } => Some(ty),
                    _ => None,
                })
                .nth(global as usize);
        }
        self.globals
            .get((global - imported) as usize)
            .map(|global| global.ty)
    }

    /// Parameter and result counts of a block type.
    pub fn block_arity(&self, block_type: BlockType) -> (usize, usize) {
        match block_type {
            BlockType::Empty => (0, 0),
            BlockType::Value(_) => (0, 1),
            BlockType::Func(index) => self
                .types
                .get(index as usize)
                .map(|ty| (ty.params.len(), ty.results.len()))
                .unwrap_or((0, 0)),
        }
    }
}

fn read_val_types(reader: &mut ByteReader) -> VmResult<Vec<ValType>> {
    let count = reader.read_u32()?;
    let mut types = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        types.push(ValType::from_byte(reader.read_byte()?)?);
    }
    Ok(types)
}

fn read_limits(reader: &mut ByteReader) -> VmResult<Limits> {
    let flags = reader.read_byte()?;
    let min = reader.read_u32()?;
    let max = match flags {
        0x00 | 0x02 => None,
        0x01 | 0x03 => Some(reader.read_u32()?),
        other => return Err(format_error!("unknown limits flags {other:#04x}")),
    };
    Ok(Limits { min, max })
}

fn read_memory_limits(reader: &mut ByteReader) -> VmResult<Limits> {
    let limits = read_limits(reader)?;
    if limits.min > MAX_PAGES || limits.max.is_some_and(|max| max > MAX_PAGES) {
        return Err(format_error!(
            "memory size must be at most {MAX_PAGES} pages, got {limits:?}"
        ));
    }
    if limits.max.is_some_and(|max| max < limits.min) {
        return Err(format_error!("memory maximum is below its minimum, got {limits:?}"));
    }
    Ok(limits)
}

fn read_mutability(reader: &mut ByteReader) -> VmResult<bool> {
    match reader.read_byte()? {
        0x00 => Ok(false),
        0x01 => Ok(true),
        other => Err(format_error!("unknown mutability {other:#04x}")),
    }
}
