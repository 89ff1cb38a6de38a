//! Module builder shared by the unit tests.

use wasm_encoder::{
    CodeSection, DataCountSection, DataSection, Encode, ExportKind, ExportSection, Function,
    FunctionSection, Instruction, MemorySection, MemoryType, RawSection, TypeSection, ValType,
};

#[derive(Default)]
pub(crate) struct TestModule {
    types: TypeSection,
    import_count: u32,
    imports: Vec<u8>,
    functions: FunctionSection,
    memories: MemorySection,
    global_count: u32,
    globals: Vec<u8>,
    exports: ExportSection,
    codes: CodeSection,
    datas: DataSection,
    passive_data: bool,
    func_count: u32,
    imported_globals: u32,
    extra: Vec<(u8, Vec<u8>)>,
}

fn encode_name(name: &str, sink: &mut Vec<u8>) {
    name.len().encode(sink);
    sink.extend_from_slice(name.as_bytes());
}

impl TestModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ty(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        let index = self.types.len();
        self.types
            .function(params.iter().copied(), results.iter().copied());
        index
    }

    /// Imports a function. All imports must come before the first `func`.
    pub fn import_func(
        &mut self,
        module: &str,
        name: &str,
        params: &[ValType],
        results: &[ValType],
    ) -> u32 {
        assert_eq!(self.functions.len(), 0, "imports must precede functions");
        let ty = self.ty(params, results);
        encode_name(module, &mut self.imports);
        encode_name(name, &mut self.imports);
        self.imports.push(0x00);
        ty.encode(&mut self.imports);
        self.import_count += 1;
        self.func_count += 1;
        self.func_count - 1
    }

    pub fn import_global(&mut self, module: &str, name: &str, ty: ValType, mutable: bool) -> u32 {
        assert_eq!(self.global_count, 0, "global imports must precede globals");
        encode_name(module, &mut self.imports);
        encode_name(name, &mut self.imports);
        self.imports.push(0x03);
        ty.encode(&mut self.imports);
        self.imports.push(mutable as u8);
        self.import_count += 1;
        self.imported_globals += 1;
        self.imported_globals - 1
    }

    pub fn memory(&mut self, minimum: u64, maximum: Option<u64>) {
        self.memories.memory(MemoryType {
            minimum,
            maximum,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
    }

    /// Defines a global. `init` is the constant expression without its `end`.
    pub fn global(&mut self, ty: ValType, mutable: bool, init: &[Instruction]) -> u32 {
        ty.encode(&mut self.globals);
        self.globals.push(mutable as u8);
        for instruction in init {
            instruction.encode(&mut self.globals);
        }
        Instruction::End.encode(&mut self.globals);
        self.global_count += 1;
        self.imported_globals + self.global_count - 1
    }

    /// Defines a function. `body` is the instruction sequence without its
    /// final `end`.
    pub fn func(
        &mut self,
        params: &[ValType],
        results: &[ValType],
        locals: &[ValType],
        body: &[Instruction],
    ) -> u32 {
        let ty = self.ty(params, results);
        self.functions.function(ty);
        let mut function = Function::new(locals.iter().map(|ty| (1, *ty)));
        for instruction in body {
            function.instruction(instruction);
        }
        function.instruction(&Instruction::End);
        self.codes.function(&function);
        self.func_count += 1;
        self.func_count - 1
    }

    /// Defines a function from raw body bytes, for opcodes the encoder
    /// cannot express. The final `end` is appended.
    pub fn func_raw(&mut self, params: &[ValType], results: &[ValType], body: &[u8]) -> u32 {
        let ty = self.ty(params, results);
        self.functions.function(ty);
        let mut function = Function::new(Vec::new());
        function.raw(body.iter().copied());
        function.instruction(&Instruction::End);
        self.codes.function(&function);
        self.func_count += 1;
        self.func_count - 1
    }

    pub fn export(&mut self, name: &str, func: u32) {
        self.exports.export(name, ExportKind::Func, func);
    }

    pub fn export_global(&mut self, name: &str, global: u32) {
        self.exports.export(name, ExportKind::Global, global);
    }

    pub fn active_data(&mut self, offset: i32, bytes: &[u8]) {
        self.datas.active(
            0,
            &wasm_encoder::ConstExpr::i32_const(offset),
            bytes.iter().copied(),
        );
    }

    pub fn passive_data(&mut self, bytes: &[u8]) {
        self.datas.passive(bytes.iter().copied());
        self.passive_data = true;
    }

    /// Appends an arbitrary section after the known ones.
    pub fn raw_section(&mut self, id: u8, data: &[u8]) {
        self.extra.push((id, data.to_vec()));
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut module = wasm_encoder::Module::new();
        module.section(&self.types);
        let imports = raw_vec(self.import_count, &self.imports);
        if self.import_count > 0 {
            module.section(&RawSection {
                id: 2,
                data: &imports,
            });
        }
        module.section(&self.functions);
        if !self.memories.is_empty() {
            module.section(&self.memories);
        }
        let globals = raw_vec(self.global_count, &self.globals);
        if self.global_count > 0 {
            module.section(&RawSection {
                id: 6,
                data: &globals,
            });
        }
        module.section(&self.exports);
        if self.passive_data {
            module.section(&DataCountSection {
                count: self.datas.len(),
            });
        }
        module.section(&self.codes);
        if !self.datas.is_empty() {
            module.section(&self.datas);
        }
        for (id, data) in &self.extra {
            module.section(&RawSection { id: *id, data });
        }
        module.finish()
    }
}

fn raw_vec(count: u32, entries: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    count.encode(&mut data);
    data.extend_from_slice(entries);
    data
}

/// Renders a module as text for assertion messages.
pub(crate) fn print(bytes: &[u8]) -> String {
    wasmprinter::print_bytes(bytes).unwrap_or_else(|error| format!("<unprintable: {error}>"))
}
