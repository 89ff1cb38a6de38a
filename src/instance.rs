//! Binding a decoded module to host imports and calling its exports.


use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{format_error, trap, VmResult};
use crate::interpreter::{Config, HostFunc, Machine};
use crate::memory::Memory;
use crate::module::{ExportKind, FuncType, ImportKind, Module};
use crate::observer::{Observer, Silent};
use crate::value::Value;

/// Host functions and values offered to a module, keyed by `(module, name)`.
#[derive(Default)]
pub struct Imports {
    funcs: HashMap<(String, String), HostFunc>,
    globals: HashMap<(String, String), Value>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<F>(&mut self, module: &str, name: &str, func: F) -> &mut Self
    where
        F: FnMut(Option<&mut Memory>, &[Value]) -> anyhow::Result<Option<Value>> + 'static,
    {
        let key = (module.to_string(), name.to_string());
        if self.funcs.insert(key, Box::new(func)).is_some() {
            warn!("import `{module}.{name}` defined twice, keeping the last definition");
        }
        self
    }

    pub fn define_global(&mut self, module: &str, name: &str, value: Value) -> &mut Self {
        let key = (module.to_string(), name.to_string());
        if self.globals.insert(key, value).is_some() {
            warn!("global import `{module}.{name}` defined twice, keeping the last definition");
        }
        self
    }
}

/// An instantiated module. Not `Send`: the globals, memory and host closures
/// belong to the thread that created it.
pub struct Instance<O: Observer = Silent> {
    module: Arc<Module>,
    machine: Rc<RefCell<Machine<O>>>,
}

impl Instance<Silent> {
    pub fn new(module: Arc<Module>, imports: Imports) -> VmResult<Self> {
        Self::with_config(module, imports, Config::default())
    }

    pub fn with_config(module: Arc<Module>, imports: Imports, config: Config) -> VmResult<Self> {
        Self::with_observer(module, imports, config, Silent)
    }
}

impl<O: Observer> Instance<O> {
    pub fn with_observer(
        module: Arc<Module>,
        mut imports: Imports,
        config: Config,
        observer: O,
    ) -> VmResult<Self> {
        let mut machine = Machine::new(Arc::clone(&module), config, observer);

        let mut func = 0;
        let mut global = 0;
        for import in &module.imports {
            let key = (import.module.clone(), import.name.clone());
            match import.kind {
                ImportKind::Func(_) => {
                    match imports.funcs.remove(&key) {
                        Some(host) => {
                            debug!(module = %import.module, name = %import.name, func, "bound function import");
                            machine.bind_func(func, host);
                        }
                        None => {
                            debug!(module = %import.module, name = %import.name, func, "function import left unbound");
                        }
                    }
                    func += 1;
                }
                ImportKind::Global { ty, .. } => {
                    match imports.globals.remove(&key) {
                        Some(value) if value.ty() != ty => {
                            return Err(trap!(
                                TypeMismatch,
                                "global import `{}.{}` is {ty}, got {value}",
                                import.module,
                                import.name
                            ));
                        }
                        Some(value) => machine.bind_global(global, value),
                        None => {
                            debug!(module = %import.module, name = %import.name, global, "global import left unbound");
                        }
                    }
                    global += 1;
                }
                ImportKind::Memory(_) | ImportKind::Table(_) | ImportKind::Tag(_) => {
                    debug!(module = %import.module, name = %import.name, "import provided internally");
                }
            }
        }
        for (module, name) in imports.funcs.keys().chain(imports.globals.keys()) {
            debug!("import `{module}.{name}` is not used by the module");
        }

        machine.write_active_data()?;
        Ok(Instance {
            module,
            machine: Rc::new(RefCell::new(machine)),
        })
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Every function export by name.
    pub fn exports(&self) -> HashMap<String, ExportedFunc<O>> {
        let module = &self.module;
        module
            .exports
            .iter()
            .filter(|export| export.kind == ExportKind::Func)
            .filter_map(|export| {
                let ty = module.func_type(export.index)?.clone();
                Some((
                    export.name.clone(),
                    ExportedFunc {
                        name: export.name.clone(),
                        func: export.index,
                        ty,
                        machine: Rc::clone(&self.machine),
                    },
                ))
            })
            .collect()
    }

    pub fn export(&self, name: &str) -> VmResult<ExportedFunc<O>> {
        let module = &self.module;
        let export = module
            .export(name)
            .filter(|export| export.kind == ExportKind::Func)
            .ok_or_else(|| format_error!("module has no function export `{name}`"))?;
        let ty = module
            .func_type(export.index)
            .ok_or_else(|| format_error!("export `{name}` refers to a missing function"))?
            .clone();
        Ok(ExportedFunc {
            name: name.to_string(),
            func: export.index,
            ty,
            machine: Rc::clone(&self.machine),
        })
    }

    pub fn call(&self, name: &str, args: &[Value]) -> VmResult<Vec<Value>> {
        self.export(name)?.call(args)
    }

    /// Reads an exported global, running its initializer if needed.
    pub fn global(&self, name: &str) -> VmResult<Value> {
        let export = self
            .module
            .export(name)
            .filter(|export| export.kind == ExportKind::Global)
            .ok_or_else(|| format_error!("module has no global export `{name}`"))?;
        borrow_machine(&self.machine)?.read_global(export.index)
    }

    /// `None` when the module has no memory, and while a call is running.
    /// Host imports get the memory as their first argument instead.
    pub fn memory(&self) -> Option<Ref<'_, Memory>> {
        let machine = self.machine.try_borrow().ok()?;
        Ref::filter_map(machine, |machine| machine.memory()).ok()
    }

    pub fn observer(&self) -> VmResult<Ref<'_, O>> {
        let machine = self
            .machine
            .try_borrow()
            .map_err(|_| trap!(Reentrant, "observer read while a call is running"))?;
        Ok(Ref::map(machine, |machine| machine.observer()))
    }

    pub fn observer_mut(&self) -> VmResult<RefMut<'_, O>> {
        let machine = borrow_machine(&self.machine)?;
        Ok(RefMut::map(machine, |machine| machine.observer_mut()))
    }
}

/// A callable function export.
pub struct ExportedFunc<O: Observer = Silent> {
    name: String,
    func: u32,
    ty: FuncType,
    machine: Rc<RefCell<Machine<O>>>,
}

impl<O: Observer> ExportedFunc<O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.func
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Runs the function. Missing arguments are zero, extra ones are ignored.
    pub fn call(&self, args: &[Value]) -> VmResult<Vec<Value>> {
        borrow_machine(&self.machine)?.invoke(self.func, args)
    }
}

fn borrow_machine<O>(machine: &RefCell<Machine<O>>) -> VmResult<RefMut<'_, Machine<O>>> {
    machine
        .try_borrow_mut()
        .map_err(|_| trap!(Reentrant, "instance called again while a call is running"))
}
