use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;

use wasmtree::{Imports, Instance, Module, ValType, Value};

const USAGE: &str = "usage: wasmtree [--debug | --listing] <file.wasm> [export] [args...]";

#[derive(Debug, Default)]
struct Options {
    debug: bool,
    listing: bool,
    file: String,
    export: Option<String>,
    args: Vec<String>,
}

fn parse_options() -> Result<Options> {
    let mut options = Options::default();
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--debug" => options.debug = true,
            "--listing" => options.listing = true,
            "-h" | "--help" => bail!(USAGE),
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    options.file = positional.next().ok_or_else(|| anyhow!(USAGE))?;
    options.export = positional.next();
    options.args = positional.collect();
    Ok(options)
}

fn parse_value(ty: ValType, text: &str) -> Result<Value> {
    let value = match ty {
        ValType::I32 => Value::I32(text.parse()?),
        ValType::I64 => Value::I64(text.parse()?),
        ValType::F32 => Value::F32(text.parse()?),
        ValType::F64 => Value::F64(text.parse()?),
    };
    Ok(value)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = parse_options()?;
    let bytes = std::fs::read(&options.file)
        .with_context(|| format!("could not read `{}`", options.file))?;
    let module = Arc::new(Module::decode(&bytes)?);

    if options.listing {
        return print_listing(&module);
    }

    let export = options.export.as_deref().unwrap_or("main");
    let results = if options.debug {
        run_debugger(module, export, &options.args)?
    } else {
        let instance = Instance::new(module, Imports::new())?;
        let func = instance.export(export)?;
        let args = arguments(func.ty().params.as_slice(), &options.args)?;
        func.call(&args)?
    };
    for value in results {
        println!("{value}");
    }
    Ok(())
}

fn arguments(params: &[ValType], args: &[String]) -> Result<Vec<Value>> {
    if args.len() > params.len() {
        bail!("expected at most {} arguments, got {}", params.len(), args.len());
    }
    params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (ty, text))| {
            parse_value(*ty, text).with_context(|| format!("argument {index} is not an {ty}"))
        })
        .collect()
}

#[cfg(feature = "debugger")]
fn print_listing(module: &Module) -> Result<()> {
    use std::io::IsTerminal;
    use wasmtree::debug::{Listing, Style};

    let style = if std::io::stdout().is_terminal() {
        Style::Ansi
    } else {
        Style::Plain
    };
    print!("{}", Listing::new(module, style));
    Ok(())
}

#[cfg(not(feature = "debugger"))]
fn print_listing(_module: &Module) -> Result<()> {
    bail!("`--listing` needs wasmtree built with the `debugger` feature")
}

#[cfg(feature = "debugger")]
fn run_debugger(module: Arc<Module>, export: &str, args: &[String]) -> Result<Vec<Value>> {
    use wasmtree::debug::{Debugger, Style, Terminal};
    use wasmtree::Config;

    let debugger = Debugger::new(Arc::clone(&module), Style::Ansi, Terminal);
    let instance = Instance::with_observer(module, Imports::new(), Config::default(), debugger)?;
    let func = instance.export(export)?;
    let args = arguments(func.ty().params.as_slice(), args)?;
    Ok(func.call(&args)?)
}

#[cfg(not(feature = "debugger"))]
fn run_debugger(_module: Arc<Module>, _export: &str, _args: &[String]) -> Result<Vec<Value>> {
    bail!("`--debug` needs wasmtree built with the `debugger` feature")
}
