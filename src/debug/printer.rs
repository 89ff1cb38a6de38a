
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::module::{FuncType, Module};
use crate::opcode::{self, Category, Opcode};
use crate::structure::{flatten, BlockType, Flat, Immediate, Node};
use crate::value::ValType;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Style {
    #[default]
    Plain,
    Ansi,
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const NUMBER: &str = "\x1b[33m";

fn color(category: Category) -> Option<&'static str> {
    match category {
        Category::Scope => Some("\x1b[95m"),
        Category::Branch => Some("\x1b[35m"),
        Category::Variable => Some("\x1b[31m"),
        Category::Memory => Some("\x1b[34m"),
        Category::Numeric => Some("\x1b[36m"),
        Category::Trap => Some("\x1b[91m"),
        Category::Other => None,
    }
}

/// A program point: function index and node id inside its body.
pub type Site = (u32, u32);

#[derive(Debug, Clone, PartialEq)]
enum Text {
    /// Function header or local declaration.
    Heading(String),
    Instruction {
        depth: usize,
        op: Opcode,
        operands: String,
        comments: Vec<String>,
    },
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    text: Text,
    site: Option<Site>,
}

impl Line {
    pub fn site(&self) -> Option<Site> {
        self.site
    }

    pub fn render(&self, style: Style) -> String {
        match &self.text {
            Text::Heading(text) if style == Style::Ansi => format!("\x1b[1m{text}\x1b[22m"),
            Text::Heading(text) => text.clone(),
            Text::Blank => String::new(),
            Text::Instruction {
                depth,
                op,
                operands,
                comments,
            } => {
                let indent = "  ".repeat(depth + 1);
                let name = opcode::name(*op).unwrap_or("???");
                let comment = if comments.is_empty() {
                    String::new()
                } else {
                    format!(" ;; {}", comments.join(" ;; "))
                };
                match (style, color(opcode::category(*op))) {
                    (Style::Ansi, paint) => {
                        let name = match paint {
                            Some(paint) => format!("{paint}{name}{RESET}"),
                            None => name.to_string(),
                        };
                        let operands = if operands.is_empty() {
                            String::new()
                        } else {
                            format!("{NUMBER}{operands}{RESET}")
                        };
                        let comment = if comment.is_empty() {
                            comment
                        } else {
                            format!("{DIM}{comment}{RESET}")
                        };
                        format!("{indent}{name}{operands}{comment}")
                    }
                    (Style::Plain, _) => format!("{indent}{name}{operands}{comment}"),
                }
            }
        }
    }
}

/// Text rendering of every defined function, one instruction per line.
///
/// Instruction lines remember the node they came from so a debugger can go
/// from a line number to a program point and back.
#[derive(Debug, Clone)]
pub struct Listing {
    lines: Vec<Line>,
    sites: HashMap<Site, usize>,
    style: Style,
}

impl Listing {
    pub fn new(module: &Module, style: Style) -> Self {
        let mut listing = Listing {
            lines: Vec::new(),
            sites: HashMap::new(),
            style,
        };
        for (offset, code) in module.codes.iter().enumerate() {
            let func = module.imported_funcs() + offset as u32;
            if offset > 0 {
                listing.push(Text::Blank, None);
            }
            let signature = module
                .func_type(func)
                .map(signature)
                .unwrap_or_else(|| "(?)".to_string());
            listing.push(
                Text::Heading(format!("{}({func}) {signature}", module.func_name(func))),
                None,
            );
            for (index, ty) in code.locals.iter().enumerate().skip(code.params) {
                listing.push(Text::Heading(format!(";; local {index}: {ty}")), None);
            }
            for flat in flatten(&code.body) {
                let site = match flat {
                    Flat::Op { node, .. } => Some((func, node.id)),
                    _ => None,
                };
                listing.push(instruction(module, flat), site);
            }
        }
        listing
    }

    fn push(&mut self, text: Text, site: Option<Site>) {
        if let Some(site) = site {
            self.sites.insert(site, self.lines.len());
        }
        self.lines.push(Line { text, site });
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Line showing `node` of `func`, if it is an instruction line.
    pub fn line_of(&self, func: u32, node: u32) -> Option<usize> {
        self.sites.get(&(func, node)).copied()
    }

    pub fn site(&self, line: usize) -> Option<Site> {
        self.lines.get(line).and_then(Line::site)
    }

    pub fn text(&self, line: usize) -> Option<String> {
        self.lines.get(line).map(|line| line.render(self.style))
    }
}

impl Display for Listing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line.render(self.style))?;
        }
        Ok(())
    }
}

fn types(types: &[ValType]) -> String {
    types
        .iter()
        .map(ValType::to_string)
        .collect::<Vec<String>>()
        .join(", ")
}

fn signature(ty: &FuncType) -> String {
    format!("({}) -> ({})", types(&ty.params), types(&ty.results))
}

fn instruction(module: &Module, flat: Flat<'_>) -> Text {
    let (node, depth) = (flat.node(), flat.depth());
    let label = format!("label @{}", depth + 1);
    match flat {
        Flat::Else { .. } => Text::Instruction {
            depth,
            op: opcode::ELSE,
            operands: String::new(),
            comments: vec![label],
        },
        Flat::End { .. } => Text::Instruction {
            depth,
            op: opcode::END,
            operands: String::new(),
            comments: Vec::new(),
        },
        Flat::Op { .. } => {
            let mut comments = Vec::new();
            if opcode::is_scope(node.op) || matches!(node.op, opcode::CATCH | opcode::CATCH_ALL) {
                comments.push(label);
            }
            if let (opcode::BR | opcode::BR_IF, Immediate::Depth(relative)) = (node.op, &node.imm) {
                let relative = *relative;
                comments.push(match depth.checked_sub(relative as usize) {
                    Some(target) => format!("goto @{target}"),
                    None => format!("goto out of range ({relative})"),
                });
            }
            if let Immediate::Call(target) = &node.imm {
                let signature = module
                    .types
                    .get(target.type_index as usize)
                    .map(signature)
                    .unwrap_or_default();
                match &target.import {
                    Some(import) => {
                        comments.push(format!("import {}.{} {signature}", import.module, import.name))
                    }
                    None => comments.push(format!("${} {signature}", module.func_name(target.func))),
                }
            }
            Text::Instruction {
                depth,
                op: node.op,
                operands: operands(node),
                comments,
            }
        }
    }
}

fn operands(node: &Node) -> String {
    match &node.imm {
        Immediate::None => String::new(),
        Immediate::Block(BlockType::Empty) => String::new(),
        Immediate::Block(BlockType::Value(ty)) => format!(" {ty}"),
        Immediate::Block(BlockType::Func(index)) => format!(" type[{index}]"),
        Immediate::Depth(depth) => format!(" {depth}"),
        Immediate::Table { targets, default } => targets
            .iter()
            .chain(std::iter::once(default))
            .map(|target| format!(" {target}"))
            .collect(),
        Immediate::Local(index) | Immediate::Global(index) => format!(" {index}"),
        Immediate::Data(index) | Immediate::Tag(index) => format!(" {index}"),
        Immediate::I32(value) => format!(" {value}"),
        Immediate::I64(value) => format!(" {value}"),
        Immediate::F32(value) => format!(" {value}"),
        Immediate::F64(value) => format!(" {value}"),
        Immediate::Call(target) => format!(" {}", target.func),
        Immediate::CallIndirect { type_index, table } => format!(" {type_index} {table}"),
        Immediate::Memory(arg) => format!(" {} {}", arg.align, arg.offset),
    }
}
