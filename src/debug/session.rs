
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::sync::Arc;

use tracing::debug;

use super::printer::{Listing, Style};
use crate::error::{trap, VmResult};
use crate::interpreter::GlobalState;
use crate::module::Module;
use crate::observer::{Observer, Owner, Step};
use crate::value::Value;

/// Lines shown above and below the current one.
const WINDOW: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    Resume,
    StepOver,
    StepIn,
    StepOut,
    /// Flips the breakpoint on a listing line (0-based) and stays paused.
    Toggle(usize),
    Quit,
}

impl Command {
    /// Parses a debugger prompt answer. Line numbers are typed 1-based.
    pub fn parse(input: &str) -> Option<Command> {
        let mut words = input.split_whitespace();
        let command = match words.next().unwrap_or("n") {
            "c" | "continue" => Command::Resume,
            "n" | "next" => Command::StepOver,
            "s" | "step" => Command::StepIn,
            "o" | "out" => Command::StepOut,
            "q" | "quit" => Command::Quit,
            "b" | "break" => {
                let line: usize = words.next()?.parse().ok()?;
                Command::Toggle(line.checked_sub(1)?)
            }
            _ => return None,
        };
        Some(command)
    }
}

/// Decides what the debugger does next each time it pauses.
pub trait Controller {
    /// `line` is the paused listing line, `screen` the rendered state.
    fn command(&mut self, line: usize, screen: &str) -> Command;
}

/// Interactive controller on stdin and stdout. End of input quits.
#[derive(Debug, Default)]
pub struct Terminal;

impl Controller for Terminal {
    fn command(&mut self, _line: usize, screen: &str) -> Command {
        let stdin = std::io::stdin();
        loop {
            let mut stdout = std::io::stdout().lock();
            let prompt = "(c)ontinue (n)ext (s)tep in (o)ut (b N) breakpoint (q)uit> ";
            if write!(stdout, "\x1b[2J\x1b[H{screen}\n{prompt}")
                .and_then(|_| stdout.flush())
                .is_err()
            {
                return Command::Quit;
            }
            drop(stdout);

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) | Err(_) => return Command::Quit,
                Ok(_) => {}
            }
            if let Some(command) = Command::parse(&input) {
                return command;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Mode {
    Run,
    StepIn,
    StepOver { depth: usize },
    StepOut { depth: usize },
}

/// An [`Observer`] that pauses on breakpoints and steps, shows where execution
/// is and lets a [`Controller`] pick what happens next.
///
/// Starts paused at the first instruction it sees.
pub struct Debugger<C> {
    module: Arc<Module>,
    listing: Listing,
    breakpoints: BTreeSet<usize>,
    mode: Mode,
    controller: C,
}

impl<C: Controller> Debugger<C> {
    pub fn new(module: Arc<Module>, style: Style, controller: C) -> Self {
        let listing = Listing::new(&module, style);
        Debugger {
            module,
            listing,
            breakpoints: BTreeSet::new(),
            mode: Mode::StepIn,
            controller,
        }
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = usize> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Returns whether the breakpoint is now set. Lines that are not
    /// instructions never hold one.
    pub fn toggle_breakpoint(&mut self, line: usize) -> bool {
        if self.listing.site(line).is_none() {
            debug!(line, "no instruction on line, breakpoint ignored");
            return false;
        }
        if self.breakpoints.remove(&line) {
            false
        } else {
            self.breakpoints.insert(line)
        }
    }

    /// Runs until the next breakpoint instead of starting paused.
    pub fn resume(&mut self) {
        self.mode = Mode::Run;
    }

    fn should_pause(&self, line: usize, depth: usize) -> bool {
        if self.breakpoints.contains(&line) {
            return true;
        }
        match self.mode {
            Mode::Run => false,
            Mode::StepIn => true,
            Mode::StepOver { depth: paused } => depth <= paused,
            Mode::StepOut { depth: paused } => depth < paused,
        }
    }

    fn render(&self, line: usize, step: &Step<'_>) -> String {
        let module = &self.module;
        let mut screen = String::new();

        let calls = step
            .call_stack
            .iter()
            .map(|owner| owner.describe(module))
            .collect::<Vec<String>>()
            .join("->");
        screen.push_str(&format!(
            "wasmtree debugger: {}@{}    {calls}\n",
            step.owner.describe(module),
            line + 1
        ));

        let first = line.saturating_sub(WINDOW);
        let last = (line + WINDOW + 1).min(self.listing.len());
        for number in first..last {
            let marker = match (number == line, self.breakpoints.contains(&number)) {
                (true, _) => '>',
                (false, true) => '*',
                (false, false) => ' ',
            };
            let text = self.listing.text(number).unwrap_or_default();
            screen.push_str(&format!("{marker}{:>5} {text}\n", number + 1));
        }

        screen.push_str(&format!("stack: [{}]\n", values(step.stack.iter().copied())));
        screen.push_str(&format!(
            "locals: [{}]\n",
            values(step.locals.iter().copied())
        ));
        let globals = step
            .globals
            .iter()
            .map(|state| match state {
                GlobalState::Ready(value) => value.to_string(),
                GlobalState::Unbound => "unbound".to_string(),
                GlobalState::Pending => "pending".to_string(),
                GlobalState::Evaluating => "evaluating".to_string(),
            })
            .collect::<Vec<String>>()
            .join(", ");
        screen.push_str(&format!("globals: [{globals}]"));
        screen
    }
}

fn values(values: impl Iterator<Item = Value>) -> String {
    values
        .map(|value| value.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

impl<C: Controller> Observer for Debugger<C> {
    fn step(&mut self, step: &Step<'_>) -> VmResult<()> {
        let Owner::Func(func) = step.owner else {
            return Ok(());
        };
        let Some(line) = self.listing.line_of(func, step.node.id) else {
            return Ok(());
        };
        let depth = step.call_stack.len();
        if !self.should_pause(line, depth) {
            return Ok(());
        }

        loop {
            let screen = self.render(line, step);
            match self.controller.command(line, &screen) {
                Command::Resume => self.mode = Mode::Run,
                Command::StepOver => self.mode = Mode::StepOver { depth },
                Command::StepIn => self.mode = Mode::StepIn,
                Command::StepOut => self.mode = Mode::StepOut { depth },
                Command::Toggle(target) => {
                    self.toggle_breakpoint(target);
                    continue;
                }
                Command::Quit => return Err(trap!(Interrupted, "stopped by the debugger")),
            }
            return Ok(());
        }
    }
}
