// src/machine.rs
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::Serialize;

use crate::command::{AddressingMode, Command, Opcode};
use crate::complexity::{Complexity, ComplexityReport};
use crate::config::{MachineConfig, UnknownOpcodePolicy};
use crate::error::{ErrorReport, RuntimeError};
use crate::loader::Program;
use crate::memory::{canonical_address, Cell, Memory, ACCUMULATOR};
use crate::observer::{Observer, Step};
use crate::tape::{InputSource, OutputSink, OutputTape};

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Program loaded, memory and tapes not yet initialized.
    Ready,
    Running,
    /// HALT executed or the program ran off its last line.
    Halted,
    Failed(RuntimeError),
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Halted | RunState::Failed(_) | RunState::Cancelled
        )
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunState::Ready => RunStatus::Ready,
            RunState::Running => RunStatus::Running,
            RunState::Halted => RunStatus::Halted,
            RunState::Failed(_) => RunStatus::Failed,
            RunState::Cancelled => RunStatus::Cancelled,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Ready => f.write_str("ready"),
            RunState::Running => f.write_str("running"),
            RunState::Halted => f.write_str("halted"),
            RunState::Failed(err) => write!(f, "failed ({err})"),
            RunState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// `RunState` without the error payload, for serialized reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ready,
    Running,
    Halted,
    Failed,
    Cancelled,
}

/// Shared cancellation flag. Cloning shares the flag; the engine checks it
/// once per instruction boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result surface of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    pub memory: Vec<(String, String)>,
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityReport>,
}

impl RunReport {
    /// Output tape as text: tokens separated by single spaces.
    pub fn output_text(&self) -> String {
        self.output.join(" ").trim().to_string()
    }
}

enum Flow {
    Next,
    Jump(usize),
    Halt,
}

#[derive(Default)]
struct Effects {
    address: Option<String>,
    pointer: Option<BigInt>,
    operand: Option<BigInt>,
    written: Option<(String, BigInt)>,
}

/// The RAM machine: one instance owns one run's memory, tapes and program.
#[derive(Debug)]
pub struct Machine {
    program: Arc<Program>,
    config: MachineConfig,
    memory: Memory,
    output: OutputTape,
    input: Option<Box<dyn InputSource + Send>>,
    sinks: Vec<Box<dyn OutputSink + Send>>,
    observers: Vec<Box<dyn Observer + Send>>,
    complexity: Option<Complexity>,
    ip: usize,
    state: RunState,
    last_input: Option<String>,
    executed: u64,
    cancel: CancelToken,
}

impl Machine {
    pub fn new(program: Program) -> Self {
        Machine::with_config(program, MachineConfig::default())
    }

    pub fn with_config(program: Program, config: MachineConfig) -> Self {
        Machine {
            program: Arc::new(program),
            config,
            memory: Memory::new(),
            output: OutputTape::new(),
            input: None,
            sinks: Vec::new(),
            observers: Vec::new(),
            complexity: None,
            ip: 0,
            state: RunState::Ready,
            last_input: None,
            executed: 0,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the program and return to `Ready`.
    pub fn load(&mut self, program: Program) {
        self.program = Arc::new(program);
        self.reset();
    }

    /// Return to `Ready`, discarding memory and output.
    pub fn reset(&mut self) {
        self.memory = Memory::new();
        self.output.clear();
        self.ip = 0;
        self.state = RunState::Ready;
        self.last_input = None;
        self.executed = 0;
    }

    pub fn attach_input(&mut self, input: Box<dyn InputSource + Send>) {
        self.input = Some(input);
    }

    /// Extra sink receiving every written token; the output tape is always kept.
    pub fn attach_sink(&mut self, sink: Box<dyn OutputSink + Send>) {
        self.sinks.push(sink);
    }

    pub fn attach_observer(&mut self, observer: Box<dyn Observer + Send>) {
        self.observers.push(observer);
    }

    /// Track time and space costs for subsequent runs.
    pub fn enable_complexity(&mut self) {
        if self.complexity.is_none() {
            self.complexity = Some(Complexity::new());
        }
    }

    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn output(&self) -> &OutputTape {
        &self.output
    }

    pub fn complexity(&self) -> Option<&Complexity> {
        self.complexity.as_ref()
    }

    /// Index of the next instruction to execute.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Instructions executed so far in this run.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// The command that the next `step` will execute, if running.
    pub fn current(&self) -> Option<&Command> {
        match self.state {
            RunState::Ready | RunState::Running => self.program.get(self.ip),
            _ => None,
        }
    }

    /// Enter `Running`: fresh memory, empty output tape, pointer at 0.
    pub fn start(&mut self) {
        self.reset();
        if let Some(c) = self.complexity.as_mut() {
            *c = Complexity::new();
        }
        self.state = RunState::Running;
        log::debug!("run started ({} lines)", self.program.len());
        self.settle();
    }

    /// Execute one instruction, starting the run if it is still `Ready`.
    /// Returns the state after the step.
    pub fn step(&mut self) -> &RunState {
        if self.state == RunState::Ready {
            self.start();
        }
        if self.state.is_terminal() {
            return &self.state;
        }
        if self.cancel.is_cancelled() {
            self.finish(RunState::Cancelled);
            return &self.state;
        }
        if let Some(limit) = self.config.step_limit {
            if self.executed >= limit {
                log::debug!("step limit {limit} reached");
                self.finish(RunState::Cancelled);
                return &self.state;
            }
        }

        let program = Arc::clone(&self.program);
        let index = self.ip;
        let Some(command) = program.get(index) else {
            self.finish(RunState::Halted);
            return &self.state;
        };

        let accumulator = self.memory.accumulator().value().cloned();
        let mut effects = Effects::default();
        match self.execute(command, &mut effects) {
            Ok(flow) => {
                self.executed += 1;
                {
                    let step = Step {
                        index,
                        command,
                        accumulator,
                        address: effects.address,
                        pointer: effects.pointer,
                        operand: effects.operand,
                        written: effects.written,
                        jumped: matches!(flow, Flow::Jump(_)),
                        input: self.last_input.as_deref(),
                    };
                    for obs in self.observers.iter_mut() {
                        obs.on_step(&step);
                    }
                    if let Some(c) = self.complexity.as_mut() {
                        c.on_step(&step);
                    }
                }
                match flow {
                    Flow::Halt => self.finish(RunState::Halted),
                    Flow::Jump(target) => {
                        self.ip = target;
                        self.settle();
                    }
                    Flow::Next => {
                        self.ip += 1;
                        self.settle();
                    }
                }
            }
            Err(err) => self.finish(RunState::Failed(err)),
        }
        &self.state
    }

    /// Execute up to `n` instructions (or stop sooner if the run ends).
    /// Returns the number of instructions executed.
    pub fn step_n(&mut self, n: usize) -> usize {
        let before = self.executed;
        for _ in 0..n {
            if self.step().is_terminal() {
                break;
            }
        }
        (self.executed - before) as usize
    }

    /// Run until halt, failure or cancellation.
    pub fn run(&mut self) -> RunReport {
        if self.state == RunState::Ready {
            self.start();
        }
        while !self.state.is_terminal() {
            self.step();
        }
        self.report()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            status: self.state.status(),
            error: match &self.state {
                RunState::Failed(err) => Some(ErrorReport::from(err)),
                _ => None,
            },
            memory: self.memory.snapshot(),
            output: self.output.tokens().to_vec(),
            complexity: self.complexity.as_ref().map(Complexity::report),
        }
    }

    // Skip blank lines (and unknown ones when permitted); halt past the end.
    fn settle(&mut self) {
        while let Some(command) = self.program.get(self.ip) {
            let skip = match command.opcode() {
                Opcode::Null => true,
                Opcode::Unknown => self.config.unknown_opcodes == UnknownOpcodePolicy::Skip,
                _ => false,
            };
            if !skip {
                return;
            }
            self.ip += 1;
        }
        self.finish(RunState::Halted);
    }

    fn finish(&mut self, state: RunState) {
        log::debug!("run finished: {state} after {} instruction(s)", self.executed);
        self.state = state;
        for obs in self.observers.iter_mut() {
            obs.on_finish(&self.state);
        }
        if let Some(c) = self.complexity.as_mut() {
            c.on_finish(&self.state);
        }
    }

    fn execute(&mut self, command: &Command, fx: &mut Effects) -> Result<Flow, RuntimeError> {
        let line = command.line();
        let opcode = command.opcode();

        match opcode {
            Opcode::Halt => return Ok(Flow::Halt),
            Opcode::Unknown => {
                return Err(RuntimeError::UnknownInstruction {
                    line,
                    keyword: command.keyword().to_string(),
                })
            }
            Opcode::Null => return Ok(Flow::Next),
            _ => {}
        }

        let mode = command
            .mode()
            .ok_or(RuntimeError::MissingArgument { line, opcode })?;
        check_mode(command, mode)?;
        let arg = command.formatted_argument();

        match opcode {
            Opcode::Jump => Ok(Flow::Jump(self.jump_target(command)?)),
            Opcode::Jgtz => {
                let positive = self.memory.read(ACCUMULATOR).is_some_and(|v| v.is_positive());
                if positive {
                    Ok(Flow::Jump(self.jump_target(command)?))
                } else {
                    Ok(Flow::Next)
                }
            }
            Opcode::Jzero => {
                let zero = self.memory.read(ACCUMULATOR).is_some_and(|v| v.is_zero());
                if zero {
                    Ok(Flow::Jump(self.jump_target(command)?))
                } else {
                    Ok(Flow::Next)
                }
            }
            Opcode::Read => {
                let addr = self.resolve_address(command, mode, fx)?;
                let token = self
                    .input
                    .as_mut()
                    .and_then(|input| input.next_token())
                    .ok_or(RuntimeError::InputTapeEmpty { line })?;
                let value = parse_number(&token, line)?;
                self.last_input = Some(token);
                self.memory.write(&addr, Cell::Value(value.clone()));
                fx.operand = Some(value.clone());
                fx.written = Some((addr, value));
                Ok(Flow::Next)
            }
            Opcode::Write => {
                let text = if mode == AddressingMode::Const {
                    fx.operand = Some(parse_number(arg, line)?);
                    arg.to_string()
                } else {
                    let value = self.fetch_operand(command, mode, fx)?;
                    value.to_string()
                };
                self.output.emit(&text);
                for sink in self.sinks.iter_mut() {
                    sink.emit(&text);
                }
                Ok(Flow::Next)
            }
            Opcode::Store => {
                let addr = self.resolve_address(command, mode, fx)?;
                let cell = self.memory.accumulator().clone();
                if let Cell::Value(v) = &cell {
                    fx.written = Some((addr.clone(), v.clone()));
                }
                self.memory.write(&addr, cell);
                Ok(Flow::Next)
            }
            Opcode::Load => {
                let value = self.fetch_operand(command, mode, fx)?;
                self.memory.set_accumulator(value.clone());
                fx.written = Some((ACCUMULATOR.to_string(), value));
                Ok(Flow::Next)
            }
            Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::Div => {
                let acc = self
                    .memory
                    .read(ACCUMULATOR)
                    .cloned()
                    .ok_or(RuntimeError::AccumulatorUninitialized { line })?;
                let operand = self.fetch_operand(command, mode, fx)?;
                let result = match opcode {
                    Opcode::Add => acc + operand,
                    Opcode::Sub => acc - operand,
                    Opcode::Mult => acc * operand,
                    _ => {
                        if operand.is_zero() {
                            return Err(RuntimeError::DivisionByZero { line });
                        }
                        // BigInt division truncates toward zero.
                        acc / operand
                    }
                };
                self.memory.set_accumulator(result.clone());
                fx.written = Some((ACCUMULATOR.to_string(), result));
                Ok(Flow::Next)
            }
            Opcode::Halt | Opcode::Unknown | Opcode::Null => Ok(Flow::Next),
        }
    }

    fn jump_target(&self, command: &Command) -> Result<usize, RuntimeError> {
        let label = command.formatted_argument();
        self.program
            .labels()
            .get(label)
            .ok_or_else(|| RuntimeError::UnknownLabel {
                line: command.line(),
                label: label.to_string(),
            })
    }

    /// Effective cell address of a direct or indirect argument.
    fn resolve_address(
        &self,
        command: &Command,
        mode: AddressingMode,
        fx: &mut Effects,
    ) -> Result<String, RuntimeError> {
        let arg = command.formatted_argument();
        let addr = if mode == AddressingMode::IndirectAddress {
            let pointer = self.memory.read(arg).ok_or_else(|| RuntimeError::UninitializedCell {
                line: command.line(),
                address: arg.to_string(),
            })?;
            fx.pointer = Some(pointer.clone());
            pointer.to_string()
        } else {
            canonical_address(arg).into_owned()
        };
        fx.address = Some(addr.clone());
        Ok(addr)
    }

    /// Value of a constant or of the addressed cell.
    fn fetch_operand(
        &self,
        command: &Command,
        mode: AddressingMode,
        fx: &mut Effects,
    ) -> Result<BigInt, RuntimeError> {
        let value = if mode == AddressingMode::Const {
            parse_number(command.formatted_argument(), command.line())?
        } else {
            let addr = self.resolve_address(command, mode, fx)?;
            self.memory
                .read(&addr)
                .cloned()
                .ok_or(RuntimeError::UninitializedCell {
                    line: command.line(),
                    address: addr,
                })?
        };
        fx.operand = Some(value.clone());
        Ok(value)
    }
}

/// Reject addressing modes the opcode does not accept, before any effect.
fn check_mode(command: &Command, mode: AddressingMode) -> Result<(), RuntimeError> {
    use AddressingMode::*;

    let opcode = command.opcode();
    let ok = match opcode {
        Opcode::Jump | Opcode::Jgtz | Opcode::Jzero => {
            if mode == DirectAddress {
                // A bare token that is not a declared label.
                return Err(RuntimeError::UnknownLabel {
                    line: command.line(),
                    label: command.formatted_argument().to_string(),
                });
            }
            mode == Label
        }
        Opcode::Read | Opcode::Store => matches!(mode, DirectAddress | IndirectAddress),
        Opcode::Write | Opcode::Load | Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::Div => {
            mode != Label
        }
        Opcode::Halt | Opcode::Unknown | Opcode::Null => true,
    };
    if ok {
        Ok(())
    } else {
        Err(RuntimeError::InvalidArgumentMode {
            line: command.line(),
            opcode,
            mode,
        })
    }
}

/// Parse a decimal integer: an optional sign followed by ASCII digits.
fn parse_number(text: &str, line: usize) -> Result<BigInt, RuntimeError> {
    let invalid = || RuntimeError::InvalidNumber {
        line,
        text: text.to_string(),
    };
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse::<BigInt>().map_err(|_| invalid())
}
