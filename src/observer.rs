use std::fmt::{Debug, Formatter};
use std::io::Write;

use num_bigint::BigInt;

use crate::command::Command;
use crate::machine::RunState;

/// What one executed instruction did. Values are captured before the
/// instruction mutated memory, except `written`.
#[derive(Debug, Clone)]
pub struct Step<'a> {
    /// Zero-based program index of the instruction.
    pub index: usize,
    pub command: &'a Command,
    /// Accumulator before execution; `None` while uninitialized.
    pub accumulator: Option<BigInt>,
    /// Effective cell address for address-mode arguments.
    pub address: Option<String>,
    /// For indirect arguments, the value of the pointer cell.
    pub pointer: Option<BigInt>,
    /// Value the instruction consumed: a constant, a cell, or parsed input.
    pub operand: Option<BigInt>,
    /// Cell assigned by the instruction and its new value.
    pub written: Option<(String, BigInt)>,
    pub jumped: bool,
    /// Most recent raw input token consumed during the run.
    pub input: Option<&'a str>,
}

/// Observer trait for instruction-level hooks. The engine calls `on_step`
/// after every executed instruction and `on_finish` once the run ends.
/// Observers cannot fail and cannot alter execution.
pub trait Observer {
    fn on_step(&mut self, step: &Step<'_>);

    fn on_finish(&mut self, _state: &RunState) {}
}

impl Debug for dyn Observer + Send {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Observer")
    }
}

/// Writes one `[trace]` line per executed instruction.
pub struct TraceObserver<W> {
    out: W,
}

impl<W: Write> TraceObserver<W> {
    pub fn new(out: W) -> Self {
        TraceObserver { out }
    }
}

impl<W: Write> Observer for TraceObserver<W> {
    fn on_step(&mut self, step: &Step<'_>) {
        let acc = match &step.accumulator {
            Some(v) => v.to_string(),
            None => "?".to_string(),
        };
        let effect = match (&step.written, step.jumped) {
            (Some((addr, value)), _) => format!(" -> [{addr}]={value}"),
            (None, true) => " -> jump".to_string(),
            (None, false) => String::new(),
        };
        let _ = writeln!(
            self.out,
            "[trace] line={} acc={} {}{}",
            step.command.line(),
            acc,
            step.command,
            effect
        );
    }

    fn on_finish(&mut self, state: &RunState) {
        let _ = writeln!(self.out, "[trace] finished: {state}");
    }
}
