//! Time and space cost accounting for executed programs.
//!
//! Two criteria are tracked side by side:
//!
//! - **uniform**: every instruction costs 1, every used cell costs 1;
//! - **logarithmic**: costs grow with the decimal length of the numbers and
//!   addresses an instruction touches, and each cell costs the length of the
//!   largest value (by magnitude) it ever held.

use std::collections::{BTreeMap, HashMap};

use num_bigint::BigInt;
use serde::Serialize;

use crate::command::{AddressingMode, Opcode};
use crate::memory::compare_addresses;
use crate::observer::{Observer, Step};

/// Decimal length of |value|; 1 for zero.
pub fn length(value: &BigInt) -> u64 {
    value.magnitude().to_string().len() as u64
}

/// Length of an address token: numeric addresses by value, names by text.
fn address_length(addr: &str) -> u64 {
    match addr.parse::<BigInt>() {
        Ok(v) => length(&v),
        Err(_) => addr.chars().count().max(1) as u64,
    }
}

fn opt_length(value: Option<&BigInt>) -> u64 {
    value.map_or(1, length)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpcodeCost {
    pub count: u64,
    pub uniform: u64,
    pub logarithmic: u64,
}

/// Running cost counters, fed by the engine after each instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Complexity {
    instructions: u64,
    logarithmic_time: u64,
    input_tokens: u64,
    input_size: u64,
    peaks: HashMap<String, BigInt>,
    per_opcode: BTreeMap<Opcode, OpcodeCost>,
}

impl Complexity {
    pub fn new() -> Self {
        Complexity::default()
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn uniform_time(&self) -> u64 {
        self.instructions
    }

    pub fn logarithmic_time(&self) -> u64 {
        self.logarithmic_time
    }

    /// Number of distinct cells that ever held a value.
    pub fn uniform_space(&self) -> u64 {
        self.peaks.len() as u64
    }

    pub fn logarithmic_space(&self) -> u64 {
        self.peaks.values().map(length).sum()
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    /// Summed length of all consumed input tokens.
    pub fn input_size(&self) -> u64 {
        self.input_size
    }

    /// Largest value (by magnitude) each cell held during the run.
    pub fn peak(&self, addr: &str) -> Option<&BigInt> {
        self.peaks.get(addr)
    }

    pub fn per_opcode(&self) -> &BTreeMap<Opcode, OpcodeCost> {
        &self.per_opcode
    }

    pub fn report(&self) -> ComplexityReport {
        let mut peak_memory: Vec<(String, String)> = self
            .peaks
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        peak_memory.sort_by(|(a, _), (b, _)| compare_addresses(a, b));
        ComplexityReport {
            instructions: self.instructions,
            uniform_time: self.uniform_time(),
            logarithmic_time: self.logarithmic_time,
            uniform_space: self.uniform_space(),
            logarithmic_space: self.logarithmic_space(),
            input_tokens: self.input_tokens,
            input_size: self.input_size,
            per_opcode: self
                .per_opcode
                .iter()
                .map(|(op, cost)| (op.keyword().to_string(), *cost))
                .collect(),
            peak_memory,
        }
    }

    fn record_peak(&mut self, addr: &str, value: &BigInt) {
        match self.peaks.get_mut(addr) {
            Some(peak) => {
                if value.magnitude() > peak.magnitude() {
                    *peak = value.clone();
                }
            }
            None => {
                self.peaks.insert(addr.to_string(), value.clone());
            }
        }
    }
}

/// Logarithmic cost of an instruction.
pub fn logarithmic_cost(step: &Step<'_>) -> u64 {
    let command = step.command;
    let arg = command.formatted_argument();

    // t(a): cost of fetching an operand.
    let operand_cost = || match command.mode() {
        Some(AddressingMode::Const) => step
            .operand
            .as_ref()
            .map_or_else(|| address_length(arg), length),
        Some(AddressingMode::DirectAddress) => {
            address_length(arg) + opt_length(step.operand.as_ref())
        }
        Some(AddressingMode::IndirectAddress) => {
            address_length(arg)
                + opt_length(step.pointer.as_ref())
                + opt_length(step.operand.as_ref())
        }
        Some(AddressingMode::Label) | None => 1,
    };
    // Cost of naming the destination cell.
    let target_cost = || {
        let base = address_length(arg);
        match command.mode() {
            Some(AddressingMode::IndirectAddress) => base + opt_length(step.pointer.as_ref()),
            _ => base,
        }
    };
    let acc = opt_length(step.accumulator.as_ref());

    match command.opcode() {
        Opcode::Halt | Opcode::Jump => 1,
        Opcode::Jgtz | Opcode::Jzero => acc,
        Opcode::Read => opt_length(step.operand.as_ref()) + target_cost(),
        Opcode::Write | Opcode::Load => operand_cost(),
        Opcode::Store => acc + target_cost(),
        Opcode::Add | Opcode::Sub | Opcode::Mult | Opcode::Div => acc + operand_cost(),
        Opcode::Unknown | Opcode::Null => 0,
    }
}

impl Observer for Complexity {
    fn on_step(&mut self, step: &Step<'_>) {
        let opcode = step.command.opcode();
        if opcode.is_placeholder() {
            return;
        }
        let cost = logarithmic_cost(step);
        self.instructions += 1;
        self.logarithmic_time += cost;

        let entry = self.per_opcode.entry(opcode).or_default();
        entry.count += 1;
        entry.uniform += 1;
        entry.logarithmic += cost;

        if opcode == Opcode::Read {
            if let Some(value) = &step.operand {
                self.input_tokens += 1;
                self.input_size += length(value);
            }
        }
        if let Some((addr, value)) = &step.written {
            self.record_peak(addr, value);
        }
    }
}

/// Serializable summary of a `Complexity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexityReport {
    pub instructions: u64,
    pub uniform_time: u64,
    pub logarithmic_time: u64,
    pub uniform_space: u64,
    pub logarithmic_space: u64,
    pub input_tokens: u64,
    pub input_size: u64,
    pub per_opcode: Vec<(String, OpcodeCost)>,
    pub peak_memory: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_str;
    use crate::machine::Machine;
    use crate::tape::InputTape;

    fn measure(src: &str, input: &str) -> Complexity {
        let mut m = Machine::new(load_str(src).expect("load failed"));
        m.attach_input(Box::new(InputTape::from_tokens(input)));
        m.enable_complexity();
        m.run();
        m.complexity().cloned().expect("complexity enabled")
    }

    #[test]
    fn peak_memory_uses_memory_order() {
        let c = measure("LOAD =5\nSTORE 10\nSTORE 9\nSTORE 009\nSTORE y", "");
        let addrs: Vec<String> = c.report().peak_memory.into_iter().map(|(a, _)| a).collect();
        assert_eq!(addrs, vec!["0", "9", "10", "y"]);
    }

    #[test]
    fn lengths() {
        assert_eq!(length(&BigInt::from(0)), 1);
        assert_eq!(length(&BigInt::from(-999)), 3);
        assert_eq!(length(&BigInt::from(1000)), 4);
        assert_eq!(address_length("x"), 1);
        assert_eq!(address_length("12"), 2);
    }

    #[test]
    fn logarithmic_time_per_instruction() {
        // LOAD =100 -> l(100) = 3
        // ADD =5    -> l(100) + l(5) = 4
        // STORE 12  -> l(105) + l(12) = 5
        // WRITE 12  -> l(12) + l(105) = 5
        // HALT      -> 1
        let c = measure("LOAD =100\nADD =5\nSTORE 12\nWRITE 12\nHALT", "");
        assert_eq!(c.instructions(), 5);
        assert_eq!(c.uniform_time(), 5);
        assert_eq!(c.logarithmic_time(), 3 + 4 + 5 + 5 + 1);
    }

    #[test]
    fn indirect_costs_include_pointer() {
        // READ 1    -> l(7) + l(1) = 2
        // LOAD =55  -> 2
        // STORE *1  -> l(55) + l(1) + l(7) = 4
        // LOAD *1   -> l(1) + l(7) + l(55) = 4
        let c = measure("READ 1\nLOAD =55\nSTORE *1\nLOAD *1", "7");
        assert_eq!(c.logarithmic_time(), 2 + 2 + 4 + 4);
        assert_eq!(c.input_tokens(), 1);
        assert_eq!(c.input_size(), 1);
    }

    #[test]
    fn space_uses_peak_values() {
        let c = measure("LOAD =-12345\nSTORE 1\nLOAD =1\nSTORE 1\nHALT", "");
        assert_eq!(c.uniform_space(), 2);
        assert_eq!(c.peak("1"), Some(&BigInt::from(-12345)));
        assert_eq!(c.peak("0"), Some(&BigInt::from(-12345)));
        assert_eq!(c.logarithmic_space(), 10);
    }

    #[test]
    fn blank_lines_cost_nothing() {
        let c = measure("\n\nLOAD =1\n\nHALT", "");
        assert_eq!(c.instructions(), 2);
        assert_eq!(c.per_opcode().get(&Opcode::Null), None);
        assert_eq!(c.per_opcode()[&Opcode::Load].count, 1);
    }

    #[test]
    fn failed_instruction_is_not_counted() {
        let c = measure("LOAD =1\nDIV =0", "");
        assert_eq!(c.instructions(), 1);
    }
}
