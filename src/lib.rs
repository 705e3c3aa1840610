//! RAM (Random Access Machine) interpreter.
//!
//! Programs are lines of `[label:] OPCODE [argument]`. Memory cells hold
//! unbounded integers; cell `0` is the accumulator. Input is read from a
//! one-shot tape, output appended to a write-only tape.
//!
//! ```
//! use ram_machine::{load_str, InputTape, Machine};
//!
//! let program = load_str("READ 1\nLOAD 1\nMULT 1\nWRITE 0\nHALT").unwrap();
//! let mut machine = Machine::new(program);
//! machine.attach_input(Box::new(InputTape::from_tokens("12")));
//! let report = machine.run();
//! assert_eq!(report.output_text(), "144");
//! ```

pub mod command;
pub mod complexity;
pub mod config;
pub mod error;
pub mod loader;
pub mod machine;
pub mod memory;
pub mod observer;
pub mod repl;
pub mod tape;

pub use command::{AddressingMode, Command, Opcode};
pub use complexity::{Complexity, ComplexityReport};
pub use config::{MachineConfig, UnknownOpcodePolicy};
pub use error::{Error, ErrorReport, LoadError, Result, RuntimeError};
pub use loader::{load, load_str, LabelTable, Program};
pub use machine::{CancelToken, Machine, RunReport, RunState, RunStatus};
pub use memory::{Cell, Memory};
pub use observer::{Observer, Step, TraceObserver};
pub use tape::{InputSource, InputTape, OutputSink, OutputTape, PromptInput, StreamSink};

/// Load `src` and run it against a whitespace-delimited input tape.
pub fn run_source(src: &str, input: &str) -> Result<RunReport> {
    let program = load_str(src)?;
    let mut machine = Machine::new(program);
    machine.attach_input(Box::new(InputTape::from_tokens(input)));
    Ok(machine.run())
}
