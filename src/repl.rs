// src/repl.rs
use std::fs;
use std::io::{self, BufRead, Write};

use crate::config::MachineConfig;
use crate::loader::{self, Program};
use crate::machine::{Machine, RunState};
use crate::observer::TraceObserver;
use crate::tape::InputTape;

/// Run a small interactive REPL for loading and running RAM programs.
/// Commands:
///  - asm          : enter program mode (multiline), finish with a single '.' on a line
///  - load <file>  : load a program from a file
///  - input <..>   : set the input tape (whitespace-delimited tokens)
///  - run          : run until HALT, error or end of program
///  - step [N]     : execute N instructions (default 1)
///  - list         : show the program, marking the next instruction
///  - mem          : print memory cells
///  - out          : print the output tape
///  - cost         : print time/space costs of the last run
///  - trace        : toggle per-instruction trace (stderr)
///  - reset        : discard the current run
///  - exit|quit    : exit REPL
///  - help         : show help
pub fn run_repl(config: MachineConfig) {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    let mut session = Session::new(config);
    let _ = writeln!(
        out,
        "RAM machine REPL. Type 'help' for commands. \
         Enter 'asm' to type a program (end with a single '.' line)."
    );

    loop {
        let _ = write!(out, "> ");
        let _ = out.flush();
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                log::error!("error reading input: {err}");
                break;
            }
        }
        match session.execute(line.trim(), &mut input, &mut out) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                log::error!("error writing output: {err}");
                break;
            }
        }
    }
}

/// REPL state: the loaded program, the input tape text and the live run.
pub struct Session {
    config: MachineConfig,
    program: Option<Program>,
    input: String,
    trace: bool,
    machine: Option<Machine>,
}

impl Session {
    pub fn new(config: MachineConfig) -> Self {
        Session {
            config,
            program: None,
            input: String::new(),
            trace: false,
            machine: None,
        }
    }

    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    /// Handle one command line. Returns `Ok(false)` when the session ends.
    pub fn execute<R: BufRead, W: Write>(
        &mut self,
        line: &str,
        input: &mut R,
        out: &mut W,
    ) -> io::Result<bool> {
        if line.is_empty() {
            return Ok(true);
        }
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or_default().to_lowercase();

        match cmd.as_str() {
            "help" => print_help(out)?,
            "asm" => {
                writeln!(out, "Entering program mode. End input with a single '.' on a line.")?;
                let mut src = String::new();
                loop {
                    let mut a = String::new();
                    if input.read_line(&mut a)? == 0 {
                        break;
                    }
                    let t = a.trim_end();
                    if t == "." {
                        break;
                    }
                    src.push_str(t);
                    src.push('\n');
                }
                self.load_source(&src, out)?;
            }
            "load" => match parts.next() {
                Some(path) => match fs::read_to_string(path) {
                    Ok(src) => self.load_source(&src, out)?,
                    Err(err) => writeln!(out, "Cannot read {path}: {err}")?,
                },
                None => writeln!(out, "load requires a file path.")?,
            },
            "input" => {
                self.input = parts.collect::<Vec<_>>().join(" ");
                self.machine = None;
                writeln!(out, "Input tape: [{}]", self.input)?;
            }
            "run" => {
                let Some(machine) = self.live_machine(out)? else {
                    return Ok(true);
                };
                machine.run();
                let state = machine.state().clone();
                let executed = machine.executed();
                print_outcome(out, &state, executed)?;
                writeln!(out, "Output: {}", machine.output().to_text())?;
            }
            "step" => {
                let n: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
                let Some(machine) = self.live_machine(out)? else {
                    return Ok(true);
                };
                let executed = machine.step_n(n);
                writeln!(
                    out,
                    "Stepped {} instruction(s). next={} state={}",
                    executed,
                    machine
                        .current()
                        .map_or_else(|| "-".to_string(), |c| format!("line {}: {}", c.line(), c)),
                    machine.state()
                )?;
            }
            "list" => match &self.program {
                Some(program) => {
                    let next = self.machine.as_ref().and_then(|m| match m.state() {
                        RunState::Running => Some(m.ip()),
                        _ => None,
                    });
                    for (i, c) in program.commands().iter().enumerate() {
                        let marker = if Some(i) == next { "=>" } else { "  " };
                        writeln!(out, "{marker} {:>4}  {c}", c.line())?;
                    }
                }
                None => writeln!(out, "No program loaded.")?,
            },
            "mem" => match &self.machine {
                Some(m) => {
                    for (addr, value) in m.memory().snapshot() {
                        writeln!(out, "{addr:>8}: {value}")?;
                    }
                }
                None => writeln!(out, "Nothing has run yet.")?,
            },
            "out" => match &self.machine {
                Some(m) => writeln!(out, "{}", m.output().to_text())?,
                None => writeln!(out, "Nothing has run yet.")?,
            },
            "cost" => match self.machine.as_ref().and_then(Machine::complexity) {
                Some(c) => {
                    writeln!(out, "instructions:      {}", c.instructions())?;
                    writeln!(out, "time (uniform):    {}", c.uniform_time())?;
                    writeln!(out, "time (log):        {}", c.logarithmic_time())?;
                    writeln!(out, "space (uniform):   {}", c.uniform_space())?;
                    writeln!(out, "space (log):       {}", c.logarithmic_space())?;
                }
                None => writeln!(out, "Nothing has run yet.")?,
            },
            "trace" => {
                self.trace = !self.trace;
                self.machine = None;
                writeln!(out, "Trace {}.", if self.trace { "on" } else { "off" })?;
            }
            "reset" => {
                self.machine = None;
                writeln!(out, "Run discarded.")?;
            }
            "exit" | "quit" => {
                writeln!(out, "Bye.")?;
                return Ok(false);
            }
            _ => {
                writeln!(out, "Unknown command '{}'. Type 'help' for commands.", cmd)?;
            }
        }
        Ok(true)
    }

    fn load_source<W: Write>(&mut self, src: &str, out: &mut W) -> io::Result<()> {
        match loader::load_str(src) {
            Ok(program) => {
                writeln!(
                    out,
                    "Loaded {} line(s), {} label(s).",
                    program.len(),
                    program.labels().len()
                )?;
                self.program = Some(program);
                self.machine = None;
            }
            Err(err) => writeln!(out, "Load error: {err}")?,
        }
        Ok(())
    }

    // The current run, or a fresh one if the last run has ended.
    fn live_machine<W: Write>(&mut self, out: &mut W) -> io::Result<Option<&mut Machine>> {
        let Some(program) = &self.program else {
            writeln!(out, "No program loaded. Use 'asm' or 'load <file>'.")?;
            return Ok(None);
        };
        let finished = self
            .machine
            .as_ref()
            .map_or(true, |m| m.state().is_terminal());
        if finished {
            let mut machine = Machine::with_config(program.clone(), self.config.clone());
            machine.attach_input(Box::new(InputTape::from_tokens(&self.input)));
            machine.enable_complexity();
            if self.trace {
                machine.attach_observer(Box::new(TraceObserver::new(io::stderr())));
            }
            machine.start();
            self.machine = Some(machine);
        }
        Ok(self.machine.as_mut())
    }
}

fn print_outcome<W: Write>(out: &mut W, state: &RunState, executed: u64) -> io::Result<()> {
    match state {
        RunState::Failed(err) => writeln!(out, "Error: {err}"),
        other => writeln!(out, "Program {other}. instructions={executed}"),
    }
}

fn print_help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        r#"Commands:
  asm                Enter program mode (end with a single '.' line).
  load <file>        Load a program from a file.
  input <tokens..>   Set the input tape.
  run                Run until HALT, error or end of program.
  step [N]           Execute N instructions (default 1).
  list               Show the program; '=>' marks the next instruction.
  mem                Dump memory cells.
  out                Print the output tape.
  cost               Print time and space costs of the current run.
  trace              Toggle per-instruction trace output.
  reset              Discard the current run.
  exit, quit         Exit the REPL.
  help               Show this help.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn session_with(program: &str) -> (Session, Vec<u8>) {
        let mut session = Session::new(MachineConfig::default());
        let mut out = Vec::new();
        let mut input = Cursor::new(format!("{program}\n.\n"));
        session.execute("asm", &mut input, &mut out).expect("asm");
        (session, out)
    }

    #[test]
    fn asm_then_run() {
        let (mut session, mut out) = session_with("READ 1\nLOAD 1\nADD =1\nWRITE 0\nHALT");
        let mut none = Cursor::new("");
        session.execute("input 41", &mut none, &mut out).expect("input");
        session.execute("run", &mut none, &mut out).expect("run");
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Loaded 5 line(s), 0 label(s)."));
        assert!(text.contains("Output: 42"));
        assert_eq!(
            session.machine().map(|m| m.state().clone()),
            Some(RunState::Halted)
        );
    }

    #[test]
    fn step_reports_next_line() {
        let (mut session, mut out) = session_with("LOAD =1\n\nWRITE 0");
        let mut none = Cursor::new("");
        session.execute("step", &mut none, &mut out).expect("step");
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("next=line 3: WRITE 0"), "{text}");
    }

    #[test]
    fn run_without_program() {
        let mut session = Session::new(MachineConfig::default());
        let mut out = Vec::new();
        let keep = session
            .execute("run", &mut Cursor::new(""), &mut out)
            .expect("run");
        assert!(keep);
        assert!(String::from_utf8_lossy(&out).contains("No program loaded."));
        assert!(!session
            .execute("quit", &mut Cursor::new(""), &mut out)
            .expect("quit"));
    }

    #[test]
    fn errors_are_reported_with_line() {
        let (mut session, mut out) = session_with("LOAD =7\nDIV =0");
        session
            .execute("run", &mut Cursor::new(""), &mut out)
            .expect("run");
        assert!(String::from_utf8_lossy(&out).contains("Error: line 2: division by zero"));
    }
}
