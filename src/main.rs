use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use ram_machine::repl;
use ram_machine::{
    load_str, InputTape, Machine, MachineConfig, PromptInput, RunReport, RunStatus,
    StreamSink, TraceObserver, UnknownOpcodePolicy,
};

#[derive(Parser, Debug)]
#[command(name = "ram_machine")]
#[command(about = "Interpreter for RAM (Random Access Machine) programs", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program file
    Run(RunArgs),
    /// Start the interactive REPL
    Repl(EngineArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Program source file
    file: PathBuf,

    /// Input tape as whitespace-delimited tokens
    #[arg(long, conflicts_with_all = ["input_file", "interactive"])]
    input: Option<String>,

    /// Input tape file, one token per non-blank line
    #[arg(long, conflicts_with = "interactive")]
    input_file: Option<PathBuf>,

    /// Prompt for each READ on stdin
    #[arg(long, action = ArgAction::SetTrue)]
    interactive: bool,

    /// Print a trace line per executed instruction to stderr
    #[arg(long, action = ArgAction::SetTrue)]
    trace: bool,

    /// Report time and space costs
    #[arg(long, action = ArgAction::SetTrue)]
    complexity: bool,

    /// Print the run report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(clap::Args, Debug)]
struct EngineArgs {
    /// What to do when an unparseable line is reached
    #[arg(long, value_enum, default_value_t = UnknownOpcodes::Fail)]
    unknown_opcodes: UnknownOpcodes,

    /// Stop after this many executed instructions
    #[arg(long)]
    step_limit: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum UnknownOpcodes {
    Fail,
    Skip,
}

impl EngineArgs {
    fn config(&self) -> MachineConfig {
        MachineConfig {
            unknown_opcodes: match self.unknown_opcodes {
                UnknownOpcodes::Fail => UnknownOpcodePolicy::Fail,
                UnknownOpcodes::Skip => UnknownOpcodePolicy::Skip,
            },
            step_limit: self.step_limit,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("failed to initialize logger")?;

    match cli.command {
        Command::Repl(engine) => {
            repl::run_repl(engine.config());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let src = fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let program = load_str(&src).with_context(|| format!("cannot load {}", args.file.display()))?;
    log::info!("loaded {} ({} lines)", args.file.display(), program.len());

    let mut machine = Machine::with_config(program, args.engine.config());
    if args.interactive {
        let stdin = io::BufReader::new(io::stdin());
        machine.attach_input(Box::new(PromptInput::new(stdin, io::stderr())));
        // Interleave written values with the prompts.
        machine.attach_sink(Box::new(StreamSink::new(io::stdout())));
    } else if let Some(path) = &args.input_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        machine.attach_input(Box::new(InputTape::from_lines(&text)));
    } else if let Some(tokens) = &args.input {
        machine.attach_input(Box::new(InputTape::from_tokens(tokens)));
    }
    if args.trace {
        machine.attach_observer(Box::new(TraceObserver::new(io::stderr())));
    }
    if args.complexity {
        machine.enable_complexity();
    }

    let report = machine.run();
    log::info!("finished with status {:?}", report.status);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&mut io::stdout().lock(), &report, !args.interactive)?;
    }

    Ok(match report.status {
        RunStatus::Halted => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn print_report<W: Write>(out: &mut W, report: &RunReport, with_output: bool) -> io::Result<()> {
    if with_output {
        writeln!(out, "{}", report.output_text())?;
    }
    writeln!(out, "--- MEMORY ---")?;
    for (addr, value) in &report.memory {
        writeln!(out, "{addr:>8}: {value}")?;
    }
    if let Some(err) = &report.error {
        writeln!(out, "error: {}", err.message)?;
    }
    if report.status == RunStatus::Cancelled {
        writeln!(out, "run cancelled")?;
    }
    if let Some(c) = &report.complexity {
        writeln!(out, "--- COSTS ---")?;
        writeln!(out, "instructions:    {}", c.instructions)?;
        writeln!(out, "time uniform:    {}", c.uniform_time)?;
        writeln!(out, "time log:        {}", c.logarithmic_time)?;
        writeln!(out, "space uniform:   {}", c.uniform_space)?;
        writeln!(out, "space log:       {}", c.logarithmic_space)?;
        writeln!(out, "input tokens:    {} (size {})", c.input_tokens, c.input_size)?;
        writeln!(out, "-------------")?;
    }
    Ok(())
}
