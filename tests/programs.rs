//! End-to-end runs of complete RAM programs through the public API.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ram_machine::{
    load_str, run_source, CancelToken, Error, InputTape, LoadError, Machine, MachineConfig,
    Observer, RunState, RunStatus, RuntimeError, Step,
};

const FACTORIAL: &str = include_str!("../programs/factorial.ram");
const SUM: &str = include_str!("../programs/sum.ram");
const REVERSE: &str = include_str!("../programs/reverse.ram");

#[test]
fn factorial() {
    let report = run_source(FACTORIAL, "5").expect("load");
    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(report.output_text(), "120");

    let report = run_source(FACTORIAL, "0").expect("load");
    assert_eq!(report.output_text(), "1");
}

#[test]
fn factorial_beyond_machine_words() {
    let report = run_source(FACTORIAL, "30").expect("load");
    assert_eq!(report.output_text(), "265252859812191058636308480000000");
}

#[test]
fn sum_until_zero() {
    let report = run_source(SUM, "4 -10 100 0 99").expect("load");
    assert_eq!(report.output_text(), "94");
}

#[test]
fn sum_without_terminator_runs_out_of_input() {
    let report = run_source(SUM, "1 2").expect("load");
    assert_eq!(report.status, RunStatus::Failed);
    let err = report.error.expect("error report");
    assert_eq!(err.kind, "InputTapeEmpty");
    assert_eq!(err.line, 4);
}

#[test]
fn reverse_uses_indirect_addressing() {
    let report = run_source(REVERSE, "3 7 8 9").expect("load");
    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(report.output, vec!["9", "8", "7"]);
    let cell = |addr: &str| {
        report
            .memory
            .iter()
            .find(|(a, _)| a == addr)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(cell("10"), Some("7"));
    assert_eq!(cell("12"), Some("9"));
}

#[test]
fn memory_snapshot_after_failure_keeps_committed_steps() {
    let report = run_source("LOAD =5\nSTORE 3\nLOAD =1\nDIV =0\nSTORE 4", "").expect("load");
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(
        report.memory,
        vec![
            ("0".to_string(), "1".to_string()),
            ("3".to_string(), "5".to_string())
        ]
    );
}

#[test]
fn duplicate_labels_fail_to_load() {
    match run_source("x: HALT\nx: HALT", "") {
        Err(Error::Load(LoadError::DuplicateLabel { label, line, .. })) => {
            assert_eq!(label, "x");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn cancel_from_another_thread() {
    let program = load_str("loop: LOAD =1\nJUMP loop").expect("load");
    let token = CancelToken::new();
    let worker_token = token.clone();
    let worker = thread::spawn(move || {
        let mut machine = Machine::new(program);
        machine.set_cancel_token(worker_token);
        let report = machine.run();
        (report.status, machine.executed())
    });
    thread::sleep(Duration::from_millis(20));
    token.cancel();
    let (status, executed) = worker.join().expect("worker panicked");
    assert_eq!(status, RunStatus::Cancelled);
    assert!(executed > 0);
}

#[derive(Default)]
struct Recorder {
    lines: Vec<usize>,
    finished: Option<String>,
}

struct Shared(Arc<Mutex<Recorder>>);

impl Observer for Shared {
    fn on_step(&mut self, step: &Step<'_>) {
        self.0.lock().expect("recorder lock").lines.push(step.command.line());
    }

    fn on_finish(&mut self, state: &RunState) {
        self.0.lock().expect("recorder lock").finished = Some(state.to_string());
    }
}

#[test]
fn observers_see_executed_lines_only() {
    let src = "LOAD =0\n\nJZERO end\nWRITE =1\nend: HALT";
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut machine = Machine::new(load_str(src).expect("load"));
    machine.attach_observer(Box::new(Shared(Arc::clone(&recorder))));
    machine.run();
    let rec = recorder.lock().expect("recorder lock");
    assert_eq!(rec.lines, vec![1, 3, 5]);
    assert_eq!(rec.finished.as_deref(), Some("halted"));
}

#[test]
fn failure_is_reported_to_observers() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut machine = Machine::new(load_str("LOAD =1\nADD 9").expect("load"));
    machine.attach_observer(Box::new(Shared(Arc::clone(&recorder))));
    machine.run();
    assert_eq!(
        machine.state(),
        &RunState::Failed(RuntimeError::UninitializedCell {
            line: 2,
            address: "9".into()
        })
    );
    let rec = recorder.lock().expect("recorder lock");
    assert_eq!(rec.lines, vec![1]);
    assert_eq!(
        rec.finished.as_deref(),
        Some("failed (line 2: memory cell 9 is not initialized)")
    );
}

#[test]
fn complexity_is_optional_and_reported() {
    let mut machine = Machine::new(load_str(FACTORIAL).expect("load"));
    machine.attach_input(Box::new(InputTape::from_tokens("3")));
    assert!(machine.run().complexity.is_none());

    let program = load_str(FACTORIAL).expect("load");
    let mut machine = Machine::with_config(program, MachineConfig::default());
    machine.attach_input(Box::new(InputTape::from_tokens("3")));
    machine.enable_complexity();
    let report = machine.run();
    let costs = report.complexity.expect("complexity");
    assert_eq!(costs.instructions, machine.executed());
    assert_eq!(costs.uniform_time, costs.instructions);
    assert_eq!(costs.uniform_space, 3);
    assert_eq!(costs.input_tokens, 1);
    assert!(costs.logarithmic_time >= costs.uniform_time);
}

#[test]
fn report_serializes_to_json() {
    let report = run_source("LOAD =7\nDIV =0", "").expect("load");
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"]["kind"], "DivisionByZero");
    assert_eq!(json["error"]["line"], 2);
    assert_eq!(json["output"], serde_json::json!([]));
}

#[test]
fn configured_machine_runs_on_a_worker_thread() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut machine = Machine::new(load_str(FACTORIAL).expect("load"));
    machine.attach_input(Box::new(InputTape::from_tokens("4")));
    machine.attach_observer(Box::new(Shared(Arc::clone(&recorder))));
    machine.enable_complexity();
    let report = thread::spawn(move || machine.run())
        .join()
        .expect("worker panicked");
    assert_eq!(report.output_text(), "24");
    let rec = recorder.lock().expect("recorder lock");
    assert_eq!(rec.finished.as_deref(), Some("halted"));
}

#[test]
fn leading_zero_addresses_share_a_cell() {
    let report = run_source("LOAD =9\nSTORE 007\nLOAD =7\nSTORE 1\nLOAD *1\nWRITE 0", "")
        .expect("load");
    assert_eq!(report.status, RunStatus::Halted);
    assert_eq!(report.output_text(), "9");
}
