use std::collections::HashMap;

use crate::command::{Command, Opcode};
use crate::error::LoadError;

/// Label name -> zero-based index of the declaring command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: HashMap<String, usize>,
}

impl LabelTable {
    pub fn get(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub(crate) fn insert(&mut self, label: &str, index: usize) {
        self.labels.insert(label.to_string(), index);
    }
}

/// A loaded program: commands in source order plus their label table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    commands: Vec<Command>,
    labels: LabelTable,
}

impl Program {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }
}

/// Load a program from source text.
pub fn load_str(src: &str) -> Result<Program, LoadError> {
    load(src.lines())
}

/// Load a program from source lines.
/// - Two passes: parse every line (keeping blank lines so line numbers match
///   the source), then build the label table and classify arguments.
/// - Comments start with ';' or '#'.
/// - Unparseable keywords become `Opcode::Unknown`; they only matter if executed.
pub fn load<I, S>(lines: I) -> Result<Program, LoadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut commands: Vec<Command> = lines
        .into_iter()
        .enumerate()
        .map(|(lineno, raw)| parse_line(raw.as_ref(), lineno + 1))
        .collect();

    let labels = build_labels(&commands)?;
    for command in commands.iter_mut() {
        command.classify_with(&labels);
    }

    log::debug!(
        "loaded {} line(s), {} label(s)",
        commands.len(),
        labels.len()
    );
    Ok(Program { commands, labels })
}

/// Single forward scan mapping each declared label to its command index.
/// A label declared twice is rejected.
pub fn build_labels(commands: &[Command]) -> Result<LabelTable, LoadError> {
    let mut table = LabelTable::default();
    for (index, command) in commands.iter().enumerate() {
        let Some(label) = command.label() else {
            continue;
        };
        if let Some(first) = table.get(label) {
            return Err(LoadError::DuplicateLabel {
                line: command.line(),
                label: label.to_string(),
                first_line: commands[first].line(),
            });
        }
        table.insert(label, index);
    }
    Ok(table)
}

/// Parse one source line: `[label:] OPCODE [argument]`.
pub fn parse_line(raw: &str, line: usize) -> Command {
    let code = strip_comment(raw);
    let mut tokens = code.split_whitespace().peekable();

    let label = match tokens.peek() {
        Some(first) if first.len() > 1 && first.ends_with(':') => {
            let label = first[..first.len() - 1].to_string();
            tokens.next();
            Some(label)
        }
        _ => None,
    };

    let Some(keyword) = tokens.next() else {
        return Command::null(line, label);
    };
    let rest: Vec<&str> = tokens.collect();

    match (Opcode::from_keyword(keyword), rest.len()) {
        (Some(opcode), 0) => Command::new(line, label, opcode, keyword, ""),
        (Some(opcode), 1) => Command::new(line, label, opcode, keyword, rest[0]),
        // Extra operands are malformed; keep the line and fail only if reached.
        _ => Command::new(line, label, Opcode::Unknown, keyword, rest.join(" ")),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(&[';', '#'][..]) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AddressingMode;

    #[test]
    fn load_basic_program() {
        let src = "\
            read 1
            loop: LOAD 1
            JZERO end
            WRITE =1
            JUMP loop
            end: HALT";
        let program = load_str(src).expect("load failed");
        assert_eq!(program.len(), 6);
        assert_eq!(program.labels().get("loop"), Some(1));
        assert_eq!(program.labels().get("end"), Some(5));

        let jz = &program.commands()[2];
        assert_eq!(jz.opcode(), Opcode::Jzero);
        assert_eq!(jz.mode(), Some(AddressingMode::Label));
        assert_eq!(jz.line(), 3);

        let read = &program.commands()[0];
        assert_eq!(read.opcode(), Opcode::Read);
        assert_eq!(read.mode(), Some(AddressingMode::DirectAddress));
    }

    #[test]
    fn blank_and_comment_lines_keep_their_slot() {
        let src = "LOAD =1\n\n# comment only\nWRITE 0 ; trailing\nHALT";
        let program = load_str(src).expect("load failed");
        let ops: Vec<Opcode> = program.commands().iter().map(|c| c.opcode()).collect();
        assert_eq!(
            ops,
            vec![Opcode::Load, Opcode::Null, Opcode::Null, Opcode::Write, Opcode::Halt]
        );
        assert_eq!(program.commands()[3].line(), 4);
        assert_eq!(program.commands()[3].raw_argument(), "0");
    }

    #[test]
    fn label_on_its_own_line() {
        let program = load_str("start:\nHALT").expect("load failed");
        assert_eq!(program.commands()[0].opcode(), Opcode::Null);
        assert_eq!(program.labels().get("start"), Some(0));
    }

    #[test]
    fn unknown_keywords_are_deferred() {
        let program = load_str("LOD =1\nLOAD =1 =2").expect("load failed");
        assert_eq!(program.commands()[0].opcode(), Opcode::Unknown);
        assert_eq!(program.commands()[0].keyword(), "LOD");
        assert_eq!(program.commands()[1].opcode(), Opcode::Unknown);
    }

    #[test]
    fn duplicate_label_rejected() {
        let err = load_str("a: LOAD =1\nb: HALT\na: HALT").unwrap_err();
        assert_eq!(
            err,
            LoadError::DuplicateLabel {
                line: 3,
                label: "a".into(),
                first_line: 1
            }
        );
    }
}
