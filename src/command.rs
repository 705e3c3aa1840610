use std::fmt;

use serde::Serialize;

use crate::loader::LabelTable;

/// Instruction set of the RAM machine.
/// `Null` marks blank or comment-only lines; `Unknown` marks a line whose
/// keyword did not parse. Both stay in the program so line numbers match
/// the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Opcode {
    Halt,
    Jump,
    Jgtz,
    Jzero,
    Read,
    Write,
    Store,
    Load,
    Add,
    Sub,
    Mult,
    Div,
    Unknown,
    Null,
}

impl Opcode {
    /// Parse an opcode keyword, case-insensitively.
    pub fn from_keyword(keyword: &str) -> Option<Opcode> {
        match keyword.to_uppercase().as_str() {
            "HALT" => Some(Opcode::Halt),
            "JUMP" => Some(Opcode::Jump),
            "JGTZ" => Some(Opcode::Jgtz),
            "JZERO" => Some(Opcode::Jzero),
            "READ" => Some(Opcode::Read),
            "WRITE" => Some(Opcode::Write),
            "STORE" => Some(Opcode::Store),
            "LOAD" => Some(Opcode::Load),
            "ADD" => Some(Opcode::Add),
            "SUB" => Some(Opcode::Sub),
            "MULT" => Some(Opcode::Mult),
            "DIV" => Some(Opcode::Div),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Opcode::Halt => "HALT",
            Opcode::Jump => "JUMP",
            Opcode::Jgtz => "JGTZ",
            Opcode::Jzero => "JZERO",
            Opcode::Read => "READ",
            Opcode::Write => "WRITE",
            Opcode::Store => "STORE",
            Opcode::Load => "LOAD",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mult => "MULT",
            Opcode::Div => "DIV",
            Opcode::Unknown => "?",
            Opcode::Null => "",
        }
    }

    /// True for lines that carry no executable instruction.
    pub fn is_placeholder(self) -> bool {
        matches!(self, Opcode::Null | Opcode::Unknown)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// How an instruction argument is interpreted, decided by its lexical shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressingMode {
    /// `=value`
    Const,
    /// `n` or `name`: a memory cell.
    DirectAddress,
    /// `*n`: the value of cell `n` is the address.
    IndirectAddress,
    /// A token naming a declared label.
    Label,
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressingMode::Const => "constant",
            AddressingMode::DirectAddress => "direct address",
            AddressingMode::IndirectAddress => "indirect address",
            AddressingMode::Label => "label",
        };
        f.write_str(name)
    }
}

/// Classify a raw argument token. Returns `None` for an empty token.
pub fn classify(raw: &str, labels: &LabelTable) -> Option<AddressingMode> {
    if raw.is_empty() {
        None
    } else if raw.starts_with('=') {
        Some(AddressingMode::Const)
    } else if raw.starts_with('*') {
        Some(AddressingMode::IndirectAddress)
    } else if labels.contains(raw) {
        Some(AddressingMode::Label)
    } else {
        Some(AddressingMode::DirectAddress)
    }
}

/// One parsed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    line: usize,
    label: Option<String>,
    opcode: Opcode,
    keyword: String,
    raw_argument: String,
    mode: Option<AddressingMode>,
}

impl Command {
    pub fn new(
        line: usize,
        label: Option<String>,
        opcode: Opcode,
        keyword: impl Into<String>,
        raw_argument: impl Into<String>,
    ) -> Self {
        let raw_argument = raw_argument.into();
        let mode = classify(&raw_argument, &LabelTable::default());
        Command {
            line,
            label,
            opcode,
            keyword: keyword.into(),
            raw_argument,
            mode,
        }
    }

    /// Placeholder for a blank or comment-only line.
    pub fn null(line: usize, label: Option<String>) -> Self {
        Command::new(line, label, Opcode::Null, "", "")
    }

    /// Re-derive the addressing mode once the program's labels are known.
    pub fn classify_with(&mut self, labels: &LabelTable) {
        self.mode = classify(&self.raw_argument, labels);
    }

    /// 1-based source line.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Keyword as written in the source (kept for `Unknown` diagnostics).
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn raw_argument(&self) -> &str {
        &self.raw_argument
    }

    pub fn mode(&self) -> Option<AddressingMode> {
        self.mode
    }

    /// The argument with its `=`/`*` sigil removed.
    pub fn formatted_argument(&self) -> &str {
        match self.mode {
            Some(AddressingMode::Const) | Some(AddressingMode::IndirectAddress) => {
                &self.raw_argument[1..]
            }
            _ => &self.raw_argument,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        if let Some(label) = &self.label {
            parts.push(format!("{label}:"));
        }
        match self.opcode {
            Opcode::Null => {}
            Opcode::Unknown => parts.push(self.keyword.clone()),
            op => parts.push(op.keyword().to_string()),
        }
        if !self.raw_argument.is_empty() {
            parts.push(self.raw_argument.clone());
        }
        f.write_str(&parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> LabelTable {
        let mut t = LabelTable::default();
        for (i, n) in names.iter().enumerate() {
            t.insert(n, i);
        }
        t
    }

    #[test]
    fn classify_by_shape() {
        let t = labels(&["loop"]);
        assert_eq!(classify("=5", &t), Some(AddressingMode::Const));
        assert_eq!(classify("*3", &t), Some(AddressingMode::IndirectAddress));
        assert_eq!(classify("loop", &t), Some(AddressingMode::Label));
        assert_eq!(classify("12", &t), Some(AddressingMode::DirectAddress));
        assert_eq!(classify("x", &t), Some(AddressingMode::DirectAddress));
        assert_eq!(classify("", &t), None);
    }

    #[test]
    fn formatted_argument_strips_sigil() {
        let c = Command::new(1, None, Opcode::Load, "LOAD", "=42");
        assert_eq!(c.formatted_argument(), "42");
        let c = Command::new(2, None, Opcode::Load, "LOAD", "*7");
        assert_eq!(c.formatted_argument(), "7");
        let c = Command::new(3, None, Opcode::Store, "STORE", "7");
        assert_eq!(c.formatted_argument(), "7");
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(Opcode::from_keyword("jzero"), Some(Opcode::Jzero));
        assert_eq!(Opcode::from_keyword("Mult"), Some(Opcode::Mult));
        assert_eq!(Opcode::from_keyword("MUL"), None);
    }

    #[test]
    fn renders_back_to_source() {
        let c = Command::new(4, Some("end".into()), Opcode::Halt, "halt", "");
        assert_eq!(c.to_string(), "end: HALT");
        let c = Command::new(5, None, Opcode::Unknown, "FOO", "1");
        assert_eq!(c.to_string(), "FOO 1");
    }
}
