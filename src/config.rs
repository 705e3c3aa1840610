//! Engine configuration.

/// What to do when execution reaches a line whose keyword did not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOpcodePolicy {
    /// Raise `RuntimeError::UnknownInstruction` when the line is reached.
    /// Older RAM interpreters skip such lines silently; `Skip` keeps that
    /// behaviour, but a typo in an opcode should not pass unnoticed.
    #[default]
    Fail,
    /// Skip the line like a blank one, with no cost.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineConfig {
    pub unknown_opcodes: UnknownOpcodePolicy,
    /// Stop as `Cancelled` after this many executed instructions.
    pub step_limit: Option<u64>,
}

impl MachineConfig {
    /// Skip unknown lines and run without a step limit.
    pub fn permissive() -> Self {
        MachineConfig {
            unknown_opcodes: UnknownOpcodePolicy::Skip,
            step_limit: None,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict_and_unbounded() {
        let config = MachineConfig::default();
        assert_eq!(config.unknown_opcodes, UnknownOpcodePolicy::Fail);
        assert_eq!(config.step_limit, None);
        assert_eq!(
            MachineConfig::permissive().with_step_limit(10).step_limit,
            Some(10)
        );
    }
}
