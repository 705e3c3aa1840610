use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::io::{BufRead, Write};

/// Supplies the next token on each READ. `None` means the tape is exhausted.
/// Implementations are called synchronously between instructions and should
/// not block indefinitely.
pub trait InputSource {
    fn next_token(&mut self) -> Option<String>;
}

/// Receives one token per WRITE, in emission order.
pub trait OutputSink {
    fn emit(&mut self, value: &str);
}

impl Debug for dyn InputSource + Send {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("InputSource")
    }
}

impl Debug for dyn OutputSink + Send {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("OutputSink")
    }
}

/// Pre-filled, one-shot input tape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTape {
    tokens: VecDeque<String>,
}

impl InputTape {
    /// Split a whitespace-delimited string into one token per element.
    pub fn from_tokens(text: &str) -> Self {
        InputTape {
            tokens: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// One token per non-blank line, as in input tape files.
    pub fn from_lines(text: &str) -> Self {
        InputTape {
            tokens: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for InputTape {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        InputTape {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl InputSource for InputTape {
    fn next_token(&mut self) -> Option<String> {
        self.tokens.pop_front()
    }
}

/// Asks the user for each token. End of stream exhausts the tape.
pub struct PromptInput<R, W> {
    reader: R,
    prompt: W,
}

impl<R: BufRead, W: Write> PromptInput<R, W> {
    pub fn new(reader: R, prompt: W) -> Self {
        PromptInput { reader, prompt }
    }
}

impl<R: BufRead, W: Write> InputSource for PromptInput<R, W> {
    fn next_token(&mut self) -> Option<String> {
        loop {
            let _ = write!(self.prompt, "input> ");
            let _ = self.prompt.flush();
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
            let token = line.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
}

/// Append-only output tape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTape {
    tokens: Vec<String>,
}

impl OutputTape {
    pub fn new() -> Self {
        OutputTape::default()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Tokens joined with single spaces.
    pub fn to_text(&self) -> String {
        self.tokens.join(" ").trim().to_string()
    }
}

impl OutputSink for OutputTape {
    fn emit(&mut self, value: &str) {
        self.tokens.push(value.to_string());
    }
}

/// Writes each token on its own line as soon as it is emitted.
pub struct StreamSink<W> {
    out: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(out: W) -> Self {
        StreamSink { out }
    }
}

impl<W: Write> OutputSink for StreamSink<W> {
    fn emit(&mut self, value: &str) {
        if let Err(err) = writeln!(self.out, "{value}") {
            log::warn!("output sink write failed: {err}");
        }
    }
}
