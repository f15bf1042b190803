//! Whitespace normalizer for C-family / Kotlin-like source.
//!
//! Rules, applied in one pass over the text:
//!
//! - leading indentation of a line is kept as-is
//! - blank-only lines become empty
//! - trailing spaces and tabs are removed from every line
//! - runs of interior spaces/tabs collapse to a single space
//! - a bare assignment `=` gets exactly one space on each side; `=` that is
//!   part of `==`, `===`, `!=`, `<=`, `>=`, `=>` or a compound assignment
//!   (`+=`, `-=` ...) is left alone
//! - string, raw string and char literals and comments are copied verbatim
//!
//! The output is a fixed point: formatting it again yields the same text.

use crate::{FormatError, Formatter};

/// Characters that turn a following `=` into part of an operator.
const OPERATOR_PREFIXES: &str = "=!<>+-*/%&|^";

#[derive(Debug, Clone, Copy, Default)]
pub struct SpacingFormatter;

impl SpacingFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for SpacingFormatter {
    fn format(&self, source: &str) -> Result<String, FormatError> {
        Scanner::new(source).run()
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    out: String,
    /// Whitespace seen before the first token of the current line.
    indent: String,
    at_line_start: bool,
    /// A blank run (or a forced space after `=`) awaits the next token.
    pending_space: bool,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            out: String::with_capacity(source.len()),
            indent: String::new(),
            at_line_start: true,
            pending_space: false,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<String, FormatError> {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.end_line();
                    self.out.push('\n');
                    self.pos += 1;
                    self.line += 1;
                }
                '\r' if self.peek(1) == Some('\n') => {
                    self.end_line();
                    self.out.push_str("\r\n");
                    self.pos += 2;
                    self.line += 1;
                }
                c if is_blank(c) => {
                    if self.at_line_start {
                        self.indent.push(c);
                    } else {
                        self.pending_space = true;
                    }
                    self.pos += 1;
                }
                '=' => self.assignment(),
                '"' => {
                    self.begin_token();
                    if self.peek(1) == Some('"') && self.peek(2) == Some('"') {
                        self.raw_string()?;
                    } else {
                        self.quoted('"')?;
                    }
                }
                '\'' => {
                    self.begin_token();
                    self.quoted('\'')?;
                }
                '/' if self.peek(1) == Some('/') => {
                    self.begin_token();
                    self.line_comment();
                }
                '/' if self.peek(1) == Some('*') => {
                    self.begin_token();
                    self.block_comment()?;
                }
                c => {
                    self.begin_token();
                    self.out.push(c);
                    self.pos += 1;
                }
            }
        }
        self.end_line();
        Ok(self.out)
    }

    /// Flush indentation or a collapsed blank before a token.
    fn begin_token(&mut self) {
        if self.at_line_start {
            self.out.push_str(&self.indent);
            self.indent.clear();
            self.at_line_start = false;
        } else if self.pending_space {
            self.out.push(' ');
        }
        self.pending_space = false;
    }

    fn end_line(&mut self) {
        self.indent.clear();
        self.at_line_start = true;
        self.pending_space = false;
    }

    fn assignment(&mut self) {
        let run = self.chars[self.pos..]
            .iter()
            .take_while(|&&c| c == '=')
            .count();
        let prev = self.pos.checked_sub(1).map(|i| self.chars[i]);
        let after = self.peek(run);
        let is_operator = run > 1
            || prev.is_some_and(|p| OPERATOR_PREFIXES.contains(p))
            || after == Some('>');

        if is_operator {
            self.begin_token();
            self.out.extend(std::iter::repeat('=').take(run));
            self.pos += run;
            return;
        }

        if self.at_line_start {
            self.begin_token();
            self.out.push('=');
        } else {
            self.pending_space = false;
            self.out.push_str(" =");
        }
        self.pending_space = true;
        self.pos += 1;
    }

    fn quoted(&mut self, quote: char) -> Result<(), FormatError> {
        let start = self.line;
        self.out.push(quote);
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some('\n') => return Err(FormatError::UnterminatedLiteral { line: start }),
                Some('\\') => {
                    self.out.push('\\');
                    self.pos += 1;
                    match self.peek(0) {
                        None | Some('\n') => {
                            return Err(FormatError::UnterminatedLiteral { line: start })
                        }
                        Some(escaped) => {
                            self.out.push(escaped);
                            self.pos += 1;
                        }
                    }
                }
                Some(c) => {
                    self.out.push(c);
                    self.pos += 1;
                    if c == quote {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn raw_string(&mut self) -> Result<(), FormatError> {
        let start = self.line;
        self.out.push_str("\"\"\"");
        self.pos += 3;
        loop {
            match self.peek(0) {
                None => return Err(FormatError::UnterminatedLiteral { line: start }),
                Some('"') if self.peek(1) == Some('"') && self.peek(2) == Some('"') => {
                    self.out.push_str("\"\"\"");
                    self.pos += 3;
                    // Quotes directly after the closing delimiter belong to it.
                    while self.peek(0) == Some('"') {
                        self.out.push('"');
                        self.pos += 1;
                    }
                    return Ok(());
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    self.out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' || (c == '\r' && self.peek(1) == Some('\n')) {
                break;
            }
            self.out.push(c);
            self.pos += 1;
        }
        let kept = self.out.trim_end_matches(is_blank).len();
        self.out.truncate(kept);
    }

    fn block_comment(&mut self) -> Result<(), FormatError> {
        let start = self.line;
        self.out.push_str("/*");
        self.pos += 2;
        loop {
            match self.peek(0) {
                None => return Err(FormatError::UnterminatedComment { line: start }),
                Some('*') if self.peek(1) == Some('/') => {
                    self.out.push_str("*/");
                    self.pos += 2;
                    return Ok(());
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    self.out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}
