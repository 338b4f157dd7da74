//! Console line assembly
//!
//! Turns the raw console byte stream into an ordered list of lines. The last
//! line is always the one still being written; downstream matchers look at it
//! after every byte, so escape sequences are stripped as soon as they are
//! complete rather than when the line closes.

use once_cell::sync::Lazy;
use regex::Regex;

/// `ESC [ <digits/semicolons> <letter>` colour and cursor sequences, plus
/// private modes like `ESC [ ? 2004 h`
static CSI_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[\??[0-9;]*[A-Za-z]").expect("CSI pattern is valid"));

/// What a single pushed byte did to the line list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// A character was appended to the current line
    Extended,
    /// The current line was closed and a new empty one opened
    Closed,
}

/// Append-only line buffer fed one byte at a time
#[derive(Debug, Clone)]
pub struct LineAssembler {
    /// Completed lines followed by the in-progress line
    lines: Vec<String>,
}

impl LineAssembler {
    /// Create an assembler holding a single empty line
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
        }
    }

    /// Feed one console byte
    ///
    /// Each byte is decoded as the code point of the same value. Carriage
    /// returns are dropped and yield `None`.
    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        match byte {
            b'\r' => None,
            b'\n' => {
                if let Some(closed) = self.lines.last() {
                    trace!(target: "sketchcc::serial", "{}", closed);
                }
                self.lines.push(String::new());
                Some(LineEvent::Closed)
            }
            _ => {
                let current = self.current_mut();
                current.push(byte as char);
                if current.contains('\x1b') && CSI_SEQUENCE.is_match(current) {
                    *current = CSI_SEQUENCE.replace_all(current, "").into_owned();
                }
                Some(LineEvent::Extended)
            }
        }
    }

    /// Feed a whole chunk
    pub fn push_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// All lines, the in-progress one last
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The line still being written
    pub fn current_line(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    /// Number of lines closed by a newline
    pub fn completed_count(&self) -> usize {
        self.lines.len() - 1
    }

    /// Reset to a single empty line
    pub fn clear(&mut self) {
        self.lines.clear();
        self.lines.push(String::new());
    }

    /// Copy of the current line list
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.clone()
    }

    fn current_mut(&mut self) -> &mut String {
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}
