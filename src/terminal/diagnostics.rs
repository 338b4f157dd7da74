//! Failure diagnostics
//!
//! Reduces the line buffer of a failed command to the lines the command
//! itself produced. This is a text heuristic: it finds the echo of the tail
//! of the submitted text and keeps what follows, minus prompts and sentinel
//! lines. When the anchors are not found the whole buffer is filtered.

use crate::config::SessionConfig;

/// Extracts a best-effort diagnostic transcript from a line buffer
#[derive(Debug, Clone)]
pub struct ErrorExtractor {
    sentinel_command: String,
    sentinel_echo: String,
    work_prompt: String,
    anchor_len: usize,
}

impl ErrorExtractor {
    /// Create an extractor from the session settings
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sentinel_command: config.sentinel_command.clone(),
            sentinel_echo: config.sentinel_echo.clone(),
            work_prompt: config.work_prompt.clone(),
            anchor_len: config.diagnostic_anchor_len,
        }
    }

    /// Text searched for in the buffer to find where the command's echo ends
    ///
    /// The trailing characters of the submitted text with newlines and the
    /// first sentinel command removed.
    pub fn anchor(&self, submitted: &str) -> String {
        let start = submitted
            .char_indices()
            .rev()
            .nth(self.anchor_len.saturating_sub(1))
            .map(|(index, _)| index)
            .unwrap_or(0);

        let tail: String = submitted[start..].chars().filter(|c| *c != '\n').collect();
        tail.replacen(&self.sentinel_command, "", 1)
    }

    /// Reduce a failed command's lines to a diagnostic
    pub fn extract(&self, submitted: &str, lines: &[String]) -> String {
        let anchor = self.anchor(submitted);

        let mut remaining = lines;
        if let Some(pos) = remaining
            .iter()
            .position(|line| *line == self.sentinel_command)
        {
            remaining = &remaining[pos + 1..];
        }

        if let Some(pos) = remaining
            .iter()
            .position(|line| line.contains(anchor.as_str()))
        {
            remaining = &remaining[pos + 1..];
        }

        remaining
            .iter()
            .filter(|line| {
                !line.contains(self.work_prompt.as_str()) && !line.contains(self.sentinel_echo.as_str())
            })
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
