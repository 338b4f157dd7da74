//! Command completion matching
//!
//! A command is complete once the in-progress line equals the sentinel echo.
//! Its expected output is then checked in a window anchored to the end of the
//! line list: the sentinel echo is the last line and the echoed sentinel
//! command sits just above it, so the last expected entry must appear in the
//! line before that, the entry before it one line higher, and so on.

/// Lines between the end of the expected window and the sentinel echo
/// (the echoed sentinel command and the echo itself)
const SENTINEL_LINES: usize = 2;

/// Output a command is expected to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutput {
    /// Only wait for completion
    Any,
    /// Ordered substrings, one per line, ending just above the sentinel
    Lines(Vec<String>),
}

impl ExpectedOutput {
    /// Build an expectation from substrings
    pub fn lines<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExpectedOutput::Lines(entries.into_iter().map(Into::into).collect())
    }

    /// Number of lines the expectation spans
    pub fn len(&self) -> usize {
        match self {
            ExpectedOutput::Any => 0,
            ExpectedOutput::Lines(entries) => entries.len(),
        }
    }

    /// Whether no output is checked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Verdict on the current line list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Sentinel not seen yet
    Pending,
    /// Sentinel seen and every expected entry found
    Matched,
    /// Sentinel seen but an expected entry is missing
    Mismatched {
        /// Index of the first failing entry, checked from the last one up
        index: usize,
        /// The failing entry
        expected: String,
    },
}

impl MatchOutcome {
    /// Whether the command has settled either way
    pub fn is_settled(&self) -> bool {
        !matches!(self, MatchOutcome::Pending)
    }
}

/// Decides completion and success from accumulated output
#[derive(Debug, Clone)]
pub struct CompletionMatcher {
    sentinel_echo: String,
}

impl CompletionMatcher {
    /// Create a matcher for the given sentinel echo text
    pub fn new(sentinel_echo: impl Into<String>) -> Self {
        Self {
            sentinel_echo: sentinel_echo.into(),
        }
    }

    /// The text whose appearance completes a command
    pub fn sentinel_echo(&self) -> &str {
        &self.sentinel_echo
    }

    /// Whether the in-progress line is the sentinel echo
    pub fn is_complete(&self, lines: &[String]) -> bool {
        lines.last().is_some_and(|line| *line == self.sentinel_echo)
    }

    /// Evaluate the line list against an expectation
    pub fn evaluate(&self, lines: &[String], expected: &ExpectedOutput) -> MatchOutcome {
        if !self.is_complete(lines) {
            return MatchOutcome::Pending;
        }

        let entries = match expected {
            ExpectedOutput::Any => return MatchOutcome::Matched,
            ExpectedOutput::Lines(entries) => entries,
        };

        let last = lines.len() - 1;
        for (index, entry) in entries.iter().enumerate().rev() {
            let from_end = entries.len() - 1 - index;
            let found = last
                .checked_sub(from_end + SENTINEL_LINES)
                .and_then(|line| lines.get(line))
                .is_some_and(|line| line.contains(entry.as_str()));

            if !found {
                return MatchOutcome::Mismatched {
                    index,
                    expected: entry.clone(),
                };
            }
        }

        MatchOutcome::Matched
    }
}
