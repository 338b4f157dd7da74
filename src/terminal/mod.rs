//! Console text processing
//!
//! Everything that works on console text without touching the channel:
//! assembling bytes into lines, deciding whether a command finished, and
//! reducing a failed command's output to a diagnostic.

pub mod diagnostics;
pub mod lines;
pub mod matcher;

// Re-exports for convenience
pub use diagnostics::ErrorExtractor;
pub use lines::{LineAssembler, LineEvent};
pub use matcher::{CompletionMatcher, ExpectedOutput, MatchOutcome};
