//! Error types and Result aliases for sketchcc

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error as ThisError;

use crate::state::{CompilerAction, CompilerStatus};

/// Result type alias for sketchcc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sketchcc
#[derive(Debug, ThisError)]
pub enum Error {
    // === Command session errors ===
    /// A command was submitted while another one is still awaiting completion
    #[error("Cannot send a command while another command is awaiting completion")]
    CommandInFlight,

    /// The sentinel arrived but the output window did not match
    #[error("Command output did not match expected pattern '{expected}'")]
    PatternMismatch {
        expected: String,
        diagnostic: String,
    },

    /// No sentinel was seen before the deadline
    #[error("Command timed out after {timeout:?}")]
    CommandTimeout {
        timeout: Duration,
        diagnostic: String,
    },

    /// The console output stream ended while a command was pending
    #[error("Console output closed before the command completed")]
    ConsoleClosed { diagnostic: String },

    /// Failed to write to the console input
    #[error("Failed to write to console: {reason}")]
    ConsoleWriteFailed { reason: String },

    // === Facade errors ===
    /// A compilation (or load) is already in progress
    #[error("Compiler is busy")]
    CompilerBusy,

    /// The facade state machine refused a transition
    #[error("Illegal compiler transition: {action:?} while {from:?}")]
    IllegalTransition {
        from: CompilerStatus,
        action: CompilerAction,
    },

    // === Sandbox errors ===
    /// The sandbox could not be started
    #[error("Failed to start sandbox: {reason}")]
    SandboxStartFailed { reason: String },

    /// The boot prompt never appeared
    #[error("Sandbox did not reach its ready prompt within {timeout:?}")]
    SandboxBootTimeout { timeout: Duration },

    /// Failed to create PTY
    #[error("Failed to create PTY for command '{command}': {reason}")]
    PtyCreationFailed { command: String, reason: String },

    /// Failed to spawn command in PTY
    #[error("Failed to spawn command '{command}': {reason}")]
    CommandSpawnFailed { command: String, reason: String },

    /// Failed to clone PTY reader
    #[error("Failed to clone PTY reader: {reason}")]
    PtyReaderCloneFailed { reason: String },

    /// Failed to take PTY writer
    #[error("Failed to take PTY writer: {reason}")]
    PtyWriterTakeFailed { reason: String },

    // === Configuration errors ===
    /// Failed to load configuration file
    #[error("Failed to load config from '{}': {reason}", path.display())]
    ConfigLoadFailed { path: PathBuf, reason: String },

    /// Configuration file not found
    #[error("Configuration file not found")]
    ConfigNotFound,

    /// Configuration validation failed
    #[error("Configuration validation failed for '{field}': {reason}")]
    ConfigValidationFailed { field: String, reason: String },

    /// Failed to serialize configuration
    #[error("Failed to serialize config as {format}: {reason}")]
    ConfigSerializationFailed { format: String, reason: String },

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {reason}")]
    ConfigParseFailed { format: String, reason: String },

    // === I/O and serialization errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    // === Generic fallback (use sparingly) ===
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Best-effort diagnostic transcript attached to a failed command
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::PatternMismatch { diagnostic, .. }
            | Error::CommandTimeout { diagnostic, .. }
            | Error::ConsoleClosed { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }

    /// Whether this error ended a command that was actually sent
    pub fn is_command_failure(&self) -> bool {
        self.diagnostic().is_some()
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
