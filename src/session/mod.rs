//! Command Session
//!
//! Owns the console of a booted sandbox and the single command in flight.
//! A command is written together with a sentinel command; the session then
//! reads console output through a [`LineAssembler`] until the sentinel's echo
//! appears as the in-progress line, a check fails, the console closes, or
//! the deadline passes. Whichever happens first settles the command; the
//! others are never observed for it.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::sandbox::ConsoleStreams;
use crate::terminal::{CompletionMatcher, ErrorExtractor, ExpectedOutput, LineAssembler, MatchOutcome};

/// Whether a command is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingCompletion,
}

/// A command and the output it must produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command text, possibly spanning several lines
    pub command: String,
    /// Output checked once the command completed
    pub expected: ExpectedOutput,
}

impl CommandSpec {
    /// Create a command spec
    pub fn new(command: impl Into<String>, expected: ExpectedOutput) -> Self {
        Self {
            command: command.into(),
            expected,
        }
    }
}

/// How a command settled
enum Settlement {
    Matched(Vec<String>),
    Mismatched { expected: String },
    TimedOut,
    Closed,
}

/// Serialized command execution over a sandbox console
#[derive(Debug)]
pub struct CommandSession {
    console: ConsoleStreams,
    assembler: LineAssembler,
    matcher: CompletionMatcher,
    extractor: ErrorExtractor,
    sentinel_command: String,
    command_timeout: Duration,
    state: SessionState,
}

impl CommandSession {
    /// Create a session on a console
    pub fn new(console: ConsoleStreams, config: &SessionConfig) -> Self {
        Self {
            console,
            assembler: LineAssembler::new(),
            matcher: CompletionMatcher::new(config.sentinel_echo.clone()),
            extractor: ErrorExtractor::new(config),
            sentinel_command: config.sentinel_command.clone(),
            command_timeout: config.command_timeout(),
            state: SessionState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a new command may be sent
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    /// Lines collected for the current or last command
    pub fn lines(&self) -> &[String] {
        self.assembler.lines()
    }

    /// Console I/O counters
    pub fn console(&self) -> &ConsoleStreams {
        &self.console
    }

    /// Run a command with the configured timeout
    pub async fn run(&mut self, spec: &CommandSpec) -> Result<Vec<String>> {
        self.send(spec, self.command_timeout).await
    }

    /// Send a command and wait until it settles
    ///
    /// Returns the line buffer on success. Fails with
    /// [`Error::CommandInFlight`] without touching anything if another
    /// command is still awaiting completion (only possible when a previous
    /// `send` future was dropped before it settled). Command failures carry
    /// a diagnostic extracted from the collected lines.
    pub async fn send(&mut self, spec: &CommandSpec, timeout: Duration) -> Result<Vec<String>> {
        if self.state != SessionState::Idle {
            return Err(Error::CommandInFlight);
        }

        let stale = self.console.drain_output();
        if stale > 0 {
            trace!("Discarded {} bytes of stale console output", stale);
        }
        self.assembler.clear();

        let submitted = format!("{}\n{}\n", spec.command, self.sentinel_command);
        self.console.write(submitted.as_bytes())?;
        self.state = SessionState::AwaitingCompletion;
        debug!(
            "Sent command ({} lines), waiting up to {:?}",
            spec.command.lines().count(),
            timeout
        );

        let settlement = self.await_completion(&spec.expected, timeout).await;
        self.state = SessionState::Idle;

        match settlement {
            Settlement::Matched(lines) => Ok(lines),
            Settlement::Mismatched { expected } => {
                warn!("Command output did not contain '{}'", expected);
                Err(Error::PatternMismatch {
                    expected,
                    diagnostic: self.diagnostic(&submitted),
                })
            }
            Settlement::TimedOut => {
                warn!("Command timed out after {:?}", timeout);
                Err(Error::CommandTimeout {
                    timeout,
                    diagnostic: self.diagnostic(&submitted),
                })
            }
            Settlement::Closed => {
                error!("Console closed while a command was running");
                Err(Error::ConsoleClosed {
                    diagnostic: self.diagnostic(&submitted),
                })
            }
        }
    }

    /// Read the console until the in-progress line equals `prompt`
    ///
    /// Used once after boot; the collected lines are kept until the first
    /// command clears them.
    pub async fn await_prompt(&mut self, prompt: &str) -> Result<()> {
        loop {
            let Some(chunk) = self.console.read().await else {
                return Err(Error::ConsoleClosed {
                    diagnostic: self.assembler.lines().join("\n"),
                });
            };

            let mut loaded = false;
            for &byte in &chunk {
                if self.assembler.push(byte).is_some() && !loaded {
                    loaded = self.assembler.current_line() == prompt;
                }
            }
            if loaded {
                return Ok(());
            }
        }
    }

    async fn await_completion(&mut self, expected: &ExpectedOutput, timeout: Duration) -> Settlement {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            let chunk = tokio::select! {
                chunk = self.console.read() => chunk,
                _ = &mut deadline => return Settlement::TimedOut,
            };

            match chunk {
                Some(bytes) => {
                    if let Some(settlement) = self.feed(&bytes, expected) {
                        return settlement;
                    }
                }
                None => return Settlement::Closed,
            }
        }
    }

    /// Push a chunk, consulting the matcher after every byte until it settles
    ///
    /// Bytes after the settling one are still assembled so the diagnostic
    /// sees the whole chunk.
    fn feed(&mut self, bytes: &[u8], expected: &ExpectedOutput) -> Option<Settlement> {
        let mut settlement = None;
        for &byte in bytes {
            if self.assembler.push(byte).is_none() || settlement.is_some() {
                continue;
            }

            match self.matcher.evaluate(self.assembler.lines(), expected) {
                MatchOutcome::Pending => {}
                MatchOutcome::Matched => {
                    settlement = Some(Settlement::Matched(self.assembler.snapshot()));
                }
                MatchOutcome::Mismatched { expected, .. } => {
                    settlement = Some(Settlement::Mismatched { expected });
                }
            }
        }
        settlement
    }

    fn diagnostic(&self, submitted: &str) -> String {
        self.extractor.extract(submitted, self.assembler.lines())
    }
}
