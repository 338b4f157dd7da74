//! sketchcc - compile microcontroller sketches through a raw serial console
//!
//! sketchcc drives an interactive shell it can only reach as a byte stream
//! (the console of an emulated Linux machine with an AVR toolchain, or a
//! local shell in a pseudoterminal) and runs a fixed build pipeline on it:
//! write the source file, compile, link, convert to Intel HEX and print the
//! result back.
//!
//! ## Module Organization
//!
//! - [`terminal`] - Line assembly, completion matching, failure diagnostics
//! - [`session`] - One command in flight over a console, with timeout
//! - [`pipeline`] - Stage templates and the sequential stage runner
//! - [`sandbox`] - Sandbox trait, console channels, local PTY sandbox
//! - [`compiler`] - Load-on-demand facade with a busy guard
//! - [`events`] - Lifecycle and progress events
//! - [`config`] - Configuration loading and defaults
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use sketchcc::{Compiler, Config, EventKind, LocalShellSandbox};
//!
//! # async fn example() -> sketchcc::Result<()> {
//! let config = Config::default().for_local_shell();
//! let compiler = Compiler::new(LocalShellSandbox::new(config.sandbox.clone()), config);
//! compiler.on_event(EventKind::CommandError, "cli", |event| eprintln!("{:?}", event));
//!
//! let result = compiler.compile("void setup() {}\nvoid loop() {}", None).await?;
//! if let Some(hex) = result.output {
//!     print!("{}", hex);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Completion detection
//!
//! The console has no framing. Every command is followed by
//! `echo jobs done!`; a command is complete when the in-progress line reads
//! `jobs done!`, and it succeeded when the lines just above the echoed
//! sentinel contain what the stage expects. Anything else within the
//! timeout is a failure, reported with the output the command produced.

#[macro_use]
extern crate tracing;

pub mod compiler;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod sandbox;
pub mod session;
pub mod state;
pub mod terminal;

// Re-exports for core functionality
pub use compiler::Compiler;
pub use config::loader::ConfigLoader;
pub use config::Config;
pub use error::{Error, Result};
pub use events::{CompilerEvent, EventBus, EventKind};
pub use pipeline::{CompilationParameters, CompilationResult};
pub use sandbox::{LocalShellSandbox, Sandbox, SandboxHandle, SandboxSignal};
pub use state::CompilerStatus;

// Version information
/// The current version of sketchcc from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The package name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The package description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Load configuration from the default locations
///
/// Falls back to [`Config::default`] when no file is found or the file
/// cannot be loaded, logging the reason.
pub fn init() -> Config {
    info!("Initializing {} v{}", NAME, VERSION);

    match ConfigLoader::load() {
        Ok(config) => {
            info!("Configuration loaded");
            config
        }
        Err(Error::ConfigNotFound) => {
            debug!("No configuration file found, using defaults");
            Config::default()
        }
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    }
}

/// Load configuration from an explicit file
pub fn init_with_config(config_path: &std::path::Path) -> Result<Config> {
    info!(
        "Initializing {} v{} with config: {}",
        NAME,
        VERSION,
        config_path.display()
    );

    if !config_path.exists() {
        return Err(Error::ConfigLoadFailed {
            path: config_path.to_path_buf(),
            reason: "Configuration file does not exist".to_string(),
        });
    }

    let mut loader = ConfigLoader::new();
    let config = loader.load_from_path(config_path)?;
    loader.validate_config(&config)?;
    Ok(config)
}

/// Human readable explanation for errors that stop the program
pub fn handle_startup_error(error: &Error) -> String {
    match error {
        Error::ConfigLoadFailed { path, reason } => format!(
            "Configuration Error: Failed to load config from '{}': {}\n\nTry:\n• Check configuration file syntax\n• Ensure file permissions are correct",
            path.display(),
            reason
        ),
        Error::ConfigParseFailed { format, reason } => format!(
            "Configuration Error: Failed to parse {} config: {}\n\nTry:\n• Ensure the file is valid {}",
            format, reason, format
        ),
        Error::ConfigValidationFailed { field, reason } => format!(
            "Configuration Error: Validation failed for '{}': {}",
            field, reason
        ),
        Error::SandboxStartFailed { reason } => format!(
            "Sandbox Error: {}\n\nTry:\n• Check sandbox.shell_path in the configuration",
            reason
        ),
        Error::SandboxBootTimeout { timeout } => format!(
            "Sandbox Error: no ready prompt after {:?}\n\nTry:\n• Check session.ready_prompt matches the shell prompt\n• Raise session.boot_timeout_ms",
            timeout
        ),
        Error::PtyCreationFailed { .. } | Error::CommandSpawnFailed { .. } => {
            format!("Sandbox Error: {}", error)
        }
        _ => format!(
            "Unexpected Error: {}\n\nPlease report this issue with debug logs enabled",
            error
        ),
    }
}
