//! Configuration management for sketchcc
//!
//! Everything that describes the remote session (prompts, sentinel texts,
//! timeouts), the remote toolchain layout, the local sandbox and logging lives
//! here. Defaults reproduce the Alpine/AVR image the pipeline was built for,
//! so an empty configuration file is a valid configuration.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for sketchcc
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command session configuration
    pub session: SessionConfig,

    /// Compilation pipeline configuration
    pub pipeline: PipelineConfig,

    /// Local sandbox configuration
    pub sandbox: SandboxConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Command session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for a single command, in milliseconds
    pub command_timeout_ms: u64,

    /// Deadline for the boot prompt, in milliseconds (none waits forever)
    pub boot_timeout_ms: Option<u64>,

    /// Command appended after every submitted command
    pub sentinel_command: String,

    /// Text the sentinel command prints once the command before it finished
    pub sentinel_echo: String,

    /// Prompt printed once the sandbox finished booting
    pub ready_prompt: String,

    /// Prompt printed in the working directory between commands
    pub work_prompt: String,

    /// Number of trailing command characters used to locate the command echo
    pub diagnostic_anchor_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            boot_timeout_ms: None,
            sentinel_command: "echo jobs done!".to_string(),
            sentinel_echo: "jobs done!".to_string(),
            ready_prompt: "~ # ".to_string(),
            work_prompt: "/root # ".to_string(),
            diagnostic_anchor_len: 35,
        }
    }
}

impl SessionConfig {
    /// Command timeout as a `Duration`
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Boot timeout as a `Duration`, if configured
    pub fn boot_timeout(&self) -> Option<Duration> {
        self.boot_timeout_ms.map(Duration::from_millis)
    }
}

/// Remote toolchain layout used by the pipeline stage templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Remote directory the sources and artifacts are written to
    pub work_dir: String,

    /// Header prepended to every source file
    pub source_header: String,

    /// Root of the per-device core sources (`<root>/<device>/cores/...`)
    pub toolchain_root: String,

    /// System include directory of the cross toolchain
    pub system_include: String,

    /// Device used when the caller does not pick one
    pub default_device: String,

    /// Clock rate used when the caller does not pick one
    pub default_clock_rate: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: "/root".to_string(),
            source_header: "Arduino.h".to_string(),
            toolchain_root: "/usr/share/arduino/src".to_string(),
            system_include: "/usr/lib/avr/include".to_string(),
            default_device: "atmega328p".to_string(),
            default_clock_rate: "16000000L".to_string(),
        }
    }
}

/// Boot timeout used for the local shell when none is configured
pub const LOCAL_BOOT_TIMEOUT_MS: u64 = 10_000;

/// Local PTY sandbox configuration
///
/// The shell must echo each line when it reads it, as a serial console
/// shell does. Readline-driven bash does; dash leaves echoing to the
/// terminal, which echoes typed-ahead input before the command runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Shell executable path
    pub shell_path: PathBuf,

    /// Shell arguments
    pub shell_args: Vec<String>,

    /// Working directory the shell starts in (created on start), defaults to
    /// `sketchcc` under the system temporary directory
    pub working_directory: Option<PathBuf>,

    /// Terminal dimensions (cols, rows)
    pub dimensions: (u16, u16),

    /// Environment variables to set
    pub environment: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let mut environment = HashMap::new();
        // Parameter expansion in prompts works in every POSIX shell, `\w` does not
        environment.insert("PS1".to_string(), "$PWD # ".to_string());
        environment.insert("PS2".to_string(), "> ".to_string());
        environment.insert("TERM".to_string(), "dumb".to_string());
        environment.insert("HISTFILE".to_string(), String::new());

        Self {
            shell_path: PathBuf::from("/bin/bash"),
            shell_args: vec!["--noprofile".to_string(), "--norc".to_string(), "-i".to_string()],
            working_directory: None,
            // Wide enough that long command lines are echoed without wrapping
            dimensions: (1024, 50),
            environment,
        }
    }
}

impl SandboxConfig {
    /// Directory the shell starts in
    pub fn work_dir(&self) -> PathBuf {
        self.working_directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("sketchcc"))
    }

    /// Prompt the shell prints in its working directory
    pub fn prompt(&self) -> String {
        format!("{} # ", self.work_dir().display())
    }
}

impl Config {
    /// Adapt the session and pipeline settings to the local shell sandbox
    ///
    /// The local shell never leaves its working directory, so it is both the
    /// pipeline's work directory and the source of the ready and work
    /// prompts. A missing boot timeout becomes [`LOCAL_BOOT_TIMEOUT_MS`].
    pub fn for_local_shell(mut self) -> Self {
        let prompt = self.sandbox.prompt();
        self.pipeline.work_dir = self.sandbox.work_dir().display().to_string();
        self.session.ready_prompt = prompt.clone();
        self.session.work_prompt = prompt;
        self.session
            .boot_timeout_ms
            .get_or_insert(LOCAL_BOOT_TIMEOUT_MS);
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,

    /// Log every console line at trace level
    pub log_serial: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_serial: false,
        }
    }
}

impl LoggingConfig {
    /// Build the filter directive handed to `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        if self.log_serial {
            format!("{},sketchcc::serial=trace", self.level)
        } else {
            self.level.clone()
        }
    }
}

/// Configuration utilities
pub mod utils {
    use super::*;

    /// Get configuration file format from path
    pub fn get_config_format(path: &Path) -> Option<loader::ConfigFormat> {
        match path.extension()?.to_str()? {
            "toml" => Some(loader::ConfigFormat::Toml),
            "json" => Some(loader::ConfigFormat::Json),
            _ => None,
        }
    }

    /// Create a default configuration file content
    pub fn create_default_config_content(format: loader::ConfigFormat) -> crate::Result<String> {
        let config = Config::default();

        match format {
            loader::ConfigFormat::Toml => toml::to_string_pretty(&config).map_err(|e| {
                crate::Error::ConfigSerializationFailed {
                    format: "TOML".to_string(),
                    reason: e.to_string(),
                }
            }),
            loader::ConfigFormat::Json => Ok(serde_json::to_string_pretty(&config)?),
        }
    }
}
