//! Execution sandboxes
//!
//! A sandbox boots something that runs a shell and hands back its console as
//! a duplex byte channel, plus a stream of boot signals (image download
//! progress and a final ready signal). [`boot`] turns a started sandbox into
//! a [`CommandSession`] once the shell printed its ready prompt.

pub mod local;
pub mod streams;

pub use local::LocalShellSandbox;
pub use streams::{ConsoleEndpoint, ConsoleStreams, StreamStats};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{CompilerEvent, EventBus};
use crate::session::CommandSession;

/// Boot signals reported by a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxSignal {
    /// Bytes of a boot asset downloaded so far
    DownloadProgress { loaded: u64, total: u64 },
    /// All assets loaded, the console is booting
    Ready,
}

/// A started sandbox
pub struct SandboxHandle {
    /// Console byte channel
    pub console: ConsoleStreams,
    /// Boot signals, ending with [`SandboxSignal::Ready`]
    pub signals: UnboundedReceiver<SandboxSignal>,
}

/// Something that can start a console-attached shell
#[async_trait]
pub trait Sandbox: Send {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Start the sandbox; may be called again after the previous handle was dropped
    async fn start(&mut self) -> Result<SandboxHandle>;
}

/// Turns raw download progress into published percentages
///
/// The first download that completes in one step is a small bootstrap asset
/// and is ignored; progress is reported once a second download started.
#[derive(Debug, Clone, Default)]
pub struct DownloadTracker {
    first_download_skipped: bool,
    second_download_started: bool,
}

impl DownloadTracker {
    /// Create a tracker for a fresh boot
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a progress report; returns the percentage to publish, if any
    pub fn observe(&mut self, loaded: u64, total: u64) -> Option<f64> {
        if loaded == 0 || total == 0 {
            return None;
        }

        let finished = loaded >= total;
        if !self.first_download_skipped && finished {
            self.first_download_skipped = true;
        }
        if self.first_download_skipped && !finished {
            self.second_download_started = true;
        }
        if !self.second_download_started {
            return None;
        }

        Some(loaded as f64 / total as f64 * 100.0)
    }
}

/// Wait for a started sandbox to boot and return a session on its console
///
/// Publishes `downloadProgress`, `downloadComplete` and `sandboxReady` along
/// the way. The boot timeout, when configured, covers the whole sequence.
pub async fn boot(
    handle: SandboxHandle,
    config: &SessionConfig,
    events: &EventBus,
) -> Result<CommandSession> {
    let boot = wait_until_booted(handle, config, events);
    match config.boot_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, boot)
            .await
            .map_err(|_| Error::SandboxBootTimeout { timeout })?,
        None => boot.await,
    }
}

async fn wait_until_booted(
    handle: SandboxHandle,
    config: &SessionConfig,
    events: &EventBus,
) -> Result<CommandSession> {
    let SandboxHandle {
        console,
        mut signals,
    } = handle;

    let mut tracker = DownloadTracker::new();
    loop {
        match signals.recv().await {
            Some(SandboxSignal::DownloadProgress { loaded, total }) => {
                if let Some(percent) = tracker.observe(loaded, total) {
                    debug!("Sandbox download at {:.1}%", percent);
                    events.publish(CompilerEvent::DownloadProgress(percent));
                }
            }
            Some(SandboxSignal::Ready) => {
                info!("Sandbox assets loaded, waiting for the ready prompt");
                events.publish(CompilerEvent::DownloadComplete);
                break;
            }
            None => {
                return Err(Error::SandboxStartFailed {
                    reason: "signal channel closed before the sandbox was ready".to_string(),
                });
            }
        }
    }

    let mut session = CommandSession::new(console, config);
    session.await_prompt(&config.ready_prompt).await?;

    info!("Sandbox ready");
    events.publish(CompilerEvent::SandboxReady);
    Ok(session)
}
