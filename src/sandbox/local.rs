//! Local shell sandbox
//!
//! Runs a shell on this machine inside a pseudoterminal (via `portable-pty`)
//! and bridges its blocking master reads and writes to [`ConsoleStreams`]
//! with one reader and one writer thread. There is nothing to download, so
//! the ready signal is sent as soon as the shell is spawned.

use std::io::{Read, Write};
use std::thread;

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::streams::ConsoleStreams;
use super::{Sandbox, SandboxHandle, SandboxSignal};
use crate::config::SandboxConfig;
use crate::error::{Error, Result};

/// Shell spawned in a local pseudoterminal
pub struct LocalShellSandbox {
    config: SandboxConfig,
    child: Option<Box<dyn Child + Send + Sync>>,
}

impl LocalShellSandbox {
    /// Create a sandbox that spawns the configured shell on `start`
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    /// Process id of the running shell
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.process_id())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Failed to kill sandbox shell: {}", e);
            }
        }
    }

    fn spawn(&mut self) -> Result<ConsoleStreams> {
        let shell = self.config.shell_path.to_string_lossy().to_string();
        let (cols, rows) = self.config.dimensions;
        let work_dir = self.config.work_dir();
        std::fs::create_dir_all(&work_dir).map_err(|e| Error::SandboxStartFailed {
            reason: format!("cannot create {}: {}", work_dir.display(), e),
        })?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::PtyCreationFailed {
                command: shell.clone(),
                reason: e.to_string(),
            })?;

        let mut cmd_builder = CommandBuilder::new(&self.config.shell_path);
        cmd_builder.args(&self.config.shell_args);
        for (key, value) in &self.config.environment {
            cmd_builder.env(key, value);
        }
        // The prompt shows $PWD; keep it as configured rather than resolved
        cmd_builder.env("PWD", &work_dir);
        cmd_builder.cwd(&work_dir);

        let child = pair
            .slave
            .spawn_command(cmd_builder)
            .map_err(|e| Error::CommandSpawnFailed {
                command: shell.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Spawned sandbox shell '{}' (pid {:?})",
            shell,
            child.process_id()
        );
        self.child = Some(child);

        bridge_console(pair)
    }
}

#[async_trait]
impl Sandbox for LocalShellSandbox {
    fn name(&self) -> &str {
        "local-shell"
    }

    async fn start(&mut self) -> Result<SandboxHandle> {
        self.stop();
        let console = self.spawn()?;

        let (signal_tx, signals) = unbounded_channel();
        let _ = signal_tx.send(SandboxSignal::Ready);

        Ok(SandboxHandle { console, signals })
    }
}

impl Drop for LocalShellSandbox {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bridge a PTY pair to async channels with a reader and a writer thread
fn bridge_console(pair: PtyPair) -> Result<ConsoleStreams> {
    let master_reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| Error::PtyReaderCloneFailed {
            reason: e.to_string(),
        })?;
    let master_writer = pair
        .master
        .take_writer()
        .map_err(|e| Error::PtyWriterTakeFailed {
            reason: e.to_string(),
        })?;

    let (output_tx, output_rx) = unbounded_channel::<Vec<u8>>();
    let (input_tx, input_rx) = unbounded_channel::<Vec<u8>>();

    thread::spawn(move || read_console(master_reader, output_tx));
    thread::spawn(move || write_console(master_writer, input_rx));

    Ok(ConsoleStreams::from_channels(output_rx, input_tx))
}

fn read_console(mut reader: Box<dyn Read + Send>, output_tx: UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    let mut consecutive_errors = 0;
    const MAX_CONSECUTIVE_ERRORS: u32 = 5;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("Console read EOF - shell terminated");
                break;
            }
            Ok(n) => {
                consecutive_errors = 0;
                if output_tx.send(buf[..n].to_vec()).is_err() {
                    debug!("Console reader: receiver dropped, stopping");
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "Console read error ({}): {} (attempt {}/{})",
                    e.kind(),
                    e,
                    consecutive_errors,
                    MAX_CONSECUTIVE_ERRORS
                );
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("Console reader: too many consecutive errors, stopping");
                    break;
                }
                thread::sleep(std::time::Duration::from_millis(50));
            }
        }
    }
    debug!("Console reader thread exiting");
}

fn write_console(mut writer: Box<dyn Write + Send>, mut input_rx: UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = input_rx.blocking_recv() {
        let written = writer.write_all(&data).and_then(|()| writer.flush());
        if let Err(e) = written {
            error!("Console write error ({}): {}, stopping writer", e.kind(), e);
            break;
        }
    }
    debug!("Console writer thread exiting");
}
