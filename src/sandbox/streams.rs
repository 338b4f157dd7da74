//! Console Streams
//!
//! The duplex byte channel to a sandbox console. Sandboxes that do blocking
//! I/O bridge it to async code with background threads feeding these
//! channels; in-process sandboxes use the [`ConsoleEndpoint`] directly.

use crate::error::{Error, Result};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Host side of a sandbox console
pub struct ConsoleStreams {
    /// Receiver for bytes printed by the console
    output_rx: UnboundedReceiver<Vec<u8>>,
    /// Sender for bytes typed into the console
    input_tx: UnboundedSender<Vec<u8>>,
    /// I/O counters
    stats: StreamStats,
}

/// Sandbox side of a console channel
pub struct ConsoleEndpoint {
    /// Bytes the console prints
    pub output_tx: UnboundedSender<Vec<u8>>,
    /// Bytes typed into the console
    pub input_rx: UnboundedReceiver<Vec<u8>>,
}

impl ConsoleStreams {
    /// Create console streams from channels
    pub fn from_channels(
        output_rx: UnboundedReceiver<Vec<u8>>,
        input_tx: UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            output_rx,
            input_tx,
            stats: StreamStats::default(),
        }
    }

    /// Create a connected pair of host streams and sandbox endpoint
    pub fn pair() -> (ConsoleStreams, ConsoleEndpoint) {
        let (output_tx, output_rx) = unbounded_channel::<Vec<u8>>();
        let (input_tx, input_rx) = unbounded_channel::<Vec<u8>>();
        (
            ConsoleStreams::from_channels(output_rx, input_tx),
            ConsoleEndpoint {
                output_tx,
                input_rx,
            },
        )
    }

    /// Type bytes into the console
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Err(e) = self.input_tx.send(data.to_vec()) {
            self.stats.write_errors += 1;
            return Err(Error::ConsoleWriteFailed {
                reason: e.to_string(),
            });
        }
        self.stats.bytes_written += data.len() as u64;
        self.stats.write_operations += 1;
        Ok(())
    }

    /// Wait for the next output chunk; `None` once the console is gone
    pub async fn read(&mut self) -> Option<Vec<u8>> {
        let chunk = self.output_rx.recv().await?;
        self.stats.bytes_read += chunk.len() as u64;
        self.stats.read_operations += 1;
        Some(chunk)
    }

    /// Discard output that is already queued; returns the discarded byte count
    pub fn drain_output(&mut self) -> usize {
        let mut discarded = 0;
        while let Ok(chunk) = self.output_rx.try_recv() {
            discarded += chunk.len();
        }
        self.stats.bytes_drained += discarded as u64;
        discarded
    }

    /// Whether the sandbox side dropped its input receiver
    pub fn is_closed(&self) -> bool {
        self.input_tx.is_closed()
    }

    /// I/O counters
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}

impl std::fmt::Debug for ConsoleStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleStreams")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Bytes discarded as stale output
    pub bytes_drained: u64,
    /// Number of read operations
    pub read_operations: u64,
    /// Number of write operations
    pub write_operations: u64,
    /// Number of write errors
    pub write_errors: u64,
}
