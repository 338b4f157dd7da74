//! Compiler Event System
//!
//! Lifecycle and progress notifications. Subscribers register a callback per
//! event kind under a subscriber id; callbacks run synchronously in
//! registration order and a panicking callback is logged and skipped without
//! affecting the others or the publisher. Every published event is also sent
//! on a broadcast channel for async consumers.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events published by the compiler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum CompilerEvent {
    /// Sandbox image download progress, in percent
    DownloadProgress(f64),
    /// Sandbox image fully downloaded and booting
    DownloadComplete,
    /// Sandbox printed its ready prompt
    SandboxReady,
    /// A pipeline command failed; carries the extracted diagnostic
    CommandError(String),
    /// Source file written to the sandbox
    SourceStaged,
    /// Object file compiled
    ObjectBuilt,
    /// Object linked into an executable
    ArtifactLinked,
    /// Executable converted to the flashable format
    ArtifactConverted,
}

/// Event names subscribers register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DownloadProgress,
    DownloadComplete,
    SandboxReady,
    CommandError,
    SourceStaged,
    ObjectBuilt,
    ArtifactLinked,
    ArtifactConverted,
}

impl EventKind {
    /// All kinds
    pub const ALL: [EventKind; 8] = [
        EventKind::DownloadProgress,
        EventKind::DownloadComplete,
        EventKind::SandboxReady,
        EventKind::CommandError,
        EventKind::SourceStaged,
        EventKind::ObjectBuilt,
        EventKind::ArtifactLinked,
        EventKind::ArtifactConverted,
    ];

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::DownloadProgress => "downloadProgress",
            EventKind::DownloadComplete => "downloadComplete",
            EventKind::SandboxReady => "sandboxReady",
            EventKind::CommandError => "commandError",
            EventKind::SourceStaged => "sourceStaged",
            EventKind::ObjectBuilt => "objectBuilt",
            EventKind::ArtifactLinked => "artifactLinked",
            EventKind::ArtifactConverted => "artifactConverted",
        }
    }

    /// Look a kind up by wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl CompilerEvent {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            CompilerEvent::DownloadProgress(_) => EventKind::DownloadProgress,
            CompilerEvent::DownloadComplete => EventKind::DownloadComplete,
            CompilerEvent::SandboxReady => EventKind::SandboxReady,
            CompilerEvent::CommandError(_) => EventKind::CommandError,
            CompilerEvent::SourceStaged => EventKind::SourceStaged,
            CompilerEvent::ObjectBuilt => EventKind::ObjectBuilt,
            CompilerEvent::ArtifactLinked => EventKind::ArtifactLinked,
            CompilerEvent::ArtifactConverted => EventKind::ArtifactConverted,
        }
    }
}

/// Callback invoked for a published event
pub type EventCallback = Arc<dyn Fn(&CompilerEvent) + Send + Sync>;

/// Event as delivered to broadcast subscribers
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event id
    pub id: String,
    /// The event
    pub event: CompilerEvent,
    /// When it was published
    pub timestamp: DateTime<Utc>,
}

/// Subscription handle for receiving events asynchronously
pub struct EventSubscription {
    receiver: broadcast::Receiver<EventEnvelope>,
}

impl EventSubscription {
    /// Receive the next event, waiting if necessary
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        match self.receiver.recv().await {
            Ok(envelope) => Some(envelope),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!("Event subscriber lagged by {} events", count);
                self.receiver.recv().await.ok()
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        match self.receiver.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                warn!("Event subscriber lagged by {} events", count);
                self.try_recv()
            }
        }
    }
}

type Registry = HashMap<EventKind, Vec<(String, EventCallback)>>;

/// Event bus with a callback registry and a broadcast channel
pub struct EventBus {
    observers: RwLock<Registry>,
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a bus whose broadcast channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            observers: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Register a callback for an event kind
    ///
    /// Registering again under the same subscriber id replaces the previous
    /// callback in place, keeping its position.
    pub fn on<F>(&self, kind: EventKind, subscriber_id: impl Into<String>, callback: F)
    where
        F: Fn(&CompilerEvent) + Send + Sync + 'static,
    {
        let subscriber_id = subscriber_id.into();
        let callback: EventCallback = Arc::new(callback);
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let entries = observers.entry(kind).or_default();

        match entries.iter_mut().find(|(id, _)| *id == subscriber_id) {
            Some(entry) => entry.1 = callback,
            None => entries.push((subscriber_id, callback)),
        }
    }

    /// Remove a callback; returns whether one was registered
    pub fn off(&self, kind: EventKind, subscriber_id: &str) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = observers.get_mut(&kind) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(id, _)| id != subscriber_id);
        before != entries.len()
    }

    /// Number of callbacks registered for a kind
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Subscribe to every event through the broadcast channel
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event; returns the number of callbacks that completed
    pub fn publish(&self, event: CompilerEvent) -> usize {
        let kind = event.kind();
        let callbacks: Vec<(String, EventCallback)> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        debug!("Publishing {} to {} subscribers", kind, callbacks.len());

        let mut delivered = 0;
        for (subscriber_id, callback) in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        "Subscriber '{}' failed handling {}: {}",
                        subscriber_id,
                        kind,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        // No receivers is not an error
        let _ = self.sender.send(EventEnvelope {
            id: generate_event_id(),
            event,
            timestamp: Utc::now(),
        });

        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Generate a unique event id
fn generate_event_id() -> String {
    format!("evt_{}", uuid::Uuid::new_v4().simple())
}
