//! Test utilities for sketchcc
//!
//! Shared helpers for the integration and contract tests: a scripted fake
//! shell sandbox and an event recorder.

#![allow(dead_code)]

pub mod fake_shell;

pub use fake_shell::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sketchcc::{CompilerEvent, Config, EventBus, EventKind};

/// Configuration with a short command timeout
pub fn fast_config(command_timeout_ms: u64) -> Config {
    let mut config = Config::default();
    config.session.command_timeout_ms = command_timeout_ms;
    config
}

/// Records every event published on a bus, in order
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    seen: Arc<Mutex<Vec<CompilerEvent>>>,
}

impl EventRecorder {
    /// Register for every event kind under `subscriber_id`
    pub fn attach(bus: &EventBus, subscriber_id: &str) -> Self {
        let recorder = Self::default();
        for kind in EventKind::ALL {
            let seen = recorder.seen.clone();
            bus.on(kind, subscriber_id, move |event: &CompilerEvent| {
                seen.lock().unwrap().push(event.clone())
            });
        }
        recorder
    }

    pub fn events(&self) -> Vec<CompilerEvent> {
        self.seen.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(CompilerEvent::kind).collect()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

/// Upper bound for tests that must not hang
pub const TEST_DEADLINE: Duration = Duration::from_secs(10);
