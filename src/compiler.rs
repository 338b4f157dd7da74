//! Compiler facade
//!
//! [`Compiler`] is the entry point callers use: it boots its sandbox on
//! demand, runs the pipeline for one source file at a time and forwards
//! lifecycle events to registered observers. Status changes go through
//! [`CompilerStatus::next`]; a second compile while one is running is
//! refused with [`Error::CompilerBusy`].

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{CompilerEvent, EventBus, EventKind, EventSubscription};
use crate::pipeline::{CompilationParameters, CompilationResult, Pipeline};
use crate::sandbox::{self, Sandbox};
use crate::session::CommandSession;
use crate::state::{CompilerAction, CompilerStatus};

/// Booted sandbox with its session
struct Engine {
    session: CommandSession,
    pipeline: Pipeline,
}

struct Backend<S> {
    sandbox: S,
    engine: Option<Engine>,
}

/// Applies a fallback action if a status change is abandoned mid-way
struct StatusGuard<'a> {
    status: &'a StdMutex<CompilerStatus>,
    on_abandon: CompilerAction,
    settled: bool,
}

impl<'a> StatusGuard<'a> {
    fn new(status: &'a StdMutex<CompilerStatus>, on_abandon: CompilerAction) -> Self {
        Self {
            status,
            on_abandon,
            settled: false,
        }
    }

    fn settle(&mut self, action: CompilerAction) -> Result<CompilerStatus> {
        self.settled = true;
        apply(self.status, action)
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Operation abandoned, applying {:?}", self.on_abandon);
            let _ = apply(self.status, self.on_abandon);
        }
    }
}

fn apply(status: &StdMutex<CompilerStatus>, action: CompilerAction) -> Result<CompilerStatus> {
    let mut current = status.lock().unwrap_or_else(|e| e.into_inner());
    let next = current.next(action)?;
    if *current != next {
        debug!("Compiler status {:?} -> {:?} ({:?})", *current, next, action);
    }
    *current = next;
    Ok(next)
}

/// Load-on-demand compiler over a sandbox
pub struct Compiler<S: Sandbox> {
    config: Config,
    events: Arc<EventBus>,
    status: StdMutex<CompilerStatus>,
    backend: Mutex<Backend<S>>,
}

impl<S: Sandbox> Compiler<S> {
    /// Create a compiler; nothing is started until `load` or `compile`
    pub fn new(sandbox: S, config: Config) -> Self {
        Self::with_events(sandbox, config, Arc::new(EventBus::default()))
    }

    /// Create a compiler publishing to an existing event bus
    pub fn with_events(sandbox: S, config: Config, events: Arc<EventBus>) -> Self {
        Self {
            config,
            events,
            status: StdMutex::new(CompilerStatus::Idle),
            backend: Mutex::new(Backend {
                sandbox,
                engine: None,
            }),
        }
    }

    /// Current status
    pub fn status(&self) -> CompilerStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared event bus
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Register an event callback under a subscriber id
    pub fn on_event<F>(&self, kind: EventKind, subscriber_id: impl Into<String>, callback: F)
    where
        F: Fn(&CompilerEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, subscriber_id, callback);
    }

    /// Remove an event callback
    pub fn off_event(&self, kind: EventKind, subscriber_id: &str) -> bool {
        self.events.off(kind, subscriber_id)
    }

    /// Receive every event asynchronously
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    /// Boot the sandbox now instead of on the first compile
    pub async fn load(&self) -> Result<()> {
        if apply(&self.status, CompilerAction::Load)? == CompilerStatus::Ready {
            return Ok(());
        }
        let mut guard = StatusGuard::new(&self.status, CompilerAction::LoadFailed);

        let mut backend = self.backend.lock().await;
        match self.ensure_loaded(&mut backend).await {
            Ok(_) => {
                guard.settle(CompilerAction::LoadComplete)?;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load sandbox: {}", e);
                guard.settle(CompilerAction::LoadFailed)?;
                Err(e)
            }
        }
    }

    /// Compile a source file
    ///
    /// Stage failures are reported through the returned result; `Err` means
    /// the compiler was busy or the sandbox could not be booted.
    pub async fn compile(
        &self,
        source: &str,
        parameters: Option<CompilationParameters>,
    ) -> Result<CompilationResult> {
        apply(&self.status, CompilerAction::Compile)?;
        let mut guard = StatusGuard::new(&self.status, CompilerAction::CompileAborted);

        let mut backend = self.backend.lock().await;
        let outcome = match self.ensure_loaded(&mut backend).await {
            Ok(engine) => {
                engine
                    .pipeline
                    .run(&mut engine.session, source, parameters.as_ref())
                    .await
            }
            Err(e) => Err(e),
        };

        let settle = if backend.engine.is_some() {
            CompilerAction::CompileComplete
        } else {
            CompilerAction::CompileAborted
        };
        guard.settle(settle)?;

        match &outcome {
            Ok(result) if result.success => info!("Compilation succeeded"),
            Ok(result) => warn!(
                "Compilation failed: {}",
                result.message.as_deref().unwrap_or_default()
            ),
            Err(e) => error!("Compilation aborted: {}", e),
        }
        outcome
    }

    /// Drop the booted sandbox; the next compile boots a fresh one
    pub async fn shutdown(&self) -> Result<()> {
        apply(&self.status, CompilerAction::Shutdown)?;
        let mut backend = self.backend.lock().await;
        if backend.engine.take().is_some() {
            info!("Sandbox session closed");
        }
        Ok(())
    }

    async fn ensure_loaded<'b>(&self, backend: &'b mut Backend<S>) -> Result<&'b mut Engine> {
        let usable = backend
            .engine
            .as_ref()
            .is_some_and(|engine| engine.session.is_idle());

        if !usable {
            if backend.engine.take().is_some() {
                warn!("Discarding session left with a command in flight");
            }

            info!("Starting sandbox '{}'", backend.sandbox.name());
            let handle = backend.sandbox.start().await?;
            let session = sandbox::boot(handle, &self.config.session, &self.events).await?;
            backend.engine = Some(Engine {
                session,
                pipeline: Pipeline::new(&self.config, self.events.clone()),
            });
        }

        backend
            .engine
            .as_mut()
            .ok_or_else(|| Error::Other("sandbox engine missing after boot".to_string()))
    }
}
