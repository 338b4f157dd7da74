//! Compiler State Management
//!
//! Lifecycle state of the compiler facade. Every public facade operation is
//! expressed as a [`CompilerAction`] applied to the current [`CompilerStatus`];
//! the transition table below is the only place that decides what is allowed.

use crate::error::{Error, Result};

/// Facade status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilerStatus {
    /// No sandbox booted
    #[default]
    Idle,
    /// Sandbox is booting
    Loading,
    /// Sandbox booted, no compilation running
    Ready,
    /// A compilation is running
    Compiling,
}

/// Actions that move the facade between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerAction {
    /// Start booting the sandbox
    Load,
    /// Boot finished
    LoadComplete,
    /// Boot failed
    LoadFailed,
    /// Start a compilation
    Compile,
    /// Compilation finished with a live engine
    CompileComplete,
    /// Compilation ended without a usable engine
    CompileAborted,
    /// Tear the sandbox down
    Shutdown,
}

impl CompilerStatus {
    /// Apply an action, returning the next status
    ///
    /// Starting work while work is already running yields
    /// [`Error::CompilerBusy`]; any other refused combination yields
    /// [`Error::IllegalTransition`].
    pub fn next(self, action: CompilerAction) -> Result<CompilerStatus> {
        use CompilerAction as A;
        use CompilerStatus as S;

        match (self, action) {
            (S::Idle, A::Load) => Ok(S::Loading),
            (S::Idle, A::Compile) => Ok(S::Compiling),
            (S::Idle, A::Shutdown) => Ok(S::Idle),

            (S::Loading, A::LoadComplete) => Ok(S::Ready),
            (S::Loading, A::LoadFailed) => Ok(S::Idle),
            (S::Loading, A::Compile) => Ok(S::Compiling),
            (S::Loading, A::Load | A::Shutdown) => Err(Error::CompilerBusy),

            (S::Ready, A::Load) => Ok(S::Ready),
            (S::Ready, A::Compile) => Ok(S::Compiling),
            (S::Ready, A::Shutdown) => Ok(S::Idle),

            // A load that overlapped a compilation reports into it
            (S::Compiling, A::LoadComplete | A::LoadFailed) => Ok(S::Compiling),
            (S::Compiling, A::CompileComplete) => Ok(S::Ready),
            (S::Compiling, A::CompileAborted) => Ok(S::Idle),
            (S::Compiling, A::Load | A::Compile | A::Shutdown) => Err(Error::CompilerBusy),

            (from, action) => Err(Error::IllegalTransition { from, action }),
        }
    }

    /// Whether a sandbox is booted and idle
    pub fn is_ready(&self) -> bool {
        matches!(self, CompilerStatus::Ready)
    }

    /// Whether a load or compilation is in progress
    pub fn is_busy(&self) -> bool {
        matches!(self, CompilerStatus::Loading | CompilerStatus::Compiling)
    }
}
