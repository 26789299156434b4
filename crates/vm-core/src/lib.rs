//! Lifecycle orchestration for `vm`.
//!
//! This crate turns a resolved project (`Project`) and a requested verb
//! (`Verb`) into calls on a backend: it refuses verbs the unit's current
//! state cannot satisfy, composes `reload` from `halt` and `up`, renders
//! dry-run plans, serializes mutating verbs per project with an advisory
//! file lock, and owns the two-press interrupt window used by attached
//! sessions.

pub mod concurrency;
pub mod context;
pub mod dispatch;
pub mod lifecycle;

pub use concurrency::{
    install_interrupt_handler, InterruptAction, InterruptWindow, ProjectLock, INTERRUPT_WINDOW,
};
pub use context::{default_state_dir, resolve_tool_dir, ConfigSource, Context};
pub use dispatch::{Dispatcher, Outcome, Plan, Project, Verb};
pub use lifecycle::validate_transition;

use std::path::PathBuf;
use thiserror::Error;
use vm_config::ConfigError;
use vm_provider::{BackendError, Op, UnitState};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("cannot {op} {unit}: unit is {from}{}", lifecycle::hint(.op, .from))]
    InvalidTransition {
        unit: String,
        from: UnitState,
        op: Op,
    },
    #[error("project '{project}' is busy: another vm command holds {} ({holder})", .path.display())]
    Busy {
        project: String,
        path: PathBuf,
        holder: String,
    },
    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Exit code a backend child reported, to be passed through unchanged.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Backend(e) => e.exit_code(),
            _ => None,
        }
    }

    /// Discovery, parse and validation failures.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
