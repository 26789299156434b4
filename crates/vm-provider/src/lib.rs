//! Backends that turn lifecycle verbs into Docker or Vagrant calls.
//!
//! Both backends do the same thing in the end: get a running unit with a
//! shell channel into it, then hand the merged document to the shared
//! provisioning playbook (`playbook`). Everything backend-specific lives in
//! `docker` (plus its typed compose projection in `compose`) and `vagrant`.
//! `mock` records calls for dispatcher tests.

pub mod backend;
pub mod compose;
pub mod docker;
pub mod exec;
pub mod mock;
pub mod playbook;
pub mod prereq;
pub mod terminal;
pub mod vagrant;
pub mod workspace;

pub use backend::{
    select_backend, Backend, BackendOptions, Op, UnitSpec, UnitState, UnitStatus, UnitSummary,
};
pub use prereq::{check_docker_prereqs, check_vagrant_prereqs, format_missing, MissingPrereq};
pub use workspace::{relative_to_project, translate_cwd};

use std::path::PathBuf;
use thiserror::Error;
use vm_config::ConfigError;

/// Exit code reported when an interactive session is ended with a double
/// interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command '{command}' exited with code {code}")]
    CommandFailed { command: String, code: i32 },
    #[error(
        "provisioning failed with code {code}; the unit was left running.\n  log: {log_path}\n  view it with: {hint}"
    )]
    ProvisioningFailed {
        code: i32,
        log_path: String,
        hint: String,
    },
    #[error("unit '{0}' is not running (start it with `vm up`)")]
    NotRunning(String),
    #[error("unit '{0}' does not exist")]
    NotCreated(String),
    #[error("unit '{unit}' did not accept commands after {attempts} attempts")]
    NotReady { unit: String, attempts: u32 },
    #[error("{0}")]
    Unavailable(String),
    #[error("session interrupted")]
    Interrupted,
    #[error("failed to render compose file: {0}")]
    Compose(#[from] serde_yaml::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unexpected output from {tool}: {detail}")]
    Parse { tool: String, detail: String },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    /// Exit code to surface to the caller when the failure came from an
    /// external tool. `None` means "use the generic failure code".
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } | Self::ProvisioningFailed { code, .. } => Some(*code),
            Self::Interrupted => Some(EXIT_INTERRUPTED),
            _ => None,
        }
    }
}
