use crate::BackendError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;
use vm_config::{Provider, VmConfig};

/// Directory under the project root holding generated, disposable
/// descriptors (compose file, Vagrant machine state).
pub const GENERATED_DIR: &str = ".vm";

/// Everything a backend needs to act on one project's unit.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub config: VmConfig,
    /// The merged document, forwarded to the playbook as-is.
    pub document: Value,
    pub project_dir: PathBuf,
    /// Host home directory, for the optional AI-tool sync mounts.
    pub home_dir: Option<PathBuf>,
}

impl UnitSpec {
    pub fn unit_name(&self) -> String {
        self.config.unit_name()
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.project_dir.join(GENERATED_DIR)
    }
}

/// Process-wide settings shared by every call on a backend.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Installation root holding `providers/` and `shared/`.
    pub tool_dir: PathBuf,
    pub debug: bool,
    /// Raised by the interrupt handler to end an attached session.
    pub terminate: Arc<AtomicBool>,
}

impl BackendOptions {
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            debug: false,
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tool_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.tool_dir.join(rel)
    }
}

/// Backend primitives. `reload` is deliberately absent: the dispatcher
/// composes it from `Halt` and `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Up,
    Ssh,
    Halt,
    Destroy,
    Status,
    Provision,
    Logs,
    Exec,
    Kill,
    List,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Ssh => "ssh",
            Self::Halt => "halt",
            Self::Destroy => "destroy",
            Self::Status => "status",
            Self::Provision => "provision",
            Self::Logs => "logs",
            Self::Exec => "exec",
            Self::Kill => "kill",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Absent,
    Created,
    Running,
    Stopped,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub unit: String,
    pub provider: Provider,
    pub state: UnitState,
    /// Raw state string from the underlying tool.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub name: String,
    pub project: Option<String>,
    pub state: String,
}

pub trait Backend: Send + Sync {
    fn provider(&self) -> Provider;

    fn available(&self) -> bool;

    /// Create (first time) or start the unit. First creation provisions it.
    fn up(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    /// Interactive shell, or one non-interactive command when `command` is
    /// non-empty. `relative_cwd` is relative to the project root.
    fn ssh(
        &self,
        spec: &UnitSpec,
        relative_cwd: &Path,
        command: &[String],
    ) -> Result<(), BackendError>;

    fn halt(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    /// Remove the unit and every generated descriptor.
    fn destroy(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    fn status(&self, spec: &UnitSpec) -> Result<UnitStatus, BackendError>;

    /// Re-run the shared playbook in a running unit.
    fn provision(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    fn logs(&self, spec: &UnitSpec, follow: bool) -> Result<(), BackendError>;

    /// Run `command` in the workspace root without a login shell prompt.
    fn exec(&self, spec: &UnitSpec, command: &[String]) -> Result<(), BackendError>;

    /// Forced stop. Succeeds when the unit is already gone.
    fn kill(&self, spec: &UnitSpec) -> Result<(), BackendError>;

    /// Every unit this tool created on this backend.
    fn list(&self) -> Result<Vec<UnitSummary>, BackendError>;

    /// Commands `op` would run, for `--dry-run`.
    fn plan(&self, op: Op, spec: &UnitSpec) -> Vec<String>;
}

/// Outcome of a forced stop. The kill has already been attempted; `state`
/// is only consulted when it failed, and a unit that is no longer running
/// counts as stopped. If the state cannot be read either, the kill error
/// stands.
pub(crate) fn settle_kill(
    unit: &str,
    attempt: Result<(), BackendError>,
    state: impl FnOnce() -> Result<UnitState, BackendError>,
) -> Result<(), BackendError> {
    let Err(e) = attempt else {
        return Ok(());
    };
    match state() {
        Ok(UnitState::Running) | Err(_) => Err(e),
        Ok(other) => {
            warn!("kill reported an error but {unit} is {other}: {e}");
            Ok(())
        }
    }
}

pub fn select_backend(provider: Provider, options: &BackendOptions) -> Box<dyn Backend> {
    match provider {
        Provider::Docker => Box::new(crate::docker::DockerBackend::new(options.clone())),
        Provider::Vagrant => Box::new(crate::vagrant::VagrantBackend::new(options.clone())),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::json;
    use vm_config::{default_document, merge};

    pub fn spec_with(project_dir: &Path, overlay: &Value) -> UnitSpec {
        let mut base = json!({"project": {"name": "demo", "hostname": "dev.demo.local"}});
        vm_config::merge_into(&mut base, overlay);
        let document = merge(default_document(), &base);
        UnitSpec {
            config: VmConfig::from_value(&document).unwrap(),
            document,
            project_dir: project_dir.to_path_buf(),
            home_dir: Some(PathBuf::from("/home/alice")),
        }
    }

    pub fn spec(project_dir: &Path) -> UnitSpec {
        spec_with(project_dir, &json!({}))
    }
}
