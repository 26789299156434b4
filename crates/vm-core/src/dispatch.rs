//! Verb dispatch onto a selected backend.

use crate::concurrency::ProjectLock;
use crate::context::Context;
use crate::lifecycle::validate_transition;
use crate::CoreError;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use vm_config::{load, ConfirmPrompt, LoadedConfig, Provider};
use vm_provider::{relative_to_project, Backend, Op, UnitSpec, UnitStatus, UnitSummary};

/// A project whose document was found, merged and validated without
/// blocking errors. Only a `Project` can reach a backend.
#[derive(Debug, Clone)]
pub struct Project {
    pub loaded: LoadedConfig,
    pub provider: Provider,
    pub spec: UnitSpec,
}

impl Project {
    /// Discover, merge and validate. Validation errors abort here.
    pub fn load(ctx: &Context, prompt: &dyn ConfirmPrompt) -> Result<Self, CoreError> {
        let loaded = load(&ctx.load_request(), prompt)?;
        loaded.report.ensure_valid()?;
        let provider = loaded.provider()?;
        let config = loaded.typed()?;
        let spec = UnitSpec {
            config,
            document: loaded.merged.clone(),
            project_dir: loaded.project_dir.clone(),
            home_dir: ctx.home_dir.clone(),
        };
        debug!("project {} uses {provider}", spec.config.project.name);
        Ok(Self {
            loaded,
            provider,
            spec,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.config.project.name
    }

    pub fn warnings(&self) -> &[String] {
        &self.loaded.report.warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Up,
    Ssh { command: Vec<String> },
    Halt,
    Destroy,
    Status,
    Reload,
    Provision,
    Logs { follow: bool },
    Exec { command: Vec<String> },
    Kill,
}

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Ssh { .. } => "ssh",
            Self::Halt => "halt",
            Self::Destroy => "destroy",
            Self::Status => "status",
            Self::Reload => "reload",
            Self::Provision => "provision",
            Self::Logs { .. } => "logs",
            Self::Exec { .. } => "exec",
            Self::Kill => "kill",
        }
    }

    /// Verbs that change the unit.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Up | Self::Halt | Self::Destroy | Self::Reload | Self::Provision | Self::Kill
        )
    }

    /// Mutating verbs serialized by the project lock. `kill` is exempt: it
    /// must reach the backend even while a stuck verb holds the lock.
    pub fn takes_lock(&self) -> bool {
        self.is_mutating() && !matches!(self, Self::Kill)
    }

    /// Backend primitives this verb expands to, in order.
    pub fn ops(&self) -> Vec<Op> {
        match self {
            Self::Up => vec![Op::Up],
            Self::Ssh { .. } => vec![Op::Ssh],
            Self::Halt => vec![Op::Halt],
            Self::Destroy => vec![Op::Destroy],
            Self::Status => vec![Op::Status],
            Self::Reload => vec![Op::Halt, Op::Up],
            Self::Provision => vec![Op::Provision],
            Self::Logs { .. } => vec![Op::Logs],
            Self::Exec { .. } => vec![Op::Exec],
            Self::Kill => vec![Op::Kill],
        }
    }

    /// Primitives that need the unit in a particular state first.
    fn needs_precheck(&self) -> bool {
        matches!(
            self,
            Self::Ssh { .. } | Self::Exec { .. } | Self::Provision | Self::Logs { .. }
        )
    }
}

/// What `--dry-run` prints instead of acting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub verb: String,
    pub provider: Provider,
    pub unit: String,
    pub project_dir: PathBuf,
    pub config_path: PathBuf,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Status(UnitStatus),
    Plan(Plan),
}

pub struct Dispatcher<'a> {
    ctx: &'a Context,
    backend: &'a dyn Backend,
}

impl<'a> Dispatcher<'a> {
    pub fn new(ctx: &'a Context, backend: &'a dyn Backend) -> Self {
        Self { ctx, backend }
    }

    pub fn plan(&self, project: &Project, verb: &Verb) -> Plan {
        let steps = verb
            .ops()
            .into_iter()
            .flat_map(|op| self.backend.plan(op, &project.spec))
            .collect();
        Plan {
            verb: verb.name().to_owned(),
            provider: self.backend.provider(),
            unit: project.spec.unit_name(),
            project_dir: project.spec.project_dir.clone(),
            config_path: project.loaded.doc_path.clone(),
            steps,
        }
    }

    pub fn run(&self, project: &Project, verb: &Verb) -> Result<Outcome, CoreError> {
        if self.ctx.dry_run {
            return Ok(Outcome::Plan(self.plan(project, verb)));
        }

        let _lock = if verb.takes_lock() {
            Some(ProjectLock::acquire(
                &self.ctx.state_dir,
                project.name(),
                verb.name(),
            )?)
        } else {
            None
        };

        let spec = &project.spec;
        if verb.needs_precheck() {
            self.require_state(spec, verb.ops()[0])?;
        }

        info!("{} {}", verb.name(), spec.unit_name());
        match verb {
            Verb::Up => self.backend.up(spec)?,
            Verb::Ssh { command } => {
                let relative = relative_to_project(&spec.project_dir, &self.ctx.cwd);
                self.backend.ssh(spec, &relative, command)?;
            }
            Verb::Halt => self.backend.halt(spec)?,
            Verb::Destroy => self.backend.destroy(spec)?,
            Verb::Status => return Ok(Outcome::Status(self.backend.status(spec)?)),
            Verb::Reload => {
                self.backend.halt(spec)?;
                self.backend.up(spec)?;
            }
            Verb::Provision => self.backend.provision(spec)?,
            Verb::Logs { follow } => self.backend.logs(spec, *follow)?,
            Verb::Exec { command } => self.backend.exec(spec, command)?,
            Verb::Kill => self.backend.kill(spec)?,
        }
        Ok(Outcome::Done)
    }

    /// Every unit this tool created on the backend. Needs no project.
    pub fn list(&self) -> Result<Vec<UnitSummary>, CoreError> {
        Ok(self.backend.list()?)
    }

    fn require_state(&self, spec: &UnitSpec, op: Op) -> Result<(), CoreError> {
        let status = self.backend.status(spec)?;
        validate_transition(&status.unit, status.state, op)
    }
}
