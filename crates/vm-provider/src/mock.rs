//! In-memory backend that records every primitive it is asked to run.

use crate::backend::{Backend, Op, UnitSpec, UnitState, UnitStatus, UnitSummary};
use crate::BackendError;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use vm_config::Provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub unit: Option<String>,
    /// ssh: translated cwd; exec/ssh: joined command.
    pub detail: Option<String>,
}

impl Call {
    pub fn new(op: Op, unit: &str) -> Self {
        Self {
            op,
            unit: Some(unit.to_owned()),
            detail: None,
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    units: BTreeMap<String, UnitState>,
    provisioned: BTreeMap<String, u32>,
    failing: HashSet<Op>,
}

/// Follows the unit lifecycle (`absent → created → running ⇄ stopped`)
/// without touching the host.
pub struct MockBackend {
    provider: Provider,
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Provider::Docker)
    }
}

impl MockBackend {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: Mutex::new(MockState::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, BackendError> {
        self.state
            .lock()
            .map_err(|e| BackendError::Unavailable(format!("mock state poisoned: {e}")))
    }

    /// Make every later call of `op` fail with exit code 1.
    pub fn fail_on(&self, op: Op) {
        if let Ok(mut state) = self.lock() {
            state.failing.insert(op);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.lock() {
            state.calls.clear();
        }
    }

    pub fn set_state(&self, unit: &str, unit_state: UnitState) {
        if let Ok(mut state) = self.lock() {
            state.units.insert(unit.to_owned(), unit_state);
        }
    }

    pub fn state_of(&self, unit: &str) -> UnitState {
        self.lock()
            .ok()
            .and_then(|s| s.units.get(unit).copied())
            .unwrap_or(UnitState::Absent)
    }

    /// Times the playbook ran for `unit`.
    pub fn provision_count(&self, unit: &str) -> u32 {
        self.lock()
            .ok()
            .and_then(|s| s.provisioned.get(unit).copied())
            .unwrap_or(0)
    }

    /// Record the call and apply `transition` to the unit's state.
    fn record(
        &self,
        call: Call,
        transition: impl FnOnce(&mut MockState, &str) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let op = call.op;
        let unit = call.unit.clone().unwrap_or_default();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(BackendError::CommandFailed {
                command: format!("mock {op} {unit}"),
                code: 1,
            });
        }
        transition(&mut state, &unit)
    }
}

fn current(state: &MockState, unit: &str) -> UnitState {
    state.units.get(unit).copied().unwrap_or(UnitState::Absent)
}

fn require_running(state: &MockState, unit: &str) -> Result<(), BackendError> {
    if current(state, unit) == UnitState::Running {
        Ok(())
    } else {
        Err(BackendError::NotRunning(unit.to_owned()))
    }
}

impl Backend for MockBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn available(&self) -> bool {
        true
    }

    fn up(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.record(Call::new(Op::Up, &spec.unit_name()), |state, unit| {
            if current(state, unit) == UnitState::Absent {
                *state.provisioned.entry(unit.to_owned()).or_default() += 1;
            }
            state.units.insert(unit.to_owned(), UnitState::Running);
            Ok(())
        })
    }

    fn ssh(
        &self,
        spec: &UnitSpec,
        relative_cwd: &Path,
        command: &[String],
    ) -> Result<(), BackendError> {
        let dir = crate::workspace::translate_cwd(
            &spec.config.project.workspace_path,
            relative_cwd,
        );
        let call = Call {
            op: Op::Ssh,
            unit: Some(spec.unit_name()),
            detail: Some(if command.is_empty() {
                dir
            } else {
                format!("{dir}: {}", command.join(" "))
            }),
        };
        self.record(call, |state, unit| require_running(state, unit))
    }

    fn halt(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.record(Call::new(Op::Halt, &spec.unit_name()), |state, unit| {
            match current(state, unit) {
                UnitState::Absent => Err(BackendError::NotCreated(unit.to_owned())),
                _ => {
                    state.units.insert(unit.to_owned(), UnitState::Stopped);
                    Ok(())
                }
            }
        })
    }

    fn destroy(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.record(Call::new(Op::Destroy, &spec.unit_name()), |state, unit| {
            state.units.remove(unit);
            Ok(())
        })
    }

    fn status(&self, spec: &UnitSpec) -> Result<UnitStatus, BackendError> {
        let unit = spec.unit_name();
        self.record(Call::new(Op::Status, &unit), |_, _| Ok(()))?;
        Ok(UnitStatus {
            provider: self.provider,
            state: self.state_of(&unit),
            detail: None,
            unit,
        })
    }

    fn provision(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.record(Call::new(Op::Provision, &spec.unit_name()), |state, unit| {
            require_running(state, unit)?;
            *state.provisioned.entry(unit.to_owned()).or_default() += 1;
            Ok(())
        })
    }

    fn logs(&self, spec: &UnitSpec, _follow: bool) -> Result<(), BackendError> {
        self.record(Call::new(Op::Logs, &spec.unit_name()), |state, unit| {
            match current(state, unit) {
                UnitState::Absent => Err(BackendError::NotCreated(unit.to_owned())),
                _ => Ok(()),
            }
        })
    }

    fn exec(&self, spec: &UnitSpec, command: &[String]) -> Result<(), BackendError> {
        let call = Call {
            op: Op::Exec,
            unit: Some(spec.unit_name()),
            detail: Some(command.join(" ")),
        };
        self.record(call, |state, unit| require_running(state, unit))
    }

    fn kill(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.record(Call::new(Op::Kill, &spec.unit_name()), |state, unit| {
            if current(state, unit) != UnitState::Absent {
                state.units.insert(unit.to_owned(), UnitState::Stopped);
            }
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<UnitSummary>, BackendError> {
        let call = Call {
            op: Op::List,
            unit: None,
            detail: None,
        };
        self.record(call, |_, _| Ok(()))?;
        let state = self.lock()?;
        Ok(state
            .units
            .iter()
            .map(|(name, unit_state)| UnitSummary {
                name: name.clone(),
                project: name.strip_suffix("-dev").map(str::to_owned),
                state: unit_state.to_string(),
            })
            .collect())
    }

    fn plan(&self, op: Op, spec: &UnitSpec) -> Vec<String> {
        vec![format!("mock {op} {}", spec.unit_name())]
    }
}
