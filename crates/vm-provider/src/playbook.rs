//! The provisioning sequence both backends share.
//!
//! A backend only has to provide a `UnitShell`: a way to run a script as
//! root inside its unit and to copy a file in. Everything after "the unit
//! accepts commands" is identical across Docker and Vagrant.

use crate::backend::UnitSpec;
use crate::exec::shell_quote;
use crate::BackendError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use vm_config::VmConfig;

/// Where the tool directory is visible inside every unit.
pub const TOOL_MOUNT: &str = "/vm-tool";
pub const PLAYBOOK_PATH: &str = "/vm-tool/shared/ansible/playbook.yml";
/// Where the merged document is copied inside the unit.
pub const CONFIG_PATH_IN_UNIT: &str = "/tmp/vm-config.json";

pub const READINESS_ATTEMPTS: u32 = 30;
pub const READINESS_INTERVAL: Duration = Duration::from_secs(2);

pub trait UnitShell {
    fn unit(&self) -> &str;

    /// Non-interactive probe: does the unit accept commands yet?
    fn is_ready(&self) -> bool;

    /// Run a bash script as root inside the unit with inherited stdio and
    /// return its exit code.
    fn run_root(&self, script: &str) -> Result<i32, BackendError>;

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackendError>;

    /// Script that starts one service under the unit's service manager.
    fn start_service_script(&self, service: &str) -> String;
}

/// A serialized copy of the merged document that lives only as long as
/// this value.
pub struct TransientDocument {
    file: NamedTempFile,
}

impl TransientDocument {
    pub fn write(doc: &Value) -> Result<Self, BackendError> {
        let mut file = tempfile::Builder::new()
            .prefix("vm-config-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(&mut file, doc)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

pub fn provision_log_path(now: DateTime<Utc>) -> String {
    format!("/tmp/vm-provision-{}.log", now.format("%Y%m%dT%H%M%SZ"))
}

pub fn playbook_command(debug: bool) -> String {
    let mut cmd = format!(
        "ansible-playbook -i localhost, -c local {PLAYBOOK_PATH} -e config_file={CONFIG_PATH_IN_UNIT}"
    );
    if debug {
        cmd.push_str(" -vvv");
    }
    cmd
}

/// Playbook run that keeps a log in the unit and still fails with the
/// playbook's own exit code.
pub fn provision_script(log_path: &str, debug: bool) -> String {
    format!(
        "set -o pipefail; {} 2>&1 | tee {}",
        playbook_command(debug),
        shell_quote(log_path)
    )
}

pub fn ownership_script(user: &str) -> String {
    let user = shell_quote(user);
    format!(
        "chown {user}:{user} {CONFIG_PATH_IN_UNIT} && if [ -d /home/{user} ]; then chown -R {user}:{user} /home/{user}; fi"
    )
}

/// Service-manager unit for a document service, if it runs a daemon.
pub fn service_unit(service: &str) -> Option<&'static str> {
    match service {
        "postgresql" => Some("postgresql"),
        "redis" => Some("redis-server"),
        "mongodb" => Some("mongod"),
        "docker" => Some("docker"),
        _ => None,
    }
}

/// Poll `is_ready` up to `attempts` times, sleeping `interval` in between.
pub fn wait_until_ready(
    shell: &dyn UnitShell,
    attempts: u32,
    interval: Duration,
    sleep: &mut dyn FnMut(Duration),
) -> Result<(), BackendError> {
    for attempt in 1..=attempts {
        if shell.is_ready() {
            debug!("{} ready after {attempt} attempt(s)", shell.unit());
            return Ok(());
        }
        if attempt < attempts {
            sleep(interval);
        }
    }
    Err(BackendError::NotReady {
        unit: shell.unit().to_owned(),
        attempts,
    })
}

/// Copy the document in, fix ownership, run the playbook, start services.
///
/// A playbook failure leaves the unit as it is and reports where the log
/// was written.
pub fn provision_unit(
    shell: &dyn UnitShell,
    spec: &UnitSpec,
    debug: bool,
    now: DateTime<Utc>,
) -> Result<(), BackendError> {
    {
        let doc = TransientDocument::write(&spec.document)?;
        shell.copy_in(doc.path(), CONFIG_PATH_IN_UNIT)?;
    }

    let code = shell.run_root(&ownership_script(&spec.config.vm.user))?;
    if code != 0 {
        warn!("fixing ownership in {} exited with {code}", shell.unit());
    }

    let log_path = provision_log_path(now);
    info!("provisioning {} (log: {log_path})", shell.unit());
    let code = shell.run_root(&provision_script(&log_path, debug))?;
    if code != 0 {
        return Err(BackendError::ProvisioningFailed {
            code,
            hint: format!("vm exec cat {log_path}"),
            log_path,
        });
    }

    start_services(shell, &spec.config);
    Ok(())
}

/// Start every enabled service. Failures are reported, never fatal.
pub fn start_services(shell: &dyn UnitShell, config: &VmConfig) {
    for service in config.enabled_services() {
        let Some(unit) = service_unit(service) else {
            continue;
        };
        match shell.run_root(&shell.start_service_script(unit)) {
            Ok(0) => debug!("started {unit}"),
            Ok(code) => warn!("starting {unit} exited with {code}"),
            Err(e) => warn!("starting {unit} failed: {e}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Records scripts and answers readiness after `ready_after` probes.
    pub struct FakeShell {
        pub scripts: RefCell<Vec<String>>,
        pub copies: RefCell<Vec<(String, String)>>,
        pub probes: Cell<u32>,
        pub ready_after: u32,
        pub fail_matching: Option<(&'static str, i32)>,
    }

    impl FakeShell {
        pub fn new() -> Self {
            Self {
                scripts: RefCell::new(Vec::new()),
                copies: RefCell::new(Vec::new()),
                probes: Cell::new(0),
                ready_after: 1,
                fail_matching: None,
            }
        }
    }

    impl UnitShell for FakeShell {
        fn unit(&self) -> &str {
            "demo-dev"
        }

        fn is_ready(&self) -> bool {
            self.probes.set(self.probes.get() + 1);
            self.probes.get() >= self.ready_after
        }

        fn run_root(&self, script: &str) -> Result<i32, BackendError> {
            self.scripts.borrow_mut().push(script.to_owned());
            Ok(match self.fail_matching {
                Some((needle, code)) if script.contains(needle) => code,
                _ => 0,
            })
        }

        fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackendError> {
            let content = std::fs::read_to_string(local)?;
            self.copies.borrow_mut().push((content, remote.to_owned()));
            Ok(())
        }

        fn start_service_script(&self, service: &str) -> String {
            format!("svc start {service}")
        }
    }
}
