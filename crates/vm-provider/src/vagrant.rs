use crate::backend::{
    settle_kill, Backend, BackendOptions, Op, UnitSpec, UnitState, UnitStatus, UnitSummary,
};
use crate::exec::{self, describe, shell_join, shell_quote};
use crate::playbook::{
    provision_unit, start_services, wait_until_ready, TransientDocument, UnitShell,
    READINESS_ATTEMPTS, READINESS_INTERVAL,
};
use crate::prereq::{check_vagrant_prereqs, format_missing};
use crate::terminal;
use crate::workspace::translate_cwd;
use crate::BackendError;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};
use vm_config::Provider;

/// Vagrantfile location relative to the tool directory.
pub const VAGRANT_PROVIDER_DIR: &str = "providers/vagrant";
/// Per-project machine state, under the generated directory.
pub const MACHINE_STATE_DIR: &str = "vagrant";

pub struct VagrantBackend {
    options: BackendOptions,
}

impl VagrantBackend {
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }

    fn vagrant_dir(&self) -> PathBuf {
        self.options.tool_path(VAGRANT_PROVIDER_DIR)
    }

    fn machine_state_dir(spec: &UnitSpec) -> PathBuf {
        spec.generated_dir().join(MACHINE_STATE_DIR)
    }

    /// A `vagrant` invocation with the driver environment the Vagrantfile
    /// reads. `config` is the transient merged document for this command.
    fn vagrant(&self, spec: &UnitSpec, config: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new("vagrant");
        cmd.env("VAGRANT_CWD", self.vagrant_dir())
            .env("VAGRANT_DOTFILE_PATH", Self::machine_state_dir(spec))
            .env("VM_PROJECT_DIR", &spec.project_dir)
            .env("VM_CONFIG", config)
            .env("VM_DEBUG", if self.options.debug { "true" } else { "false" })
            .args(args);
        cmd
    }

    fn ssh_args(script: &str, tty: bool) -> Vec<String> {
        let mut args = vec!["ssh".to_owned(), "-c".to_owned(), script.to_owned()];
        if tty {
            args.extend(["--".to_owned(), "-t".to_owned()]);
        }
        args
    }

    fn session_script(dir: &str, command: &[String]) -> String {
        if command.is_empty() {
            format!("cd {} && exec bash -l", shell_quote(dir))
        } else {
            format!("cd {} && {}", shell_quote(dir), shell_join(command))
        }
    }

    fn logs_script(follow: bool) -> String {
        let mut script = "sudo journalctl --no-pager -n 200".to_owned();
        if follow {
            script.push_str(" -f");
        }
        script
    }

    fn with_ssh(&self, spec: &UnitSpec, config: &Path, script: &str, tty: bool) -> Command {
        let args = Self::ssh_args(script, tty);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.vagrant(spec, config, &refs)
    }

    fn machine_state(
        &self,
        spec: &UnitSpec,
        config: &Path,
    ) -> Result<(UnitState, Option<String>), BackendError> {
        let out = exec::capture_ok(&mut self.vagrant(
            spec,
            config,
            &["status", "--machine-readable"],
        ))?;
        let raw = parse_machine_state(&out).ok_or_else(|| BackendError::Parse {
            tool: "vagrant status".to_owned(),
            detail: "no state line in machine-readable output".to_owned(),
        })?;
        Ok((vagrant_state(&raw), Some(raw)))
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        let missing = check_vagrant_prereqs();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format_missing(&missing)))
        }
    }

    fn wait_ready(shell: &VagrantShell<'_>) -> Result<(), BackendError> {
        wait_until_ready(
            shell,
            READINESS_ATTEMPTS,
            READINESS_INTERVAL,
            &mut std::thread::sleep,
        )
    }
}

/// Runs scripts in the VM through `vagrant ssh`.
pub struct VagrantShell<'a> {
    backend: &'a VagrantBackend,
    spec: &'a UnitSpec,
    config: &'a Path,
    unit: String,
}

impl<'a> VagrantShell<'a> {
    fn new(backend: &'a VagrantBackend, spec: &'a UnitSpec, config: &'a Path) -> Self {
        Self {
            backend,
            spec,
            config,
            unit: spec.unit_name(),
        }
    }

    fn root_command(&self, script: &str) -> Command {
        let wrapped = format!("sudo bash -c {}", shell_quote(script));
        self.backend.with_ssh(self.spec, self.config, &wrapped, false)
    }
}

impl UnitShell for VagrantShell<'_> {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn is_ready(&self) -> bool {
        exec::probe(&mut self.backend.with_ssh(self.spec, self.config, "true", false))
    }

    fn run_root(&self, script: &str) -> Result<i32, BackendError> {
        exec::run_code(&mut self.root_command(script))
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackendError> {
        let local = local.to_string_lossy();
        exec::capture_ok(&mut self.backend.vagrant(
            self.spec,
            self.config,
            &["upload", local.as_ref(), remote],
        ))
        .map(drop)
    }

    fn start_service_script(&self, service: &str) -> String {
        format!("sudo systemctl start {service}")
    }
}

/// State field from `vagrant status --machine-readable`
/// (`timestamp,target,state,<value>`).
pub fn parse_machine_state(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.splitn(4, ',').skip(2);
        if fields.next()? != "state" {
            return None;
        }
        fields.next().map(|s| s.trim().to_owned())
    })
}

pub fn vagrant_state(raw: &str) -> UnitState {
    match raw {
        "running" => UnitState::Running,
        "not_created" => UnitState::Absent,
        "poweroff" | "saved" | "aborted" | "shutoff" | "stopped" | "paused" | "suspended" => {
            UnitState::Stopped
        }
        _ => UnitState::Created,
    }
}

/// Rows of `vagrant global-status` whose directory is `vagrant_dir`.
pub fn parse_global_status(output: &str, vagrant_dir: &Path) -> Vec<UnitSummary> {
    let dir = vagrant_dir.to_string_lossy();
    output
        .lines()
        .skip_while(|line| !line.starts_with("---"))
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 5 || tokens[tokens.len() - 1] != dir {
                return None;
            }
            Some(UnitSummary {
                name: format!("{} ({})", tokens[1], tokens[0]),
                project: None,
                state: tokens[3..tokens.len() - 1].join(" "),
            })
        })
        .collect()
}

impl Backend for VagrantBackend {
    fn provider(&self) -> Provider {
        Provider::Vagrant
    }

    fn available(&self) -> bool {
        check_vagrant_prereqs().is_empty()
    }

    fn up(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.ensure_available()?;
        let doc = TransientDocument::write(&spec.document)?;
        let unit = spec.unit_name();
        let (state, _) = self.machine_state(spec, doc.path())?;
        if state == UnitState::Running {
            info!("{unit} is already running");
            return Ok(());
        }

        fs::create_dir_all(spec.generated_dir())?;
        exec::run(&mut self.vagrant(spec, doc.path(), &["up", "--no-provision"]))?;
        let shell = VagrantShell::new(self, spec, doc.path());
        Self::wait_ready(&shell)?;

        if state == UnitState::Absent {
            provision_unit(&shell, spec, self.options.debug, Utc::now())
        } else {
            start_services(&shell, &spec.config);
            Ok(())
        }
    }

    fn ssh(
        &self,
        spec: &UnitSpec,
        relative_cwd: &Path,
        command: &[String],
    ) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        let dir = translate_cwd(&spec.config.project.workspace_path, relative_cwd);
        let script = Self::session_script(&dir, command);
        if !command.is_empty() {
            return exec::run(&mut self.with_ssh(spec, doc.path(), &script, false));
        }

        let unit = spec.unit_name();
        let tty = terminal::stdin_is_terminal();
        let mut cmd = self.with_ssh(spec, doc.path(), &script, tty);
        terminal::emit_session_push(&unit, &spec.config.project.hostname);
        terminal::print_session_banner(&unit, &dir);
        let result = exec::run_attached(&mut cmd, &self.options.terminate);
        terminal::emit_session_pop();
        terminal::print_session_exit(&unit);
        result
    }

    fn halt(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        exec::run(&mut self.vagrant(spec, doc.path(), &["halt"]))
    }

    fn destroy(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        exec::run(&mut self.vagrant(spec, doc.path(), &["destroy", "-f"]))?;

        let state_dir = Self::machine_state_dir(spec);
        if state_dir.exists() {
            debug!("removing {}", state_dir.display());
            fs::remove_dir_all(&state_dir)?;
        }
        // Only succeeds when nothing else was generated.
        let _ = fs::remove_dir(spec.generated_dir());
        Ok(())
    }

    fn status(&self, spec: &UnitSpec) -> Result<UnitStatus, BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        let (state, detail) = self.machine_state(spec, doc.path())?;
        Ok(UnitStatus {
            unit: spec.unit_name(),
            provider: Provider::Vagrant,
            state,
            detail,
        })
    }

    fn provision(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        let shell = VagrantShell::new(self, spec, doc.path());
        provision_unit(&shell, spec, self.options.debug, Utc::now())
    }

    fn logs(&self, spec: &UnitSpec, follow: bool) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        exec::run(&mut self.with_ssh(spec, doc.path(), &Self::logs_script(follow), follow))
    }

    fn exec(&self, spec: &UnitSpec, command: &[String]) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        let script = Self::session_script(&spec.config.project.workspace_path, command);
        exec::run(&mut self.with_ssh(spec, doc.path(), &script, false))
    }

    fn kill(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let doc = TransientDocument::write(&spec.document)?;
        let unit = spec.unit_name();
        let attempt =
            exec::capture_ok(&mut self.vagrant(spec, doc.path(), &["halt", "--force"])).map(drop);
        settle_kill(&unit, attempt, || Ok(self.machine_state(spec, doc.path())?.0))
    }

    fn list(&self) -> Result<Vec<UnitSummary>, BackendError> {
        let out = exec::capture_ok(Command::new("vagrant").arg("global-status"))?;
        Ok(parse_global_status(&out, &self.vagrant_dir()))
    }

    fn plan(&self, op: Op, spec: &UnitSpec) -> Vec<String> {
        let config = Path::new("<transient vm-config.json>");
        let ws = &spec.config.project.workspace_path;
        let show = |args: &[&str]| describe(&self.vagrant(spec, config, args));
        match op {
            Op::Up => vec![
                show(&["up", "--no-provision"]),
                format!(
                    "wait for {} ({READINESS_ATTEMPTS} x {}s)",
                    spec.unit_name(),
                    READINESS_INTERVAL.as_secs()
                ),
                "provision with the shared playbook".to_owned(),
            ],
            Op::Ssh => vec![describe(&self.with_ssh(
                spec,
                config,
                &Self::session_script(ws, &[]),
                true,
            ))],
            Op::Halt => vec![show(&["halt"])],
            Op::Destroy => vec![
                show(&["destroy", "-f"]),
                format!("remove {}", Self::machine_state_dir(spec).display()),
            ],
            Op::Status => vec![show(&["status", "--machine-readable"])],
            Op::Provision => vec!["provision with the shared playbook".to_owned()],
            Op::Logs => vec![describe(&self.with_ssh(
                spec,
                config,
                &Self::logs_script(false),
                false,
            ))],
            Op::Exec => vec![describe(&self.with_ssh(
                spec,
                config,
                &Self::session_script(ws, &[]),
                false,
            ))],
            Op::Kill => vec![show(&["halt", "--force"])],
            Op::List => vec!["vagrant global-status".to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::spec;
    use std::ffi::OsStr;

    fn backend() -> VagrantBackend {
        VagrantBackend::new(BackendOptions::new("/opt/vm"))
    }

    fn env_of<'a>(cmd: &'a Command, key: &str) -> Option<&'a OsStr> {
        cmd.get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v)
    }

    #[test]
    fn driver_environment_is_injected() {
        let spec = spec(Path::new("/src/demo"));
        let cmd = backend().vagrant(&spec, Path::new("/tmp/cfg.json"), &["status"]);
        assert_eq!(
            env_of(&cmd, "VAGRANT_CWD"),
            Some(OsStr::new("/opt/vm/providers/vagrant"))
        );
        assert_eq!(
            env_of(&cmd, "VAGRANT_DOTFILE_PATH"),
            Some(OsStr::new("/src/demo/.vm/vagrant"))
        );
        assert_eq!(env_of(&cmd, "VM_PROJECT_DIR"), Some(OsStr::new("/src/demo")));
        assert_eq!(env_of(&cmd, "VM_CONFIG"), Some(OsStr::new("/tmp/cfg.json")));
        assert_eq!(env_of(&cmd, "VM_DEBUG"), Some(OsStr::new("false")));
    }

    #[test]
    fn session_scripts_cd_into_translated_dir() {
        assert_eq!(
            VagrantBackend::session_script("/workspace/src", &[]),
            "cd /workspace/src && exec bash -l"
        );
        assert_eq!(
            VagrantBackend::session_script("/work space", &["ls".to_owned()]),
            "cd '/work space' && ls"
        );
    }

    #[test]
    fn interactive_ssh_requests_tty() {
        assert_eq!(
            VagrantBackend::ssh_args("true", true),
            vec!["ssh", "-c", "true", "--", "-t"]
        );
        assert_eq!(VagrantBackend::ssh_args("true", false), vec!["ssh", "-c", "true"]);
    }

    #[test]
    fn root_scripts_run_under_sudo() {
        let spec = spec(Path::new("/src/demo"));
        let backend = backend();
        let shell = VagrantShell::new(&backend, &spec, Path::new("/tmp/cfg.json"));
        let cmd = shell.root_command("chown a:a /tmp/x");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["ssh", "-c", "sudo bash -c 'chown a:a /tmp/x'"]);
        assert_eq!(
            shell.start_service_script("postgresql"),
            "sudo systemctl start postgresql"
        );
    }

    #[test]
    fn parses_machine_readable_state() {
        let out = "1700000000,default,metadata,provider,virtualbox\n\
                   1700000000,default,provider-name,virtualbox\n\
                   1700000000,default,state,poweroff\n\
                   1700000000,default,state-human-short,poweroff\n";
        assert_eq!(parse_machine_state(out).as_deref(), Some("poweroff"));
        assert_eq!(parse_machine_state("garbage"), None);
    }

    #[test]
    fn maps_vagrant_states() {
        assert_eq!(vagrant_state("running"), UnitState::Running);
        assert_eq!(vagrant_state("not_created"), UnitState::Absent);
        assert_eq!(vagrant_state("saved"), UnitState::Stopped);
        assert_eq!(vagrant_state("preparing"), UnitState::Created);
    }

    #[test]
    fn global_status_keeps_only_our_machines() {
        let out = "\
id       name    provider   state    directory
--------------------------------------------------------------------
a1b2c3d  default virtualbox running  /opt/vm/providers/vagrant
e4f5g6h  default virtualbox poweroff /home/alice/other
9z8y7x6  default virtualbox poweroff /opt/vm/providers/vagrant

The above shows information about all known Vagrant environments
";
        let rows = parse_global_status(out, Path::new("/opt/vm/providers/vagrant"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "default (a1b2c3d)");
        assert_eq!(rows[0].state, "running");
        assert_eq!(rows[1].state, "poweroff");
    }

    #[test]
    fn destroy_plan_removes_machine_state() {
        let plan = backend().plan(Op::Destroy, &spec(Path::new("/src/demo")));
        assert!(plan[0].ends_with("vagrant destroy -f"));
        assert_eq!(plan[1], "remove /src/demo/.vm/vagrant");
    }
}
