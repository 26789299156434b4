use crate::backend::{
    settle_kill, Backend, BackendOptions, Op, UnitSpec, UnitState, UnitStatus, UnitSummary,
};
use crate::compose::{compose_path, remove_generated, ComposeArtifact, PROJECT_LABEL};
use crate::exec::{self, describe, shell_join};
use crate::playbook::{
    provision_unit, start_services, wait_until_ready, UnitShell, READINESS_ATTEMPTS,
    READINESS_INTERVAL,
};
use crate::prereq::{check_docker_prereqs, format_missing};
use crate::terminal;
use crate::workspace::translate_cwd;
use crate::BackendError;
use chrono::Utc;
use std::path::Path;
use std::process::Command;
use tracing::info;
use vm_config::Provider;

pub struct DockerBackend {
    options: BackendOptions,
}

impl DockerBackend {
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }

    fn docker() -> Command {
        Command::new("docker")
    }

    fn compose_command(compose_file: &Path, unit: &str, args: &[&str]) -> Command {
        let mut cmd = Self::docker();
        cmd.arg("compose")
            .arg("-f")
            .arg(compose_file)
            .args(["-p", unit])
            .args(args);
        cmd
    }

    fn compose_up_command(spec: &UnitSpec) -> Command {
        Self::compose_command(&compose_path(spec), &spec.unit_name(), &["up", "-d", "--build"])
    }

    fn compose_down_command(spec: &UnitSpec) -> Command {
        let mut args = vec!["down", "--rmi", "local"];
        if !spec.config.persist_databases {
            args.push("--volumes");
        }
        Self::compose_command(&compose_path(spec), &spec.unit_name(), &args)
    }

    fn session_command(spec: &UnitSpec, dir: &str, command: &[String], tty: bool) -> Command {
        let mut cmd = Self::docker();
        cmd.arg("exec");
        if command.is_empty() {
            cmd.arg(if tty { "-it" } else { "-i" });
        }
        cmd.args(["-u", spec.config.vm.user.as_str(), "-w", dir])
            .arg(spec.unit_name());
        if command.is_empty() {
            cmd.args(["bash", "-l"]);
        } else {
            cmd.args(["bash", "-lc", shell_join(command).as_str()]);
        }
        cmd
    }

    fn exec_command(spec: &UnitSpec, command: &[String]) -> Command {
        let mut cmd = Self::docker();
        cmd.args([
            "exec",
            "-u",
            spec.config.vm.user.as_str(),
            "-w",
            spec.config.project.workspace_path.as_str(),
        ])
        .arg(spec.unit_name())
        .args(command);
        cmd
    }

    fn logs_command(spec: &UnitSpec, follow: bool) -> Command {
        let mut cmd = Self::docker();
        cmd.args(["logs", "--tail", "200"]);
        if follow {
            cmd.arg("-f");
        }
        cmd.arg(spec.unit_name());
        cmd
    }

    fn simple(verb: &str, spec: &UnitSpec) -> Command {
        let mut cmd = Self::docker();
        cmd.arg(verb).arg(spec.unit_name());
        cmd
    }

    fn inspect_command(unit: &str) -> Command {
        let mut cmd = Self::docker();
        cmd.args(["inspect", "-f", "{{.State.Status}}", unit]);
        cmd
    }

    fn list_command() -> Command {
        let mut cmd = Self::docker();
        cmd.args([
            "ps",
            "-a",
            "--filter",
            format!("label={PROJECT_LABEL}").as_str(),
            "--format",
            format!("{{{{.Names}}}}\t{{{{.State}}}}\t{{{{.Label \"{PROJECT_LABEL}\"}}}}").as_str(),
        ]);
        cmd
    }

    fn unit_state(unit: &str) -> Result<(UnitState, Option<String>), BackendError> {
        let output = exec::capture(&mut Self::inspect_command(unit))?;
        if output.status.success() {
            let raw = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            return Ok((parse_container_state(&raw), Some(raw)));
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains("no such object") || stderr.contains("no such container") {
            return Ok((UnitState::Absent, None));
        }
        Err(BackendError::CommandFailed {
            command: describe(&Self::inspect_command(unit)),
            code: output.status.code().unwrap_or(1),
        })
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        let missing = check_docker_prereqs();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format_missing(&missing)))
        }
    }

    fn shell(&self, spec: &UnitSpec) -> DockerShell {
        DockerShell {
            unit: spec.unit_name(),
        }
    }

    fn wait_ready(&self, shell: &DockerShell) -> Result<(), BackendError> {
        wait_until_ready(
            shell,
            READINESS_ATTEMPTS,
            READINESS_INTERVAL,
            &mut std::thread::sleep,
        )
    }

    fn create(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let artifact = ComposeArtifact::write(spec, &self.options)?;
        info!("building {} from {}", spec.unit_name(), artifact.path().display());
        exec::run(&mut Self::compose_up_command(spec))?;

        let shell = self.shell(spec);
        self.wait_ready(&shell)?;
        // The compose file is only needed to create the container.
        drop(artifact);
        provision_unit(&shell, spec, self.options.debug, Utc::now())
    }
}

/// Runs scripts in a container through `docker exec`.
pub struct DockerShell {
    unit: String,
}

impl DockerShell {
    fn root_command(&self, script: &str) -> Command {
        let mut cmd = Command::new("docker");
        cmd.args(["exec", "-u", "root", self.unit.as_str(), "bash", "-c", script]);
        cmd
    }
}

impl UnitShell for DockerShell {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn is_ready(&self) -> bool {
        exec::probe(Command::new("docker").args(["exec", self.unit.as_str(), "true"]))
    }

    fn run_root(&self, script: &str) -> Result<i32, BackendError> {
        exec::run_code(&mut self.root_command(script))
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), BackendError> {
        let mut cmd = Command::new("docker");
        cmd.arg("cp")
            .arg(local)
            .arg(format!("{}:{remote}", self.unit));
        exec::capture_ok(&mut cmd).map(drop)
    }

    fn start_service_script(&self, service: &str) -> String {
        format!("supervisorctl start {service}")
    }
}

/// Map `docker inspect` state strings onto the lifecycle states.
pub fn parse_container_state(raw: &str) -> UnitState {
    match raw {
        "running" | "restarting" => UnitState::Running,
        "created" => UnitState::Created,
        _ => UnitState::Stopped,
    }
}

/// Parse `docker ps` rows produced by the list format string.
pub fn parse_container_list(output: &str) -> Vec<UnitSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default().trim().to_owned();
            let state = fields.next().unwrap_or_default().trim().to_owned();
            let project = fields
                .next()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned);
            UnitSummary {
                name,
                project,
                state,
            }
        })
        .collect()
}

impl Backend for DockerBackend {
    fn provider(&self) -> Provider {
        Provider::Docker
    }

    fn available(&self) -> bool {
        check_docker_prereqs().is_empty()
    }

    fn up(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        self.ensure_available()?;
        let unit = spec.unit_name();
        match Self::unit_state(&unit)?.0 {
            UnitState::Running => {
                info!("{unit} is already running");
                Ok(())
            }
            UnitState::Created | UnitState::Stopped => {
                exec::run(&mut Self::simple("start", spec))?;
                let shell = self.shell(spec);
                self.wait_ready(&shell)?;
                start_services(&shell, &spec.config);
                Ok(())
            }
            UnitState::Absent => self.create(spec),
        }
    }

    fn ssh(
        &self,
        spec: &UnitSpec,
        relative_cwd: &Path,
        command: &[String],
    ) -> Result<(), BackendError> {
        let dir = translate_cwd(&spec.config.project.workspace_path, relative_cwd);
        let tty = terminal::stdin_is_terminal();
        let mut cmd = Self::session_command(spec, &dir, command, tty);
        if !command.is_empty() {
            return exec::run(&mut cmd);
        }

        let unit = spec.unit_name();
        terminal::emit_session_push(&unit, &spec.config.project.hostname);
        terminal::print_session_banner(&unit, &dir);
        let result = exec::run_attached(&mut cmd, &self.options.terminate);
        terminal::emit_session_pop();
        terminal::print_session_exit(&unit);
        result
    }

    fn halt(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        exec::run(&mut Self::simple("stop", spec))
    }

    fn destroy(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let artifact = ComposeArtifact::write(spec, &self.options)?;
        exec::run(&mut Self::compose_down_command(spec))?;
        drop(artifact);
        remove_generated(&compose_path(spec));
        Ok(())
    }

    fn status(&self, spec: &UnitSpec) -> Result<UnitStatus, BackendError> {
        let unit = spec.unit_name();
        let (state, detail) = Self::unit_state(&unit)?;
        Ok(UnitStatus {
            unit,
            provider: Provider::Docker,
            state,
            detail,
        })
    }

    fn provision(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        provision_unit(&self.shell(spec), spec, self.options.debug, Utc::now())
    }

    fn logs(&self, spec: &UnitSpec, follow: bool) -> Result<(), BackendError> {
        exec::run(&mut Self::logs_command(spec, follow))
    }

    fn exec(&self, spec: &UnitSpec, command: &[String]) -> Result<(), BackendError> {
        exec::run(&mut Self::exec_command(spec, command))
    }

    fn kill(&self, spec: &UnitSpec) -> Result<(), BackendError> {
        let unit = spec.unit_name();
        let attempt = exec::capture_ok(&mut Self::simple("kill", spec)).map(drop);
        settle_kill(&unit, attempt, || Ok(Self::unit_state(&unit)?.0))
    }

    fn list(&self) -> Result<Vec<UnitSummary>, BackendError> {
        let output = exec::capture_ok(&mut Self::list_command())?;
        Ok(parse_container_list(&output))
    }

    fn plan(&self, op: Op, spec: &UnitSpec) -> Vec<String> {
        let compose = compose_path(spec);
        match op {
            Op::Up => vec![
                format!("write {}", compose.display()),
                describe(&Self::compose_up_command(spec)),
                format!(
                    "wait for {} ({READINESS_ATTEMPTS} x {}s)",
                    spec.unit_name(),
                    READINESS_INTERVAL.as_secs()
                ),
                "provision with the shared playbook".to_owned(),
                format!("remove {}", compose.display()),
            ],
            Op::Ssh => vec![describe(&Self::session_command(
                spec,
                &spec.config.project.workspace_path,
                &[],
                true,
            ))],
            Op::Halt => vec![describe(&Self::simple("stop", spec))],
            Op::Destroy => vec![
                format!("write {}", compose.display()),
                describe(&Self::compose_down_command(spec)),
                format!("remove {}", compose.display()),
            ],
            Op::Status => vec![describe(&Self::inspect_command(&spec.unit_name()))],
            Op::Provision => vec!["provision with the shared playbook".to_owned()],
            Op::Logs => vec![describe(&Self::logs_command(spec, false))],
            Op::Exec => vec![describe(&Self::exec_command(spec, &[]))],
            Op::Kill => vec![describe(&Self::simple("kill", spec))],
            Op::List => vec![describe(&Self::list_command())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{spec, spec_with};
    use serde_json::json;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn compose_up_targets_generated_file() {
        let spec = spec(Path::new("/src/demo"));
        let cmd = DockerBackend::compose_up_command(&spec);
        assert_eq!(cmd.get_program(), "docker");
        assert_eq!(
            args(&cmd),
            vec![
                "compose",
                "-f",
                "/src/demo/.vm/docker-compose.yml",
                "-p",
                "demo-dev",
                "up",
                "-d",
                "--build"
            ]
        );
    }

    #[test]
    fn compose_down_keeps_volumes_when_persisting() {
        let plain = spec(Path::new("/src/demo"));
        assert!(args(&DockerBackend::compose_down_command(&plain)).contains(&"--volumes".to_owned()));

        let persisted = spec_with(Path::new("/src/demo"), &json!({"persist_databases": true}));
        assert!(!args(&DockerBackend::compose_down_command(&persisted))
            .contains(&"--volumes".to_owned()));
    }

    #[test]
    fn interactive_session_opens_login_shell_in_translated_dir() {
        let spec = spec(Path::new("/src/demo"));
        let cmd = DockerBackend::session_command(&spec, "/workspace/src", &[], true);
        assert_eq!(
            args(&cmd),
            vec!["exec", "-it", "-u", "developer", "-w", "/workspace/src", "demo-dev", "bash", "-l"]
        );
        let cmd = DockerBackend::session_command(&spec, "/workspace", &[], false);
        assert_eq!(args(&cmd)[1], "-i");
    }

    #[test]
    fn one_shot_session_runs_quoted_command() {
        let spec = spec(Path::new("/src/demo"));
        let command = vec!["echo".to_owned(), "a b".to_owned()];
        let cmd = DockerBackend::session_command(&spec, "/workspace", &command, true);
        assert_eq!(
            args(&cmd),
            vec!["exec", "-u", "developer", "-w", "/workspace", "demo-dev", "bash", "-lc", "echo 'a b'"]
        );
    }

    #[test]
    fn exec_runs_argv_in_workspace() {
        let spec = spec(Path::new("/src/demo"));
        let cmd = DockerBackend::exec_command(&spec, &["ls".to_owned(), "-la".to_owned()]);
        assert_eq!(
            args(&cmd),
            vec!["exec", "-u", "developer", "-w", "/workspace", "demo-dev", "ls", "-la"]
        );
    }

    #[test]
    fn logs_follow_flag() {
        let spec = spec(Path::new("/src/demo"));
        assert_eq!(
            args(&DockerBackend::logs_command(&spec, true)),
            vec!["logs", "--tail", "200", "-f", "demo-dev"]
        );
    }

    #[test]
    fn list_filters_on_project_label() {
        let cmd = DockerBackend::list_command();
        let a = args(&cmd);
        assert!(a.contains(&"label=dev.vm.project".to_owned()));
        assert!(a
            .last()
            .unwrap()
            .starts_with("{{.Names}}\t{{.State}}\t{{.Label \"dev.vm.project\"}}"));
    }

    #[test]
    fn parses_container_states() {
        assert_eq!(parse_container_state("running"), UnitState::Running);
        assert_eq!(parse_container_state("created"), UnitState::Created);
        assert_eq!(parse_container_state("exited"), UnitState::Stopped);
        assert_eq!(parse_container_state("paused"), UnitState::Stopped);
    }

    #[test]
    fn parses_container_list() {
        let rows = parse_container_list("api-dev\trunning\tapi\nweb-dev\texited\tweb\n\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "api-dev");
        assert_eq!(rows[0].state, "running");
        assert_eq!(rows[1].project.as_deref(), Some("web"));
    }

    #[test]
    fn shell_uses_root_and_supervisor() {
        let shell = DockerShell {
            unit: "demo-dev".to_owned(),
        };
        assert_eq!(
            args(&shell.root_command("id")),
            vec!["exec", "-u", "root", "demo-dev", "bash", "-c", "id"]
        );
        assert_eq!(
            shell.start_service_script("redis-server"),
            "supervisorctl start redis-server"
        );
    }

    #[test]
    fn up_plan_lists_every_step() {
        let backend = DockerBackend::new(BackendOptions::new("/opt/vm"));
        let plan = backend.plan(Op::Up, &spec(Path::new("/src/demo")));
        assert_eq!(plan.len(), 5);
        assert!(plan[1].contains("compose"));
        assert!(plan[2].contains("30 x 2s"));
        assert!(plan[4].starts_with("remove"));
    }
}
