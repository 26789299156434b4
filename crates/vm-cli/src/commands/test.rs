use super::{EXIT_FAILURE, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub const TEST_RUNNER: &str = "test/run-tests.sh";

pub fn runner_command(tool_dir: &Path, suite: Option<&str>, provider: Option<&str>) -> Command {
    let mut cmd = Command::new(runner_path(tool_dir));
    if let Some(suite) = suite {
        cmd.args(["--suite", suite]);
    }
    if let Some(provider) = provider {
        cmd.args(["--provider", provider]);
    }
    cmd.current_dir(tool_dir);
    cmd
}

fn runner_path(tool_dir: &Path) -> PathBuf {
    tool_dir.join(TEST_RUNNER)
}

/// Run the bundled test runner, passing its exit code through.
pub fn run(tool_dir: &Path, suite: Option<&str>, provider: Option<&str>) -> Result<u8, String> {
    let runner = runner_path(tool_dir);
    if !runner.is_file() {
        return Err(format!(
            "test runner not found at {} (set VM_TOOL_DIR to the vm installation)",
            runner.display()
        ));
    }
    let mut cmd = runner_command(tool_dir, suite, provider);
    debug!("running {}", vm_provider::exec::describe(&cmd));
    let status = cmd
        .status()
        .map_err(|e| format!("failed to run {}: {e}", runner.display()))?;
    Ok(match status.code() {
        Some(0) => EXIT_SUCCESS,
        Some(code) => u8::try_from(code).unwrap_or(EXIT_FAILURE),
        None => EXIT_FAILURE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_forwards_suite_and_provider() {
        let cmd = runner_command(Path::new("/opt/vm"), Some("minimal"), Some("docker"));
        assert_eq!(cmd.get_program(), "/opt/vm/test/run-tests.sh");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--suite", "minimal", "--provider", "docker"]);
    }

    #[test]
    fn missing_runner_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), None, None).unwrap_err();
        assert!(err.contains("test runner not found"));
    }
}
