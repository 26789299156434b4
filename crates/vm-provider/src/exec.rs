//! Running host tools (`docker`, `vagrant`) and mapping their exit status.

use crate::BackendError;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

const SESSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// POSIX single-quoting: replace `'` with `'\''` and wrap in `'`.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:,@%+".contains(&b))
    {
        return s.to_owned();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quote and join an argv so it survives one round of shell parsing.
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable rendering of a command line, used in errors, logs and
/// dry-run plans. Environment overrides set on the command are shown first.
pub fn describe(cmd: &Command) -> String {
    let mut parts: Vec<String> = cmd
        .get_envs()
        .filter_map(|(k, v)| {
            v.map(|v| format!("{}={}", k.to_string_lossy(), shell_quote(&v.to_string_lossy())))
        })
        .collect();
    parts.push(cmd.get_program().to_string_lossy().into_owned());
    parts.extend(
        cmd.get_args()
            .map(|a| shell_quote(&a.to_string_lossy())),
    );
    parts.join(" ")
}

fn program(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

fn spawn_error(cmd: &Command, source: std::io::Error) -> BackendError {
    BackendError::Spawn {
        program: program(cmd),
        source,
    }
}

fn failed(cmd: &Command, code: Option<i32>) -> BackendError {
    BackendError::CommandFailed {
        command: describe(cmd),
        code: code.unwrap_or(1),
    }
}

/// Run with inherited stdio; a non-zero exit becomes `CommandFailed` with
/// the tool's own exit code.
pub fn run(cmd: &mut Command) -> Result<(), BackendError> {
    debug!("running {}", describe(cmd));
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_error(cmd, e))?;
    if status.success() {
        Ok(())
    } else {
        Err(failed(cmd, status.code()))
    }
}

/// Run with inherited stdio and return the exit code instead of failing.
pub fn run_code(cmd: &mut Command) -> Result<i32, BackendError> {
    debug!("running {}", describe(cmd));
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_error(cmd, e))?;
    Ok(status.code().unwrap_or(1))
}

/// Run with captured output. The caller inspects the status.
pub fn capture(cmd: &mut Command) -> Result<Output, BackendError> {
    debug!("capturing {}", describe(cmd));
    cmd.stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))
}

/// Run with captured output, failing on a non-zero exit.
pub fn capture_ok(cmd: &mut Command) -> Result<String, BackendError> {
    let output = capture(cmd)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} failed: {}", describe(cmd), stderr.trim());
        Err(failed(cmd, output.status.code()))
    }
}

/// Succeeds silently or not at all; used for readiness probes.
pub fn probe(cmd: &mut Command) -> bool {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Run an interactive session attached to the terminal. The child is
/// killed once `terminate` is raised (second interrupt inside the window).
pub fn run_attached(cmd: &mut Command, terminate: &AtomicBool) -> Result<(), BackendError> {
    debug!("attaching {}", describe(cmd));
    let mut child = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| spawn_error(cmd, e))?;

    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(failed(cmd, status.code()))
            };
        }
        if terminate.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackendError::Interrupted);
        }
        thread::sleep(SESSION_POLL_INTERVAL);
    }
}
