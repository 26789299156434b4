pub mod completions;
pub mod generate;
pub mod init;
pub mod lifecycle;
pub mod list;
pub mod man_pages;
pub mod status;
pub mod test;
pub mod validate;

use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{stderr, stdin, IsTerminal};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vm_config::{ConfirmPrompt, Provider};
use vm_core::{Context, CoreError, Project};
use vm_provider::{
    check_docker_prereqs, check_vagrant_prereqs, format_missing, select_backend, Backend,
};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Prefix on error messages that `main` maps to `EXIT_CONFIG_ERROR`.
pub const CONFIG_ERROR_PREFIX: &str = "config error:";

/// Everything a command needs from the invocation, read once in `main`.
pub struct Invocation {
    pub ctx: Context,
    pub json: bool,
    pub skip_prereqs: bool,
    /// Raised by the interrupt handler.
    pub terminate: Arc<AtomicBool>,
}

impl Invocation {
    pub fn backend(&self, provider: Provider) -> Box<dyn Backend> {
        select_backend(provider, &self.ctx.backend_options(Arc::clone(&self.terminate)))
    }

    /// Load the project, printing non-blocking warnings.
    pub fn project(&self) -> Result<Project, String> {
        let project =
            Project::load(&self.ctx, &TerminalPrompt).map_err(|e| format_core_error(&e))?;
        for warning in project.warnings() {
            eprintln!("{} {warning}", console::style("warning:").yellow().bold());
        }
        Ok(project)
    }

    pub fn ensure_prereqs(&self, provider: Provider) -> Result<(), String> {
        if self.skip_prereqs || self.ctx.dry_run {
            return Ok(());
        }
        let missing = match provider {
            Provider::Docker => check_docker_prereqs(),
            Provider::Vagrant => check_vagrant_prereqs(),
        };
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format_missing(&missing))
        }
    }
}

/// Asks on the terminal; declines when stdin or stderr is not a TTY.
pub struct TerminalPrompt;

impl ConfirmPrompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> bool {
        if !is_interactive() {
            return false;
        }
        Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

pub fn is_interactive() -> bool {
    stdin().is_terminal() && stderr().is_terminal()
}

pub fn format_core_error(err: &CoreError) -> String {
    if err.is_config_error() {
        format!("{CONFIG_ERROR_PREFIX} {err}")
    } else {
        err.to_string()
    }
}

/// Map a dispatch failure to the process result. Backend exit codes pass
/// through unchanged; `quiet` suppresses the message when the child already
/// spoke for itself (ssh, exec).
pub fn core_failure(err: &CoreError, quiet: bool) -> Result<u8, String> {
    match err.exit_code() {
        Some(code) => {
            if quiet {
                debug!("{err}");
            } else {
                eprintln!("{} {err}", console::style("error:").red().bold());
            }
            Ok(u8::try_from(code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(EXIT_FAILURE))
        }
        None => Err(format_core_error(err)),
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = if stderr().is_terminal() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_done(pb: &ProgressBar) {
    pb.finish_and_clear();
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "running" => Style::new().green().bold().apply_to(state).to_string(),
        "stopped" | "exited" | "poweroff" => Style::new().yellow().apply_to(state).to_string(),
        "created" => Style::new().cyan().apply_to(state).to_string(),
        "absent" | "not_created" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_config::ConfigError;
    use vm_provider::BackendError;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_state_keeps_text() {
        for state in ["running", "stopped", "created", "absent"] {
            assert!(colorize_state(state).contains(state));
        }
        assert_eq!(colorize_state("paused"), "paused");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
    }

    #[test]
    fn backend_codes_pass_through() {
        let err = CoreError::Backend(BackendError::CommandFailed {
            command: "docker stop shop-dev".to_owned(),
            code: 125,
        });
        assert_eq!(core_failure(&err, true), Ok(125));
    }

    #[test]
    fn out_of_range_codes_become_generic_failure() {
        let err = CoreError::Backend(BackendError::CommandFailed {
            command: "x".to_owned(),
            code: 300,
        });
        assert_eq!(core_failure(&err, true), Ok(EXIT_FAILURE));
    }

    #[test]
    fn config_errors_are_prefixed() {
        let err = CoreError::Config(ConfigError::Validation(vec!["vm.cpus bad".to_owned()]));
        let msg = core_failure(&err, false).unwrap_err();
        assert!(msg.starts_with(CONFIG_ERROR_PREFIX));
        assert!(msg.contains("vm.cpus bad"));
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_done(&pb);
    }
}
