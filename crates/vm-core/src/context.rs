//! Explicit per-invocation context.
//!
//! The CLI reads flags and environment variables exactly once and builds a
//! `Context`; nothing below it consults the process environment or the
//! current directory on its own.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use vm_config::LoadRequest;
use vm_provider::BackendOptions;

/// How to locate `vm.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// `vm.json` in the current directory.
    #[default]
    CurrentDir,
    /// `--config` without a value: bounded upward scan.
    Scan,
    /// `--config PATH` or `VM_CONFIG`.
    Explicit(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Context {
    pub cwd: PathBuf,
    pub config: ConfigSource,
    /// `VM_PROJECT_DIR`.
    pub project_dir_override: Option<PathBuf>,
    pub debug: bool,
    pub dry_run: bool,
    /// Installation root holding `providers/`, `shared/` and `test/`.
    pub tool_dir: PathBuf,
    /// Where per-project lock files live.
    pub state_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
}

impl Context {
    pub fn new(cwd: impl Into<PathBuf>, tool_dir: impl Into<PathBuf>) -> Self {
        let tool_dir = tool_dir.into();
        Self {
            cwd: cwd.into(),
            config: ConfigSource::default(),
            project_dir_override: None,
            debug: false,
            dry_run: false,
            state_dir: default_state_dir(None, None),
            tool_dir,
            home_dir: None,
        }
    }

    pub fn load_request(&self) -> LoadRequest {
        let (explicit, scan) = match &self.config {
            ConfigSource::CurrentDir => (None, false),
            ConfigSource::Scan => (None, true),
            ConfigSource::Explicit(path) => (Some(path.clone()), false),
        };
        LoadRequest {
            explicit,
            scan,
            cwd: self.cwd.clone(),
            project_dir_override: self.project_dir_override.clone(),
        }
    }

    pub fn backend_options(&self, terminate: Arc<AtomicBool>) -> BackendOptions {
        BackendOptions {
            tool_dir: self.tool_dir.clone(),
            debug: self.debug,
            terminate,
        }
    }
}

/// `$XDG_STATE_HOME/vm`, else `~/.local/state/vm`, else a directory under
/// the system temp dir.
pub fn default_state_dir(xdg_state_home: Option<&Path>, home: Option<&Path>) -> PathBuf {
    if let Some(xdg) = xdg_state_home.filter(|p| p.is_absolute()) {
        return xdg.join("vm");
    }
    if let Some(home) = home {
        return home.join(".local").join("state").join("vm");
    }
    std::env::temp_dir().join("vm-state")
}

/// `VM_TOOL_DIR` when set, else the prefix the executable was installed
/// under (`<prefix>/bin/vm` gives `<prefix>`).
pub fn resolve_tool_dir(env_override: Option<PathBuf>, current_exe: Option<&Path>) -> PathBuf {
    if let Some(dir) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        return dir;
    }
    current_exe
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_request_follows_config_source() {
        let mut ctx = Context::new("/src/shop", "/opt/vm");
        let req = ctx.load_request();
        assert!(req.explicit.is_none());
        assert!(!req.scan);
        assert_eq!(req.cwd, PathBuf::from("/src/shop"));

        ctx.config = ConfigSource::Scan;
        assert!(ctx.load_request().scan);

        ctx.config = ConfigSource::Explicit(PathBuf::from("conf/vm.json"));
        ctx.project_dir_override = Some(PathBuf::from("/src/other"));
        let req = ctx.load_request();
        assert_eq!(req.explicit, Some(PathBuf::from("conf/vm.json")));
        assert!(!req.scan);
        assert_eq!(req.project_dir_override, Some(PathBuf::from("/src/other")));
    }

    #[test]
    fn backend_options_carry_debug_and_tool_dir() {
        let mut ctx = Context::new("/src/shop", "/opt/vm");
        ctx.debug = true;
        let options = ctx.backend_options(Arc::new(AtomicBool::new(false)));
        assert!(options.debug);
        assert_eq!(options.tool_dir, PathBuf::from("/opt/vm"));
    }

    #[test]
    fn state_dir_prefers_xdg_then_home() {
        assert_eq!(
            default_state_dir(Some(Path::new("/x/state")), Some(Path::new("/home/a"))),
            PathBuf::from("/x/state/vm")
        );
        assert_eq!(
            default_state_dir(Some(Path::new("relative")), Some(Path::new("/home/a"))),
            PathBuf::from("/home/a/.local/state/vm")
        );
        assert!(default_state_dir(None, None).ends_with("vm-state"));
    }

    #[test]
    fn tool_dir_from_env_or_install_prefix() {
        assert_eq!(
            resolve_tool_dir(Some(PathBuf::from("/opt/vm")), Some(Path::new("/usr/bin/vm"))),
            PathBuf::from("/opt/vm")
        );
        assert_eq!(
            resolve_tool_dir(None, Some(Path::new("/home/a/vm/bin/vm"))),
            PathBuf::from("/home/a/vm")
        );
        assert_eq!(
            resolve_tool_dir(Some(PathBuf::new()), Some(Path::new("/usr/local/bin/vm"))),
            PathBuf::from("/usr/local")
        );
        assert_eq!(resolve_tool_dir(None, None), PathBuf::from("."));
    }
}
