//! Locating a project's `vm.json`.
//!
//! Three strategies, picked by the caller: an explicit file or directory,
//! an upward scan bounded to `MAX_SCAN_DEPTH` directories (plus the
//! filesystem root as a last resort), or the current directory only.

use crate::generate::{derive_project_name, initial_document, write_document};
use crate::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "vm.json";

/// Directories inspected by an upward scan, counting the starting directory.
pub const MAX_SCAN_DEPTH: usize = 3;

/// Asked before a missing `vm.json` is synthesized in the current directory.
pub trait ConfirmPrompt {
    fn confirm(&self, message: &str) -> bool;
}

/// Always declines. The behavior for scripts, tests, and non-TTY callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclinePrompt;

impl ConfirmPrompt for DeclinePrompt {
    fn confirm(&self, _message: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    /// Path of the `vm.json` that was found (or created).
    pub doc_path: PathBuf,
    /// Directory the document lives in; the project root unless overridden.
    pub search_root: PathBuf,
    /// True when the document did not exist and was synthesized.
    pub created: bool,
}

impl DiscoveredConfig {
    fn found(doc_path: PathBuf) -> Self {
        let search_root = doc_path
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        Self {
            doc_path,
            search_root,
            created: false,
        }
    }
}

/// Resolve the configuration document for this invocation.
///
/// `explicit` wins over `scan`; relative explicit paths are taken relative
/// to `cwd`.
pub fn discover(
    explicit: Option<&Path>,
    scan: bool,
    cwd: &Path,
    prompt: &dyn ConfirmPrompt,
) -> Result<DiscoveredConfig, ConfigError> {
    if let Some(path) = explicit {
        return resolve_explicit(&cwd.join(path));
    }
    if scan {
        return scan_upward(cwd);
    }

    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        return Ok(DiscoveredConfig::found(candidate));
    }

    let message = format!(
        "No {CONFIG_FILE_NAME} in {}. Create one here?",
        cwd.display()
    );
    if prompt.confirm(&message) {
        let name = derive_project_name(cwd).unwrap_or_else(|| "my-project".to_owned());
        write_document(&candidate, &initial_document(&name), false)?;
        return Ok(DiscoveredConfig {
            created: true,
            ..DiscoveredConfig::found(candidate)
        });
    }

    Err(ConfigError::NotFound(format!(
        "in {} (use --config to search parent directories)",
        cwd.display()
    )))
}

fn resolve_explicit(path: &Path) -> Result<DiscoveredConfig, ConfigError> {
    let doc_path = if path.is_dir() {
        path.join(CONFIG_FILE_NAME)
    } else {
        path.to_path_buf()
    };
    if doc_path.is_file() {
        debug!("using explicit config {}", doc_path.display());
        Ok(DiscoveredConfig::found(doc_path))
    } else {
        Err(ConfigError::NotFound(format!("at {}", doc_path.display())))
    }
}

fn scan_upward(cwd: &Path) -> Result<DiscoveredConfig, ConfigError> {
    let root = cwd.ancestors().last().unwrap_or(cwd);
    scan_upward_from(cwd, root)
}

/// Bounded upward scan from `cwd`, then `root` as the last resort.
fn scan_upward_from(cwd: &Path, root: &Path) -> Result<DiscoveredConfig, ConfigError> {
    for dir in cwd.ancestors().take(MAX_SCAN_DEPTH) {
        let candidate = dir.join(CONFIG_FILE_NAME);
        debug!("scanning {}", candidate.display());
        if candidate.is_file() {
            return Ok(DiscoveredConfig::found(candidate));
        }
    }

    let candidate = root.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        debug!("falling back to {}", candidate.display());
        return Ok(DiscoveredConfig::found(candidate));
    }

    Err(ConfigError::NotFound(format!(
        "in {} or its {} parent directories",
        cwd.display(),
        MAX_SCAN_DEPTH - 1
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NOT_FOUND_MARKER;
    use std::fs;

    struct AcceptPrompt;

    impl ConfirmPrompt for AcceptPrompt {
        fn confirm(&self, _message: &str) -> bool {
            true
        }
    }

    fn project_with_nested_dirs() -> (tempfile::TempDir, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        fs::create_dir_all(a.join("b/c/d")).unwrap();
        fs::write(a.join(CONFIG_FILE_NAME), "{}").unwrap();
        (root, a)
    }

    #[test]
    fn scan_finds_config_two_levels_up() {
        let (_root, a) = project_with_nested_dirs();
        let found = discover(None, true, &a.join("b/c"), &DeclinePrompt).unwrap();
        assert_eq!(found.doc_path, a.join(CONFIG_FILE_NAME));
        assert_eq!(found.search_root, a);
        assert!(!found.created);
    }

    #[test]
    fn scan_gives_up_three_levels_down() {
        let (_root, a) = project_with_nested_dirs();
        let err = discover(None, true, &a.join("b/c/d"), &DeclinePrompt).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains(NOT_FOUND_MARKER));
    }

    #[test]
    fn scan_falls_back_to_root_beyond_the_bound() {
        let root = tempfile::tempdir().unwrap();
        let deep = root.path().join("a/b/c/d/e");
        fs::create_dir_all(&deep).unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), "{}").unwrap();

        let found = scan_upward_from(&deep, root.path()).unwrap();
        assert_eq!(found.doc_path, root.path().join(CONFIG_FILE_NAME));
        assert_eq!(found.search_root, root.path());
    }

    #[test]
    fn scan_without_root_document_reports_marker() {
        let root = tempfile::tempdir().unwrap();
        let deep = root.path().join("a/b/c/d/e");
        fs::create_dir_all(&deep).unwrap();

        let err = scan_upward_from(&deep, root.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains(NOT_FOUND_MARKER));
    }

    #[test]
    fn scan_prefers_nearby_document_over_root() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("a/b/c/d");
        fs::create_dir_all(project.join("e")).unwrap();
        fs::write(root.path().join(CONFIG_FILE_NAME), "{}").unwrap();
        fs::write(project.join(CONFIG_FILE_NAME), "{}").unwrap();

        let found = scan_upward_from(&project.join("e"), root.path()).unwrap();
        assert_eq!(found.search_root, project);
    }

    #[test]
    fn scan_finds_config_in_cwd() {
        let (_root, a) = project_with_nested_dirs();
        let found = discover(None, true, &a, &DeclinePrompt).unwrap();
        assert_eq!(found.search_root, a);
    }

    #[test]
    fn explicit_directory_looks_inside() {
        let (_root, a) = project_with_nested_dirs();
        let found = discover(Some(&a), false, Path::new("/"), &DeclinePrompt).unwrap();
        assert_eq!(found.doc_path, a.join(CONFIG_FILE_NAME));
    }

    #[test]
    fn explicit_relative_file_is_resolved_against_cwd() {
        let (root, a) = project_with_nested_dirs();
        let found =
            discover(Some(Path::new("a/vm.json")), false, root.path(), &DeclinePrompt).unwrap();
        assert_eq!(found.doc_path, a.join(CONFIG_FILE_NAME));
    }

    #[test]
    fn explicit_missing_path_names_the_path() {
        let (_root, a) = project_with_nested_dirs();
        let missing = a.join("b");
        let err = discover(Some(&missing), false, &a, &DeclinePrompt).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(NOT_FOUND_MARKER));
        assert!(msg.contains(&missing.join(CONFIG_FILE_NAME).display().to_string()));
    }

    #[test]
    fn explicit_wins_over_scan() {
        let (_root, a) = project_with_nested_dirs();
        let other = a.join("b/c");
        fs::write(other.join(CONFIG_FILE_NAME), "{}").unwrap();
        let found = discover(Some(&other), true, &a, &DeclinePrompt).unwrap();
        assert_eq!(found.search_root, other);
    }

    #[test]
    fn cwd_mode_does_not_scan_parents() {
        let (_root, a) = project_with_nested_dirs();
        let err = discover(None, false, &a.join("b"), &DeclinePrompt).unwrap_err();
        assert!(err.to_string().contains(NOT_FOUND_MARKER));
    }

    #[test]
    fn cwd_mode_synthesizes_when_prompt_accepts() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("My Cool_App");
        fs::create_dir_all(&dir).unwrap();

        let found = discover(None, false, &dir, &AcceptPrompt).unwrap();
        assert!(found.created);
        let doc = crate::parse_document_file(&found.doc_path).unwrap();
        assert_eq!(doc["project"]["name"], "my-cool-app");
    }
}
