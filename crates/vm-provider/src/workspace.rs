//! Mapping the caller's host directory onto the in-unit workspace mount.
//!
//! Policy: both paths are canonicalized (so a symlinked project root and its
//! target agree). A cwd outside the project root, or a relative path with
//! anything but plain components, opens the session at the workspace root.

use std::path::{Component, Path, PathBuf};

/// Path of `cwd` relative to `project_dir`, or empty when `cwd` is not
/// inside the project.
pub fn relative_to_project(project_dir: &Path, cwd: &Path) -> PathBuf {
    let project = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());
    let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    cwd.strip_prefix(&project)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// In-unit directory for a project-relative path.
pub fn translate_cwd(workspace_path: &str, relative: &Path) -> String {
    let base = workspace_path.trim_end_matches('/');
    let base = if base.is_empty() { "/" } else { base };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return base.to_owned(),
        }
    }
    if parts.is_empty() {
        return base.to_owned();
    }
    if base == "/" {
        format!("/{}", parts.join("/"))
    } else {
        format!("{base}/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn nested_directory_maps_under_workspace() {
        assert_eq!(
            translate_cwd("/workspace", Path::new("src/api")),
            "/workspace/src/api"
        );
    }

    #[test]
    fn empty_relative_path_is_workspace_root() {
        assert_eq!(translate_cwd("/workspace/", Path::new("")), "/workspace");
        assert_eq!(translate_cwd("/workspace", Path::new(".")), "/workspace");
    }

    #[test]
    fn escaping_paths_fall_back_to_root() {
        assert_eq!(translate_cwd("/workspace", Path::new("../etc")), "/workspace");
        assert_eq!(translate_cwd("/workspace", Path::new("/etc")), "/workspace");
        assert_eq!(translate_cwd("/workspace", Path::new("a/../../b")), "/workspace");
    }

    #[test]
    fn root_workspace_does_not_double_slash() {
        assert_eq!(translate_cwd("/", Path::new("src")), "/src");
    }

    #[test]
    fn relative_to_project_inside_and_outside() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        fs::create_dir_all(project.join("src/lib")).unwrap();
        let outside = dir.path().join("other");
        fs::create_dir_all(&outside).unwrap();

        assert_eq!(
            relative_to_project(&project, &project.join("src/lib")),
            PathBuf::from("src/lib")
        );
        assert_eq!(relative_to_project(&project, &project), PathBuf::new());
        assert_eq!(relative_to_project(&project, &outside), PathBuf::new());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_project_root_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir_all(real.join("web")).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert_eq!(
            relative_to_project(&link, &real.join("web")),
            PathBuf::from("web")
        );
    }
}
