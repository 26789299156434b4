//! One canonical discover → parse → merge → validate pipeline.

use crate::config::VmConfig;
use crate::defaults::default_document;
use crate::discovery::{discover, ConfirmPrompt};
use crate::document::{lookup, parse_document_file};
use crate::generate::derive_project_name;
use crate::merge::merge;
use crate::provider::{resolve_provider, Provider};
use crate::validate::{validate, ValidationReport};
use crate::ConfigError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where to look for the document, as decided by the caller's flags and
/// environment.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// `--config PATH` or `VM_CONFIG`.
    pub explicit: Option<PathBuf>,
    /// `--config` without a value.
    pub scan: bool,
    pub cwd: PathBuf,
    /// `VM_PROJECT_DIR`; defaults to the directory holding the document.
    pub project_dir_override: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub doc_path: PathBuf,
    pub project_dir: PathBuf,
    /// The user document exactly as read.
    pub user: Value,
    /// User document merged over the defaults.
    pub merged: Value,
    pub report: ValidationReport,
    /// The document was synthesized during discovery.
    pub created: bool,
}

impl LoadedConfig {
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        resolve_provider(&self.merged)
    }

    /// Typed view of the merged document. Only meaningful once the report
    /// has no errors.
    pub fn typed(&self) -> Result<VmConfig, ConfigError> {
        VmConfig::from_value(&self.merged)
    }
}

/// Resolve, merge and validate the project document.
///
/// Validation problems are returned in the report, not as an error; callers
/// decide whether to abort (lifecycle verbs) or just print (`vm validate`).
pub fn load(request: &LoadRequest, prompt: &dyn ConfirmPrompt) -> Result<LoadedConfig, ConfigError> {
    let found = discover(
        request.explicit.as_deref(),
        request.scan,
        &request.cwd,
        prompt,
    )?;
    let project_dir = request
        .project_dir_override
        .clone()
        .unwrap_or_else(|| found.search_root.clone());
    debug!(
        "config {} for project {}",
        found.doc_path.display(),
        project_dir.display()
    );

    let user = parse_document_file(&found.doc_path)?;
    let mut base = default_document().clone();
    inject_project_identity(&mut base, &project_dir);
    let mut merged = merge(&base, &user);
    if lookup(&user, "project.hostname").is_none() {
        hostname_from_name(&mut merged);
    }
    let report = validate(&merged);

    Ok(LoadedConfig {
        doc_path: found.doc_path,
        project_dir,
        user,
        merged,
        report,
        created: found.created,
    })
}

fn project_section(doc: &mut Value) -> Option<&mut Map<String, Value>> {
    doc.as_object_mut()
        .map(|root| root.entry("project").or_insert_with(|| Value::Object(Map::new())))
        .and_then(Value::as_object_mut)
}

/// Replace the default project name with one derived from the project
/// directory. The user document still wins when it sets a name.
fn inject_project_identity(base: &mut Value, project_dir: &Path) {
    let Some(name) = derive_project_name(project_dir) else {
        return;
    };
    if let Some(project) = project_section(base) {
        project.insert("name".to_owned(), Value::String(name));
    }
}

/// `dev.<name>.local` for whatever name the merge settled on. Only used
/// when the user document leaves the hostname unset.
fn hostname_from_name(merged: &mut Value) {
    let Some(project) = project_section(merged) else {
        return;
    };
    let Some(name) = project
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
    else {
        return;
    };
    let hostname = format!("dev.{name}.local");
    project.insert("hostname".to_owned(), Value::String(hostname));
}
