//! Building user documents for `vm init` and `vm generate`.
//!
//! Generated documents only contain overrides; everything else comes from
//! the defaults at merge time, so later default changes still apply.

use crate::defaults::default_document;
use crate::provider::Provider;
use crate::ConfigError;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Reduce an arbitrary string to a project name: lowercase ASCII
/// alphanumerics separated by single dashes.
pub fn sanitize_project_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_owned()
}

/// Project name derived from a directory's final component, if any survives
/// sanitizing.
pub fn derive_project_name(dir: &Path) -> Option<String> {
    let name = sanitize_project_name(&dir.file_name()?.to_string_lossy());
    (!name.is_empty()).then_some(name)
}

fn schema_ref() -> Option<&'static Value> {
    default_document().get("$schema")
}

/// Minimal document naming the project; what `vm init` writes.
pub fn initial_document(name: &str) -> Value {
    Value::Object(initial_map(name))
}

fn initial_map(name: &str) -> Map<String, Value> {
    let mut doc = Map::new();
    if let Some(schema) = schema_ref() {
        doc.insert("$schema".to_owned(), schema.clone());
    }
    doc.insert(
        "project".to_owned(),
        json!({
            "name": name,
            "hostname": format!("dev.{name}.local"),
        }),
    );
    doc
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub name: Option<String>,
    pub provider: Option<Provider>,
    pub services: Vec<String>,
    pub ports: Vec<(String, u16)>,
}

/// Build a user document from generator options. Service names are checked
/// against the services the defaults know about.
pub fn generate_document(options: &GenerateOptions, dir: &Path) -> Result<Value, ConfigError> {
    let name = options
        .name
        .as_deref()
        .map(sanitize_project_name)
        .filter(|n| !n.is_empty())
        .or_else(|| derive_project_name(dir))
        .unwrap_or_else(|| "my-project".to_owned());

    let mut root = initial_map(&name);

    if let Some(provider) = options.provider {
        root.insert("provider".to_owned(), json!(provider.as_str()));
    }

    if !options.services.is_empty() {
        let known = default_document()
            .get("services")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut services = Map::new();
        for service in &options.services {
            if !known.contains_key(service) {
                return Err(ConfigError::UnknownService {
                    name: service.clone(),
                    available: known.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }
            services.insert(service.clone(), json!({"enabled": true}));
        }
        root.insert("services".to_owned(), Value::Object(services));
    }

    if !options.ports.is_empty() {
        let ports: Map<String, Value> = options
            .ports
            .iter()
            .map(|(name, port)| (name.clone(), json!(port)))
            .collect();
        root.insert("ports".to_owned(), Value::Object(ports));
    }

    Ok(Value::Object(root))
}

/// Parse a `name=port` command-line assignment.
pub fn parse_port_assignment(spec: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidPortAssignment(spec.to_owned());
    let (name, port) = spec.split_once('=').ok_or_else(invalid)?;
    let name = name.trim();
    let port: u16 = port.trim().parse().map_err(|_| invalid())?;
    if name.is_empty() || port == 0 {
        return Err(invalid());
    }
    Ok((name.to_owned(), port))
}

/// Write `doc` as pretty JSON to `dest` atomically. Refuses to replace an
/// existing file unless `force` is set.
pub fn write_document(dest: &Path, doc: &Value, force: bool) -> Result<(), ConfigError> {
    if dest.exists() && !force {
        return Err(ConfigError::AlreadyExists(dest.to_path_buf()));
    }
    let write_err = |source| ConfigError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut content = serde_json::to_string_pretty(doc)?;
    content.push('\n');

    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(dest).map_err(|e| write_err(e.error))?;
    Ok(())
}
