use crate::provider::Provider;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Typed, read-only view of a merged and validated document.
///
/// Backends read this instead of poking at raw JSON. Unknown keys stay in
/// the generic document and travel to the provisioning playbook untouched.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VmConfig {
    #[serde(default)]
    pub provider: Provider,
    pub project: ProjectSection,
    pub vm: VmSection,
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub npm_packages: Vec<String>,
    #[serde(default)]
    pub cargo_packages: Vec<String>,
    #[serde(default)]
    pub pip_packages: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub claude_sync: bool,
    #[serde(default)]
    pub gemini_sync: bool,
    #[serde(default)]
    pub persist_databases: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProjectSection {
    pub name: String,
    pub hostname: String,
    pub workspace_path: String,
    #[serde(default)]
    pub env_template_path: Option<String>,
    #[serde(default)]
    pub backup_pattern: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct VmSection {
    #[serde(rename = "box", default)]
    pub box_name: Option<String>,
    pub memory: u32,
    pub cpus: u32,
    pub user: String,
    #[serde(default = "default_port_binding")]
    pub port_binding: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
    /// Service-specific fields (credentials, database name, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TerminalSection {
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default = "default_true")]
    pub show_git_branch: bool,
    #[serde(default)]
    pub show_timestamp: bool,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            emoji: String::new(),
            username: String::new(),
            theme: String::new(),
            show_git_branch: true,
            show_timestamp: false,
        }
    }
}

fn default_port_binding() -> String {
    crate::validate::LOOPBACK_BINDING.to_owned()
}

fn default_true() -> bool {
    true
}

/// Services whose data lives in a directory worth persisting across
/// `destroy` when `persist_databases` is set.
pub const DATABASE_SERVICES: [&str; 3] = ["postgresql", "redis", "mongodb"];

impl VmConfig {
    /// Project the generic document onto the typed view.
    pub fn from_value(doc: &Value) -> Result<Self, ConfigError> {
        Self::deserialize(doc).map_err(|e| ConfigError::Shape(e.to_string()))
    }

    /// Name of the container or VM backing this project.
    pub fn unit_name(&self) -> String {
        format!("{}-dev", self.project.name)
    }

    /// Enabled services in a stable (sorted) order.
    pub fn enabled_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, svc)| svc.enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn service_enabled(&self, name: &str) -> bool {
        self.services.get(name).is_some_and(|s| s.enabled)
    }

    /// Enabled services that keep state on disk.
    pub fn enabled_databases(&self) -> Vec<&str> {
        DATABASE_SERVICES
            .into_iter()
            .filter(|db| self.service_enabled(db))
            .collect()
    }

    /// Language runtimes requested implicitly by non-empty package lists.
    pub fn requested_runtimes(&self) -> Vec<&'static str> {
        let mut runtimes = Vec::new();
        if !self.npm_packages.is_empty() {
            runtimes.push("node");
        }
        if !self.cargo_packages.is_empty() {
            runtimes.push("rust");
        }
        if !self.pip_packages.is_empty() {
            runtimes.push("python");
        }
        runtimes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_document;
    use crate::merge::merge;
    use serde_json::json;

    #[test]
    fn defaults_project_onto_typed_view() {
        let cfg = VmConfig::from_value(default_document()).unwrap();
        assert_eq!(cfg.provider, Provider::Docker);
        assert_eq!(cfg.project.workspace_path, "/workspace");
        assert_eq!(cfg.vm.memory, 4096);
        assert_eq!(cfg.vm.box_name.as_deref(), Some("bento/ubuntu-24.04"));
        assert!(cfg.enabled_services().is_empty());
        assert_eq!(cfg.unit_name(), "my-project-dev");
    }

    #[test]
    fn service_specific_fields_are_kept() {
        let doc = merge(
            default_document(),
            &json!({"services": {"postgresql": {"enabled": true}}}),
        );
        let cfg = VmConfig::from_value(&doc).unwrap();
        let pg = &cfg.services["postgresql"];
        assert!(pg.enabled);
        assert_eq!(pg.port, Some(5432));
        assert_eq!(pg.extra["database"], json!("dev_db"));
        assert_eq!(cfg.enabled_services(), vec!["postgresql"]);
        assert_eq!(cfg.enabled_databases(), vec!["postgresql"]);
    }

    #[test]
    fn package_lists_signal_runtimes() {
        let doc = merge(
            default_document(),
            &json!({"npm_packages": [], "cargo_packages": ["ripgrep"], "pip_packages": ["black"]}),
        );
        let cfg = VmConfig::from_value(&doc).unwrap();
        assert_eq!(cfg.requested_runtimes(), vec!["rust", "python"]);
    }

    #[test]
    fn wrong_shape_is_reported() {
        let doc = merge(default_document(), &json!({"vm": {"memory": "lots"}}));
        assert!(matches!(
            VmConfig::from_value(&doc),
            Err(ConfigError::Shape(_))
        ));
    }
}
