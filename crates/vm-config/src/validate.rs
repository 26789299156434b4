//! Validation of a merged document.
//!
//! Rules are checked against the generic JSON tree rather than the typed
//! view, so a wrong type becomes a readable message instead of a parse
//! failure. Blocking problems go to `errors`, advisory ones to `warnings`.

use crate::config::VmConfig;
use crate::document::lookup;
use crate::provider::Provider;
use crate::ConfigError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const MIN_RECOMMENDED_MEMORY_MB: u64 = 1024;
pub const LOOPBACK_BINDING: &str = "127.0.0.1";
pub const ALL_INTERFACES_BINDING: &str = "0.0.0.0";

const MAX_SANE_MEMORY_MB: u64 = 65536;
const MAX_SANE_CPUS: u64 = 64;
const MAX_EMOJI_SYMBOLS: usize = 4;
const MAX_TERMINAL_USERNAME_CHARS: usize = 32;
const PACKAGE_LISTS: [&str; 3] = ["npm_packages", "cargo_packages", "pip_packages"];
const HOST_MOUNT_FLAGS: [&str; 3] = ["claude_sync", "gemini_sync", "persist_databases"];
const OPTIONAL_STRINGS: [&str; 4] = [
    "project.env_template_path",
    "project.backup_pattern",
    "vm.box",
    "vm.timezone",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn blocking errors into a `ConfigError::Validation`.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self.errors.clone()))
        }
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Check every rule against `doc`, collecting all problems rather than
/// stopping at the first.
pub fn validate(doc: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let provider = check_provider(doc, &mut report);
    check_project(doc, &mut report);
    check_vm(doc, provider, &mut report);
    check_ports(doc, &mut report);
    check_services(doc, provider, &mut report);
    check_package_lists(doc, &mut report);
    check_string_map(doc, "versions", &mut report);
    check_string_map(doc, "aliases", &mut report);
    check_string_map(doc, "environment", &mut report);
    check_host_mounts(doc, &mut report);
    check_optional_strings(doc, &mut report);
    check_terminal(doc, &mut report);

    // Anything the typed view still rejects is blocking too, so a document
    // that validates always loads.
    if report.is_valid() {
        if let Err(e) = VmConfig::from_value(doc) {
            report.error(e.to_string());
        }
    }

    report
}

fn check_provider(doc: &Value, report: &mut ValidationReport) -> Option<Provider> {
    match doc.get("provider") {
        None => Some(Provider::default()),
        Some(Value::String(s)) => match s.parse::<Provider>() {
            Ok(p) => Some(p),
            Err(_) => {
                report.error(format!(
                    "provider must be 'docker' or 'vagrant' (got '{s}')"
                ));
                None
            }
        },
        Some(other) => {
            report.error(format!("provider must be a string (got {other})"));
            None
        }
    }
}

fn non_empty_str<'a>(doc: &'a Value, path: &str) -> Option<&'a str> {
    lookup(doc, path)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Project names end up in unit names, compose project names, hostnames
/// and lock file paths: lowercase letters, digits, `-` and `_`, starting
/// with a letter or digit.
pub fn is_project_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn check_project(doc: &Value, report: &mut ValidationReport) {
    for field in ["project.name", "project.workspace_path", "project.hostname"] {
        if non_empty_str(doc, field).is_none() {
            report.error(format!("{field} must be a non-empty string"));
        }
    }
    if let Some(name) = non_empty_str(doc, "project.name") {
        if !is_project_identifier(name) {
            report.error(format!(
                "project.name '{name}' may only contain lowercase letters, digits, '-' and '_', \
                 and must start with a letter or digit"
            ));
        }
    }
}

fn positive_integer(value: Option<&Value>) -> Option<u64> {
    value
        .and_then(Value::as_u64)
        .filter(|n| *n > 0 && *n <= u64::from(u32::MAX))
}

fn check_vm(doc: &Value, provider: Option<Provider>, report: &mut ValidationReport) {
    let Some(vm) = doc.get("vm").and_then(Value::as_object) else {
        report.error("vm section is missing or not an object");
        return;
    };

    if provider == Some(Provider::Vagrant) && non_empty_str(doc, "vm.box").is_none() {
        report.error("vm.box is required when provider is 'vagrant'");
    }

    match positive_integer(vm.get("memory")) {
        Some(mb) if mb < MIN_RECOMMENDED_MEMORY_MB => report.warn(format!(
            "vm.memory is {mb} MB; at least {MIN_RECOMMENDED_MEMORY_MB} MB is recommended"
        )),
        Some(mb) if mb > MAX_SANE_MEMORY_MB => report.warn(format!(
            "vm.memory is {mb} MB; the value is in megabytes, is that intended?"
        )),
        Some(_) => {}
        None => report.error("vm.memory must be a positive integer (megabytes)"),
    }

    match positive_integer(vm.get("cpus")) {
        Some(n) if n > MAX_SANE_CPUS => {
            report.warn(format!("vm.cpus is {n}; that is unusually high"));
        }
        Some(_) => {}
        None => report.error("vm.cpus must be a positive integer"),
    }

    if non_empty_str(doc, "vm.user").is_none() {
        report.error("vm.user must be a non-empty string");
    }

    match vm.get("port_binding") {
        None => {}
        Some(Value::String(b)) if b == LOOPBACK_BINDING || b == ALL_INTERFACES_BINDING => {}
        Some(Value::String(b)) => report.warn(format!(
            "vm.port_binding is '{b}'; expected '{LOOPBACK_BINDING}' (local only) or '{ALL_INTERFACES_BINDING}' (all interfaces)"
        )),
        Some(other) => report.error(format!("vm.port_binding must be a string (got {other})")),
    }
}

fn valid_port(value: &Value) -> Option<u16> {
    value
        .as_u64()
        .filter(|p| (1..=u64::from(u16::MAX)).contains(p))
        .map(|p| p as u16)
}

fn check_ports(doc: &Value, report: &mut ValidationReport) {
    let ports = match doc.get("ports") {
        None => return,
        Some(Value::Object(ports)) => ports,
        Some(_) => {
            report.error("ports must be an object mapping service names to port numbers");
            return;
        }
    };

    let mut owners: BTreeMap<u16, Vec<&str>> = BTreeMap::new();
    for (name, value) in ports {
        match valid_port(value) {
            Some(port) => owners.entry(port).or_default().push(name),
            None => report.error(format!(
                "ports.{name} must be an integer between 1 and 65535 (got {value})"
            )),
        }
    }

    for (port, names) in owners {
        if names.len() > 1 {
            report.error(format!(
                "port {port} is assigned to more than one service: {}",
                names.join(", ")
            ));
        }
    }
}

fn check_services(doc: &Value, provider: Option<Provider>, report: &mut ValidationReport) {
    let services: &Map<String, Value> = match doc.get("services") {
        None => return,
        Some(Value::Object(services)) => services,
        Some(_) => {
            report.error("services must be an object");
            return;
        }
    };

    for (name, service) in services {
        let Some(service) = service.as_object() else {
            report.error(format!("services.{name} must be an object"));
            continue;
        };
        if let Some(enabled) = service.get("enabled") {
            if !enabled.is_boolean() {
                report.error(format!("services.{name}.enabled must be true or false"));
            }
        }
        if let Some(port) = service.get("port") {
            if valid_port(port).is_none() {
                report.error(format!(
                    "services.{name}.port must be an integer between 1 and 65535 (got {port})"
                ));
            }
        }
    }

    let docker_enabled = lookup(doc, "services.docker.enabled") == Some(&Value::Bool(true));
    if provider == Some(Provider::Docker) && docker_enabled {
        report.warn(
            "services.docker.enabled mounts the host Docker socket into the container, \
             which grants root-equivalent access to the host",
        );
    }
}

fn check_package_lists(doc: &Value, report: &mut ValidationReport) {
    for key in PACKAGE_LISTS {
        let Some(value) = doc.get(key) else { continue };
        let ok = value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !ok {
            report.error(format!("{key} must be a list of package names"));
        }
    }
}

fn check_string_map(doc: &Value, key: &str, report: &mut ValidationReport) {
    match doc.get(key) {
        None => {}
        Some(Value::Object(map)) => {
            for (name, value) in map {
                if !value.is_string() {
                    report.error(format!("{key}.{name} must be a string (got {value})"));
                }
            }
        }
        Some(_) => report.error(format!("{key} must be an object of string values")),
    }
}

fn check_host_mounts(doc: &Value, report: &mut ValidationReport) {
    for key in HOST_MOUNT_FLAGS {
        if let Some(value) = doc.get(key) {
            if !value.is_boolean() {
                report.error(format!("{key} must be true or false (got {value})"));
            }
        }
    }
}

/// Fields that may be absent or null but are strings when set.
fn check_optional_strings(doc: &Value, report: &mut ValidationReport) {
    for field in OPTIONAL_STRINGS {
        if let Some(value) = lookup(doc, field) {
            if !(value.is_string() || value.is_null()) {
                report.error(format!("{field} must be a string (got {value})"));
            }
        }
    }
}

/// Visible symbols in `s`: joiners, variation selectors, skin-tone
/// modifiers and tag characters attach to the symbol before them, and a
/// zero-width joiner fuses the next symbol into the current one.
fn symbol_count(s: &str) -> usize {
    let mut count = 0;
    let mut joined = false;
    for c in s.chars() {
        match c {
            '\u{200D}' => joined = true,
            '\u{0300}'..='\u{036F}'
            | '\u{20E3}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{1F3FB}'..='\u{1F3FF}'
            | '\u{E0020}'..='\u{E007F}' => {}
            _ if joined => joined = false,
            _ => count += 1,
        }
    }
    count
}

fn check_terminal(doc: &Value, report: &mut ValidationReport) {
    let terminal = match doc.get("terminal") {
        None => return,
        Some(Value::Object(terminal)) => terminal,
        Some(other) => {
            report.error(format!("terminal must be an object (got {other})"));
            return;
        }
    };
    for key in ["emoji", "username", "theme"] {
        if let Some(value) = terminal.get(key) {
            if !value.is_string() {
                report.error(format!("terminal.{key} must be a string (got {value})"));
            }
        }
    }
    for key in ["show_git_branch", "show_timestamp"] {
        if let Some(value) = terminal.get(key) {
            if !value.is_boolean() {
                report.error(format!("terminal.{key} must be true or false (got {value})"));
            }
        }
    }

    if let Some(emoji) = terminal.get("emoji").and_then(Value::as_str) {
        if symbol_count(emoji) > MAX_EMOJI_SYMBOLS {
            report.warn(format!(
                "terminal.emoji '{emoji}' is long; prompts look best with a single emoji"
            ));
        }
    }
    if let Some(username) = terminal.get("username").and_then(Value::as_str) {
        if username.chars().count() > MAX_TERMINAL_USERNAME_CHARS {
            report.warn(format!(
                "terminal.username is longer than {MAX_TERMINAL_USERNAME_CHARS} characters"
            ));
        }
    }
}
