//! Typed compose projection of a merged document.
//!
//! The file exists only while `docker compose` needs it; it is derived
//! entirely from the document and never edited by hand.

use crate::backend::{BackendOptions, UnitSpec};
use crate::playbook::TOOL_MOUNT;
use crate::BackendError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";
/// Label carried by every container this tool creates; `list` filters on it.
pub const PROJECT_LABEL: &str = "dev.vm.project";
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, ComposeService>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, NamedVolume>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeService {
    pub build: BuildSpec,
    pub image: String,
    pub container_name: String,
    pub hostname: String,
    pub tty: bool,
    pub stdin_open: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub mem_limit: String,
    pub cpus: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSpec {
    pub context: String,
    pub dockerfile: String,
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamedVolume {}

/// Container-side data directory for each persistable database service.
fn database_data_dir(service: &str) -> Option<&'static str> {
    match service {
        "postgresql" => Some("/var/lib/postgresql"),
        "redis" => Some("/var/lib/redis"),
        "mongodb" => Some("/var/lib/mongodb"),
        _ => None,
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Project the merged document onto a compose file.
pub fn compose_for(spec: &UnitSpec, options: &BackendOptions) -> ComposeFile {
    let config = &spec.config;
    let unit = spec.unit_name();
    let user = &config.vm.user;
    let name = &config.project.name;

    let mut build_args = BTreeMap::new();
    build_args.insert("PROJECT_USER".to_owned(), user.clone());
    if let Some(tz) = &config.vm.timezone {
        build_args.insert("TZ".to_owned(), tz.clone());
    }

    let ports = config
        .ports
        .values()
        .map(|port| format!("{}:{port}:{port}", config.vm.port_binding))
        .collect();

    let mut volumes = vec![
        format!(
            "{}:{}",
            display(&spec.project_dir),
            config.project.workspace_path
        ),
        format!("{}:{TOOL_MOUNT}:ro", display(&options.tool_dir)),
    ];
    if let Some(home) = &spec.home_dir {
        if config.claude_sync {
            volumes.push(format!(
                "{}:/home/{user}/.claude",
                display(&home.join(".claude/vms").join(name))
            ));
        }
        if config.gemini_sync {
            volumes.push(format!(
                "{}:/home/{user}/.gemini",
                display(&home.join(".gemini/vms").join(name))
            ));
        }
    }

    let mut named = BTreeMap::new();
    if config.persist_databases {
        for db in config.enabled_databases() {
            if let Some(dir) = database_data_dir(db) {
                let volume = format!("{unit}-{db}-data");
                volumes.push(format!("{volume}:{dir}"));
                named.insert(volume, NamedVolume::default());
            }
        }
    }

    if config.service_enabled("docker") {
        volumes.push(format!("{DOCKER_SOCKET}:{DOCKER_SOCKET}"));
    }

    let mut environment: BTreeMap<String, String> = config.environment.clone();
    if let Some(tz) = &config.vm.timezone {
        environment.entry("TZ".to_owned()).or_insert_with(|| tz.clone());
    }

    let mut labels = BTreeMap::new();
    labels.insert(PROJECT_LABEL.to_owned(), name.clone());

    let service = ComposeService {
        build: BuildSpec {
            context: display(&options.tool_dir),
            dockerfile: "providers/docker/Dockerfile".to_owned(),
            args: build_args,
        },
        image: format!("{unit}:latest"),
        container_name: unit.clone(),
        hostname: config.project.hostname.clone(),
        tty: true,
        stdin_open: true,
        ports,
        volumes,
        environment,
        labels,
        mem_limit: format!("{}m", config.vm.memory),
        cpus: config.vm.cpus.to_string(),
    };

    let mut services = BTreeMap::new();
    services.insert(unit, service);
    ComposeFile {
        services,
        volumes: named,
    }
}

pub fn compose_path(spec: &UnitSpec) -> PathBuf {
    spec.generated_dir().join(COMPOSE_FILE_NAME)
}

/// A rendered compose file on disk, removed on drop along with the
/// generated directory when nothing else lives there.
pub struct ComposeArtifact {
    path: PathBuf,
}

impl ComposeArtifact {
    pub fn write(spec: &UnitSpec, options: &BackendOptions) -> Result<Self, BackendError> {
        let path = compose_path(spec);
        let write_err = |source| BackendError::Write {
            path: path.clone(),
            source,
        };
        let rendered = serde_yaml::to_string(&compose_for(spec, options))?;
        fs::create_dir_all(spec.generated_dir()).map_err(write_err)?;
        fs::write(&path, rendered).map_err(write_err)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ComposeArtifact {
    fn drop(&mut self) {
        remove_generated(&self.path);
    }
}

/// Remove a generated descriptor and its directory if that leaves it empty.
pub fn remove_generated(path: &Path) {
    let _ = fs::remove_file(path);
    if let Some(dir) = path.parent() {
        // Only succeeds when empty.
        let _ = fs::remove_dir(dir);
    }
}
