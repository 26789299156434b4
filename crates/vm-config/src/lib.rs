//! Configuration resolution for `vm`.
//!
//! This crate owns everything between "where is the user's `vm.json`" and
//! "here is a merged, validated document": the bundled defaults
//! (`default_document`), upward directory discovery (`discover`), the deep
//! merge of user over defaults (`merge`), validation with blocking errors and
//! advisory warnings (`validate`), provider resolution (`resolve_provider`),
//! the typed read-only view handed to backends (`VmConfig`), and the
//! generators behind `vm init` / `vm generate`.

pub mod config;
pub mod defaults;
pub mod discovery;
pub mod document;
pub mod generate;
pub mod loader;
pub mod merge;
pub mod provider;
pub mod validate;

#[cfg(test)]
mod proptests;

pub use config::{ProjectSection, ServiceConfig, TerminalSection, VmConfig, VmSection};
pub use defaults::{default_document, DEFAULT_CONFIG_JSON};
pub use discovery::{
    discover, ConfirmPrompt, DeclinePrompt, DiscoveredConfig, CONFIG_FILE_NAME, MAX_SCAN_DEPTH,
};
pub use document::{lookup, parse_document_file, parse_document_str};
pub use generate::{
    derive_project_name, generate_document, initial_document, parse_port_assignment,
    sanitize_project_name, write_document, GenerateOptions,
};
pub use loader::{load, LoadRequest, LoadedConfig};
pub use merge::{merge, merge_into};
pub use provider::{resolve_provider, Provider};
pub use validate::{validate, ValidationReport};

use std::path::PathBuf;
use thiserror::Error;

/// Marker every discovery failure message contains, so wrapping scripts can
/// grep for it.
pub const NOT_FOUND_MARKER: &str = "No vm.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No vm.json found {0}")]
    NotFound(String),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} must contain a JSON object at the top level", .0.display())]
    NotAnObject(PathBuf),
    #[error("configuration has {} error(s):\n  - {}", .0.len(), .0.join("\n  - "))]
    Validation(Vec<String>),
    #[error("unsupported provider '{0}' (expected one of: docker, vagrant)")]
    UnsupportedProvider(String),
    #[error("merged configuration has an unexpected shape: {0}")]
    Shape(String),
    #[error("unknown service '{name}' (available: {available})")]
    UnknownService { name: String, available: String },
    #[error("invalid port assignment '{0}', expected '<name>=<port>' with port in 1-65535")]
    InvalidPortAssignment(String),
    #[error("refusing to overwrite existing {} (pass --force)", .0.display())]
    AlreadyExists(PathBuf),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
