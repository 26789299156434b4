use crate::ConfigError;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Parse a configuration document. The top level must be a JSON object.
pub fn parse_document_str(input: &str, origin: &Path) -> Result<Value, ConfigError> {
    let value: Value = serde_json::from_str(input).map_err(|source| ConfigError::InvalidFormat {
        path: origin.to_path_buf(),
        source,
    })?;
    if !value.is_object() {
        return Err(ConfigError::NotAnObject(origin.to_path_buf()));
    }
    Ok(value)
}

/// Read and parse a configuration document from disk. Never cached: every
/// invocation sees the file as it is now.
pub fn parse_document_file(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document_str(&content, path)
}

/// Look up a dotted path such as `project.name` in a document.
pub fn lookup<'a>(doc: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(doc, |node, key| node.as_object()?.get(key))
}
