use serde_json::Value;
use std::sync::OnceLock;

/// The bundled default document every user `vm.json` is merged onto.
pub const DEFAULT_CONFIG_JSON: &str = include_str!("../defaults/vm.json");

static DEFAULTS: OnceLock<Value> = OnceLock::new();

/// Parsed default document. Loaded once per process and never mutated;
/// callers that need a writable copy clone it.
pub fn default_document() -> &'static Value {
    DEFAULTS.get_or_init(|| {
        serde_json::from_str(DEFAULT_CONFIG_JSON).expect("bundled defaults/vm.json is valid JSON")
    })
}
