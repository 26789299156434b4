use crate::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Backend a document selects. `Docker` is the container backend, `Vagrant`
/// the virtual-machine backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Docker,
    Vagrant,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Docker, Provider::Vagrant];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Docker => "docker",
            Provider::Vagrant => "vagrant",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedProvider(s.to_owned()))
    }
}

/// Pick the backend for a merged document. An absent `provider` means docker.
pub fn resolve_provider(doc: &Value) -> Result<Provider, ConfigError> {
    match doc.get("provider") {
        None | Some(Value::Null) => Ok(Provider::default()),
        Some(Value::String(s)) => s.parse(),
        Some(other) => Err(ConfigError::UnsupportedProvider(other.to_string())),
    }
}
