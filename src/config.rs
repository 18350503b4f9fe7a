//! Service Configuration
//!
//! The JSON configuration a service instance boots from. Keys use the camelCase names of
//! existing service config files; unrelated sections (a store URL block, for instance) are
//! ignored so the same file can feed other tooling.

use crate::error::{HydraError, Result};

use serde::{Deserialize, Serialize};
use std::path::Path;

const RESERVED_NAME_CHARS: [char; 5] = [':', '*', '?', '[', ']'];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HydraConfig {
    pub service_name: String,
    pub service_description: String,
    #[serde(rename = "serviceIP")]
    pub service_ip: String,
    #[serde(rename = "serviceDNS")]
    pub service_dns: String,
    /// `name/netmask`, e.g. `eth0/255.255.255.0`.
    pub service_interface: String,
    pub service_port: u16,
    pub service_type: String,
    pub service_version: String,
}

#[derive(Deserialize)]
struct Wrapped {
    hydra: HydraConfig,
}

impl HydraConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Parses either a bare config object or one nested under a top-level `"hydra"` key.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let config = if value.get("hydra").is_some() {
            serde_json::from_value::<Wrapped>(value)?.hydra
        } else {
            serde_json::from_value(value)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HydraError::Config(format!("unable to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Rejects names that would break key layout (`:`) or key pattern matching (glob syntax).
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(HydraError::Config("serviceName is required".to_string()));
        }
        let reserved = self
            .service_name
            .chars()
            .find(|c| RESERVED_NAME_CHARS.contains(c));
        if let Some(bad) = reserved {
            return Err(HydraError::Config(format!(
                "serviceName {} must not contain '{}'",
                self.service_name, bad
            )));
        }
        Ok(())
    }
}
