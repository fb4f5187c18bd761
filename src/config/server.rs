//! Health endpoint configuration types.

use serde::Deserialize;

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Serve the health endpoint.
    pub enabled: bool,
    /// Host to bind to.
    pub host: String,
    /// Port for the health endpoint.
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}
