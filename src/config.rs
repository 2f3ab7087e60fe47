use std::net::SocketAddr;

use anyhow::Result;
use axum::http::HeaderValue;
use blob_store::BlobStorageConfig;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enable_tracing: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            enable_tracing: false,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Origins allowed to call the collector from a browser. `*` allows all.
    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: Vec<String>,
    #[serde(default)]
    pub blob_storage: BlobStorageConfig,
    #[serde(default)]
    pub structured_logging: bool,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            cors_allow_origins: default_cors_allow_origins(),
            blob_storage: Default::default(),
            structured_logging: false,
            telemetry: Default::default(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8985".to_string()
}

fn default_cors_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl ServerConfig {
    pub fn from_path(path: &str) -> Result<ServerConfig> {
        let config_str = std::fs::read_to_string(path)?;
        let config: ServerConfig = Figment::new().merge(Yaml::string(&config_str)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!(
                "invalid listen address: {}",
                self.listen_addr
            ));
        }
        if self.cors_allow_origins.is_empty() {
            return Err(anyhow::anyhow!(
                "cors_allow_origins must contain at least one origin"
            ));
        }
        for origin in &self.cors_allow_origins {
            if origin == "*" {
                continue;
            }
            // Origins are sent verbatim in response headers, so they must be
            // both a valid header value and an absolute URL.
            if origin.parse::<HeaderValue>().is_err() || origin.parse::<Url>().is_err() {
                return Err(anyhow::anyhow!("invalid cors origin: {}", origin));
            }
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.structured_logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = ServerConfig {
            listen_addr: "not-an-addr".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_cors_origin() {
        // A space parses as a header value byte but not as a URL.
        for origin in ["http://exa mple.com", "not a url", "example.com"] {
            let config = ServerConfig {
                cors_allow_origins: vec![origin.to_string()],
                ..Default::default()
            };
            assert!(
                config.validate().is_err(),
                "origin {:?} was not rejected",
                origin
            );
        }
    }

    #[test]
    fn test_explicit_cors_origin_is_valid() {
        let config = ServerConfig {
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            ..Default::default()
        };
        config.validate().unwrap();
    }
}
