//! Server configuration.
//!
//! Loaded from a YAML file with CLI overrides applied in `main`; validated
//! before the listeners start.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_port() -> u16 {
    1080
}

fn default_forward_timeout_ms() -> u64 {
    30_000
}

fn default_callback_timeout_ms() -> u64 {
    10_000
}

fn default_max_log_entries() -> usize {
    100_000
}

fn default_max_expectations() -> usize {
    10_000
}

/// Policy applied when no expectation matches a data-plane request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Answer unmatched requests with a fixed 404.
    #[default]
    Mock,
    /// Forward unmatched requests to their original destination.
    Proxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: ServerMode,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional HTTPS listener; requests arriving here match `secure: true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,
    #[serde(default = "default_callback_timeout_ms")]
    pub callback_timeout_ms: u64,
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
    #[serde(default = "default_max_expectations")]
    pub max_expectations: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Mock,
            port: default_port(),
            tls: None,
            forward_timeout_ms: default_forward_timeout_ms(),
            callback_timeout_ms: default_callback_timeout_ms(),
            max_log_entries: default_max_log_entries(),
            max_expectations: default_max_expectations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub port: u16,
    pub cert_path: String,
    pub key_path: String,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.forward_timeout_ms == 0 {
            anyhow::bail!("forward_timeout_ms must be greater than zero");
        }
        if self.callback_timeout_ms == 0 {
            anyhow::bail!("callback_timeout_ms must be greater than zero");
        }
        if let Some(tls) = &self.tls {
            if tls.port == self.port {
                anyhow::bail!(
                    "tls.port {} collides with the plain listener port",
                    tls.port
                );
            }
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                anyhow::bail!("tls requires both cert_path and key_path");
            }
        }
        Ok(())
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    /// All ports this configuration binds, plain listener first.
    pub fn bound_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.port];
        if let Some(tls) = &self.tls {
            ports.push(tls.port);
        }
        ports
    }
}
