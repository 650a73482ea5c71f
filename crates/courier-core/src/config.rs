//! Configuration types for the courier agent
//!
//! This module defines all configuration structures used throughout the
//! crate. Behavioral toggles live here and are injected at construction;
//! nothing in the pipeline reads process-wide mutable state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::record::Capability;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Uplink (remote collector) configuration
    pub uplink: UplinkConfig,

    /// Durable store for the device identifier
    #[serde(default)]
    pub identity_store: IdentityStoreConfig,

    /// Data source configuration
    pub source: SourceConfig,

    /// Capability grants, re-read on every collection pass
    #[serde(default)]
    pub permissions: HashMap<Capability, bool>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AgentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.uplink.validate()?;
        self.source.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// TLS trust mode for the uplink transport
///
/// `Strict` performs full certificate-chain and hostname validation and is
/// the default. `DangerAcceptInvalidCerts` disables certificate validation
/// and exists only for development against self-signed collectors; enabling
/// it logs a warning at client construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Full certificate validation (default)
    #[default]
    Strict,
    /// Accept invalid certificates (development only)
    DangerAcceptInvalidCerts,
}

/// Uplink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UplinkConfig {
    /// HTTP uplink to the remote collector API
    Http {
        /// Base URL of the collector (e.g. "https://collector.example.net")
        base_url: String,
        /// Static bearer token attached to every request
        access_token: String,
        /// TLS trust mode
        #[serde(default)]
        tls_mode: TlsMode,
        /// Request timeout in seconds
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom uplink
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl UplinkConfig {
    /// Validate the uplink configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            UplinkConfig::Http {
                base_url,
                access_token,
                timeout_secs,
                ..
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("uplink base URL cannot be empty"));
                }
                if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                    return Err(crate::Error::config(
                        "uplink base URL must use http or https scheme",
                    ));
                }
                if access_token.is_empty() {
                    return Err(crate::Error::config("uplink access token cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("uplink timeout must be > 0"));
                }
                Ok(())
            }
            UplinkConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("custom uplink factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("custom uplink config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the uplink type name
    pub fn type_name(&self) -> &str {
        match self {
            UplinkConfig::Http { .. } => "http",
            UplinkConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Durable identity store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityStoreConfig {
    /// File-backed store (identifier survives restarts)
    File {
        /// Path to the identity file
        path: String,
    },

    /// In-memory store (identifier is regenerated each run)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

/// Data source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// SQLite-backed device store
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Sqlite { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("source database path cannot be empty"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("custom source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Sqlite { .. } => "sqlite",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between full sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Recent-history horizon for windowed queries, in seconds
    ///
    /// Only records newer than "now − lookback" are collected. The window
    /// deliberately overlaps consecutive sweeps; the remote collector is
    /// expected to deduplicate re-offered records (at-least-once contract).
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,

    /// Hard cap on records per batch for textual kinds
    #[serde(default = "default_max_records_per_batch")]
    pub max_records_per_batch: usize,

    /// Hard cap on records per batch for image captures
    #[serde(default = "default_max_images_per_batch")]
    pub max_images_per_batch: usize,

    /// Capacity of the internal event channel
    ///
    /// When full, new engine events are dropped (with a warning log) rather
    /// than blocking the sweep or the watcher.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sweep_interval_secs == 0 {
            return Err(crate::Error::config("sweep interval must be > 0"));
        }
        if self.lookback_secs == 0 {
            return Err(crate::Error::config("lookback window must be > 0"));
        }
        if self.max_records_per_batch == 0 || self.max_images_per_batch == 0 {
            return Err(crate::Error::config("batch caps must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            lookback_secs: default_lookback_secs(),
            max_records_per_batch: default_max_records_per_batch(),
            max_images_per_batch: default_max_images_per_batch(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    900
}

fn default_lookback_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_records_per_batch() -> usize {
    100
}

fn default_max_images_per_batch() -> usize {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_http_timeout_secs() -> u64 {
    30
}
