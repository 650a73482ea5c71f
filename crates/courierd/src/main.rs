// # courierd - Courier Daemon
//
// Thin integration layer over courier-core: the daemon reads configuration
// from environment variables, initializes the runtime, registers the
// built-in source/uplink/identity-store implementations, and runs the agent
// engine until a shutdown signal arrives. All pipeline logic lives in
// courier-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Uplink
// - `COURIER_UPLINK_BASE_URL`: collector base URL (required)
// - `COURIER_UPLINK_TOKEN`: static bearer token (required)
// - `COURIER_UPLINK_TLS_MODE`: "strict" (default) or
//   "danger-accept-invalid-certs" (development only)
// - `COURIER_UPLINK_TIMEOUT_SECS`: request timeout (default 30)
//
// ### Engine
// - `COURIER_SWEEP_INTERVAL_SECS`: seconds between sweeps (default 900)
// - `COURIER_LOOKBACK_SECS`: collection window (default 86400)
//
// ### Source
// - `COURIER_SOURCE_DB_PATH`: path to the device store database (required)
//
// ### Identity
// - `COURIER_IDENTITY_STORE_TYPE`: "file" (default) or "memory"
// - `COURIER_IDENTITY_PATH`: identity file path (required for "file")
//
// ### Permissions
// - `COURIER_GRANTS`: comma-separated granted capabilities
//   (call_log, messages, app_messages, location, media_images)
//
// ### Misc
// - `COURIER_DEVICE_MODEL`: device model reported at registration
// - `COURIER_LOG_LEVEL`: trace|debug|info|warn|error (default info)
//
// ## Example
//
// ```bash
// export COURIER_UPLINK_BASE_URL=https://collector.example.net
// export COURIER_UPLINK_TOKEN=your_token
// export COURIER_SOURCE_DB_PATH=/var/lib/courier/device.db
// export COURIER_IDENTITY_PATH=/var/lib/courier/identity.json
// export COURIER_GRANTS=call_log,messages,location
//
// courierd
// ```

use anyhow::Result;
use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use courier_core::config::{
    AgentConfig, EngineConfig, IdentityStoreConfig, SourceConfig, TlsMode, UplinkConfig,
};
use courier_core::record::{Capability, DeviceProfile};
use courier_core::{AgentEngine, ComponentRegistry, IdentityManager, StaticPermissionGate};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CourierExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CourierExitCode> for ExitCode {
    fn from(code: CourierExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    uplink_base_url: String,
    uplink_token: String,
    uplink_tls_mode: String,
    uplink_timeout_secs: u64,
    sweep_interval_secs: u64,
    lookback_secs: u64,
    source_db_path: String,
    identity_store_type: String,
    identity_path: Option<String>,
    grants: Vec<String>,
    device_model: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            uplink_base_url: env::var("COURIER_UPLINK_BASE_URL")?,
            uplink_token: env::var("COURIER_UPLINK_TOKEN")?,
            uplink_tls_mode: env::var("COURIER_UPLINK_TLS_MODE")
                .unwrap_or_else(|_| "strict".to_string()),
            uplink_timeout_secs: env::var("COURIER_UPLINK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            sweep_interval_secs: env::var("COURIER_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(900),
            lookback_secs: env::var("COURIER_LOOKBACK_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(24 * 60 * 60),
            source_db_path: env::var("COURIER_SOURCE_DB_PATH")?,
            identity_store_type: env::var("COURIER_IDENTITY_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            identity_path: env::var("COURIER_IDENTITY_PATH").ok(),
            grants: env::var("COURIER_GRANTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            device_model: env::var("COURIER_DEVICE_MODEL")
                .unwrap_or_else(|_| "unknown".to_string()),
            log_level: env::var("COURIER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.uplink_base_url.is_empty() {
            anyhow::bail!(
                "COURIER_UPLINK_BASE_URL is required. \
                Set it via: export COURIER_UPLINK_BASE_URL=https://collector.example.net"
            );
        }

        if !self.uplink_base_url.starts_with("https://")
            && !self.uplink_base_url.starts_with("http://")
        {
            anyhow::bail!(
                "COURIER_UPLINK_BASE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.uplink_base_url
            );
        }

        if self.uplink_base_url.starts_with("http://") {
            eprintln!(
                "WARNING: COURIER_UPLINK_BASE_URL uses HTTP (not HTTPS). \
                      Records will travel unencrypted. Consider using HTTPS."
            );
        }

        if self.uplink_token.is_empty() {
            anyhow::bail!(
                "COURIER_UPLINK_TOKEN is required. \
                Set it via: export COURIER_UPLINK_TOKEN=your_token"
            );
        }

        if self.uplink_token.len() < 16 {
            anyhow::bail!(
                "COURIER_UPLINK_TOKEN appears too short ({} chars). \
                Verify your token is correct.",
                self.uplink_token.len()
            );
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.uplink_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower.contains("example")
        {
            anyhow::bail!(
                "COURIER_UPLINK_TOKEN appears to be a placeholder. \
                Use an actual token issued by your collector."
            );
        }

        match self.uplink_tls_mode.as_str() {
            "strict" => {}
            "danger-accept-invalid-certs" => {
                eprintln!(
                    "WARNING: COURIER_UPLINK_TLS_MODE disables certificate validation. \
                          This is a development-only mode."
                );
            }
            other => anyhow::bail!(
                "COURIER_UPLINK_TLS_MODE '{}' is not valid. \
                Valid modes: strict, danger-accept-invalid-certs",
                other
            ),
        }

        if !(1..=300).contains(&self.uplink_timeout_secs) {
            anyhow::bail!(
                "COURIER_UPLINK_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.uplink_timeout_secs
            );
        }

        if !(60..=86_400).contains(&self.sweep_interval_secs) {
            anyhow::bail!(
                "COURIER_SWEEP_INTERVAL_SECS must be between 60 and 86400 seconds. Got: {}",
                self.sweep_interval_secs
            );
        }

        if !(300..=7 * 86_400).contains(&self.lookback_secs) {
            anyhow::bail!(
                "COURIER_LOOKBACK_SECS must be between 300 seconds and 7 days. Got: {}",
                self.lookback_secs
            );
        }

        if self.source_db_path.is_empty() {
            anyhow::bail!(
                "COURIER_SOURCE_DB_PATH is required. \
                Set it via: export COURIER_SOURCE_DB_PATH=/var/lib/courier/device.db"
            );
        }

        match self.identity_store_type.as_str() {
            "file" => {
                if self.identity_path.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!(
                        "COURIER_IDENTITY_PATH is required when COURIER_IDENTITY_STORE_TYPE=file. \
                        Set it via: export COURIER_IDENTITY_PATH=/var/lib/courier/identity.json"
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "COURIER_IDENTITY_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        for grant in &self.grants {
            if Capability::parse(grant).is_none() {
                anyhow::bail!(
                    "COURIER_GRANTS contains unknown capability '{}'. \
                    Valid capabilities: call_log, messages, app_messages, location, media_images",
                    grant
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "COURIER_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }

    /// Build the core AgentConfig from the environment values
    fn to_agent_config(&self) -> AgentConfig {
        let tls_mode = match self.uplink_tls_mode.as_str() {
            "danger-accept-invalid-certs" => TlsMode::DangerAcceptInvalidCerts,
            _ => TlsMode::Strict,
        };

        let identity_store = match self.identity_store_type.as_str() {
            "memory" => IdentityStoreConfig::Memory,
            _ => IdentityStoreConfig::File {
                path: self.identity_path.clone().unwrap_or_default(),
            },
        };

        let permissions: HashMap<Capability, bool> = self
            .grants
            .iter()
            .filter_map(|name| Capability::parse(name))
            .map(|cap| (cap, true))
            .collect();

        AgentConfig {
            uplink: UplinkConfig::Http {
                base_url: self.uplink_base_url.clone(),
                access_token: self.uplink_token.clone(),
                tls_mode,
                timeout_secs: self.uplink_timeout_secs,
            },
            identity_store,
            source: SourceConfig::Sqlite {
                path: self.source_db_path.clone(),
            },
            permissions,
            engine: EngineConfig {
                sweep_interval_secs: self.sweep_interval_secs,
                lookback_secs: self.lookback_secs,
                ..EngineConfig::default()
            },
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CourierExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CourierExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CourierExitCode::ConfigError.into();
    }

    info!("Starting courierd daemon");
    info!(
        "Configuration loaded: {} capability grant(s), sweep every {}s",
        config.grants.len(),
        config.sweep_interval_secs
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CourierExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => CourierExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {}", e);
                CourierExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    // Create component registry and register built-ins
    let registry = ComponentRegistry::new();
    courier_core::registry::register_builtin_identity_stores(&registry);

    #[cfg(feature = "http-uplink")]
    {
        info!("Registering HTTP uplink");
        courier_uplink::register(&registry);
    }

    #[cfg(feature = "sqlite-source")]
    {
        info!("Registering SQLite source");
        courier_source_sqlite::register(&registry);
    }

    let agent_config = config.to_agent_config();
    agent_config.validate()?;

    // Resolve the device identity before anything else: the watch source
    // and the registration payload both need it.
    let identity_store = registry
        .create_identity_store(&agent_config.identity_store)
        .await?;
    let identity = IdentityManager::new(identity_store);
    let device = identity.get_or_create().await;
    info!(device = %device, "device identity resolved");

    let uplink = registry.create_uplink(&agent_config.uplink)?;
    let collectors = registry.create_collectors(&agent_config.source)?;
    let watch_source = registry.create_watch_source(&agent_config.source, &device)?;
    let gate = Arc::new(StaticPermissionGate::from_grants(
        agent_config.permissions.clone(),
    ));

    let profile = DeviceProfile {
        model: config.device_model.clone(),
        os_version: std::env::consts::OS.to_string(),
    };

    let (engine, mut events) = AgentEngine::new(
        collectors,
        Some(watch_source),
        uplink,
        gate,
        device,
        profile,
        agent_config.engine.clone(),
    )?;

    // Drain engine events into the log so the bounded channel never fills.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    info!("Starting agent engine");
    if let Err(e) = engine.run().await {
        warn!("Engine exited with error: {}", e);
        return Err(e.into());
    }

    info!("Shutting down daemon");
    Ok(())
}
