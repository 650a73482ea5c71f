//! Error types for the courier pipeline
//!
//! No error in this taxonomy is fatal to the agent: the engine and watcher
//! degrade to delivering fewer records rather than stopping.

use thiserror::Error;

/// Result type alias for courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the courier pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// The underlying data source cannot be opened at all
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single row could not be decoded into a record
    #[error("record decode error: {0}")]
    RecordDecode(String),

    /// Uplink rejected or failed to deliver a batch
    #[error("uplink error ({endpoint}): {message}")]
    Uplink {
        /// Endpoint path the request was routed to
        endpoint: String,
        /// Error message (includes status and body where available)
        message: String,
    },

    /// Transport-level failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// The durable identity store failed to read or write
    #[error("identity persistence error: {0}")]
    IdentityPersistence(String),

    /// Local store (spool database, state file) errors
    #[error("store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a record decode error
    pub fn record_decode(msg: impl Into<String>) -> Self {
        Self::RecordDecode(msg.into())
    }

    /// Create an uplink error
    pub fn uplink(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Uplink {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an identity persistence error
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::IdentityPersistence(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
