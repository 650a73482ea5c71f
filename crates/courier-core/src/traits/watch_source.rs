// # Watch Source Trait
//
// Defines the interface for observing a live, append-only data source.
//
// ## Implementations
//
// - SQLite call log: `courier-source-sqlite` crate
//
// ## Design
//
// Change notices are untrusted hints. The host runtime may coalesce several
// mutations into one notice, drop notices, or deliver them with no payload;
// the watcher therefore re-reads `head()` on every notice and compares row
// identifiers against its watermark. A watch source only has to guarantee
// that `head()` is correct at the moment it runs.
//
// Watch sources are observers: they must not upload, must not decide whether
// a row is new (that is the watcher's watermark), and must not spawn polling
// loops. The notice stream has to be event-driven.

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::record::{ChangeNotice, HeadRecord};

/// Trait for live-source implementations watched by the change watcher
#[async_trait]
pub trait WatchSource: Send + Sync {
    /// Query the current newest row of the source
    ///
    /// # Returns
    ///
    /// - `Ok(Some(HeadRecord))`: the newest row, normalized
    /// - `Ok(None)`: the source is empty
    /// - `Err(Error)`: the source could not be queried
    async fn head(&self) -> Result<Option<HeadRecord>, crate::Error>;

    /// Subscribe to change notices
    ///
    /// The stream yields one notice per observed mutation (possibly
    /// coalesced) and runs until the source is dropped. Dropping the stream
    /// unregisters the subscription.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>>;

    /// Short source name for logging/diagnostics
    fn source_name(&self) -> &'static str;
}
