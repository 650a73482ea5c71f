//! Watch source over the live call log
//!
//! Plays the role of a content-observer registration: subscribers get one
//! notice per insert into the `calls` table (possibly coalesced if they lag)
//! and re-read the head row to decide what, if anything, is new. The notice
//! stream is fed by the store's broadcast channel, never by polling.

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use courier_core::record::{ChangeNotice, DeviceIdentity, HeadRecord};
use courier_core::traits::WatchSource;
use courier_core::{Error, Result};

use crate::collectors::normalize_call;
use crate::store::DeviceStore;

/// Watch source over the call log table of a [`DeviceStore`]
pub struct CallLogWatchSource {
    store: Arc<DeviceStore>,
    device: DeviceIdentity,
}

impl CallLogWatchSource {
    /// Create a watch source stamping records with the given identity
    pub fn new(store: Arc<DeviceStore>, device: DeviceIdentity) -> Self {
        Self { store, device }
    }
}

#[async_trait]
impl WatchSource for CallLogWatchSource {
    async fn head(&self) -> Result<Option<HeadRecord>> {
        let row = self
            .store
            .head_call()
            .map_err(|e| Error::source_unavailable(e.to_string()))?;

        match row {
            Some(row) => {
                let record = normalize_call(&self.device, &row)?;
                Ok(Some(HeadRecord {
                    row_id: row.id,
                    record,
                }))
            }
            None => Ok(None),
        }
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>> {
        let rx = self.store.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| match item {
            Ok(notice) => Some(notice),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                // Safe to drop: the next notice triggers a head re-read that
                // covers everything the missed notices pointed at.
                warn!(missed, "change notice subscriber lagged");
                None
            }
        });
        Box::pin(stream)
    }

    fn source_name(&self) -> &'static str {
        "sqlite-calllog"
    }
}
