//! Change watcher
//!
//! Observes one live, append-only source and forwards new rows to the uplink
//! as single-record batches, exactly once per row per process lifetime.
//!
//! ## State machine
//!
//! ```text
//! Idle ── start ──▶ Subscribed ── notice ──▶ Reacting
//!   ▲                   ▲                        │
//!   └──── stop ─────────┴──── handled ───────────┘
//! ```
//!
//! On every notice the watcher re-reads the source head instead of trusting
//! the notice payload: notices may be coalesced, dropped, or empty, and the
//! watcher stays idempotent as long as the head query is correct at the
//! moment it runs. A second notice arriving while one is being handled
//! queues in the stream and is handled after, never dropped.
//!
//! ## Watermark
//!
//! The watermark holds the row id of the last record handed to the uplink.
//! It is owned by the watcher task (single writer), monotonically
//! non-decreasing while the process lives, and advanced immediately before
//! the send is dispatched so a duplicate notice cannot forward the same row
//! twice. It is deliberately not persisted: after a restart the head row is
//! re-offered and the remote end deduplicates (at-least-once contract).
//!
//! The watcher is latest-only by design: if several rows land between two
//! notices, only the newest is forwarded here. The periodic sweep's
//! overlapping lookback window recovers the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, dispatch_upload};
use crate::record::{RowId, UploadBatch};
use crate::traits::{Uplink, WatchSource};

/// Sentinel meaning "no row forwarded yet"
const WATERMARK_NONE: i64 = i64::MIN;

/// Observable watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Not subscribed (before start / after stop)
    Idle,
    /// Subscribed and waiting for notices
    Subscribed,
    /// Handling a notice
    Reacting,
}

impl WatcherState {
    fn as_u8(self) -> u8 {
        match self {
            WatcherState::Idle => 0,
            WatcherState::Subscribed => 1,
            WatcherState::Reacting => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatcherState::Subscribed,
            2 => WatcherState::Reacting,
            _ => WatcherState::Idle,
        }
    }
}

/// The change watcher
pub struct ChangeWatcher;

impl ChangeWatcher {
    /// Start watching: registers the subscription and spawns the watcher task
    ///
    /// The watcher runs until [`WatcherHandle::stop`] is called or the handle
    /// is dropped.
    pub fn start(
        source: Arc<dyn WatchSource>,
        uplink: Arc<dyn Uplink>,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> WatcherHandle {
        let watermark = Arc::new(AtomicI64::new(WATERMARK_NONE));
        let state = Arc::new(AtomicU8::new(WatcherState::Idle.as_u8()));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task_watermark = Arc::clone(&watermark);
        let task_state = Arc::clone(&state);

        let task: JoinHandle<()> = tokio::spawn(async move {
            let mut notices = source.watch();
            task_state.store(WatcherState::Subscribed.as_u8(), Ordering::Release);
            info!(source = source.source_name(), "change watcher subscribed");
            emit(&event_tx, EngineEvent::WatcherStarted);

            loop {
                tokio::select! {
                    maybe_notice = notices.next() => {
                        match maybe_notice {
                            Some(notice) => {
                                task_state.store(WatcherState::Reacting.as_u8(), Ordering::Release);
                                debug!(source = %notice.source, "change notice received");
                                handle_notice(&source, &uplink, &task_watermark, &event_tx).await;
                                task_state.store(WatcherState::Subscribed.as_u8(), Ordering::Release);
                            }
                            None => {
                                warn!(
                                    source = source.source_name(),
                                    "notice stream ended, watcher exiting"
                                );
                                break;
                            }
                        }
                    }
                    _ = &mut stop_rx => {
                        info!(source = source.source_name(), "change watcher stop requested");
                        break;
                    }
                }
            }

            // Dropping the stream unregisters the subscription.
            drop(notices);
            task_state.store(WatcherState::Idle.as_u8(), Ordering::Release);
            emit(&event_tx, EngineEvent::WatcherStopped);
        });

        WatcherHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            watermark,
            state,
        }
    }
}

/// Handle one change notice: re-read the head and forward if strictly newer
async fn handle_notice(
    source: &Arc<dyn WatchSource>,
    uplink: &Arc<dyn Uplink>,
    watermark: &AtomicI64,
    event_tx: &mpsc::Sender<EngineEvent>,
) {
    let head = match source.head().await {
        Ok(Some(head)) => head,
        Ok(None) => {
            debug!(source = source.source_name(), "source empty on notice");
            return;
        }
        Err(e) => {
            warn!(
                source = source.source_name(),
                error = %e,
                "head query failed, notice dropped"
            );
            return;
        }
    };

    let last = watermark.load(Ordering::Acquire);
    if last != WATERMARK_NONE && head.row_id <= last {
        debug!(
            row_id = head.row_id,
            watermark = last,
            "head not newer than watermark, no-op"
        );
        return;
    }

    // Advance the marker before the send is dispatched: a duplicate notice
    // racing the upload must compare against the new value.
    watermark.store(head.row_id, Ordering::Release);
    emit(event_tx, EngineEvent::WatcherForwarded { row_id: head.row_id });

    dispatch_upload(
        Arc::clone(uplink),
        UploadBatch::single(head.record),
        event_tx.clone(),
    );
}

fn emit(event_tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if event_tx.try_send(event).is_err() {
        warn!("event channel full, dropping watcher event");
    }
}

/// Handle to a running watcher
///
/// Stopping unregisters the subscription and joins the watcher task. If the
/// handle is dropped without calling `stop`, the task notices the closed
/// channel and exits on its own.
pub struct WatcherHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    watermark: Arc<AtomicI64>,
    state: Arc<AtomicU8>,
}

impl WatcherHandle {
    /// Stop the watcher and wait for its task to finish
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "watcher task join failed");
            }
        }
    }

    /// Row id of the last forwarded record, if any
    pub fn last_forwarded(&self) -> Option<RowId> {
        match self.watermark.load(Ordering::Acquire) {
            WATERMARK_NONE => None,
            id => Some(id),
        }
    }

    /// Current watcher state
    pub fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.state.load(Ordering::Acquire))
    }
}
