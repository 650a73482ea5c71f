//! Core agent engine (scheduler)
//!
//! The AgentEngine is responsible for:
//! - Driving periodic full sweeps over every registered collector
//! - Owning the change watcher's lifecycle (started once, stopped at shutdown)
//! - Registering the device with the collector before the first sweep
//! - Batching per-kind results and dispatching them to the uplink
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ChangeNotice   ┌───────────────┐
//! │ WatchSource  │─────────────────▶│ ChangeWatcher │──┐
//! └──────────────┘                  └───────────────┘  │ single-record
//!                                                      │ batches
//! ┌──────────────┐   sweep tick     ┌───────────────┐  ▼
//! │  Collectors  │◀─────────────────│  AgentEngine  │──────▶ Uplink
//! └──────────────┘                  └───────────────┘ capped batches
//!        ▲                                  │
//!        └───── PermissionGate (per pass) ──┘
//! ```
//!
//! ## Sweep Flow
//!
//! 1. Tick fires (the first tick fires immediately: catch-up sweep)
//! 2. Every collector runs with a fresh context (gate re-read, UTC now,
//!    lookback window)
//! 3. Non-empty harvests are split into capped per-kind batches
//! 4. Each batch is dispatched to the uplink on a detached task
//!    (fire-and-forget: a failed batch is logged and dropped, and the
//!    overlapping window of the next sweep re-offers the data)

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::record::{Capability, DeviceIdentity, DeviceProfile, RecordKind, RowId, UploadBatch};
use crate::traits::{CollectContext, Collector, Harvest, PermissionGate, Uplink, WatchSource};
use crate::watcher::ChangeWatcher;

/// Events emitted by the AgentEngine (and the watcher it owns)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { collectors: usize },

    /// Device registration accepted by the collector
    DeviceRegistered,

    /// Device registration failed (non-fatal)
    DeviceRegistrationFailed { error: String },

    /// A sweep began
    SweepStarted { sweep: u64 },

    /// A sweep finished; `batches` batches were dispatched
    SweepCompleted { sweep: u64, batches: usize },

    /// A collector was skipped because its capability is denied
    SourceSkipped { capability: Capability },

    /// A collector's source was unavailable for this pass
    SourceFailed { source: String, error: String },

    /// A batch was handed to the uplink
    BatchDispatched { kind: RecordKind, records: usize },

    /// The uplink accepted a batch
    BatchDelivered { kind: RecordKind, records: usize },

    /// The uplink rejected or failed to deliver a batch (batch dropped)
    BatchFailed { kind: RecordKind, error: String },

    /// The change watcher subscribed to its source
    WatcherStarted,

    /// The watcher forwarded a new row
    WatcherForwarded { row_id: RowId },

    /// The watcher unsubscribed and exited
    WatcherStopped,

    /// Engine stopped
    Stopped { reason: String },
}

/// Core agent engine
///
/// ## Lifecycle
///
/// 1. Create with [`AgentEngine::new()`]
/// 2. Start with [`AgentEngine::run()`]
/// 3. Engine runs until a shutdown signal is received
///
/// ## Threading
///
/// Sweeps run on the engine's task; collectors execute sequentially within a
/// sweep, while upload dispatches and the watcher run on their own tasks.
/// In-flight uploads are not awaited at shutdown (fire-and-forget).
pub struct AgentEngine {
    /// Registered source collectors
    collectors: Vec<Box<dyn Collector>>,

    /// Live source observed by the change watcher (optional)
    watch_source: Option<Arc<dyn WatchSource>>,

    /// Single choke point to the network
    uplink: Arc<dyn Uplink>,

    /// Host-owned capability grants
    gate: Arc<dyn PermissionGate>,

    /// Identity stamped into contexts and registration
    device: DeviceIdentity,

    /// Static device description for registration
    profile: DeviceProfile,

    /// Engine settings (validated at construction)
    config: EngineConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl AgentEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events for monitoring.
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        watch_source: Option<Arc<dyn WatchSource>>,
        uplink: Arc<dyn Uplink>,
        gate: Arc<dyn PermissionGate>,
        device: DeviceIdentity,
        profile: DeviceProfile,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            collectors,
            watch_source,
            uplink,
            gate,
            device,
            profile,
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until a shutdown signal (SIGINT) is received
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Test-only helper to run the engine with a controlled shutdown signal
    ///
    /// **TESTING ONLY**: contract tests require controlled shutdown.
    /// Production code should use `run()`, which manages shutdown via OS
    /// signals.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            collectors: self.collectors.len(),
        });

        // Register the device before the first sweep. Best-effort: a failed
        // registration is logged and sweeps proceed.
        match self
            .uplink
            .register_device(&self.device, &self.profile)
            .await
        {
            Ok(()) => {
                info!(device = %self.device, "device registered with collector");
                self.emit_event(EngineEvent::DeviceRegistered);
            }
            Err(e) => {
                warn!(error = %e, "device registration failed, continuing");
                self.emit_event(EngineEvent::DeviceRegistrationFailed {
                    error: e.to_string(),
                });
            }
        }

        // Start the change watcher exactly once.
        let watcher = self.watch_source.as_ref().map(|source| {
            ChangeWatcher::start(
                Arc::clone(source),
                Arc::clone(&self.uplink),
                self.event_tx.clone(),
            )
        });

        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.sweep_interval_secs));
        let mut sweep: u64 = 0;

        // Main loop. The first interval tick completes immediately, so a
        // freshly started agent performs a catch-up sweep instead of waiting
        // a full period.
        let reason = if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for the provided shutdown signal
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sweep += 1;
                        self.run_sweep(sweep).await;
                    }
                    _ = &mut rx => {
                        info!("shutdown signal received");
                        break "shutdown signal";
                    }
                }
            }
        } else {
            // Production mode: wait for SIGINT
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sweep += 1;
                        self.run_sweep(sweep).await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        break "shutdown signal";
                    }
                }
            }
        };

        // Stop the watcher (unsubscribes and joins its task). In-flight
        // uploads are not awaited.
        if let Some(watcher) = watcher {
            watcher.stop().await;
        }

        self.emit_event(EngineEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("engine stopped");

        Ok(())
    }

    /// Run one full sweep over every registered collector
    async fn run_sweep(&self, sweep: u64) {
        debug!(sweep, "sweep started");
        self.emit_event(EngineEvent::SweepStarted { sweep });

        let ctx = CollectContext {
            device: &self.device,
            gate: self.gate.as_ref(),
            now: chrono::Utc::now(),
            lookback: chrono::Duration::seconds(self.config.lookback_secs as i64),
        };

        let mut batches = 0;
        for collector in &self.collectors {
            match collector.collect(&ctx).await {
                Ok(Harvest::Skipped) => {
                    debug!(
                        source = collector.source_name(),
                        capability = %collector.capability(),
                        "collector skipped, capability denied"
                    );
                    self.emit_event(EngineEvent::SourceSkipped {
                        capability: collector.capability(),
                    });
                }
                Ok(Harvest::Records(records)) => {
                    if records.is_empty() {
                        debug!(source = collector.source_name(), "nothing to deliver");
                        continue;
                    }
                    batches += self.dispatch_batches(collector.kind(), records);
                }
                Err(e) => {
                    // Source unavailable for this pass; other collectors
                    // still run.
                    error!(
                        source = collector.source_name(),
                        error = %e,
                        "collector failed"
                    );
                    self.emit_event(EngineEvent::SourceFailed {
                        source: collector.source_name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(sweep, batches, "sweep completed");
        self.emit_event(EngineEvent::SweepCompleted { sweep, batches });
    }

    /// Split a harvest into capped batches and dispatch each one
    fn dispatch_batches(&self, kind: RecordKind, records: Vec<crate::record::SourceRecord>) -> usize {
        let cap = match kind {
            RecordKind::ImageCapture => self.config.max_images_per_batch,
            _ => self.config.max_records_per_batch,
        };

        let mut dispatched = 0;
        for chunk in records.chunks(cap) {
            match UploadBatch::new(kind, chunk.to_vec()) {
                Some(batch) => {
                    dispatch_upload(
                        Arc::clone(&self.uplink),
                        batch,
                        self.event_tx.clone(),
                    );
                    dispatched += 1;
                }
                None => {
                    // A collector yielded a record of a foreign kind; skip
                    // the chunk rather than ship a mixed batch.
                    warn!(kind = %kind, "collector produced mixed-kind records, chunk dropped");
                }
            }
        }
        dispatched
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            // Channel full: event processing is slower than generation.
            // Dropping bounds memory; the log is the fallback signal.
            warn!("event channel full, dropping engine event");
        }
    }
}

/// Dispatch one batch to the uplink on a detached task
///
/// Fire-and-forget: the task logs the outcome and emits an event, and nobody
/// joins it. A transport failure drops the batch without retry; the next
/// sweep or watcher notice naturally re-offers current data.
pub(crate) fn dispatch_upload(
    uplink: Arc<dyn Uplink>,
    batch: UploadBatch,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let kind = batch.kind;
    let records = batch.len();

    if event_tx
        .try_send(EngineEvent::BatchDispatched { kind, records })
        .is_err()
    {
        warn!("event channel full, dropping dispatch event");
    }

    tokio::spawn(async move {
        match uplink.send(&batch).await {
            Ok(()) => {
                debug!(kind = %kind, records, "batch delivered");
                let _ = event_tx.try_send(EngineEvent::BatchDelivered { kind, records });
            }
            Err(e) => {
                warn!(kind = %kind, records, error = %e, "batch delivery failed, dropped");
                let _ = event_tx.try_send(EngineEvent::BatchFailed {
                    kind,
                    error: e.to_string(),
                });
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_events_are_comparable() {
        let event = EngineEvent::SweepStarted { sweep: 1 };
        assert_eq!(event.clone(), event);
        assert_ne!(event, EngineEvent::SweepCompleted { sweep: 1, batches: 0 });
    }
}
