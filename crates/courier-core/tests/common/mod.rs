//! Test doubles and common utilities for architecture contract tests
//!
//! These doubles verify pipeline constraints (dedup, gating, failure
//! isolation, shutdown) without touching a real store or the network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;

use courier_core::config::EngineConfig;
use courier_core::record::{
    CallDirection, Capability, ChangeNotice, DeviceIdentity, DeviceProfile, HeadRecord,
    MessageDirection, RecordKind, RecordPayload, RowId, SourceRecord, UploadBatch,
};
use courier_core::traits::{CollectContext, Collector, Harvest, Uplink, WatchSource};
use courier_core::{Error, Result};

/// A watch source whose head and notices are controlled by the test
pub struct ScriptedWatchSource {
    notice_rx: Mutex<Option<mpsc::UnboundedReceiver<ChangeNotice>>>,
    head: Arc<Mutex<Option<HeadRecord>>>,
    head_call_count: Arc<AtomicUsize>,
}

/// Test-side controller for a [`ScriptedWatchSource`]
pub struct WatchController {
    notice_tx: mpsc::UnboundedSender<ChangeNotice>,
    head: Arc<Mutex<Option<HeadRecord>>>,
    head_call_count: Arc<AtomicUsize>,
}

impl WatchController {
    /// Replace the head row the source will report
    pub fn set_head(&self, row_id: RowId, record: SourceRecord) {
        *self.head.lock().unwrap() = Some(HeadRecord { row_id, record });
    }

    /// Emit one change notice (payload deliberately content-free)
    pub fn notify(&self) {
        let _ = self.notice_tx.send(ChangeNotice::new("scripted"));
    }

    /// How many times the watcher re-read the head
    pub fn head_call_count(&self) -> usize {
        self.head_call_count.load(Ordering::SeqCst)
    }
}

/// Create a scripted watch source and its controller
pub fn scripted_watch_source() -> (Arc<ScriptedWatchSource>, WatchController) {
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let head = Arc::new(Mutex::new(None));
    let head_call_count = Arc::new(AtomicUsize::new(0));

    let source = Arc::new(ScriptedWatchSource {
        notice_rx: Mutex::new(Some(notice_rx)),
        head: Arc::clone(&head),
        head_call_count: Arc::clone(&head_call_count),
    });

    let controller = WatchController {
        notice_tx,
        head,
        head_call_count,
    };

    (source, controller)
}

#[async_trait]
impl WatchSource for ScriptedWatchSource {
    async fn head(&self) -> Result<Option<HeadRecord>> {
        self.head_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.head.lock().unwrap().clone())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>> {
        let rx = self
            .notice_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// An uplink that records every operation and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingUplink {
    register_calls: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<UploadBatch>>>,
    ops: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    fail_register: Arc<AtomicBool>,
}

impl RecordingUplink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make registration fail
    pub fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    /// Batches the uplink accepted (failed sends are not recorded here)
    pub fn accepted_batches(&self) -> Vec<UploadBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// Kinds of accepted batches, in dispatch order
    pub fn accepted_kinds(&self) -> Vec<RecordKind> {
        self.accepted_batches().iter().map(|b| b.kind).collect()
    }

    /// Count of accepted batches of one kind
    pub fn accepted_for(&self, kind: RecordKind) -> usize {
        self.accepted_kinds().iter().filter(|k| **k == kind).count()
    }

    /// Every operation attempted, in order ("register", "send:<kind>")
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn register_count(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Number of send attempts (accepted or failed)
    pub fn send_attempts(&self) -> usize {
        self.ops().iter().filter(|op| op.starts_with("send:")).count()
    }
}

#[async_trait]
impl Uplink for RecordingUplink {
    async fn register_device(
        &self,
        _device: &DeviceIdentity,
        _profile: &DeviceProfile,
    ) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.ops.lock().unwrap().push("register".to_string());

        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Error::uplink("device-register", "scripted failure"));
        }
        Ok(())
    }

    async fn send(&self, batch: &UploadBatch) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("send:{}", batch.kind));

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::uplink(batch.kind.name(), "scripted failure"));
        }

        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    fn uplink_name(&self) -> &'static str {
        "recording"
    }
}

/// A collector that returns a fixed harvest (and honors the gate)
pub struct FixedCollector {
    capability: Capability,
    kind: RecordKind,
    records: Vec<SourceRecord>,
    fail: bool,
    collect_calls: Arc<AtomicUsize>,
}

impl FixedCollector {
    pub fn new(capability: Capability, kind: RecordKind, records: Vec<SourceRecord>) -> Self {
        Self {
            capability,
            kind,
            records,
            fail: false,
            collect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A collector whose source is always unavailable
    pub fn failing(capability: Capability, kind: RecordKind) -> Self {
        Self {
            capability,
            kind,
            records: Vec::new(),
            fail: true,
            collect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, for asserting the collector ran
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.collect_calls)
    }
}

#[async_trait]
impl Collector for FixedCollector {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn kind(&self) -> RecordKind {
        self.kind
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest> {
        self.collect_calls.fetch_add(1, Ordering::SeqCst);

        if !ctx.gate.is_granted(self.capability) {
            return Ok(Harvest::Skipped);
        }
        if self.fail {
            return Err(Error::source_unavailable("scripted failure"));
        }
        Ok(Harvest::Records(self.records.clone()))
    }
}

/// A call record for tests
pub fn call_record(device: &DeviceIdentity, number: &str) -> SourceRecord {
    SourceRecord::new(
        device.clone(),
        Utc::now(),
        RecordPayload::Call {
            number: number.to_string(),
            direction: CallDirection::Incoming,
            duration_secs: 30,
        },
    )
}

/// A message record for tests
pub fn message_record(device: &DeviceIdentity, body: &str) -> SourceRecord {
    SourceRecord::new(
        device.clone(),
        Utc::now(),
        RecordPayload::Message {
            address: "+15550000000".to_string(),
            body: body.to_string(),
            direction: MessageDirection::Received,
        },
    )
}

/// A location record for tests
pub fn location_record(device: &DeviceIdentity) -> SourceRecord {
    SourceRecord::new(
        device.clone(),
        Utc::now(),
        RecordPayload::LocationFix {
            latitude: 37.42,
            longitude: -122.08,
        },
    )
}

/// An image record for tests
pub fn image_record(device: &DeviceIdentity) -> SourceRecord {
    SourceRecord::new(
        device.clone(),
        Utc::now(),
        RecordPayload::ImageCapture {
            jpeg_base64: "AAAA".to_string(),
        },
    )
}

/// Engine config tuned for tests: one immediate catch-up sweep, then (for
/// most tests) nothing until long after the test is over
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        sweep_interval_secs: 3600,
        lookback_secs: 24 * 60 * 60,
        max_records_per_batch: 100,
        max_images_per_batch: 10,
        event_channel_capacity: 256,
    }
}

/// A test device profile
pub fn test_profile() -> DeviceProfile {
    DeviceProfile {
        model: "test-device".to_string(),
        os_version: "test-os".to_string(),
    }
}
