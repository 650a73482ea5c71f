//! End-to-end pipeline test over a real device store
//!
//! Wires the SQLite collectors and the call log watch source into the agent
//! engine with a recording uplink, and drives the store the way a host
//! runtime would: inserts, grants, notices.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_core::AgentEngine;
use courier_core::config::EngineConfig;
use courier_core::gate::StaticPermissionGate;
use courier_core::record::{
    Capability, DeviceIdentity, DeviceProfile, RecordKind, UploadBatch,
};
use courier_core::traits::{Uplink, WatchSource};
use courier_core::{Error, Result};

use courier_source_sqlite::{CallLogWatchSource, DeviceStore, collectors};

#[derive(Clone, Default)]
struct RecordingUplink {
    batches: Arc<Mutex<Vec<UploadBatch>>>,
    registered: Arc<AtomicBool>,
}

impl RecordingUplink {
    fn kinds(&self) -> Vec<RecordKind> {
        self.batches.lock().unwrap().iter().map(|b| b.kind).collect()
    }

    fn count_for(&self, kind: RecordKind) -> usize {
        self.kinds().iter().filter(|k| **k == kind).count()
    }

    fn records_for(&self, kind: RecordKind) -> usize {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.len())
            .sum()
    }
}

#[async_trait]
impl Uplink for RecordingUplink {
    async fn register_device(
        &self,
        _device: &DeviceIdentity,
        _profile: &DeviceProfile,
    ) -> Result<()> {
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, batch: &UploadBatch) -> Result<()> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    fn uplink_name(&self) -> &'static str {
        "recording"
    }
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        sweep_interval_secs: 3600,
        lookback_secs: 24 * 60 * 60,
        max_records_per_batch: 100,
        max_images_per_batch: 10,
        event_channel_capacity: 256,
    }
}

fn recent_ms() -> i64 {
    Utc::now().timestamp_millis() - 30_000
}

/// One sweep over a populated store: only granted kinds are delivered, and
/// the device is registered first.
#[tokio::test]
async fn sweep_delivers_only_granted_kinds() {
    let store = Arc::new(DeviceStore::in_memory().unwrap());
    store.insert_call("111", recent_ms(), "incoming", 12).unwrap();
    store.insert_call("222", recent_ms(), "outgoing", 3).unwrap();
    store
        .insert_message("555", "hello", recent_ms(), "received")
        .unwrap();
    store.insert_location(52.52, 13.40, recent_ms()).unwrap();

    let device = DeviceIdentity::new("integration-device");
    let uplink = RecordingUplink::default();
    // Host grants only the call log capability.
    let gate = Arc::new(StaticPermissionGate::granting([Capability::CallLog]));

    let (engine, _events) = AgentEngine::new(
        collectors::collectors(store),
        None,
        Arc::new(uplink.clone()),
        gate,
        device,
        DeviceProfile {
            model: "test".into(),
            os_version: "test".into(),
        },
        engine_config(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(uplink.registered.load(Ordering::SeqCst));
    assert_eq!(uplink.count_for(RecordKind::Call), 1);
    assert_eq!(uplink.records_for(RecordKind::Call), 2);
    assert_eq!(uplink.count_for(RecordKind::Message), 0);
    assert_eq!(uplink.count_for(RecordKind::LocationFix), 0);
}

/// Host inserts a call while the engine runs: the watcher forwards exactly
/// one single-record batch, and a second insert forwards again.
#[tokio::test]
async fn watcher_forwards_live_inserts_once_each() {
    let store = Arc::new(DeviceStore::in_memory().unwrap());
    let device = DeviceIdentity::new("integration-device");
    let uplink = RecordingUplink::default();
    // Nothing granted: sweeps stay quiet, only the watcher speaks.
    let gate = Arc::new(StaticPermissionGate::new());

    let watch: Arc<dyn WatchSource> = Arc::new(CallLogWatchSource::new(
        Arc::clone(&store),
        device.clone(),
    ));

    let (engine, _events) = AgentEngine::new(
        collectors::collectors(Arc::clone(&store)),
        Some(watch),
        Arc::new(uplink.clone()),
        gate,
        device,
        DeviceProfile {
            model: "test".into(),
            os_version: "test".into(),
        },
        engine_config(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    store.insert_call("111", recent_ms(), "incoming", 9).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(uplink.records_for(RecordKind::Call), 1);

    store.insert_call("222", recent_ms(), "outgoing", 4).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(uplink.records_for(RecordKind::Call), 2);

    // Every watcher batch is a single record.
    assert!(
        uplink
            .batches
            .lock()
            .unwrap()
            .iter()
            .all(|b| b.kind != RecordKind::Call || b.len() == 1)
    );

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

/// An insert into an unwatched table produces no watcher traffic; the next
/// sweep picks it up instead.
#[tokio::test]
async fn unwatched_tables_wait_for_the_sweep() {
    let store = Arc::new(DeviceStore::in_memory().unwrap());
    let device = DeviceIdentity::new("integration-device");
    let uplink = RecordingUplink::default();
    let gate = Arc::new(StaticPermissionGate::granting([Capability::AppMessages]));

    let watch: Arc<dyn WatchSource> = Arc::new(CallLogWatchSource::new(
        Arc::clone(&store),
        device.clone(),
    ));

    let mut config = engine_config();
    config.sweep_interval_secs = 1;

    let (engine, _events) = AgentEngine::new(
        collectors::collectors(Arc::clone(&store)),
        Some(watch),
        Arc::new(uplink.clone()),
        gate,
        device,
        DeviceProfile {
            model: "test".into(),
            os_version: "test".into(),
        },
        config,
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Lands after the catch-up sweep; no change notice fires for this table.
    store
        .insert_app_message("com.example.chat", "ping", recent_ms(), "sent")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(uplink.records_for(RecordKind::AppMessage), 0);

    // The next interval sweep recovers it.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(uplink.records_for(RecordKind::AppMessage), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
