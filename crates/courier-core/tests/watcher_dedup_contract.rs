//! Architectural Contract Test: Watcher Deduplication
//!
//! This test verifies the change watcher's watermark discipline.
//!
//! Constraints verified:
//! - Each distinct row id is forwarded at most once per process lifetime
//! - A row id ≤ the current watermark is never forwarded (idempotence under
//!   duplicate/coalesced notices)
//! - The watermark never decreases
//! - A notice with no new head row sends nothing
//! - The watcher re-reads the head on every notice instead of trusting the
//!   notice payload
//!
//! If this test fails, duplicate or lost deliveries are possible.

mod common;

use common::*;
use courier_core::record::DeviceIdentity;
use courier_core::watcher::{ChangeWatcher, WatcherState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn sleep_a_beat() -> tokio::time::Sleep {
    tokio::time::sleep(Duration::from_millis(80))
}

#[tokio::test]
async fn duplicate_notice_forwards_once() {
    let (source, controller) = scripted_watch_source();
    let uplink = RecordingUplink::new();
    let (event_tx, _event_rx) = mpsc::channel(64);

    let handle = ChangeWatcher::start(source, Arc::new(uplink.clone()), event_tx);
    sleep_a_beat().await;

    let device = DeviceIdentity::new("dev");
    controller.set_head(1, call_record(&device, "111"));

    // Two notices for the same mutation (the host coalesces and re-fires
    // freely); only one forward may happen.
    controller.notify();
    controller.notify();
    sleep_a_beat().await;

    assert_eq!(uplink.send_attempts(), 1, "row 1 must be forwarded exactly once");
    assert_eq!(handle.last_forwarded(), Some(1));

    handle.stop().await;
}

#[tokio::test]
async fn notice_without_new_row_sends_nothing() {
    let (source, controller) = scripted_watch_source();
    let uplink = RecordingUplink::new();
    let (event_tx, _event_rx) = mpsc::channel(64);

    let handle = ChangeWatcher::start(source, Arc::new(uplink.clone()), event_tx);
    sleep_a_beat().await;

    // Source still empty: notice is a no-op.
    controller.notify();
    sleep_a_beat().await;
    assert_eq!(uplink.send_attempts(), 0);

    let device = DeviceIdentity::new("dev");
    controller.set_head(7, call_record(&device, "111"));
    controller.notify();
    sleep_a_beat().await;
    assert_eq!(uplink.send_attempts(), 1);

    // Head unchanged on the next notice: still nothing new.
    controller.notify();
    sleep_a_beat().await;
    assert_eq!(uplink.send_attempts(), 1);
    assert!(controller.head_call_count() >= 3, "head is re-read per notice");

    handle.stop().await;
}

#[tokio::test]
async fn watermark_is_monotonic() {
    let (source, controller) = scripted_watch_source();
    let uplink = RecordingUplink::new();
    let (event_tx, _event_rx) = mpsc::channel(64);

    let handle = ChangeWatcher::start(source, Arc::new(uplink.clone()), event_tx);
    sleep_a_beat().await;

    let device = DeviceIdentity::new("dev");
    for row_id in [3, 5, 9] {
        controller.set_head(row_id, call_record(&device, "111"));
        controller.notify();
        sleep_a_beat().await;
    }
    assert_eq!(uplink.send_attempts(), 3);
    assert_eq!(handle.last_forwarded(), Some(9));

    // A head that regressed (source rolled back, clock skew, ...) must not
    // be forwarded and must not move the watermark backwards.
    controller.set_head(5, call_record(&device, "222"));
    controller.notify();
    sleep_a_beat().await;

    assert_eq!(uplink.send_attempts(), 3);
    assert_eq!(handle.last_forwarded(), Some(9));

    handle.stop().await;
}

#[tokio::test]
async fn burst_of_notices_is_handled_serially_not_dropped() {
    let (source, controller) = scripted_watch_source();
    let uplink = RecordingUplink::new();
    let (event_tx, _event_rx) = mpsc::channel(64);

    let handle = ChangeWatcher::start(source, Arc::new(uplink.clone()), event_tx);
    sleep_a_beat().await;

    let device = DeviceIdentity::new("dev");

    // Notices arriving while one is being processed queue up and are
    // handled after; each re-reads the then-current head.
    controller.set_head(1, call_record(&device, "111"));
    controller.notify();
    controller.set_head(2, call_record(&device, "222"));
    controller.notify();
    controller.notify();
    sleep_a_beat().await;

    // At least the newest row went out, nothing twice.
    assert_eq!(handle.last_forwarded(), Some(2));
    assert!(uplink.send_attempts() <= 2);
    let attempts = uplink.send_attempts();
    assert!(attempts >= 1);

    // A later notice with the same head adds nothing.
    controller.notify();
    sleep_a_beat().await;
    assert_eq!(uplink.send_attempts(), attempts);

    handle.stop().await;
}

#[tokio::test]
async fn stop_unsubscribes_and_goes_idle() {
    let (source, controller) = scripted_watch_source();
    let uplink = RecordingUplink::new();
    let (event_tx, _event_rx) = mpsc::channel(64);

    let handle = ChangeWatcher::start(source, Arc::new(uplink.clone()), event_tx);
    sleep_a_beat().await;
    assert_eq!(handle.state(), WatcherState::Subscribed);

    let device = DeviceIdentity::new("dev");
    controller.set_head(1, call_record(&device, "111"));
    controller.notify();
    sleep_a_beat().await;
    assert_eq!(uplink.send_attempts(), 1);

    handle.stop().await;

    // Notices after stop go nowhere.
    controller.set_head(2, call_record(&device, "222"));
    controller.notify();
    sleep_a_beat().await;
    assert_eq!(uplink.send_attempts(), 1);
}
