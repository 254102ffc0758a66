use color_eyre::eyre::{Result, WrapErr};
use common_types::{EventKind, ObjectRef};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::error;

/// One object event taken from a bucket notification.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketEvent {
    pub kind: EventKind,
    pub object: ObjectRef,
    pub event_name: String,
    /// The notification record as received.
    pub record: Value,
}

/// Parses one line of the notification stream.
///
/// Blank keep-alive lines yield no events. Records missing a field, or with an
/// event name other than a creation or removal, are logged and skipped.
///
/// # Errors
///
/// Returns an error if the line is not valid JSON.
pub fn parse_notification(line: &str) -> Result<Vec<BucketEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let notification: Value =
        serde_json::from_str(line).wrap_err("Notification is not valid JSON")?;
    let Some(records) = notification.get("Records").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(records
        .iter()
        .filter_map(|record| {
            let event = parse_record(record);
            if event.is_none() {
                error!("Malformed event record: {}", record);
            }
            event
        })
        .collect())
}

fn parse_record(record: &Value) -> Option<BucketEvent> {
    let event_name = record.get("eventName")?.as_str()?;
    let kind = EventKind::from_event_name(event_name)?;
    let s3 = record.get("s3")?;
    let bucket = s3.pointer("/bucket/name")?.as_str()?;
    let key = decode_key(s3.pointer("/object/key")?.as_str()?)?;

    Some(BucketEvent {
        kind,
        object: ObjectRef::new(bucket, key),
        event_name: event_name.to_owned(),
        record: record.clone(),
    })
}

/// Object keys arrive query-escaped, with spaces as `+`.
fn decode_key(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    let key = percent_decode_str(&spaced).decode_utf8().ok()?;
    if key.is_empty() {
        None
    } else {
        Some(key.into_owned())
    }
}
