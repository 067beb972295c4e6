use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::error::DecodeError;

/// Label used when a topic carries no second segment.
const DEFAULT_LABEL: &str = "data";

/// A single message as delivered by the transport: topic, raw payload
/// and the time it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(topic: String, payload: Vec<u8>) -> Self {
        InboundEvent {
            topic,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Accumulator for messages from one creator within the merge window.
///
/// Serializes to a single flat JSON object, `creator` and `timeStamp`
/// first, followed by the merged fields:
///
/// ```text
/// {"creator":"a","timeStamp":"2024-11-03T12:00:00Z","temp":22,"humidity":50}
/// ```
///
/// `label` is the working key for scalar payloads and is not part of
/// the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRecord {
    pub creator: String,
    #[serde(skip)]
    pub label: String,
    #[serde(rename = "timeStamp")]
    pub time_stamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl ActiveRecord {
    /// Opens a fresh record from the first event of a new window.
    pub fn from_event(event: &InboundEvent) -> Self {
        let (creator, label) = split_topic(&event.topic);
        let fields = decode_fields(label, &event.payload);
        ActiveRecord {
            creator: creator.to_string(),
            label: label.to_string(),
            time_stamp: event.received_at,
            fields,
        }
    }

    /// Merges a follow-up event into this record. Later values win on
    /// key conflicts; previously merged keys are never removed. The
    /// record's timestamp advances to the event's arrival time, so the
    /// merge window is measured from the most recent event.
    pub fn merge_event(&mut self, event: &InboundEvent) {
        let (_, label) = split_topic(&event.topic);
        self.fields.extend(decode_fields(label, &event.payload));
        self.label = label.to_string();
        self.time_stamp = event.received_at;
    }
}

/// Splits a topic into `(creator, label)`. Segment 0 is the creator,
/// segment 1 the data label; a missing or empty label falls back to
/// `"data"`. A topic with no separator is its own creator.
pub fn split_topic(topic: &str) -> (&str, &str) {
    let mut segments = topic.split('/');
    let creator = segments.next().unwrap_or(topic);
    let label = match segments.next() {
        Some(label) if !label.is_empty() => label,
        _ => DEFAULT_LABEL,
    };
    (creator, label)
}

/// Decodes a payload into record fields.
///
/// JSON objects contribute their keys directly, arrays contribute
/// index keys ("0", "1", ...), `null` contributes nothing, and any
/// other valid JSON value is stored under `label`. A payload that does
/// not parse as JSON degrades to its raw string under `label` - that
/// is policy, not a fault.
fn decode_fields(label: &str, payload: &[u8]) -> BTreeMap<String, Value> {
    match try_decode(payload) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        Ok(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        Ok(Value::Null) => BTreeMap::new(),
        Ok(scalar) => BTreeMap::from([(label.to_string(), scalar)]),
        Err(e) => {
            debug!("Storing payload as raw string under '{}': {}", label, e);
            let raw = String::from_utf8_lossy(payload).into_owned();
            BTreeMap::from([(label.to_string(), Value::String(raw))])
        }
    }
}

fn try_decode(payload: &[u8]) -> Result<Value, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(topic: &str, payload: &str) -> InboundEvent {
        InboundEvent::new(topic.to_string(), payload.as_bytes().to_vec())
    }

    #[test]
    fn topic_splits_into_creator_and_label() {
        assert_eq!(split_topic("a/temp"), ("a", "temp"));
        assert_eq!(split_topic("a/temp/raw"), ("a", "temp"));
    }

    #[test]
    fn missing_or_empty_label_defaults_to_data() {
        assert_eq!(split_topic("a"), ("a", "data"));
        assert_eq!(split_topic("a/"), ("a", "data"));
        assert_eq!(split_topic(""), ("", "data"));
    }

    #[test]
    fn scalar_payload_lands_under_label() {
        let record = ActiveRecord::from_event(&event("a/temp", "22"));
        assert_eq!(record.creator, "a");
        assert_eq!(record.fields, BTreeMap::from([("temp".into(), json!(22))]));
    }

    #[test]
    fn object_payload_merges_its_keys() {
        let record = ActiveRecord::from_event(&event("a/data", r#"{"x":1,"y":2}"#));
        assert_eq!(record.fields.get("x"), Some(&json!(1)));
        assert_eq!(record.fields.get("y"), Some(&json!(2)));
        assert!(record.fields.get("data").is_none());
    }

    #[test]
    fn array_payload_merges_index_keys() {
        let record = ActiveRecord::from_event(&event("a/data", "[10,20]"));
        assert_eq!(record.fields.get("0"), Some(&json!(10)));
        assert_eq!(record.fields.get("1"), Some(&json!(20)));
    }

    #[test]
    fn null_payload_contributes_no_fields() {
        let record = ActiveRecord::from_event(&event("a/data", "null"));
        assert!(record.fields.is_empty());
    }

    #[test]
    fn malformed_payload_degrades_to_raw_string() {
        let record = ActiveRecord::from_event(&event("a/data", "{bad"));
        assert_eq!(record.fields.get("data"), Some(&json!("{bad")));
    }

    #[test]
    fn record_serializes_as_flat_json_object() {
        let mut record = ActiveRecord::from_event(&event("a/temp", "22"));
        record.merge_event(&event("a/humidity", "50"));
        let line = serde_json::to_string(&record).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["creator"], json!("a"));
        assert_eq!(value["temp"], json!(22));
        assert_eq!(value["humidity"], json!(50));
        assert!(value.get("timeStamp").is_some());
        assert!(value.get("label").is_none());
    }
}
