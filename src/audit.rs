// Audit module - fire-and-forget side channel for raw upstream records
//
// Each successfully decoded queue/application record is serialized to JSON
// and forwarded to a dedicated log channel before its metrics are emitted.
// The channel is best-effort: nothing that happens here may block or fail
// metric collection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Log target reserved for the audit channel
///
/// The layer installed in `main` routes exactly this target to the rolling
/// audit file and keeps it out of the regular stdout/stderr output.
pub const AUDIT_TARGET: &str = "metric";

/// Envelope written for every audited record
#[derive(Serialize)]
struct AuditEvent<'a, T: Serialize> {
    /// When the record was observed (UTC)
    timestamp: DateTime<Utc>,

    /// Logical channel, e.g. "queue" or "application"
    channel: &'a str,

    /// The raw decoded record, re-serialized with its wire field names
    record: &'a T,
}

/// Handle to the audit side channel
///
/// Cheap to clone; each collector holds its own. [`AuditLog::record`] is
/// non-blocking (the appender behind the `metric` target uses a background
/// writer thread) and failure-tolerant: an unserializable record is logged
/// as a warning and dropped.
#[derive(Clone, Default)]
pub struct AuditLog;

impl AuditLog {
    pub fn new() -> Self {
        AuditLog
    }

    /// Forwards one raw record to the audit channel
    ///
    /// # Arguments
    /// * `channel` - Logical channel name the record belongs to
    /// * `record` - The decoded record, serialized as observed on the wire
    pub fn record<T: Serialize>(&self, channel: &str, record: &T) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            channel,
            record,
        };

        match serde_json::to_string(&event) {
            Ok(line) => info!(target: AUDIT_TARGET, "{line}"),
            Err(e) => warn!("Failed to serialize audit record on channel '{channel}': {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    #[derive(Serialize)]
    struct SampleRecord {
        #[serde(rename = "queueName")]
        queue_name: String,
        capacity: f64,
    }

    /// A record whose serialization always fails, to exercise the drop path
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("always fails"))
        }
    }

    #[test]
    fn test_envelope_keeps_wire_field_names() {
        let record = SampleRecord {
            queue_name: "default".to_string(),
            capacity: 50.0,
        };

        let event = AuditEvent {
            timestamp: Utc::now(),
            channel: "queue",
            record: &record,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["channel"], "queue");
        assert_eq!(value["record"]["queueName"], "default");
        assert_eq!(value["record"]["capacity"], 50.0);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_record_tolerates_serialization_failure() {
        // Must neither panic nor propagate anything.
        AuditLog::new().record("queue", &Unserializable);
    }

    #[test]
    fn test_record_plain_value() {
        AuditLog::new().record(
            "application",
            &SampleRecord {
                queue_name: "batch".to_string(),
                capacity: 12.5,
            },
        );
    }
}
