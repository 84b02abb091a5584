//! Routed events: the flattened, annotated form shipped to the sink.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::app::AppMetadata;
use crate::envelope::{Envelope, EventPayload};
use crate::kind::EventKind;

/// A routed event: a message plus a flat set of named fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    /// Event time in nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub msg: String,
    pub fields: BTreeMap<String, Value>,
}

impl Event {
    /// Flatten an envelope into its base fields (origin attributes, tags and
    /// kind-specific values). Enrichment and extra fields are added later.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let mut event = Self {
            kind: envelope.kind(),
            timestamp: envelope.timestamp,
            msg: String::new(),
            fields: BTreeMap::new(),
        };

        event.set("event_type", envelope.kind().as_str());
        event.set("origin", envelope.origin.as_str());
        event.set("deployment", envelope.deployment.as_str());
        event.set("job", envelope.job.as_str());
        event.set("index", envelope.index.as_str());
        event.set("ip", envelope.ip.as_str());
        event.set("timestamp", envelope.timestamp);
        for (key, value) in &envelope.tags {
            event.set(key, value.as_str());
        }

        match &envelope.payload {
            EventPayload::LogMessage {
                app_id,
                message,
                message_type,
                source_type,
                source_instance,
            } => {
                event.set("cf_app_id", app_id.as_str());
                event.set("message_type", message_type.as_str());
                event.set("source_type", source_type.as_str());
                event.set("source_instance", source_instance.as_str());
                event.msg.clone_from(message);
            }
            EventPayload::HttpStartStop {
                app_id,
                method,
                uri,
                status_code,
                peer_type,
                remote_address,
                user_agent,
                request_id,
                content_length,
                start_ns,
                stop_ns,
            } => {
                if let Some(app_id) = app_id {
                    event.set("cf_app_id", app_id.as_str());
                }
                event.set("method", method.as_str());
                event.set("uri", uri.as_str());
                event.set("status_code", *status_code);
                event.set("peer_type", peer_type.as_str());
                event.set("remote_addr", remote_address.as_str());
                event.set("user_agent", user_agent.as_str());
                event.set("request_id", request_id.as_str());
                event.set("content_length", *content_length);
                event.set("start_timestamp", *start_ns);
                event.set("stop_timestamp", *stop_ns);
                event.set(
                    "duration_ms",
                    stop_ns.saturating_sub(*start_ns).max(0) / 1_000_000,
                );
                event.msg = format!("{method} {uri} {status_code}");
            }
            EventPayload::ValueMetric { name, value, unit } => {
                event.set("name", name.as_str());
                event.set("value", *value);
                event.set("unit", unit.as_str());
            }
            EventPayload::CounterEvent { name, delta, total } => {
                event.set("name", name.as_str());
                event.set("delta", *delta);
                event.set("total", *total);
            }
            EventPayload::Error {
                source,
                code,
                message,
            } => {
                event.set("source", source.as_str());
                event.set("code", *code);
                event.msg.clone_from(message);
            }
            EventPayload::ContainerMetric {
                app_id,
                instance_index,
                cpu_percentage,
                memory_bytes,
                disk_bytes,
                memory_bytes_quota,
                disk_bytes_quota,
            } => {
                event.set("cf_app_id", app_id.as_str());
                event.set("instance_index", *instance_index);
                event.set("cpu_percentage", *cpu_percentage);
                event.set("memory_bytes", *memory_bytes);
                event.set("disk_bytes", *disk_bytes);
                event.set("memory_bytes_quota", *memory_bytes_quota);
                event.set("disk_bytes_quota", *disk_bytes_quota);
            }
        }

        event
    }

    /// Set (or overwrite) a field.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Read a field as a string, if present and a string.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Attach application metadata fields.
    pub fn enrich(&mut self, app: &AppMetadata) {
        for (key, value) in app.enrichment_fields() {
            self.set(key, value);
        }
    }
}
