//! Decoding of log-stream gateway batches into [`Envelope`]s.
//!
//! The gateway serialises its envelopes as protobuf-JSON: 64-bit integers
//! arrive as strings, log payloads as base64.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use firehose_types::{AppGuid, Envelope, EventKind, EventPayload, MessageType};
use serde::{Deserialize, Deserializer};

/// Tags promoted to envelope origin attributes.
const ORIGIN_TAGS: [&str; 5] = ["origin", "deployment", "job", "index", "ip"];

#[derive(Debug, Deserialize)]
struct Batch {
    #[serde(default)]
    batch: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct V2Envelope {
    #[serde(default, deserialize_with = "lenient")]
    timestamp: i64,
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    instance_id: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    log: Option<Log>,
    #[serde(default)]
    counter: Option<Counter>,
    #[serde(default)]
    gauge: Option<Gauge>,
    #[serde(default)]
    timer: Option<Timer>,
    #[serde(default)]
    event: Option<PlatformEvent>,
}

#[derive(Debug, Deserialize)]
struct Log {
    #[serde(default)]
    payload: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Counter {
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    delta: u64,
    #[serde(default, deserialize_with = "lenient")]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct GaugeValue {
    #[serde(default)]
    unit: String,
    #[serde(default)]
    value: f64,
}

#[derive(Debug, Deserialize)]
struct Gauge {
    #[serde(default)]
    metrics: HashMap<String, GaugeValue>,
}

#[derive(Debug, Deserialize)]
struct Timer {
    name: String,
    #[serde(default, deserialize_with = "lenient")]
    start: i64,
    #[serde(default, deserialize_with = "lenient")]
    stop: i64,
}

#[derive(Debug, Deserialize)]
struct PlatformEvent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric<T> {
    Number(T),
    Text(String),
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Numeric::<T>::deserialize(deserializer)? {
        Numeric::Number(n) => Ok(n),
        Numeric::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Decode one `data:` payload. Envelopes that do not decode are logged
/// and skipped; the rest of the batch is kept.
///
/// # Errors
///
/// Returns the JSON error when the payload is not a batch document.
pub fn decode_batch(data: &str) -> Result<Vec<Envelope>, serde_json::Error> {
    let batch: Batch = serde_json::from_str(data)?;
    let mut envelopes = Vec::with_capacity(batch.batch.len());
    for raw in batch.batch {
        match serde_json::from_value::<V2Envelope>(raw) {
            Ok(v2) => envelopes.extend(convert(v2)),
            Err(e) => tracing::warn!(error = %e, "Skipping undecodable envelope"),
        }
    }
    Ok(envelopes)
}

/// Stream selectors needed to receive the given kinds.
#[must_use]
pub fn selectors(kinds: &[EventKind]) -> Vec<&'static str> {
    let mut out = Vec::new();
    for kind in kinds {
        let selector = match kind {
            EventKind::LogMessage => "log",
            EventKind::CounterEvent => "counter",
            EventKind::ValueMetric | EventKind::ContainerMetric => "gauge",
            EventKind::HttpStartStop => "timer",
            EventKind::Error => "event",
        };
        if !out.contains(&selector) {
            out.push(selector);
        }
    }
    out
}

fn tag(tags: &BTreeMap<String, String>, key: &str) -> String {
    tags.get(key).cloned().unwrap_or_default()
}

fn metric(metrics: &HashMap<String, GaugeValue>, name: &str) -> Option<f64> {
    metrics.get(name).map(|m| m.value)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_u64(value: f64) -> u64 {
    value.max(0.0) as u64
}

fn convert(v2: V2Envelope) -> Vec<Envelope> {
    let mut payloads = Vec::new();

    if let Some(log) = v2.log {
        let decoded = STANDARD.decode(log.payload.as_bytes()).unwrap_or_default();
        payloads.push(EventPayload::LogMessage {
            app_id: AppGuid::new(v2.source_id.clone()),
            message: String::from_utf8_lossy(&decoded).into_owned(),
            message_type: if log.kind == "ERR" {
                MessageType::Err
            } else {
                MessageType::Out
            },
            source_type: tag(&v2.tags, "source_type"),
            source_instance: v2.instance_id.clone(),
        });
    }

    if let Some(counter) = v2.counter {
        payloads.push(EventPayload::CounterEvent {
            name: counter.name,
            delta: counter.delta,
            total: counter.total,
        });
    }

    if let Some(gauge) = v2.gauge {
        let m = &gauge.metrics;
        match (metric(m, "cpu"), metric(m, "memory"), metric(m, "disk")) {
            (Some(cpu), Some(memory), Some(disk)) => {
                payloads.push(EventPayload::ContainerMetric {
                    app_id: AppGuid::new(v2.source_id.clone()),
                    instance_index: v2.instance_id.parse().unwrap_or_default(),
                    cpu_percentage: cpu,
                    memory_bytes: as_u64(memory),
                    disk_bytes: as_u64(disk),
                    memory_bytes_quota: metric(m, "memory_quota").map_or(0, as_u64),
                    disk_bytes_quota: metric(m, "disk_quota").map_or(0, as_u64),
                });
            }
            _ => {
                let mut names: Vec<_> = gauge.metrics.into_iter().collect();
                names.sort_by(|a, b| a.0.cmp(&b.0));
                for (name, value) in names {
                    payloads.push(EventPayload::ValueMetric {
                        name,
                        value: value.value,
                        unit: value.unit,
                    });
                }
            }
        }
    }

    if let Some(timer) = v2.timer {
        if timer.name == "http" {
            let app_id = v2
                .tags
                .get("app_id")
                .filter(|id| !id.is_empty())
                .map(|id| AppGuid::new(id.as_str()));
            payloads.push(EventPayload::HttpStartStop {
                app_id,
                method: tag(&v2.tags, "method"),
                uri: tag(&v2.tags, "uri"),
                status_code: tag(&v2.tags, "status_code").parse().unwrap_or_default(),
                peer_type: tag(&v2.tags, "peer_type"),
                remote_address: tag(&v2.tags, "remote_address"),
                user_agent: tag(&v2.tags, "user_agent"),
                request_id: tag(&v2.tags, "request_id"),
                content_length: tag(&v2.tags, "content_length").parse().unwrap_or_default(),
                start_ns: timer.start,
                stop_ns: timer.stop,
            });
        }
    }

    if let Some(event) = v2.event {
        payloads.push(EventPayload::Error {
            source: event.title,
            code: 0,
            message: event.body,
        });
    }

    payloads
        .into_iter()
        .map(|payload| {
            let mut envelope = Envelope::new(v2.timestamp, payload);
            envelope.origin = tag(&v2.tags, "origin");
            envelope.deployment = tag(&v2.tags, "deployment");
            envelope.job = tag(&v2.tags, "job");
            envelope.index = tag(&v2.tags, "index");
            envelope.ip = tag(&v2.tags, "ip");
            envelope.tags = v2
                .tags
                .iter()
                .filter(|(k, _)| !ORIGIN_TAGS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            envelope
        })
        .collect()
}
