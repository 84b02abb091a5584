//! Decoded firehose envelopes.
//!
//! An [`Envelope`] is what the stream client hands to the router: the
//! common origin attributes plus one kind-specific [`EventPayload`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::app::AppGuid;
use crate::kind::EventKind;

/// Output stream of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Out,
    Err,
}

impl MessageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::Err => "ERR",
        }
    }
}

/// Kind-specific body of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    LogMessage {
        app_id: AppGuid,
        message: String,
        message_type: MessageType,
        source_type: String,
        source_instance: String,
    },
    HttpStartStop {
        app_id: Option<AppGuid>,
        method: String,
        uri: String,
        status_code: i32,
        peer_type: String,
        remote_address: String,
        user_agent: String,
        request_id: String,
        content_length: i64,
        start_ns: i64,
        stop_ns: i64,
    },
    ValueMetric {
        name: String,
        value: f64,
        unit: String,
    },
    CounterEvent {
        name: String,
        delta: u64,
        total: u64,
    },
    Error {
        source: String,
        code: i32,
        message: String,
    },
    ContainerMetric {
        app_id: AppGuid,
        instance_index: i32,
        cpu_percentage: f64,
        memory_bytes: u64,
        disk_bytes: u64,
        memory_bytes_quota: u64,
        disk_bytes_quota: u64,
    },
}

/// One event received from the firehose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub deployment: String,
    pub job: String,
    pub index: String,
    pub ip: String,
    /// Event time in nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub tags: BTreeMap<String, String>,
    pub payload: EventPayload,
}

impl Envelope {
    /// Build an envelope with empty origin attributes around `payload`.
    #[must_use]
    pub fn new(timestamp: i64, payload: EventPayload) -> Self {
        Self {
            origin: String::new(),
            deployment: String::new(),
            job: String::new(),
            index: String::new(),
            ip: String::new(),
            timestamp,
            tags: BTreeMap::new(),
            payload,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::LogMessage { .. } => EventKind::LogMessage,
            EventPayload::HttpStartStop { .. } => EventKind::HttpStartStop,
            EventPayload::ValueMetric { .. } => EventKind::ValueMetric,
            EventPayload::CounterEvent { .. } => EventKind::CounterEvent,
            EventPayload::Error { .. } => EventKind::Error,
            EventPayload::ContainerMetric { .. } => EventKind::ContainerMetric,
        }
    }

    /// Application this event belongs to, if any.
    #[must_use]
    pub fn app_guid(&self) -> Option<&AppGuid> {
        match &self.payload {
            EventPayload::LogMessage { app_id, .. }
            | EventPayload::ContainerMetric { app_id, .. } => Some(app_id),
            EventPayload::HttpStartStop { app_id, .. } => app_id.as_ref(),
            _ => None,
        }
    }
}
