//! Event rendering and RFC 5424 framing.

use chrono::{DateTime, SecondsFormat};
use firehose_types::{Event, EventKind};
use serde_json::{Map, Value};

use crate::config::LogFormat;

/// APP-NAME of every syslog message.
pub const APP_NAME: &str = "firehose-to-syslog";

const FACILITY_USER: u8 = 1;
const SEVERITY_ERROR: u8 = 3;
const SEVERITY_INFO: u8 = 6;

fn timestamp(event: &Event) -> String {
    DateTime::from_timestamp_nanos(event.timestamp).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_error(event: &Event) -> bool {
    event.kind == EventKind::Error || event.field_str("message_type") == Some("ERR")
}

/// Render an event body in the configured format.
#[must_use]
pub fn render(event: &Event, format: LogFormat) -> String {
    let level = if is_error(event) { "error" } else { "info" };
    match format {
        LogFormat::Json => {
            let mut object: Map<String, Value> = event
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            object.insert("level".into(), Value::from(level));
            object.insert("msg".into(), Value::from(event.msg.as_str()));
            object.insert("time".into(), Value::from(timestamp(event)));
            Value::Object(object).to_string()
        }
        LogFormat::Text => {
            let mut out = format!(
                "time={} level={level} msg={}",
                quote(&timestamp(event)),
                quote(&event.msg)
            );
            for (key, value) in &event.fields {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push(' ');
                out.push_str(key);
                out.push('=');
                out.push_str(&quote(&text));
            }
            out
        }
    }
}

/// Quote a text value when it is empty or contains characters that would
/// break `key=value` parsing.
fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+' | ':')
        });
    if plain {
        value.to_string()
    } else {
        format!("{value:?}")
    }
}

/// Wrap a rendered body in an RFC 5424 message. Stream transports get
/// RFC 6587 octet-counting framing; datagrams are sent as-is.
#[must_use]
pub fn syslog_frame(hostname: &str, event: &Event, body: &str, octet_counting: bool) -> Vec<u8> {
    let severity = if is_error(event) {
        SEVERITY_ERROR
    } else {
        SEVERITY_INFO
    };
    let priority = FACILITY_USER * 8 + severity;
    let host = if hostname.is_empty() { "-" } else { hostname };
    let line = format!(
        "<{priority}>1 {} {host} {APP_NAME} - {} - {body}",
        timestamp(event),
        event.kind.as_str()
    );
    if octet_counting {
        format!("{} {line}", line.len()).into_bytes()
    } else {
        line.into_bytes()
    }
}
