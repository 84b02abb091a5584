//! Event kinds emitted by the platform firehose.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a firehose event, used for routing filters and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
}

/// Returned when a kind name does not match any [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event type '{name}' is not valid, valid options are {}", EventKind::valid_names())]
pub struct UnknownEventKind {
    pub name: String,
}

impl EventKind {
    /// Every kind, in counter-table order.
    pub const ALL: [EventKind; 6] = [
        EventKind::HttpStartStop,
        EventKind::LogMessage,
        EventKind::ValueMetric,
        EventKind::CounterEvent,
        EventKind::Error,
        EventKind::ContainerMetric,
    ];

    /// Canonical wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpStartStop => "HttpStartStop",
            Self::LogMessage => "LogMessage",
            Self::ValueMetric => "ValueMetric",
            Self::CounterEvent => "CounterEvent",
            Self::Error => "Error",
            Self::ContainerMetric => "ContainerMetric",
        }
    }

    /// Whether events of this kind carry an application id that must be
    /// resolved to application metadata before shipping.
    #[must_use]
    pub fn needs_metadata(self) -> bool {
        matches!(
            self,
            Self::HttpStartStop | Self::LogMessage | Self::ContainerMetric
        )
    }

    /// Position in [`EventKind::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::HttpStartStop => 0,
            Self::LogMessage => 1,
            Self::ValueMetric => 2,
            Self::CounterEvent => 3,
            Self::Error => 4,
            Self::ContainerMetric => 5,
        }
    }

    /// Comma separated list of all valid names, for help and error text.
    #[must_use]
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEventKind {
                name: s.to_string(),
            })
    }
}
