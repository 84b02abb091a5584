//! Event routing: selection, enrichment, counting and shipping.

pub mod counters;
pub mod fields;
pub mod router;

pub use counters::{CounterSnapshot, EventCounters};
pub use fields::{parse_event_kinds, parse_extra_fields, RouterSetupError};
pub use router::Router;
