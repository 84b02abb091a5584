//! Per-kind event counters shared between the routing path and the
//! periodic totals log.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use firehose_types::EventKind;

/// Lock-free counters, one per event kind, plus a count of events the sink
/// refused.
#[derive(Debug, Default)]
pub struct EventCounters {
    routed: [AtomicU64; EventKind::ALL.len()],
    dropped: AtomicU64,
}

impl EventCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: EventKind) {
        self.routed[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }

    /// Read every counter. The total is the sum of the per-kind values
    /// read, so it never disagrees with them.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut per_kind = [0u64; EventKind::ALL.len()];
        for kind in EventKind::ALL {
            per_kind[kind.index()] = self.routed[kind.index()].load(Ordering::SeqCst);
        }
        CounterSnapshot {
            per_kind,
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    per_kind: [u64; EventKind::ALL.len()],
    dropped: u64,
}

impl CounterSnapshot {
    #[must_use]
    pub fn count(&self, kind: EventKind) -> u64 {
        self.per_kind[kind.index()]
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.per_kind.iter().sum()
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in EventKind::ALL {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{kind}={}", self.count(kind))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn snapshot_reports_per_kind_and_total() {
        let counters = EventCounters::new();
        counters.record(EventKind::LogMessage);
        counters.record(EventKind::LogMessage);
        counters.record(EventKind::ValueMetric);
        counters.record_dropped();

        let snap = counters.snapshot();
        assert_eq!(snap.count(EventKind::LogMessage), 2);
        assert_eq!(snap.count(EventKind::ValueMetric), 1);
        assert_eq!(snap.count(EventKind::Error), 0);
        assert_eq!(snap.total(), 3);
        assert_eq!(snap.dropped(), 1);
    }

    #[test]
    fn display_lists_every_kind() {
        let counters = EventCounters::new();
        counters.record(EventKind::CounterEvent);
        let text = counters.snapshot().to_string();
        assert!(text.contains("CounterEvent=1"), "{text}");
        assert!(text.contains("LogMessage=0"), "{text}");
        assert_eq!(text.split(' ').count(), EventKind::ALL.len());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(EventCounters::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    let kind = EventKind::ALL[i % EventKind::ALL.len()];
                    for _ in 0..1000 {
                        counters.record(kind);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(counters.snapshot().total(), 8000);
    }
}
