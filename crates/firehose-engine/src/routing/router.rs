//! The event router: filters envelopes by kind, enriches them with
//! application metadata and annotation fields, counts them and hands them
//! to the sink.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use firehose_cache::AppCache;
use firehose_types::{Envelope, Event, EventKind};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::routing::counters::{CounterSnapshot, EventCounters};
use crate::routing::fields::{parse_event_kinds, parse_extra_fields, RouterSetupError};
use crate::sink::Sink;

pub struct Router {
    cache: Arc<dyn AppCache>,
    sink: Arc<dyn Sink>,
    selected: Vec<EventKind>,
    extra_fields: BTreeMap<String, String>,
    counters: Arc<EventCounters>,
}

impl Router {
    /// A router forwarding `LogMessage` events only, with no extra fields.
    #[must_use]
    pub fn new(cache: Arc<dyn AppCache>, sink: Arc<dyn Sink>) -> Self {
        Self {
            cache,
            sink,
            selected: vec![EventKind::LogMessage],
            extra_fields: BTreeMap::new(),
            counters: Arc::new(EventCounters::new()),
        }
    }

    /// Replace the selection with the kinds named in `csv`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterSetupError::UnknownEventKind`] when a name is not a
    /// known kind; the previous selection is kept.
    pub fn setup_routing(&mut self, csv: &str) -> Result<(), RouterSetupError> {
        self.selected = parse_event_kinds(csv)?;
        tracing::info!(
            events = %self.selected.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(","),
            "Event routing configured"
        );
        Ok(())
    }

    /// Replace the annotation fields added to every routed event.
    ///
    /// # Errors
    ///
    /// Returns [`RouterSetupError::MalformedExtraField`] on a pair without
    /// a key or separator; the previous fields are kept.
    pub fn set_extra_fields(&mut self, csv: &str) -> Result<(), RouterSetupError> {
        self.extra_fields = parse_extra_fields(csv)?;
        Ok(())
    }

    #[must_use]
    pub fn selected_kinds(&self) -> &[EventKind] {
        &self.selected
    }

    #[must_use]
    pub fn extra_fields(&self) -> &BTreeMap<String, String> {
        &self.extra_fields
    }

    #[must_use]
    pub fn is_selected(&self, kind: EventKind) -> bool {
        self.selected.contains(&kind)
    }

    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Route one envelope. Unselected kinds are ignored. Sink failures are
    /// logged and counted; they never stop the stream.
    pub async fn route(&self, envelope: &Envelope) {
        let kind = envelope.kind();
        if !self.is_selected(kind) {
            return;
        }

        let mut event = Event::from_envelope(envelope);
        if kind.needs_metadata() {
            if let Some(guid) = envelope.app_guid() {
                if let Some(app) = self.cache.lookup(guid).await {
                    event.enrich(&app);
                }
            }
        }
        for (key, value) in &self.extra_fields {
            event.set(key, value.as_str());
        }

        self.counters.record(kind);
        if let Err(e) = self.sink.ship(&event).await {
            self.counters.record_dropped();
            tracing::warn!(event_type = %kind, error = %e, "Failed to ship event");
        }
    }

    /// Spawn a task logging counter totals every `interval`. Aborting the
    /// returned handle stops it.
    pub fn log_event_totals(&self, interval: Duration) -> JoinHandle<()> {
        let counters = Arc::clone(&self.counters);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = counters.snapshot();
                tracing::info!(
                    total = snapshot.total(),
                    dropped = snapshot.dropped(),
                    counts = %snapshot,
                    "Event totals"
                );
            }
        })
    }
}
