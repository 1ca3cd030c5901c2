//! The per-trip stop-event log.
//!
//! Events are appended, never edited.  Alongside the log the ledger keeps
//! two small indexes:
//!
//! ```text
//! open_arrivals   stop → index of its arrival with no departure yet
//! idempotency     client key → index of the event it created
//! ```

use std::collections::{HashMap, HashSet};

use tt_core::{StopId, Timestamp};

use crate::{StopEvent, StopEventSource, StopEventType};

#[derive(Clone, Debug, Default)]
pub struct StopLedger {
    events:        Vec<StopEvent>,
    open_arrivals: HashMap<StopId, usize>,
    arrived:       HashSet<StopId>,
    idempotency:   HashMap<String, usize>,
}

impl StopLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sequence number the next appended event will carry.
    #[inline]
    pub fn next_seq(&self) -> u64 {
        self.events.len() as u64
    }

    /// Events in append order.
    pub fn events(&self) -> &[StopEvent] {
        &self.events
    }

    /// Events ordered by timestamp; append order breaks ties.
    pub fn events_by_time(&self) -> Vec<StopEvent> {
        let mut out = self.events.clone();
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        out
    }

    /// The arrival at `stop` that has not been matched by a departure.
    pub fn open_arrival(&self, stop: &StopId) -> Option<&StopEvent> {
        self.open_arrivals.get(stop).map(|&i| &self.events[i])
    }

    /// `true` if any arrival was ever recorded at `stop`.
    pub fn has_arrival(&self, stop: &StopId) -> bool {
        self.arrived.contains(stop)
    }

    /// `true` if an arrival at `stop` was recorded with a timestamp at or
    /// before `at`.
    pub fn arrived_by(&self, stop: &StopId, at: Timestamp) -> bool {
        self.has_arrival(stop)
            && self
                .events
                .iter()
                .any(|e| &e.stop_id == stop && e.event_type == StopEventType::Arrival && e.timestamp <= at)
    }

    /// `true` if any event at `stop` has a source that outranks `source`.
    pub fn has_event_outranking(&self, stop: &StopId, source: &StopEventSource) -> bool {
        self.events
            .iter()
            .any(|e| &e.stop_id == stop && e.source.outranks(source))
    }

    pub fn by_idempotency_key(&self, key: &str) -> Option<&StopEvent> {
        self.idempotency.get(key).map(|&i| &self.events[i])
    }

    /// Stops with an open arrival, sorted for deterministic close-out.
    pub fn open_arrival_stops(&self) -> Vec<StopId> {
        let mut stops: Vec<StopId> = self.open_arrivals.keys().cloned().collect();
        stops.sort();
        stops
    }

    /// Append `event` and update the arrival-matching indexes.
    ///
    /// An arrival opens its stop; a departure or skip closes it.
    pub fn append(&mut self, event: StopEvent, idempotency_key: Option<String>) -> &StopEvent {
        let index = self.events.len();
        match event.event_type {
            StopEventType::Arrival => {
                self.open_arrivals.insert(event.stop_id.clone(), index);
                self.arrived.insert(event.stop_id.clone());
            }
            StopEventType::Departure | StopEventType::Skip => {
                self.open_arrivals.remove(&event.stop_id);
            }
            StopEventType::Boarding | StopEventType::Alighting | StopEventType::Delay => {}
        }
        if let Some(key) = idempotency_key {
            self.idempotency.insert(key, index);
        }
        self.events.push(event);
        &self.events[index]
    }
}
