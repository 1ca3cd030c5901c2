//! Reference-data capabilities injected into the engine.
//!
//! # Pluggability
//!
//! The engine asks for "geometry for route X" and "schedule times for stop Y
//! on schedule Z" through these traits, so a deployment can back them with a
//! database, a GTFS feed or a test fixture without touching the tracking
//! core.  The in-memory implementations here are sufficient for a
//! preloaded catalog.
//!
//! # Thread safety
//!
//! Implementations must be `Send + Sync`; lookups happen on every ingest
//! thread.

use std::collections::HashMap;
use std::sync::Arc;

use tt_core::{RouteId, ScheduleId, StopId, Timestamp};

use crate::RouteGeometry;

// ── Routes ────────────────────────────────────────────────────────────────────

/// Source of route geometry.
pub trait RouteCatalog: Send + Sync {
    fn geometry(&self, route: &RouteId) -> Option<Arc<RouteGeometry>>;
}

/// A [`RouteCatalog`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryRouteCatalog {
    routes: HashMap<RouteId, Arc<RouteGeometry>>,
}

impl InMemoryRouteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a route, keyed by its `route_id`.
    pub fn insert(&mut self, geometry: RouteGeometry) {
        self.routes.insert(geometry.route_id.clone(), Arc::new(geometry));
    }

    pub fn with(mut self, geometry: RouteGeometry) -> Self {
        self.insert(geometry);
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteCatalog for InMemoryRouteCatalog {
    fn geometry(&self, route: &RouteId) -> Option<Arc<RouteGeometry>> {
        self.routes.get(route).cloned()
    }
}

// ── Schedules ─────────────────────────────────────────────────────────────────

/// Scheduled times at one stop of one schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduledStop {
    pub arrival:   Option<Timestamp>,
    pub departure: Option<Timestamp>,
}

/// Source of scheduled stop times, used to compute schedule delay.
pub trait ScheduleCatalog: Send + Sync {
    fn scheduled_stop(&self, schedule: &ScheduleId, stop: &StopId) -> Option<ScheduledStop>;
}

/// A [`ScheduleCatalog`] with no timetable.  Every delay is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSchedule;

impl ScheduleCatalog for NoSchedule {
    fn scheduled_stop(&self, _schedule: &ScheduleId, _stop: &StopId) -> Option<ScheduledStop> {
        None
    }
}

/// A [`ScheduleCatalog`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryScheduleCatalog {
    entries: HashMap<(ScheduleId, StopId), ScheduledStop>,
}

impl InMemoryScheduleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schedule: ScheduleId, stop: StopId, times: ScheduledStop) {
        self.entries.insert((schedule, stop), times);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ScheduleCatalog for InMemoryScheduleCatalog {
    fn scheduled_stop(&self, schedule: &ScheduleId, stop: &StopId) -> Option<ScheduledStop> {
        self.entries.get(&(schedule.clone(), stop.clone())).copied()
    }
}
