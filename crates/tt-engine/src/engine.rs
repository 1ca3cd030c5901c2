//! `TrackingEngine` — trip index, device bindings and the mutating API.
//!
//! # Lock order
//!
//! ```text
//! start_tracking:  bindings entry → trips entry
//! stop_tracking:   trip record    → bindings entry
//! everything else: trip record only (map refs are dropped before locking)
//! ```
//!
//! No path takes a map entry while holding a record lock and then a second
//! record lock, so the two orders above cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};

use tt_core::time::secs_between;
use tt_core::{Clock, DeviceId, EngineConfig, TrackError, TrackResult, TripId};
use tt_route::{RouteCatalog, RouteGeometry, ScheduleCatalog};
use tt_trip::{
    IngestOutcome, LocationSample, ManualConfirmation, ProgressCorrection, Rejection,
    SampleIngestor, StartTrip, StopEvent, StopEventProcessor, StopEventRequest, StopEventType,
    StopTracking, Trip, TripContext, TripRecord,
};

use crate::TrackingObserver;

// ── Hasher ────────────────────────────────────────────────────────────────────

#[cfg(feature = "fx-hash")]
pub(crate) type Hasher = rustc_hash::FxBuildHasher;

#[cfg(not(feature = "fx-hash"))]
pub(crate) type Hasher = std::hash::RandomState;

// ── TripSlot ──────────────────────────────────────────────────────────────────

/// One entry of the trip index: the route geometry the trip was started on
/// and its lock-protected state.
pub(crate) struct TripSlot {
    pub(crate) geometry: Arc<RouteGeometry>,
    record:              RwLock<TripRecord>,
}

impl TripSlot {
    fn new(geometry: Arc<RouteGeometry>, record: TripRecord) -> Self {
        Self { geometry, record: RwLock::new(record) }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, TripRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TripRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observer notifications collected under a trip lock and dispatched after
/// it is released.
enum Notice {
    Accepted(LocationSample, bool),
    Rejected(TripId, Rejection),
    Event(StopEvent),
    Correction(TripId, ProgressCorrection),
    Closed(Trip),
}

// ── TrackingEngine ────────────────────────────────────────────────────────────

/// The live trip-tracking engine.
///
/// Construct with [`TrackingEngineBuilder`](crate::TrackingEngineBuilder).
/// Every method takes `&self`; share the engine across threads with `Arc`.
pub struct TrackingEngine<O: TrackingObserver = crate::NoopObserver> {
    pub(crate) config:   EngineConfig,
    routes:              Arc<dyn RouteCatalog>,
    schedule:            Arc<dyn ScheduleCatalog>,
    pub(crate) clock:    Arc<dyn Clock>,
    observer:            O,
    pub(crate) trips:    DashMap<TripId, Arc<TripSlot>, Hasher>,
    bindings:            DashMap<DeviceId, TripId, Hasher>,
}

impl<O: TrackingObserver> TrackingEngine<O> {
    pub(crate) fn from_parts(
        config:   EngineConfig,
        routes:   Arc<dyn RouteCatalog>,
        schedule: Arc<dyn ScheduleCatalog>,
        clock:    Arc<dyn Clock>,
        observer: O,
    ) -> Self {
        Self {
            config,
            routes,
            schedule,
            clock,
            observer,
            trips:    DashMap::with_hasher(Hasher::default()),
            bindings: DashMap::with_hasher(Hasher::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Number of trips in the index, open and closed.
    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    /// The trip currently bound to `device`, if any.
    pub fn bound_trip(&self, device: &DeviceId) -> Option<TripId> {
        self.bindings.get(device).map(|t| t.value().clone())
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Begin tracking a trip and bind its device.
    ///
    /// Fails with `DeviceAlreadyBound` if the device has an open trip,
    /// `DuplicateTrip` if the trip id was used before, and `RouteNotFound`
    /// if the route catalog has no geometry for the route.
    pub fn start_tracking(&self, req: StartTrip) -> TrackResult<Trip> {
        if req.trip_id.is_blank() || req.device_id.is_blank() {
            return Err(TrackError::InvalidRequest("tripId and deviceId are required".into()));
        }
        if let Some(p) = req.start_location.filter(|p| !p.is_valid()) {
            return Err(TrackError::InvalidRequest(format!("start location {p} is out of range")));
        }
        let geometry = self
            .routes
            .geometry(&req.route_id)
            .ok_or_else(|| TrackError::RouteNotFound(req.route_id.clone()))?;

        let binding = match self.bindings.entry(req.device_id.clone()) {
            Entry::Occupied(e) => {
                return Err(TrackError::DeviceAlreadyBound {
                    device: req.device_id.clone(),
                    trip:   e.get().clone(),
                });
            }
            Entry::Vacant(v) => v,
        };
        let slot = match self.trips.entry(req.trip_id.clone()) {
            Entry::Occupied(_) => return Err(TrackError::DuplicateTrip(req.trip_id.clone())),
            Entry::Vacant(v) => v,
        };

        let trip = Trip::start(req, self.clock.now());
        slot.insert(Arc::new(TripSlot::new(geometry, TripRecord::new(trip.clone()))));
        binding.insert(trip.trip_id.clone());

        info!(
            trip_id = %trip.trip_id,
            device_id = %trip.device_id,
            route_id = %trip.route_id,
            "trip tracking started"
        );
        self.observer.on_trip_started(&trip);
        Ok(trip)
    }

    pub fn pause(&self, trip_id: &TripId) -> TrackResult<Trip> {
        let slot = self.slot(trip_id)?;
        let mut record = slot.write();
        record.pause()?;
        Ok(record.trip().clone())
    }

    /// Resume a paused trip and re-estimate progress from its current
    /// location.
    pub fn resume(&self, trip_id: &TripId) -> TrackResult<Trip> {
        let slot = self.slot(trip_id)?;
        let now = self.clock.now();
        let (trip, notices) = {
            let mut record = slot.write();
            let before = record.corrections().len();
            record.resume(self.ctx(&slot.geometry), now)?;
            let notices = correction_notices(&record, before);
            (record.trip().clone(), notices)
        };
        self.dispatch(notices);
        Ok(trip)
    }

    /// Complete or cancel a trip and release its device binding.
    pub fn stop_tracking(&self, trip_id: &TripId, req: StopTracking) -> TrackResult<Trip> {
        let slot = self.slot(trip_id)?;
        let now = self.clock.now();
        let (trip, mut notices) = {
            let mut record = slot.write();
            let skips = record.stop(self.ctx(&slot.geometry), req, now)?;
            let trip = record.trip().clone();
            self.bindings.remove_if(&trip.device_id, |_, bound| bound == trip_id);
            let notices: Vec<Notice> = skips.into_iter().map(Notice::Event).collect();
            (trip, notices)
        };
        notices.push(Notice::Closed(trip.clone()));
        self.dispatch(notices);
        Ok(trip)
    }

    // ── Ingest ────────────────────────────────────────────────────────────

    /// Ingest one sample.
    ///
    /// Stale and low-accuracy samples are soft rejections: `Ok` with
    /// `rejected` set.  Routing failures (`NoActiveTrip`,
    /// `TripAlreadyClosed`) and malformed samples are `Err`.
    pub fn ingest(&self, sample: LocationSample) -> TrackResult<IngestOutcome> {
        let slot = self.slot_for_sample(&sample)?;
        let (outcome, notices) = {
            let mut record = slot.write();
            if record.trip().status.is_closed() {
                return Err(TrackError::TripAlreadyClosed(record.trip().trip_id.clone()));
            }
            let sample  = sample.normalize()?;
            let before  = record.corrections().len();
            let outcome = SampleIngestor::new(self.ctx(&slot.geometry)).apply(&mut record, sample.clone())?;

            let mut notices = Vec::new();
            match &outcome.rejected {
                Some(rejection) => notices.push(Notice::Rejected(sample.trip_id.clone(), rejection.clone())),
                None            => notices.push(Notice::Accepted(sample, outcome.late)),
            }
            notices.extend(correction_notices(&record, before));
            notices.extend(outcome.derived_events.iter().cloned().map(Notice::Event));
            (outcome, notices)
        };
        self.dispatch(notices);
        Ok(outcome)
    }

    /// Ingest many samples.  Samples of one device are applied in input
    /// order; with the `parallel` feature different devices run
    /// concurrently.  Results come back in input order.
    pub fn ingest_batch(&self, samples: Vec<LocationSample>) -> Vec<TrackResult<IngestOutcome>> {
        let total = samples.len();
        let mut index: HashMap<DeviceId, usize> = HashMap::new();
        let mut groups: Vec<Vec<(usize, LocationSample)>> = Vec::new();
        for (i, sample) in samples.into_iter().enumerate() {
            let g = *index.entry(sample.device_id.clone()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push((i, sample));
        }

        let run_group = |group: Vec<(usize, LocationSample)>| -> Vec<(usize, TrackResult<IngestOutcome>)> {
            group.into_iter().map(|(i, s)| (i, self.ingest(s))).collect()
        };

        #[cfg(feature = "parallel")]
        let done: Vec<(usize, TrackResult<IngestOutcome>)> = {
            use rayon::prelude::*;
            groups.into_par_iter().flat_map_iter(run_group).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let done: Vec<(usize, TrackResult<IngestOutcome>)> = groups.into_iter().flat_map(run_group).collect();

        let mut ordered: Vec<Option<TrackResult<IngestOutcome>>> = (0..total).map(|_| None).collect();
        for (i, result) in done {
            ordered[i] = Some(result);
        }
        ordered.into_iter().flatten().collect()
    }

    // ── Stop events ───────────────────────────────────────────────────────

    pub fn record_arrival(&self, trip_id: &TripId, req: StopEventRequest) -> TrackResult<StopEvent> {
        self.record_stop_event(trip_id, StopEventType::Arrival, req)
    }

    pub fn record_departure(&self, trip_id: &TripId, req: StopEventRequest) -> TrackResult<StopEvent> {
        self.record_stop_event(trip_id, StopEventType::Departure, req)
    }

    pub fn record_boarding(&self, trip_id: &TripId, req: StopEventRequest) -> TrackResult<StopEvent> {
        self.record_stop_event(trip_id, StopEventType::Boarding, req)
    }

    pub fn record_alighting(&self, trip_id: &TripId, req: StopEventRequest) -> TrackResult<StopEvent> {
        self.record_stop_event(trip_id, StopEventType::Alighting, req)
    }

    /// Record an event of any type.  A request whose idempotency key was
    /// seen before on this trip returns the original event unchanged.
    pub fn record_stop_event(
        &self,
        trip_id: &TripId,
        kind:    StopEventType,
        req:     StopEventRequest,
    ) -> TrackResult<StopEvent> {
        let slot = self.slot(trip_id)?;
        let now = self.clock.now();
        let recorded = {
            let mut record = slot.write();
            StopEventProcessor::new(self.ctx(&slot.geometry)).record(&mut record, kind, req, now)?
        };
        if !recorded.replayed {
            self.observer.on_stop_event(&recorded.event);
        }
        Ok(recorded.event)
    }

    /// Record a manual event that bypasses ordering checks.
    pub fn confirm_manual(&self, trip_id: &TripId, confirmation: ManualConfirmation) -> TrackResult<StopEvent> {
        let slot = self.slot(trip_id)?;
        let now = self.clock.now();
        let recorded = {
            let mut record = slot.write();
            StopEventProcessor::new(self.ctx(&slot.geometry)).confirm_manual(&mut record, confirmation, now)?
        };
        if !recorded.replayed {
            self.observer.on_stop_event(&recorded.event);
        }
        Ok(recorded.event)
    }

    // ── Monitoring ────────────────────────────────────────────────────────

    /// Flag open trips with no update for the inactivity timeout.  Returns
    /// the trips flagged by this sweep, sorted.  Status is never changed.
    pub fn sweep_stale(&self) -> Vec<TripId> {
        let now = self.clock.now();
        let timeout_secs = self.config.monitoring.inactivity_timeout_secs as f64;
        let slots: Vec<Arc<TripSlot>> = self.trips.iter().map(|e| Arc::clone(e.value())).collect();

        let mut flagged = Vec::new();
        for slot in slots {
            let mut record = slot.write();
            let trip = record.trip();
            if trip.status.is_closed() || trip.stale {
                continue;
            }
            let last = trip.last_location_update.unwrap_or(trip.start_time);
            let idle_secs = secs_between(last, now);
            if idle_secs >= timeout_secs && record.mark_stale() {
                warn!(trip_id = %record.trip().trip_id, idle_secs, "trip flagged stale");
                flagged.push(record.trip().trip_id.clone());
            }
        }
        flagged.sort();
        for trip_id in &flagged {
            self.observer.on_trip_stale(trip_id);
        }
        flagged
    }

    // ── Internals ─────────────────────────────────────────────────────────

    pub(crate) fn slot(&self, trip_id: &TripId) -> TrackResult<Arc<TripSlot>> {
        self.trips
            .get(trip_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| TrackError::TripNotFound(trip_id.clone()))
    }

    fn ctx<'a>(&'a self, geometry: &'a RouteGeometry) -> TripContext<'a> {
        TripContext { config: &self.config, geometry, schedule: self.schedule.as_ref() }
    }

    /// Route a sample through the device binding.
    fn slot_for_sample(&self, sample: &LocationSample) -> TrackResult<Arc<TripSlot>> {
        let no_trip = || TrackError::NoActiveTrip { device: sample.device_id.clone() };
        let bound = self.bound_trip(&sample.device_id);
        match bound {
            Some(trip_id) if trip_id == sample.trip_id => self.slot(&trip_id),
            Some(_) => Err(no_trip()),
            None => {
                // A device whose trip has closed gets the more precise answer.
                if let Ok(slot) = self.slot(&sample.trip_id) {
                    let record = slot.read();
                    let trip = record.trip();
                    if trip.device_id == sample.device_id && trip.status.is_closed() {
                        return Err(TrackError::TripAlreadyClosed(trip.trip_id.clone()));
                    }
                }
                Err(no_trip())
            }
        }
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Accepted(sample, late)      => self.observer.on_sample_accepted(&sample, late),
                Notice::Rejected(trip_id, r)        => self.observer.on_sample_rejected(&trip_id, &r),
                Notice::Event(event)                => self.observer.on_stop_event(&event),
                Notice::Correction(trip_id, c)      => self.observer.on_progress_correction(&trip_id, &c),
                Notice::Closed(trip)                => self.observer.on_trip_closed(&trip),
            }
        }
    }
}

fn correction_notices(record: &TripRecord, before: usize) -> Vec<Notice> {
    let trip_id = &record.trip().trip_id;
    record.corrections()[before..]
        .iter()
        .map(|c| Notice::Correction(trip_id.clone(), *c))
        .collect()
}
