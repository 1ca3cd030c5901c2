//! The stop-event processor.
//!
//! # Ordering rules
//!
//! | Event                   | Automatic requires                          |
//! |-------------------------|---------------------------------------------|
//! | arrival                 | no open arrival at the stop                 |
//! | departure               | an open arrival, not later than the event   |
//! | boarding / alighting    | any earlier arrival at the stop             |
//! | delay / skip            | nothing                                     |
//!
//! A manual event with an authorized confirmer skips these checks.  It is
//! an explicit override and is accepted as-is.
//!
//! # Derived fields
//!
//! - `delay_minutes`: actual − scheduled (departures use the scheduled
//!   departure, falling back to the scheduled arrival)
//! - `dwell_time_minutes`: departure − matching arrival; the request's own
//!   value is used only when there is no arrival to match
//! - `distance_from_stop_m`: haversine from the reported location (or the
//!   trip's current location) to the stop; beyond the mismatch threshold the
//!   event is flagged `skip_candidate`

use tracing::{debug, info};

use tt_core::time::{minutes_between, secs_between};
use tt_core::{GeoPoint, StopId, Timestamp, TrackError, TrackResult};
use tt_route::RouteStop;

use crate::{
    DwellAlert, ManualConfirmation, StopEvent, StopEventRequest, StopEventSource, StopEventType,
    TripContext, TripRecord,
};

/// Result of a stop-event call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub event:    StopEvent,
    /// `true` if the idempotency key matched an earlier event and nothing
    /// was appended.
    pub replayed: bool,
}

pub struct StopEventProcessor<'a> {
    ctx: TripContext<'a>,
}

impl<'a> StopEventProcessor<'a> {
    pub fn new(ctx: TripContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn confirm_manual(
        &self,
        record:       &mut TripRecord,
        confirmation: ManualConfirmation,
        now:          Timestamp,
    ) -> TrackResult<RecordedEvent> {
        let mut request = confirmation.request;
        request.is_manual = true;
        self.record(record, confirmation.event_type, request, now)
    }

    /// Validate and append one event of type `kind`.
    pub fn record(
        &self,
        record:  &mut TripRecord,
        kind:    StopEventType,
        request: StopEventRequest,
        now:     Timestamp,
    ) -> TrackResult<RecordedEvent> {
        let trip_id = record.trip.trip_id.clone();
        if record.trip.status.is_closed() {
            return Err(TrackError::TripAlreadyClosed(trip_id));
        }
        if let Some(existing) = request
            .idempotency_key
            .as_deref()
            .and_then(|k| record.ledger.by_idempotency_key(k))
        {
            debug!(trip_id = %trip_id, seq = existing.seq, "stop event replayed by idempotency key");
            return Ok(RecordedEvent { event: existing.clone(), replayed: true });
        }

        let source = self.resolve_source(&request)?;
        let stop = self.ctx.geometry.stop(&request.stop_id).ok_or_else(|| TrackError::StopNotOnRoute {
            stop:  request.stop_id.clone(),
            route: record.trip.route_id.clone(),
        })?;
        let timestamp = request.timestamp.unwrap_or(now);

        if !source.is_manual() {
            self.check_order(record, kind, &stop.stop_id, timestamp)?;
        }

        let mut event = self.base_event(record, stop, kind, timestamp, request.location, source);
        event.notes = request.notes.clone();

        // ── Type-specific fields ─────────────────────────────────────────
        let open_arrival_at = record.ledger.open_arrival(&stop.stop_id).map(|a| a.timestamp);
        match kind {
            StopEventType::Departure => {
                event.dwell_time_minutes = match open_arrival_at {
                    Some(arrived) => Some(minutes_between(arrived, timestamp).max(0.0)),
                    None          => request.dwell_time_minutes.filter(|d| d.is_finite() && *d >= 0.0),
                };
            }
            StopEventType::Boarding | StopEventType::Alighting => {
                let n = request.passenger_count.ok_or_else(|| {
                    TrackError::InvalidRequest(format!("{kind} requires passengerCount"))
                })? as i64;
                event.passenger_delta = Some(if kind == StopEventType::Boarding { n } else { -n });
            }
            _ => {}
        }
        if matches!(kind, StopEventType::Arrival | StopEventType::Departure) {
            if let Some(count) = request.passenger_count {
                event.passenger_delta = Some(count as i64 - record.trip.passenger_count as i64);
            }
        }

        // ── Trip updates ─────────────────────────────────────────────────
        if kind == StopEventType::Arrival {
            record.trip.stop_count += 1;
        }
        if let Some(delta) = event.passenger_delta {
            record.trip.adjust_passengers(delta);
        }

        if event.skip_candidate {
            info!(
                trip_id = %trip_id,
                stop_id = %stop.stop_id,
                distance_m = event.distance_from_stop_m,
                "stop event reported far from stop; flagged as skip candidate"
            );
        }
        debug!(
            trip_id = %trip_id,
            stop_id = %stop.stop_id,
            event = kind.as_str(),
            manual = event.source.is_manual(),
            "stop event recorded"
        );

        let event = record.ledger.append(event, request.idempotency_key).clone();
        Ok(RecordedEvent { event, replayed: false })
    }

    /// Advisory `delay` event for a geofence dwell alert, or `None` if the
    /// stop already has an arrival or an event that outranks an automatic one.
    pub fn advisory_delay(&self, record: &mut TripRecord, alert: &DwellAlert, now: Timestamp) -> Option<StopEvent> {
        let ledger = &record.ledger;
        let source = StopEventSource::Automatic;
        if ledger.has_arrival(&alert.stop_id) || ledger.has_event_outranking(&alert.stop_id, &source) {
            return None;
        }
        let stop = self.ctx.geometry.stop(&alert.stop_id)?;
        let reported = record.trip.current_location;
        let mut event = self.base_event(record, stop, StopEventType::Delay, now, reported, source);
        event.notes = Some(format!("stationary at stop for {:.0}s without an arrival", alert.dwell_secs));
        info!(
            trip_id = %record.trip.trip_id,
            stop_id = %alert.stop_id,
            dwell_secs = alert.dwell_secs,
            "geofence dwell produced advisory delay"
        );
        Some(record.ledger.append(event, None).clone())
    }

    /// Close every open arrival with a synthetic `skip`.
    pub fn close_out_arrivals(&self, record: &mut TripRecord, now: Timestamp, reason: &str) -> Vec<StopEvent> {
        let mut out = Vec::new();
        for stop_id in record.ledger.open_arrival_stops() {
            let Some(stop) = self.ctx.geometry.stop(&stop_id) else { continue };
            let reported = record.trip.current_location;
            let mut event = self.base_event(record, stop, StopEventType::Skip, now, reported, StopEventSource::Automatic);
            event.notes = Some(reason.to_string());
            out.push(record.ledger.append(event, None).clone());
        }
        out
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn resolve_source(&self, request: &StopEventRequest) -> TrackResult<StopEventSource> {
        if !request.is_manual {
            return Ok(StopEventSource::Automatic);
        }
        let who = request
            .confirmed_by
            .as_ref()
            .filter(|w| !w.is_blank())
            .ok_or_else(|| TrackError::InvalidRequest("confirmedBy is required when isManual is set".into()))?;
        if !self.ctx.config.stop_events.is_authorized(who) {
            return Err(TrackError::UnauthorizedConfirmer(who.to_string()));
        }
        Ok(StopEventSource::Manual { confirmed_by: who.clone() })
    }

    fn check_order(&self, record: &TripRecord, kind: StopEventType, stop: &StopId, at: Timestamp) -> TrackResult<()> {
        let ledger = &record.ledger;
        let out_of_order = |reason: String| TrackError::OutOfOrderEvent {
            trip:  record.trip.trip_id.clone(),
            stop:  stop.clone(),
            event: kind.as_str(),
            reason,
        };
        if kind.requires_arrival() && !ledger.has_arrival(stop) {
            return Err(out_of_order("no arrival at this stop".into()));
        }
        match kind {
            StopEventType::Arrival => {
                if ledger.open_arrival(stop).is_some() {
                    return Err(out_of_order("an earlier arrival has no departure".into()));
                }
            }
            StopEventType::Departure => match ledger.open_arrival(stop) {
                None => return Err(out_of_order("no unmatched arrival".into())),
                Some(arrival) if at < arrival.timestamp => {
                    return Err(out_of_order(format!(
                        "departure is {:.0}s before its arrival",
                        secs_between(at, arrival.timestamp)
                    )));
                }
                Some(_) => {}
            },
            StopEventType::Boarding | StopEventType::Alighting => {
                if !ledger.arrived_by(stop, at) {
                    return Err(out_of_order(format!("{kind} is timestamped before any arrival here")));
                }
            }
            StopEventType::Delay | StopEventType::Skip => {}
        }
        Ok(())
    }

    fn base_event(
        &self,
        record:    &TripRecord,
        stop:      &RouteStop,
        kind:      StopEventType,
        timestamp: Timestamp,
        reported:  Option<GeoPoint>,
        source:    StopEventSource,
    ) -> StopEvent {
        let trip     = &record.trip;
        let reported = reported.or(trip.current_location);
        let distance = reported.map(|p| p.distance_m(stop.location));
        let skip_candidate =
            distance.is_some_and(|d| d > self.ctx.config.stop_events.mismatch_threshold_m);
        let fix = record.last_fix();

        StopEvent {
            trip_id:              trip.trip_id.clone(),
            seq:                  record.ledger.next_seq(),
            stop_id:              stop.stop_id.clone(),
            event_type:           kind,
            timestamp,
            reported_location:    reported,
            stop_location:        stop.location,
            source,
            accuracy_m:           fix.and_then(|f| f.accuracy_m),
            speed_mps:            fix.and_then(|f| f.speed_mps),
            heading_deg:          fix.and_then(|f| f.heading_deg),
            distance_from_stop_m: distance,
            skip_candidate,
            dwell_time_minutes:   None,
            passenger_delta:      None,
            delay_minutes:        self.schedule_delay(record, stop, kind, timestamp),
            notes:                None,
        }
    }

    fn schedule_delay(&self, record: &TripRecord, stop: &RouteStop, kind: StopEventType, at: Timestamp) -> Option<f64> {
        let scheduled = self
            .ctx
            .schedule
            .scheduled_stop(&record.trip.schedule_id, &stop.stop_id)?;
        let reference = match kind {
            StopEventType::Departure => scheduled.departure.or(scheduled.arrival),
            StopEventType::Arrival | StopEventType::Delay => scheduled.arrival,
            StopEventType::Boarding | StopEventType::Alighting | StopEventType::Skip => None,
        }?;
        Some(minutes_between(reference, at))
    }
}
