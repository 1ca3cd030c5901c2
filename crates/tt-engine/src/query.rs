//! Read path.
//!
//! Every query takes the trip's read lock, copies out what it needs and
//! releases it, so a view never mixes a location from one sample with
//! progress from another.  Queries never consult the clock except
//! [`arrivals_at_stop`](TrackingEngine::arrivals_at_stop), whose window is
//! relative to now; repeated calls with no intervening mutation return
//! identical results.

use std::str::FromStr;
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use tt_core::time::minutes_between;
use tt_core::{BusId, GeoPoint, RouteId, StopId, TimeRange, Timestamp, TrackError, TrackResult, TripId};
use tt_trip::{Eta, LocationSample, ProgressCorrection, StopEvent, Trip, TripStatus};

use crate::engine::TripSlot;
use crate::{TrackingEngine, TrackingObserver};

// ── Views ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub trip_id:        TripId,
    /// `None` until the trip has a start location or a fix.
    pub point:          Option<GeoPoint>,
    pub altitude_m:     Option<f64>,
    pub speed_mps:      Option<f64>,
    pub heading_deg:    Option<f64>,
    pub accuracy_m:     Option<f64>,
    pub timestamp:      Option<Timestamp>,
    pub route_progress: f64,
    pub status:         TripStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStatusView {
    pub trip_id:              TripId,
    pub status:               TripStatus,
    pub stale:                bool,
    pub route_progress:       f64,
    pub distance_traveled_m:  f64,
    pub average_speed_mps:    f64,
    pub max_speed_mps:        f64,
    pub stop_count:           u32,
    pub passenger_count:      u32,
    pub next_stop_id:         Option<StopId>,
    pub next_stop_eta:        Option<Eta>,
    pub estimated_arrival:    Option<Timestamp>,
    pub last_location_update: Option<Timestamp>,
    pub start_time:           Timestamp,
    pub end_time:             Option<Timestamp>,
}

impl From<&Trip> for TripStatusView {
    fn from(t: &Trip) -> Self {
        Self {
            trip_id:              t.trip_id.clone(),
            status:               t.status,
            stale:                t.stale,
            route_progress:       t.route_progress,
            distance_traveled_m:  t.distance_traveled_m,
            average_speed_mps:    t.average_speed_mps,
            max_speed_mps:        t.max_speed_mps,
            stop_count:           t.stop_count,
            passenger_count:      t.passenger_count,
            next_stop_id:         t.next_stop_id.clone(),
            next_stop_eta:        t.next_stop_eta,
            estimated_arrival:    t.estimated_arrival,
            last_location_update: t.last_location_update,
            start_time:           t.start_time,
            end_time:             t.end_time,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStopView {
    pub stop_id:     StopId,
    pub name:        String,
    pub location:    GeoPoint,
    pub sequence:    u32,
    /// Along-route distance from the bus to the stop.
    pub distance_m:  f64,
    pub eta:         Option<Eta>,
}

/// One trip expected at a stop.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalEstimate {
    pub trip_id:      TripId,
    pub bus_id:       BusId,
    pub route_id:     RouteId,
    pub stop_id:      StopId,
    pub eta:          Timestamp,
    /// Never negative: an ETA already in the past means the bus is due.
    pub minutes_away: f64,
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// Position in a trip's location history: the first sample at or after
/// `timestamp`, skipping `offset` samples that share that timestamp.
///
/// Encoded as `"<unix-millis>:<offset>"`.  The cursor carries no server
/// state, so a client can resume from it at any time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HistoryCursor {
    pub timestamp: Timestamp,
    pub offset:    usize,
}

impl HistoryCursor {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.timestamp.timestamp_millis(), self.offset)
    }

    pub fn decode(s: &str) -> TrackResult<Self> {
        let invalid = || TrackError::InvalidRequest(format!("malformed history cursor {s:?}"));
        let (millis, offset) = s.split_once(':').ok_or_else(invalid)?;
        let millis: i64 = millis.parse().map_err(|_| invalid())?;
        let offset: usize = offset.parse().map_err(|_| invalid())?;
        let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(invalid)?;
        Ok(Self { timestamp, offset })
    }
}

impl FromStr for HistoryCursor {
    type Err = TrackError;

    fn from_str(s: &str) -> TrackResult<Self> {
        Self::decode(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub cursor: Option<String>,
    /// Clamped to `[1, query.max_page_size]`; absent means the maximum.
    pub limit:  Option<usize>,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { cursor: None, limit: Some(limit) }
    }

    pub fn after(cursor: impl Into<String>, limit: usize) -> Self {
        Self { cursor: Some(cursor.into()), limit: Some(limit) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items:       Vec<T>,
    /// `None` on the last page.
    pub next_cursor: Option<String>,
}

// ── Queries ───────────────────────────────────────────────────────────────────

impl<O: TrackingObserver> TrackingEngine<O> {
    /// A snapshot of the trip.
    pub fn trip(&self, trip_id: &TripId) -> TrackResult<Trip> {
        Ok(self.slot(trip_id)?.read().trip().clone())
    }

    pub fn current_location(&self, trip_id: &TripId) -> TrackResult<LocationView> {
        let slot = self.slot(trip_id)?;
        let record = slot.read();
        let trip = record.trip();
        let fix = record.last_fix();
        Ok(LocationView {
            trip_id:        trip.trip_id.clone(),
            point:          trip.current_location,
            altitude_m:     fix.and_then(|f| f.altitude_m),
            speed_mps:      fix.and_then(|f| f.speed_mps),
            heading_deg:    fix.and_then(|f| f.heading_deg),
            accuracy_m:     fix.and_then(|f| f.accuracy_m),
            timestamp:      fix.map(|f| f.timestamp),
            route_progress: trip.route_progress,
            status:         trip.status,
        })
    }

    pub fn trip_status(&self, trip_id: &TripId) -> TrackResult<TripStatusView> {
        let slot = self.slot(trip_id)?;
        let record = slot.read();
        Ok(TripStatusView::from(record.trip()))
    }

    /// The projected next stop, or `None` once the bus is past the last
    /// stop or before the first fix.
    pub fn next_stop(&self, trip_id: &TripId) -> TrackResult<Option<NextStopView>> {
        let slot = self.slot(trip_id)?;
        let record = slot.read();
        let trip = record.trip();
        let Some(stop) = trip.next_stop_id.as_ref().and_then(|id| slot.geometry.stop(id)) else {
            return Ok(None);
        };
        let along_m = trip.route_progress * slot.geometry.total_length_m();
        Ok(Some(NextStopView {
            stop_id:    stop.stop_id.clone(),
            name:       stop.name.clone(),
            location:   stop.location,
            sequence:   stop.sequence,
            distance_m: (stop.distance_from_start_m - along_m).max(0.0),
            eta:        trip.next_stop_eta,
        }))
    }

    /// Every stop event of the trip in timestamp order.
    pub fn stop_events(&self, trip_id: &TripId) -> TrackResult<Vec<StopEvent>> {
        Ok(self.slot(trip_id)?.read().ledger().events_by_time())
    }

    /// Correction markers recorded by the progress regression guard.
    pub fn corrections(&self, trip_id: &TripId) -> TrackResult<Vec<ProgressCorrection>> {
        Ok(self.slot(trip_id)?.read().corrections().to_vec())
    }

    /// One page of the trip's location history within `range`, ascending by
    /// timestamp.
    pub fn location_history(
        &self,
        trip_id: &TripId,
        range:   TimeRange,
        page:    &PageRequest,
    ) -> TrackResult<Page<LocationSample>> {
        let cursor = page.cursor.as_deref().map(HistoryCursor::decode).transpose()?;
        let limit = page
            .limit
            .unwrap_or(self.config.query.max_page_size)
            .clamp(1, self.config.query.max_page_size);

        let slot = self.slot(trip_id)?;
        let record = slot.read();
        let window = record.history_in(range);

        let start = match cursor {
            Some(c) => window.partition_point(|s| s.timestamp < c.timestamp) + c.offset,
            None    => 0,
        }
        .min(window.len());
        let end = (start + limit).min(window.len());

        let next_cursor = window.get(end).map(|next| {
            let first_same = window.partition_point(|s| s.timestamp < next.timestamp);
            HistoryCursor { timestamp: next.timestamp, offset: end - first_same }.encode()
        });
        Ok(Page { items: window[start..end].to_vec(), next_cursor })
    }

    /// Trips in `status`, sorted by id.
    pub fn trips_by_status(&self, status: TripStatus) -> Vec<TripStatusView> {
        let mut out: Vec<TripStatusView> = self
            .snapshot_slots()
            .iter()
            .filter_map(|slot| {
                let record = slot.read();
                (record.trip().status == status).then(|| TripStatusView::from(record.trip()))
            })
            .collect();
        out.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
        out
    }

    /// Open trips currently flagged stale, sorted.
    pub fn stale_trips(&self) -> Vec<TripId> {
        let mut out: Vec<TripId> = self
            .snapshot_slots()
            .iter()
            .filter_map(|slot| {
                let record = slot.read();
                let trip = record.trip();
                (trip.stale && trip.status.is_open()).then(|| trip.trip_id.clone())
            })
            .collect();
        out.sort();
        out
    }

    /// Open trips whose next stop is `stop_id` with a numeric ETA no later
    /// than `window_minutes` from now, soonest first.
    pub fn arrivals_at_stop(&self, stop_id: &StopId, window_minutes: f64) -> Vec<ArrivalEstimate> {
        let now = self.clock.now();
        let mut out: Vec<ArrivalEstimate> = self
            .snapshot_slots()
            .iter()
            .filter_map(|slot| {
                let record = slot.read();
                let trip = record.trip();
                if !trip.status.is_open() || trip.next_stop_id.as_ref() != Some(stop_id) {
                    return None;
                }
                let eta = trip.next_stop_eta?.at()?;
                let minutes_away = minutes_between(now, eta);
                (minutes_away <= window_minutes).then(|| ArrivalEstimate {
                    trip_id:      trip.trip_id.clone(),
                    bus_id:       trip.bus_id.clone(),
                    route_id:     trip.route_id.clone(),
                    stop_id:      stop_id.clone(),
                    eta,
                    minutes_away: minutes_away.max(0.0),
                })
            })
            .collect();
        out.sort_by(|a, b| a.eta.cmp(&b.eta).then_with(|| a.trip_id.cmp(&b.trip_id)));
        out
    }

    /// The trip slots at this instant.  Map refs are released before any
    /// record lock is taken.
    fn snapshot_slots(&self) -> Vec<Arc<TripSlot>> {
        self.trips.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
