//! Flat row types written by history backends.
//!
//! Rows own plain strings and numbers so a backend never needs the domain
//! crates to lay out a record.

use tt_core::Timestamp;
use tt_trip::{LocationSample, StopEvent, Trip};

/// One accepted location sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRow {
    pub trip_id:     String,
    pub device_id:   String,
    pub bus_id:      String,
    pub timestamp:   Timestamp,
    pub lat:         f64,
    pub lon:         f64,
    pub altitude_m:  Option<f64>,
    pub speed_mps:   Option<f64>,
    pub heading_deg: Option<f64>,
    pub accuracy_m:  Option<f64>,
    /// Arrived after a newer fix; history only.
    pub late:        bool,
}

impl LocationRow {
    pub fn from_sample(sample: &LocationSample, late: bool) -> Self {
        Self {
            trip_id:     sample.trip_id.to_string(),
            device_id:   sample.device_id.to_string(),
            bus_id:      sample.bus_id.to_string(),
            timestamp:   sample.timestamp,
            lat:         sample.point.lat,
            lon:         sample.point.lon,
            altitude_m:  sample.altitude_m,
            speed_mps:   sample.speed_mps,
            heading_deg: sample.heading_deg,
            accuracy_m:  sample.accuracy_m,
            late,
        }
    }
}

/// One stop event.  `(trip_id, seq)` is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct StopEventRow {
    pub trip_id:              String,
    pub seq:                  u64,
    pub stop_id:              String,
    pub event_type:           &'static str,
    pub timestamp:            Timestamp,
    pub reported_lat:         Option<f64>,
    pub reported_lon:         Option<f64>,
    /// `"manual"` or `"automatic"`.
    pub source:               &'static str,
    pub confirmed_by:         Option<String>,
    pub distance_from_stop_m: Option<f64>,
    pub skip_candidate:       bool,
    pub dwell_time_minutes:   Option<f64>,
    pub passenger_delta:      Option<i64>,
    pub delay_minutes:        Option<f64>,
    pub notes:                Option<String>,
}

impl From<&StopEvent> for StopEventRow {
    fn from(e: &StopEvent) -> Self {
        Self {
            trip_id:              e.trip_id.to_string(),
            seq:                  e.seq,
            stop_id:              e.stop_id.to_string(),
            event_type:           e.event_type.as_str(),
            timestamp:            e.timestamp,
            reported_lat:         e.reported_location.map(|p| p.lat),
            reported_lon:         e.reported_location.map(|p| p.lon),
            source:               if e.source.is_manual() { "manual" } else { "automatic" },
            confirmed_by:         e.source.confirmed_by().map(ToString::to_string),
            distance_from_stop_m: e.distance_from_stop_m,
            skip_candidate:       e.skip_candidate,
            dwell_time_minutes:   e.dwell_time_minutes,
            passenger_delta:      e.passenger_delta,
            delay_minutes:        e.delay_minutes,
            notes:                e.notes.clone(),
        }
    }
}

/// A snapshot of a trip at start or close.  Later snapshots of the same
/// trip supersede earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRow {
    pub trip_id:             String,
    pub device_id:           String,
    pub bus_id:              String,
    pub route_id:            String,
    pub schedule_id:         String,
    pub status:              &'static str,
    pub start_time:          Timestamp,
    pub end_time:            Option<Timestamp>,
    pub distance_traveled_m: f64,
    pub route_progress:      f64,
    pub stop_count:          u32,
    pub passenger_count:     u32,
    pub notes:               Option<String>,
}

impl From<&Trip> for TripRow {
    fn from(t: &Trip) -> Self {
        Self {
            trip_id:             t.trip_id.to_string(),
            device_id:           t.device_id.to_string(),
            bus_id:              t.bus_id.to_string(),
            route_id:            t.route_id.to_string(),
            schedule_id:         t.schedule_id.to_string(),
            status:              t.status.as_str(),
            start_time:          t.start_time,
            end_time:            t.end_time,
            distance_traveled_m: t.distance_traveled_m,
            route_progress:      t.route_progress,
            stop_count:          t.stop_count,
            passenger_count:     t.passenger_count,
            notes:               t.notes.clone(),
        }
    }
}
