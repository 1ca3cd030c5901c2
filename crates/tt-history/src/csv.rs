//! CSV history backend.
//!
//! Creates three files in the configured directory:
//! - `location_samples.csv`
//! - `stop_events.csv`
//! - `trips.csv` (one row per snapshot; the last row of a trip wins)
//!
//! Timestamps are RFC 3339 with millisecond precision.  Absent optional
//! values are empty fields.

use std::fs::File;
use std::path::Path;

use chrono::SecondsFormat;
use csv::Writer;

use tt_core::Timestamp;

use crate::writer::HistoryWriter;
use crate::{HistoryResult, LocationRow, StopEventRow, TripRow};

pub const SAMPLE_HEADERS: [&str; 11] = [
    "trip_id", "device_id", "bus_id", "timestamp", "lat", "lon",
    "altitude_m", "speed_mps", "heading_deg", "accuracy_m", "late",
];

pub const EVENT_HEADERS: [&str; 15] = [
    "trip_id", "seq", "stop_id", "event_type", "timestamp", "reported_lat", "reported_lon",
    "source", "confirmed_by", "distance_from_stop_m", "skip_candidate", "dwell_time_minutes",
    "passenger_delta", "delay_minutes", "notes",
];

pub const TRIP_HEADERS: [&str; 13] = [
    "trip_id", "device_id", "bus_id", "route_id", "schedule_id", "status", "start_time",
    "end_time", "distance_traveled_m", "route_progress", "stop_count", "passenger_count", "notes",
];

/// Writes history to three CSV files.
pub struct CsvHistoryWriter {
    samples:  Writer<File>,
    events:   Writer<File>,
    trips:    Writer<File>,
    finished: bool,
}

impl CsvHistoryWriter {
    /// Create the three files in `dir` and write their header rows.
    pub fn new(dir: &Path) -> HistoryResult<Self> {
        let mut samples = Writer::from_path(dir.join("location_samples.csv"))?;
        samples.write_record(SAMPLE_HEADERS)?;

        let mut events = Writer::from_path(dir.join("stop_events.csv"))?;
        events.write_record(EVENT_HEADERS)?;

        let mut trips = Writer::from_path(dir.join("trips.csv"))?;
        trips.write_record(TRIP_HEADERS)?;

        Ok(Self { samples, events, trips, finished: false })
    }
}

fn ts(t: Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

impl HistoryWriter for CsvHistoryWriter {
    fn write_samples(&mut self, rows: &[LocationRow]) -> HistoryResult<()> {
        for row in rows {
            self.samples.write_record(&[
                row.trip_id.clone(),
                row.device_id.clone(),
                row.bus_id.clone(),
                ts(row.timestamp),
                row.lat.to_string(),
                row.lon.to_string(),
                opt(row.altitude_m),
                opt(row.speed_mps),
                opt(row.heading_deg),
                opt(row.accuracy_m),
                (row.late as u8).to_string(),
            ])?;
        }
        self.samples.flush()?;
        Ok(())
    }

    fn write_stop_events(&mut self, rows: &[StopEventRow]) -> HistoryResult<()> {
        for row in rows {
            self.events.write_record(&[
                row.trip_id.clone(),
                row.seq.to_string(),
                row.stop_id.clone(),
                row.event_type.to_string(),
                ts(row.timestamp),
                opt(row.reported_lat),
                opt(row.reported_lon),
                row.source.to_string(),
                opt(row.confirmed_by.as_deref()),
                opt(row.distance_from_stop_m),
                (row.skip_candidate as u8).to_string(),
                opt(row.dwell_time_minutes),
                opt(row.passenger_delta),
                opt(row.delay_minutes),
                opt(row.notes.as_deref()),
            ])?;
        }
        self.events.flush()?;
        Ok(())
    }

    fn write_trips(&mut self, rows: &[TripRow]) -> HistoryResult<()> {
        for row in rows {
            self.trips.write_record(&[
                row.trip_id.clone(),
                row.device_id.clone(),
                row.bus_id.clone(),
                row.route_id.clone(),
                row.schedule_id.clone(),
                row.status.to_string(),
                ts(row.start_time),
                opt(row.end_time.map(ts)),
                row.distance_traveled_m.to_string(),
                row.route_progress.to_string(),
                row.stop_count.to_string(),
                row.passenger_count.to_string(),
                opt(row.notes.as_deref()),
            ])?;
        }
        self.trips.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> HistoryResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.samples.flush()?;
        self.events.flush()?;
        self.trips.flush()?;
        Ok(())
    }
}
