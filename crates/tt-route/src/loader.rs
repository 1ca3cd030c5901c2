//! CSV reference-data loaders.
//!
//! # CSV formats
//!
//! Shapes — one row per polyline vertex:
//!
//! ```csv
//! route_id,sequence,lat,lon
//! R1,0,12.9716,77.5946
//! R1,1,12.9720,77.5990
//! ```
//!
//! Stops — one row per stop on a route.  `distance_from_start_m` may be
//! left empty, in which case the stop is placed by projection:
//!
//! ```csv
//! route_id,stop_id,name,lat,lon,sequence,distance_from_start_m
//! R1,S1,Majestic,12.9716,77.5946,1,0
//! R1,S2,Corporation,12.9720,77.5990,2,
//! ```
//!
//! Schedules — one row per (schedule, stop), RFC 3339 timestamps, either
//! column may be empty:
//!
//! ```csv
//! schedule_id,stop_id,arrival,departure
//! SCH1,S1,2024-05-01T10:00:00Z,2024-05-01T10:02:00Z
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use tt_core::{GeoPoint, RouteId, ScheduleId, StopId, Timestamp};

use crate::{
    InMemoryRouteCatalog, InMemoryScheduleCatalog, RouteError, RouteGeometryBuilder, RouteResult,
    ScheduledStop,
};

// ── CSV records ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ShapeRecord {
    route_id: String,
    sequence: u32,
    lat:      f64,
    lon:      f64,
}

#[derive(Deserialize)]
struct StopRecord {
    route_id:              String,
    stop_id:               String,
    name:                  String,
    lat:                   f64,
    lon:                   f64,
    sequence:              u32,
    distance_from_start_m: Option<f64>,
}

#[derive(Deserialize)]
struct ScheduleRecord {
    schedule_id: String,
    stop_id:     String,
    arrival:     Option<String>,
    departure:   Option<String>,
}

// ── Routes ────────────────────────────────────────────────────────────────────

/// Load every route in the shape and stop files into a catalog.
pub fn load_routes_csv(shapes: &Path, stops: &Path) -> RouteResult<InMemoryRouteCatalog> {
    let shapes = std::fs::File::open(shapes)?;
    let stops  = std::fs::File::open(stops)?;
    load_routes_reader(shapes, stops)
}

/// Like [`load_routes_csv`] but accepts any `Read` sources.
pub fn load_routes_reader<S: Read, T: Read>(shapes: S, stops: T) -> RouteResult<InMemoryRouteCatalog> {
    // ── Parse shapes, grouped by route and ordered by sequence ───────────
    let mut by_route: BTreeMap<String, Vec<ShapeRecord>> = BTreeMap::new();
    for result in csv::Reader::from_reader(shapes).deserialize::<ShapeRecord>() {
        let row = result.map_err(|e| RouteError::Parse(e.to_string()))?;
        by_route.entry(row.route_id.clone()).or_default().push(row);
    }

    let mut builders: BTreeMap<String, RouteGeometryBuilder> = by_route
        .into_iter()
        .map(|(route_id, mut rows)| {
            rows.sort_by_key(|r| r.sequence);
            let builder = RouteGeometryBuilder::new(RouteId::from(route_id.as_str()))
                .points(rows.iter().map(|r| GeoPoint::new(r.lat, r.lon)));
            (route_id, builder)
        })
        .collect();

    // ── Attach stops ─────────────────────────────────────────────────────
    for result in csv::Reader::from_reader(stops).deserialize::<StopRecord>() {
        let row = result.map_err(|e| RouteError::Parse(e.to_string()))?;
        let builder = builders
            .remove(&row.route_id)
            .ok_or_else(|| RouteError::UnknownRoute(RouteId::from(row.route_id.as_str())))?;
        let location = GeoPoint::new(row.lat, row.lon);
        let builder = match row.distance_from_start_m {
            Some(d) => builder.stop_at_distance(row.stop_id.as_str(), row.name, location, row.sequence, d),
            None    => builder.stop(row.stop_id.as_str(), row.name, location, row.sequence),
        };
        builders.insert(row.route_id, builder);
    }

    let mut catalog = InMemoryRouteCatalog::new();
    for (_, builder) in builders {
        catalog.insert(builder.build()?);
    }
    info!(routes = catalog.len(), "loaded route catalog");
    Ok(catalog)
}

// ── Schedules ─────────────────────────────────────────────────────────────────

pub fn load_schedule_csv(path: &Path) -> RouteResult<InMemoryScheduleCatalog> {
    let file = std::fs::File::open(path)?;
    load_schedule_reader(file)
}

/// Like [`load_schedule_csv`] but accepts any `Read` source.
pub fn load_schedule_reader<R: Read>(reader: R) -> RouteResult<InMemoryScheduleCatalog> {
    let mut catalog = InMemoryScheduleCatalog::new();
    for result in csv::Reader::from_reader(reader).deserialize::<ScheduleRecord>() {
        let row = result.map_err(|e| RouteError::Parse(e.to_string()))?;
        let times = ScheduledStop {
            arrival:   parse_time(row.arrival.as_deref())?,
            departure: parse_time(row.departure.as_deref())?,
        };
        catalog.insert(
            ScheduleId::from(row.schedule_id),
            StopId::from(row.stop_id),
            times,
        );
    }
    info!(entries = catalog.len(), "loaded schedule catalog");
    Ok(catalog)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_time(s: Option<&str>) -> RouteResult<Option<Timestamp>> {
    match s.map(str::trim) {
        None | Some("") => Ok(None),
        Some(t) => DateTime::parse_from_rfc3339(t)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| RouteError::Parse(format!("invalid timestamp {t:?}: {e}"))),
    }
}
