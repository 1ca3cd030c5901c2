//! `tt-core` — foundational types for the trip-tracking engine.
//!
//! This crate is a dependency of every other `tt-*` crate.  It has no `tt-*`
//! dependencies and only a few external ones (`chrono`, `serde`,
//! `serde_json`, `thiserror`).
//!
//! # What lives here
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`ids`]         | `TripId`, `DeviceId`, `BusId`, `RouteId`, `StopId`, …      |
//! | [`geo`]         | `GeoPoint`, haversine distance, segment projection         |
//! | [`time`]        | `Timestamp`, `Clock`, `SystemClock`, `ManualClock`         |
//! | [`config`]      | `EngineConfig` and its per-component sections              |
//! | [`error`]       | `TrackError`, `ErrorKind`, `TrackResult`                   |

pub mod config;
pub mod error;
pub mod geo;
pub mod ids;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{
    EngineConfig, GeofenceConfig, IngestConfig, MonitoringConfig, ProgressConfig, QueryConfig,
    StopEventConfig,
};
pub use error::{ErrorKind, TrackError, TrackResult};
pub use geo::{GeoPoint, SegmentProjection};
pub use ids::{BusId, DeviceId, RouteId, ScheduleId, StaffId, StopId, TripId};
pub use time::{Clock, ManualClock, SystemClock, TimeRange, Timestamp};
