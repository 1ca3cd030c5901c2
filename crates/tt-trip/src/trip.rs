//! The `Trip` aggregate: one physical journey of one bus along one route.

use serde::{Deserialize, Serialize};

use tt_core::{BusId, DeviceId, GeoPoint, RouteId, ScheduleId, StaffId, StopId, Timestamp, TripId};

use crate::Eta;

// ── TripStatus ────────────────────────────────────────────────────────────────

/// Lifecycle state.  `Completed` and `Cancelled` are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// `true` for `Active` and `Paused`, the states that accept mutations.
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, TripStatus::Active | TripStatus::Paused)
    }

    #[inline]
    pub fn is_closed(self) -> bool {
        !self.is_open()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Active    => "active",
            TripStatus::Paused    => "paused",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── StartTrip ─────────────────────────────────────────────────────────────────

/// Everything needed to begin tracking a trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartTrip {
    pub trip_id:        TripId,
    pub device_id:      DeviceId,
    pub bus_id:         BusId,
    pub schedule_id:    ScheduleId,
    pub route_id:       RouteId,
    pub driver_id:      Option<StaffId>,
    pub conductor_id:   Option<StaffId>,
    pub start_location: Option<GeoPoint>,
}

impl StartTrip {
    pub fn new(
        trip_id:     impl Into<TripId>,
        device_id:   impl Into<DeviceId>,
        bus_id:      impl Into<BusId>,
        schedule_id: impl Into<ScheduleId>,
        route_id:    impl Into<RouteId>,
    ) -> Self {
        Self {
            trip_id:        trip_id.into(),
            device_id:      device_id.into(),
            bus_id:         bus_id.into(),
            schedule_id:    schedule_id.into(),
            route_id:       route_id.into(),
            driver_id:      None,
            conductor_id:   None,
            start_location: None,
        }
    }

    pub fn at(mut self, start_location: GeoPoint) -> Self {
        self.start_location = Some(start_location);
        self
    }

    pub fn crew(mut self, driver: Option<StaffId>, conductor: Option<StaffId>) -> Self {
        self.driver_id    = driver;
        self.conductor_id = conductor;
        self
    }
}

// ── Trip ──────────────────────────────────────────────────────────────────────

/// Live state of one trip.
///
/// Mutated only through [`TripRecord`](crate::TripRecord) operations; once
/// `status` is terminal nothing changes again.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub trip_id:              TripId,
    pub schedule_id:          ScheduleId,
    pub route_id:             RouteId,
    pub bus_id:               BusId,
    pub device_id:            DeviceId,
    pub driver_id:            Option<StaffId>,
    pub conductor_id:         Option<StaffId>,
    pub status:               TripStatus,
    pub start_time:           Timestamp,
    pub end_time:             Option<Timestamp>,
    pub start_location:       Option<GeoPoint>,
    pub end_location:         Option<GeoPoint>,
    pub current_location:     Option<GeoPoint>,
    pub distance_traveled_m:  f64,
    /// Fraction of the route completed, `[0, 1]`.  Never decreases except
    /// through a recorded [`ProgressCorrection`](crate::ProgressCorrection).
    pub route_progress:       f64,
    /// Latest sample time seen, including low-accuracy heartbeats.
    pub last_location_update: Option<Timestamp>,
    pub average_speed_mps:    f64,
    pub max_speed_mps:        f64,
    pub stop_count:           u32,
    pub passenger_count:      u32,
    /// ETA at the end of the route.
    pub estimated_arrival:    Option<Timestamp>,
    pub next_stop_id:         Option<StopId>,
    pub next_stop_eta:        Option<Eta>,
    /// Set by the inactivity sweep, cleared by the next accepted sample.
    pub stale:                bool,
    pub notes:                Option<String>,
    /// Number of speed observations folded into `average_speed_mps`.
    #[serde(skip)]
    pub(crate) speed_samples: u64,
}

impl Trip {
    /// A fresh `Active` trip.
    pub fn start(req: StartTrip, now: Timestamp) -> Self {
        Self {
            trip_id:              req.trip_id,
            schedule_id:          req.schedule_id,
            route_id:             req.route_id,
            bus_id:               req.bus_id,
            device_id:            req.device_id,
            driver_id:            req.driver_id,
            conductor_id:         req.conductor_id,
            status:               TripStatus::Active,
            start_time:           now,
            end_time:             None,
            start_location:       req.start_location,
            end_location:         None,
            current_location:     req.start_location,
            distance_traveled_m:  0.0,
            route_progress:       0.0,
            last_location_update: None,
            average_speed_mps:    0.0,
            max_speed_mps:        0.0,
            stop_count:           0,
            passenger_count:      0,
            estimated_arrival:    None,
            next_stop_id:         None,
            next_stop_eta:        None,
            stale:                false,
            notes:                None,
            speed_samples:        0,
        }
    }

    /// Fold one speed observation into the running mean and maximum.
    pub(crate) fn observe_speed(&mut self, speed_mps: f64) {
        self.speed_samples += 1;
        self.average_speed_mps += (speed_mps - self.average_speed_mps) / self.speed_samples as f64;
        self.max_speed_mps = self.max_speed_mps.max(speed_mps);
    }

    /// Apply a signed passenger delta, saturating at zero.
    pub(crate) fn adjust_passengers(&mut self, delta: i64) {
        let count = (self.passenger_count as i64 + delta).clamp(0, u32::MAX as i64);
        self.passenger_count = count as u32;
    }
}
