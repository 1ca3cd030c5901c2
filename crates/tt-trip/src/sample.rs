//! Location samples as they arrive from bus-mounted devices.

use serde::{Deserialize, Serialize};

use tt_core::{BusId, DeviceId, GeoPoint, Timestamp, TrackError, TrackResult, TripId};

/// One GPS/telemetry reading.  Append-only once accepted into history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub trip_id:     TripId,
    pub device_id:   DeviceId,
    pub bus_id:      BusId,
    pub point:       GeoPoint,
    pub altitude_m:  Option<f64>,
    pub timestamp:   Timestamp,
    /// Ground speed, metres per second.
    pub speed_mps:   Option<f64>,
    /// Course over ground, degrees clockwise from north in `[0, 360)`.
    pub heading_deg: Option<f64>,
    /// Horizontal accuracy radius, metres.
    pub accuracy_m:  Option<f64>,
}

impl LocationSample {
    pub fn new(
        trip_id:   TripId,
        device_id: DeviceId,
        bus_id:    BusId,
        point:     GeoPoint,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            trip_id,
            device_id,
            bus_id,
            point,
            altitude_m: None,
            timestamp,
            speed_mps: None,
            heading_deg: None,
            accuracy_m: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading_deg = Some(heading_deg);
        self
    }

    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }

    /// Validate coordinates and bring optional fields into canonical form.
    ///
    /// - out-of-range or non-finite coordinates → `InvalidRequest`
    /// - blank trip or device id → `InvalidRequest`
    /// - negative or non-finite speed / accuracy → dropped
    /// - heading → wrapped into `[0, 360)`, dropped if non-finite
    pub fn normalize(mut self) -> TrackResult<Self> {
        if !self.point.is_valid() {
            return Err(TrackError::InvalidRequest(format!(
                "coordinates {} are out of range",
                self.point
            )));
        }
        if self.trip_id.is_blank() || self.device_id.is_blank() {
            return Err(TrackError::InvalidRequest("tripId and deviceId are required".into()));
        }
        self.speed_mps   = self.speed_mps.filter(|s| s.is_finite() && *s >= 0.0);
        self.accuracy_m  = self.accuracy_m.filter(|a| a.is_finite() && *a >= 0.0);
        self.altitude_m  = self.altitude_m.filter(|a| a.is_finite());
        self.heading_deg = self
            .heading_deg
            .filter(|h| h.is_finite())
            .map(|h| h.rem_euclid(360.0));
        Ok(self)
    }
}
