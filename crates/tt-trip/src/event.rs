//! Stop events and the requests that create them.

use serde::{Deserialize, Serialize};

use tt_core::{GeoPoint, StaffId, StopId, Timestamp, TripId};

// ── StopEventType ─────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopEventType {
    Arrival,
    Departure,
    Boarding,
    Alighting,
    /// Advisory: the bus stalled at a stop without an explicit arrival.
    Delay,
    /// The stop was passed or closed out without service.
    Skip,
}

impl StopEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            StopEventType::Arrival   => "arrival",
            StopEventType::Departure => "departure",
            StopEventType::Boarding  => "boarding",
            StopEventType::Alighting => "alighting",
            StopEventType::Delay     => "delay",
            StopEventType::Skip      => "skip",
        }
    }

    /// Event types that must be preceded by an arrival at the same stop.
    pub fn requires_arrival(self) -> bool {
        matches!(
            self,
            StopEventType::Departure | StopEventType::Boarding | StopEventType::Alighting
        )
    }
}

impl std::fmt::Display for StopEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── StopEventSource ───────────────────────────────────────────────────────────

/// Who stands behind an event.
///
/// Manual confirmations outrank automatic detection: ordering rules are
/// waived for them, and geofence auto-detection never emits an advisory
/// event for a stop that already carries a manual one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StopEventSource {
    Automatic,
    Manual {
        #[serde(rename = "confirmedBy")]
        confirmed_by: StaffId,
    },
}

impl StopEventSource {
    #[inline]
    pub fn is_manual(&self) -> bool {
        matches!(self, StopEventSource::Manual { .. })
    }

    pub fn confirmed_by(&self) -> Option<&StaffId> {
        match self {
            StopEventSource::Automatic              => None,
            StopEventSource::Manual { confirmed_by } => Some(confirmed_by),
        }
    }

    /// `true` if an event from `self` takes precedence over one from `other`.
    pub fn outranks(&self, other: &StopEventSource) -> bool {
        matches!(
            (self, other),
            (StopEventSource::Manual { .. }, StopEventSource::Automatic)
        )
    }
}

// ── StopEvent ─────────────────────────────────────────────────────────────────

/// A recorded interaction between a trip and a stop.  Never mutated after
/// it is appended to a [`StopLedger`](crate::StopLedger).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopEvent {
    pub trip_id:              TripId,
    /// Position in the trip's ledger, in append order.
    pub seq:                  u64,
    pub stop_id:              StopId,
    pub event_type:           StopEventType,
    pub timestamp:            Timestamp,
    pub reported_location:    Option<GeoPoint>,
    /// Canonical location of the matched stop.
    pub stop_location:        GeoPoint,
    pub source:               StopEventSource,
    pub accuracy_m:           Option<f64>,
    pub speed_mps:            Option<f64>,
    pub heading_deg:          Option<f64>,
    pub distance_from_stop_m: Option<f64>,
    /// Reported too far from the stop; flagged for downstream review.
    pub skip_candidate:       bool,
    /// Departure only.
    pub dwell_time_minutes:   Option<f64>,
    pub passenger_delta:      Option<i64>,
    /// Actual minus scheduled, minutes.  Positive is late.
    pub delay_minutes:        Option<f64>,
    pub notes:                Option<String>,
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Input to the stop-event operations.
///
/// `passenger_count` is the number boarding / alighting for passenger
/// events, and the observed on-board count for arrivals and departures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopEventRequest {
    pub stop_id:            StopId,
    pub location:           Option<GeoPoint>,
    pub timestamp:          Option<Timestamp>,
    pub is_manual:          bool,
    pub confirmed_by:       Option<StaffId>,
    pub passenger_count:    Option<u32>,
    pub dwell_time_minutes: Option<f64>,
    pub notes:              Option<String>,
    /// Client-generated nonce.  A repeated key on the same trip returns the
    /// original event instead of appending a duplicate.
    pub idempotency_key:    Option<String>,
}

impl StopEventRequest {
    pub fn new(stop_id: impl Into<StopId>) -> Self {
        Self {
            stop_id:            stop_id.into(),
            location:           None,
            timestamp:          None,
            is_manual:          false,
            confirmed_by:       None,
            passenger_count:    None,
            dwell_time_minutes: None,
            notes:              None,
            idempotency_key:    None,
        }
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn manual(mut self, confirmed_by: impl Into<StaffId>) -> Self {
        self.is_manual    = true;
        self.confirmed_by = Some(confirmed_by.into());
        self
    }

    pub fn passengers(mut self, count: u32) -> Self {
        self.passenger_count = Some(count);
        self
    }

    pub fn dwell(mut self, minutes: f64) -> Self {
        self.dwell_time_minutes = Some(minutes);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// A human-entered event of any type.  Always recorded as
/// [`StopEventSource::Manual`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualConfirmation {
    pub event_type: StopEventType,
    pub request:    StopEventRequest,
}
