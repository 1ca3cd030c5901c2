//! Engine-wide error type.
//!
//! Every rejection the engine produces carries a machine-readable
//! [`ErrorKind`] (via [`TrackError::kind`]) and a human-readable message
//! (the `Display` impl).  Sub-crates with their own failure modes (route
//! loading, history persistence) keep separate error enums.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DeviceId, RouteId, StopId, TripId};

/// Machine-readable classification of a [`TrackError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NoActiveTrip,
    StaleSample,
    LowAccuracySample,
    OutOfOrderEvent,
    TripAlreadyClosed,
    TripNotFound,
    DeviceAlreadyBound,
    DuplicateTrip,
    RouteNotFound,
    StopNotOnRoute,
    InvalidTransition,
    UnauthorizedConfirmer,
    InvalidRequest,
    Config,
    Io,
}

impl ErrorKind {
    /// `true` for kinds that are absorbed locally instead of failing a
    /// request (telemetry sources cannot usefully retry them).
    pub fn is_soft(self) -> bool {
        matches!(self, ErrorKind::StaleSample | ErrorKind::LowAccuracySample)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// The top-level error type for the tracking engine.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("device {device} has no active or paused trip")]
    NoActiveTrip { device: DeviceId },

    #[error("sample for trip {trip} is older than the last update by {behind_secs:.1}s")]
    StaleSample { trip: TripId, behind_secs: f64 },

    #[error("sample for trip {trip} has accuracy {accuracy_m:.0} m, above the {limit_m:.0} m ceiling")]
    LowAccuracySample { trip: TripId, accuracy_m: f64, limit_m: f64 },

    #[error("{event} at stop {stop} on trip {trip} is out of order: {reason}")]
    OutOfOrderEvent {
        trip:   TripId,
        stop:   StopId,
        event:  &'static str,
        reason: String,
    },

    #[error("trip {0} is already closed")]
    TripAlreadyClosed(TripId),

    #[error("trip {0} not found")]
    TripNotFound(TripId),

    #[error("device {device} is already bound to trip {trip}")]
    DeviceAlreadyBound { device: DeviceId, trip: TripId },

    #[error("trip {0} is already being tracked")]
    DuplicateTrip(TripId),

    #[error("route {0} not found in the route catalog")]
    RouteNotFound(RouteId),

    #[error("stop {stop} is not on route {route}")]
    StopNotOnRoute { stop: StopId, route: RouteId },

    #[error("trip {trip} cannot {action} while {status}")]
    InvalidTransition {
        trip:   TripId,
        action: &'static str,
        status: &'static str,
    },

    #[error("{0} is not authorized to confirm stop events")]
    UnauthorizedConfirmer(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackError::NoActiveTrip { .. }          => ErrorKind::NoActiveTrip,
            TrackError::StaleSample { .. }           => ErrorKind::StaleSample,
            TrackError::LowAccuracySample { .. }     => ErrorKind::LowAccuracySample,
            TrackError::OutOfOrderEvent { .. }       => ErrorKind::OutOfOrderEvent,
            TrackError::TripAlreadyClosed(_)         => ErrorKind::TripAlreadyClosed,
            TrackError::TripNotFound(_)              => ErrorKind::TripNotFound,
            TrackError::DeviceAlreadyBound { .. }    => ErrorKind::DeviceAlreadyBound,
            TrackError::DuplicateTrip(_)             => ErrorKind::DuplicateTrip,
            TrackError::RouteNotFound(_)             => ErrorKind::RouteNotFound,
            TrackError::StopNotOnRoute { .. }        => ErrorKind::StopNotOnRoute,
            TrackError::InvalidTransition { .. }     => ErrorKind::InvalidTransition,
            TrackError::UnauthorizedConfirmer(_)     => ErrorKind::UnauthorizedConfirmer,
            TrackError::InvalidRequest(_)            => ErrorKind::InvalidRequest,
            TrackError::Config(_)                    => ErrorKind::Config,
            TrackError::Io(_)                        => ErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(e: serde_json::Error) -> Self {
        TrackError::Config(e.to_string())
    }
}

/// Shorthand result type for all `tt-*` crates.
pub type TrackResult<T> = Result<T, TrackError>;
