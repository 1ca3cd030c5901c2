//! Route-subsystem error type.

use thiserror::Error;

use tt_core::{RouteId, StopId};

/// Errors produced by `tt-route`.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid geometry for route {route}: {reason}")]
    InvalidGeometry { route: RouteId, reason: String },

    #[error("stop {stop} appears twice on route {route}")]
    DuplicateStop { route: RouteId, stop: StopId },

    #[error("stops reference route {0} which has no shape")]
    UnknownRoute(RouteId),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RouteResult<T> = Result<T, RouteError>;
