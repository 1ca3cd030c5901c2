//! Engine observer hooks for persistence and monitoring.

use std::sync::Arc;

use tt_core::TripId;
use tt_trip::{LocationSample, ProgressCorrection, Rejection, StopEvent, Trip};

/// Callbacks invoked by [`TrackingEngine`](crate::TrackingEngine) after a
/// state change has been applied and the trip's lock released.
///
/// Callbacks may arrive concurrently from different ingest threads, hence
/// `&self` and the `Send + Sync` bound.  They must not block: anything slow
/// (file or network I/O) belongs on a background worker.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.
pub trait TrackingObserver: Send + Sync {
    fn on_trip_started(&self, _trip: &Trip) {}

    /// `late` samples went into history without moving the trip.
    fn on_sample_accepted(&self, _sample: &LocationSample, _late: bool) {}

    fn on_sample_rejected(&self, _trip_id: &TripId, _rejection: &Rejection) {}

    /// Explicit, manual, geofence-derived and synthetic close-out events.
    fn on_stop_event(&self, _event: &StopEvent) {}

    fn on_progress_correction(&self, _trip_id: &TripId, _correction: &ProgressCorrection) {}

    /// Newly flagged by the inactivity sweep.
    fn on_trip_stale(&self, _trip_id: &TripId) {}

    /// The trip reached `completed` or `cancelled`.
    fn on_trip_closed(&self, _trip: &Trip) {}
}

/// A [`TrackingObserver`] that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TrackingObserver for NoopObserver {}

impl<T: TrackingObserver + ?Sized> TrackingObserver for Arc<T> {
    fn on_trip_started(&self, trip: &Trip) {
        (**self).on_trip_started(trip)
    }

    fn on_sample_accepted(&self, sample: &LocationSample, late: bool) {
        (**self).on_sample_accepted(sample, late)
    }

    fn on_sample_rejected(&self, trip_id: &TripId, rejection: &Rejection) {
        (**self).on_sample_rejected(trip_id, rejection)
    }

    fn on_stop_event(&self, event: &StopEvent) {
        (**self).on_stop_event(event)
    }

    fn on_progress_correction(&self, trip_id: &TripId, correction: &ProgressCorrection) {
        (**self).on_progress_correction(trip_id, correction)
    }

    fn on_trip_stale(&self, trip_id: &TripId) {
        (**self).on_trip_stale(trip_id)
    }

    fn on_trip_closed(&self, trip: &Trip) {
        (**self).on_trip_closed(trip)
    }
}
