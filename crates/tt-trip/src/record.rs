//! `TripRecord` — all mutable state of one trip, and the read-only context
//! operations on it need.

use tt_core::{EngineConfig, TimeRange};
use tt_route::{RouteGeometry, ScheduleCatalog};

use crate::{DwellTracker, LocationSample, ProgressCorrection, ProgressEstimate, ProgressState, StopLedger, Trip};

/// Reference data and configuration shared by every operation on a trip.
#[derive(Clone, Copy)]
pub struct TripContext<'a> {
    pub config:   &'a EngineConfig,
    pub geometry: &'a RouteGeometry,
    pub schedule: &'a dyn ScheduleCatalog,
}

/// One trip's state: the `Trip` itself, its append-only location history
/// and stop ledger, and the estimator/geofence state carried between
/// samples.
#[derive(Clone, Debug)]
pub struct TripRecord {
    pub(crate) trip:        Trip,
    /// Accepted samples ordered by timestamp.
    pub(crate) history:     Vec<LocationSample>,
    pub(crate) ledger:      StopLedger,
    pub(crate) progress:    ProgressState,
    pub(crate) corrections: Vec<ProgressCorrection>,
    pub(crate) dwell:       DwellTracker,
}

impl TripRecord {
    pub fn new(trip: Trip) -> Self {
        Self {
            trip,
            history:     Vec::new(),
            ledger:      StopLedger::new(),
            progress:    ProgressState::default(),
            corrections: Vec::new(),
            dwell:       DwellTracker::default(),
        }
    }

    #[inline]
    pub fn trip(&self) -> &Trip {
        &self.trip
    }

    pub fn history(&self) -> &[LocationSample] {
        &self.history
    }

    pub fn ledger(&self) -> &StopLedger {
        &self.ledger
    }

    pub fn corrections(&self) -> &[ProgressCorrection] {
        &self.corrections
    }

    pub fn progress_state(&self) -> &ProgressState {
        &self.progress
    }

    /// The most recent sample in history.
    pub fn last_fix(&self) -> Option<&LocationSample> {
        self.history.last()
    }

    /// The samples whose timestamp falls in `range`, in timestamp order.
    pub fn history_in(&self, range: TimeRange) -> &[LocationSample] {
        let start = match range.from {
            Some(from) => self.history.partition_point(|s| s.timestamp < from),
            None       => 0,
        };
        let end = match range.to {
            Some(to) => self.history.partition_point(|s| s.timestamp < to),
            None     => self.history.len(),
        };
        if start >= end {
            return &[];
        }
        &self.history[start..end]
    }

    /// Flag an open trip as stale.  Returns `false` if it was already
    /// flagged or is closed.  The next accepted sample clears it.
    pub fn mark_stale(&mut self) -> bool {
        if self.trip.stale || self.trip.status.is_closed() {
            return false;
        }
        self.trip.stale = true;
        true
    }

    /// Insert into history keeping timestamp order; equal timestamps keep
    /// arrival order.
    pub(crate) fn push_history(&mut self, sample: LocationSample) {
        let at = self.history.partition_point(|s| s.timestamp <= sample.timestamp);
        self.history.insert(at, sample);
    }

    /// Store an estimate on the trip.
    pub(crate) fn apply_estimate(&mut self, estimate: &ProgressEstimate) {
        let trip = &mut self.trip;
        trip.route_progress    = estimate.progress_fraction;
        trip.next_stop_id      = estimate.next_stop.clone();
        trip.next_stop_eta     = estimate.eta_next_stop;
        trip.estimated_arrival = estimate.estimated_arrival.at();
        if let crate::ProgressVerdict::Corrected(c) = estimate.verdict {
            self.corrections.push(c);
        }
    }
}
