//! Trip lifecycle state machine.
//!
//! ```text
//!            pause             stop(completed)
//!   active ─────────▶ paused ────────────────▶ completed
//!     ▲  ◀─────────    │
//!     │     resume     │ stop(cancelled)
//!     │                ▼
//!     └──────────▶ cancelled
//! ```
//!
//! Every transition out of `completed` or `cancelled` fails with
//! `TripAlreadyClosed`.  Other disallowed transitions (pausing a paused
//! trip, resuming an active one) fail with `InvalidTransition`.

use serde::{Deserialize, Serialize};
use tracing::info;

use tt_core::{GeoPoint, Timestamp, TrackError, TrackResult, TripId};

use crate::{ProgressEstimate, ProgressEstimator, StopEvent, StopEventProcessor, TripContext, TripRecord, TripStatus};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleCommand {
    Pause,
    Resume,
    Complete,
    Cancel,
}

impl LifecycleCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleCommand::Pause    => "pause",
            LifecycleCommand::Resume   => "resume",
            LifecycleCommand::Complete => "complete",
            LifecycleCommand::Cancel   => "cancel",
        }
    }
}

impl TripStatus {
    /// The status after applying `command`, or why it cannot be applied.
    pub fn apply(self, trip_id: &TripId, command: LifecycleCommand) -> TrackResult<TripStatus> {
        use LifecycleCommand as C;
        use TripStatus as S;

        if self.is_closed() {
            return Err(TrackError::TripAlreadyClosed(trip_id.clone()));
        }
        match (self, command) {
            (S::Active, C::Pause)  => Ok(S::Paused),
            (S::Paused, C::Resume) => Ok(S::Active),
            (_, C::Complete)       => Ok(S::Completed),
            (_, C::Cancel)         => Ok(S::Cancelled),
            (status, command)      => Err(TrackError::InvalidTransition {
                trip:   trip_id.clone(),
                action: command.as_str(),
                status: status.as_str(),
            }),
        }
    }
}

// ── Stop-tracking request ─────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Completed,
    Cancelled,
}

impl StopReason {
    pub fn command(self) -> LifecycleCommand {
        match self {
            StopReason::Completed => LifecycleCommand::Complete,
            StopReason::Cancelled => LifecycleCommand::Cancel,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopTracking {
    pub reason:       StopReason,
    pub end_location: Option<GeoPoint>,
    pub notes:        Option<String>,
}

impl StopTracking {
    pub fn completed(end_location: GeoPoint) -> Self {
        Self { reason: StopReason::Completed, end_location: Some(end_location), notes: None }
    }

    pub fn cancelled() -> Self {
        Self { reason: StopReason::Cancelled, end_location: None, notes: None }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

// ── TripRecord transitions ────────────────────────────────────────────────────

impl TripRecord {
    pub fn pause(&mut self) -> TrackResult<()> {
        self.trip.status = self.trip.status.apply(&self.trip.trip_id, LifecycleCommand::Pause)?;
        self.dwell.reset();
        info!(trip_id = %self.trip.trip_id, "trip paused");
        Ok(())
    }

    /// Resume and immediately re-estimate progress from the current
    /// location, so next-stop data is not stale.
    pub fn resume(&mut self, ctx: TripContext<'_>, now: Timestamp) -> TrackResult<Option<ProgressEstimate>> {
        self.trip.status = self.trip.status.apply(&self.trip.trip_id, LifecycleCommand::Resume)?;
        info!(trip_id = %self.trip.trip_id, "trip resumed");

        let Some(point) = self.trip.current_location else {
            return Ok(None);
        };
        let at = self.trip.last_location_update.map_or(now, |l| l.max(now));
        let estimate = ProgressEstimator::new(&ctx.config.progress).estimate(
            &self.trip.trip_id,
            self.trip.route_progress,
            &mut self.progress,
            ctx.geometry,
            point,
            at,
        );
        self.apply_estimate(&estimate);
        Ok(Some(estimate))
    }

    /// Complete or cancel.  Completion needs an end location (the request's,
    /// else the current one).  Cancellation closes every open arrival with a
    /// synthetic `skip`; those events are returned.
    pub fn stop(&mut self, ctx: TripContext<'_>, req: StopTracking, now: Timestamp) -> TrackResult<Vec<StopEvent>> {
        let next = self.trip.status.apply(&self.trip.trip_id, req.reason.command())?;
        let end_location = req.end_location.or(self.trip.current_location);
        if next == TripStatus::Completed && end_location.is_none() {
            return Err(TrackError::InvalidRequest(format!(
                "completing trip {} requires an end location",
                self.trip.trip_id
            )));
        }

        let skips = if next == TripStatus::Cancelled {
            StopEventProcessor::new(ctx).close_out_arrivals(self, now, "closed out by trip cancellation")
        } else {
            Vec::new()
        };

        let trip = &mut self.trip;
        trip.status        = next;
        trip.end_time      = Some(now);
        trip.end_location  = end_location;
        trip.next_stop_eta = None;
        if req.notes.is_some() {
            trip.notes = req.notes;
        }
        self.dwell.reset();
        info!(trip_id = %trip.trip_id, status = %next, skipped = skips.len(), "trip closed");
        Ok(skips)
    }
}
