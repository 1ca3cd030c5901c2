//! Location-sample ingestion for one trip.
//!
//! # Gating order
//!
//! 1. trip closed → `TripAlreadyClosed` (hard error)
//! 2. normalization failure → `InvalidRequest` (hard error)
//! 3. older than `last_location_update` − tolerance → rejected `StaleSample`
//! 4. accuracy above the ceiling → rejected `LowAccuracySample`; refreshes
//!    `last_location_update` only, so the bus still counts as online
//! 5. older than the latest fix but inside tolerance → accepted as `late`:
//!    history only, no position or progress change
//! 6. otherwise → position, distance, speed, and (when active) progress and
//!    geofence updates
//!
//! Rejections 3 and 4 are soft: they come back as `Ok` with `rejected` set.

use serde::Serialize;
use tracing::debug;

use tt_core::time::secs_between;
use tt_core::{ErrorKind, TrackError, TrackResult};

use crate::{
    LocationSample, ProgressEstimate, ProgressEstimator, ProgressVerdict, StopEvent,
    StopEventProcessor, TripContext, TripRecord, TripStatus,
};

/// Why a sample was not applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rejection {
    pub kind:    ErrorKind,
    pub message: String,
}

impl From<&TrackError> for Rejection {
    fn from(e: &TrackError) -> Self {
        Self { kind: e.kind(), message: e.to_string() }
    }
}

/// What ingesting one sample did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestOutcome {
    pub accepted:       bool,
    /// Accepted into history only; arrived after a newer fix.
    pub late:           bool,
    pub rejected:       Option<Rejection>,
    /// Present when the trip is active and the sample moved the position.
    pub progress:       Option<ProgressEstimate>,
    /// Soft warnings such as progress noise.
    pub warnings:       Vec<String>,
    /// Advisory events produced by geofence dwell detection.
    pub derived_events: Vec<StopEvent>,
}

impl IngestOutcome {
    fn rejected(error: TrackError) -> Self {
        Self { rejected: Some(Rejection::from(&error)), ..Default::default() }
    }
}

pub struct SampleIngestor<'a> {
    ctx: TripContext<'a>,
}

impl<'a> SampleIngestor<'a> {
    pub fn new(ctx: TripContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn apply(&self, record: &mut TripRecord, sample: LocationSample) -> TrackResult<IngestOutcome> {
        let cfg = self.ctx.config;
        if record.trip.status.is_closed() {
            return Err(TrackError::TripAlreadyClosed(record.trip.trip_id.clone()));
        }
        let sample  = sample.normalize()?;
        let trip_id = record.trip.trip_id.clone();
        let at      = sample.timestamp;

        // ── Stale ────────────────────────────────────────────────────────
        if let Some(last) = record.trip.last_location_update {
            let behind_secs = secs_between(at, last);
            if behind_secs > cfg.ingest.stale_tolerance_secs as f64 {
                debug!(trip_id = %trip_id, behind_secs, "stale sample rejected");
                return Ok(IngestOutcome::rejected(TrackError::StaleSample { trip: trip_id, behind_secs }));
            }
        }

        // ── Low accuracy: heartbeat only ─────────────────────────────────
        if let Some(accuracy_m) = sample.accuracy_m.filter(|a| *a > cfg.ingest.max_accuracy_m) {
            debug!(trip_id = %trip_id, accuracy_m, "low-accuracy sample rejected");
            let trip = &mut record.trip;
            trip.last_location_update = Some(trip.last_location_update.map_or(at, |l| l.max(at)));
            trip.stale = false;
            return Ok(IngestOutcome::rejected(TrackError::LowAccuracySample {
                trip: trip_id,
                accuracy_m,
                limit_m: cfg.ingest.max_accuracy_m,
            }));
        }

        // ── Late but tolerated ───────────────────────────────────────────
        let prev_fix = record.last_fix().map(|f| (f.point, f.timestamp));
        if prev_fix.is_some_and(|(_, t)| at < t) {
            debug!(trip_id = %trip_id, "late sample stored in history only");
            record.push_history(sample);
            return Ok(IngestOutcome { accepted: true, late: true, ..Default::default() });
        }

        // ── In-order fix ─────────────────────────────────────────────────
        let point = sample.point;
        let delta_m = record.trip.current_location.map_or(0.0, |p| p.distance_m(point));
        let speed = sample.speed_mps.or_else(|| {
            let (_, prev_at) = prev_fix?;
            let dt = secs_between(prev_at, at);
            (dt > 0.0).then(|| delta_m / dt)
        });

        {
            let trip = &mut record.trip;
            trip.distance_traveled_m  += delta_m;
            trip.current_location      = Some(point);
            trip.last_location_update  = Some(trip.last_location_update.map_or(at, |l| l.max(at)));
            trip.stale                 = false;
            if let Some(s) = speed {
                trip.observe_speed(s);
            }
        }
        record.push_history(sample);

        let estimator = ProgressEstimator::new(&cfg.progress);
        if let Some(s) = speed {
            estimator.observe_speed(&mut record.progress, at, s);
        }

        let mut outcome = IngestOutcome { accepted: true, ..Default::default() };
        if record.trip.status != TripStatus::Active {
            // Paused: position is recorded, projection is not.
            return Ok(outcome);
        }

        let estimate = estimator.estimate(
            &trip_id,
            record.trip.route_progress,
            &mut record.progress,
            self.ctx.geometry,
            point,
            at,
        );
        if let ProgressVerdict::HeldAsNoise { raw, streak } = estimate.verdict {
            outcome.warnings.push(format!(
                "progress {raw:.3} regressed below {:.3}; held as noise ({streak} consecutive)",
                record.trip.route_progress
            ));
        }
        record.apply_estimate(&estimate);
        outcome.progress = Some(estimate);

        if let Some(alert) = record.dwell.observe(&cfg.geofence, self.ctx.geometry, point, at) {
            let processor = StopEventProcessor::new(self.ctx);
            if let Some(event) = processor.advisory_delay(record, &alert, at) {
                outcome.derived_events.push(event);
            }
        }
        Ok(outcome)
    }
}
