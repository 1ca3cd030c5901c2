//! Route-progress estimation.
//!
//! # Pipeline
//!
//! 1. Project the fix onto the route polyline (nearest segment; tied
//!    segments resolve to the pass closest to the prior position) → raw
//!    fraction.
//! 2. Regression guard against the trip's stored fraction:
//!
//!    | raw vs prior                       | outcome                               |
//!    |------------------------------------|---------------------------------------|
//!    | `raw >= prior - tolerance`         | advance to `max(raw, prior)`          |
//!    | below, streak < confirmations      | hold `prior`, count as noise          |
//!    | below, streak reaches confirmations| accept `raw`, record a correction     |
//!
//! 3. Next stop = first stop strictly past the (guarded) distance along.
//! 4. ETA = distance / max(trailing-window mean speed, floor), or
//!    `Indeterminate` once the bus has been stationary past the threshold.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tt_core::time::{add_secs, secs_between};
use tt_core::{GeoPoint, ProgressConfig, StopId, Timestamp, TripId};
use tt_route::RouteGeometry;

// ── Public types ──────────────────────────────────────────────────────────────

/// Estimated time of arrival.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "camelCase")]
pub enum Eta {
    At(Timestamp),
    /// The bus has been stationary too long for a numeric estimate.
    Indeterminate,
}

impl Eta {
    pub fn at(self) -> Option<Timestamp> {
        match self {
            Eta::At(t)         => Some(t),
            Eta::Indeterminate => None,
        }
    }
}

/// An accepted regression of `route_progress`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressCorrection {
    pub at:   Timestamp,
    pub from: f64,
    pub to:   f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ProgressVerdict {
    Advanced,
    /// The raw fraction regressed past tolerance; the prior was kept.
    HeldAsNoise { raw: f64, streak: u32 },
    Corrected(ProgressCorrection),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEstimate {
    /// Fraction from the projection alone, before the regression guard.
    pub raw_fraction:            f64,
    pub progress_fraction:       f64,
    pub distance_along_m:        f64,
    /// Distance from the guarded position to the end of the route.
    pub distance_remaining_m:    f64,
    pub distance_to_next_stop_m: Option<f64>,
    pub next_stop:               Option<StopId>,
    pub eta_next_stop:           Option<Eta>,
    /// ETA at the end of the route.
    pub estimated_arrival:       Eta,
    /// Perpendicular distance from the fix to the route.
    pub offset_m:                f64,
    pub verdict:                 ProgressVerdict,
}

// ── Speed window ──────────────────────────────────────────────────────────────

/// Trailing window of `(time, speed)` observations.
#[derive(Clone, Debug, Default)]
struct SpeedWindow {
    samples: VecDeque<(Timestamp, f64)>,
}

impl SpeedWindow {
    fn push(&mut self, at: Timestamp, speed_mps: f64, window_secs: u32) {
        self.samples.push_back((at, speed_mps));
        while let Some(&(t, _)) = self.samples.front() {
            if secs_between(t, at) > window_secs as f64 {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|&(_, s)| s).sum();
        Some(sum / self.samples.len() as f64)
    }
}

/// Estimator state carried between samples of one trip.
#[derive(Clone, Debug, Default)]
pub struct ProgressState {
    regression_streak: u32,
    speeds:            SpeedWindow,
    stationary_since:  Option<Timestamp>,
}

impl ProgressState {
    pub fn regression_streak(&self) -> u32 {
        self.regression_streak
    }

    pub fn window_mean_speed(&self) -> Option<f64> {
        self.speeds.mean()
    }

    pub fn stationary_since(&self) -> Option<Timestamp> {
        self.stationary_since
    }
}

// ── ProgressEstimator ─────────────────────────────────────────────────────────

pub struct ProgressEstimator<'a> {
    config: &'a ProgressConfig,
}

impl<'a> ProgressEstimator<'a> {
    pub fn new(config: &'a ProgressConfig) -> Self {
        Self { config }
    }

    /// Feed a speed observation.  Called for every in-order fix, including
    /// while the trip is paused, so the window is current on resume.
    pub fn observe_speed(&self, state: &mut ProgressState, at: Timestamp, speed_mps: f64) {
        state.speeds.push(at, speed_mps, self.config.speed_window_secs);
        if speed_mps < self.config.stationary_speed_mps {
            state.stationary_since.get_or_insert(at);
        } else {
            state.stationary_since = None;
        }
    }

    /// Estimate progress for a fix at `point`, given the trip's stored
    /// fraction `prior`.  Updates the regression streak in `state`.
    pub fn estimate(
        &self,
        trip_id:  &TripId,
        prior:    f64,
        state:    &mut ProgressState,
        geometry: &RouteGeometry,
        point:    GeoPoint,
        at:       Timestamp,
    ) -> ProgressEstimate {
        let cfg        = self.config;
        let total      = geometry.total_length_m();
        let projection = geometry.project_near(point, prior * total, cfg.segment_tie_epsilon_m);
        let raw        = geometry.fraction_at(projection.distance_along_m);

        let (fraction, verdict) = if raw + cfg.regression_tolerance < prior {
            state.regression_streak += 1;
            if state.regression_streak >= cfg.regression_confirmations {
                state.regression_streak = 0;
                let correction = ProgressCorrection { at, from: prior, to: raw };
                warn!(
                    trip_id = %trip_id,
                    from = prior,
                    to = raw,
                    "route progress correction accepted"
                );
                (raw, ProgressVerdict::Corrected(correction))
            } else {
                debug!(
                    trip_id = %trip_id,
                    raw,
                    prior,
                    streak = state.regression_streak,
                    "progress regression held as noise"
                );
                (prior, ProgressVerdict::HeldAsNoise { raw, streak: state.regression_streak })
            }
        } else {
            state.regression_streak = 0;
            (raw.max(prior), ProgressVerdict::Advanced)
        };

        let along = if fraction == raw { projection.distance_along_m } else { fraction * total };
        let remaining = (total - along).max(0.0);
        let next = geometry.next_stop_after(along);
        let to_next = next.map(|s| (s.distance_from_start_m - along).max(0.0));

        ProgressEstimate {
            raw_fraction:            raw,
            progress_fraction:       fraction,
            distance_along_m:        along,
            distance_remaining_m:    remaining,
            distance_to_next_stop_m: to_next,
            next_stop:               next.map(|s| s.stop_id.clone()),
            eta_next_stop:           to_next.map(|d| self.eta(state, d, at)),
            estimated_arrival:       self.eta(state, remaining, at),
            offset_m:                projection.offset_m,
            verdict,
        }
    }

    /// ETA for `distance_m` from `at`.
    pub fn eta(&self, state: &ProgressState, distance_m: f64, at: Timestamp) -> Eta {
        let cfg = self.config;
        let stalled = state
            .stationary_since
            .is_some_and(|since| secs_between(since, at) >= cfg.stationary_eta_threshold_secs as f64);
        if stalled {
            return Eta::Indeterminate;
        }
        let speed = state.speeds.mean().unwrap_or(0.0).max(cfg.min_speed_floor_mps);
        Eta::At(add_secs(at, distance_m / speed))
    }
}
