//! Engine configuration.
//!
//! Every threshold the engine applies is configurable.  Each section derives
//! `Deserialize` with `#[serde(default)]`, so a JSON document only needs the
//! fields it overrides:
//!
//! ```json
//! { "ingest": { "max_accuracy_m": 50.0 },
//!   "progress": { "regression_confirmations": 5 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{StaffId, TrackError, TrackResult};

// ── Sections ──────────────────────────────────────────────────────────────────

/// Location-sample validation thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// How far behind `last_location_update` a sample may be and still be
    /// accepted (out-of-order delivery).  Default: 5 s.
    pub stale_tolerance_secs: u32,
    /// Samples with an accuracy radius above this are treated as noise.
    /// Default: 100 m.
    pub max_accuracy_m: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { stale_tolerance_secs: 5, max_accuracy_m: 100.0 }
    }
}

/// Route-progress estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Regressions smaller than this fraction of the route are ignored
    /// silently; larger ones count as noise.  Default: 0.01 (1 %).
    pub regression_tolerance: f64,
    /// Consecutive regressed samples needed before a regression is accepted
    /// as a genuine correction.  Default: 3.
    pub regression_confirmations: u32,
    /// Segments whose perpendicular distances differ by less than this are
    /// treated as tied; the one further along the route wins.  Default: 1 m.
    pub segment_tie_epsilon_m: f64,
    /// Trailing window for the average speed used in ETA.  Default: 120 s.
    pub speed_window_secs: u32,
    /// Lower bound on the ETA speed so a slow bus gets a finite ETA.
    /// Default: 1 m/s.
    pub min_speed_floor_mps: f64,
    /// Below this speed the bus counts as stationary.  Default: 0.5 m/s.
    pub stationary_speed_mps: f64,
    /// Stationary for at least this long → ETA is indeterminate.
    /// Default: 300 s.
    pub stationary_eta_threshold_secs: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            regression_tolerance:          0.01,
            regression_confirmations:      3,
            segment_tie_epsilon_m:         1.0,
            speed_window_secs:             120,
            min_speed_floor_mps:           1.0,
            stationary_speed_mps:          0.5,
            stationary_eta_threshold_secs: 300,
        }
    }
}

/// Stop-event recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopEventConfig {
    /// Events reported further than this from the stop are flagged as
    /// skip candidates.  Default: 200 m.
    pub mismatch_threshold_m: f64,
    /// Staff allowed to confirm manual events.  `None` accepts any
    /// non-empty identity.
    pub authorized_confirmers: Option<Vec<StaffId>>,
}

impl Default for StopEventConfig {
    fn default() -> Self {
        Self { mismatch_threshold_m: 200.0, authorized_confirmers: None }
    }
}

impl StopEventConfig {
    pub fn is_authorized(&self, who: &StaffId) -> bool {
        if who.is_blank() {
            return false;
        }
        match &self.authorized_confirmers {
            None       => true,
            Some(list) => list.contains(who),
        }
    }
}

/// Geofence-triggered dwell detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    /// A fix within this distance of a stop is "at" the stop.  Default: 50 m.
    pub radius_m: f64,
    /// Dwelling at a stop for this long without an arrival produces an
    /// advisory `delay` event.  Default: 180 s.
    pub dwell_threshold_secs: u32,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self { radius_m: 50.0, dwell_threshold_secs: 180 }
    }
}

/// Liveness monitoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// A trip with no update for this long is flagged stale.  Default: 300 s.
    pub inactivity_timeout_secs: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { inactivity_timeout_secs: 300 }
    }
}

/// Read-path limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound on a location-history page.  Default: 500.
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { max_page_size: 500 }
    }
}

// ── EngineConfig ──────────────────────────────────────────────────────────────

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ingest:      IngestConfig,
    pub progress:    ProgressConfig,
    pub stop_events: StopEventConfig,
    pub geofence:    GeofenceConfig,
    pub monitoring:  MonitoringConfig,
    pub query:       QueryConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> TrackResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: &Path) -> TrackResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> TrackResult<()> {
        let p = &self.progress;
        if !(0.0..1.0).contains(&p.regression_tolerance) {
            return Err(TrackError::Config(format!(
                "progress.regression_tolerance must be in [0, 1), got {}",
                p.regression_tolerance
            )));
        }
        if p.regression_confirmations == 0 {
            return Err(TrackError::Config(
                "progress.regression_confirmations must be at least 1".into(),
            ));
        }
        if p.min_speed_floor_mps <= 0.0 {
            return Err(TrackError::Config(
                "progress.min_speed_floor_mps must be positive".into(),
            ));
        }
        if p.segment_tie_epsilon_m < 0.0 {
            return Err(TrackError::Config(
                "progress.segment_tie_epsilon_m must not be negative".into(),
            ));
        }
        if self.ingest.max_accuracy_m <= 0.0 {
            return Err(TrackError::Config("ingest.max_accuracy_m must be positive".into()));
        }
        if self.geofence.radius_m <= 0.0 || self.stop_events.mismatch_threshold_m <= 0.0 {
            return Err(TrackError::Config(
                "geofence.radius_m and stop_events.mismatch_threshold_m must be positive".into(),
            ));
        }
        if self.query.max_page_size == 0 {
            return Err(TrackError::Config("query.max_page_size must be at least 1".into()));
        }
        Ok(())
    }
}
