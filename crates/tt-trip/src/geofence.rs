//! Geofence dwell detection.
//!
//! A dwell episode starts when a fix lands within `radius_m` of a stop and
//! ends when a fix lands outside it (or near a different stop).  An episode
//! that lasts `dwell_threshold_secs` raises one [`DwellAlert`].  Whether the
//! alert becomes an advisory `delay` event is decided by the ingestor, which
//! can see the stop ledger.

use tt_core::time::secs_between;
use tt_core::{GeoPoint, GeofenceConfig, StopId, Timestamp};
use tt_route::RouteGeometry;

#[derive(Clone, Debug, PartialEq)]
pub struct DwellAlert {
    pub stop_id:    StopId,
    pub since:      Timestamp,
    pub dwell_secs: f64,
}

#[derive(Clone, Debug)]
struct Episode {
    stop_id: StopId,
    since:   Timestamp,
    alerted: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DwellTracker {
    episode: Option<Episode>,
}

impl DwellTracker {
    /// The stop the bus is currently dwelling at, if any.
    pub fn dwelling_at(&self) -> Option<&StopId> {
        self.episode.as_ref().map(|e| &e.stop_id)
    }

    pub fn reset(&mut self) {
        self.episode = None;
    }

    /// Fold in one fix.  Returns an alert the first time the current episode
    /// crosses the dwell threshold.
    pub fn observe(
        &mut self,
        config:   &GeofenceConfig,
        geometry: &RouteGeometry,
        point:    GeoPoint,
        at:       Timestamp,
    ) -> Option<DwellAlert> {
        let Some((stop, _)) = geometry.nearest_stop_within(point, config.radius_m) else {
            self.episode = None;
            return None;
        };

        let same_stop = self.episode.as_ref().is_some_and(|e| e.stop_id == stop.stop_id);
        if !same_stop {
            self.episode = Some(Episode { stop_id: stop.stop_id.clone(), since: at, alerted: false });
        }

        let episode = self.episode.as_mut()?;
        let dwell_secs = secs_between(episode.since, at);
        if episode.alerted || dwell_secs < config.dwell_threshold_secs as f64 {
            return None;
        }
        episode.alerted = true;
        Some(DwellAlert { stop_id: episode.stop_id.clone(), since: episode.since, dwell_secs })
    }
}
