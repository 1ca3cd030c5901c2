//! Route geometry: polyline, ordered stops, and point projection.
//!
//! # Data layout
//!
//! The polyline is stored as parallel arrays indexed by vertex:
//!
//! ```text
//! points[i]        vertex position
//! cumulative_m[i]  haversine length of the polyline from vertex 0 to i
//! ```
//!
//! Segment `i` runs from vertex `i` to vertex `i + 1`.  Stops are sorted by
//! sequence number and carry their cumulative distance from the route start,
//! so "next stop" is a binary search.
//!
//! # Spatial index
//!
//! An R-tree (via `rstar`) maps `(lat, lon)` to nearby stops.  Used by the
//! geofence dwell detector to find the stop a stalled bus is waiting at.

use std::collections::HashMap;

use rstar::{AABB, PointDistance, RTree, RTreeObject};

use tt_core::{GeoPoint, RouteId, StopId};

use crate::{RouteError, RouteResult};

// ── R-tree stop entry ────────────────────────────────────────────────────────

/// Entry stored in the R-tree: a `[lat, lon]` point and the stop's index in
/// `RouteGeometry::stops`.
#[derive(Clone)]
struct StopEntry {
    point: [f64; 2],
    index: usize,
}

impl RTreeObject for StopEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StopEntry {
    /// Squared Euclidean distance in lat/lon space.  Only used to shortlist
    /// candidates; the final pick uses haversine.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.point[0] - point[0];
        let dlon = self.point[1] - point[1];
        dlat * dlat + dlon * dlon
    }
}

#[derive(Clone, Copy)]
enum TiePick {
    Farthest,
    Nearest(f64),
}

// ── Public types ──────────────────────────────────────────────────────────────

/// A stop on a route, as consumed by the tracking engine.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteStop {
    pub stop_id:               StopId,
    pub name:                  String,
    pub location:              GeoPoint,
    /// Position in the route's stop sequence (ascending along the route).
    pub sequence:              u32,
    /// Cumulative along-route distance from the first vertex, metres.
    pub distance_from_start_m: f64,
}

/// Where a point lands on the route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteProjection {
    /// Along-route distance of the projected point, metres.
    pub distance_along_m: f64,
    /// Perpendicular distance from the point to the route, metres.
    pub offset_m:         f64,
    /// Index of the segment the point was projected onto.
    pub segment:          usize,
    /// The projected point on the polyline.
    pub foot:             GeoPoint,
}

/// Immutable geometry for one route.  Build with [`RouteGeometryBuilder`].
pub struct RouteGeometry {
    pub route_id:     RouteId,
    /// Polyline vertices in travel order.
    pub points:       Vec<GeoPoint>,
    /// Cumulative distance at each vertex.  `cumulative_m[0] == 0`.
    pub cumulative_m: Vec<f64>,
    /// Stops sorted by sequence.
    pub stops:        Vec<RouteStop>,
    stop_index:       HashMap<StopId, usize>,
    stop_rtree:       RTree<StopEntry>,
}

impl std::fmt::Debug for RouteGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGeometry")
            .field("route_id", &self.route_id)
            .field("points", &self.points.len())
            .field("stops", &self.stops.len())
            .field("total_length_m", &self.total_length_m())
            .finish()
    }
}

impl RouteGeometry {
    /// Total polyline length in metres.
    #[inline]
    pub fn total_length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Along-route distance expressed as a fraction of the total length,
    /// clamped to `[0, 1]`.
    pub fn fraction_at(&self, distance_along_m: f64) -> f64 {
        let total = self.total_length_m();
        if total <= 0.0 {
            return 0.0;
        }
        (distance_along_m / total).clamp(0.0, 1.0)
    }

    /// Project `point` onto the nearest segment.
    ///
    /// Segments whose perpendicular distance is within `tie_epsilon_m` of the
    /// minimum are treated as tied, and the one with the greatest
    /// along-route distance wins.  Use [`project_near`](Self::project_near)
    /// when the bus's previous position is known.
    pub fn project(&self, point: GeoPoint, tie_epsilon_m: f64) -> RouteProjection {
        let candidates = self.candidates(point, 0.0);
        self.pick(point, candidates, tie_epsilon_m, TiePick::Farthest)
    }

    /// Project `point` given the bus's previous along-route distance.
    ///
    /// Among tied segments the one whose along-route distance is closest to
    /// `anchor_m` wins, the greater distance on an exact draw.  On loops and
    /// out-and-back routes this keeps a bus on the pass it is driving
    /// without hiding a genuine regression on a single pass.
    pub fn project_near(&self, point: GeoPoint, anchor_m: f64, tie_epsilon_m: f64) -> RouteProjection {
        let candidates = self.candidates(point, 0.0);
        self.pick(point, candidates, tie_epsilon_m, TiePick::Nearest(anchor_m))
    }

    /// Projection that never returns a distance below `min_along_m`.
    /// Segments ending before `min_along_m` are skipped and the segment
    /// containing it is clipped.  Among tied segments the first one at or
    /// after `min_along_m` wins.
    pub fn project_from(&self, point: GeoPoint, min_along_m: f64, tie_epsilon_m: f64) -> RouteProjection {
        let candidates = self.candidates(point, min_along_m);
        self.pick(point, candidates, tie_epsilon_m, TiePick::Nearest(min_along_m))
    }

    /// Foot of `point` on every segment that reaches `min_along_m`.
    fn candidates(&self, point: GeoPoint, min_along_m: f64) -> Vec<RouteProjection> {
        let mut candidates = Vec::with_capacity(self.segment_count());

        for i in 0..self.segment_count() {
            let seg_start = self.cumulative_m[i];
            let seg_end   = self.cumulative_m[i + 1];
            if seg_end < min_along_m {
                continue;
            }
            let (a, b) = (self.points[i], self.points[i + 1]);
            let seg_len = seg_end - seg_start;

            let proj  = point.project_onto_segment(a, b);
            let along = seg_start + proj.t * seg_len;

            let candidate = if along < min_along_m && seg_len > 0.0 {
                let foot = a.lerp(b, (min_along_m - seg_start) / seg_len);
                RouteProjection {
                    distance_along_m: min_along_m,
                    offset_m:         point.distance_m(foot),
                    segment:          i,
                    foot,
                }
            } else {
                RouteProjection {
                    distance_along_m: along,
                    offset_m:         proj.distance_m,
                    segment:          i,
                    foot:             proj.foot,
                }
            };
            candidates.push(candidate);
        }
        candidates
    }

    fn pick(
        &self,
        point:         GeoPoint,
        candidates:    Vec<RouteProjection>,
        tie_epsilon_m: f64,
        rule:          TiePick,
    ) -> RouteProjection {
        let min_offset = candidates
            .iter()
            .map(|c| c.offset_m)
            .fold(f64::INFINITY, f64::min);

        let tied = candidates
            .into_iter()
            .filter(|c| c.offset_m <= min_offset + tie_epsilon_m);

        let best = match rule {
            TiePick::Farthest => tied.max_by(|x, y| x.distance_along_m.total_cmp(&y.distance_along_m)),
            TiePick::Nearest(anchor) => tied.min_by(|x, y| {
                let dx = (x.distance_along_m - anchor).abs();
                let dy = (y.distance_along_m - anchor).abs();
                dx.total_cmp(&dy)
                    .then_with(|| y.distance_along_m.total_cmp(&x.distance_along_m))
            }),
        };

        let last = self.points[self.points.len() - 1];
        best.unwrap_or(RouteProjection {
            // Only reachable when `min_along_m` is past the end.
            distance_along_m: self.total_length_m(),
            offset_m:         point.distance_m(last),
            segment:          self.segment_count().saturating_sub(1),
            foot:             last,
        })
    }

    /// First stop whose cumulative distance is strictly greater than
    /// `distance_along_m`, or `None` once the bus has passed the last stop.
    pub fn next_stop_after(&self, distance_along_m: f64) -> Option<&RouteStop> {
        let idx = self
            .stops
            .partition_point(|s| s.distance_from_start_m <= distance_along_m);
        self.stops.get(idx)
    }

    pub fn stop(&self, stop_id: &StopId) -> Option<&RouteStop> {
        self.stop_index.get(stop_id).map(|&i| &self.stops[i])
    }

    /// The closest stop within `radius_m` of `point` and its distance.
    pub fn nearest_stop_within(&self, point: GeoPoint, radius_m: f64) -> Option<(&RouteStop, f64)> {
        self.stop_rtree
            .nearest_neighbor_iter(&[point.lat, point.lon])
            .take(4)
            .map(|e| {
                let stop = &self.stops[e.index];
                (stop, point.distance_m(stop.location))
            })
            .filter(|(_, d)| *d <= radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

// ── RouteGeometryBuilder ─────────────────────────────────────────────────────

struct PendingStop {
    stop_id:    StopId,
    name:       String,
    location:   GeoPoint,
    sequence:   u32,
    distance_m: Option<f64>,
}

/// Construct a [`RouteGeometry`] incrementally, then call [`build`](Self::build).
///
/// Stops may be added in any order; `build()` sorts them by sequence.  A stop
/// without an explicit distance is placed by projecting its location onto the
/// polyline, never before the previous stop.
///
/// # Example
///
/// ```
/// use tt_core::{GeoPoint, RouteId};
/// use tt_route::RouteGeometryBuilder;
///
/// let geom = RouteGeometryBuilder::new(RouteId::from("R1"))
///     .point(GeoPoint::new(0.0, 0.0))
///     .point(GeoPoint::new(0.0, 0.01))
///     .stop("S1", "First", GeoPoint::new(0.0, 0.0), 1)
///     .stop("S2", "Last", GeoPoint::new(0.0, 0.01), 2)
///     .build()
///     .unwrap();
/// assert_eq!(geom.stops.len(), 2);
/// ```
pub struct RouteGeometryBuilder {
    route_id: RouteId,
    points:   Vec<GeoPoint>,
    stops:    Vec<PendingStop>,
}

/// Slack allowed when validating explicit stop distances against the
/// computed polyline length.
const DISTANCE_SLACK_M: f64 = 1.0;

/// Offsets this close count as tied when placing a stop by projection, so a
/// stop on a shared vertex lands on the earliest pass still ahead.
const PLACEMENT_TIE_M: f64 = 1.0;

impl RouteGeometryBuilder {
    pub fn new(route_id: RouteId) -> Self {
        Self { route_id, points: Vec::new(), stops: Vec::new() }
    }

    pub fn point(mut self, p: GeoPoint) -> Self {
        self.points.push(p);
        self
    }

    pub fn points(mut self, ps: impl IntoIterator<Item = GeoPoint>) -> Self {
        self.points.extend(ps);
        self
    }

    /// Add a stop positioned by projection.
    pub fn stop(mut self, stop_id: impl Into<StopId>, name: impl Into<String>, location: GeoPoint, sequence: u32) -> Self {
        self.stops.push(PendingStop {
            stop_id: stop_id.into(),
            name: name.into(),
            location,
            sequence,
            distance_m: None,
        });
        self
    }

    /// Add a stop with an explicit distance from the route start.
    pub fn stop_at_distance(
        mut self,
        stop_id:    impl Into<StopId>,
        name:       impl Into<String>,
        location:   GeoPoint,
        sequence:   u32,
        distance_m: f64,
    ) -> Self {
        self.stops.push(PendingStop {
            stop_id: stop_id.into(),
            name: name.into(),
            location,
            sequence,
            distance_m: Some(distance_m),
        });
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> RouteError {
        RouteError::InvalidGeometry { route: self.route_id.clone(), reason: reason.into() }
    }

    /// Validate the polyline and stops and produce a [`RouteGeometry`].
    pub fn build(self) -> RouteResult<RouteGeometry> {
        if self.points.len() < 2 {
            return Err(self.invalid(format!("need at least 2 points, got {}", self.points.len())));
        }
        if let Some(bad) = self.points.iter().find(|p| !p.is_valid()) {
            return Err(self.invalid(format!("point {bad} is out of range")));
        }

        let mut cumulative_m = Vec::with_capacity(self.points.len());
        cumulative_m.push(0.0);
        for w in self.points.windows(2) {
            let last = cumulative_m[cumulative_m.len() - 1];
            cumulative_m.push(last + w[0].distance_m(w[1]));
        }
        let total = cumulative_m[cumulative_m.len() - 1];
        if total <= 0.0 {
            return Err(self.invalid("polyline has zero length"));
        }

        let RouteGeometryBuilder { route_id, points, mut stops } = self;
        stops.sort_by_key(|s| s.sequence);

        // Partially built geometry so stop placement can reuse `project_from`.
        let mut geom = RouteGeometry {
            route_id,
            points,
            cumulative_m,
            stops: Vec::with_capacity(stops.len()),
            stop_index: HashMap::with_capacity(stops.len()),
            stop_rtree: RTree::new(),
        };

        let mut prev_distance = 0.0_f64;
        for s in stops {
            if geom.stop_index.contains_key(&s.stop_id) {
                return Err(RouteError::DuplicateStop { route: geom.route_id.clone(), stop: s.stop_id });
            }
            let distance = match s.distance_m {
                Some(d) => {
                    if d < prev_distance - DISTANCE_SLACK_M || d > total + DISTANCE_SLACK_M {
                        return Err(RouteError::InvalidGeometry {
                            route:  geom.route_id.clone(),
                            reason: format!(
                                "stop {} at {d:.1} m is outside [{prev_distance:.1}, {total:.1}]",
                                s.stop_id
                            ),
                        });
                    }
                    d.clamp(prev_distance, total)
                }
                None => geom.project_from(s.location, prev_distance, PLACEMENT_TIE_M).distance_along_m,
            };
            prev_distance = distance;

            geom.stop_index.insert(s.stop_id.clone(), geom.stops.len());
            geom.stops.push(RouteStop {
                stop_id:               s.stop_id,
                name:                  s.name,
                location:              s.location,
                sequence:              s.sequence,
                distance_from_start_m: distance,
            });
        }

        let entries: Vec<StopEntry> = geom
            .stops
            .iter()
            .enumerate()
            .map(|(index, s)| StopEntry { point: [s.location.lat, s.location.lon], index })
            .collect();
        geom.stop_rtree = RTree::bulk_load(entries);

        Ok(geom)
    }
}
