//! Unit tests for tt-route.
//!
//! All tests use hand-crafted geometries along the equator, where one
//! thousandth of a degree of longitude is ≈ 111.2 m.

#[cfg(test)]
mod helpers {
    use tt_core::{GeoPoint, RouteId};

    use crate::{RouteGeometry, RouteGeometryBuilder};

    /// Straight 2-segment route: (0,0) → (0,0.01) → (0,0.02), ≈ 2224 m.
    /// Stops at each vertex.
    pub fn straight_route() -> RouteGeometry {
        RouteGeometryBuilder::new(RouteId::from("R1"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .point(GeoPoint::new(0.0, 0.02))
            .stop("S1", "Depot", GeoPoint::new(0.0, 0.0), 1)
            .stop("S2", "Market", GeoPoint::new(0.0, 0.01), 2)
            .stop("S3", "Terminus", GeoPoint::new(0.0, 0.02), 3)
            .build()
            .unwrap()
    }

    /// Closed square loop starting and ending at the depot (0,0), ≈ 4448 m.
    /// Stops on the first four corners.
    pub fn square_loop() -> RouteGeometry {
        RouteGeometryBuilder::new(RouteId::from("SQ"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .point(GeoPoint::new(0.01, 0.01))
            .point(GeoPoint::new(0.01, 0.0))
            .point(GeoPoint::new(0.0, 0.0))
            .stop("A", "Depot", GeoPoint::new(0.0, 0.0), 1)
            .stop("B", "North", GeoPoint::new(0.0, 0.01), 2)
            .stop("C", "Corner", GeoPoint::new(0.01, 0.01), 3)
            .stop("D", "West", GeoPoint::new(0.01, 0.0), 4)
            .build()
            .unwrap()
    }

    /// Out-and-back route on the same road: (0,0) → (0,0.01) → (0,0).
    pub fn out_and_back() -> RouteGeometry {
        RouteGeometryBuilder::new(RouteId::from("LOOP"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .point(GeoPoint::new(0.0, 0.0))
            .build()
            .unwrap()
    }
}

// ── Builder validation ────────────────────────────────────────────────────────

#[cfg(test)]
mod builder {
    use tt_core::{GeoPoint, RouteId};

    use super::helpers::{square_loop, straight_route};
    use crate::{RouteError, RouteGeometryBuilder};

    #[test]
    fn cumulative_distances() {
        let g = straight_route();
        assert_eq!(g.cumulative_m.len(), 3);
        assert_eq!(g.cumulative_m[0], 0.0);
        assert!((g.total_length_m() - 2223.9).abs() < 2.0, "got {}", g.total_length_m());
    }

    #[test]
    fn stops_placed_by_projection() {
        let g = straight_route();
        let d: Vec<f64> = g.stops.iter().map(|s| s.distance_from_start_m).collect();
        assert!(d[0].abs() < 0.5);
        assert!((d[1] - g.cumulative_m[1]).abs() < 0.5);
        assert!((d[2] - g.total_length_m()).abs() < 0.5);
    }

    #[test]
    fn loop_stops_placed_on_first_pass() {
        let g = square_loop();
        let d: Vec<f64> = g.stops.iter().map(|s| s.distance_from_start_m).collect();
        assert!(d[0].abs() < 0.5, "depot at start, got {}", d[0]);
        for (i, dist) in d.iter().enumerate().skip(1) {
            assert!((dist - g.cumulative_m[i]).abs() < 0.5, "stop {i} at {dist}");
        }
        assert!(d[3] < g.total_length_m() - 1000.0);
        assert_eq!(g.next_stop_after(0.0).unwrap().stop_id.as_str(), "B");
    }

    #[test]
    fn loop_closing_stop_lands_at_end() {
        let g = RouteGeometryBuilder::new(RouteId::from("SQ"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .point(GeoPoint::new(0.01, 0.01))
            .point(GeoPoint::new(0.0, 0.0))
            .stop("A", "Depot", GeoPoint::new(0.0, 0.0), 1)
            .stop("B", "North", GeoPoint::new(0.0, 0.01), 2)
            .stop("A2", "Depot", GeoPoint::new(0.0, 0.0), 3)
            .build()
            .unwrap();
        assert!(g.stops[0].distance_from_start_m.abs() < 0.5);
        assert!((g.stops[2].distance_from_start_m - g.total_length_m()).abs() < 0.5);
    }

    #[test]
    fn stops_sorted_by_sequence() {
        let g = RouteGeometryBuilder::new(RouteId::from("R"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .stop("B", "B", GeoPoint::new(0.0, 0.01), 2)
            .stop("A", "A", GeoPoint::new(0.0, 0.0), 1)
            .build()
            .unwrap();
        assert_eq!(g.stops[0].stop_id.as_str(), "A");
        assert_eq!(g.stops[1].stop_id.as_str(), "B");
    }

    #[test]
    fn too_few_points() {
        let err = RouteGeometryBuilder::new(RouteId::from("R"))
            .point(GeoPoint::new(0.0, 0.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidGeometry { .. }));
    }

    #[test]
    fn zero_length_polyline() {
        let p = GeoPoint::new(1.0, 1.0);
        let err = RouteGeometryBuilder::new(RouteId::from("R")).point(p).point(p).build().unwrap_err();
        assert!(matches!(err, RouteError::InvalidGeometry { .. }));
    }

    #[test]
    fn duplicate_stop() {
        let err = RouteGeometryBuilder::new(RouteId::from("R"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .stop("A", "A", GeoPoint::new(0.0, 0.0), 1)
            .stop("A", "A again", GeoPoint::new(0.0, 0.01), 2)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateStop { .. }));
    }

    #[test]
    fn explicit_distance_must_not_go_backwards() {
        let err = RouteGeometryBuilder::new(RouteId::from("R"))
            .point(GeoPoint::new(0.0, 0.0))
            .point(GeoPoint::new(0.0, 0.01))
            .stop_at_distance("A", "A", GeoPoint::new(0.0, 0.005), 1, 500.0)
            .stop_at_distance("B", "B", GeoPoint::new(0.0, 0.001), 2, 100.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidGeometry { .. }));
    }
}

// ── Projection ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod projection {
    use tt_core::GeoPoint;

    use super::helpers::{out_and_back, square_loop, straight_route};

    #[test]
    fn point_on_route() {
        let g = straight_route();
        let p = g.project(GeoPoint::new(0.0, 0.005), 1.0);
        assert_eq!(p.segment, 0);
        assert!((g.fraction_at(p.distance_along_m) - 0.25).abs() < 1e-3);
        assert!(p.offset_m < 0.5);
    }

    #[test]
    fn point_off_route_projects_perpendicular() {
        let g = straight_route();
        let p = g.project(GeoPoint::new(0.0005, 0.015), 1.0);
        assert_eq!(p.segment, 1);
        assert!((p.offset_m - 55.6).abs() < 1.0, "offset {}", p.offset_m);
        assert!((g.fraction_at(p.distance_along_m) - 0.75).abs() < 1e-3);
    }

    #[test]
    fn tie_prefers_forward_segment() {
        let g = out_and_back();
        // Equidistant (0 m) from the outbound and return legs.
        let p = g.project(GeoPoint::new(0.0, 0.0025), 1.0);
        assert_eq!(p.segment, 1, "forward-biased tie break picks the return leg");
        assert!(g.fraction_at(p.distance_along_m) > 0.8);
    }

    #[test]
    fn project_near_stays_on_current_pass() {
        let g = square_loop();
        let depot = GeoPoint::new(0.0, 0.0);
        let total = g.total_length_m();

        assert!(g.project_near(depot, 0.0, 1.0).distance_along_m < 1.0);
        assert!(g.project_near(depot, total - 50.0, 1.0).distance_along_m > total - 1.0);
        // Without an anchor the forward bias lands on the closing vertex.
        assert!(g.project(depot, 1.0).distance_along_m > total - 1.0);
    }

    #[test]
    fn project_near_keeps_single_pass_regression() {
        let g = straight_route();
        let p = g.project_near(GeoPoint::new(0.0, 0.005), 1500.0, 1.0);
        assert!((g.fraction_at(p.distance_along_m) - 0.25).abs() < 1e-3);
    }

    #[test]
    fn project_near_out_and_back() {
        let g = out_and_back();
        let half = g.cumulative_m[1];
        let point = GeoPoint::new(0.0, 0.0025);
        assert_eq!(g.project_near(point, 100.0, 1.0).segment, 0);
        assert_eq!(g.project_near(point, half + 100.0, 1.0).segment, 1);
    }

    #[test]
    fn project_from_skips_earlier_segments() {
        let g = straight_route();
        let min = g.cumulative_m[1] + 10.0;
        let p = g.project_from(GeoPoint::new(0.0, 0.002), min, 1.0);
        assert!(p.distance_along_m >= min);
    }

    #[test]
    fn fraction_is_clamped() {
        let g = straight_route();
        assert_eq!(g.fraction_at(-5.0), 0.0);
        assert_eq!(g.fraction_at(1e9), 1.0);
    }
}

// ── Stop lookups ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod stops {
    use tt_core::{GeoPoint, StopId};

    use super::helpers::straight_route;

    #[test]
    fn next_stop_is_strictly_ahead() {
        let g = straight_route();
        assert_eq!(g.next_stop_after(-1.0).unwrap().stop_id.as_str(), "S1");
        assert_eq!(g.next_stop_after(0.5).unwrap().stop_id.as_str(), "S2");
        let s2 = g.stops[1].distance_from_start_m;
        assert_eq!(g.next_stop_after(s2).unwrap().stop_id.as_str(), "S3");
        assert!(g.next_stop_after(g.total_length_m() + 1.0).is_none());
    }

    #[test]
    fn stop_by_id() {
        let g = straight_route();
        assert_eq!(g.stop(&StopId::from("S2")).unwrap().name, "Market");
        assert!(g.stop(&StopId::from("nope")).is_none());
    }

    #[test]
    fn nearest_stop_within_radius() {
        let g = straight_route();
        let (stop, d) = g.nearest_stop_within(GeoPoint::new(0.0, 0.0102), 50.0).unwrap();
        assert_eq!(stop.stop_id.as_str(), "S2");
        assert!(d < 30.0);
        assert!(g.nearest_stop_within(GeoPoint::new(0.0, 0.005), 50.0).is_none());
    }
}

// ── Catalogs and loaders ──────────────────────────────────────────────────────

#[cfg(test)]
mod loaders {
    use std::io::Cursor;

    use tt_core::{RouteId, ScheduleId, StopId};

    use crate::{load_routes_reader, load_schedule_reader, RouteCatalog, RouteError, ScheduleCatalog};

    const SHAPES: &str = "\
route_id,sequence,lat,lon\n\
R1,1,0.0,0.01\n\
R1,0,0.0,0.0\n\
R1,2,0.0,0.02\n\
R2,0,1.0,1.0\n\
R2,1,1.0,1.01\n\
";

    const STOPS: &str = "\
route_id,stop_id,name,lat,lon,sequence,distance_from_start_m\n\
R1,S1,Depot,0.0,0.0,1,0\n\
R1,S2,Market,0.0,0.01,2,\n\
R2,X1,Harbour,1.0,1.0,1,\n\
";

    #[test]
    fn routes_round_trip() {
        let catalog = load_routes_reader(Cursor::new(SHAPES), Cursor::new(STOPS)).unwrap();
        assert_eq!(catalog.len(), 2);

        let r1 = catalog.geometry(&RouteId::from("R1")).unwrap();
        assert_eq!(r1.points.len(), 3);
        assert_eq!(r1.points[1].lon, 0.01, "vertices sorted by sequence");
        assert_eq!(r1.stops.len(), 2);
        assert!((r1.stops[1].distance_from_start_m - r1.cumulative_m[1]).abs() < 0.5);
        assert!(catalog.geometry(&RouteId::from("R9")).is_none());
    }

    #[test]
    fn stop_on_unknown_route() {
        let stops = "route_id,stop_id,name,lat,lon,sequence,distance_from_start_m\nR9,S1,X,0,0,1,\n";
        let err = load_routes_reader(Cursor::new(SHAPES), Cursor::new(stops)).unwrap_err();
        assert!(matches!(err, RouteError::UnknownRoute(_)));
    }

    #[test]
    fn schedule_parsing() {
        let csv = "\
schedule_id,stop_id,arrival,departure\n\
SCH1,S1,2024-05-01T10:00:00Z,2024-05-01T10:02:00Z\n\
SCH1,S2,2024-05-01T10:10:00+00:00,\n\
";
        let catalog = load_schedule_reader(Cursor::new(csv)).unwrap();
        assert_eq!(catalog.len(), 2);
        let s2 = catalog
            .scheduled_stop(&ScheduleId::from("SCH1"), &StopId::from("S2"))
            .unwrap();
        assert!(s2.arrival.is_some());
        assert!(s2.departure.is_none());
    }

    #[test]
    fn bad_timestamp() {
        let csv = "schedule_id,stop_id,arrival,departure\nSCH1,S1,ten o'clock,\n";
        let err = load_schedule_reader(Cursor::new(csv)).unwrap_err();
        assert!(matches!(err, RouteError::Parse(_)));
    }
}
