//! Engine-level tests: routing through device bindings, the four reference
//! scenarios, queries, concurrency and the JSON facade.
//!
//! Same fixture route as tt-trip: the equator from lon 0.0 to lon 0.1, so a
//! fix at longitude `x` sits at progress fraction `x / 0.1`.

#[cfg(test)]
mod helpers {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone, Utc};

    use tt_core::{GeoPoint, ManualClock, RouteId, Timestamp, TripId};
    use tt_route::{InMemoryRouteCatalog, RouteGeometryBuilder};
    use tt_trip::{LocationSample, ProgressCorrection, Rejection, StartTrip, StopEvent, Trip};

    use crate::{TrackingEngine, TrackingEngineBuilder, TrackingObserver};

    pub fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    pub fn at_lon(lon: f64) -> GeoPoint {
        GeoPoint::new(0.0, lon)
    }

    pub fn routes() -> InMemoryRouteCatalog {
        let geometry = RouteGeometryBuilder::new(RouteId::from("R1"))
            .point(at_lon(0.0))
            .point(at_lon(0.05))
            .point(at_lon(0.1))
            .stop("S1", "Depot", at_lon(0.0), 1)
            .stop("S2", "Market", at_lon(0.03), 2)
            .stop("S3", "Hospital", at_lon(0.06), 3)
            .stop("S4", "Terminus", at_lon(0.1), 4)
            .build()
            .unwrap();
        InMemoryRouteCatalog::new().with(geometry)
    }

    pub fn engine_with<O: TrackingObserver>(observer: O) -> (TrackingEngine<O>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t(0)));
        let engine = TrackingEngineBuilder::new(Arc::new(routes()))
            .clock(clock.clone())
            .observer(observer)
            .build()
            .unwrap();
        (engine, clock)
    }

    pub fn engine() -> (TrackingEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t(0)));
        let engine = TrackingEngineBuilder::new(Arc::new(routes()))
            .clock(clock.clone())
            .build()
            .unwrap();
        (engine, clock)
    }

    /// Start `trip` on `device` at the depot.
    pub fn start<O: TrackingObserver>(engine: &TrackingEngine<O>, trip: &str, device: &str) -> Trip {
        engine
            .start_tracking(StartTrip::new(trip, device, "B-".to_string() + device, "SCH1", "R1").at(at_lon(0.0)))
            .unwrap()
    }

    pub fn sample(trip: &str, device: &str, lon: f64, secs: i64) -> LocationSample {
        LocationSample::new(trip.into(), device.into(), "B1".into(), at_lon(lon), t(secs)).with_speed(10.0)
    }

    pub fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Records every callback as a short string.
    #[derive(Default)]
    pub struct Recorder {
        pub log: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl TrackingObserver for Recorder {
        fn on_trip_started(&self, trip: &Trip) {
            self.push(format!("started {}", trip.trip_id));
        }

        fn on_sample_accepted(&self, sample: &LocationSample, late: bool) {
            self.push(format!("accepted {} late={late}", sample.trip_id));
        }

        fn on_sample_rejected(&self, trip_id: &TripId, rejection: &Rejection) {
            self.push(format!("rejected {trip_id} {}", rejection.kind));
        }

        fn on_stop_event(&self, event: &StopEvent) {
            self.push(format!("event {} {} {}", event.trip_id, event.event_type, event.stop_id));
        }

        fn on_progress_correction(&self, trip_id: &TripId, _correction: &ProgressCorrection) {
            self.push(format!("correction {trip_id}"));
        }

        fn on_trip_stale(&self, trip_id: &TripId) {
            self.push(format!("stale {trip_id}"));
        }

        fn on_trip_closed(&self, trip: &Trip) {
            self.push(format!("closed {} {}", trip.trip_id, trip.status));
        }
    }
}

// ── Reference scenarios ───────────────────────────────────────────────────────

#[cfg(test)]
mod scenarios {
    use tt_core::{ErrorKind, TripId};
    use tt_trip::{StopEventRequest, StopEventSource, StopEventType, StopTracking, TripStatus};

    use super::helpers::{approx, at_lon, engine, sample, start, t};

    #[test]
    fn a_noise_is_flagged_not_applied() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");

        engine.ingest(sample("T1", "D1", 0.01, 10)).unwrap();
        engine.ingest(sample("T1", "D1", 0.03, 20)).unwrap();
        let out = engine.ingest(sample("T1", "D1", 0.025, 30)).unwrap();

        assert!(out.accepted);
        assert_eq!(out.warnings.len(), 1);
        assert!(approx(engine.trip_status(&id).unwrap().route_progress, 0.3));
        assert!(engine.corrections(&id).unwrap().is_empty());
    }

    #[test]
    fn b_dwell_time_from_arrival_to_departure() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");

        engine.record_arrival(&id, StopEventRequest::new("S1").at(t(0))).unwrap();
        let departure = engine.record_departure(&id, StopEventRequest::new("S1").at(t(180))).unwrap();
        assert_eq!(departure.event_type, StopEventType::Departure);
        assert!(approx(departure.dwell_time_minutes.unwrap(), 3.0));
    }

    #[test]
    fn c_departure_without_arrival_needs_manual_override() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");

        let err = engine.record_departure(&id, StopEventRequest::new("S2").at(t(60))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfOrderEvent);

        let event = engine
            .record_departure(&id, StopEventRequest::new("S2").at(t(60)).manual("officer1"))
            .unwrap();
        assert_eq!(event.source, StopEventSource::Manual { confirmed_by: "officer1".into() });
        assert_eq!(engine.stop_events(&id).unwrap().len(), 1);
    }

    #[test]
    fn d_cancel_after_complete_is_already_closed() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");

        let done = engine.stop_tracking(&id, StopTracking::completed(at_lon(0.1))).unwrap();
        assert_eq!(done.status, TripStatus::Completed);

        let err = engine.stop_tracking(&id, StopTracking::cancelled()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TripAlreadyClosed);
        assert_eq!(engine.trip(&id).unwrap().status, TripStatus::Completed);
    }
}

// ── Device binding and routing ────────────────────────────────────────────────

#[cfg(test)]
mod binding {
    use tt_core::{DeviceId, ErrorKind, TripId};
    use tt_trip::{StartTrip, StopEventRequest, StopTracking};

    use super::helpers::{at_lon, engine, sample, start};

    #[test]
    fn one_open_trip_per_device() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");

        let err = engine.start_tracking(StartTrip::new("T2", "D1", "B1", "SCH1", "R1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceAlreadyBound);
        assert_eq!(engine.trip_count(), 1);

        engine.stop_tracking(&"T1".into(), StopTracking::completed(at_lon(0.1))).unwrap();
        assert_eq!(engine.bound_trip(&DeviceId::from("D1")), None);

        start(&engine, "T2", "D1");
        assert_eq!(engine.bound_trip(&DeviceId::from("D1")), Some(TripId::from("T2")));
    }

    #[test]
    fn trip_ids_are_never_reused() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        engine.stop_tracking(&"T1".into(), StopTracking::cancelled()).unwrap();

        let err = engine.start_tracking(StartTrip::new("T1", "D2", "B2", "SCH1", "R1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateTrip);
        // The failed start must not leave D2 bound.
        assert_eq!(engine.bound_trip(&DeviceId::from("D2")), None);
    }

    #[test]
    fn start_validation() {
        let (engine, _) = engine();
        let err = engine.start_tracking(StartTrip::new("T1", "D1", "B1", "SCH1", "R9")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RouteNotFound);

        let err = engine.start_tracking(StartTrip::new("", "D1", "B1", "SCH1", "R1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let bad = StartTrip::new("T1", "D1", "B1", "SCH1", "R1").at(tt_core::GeoPoint::new(95.0, 0.0));
        assert_eq!(engine.start_tracking(bad).unwrap_err().kind(), ErrorKind::InvalidRequest);
        assert_eq!(engine.trip_count(), 0);
    }

    #[test]
    fn samples_route_through_the_binding() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");

        let err = engine.ingest(sample("T1", "D9", 0.01, 10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoActiveTrip);

        let err = engine.ingest(sample("T7", "D1", 0.01, 10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoActiveTrip);

        assert!(engine.ingest(sample("T1", "D1", 0.01, 10)).unwrap().accepted);
    }

    #[test]
    fn closed_trip_rejects_every_mutation() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");
        engine.stop_tracking(&id, StopTracking::cancelled()).unwrap();

        let closed = ErrorKind::TripAlreadyClosed;
        assert_eq!(engine.ingest(sample("T1", "D1", 0.01, 10)).unwrap_err().kind(), closed);
        assert_eq!(engine.record_arrival(&id, StopEventRequest::new("S1")).unwrap_err().kind(), closed);
        assert_eq!(
            engine.record_arrival(&id, StopEventRequest::new("S1").manual("officer1")).unwrap_err().kind(),
            closed
        );
        assert_eq!(engine.pause(&id).unwrap_err().kind(), closed);
        assert_eq!(engine.resume(&id).unwrap_err().kind(), closed);
        assert_eq!(engine.stop_tracking(&id, StopTracking::cancelled()).unwrap_err().kind(), closed);
    }

    #[test]
    fn unknown_trip_is_not_found() {
        let (engine, _) = engine();
        let id = TripId::from("nope");
        assert_eq!(engine.trip_status(&id).unwrap_err().kind(), ErrorKind::TripNotFound);
        assert_eq!(engine.current_location(&id).unwrap_err().kind(), ErrorKind::TripNotFound);
        assert_eq!(engine.next_stop(&id).unwrap_err().kind(), ErrorKind::TripNotFound);
        assert_eq!(engine.pause(&id).unwrap_err().kind(), ErrorKind::TripNotFound);
    }
}

// ── Lifecycle through the engine ──────────────────────────────────────────────

#[cfg(test)]
mod lifecycle {
    use tt_core::TripId;
    use tt_trip::{StopEventRequest, StopEventType, StopTracking, TripStatus};

    use super::helpers::{approx, engine, sample, start, t};

    #[test]
    fn paused_trip_keeps_position_and_resume_reprojects() {
        let (engine, clock) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");

        engine.ingest(sample("T1", "D1", 0.02, 10)).unwrap();
        assert_eq!(engine.pause(&id).unwrap().status, TripStatus::Paused);

        let out = engine.ingest(sample("T1", "D1", 0.04, 20)).unwrap();
        assert!(out.accepted && out.progress.is_none());
        assert!(approx(engine.trip_status(&id).unwrap().route_progress, 0.2));

        clock.set(t(25));
        let resumed = engine.resume(&id).unwrap();
        assert_eq!(resumed.status, TripStatus::Active);
        assert!(approx(resumed.route_progress, 0.4));
        assert_eq!(resumed.next_stop_id, Some("S3".into()));
    }

    #[test]
    fn cancel_closes_open_arrival_with_skip() {
        let (engine, clock) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");
        engine.record_arrival(&id, StopEventRequest::new("S1").at(t(5))).unwrap();

        clock.set(t(60));
        engine.stop_tracking(&id, StopTracking::cancelled().with_notes("bus broke down")).unwrap();

        let events = engine.stop_events(&id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, StopEventType::Skip);
        assert_eq!(events[1].timestamp, t(60));
        let trip = engine.trip(&id).unwrap();
        assert_eq!(trip.notes.as_deref(), Some("bus broke down"));
        assert_eq!(trip.end_time, Some(t(60)));
    }
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod queries {
    use tt_core::{ErrorKind, StopId, TimeRange, TripId};
    use tt_trip::{StopTracking, TripStatus};

    use super::helpers::{at_lon, engine, sample, start, t};
    use crate::{HistoryCursor, PageRequest};

    #[test]
    fn reads_are_idempotent() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");
        engine.ingest(sample("T1", "D1", 0.02, 10).with_accuracy(8.0)).unwrap();

        let loc = engine.current_location(&id).unwrap();
        assert_eq!(loc.point, Some(at_lon(0.02)));
        assert_eq!(loc.accuracy_m, Some(8.0));
        assert_eq!(loc.timestamp, Some(t(10)));
        assert_eq!(engine.current_location(&id).unwrap(), loc);
        assert_eq!(engine.trip_status(&id).unwrap(), engine.trip_status(&id).unwrap());
        assert_eq!(engine.next_stop(&id).unwrap(), engine.next_stop(&id).unwrap());
    }

    #[test]
    fn location_before_first_fix() {
        let (engine, _) = engine();
        engine
            .start_tracking(tt_trip::StartTrip::new("T1", "D1", "B1", "SCH1", "R1"))
            .unwrap();
        let loc = engine.current_location(&"T1".into()).unwrap();
        assert_eq!(loc.point, None);
        assert_eq!(loc.timestamp, None);
        assert_eq!(engine.next_stop(&"T1".into()).unwrap(), None);
    }

    #[test]
    fn next_stop_view() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        engine.ingest(sample("T1", "D1", 0.02, 10)).unwrap();

        let next = engine.next_stop(&"T1".into()).unwrap().unwrap();
        assert_eq!(next.stop_id, StopId::from("S2"));
        assert_eq!(next.name, "Market");
        assert_eq!(next.sequence, 2);
        assert!((next.distance_m - 1112.0).abs() < 2.0, "got {}", next.distance_m);
        assert!(next.eta.is_some());
    }

    fn seeded() -> crate::TrackingEngine {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        // Three samples share t(20) so a page boundary falls among them.
        let fixes = [(0.001, 10), (0.002, 20), (0.003, 20), (0.004, 20), (0.005, 30), (0.006, 40), (0.007, 50)];
        for (lon, secs) in fixes {
            assert!(engine.ingest(sample("T1", "D1", lon, secs)).unwrap().accepted);
        }
        engine
    }

    #[test]
    fn history_pages_cover_everything_once() {
        let engine = seeded();
        let id = TripId::from("T1");

        let mut seen = Vec::new();
        let mut page = engine.location_history(&id, TimeRange::ALL, &PageRequest::first(2)).unwrap();
        loop {
            assert!(page.items.len() <= 2);
            seen.extend(page.items.iter().map(|s| s.point.lon));
            let Some(cursor) = page.next_cursor.clone() else { break };
            page = engine.location_history(&id, TimeRange::ALL, &PageRequest::after(cursor, 2)).unwrap();
        }
        assert_eq!(seen, vec![0.001, 0.002, 0.003, 0.004, 0.005, 0.006, 0.007]);
    }

    #[test]
    fn history_cursor_is_restartable() {
        let engine = seeded();
        let id = TripId::from("T1");
        let first = engine.location_history(&id, TimeRange::ALL, &PageRequest::first(3)).unwrap();
        let cursor = first.next_cursor.unwrap();

        let decoded = HistoryCursor::decode(&cursor).unwrap();
        assert_eq!(decoded, HistoryCursor { timestamp: t(20), offset: 2 });
        assert_eq!(decoded.encode(), cursor);

        let a = engine.location_history(&id, TimeRange::ALL, &PageRequest::after(cursor.clone(), 3)).unwrap();
        let b = engine.location_history(&id, TimeRange::ALL, &PageRequest::after(cursor, 3)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.items[0].point.lon, 0.004);
    }

    #[test]
    fn history_time_window() {
        let engine = seeded();
        let page = engine
            .location_history(&"T1".into(), TimeRange::new(t(20), t(40)), &PageRequest::default())
            .unwrap();
        let lons: Vec<f64> = page.items.iter().map(|s| s.point.lon).collect();
        assert_eq!(lons, vec![0.002, 0.003, 0.004, 0.005]);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn malformed_cursor_is_invalid() {
        let engine = seeded();
        for bad in ["", "abc", "12:", ":3", "12:x"] {
            let err = engine
                .location_history(&"T1".into(), TimeRange::ALL, &PageRequest::after(bad, 2))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "cursor {bad:?}");
        }
    }

    #[test]
    fn arrivals_ordered_by_eta_within_window() {
        let (engine, clock) = engine();
        for (trip, dev) in [("T1", "D1"), ("T2", "D2"), ("T3", "D3")] {
            start(&engine, trip, dev);
        }
        // At 10 m/s: T1 is ≈1.1 km from S2, T2 ≈2.2 km, T3 already past it.
        engine.ingest(sample("T2", "D2", 0.01, 10)).unwrap();
        engine.ingest(sample("T1", "D1", 0.02, 10)).unwrap();
        engine.ingest(sample("T3", "D3", 0.04, 10)).unwrap();
        clock.set(t(10));

        let s2 = StopId::from("S2");
        let all: Vec<TripId> = engine.arrivals_at_stop(&s2, 10.0).into_iter().map(|a| a.trip_id).collect();
        assert_eq!(all, vec![TripId::from("T1"), TripId::from("T2")]);

        let soon = engine.arrivals_at_stop(&s2, 2.0);
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].trip_id, TripId::from("T1"));
        assert!((soon[0].minutes_away - 1112.0 / 10.0 / 60.0).abs() < 0.05);

        engine.stop_tracking(&"T1".into(), StopTracking::cancelled()).unwrap();
        let open: Vec<TripId> = engine.arrivals_at_stop(&s2, 10.0).into_iter().map(|a| a.trip_id).collect();
        assert_eq!(open, vec![TripId::from("T2")]);
    }

    #[test]
    fn status_scans() {
        let (engine, _) = engine();
        for (trip, dev) in [("T2", "D2"), ("T1", "D1"), ("T3", "D3")] {
            start(&engine, trip, dev);
        }
        engine.pause(&"T3".into()).unwrap();
        engine.stop_tracking(&"T2".into(), StopTracking::completed(at_lon(0.1))).unwrap();

        let ids = |status| -> Vec<String> {
            engine.trips_by_status(status).into_iter().map(|v| v.trip_id.to_string()).collect()
        };
        assert_eq!(ids(TripStatus::Active), vec!["T1"]);
        assert_eq!(ids(TripStatus::Paused), vec!["T3"]);
        assert_eq!(ids(TripStatus::Completed), vec!["T2"]);
        assert!(ids(TripStatus::Cancelled).is_empty());
    }
}

// ── Monitoring ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod monitoring {
    use tt_core::TripId;
    use tt_trip::TripStatus;

    use super::helpers::{engine, sample, start, t};

    #[test]
    fn inactivity_flags_stale_without_changing_status() {
        let (engine, clock) = engine();
        start(&engine, "T1", "D1");
        start(&engine, "T2", "D2");
        engine.ingest(sample("T1", "D1", 0.01, 10)).unwrap();
        engine.ingest(sample("T2", "D2", 0.01, 200)).unwrap();

        clock.set(t(320));
        assert_eq!(engine.sweep_stale(), vec![TripId::from("T1")]);
        assert!(engine.sweep_stale().is_empty(), "already flagged");
        assert_eq!(engine.stale_trips(), vec![TripId::from("T1")]);
        assert_eq!(engine.trip_status(&"T1".into()).unwrap().status, TripStatus::Active);

        engine.ingest(sample("T1", "D1", 0.02, 321)).unwrap();
        assert!(engine.stale_trips().is_empty());
    }

    #[test]
    fn trip_without_samples_measures_from_start() {
        let (engine, clock) = engine();
        start(&engine, "T1", "D1");
        clock.set(t(299));
        assert!(engine.sweep_stale().is_empty());
        clock.set(t(300));
        assert_eq!(engine.sweep_stale(), vec![TripId::from("T1")]);
    }
}

// ── Batch and concurrency ─────────────────────────────────────────────────────

#[cfg(test)]
mod concurrency {
    use tt_core::{ErrorKind, TripId};

    use super::helpers::{engine, sample, start};

    #[test]
    fn batch_results_follow_input_order() {
        let (engine, _) = engine();
        start(&engine, "T1", "D1");
        start(&engine, "T2", "D2");

        let batch = vec![
            sample("T1", "D1", 0.01, 10),
            sample("T2", "D2", 0.02, 10),
            sample("T9", "D9", 0.02, 10),
            sample("T1", "D1", 0.02, 20),
            sample("T2", "D2", 0.01, 2),
        ];
        let results = engine.ingest_batch(batch);
        assert_eq!(results.len(), 5);
        assert!(results[0].as_ref().unwrap().accepted);
        assert!(results[1].as_ref().unwrap().accepted);
        assert_eq!(results[2].as_ref().unwrap_err().kind(), ErrorKind::NoActiveTrip);
        assert!(results[3].as_ref().unwrap().accepted);
        let stale = results[4].as_ref().unwrap();
        assert_eq!(stale.rejected.as_ref().unwrap().kind, ErrorKind::StaleSample);

        assert_eq!(engine.current_location(&"T1".into()).unwrap().point.unwrap().lon, 0.02);
    }

    #[test]
    fn parallel_ingest_keeps_trips_isolated() {
        let (engine, _) = engine();
        let trips: Vec<(String, String)> = (0..8).map(|i| (format!("T{i}"), format!("D{i}"))).collect();
        for (trip, dev) in &trips {
            start(&engine, trip, dev);
        }

        std::thread::scope(|s| {
            for (trip, dev) in &trips {
                let engine = &engine;
                s.spawn(move || {
                    for k in 1..=50 {
                        let out = engine.ingest(sample(trip, dev, k as f64 * 0.001, k * 10)).unwrap();
                        assert!(out.accepted);
                    }
                });
            }
        });

        for (trip, _) in &trips {
            let id = TripId::from(trip.as_str());
            let history = engine
                .location_history(&id, tt_core::TimeRange::ALL, &crate::PageRequest::default())
                .unwrap();
            assert_eq!(history.items.len(), 50);
            assert!(history.items.iter().all(|s| s.trip_id == id));
            assert!((engine.trip_status(&id).unwrap().route_progress - 0.5).abs() < 1e-6);
        }
    }
}

// ── Observer ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod observer {
    use std::sync::Arc;

    use tt_core::TripId;
    use tt_trip::{StopEventRequest, StopTracking};

    use super::helpers::{Recorder, engine_with, sample, start, t};

    #[test]
    fn callbacks_follow_state_changes() {
        let recorder = Arc::new(Recorder::default());
        let (engine, _) = engine_with(recorder.clone());
        start(&engine, "T1", "D1");
        let id = TripId::from("T1");

        engine.ingest(sample("T1", "D1", 0.02, 100)).unwrap();
        engine.ingest(sample("T1", "D1", 0.01, 50)).unwrap();
        engine.ingest(sample("T1", "D1", 0.021, 98)).unwrap();

        let req = StopEventRequest::new("S2").at(t(110)).idempotency_key("k-1");
        engine.record_arrival(&id, req.clone()).unwrap();
        engine.record_arrival(&id, req).unwrap();
        engine.stop_tracking(&id, StopTracking::cancelled()).unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                "started T1",
                "accepted T1 late=false",
                "rejected T1 StaleSample",
                "accepted T1 late=true",
                "event T1 arrival S2",
                "event T1 skip S2",
                "closed T1 cancelled",
            ]
        );
    }

    #[test]
    fn correction_and_stale_are_reported() {
        let recorder = Arc::new(Recorder::default());
        let (engine, clock) = engine_with(recorder.clone());
        start(&engine, "T1", "D1");

        engine.ingest(sample("T1", "D1", 0.05, 10)).unwrap();
        for secs in [20, 30, 40] {
            engine.ingest(sample("T1", "D1", 0.02, secs)).unwrap();
        }
        clock.set(t(400));
        engine.sweep_stale();

        let log = recorder.take();
        assert_eq!(log.iter().filter(|l| *l == "correction T1").count(), 1);
        assert_eq!(log.last().map(String::as_str), Some("stale T1"));
    }
}

// ── JSON facade ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod api {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::helpers::engine;
    use crate::{TrackingApi, TrackingEngine};

    fn call(api: &TrackingApi<crate::NoopObserver>, request: Value) -> Value {
        serde_json::from_str(&api.handle_json(&request.to_string())).unwrap()
    }

    fn api() -> TrackingApi<crate::NoopObserver> {
        let (engine, _): (TrackingEngine, _) = engine();
        TrackingApi::new(Arc::new(engine))
    }

    fn start(api: &TrackingApi<crate::NoopObserver>) {
        let resp = call(api, json!({
            "op": "startTracking",
            "tripId": "T1", "deviceId": "D1", "busId": "B1",
            "scheduleId": "SCH1", "routeId": "R1",
            "driverId": "drv-7",
            "startLocation": { "lat": 0.0, "lng": 0.0 }
        }));
        assert_eq!(resp["success"], true, "{resp}");
        assert_eq!(resp["data"]["status"], "active");
        assert_eq!(resp["data"]["driverId"], "drv-7");
    }

    #[test]
    fn ingest_and_query_round_trip() {
        let api = api();
        start(&api);

        let resp = call(&api, json!({
            "op": "ingest",
            "tripId": "T1", "deviceId": "D1", "busId": "B1",
            "point": { "lat": 0.0, "lng": 0.02, "alt": 12.5 },
            "timestamp": "2024-05-01T10:00:10Z",
            "speed": 10.0, "accuracy": 6.0
        }));
        assert_eq!(resp["success"], true, "{resp}");
        assert_eq!(resp["data"]["accepted"], true);
        assert_eq!(resp["data"]["progress"]["nextStop"], "S2");

        let loc = call(&api, json!({ "op": "currentLocation", "tripId": "T1" }));
        assert_eq!(loc["data"]["tripId"], "T1");
        assert_eq!(loc["data"]["altitudeM"], 12.5);
        assert!(loc["metadata"]["timestamp"].is_string());

        let status = call(&api, json!({ "op": "tripStatus", "tripId": "T1" }));
        let progress = status["data"]["routeProgress"].as_f64().unwrap();
        assert!((progress - 0.2).abs() < 1e-6);
    }

    #[test]
    fn missing_timestamp_defaults_to_clock() {
        let api = api();
        start(&api);
        let resp = call(&api, json!({
            "op": "ingest",
            "tripId": "T1", "deviceId": "D1", "busId": "B1",
            "point": { "lat": 0.0, "lng": 0.01 }
        }));
        assert_eq!(resp["data"]["accepted"], true);
        let loc = call(&api, json!({ "op": "currentLocation", "tripId": "T1" }));
        assert_eq!(loc["data"]["timestamp"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn errors_carry_kind_and_message() {
        let api = api();
        start(&api);

        let resp = call(&api, json!({ "op": "recordDeparture", "tripId": "T1", "stopId": "S2" }));
        assert_eq!(resp["success"], false);
        assert_eq!(resp["error"]["kind"], "OutOfOrderEvent");
        assert!(resp["error"]["message"].as_str().unwrap().contains("S2"));
        assert!(resp.get("data").is_none());

        let resp = call(&api, json!({
            "op": "recordDeparture", "tripId": "T1", "stopId": "S2", "isManual": true
        }));
        assert_eq!(resp["error"]["kind"], "InvalidRequest");

        let resp = call(&api, json!({
            "op": "recordDeparture", "tripId": "T1", "stopId": "S2",
            "isManual": true, "confirmedBy": "officer1"
        }));
        assert_eq!(resp["success"], true);
        assert_eq!(resp["data"]["source"]["kind"], "manual");
        assert_eq!(resp["data"]["source"]["confirmedBy"], "officer1");

        let resp: Value = serde_json::from_str(&api.handle_json("{ not json")).unwrap();
        assert_eq!(resp["error"]["kind"], "InvalidRequest");
    }

    #[test]
    fn manual_confirmation_and_listing() {
        let api = api();
        start(&api);
        let resp = call(&api, json!({
            "op": "confirmManual", "eventType": "boarding",
            "tripId": "T1", "stopId": "S1", "confirmedBy": "officer1",
            "passengerCount": 4, "idempotencyKey": "b-1"
        }));
        assert_eq!(resp["success"], true, "{resp}");
        assert_eq!(resp["data"]["passengerDelta"], 4);

        let events = call(&api, json!({ "op": "stopEvents", "tripId": "T1" }));
        assert_eq!(events["data"].as_array().unwrap().len(), 1);

        let status = call(&api, json!({ "op": "tripStatus", "tripId": "T1" }));
        assert_eq!(status["data"]["passengerCount"], 4);
    }

    #[test]
    fn stop_tracking_and_scans() {
        let api = api();
        start(&api);
        let resp = call(&api, json!({
            "op": "stopTracking", "tripId": "T1", "reason": "completed",
            "endLocation": { "lat": 0.0, "lng": 0.1 }
        }));
        assert_eq!(resp["data"]["status"], "completed");

        let done = call(&api, json!({ "op": "tripsByStatus", "status": "completed" }));
        assert_eq!(done["data"][0]["tripId"], "T1");

        let history = call(&api, json!({
            "op": "locationHistory", "tripId": "T1",
            "from": "2024-05-01T09:00:00Z", "limit": 10
        }));
        assert_eq!(history["data"]["items"].as_array().unwrap().len(), 0);
        assert_eq!(history["metadata"]["timeRange"]["from"], "2024-05-01T09:00:00Z");

        let arrivals = call(&api, json!({ "op": "arrivalsAtStop", "stopId": "S2", "windowMinutes": 15.0 }));
        assert_eq!(arrivals["metadata"]["windowMinutes"], 15.0);
        assert_eq!(call(&api, json!({ "op": "staleTrips" }))["data"], json!([]));
    }
}
