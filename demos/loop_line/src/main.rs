//! loop_line — drives the tracking engine with three simulated buses.
//!
//! Each bus runs the five-stop L1 line from Majestic to Cantonment,
//! reporting a jittered fix every 10 s, dwelling 30 s at each stop and
//! recording arrivals, passenger movements and departures.  History goes
//! to CSV in the directory given as the first argument (default
//! `./loop_line_history`).
//!
//! Logging follows `RUST_LOG`, e.g. `RUST_LOG=tt_trip=debug`.

mod route;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tt_core::{GeoPoint, ManualClock, TripId};
use tt_engine::{TrackingApi, TrackingEngine, TrackingEngineBuilder};
use tt_history::{CsvHistoryWriter, HistoryConfig, HistoryObserver};
use tt_trip::{LocationSample, StartTrip, StopEventRequest, StopTracking, TripStatus};

// ── Constants ─────────────────────────────────────────────────────────────────

const BUS_COUNT:         usize = 3;
const SEED:              u64   = 42;
const TICK_SECS:         i64   = 10;
const STEPS_PER_SEGMENT: u32   = 12;
const DWELL_TICKS:       u32   = 3;
const HEADWAY_TICKS:     u64   = 12;  // two minutes between departures
const JITTER_DEG:        f64   = 0.00003;
const LATE_FIX_CHANCE:   f64   = 0.05;

type Engine = TrackingEngine<Arc<HistoryObserver>>;

// ── Bus simulation ────────────────────────────────────────────────────────────

struct Bus {
    trip:       TripId,
    device:     String,
    bus:        String,
    start_tick: u64,
    /// Index of the stop last reached.
    seg:        usize,
    step:       u32,
    dwell:      u32,
    on_board:   u32,
    started:    bool,
    done:       bool,
}

impl Bus {
    fn new(i: usize) -> Self {
        Self {
            trip:       TripId::from(format!("T{}", i + 1).as_str()),
            device:     format!("D{}", i + 1),
            bus:        format!("KA-01-F-{:04}", 1100 + i),
            start_tick: i as u64 * HEADWAY_TICKS,
            seg:        0,
            step:       0,
            dwell:      0,
            on_board:   0,
            started:    false,
            done:       false,
        }
    }

    fn sample(&self, point: GeoPoint, at: chrono::DateTime<Utc>, rng: &mut SmallRng) -> LocationSample {
        LocationSample::new(self.trip.clone(), self.device.as_str().into(), self.bus.as_str().into(), point, at)
            .with_speed(8.0 + rng.gen_range(-1.5..1.5))
            .with_accuracy(rng.gen_range(3.0..12.0))
    }
}

/// Arrive at `bus.seg`, let passengers off and on, start the dwell.
fn arrive(engine: &Engine, bus: &mut Bus, stops: &[String], rng: &mut SmallRng, at: chrono::DateTime<Utc>) {
    let stop = &stops[bus.seg];
    let last = bus.seg + 1 == stops.len();

    if let Err(e) = engine.record_arrival(&bus.trip, StopEventRequest::new(stop.as_str()).at(at)) {
        warn!(trip = %bus.trip, stop = %stop, error = %e, "arrival rejected");
    }

    let alighting = if last { bus.on_board } else { rng.gen_range(0..=bus.on_board) };
    if alighting > 0 {
        let req = StopEventRequest::new(stop.as_str()).at(at).passengers(alighting);
        match engine.record_alighting(&bus.trip, req) {
            Ok(_) => bus.on_board -= alighting,
            Err(e) => warn!(trip = %bus.trip, error = %e, "alighting rejected"),
        }
    }

    if !last {
        let boarding = rng.gen_range(0..8);
        if boarding > 0 {
            let req = StopEventRequest::new(stop.as_str()).at(at).passengers(boarding);
            match engine.record_boarding(&bus.trip, req) {
                Ok(_) => bus.on_board += boarding,
                Err(e) => warn!(trip = %bus.trip, error = %e, "boarding rejected"),
            }
        }
    }
    bus.dwell = DWELL_TICKS;
}

fn tick(
    engine:   &Engine,
    bus:      &mut Bus,
    stops:    &[String],
    vertices: &[GeoPoint],
    rng:      &mut SmallRng,
    tick:     u64,
    at:       chrono::DateTime<Utc>,
) -> Result<()> {
    if bus.done || tick < bus.start_tick {
        return Ok(());
    }

    if !bus.started {
        let start = StartTrip::new(
            bus.trip.as_str(),
            bus.device.as_str(),
            bus.bus.as_str(),
            route::SCHEDULE_ID,
            route::ROUTE_ID,
        )
        .at(vertices[0]);
        engine.start_tracking(start).context("starting trip")?;
        bus.started = true;
        arrive(engine, bus, stops, rng, at);
        return Ok(());
    }

    if bus.dwell > 0 {
        bus.dwell -= 1;
        if bus.dwell > 0 {
            return Ok(());
        }
        if bus.seg + 1 == stops.len() {
            let end = vertices[bus.seg];
            engine
                .stop_tracking(&bus.trip, StopTracking::completed(end))
                .context("completing trip")?;
            bus.done = true;
        } else if let Err(e) =
            engine.record_departure(&bus.trip, StopEventRequest::new(stops[bus.seg].as_str()).at(at))
        {
            warn!(trip = %bus.trip, error = %e, "departure rejected");
        }
        return Ok(());
    }

    bus.step += 1;
    let f = f64::from(bus.step) / f64::from(STEPS_PER_SEGMENT);
    let exact = vertices[bus.seg].lerp(vertices[bus.seg + 1], f);
    let point = GeoPoint::new(
        exact.lat + rng.gen_range(-JITTER_DEG..JITTER_DEG),
        exact.lon + rng.gen_range(-JITTER_DEG..JITTER_DEG),
    );
    engine.ingest(bus.sample(point, at, rng))?;

    // A delayed fix from earlier in the segment, delivered after the fresh one.
    if bus.step > 1 && rng.gen_bool(LATE_FIX_CHANCE) {
        let earlier = vertices[bus.seg].lerp(vertices[bus.seg + 1], f - 0.5 / f64::from(STEPS_PER_SEGMENT));
        engine.ingest(bus.sample(earlier, at - Duration::seconds(TICK_SECS / 2), rng))?;
    }

    if bus.step == STEPS_PER_SEGMENT {
        bus.seg += 1;
        bus.step = 0;
        arrive(engine, bus, stops, rng, at);
    }
    Ok(())
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== loop_line — trip tracking demo ===");

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("loop_line_history"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let (routes, schedule) = route::load().context("loading reference data")?;
    let stops = route::stop_ids();
    let vertices = route::vertices();

    let base = Utc
        .with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
        .single()
        .context("base time")?;
    let clock = Arc::new(ManualClock::new(base));

    let history = Arc::new(HistoryObserver::spawn(
        CsvHistoryWriter::new(&out_dir)?,
        HistoryConfig::default(),
    )?);
    let engine = Arc::new(
        TrackingEngineBuilder::new(Arc::new(routes))
            .schedule(Arc::new(schedule))
            .clock(clock.clone())
            .observer(history.clone())
            .build()?,
    );
    let api = TrackingApi::new(engine.clone());

    let mut rng = SmallRng::seed_from_u64(SEED);
    let mut buses: Vec<Bus> = (0..BUS_COUNT).map(Bus::new).collect();

    let started = Instant::now();
    let mut tick_no = 0u64;
    while buses.iter().any(|b| !b.done) {
        let at = base + Duration::seconds(tick_no as i64 * TICK_SECS);
        clock.set(at);
        for bus in &mut buses {
            tick(&engine, bus, &stops, &vertices, &mut rng, tick_no, at)?;
        }

        // Halfway through the run, ask the JSON facade who is coming to S3.
        if tick_no == 40 {
            let reply = api.handle_json(r#"{"op":"arrivalsAtStop","stopId":"S3","windowMinutes":15}"#);
            println!("\narrivalsAtStop S3 @ {}:\n{reply}", at.format("%H:%M:%S"));
        }
        tick_no += 1;
    }
    info!(ticks = tick_no, elapsed_ms = started.elapsed().as_millis() as u64, "simulation finished");

    // ── Summary ──────────────────────────────────────────────────────────────
    println!("\n{:<4} {:<10} {:>9} {:>7} {:>7} {:>6}", "trip", "status", "dist (m)", "stops", "events", "pax");
    for view in engine.trips_by_status(TripStatus::Completed) {
        let events = engine.stop_events(&view.trip_id)?.len();
        println!(
            "{:<4} {:<10} {:>9.0} {:>7} {:>7} {:>6}",
            view.trip_id, view.status, view.distance_traveled_m, view.stop_count, events, view.passenger_count,
        );
    }

    let last = serde_json::to_string_pretty(&engine.trip_status(&TripId::from("T1"))?)?;
    println!("\nT1 final status:\n{last}");

    history.shutdown()?;
    let stats = history.stats();
    println!(
        "\nhistory: {} written, {} dropped, {} rejected samples → {}",
        stats.written(),
        stats.dropped(),
        stats.rejected_samples(),
        out_dir.display(),
    );
    Ok(())
}
