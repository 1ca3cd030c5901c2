//! `tt-trip` — everything that happens to one trip.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                        |
//! |-----------------|-----------------------------------------------------------------|
//! | [`sample`]      | `LocationSample` and its normalization                          |
//! | [`trip`]        | `Trip`, `TripStatus`, `StartTrip`                               |
//! | [`lifecycle`]   | status transitions, `StopTracking`, pause/resume/close          |
//! | [`event`]       | `StopEvent`, `StopEventType`, `StopEventSource`, requests       |
//! | [`ledger`]      | `StopLedger` — append-only event log with arrival matching      |
//! | [`processor`]   | `StopEventProcessor` — ordering, dwell, delay, mismatch checks  |
//! | [`progress`]    | `ProgressEstimator` — projection, regression guard, ETA         |
//! | [`geofence`]    | `DwellTracker` — stalled-at-stop detection                      |
//! | [`ingest`]      | `SampleIngestor` — stale/accuracy gating and state update       |
//! | [`record`]      | `TripRecord` — the unit of mutual exclusion, `TripContext`      |
//!
//! # Ownership
//!
//! A [`TripRecord`] owns all mutable state of one trip.  Nothing in this
//! crate locks: the engine wraps each record in its own lock and hands the
//! functions here a `&mut TripRecord`, so every mutation of one trip is
//! serialized by construction.

pub mod event;
pub mod geofence;
pub mod ingest;
pub mod ledger;
pub mod lifecycle;
pub mod processor;
pub mod progress;
pub mod record;
pub mod sample;
pub mod trip;


pub use event::{ManualConfirmation, StopEvent, StopEventRequest, StopEventSource, StopEventType};
pub use geofence::{DwellAlert, DwellTracker};
pub use ingest::{IngestOutcome, Rejection, SampleIngestor};
pub use ledger::StopLedger;
pub use lifecycle::{LifecycleCommand, StopReason, StopTracking};
pub use processor::{RecordedEvent, StopEventProcessor};
pub use progress::{Eta, ProgressCorrection, ProgressEstimate, ProgressEstimator, ProgressState, ProgressVerdict};
pub use record::{TripContext, TripRecord};
pub use sample::LocationSample;
pub use trip::{StartTrip, Trip, TripStatus};
