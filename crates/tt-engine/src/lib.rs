//! `tt-engine` — the live trip-tracking engine.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                          |
//! |--------------|-------------------------------------------------------------------|
//! | [`engine`]   | `TrackingEngine` — trip index, device bindings, mutating API      |
//! | [`query`]    | read path: views, location-history pagination, stop arrivals      |
//! | [`observer`] | `TrackingObserver` hooks, `NoopObserver`                          |
//! | [`builder`]  | `TrackingEngineBuilder`                                           |
//! | [`api`]      | camelCase wire DTOs and the `TrackingApi` JSON facade             |
//!
//! # Concurrency model
//!
//! ```text
//! bindings: DashMap<DeviceId, TripId>          device → its one open trip
//! trips:    DashMap<TripId, Arc<TripSlot>>     every trip ever started
//! TripSlot: RwLock<TripRecord>                 per-trip mutual exclusion
//! ```
//!
//! Every mutation of one trip takes that trip's write lock, so ingest,
//! stop-event recording and lifecycle transitions on a trip are serialized
//! while different trips proceed in parallel.  Queries take the read lock
//! and copy out a consistent view.  Observer callbacks run after the lock
//! is released.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                       |
//! |------------|--------------------------------------------------------------|
//! | `parallel` | `ingest_batch` processes device groups on Rayon's pool.      |
//! | `fx-hash`  | FxHash instead of SipHash for the engine's concurrent maps.  |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tt_engine::TrackingEngineBuilder;
//! use tt_trip::{LocationSample, StartTrip};
//!
//! let engine = TrackingEngineBuilder::new(Arc::new(routes)).build()?;
//! engine.start_tracking(StartTrip::new("T1", "D1", "B1", "SCH1", "R1"))?;
//! let outcome = engine.ingest(sample)?;
//! let view = engine.current_location(&"T1".into())?;
//! ```

pub mod api;
pub mod builder;
pub mod engine;
pub mod observer;
pub mod query;

#[cfg(test)]
mod tests;

pub use api::{ApiError, ApiRequest, ApiResponse, Metadata, TrackingApi};
pub use builder::TrackingEngineBuilder;
pub use engine::TrackingEngine;
pub use observer::{NoopObserver, TrackingObserver};
pub use query::{
    ArrivalEstimate, HistoryCursor, LocationView, NextStopView, Page, PageRequest, TripStatusView,
};
