//! `tt-history` — asynchronous history persistence for the trip-tracking
//! engine.
//!
//! Two backends are provided behind Cargo features:
//!
//! | Feature   | Backend | Files created                                          |
//! |-----------|---------|--------------------------------------------------------|
//! | *(none)*  | CSV     | `location_samples.csv`, `stop_events.csv`, `trips.csv` |
//! | `sqlite`  | SQLite  | `history.db`                                           |
//!
//! Both implement [`HistoryWriter`] and are driven by [`HistoryObserver`],
//! which implements `tt_engine::TrackingObserver`.  The observer never
//! touches the writer on the caller's thread: records go over a channel to
//! a background worker that batches them, retries failed writes with
//! exponential backoff and counts what it could not persist in
//! [`HistoryStats`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use tt_history::{CsvHistoryWriter, HistoryConfig, HistoryObserver};
//!
//! let writer = CsvHistoryWriter::new(Path::new("./history"))?;
//! let history = Arc::new(HistoryObserver::spawn(writer, HistoryConfig::default())?);
//! let engine = TrackingEngineBuilder::new(routes).observer(history.clone()).build()?;
//! // ...
//! history.shutdown()?;
//! ```

pub mod config;
pub mod csv;
pub mod error;
pub mod observer;
pub mod row;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;


pub use config::HistoryConfig;
pub use crate::csv::CsvHistoryWriter;
pub use error::{HistoryError, HistoryResult};
pub use observer::{HistoryObserver, HistoryStats};
pub use row::{LocationRow, StopEventRow, TripRow};
pub use writer::HistoryWriter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistoryWriter;
