//! The `HistoryWriter` trait implemented by all backends.

use crate::{HistoryResult, LocationRow, StopEventRow, TripRow};

/// Append-only sink for history rows.
///
/// Writers run on the history worker thread, hence `Send`.  A failed call
/// is retried with the same rows.
pub trait HistoryWriter: Send {
    fn write_samples(&mut self, rows: &[LocationRow]) -> HistoryResult<()>;

    fn write_stop_events(&mut self, rows: &[StopEventRow]) -> HistoryResult<()>;

    fn write_trips(&mut self, rows: &[TripRow]) -> HistoryResult<()>;

    /// Flush and close all underlying handles.
    ///
    /// Idempotent: safe to call more than once.
    fn finish(&mut self) -> HistoryResult<()>;
}
