//! SQLite history backend (feature `sqlite`).
//!
//! Creates a single `history.db` file in the configured directory with
//! three tables: `location_samples`, `stop_events` and `trips`.  Timestamps
//! are stored as Unix milliseconds.

use std::path::Path;

use rusqlite::{Connection, params};

use crate::writer::HistoryWriter;
use crate::{HistoryResult, LocationRow, StopEventRow, TripRow};

/// Writes history to an SQLite database.
pub struct SqliteHistoryWriter {
    conn:     Connection,
    finished: bool,
}

impl SqliteHistoryWriter {
    /// Open (or create) `history.db` in `dir` and initialise the schema.
    pub fn new(dir: &Path) -> HistoryResult<Self> {
        let conn = Connection::open(dir.join("history.db"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS location_samples (
                 trip_id      TEXT    NOT NULL,
                 device_id    TEXT    NOT NULL,
                 bus_id       TEXT    NOT NULL,
                 timestamp_ms INTEGER NOT NULL,
                 lat          REAL    NOT NULL,
                 lon          REAL    NOT NULL,
                 altitude_m   REAL,
                 speed_mps    REAL,
                 heading_deg  REAL,
                 accuracy_m   REAL,
                 late         INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_samples_trip_time
                 ON location_samples (trip_id, timestamp_ms);
             CREATE TABLE IF NOT EXISTS stop_events (
                 trip_id              TEXT    NOT NULL,
                 seq                  INTEGER NOT NULL,
                 stop_id              TEXT    NOT NULL,
                 event_type           TEXT    NOT NULL,
                 timestamp_ms         INTEGER NOT NULL,
                 reported_lat         REAL,
                 reported_lon         REAL,
                 source               TEXT    NOT NULL,
                 confirmed_by         TEXT,
                 distance_from_stop_m REAL,
                 skip_candidate       INTEGER NOT NULL,
                 dwell_time_minutes   REAL,
                 passenger_delta      INTEGER,
                 delay_minutes        REAL,
                 notes                TEXT,
                 PRIMARY KEY (trip_id, seq)
             );
             CREATE TABLE IF NOT EXISTS trips (
                 trip_id             TEXT    PRIMARY KEY,
                 device_id           TEXT    NOT NULL,
                 bus_id              TEXT    NOT NULL,
                 route_id            TEXT    NOT NULL,
                 schedule_id         TEXT    NOT NULL,
                 status              TEXT    NOT NULL,
                 start_time_ms       INTEGER NOT NULL,
                 end_time_ms         INTEGER,
                 distance_traveled_m REAL    NOT NULL,
                 route_progress      REAL    NOT NULL,
                 stop_count          INTEGER NOT NULL,
                 passenger_count     INTEGER NOT NULL,
                 notes               TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_trips_device ON trips (device_id);
             CREATE INDEX IF NOT EXISTS idx_trips_status ON trips (status);",
        )?;

        Ok(Self { conn, finished: false })
    }
}

impl HistoryWriter for SqliteHistoryWriter {
    fn write_samples(&mut self, rows: &[LocationRow]) -> HistoryResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO location_samples \
                 (trip_id, device_id, bus_id, timestamp_ms, lat, lon, \
                  altitude_m, speed_mps, heading_deg, accuracy_m, late) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.trip_id,
                    row.device_id,
                    row.bus_id,
                    row.timestamp.timestamp_millis(),
                    row.lat,
                    row.lon,
                    row.altitude_m,
                    row.speed_mps,
                    row.heading_deg,
                    row.accuracy_m,
                    row.late as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // Replaying a batch after a failed commit must not trip the primary key.
    fn write_stop_events(&mut self, rows: &[StopEventRow]) -> HistoryResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO stop_events \
                 (trip_id, seq, stop_id, event_type, timestamp_ms, reported_lat, reported_lon, \
                  source, confirmed_by, distance_from_stop_m, skip_candidate, \
                  dwell_time_minutes, passenger_delta, delay_minutes, notes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.trip_id,
                    row.seq as i64,
                    row.stop_id,
                    row.event_type,
                    row.timestamp.timestamp_millis(),
                    row.reported_lat,
                    row.reported_lon,
                    row.source,
                    row.confirmed_by,
                    row.distance_from_stop_m,
                    row.skip_candidate as i64,
                    row.dwell_time_minutes,
                    row.passenger_delta,
                    row.delay_minutes,
                    row.notes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_trips(&mut self, rows: &[TripRow]) -> HistoryResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO trips \
                 (trip_id, device_id, bus_id, route_id, schedule_id, status, start_time_ms, \
                  end_time_ms, distance_traveled_m, route_progress, stop_count, \
                  passenger_count, notes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.trip_id,
                    row.device_id,
                    row.bus_id,
                    row.route_id,
                    row.schedule_id,
                    row.status,
                    row.start_time.timestamp_millis(),
                    row.end_time.map(|t| t.timestamp_millis()),
                    row.distance_traveled_m,
                    row.route_progress,
                    row.stop_count,
                    row.passenger_count,
                    row.notes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn finish(&mut self) -> HistoryResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
