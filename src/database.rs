//! Storage contract for positions, events and aggregates.
//!
//! The detectors only talk to [`Storage`]. [`Database`] is the Postgres
//! implementation used in production, [`MemoryStore`] keeps everything in
//! process and backs the tests.

mod memory;
mod models;
mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::TrackerError;
use crate::models::{
    CrossingEvent, DailyStat, Mmsi, Position, Ship, ShipIdentity, TimeWindow, VesselInfo,
    WaitingEvent, WeatherObservation,
};

pub use memory::MemoryStore;
pub use postgres::Database;

/// Whole-store counters for the run summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreTotals {
    pub ships_with_positions: i64,
    pub ships_crossed: i64,
    pub crossings: i64,
    pub waiting_events: i64,
    pub avg_waiting_minutes: Option<f64>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Store positions, ignoring ones already stored for `(mmsi, timestamp)`.
    ///
    /// Returns the number of new rows.
    async fn insert_positions(&self, positions: &[Position]) -> Result<u64, TrackerError>;

    /// Store a crossing unless one exists for `(mmsi, crossing_time)`.
    ///
    /// Returns whether a new row was created.
    async fn insert_crossing(&self, event: &CrossingEvent) -> Result<bool, TrackerError>;

    /// Store observations, ignoring ones already stored for `(timestamp, station)`.
    async fn insert_weather(&self, observations: &[WeatherObservation])
        -> Result<u64, TrackerError>;

    async fn ship(&self, mmsi: Mmsi) -> Result<Option<Ship>, TrackerError>;

    /// Insert the ship or refresh its name and type, leaving static columns alone.
    async fn upsert_ship_identity(&self, identity: &ShipIdentity) -> Result<(), TrackerError>;

    /// Record a registry lookup attempt for a ship without one.
    ///
    /// Static columns are written together with `ship_info_fetched_at`; a ship
    /// whose sentinel is already set is left untouched.
    async fn record_ship_info(
        &self,
        mmsi: Mmsi,
        info: Option<&VesselInfo>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), TrackerError>;

    /// All vessels with at least one stored position
    async fn vessel_ids(&self) -> Result<Vec<Mmsi>, TrackerError>;

    /// Stored positions of a vessel in timestamp order
    async fn positions_for(&self, mmsi: Mmsi) -> Result<Vec<Position>, TrackerError>;

    /// UTC dates having at least one position at or after `since`
    async fn position_dates_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeSet<NaiveDate>, TrackerError>;

    /// Observations with `window.from <= timestamp < window.to`, oldest first
    async fn weather_in(&self, window: TimeWindow) -> Result<Vec<WeatherObservation>, TrackerError>;

    /// First crossing of a vessel strictly after `after`
    async fn earliest_crossing_after(
        &self,
        mmsi: Mmsi,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TrackerError>;

    async fn crossings_for(&self, mmsi: Mmsi) -> Result<Vec<CrossingEvent>, TrackerError>;

    /// Replace every stored waiting event of a vessel.
    async fn replace_waiting_events(
        &self,
        mmsi: Mmsi,
        events: &[WaitingEvent],
    ) -> Result<(), TrackerError>;

    /// Waiting events whose `start_time` falls in the window
    async fn waiting_events_in(&self, window: TimeWindow) -> Result<Vec<WaitingEvent>, TrackerError>;

    /// Number of crossings per UTC date, oldest date first
    async fn crossing_counts_by_date(&self) -> Result<Vec<(NaiveDate, i64)>, TrackerError>;

    /// Insert or overwrite the row for `stat.date`.
    async fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<(), TrackerError>;

    async fn daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>, TrackerError>;

    async fn totals(&self) -> Result<StoreTotals, TrackerError>;
}
