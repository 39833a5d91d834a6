// src/database/memory.rs
use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use super::{Storage, StoreTotals};
use crate::errors::TrackerError;
use crate::models::{
    CrossingEvent, DailyStat, Mmsi, Position, Ship, ShipIdentity, TimeWindow, VesselInfo,
    WaitingEvent, WeatherObservation,
};

#[derive(Debug, Default)]
struct Tables {
    ships: HashMap<Mmsi, Ship>,
    positions: BTreeMap<(Mmsi, DateTime<Utc>), Position>,
    crossings: BTreeMap<(Mmsi, DateTime<Utc>), CrossingEvent>,
    weather: BTreeMap<(DateTime<Utc>, String), WeatherObservation>,
    waiting: BTreeMap<Mmsi, Vec<WaitingEvent>>,
    daily: BTreeMap<NaiveDate, DailyStat>,
}

/// In-process storage with the same uniqueness rules as the database
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn positions_of(
    positions: &BTreeMap<(Mmsi, DateTime<Utc>), Position>,
    mmsi: Mmsi,
) -> impl Iterator<Item = &Position> {
    positions
        .range((mmsi, DateTime::<Utc>::MIN_UTC)..=(mmsi, DateTime::<Utc>::MAX_UTC))
        .map(|(_, p)| p)
}

fn crossings_of(
    crossings: &BTreeMap<(Mmsi, DateTime<Utc>), CrossingEvent>,
    mmsi: Mmsi,
) -> impl Iterator<Item = &CrossingEvent> {
    crossings
        .range((mmsi, DateTime::<Utc>::MIN_UTC)..=(mmsi, DateTime::<Utc>::MAX_UTC))
        .map(|(_, c)| c)
}

#[async_trait]
impl Storage for MemoryStore {
    async fn insert_positions(&self, positions: &[Position]) -> Result<u64, TrackerError> {
        let mut tables = self.tables.lock().await;
        let mut inserted = 0;
        for position in positions {
            let key = (position.mmsi, position.timestamp);
            if !tables.positions.contains_key(&key) {
                tables.positions.insert(key, position.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_crossing(&self, event: &CrossingEvent) -> Result<bool, TrackerError> {
        let mut tables = self.tables.lock().await;
        let key = (event.mmsi, event.crossing_time);
        if tables.crossings.contains_key(&key) {
            return Ok(false);
        }
        tables.crossings.insert(key, event.clone());
        Ok(true)
    }

    async fn insert_weather(
        &self,
        observations: &[WeatherObservation],
    ) -> Result<u64, TrackerError> {
        let mut tables = self.tables.lock().await;
        let mut inserted = 0;
        for observation in observations {
            let key = (observation.timestamp, observation.station_id.clone());
            if !tables.weather.contains_key(&key) {
                tables.weather.insert(key, observation.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn ship(&self, mmsi: Mmsi) -> Result<Option<Ship>, TrackerError> {
        Ok(self.tables.lock().await.ships.get(&mmsi).cloned())
    }

    async fn upsert_ship_identity(&self, identity: &ShipIdentity) -> Result<(), TrackerError> {
        let mut tables = self.tables.lock().await;
        tables
            .ships
            .entry(identity.mmsi)
            .and_modify(|ship| {
                ship.name = identity.name.clone();
                ship.type_code = identity.type_code;
                ship.type_name = identity.type_name.clone();
            })
            .or_insert_with(|| Ship {
                mmsi: identity.mmsi,
                name: identity.name.clone(),
                type_code: identity.type_code,
                type_name: identity.type_name.clone(),
                destination: None,
                callsign: None,
                length: None,
                width: None,
                ship_info_fetched_at: None,
            });
        Ok(())
    }

    async fn record_ship_info(
        &self,
        mmsi: Mmsi,
        info: Option<&VesselInfo>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        let mut tables = self.tables.lock().await;
        if let Some(ship) = tables.ships.get_mut(&mmsi) {
            if ship.ship_info_fetched_at.is_none() {
                ship.length = info.and_then(|i| i.length);
                ship.width = info.and_then(|i| i.width);
                ship.callsign = info.and_then(|i| i.callsign.clone());
                ship.ship_info_fetched_at = Some(fetched_at);
            }
        }
        Ok(())
    }

    async fn vessel_ids(&self) -> Result<Vec<Mmsi>, TrackerError> {
        let tables = self.tables.lock().await;
        let ids: BTreeSet<Mmsi> = tables.positions.keys().map(|(mmsi, _)| *mmsi).collect();
        Ok(ids.into_iter().collect())
    }

    async fn positions_for(&self, mmsi: Mmsi) -> Result<Vec<Position>, TrackerError> {
        let tables = self.tables.lock().await;
        let positions: Vec<Position> = positions_of(&tables.positions, mmsi).cloned().collect();
        Ok(positions)
    }

    async fn position_dates_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeSet<NaiveDate>, TrackerError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .positions
            .keys()
            .filter(|(_, timestamp)| *timestamp >= since)
            .map(|(_, timestamp)| timestamp.date_naive())
            .collect())
    }

    async fn weather_in(&self, window: TimeWindow) -> Result<Vec<WeatherObservation>, TrackerError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .weather
            .values()
            .filter(|o| window.contains(o.timestamp))
            .cloned()
            .collect())
    }

    async fn earliest_crossing_after(
        &self,
        mmsi: Mmsi,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TrackerError> {
        let tables = self.tables.lock().await;
        let earliest = crossings_of(&tables.crossings, mmsi)
            .map(|c| c.crossing_time)
            .find(|t| *t > after);
        Ok(earliest)
    }

    async fn crossings_for(&self, mmsi: Mmsi) -> Result<Vec<CrossingEvent>, TrackerError> {
        let tables = self.tables.lock().await;
        let crossings: Vec<CrossingEvent> = crossings_of(&tables.crossings, mmsi).cloned().collect();
        Ok(crossings)
    }

    async fn replace_waiting_events(
        &self,
        mmsi: Mmsi,
        events: &[WaitingEvent],
    ) -> Result<(), TrackerError> {
        let mut tables = self.tables.lock().await;
        if events.is_empty() {
            tables.waiting.remove(&mmsi);
        } else {
            tables.waiting.insert(mmsi, events.to_vec());
        }
        Ok(())
    }

    async fn waiting_events_in(&self, window: TimeWindow) -> Result<Vec<WaitingEvent>, TrackerError> {
        let tables = self.tables.lock().await;
        let mut events: Vec<WaitingEvent> = tables
            .waiting
            .values()
            .flatten()
            .filter(|e| window.contains(e.start_time))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    async fn crossing_counts_by_date(&self) -> Result<Vec<(NaiveDate, i64)>, TrackerError> {
        let tables = self.tables.lock().await;
        let mut counts: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for crossing in tables.crossings.values() {
            *counts.entry(crossing.crossing_time.date_naive()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<(), TrackerError> {
        self.tables
            .lock()
            .await
            .daily
            .insert(stat.date, stat.clone());
        Ok(())
    }

    async fn daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>, TrackerError> {
        Ok(self.tables.lock().await.daily.get(&date).cloned())
    }

    async fn totals(&self) -> Result<StoreTotals, TrackerError> {
        let tables = self.tables.lock().await;
        let with_positions: BTreeSet<Mmsi> = tables.positions.keys().map(|(m, _)| *m).collect();
        let crossed: BTreeSet<Mmsi> = tables.crossings.keys().map(|(m, _)| *m).collect();
        let durations: Vec<i64> = tables
            .waiting
            .values()
            .flatten()
            .map(|e| e.duration_minutes)
            .collect();
        let avg_waiting_minutes = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
        };

        Ok(StoreTotals {
            ships_with_positions: with_positions.len() as i64,
            ships_crossed: crossed.len() as i64,
            crossings: tables.crossings.len() as i64,
            waiting_events: durations.len() as i64,
            avg_waiting_minutes,
        })
    }
}
