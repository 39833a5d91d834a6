// src/database/postgres.rs
use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use super::models::{
    CrossingRow, DailyStatRow, PositionRow, ShipRow, TotalsRow, WaitingRow, WeatherRow,
};
use super::{Storage, StoreTotals};
use crate::config::DatabaseConfig;
use crate::errors::TrackerError;
use crate::models::{
    CrossingEvent, DailyStat, Mmsi, Position, Ship, ShipIdentity, TimeWindow, VesselInfo,
    WaitingEvent, WeatherObservation,
};

/// Postgres storage
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Wrap an existing pool, applying pending migrations
    pub async fn new(pool: PgPool) -> Result<Self, TrackerError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Connect to the configured database
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, TrackerError> {
        info!(
            "Connecting to database (max_connections={})",
            config.max_connections
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Self::new(pool).await
    }
}

#[async_trait]
impl Storage for Database {
    async fn insert_positions(&self, positions: &[Position]) -> Result<u64, TrackerError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for position in positions {
            let result = sqlx::query(
                "INSERT INTO positions (mmsi, timestamp, latitude, longitude, sog, cog, heading)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (mmsi, timestamp) DO NOTHING",
            )
            .bind(position.mmsi.value() as i64)
            .bind(position.timestamp)
            .bind(position.lat)
            .bind(position.lon)
            .bind(position.sog)
            .bind(position.cog)
            .bind(position.heading.map(i32::from))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!("Inserted {}/{} positions", inserted, positions.len());
        Ok(inserted)
    }

    async fn insert_crossing(&self, event: &CrossingEvent) -> Result<bool, TrackerError> {
        let result = sqlx::query(
            "INSERT INTO crossings (mmsi, crossing_time, crossing_lat, crossing_lon, direction)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (mmsi, crossing_time) DO NOTHING",
        )
        .bind(event.mmsi.value() as i64)
        .bind(event.crossing_time)
        .bind(event.lat)
        .bind(event.lon)
        .bind(event.direction.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_weather(
        &self,
        observations: &[WeatherObservation],
    ) -> Result<u64, TrackerError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for observation in observations {
            let result = sqlx::query(
                "INSERT INTO weather (
                    timestamp, station, wind_speed, wind_direction, wind_gust,
                    wave_height, air_temperature, pressure
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (timestamp, station) DO NOTHING",
            )
            .bind(observation.timestamp)
            .bind(&observation.station_id)
            .bind(observation.wind_speed)
            .bind(observation.wind_direction)
            .bind(observation.wind_gust)
            .bind(observation.wave_height)
            .bind(observation.air_temperature)
            .bind(observation.pressure)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn ship(&self, mmsi: Mmsi) -> Result<Option<Ship>, TrackerError> {
        let row: Option<ShipRow> = sqlx::query_as(
            "SELECT mmsi, name, ship_type, ship_type_name, destination, callsign,
                length, width, ship_info_fetched_at
            FROM ships WHERE mmsi = $1",
        )
        .bind(mmsi.value() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Ship::try_from).transpose()
    }

    async fn upsert_ship_identity(&self, identity: &ShipIdentity) -> Result<(), TrackerError> {
        sqlx::query(
            "INSERT INTO ships (mmsi, name, ship_type, ship_type_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (mmsi) DO UPDATE
            SET name = EXCLUDED.name,
                ship_type = EXCLUDED.ship_type,
                ship_type_name = EXCLUDED.ship_type_name",
        )
        .bind(identity.mmsi.value() as i64)
        .bind(&identity.name)
        .bind(identity.type_code.map(i16::from))
        .bind(&identity.type_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_ship_info(
        &self,
        mmsi: Mmsi,
        info: Option<&VesselInfo>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        sqlx::query(
            "UPDATE ships
            SET length = $2, width = $3, callsign = $4, ship_info_fetched_at = $5
            WHERE mmsi = $1 AND ship_info_fetched_at IS NULL",
        )
        .bind(mmsi.value() as i64)
        .bind(info.and_then(|i| i.length))
        .bind(info.and_then(|i| i.width))
        .bind(info.and_then(|i| i.callsign.as_deref()))
        .bind(fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn vessel_ids(&self) -> Result<Vec<Mmsi>, TrackerError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT mmsi FROM positions ORDER BY mmsi")
            .fetch_all(&self.pool)
            .await?;

        ids.into_iter().map(Mmsi::try_from).collect()
    }

    async fn positions_for(&self, mmsi: Mmsi) -> Result<Vec<Position>, TrackerError> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            "SELECT mmsi, timestamp, latitude, longitude, sog, cog, heading
            FROM positions
            WHERE mmsi = $1
            ORDER BY timestamp",
        )
        .bind(mmsi.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    async fn position_dates_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeSet<NaiveDate>, TrackerError> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            "SELECT DISTINCT (timestamp AT TIME ZONE 'UTC')::date AS date
            FROM positions
            WHERE timestamp >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates.into_iter().collect())
    }

    async fn weather_in(&self, window: TimeWindow) -> Result<Vec<WeatherObservation>, TrackerError> {
        let rows: Vec<WeatherRow> = sqlx::query_as(
            "SELECT timestamp, station, wind_speed, wind_direction, wind_gust,
                wave_height, air_temperature, pressure
            FROM weather
            WHERE timestamp >= $1 AND timestamp < $2
            ORDER BY timestamp",
        )
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WeatherObservation::from).collect())
    }

    async fn earliest_crossing_after(
        &self,
        mmsi: Mmsi,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TrackerError> {
        let crossing_time: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT crossing_time FROM crossings
            WHERE mmsi = $1 AND crossing_time > $2
            ORDER BY crossing_time
            LIMIT 1",
        )
        .bind(mmsi.value() as i64)
        .bind(after)
        .fetch_optional(&self.pool)
        .await?;

        Ok(crossing_time)
    }

    async fn crossings_for(&self, mmsi: Mmsi) -> Result<Vec<CrossingEvent>, TrackerError> {
        let rows: Vec<CrossingRow> = sqlx::query_as(
            "SELECT mmsi, crossing_time, crossing_lat, crossing_lon, direction
            FROM crossings
            WHERE mmsi = $1
            ORDER BY crossing_time",
        )
        .bind(mmsi.value() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CrossingEvent::try_from).collect()
    }

    async fn replace_waiting_events(
        &self,
        mmsi: Mmsi,
        events: &[WaitingEvent],
    ) -> Result<(), TrackerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM waiting_events WHERE mmsi = $1")
            .bind(mmsi.value() as i64)
            .execute(&mut *tx)
            .await?;

        for event in events {
            sqlx::query(
                "INSERT INTO waiting_events (
                    mmsi, zone, start_time, end_time, duration_minutes,
                    avg_speed, crossed, crossing_time
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.mmsi.value() as i64)
            .bind(event.zone.as_str())
            .bind(event.start_time)
            .bind(event.end_time)
            .bind(event.duration_minutes)
            .bind(event.avg_speed)
            .bind(event.crossed)
            .bind(event.crossing_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn waiting_events_in(&self, window: TimeWindow) -> Result<Vec<WaitingEvent>, TrackerError> {
        let rows: Vec<WaitingRow> = sqlx::query_as(
            "SELECT mmsi, zone, start_time, end_time, duration_minutes,
                avg_speed, crossed, crossing_time
            FROM waiting_events
            WHERE start_time >= $1 AND start_time < $2
            ORDER BY start_time",
        )
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WaitingEvent::try_from).collect()
    }

    async fn crossing_counts_by_date(&self) -> Result<Vec<(NaiveDate, i64)>, TrackerError> {
        let counts: Vec<(NaiveDate, i64)> = sqlx::query_as(
            "SELECT (crossing_time AT TIME ZONE 'UTC')::date AS date, COUNT(*) AS crossings
            FROM crossings
            GROUP BY 1
            ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<(), TrackerError> {
        sqlx::query(
            "INSERT INTO daily_stats (
                date, total_crossings, avg_wind_speed, max_wind_speed, max_wind_gust,
                avg_wave_height, waiting_events, avg_waiting_minutes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (date) DO UPDATE
            SET total_crossings = EXCLUDED.total_crossings,
                avg_wind_speed = EXCLUDED.avg_wind_speed,
                max_wind_speed = EXCLUDED.max_wind_speed,
                max_wind_gust = EXCLUDED.max_wind_gust,
                avg_wave_height = EXCLUDED.avg_wave_height,
                waiting_events = EXCLUDED.waiting_events,
                avg_waiting_minutes = EXCLUDED.avg_waiting_minutes",
        )
        .bind(stat.date)
        .bind(stat.total_crossings)
        .bind(stat.avg_wind_speed)
        .bind(stat.max_wind_speed)
        .bind(stat.max_wind_gust)
        .bind(stat.avg_wave_height)
        .bind(stat.waiting_events)
        .bind(stat.avg_waiting_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn daily_stat(&self, date: NaiveDate) -> Result<Option<DailyStat>, TrackerError> {
        let row: Option<DailyStatRow> = sqlx::query_as(
            "SELECT date, total_crossings, avg_wind_speed, max_wind_speed, max_wind_gust,
                avg_wave_height, waiting_events, avg_waiting_minutes
            FROM daily_stats WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DailyStat::from))
    }

    async fn totals(&self) -> Result<StoreTotals, TrackerError> {
        let row: TotalsRow = sqlx::query_as(
            "SELECT
                (SELECT COUNT(DISTINCT mmsi) FROM positions) AS ships_with_positions,
                (SELECT COUNT(DISTINCT mmsi) FROM crossings) AS ships_crossed,
                (SELECT COUNT(*) FROM crossings) AS crossings,
                (SELECT COUNT(*) FROM waiting_events) AS waiting_events,
                (SELECT AVG(duration_minutes)::DOUBLE PRECISION FROM waiting_events)
                    AS avg_waiting_minutes",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreTotals {
            ships_with_positions: row.ships_with_positions,
            ships_crossed: row.ships_crossed,
            crossings: row.crossings,
            waiting_events: row.waiting_events,
            avg_waiting_minutes: row.avg_waiting_minutes,
        })
    }
}
