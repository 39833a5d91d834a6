// src/database/models.rs
use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::TrackerError;
use crate::models::{
    CrossingEvent, DailyStat, Mmsi, Position, Ship, WaitingEvent, WeatherObservation,
};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PositionRow {
    mmsi: i64,
    timestamp: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    sog: Option<f64>,
    cog: Option<f64>,
    heading: Option<i32>,
}

impl TryFrom<PositionRow> for Position {
    type Error = TrackerError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Position {
            mmsi: Mmsi::try_from(row.mmsi)?,
            timestamp: row.timestamp,
            lat: row.latitude,
            lon: row.longitude,
            sog: row.sog,
            cog: row.cog,
            heading: row.heading.and_then(|h| u16::try_from(h).ok()),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ShipRow {
    mmsi: i64,
    name: String,
    ship_type: Option<i16>,
    ship_type_name: String,
    destination: Option<String>,
    callsign: Option<String>,
    length: Option<f64>,
    width: Option<f64>,
    ship_info_fetched_at: Option<DateTime<Utc>>,
}

impl TryFrom<ShipRow> for Ship {
    type Error = TrackerError;

    fn try_from(row: ShipRow) -> Result<Self, Self::Error> {
        Ok(Ship {
            mmsi: Mmsi::try_from(row.mmsi)?,
            name: row.name,
            type_code: row.ship_type.and_then(|t| u8::try_from(t).ok()),
            type_name: row.ship_type_name,
            destination: row.destination,
            callsign: row.callsign,
            length: row.length,
            width: row.width,
            ship_info_fetched_at: row.ship_info_fetched_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct CrossingRow {
    mmsi: i64,
    crossing_time: DateTime<Utc>,
    crossing_lat: f64,
    crossing_lon: f64,
    direction: String,
}

impl TryFrom<CrossingRow> for CrossingEvent {
    type Error = TrackerError;

    fn try_from(row: CrossingRow) -> Result<Self, Self::Error> {
        Ok(CrossingEvent {
            mmsi: Mmsi::try_from(row.mmsi)?,
            crossing_time: row.crossing_time,
            lat: row.crossing_lat,
            lon: row.crossing_lon,
            direction: row.direction.parse()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct WeatherRow {
    timestamp: DateTime<Utc>,
    station: String,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
    wind_gust: Option<f64>,
    wave_height: Option<f64>,
    air_temperature: Option<f64>,
    pressure: Option<f64>,
}

impl From<WeatherRow> for WeatherObservation {
    fn from(row: WeatherRow) -> Self {
        WeatherObservation {
            timestamp: row.timestamp,
            station_id: row.station,
            wind_speed: row.wind_speed,
            wind_direction: row.wind_direction,
            wind_gust: row.wind_gust,
            wave_height: row.wave_height,
            air_temperature: row.air_temperature,
            pressure: row.pressure,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct WaitingRow {
    mmsi: i64,
    zone: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_minutes: i64,
    avg_speed: Option<f64>,
    crossed: bool,
    crossing_time: Option<DateTime<Utc>>,
}

impl TryFrom<WaitingRow> for WaitingEvent {
    type Error = TrackerError;

    fn try_from(row: WaitingRow) -> Result<Self, Self::Error> {
        Ok(WaitingEvent {
            mmsi: Mmsi::try_from(row.mmsi)?,
            zone: row.zone.parse()?,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_minutes: row.duration_minutes,
            avg_speed: row.avg_speed,
            crossed: row.crossed,
            crossing_time: row.crossing_time,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct DailyStatRow {
    date: NaiveDate,
    total_crossings: i64,
    avg_wind_speed: Option<f64>,
    max_wind_speed: Option<f64>,
    max_wind_gust: Option<f64>,
    avg_wave_height: Option<f64>,
    waiting_events: i64,
    avg_waiting_minutes: Option<f64>,
}

impl From<DailyStatRow> for DailyStat {
    fn from(row: DailyStatRow) -> Self {
        DailyStat {
            date: row.date,
            total_crossings: row.total_crossings,
            avg_wind_speed: row.avg_wind_speed,
            max_wind_speed: row.max_wind_speed,
            max_wind_gust: row.max_wind_gust,
            avg_wave_height: row.avg_wave_height,
            waiting_events: row.waiting_events,
            avg_waiting_minutes: row.avg_waiting_minutes,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TotalsRow {
    pub ships_with_positions: i64,
    pub ships_crossed: i64,
    pub crossings: i64,
    pub waiting_events: i64,
    pub avg_waiting_minutes: Option<f64>,
}
