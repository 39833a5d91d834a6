use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};

use stadthavet_tracker::{
    barentswatch::TrackSource,
    config::{AppConfig, BarentswatchConfig, DatabaseConfig, RunConfig},
    database::{MemoryStore, Storage},
    errors::TrackerError,
    models::{GeoPoint, Mmsi, TimeWindow, TrackPoint, VesselInfo, WeatherObservation, Zone},
    pipeline::Pipeline,
    registry::VesselRegistry,
    weather::WeatherSource,
};

const WAITING_SHIP: u32 = 257_898_600;
const BROKEN_SHIP: u32 = 231_234_000;
const SLOW_SHIP: u32 = 219_000_001;

fn mmsi(value: u32) -> Mmsi {
    Mmsi::try_from(value).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 11, hour, minute, 0).unwrap()
}

fn point(time: DateTime<Utc>, lon: f64, lat: f64, sog: f64) -> TrackPoint {
    TrackPoint {
        msgtime: Some(time.to_rfc3339()),
        latitude: Some(lat),
        longitude: Some(lon),
        speed_over_ground: Some(sog),
        name: Some("KONG HARALD".to_string()),
        ship_type: Some(60),
        ..Default::default()
    }
}

/// Waits in the east zone from 06:00 to 08:30, then rounds Stad westbound
fn waiting_track() -> Vec<TrackPoint> {
    vec![
        point(at(6, 0), 5.3, 62.25, 0.5),
        point(at(7, 0), 5.3, 62.25, 0.4),
        point(at(8, 0), 5.3, 62.25, 0.6),
        point(at(8, 30), 5.3, 62.25, 8.0),
        point(at(9, 0), 4.1, 62.35, 12.0),
    ]
}

struct FakeTracks {
    listed: Vec<Mmsi>,
    tracks: HashMap<Mmsi, Vec<TrackPoint>>,
    track_calls: AtomicUsize,
}

impl FakeTracks {
    fn new(listed: &[u32]) -> Self {
        Self {
            listed: listed.iter().map(|&value| mmsi(value)).collect(),
            tracks: HashMap::from([(mmsi(WAITING_SHIP), waiting_track())]),
            track_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TrackSource for FakeTracks {
    async fn vessels_in_area(&self, _window: TimeWindow) -> Result<Vec<Mmsi>, TrackerError> {
        Ok(self.listed.clone())
    }

    async fn track(&self, mmsi: Mmsi, _window: TimeWindow) -> Result<Vec<TrackPoint>, TrackerError> {
        self.track_calls.fetch_add(1, Ordering::SeqCst);
        if mmsi.value() == SLOW_SHIP {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        self.tracks
            .get(&mmsi)
            .cloned()
            .ok_or_else(|| TrackerError::ApiError {
                service: "fake",
                status: 500,
                message: "no track".to_string(),
            })
    }
}

struct FakeWeather {
    delay: Duration,
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn observations(
        &self,
        _window: TimeWindow,
    ) -> Result<Vec<WeatherObservation>, TrackerError> {
        tokio::time::sleep(self.delay).await;
        let observation = |time: DateTime<Utc>, wind: f64| WeatherObservation {
            timestamp: time,
            station_id: "SN59800".to_string(),
            wind_speed: Some(wind),
            wind_gust: Some(wind + 5.0),
            ..Default::default()
        };
        Ok(vec![observation(at(7, 0), 12.0), observation(at(8, 0), 9.0)])
    }
}

#[derive(Default)]
struct FakeRegistry {
    lookups: AtomicUsize,
}

#[async_trait]
impl VesselRegistry for FakeRegistry {
    async fn lookup(&self, _mmsi: Mmsi) -> Result<Option<VesselInfo>, TrackerError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Some(VesselInfo {
            length: Some(123.5),
            width: Some(19.2),
            callsign: Some("LLZW".to_string()),
        }))
    }
}

fn config() -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        barentswatch: BarentswatchConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            auth_url: "http://localhost/token".to_string(),
            mmsi_area_url: "http://localhost/mmsiinarea".to_string(),
            track_url: "http://localhost/tracks".to_string(),
            area_nw: GeoPoint::new(4.0, 62.75),
            area_se: GeoPoint::new(5.5, 61.85),
            timeout: Duration::from_secs(30),
        },
        weather: Default::default(),
        registry: Default::default(),
        corridor: Default::default(),
        detection: Default::default(),
        schedule: Default::default(),
        run: RunConfig {
            max_concurrent_vessels: 2,
            vessel_timeout: Duration::from_secs(60),
            deadline: Duration::from_secs(3600),
        },
    }
}

fn pipeline(store: Arc<MemoryStore>) -> Pipeline {
    Pipeline::new(
        &config(),
        store,
        Arc::new(FakeTracks::new(&[WAITING_SHIP, BROKEN_SHIP, SLOW_SHIP])),
        Arc::new(FakeWeather {
            delay: Duration::ZERO,
        }),
        Some(Arc::new(FakeRegistry::default()) as Arc<dyn VesselRegistry>),
    )
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 25, 12, 0, 0).unwrap()
}

#[tokio::test(start_paused = true)]
async fn full_run_detects_crossing_and_waiting() -> Result<(), TrackerError> {
    let store = Arc::new(MemoryStore::new());
    let summary = pipeline(store.clone()).run(now()).await?;

    let horizon = Utc.with_ymd_and_hms(2024, 10, 11, 0, 0, 0).unwrap();
    assert_eq!(summary.window.from, horizon);
    assert_eq!(summary.window.to, horizon + TimeDelta::hours(48));
    assert_eq!(summary.vessels_listed, 3);
    assert_eq!(summary.vessels_ingested, 1);
    assert_eq!(summary.vessels_skipped, 2);
    assert_eq!(summary.positions_stored, 5);
    assert_eq!(summary.crossings_detected, 1);
    assert_eq!(summary.waiting_events, 1);
    assert_eq!(summary.weather_observations, 2);
    assert_eq!(summary.days_aggregated, 1);

    let ship = store.ship(mmsi(WAITING_SHIP)).await?.unwrap();
    assert_eq!(ship.name, "KONG HARALD");
    assert_eq!(ship.length, Some(123.5));

    let day = NaiveDate::from_ymd_opt(2024, 10, 11).unwrap();
    let events = store.waiting_events_in(TimeWindow::for_date(day)).await?;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.zone, Zone::East);
    assert_eq!(event.start_time, at(6, 0));
    assert_eq!(event.end_time, at(8, 30));
    assert_eq!(event.duration_minutes, 150);
    assert!(event.crossed);
    assert_eq!(event.crossing_time, Some(at(9, 0)));

    let stat = store.daily_stat(day).await?.unwrap();
    assert_eq!(stat.total_crossings, 1);
    assert_eq!(stat.avg_wind_speed, Some(10.5));
    assert_eq!(stat.max_wind_gust, Some(17.0));
    assert_eq!(stat.waiting_events, 1);
    assert_eq!(stat.avg_waiting_minutes, Some(150.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rerun_does_not_duplicate() -> Result<(), TrackerError> {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(store.clone());

    pipeline.run(now()).await?;
    let second = pipeline.run(now()).await?;

    // The first run filled 2024-10-11, so the next gap is backfilled
    assert_eq!(
        second.window.from,
        Utc.with_ymd_and_hms(2024, 10, 12, 0, 0, 0).unwrap()
    );
    assert_eq!(second.crossings_detected, 0);
    assert_eq!(second.weather_observations, 0);
    assert_eq!(second.waiting_events, 1);

    assert_eq!(store.positions_for(mmsi(WAITING_SHIP)).await?.len(), 5);
    assert_eq!(store.crossings_for(mmsi(WAITING_SHIP)).await?.len(), 1);

    let totals = store.totals().await?;
    assert_eq!(totals.ships_with_positions, 1);
    assert_eq!(totals.ships_crossed, 1);
    assert_eq!(totals.crossings, 1);
    assert_eq!(totals.waiting_events, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_vessel_is_ingested_once() -> Result<(), TrackerError> {
    let store = Arc::new(MemoryStore::new());
    let tracks = Arc::new(FakeTracks::new(&[WAITING_SHIP, WAITING_SHIP]));
    let registry = Arc::new(FakeRegistry::default());
    let pipeline = Pipeline::new(
        &config(),
        store.clone(),
        tracks.clone(),
        Arc::new(FakeWeather {
            delay: Duration::ZERO,
        }),
        Some(registry.clone() as Arc<dyn VesselRegistry>),
    );

    let summary = pipeline.run(now()).await?;

    assert_eq!(summary.vessels_listed, 1);
    assert_eq!(summary.vessels_ingested, 1);
    assert_eq!(summary.vessels_skipped, 0);
    assert_eq!(summary.crossings_detected, 1);
    assert_eq!(tracks.track_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(store.crossings_for(mmsi(WAITING_SHIP)).await?.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn run_deadline_covers_weather_stage() -> Result<(), TrackerError> {
    let store = Arc::new(MemoryStore::new());
    let mut config = config();
    config.run = RunConfig {
        max_concurrent_vessels: 2,
        vessel_timeout: Duration::from_secs(30),
        deadline: Duration::from_secs(60),
    };
    let pipeline = Pipeline::new(
        &config,
        store.clone(),
        Arc::new(FakeTracks::new(&[WAITING_SHIP, SLOW_SHIP])),
        Arc::new(FakeWeather {
            delay: Duration::from_secs(600),
        }),
        None,
    );

    let start = tokio::time::Instant::now();
    let summary = pipeline.run(now()).await?;

    assert!(start.elapsed() < Duration::from_secs(600));
    assert_eq!(summary.vessels_ingested, 1);
    assert_eq!(summary.vessels_skipped, 1);
    assert_eq!(summary.weather_observations, 0);
    assert!(store.weather_in(summary.window).await?.is_empty());
    assert_eq!(store.positions_for(mmsi(WAITING_SHIP)).await?.len(), 5);
    Ok(())
}
