//! Waiting zone (loitering) detection.
//!
//! A vessel is waiting while it is slow inside one of the two zones. The
//! interval closes at the first position that no longer qualifies; an
//! interval still open at the end of the track is not reported.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::config::{CorridorConfig, DetectionConfig, ZoneConfig};
use crate::database::Storage;
use crate::errors::TrackerError;
use crate::geo::in_circular_zone;
use crate::models::{Mmsi, Position, TimeWindow, WaitingEvent, WeatherObservation, Zone};

/// Per-vessel loitering state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WaitingState {
    #[default]
    Idle,
    Waiting {
        zone: Zone,
        start_time: DateTime<Utc>,
        speeds: Vec<f64>,
    },
}

/// Waiting interval closed by a non-qualifying position
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedInterval {
    pub zone: Zone,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub speeds: Vec<f64>,
}

impl ClosedInterval {
    /// Whole minutes between start and end
    pub fn duration_minutes(&self) -> Result<i64, TrackerError> {
        if self.end_time <= self.start_time {
            return Err(TrackerError::InvalidInterval(format!(
                "waiting interval ends at {} before it starts at {}",
                self.end_time, self.start_time
            )));
        }
        Ok((self.end_time - self.start_time).num_minutes())
    }

    /// Mean speed sample, 0 without samples
    pub fn avg_speed(&self) -> f64 {
        if self.speeds.is_empty() {
            0.0
        } else {
            self.speeds.iter().sum::<f64>() / self.speeds.len() as f64
        }
    }
}

impl WaitingState {
    fn start(zone: Zone, position: &Position) -> Self {
        WaitingState::Waiting {
            zone,
            start_time: position.timestamp,
            speeds: position.sog.into_iter().collect(),
        }
    }

    /// Advance with the next position.
    ///
    /// `qualifying` is the zone the position waits in, or `None` when the
    /// vessel is outside both zones or too fast.
    pub fn step(
        self,
        position: &Position,
        qualifying: Option<Zone>,
    ) -> (WaitingState, Option<ClosedInterval>) {
        match (self, qualifying) {
            (WaitingState::Idle, None) => (WaitingState::Idle, None),
            (WaitingState::Idle, Some(zone)) => (Self::start(zone, position), None),
            (
                WaitingState::Waiting {
                    zone,
                    start_time,
                    mut speeds,
                },
                Some(next_zone),
            ) if next_zone == zone => {
                speeds.extend(position.sog);
                (
                    WaitingState::Waiting {
                        zone,
                        start_time,
                        speeds,
                    },
                    None,
                )
            }
            // Moving to the other zone restarts the interval
            (WaitingState::Waiting { .. }, Some(next_zone)) => {
                (Self::start(next_zone, position), None)
            }
            (
                WaitingState::Waiting {
                    zone,
                    start_time,
                    speeds,
                },
                None,
            ) => (
                WaitingState::Idle,
                Some(ClosedInterval {
                    zone,
                    start_time,
                    end_time: position.timestamp,
                    speeds,
                }),
            ),
        }
    }
}

/// Mean and maximum wind speed over a set of observations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSummary {
    pub avg: f64,
    pub max: f64,
}

impl WindSummary {
    /// `None` when no observation carries a wind speed
    pub fn from_observations(observations: &[WeatherObservation]) -> Option<Self> {
        let speeds: Vec<f64> = observations.iter().filter_map(|o| o.wind_speed).collect();
        if speeds.is_empty() {
            return None;
        }
        let max = speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = speeds.iter().sum::<f64>() / speeds.len() as f64;
        Some(Self { avg, max })
    }
}

/// Loitering detector for the two waiting zones
#[derive(Debug, Clone)]
pub struct WaitingZoneDetector {
    east_zone: ZoneConfig,
    west_zone: ZoneConfig,
    detection: DetectionConfig,
}

impl WaitingZoneDetector {
    pub fn new(corridor: &CorridorConfig, detection: &DetectionConfig) -> Self {
        Self {
            east_zone: corridor.east_zone,
            west_zone: corridor.west_zone,
            detection: detection.clone(),
        }
    }

    /// Zone a position is waiting in, if any.
    ///
    /// Unknown speed counts as slow. The east zone is checked first.
    pub fn classify(&self, position: &Position) -> Option<Zone> {
        let slow = position
            .sog
            .map_or(true, |sog| sog < self.detection.loitering_speed_threshold);
        if !slow {
            return None;
        }

        let inside = |zone: &ZoneConfig| {
            in_circular_zone(
                position.lat,
                position.lon,
                zone.center_lat,
                zone.center_lon,
                zone.radius_km,
            )
        };
        if inside(&self.east_zone) {
            Some(Zone::East)
        } else if inside(&self.west_zone) {
            Some(Zone::West)
        } else {
            None
        }
    }

    /// Closed waiting intervals of one vessel's track, in time order
    pub fn intervals(&self, positions: &[Position]) -> Vec<ClosedInterval> {
        let mut ordered: Vec<&Position> = positions.iter().collect();
        ordered.sort_by_key(|p| p.timestamp);

        let mut state = WaitingState::Idle;
        let mut closed = Vec::new();
        for position in ordered {
            let (next, interval) = state.step(position, self.classify(position));
            state = next;
            closed.extend(interval);
        }
        closed
    }

    /// Turn a closed interval into an event, or `None` when it is too short
    /// or the weather during it was not bad enough.
    pub async fn evaluate(
        &self,
        mmsi: Mmsi,
        interval: &ClosedInterval,
        store: &dyn Storage,
    ) -> Result<Option<WaitingEvent>, TrackerError> {
        let duration_minutes = interval.duration_minutes()?;
        if duration_minutes < self.detection.loitering_time_threshold {
            return Ok(None);
        }

        if self.detection.require_bad_weather {
            let window = TimeWindow::new(interval.start_time, interval.end_time)?;
            let observations: Vec<WeatherObservation> = store
                .weather_in(window)
                .await?
                .into_iter()
                .filter(|o| o.timestamp > interval.start_time)
                .collect();

            match WindSummary::from_observations(&observations) {
                Some(wind) if wind.max >= self.detection.wind_threshold_ms => {
                    debug!(
                        "{} waited {} min in {} zone, wind avg {:.1} max {:.1} m/s",
                        mmsi, duration_minutes, interval.zone, wind.avg, wind.max
                    );
                }
                Some(wind) => {
                    debug!(
                        "{} waited {} min in {} zone but max wind was {:.1} m/s",
                        mmsi, duration_minutes, interval.zone, wind.max
                    );
                    return Ok(None);
                }
                None => {
                    debug!(
                        "{} waited {} min in {} zone without weather data",
                        mmsi, duration_minutes, interval.zone
                    );
                    return Ok(None);
                }
            }
        }

        let crossing_time = store
            .earliest_crossing_after(mmsi, interval.end_time)
            .await?;

        Ok(Some(WaitingEvent {
            mmsi,
            zone: interval.zone,
            start_time: interval.start_time,
            end_time: interval.end_time,
            duration_minutes,
            avg_speed: Some(interval.avg_speed()),
            crossed: crossing_time.is_some(),
            crossing_time,
        }))
    }

    /// Waiting events in one vessel's track.
    ///
    /// An interval that fails to evaluate is logged and skipped.
    pub async fn detect(
        &self,
        mmsi: Mmsi,
        positions: &[Position],
        store: &dyn Storage,
    ) -> Vec<WaitingEvent> {
        let mut events = Vec::new();
        for interval in self.intervals(positions) {
            match self.evaluate(mmsi, &interval, store).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => error!("Error processing waiting event for {}: {}", mmsi, e),
            }
        }
        events
    }

    /// Recompute and replace the stored waiting events of one vessel from its
    /// full position history.
    pub async fn rescan(&self, mmsi: Mmsi, store: &dyn Storage) -> Result<usize, TrackerError> {
        let positions = store.positions_for(mmsi).await?;
        let events = self.detect(mmsi, &positions, store).await;
        store.replace_waiting_events(mmsi, &events).await?;
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::{CrossingEvent, Direction};
    use chrono::{TimeDelta, TimeZone};

    const EAST: (f64, f64) = (62.25, 5.3);
    const WEST: (f64, f64) = (62.25, 4.2);
    const OPEN_SEA: (f64, f64) = (62.6, 4.8);

    fn mmsi() -> Mmsi {
        Mmsi::try_from(257_898_600u32).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 24, 6, 0, 0).unwrap()
    }

    fn at(minutes: i64, (lat, lon): (f64, f64), sog: Option<f64>) -> Position {
        Position {
            mmsi: mmsi(),
            timestamp: t0() + TimeDelta::minutes(minutes),
            lat,
            lon,
            sog,
            cog: None,
            heading: None,
        }
    }

    fn wind(minutes: i64, speed: f64) -> WeatherObservation {
        WeatherObservation {
            timestamp: t0() + TimeDelta::minutes(minutes),
            station_id: "SN59800".to_string(),
            wind_speed: Some(speed),
            ..Default::default()
        }
    }

    fn detector() -> WaitingZoneDetector {
        WaitingZoneDetector::new(&CorridorConfig::default(), &DetectionConfig::default())
    }

    /// Waits `minutes` in the east zone, then leaves at speed
    fn wait_then_leave(minutes: i64) -> Vec<Position> {
        vec![
            at(0, EAST, Some(0.0)),
            at(minutes / 2, EAST, Some(0.0)),
            at(minutes, OPEN_SEA, Some(12.0)),
        ]
    }

    #[test]
    fn classify_requires_slow_vessel_in_zone() {
        let d = detector();
        assert_eq!(d.classify(&at(0, EAST, Some(1.0))), Some(Zone::East));
        assert_eq!(d.classify(&at(0, WEST, None)), Some(Zone::West));
        assert_eq!(d.classify(&at(0, EAST, Some(3.0))), None);
        assert_eq!(d.classify(&at(0, OPEN_SEA, Some(0.0))), None);
    }

    #[test]
    fn overlapping_zones_resolve_to_east() {
        let corridor = CorridorConfig {
            west_zone: CorridorConfig::default().east_zone,
            ..CorridorConfig::default()
        };
        let d = WaitingZoneDetector::new(&corridor, &DetectionConfig::default());
        assert_eq!(d.classify(&at(0, EAST, Some(0.0))), Some(Zone::East));
    }

    #[test]
    fn state_machine_transitions() {
        let p0 = at(0, EAST, Some(1.0));
        let (state, closed) = WaitingState::Idle.step(&p0, Some(Zone::East));
        assert!(closed.is_none());
        assert_eq!(
            state,
            WaitingState::Waiting {
                zone: Zone::East,
                start_time: p0.timestamp,
                speeds: vec![1.0],
            }
        );

        let p1 = at(10, EAST, None);
        let (state, closed) = state.step(&p1, Some(Zone::East));
        assert!(closed.is_none());
        assert_eq!(
            state,
            WaitingState::Waiting {
                zone: Zone::East,
                start_time: p0.timestamp,
                speeds: vec![1.0],
            }
        );

        let p2 = at(20, OPEN_SEA, Some(10.0));
        let (state, closed) = state.step(&p2, None);
        assert_eq!(state, WaitingState::Idle);
        assert_eq!(
            closed,
            Some(ClosedInterval {
                zone: Zone::East,
                start_time: p0.timestamp,
                end_time: p2.timestamp,
                speeds: vec![1.0],
            })
        );
    }

    #[test]
    fn zone_change_restarts_without_closing() {
        let track = vec![
            at(0, EAST, Some(0.0)),
            at(200, WEST, Some(0.5)),
            at(260, OPEN_SEA, Some(10.0)),
        ];
        let intervals = detector().intervals(&track);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].zone, Zone::West);
        assert_eq!(intervals[0].start_time, track[1].timestamp);
        assert_eq!(intervals[0].duration_minutes().unwrap(), 60);
    }

    #[test]
    fn open_interval_at_end_of_track_is_not_reported() {
        let track = vec![at(0, EAST, Some(0.0)), at(300, EAST, Some(0.0))];
        assert!(detector().intervals(&track).is_empty());
    }

    #[test]
    fn duration_rounds_down_and_average_speed() {
        let interval = ClosedInterval {
            zone: Zone::East,
            start_time: t0(),
            end_time: t0() + TimeDelta::seconds(120 * 60 + 59),
            speeds: vec![1.0, 2.0],
        };
        assert_eq!(interval.duration_minutes().unwrap(), 120);
        assert_eq!(interval.avg_speed(), 1.5);

        let empty = ClosedInterval {
            speeds: vec![],
            end_time: t0(),
            ..interval
        };
        assert_eq!(empty.avg_speed(), 0.0);
        assert!(empty.duration_minutes().is_err());
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        store.insert_weather(&[wind(60, 10.0)]).await?;

        let events = detector().detect(mmsi(), &wait_then_leave(120), &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_minutes, 120);
        assert_eq!(events[0].zone, Zone::East);
        assert_eq!(events[0].avg_speed, Some(0.0));
        assert!(!events[0].crossed);

        let events = detector().detect(mmsi(), &wait_then_leave(119), &store).await;
        assert!(events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn calm_weather_discards_waiting() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        store.insert_weather(&[wind(30, 6.0), wind(90, 9.9)]).await?;

        let events = detector().detect(mmsi(), &wait_then_leave(180), &store).await;
        assert!(events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_weather_discards_waiting() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        // Samples exactly on the interval bounds are outside it
        store.insert_weather(&[wind(0, 20.0), wind(180, 20.0)]).await?;

        let events = detector().detect(mmsi(), &wait_then_leave(180), &store).await;
        assert!(events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn weather_gate_can_be_disabled() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        let detection = DetectionConfig {
            require_bad_weather: false,
            ..DetectionConfig::default()
        };
        let d = WaitingZoneDetector::new(&CorridorConfig::default(), &detection);

        let events = d.detect(mmsi(), &wait_then_leave(150), &store).await;
        assert_eq!(events.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_interval_does_not_stop_later_ones() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        store.insert_weather(&[wind(60, 15.0)]).await?;

        // Enters and leaves the zone at the same instant, then waits properly
        let track = vec![
            at(0, EAST, Some(0.0)),
            at(0, OPEN_SEA, Some(12.0)),
            at(10, EAST, Some(0.0)),
            at(160, OPEN_SEA, Some(12.0)),
        ];
        let intervals = detector().intervals(&track);
        assert_eq!(intervals.len(), 2);
        assert!(intervals[0].duration_minutes().is_err());

        let events = detector().detect(mmsi(), &track, &store).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, t0() + TimeDelta::minutes(10));
        assert_eq!(events[0].duration_minutes, 150);
        Ok(())
    }

    #[tokio::test]
    async fn records_subsequent_crossing() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        store.insert_weather(&[wind(60, 15.0)]).await?;

        let crossing_time = t0() + TimeDelta::minutes(200);
        store
            .insert_crossing(&CrossingEvent {
                mmsi: mmsi(),
                crossing_time,
                lat: 62.3,
                lon: 4.7,
                direction: Direction::EastToWest,
            })
            .await?;

        let events = detector().detect(mmsi(), &wait_then_leave(150), &store).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].crossed);
        assert_eq!(events[0].crossing_time, Some(crossing_time));
        Ok(())
    }

    #[tokio::test]
    async fn rescan_is_idempotent() -> Result<(), TrackerError> {
        let store = MemoryStore::new();
        store.insert_positions(&wait_then_leave(150)).await?;
        store.insert_weather(&[wind(60, 15.0)]).await?;

        assert_eq!(detector().rescan(mmsi(), &store).await?, 1);
        assert_eq!(detector().rescan(mmsi(), &store).await?, 1);
        assert_eq!(store.totals().await?.waiting_events, 1);
        Ok(())
    }
}
