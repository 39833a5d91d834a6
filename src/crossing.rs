//! Reference line crossing detection

use tracing::{error, info};

use crate::config::CorridorConfig;
use crate::database::Storage;
use crate::geo::segments_intersect;
use crate::models::{CrossingEvent, Direction, GeoPoint, Position};

/// Counts from persisting one vessel's crossings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossingOutcome {
    /// Crossings found in the track
    pub detected: usize,
    /// Crossings that were not stored before
    pub stored: usize,
    /// Crossings that could not be written
    pub failed: usize,
}

/// Finds where consecutive positions of one vessel cross the reference line
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    line_start: GeoPoint,
    line_end: GeoPoint,
}

impl CrossingDetector {
    pub fn new(line_start: GeoPoint, line_end: GeoPoint) -> Self {
        Self {
            line_start,
            line_end,
        }
    }

    pub fn from_corridor(corridor: &CorridorConfig) -> Self {
        Self::new(corridor.line_start, corridor.line_end)
    }

    /// Crossings in a single vessel's track.
    ///
    /// Positions are ordered by timestamp first. Each event is placed at the
    /// later position of the crossing pair.
    pub fn detect(&self, positions: &[Position]) -> Vec<CrossingEvent> {
        let mut ordered: Vec<&Position> = positions.iter().collect();
        ordered.sort_by_key(|p| p.timestamp);

        ordered
            .windows(2)
            .filter_map(|pair| {
                let (prev, curr) = (pair[0], pair[1]);
                segments_intersect(prev.point(), curr.point(), self.line_start, self.line_end)
                    .then(|| CrossingEvent {
                        mmsi: curr.mmsi,
                        crossing_time: curr.timestamp,
                        lat: curr.lat,
                        lon: curr.lon,
                        direction: Direction::from_longitudes(prev.lon, curr.lon),
                    })
            })
            .collect()
    }

    /// Detect crossings and store the ones not already known.
    ///
    /// A failed write is logged and does not stop the remaining events.
    pub async fn detect_and_store(
        &self,
        positions: &[Position],
        store: &dyn Storage,
        vessel_name: &str,
    ) -> CrossingOutcome {
        let events = self.detect(positions);
        let mut outcome = CrossingOutcome {
            detected: events.len(),
            ..Default::default()
        };

        for event in &events {
            match store.insert_crossing(event).await {
                Ok(true) => {
                    outcome.stored += 1;
                    info!(
                        "  *** CROSSING: {} ({}) at {}",
                        vessel_name, event.direction, event.crossing_time
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    outcome.failed += 1;
                    error!(
                        "Failed to store crossing for {} at {}: {}",
                        event.mmsi, event.crossing_time, e
                    );
                }
            }
        }

        outcome
    }
}
