//! Per-vessel ingestion of a fetched track

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::CorridorConfig;
use crate::crossing::{CrossingDetector, CrossingOutcome};
use crate::database::Storage;
use crate::errors::TrackerError;
use crate::geo::approx_distance_to_reference_line;
use crate::models::{ship_type_name, GeoPoint, Mmsi, Position, ShipIdentity, TrackPoint};
use crate::registry::VesselRegistry;

/// Result of ingesting one vessel's track
#[derive(Debug, Clone, PartialEq)]
pub struct VesselIngest {
    pub mmsi: Mmsi,
    pub name: String,
    pub type_name: String,
    /// Positions handed to the store, duplicates included
    pub positions_stored: usize,
    /// Positions dropped for being far from the reference line
    pub positions_filtered: usize,
    pub crossings: CrossingOutcome,
}

/// Stores ship identity, nearby positions and crossings of a single vessel
pub struct VesselIngestor {
    detector: CrossingDetector,
    line_start: GeoPoint,
    line_end: GeoPoint,
    position_filter_km: f64,
    registry: Option<Arc<dyn VesselRegistry>>,
}

impl VesselIngestor {
    pub fn new(corridor: &CorridorConfig, registry: Option<Arc<dyn VesselRegistry>>) -> Self {
        Self {
            detector: CrossingDetector::from_corridor(corridor),
            line_start: corridor.line_start,
            line_end: corridor.line_end,
            position_filter_km: corridor.position_filter_km,
            registry,
        }
    }

    /// Identity from the first record of the track
    fn identity(mmsi: Mmsi, points: &[TrackPoint]) -> ShipIdentity {
        let first = points.first();
        let name = first
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| format!("Unknown-{}", mmsi));
        let type_code = first.and_then(|p| p.ship_type);

        ShipIdentity {
            mmsi,
            name,
            type_code,
            type_name: ship_type_name(type_code),
        }
    }

    /// Valid positions of the track in timestamp order
    fn positions(mmsi: Mmsi, points: &[TrackPoint]) -> Vec<Position> {
        let mut positions: Vec<Position> = points
            .iter()
            .filter_map(|point| match point.to_position(mmsi) {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!("Dropping track record: {}", e);
                    None
                }
            })
            .collect();
        positions.sort_by_key(|p| p.timestamp);
        positions
    }

    /// Consult the registry once per ship.
    ///
    /// A failed lookup records nothing so a later run tries again.
    async fn refresh_ship_info(
        &self,
        mmsi: Mmsi,
        store: &dyn Storage,
        now: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        let already_fetched = store
            .ship(mmsi)
            .await?
            .is_some_and(|ship| ship.ship_info_fetched_at.is_some());
        if already_fetched {
            return Ok(());
        }

        match registry.lookup(mmsi).await {
            Ok(info) => store.record_ship_info(mmsi, info.as_ref(), now).await,
            Err(e) => {
                warn!("Registry lookup failed for MMSI {}: {}", mmsi, e);
                Ok(())
            }
        }
    }

    /// Ingest the raw track of one vessel.
    ///
    /// Positions further than the filter radius from the reference line are
    /// not stored, except for the last one. Crossings are detected over all
    /// valid positions.
    pub async fn ingest(
        &self,
        mmsi: Mmsi,
        points: &[TrackPoint],
        store: &dyn Storage,
        now: DateTime<Utc>,
    ) -> Result<VesselIngest, TrackerError> {
        let identity = Self::identity(mmsi, points);
        let positions = Self::positions(mmsi, points);

        let mut result = VesselIngest {
            mmsi,
            name: identity.name.clone(),
            type_name: identity.type_name.clone(),
            positions_stored: 0,
            positions_filtered: 0,
            crossings: CrossingOutcome::default(),
        };
        if positions.is_empty() {
            debug!("No valid positions for {}", mmsi);
            return Ok(result);
        }

        store.upsert_ship_identity(&identity).await?;
        self.refresh_ship_info(mmsi, store, now).await?;

        let last = positions.len() - 1;
        let nearby: Vec<Position> = positions
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                *i == last
                    || approx_distance_to_reference_line(p.lat, p.lon, self.line_start, self.line_end)
                        <= self.position_filter_km
            })
            .map(|(_, p)| p.clone())
            .collect();
        store.insert_positions(&nearby).await?;
        result.positions_stored = nearby.len();
        result.positions_filtered = positions.len() - nearby.len();

        if result.positions_filtered > 0 {
            info!(
                "  Filtered {}/{} positions (>{}km from reference line)",
                result.positions_filtered,
                positions.len(),
                self.position_filter_km
            );
        }

        result.crossings = self
            .detector
            .detect_and_store(&positions, store, &identity.name)
            .await;

        Ok(result)
    }
}
