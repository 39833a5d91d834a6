//! One collection run: schedule, ingest, weather, waiting, aggregate.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::aggregate::DailyAggregator;
use crate::barentswatch::TrackSource;
use crate::config::{AppConfig, RunConfig};
use crate::database::Storage;
use crate::errors::TrackerError;
use crate::ingest::{VesselIngest, VesselIngestor};
use crate::models::{Mmsi, TimeWindow};
use crate::registry::VesselRegistry;
use crate::scheduler::FetchWindowScheduler;
use crate::waiting::WaitingZoneDetector;
use crate::weather::WeatherSource;

/// Counts reported at the end of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub window: TimeWindow,
    pub vessels_listed: usize,
    pub vessels_ingested: usize,
    pub vessels_skipped: usize,
    pub positions_stored: usize,
    pub crossings_detected: usize,
    pub waiting_events: usize,
    pub weather_observations: u64,
    pub days_aggregated: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window {}: {}/{} vessels ingested ({} skipped), {} positions, {} new crossings, \
             {} waiting events, {} weather observations, {} days aggregated",
            self.window,
            self.vessels_ingested,
            self.vessels_listed,
            self.vessels_skipped,
            self.positions_stored,
            self.crossings_detected,
            self.waiting_events,
            self.weather_observations,
            self.days_aggregated
        )
    }
}

/// Runs every stage of a collection against one store
pub struct Pipeline {
    store: Arc<dyn Storage>,
    tracks: Arc<dyn TrackSource>,
    weather: Arc<dyn WeatherSource>,
    ingestor: Arc<VesselIngestor>,
    scheduler: FetchWindowScheduler,
    waiting: WaitingZoneDetector,
    aggregator: DailyAggregator,
    run: RunConfig,
}

async fn ingest_vessel(
    tracks: Arc<dyn TrackSource>,
    store: Arc<dyn Storage>,
    ingestor: Arc<VesselIngestor>,
    mmsi: Mmsi,
    window: TimeWindow,
    now: DateTime<Utc>,
) -> Result<VesselIngest, TrackerError> {
    let points = tracks.track(mmsi, window).await?;
    ingestor.ingest(mmsi, &points, store.as_ref(), now).await
}

/// Run a stage until the run deadline, counting nothing if it is reached
async fn within_deadline<T, F>(
    deadline: Instant,
    stage: &str,
    stage_future: F,
) -> Result<T, TrackerError>
where
    T: Default,
    F: Future<Output = Result<T, TrackerError>>,
{
    match tokio::time::timeout_at(deadline, stage_future).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Run deadline reached, skipping {}", stage);
            Ok(T::default())
        }
    }
}

impl Pipeline {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Storage>,
        tracks: Arc<dyn TrackSource>,
        weather: Arc<dyn WeatherSource>,
        registry: Option<Arc<dyn VesselRegistry>>,
    ) -> Self {
        Self {
            store,
            tracks,
            weather,
            ingestor: Arc::new(VesselIngestor::new(&config.corridor, registry)),
            scheduler: FetchWindowScheduler::new(&config.schedule),
            waiting: WaitingZoneDetector::new(&config.corridor, &config.detection),
            aggregator: DailyAggregator::new(),
            run: config.run.clone(),
        }
    }

    /// Ingest every listed vessel with bounded concurrency.
    ///
    /// A vessel that fails, or does not finish within its timeout or before
    /// the run deadline, is skipped.
    async fn ingest_all(
        &self,
        vessels: &[Mmsi],
        window: TimeWindow,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> (Vec<VesselIngest>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.run.max_concurrent_vessels));
        let total = vessels.len();
        let mut tasks = JoinSet::new();

        for (index, &mmsi) in vessels.iter().enumerate() {
            let semaphore = semaphore.clone();
            let tracks = self.tracks.clone();
            let store = self.store.clone();
            let ingestor = self.ingestor.clone();
            let vessel_timeout = self.run.vessel_timeout;

            tasks.spawn(async move {
                let result = tokio::time::timeout_at(deadline, async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| TrackerError::Timeout(e.to_string()))?;
                    match tokio::time::timeout(
                        vessel_timeout,
                        ingest_vessel(tracks, store, ingestor, mmsi, window, now),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TrackerError::Timeout(format!(
                            "vessel {} exceeded {:?}",
                            mmsi, vessel_timeout
                        ))),
                    }
                })
                .await
                .unwrap_or_else(|_| {
                    Err(TrackerError::Timeout(format!(
                        "run deadline reached before vessel {}",
                        mmsi
                    )))
                });
                (index, mmsi, result)
            });
        }

        let mut ingested = Vec::new();
        let mut skipped = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(vessel))) => {
                    info!(
                        "[{}/{}] {} ({}) - {} positions",
                        index + 1,
                        total,
                        vessel.name,
                        vessel.type_name,
                        vessel.positions_stored
                    );
                    ingested.push(vessel);
                }
                Ok((index, mmsi, Err(e))) => {
                    warn!("[{}/{}] Skipping MMSI {}: {}", index + 1, total, mmsi, e);
                    skipped += 1;
                }
                Err(e) => {
                    error!("Vessel task failed: {}", e);
                    skipped += 1;
                }
            }
        }

        (ingested, skipped)
    }

    async fn store_weather(&self, window: TimeWindow) -> u64 {
        let observations = match self.weather.observations(window).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!("No weather data for {}: {}", window, e);
                return 0;
            }
        };
        match self.store.insert_weather(&observations).await {
            Ok(stored) => {
                info!("Stored {} weather observations", stored);
                stored
            }
            Err(e) => {
                error!("Failed to store weather observations: {}", e);
                0
            }
        }
    }

    async fn rescan_waiting(&self) -> Result<usize, TrackerError> {
        let mut events = 0;
        for mmsi in self.store.vessel_ids().await? {
            match self.waiting.rescan(mmsi, self.store.as_ref()).await {
                Ok(count) => events += count,
                Err(e) => error!("Waiting event scan failed for {}: {}", mmsi, e),
            }
        }
        info!("Detected {} waiting events", events);
        Ok(events)
    }

    /// Perform one collection run as of `now`.
    ///
    /// Every stage shares one deadline. Listing vessels past it fails the
    /// run; later stages that do not finish in time count nothing.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, TrackerError> {
        let deadline = Instant::now() + self.run.deadline;

        let plan = self.scheduler.next_window(now, self.store.as_ref()).await?;
        let window = plan.window;

        let listed = tokio::time::timeout_at(deadline, self.tracks.vessels_in_area(window))
            .await
            .map_err(|_| {
                TrackerError::Timeout("run deadline reached while listing vessels".to_string())
            })??;
        // The area query may repeat a vessel
        let vessels: Vec<Mmsi> = listed
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let (ingested, vessels_skipped) = self.ingest_all(&vessels, window, now, deadline).await;

        let weather_observations =
            within_deadline(deadline, "weather", async { Ok(self.store_weather(window).await) })
                .await?;
        let waiting_events = within_deadline(deadline, "waiting scan", self.rescan_waiting()).await?;
        let days_aggregated = within_deadline(
            deadline,
            "daily aggregation",
            self.aggregator.run(self.store.as_ref()),
        )
        .await?;

        let summary = RunSummary {
            window,
            vessels_listed: vessels.len(),
            vessels_ingested: ingested.len(),
            vessels_skipped,
            positions_stored: ingested.iter().map(|v| v.positions_stored).sum(),
            crossings_detected: ingested.iter().map(|v| v.crossings.stored).sum(),
            waiting_events,
            weather_observations,
            days_aggregated,
        };
        info!("Run complete: {}", summary);

        let totals = self.store.totals().await?;
        info!(
            "Totals: {} ships with positions, {} ships crossed, {} crossings, \
             {} waiting events (avg {:.0} min)",
            totals.ships_with_positions,
            totals.ships_crossed,
            totals.crossings,
            totals.waiting_events,
            totals.avg_waiting_minutes.unwrap_or(0.0)
        );

        Ok(summary)
    }
}
