//! Per-day summary rows

use chrono::NaiveDate;
use tracing::info;

use crate::database::Storage;
use crate::errors::TrackerError;
use crate::models::{DailyStat, TimeWindow};

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Rolls crossings, weather and waiting events up into one row per date.
///
/// Only dates with at least one crossing are visited.
#[derive(Debug, Clone, Default)]
pub struct DailyAggregator;

impl DailyAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Build the summary for one date
    pub async fn summarize(
        &self,
        date: NaiveDate,
        total_crossings: i64,
        store: &dyn Storage,
    ) -> Result<DailyStat, TrackerError> {
        let day = TimeWindow::for_date(date);

        let weather = store.weather_in(day).await?;
        let wind: Vec<f64> = weather.iter().filter_map(|o| o.wind_speed).collect();
        let gusts: Vec<f64> = weather.iter().filter_map(|o| o.wind_gust).collect();
        let waves: Vec<f64> = weather.iter().filter_map(|o| o.wave_height).collect();

        let waiting = store.waiting_events_in(day).await?;
        let durations: Vec<f64> = waiting.iter().map(|e| e.duration_minutes as f64).collect();

        Ok(DailyStat {
            date,
            total_crossings,
            avg_wind_speed: mean(&wind),
            max_wind_speed: max(&wind),
            max_wind_gust: max(&gusts),
            avg_wave_height: mean(&waves),
            waiting_events: waiting.len() as i64,
            avg_waiting_minutes: mean(&durations),
        })
    }

    /// Recompute and upsert the row of every date with crossings.
    ///
    /// Returns the number of rows written.
    pub async fn run(&self, store: &dyn Storage) -> Result<usize, TrackerError> {
        let counts = store.crossing_counts_by_date().await?;
        for (date, crossings) in &counts {
            let stat = self.summarize(*date, *crossings, store).await?;
            store.upsert_daily_stat(&stat).await?;
        }
        info!("Daily statistics updated for {} days", counts.len());
        Ok(counts.len())
    }
}
