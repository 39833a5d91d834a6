//! Chooses the time window fetched by the next run.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use tracing::info;

use crate::config::ScheduleConfig;
use crate::database::Storage;
use crate::errors::TrackerError;
use crate::models::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Trailing window ending now
    Recent,
    /// Window starting at the oldest date without positions
    Backfill { date: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    pub window: TimeWindow,
    pub mode: FetchMode,
}

/// Alternates between staying current and filling the oldest gap in the
/// lookback horizon, one window at a time.
#[derive(Debug, Clone)]
pub struct FetchWindowScheduler {
    lookback: TimeDelta,
    window: TimeDelta,
}

impl FetchWindowScheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self {
            lookback: TimeDelta::days(config.lookback_days),
            window: TimeDelta::hours(config.window_hours),
        }
    }

    /// First instant of the lookback horizon
    pub fn horizon_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        (now - self.lookback)
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    /// Oldest date between the horizon start and today without positions
    pub fn oldest_missing_date(
        &self,
        now: DateTime<Utc>,
        populated: &BTreeSet<NaiveDate>,
    ) -> Option<NaiveDate> {
        let today = now.date_naive();
        self.horizon_start(now)
            .date_naive()
            .iter_days()
            .take_while(|date| *date <= today)
            .find(|date| !populated.contains(date))
    }

    /// Window for the next fetch given the dates that already have data.
    ///
    /// A gap is only backfilled when it starts before the trailing window,
    /// which every recent fetch covers anyway.
    pub fn plan(&self, now: DateTime<Utc>, populated: &BTreeSet<NaiveDate>) -> FetchPlan {
        let recent_start = now - self.window;

        if let Some(date) = self.oldest_missing_date(now, populated) {
            let from = date.and_time(NaiveTime::MIN).and_utc();
            if from < recent_start {
                return FetchPlan {
                    window: TimeWindow {
                        from,
                        to: from + self.window,
                    },
                    mode: FetchMode::Backfill { date },
                };
            }
        }

        FetchPlan {
            window: TimeWindow {
                from: recent_start,
                to: now,
            },
            mode: FetchMode::Recent,
        }
    }

    /// Plan the next fetch from the dates stored in `store`
    pub async fn next_window(
        &self,
        now: DateTime<Utc>,
        store: &dyn Storage,
    ) -> Result<FetchPlan, TrackerError> {
        let populated = store.position_dates_since(self.horizon_start(now)).await?;
        let plan = self.plan(now, &populated);

        match plan.mode {
            FetchMode::Backfill { date } => info!(
                "Backfilling missing data for {} ({}h window)",
                date,
                self.window.num_hours()
            ),
            FetchMode::Recent => info!(
                "Fetching recent {} hours (current data)",
                self.window.num_hours()
            ),
        }

        Ok(plan)
    }
}
