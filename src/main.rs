//! Stadthavet tracker, performs one collection run

use std::sync::Arc;

use chrono::Utc;
use stadthavet_tracker::barentswatch::BarentswatchClient;
use stadthavet_tracker::config::AppConfig;
use stadthavet_tracker::database::Database;
use stadthavet_tracker::errors::TrackerError;
use stadthavet_tracker::pipeline::Pipeline;
use stadthavet_tracker::rate_limit::RateLimiter;
use stadthavet_tracker::registry::{MarinesiaClient, VesselRegistry};
use stadthavet_tracker::weather::FrostClient;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    #[cfg(feature = "dotenv")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let db = Database::connect(&config.database).await?;

    let registry: Option<Arc<dyn VesselRegistry>> = match &config.registry.api_key {
        Some(key) if !key.is_empty() => {
            let limiter = RateLimiter::new(config.registry.min_interval)?;
            let client = MarinesiaClient::new(&config.registry, key.clone(), limiter)?;
            Some(Arc::new(client) as Arc<dyn VesselRegistry>)
        }
        _ => {
            warn!("No registry API key set, skipping ship lookups");
            None
        }
    };

    let pipeline = Pipeline::new(
        &config,
        Arc::new(db),
        Arc::new(BarentswatchClient::new(config.barentswatch.clone())?),
        Arc::new(FrostClient::new(config.weather.clone())?),
        registry,
    );

    tokio::select! {
        result = pipeline.run(Utc::now()) => {
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
