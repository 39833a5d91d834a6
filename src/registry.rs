//! Static vessel data from the Marinesia registry

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::errors::TrackerError;
use crate::models::{Mmsi, VesselInfo};
use crate::rate_limit::RateLimiter;

const SERVICE: &str = "marinesia";

/// Lookup of length, width and call sign by MMSI
#[async_trait]
pub trait VesselRegistry: Send + Sync {
    /// `Ok(None)` when the registry does not know the vessel.
    ///
    /// Errors are transient and the lookup may be retried later.
    async fn lookup(&self, mmsi: Mmsi) -> Result<Option<VesselInfo>, TrackerError>;
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    error: bool,
    data: Option<ProfileData>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    length: Option<f64>,
    width: Option<f64>,
    callsign: Option<String>,
}

/// Parse a successful profile response
pub fn parse_profile(body: &str) -> Result<Option<VesselInfo>, TrackerError> {
    let response: ProfileResponse = serde_json::from_str(body)?;
    if response.error {
        return Ok(None);
    }
    Ok(response.data.map(|data| VesselInfo {
        length: data.length,
        width: data.width,
        callsign: data
            .callsign
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    }))
}

/// Marinesia profile client.
///
/// Every request first waits on the shared rate limiter.
pub struct MarinesiaClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    api_url: String,
    api_key: String,
}

impl MarinesiaClient {
    pub fn new(
        config: &RegistryConfig,
        api_key: String,
        rate_limiter: RateLimiter,
    ) -> Result<Self, TrackerError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl VesselRegistry for MarinesiaClient {
    async fn lookup(&self, mmsi: Mmsi) -> Result<Option<VesselInfo>, TrackerError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/{}/profile", self.api_url, mmsi);
        let response = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!("Ship not found in registry: MMSI {}", mmsi);
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(TrackerError::ApiError {
                service: SERVICE,
                status: status.as_u16(),
                message: body,
            });
        }

        let info = parse_profile(&body)?;
        match &info {
            Some(info) => debug!(
                "Ship info for MMSI {}: length={:?}m, width={:?}m",
                mmsi, info.length, info.width
            ),
            None => debug!("No ship data found for MMSI {}", mmsi),
        }
        Ok(info)
    }
}
