//! Weather observations from the met.no Frost API
//!
//! See: https://frost.met.no/api.html#!/observations/observations

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::WeatherConfig;
use crate::errors::TrackerError;
use crate::models::{TimeWindow, WeatherObservation};

const SERVICE: &str = "frost";

const ELEMENTS: &str = "wind_speed,wind_from_direction,max_wind_speed_of_gust(PT1H),\
air_temperature,air_pressure_at_sea_level";

/// Source of station weather observations
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn observations(&self, window: TimeWindow)
        -> Result<Vec<WeatherObservation>, TrackerError>;
}

#[derive(Debug, Deserialize)]
struct FrostResponse {
    #[serde(default)]
    data: Vec<FrostItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrostItem {
    reference_time: Option<String>,
    #[serde(default)]
    observations: Vec<FrostElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrostElement {
    element_id: String,
    value: Option<f64>,
}

/// Fold a Frost response into one observation per reference time.
///
/// Items without a parseable time or without any known element are dropped.
pub fn parse_observations(
    body: &str,
    station_id: &str,
) -> Result<Vec<WeatherObservation>, TrackerError> {
    let response: FrostResponse = serde_json::from_str(body)?;
    let mut merged: BTreeMap<DateTime<Utc>, WeatherObservation> = BTreeMap::new();

    for item in response.data {
        let Some(reference_time) = item.reference_time.as_deref() else {
            continue;
        };
        let timestamp = match DateTime::parse_from_rfc3339(reference_time) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!("Skipping weather item with time '{}': {}", reference_time, e);
                continue;
            }
        };

        let mut known = false;
        let entry = merged.entry(timestamp).or_insert_with(|| WeatherObservation {
            timestamp,
            station_id: station_id.to_string(),
            ..Default::default()
        });
        for element in &item.observations {
            let slot = match element.element_id.as_str() {
                "wind_speed" => &mut entry.wind_speed,
                "wind_from_direction" => &mut entry.wind_direction,
                "max_wind_speed_of_gust(PT1H)" => &mut entry.wind_gust,
                "air_temperature" => &mut entry.air_temperature,
                "air_pressure_at_sea_level" => &mut entry.pressure,
                _ => continue,
            };
            if element.value.is_some() {
                *slot = element.value;
                known = true;
            }
        }
        if !known {
            debug!("No known elements at {}", timestamp);
        }
    }

    Ok(merged
        .into_values()
        .filter(|o| {
            o.wind_speed.is_some()
                || o.wind_direction.is_some()
                || o.wind_gust.is_some()
                || o.air_temperature.is_some()
                || o.pressure.is_some()
        })
        .collect())
}

/// Frost client authenticating with the client id as basic auth user
pub struct FrostClient {
    http_client: reqwest::Client,
    config: WeatherConfig,
}

impl FrostClient {
    pub fn new(config: WeatherConfig) -> Result<Self, TrackerError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }
}

#[async_trait]
impl WeatherSource for FrostClient {
    async fn observations(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<WeatherObservation>, TrackerError> {
        info!("Fetching weather data for {}...", window);

        let reference_time = format!(
            "{}/{}",
            window.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            window.to.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let mut request = self.http_client.get(&self.config.api_url).query(&[
            ("sources", self.config.station.as_str()),
            ("elements", ELEMENTS),
            ("referencetime", reference_time.as_str()),
        ]);
        if let Some(client_id) = &self.config.client_id {
            request = request.basic_auth(client_id, Some(""));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status.as_u16() {
            200 => {}
            404 => {
                info!("No weather data for {}", window);
                return Ok(Vec::new());
            }
            401 => {
                return Err(TrackerError::AuthenticationError(
                    "Frost rejected the client id".to_string(),
                ))
            }
            code => {
                return Err(TrackerError::ApiError {
                    service: SERVICE,
                    status: code,
                    message: body,
                })
            }
        }

        let observations = parse_observations(&body, &self.config.station)?;
        info!("Got {} weather observations", observations.len());
        Ok(observations)
    }
}
