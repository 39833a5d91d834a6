//! Historic AIS track source
//!
//! See: https://historic.ais.barentswatch.no/index.html

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BarentswatchConfig;
use crate::errors::TrackerError;
use crate::models::{GeoPoint, Mmsi, TimeWindow, TrackPoint};

const SERVICE: &str = "barentswatch";

/// Source of vessel lists and raw position records
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Vessels seen inside the area of interest during `window`
    async fn vessels_in_area(&self, window: TimeWindow) -> Result<Vec<Mmsi>, TrackerError>;

    /// Raw position records of one vessel during `window`
    async fn track(&self, mmsi: Mmsi, window: TimeWindow) -> Result<Vec<TrackPoint>, TrackerError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Closed GeoJSON ring around the bounding box, in (lon, lat) order
pub fn area_polygon(nw: GeoPoint, se: GeoPoint) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[
            [nw.lon, nw.lat],
            [se.lon, nw.lat],
            [se.lon, se.lat],
            [nw.lon, se.lat],
            [nw.lon, nw.lat],
        ]]
    })
}

/// Parse the MMSI list response, dropping numbers that are not valid MMSIs
pub fn parse_mmsi_list(body: &str) -> Result<Vec<Mmsi>, TrackerError> {
    let raw: Vec<i64> = serde_json::from_str(body)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match Mmsi::try_from(value) {
            Ok(mmsi) => Some(mmsi),
            Err(e) => {
                warn!("Ignoring vessel from area list: {}", e);
                None
            }
        })
        .collect())
}

/// Parse a track response record by record.
///
/// A record that does not decode is logged and dropped so the rest of the
/// track is kept. The body itself must still be a JSON array.
pub fn parse_track(body: &str) -> Result<Vec<TrackPoint>, TrackerError> {
    let records: Vec<Value> = serde_json::from_str(body)?;
    Ok(records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<TrackPoint>(record) {
            Ok(point) => Some(point),
            Err(e) => {
                warn!("Dropping undecodable track record: {}", e);
                None
            }
        })
        .collect())
}

/// Barentswatch client using OAuth2 client credentials.
///
/// The access token is requested once and reused for the lifetime of the
/// client.
pub struct BarentswatchClient {
    http_client: reqwest::Client,
    config: BarentswatchConfig,
    token: Mutex<Option<String>>,
}

impl BarentswatchClient {
    pub fn new(config: BarentswatchConfig) -> Result<Self, TrackerError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, TrackerError> {
        let mut token = self.token.lock().await;
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }

        info!("Authenticating with Barentswatch...");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", "ais"),
            ("grant_type", "client_credentials"),
        ];
        let response = self
            .http_client
            .post(&self.config.auth_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::AuthenticationError(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        let access_token = response.json::<TokenResponse>().await?.access_token;
        *token = Some(access_token.clone());
        Ok(access_token)
    }

    async fn checked_text(response: reqwest::Response) -> Result<String, TrackerError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TrackerError::ApiError {
                service: SERVICE,
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl TrackSource for BarentswatchClient {
    async fn vessels_in_area(&self, window: TimeWindow) -> Result<Vec<Mmsi>, TrackerError> {
        let token = self.access_token().await?;
        info!("Fetching MMSI list for {}...", window);

        let body = json!({
            "msgtimefrom": format_time(window.from),
            "msgtimeto": format_time(window.to),
            "polygon": area_polygon(self.config.area_nw, self.config.area_se),
        });
        let response = self
            .http_client
            .post(&self.config.mmsi_area_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let vessels = parse_mmsi_list(&Self::checked_text(response).await?)?;
        info!("Found {} MMSIs", vessels.len());
        Ok(vessels)
    }

    async fn track(&self, mmsi: Mmsi, window: TimeWindow) -> Result<Vec<TrackPoint>, TrackerError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/{}/{}/{}",
            self.config.track_url,
            mmsi,
            format_time(window.from),
            format_time(window.to)
        );
        let response = self.http_client.get(&url).bearer_auth(token).send().await?;

        let body = Self::checked_text(response).await?;
        let points = parse_track(&body)?;
        debug!("Fetched {} track points for {}", points.len(), mmsi);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn polygon_is_closed_ring() {
        let polygon = area_polygon(GeoPoint::new(4.0, 62.75), GeoPoint::new(5.5, 61.85));
        let ring = polygon["coordinates"][0].as_array().unwrap();

        assert_eq!(polygon["type"], "Polygon");
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        assert_eq!(ring[0], json!([4.0, 62.75]));
        assert_eq!(ring[2], json!([5.5, 61.85]));
    }

    #[test]
    fn mmsi_list_drops_invalid_numbers() {
        let vessels = parse_mmsi_list("[257898600, -1, 1000000000, 231234000]").unwrap();
        assert_eq!(
            vessels,
            vec![
                Mmsi::try_from(257_898_600u32).unwrap(),
                Mmsi::try_from(231_234_000u32).unwrap(),
            ]
        );
    }

    #[test]
    fn mmsi_list_rejects_non_array() {
        assert!(parse_mmsi_list(r#"{"error": "nope"}"#).is_err());
    }

    #[test]
    fn times_are_utc_seconds() {
        let time = Utc.with_ymd_and_hms(2024, 10, 24, 6, 30, 0).unwrap();
        assert_eq!(format_time(time), "2024-10-24T06:30:00Z");
    }

    #[test]
    fn track_response_parses() {
        let body = r#"[
            {"msgtime": "2024-10-24T10:00:00+00:00", "latitude": 62.2, "longitude": 5.2,
             "speedOverGround": 10.5, "courseOverGround": 270.0, "trueHeading": 511,
             "name": "KONG HARALD", "shipType": 60},
            {"msgtime": "2024-10-24T10:01:00+00:00", "latitude": null, "longitude": 5.1}
        ]"#;
        let points = parse_track(body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].name.as_deref(), Some("KONG HARALD"));
        assert_eq!(points[0].true_heading, None);
        assert_eq!(points[1].latitude, None);
    }

    #[test]
    fn undecodable_records_are_dropped() {
        let body = r#"[
            {"msgtime": "2024-10-24T10:00:00+00:00", "latitude": 62.2, "longitude": 5.2,
             "trueHeading": 12.5},
            {"msgtime": "2024-10-24T10:01:00+00:00", "latitude": 62.3, "longitude": 5.1,
             "shipType": 300},
            {"msgtime": "2024-10-24T10:02:00+00:00", "latitude": 62.4, "longitude": 5.0,
             "trueHeading": 270, "shipType": 60}
        ]"#;
        let points = parse_track(body).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].latitude, Some(62.4));
        assert_eq!(points[0].true_heading, Some(270));
    }

    #[test]
    fn track_rejects_non_array() {
        assert!(parse_track(r#"{"error": "nope"}"#).is_err());
    }
}
