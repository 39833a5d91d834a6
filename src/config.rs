//! Application configuration

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::TrackerError;
use crate::models::GeoPoint;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub barentswatch: BarentswatchConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub corridor: CorridorConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Historic AIS track source
#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct BarentswatchConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_mmsi_area_url")]
    pub mmsi_area_url: String,
    #[serde(default = "default_track_url")]
    pub track_url: String,
    /// North-west corner of the area of interest
    #[serde(default = "default_area_nw")]
    pub area_nw: GeoPoint,
    /// South-east corner of the area of interest
    #[serde(default = "default_area_se")]
    pub area_se: GeoPoint,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_http_timeout")]
    pub timeout: Duration,
}

fn default_auth_url() -> String {
    "https://id.barentswatch.no/connect/token".to_string()
}

fn default_mmsi_area_url() -> String {
    "https://historic.ais.barentswatch.no/v1/historic/mmsiinarea".to_string()
}

fn default_track_url() -> String {
    "https://historic.ais.barentswatch.no/v1/historic/tracks".to_string()
}

fn default_area_nw() -> GeoPoint {
    GeoPoint::new(4.0, 62.75)
}

fn default_area_se() -> GeoPoint {
    GeoPoint::new(5.5, 61.85)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Frost weather observation source
#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    pub api_url: String,
    /// Frost client id, sent as basic auth user name
    pub client_id: Option<String>,
    /// Weather station identifier
    pub station: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: "https://frost.met.no/observations/v0.jsonld".to_string(),
            client_id: None,
            station: "SN59800".to_string(),
            timeout: default_http_timeout(),
        }
    }
}

/// Vessel registry for static ship data
#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    pub api_url: String,
    /// Registry is skipped when no key is configured
    pub api_key: Option<String>,
    /// Minimum time between two registry requests
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub min_interval: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.marinesia.com/api/v1/vessel".to_string(),
            api_key: None,
            min_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Circular waiting zone
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ZoneConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
}

/// Reference line and waiting zones of the monitored corridor
#[derive(Debug, Deserialize, Clone)]
pub struct CorridorConfig {
    pub line_start: GeoPoint,
    pub line_end: GeoPoint,
    pub east_zone: ZoneConfig,
    pub west_zone: ZoneConfig,
    /// Positions further than this from the reference line are not stored
    pub position_filter_km: f64,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            line_start: GeoPoint::new(5.100380, 62.194513),
            line_end: GeoPoint::new(4.342984, 62.442407),
            east_zone: ZoneConfig {
                center_lat: 62.25,
                center_lon: 5.3,
                radius_km: 10.0,
            },
            west_zone: ZoneConfig {
                center_lat: 62.25,
                center_lon: 4.2,
                radius_km: 10.0,
            },
            position_filter_km: 50.0,
        }
    }
}

/// Loitering and weather thresholds
#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Knots; slower than this counts as waiting
    pub loitering_speed_threshold: f64,
    /// Minutes a vessel must wait before an event is recorded
    pub loitering_time_threshold: i64,
    /// Metres per second; wind at or above this is bad weather
    pub wind_threshold_ms: f64,
    /// Only record waiting that coincides with bad weather
    pub require_bad_weather: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            loitering_speed_threshold: 3.0,
            loitering_time_threshold: 120,
            wind_threshold_ms: 10.0,
            require_bad_weather: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Days back from now that are checked for missing data
    pub lookback_days: i64,
    /// Length of every fetch window
    pub window_hours: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            window_hours: 48,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Vessels ingested concurrently
    pub max_concurrent_vessels: usize,
    /// Time budget for ingesting one vessel
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub vessel_timeout: Duration,
    /// Time budget for the vessel ingestion phase of a run
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub deadline: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_vessels: 4,
            vessel_timeout: Duration::from_secs(120),
            deadline: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("STADTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> Result<(), TrackerError> {
        self.database.validate()?;
        self.barentswatch.validate()?;
        self.weather.validate()?;
        self.registry.validate()?;
        self.corridor.validate()?;
        self.detection.validate()?;
        self.schedule.validate()?;
        self.run.validate()?;
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> TrackerError {
    TrackerError::ConfigurationError {
        message: message.into(),
    }
}

fn require_url(name: &str, url: &str) -> Result<(), TrackerError> {
    if url.trim().is_empty() {
        return Err(config_error(format!("{} cannot be empty", name)));
    }
    Ok(())
}

fn require_timeout(name: &str, timeout: Duration) -> Result<(), TrackerError> {
    if timeout.is_zero() {
        return Err(config_error(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        require_url("Database URL", &self.url)?;
        if self.max_connections == 0 {
            return Err(config_error("Database max_connections must be greater than zero"));
        }
        Ok(())
    }
}

impl BarentswatchConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(config_error("Barentswatch client credentials are required"));
        }
        require_url("Barentswatch auth URL", &self.auth_url)?;
        require_url("Barentswatch area URL", &self.mmsi_area_url)?;
        require_url("Barentswatch track URL", &self.track_url)?;
        if self.area_nw.lat <= self.area_se.lat || self.area_nw.lon >= self.area_se.lon {
            return Err(config_error(
                "Barentswatch area_nw must be north-west of area_se",
            ));
        }
        require_timeout("Barentswatch timeout", self.timeout)
    }
}

impl WeatherConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        require_url("Weather API URL", &self.api_url)?;
        if self.station.trim().is_empty() {
            return Err(config_error("Weather station cannot be empty"));
        }
        if self.client_id.as_deref().map_or(true, str::is_empty) {
            warn!("No Frost client id configured, weather requests will be unauthenticated");
        }
        require_timeout("Weather timeout", self.timeout)
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        require_url("Registry API URL", &self.api_url)?;
        require_timeout("Registry min_interval", self.min_interval)?;
        require_timeout("Registry timeout", self.timeout)
    }
}

impl ZoneConfig {
    fn validate(&self, name: &str) -> Result<(), TrackerError> {
        if !(self.radius_km > 0.0) {
            return Err(config_error(format!("{} radius must be positive", name)));
        }
        if !(-90.0..=90.0).contains(&self.center_lat) || !(-180.0..=180.0).contains(&self.center_lon)
        {
            return Err(config_error(format!("{} centre is out of range", name)));
        }
        Ok(())
    }
}

impl CorridorConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.line_start == self.line_end {
            return Err(config_error("Reference line endpoints must differ"));
        }
        self.east_zone.validate("East zone")?;
        self.west_zone.validate("West zone")?;
        if !(self.position_filter_km > 0.0) {
            return Err(config_error("Position filter radius must be positive"));
        }
        Ok(())
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !(self.loitering_speed_threshold > 0.0) {
            return Err(config_error("Loitering speed threshold must be positive"));
        }
        if self.loitering_time_threshold <= 0 {
            return Err(config_error("Loitering time threshold must be positive"));
        }
        if self.wind_threshold_ms < 0.0 {
            return Err(config_error("Wind threshold cannot be negative"));
        }
        Ok(())
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.lookback_days <= 0 {
            return Err(config_error("Lookback must be at least one day"));
        }
        if self.window_hours <= 0 {
            return Err(config_error("Fetch window must be at least one hour"));
        }
        Ok(())
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.max_concurrent_vessels == 0 {
            return Err(config_error("max_concurrent_vessels must be greater than zero"));
        }
        require_timeout("Vessel timeout", self.vessel_timeout)?;
        require_timeout("Run deadline", self.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config() {
        env::set_var("STADTRACKER__DATABASE__URL", "postgres://localhost/stad");
        env::set_var("STADTRACKER__BARENTSWATCH__CLIENT_ID", "client");
        env::set_var("STADTRACKER__BARENTSWATCH__CLIENT_SECRET", "secret");
        env::set_var("STADTRACKER__DETECTION__WIND_THRESHOLD_MS", "12.5");
        env::set_var("STADTRACKER__RUN__VESSEL_TIMEOUT", "30");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.database.url, "postgres://localhost/stad");
        assert_eq!(config.barentswatch.client_id, "client");
        assert_eq!(config.barentswatch.client_secret, "secret");
        assert_eq!(config.detection.wind_threshold_ms, 12.5);
        assert_eq!(config.detection.loitering_time_threshold, 120);
        assert_eq!(config.run.vessel_timeout, Duration::from_secs(30));
        assert_eq!(config.schedule.lookback_days, 14);
        assert_eq!(config.corridor.line_start, GeoPoint::new(5.100380, 62.194513));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(CorridorConfig::default().validate().is_ok());
        assert!(DetectionConfig::default().validate().is_ok());
        assert!(ScheduleConfig::default().validate().is_ok());
        assert!(RunConfig::default().validate().is_ok());
        assert!(RegistryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_corridor_validate_invalid_radius() {
        let mut corridor = CorridorConfig::default();
        corridor.west_zone.radius_km = 0.0;
        assert!(corridor.validate().is_err());
    }

    #[test]
    fn test_run_validate_invalid_concurrency() {
        let run = RunConfig {
            max_concurrent_vessels: 0,
            ..RunConfig::default()
        };
        assert!(run.validate().is_err());
    }

    #[test]
    fn test_database_validate_empty_url() {
        let database = DatabaseConfig {
            url: String::new(),
            max_connections: 5,
        };
        assert!(database.validate().is_err());
    }

    #[test]
    fn test_registry_validate_zero_interval() {
        let registry = RegistryConfig {
            min_interval: Duration::ZERO,
            ..RegistryConfig::default()
        };
        assert!(registry.validate().is_err());
        assert!(RegistryConfig::default().validate().is_ok());
    }
}
