//! Data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;
use serde_helpers::*;

/// Maritime Mobile Service Identity (MMSI)
///
/// A unique nine-digit number for identifying vessels in AIS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mmsi(u32);

impl TryFrom<u32> for Mmsi {
    type Error = TrackerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 999_999_999 {
            return Err(TrackerError::InvalidMmsi(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i64> for Mmsi {
    type Error = TrackerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| TrackerError::InvalidMmsi(value.to_string()))?;
        Self::try_from(value)
    }
}

impl TryFrom<&str> for Mmsi {
    type Error = TrackerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parsed = value
            .parse::<u32>()
            .map_err(|_| TrackerError::InvalidMmsi(value.to_string()))?;
        Self::try_from(parsed)
    }
}

impl Mmsi {
    /// Get the raw MMSI value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic point in WGS84 decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Stored vessel position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub mmsi: Mmsi,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground in knots
    pub sog: Option<f64>,
    /// Course over ground in degrees
    pub cog: Option<f64>,
    /// True heading in degrees (0-359)
    pub heading: Option<u16>,
}

impl Position {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lon, self.lat)
    }
}

/// Vessel identity and static attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Ship {
    pub mmsi: Mmsi,
    pub name: String,
    pub type_code: Option<u8>,
    pub type_name: String,
    pub destination: Option<String>,
    pub callsign: Option<String>,
    /// Length in metres
    pub length: Option<f64>,
    /// Width in metres
    pub width: Option<f64>,
    /// Time of the last vessel registry lookup attempt.
    ///
    /// `None` means the registry has not been consulted yet. Once set, the
    /// static columns are never rewritten by later runs.
    pub ship_info_fetched_at: Option<DateTime<Utc>>,
}

/// Identity columns of a ship, refreshed on every ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct ShipIdentity {
    pub mmsi: Mmsi,
    pub name: String,
    pub type_code: Option<u8>,
    pub type_name: String,
}

/// Static vessel attributes returned by the vessel registry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VesselInfo {
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub callsign: Option<String>,
}

/// Direction of a reference line crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    EastToWest,
    WestToEast,
}

impl Direction {
    /// Direction of travel between two consecutive longitudes.
    ///
    /// Equal longitudes fall through to `WestToEast`.
    pub fn from_longitudes(prev_lon: f64, curr_lon: f64) -> Self {
        if prev_lon > curr_lon {
            Direction::EastToWest
        } else {
            Direction::WestToEast
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::EastToWest => "E->W",
            Direction::WestToEast => "W->E",
        }
    }
}

impl FromStr for Direction {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "E->W" => Ok(Direction::EastToWest),
            "W->E" => Ok(Direction::WestToEast),
            other => Err(TrackerError::ConfigurationError {
                message: format!("Unknown crossing direction '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference line crossing
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub mmsi: Mmsi,
    pub crossing_time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub direction: Direction,
}

/// Waiting zone on either side of the reference line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    East,
    West,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::East => "east",
            Zone::West => "west",
        }
    }
}

impl FromStr for Zone {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "east" => Ok(Zone::East),
            "west" => Ok(Zone::West),
            other => Err(TrackerError::ConfigurationError {
                message: format!("Unknown waiting zone '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loitering interval inside a waiting zone
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingEvent {
    pub mmsi: Mmsi,
    pub zone: Zone,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole minutes between start and end, rounded down
    pub duration_minutes: i64,
    /// Mean of the speed samples in knots, 0 when none were reported
    pub avg_speed: Option<f64>,
    /// Whether the vessel crossed the reference line after waiting
    pub crossed: bool,
    pub crossing_time: Option<DateTime<Utc>>,
}

/// Weather station observation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherObservation {
    pub timestamp: DateTime<Utc>,
    pub station_id: String,
    /// Mean wind speed in m/s
    pub wind_speed: Option<f64>,
    /// Wind direction in degrees
    pub wind_direction: Option<f64>,
    /// Maximum gust over the last hour in m/s
    pub wind_gust: Option<f64>,
    /// Significant wave height in metres
    pub wave_height: Option<f64>,
    /// Air temperature in degrees Celsius
    pub air_temperature: Option<f64>,
    /// Air pressure at sea level in hPa
    pub pressure: Option<f64>,
}

/// Per-day summary row
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub total_crossings: i64,
    pub avg_wind_speed: Option<f64>,
    pub max_wind_speed: Option<f64>,
    pub max_wind_gust: Option<f64>,
    pub avg_wave_height: Option<f64>,
    pub waiting_events: i64,
    pub avg_waiting_minutes: Option<f64>,
}

/// Half-open time interval `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, TrackerError> {
        if to <= from {
            return Err(TrackerError::InvalidInterval(format!(
                "window end {} is not after start {}",
                to, from
            )));
        }
        Ok(Self { from, to })
    }

    /// Window covering one UTC calendar date
    pub fn for_date(date: NaiveDate) -> Self {
        let from = date.and_time(chrono::NaiveTime::MIN).and_utc();
        Self {
            from,
            to: from + TimeDelta::days(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

/// Position record as delivered by the track source
///
/// See: https://developer.barentswatch.no/docs/AIS/historic-ais-api
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    /// Message timestamp, RFC 3339
    #[serde(default)]
    pub msgtime: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Speed over ground in knots, None if not available (=102.3)
    #[serde(default, deserialize_with = "deserialize_sog")]
    pub speed_over_ground: Option<f64>,
    /// Course over ground in degrees, None if not available (360)
    #[serde(default, deserialize_with = "deserialize_cog")]
    pub course_over_ground: Option<f64>,
    /// Heading in degrees (0-359), None if 511 = not available
    #[serde(default, deserialize_with = "deserialize_heading")]
    pub true_heading: Option<u16>,
    /// Name of the vessel, empty string if not available
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub name: Option<String>,
    /// AIS ship type code, None if undefined (0)
    #[serde(default, deserialize_with = "deserialize_ship_type")]
    pub ship_type: Option<u8>,
}

impl TrackPoint {
    /// Convert into a position, rejecting records without coordinates or
    /// with an unparseable timestamp.
    pub fn to_position(&self, mmsi: Mmsi) -> Result<Position, TrackerError> {
        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => (lat, lon),
            _ => {
                return Err(TrackerError::MalformedRecord(format!(
                    "position for {} has no coordinates",
                    mmsi
                )))
            }
        };
        let msgtime = self.msgtime.as_deref().ok_or_else(|| {
            TrackerError::MalformedRecord(format!("position for {} has no timestamp", mmsi))
        })?;
        let timestamp = DateTime::parse_from_rfc3339(msgtime)
            .map_err(|e| {
                TrackerError::MalformedRecord(format!("bad timestamp '{}': {}", msgtime, e))
            })?
            .with_timezone(&Utc);

        Ok(Position {
            mmsi,
            timestamp,
            lat,
            lon,
            sog: self.speed_over_ground,
            cog: self.course_over_ground,
            heading: self.true_heading,
        })
    }
}

/// Human readable name for an AIS ship type code
pub fn ship_type_name(type_code: Option<u8>) -> String {
    let Some(code) = type_code else {
        return "Unknown".to_string();
    };
    let name = match code {
        30 => "Fishing",
        31 => "Towing",
        32 => "Towing (large)",
        33 => "Dredging",
        34 => "Diving",
        35 => "Military",
        36 => "Sailing",
        37 => "Pleasure craft",
        40 => "High speed craft",
        41..=44 => "High speed craft (hazardous)",
        50 => "Pilot",
        51 => "Search and rescue",
        52 => "Tug",
        53 => "Port tender",
        54 => "Anti-pollution",
        55 => "Law enforcement",
        56 | 57 => "Spare",
        58 => "Medical",
        59 => "Non-combatant",
        60 | 65..=69 => "Passenger",
        61..=64 => "Passenger (hazardous)",
        70 => "Cargo",
        71..=74 => "Cargo (hazardous)",
        80 => "Tanker",
        81..=84 => "Tanker (hazardous)",
        90 => "Other",
        91..=94 => "Other (hazardous)",
        other => return format!("Type {}", other),
    };
    name.to_string()
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize_sog<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.filter(|v| (*v - 102.3).abs() > f64::EPSILON))
    }

    pub fn deserialize_cog<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.filter(|v| *v < 360.0))
    }

    pub fn deserialize_heading<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<u16>::deserialize(deserializer)?;
        Ok(value.filter(|v| *v < 360))
    }

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }

    pub fn deserialize_ship_type<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<u8>::deserialize(deserializer)?;
        Ok(value.filter(|v| *v != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_track_point() {
        let s = r#"{
            "msgtime": "2024-10-24T10:00:00+00:00",
            "latitude": 62.0,
            "longitude": 5.0,
            "speedOverGround": 15.0,
            "courseOverGround": 180.0,
            "trueHeading": 179,
            "name": " BERGSFJORD ",
            "shipType": 60
        }"#;
        let point: TrackPoint = serde_json::from_str(s).unwrap();
        assert_eq!(point.name.as_deref(), Some("BERGSFJORD"));
        assert_eq!(point.ship_type, Some(60));

        let mmsi = Mmsi::try_from(257_898_600u32).unwrap();
        let position = point.to_position(mmsi).unwrap();
        assert_eq!(
            position,
            Position {
                mmsi,
                timestamp: Utc.with_ymd_and_hms(2024, 10, 24, 10, 0, 0).unwrap(),
                lat: 62.0,
                lon: 5.0,
                sog: Some(15.0),
                cog: Some(180.0),
                heading: Some(179),
            }
        );
    }

    #[test]
    fn parse_track_point_nones() {
        let s = r#"{
            "msgtime": "2024-10-24T10:00:00Z",
            "latitude": 62.0,
            "longitude": 5.0,
            "speedOverGround": 102.3,
            "courseOverGround": 360.0,
            "trueHeading": 511,
            "name": "   ",
            "shipType": 0
        }"#;
        let point: TrackPoint = serde_json::from_str(s).unwrap();
        assert_eq!(point.speed_over_ground, None);
        assert_eq!(point.course_over_ground, None);
        assert_eq!(point.true_heading, None);
        assert_eq!(point.name, None);
        assert_eq!(point.ship_type, None);
    }

    #[test]
    fn malformed_track_points_are_rejected() {
        let mmsi = Mmsi::try_from(1u32).unwrap();
        let missing_lat = TrackPoint {
            msgtime: Some("2024-10-24T10:00:00Z".to_string()),
            longitude: Some(5.0),
            ..Default::default()
        };
        assert!(missing_lat.to_position(mmsi).is_err());

        let bad_time = TrackPoint {
            msgtime: Some("yesterday".to_string()),
            latitude: Some(62.0),
            longitude: Some(5.0),
            ..Default::default()
        };
        assert!(bad_time.to_position(mmsi).is_err());
    }

    #[test]
    fn mmsi_bounds() {
        assert!(Mmsi::try_from(999_999_999u32).is_ok());
        assert!(Mmsi::try_from(1_000_000_000u32).is_err());
        assert!(Mmsi::try_from(-1i64).is_err());
        assert_eq!(Mmsi::try_from("257898600").unwrap().value(), 257_898_600);
        assert!(Mmsi::try_from("abc").is_err());
    }

    #[test]
    fn ship_type_names() {
        assert_eq!(ship_type_name(None), "Unknown");
        assert_eq!(ship_type_name(Some(70)), "Cargo");
        assert_eq!(ship_type_name(Some(62)), "Passenger (hazardous)");
        assert_eq!(ship_type_name(Some(67)), "Passenger");
        assert_eq!(ship_type_name(Some(99)), "Type 99");
    }

    #[test]
    fn direction_tie_defaults_west_to_east() {
        assert_eq!(Direction::from_longitudes(5.3, 4.1), Direction::EastToWest);
        assert_eq!(Direction::from_longitudes(4.1, 5.3), Direction::WestToEast);
        assert_eq!(Direction::from_longitudes(5.0, 5.0), Direction::WestToEast);
        assert_eq!("E->W".parse::<Direction>().unwrap(), Direction::EastToWest);
    }

    #[test]
    fn window_for_date() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 15).unwrap();
        let window = TimeWindow::for_date(date);
        assert_eq!(window.from, Utc.with_ymd_and_hms(2024, 10, 15, 0, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 10, 15, 23, 59, 59).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2024, 10, 16, 0, 0, 0).unwrap()));
        assert!(TimeWindow::new(window.to, window.from).is_err());
    }
}
