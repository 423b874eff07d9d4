//! Application configuration: version metadata, service endpoints and the initial map view.
//!
//! The configuration is read once at start-up and never mutated afterwards. Keys use the
//! camelCase names of the portal's `config.js`:
//!
//! ```
//! use sdc_map_viewer::config::AppConfig;
//!
//! let config = AppConfig::from_json_str(r#"{
//!     "appVersion": "1.3.1",
//!     "appVersionDate": "[23.09.2019]",
//!     "gsHost": "https://geoserver.swissdatacube.org/geoserver/ows?",
//!     "mapZoom": "8",
//!     "mapMinZoom": 7,
//!     "mapMaxZoom": 15,
//!     "mapCenter": [46.78, 8.22],
//!     "cswLayer1": "https://example.org/csw?id=sdc:L8_CHmosaic_2016"
//! }"#).unwrap();
//! assert_eq!(config.map_zoom, 8);
//! ```

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::projection::{GeoBounds, GeoPos};

const CSW_KEY_PREFIX: &str = "cswLayer";

/// Errors raised while loading or validating the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Unable to read configuration file `{path}`")]
    Io {
        /// The path that was read.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or a required field is missing or malformed.
    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field is present but its value is unusable.
    #[error("Invalid configuration field `{field}`: {reason}")]
    InvalidField {
        /// The camelCase name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// The portal configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// Application version, display only.
    pub app_version: String,
    /// Release date of the version, display only.
    pub app_version_date: String,
    /// Base URL of every WMS request.
    pub gs_host: String,
    /// Metadata record (CSW) URLs, ordered by their `cswLayerN` suffix. Display only.
    pub csw_layers: Vec<String>,
    /// Initial center of the map.
    pub map_center: GeoPos,
    /// Initial zoom level.
    pub map_zoom: u8,
    /// Lowest zoom level the user may reach.
    pub map_min_zoom: u8,
    /// Highest zoom level the user may reach.
    pub map_max_zoom: u8,
    /// Rectangle the map center may not leave.
    pub map_max_bounds: GeoBounds,
    /// Endpoint queried by the geolocation control. `None` disables geolocation.
    pub geolocation_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    app_version: String,
    app_version_date: String,
    gs_host: String,
    #[serde(deserialize_with = "de_zoom")]
    map_zoom: u8,
    #[serde(deserialize_with = "de_zoom")]
    map_min_zoom: u8,
    #[serde(deserialize_with = "de_zoom")]
    map_max_zoom: u8,
    map_center: [f64; 2],
    #[serde(default)]
    map_max_bounds: Option<[[f64; 2]; 2]>,
    #[serde(default = "default_geolocation_url")]
    geolocation_url: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// Zoom levels are stored as strings in older configurations (`'8'`), accept both.
fn de_zoom<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Zoom {
        Number(u8),
        Text(String),
    }

    match Zoom::deserialize(deserializer)? {
        Zoom::Number(z) => Ok(z),
        Zoom::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid zoom level `{s}`"))),
    }
}

fn default_geolocation_url() -> Option<String> {
    Some("https://ipapi.co/json/".to_string())
}

fn default_max_bounds() -> GeoBounds {
    GeoBounds {
        south_west: GeoPos::from_lat_lon([45.6755, 5.7349]),
        north_east: GeoPos::from_lat_lon([47.9163, 10.6677]),
    }
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let mut numbered = Vec::new();
        for (key, value) in raw.extra {
            let Some(suffix) = key.strip_prefix(CSW_KEY_PREFIX) else {
                continue;
            };
            let index: u32 = suffix
                .parse()
                .map_err(|_| ConfigError::invalid("cswLayerN", format!("bad key `{key}`")))?;
            let url = value
                .as_str()
                .ok_or_else(|| ConfigError::invalid("cswLayerN", format!("`{key}` is not a string")))?
                .to_string();
            numbered.push((index, url));
        }
        numbered.sort_by_key(|(index, _)| *index);

        let map_max_bounds = match raw.map_max_bounds {
            Some([sw, ne]) => GeoBounds {
                south_west: GeoPos::from_lat_lon(sw),
                north_east: GeoPos::from_lat_lon(ne),
            },
            None => default_max_bounds(),
        };

        let config = Self {
            app_version: raw.app_version,
            app_version_date: raw.app_version_date,
            gs_host: raw.gs_host,
            csw_layers: numbered.into_iter().map(|(_, url)| url).collect(),
            map_center: GeoPos::from_lat_lon(raw.map_center),
            map_zoom: raw.map_zoom,
            map_min_zoom: raw.map_min_zoom,
            map_max_zoom: raw.map_max_zoom,
            map_max_bounds,
            geolocation_url: raw.geolocation_url.filter(|url| !url.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }
}

impl AppConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        log::info!(
            "Loaded configuration {} {} from {}",
            config.app_version,
            config.app_version_date,
            path.display()
        );
        Ok(config)
    }

    /// Checks the relations between fields that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gs_host.trim().is_empty() {
            return Err(ConfigError::invalid("gsHost", "must not be empty"));
        }
        if self.map_min_zoom > self.map_max_zoom {
            return Err(ConfigError::invalid(
                "mapMinZoom",
                format!("{} is above mapMaxZoom {}", self.map_min_zoom, self.map_max_zoom),
            ));
        }
        if !(self.map_min_zoom..=self.map_max_zoom).contains(&self.map_zoom) {
            return Err(ConfigError::invalid(
                "mapZoom",
                format!(
                    "{} is outside [{}, {}]",
                    self.map_zoom, self.map_min_zoom, self.map_max_zoom
                ),
            ));
        }
        if !self.map_max_bounds.is_ordered() {
            return Err(ConfigError::invalid(
                "mapMaxBounds",
                "south-west corner must be below and left of the north-east corner",
            ));
        }
        if !self.map_max_bounds.contains(self.map_center) {
            return Err(ConfigError::invalid(
                "mapCenter",
                "must lie inside mapMaxBounds",
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let csw = |id: &str| {
            format!(
                "https://geoserver.swissdatacube.org/geoserver/ows?request=GetRecordById&service=CSW&version=2.0.2&elementSetName=full&id={id}&outputSchema=http://www.isotc211.org/2005/gmd"
            )
        };
        Self {
            app_version: "1.3.1".to_string(),
            app_version_date: "[23.09.2019]".to_string(),
            gs_host: "https://geoserver.swissdatacube.org/geoserver/ows?".to_string(),
            csw_layers: vec![
                csw("sdc:L8_CHmosaic_2016"),
                csw("sdc:clipch_95_051"),
                csw("sdc:clipch_05_171"),
                csw("sdc:diff_all_CH"),
                csw("atlas:sites"),
            ],
            map_center: GeoPos::from_lat_lon([46.78, 8.22]),
            map_zoom: 8,
            map_min_zoom: 7,
            map_max_zoom: 15,
            map_max_bounds: default_max_bounds(),
            geolocation_url: default_geolocation_url(),
        }
    }
}
