//! Permalinks of the map view, in the `#zoom/lat/lon/Layer,Layer` form of URL-hash sync.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::projection::GeoPos;

/// Errors raised while parsing a permalink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermalinkError {
    /// The string does not have the `zoom/lat/lon[/layers]` shape.
    #[error("Malformed permalink `{0}`")]
    Malformed(String),

    /// The zoom part is not a zoom level.
    #[error("Invalid zoom `{0}` in permalink")]
    InvalidZoom(String),

    /// A coordinate is not a finite number in range.
    #[error("Invalid coordinate `{0}` in permalink")]
    InvalidCoordinate(String),
}

/// A shareable description of the view and the visible layers.
#[derive(Clone, Debug, PartialEq)]
pub struct Permalink {
    /// Zoom level.
    pub zoom: u8,
    /// Map center.
    pub center: GeoPos,
    /// Permalink names of the active picker entries, base layer first.
    pub layers: Vec<String>,
}

impl Permalink {
    /// Decimal digits written for coordinates: enough to resolve a pixel at `zoom`.
    pub fn precision(zoom: u8) -> usize {
        if zoom <= 1 {
            return 0;
        }
        (zoom as f64).log2().ceil() as usize
    }
}

impl fmt::Display for Permalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = Self::precision(self.zoom);
        write!(
            f,
            "#{}/{:.*}/{:.*}",
            self.zoom, precision, self.center.lat, precision, self.center.lon
        )?;
        if !self.layers.is_empty() {
            write!(f, "/{}", self.layers.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for Permalink {
    type Err = PermalinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim().trim_start_matches('#');
        let parts: Vec<&str> = body.split('/').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(PermalinkError::Malformed(s.to_string()));
        }

        let zoom: u8 = parts[0]
            .parse()
            .map_err(|_| PermalinkError::InvalidZoom(parts[0].to_string()))?;
        let coordinate = |part: &str, limit: f64| -> Result<f64, PermalinkError> {
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.abs() <= limit)
                .ok_or_else(|| PermalinkError::InvalidCoordinate(part.to_string()))
        };
        let lat = coordinate(parts[1], 90.0)?;
        let lon = coordinate(parts[2], 180.0)?;

        let layers = parts
            .get(3)
            .map(|l| {
                l.split(',')
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            zoom,
            center: GeoPos { lon, lat },
            layers,
        })
    }
}
