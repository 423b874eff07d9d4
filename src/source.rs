//! Remote raster sources: plain XYZ tile servers and OGC WMS endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use thiserror::Error;

use crate::TileId;
use crate::projection::tile_bbox_3857;

/// Raster encodings a WMS endpoint can be asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// `image/png`
    #[default]
    Png,
    /// `image/jpeg`
    Jpeg,
}

impl ImageFormat {
    /// The MIME type used in the `format` request parameter.
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Parses a MIME type. Returns `None` for encodings the viewer cannot decode.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// A WMS endpoint that is not an absolute URL.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid endpoint URL `{url}`: {reason}")]
pub struct InvalidEndpoint {
    /// The rejected URL.
    pub url: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Something that can turn a tile id into a download URL.
pub trait TileSource: Send + Sync {
    /// Returns the URL for a given tile, requesting the given time slice if the source has one.
    fn tile_url(&self, tile: &TileId, time: Option<&DateTime<Utc>>) -> String;
}

/// A `{z}/{x}/{y}` tile server.
///
/// ```
/// use sdc_map_viewer::{TileId, source::{TileSource, XyzSource}};
///
/// let source = XyzSource::new("https://tiles.example.org/{id}/{z}/{x}/{y}.png", Some("streets"));
/// let url = source.tile_url(&TileId { z: 8, x: 133, y: 90 }, None);
/// assert_eq!(url, "https://tiles.example.org/streets/8/133/90.png");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct XyzSource {
    url_template: String,
    id: Option<String>,
}

impl XyzSource {
    /// Creates a source from a URL template with `{z}`, `{x}`, `{y}` and optional `{id}` placeholders.
    pub fn new(url_template: impl Into<String>, id: Option<&str>) -> Self {
        Self {
            url_template: url_template.into(),
            id: id.map(str::to_string),
        }
    }
}

impl TileSource for XyzSource {
    fn tile_url(&self, tile: &TileId, _time: Option<&DateTime<Utc>>) -> String {
        let url = self
            .url_template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string());
        match &self.id {
            Some(id) => url.replace("{id}", id),
            None => url,
        }
    }
}

/// A WMS 1.1.1 `GetMap` endpoint requested tile by tile in EPSG:3857.
#[derive(Clone, Debug, PartialEq)]
pub struct WmsSource {
    endpoint: Url,
    layers: String,
    format: ImageFormat,
    transparent: bool,
}

impl WmsSource {
    /// Creates a WMS source. Fails if `endpoint` is not an absolute URL.
    pub fn new(
        endpoint: &str,
        layers: impl Into<String>,
        format: ImageFormat,
        transparent: bool,
    ) -> Result<Self, InvalidEndpoint> {
        let endpoint = Url::parse(endpoint).map_err(|e| InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            layers: layers.into(),
            format,
            transparent,
        })
    }

    /// The remote layer name(s).
    pub fn layers(&self) -> &str {
        &self.layers
    }

    /// A `GetLegendGraphic` URL for the first requested layer, shown in the legend dialog.
    pub fn legend_url(&self) -> String {
        let layer = self.layers.split(',').next().unwrap_or_default();
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("service", "WMS")
            .append_pair("request", "GetLegendGraphic")
            .append_pair("version", "1.1.1")
            .append_pair("format", ImageFormat::Png.mime())
            .append_pair("layer", layer);
        url.to_string()
    }
}

impl TileSource for WmsSource {
    fn tile_url(&self, tile: &TileId, time: Option<&DateTime<Utc>>) -> String {
        let [min_x, min_y, max_x, max_y] = tile_bbox_3857(tile.z, tile.x, tile.y);
        let size = crate::TILE_SIZE.to_string();

        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("service", "WMS")
                .append_pair("request", "GetMap")
                .append_pair("version", "1.1.1")
                .append_pair("layers", &self.layers)
                .append_pair("styles", "")
                .append_pair("format", self.format.mime())
                .append_pair("transparent", if self.transparent { "true" } else { "false" })
                .append_pair("width", &size)
                .append_pair("height", &size)
                .append_pair("srs", "EPSG:3857")
                .append_pair("bbox", &format!("{min_x},{min_y},{max_x},{max_y}"));
            if let Some(time) = time {
                query.append_pair("time", &time.to_rfc3339_opts(SecondsFormat::Millis, true));
            }
        }
        url.to_string()
    }
}
