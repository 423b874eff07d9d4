//! The declarative table of the portal's layers and the layer picker groups built on top of it.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::layers::tile::TileLayer;
use crate::source::{ImageFormat, InvalidEndpoint, WmsSource, XyzSource};
use crate::time::{TimeDimension, TimeError};

const MAPBOX_STREETS: &str = "https://api.tiles.mapbox.com/v4/{id}/{z}/{x}/{y}.png?access_token=pk.eyJ1IjoibWFwYm94IiwiYSI6ImNpejY4NXVycTA2emYycXBndHRqcmZ3N3gifQ.rJcFIG214AriISLbB6B5aw";
const USGS_IMAGERY: &str =
    "http://basemap.nationalmap.gov/arcgis/rest/services/USGSImageryOnly/MapServer/tile/{z}/{y}/{x}";
const USGS_ORTHO: &str = "http://raster.nationalmap.gov/arcgis/services/Orthoimagery/USGS_EROS_Ortho_SCALE/ImageServer/WMSServer?";

/// Errors raised while building layers from descriptors.
#[derive(Error, Debug)]
pub enum LayerError {
    /// The descriptor has no endpoint URL.
    #[error("Layer `{0}` has an empty endpoint URL")]
    EmptyEndpoint(String),

    /// The WMS endpoint is not a usable URL.
    #[error("Layer `{name}`: {source}")]
    InvalidEndpoint {
        /// The layer name.
        name: String,
        /// The URL error.
        #[source]
        source: InvalidEndpoint,
    },

    /// The requested image format cannot be decoded by the viewer.
    #[error("Layer `{name}` requests unsupported format `{format}`")]
    UnsupportedFormat {
        /// The layer name.
        name: String,
        /// The requested MIME type.
        format: String,
    },

    /// The opacity is outside `[0, 1]`.
    #[error("Layer `{name}` has opacity {opacity}, expected a value in [0, 1]")]
    InvalidOpacity {
        /// The layer name.
        name: String,
        /// The rejected opacity.
        opacity: f32,
    },

    /// The minimum zoom is above the maximum zoom.
    #[error("Layer `{name}` has min zoom {min} above max zoom {max}")]
    InvalidZoomRange {
        /// The layer name.
        name: String,
        /// Minimum zoom.
        min: u8,
        /// Maximum zoom.
        max: u8,
    },

    /// The time dimension of a temporal layer is malformed.
    #[error("Layer `{name}`: {source}")]
    Time {
        /// The layer name.
        name: String,
        /// The time error.
        #[source]
        source: TimeError,
    },

    /// A group or default refers to a descriptor or entry that does not exist.
    #[error("Unknown layer `{0}` referenced by the catalog")]
    UnknownLayer(String),

    /// Two descriptors share a name.
    #[error("Duplicate layer name `{0}`")]
    DuplicateLayer(String),

    /// The configuration the catalog is built from is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where a layer's images come from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceDescriptor {
    /// An XYZ tile server.
    Tiled {
        /// URL template with `{z}`, `{x}`, `{y}` and optionally `{id}`.
        url_template: String,
        /// Value substituted for `{id}`.
        id: Option<String>,
    },
    /// A WMS endpoint.
    Wms {
        /// Endpoint URL, the `GetMap` parameters are appended to it.
        endpoint: String,
        /// Remote layer name(s), comma separated.
        layers: String,
        /// MIME type of the requested images.
        format: String,
        /// Whether the server should render a transparent background.
        transparent: bool,
    },
}

/// The time dimension of a temporal layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeDescriptor {
    /// ISO-8601 interval, `start/end`.
    pub interval: String,
    /// ISO-8601 period between slices.
    pub period: String,
}

/// A link shown in the attribution control.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribution {
    /// Attribution text.
    pub text: String,
    /// Target of the link, if any.
    pub url: Option<String>,
}

impl Attribution {
    fn new(text: &str, url: Option<&str>) -> Self {
        Self {
            text: text.to_string(),
            url: url.map(str::to_string),
        }
    }
}

/// A declarative description of one remote raster layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerDescriptor {
    /// Unique name within the catalog.
    pub name: String,
    /// The remote source.
    pub source: SourceDescriptor,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Lowest zoom level at which the layer is drawn.
    pub min_zoom: u8,
    /// Highest zoom level at which the layer is drawn.
    pub max_zoom: u8,
    /// Stacking order: higher values are painted above lower ones.
    pub z_index: u32,
    /// Attribution, if the provider requires one.
    pub attribution: Option<Attribution>,
    /// Time dimension of temporal layers.
    pub time: Option<TimeDescriptor>,
}

impl LayerDescriptor {
    fn wms(name: &str, endpoint: &str, layers: &str, z_index: u32) -> Self {
        Self {
            name: name.to_string(),
            source: SourceDescriptor::Wms {
                endpoint: endpoint.to_string(),
                layers: layers.to_string(),
                format: ImageFormat::Png.mime().to_string(),
                transparent: true,
            },
            opacity: 1.0,
            min_zoom: crate::MIN_ZOOM,
            max_zoom: crate::MAX_ZOOM,
            z_index,
            attribution: None,
            time: None,
        }
    }

    fn tiled(name: &str, url_template: &str, id: Option<&str>, z_index: u32) -> Self {
        Self {
            name: name.to_string(),
            source: SourceDescriptor::Tiled {
                url_template: url_template.to_string(),
                id: id.map(str::to_string),
            },
            opacity: 1.0,
            min_zoom: crate::MIN_ZOOM,
            max_zoom: crate::MAX_ZOOM,
            z_index,
            attribution: None,
            time: None,
        }
    }

    fn zoom(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    fn format(mut self, image_format: ImageFormat) -> Self {
        if let SourceDescriptor::Wms { format, .. } = &mut self.source {
            *format = image_format.mime().to_string();
        }
        self
    }

    fn attributed(mut self, text: &str, url: Option<&str>) -> Self {
        self.attribution = Some(Attribution::new(text, url));
        self
    }
}

/// A layer built from a descriptor, ready to be attached to a map.
pub struct LayerHandle {
    name: String,
    z_index: u32,
    attribution: Option<Attribution>,
    legend_url: Option<String>,
    layer: TileLayer,
}

impl LayerHandle {
    /// The descriptor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stacking order.
    pub fn z_index(&self) -> u32 {
        self.z_index
    }

    /// The attribution to show while the layer is visible.
    pub fn attribution(&self) -> Option<&Attribution> {
        self.attribution.as_ref()
    }

    /// Legend image URL of WMS layers.
    pub fn legend_url(&self) -> Option<&str> {
        self.legend_url.as_deref()
    }

    /// The underlying tile layer.
    pub fn layer(&self) -> &TileLayer {
        &self.layer
    }

    /// The underlying tile layer, mutably.
    pub fn layer_mut(&mut self) -> &mut TileLayer {
        &mut self.layer
    }

    /// Whether the layer has a time dimension.
    pub fn is_temporal(&self) -> bool {
        self.layer.time_dimension().is_some()
    }

    /// Selects the time slice of a temporal layer; see [`TileLayer::set_time_instant`].
    pub fn set_time_instant(&mut self, t: DateTime<Utc>) -> Result<(), TimeError> {
        if !self.is_temporal() {
            return Err(TimeError::NotTemporal(self.name.clone()));
        }
        self.layer.set_time_instant(t)
    }
}

/// Builds a layer from its descriptor, validating the descriptor first. No network traffic
/// happens here.
pub fn build_layer(descriptor: &LayerDescriptor) -> Result<LayerHandle, LayerError> {
    let name = descriptor.name.clone();

    if !descriptor.opacity.is_finite() || !(0.0..=1.0).contains(&descriptor.opacity) {
        return Err(LayerError::InvalidOpacity {
            name,
            opacity: descriptor.opacity,
        });
    }
    if descriptor.min_zoom > descriptor.max_zoom {
        return Err(LayerError::InvalidZoomRange {
            name,
            min: descriptor.min_zoom,
            max: descriptor.max_zoom,
        });
    }

    let (layer, legend_url) = match &descriptor.source {
        SourceDescriptor::Tiled { url_template, id } => {
            if url_template.trim().is_empty() {
                return Err(LayerError::EmptyEndpoint(name));
            }
            (
                TileLayer::new(XyzSource::new(url_template.clone(), id.as_deref())),
                None,
            )
        }
        SourceDescriptor::Wms {
            endpoint,
            layers,
            format,
            transparent,
        } => {
            if endpoint.trim().is_empty() {
                return Err(LayerError::EmptyEndpoint(name));
            }
            let format =
                ImageFormat::from_mime(format).ok_or_else(|| LayerError::UnsupportedFormat {
                    name: name.clone(),
                    format: format.clone(),
                })?;
            let source = WmsSource::new(endpoint, layers.clone(), format, *transparent)
                .map_err(|source| LayerError::InvalidEndpoint {
                    name: name.clone(),
                    source,
                })?;
            let legend_url = source.legend_url();
            (TileLayer::new(source), Some(legend_url))
        }
    };

    let mut layer = layer
        .with_opacity(descriptor.opacity)
        .with_zoom_range(descriptor.min_zoom, descriptor.max_zoom);
    if let Some(time) = &descriptor.time {
        let dimension = TimeDimension::new(&time.interval, &time.period).map_err(|source| {
            LayerError::Time {
                name: name.clone(),
                source,
            }
        })?;
        layer = layer.with_time_dimension(dimension);
    }

    Ok(LayerHandle {
        name,
        z_index: descriptor.z_index,
        attribution: descriptor.attribution.clone(),
        legend_url,
        layer,
    })
}

/// One selectable line of the layer picker. An entry may switch several descriptors at once.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupEntry {
    /// Label shown in the picker.
    pub label: String,
    /// Short name used in permalinks.
    pub permalink: String,
    /// Descriptor names switched by this entry.
    pub layers: Vec<String>,
    /// Metadata record of the dataset, if published.
    pub metadata_url: Option<String>,
}

impl GroupEntry {
    fn new(label: &str, permalink: &str, layers: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            permalink: permalink.to_string(),
            layers: layers.iter().map(|l| l.to_string()).collect(),
            metadata_url: None,
        }
    }
}

/// A named collection of picker entries.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGroup {
    /// Group title.
    pub name: String,
    /// Exactly one entry is active in an exclusive group (base layers); otherwise entries toggle
    /// independently.
    pub exclusive: bool,
    /// Entries in display order.
    pub entries: Vec<GroupEntry>,
}

/// The full table of layers plus the picker layout and default selection.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerCatalog {
    descriptors: Vec<LayerDescriptor>,
    base_group: LayerGroup,
    overlay_groups: Vec<LayerGroup>,
    default_base: String,
    default_overlays: Vec<String>,
}

impl LayerCatalog {
    /// Assembles a catalog and checks that every group entry and default refers to something
    /// that exists.
    pub fn new(
        descriptors: Vec<LayerDescriptor>,
        base_group: LayerGroup,
        overlay_groups: Vec<LayerGroup>,
        default_base: impl Into<String>,
        default_overlays: Vec<String>,
    ) -> Result<Self, LayerError> {
        let mut names = HashSet::new();
        for d in &descriptors {
            if !names.insert(d.name.as_str()) {
                return Err(LayerError::DuplicateLayer(d.name.clone()));
            }
        }
        for group in std::iter::once(&base_group).chain(&overlay_groups) {
            for entry in &group.entries {
                if let Some(missing) = entry.layers.iter().find(|l| !names.contains(l.as_str())) {
                    return Err(LayerError::UnknownLayer(missing.clone()));
                }
            }
        }

        let catalog = Self {
            descriptors,
            base_group,
            overlay_groups,
            default_base: default_base.into(),
            default_overlays,
        };
        if catalog.base_entry(&catalog.default_base).is_none() {
            return Err(LayerError::UnknownLayer(catalog.default_base.clone()));
        }
        if let Some(missing) = catalog
            .default_overlays
            .iter()
            .find(|label| catalog.overlay_entry(label).is_none())
        {
            return Err(LayerError::UnknownLayer(missing.clone()));
        }
        Ok(catalog)
    }

    /// The portal's layers, pointing WMS overlays at the configured GeoServer host.
    pub fn from_config(config: &AppConfig) -> Result<Self, LayerError> {
        config.validate()?;
        let host = config.gs_host.as_str();
        let geo_admin = Some("https://data.geo.admin.ch");
        let sdc = Some("http://www.swissdatacube.ch");

        let descriptors = vec![
            LayerDescriptor::tiled("mapbox_streets", MAPBOX_STREETS, Some("mapbox.streets"), 1)
                .zoom(0, 19)
                .attributed(
                    "Map data © OpenStreetMap contributors, CC-BY-SA, Imagery © Mapbox",
                    Some("http://openstreetmap.org"),
                ),
            LayerDescriptor::tiled("usgs_imagery", USGS_IMAGERY, None, 2).zoom(0, 15),
            LayerDescriptor::wms("usgs_ortho", USGS_ORTHO, "0", 2)
                .format(ImageFormat::Jpeg)
                .zoom(16, 19)
                .attributed("Aerial Imagery courtesy USGS", None),
            LayerDescriptor::wms("l8_mosaic_2016", host, "sdc:L8_CHmosaic_2016", 3)
                .attributed("Swiss Data Cube data", sdc),
            LayerDescriptor {
                time: Some(TimeDescriptor {
                    interval: "2009-10-01/2009-12-01".to_string(),
                    period: "P1M".to_string(),
                }),
                ..LayerDescriptor::wms("snow", host, "sdc:snow", 4)
            }
            .attributed("Swiss Data Cube data", sdc),
            LayerDescriptor {
                opacity: 0.5,
                ..LayerDescriptor::wms("ch_mask", host, "sdc:ch_mask", 5)
            },
            LayerDescriptor::wms("canton_borders", host, "sdc:canton_borders", 6)
                .attributed("geo.admin.ch data", geo_admin),
            LayerDescriptor::wms("ch_borders", host, "sdc:ch_border", 7)
                .attributed("geo.admin.ch data", geo_admin),
        ];

        let base_group = LayerGroup {
            name: "Base Layers".to_string(),
            exclusive: true,
            entries: vec![
                GroupEntry::new("Base Map", "OSM", &["mapbox_streets"]),
                GroupEntry::new("Aerial Imagery", "Satellite", &["usgs_imagery", "usgs_ortho"]),
            ],
        };
        let borders = LayerGroup {
            name: "Borders".to_string(),
            exclusive: false,
            entries: vec![
                GroupEntry::new("Country", "Country", &["ch_borders"]),
                GroupEntry::new("Cantons", "Cantons", &["canton_borders"]),
                GroupEntry::new("Mask", "Mask", &["ch_mask"]),
            ],
        };
        let data = LayerGroup {
            name: "Data".to_string(),
            exclusive: false,
            entries: vec![
                GroupEntry {
                    metadata_url: config.csw_layers.first().cloned(),
                    ..GroupEntry::new("Mosaic 2016", "Mosaic", &["l8_mosaic_2016"])
                },
                GroupEntry::new("Snow cover", "Snow", &["snow"]),
            ],
        };

        Self::new(
            descriptors,
            base_group,
            vec![borders, data],
            "Base Map",
            vec!["Mask".to_string(), "Country".to_string()],
        )
    }

    /// All descriptors in table order.
    pub fn descriptors(&self) -> &[LayerDescriptor] {
        &self.descriptors
    }

    /// Looks up a descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&LayerDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// The mutually exclusive base layers.
    pub fn base_group(&self) -> &LayerGroup {
        &self.base_group
    }

    /// The independently toggleable overlay groups.
    pub fn overlay_groups(&self) -> &[LayerGroup] {
        &self.overlay_groups
    }

    /// Label of the base entry active at start-up.
    pub fn default_base(&self) -> &str {
        &self.default_base
    }

    /// Labels of the overlay entries visible at start-up.
    pub fn default_overlays(&self) -> &[String] {
        &self.default_overlays
    }

    /// Looks up a base entry by label.
    pub fn base_entry(&self, label: &str) -> Option<&GroupEntry> {
        self.base_group.entries.iter().find(|e| e.label == label)
    }

    /// Looks up an overlay entry by label.
    pub fn overlay_entry(&self, label: &str) -> Option<&GroupEntry> {
        self.overlay_groups
            .iter()
            .flat_map(|g| &g.entries)
            .find(|e| e.label == label)
    }

    /// Looks up any entry by its permalink name.
    pub fn entry_by_permalink(&self, permalink: &str) -> Option<&GroupEntry> {
        std::iter::once(&self.base_group)
            .chain(&self.overlay_groups)
            .flat_map(|g| &g.entries)
            .find(|e| e.permalink == permalink)
    }

    /// Builds every descriptor.
    pub fn build_all(&self) -> Result<Vec<LayerHandle>, LayerError> {
        self.descriptors.iter().map(build_layer).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn catalog() -> LayerCatalog {
        LayerCatalog::from_config(&AppConfig::default()).unwrap()
    }

    #[test]
    fn portal_catalog_builds() {
        let catalog = catalog();
        let handles = catalog.build_all().unwrap();
        assert_eq!(handles.len(), 8);
        assert_eq!(catalog.default_base(), "Base Map");
        assert_eq!(catalog.default_overlays(), &["Mask", "Country"]);
    }

    #[test]
    fn overlays_point_at_configured_host() {
        let config = AppConfig {
            gs_host: "https://geoserver.example.org/ows?".to_string(),
            ..AppConfig::default()
        };
        let catalog = LayerCatalog::from_config(&config).unwrap();
        match &catalog.descriptor("ch_borders").unwrap().source {
            SourceDescriptor::Wms { endpoint, layers, .. } => {
                assert_eq!(endpoint, "https://geoserver.example.org/ows?");
                assert_eq!(layers, "sdc:ch_border");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn invalid_config_fails_fast() {
        let config = AppConfig {
            gs_host: String::new(),
            ..AppConfig::default()
        };
        assert!(matches!(
            LayerCatalog::from_config(&config),
            Err(LayerError::Config(_))
        ));
    }

    #[test]
    fn mask_is_half_transparent() {
        let catalog = catalog();
        let mask = build_layer(catalog.descriptor("ch_mask").unwrap()).unwrap();
        assert_eq!(mask.layer().tint.a(), 128);
        assert_eq!(mask.z_index(), 5);
    }

    #[test]
    fn aerial_entry_switches_two_sources() {
        let catalog = catalog();
        let aerial = catalog.base_entry("Aerial Imagery").unwrap();
        assert_eq!(aerial.layers, vec!["usgs_imagery", "usgs_ortho"]);
        let ortho = build_layer(catalog.descriptor("usgs_ortho").unwrap()).unwrap();
        assert!(!ortho.layer().covers_zoom(15));
        assert!(ortho.layer().covers_zoom(16));
    }

    #[test]
    fn entries_by_permalink() {
        let catalog = catalog();
        assert_eq!(catalog.entry_by_permalink("OSM").unwrap().label, "Base Map");
        assert_eq!(catalog.entry_by_permalink("Mosaic").unwrap().label, "Mosaic 2016");
        assert!(catalog.entry_by_permalink("Nope").is_none());
        assert!(
            catalog
                .overlay_entry("Mosaic 2016")
                .unwrap()
                .metadata_url
                .as_deref()
                .unwrap()
                .contains("sdc:L8_CHmosaic_2016")
        );
    }

    #[test]
    fn rejects_empty_endpoint() {
        let d = LayerDescriptor::wms("broken", "", "sdc:x", 1);
        assert!(matches!(build_layer(&d), Err(LayerError::EmptyEndpoint(n)) if n == "broken"));
    }

    #[test]
    fn rejects_unsupported_format() {
        let d = LayerDescriptor {
            source: SourceDescriptor::Wms {
                endpoint: "https://example.org/ows".to_string(),
                layers: "sdc:x".to_string(),
                format: "image/tiff".to_string(),
                transparent: true,
            },
            ..LayerDescriptor::wms("tiff", "https://example.org/ows", "sdc:x", 1)
        };
        assert!(matches!(
            build_layer(&d),
            Err(LayerError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn rejects_opacity_outside_unit_range() {
        for opacity in [-0.1, 1.5, f32::NAN] {
            let d = LayerDescriptor {
                opacity,
                ..LayerDescriptor::wms("o", "https://example.org/ows", "sdc:x", 1)
            };
            assert!(matches!(
                build_layer(&d),
                Err(LayerError::InvalidOpacity { .. })
            ));
        }
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let d = LayerDescriptor::tiled("t", "https://example.org/{z}/{x}/{y}.png", None, 1).zoom(10, 5);
        assert!(matches!(
            build_layer(&d),
            Err(LayerError::InvalidZoomRange { min: 10, max: 5, .. })
        ));
    }

    #[test]
    fn rejects_unknown_group_reference() {
        let descriptors = vec![LayerDescriptor::tiled("a", "https://example.org/{z}/{x}/{y}", None, 1)];
        let base = LayerGroup {
            name: "Base".to_string(),
            exclusive: true,
            entries: vec![GroupEntry::new("A", "A", &["a", "b"])],
        };
        assert!(matches!(
            LayerCatalog::new(descriptors, base, vec![], "A", vec![]),
            Err(LayerError::UnknownLayer(name)) if name == "b"
        ));
    }

    #[test]
    fn temporal_handle() {
        let catalog = catalog();
        let mut snow = build_layer(catalog.descriptor("snow").unwrap()).unwrap();
        assert!(snow.is_temporal());
        let dec = Utc.with_ymd_and_hms(2009, 12, 1, 0, 0, 0).unwrap();
        snow.set_time_instant(dec).unwrap();
        assert_eq!(snow.layer().time_dimension().unwrap().current(), dec);

        let mut borders = build_layer(catalog.descriptor("ch_borders").unwrap()).unwrap();
        assert!(matches!(
            borders.set_time_instant(dec),
            Err(TimeError::NotTemporal(name)) if name == "ch_borders"
        ));
        assert!(borders.legend_url().unwrap().contains("GetLegendGraphic"));
    }
}
