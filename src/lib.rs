#![warn(missing_docs)]

//! Interactive map viewer for the Swiss Data Cube portal, built on `egui`.
//!
//! The crate provides a [`map::MapView`] widget that composites remote raster tiles (XYZ
//! tile servers and WMS endpoints) in z-index order, together with the portal's map
//! controls: zoom, default extent, fullscreen, geolocation, print, layer picker, time
//! slider, scale bar, mouse position and attribution. The [`ui`] module holds the
//! navigation bar, sidebar and dialog state of the surrounding application.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use sdc_map_viewer::{catalog::LayerCatalog, config::AppConfig, map::MapView};
//!
//! struct MyApp {
//!     map: MapView,
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default()
//!             .frame(egui::Frame::NONE)
//!             .show(ctx, |ui| {
//!                 ui.add(&mut self.map);
//!             });
//!     }
//! }
//!
//! fn main() -> eyre::Result<()> {
//!     let config = AppConfig::default();
//!     let catalog = LayerCatalog::from_config(&config)?;
//!     let map = MapView::initialize(&config, catalog)?;
//!     eframe::run_native(
//!         "map",
//!         eframe::NativeOptions::default(),
//!         Box::new(|_cc| Ok(Box::new(MyApp { map }))),
//!     )
//!     .map_err(|e| eyre::eyre!("{e}"))
//! }
//! ```

/// Application configuration.
pub mod config;

/// The eframe application shell.
pub mod app;
pub mod catalog;
pub mod controls;
#[cfg(feature = "geolocation")]
pub mod geolocate;
pub mod layers;
pub mod map;
pub mod permalink;
#[cfg(feature = "print")]
pub mod print;
pub mod projection;
pub mod source;
pub mod time;
pub mod ui;
pub mod viewport;

use chrono::{DateTime, Utc};
use egui::{Color32, Rect, Vec2, pos2};
use eyre::{Context, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::LayerError;
use crate::config::ConfigError;
use crate::projection::{MapProjection, lat_to_y, lon_to_x};
use crate::source::TileSource;

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The minimum zoom level supported by the widget.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level supported by the widget.
pub const MAX_ZOOM: u8 = 19;

// Reuse the reqwest client for all downloads by making it a static variable.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),

    /// The configuration cannot initialize a map.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A catalog layer could not be built.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// A layer picker entry named by the catalog or a caller does not exist.
    #[error("Unknown layer `{0}`")]
    UnknownLayer(String),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

/// The state of a tile in the cache.
pub(crate) enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// Returns the tiles covering the projection's widget rectangle, with their screen positions.
pub(crate) fn visible_tiles(
    projection: &MapProjection,
) -> impl Iterator<Item = (TileId, egui::Pos2)> + use<> {
    let zoom = projection.zoom();
    let rect = projection.widget_rect();
    let center = projection.unproject(rect.center());
    let center_x = lon_to_x(center.lon, zoom);
    let center_y = lat_to_y(center.lat, zoom);

    let widget_center_x = rect.width() / 2.0;
    let widget_center_y = rect.height() / 2.0;

    let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i64;
    let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i64;
    let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i64;
    let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i64;

    // Tiles outside the world do not exist.
    let world = 1_i64 << zoom;
    let rect_min = rect.min;
    (x_min.max(0)..=x_max.min(world - 1)).flat_map(move |x| {
        (y_min.max(0)..=y_max.min(world - 1)).map(move |y| {
            let tile_id = TileId {
                z: zoom,
                x: x as u32,
                y: y as u32,
            };
            let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
            let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
            (tile_id, rect_min + Vec2::new(screen_x, screen_y))
        })
    })
}

/// Starts downloading `tile_id` if it is not cached yet, and uploads finished downloads as
/// textures.
pub(crate) fn load_tile(
    tiles: &mut HashMap<TileId, Tile>,
    source: &Arc<dyn TileSource>,
    time: Option<&DateTime<Utc>>,
    ctx: &egui::Context,
    tile_id: TileId,
) {
    let tile_state = tiles.entry(tile_id).or_insert_with(|| {
        let url = source.tile_url(&tile_id, time);
        let promise =
            Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
                let result: Result<_, eyre::Report> = (|| {
                    debug!("Downloading tile from {}", &url);
                    let response = CLIENT.get(&url).send().map_err(MapError::from)?;

                    if !response.status().is_success() {
                        return Err(MapError::TileDownloadError(response.status().to_string()));
                    }

                    let bytes = response.bytes().map_err(MapError::from)?.to_vec();
                    let image = image::load_from_memory(&bytes)
                        .map_err(MapError::from)?
                        .to_rgba8();

                    let size = [image.width() as _, image.height() as _];
                    let pixels = image.into_raw();
                    Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
                })()
                .with_context(|| format!("Failed to download tile from {}", &url));

                result.map_err(Arc::new)
            });
        Tile::Loading(promise)
    });

    // If the tile is loading, check if the promise is ready and update the state so that the
    // tile can be drawn in this very frame.
    if let Tile::Loading(promise) = tile_state {
        if let Some(result) = promise.ready() {
            match result {
                Ok(color_image) => {
                    let texture = ctx.load_texture(
                        format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                        color_image.clone(),
                        Default::default(),
                    );
                    *tile_state = Tile::Loaded(texture);
                }
                Err(e) => {
                    error!("{:?}", e);
                    *tile_state = Tile::Failed(e.clone());
                }
            }
        } else {
            // The tile is still loading, so we need to tell egui to repaint.
            ctx.request_repaint();
        }
    }
}

/// Draws a single cached tile. Loading tiles are left transparent so that lower layers show
/// through; failed tiles get a red marker with the error on hover.
pub(crate) fn draw_tile(
    tiles: &HashMap<TileId, Tile>,
    painter: &egui::Painter,
    tile_id: &TileId,
    tile_pos: egui::Pos2,
    tint: Color32,
) {
    let tile_rect = Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

    match tiles.get(tile_id) {
        Some(Tile::Loaded(texture)) => {
            painter.image(
                texture.id(),
                tile_rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                tint,
            );
        }
        Some(Tile::Failed(_)) => {
            painter.rect_stroke(
                tile_rect,
                0.0,
                egui::Stroke::new(1.0, Color32::from_gray(160)),
                egui::StrokeKind::Inside,
            );
            painter.text(
                tile_rect.center(),
                egui::Align2::CENTER_CENTER,
                "!",
                egui::FontId::proportional(40.0),
                Color32::RED,
            );
        }
        Some(Tile::Loading(_)) | None => {}
    }
}

/// The error of a failed tile under `pos`, for hover text.
pub(crate) fn failed_tile_at(
    tiles: &HashMap<TileId, Tile>,
    visible: &[(TileId, egui::Pos2)],
    pos: egui::Pos2,
) -> Option<Arc<eyre::Report>> {
    visible.iter().find_map(|(tile_id, tile_pos)| {
        let rect = Rect::from_min_size(*tile_pos, Vec2::splat(TILE_SIZE as f32));
        match tiles.get(tile_id) {
            Some(Tile::Failed(e)) if rect.contains(pos) => Some(e.clone()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::GeoPos;

    #[test]
    fn visible_tiles_cover_widget() {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(512.0, 512.0));
        let projection = MapProjection::new(1, GeoPos { lon: 0.0, lat: 0.0 }, rect);
        let mut tiles: Vec<_> = visible_tiles(&projection).map(|(id, _)| (id.x, id.y)).collect();
        tiles.sort();
        assert_eq!(tiles, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn visible_tiles_skip_outside_world() {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(1024.0, 1024.0));
        let projection = MapProjection::new(0, GeoPos { lon: 0.0, lat: 0.0 }, rect);
        let tiles: Vec<_> = visible_tiles(&projection).collect();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].0, TileId { z: 0, x: 0, y: 0 });
        // The single world tile is centered in the widget.
        assert!((tiles[0].1.x - 384.0).abs() < 1e-3);
        assert!((tiles[0].1.y - 384.0).abs() < 1e-3);
    }

    #[test]
    fn map_error_messages() {
        let err = MapError::TileDownloadError("404 Not Found".to_string());
        assert_eq!(
            err.to_string(),
            "A map tile failed to download. HTTP Status: `404 Not Found`"
        );
        assert_eq!(
            MapError::UnknownLayer("Snow".to_string()).to_string(),
            "Unknown layer `Snow`"
        );
    }
}
