//! A layer for raster tiles on the map.

use chrono::{DateTime, Utc};
use egui::{Color32, Painter, Response};
use std::{collections::HashMap, sync::Arc};

use crate::{
    MAX_ZOOM, MIN_ZOOM, Tile, TileId, draw_tile, failed_tile_at,
    layers::Layer,
    load_tile,
    projection::MapProjection,
    source::TileSource,
    time::{TimeDimension, TimeError},
    visible_tiles,
};

/// Largest number of tiles a layer keeps cached at its current zoom level.
pub const MAX_CACHED_TILES: usize = 256;

/// A layer that downloads, caches and renders the tiles of one [`TileSource`].
///
/// Nothing is downloaded until the layer is asked to handle input for a visible viewport.
pub struct TileLayer {
    tiles: HashMap<TileId, Tile>,
    visible_tiles: Vec<(TileId, egui::Pos2)>,
    /// Color tint applied to the tile images when rendering
    pub tint: Color32,
    min_zoom: u8,
    max_zoom: u8,
    time: Option<TimeDimension>,
    source: Arc<dyn TileSource>,
}

impl TileLayer {
    /// Creates a new tile layer for the given source.
    pub fn new(source: impl TileSource + 'static) -> Self {
        Self {
            tiles: Default::default(),
            visible_tiles: Default::default(),
            tint: Color32::WHITE,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            time: None,
            source: Arc::new(source),
        }
    }

    /// Sets the opacity, `0.0` being invisible and `1.0` opaque.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.set_opacity(opacity);
        self
    }

    /// Restricts the zoom levels at which the layer fetches and draws tiles.
    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Makes the layer temporal: every tile request carries the dimension's current instant.
    pub fn with_time_dimension(mut self, time: TimeDimension) -> Self {
        self.time = Some(time);
        self
    }

    /// The opacity derived from the tint's alpha.
    pub fn opacity(&self) -> f32 {
        self.tint.a() as f32 / 255.0
    }

    /// Sets the opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        let a = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.tint = Color32::from_rgba_unmultiplied(255, 255, 255, a);
    }

    /// Whether the layer fetches tiles at `zoom`.
    pub fn covers_zoom(&self, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
    }

    /// The layer's time dimension, if it has one.
    pub fn time_dimension(&self) -> Option<&TimeDimension> {
        self.time.as_ref()
    }

    /// Selects the time slice requested by the next tile fetches.
    ///
    /// Instants outside the dimension are rejected and leave the layer untouched. Accepting a new
    /// instant drops every cached tile.
    pub fn set_time_instant(&mut self, t: DateTime<Utc>) -> Result<(), TimeError> {
        let time = self
            .time
            .as_mut()
            .ok_or_else(|| TimeError::NotTemporal("tile layer".to_string()))?;
        if time.current() == t {
            return Ok(());
        }
        time.set_current(t)?;
        self.tiles.clear();
        self.visible_tiles.clear();
        Ok(())
    }

    /// Number of tiles in the cache, in any state.
    pub fn cached_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Drops cached tiles of other zoom levels. Past [`MAX_CACHED_TILES`], only the visible
    /// tiles are kept.
    fn prune(&mut self, zoom: u8) {
        self.tiles.retain(|id, _| id.z == zoom);
        if self.tiles.len() > MAX_CACHED_TILES {
            let visible = &self.visible_tiles;
            self.tiles
                .retain(|id, _| visible.iter().any(|(visible_id, _)| visible_id == id));
        }
    }

    /// Drops the visible tile list, so that nothing is drawn until the next input pass.
    pub(crate) fn hide(&mut self) {
        self.visible_tiles.clear();
    }
}

impl Layer for TileLayer {
    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if !self.covers_zoom(projection.zoom()) {
            self.visible_tiles.clear();
            return false;
        }

        self.visible_tiles = visible_tiles(projection).collect();
        self.prune(projection.zoom());
        let time = self.time.as_ref().map(TimeDimension::current);
        for (tile_id, _) in &self.visible_tiles {
            load_tile(
                &mut self.tiles,
                &self.source,
                time.as_ref(),
                &response.ctx,
                *tile_id,
            );
        }

        if let Some(hover_pos) = response.hover_pos() {
            if let Some(e) = failed_tile_at(&self.tiles, &self.visible_tiles, hover_pos) {
                response.clone().on_hover_text(format!("{}", e));
            }
        }
        false
    }

    fn draw(&self, painter: &Painter, _: &MapProjection) {
        for (tile_id, tile_pos) in &self.visible_tiles {
            draw_tile(&self.tiles, painter, tile_id, *tile_pos, self.tint);
        }
    }
}
