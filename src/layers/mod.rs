//! Layers for the map view that can handle input and draw on top of each other in z-index
//! order.
//!
use egui::{Painter, Response};

use crate::projection::MapProjection;

/// Raster tile layers (XYZ and WMS).
pub mod tile;

/// Geolocation marker layer.
#[cfg(feature = "geolocation")]
pub mod location;

/// A trait for map layers.
pub trait Layer {
    /// Handles user input for the layer. Returns `true` if the input was handled and should not be
    /// processed further by the map.
    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool;

    /// Draws the layer.
    fn draw(&self, painter: &Painter, projection: &MapProjection);
}
