//! A layer showing the user's position and its accuracy circle.

use egui::{Color32, Painter, Response, Stroke};

use crate::{
    geolocate::Fix,
    layers::Layer,
    projection::{MapProjection, meters_per_pixel},
};

const MARKER_RADIUS: f32 = 6.0;

/// Draws the latest accepted fix.
pub struct LocationLayer {
    fix: Option<Fix>,
    popup: String,
    /// Fill and outline of the accuracy circle.
    pub circle_stroke: Stroke,
    /// Color of the position marker.
    pub marker_color: Color32,
}

impl Default for LocationLayer {
    fn default() -> Self {
        Self {
            fix: None,
            popup: String::new(),
            circle_stroke: Stroke::new(1.0, Color32::from_rgb(19, 106, 236)),
            marker_color: Color32::from_rgb(19, 106, 236),
        }
    }
}

impl LocationLayer {
    /// The shown fix.
    pub fn fix(&self) -> Option<&Fix> {
        self.fix.as_ref()
    }

    /// Shows `fix`, with `popup` as hover text on the marker.
    pub fn set_fix(&mut self, fix: Fix, popup: String) {
        self.fix = Some(fix);
        self.popup = popup;
    }

    /// Removes the marker.
    pub fn clear(&mut self) {
        self.fix = None;
        self.popup.clear();
    }

    /// Accuracy circle radius in screen pixels.
    fn accuracy_radius(fix: &Fix, zoom: u8) -> f32 {
        (fix.accuracy / meters_per_pixel(fix.position.lat, zoom)) as f32
    }
}

impl Layer for LocationLayer {
    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        let Some(fix) = &self.fix else {
            return false;
        };
        let marker = projection.project(fix.position);
        if let Some(hover) = response.hover_pos() {
            if hover.distance(marker) <= MARKER_RADIUS * 2.0 {
                response.clone().on_hover_text(self.popup.as_str());
            }
        }
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let Some(fix) = &self.fix else {
            return;
        };
        let center = projection.project(fix.position);
        let radius = Self::accuracy_radius(fix, projection.zoom());
        if radius > MARKER_RADIUS {
            painter.circle(
                center,
                radius,
                self.circle_stroke.color.gamma_multiply(0.15),
                self.circle_stroke,
            );
        }
        painter.circle(
            center,
            MARKER_RADIUS,
            self.marker_color,
            Stroke::new(2.0, Color32::WHITE),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::GeoPos;

    #[test]
    fn accuracy_radius_grows_with_zoom() {
        let fix = Fix {
            position: GeoPos { lon: 7.447, lat: 46.948 },
            accuracy: 1_000.0,
        };
        let r10 = LocationLayer::accuracy_radius(&fix, 10);
        let r11 = LocationLayer::accuracy_radius(&fix, 11);
        assert!((r11 / r10 - 2.0).abs() < 1e-4);
        // About 104 m per pixel at this latitude and zoom 10.
        assert!((r10 - 9.6).abs() < 0.2);
    }

    #[test]
    fn clear_removes_fix() {
        let mut layer = LocationLayer::default();
        layer.set_fix(
            Fix {
                position: GeoPos { lon: 8.0, lat: 46.0 },
                accuracy: 10.0,
            },
            "here".to_string(),
        );
        assert!(layer.fix().is_some());
        layer.clear();
        assert!(layer.fix().is_none());
    }
}
