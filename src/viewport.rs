//! The view of the map: center, zoom, pan bounds and the active layer selection.

use crate::projection::{GeoBounds, GeoPos};

/// Viewport state owned by [`crate::map::MapView`].
///
/// Center and zoom always stay within the configured zoom range and pan bounds; every setter
/// clamps.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportState {
    center: GeoPos,
    zoom: u8,
    min_zoom: u8,
    max_zoom: u8,
    max_bounds: GeoBounds,
    base_layer: String,
    overlays: Vec<String>,
    fullscreen: bool,
}

impl ViewportState {
    /// Creates a viewport, clamping `center` and `zoom` into the given limits.
    pub fn new(center: GeoPos, zoom: u8, min_zoom: u8, max_zoom: u8, max_bounds: GeoBounds) -> Self {
        let min_zoom = min_zoom.max(crate::MIN_ZOOM);
        let max_zoom = max_zoom.min(crate::MAX_ZOOM).max(min_zoom);
        let mut viewport = Self {
            center,
            zoom,
            min_zoom,
            max_zoom,
            max_bounds,
            base_layer: String::new(),
            overlays: Vec::new(),
            fullscreen: false,
        };
        viewport.set_view(center, zoom);
        viewport
    }

    /// The geographical center.
    pub fn center(&self) -> GeoPos {
        self.center
    }

    /// The zoom level.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The lowest reachable zoom level.
    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    /// The highest reachable zoom level.
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// The rectangle the center may not leave.
    pub fn max_bounds(&self) -> GeoBounds {
        self.max_bounds
    }

    /// Moves the view, clamping both values.
    pub fn set_view(&mut self, center: GeoPos, zoom: u8) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.center = self.max_bounds.clamp(center);
    }

    /// Moves the center, clamped to the pan bounds.
    pub fn pan_to(&mut self, center: GeoPos) {
        self.center = self.max_bounds.clamp(center);
    }

    /// Sets the zoom, clamped to the zoom range. Returns whether it changed.
    pub fn set_zoom(&mut self, zoom: u8) -> bool {
        let zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        let changed = zoom != self.zoom;
        self.zoom = zoom;
        changed
    }

    /// One level closer. Returns whether the zoom changed.
    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.zoom.saturating_add(1))
    }

    /// One level further. Returns whether the zoom changed.
    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.zoom.saturating_sub(1))
    }

    /// Label of the active base layer entry.
    pub fn base_layer(&self) -> &str {
        &self.base_layer
    }

    /// Labels of the active overlay entries, in activation order.
    pub fn overlays(&self) -> &[String] {
        &self.overlays
    }

    /// Whether the overlay entry `label` is active.
    pub fn is_overlay_active(&self, label: &str) -> bool {
        self.overlays.iter().any(|o| o == label)
    }

    /// Whether the map fills the screen.
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub(crate) fn set_base_layer(&mut self, label: &str) {
        self.base_layer = label.to_string();
    }

    /// Returns whether the selection changed.
    pub(crate) fn set_overlay(&mut self, label: &str, active: bool) -> bool {
        match (self.is_overlay_active(label), active) {
            (false, true) => {
                self.overlays.push(label.to_string());
                true
            }
            (true, false) => {
                self.overlays.retain(|o| o != label);
                true
            }
            _ => false,
        }
    }

    /// Returns whether the flag changed.
    pub(crate) fn set_fullscreen(&mut self, fullscreen: bool) -> bool {
        let changed = self.fullscreen != fullscreen;
        self.fullscreen = fullscreen;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swiss_bounds() -> GeoBounds {
        GeoBounds {
            south_west: GeoPos::from_lat_lon([45.6755, 5.7349]),
            north_east: GeoPos::from_lat_lon([47.9163, 10.6677]),
        }
    }

    fn viewport() -> ViewportState {
        ViewportState::new(GeoPos::from_lat_lon([46.78, 8.22]), 8, 7, 15, swiss_bounds())
    }

    #[test]
    fn new_keeps_valid_view() {
        let v = viewport();
        assert_eq!(v.center(), GeoPos { lon: 8.22, lat: 46.78 });
        assert_eq!(v.zoom(), 8);
    }

    #[test]
    fn new_clamps_zoom_and_center() {
        let v = ViewportState::new(GeoPos { lon: 0.0, lat: 0.0 }, 3, 7, 15, swiss_bounds());
        assert_eq!(v.zoom(), 7);
        assert_eq!(v.center(), GeoPos { lon: 5.7349, lat: 45.6755 });
    }

    #[test]
    fn zoom_steps_stop_at_limits() {
        let mut v = viewport();
        assert!(v.zoom_out());
        assert!(!v.zoom_out());
        assert_eq!(v.zoom(), 7);

        assert!(v.set_zoom(200));
        assert!(!v.zoom_in());
        assert_eq!(v.zoom(), 15);
    }

    #[test]
    fn pan_is_clamped() {
        let mut v = viewport();
        v.pan_to(GeoPos { lon: 12.0, lat: 46.0 });
        assert_eq!(v.center(), GeoPos { lon: 10.6677, lat: 46.0 });
    }

    #[test]
    fn overlays_toggle_independently() {
        let mut v = viewport();
        assert!(v.set_overlay("Mask", true));
        assert!(!v.set_overlay("Mask", true));
        assert!(v.set_overlay("Country", true));
        assert!(v.set_overlay("Mask", false));
        assert_eq!(v.overlays(), &["Country"]);
    }

    #[test]
    fn fullscreen_flag_reports_changes() {
        let mut v = viewport();
        assert!(v.set_fullscreen(true));
        assert!(!v.set_fullscreen(true));
        assert!(v.is_fullscreen());
    }
}
