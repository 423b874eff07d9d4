//! Web-Mercator projection helpers.

use egui::Rect;

use crate::TILE_SIZE;

/// Half the circumference of the earth in EPSG:3857 meters.
const ORIGIN_SHIFT: f64 = 20_037_508.342_789_244;

/// A geographical position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeoPos {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl GeoPos {
    /// Builds a position from the `[lat, lon]` pair order used by the portal configuration.
    pub fn from_lat_lon(pair: [f64; 2]) -> Self {
        Self {
            lon: pair[1],
            lat: pair[0],
        }
    }
}

/// A rectangle in geographical coordinates, given by its south-west and north-east corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    /// South-west corner.
    pub south_west: GeoPos,
    /// North-east corner.
    pub north_east: GeoPos,
}

impl GeoBounds {
    /// Whether the bounds are non-empty and correctly ordered.
    pub fn is_ordered(&self) -> bool {
        self.south_west.lat < self.north_east.lat && self.south_west.lon < self.north_east.lon
    }

    /// Whether `pos` lies inside the bounds (edges included).
    pub fn contains(&self, pos: GeoPos) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&pos.lat)
            && (self.south_west.lon..=self.north_east.lon).contains(&pos.lon)
    }

    /// Moves `pos` to the nearest point inside the bounds.
    pub fn clamp(&self, pos: GeoPos) -> GeoPos {
        GeoPos {
            lon: pos.lon.clamp(self.south_west.lon, self.north_east.lon),
            lat: pos.lat.clamp(self.south_west.lat, self.north_east.lat),
        }
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

/// The EPSG:3857 bounding box `[min_x, min_y, max_x, max_y]` of a tile, as sent in WMS `bbox`.
pub(crate) fn tile_bbox_3857(z: u8, x: u32, y: u32) -> [f64; 4] {
    let tiles = 2.0_f64.powi(z as i32);
    let span = 2.0 * ORIGIN_SHIFT / tiles;
    let min_x = -ORIGIN_SHIFT + x as f64 * span;
    let max_y = ORIGIN_SHIFT - y as f64 * span;
    [min_x, max_y - span, min_x + span, max_y]
}

/// Ground resolution in meters per pixel at the given latitude and zoom.
pub(crate) fn meters_per_pixel(lat: f64, zoom: u8) -> f64 {
    2.0 * ORIGIN_SHIFT * lat.to_radians().cos() / (TILE_SIZE as f64 * 2.0_f64.powi(zoom as i32))
}

/// A helper for converting between geographical and screen coordinates.
pub struct MapProjection {
    zoom: u8,
    center_lon: f64,
    center_lat: f64,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection`.
    pub(crate) fn new(zoom: u8, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center_lon: center.lon,
            center_lat: center.lat,
            widget_rect,
        }
    }

    /// The zoom level the projection was built for.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The screen rectangle of the map widget.
    pub fn widget_rect(&self) -> Rect {
        self.widget_rect
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> egui::Pos2 {
        let center_x = lon_to_x(self.center_lon, self.zoom);
        let center_y = lat_to_y(self.center_lat, self.zoom);

        let tile_x = lon_to_x(geo_pos.lon, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE as f64;
        let dy = (tile_y - center_y) * TILE_SIZE as f64;

        let widget_center = self.widget_rect.center();
        widget_center + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: egui::Pos2) -> GeoPos {
        let rel_pos = screen_pos - self.widget_rect.min;
        let widget_center_x = self.widget_rect.width() as f64 / 2.0;
        let widget_center_y = self.widget_rect.height() as f64 / 2.0;

        let center_x = lon_to_x(self.center_lon, self.zoom);
        let center_y = lat_to_y(self.center_lat, self.zoom);

        let target_x = center_x + (rel_pos.x as f64 - widget_center_x) / TILE_SIZE as f64;
        let target_y = center_y + (rel_pos.y as f64 - widget_center_y) / TILE_SIZE as f64;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_coord_conversion_roundtrip() {
        let zoom: u8 = 10;
        for (lon, lat) in [(8.22, 46.78), (-122.4194, 37.7749)] {
            let final_lon = x_to_lon(lon_to_x(lon, zoom), zoom);
            let final_lat = y_to_lat(lat_to_y(lat, zoom), zoom);

            assert!((lon - final_lon).abs() < EPSILON);
            assert!((lat - final_lat).abs() < EPSILON);
        }
    }

    #[test]
    fn test_y_to_lat_conversion() {
        // y, zoom, expected_lat
        let test_cases = vec![
            (0.5, 0, 0.0),
            (128.0, 8, 0.0),
            (0.0, 0, 85.0511287798),
            (1.0, 0, -85.0511287798),
            (256.0, 8, -85.0511287798),
            // London
            (85.12653378959828, 8, 51.5074),
        ];

        for (y, zoom, expected_lat) in test_cases {
            assert!((y_to_lat(y, zoom) - expected_lat).abs() < EPSILON);
        }
    }

    #[test]
    fn test_lon_to_x_conversion() {
        // lon, zoom, expected_x
        let test_cases = vec![
            (0.0, 0, 0.5),
            (0.0, 8, 128.0),
            (-180.0, 0, 0.0),
            (180.0, 8, 256.0),
            // London
            (-0.1275, 8, 127.90933333333333),
        ];

        for (lon, zoom, expected_x) in test_cases {
            assert!((lon_to_x(lon, zoom) - expected_x).abs() < EPSILON);
        }
    }

    #[test]
    fn tile_bbox_covers_world_at_zoom_zero() {
        let [min_x, min_y, max_x, max_y] = tile_bbox_3857(0, 0, 0);
        assert!((min_x + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((min_y + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_x - ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_y - ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn tile_bbox_quadrant() {
        // The south-east tile at zoom 1 spans [0, -shift] .. [shift, 0].
        let [min_x, min_y, max_x, max_y] = tile_bbox_3857(1, 1, 1);
        assert!(min_x.abs() < 1e-6);
        assert!((min_y + ORIGIN_SHIFT).abs() < 1e-6);
        assert!((max_x - ORIGIN_SHIFT).abs() < 1e-6);
        assert!(max_y.abs() < 1e-6);
    }

    #[test]
    fn meters_per_pixel_at_equator() {
        assert!((meters_per_pixel(0.0, 0) - 156_543.033_928_04).abs() < 1e-3);
        assert!((meters_per_pixel(60.0, 1) - 156_543.033_928_04 / 4.0).abs() < 1e-3);
    }

    #[test]
    fn bounds_clamp_and_contains() {
        let bounds = GeoBounds {
            south_west: GeoPos::from_lat_lon([45.6755, 5.7349]),
            north_east: GeoPos::from_lat_lon([47.9163, 10.6677]),
        };
        assert!(bounds.is_ordered());
        assert!(bounds.contains(GeoPos::from_lat_lon([46.78, 8.22])));

        let clamped = bounds.clamp(GeoPos { lon: 20.0, lat: 40.0 });
        assert_eq!(clamped, GeoPos { lon: 10.6677, lat: 45.6755 });
    }

    #[test]
    fn project_unproject_roundtrip() {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), egui::vec2(800.0, 600.0));
        let center = GeoPos::from_lat_lon([46.78, 8.22]);
        let projection = MapProjection::new(8, center, rect);

        let screen = projection.project(center);
        assert!((screen.x - 400.0).abs() < 1e-3);
        assert!((screen.y - 300.0).abs() < 1e-3);

        let geo = projection.unproject(pos2(400.0, 300.0));
        assert!((geo.lon - center.lon).abs() < 1e-6);
        assert!((geo.lat - center.lat).abs() < 1e-6);
    }
}
