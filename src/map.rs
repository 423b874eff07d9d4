//! The map view: viewport, catalog layers in z-index order, and the map controls.

use chrono::{DateTime, Utc};
use egui::{Color32, Rect, Response, Sense, Ui, Widget};
use log::{info, warn};

use crate::{
    MapError, TILE_SIZE,
    catalog::{Attribution, LayerCatalog, LayerHandle},
    config::AppConfig,
    controls::{self, ButtonBarState, ControlAction, LayerPicker, TimeSlider},
    layers::Layer,
    permalink::Permalink,
    projection::{GeoPos, MapProjection, lat_to_y, lon_to_x, meters_per_pixel, x_to_lon, y_to_lat},
    time::{TimeDimension, TimeError},
    ui::ViewportService,
    viewport::ViewportState,
};

#[cfg(feature = "geolocation")]
use crate::{
    geolocate::{GeolocationError, LocateControl, LocateUpdate},
    layers::location::LocationLayer,
};
#[cfg(feature = "print")]
use crate::print::{PrintControl, PrintError, PrintMode};

/// How long a failure message stays over the map, in seconds.
const NOTICE_SECS: f64 = 5.0;

/// Something that happened to the map, for the surrounding application.
#[derive(Clone, Debug, PartialEq)]
pub enum MapEvent {
    /// The map went fullscreen.
    EnteredFullscreen,
    /// The map left fullscreen.
    ExitedFullscreen,
    /// Another base entry became active.
    BaseLayerChanged(String),
    /// An overlay entry was shown or hidden.
    OverlayChanged {
        /// Entry label.
        label: String,
        /// Whether it is now visible.
        active: bool,
    },
    /// Temporal layers switched to another time slice.
    TimeChanged(DateTime<Utc>),
    /// A print was saved to the given file.
    #[cfg(feature = "print")]
    Printed(std::path::PathBuf),
}

struct LayerSlot {
    handle: LayerHandle,
    visible: bool,
}

/// The map view widget.
///
/// Add it to a [`Ui`] with `ui.add(&mut map_view)`.
pub struct MapView {
    viewport: ViewportState,
    catalog: LayerCatalog,
    /// Sorted by z-index, ties in catalog order.
    slots: Vec<LayerSlot>,
    home: (GeoPos, u8),
    time: Option<TimeDimension>,
    mouse_pos: Option<GeoPos>,

    rect: Option<Rect>,
    screen: Option<Rect>,
    resize_pending: bool,
    resize_count: usize,

    events: Vec<MapEvent>,
    fullscreen_command: Option<bool>,
    notice: Option<(String, f64)>,

    picker: LayerPicker,
    slider: TimeSlider,
    #[cfg(feature = "geolocation")]
    locate: LocateControl,
    #[cfg(feature = "geolocation")]
    location: LocationLayer,
    #[cfg(feature = "print")]
    print: PrintControl,
}

impl MapView {
    /// Builds the map from the configuration and the catalog: view from the config, every
    /// catalog layer built, the catalog's default base and overlays visible.
    pub fn initialize(config: &AppConfig, catalog: LayerCatalog) -> Result<Self, MapError> {
        config.validate()?;

        let viewport = ViewportState::new(
            config.map_center,
            config.map_zoom,
            config.map_min_zoom,
            config.map_max_zoom,
            config.map_max_bounds,
        );

        let mut slots: Vec<LayerSlot> = catalog
            .build_all()?
            .into_iter()
            .map(|handle| LayerSlot {
                handle,
                visible: false,
            })
            .collect();
        // Stable: equal z-indices keep catalog order.
        slots.sort_by_key(|slot| slot.handle.z_index());

        let time = slots
            .iter()
            .find_map(|slot| slot.handle.layer().time_dimension().cloned());

        let default_base = catalog.default_base().to_string();
        let default_overlays = catalog.default_overlays().to_vec();

        let mut map = Self {
            home: (viewport.center(), viewport.zoom()),
            viewport,
            catalog,
            slots,
            time,
            mouse_pos: None,
            rect: None,
            screen: None,
            resize_pending: false,
            resize_count: 0,
            events: Vec::new(),
            fullscreen_command: None,
            notice: None,
            picker: LayerPicker::default(),
            slider: TimeSlider::default(),
            #[cfg(feature = "geolocation")]
            locate: LocateControl::from_config(config),
            #[cfg(feature = "geolocation")]
            location: LocationLayer::default(),
            #[cfg(feature = "print")]
            print: PrintControl::default(),
        };

        map.select_base_layer(&default_base)?;
        for label in &default_overlays {
            map.set_overlay(label, true)?;
        }
        map.events.clear();

        info!(
            "Map initialized at {:.3}, {:.3} zoom {} with {} layers",
            map.viewport.center().lat,
            map.viewport.center().lon,
            map.viewport.zoom(),
            map.slots.len()
        );
        Ok(map)
    }

    /// The view state.
    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// The layer table.
    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    /// The geographical position under the mouse pointer, if any.
    pub fn mouse_pos(&self) -> Option<GeoPos> {
        self.mouse_pos
    }

    /// Looks up a built layer by descriptor name.
    pub fn layer(&self, name: &str) -> Option<&LayerHandle> {
        self.slots
            .iter()
            .map(|slot| &slot.handle)
            .find(|handle| handle.name() == name)
    }

    /// Looks up a built layer by descriptor name, mutably.
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut LayerHandle> {
        self.slots
            .iter_mut()
            .map(|slot| &mut slot.handle)
            .find(|handle| handle.name() == name)
    }

    /// Makes `label` the only active base entry.
    pub fn select_base_layer(&mut self, label: &str) -> Result<(), MapError> {
        if self.catalog.base_entry(label).is_none() {
            return Err(MapError::UnknownLayer(label.to_string()));
        }
        if self.viewport.base_layer() != label {
            self.viewport.set_base_layer(label);
            self.events
                .push(MapEvent::BaseLayerChanged(label.to_string()));
            self.update_visibility();
        }
        Ok(())
    }

    /// Shows or hides the overlay entry `label`. Other entries are not affected.
    pub fn set_overlay(&mut self, label: &str, active: bool) -> Result<(), MapError> {
        if self.catalog.overlay_entry(label).is_none() {
            return Err(MapError::UnknownLayer(label.to_string()));
        }
        if self.viewport.set_overlay(label, active) {
            self.events.push(MapEvent::OverlayChanged {
                label: label.to_string(),
                active,
            });
            self.update_visibility();
        }
        Ok(())
    }

    /// Flips the overlay entry `label`; returns whether it is now visible.
    pub fn toggle_overlay(&mut self, label: &str) -> Result<bool, MapError> {
        let active = !self.viewport.is_overlay_active(label);
        self.set_overlay(label, active)?;
        Ok(active)
    }

    fn update_visibility(&mut self) {
        let mut names: Vec<&str> = Vec::new();
        if let Some(entry) = self.catalog.base_entry(self.viewport.base_layer()) {
            names.extend(entry.layers.iter().map(String::as_str));
        }
        for label in self.viewport.overlays() {
            if let Some(entry) = self.catalog.overlay_entry(label) {
                names.extend(entry.layers.iter().map(String::as_str));
            }
        }
        for slot in &mut self.slots {
            slot.visible = names.contains(&slot.handle.name());
            if !slot.visible {
                slot.handle.layer_mut().hide();
            }
        }
    }

    /// Names of the visible layers, bottom first.
    pub fn draw_order(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|slot| slot.visible)
            .map(|slot| slot.handle.name())
            .collect()
    }

    /// Attributions of the visible layers, without duplicates.
    pub fn attributions(&self) -> Vec<Attribution> {
        let mut out: Vec<Attribution> = Vec::new();
        for slot in self.slots.iter().filter(|slot| slot.visible) {
            if let Some(a) = slot.handle.attribution() {
                if !out.contains(a) {
                    out.push(a.clone());
                }
            }
        }
        out
    }

    /// Number of [`ViewportService::resize`] requests received.
    pub fn resize_count(&self) -> usize {
        self.resize_count
    }

    /// Enters or leaves fullscreen mode.
    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        if !self.viewport.set_fullscreen(fullscreen) {
            return;
        }
        let event = if fullscreen {
            info!("enterFullscreen");
            MapEvent::EnteredFullscreen
        } else {
            info!("exitFullscreen");
            MapEvent::ExitedFullscreen
        };
        self.events.push(event);
        self.fullscreen_command = Some(fullscreen);
        self.resize_pending = true;
    }

    /// Takes the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.events)
    }

    /// The time dimension driven by the slider, if any layer is temporal.
    pub fn time_dimension(&self) -> Option<&TimeDimension> {
        self.time.as_ref()
    }

    /// Switches every temporal layer to `t`. Nothing changes if any of them rejects it.
    pub fn set_time_instant(&mut self, t: DateTime<Utc>) -> Result<(), TimeError> {
        let Some(time) = &mut self.time else {
            return Err(TimeError::NotTemporal("map".to_string()));
        };
        let checked = time.check(t).and_then(|_| {
            self.slots
                .iter()
                .filter_map(|slot| slot.handle.layer().time_dimension())
                .try_for_each(|dimension| dimension.check(t).map(|_| ()))
        });
        if let Err(e) = checked {
            warn!("Rejected time {}: {}", t, e);
            return Err(e);
        }

        time.set_current(t)?;
        for slot in self.slots.iter_mut().filter(|slot| slot.handle.is_temporal()) {
            slot.handle.set_time_instant(t)?;
        }
        self.events.push(MapEvent::TimeChanged(t));
        Ok(())
    }

    /// Moves the view, clamped to the zoom range and pan bounds.
    pub fn set_view(&mut self, center: GeoPos, zoom: u8) {
        self.viewport.set_view(center, zoom);
    }

    /// Returns to the configured center and zoom.
    pub fn go_home(&mut self) {
        let (center, zoom) = self.home;
        self.viewport.set_view(center, zoom);
    }

    /// The current view and layer selection as a permalink.
    pub fn permalink(&self) -> Permalink {
        let mut layers = Vec::new();
        if let Some(entry) = self.catalog.base_entry(self.viewport.base_layer()) {
            layers.push(entry.permalink.clone());
        }
        for label in self.viewport.overlays() {
            if let Some(entry) = self.catalog.overlay_entry(label) {
                layers.push(entry.permalink.clone());
            }
        }
        Permalink {
            zoom: self.viewport.zoom(),
            center: self.viewport.center(),
            layers,
        }
    }

    /// Restores a view from a permalink. Unknown layer names are skipped. When the link names
    /// layers, overlays it does not name are hidden.
    pub fn apply_permalink(&mut self, link: &Permalink) {
        self.viewport.set_view(link.center, link.zoom);
        if link.layers.is_empty() {
            return;
        }

        let mut overlays = Vec::new();
        for name in &link.layers {
            let Some(entry) = self.catalog.entry_by_permalink(name) else {
                warn!("Ignoring unknown layer `{}` in permalink", name);
                continue;
            };
            let label = entry.label.clone();
            if self.catalog.base_entry(&label).is_some() {
                // Known label, cannot fail.
                let _ = self.select_base_layer(&label);
            } else {
                overlays.push(label);
            }
        }

        let active: Vec<String> = self.viewport.overlays().to_vec();
        for label in active.iter().filter(|l| !overlays.contains(l)) {
            let _ = self.set_overlay(label, false);
        }
        for label in &overlays {
            let _ = self.set_overlay(label, true);
        }
    }

    /// Applies a control action. Missing targets are ignored.
    pub fn apply(&mut self, action: ControlAction, now: f64) {
        match action {
            ControlAction::ZoomIn => {
                self.viewport.zoom_in();
            }
            ControlAction::ZoomOut => {
                self.viewport.zoom_out();
            }
            ControlAction::Home => self.go_home(),
            ControlAction::ToggleFullscreen => {
                let fullscreen = !self.viewport.is_fullscreen();
                self.set_fullscreen(fullscreen);
            }
            #[cfg(feature = "geolocation")]
            ControlAction::ToggleLocate => {
                self.locate.toggle(now);
                if !self.locate.is_active() {
                    self.location.clear();
                }
            }
            #[cfg(feature = "print")]
            ControlAction::Print(mode) => {
                if let Err(e) = self.print(mode) {
                    self.notice = Some((e.to_string(), now));
                }
            }
            ControlAction::SelectBase(label) => {
                let _ = self.select_base_layer(&label);
            }
            ControlAction::SetOverlay(label, active) => {
                let _ = self.set_overlay(&label, active);
            }
            ControlAction::SetTime(t) => {
                if let Err(e) = self.set_time_instant(t) {
                    self.notice = Some((e.to_string(), now));
                }
            }
        }
    }

    /// Saves an image of the map on the next frames. Fails while another print is running.
    #[cfg(feature = "print")]
    pub fn print(&mut self, mode: PrintMode) -> Result<(), PrintError> {
        self.print.request(mode).inspect_err(|e| warn!("{}", e))
    }

    /// The failure message currently shown over the map, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_ref().map(|(text, _)| text.as_str())
    }

    /// The geolocation control.
    #[cfg(feature = "geolocation")]
    pub fn locate_control(&self) -> &LocateControl {
        &self.locate
    }

    /// Replaces the geolocation control, e.g. to use another position provider.
    #[cfg(feature = "geolocation")]
    pub fn set_locate_control(&mut self, control: LocateControl) {
        self.locate = control;
        self.location.clear();
    }

    #[cfg(feature = "geolocation")]
    fn poll_location(&mut self, now: f64, busy: bool) {
        match self.locate.poll(now, busy) {
            Some(LocateUpdate::Fix(fix)) => {
                if self.viewport.max_bounds().contains(fix.position) {
                    let popup = self.locate.popup_text(&fix);
                    self.location.set_fix(fix, popup);
                    if self.locate.options().keep_current_zoom {
                        self.viewport.pan_to(fix.position);
                    } else {
                        self.viewport.set_view(fix.position, self.viewport.max_zoom());
                    }
                } else {
                    self.locate.fail(GeolocationError::OutsideBounds);
                    self.location.clear();
                    self.notice = Some((GeolocationError::OutsideBounds.to_string(), now));
                }
            }
            Some(LocateUpdate::Failed(e)) => {
                self.location.clear();
                self.notice = Some((e.to_string(), now));
            }
            Some(LocateUpdate::Dropped) | None => {}
        }
    }

    /// Picks the rectangle to lay the map out in. A new container size is only picked up after
    /// [`ViewportService::resize`], a window resize, or user interaction with the map.
    fn adopt_rect(&mut self, ui: &Ui, allocated: Rect, response: &Response) -> Rect {
        let screen = ui.ctx().input(|i| i.screen_rect());
        let interacted = response.dragged()
            || response.double_clicked()
            || (response.hovered() && ui.input(|i| i.raw_scroll_delta.y != 0.0));

        let rect = match self.rect {
            Some(rect)
                if !self.resize_pending
                    && !interacted
                    && self.screen == Some(screen) =>
            {
                Rect::from_min_size(allocated.min, rect.size())
            }
            _ => allocated,
        };
        self.rect = Some(rect);
        self.screen = Some(screen);
        self.resize_pending = false;
        rect
    }

    /// Handles user input for panning and zooming, adapted to the pan bounds and zoom range.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        let zoom = self.viewport.zoom();
        let center = self.viewport.center();

        if response.dragged() {
            let delta = response.drag_delta();
            let center_x = lon_to_x(center.lon, zoom) - (delta.x as f64 / TILE_SIZE as f64);
            let center_y = lat_to_y(center.lat, zoom) - (delta.y as f64 / TILE_SIZE as f64);
            self.viewport.pan_to(GeoPos {
                lon: x_to_lon(center_x, zoom),
                lat: y_to_lat(center_y, zoom),
            });
        }

        let projection = MapProjection::new(zoom, self.viewport.center(), *rect);

        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let target = projection.unproject(pointer_pos);
                self.viewport.set_view(target, zoom.saturating_add(1));
            }
        }

        self.mouse_pos = None;
        if response.hovered() {
            if let Some(mouse_pos) = response.hover_pos() {
                let target = projection.unproject(mouse_pos);
                self.mouse_pos = Some(target);

                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    let new_zoom = if scroll > 0.0 {
                        zoom.saturating_add(1)
                    } else {
                        zoom.saturating_sub(1)
                    };
                    if self.viewport.set_zoom(new_zoom) {
                        // Keep the position under the mouse where it is.
                        let new_zoom = self.viewport.zoom();
                        let mouse_rel = mouse_pos - rect.center();
                        let center_x = lon_to_x(target.lon, new_zoom)
                            - mouse_rel.x as f64 / TILE_SIZE as f64;
                        let center_y = lat_to_y(target.lat, new_zoom)
                            - mouse_rel.y as f64 / TILE_SIZE as f64;
                        self.viewport.pan_to(GeoPos {
                            lon: x_to_lon(center_x, new_zoom),
                            lat: y_to_lat(center_y, new_zoom),
                        });
                    }
                }
            }
        }
    }

    fn show_controls(&mut self, ui: &Ui, rect: Rect, now: f64) {
        let ctx = ui.ctx().clone();
        let id = ui.id().with("map_controls");
        let mut actions = controls::button_bar(
            &ctx,
            id,
            rect,
            &ButtonBarState {
                fullscreen: self.viewport.is_fullscreen(),
                can_zoom_in: self.viewport.zoom() < self.viewport.max_zoom(),
                can_zoom_out: self.viewport.zoom() > self.viewport.min_zoom(),
                #[cfg(feature = "geolocation")]
                locating: self.locate.is_active(),
                #[cfg(not(feature = "geolocation"))]
                locating: false,
            },
        );
        actions.extend(
            self.picker
                .show(&ctx, id, rect, &self.catalog, &self.viewport),
        );
        if let Some(time) = &self.time {
            actions.extend(self.slider.show(&ctx, id, rect, time));
        }

        let center = self.viewport.center();
        controls::readouts(
            &ctx,
            id,
            rect,
            meters_per_pixel(center.lat, self.viewport.zoom()),
            self.mouse_pos,
        );
        controls::attribution(&ctx, id, rect, &self.attributions());

        if let Some((text, since)) = &self.notice {
            if now - since < NOTICE_SECS {
                controls::notice(&ctx, id, rect, text);
                ctx.request_repaint_after(std::time::Duration::from_millis(250));
            } else {
                self.notice = None;
            }
        }

        for action in actions {
            self.apply(action, now);
        }
    }
}

impl ViewportService for MapView {
    fn resize(&mut self) {
        self.resize_pending = true;
        self.resize_count += 1;
    }
}

impl Widget for &mut MapView {
    fn ui(self, ui: &mut Ui) -> Response {
        let (allocated, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));
        let now = ui.input(|i| i.time);

        if let Some(fullscreen) = self.fullscreen_command.take() {
            ui.ctx()
                .send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
        }

        let rect = self.adopt_rect(ui, allocated, &response);
        self.handle_input(ui, &rect, &response);

        #[cfg(feature = "geolocation")]
        {
            let busy = response.dragged() || response.is_pointer_button_down_on();
            self.poll_location(now, busy);
            if self.locate.is_active() {
                ui.ctx()
                    .request_repaint_after(std::time::Duration::from_millis(500));
            }
        }

        let projection = MapProjection::new(self.viewport.zoom(), self.viewport.center(), rect);
        for slot in self.slots.iter_mut().filter(|slot| slot.visible) {
            slot.handle.layer_mut().handle_input(&response, &projection);
        }
        #[cfg(feature = "geolocation")]
        self.location.handle_input(&response, &projection);

        let painter = ui.painter_at(allocated);
        painter.rect_filled(allocated, 0.0, Color32::from_rgb(220, 220, 220));
        for slot in self.slots.iter().filter(|slot| slot.visible) {
            slot.handle.layer().draw(&painter, &projection);
        }
        #[cfg(feature = "geolocation")]
        self.location.draw(&painter, &projection);

        #[cfg(feature = "print")]
        let hide_controls = self.print.hides_controls();
        #[cfg(not(feature = "print"))]
        let hide_controls = false;

        if !hide_controls {
            self.show_controls(ui, allocated, now);
        }

        #[cfg(feature = "print")]
        match self.print.poll(ui.ctx(), allocated) {
            Some(Ok(path)) => self.events.push(MapEvent::Printed(path)),
            Some(Err(e)) => {
                warn!("Print failed: {}", e);
                self.notice = Some((e.to_string(), now));
            }
            None => {}
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn map() -> MapView {
        let config = AppConfig::default();
        let catalog = LayerCatalog::from_config(&config).unwrap();
        MapView::initialize(&config, catalog).unwrap()
    }

    #[test]
    fn initial_view_from_config() {
        let map = map();
        assert_eq!(map.viewport().center(), GeoPos::from_lat_lon([46.78, 8.22]));
        assert_eq!(map.viewport().zoom(), 8);
        assert_eq!(map.viewport().base_layer(), "Base Map");
        assert_eq!(map.viewport().overlays(), &["Mask", "Country"]);
        assert_eq!(map.draw_order(), vec!["mapbox_streets", "ch_mask", "ch_borders"]);
    }

    #[test]
    fn zoom_out_stops_at_min_zoom() {
        let config = AppConfig {
            map_zoom: 3,
            map_min_zoom: 3,
            ..AppConfig::default()
        };
        let catalog = LayerCatalog::from_config(&config).unwrap();
        let mut map = MapView::initialize(&config, catalog).unwrap();
        assert_eq!(map.viewport().zoom(), 3);
        map.apply(ControlAction::ZoomOut, 0.0);
        assert_eq!(map.viewport().zoom(), 3);
    }

    #[test]
    fn stacking_ignores_toggle_order() {
        let mut map = map();
        map.set_overlay("Country", false).unwrap();
        map.set_overlay("Mask", false).unwrap();

        map.set_overlay("Country", true).unwrap();
        map.set_overlay("Snow cover", true).unwrap();
        map.set_overlay("Cantons", true).unwrap();
        map.set_overlay("Mosaic 2016", true).unwrap();
        map.set_overlay("Mask", true).unwrap();

        assert_eq!(
            map.draw_order(),
            vec![
                "mapbox_streets",
                "l8_mosaic_2016",
                "snow",
                "ch_mask",
                "canton_borders",
                "ch_borders",
            ]
        );
    }

    #[test]
    fn exactly_one_base_layer() {
        let mut map = map();
        map.select_base_layer("Aerial Imagery").unwrap();
        let order = map.draw_order();
        assert!(!order.contains(&"mapbox_streets"));
        assert_eq!(&order[..2], &["usgs_imagery", "usgs_ortho"]);

        map.select_base_layer("Base Map").unwrap();
        let order = map.draw_order();
        assert!(order.contains(&"mapbox_streets"));
        assert!(!order.contains(&"usgs_imagery"));
        assert!(!order.contains(&"usgs_ortho"));

        assert!(matches!(
            map.select_base_layer("Topo"),
            Err(MapError::UnknownLayer(_))
        ));
        assert_eq!(map.viewport().base_layer(), "Base Map");
    }

    #[test]
    fn overlays_leave_base_alone() {
        let mut map = map();
        map.select_base_layer("Aerial Imagery").unwrap();
        assert!(map.toggle_overlay("Cantons").unwrap());
        assert!(!map.toggle_overlay("Mask").unwrap());
        assert_eq!(map.viewport().base_layer(), "Aerial Imagery");
        assert_eq!(map.viewport().overlays(), &["Country", "Cantons"]);
    }

    #[test]
    fn fullscreen_events() {
        let mut map = map();
        map.set_fullscreen(true);
        map.set_fullscreen(true);
        map.apply(ControlAction::ToggleFullscreen, 0.0);
        assert_eq!(
            map.drain_events(),
            vec![MapEvent::EnteredFullscreen, MapEvent::ExitedFullscreen]
        );
        assert!(map.drain_events().is_empty());
    }

    #[test]
    fn time_outside_range_is_rejected() {
        let mut map = map();
        let start = Utc.with_ymd_and_hms(2009, 10, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();

        assert!(matches!(
            map.set_time_instant(late),
            Err(TimeError::OutOfRange { .. })
        ));
        assert_eq!(map.time_dimension().unwrap().current(), start);
        assert_eq!(
            map.layer("snow").unwrap().layer().time_dimension().unwrap().current(),
            start
        );

        let dec = Utc.with_ymd_and_hms(2009, 12, 1, 0, 0, 0).unwrap();
        map.set_time_instant(dec).unwrap();
        assert_eq!(map.time_dimension().unwrap().current(), dec);
        assert_eq!(
            map.layer("snow").unwrap().layer().time_dimension().unwrap().current(),
            dec
        );
        assert_eq!(map.drain_events(), vec![MapEvent::TimeChanged(dec)]);
    }

    #[test]
    fn home_restores_configured_view() {
        let mut map = map();
        map.set_view(GeoPos { lon: 7.0, lat: 46.0 }, 12);
        map.apply(ControlAction::Home, 0.0);
        assert_eq!(map.viewport().center(), GeoPos::from_lat_lon([46.78, 8.22]));
        assert_eq!(map.viewport().zoom(), 8);
    }

    #[test]
    fn permalink_round_trip() {
        let mut map = map();
        assert_eq!(map.permalink().to_string(), "#8/46.780/8.220/OSM,Mask,Country");

        let link: Permalink = "#10/46.948/7.447/Satellite,Cantons,Bogus".parse().unwrap();
        map.apply_permalink(&link);
        assert_eq!(map.viewport().zoom(), 10);
        assert_eq!(map.viewport().base_layer(), "Aerial Imagery");
        assert_eq!(map.viewport().overlays(), &["Cantons"]);
        assert_eq!(map.permalink().to_string(), "#10/46.9480/7.4470/Satellite,Cantons");
    }

    #[test]
    fn resize_requests_are_counted() {
        let mut map = map();
        let service: &mut dyn ViewportService = &mut map;
        service.resize();
        service.resize();
        assert_eq!(map.resize_count(), 2);
    }

    #[test]
    fn attributions_follow_visibility() {
        let mut map = map();
        let texts: Vec<_> = map.attributions().into_iter().map(|a| a.text).collect();
        assert_eq!(
            texts,
            vec![
                "Map data © OpenStreetMap contributors, CC-BY-SA, Imagery © Mapbox",
                "geo.admin.ch data",
            ]
        );
        map.set_overlay("Cantons", true).unwrap();
        assert_eq!(map.attributions().len(), 2);
    }

    #[test]
    fn rejected_time_shows_notice() {
        let mut map = map();
        assert_eq!(map.notice(), None);
        let late = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        map.apply(ControlAction::SetTime(late), 1.0);
        assert!(map.notice().unwrap().contains("out of range"));
    }

    #[cfg(feature = "print")]
    #[test]
    fn second_print_shows_notice() {
        let mut map = map();
        map.apply(ControlAction::Print(PrintMode::Current), 0.0);
        assert_eq!(map.notice(), None);
        map.apply(ControlAction::Print(PrintMode::A4Portrait), 0.1);
        assert_eq!(map.notice(), Some(PrintError::Busy.to_string().as_str()));
    }

    #[cfg(feature = "geolocation")]
    mod location {
        use super::*;
        use crate::geolocate::{
            Fix, GeolocationError, LocateControl, LocateOptions, LocateState, LocationProvider,
            OUTSIDE_BOUNDS_MSG,
        };
        use std::sync::{Arc, Mutex};
        use std::thread::sleep;
        use std::time::Duration;

        struct SharedProvider(Arc<Mutex<Fix>>);

        impl LocationProvider for SharedProvider {
            fn locate(&self) -> Result<Fix, GeolocationError> {
                Ok(*self.0.lock().unwrap())
            }
        }

        fn fix(lat: f64, lon: f64) -> Fix {
            Fix {
                position: GeoPos::from_lat_lon([lat, lon]),
                accuracy: 30.0,
            }
        }

        fn poll_until(map: &mut MapView, now: f64, done: impl Fn(&MapView) -> bool) {
            for _ in 0..200 {
                map.poll_location(now, false);
                if done(map) {
                    return;
                }
                sleep(Duration::from_millis(5));
            }
            panic!("location never arrived");
        }

        #[test]
        fn fix_outside_bounds_clears_marker() {
            let bern = fix(46.948, 7.447);
            let shared = Arc::new(Mutex::new(bern));
            let mut map = map();
            map.set_locate_control(LocateControl::new(
                SharedProvider(shared.clone()),
                LocateOptions::default(),
            ));

            map.apply(ControlAction::ToggleLocate, 0.0);
            poll_until(&mut map, 0.0, |m| m.location.fix().is_some());
            assert_eq!(map.location.fix(), Some(&bern));
            assert_eq!(map.viewport().center(), bern.position);
            assert_eq!(map.viewport().zoom(), 8);

            *shared.lock().unwrap() = fix(48.857, 2.352);
            poll_until(&mut map, 20.0, |m| m.notice().is_some());
            assert_eq!(map.notice(), Some(OUTSIDE_BOUNDS_MSG));
            assert_eq!(map.location.fix(), None);
            assert_eq!(
                map.locate_control().state(),
                &LocateState::Failed(GeolocationError::OutsideBounds)
            );
            assert_eq!(map.viewport().center(), bern.position);
        }
    }
}
