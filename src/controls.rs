//! The map controls drawn on top of [`crate::map::MapView`].
//!
//! Controls never touch the map directly. Each one reports what the user asked for as a
//! [`ControlAction`], which the map applies after drawing.

use chrono::{DateTime, Utc};
use egui::{Align2, Color32, Context, Id, Rect, RichText, Ui, vec2};

use crate::catalog::{Attribution, LayerCatalog};
use crate::projection::GeoPos;
use crate::time::TimeDimension;
use crate::viewport::ViewportState;

#[cfg(feature = "print")]
use crate::print::PrintMode;

/// Windows at most this wide get a collapsed layer picker.
pub const NARROW_WINDOW_WIDTH: f32 = 767.0;
/// Longest scale bar, in pixels.
pub const SCALE_BAR_MAX_WIDTH: f32 = 100.0;
/// Digits shown by the mouse position readout.
pub const MOUSE_POSITION_DIGITS: usize = 3;

const MARGIN: f32 = 10.0;

/// Something the user asked a control to do.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlAction {
    /// Zoom in one level.
    ZoomIn,
    /// Zoom out one level.
    ZoomOut,
    /// Return to the configured center and zoom.
    Home,
    /// Enter or leave fullscreen mode.
    ToggleFullscreen,
    /// Start or stop following the user's position.
    #[cfg(feature = "geolocation")]
    ToggleLocate,
    /// Save an image of the map.
    #[cfg(feature = "print")]
    Print(PrintMode),
    /// Make the named base entry the active one.
    SelectBase(String),
    /// Show or hide the named overlay entry.
    SetOverlay(String, bool),
    /// Show another time slice.
    SetTime(DateTime<Utc>),
}

/// Hover text of the fullscreen button.
pub fn fullscreen_title(fullscreen: bool) -> &'static str {
    if fullscreen {
        "Exit fullscreen mode"
    } else {
        "Enter fullscreen mode"
    }
}

/// Whether the layer picker starts collapsed for a window of this width.
pub fn picker_collapsed(window_width: f32) -> bool {
    window_width <= NARROW_WINDOW_WIDTH
}

/// Height available to the layer picker list on a map of this height.
pub fn picker_max_height(map_height: f32) -> f32 {
    (map_height - 50.0).max(0.0)
}

/// `lat : lon` with three decimals.
pub fn format_mouse_position(pos: GeoPos) -> String {
    format!(
        "{:.*} : {:.*}",
        MOUSE_POSITION_DIGITS, pos.lat, MOUSE_POSITION_DIGITS, pos.lon
    )
}

/// Rounds `n` down to 1, 2, 3 or 5 times a power of ten.
fn round_number(n: f64) -> f64 {
    let pow10 = 10_f64.powf(n.log10().floor());
    let d = n / pow10;
    let d = if d >= 10.0 {
        10.0
    } else if d >= 5.0 {
        5.0
    } else if d >= 3.0 {
        3.0
    } else if d >= 2.0 {
        2.0
    } else {
        1.0
    };
    pow10 * d
}

/// Length in pixels and label of a metric scale bar at most `max_width` pixels long.
pub fn scale_bar(meters_per_pixel: f64, max_width: f32) -> (f32, String) {
    let max_meters = meters_per_pixel * max_width as f64;
    let meters = round_number(max_meters);
    let width = (max_width as f64 * meters / max_meters).round() as f32;
    let label = if meters < 1000.0 {
        format!("{} m", meters)
    } else {
        format!("{} km", meters / 1000.0)
    };
    (width, label)
}

fn control_frame(ui: &Ui) -> egui::Frame {
    let fill = if ui.visuals().dark_mode {
        Color32::from_black_alpha(200)
    } else {
        Color32::from_white_alpha(230)
    };
    egui::Frame::NONE
        .inner_margin(egui::Margin::same(4))
        .fill(fill)
        .stroke(egui::Stroke::new(1.0, Color32::from_black_alpha(60)))
        .corner_radius(4.0)
}

/// State shared by the buttons of the top-left bar.
pub struct ButtonBarState {
    /// Whether the map is fullscreen.
    pub fullscreen: bool,
    /// Whether zooming in is possible.
    pub can_zoom_in: bool,
    /// Whether zooming out is possible.
    pub can_zoom_out: bool,
    /// Whether the geolocation control is active.
    pub locating: bool,
}

/// Zoom, home, fullscreen, locate and print buttons, top left.
pub fn button_bar(ctx: &Context, id: Id, rect: Rect, state: &ButtonBarState) -> Vec<ControlAction> {
    let mut actions = Vec::new();
    egui::Area::new(id.with("buttons"))
        .fixed_pos(rect.left_top())
        .anchor(Align2::LEFT_TOP, vec2(MARGIN, MARGIN))
        .constrain_to(rect)
        .show(ctx, |ui| {
            control_frame(ui).show(ui, |ui| {
                ui.vertical(|ui| {
                    let button = |text: &str| {
                        egui::Button::new(RichText::new(text).size(16.0)).min_size(vec2(28.0, 28.0))
                    };

                    if ui
                        .add_enabled(state.can_zoom_in, button("+"))
                        .on_hover_text("Zoom in")
                        .clicked()
                    {
                        actions.push(ControlAction::ZoomIn);
                    }
                    if ui
                        .add_enabled(state.can_zoom_out, button("−"))
                        .on_hover_text("Zoom out")
                        .clicked()
                    {
                        actions.push(ControlAction::ZoomOut);
                    }
                    if ui.add(button("⌂")).on_hover_text("Zoom to default extent").clicked() {
                        actions.push(ControlAction::Home);
                    }
                    let icon = if state.fullscreen { "🗗" } else { "⛶" };
                    if ui
                        .add(button(icon))
                        .on_hover_text(fullscreen_title(state.fullscreen))
                        .clicked()
                    {
                        actions.push(ControlAction::ToggleFullscreen);
                    }

                    #[cfg(feature = "geolocation")]
                    if ui
                        .add(button("➤").selected(state.locating))
                        .on_hover_text(crate::geolocate::TITLE)
                        .clicked()
                    {
                        actions.push(ControlAction::ToggleLocate);
                    }

                    #[cfg(feature = "print")]
                    ui.menu_button(RichText::new("🖶").size(16.0), |ui| {
                        for mode in PrintMode::ALL {
                            if ui.button(mode.title()).clicked() {
                                actions.push(ControlAction::Print(mode));
                                ui.close();
                            }
                        }
                    })
                    .response
                    .on_hover_text("Print map");
                });
            });
        });
    actions
}

/// The base and overlay picker, top right.
#[derive(Default)]
pub struct LayerPicker {
    expanded: bool,
}

impl LayerPicker {
    /// Whether a collapsed picker has been opened by the user.
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Draws the picker. On windows at most [`NARROW_WINDOW_WIDTH`] wide only a button is shown
    /// until the user opens it.
    pub fn show(
        &mut self,
        ctx: &Context,
        id: Id,
        rect: Rect,
        catalog: &LayerCatalog,
        viewport: &ViewportState,
    ) -> Vec<ControlAction> {
        let mut actions = Vec::new();
        let collapsed = picker_collapsed(ctx.input(|i| i.screen_rect().width()));

        egui::Area::new(id.with("layer_picker"))
            .fixed_pos(rect.right_top())
            .anchor(Align2::RIGHT_TOP, vec2(-MARGIN, MARGIN))
            .constrain_to(rect)
            .show(ctx, |ui| {
                control_frame(ui).show(ui, |ui| {
                    if collapsed && !self.expanded {
                        if ui.button("🗐 Layers").clicked() {
                            self.expanded = true;
                        }
                        return;
                    }
                    if collapsed && ui.small_button("✖").clicked() {
                        self.expanded = false;
                    }

                    egui::ScrollArea::vertical()
                        .max_height(picker_max_height(rect.height()))
                        .show(ui, |ui| {
                            let base = catalog.base_group();
                            ui.label(RichText::new(&base.name).strong());
                            for entry in &base.entries {
                                if ui
                                    .radio(viewport.base_layer() == entry.label, entry.label.as_str())
                                    .clicked()
                                {
                                    actions.push(ControlAction::SelectBase(entry.label.clone()));
                                }
                            }

                            for group in catalog.overlay_groups() {
                                ui.separator();
                                ui.label(RichText::new(&group.name).strong());
                                for entry in &group.entries {
                                    let mut active = viewport.is_overlay_active(&entry.label);
                                    if ui.checkbox(&mut active, entry.label.as_str()).changed() {
                                        actions.push(ControlAction::SetOverlay(
                                            entry.label.clone(),
                                            active,
                                        ));
                                    }
                                }
                            }
                        });
                });
            });
        actions
    }
}

/// The time slider, bottom right. The selected slice is applied once the handle is released.
#[derive(Default)]
pub struct TimeSlider {
    pending: Option<usize>,
}

impl TimeSlider {
    /// Draws the slider for `dimension`.
    pub fn show(
        &mut self,
        ctx: &Context,
        id: Id,
        rect: Rect,
        dimension: &TimeDimension,
    ) -> Option<ControlAction> {
        let times = dimension.available_times();
        let last = times.len().saturating_sub(1);
        let mut index = self.pending.unwrap_or(dimension.current_index());
        let mut action = None;

        egui::Area::new(id.with("time_slider"))
            .fixed_pos(rect.right_bottom())
            .anchor(Align2::RIGHT_BOTTOM, vec2(-MARGIN, -MARGIN - 20.0))
            .constrain_to(rect)
            .show(ctx, |ui| {
                control_frame(ui).show(ui, |ui| {
                    ui.horizontal(|ui| {
                        if ui
                            .add_enabled(dimension.previous().is_some(), egui::Button::new("⏴"))
                            .on_hover_text("Previous time")
                            .clicked()
                        {
                            action = dimension.previous().map(ControlAction::SetTime);
                        }

                        let slider = egui::Slider::new(&mut index, 0..=last)
                            .show_value(false)
                            .step_by(1.0);
                        let response = ui.add(slider);
                        if response.changed() || response.dragged() {
                            self.pending = Some(index);
                        }
                        let released = response.drag_stopped()
                            || (response.changed() && !response.dragged());
                        if released {
                            if let Some(i) = self.pending.take() {
                                if i != dimension.current_index() {
                                    action = times.get(i).copied().map(ControlAction::SetTime);
                                }
                            }
                        }

                        if ui
                            .add_enabled(dimension.next().is_some(), egui::Button::new("⏵"))
                            .on_hover_text("Next time")
                            .clicked()
                        {
                            action = dimension.next().map(ControlAction::SetTime);
                        }

                        let shown = times.get(index).copied().unwrap_or(dimension.current());
                        ui.label(shown.format("%Y-%m-%d").to_string());
                    });
                });
            });
        action
    }
}

/// Scale bar and mouse position, bottom left.
pub fn readouts(
    ctx: &Context,
    id: Id,
    rect: Rect,
    meters_per_pixel: f64,
    mouse_pos: Option<GeoPos>,
) {
    egui::Area::new(id.with("scale"))
        .fixed_pos(rect.left_bottom())
        .anchor(Align2::LEFT_BOTTOM, vec2(MARGIN, -MARGIN - 20.0))
        .constrain_to(rect)
        .interactable(false)
        .show(ctx, |ui| {
            let (width, label) = scale_bar(meters_per_pixel, SCALE_BAR_MAX_WIDTH);
            control_frame(ui).show(ui, |ui| {
                ui.set_min_width(width);
                ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                ui.label(label);
                let (bar, _) = ui.allocate_exact_size(vec2(width, 4.0), egui::Sense::hover());
                let stroke = egui::Stroke::new(2.0, ui.visuals().text_color());
                ui.painter().line_segment([bar.left_bottom(), bar.right_bottom()], stroke);
                ui.painter().line_segment([bar.left_top(), bar.left_bottom()], stroke);
                ui.painter().line_segment([bar.right_top(), bar.right_bottom()], stroke);
            });
        });

    if let Some(pos) = mouse_pos {
        egui::Area::new(id.with("mouse_position"))
            .fixed_pos(rect.right_bottom())
            .anchor(Align2::RIGHT_BOTTOM, vec2(-MARGIN, -MARGIN - 70.0))
            .constrain_to(rect)
            .interactable(false)
            .show(ctx, |ui| {
                control_frame(ui).show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                    ui.label(format_mouse_position(pos));
                });
            });
    }
}

/// Attribution of the visible layers, bottom right.
pub fn attribution(ctx: &Context, id: Id, rect: Rect, attributions: &[Attribution]) {
    if attributions.is_empty() {
        return;
    }
    egui::Area::new(id.with("attribution"))
        .fixed_pos(rect.right_bottom())
        .anchor(Align2::RIGHT_BOTTOM, vec2(0.0, 0.0))
        .constrain_to(rect)
        .show(ctx, |ui| {
            control_frame(ui).show(ui, |ui| {
                ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);
                ui.horizontal(|ui| {
                    for (i, a) in attributions.iter().enumerate() {
                        if i > 0 {
                            ui.label("|");
                        }
                        match &a.url {
                            Some(url) => {
                                ui.hyperlink_to(a.text.as_str(), url);
                            }
                            None => {
                                ui.label(a.text.as_str());
                            }
                        }
                    }
                });
            });
        });
}

/// A transient message over the map, e.g. a geolocation failure.
pub fn notice(ctx: &Context, id: Id, rect: Rect, text: &str) {
    egui::Area::new(id.with("notice"))
        .fixed_pos(rect.center_top())
        .anchor(Align2::CENTER_TOP, vec2(0.0, MARGIN))
        .constrain_to(rect)
        .interactable(false)
        .show(ctx, |ui| {
            control_frame(ui).show(ui, |ui| {
                ui.colored_label(ui.visuals().warn_fg_color, text);
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_bar_rounds_down_to_nice_numbers() {
        // 0.87 m/px gives at most 87 m, rounded to 50 m.
        let (width, label) = scale_bar(0.87, 100.0);
        assert_eq!(label, "50 m");
        assert_eq!(width, 57.0);

        let (width, label) = scale_bar(400.0, 100.0);
        assert_eq!(label, "30 km");
        assert_eq!(width, 75.0);

        let (width, label) = scale_bar(10.5, 100.0);
        assert_eq!(label, "1 km");
        assert_eq!(width, 95.0);
    }

    #[test]
    fn scale_bar_never_exceeds_max_width() {
        for mpp in [0.3, 1.7, 12.5, 99.0, 1234.5, 20_000.0] {
            let (width, _) = scale_bar(mpp, SCALE_BAR_MAX_WIDTH);
            assert!(width <= SCALE_BAR_MAX_WIDTH, "{mpp}: {width}");
            assert!(width >= SCALE_BAR_MAX_WIDTH / 5.0 - 1.0, "{mpp}: {width}");
        }
    }

    #[test]
    fn mouse_position_has_three_digits() {
        let pos = GeoPos { lon: 8.22, lat: 46.78456 };
        assert_eq!(format_mouse_position(pos), "46.785 : 8.220");
    }

    #[test]
    fn picker_layout_follows_window() {
        assert!(picker_collapsed(767.0));
        assert!(!picker_collapsed(768.0));
        assert_eq!(picker_max_height(600.0), 550.0);
        assert_eq!(picker_max_height(20.0), 0.0);
    }

    #[test]
    fn fullscreen_titles() {
        assert_eq!(fullscreen_title(false), "Enter fullscreen mode");
        assert_eq!(fullscreen_title(true), "Exit fullscreen mode");
    }
}
