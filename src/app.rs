use eframe::egui;
use egui::{Id, RichText, ViewportCommand};
use log::{debug, info};

use crate::catalog::SourceDescriptor;
use crate::config::AppConfig;
use crate::controls::NARROW_WINDOW_WIDTH;
use crate::map::{MapEvent, MapView};
use crate::ui::search::SearchBox;
use crate::ui::sidebar::{Sidebar, SidebarState};
use crate::ui::{ButtonId, DialogId, DialogSet, ModalService, UiController};

/// Full width of the sidebar, in points.
pub const SIDEBAR_WIDTH: f32 = 300.0;

const TITLE: &str = "Swiss Data Cube Viewer";
const PORTAL_URL: &str = "http://www.swissdatacube.ch";

/// The viewer window: navigation bar, sidebar, map and dialogs.
pub struct ViewerApp {
    config: AppConfig,
    map: MapView,
    controller: UiController<DialogSet, Sidebar>,
    search: SearchBox,
    username: String,
    password: String,
    title_hash: String,
    status: Option<String>,
}

impl ViewerApp {
    /// Wraps an initialized map. The sidebar starts open on wide windows.
    pub fn new(config: AppConfig, map: MapView, sidebar_open: bool) -> Self {
        Self {
            config,
            map,
            controller: UiController::new(DialogSet::default(), Sidebar::new(sidebar_open)),
            search: SearchBox::default(),
            username: String::new(),
            password: String::new(),
            title_hash: String::new(),
            status: None,
        }
    }

    /// The map.
    pub fn map(&self) -> &MapView {
        &self.map
    }

    fn nav_button(&mut self, ui: &mut egui::Ui, button: ButtonId, label: &str, now: f64) {
        if ui.button(label).clicked() {
            self.controller.click(button, now);
        }
    }

    fn navbar(&mut self, ctx: &egui::Context, now: f64) {
        let narrow = ctx.input(|i| i.screen_rect().width()) <= NARROW_WINDOW_WIDTH;

        egui::TopBottomPanel::top("navbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(TITLE);
                if narrow {
                    self.nav_button(ui, ButtonId::Nav, "☰", now);
                    return;
                }
                self.nav_button(ui, ButtonId::SidebarToggle, "☰ Datasets", now);
                self.nav_buttons(ui, now);
                self.search.show(ui);
                if ui.button("🔗").on_hover_text("Copy link to this view").clicked() {
                    ui.ctx().copy_text(self.map.permalink().to_string());
                }
                if let Some(status) = &self.status {
                    ui.label(RichText::new(status).small());
                }
            });
            if narrow && self.controller.nav_expanded() {
                ui.vertical(|ui| {
                    self.nav_button(ui, ButtonId::List, "Datasets", now);
                    self.nav_buttons(ui, now);
                    self.search.show(ui);
                });
            }
        });
    }

    fn nav_buttons(&mut self, ui: &mut egui::Ui, now: f64) {
        for dialog in DialogId::ALL {
            self.nav_button(ui, ButtonId::Dialog(dialog), dialog.title(), now);
        }
    }

    fn sidebar(&mut self, ctx: &egui::Context, now: f64) {
        let fraction = self.controller.sidebar().width_fraction(now);
        if matches!(self.controller.sidebar().state(), SidebarState::Animating { .. }) {
            ctx.request_repaint();
        }
        if fraction <= 0.0 {
            return;
        }

        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(SIDEBAR_WIDTH * fraction)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Datasets");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("⏴").on_hover_text("Hide sidebar").clicked() {
                            self.controller.click(ButtonId::SidebarHide, now);
                        }
                    });
                });
                ui.separator();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let mut toggled = None;
                    for group in self.map.catalog().overlay_groups() {
                        ui.label(RichText::new(&group.name).strong());
                        for entry in &group.entries {
                            ui.horizontal(|ui| {
                                let mut active = self.map.viewport().is_overlay_active(&entry.label);
                                if ui.checkbox(&mut active, entry.label.as_str()).changed() {
                                    toggled = Some(entry.label.clone());
                                }
                                if let Some(url) = &entry.metadata_url {
                                    ui.hyperlink_to("ⓘ", url).on_hover_text("Metadata");
                                }
                            });
                        }
                        ui.add_space(6.0);
                    }
                    if let Some(label) = toggled {
                        let _ = self.map.toggle_overlay(&label);
                    }
                });
            });
    }

    fn dialogs(&mut self, ctx: &egui::Context) {
        let open: Vec<DialogId> = self.controller.modals().open().collect();
        for dialog in open {
            let response = egui::Modal::new(Id::new(("dialog", dialog))).show(ctx, |ui| {
                ui.set_width(420.0);
                ui.heading(dialog.title());
                ui.separator();
                self.dialog_body(ui, dialog);
                ui.separator();
                ui.button("Close").clicked()
            });
            if response.inner || response.should_close() {
                self.controller.modals_mut().hide(dialog);
            }
        }
    }

    fn dialog_body(&mut self, ui: &mut egui::Ui, dialog: DialogId) {
        match dialog {
            DialogId::About => {
                ui.label(format!(
                    "Swiss Data Cube viewer, version {} {}",
                    self.config.app_version, self.config.app_version_date
                ));
                ui.label("Earth observation analysis ready data over Switzerland.");
                ui.hyperlink(PORTAL_URL);
            }
            DialogId::Legend => {
                for group in self.map.catalog().overlay_groups() {
                    for entry in &group.entries {
                        let legends: Vec<&str> = entry
                            .layers
                            .iter()
                            .filter_map(|name| self.map.layer(name))
                            .filter_map(|handle| handle.legend_url())
                            .collect();
                        for url in legends {
                            ui.hyperlink_to(entry.label.as_str(), url);
                        }
                    }
                }
            }
            DialogId::Login => {
                ui.horizontal(|ui| {
                    ui.label("Username");
                    ui.text_edit_singleline(&mut self.username);
                });
                ui.horizontal(|ui| {
                    ui.label("Password");
                    ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
                });
                ui.label("Accounts are managed on the portal.");
                ui.hyperlink(PORTAL_URL);
            }
            DialogId::Help => {
                ui.label("Drag to pan, scroll or double-click to zoom.");
                ui.label("Pick base maps and overlays in the layer control at the top right.");
                ui.label("Use the time slider to browse the snow cover series.");
                ui.label("The link button copies a link to the current view.");
            }
            DialogId::WebServices => {
                ui.label("WMS endpoint:");
                ui.hyperlink(&self.config.gs_host);
                ui.add_space(6.0);
                ui.label("Catalogue records:");
                for descriptor in self.map.catalog().descriptors() {
                    if let SourceDescriptor::Wms { endpoint, layers, .. } = &descriptor.source {
                        if endpoint == &self.config.gs_host {
                            ui.monospace(layers.as_str());
                        }
                    }
                }
                for url in &self.config.csw_layers {
                    ui.hyperlink(url);
                }
            }
            DialogId::StoryMaps => {
                ui.label("Story maps built on Swiss Data Cube products are published on the portal.");
                ui.hyperlink(PORTAL_URL);
            }
        }
    }

    fn handle_events(&mut self, ctx: &egui::Context) {
        for event in self.map.drain_events() {
            debug!("Map event {:?}", event);
            #[cfg(feature = "print")]
            if let MapEvent::Printed(path) = &event {
                self.status = Some(format!("Saved {}", path.display()));
            }
            if let MapEvent::TimeChanged(t) = &event {
                info!("Showing {}", t.format("%Y-%m-%d"));
            }
        }

        let hash = self.map.permalink().to_string();
        if hash != self.title_hash {
            ctx.send_viewport_cmd(ViewportCommand::Title(format!("{TITLE} {hash}")));
            self.title_hash = hash;
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);
        self.controller.tick(now, &mut self.map);

        if !self.map.viewport().is_fullscreen() {
            self.navbar(ctx, now);
            self.sidebar(ctx, now);
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add(&mut self.map);
            });

        self.dialogs(ctx);
        self.handle_events(ctx);
    }
}
