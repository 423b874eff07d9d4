#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use eframe::egui;
use sdc_map_viewer::{
    app::ViewerApp, catalog::LayerCatalog, config::AppConfig, controls::NARROW_WINDOW_WIDTH,
    map::MapView, permalink::Permalink,
};

const WINDOW_SIZE: [f32; 2] = [1200.0, 800.0];

/// Usage: `sdc-map-viewer [config.json] ['#zoom/lat/lon/Layers']`
fn main() -> eyre::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config_path = None;
    let mut permalink: Option<Permalink> = None;
    for arg in std::env::args().skip(1) {
        if arg.starts_with('#') {
            permalink = Some(arg.parse()?);
        } else {
            config_path = Some(arg);
        }
    }

    let config = match config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let catalog = LayerCatalog::from_config(&config)?;
    let mut map = MapView::initialize(&config, catalog)?;
    if let Some(link) = &permalink {
        map.apply_permalink(link);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size(WINDOW_SIZE),
        ..Default::default()
    };
    let sidebar_open = WINDOW_SIZE[0] > NARROW_WINDOW_WIDTH;

    eframe::run_native(
        "Swiss Data Cube Viewer",
        options,
        Box::new(move |_cc| Ok(Box::new(ViewerApp::new(config, map, sidebar_open)))),
    )
    .map_err(|e| eyre::eyre!("{e}"))
}
