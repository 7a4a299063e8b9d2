mod app;
mod color;
mod state;
mod ui;

use app::TrplViewerApp;
use eframe::egui;
use trpl_viewer::config::Config;
use trpl_viewer::dashboard::Dashboard;

fn main() -> eframe::Result {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    let dashboard = match Dashboard::new(&config) {
        Ok(dashboard) => dashboard,
        Err(e) => {
            log::error!("Failed to set up upload directory: {e:#}");
            std::process::exit(1);
        }
    };
    log::info!(
        "uploads in {}, cache capacity {}",
        config.upload_basedir.display(),
        config.cache_capacity
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([640.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "TRPL Viewer – Streak Images",
        options,
        Box::new(|cc| {
            egui_extras::install_image_loaders(&cc.egui_ctx);
            Ok(Box::new(TrplViewerApp::new(dashboard)))
        }),
    )
}
