use eframe::egui;
use trpl_viewer::dashboard::Dashboard;

use crate::state::{AppState, Tab};
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct TrplViewerApp {
    pub state: AppState,
}

impl TrplViewerApp {
    pub fn new(dashboard: Dashboard) -> Self {
        Self {
            state: AppState::new(dashboard),
        }
    }
}

impl eframe::App for TrplViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: files and options ----
        egui::SidePanel::left("control_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Bottom panel: data table of the active figure ----
        egui::TopBottomPanel::bottom("table_panel")
            .resizable(true)
            .default_height(200.0)
            .show(ctx, |ui| {
                plot::data_table(ui, &self.state);
            });

        // ---- Central panel: figure ----
        egui::CentralPanel::default().show(ctx, |ui| match self.state.tab {
            Tab::StreakImage => plot::streak_view(ui, &mut self.state),
            Tab::HFigure => plot::h_plot(ui, &self.state),
            Tab::VFigure => plot::v_plot(ui, &self.state),
        });
    }
}
