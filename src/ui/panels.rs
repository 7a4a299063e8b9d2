use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::color::trace_color;
use crate::state::{AppState, Tab};

// ---------------------------------------------------------------------------
// Left side panel – files and per-figure options
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Files");
    ui.separator();

    if ui.button("Upload…").clicked() {
        open_file_dialog(state);
    }

    if state.items.is_empty() {
        ui.label("No files uploaded.");
    }

    let mut toggled: Option<String> = None;
    ScrollArea::vertical()
        .id_salt("file_list")
        .max_height(220.0)
        .auto_shrink([false, true])
        .show(ui, |ui: &mut Ui| {
            for item in &state.items {
                let position = state.selected.iter().position(|s| s == item);
                let mut checked = position.is_some();
                let mut text = RichText::new(item);
                if let Some(i) = position {
                    text = text.color(trace_color(&state.colors, i));
                }
                if ui.checkbox(&mut checked, text).changed() {
                    toggled = Some(item.clone());
                }
            }
        });
    if let Some(item) = toggled {
        state.toggle_selected(&item);
    }

    ui.add_space(8.0);
    match state.tab {
        Tab::StreakImage => {}
        Tab::HFigure => h_options(ui, state),
        Tab::VFigure => v_options(ui, state),
    }

    ui.add_space(8.0);
    downloads(ui, state);
}

fn h_options(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("H figure").strong())
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            let changed = ui.checkbox(&mut state.h.normalize, "Normalize").changed();
            // Overlays only affect drawing.
            ui.checkbox(&mut state.h.show_peak, "Show peak");
            ui.checkbox(&mut state.h.show_fwhm, "Show FWHM");
            if changed {
                state.refresh();
            }
        });
}

fn v_options(ui: &mut Ui, state: &mut AppState) {
    egui::CollapsingHeader::new(RichText::new("V figure").strong())
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            let (lo, hi) = state.v.bounds;
            ui.label("Wavelength range (nm)");
            let mut changed = ui
                .add(egui::Slider::new(&mut state.v.range.0, lo..=hi).text("from"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut state.v.range.1, lo..=hi).text("to"))
                .changed();
            changed |= ui.checkbox(&mut state.v.fitting, "Fit double exponential").changed();
            changed |= ui.checkbox(&mut state.v.normalize, "Normalize").changed();
            ui.checkbox(&mut state.v.log_y, "Log scale");
            if changed {
                state.refresh();
            }

            for table in &state.v_tables {
                if let Some(fit) = &table.fit {
                    ui.label(format!("{}: {}", table.name, fit.label()));
                }
            }
        });
}

fn downloads(ui: &mut Ui, state: &mut AppState) {
    ui.strong("Download (first selected file)");
    ui.add_enabled_ui(!state.selected.is_empty(), |ui: &mut Ui| {
        ui.horizontal_wrapped(|ui: &mut Ui| {
            if ui.button("H CSV").clicked() {
                state.download_h_csv();
            }
            if ui.button("V CSV").clicked() {
                state.download_v_csv();
            }
            if ui.button("Raw .img").clicked() {
                state.download_raw_image();
            }
            if ui.button("Streak PNG").clicked() {
                state.download_streak_png();
            }
            if ui.button("Slide summary").clicked() {
                state.download_slide_summary();
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Upload…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        ui.selectable_value(&mut state.tab, Tab::StreakImage, "Streak image");
        ui.selectable_value(&mut state.tab, Tab::HFigure, "H figure");
        ui.selectable_value(&mut state.tab, Tab::VFigure, "V figure");

        ui.separator();

        ui.label(format!(
            "{} files uploaded, {} selected",
            state.items.len(),
            state.selected.len()
        ));

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let files = rfd::FileDialog::new()
        .set_title("Upload streak images")
        .add_filter("Streak images", &["img"])
        .add_filter("All files", &["*"])
        .pick_files();

    if let Some(paths) = files {
        log::info!("uploading {} files", paths.len());
        state.upload(&paths);
    }
}
