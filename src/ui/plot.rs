use eframe::egui::{self, Color32, ColorImage, RichText, ScrollArea, TextureOptions, Ui};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Legend, Line, Plot, PlotPoints, Polygon, VLine};
use trpl_viewer::data::model::{Axis, DerivedTable};
use trpl_viewer::data::signal;
use trpl_viewer::export::streak_pixels;

use crate::color::{fill_color, trace_color};
use crate::state::{AppState, Tab};

fn placeholder(ui: &mut Ui) {
    ui.centered_and_justified(|ui: &mut Ui| {
        ui.heading("Upload and select a streak image  (File → Upload…)");
    });
}

// ---------------------------------------------------------------------------
// Streak image
// ---------------------------------------------------------------------------

/// Render each selected measurement as a false-colour image, time downwards.
pub fn streak_view(ui: &mut Ui, state: &mut AppState) {
    if state.streaks.is_empty() {
        placeholder(ui);
        return;
    }

    if state.streak_textures.len() != state.streaks.len() {
        state.streak_textures = state
            .streaks
            .iter()
            .map(|(name, m)| {
                let (width, height, pixels) = streak_pixels(m);
                let image = ColorImage::from_rgb([width, height], &pixels);
                ui.ctx().load_texture(name.clone(), image, TextureOptions::NEAREST)
            })
            .collect();
    }

    ScrollArea::vertical().show(ui, |ui: &mut Ui| {
        for ((name, m), texture) in state.streaks.iter().zip(&state.streak_textures) {
            ui.strong(name);
            if let (Some((w0, w1)), Some((t0, t1))) = (m.wavelength_bounds(), m.time_bounds()) {
                ui.label(format!(
                    "wavelength {w0:.1}–{w1:.1} nm, time {t0:.2}–{t1:.2} ns"
                ));
            }
            ui.add(
                egui::Image::from_texture(texture)
                    .max_width(ui.available_width())
                    .maintain_aspect_ratio(false)
                    .max_height(ui.available_width() * 0.6),
            );
            ui.add_space(8.0);
        }
    });
}

// ---------------------------------------------------------------------------
// H figure: intensity against wavelength
// ---------------------------------------------------------------------------

pub fn h_plot(ui: &mut Ui, state: &AppState) {
    if state.h_tables.is_empty() {
        placeholder(ui);
        return;
    }

    let y_label = if state.h.normalize { "Normalized intensity" } else { "Intensity" };

    Plot::new("h_plot")
        .legend(Legend::default())
        .x_axis_label("Wavelength (nm)")
        .y_axis_label(y_label)
        .allow_boxed_zoom(true)
        .show(ui, |plot_ui| {
            for (i, table) in state.h_tables.iter().enumerate() {
                let color = trace_color(&state.colors, i);
                let x = table.axis_values();
                let smoothed = table.smoothed_intensities();

                let raw: PlotPoints = table.rows.iter().map(|r| [r.axis, r.intensity]).collect();
                plot_ui.line(Line::new(raw).name(&table.name).color(color).width(1.0));

                let smooth: PlotPoints = x.iter().zip(&smoothed).map(|(&x, &y)| [x, y]).collect();
                plot_ui.line(
                    Line::new(smooth)
                        .name(format!("{} (smoothed)", table.name))
                        .color(color)
                        .width(2.0),
                );

                if state.h.show_peak {
                    if let Some((peak, _)) = signal::find_peak(&x, &smoothed) {
                        plot_ui.vline(
                            VLine::new(peak)
                                .name(format!("Wavelength: {peak:.1} nm"))
                                .color(color),
                        );
                    }
                }

                if state.h.show_fwhm {
                    if let (Some((left, right)), Some((_, peak_y))) =
                        (signal::find_half_range(&x, &smoothed), signal::find_peak(&x, &smoothed))
                    {
                        let band = vec![[left, 0.0], [right, 0.0], [right, peak_y], [left, peak_y]];
                        plot_ui.polygon(
                            Polygon::new(PlotPoints::new(band))
                                .name(format!("FWHM: {:.1} nm", right - left))
                                .fill_color(fill_color(color))
                                .stroke(egui::Stroke::NONE),
                        );
                    }
                }
            }
        });
}

// ---------------------------------------------------------------------------
// V figure: intensity against time, optionally with the fitted decay
// ---------------------------------------------------------------------------

/// Points for a log-scaled axis: `log10(y)`, dropping non-positive samples.
fn log_points(points: impl Iterator<Item = [f64; 2]>) -> Vec<[f64; 2]> {
    points
        .filter(|[_, y]| *y > 0.0)
        .map(|[x, y]| [x, y.log10()])
        .collect()
}

pub fn v_plot(ui: &mut Ui, state: &AppState) {
    if state.v_tables.is_empty() {
        placeholder(ui);
        return;
    }

    let log_y = state.v.log_y;
    let scale = |points: Vec<[f64; 2]>| -> PlotPoints {
        if log_y {
            PlotPoints::new(log_points(points.into_iter()))
        } else {
            PlotPoints::new(points)
        }
    };

    let mut plot = Plot::new("v_plot")
        .legend(Legend::default())
        .x_axis_label("Time (ns)")
        .y_axis_label(if state.v.normalize { "Normalized intensity" } else { "Intensity" })
        .allow_boxed_zoom(true);
    if log_y {
        plot = plot.y_axis_formatter(|mark, _range| format!("{:.2e}", 10f64.powf(mark.value)));
    }

    plot.show(ui, |plot_ui| {
        for (i, table) in state.v_tables.iter().enumerate() {
            let color = trace_color(&state.colors, i);
            let data: Vec<[f64; 2]> = table.rows.iter().map(|r| [r.axis, r.intensity]).collect();
            plot_ui.line(Line::new(scale(data)).name(&table.name).color(color).width(1.5));

            if let Some(fit) = &table.fit {
                plot_ui.line(
                    Line::new(scale(table.fit_points()))
                        .name(fit.label())
                        .color(Color32::BLACK)
                        .width(2.0),
                );
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Data table of the active figure
// ---------------------------------------------------------------------------

pub fn data_table(ui: &mut Ui, state: &AppState) {
    let tables = match state.tab {
        Tab::HFigure => &state.h_tables,
        Tab::VFigure => &state.v_tables,
        Tab::StreakImage => return,
    };
    let Some(table) = tables.first() else {
        ui.label("No data.");
        return;
    };
    ui.label(RichText::new(&table.name).strong());
    table_view(ui, table);
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{v:.4}"))
}

fn table_view(ui: &mut Ui, table: &DerivedTable) {
    let extra = match table.axis {
        Axis::Wavelength => "smoothed_intensity",
        Axis::Time => "fit",
    };
    let header = format!("{} ({})", table.axis.column_name(), table.axis.unit());

    TableBuilder::new(ui)
        .striped(true)
        .resizable(true)
        .column(Column::auto().at_least(120.0))
        .columns(Column::remainder(), 2)
        .header(20.0, |mut row| {
            row.col(|ui| {
                ui.strong(&header);
            });
            row.col(|ui| {
                ui.strong("intensity");
            });
            row.col(|ui| {
                ui.strong(extra);
            });
        })
        .body(|body| {
            body.rows(18.0, table.rows.len(), |mut row| {
                let r = &table.rows[row.index()];
                let extra_value = match table.axis {
                    Axis::Wavelength => r.smoothed_intensity,
                    Axis::Time => r.fit,
                };
                row.col(|ui| {
                    ui.label(format!("{:.3}", r.axis));
                });
                row.col(|ui| {
                    ui.label(cell(Some(r.intensity)));
                });
                row.col(|ui| {
                    ui.label(cell(extra_value));
                });
            });
        });
}
