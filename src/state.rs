use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use eframe::egui::{Color32, TextureHandle};
use trpl_viewer::dashboard::{Dashboard, Download, Outcome};
use trpl_viewer::data::builder::TimeTableOptions;
use trpl_viewer::data::filter::WavelengthRange;
use trpl_viewer::data::model::{DerivedTable, Measurement};

use crate::color::generate_palette;

// ---------------------------------------------------------------------------
// View options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    StreakImage,
    HFigure,
    VFigure,
}

#[derive(Debug, Clone, Copy)]
pub struct HOptions {
    pub normalize: bool,
    pub show_peak: bool,
    pub show_fwhm: bool,
}

impl Default for HOptions {
    fn default() -> Self {
        Self {
            normalize: false,
            show_peak: true,
            show_fwhm: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VOptions {
    /// Selected wavelength window (nm).
    pub range: (f64, f64),
    /// Slider limits, taken from the selected files.
    pub bounds: (f64, f64),
    pub fitting: bool,
    pub log_y: bool,
    pub normalize: bool,
}

impl Default for VOptions {
    fn default() -> Self {
        Self {
            range: (0.0, 800.0),
            bounds: (0.0, 800.0),
            fitting: true,
            log_y: true,
            normalize: false,
        }
    }
}

impl VOptions {
    pub fn table_options(&self) -> TimeTableOptions {
        TimeTableOptions {
            wavelength_range: Some(WavelengthRange::new(self.range.0, self.range.1)),
            fitting: self.fitting,
            normalize: self.normalize,
        }
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub dashboard: Dashboard,

    /// This session's upload directory.
    pub session_dir: Option<PathBuf>,

    /// Uploaded item names, and which of them are selected (in upload order).
    pub items: Vec<String>,
    pub selected: Vec<String>,

    pub tab: Tab,
    pub h: HOptions,
    pub v: VOptions,

    /// Results for the current selection and options.
    pub h_tables: Vec<Arc<DerivedTable>>,
    pub v_tables: Vec<Arc<DerivedTable>>,
    pub streaks: Vec<(String, Arc<Measurement>)>,
    /// One texture per entry of `streaks`, built lazily by the view.
    pub streak_textures: Vec<TextureHandle>,
    pub colors: Vec<Color32>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(dashboard: Dashboard) -> Self {
        let session_dir = match dashboard.store().create_session_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                log::error!("Failed to create session directory: {e:#}");
                None
            }
        };
        Self {
            dashboard,
            session_dir,
            items: Vec::new(),
            selected: Vec::new(),
            tab: Tab::HFigure,
            h: HOptions::default(),
            v: VOptions::default(),
            h_tables: Vec::new(),
            v_tables: Vec::new(),
            streaks: Vec::new(),
            streak_textures: Vec::new(),
            colors: Vec::new(),
            status_message: None,
        }
    }

    fn session(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    /// Copy picked files into the session directory and select them.
    pub fn upload(&mut self, paths: &[PathBuf]) {
        self.status_message = None;
        let mut uploaded = Vec::new();
        for path in paths {
            match self.upload_one(path) {
                Ok(name) => uploaded.push(name),
                Err(e) => self.report(e.context(format!("uploading {}", path.display()))),
            }
        }
        if let Err(e) = self.refresh_items() {
            self.report(e);
        }
        for name in uploaded {
            if !self.selected.contains(&name) {
                self.selected.push(name);
            }
        }
        self.on_selection_changed();
    }

    fn upload_one(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .context("path has no file name")?
            .to_string_lossy()
            .into_owned();
        let bytes = std::fs::read(path).context("reading file")?;
        self.dashboard.store().save_bytes(self.session(), &name, &bytes)?;
        Ok(name)
    }

    fn refresh_items(&mut self) -> Result<()> {
        self.items = self.dashboard.store().list_items(self.session())?;
        self.selected.retain(|s| self.items.contains(s));
        Ok(())
    }

    pub fn toggle_selected(&mut self, item: &str) {
        self.status_message = None;
        if let Some(pos) = self.selected.iter().position(|s| s == item) {
            self.selected.remove(pos);
        } else {
            self.selected.push(item.to_string());
        }
        self.on_selection_changed();
    }

    /// New files: reset the wavelength slider to their range, then recompute.
    pub fn on_selection_changed(&mut self) {
        match self.dashboard.wavelength_bounds(&self.selected, self.session()) {
            Ok(Outcome::Update(bounds)) => {
                self.v.bounds = bounds;
                self.v.range = bounds;
            }
            Ok(Outcome::NoUpdate) => {}
            Err(e) => self.report(e),
        }
        self.colors = generate_palette(self.selected.len());
        self.streak_textures.clear();
        self.recompute();
    }

    /// Option change from the side panel: drop the old message and recompute.
    pub fn refresh(&mut self) {
        self.status_message = None;
        self.recompute();
    }

    /// Recompute every view for the current selection and options. Errors
    /// reported earlier in the same action stay visible.
    fn recompute(&mut self) {
        let session = self.session_dir.clone();
        let session = session.as_deref();

        match self.dashboard.h_tables(&self.selected, session, self.h.normalize) {
            Ok(out) => self.h_tables = out.into_option().unwrap_or_default(),
            Err(e) => self.report(e),
        }
        match self
            .dashboard
            .v_tables(&self.selected, session, &self.v.table_options())
        {
            Ok(out) => self.v_tables = out.into_option().unwrap_or_default(),
            Err(e) => self.report(e),
        }
        match self.dashboard.streak_images(&self.selected, session) {
            Ok(out) => self.streaks = out.into_option().unwrap_or_default(),
            Err(e) => self.report(e),
        }
        for (i, stats) in self.dashboard.pipeline().stats().iter().enumerate() {
            log::debug!("cache {i}: {stats:?}");
        }
    }

    pub fn report(&mut self, e: anyhow::Error) {
        log::error!("{e:#}");
        self.status_message = Some(format!("Error: {e:#}"));
    }

    // -- downloads --

    pub fn download_h_csv(&mut self) {
        let out = self.dashboard.h_csv(&self.selected, self.session(), self.h.normalize);
        self.save(out);
    }

    pub fn download_v_csv(&mut self) {
        let out = self
            .dashboard
            .v_csv(&self.selected, self.session(), &self.v.table_options());
        self.save(out);
    }

    pub fn download_raw_image(&mut self) {
        let out = self.dashboard.raw_image(&self.selected, self.session());
        self.save(out);
    }

    pub fn download_streak_png(&mut self) {
        let out = self.dashboard.streak_png(&self.selected, self.session());
        self.save(out);
    }

    pub fn download_slide_summary(&mut self) {
        let out = self
            .dashboard
            .slide_summary(&self.selected, self.session(), &self.v.table_options());
        self.save(out);
    }

    fn save(&mut self, out: Result<Outcome<Download>>) {
        let download = match out {
            Ok(Outcome::Update(d)) => d,
            Ok(Outcome::NoUpdate) => return,
            Err(e) => return self.report(e),
        };
        let Some(target) = rfd::FileDialog::new()
            .set_title("Save")
            .set_file_name(&download.filename)
            .save_file()
        else {
            return;
        };
        match std::fs::write(&target, download.bytes()) {
            Ok(()) => log::info!("Saved {}", target.display()),
            Err(e) => self.report(anyhow::Error::new(e).context(format!("writing {}", target.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use trpl_viewer::config::Config;

    use super::*;

    fn state(root: &Path) -> AppState {
        let config = Config {
            upload_basedir: root.join("uploads"),
            cache_capacity: 4,
        };
        AppState::new(Dashboard::new(&config).unwrap())
    }

    #[test]
    fn upload_error_survives_the_recompute() {
        let root = tempfile::tempdir().unwrap();
        let mut state = state(root.path());
        state.upload(&[root.path().join("missing.img")]);
        let msg = state.status_message.as_deref().expect("upload error is shown");
        assert!(msg.contains("uploading"), "{msg}");
        assert!(msg.contains("missing.img"), "{msg}");
    }

    #[test]
    fn option_change_clears_old_message() {
        let root = tempfile::tempdir().unwrap();
        let mut state = state(root.path());
        state.upload(&[root.path().join("missing.img")]);
        state.refresh();
        assert_eq!(state.status_message, None);
    }
}
