use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::Local;

use crate::config::Config;
use crate::data::builder::TimeTableOptions;
use crate::data::model::{DerivedTable, Measurement};
use crate::data::pipeline::{file_name, Pipeline};
use crate::export::{self, SlideSummary};
use crate::session::{self, UploadStore};

// ---------------------------------------------------------------------------
// Outcome / Download
// ---------------------------------------------------------------------------

/// Result of a UI-triggered action: either fresh output or "leave the view as is".
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Update(T),
    NoUpdate,
}

impl<T> Outcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Update(v) => Some(v),
            Outcome::NoUpdate => None,
        }
    }

}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadContent {
    Text(String),
    Binary(Vec<u8>),
}

/// A file offered to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub filename: String,
    pub content: DownloadContent,
}

impl Download {
    pub fn bytes(&self) -> &[u8] {
        match &self.content {
            DownloadContent::Text(s) => s.as_bytes(),
            DownloadContent::Binary(b) => b,
        }
    }

    /// URL-safe base64 of the content, for transports that only carry text.
    pub fn base64(&self) -> String {
        URL_SAFE.encode(self.bytes())
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Everything the interactive shell calls into. Each operation takes the
/// selected item names and the session directory reported by the UI; the
/// directory is validated before any file is touched.
#[derive(Debug)]
pub struct Dashboard {
    store: UploadStore,
    pipeline: Pipeline,
}

impl Dashboard {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Dashboard {
            store: UploadStore::new(&config.upload_basedir)?,
            pipeline: Pipeline::new(config.cache_capacity),
        })
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Existing files for `selected`, or `None` when there is nothing to do.
    fn resolve<S: AsRef<str>>(&self, selected: &[S], upload_dir: Option<&Path>) -> Result<Option<Vec<PathBuf>>> {
        let dir = self.store.validate_upload_dir(upload_dir)?;
        if selected.is_empty() {
            return Ok(None);
        }
        let paths = session::existing_item_paths(selected, &dir);
        // TODO: report vanished items to the user instead of silently skipping them.
        Ok((!paths.is_empty()).then_some(paths))
    }

    fn resolve_first<S: AsRef<str>>(&self, selected: &[S], upload_dir: Option<&Path>) -> Result<Option<PathBuf>> {
        Ok(self
            .resolve(selected, upload_dir)?
            .and_then(|paths| paths.into_iter().next()))
    }

    // -- figures and tables --

    pub fn h_tables<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
        normalize: bool,
    ) -> Result<Outcome<Vec<Arc<DerivedTable>>>> {
        let Some(paths) = self.resolve(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        Ok(Outcome::Update(self.pipeline.wavelength_tables(&paths, normalize)?))
    }

    pub fn v_tables<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
        options: &TimeTableOptions,
    ) -> Result<Outcome<Vec<Arc<DerivedTable>>>> {
        let Some(paths) = self.resolve(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        Ok(Outcome::Update(self.pipeline.time_tables(&paths, options)?))
    }

    pub fn streak_images<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
    ) -> Result<Outcome<Vec<(String, Arc<Measurement>)>>> {
        let Some(paths) = self.resolve(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let images = paths
            .iter()
            .map(|p| Ok((file_name(p), self.pipeline.load_measurement(p)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Outcome::Update(images))
    }

    /// Smallest and largest wavelength across the selection, for the range slider.
    pub fn wavelength_bounds<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
    ) -> Result<Outcome<(f64, f64)>> {
        let Some(paths) = self.resolve(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let mut bounds: Option<(f64, f64)> = None;
        for path in &paths {
            if let Some((lo, hi)) = self.pipeline.load_measurement(path)?.wavelength_bounds() {
                bounds = Some(bounds.map_or((lo, hi), |(a, b)| (a.min(lo), b.max(hi))));
            }
        }
        Ok(bounds.map_or(Outcome::NoUpdate, |(lo, hi)| Outcome::Update((lo.floor(), hi.ceil()))))
    }

    // -- downloads (first existing selected item) --

    pub fn h_csv<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
        normalize: bool,
    ) -> Result<Outcome<Download>> {
        let Some(path) = self.resolve_first(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let table = self.pipeline.wavelength_table(&path, normalize)?;
        Ok(Outcome::Update(Download {
            filename: format!("h-{}.csv", file_name(&path)),
            content: DownloadContent::Text(export::table_to_csv(&table)?),
        }))
    }

    pub fn v_csv<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
        options: &TimeTableOptions,
    ) -> Result<Outcome<Download>> {
        let Some(path) = self.resolve_first(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let table = self.pipeline.time_table(&path, options)?;
        let prefix = match options.wavelength_range {
            Some(range) => format!("v({range})"),
            None => "v".to_string(),
        };
        Ok(Outcome::Update(Download {
            filename: format!("{prefix}-{}.csv", file_name(&path)),
            content: DownloadContent::Text(export::table_to_csv(&table)?),
        }))
    }

    /// The uploaded streak image, re-serialised.
    pub fn raw_image<S: AsRef<str>>(&self, selected: &[S], upload_dir: Option<&Path>) -> Result<Outcome<Download>> {
        let Some(path) = self.resolve_first(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let measurement = self.pipeline.load_measurement(&path)?;
        Ok(Outcome::Update(Download {
            filename: file_name(&path),
            content: DownloadContent::Binary(measurement.to_raw_binary()?),
        }))
    }

    pub fn streak_png<S: AsRef<str>>(&self, selected: &[S], upload_dir: Option<&Path>) -> Result<Outcome<Download>> {
        let Some(path) = self.resolve_first(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let measurement = self.pipeline.load_measurement(&path)?;
        Ok(Outcome::Update(Download {
            filename: format!("{}.png", stem(&path)),
            content: DownloadContent::Binary(export::streak_png(&measurement)?),
        }))
    }

    /// Scalar summary for the slide deck; the V table is always fitted.
    pub fn slide_summary<S: AsRef<str>>(
        &self,
        selected: &[S],
        upload_dir: Option<&Path>,
        options: &TimeTableOptions,
    ) -> Result<Outcome<Download>> {
        let Some(path) = self.resolve_first(selected, upload_dir)? else {
            return Ok(Outcome::NoUpdate);
        };
        let measurement = self.pipeline.load_measurement(&path)?;
        let h_table = self.pipeline.wavelength_table(&path, false)?;
        let fitted = TimeTableOptions {
            fitting: true,
            ..*options
        };
        let v_table = self.pipeline.time_table(&path, &fitted)?;
        let summary = SlideSummary::new(
            &stem(&path),
            &measurement,
            &h_table,
            &v_table,
            Local::now().date_naive(),
        );
        Ok(Outcome::Update(Download {
            filename: format!("{}.json", stem(&path)),
            content: DownloadContent::Text(summary.to_json()?),
        }))
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::WavelengthRange;
    use crate::session::SessionError;

    fn setup() -> (tempfile::TempDir, Dashboard, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            upload_basedir: root.path().join("uploads"),
            cache_capacity: 4,
        };
        let dashboard = Dashboard::new(&config).unwrap();
        let session = dashboard.store().create_session_dir().unwrap();
        let m = Measurement::new(
            vec![400.0, 401.0, 402.0],
            vec![0.0, 1.0],
            vec![1, 2, 3, 4, 5, 6],
            vec![],
        )
        .unwrap();
        dashboard
            .store()
            .save_bytes(Some(&session), "m.img", &m.to_raw_binary().unwrap())
            .unwrap();
        (root, dashboard, session)
    }

    #[test]
    fn empty_selection_is_no_update() {
        let (_root, dashboard, session) = setup();
        let none: [&str; 0] = [];
        assert_eq!(dashboard.h_tables(&none, Some(&session), false).unwrap(), Outcome::NoUpdate);
    }

    #[test]
    fn vanished_items_are_no_update() {
        let (_root, dashboard, session) = setup();
        let out = dashboard.raw_image(&["gone.img"], Some(&session)).unwrap();
        assert_eq!(out, Outcome::NoUpdate);
    }

    #[test]
    fn invalid_location_is_rejected_first() {
        let (root, dashboard, _session) = setup();
        let foreign = root.path().join("elsewhere");
        let err = dashboard.h_tables(&["m.img"], Some(&foreign), false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SessionError>(),
            Some(&SessionError::InvalidLocation(foreign))
        );
        let err = dashboard.h_tables(&["m.img"], None, false).unwrap_err();
        assert_eq!(err.downcast_ref::<SessionError>(), Some(&SessionError::MissingLocation));
    }

    #[test]
    fn tables_come_from_the_shared_cache() {
        let (_root, dashboard, session) = setup();
        let a = dashboard.h_tables(&["m.img"], Some(&session), true).unwrap().into_option().unwrap();
        let b = dashboard.h_tables(&["m.img"], Some(&session), true).unwrap().into_option().unwrap();
        assert!(Arc::ptr_eq(&a[0], &b[0]));
        assert_eq!(a[0].max_intensity(), Some(1.0));
    }

    #[test]
    fn downloads_are_named_after_the_item() {
        let (_root, dashboard, session) = setup();
        let options = TimeTableOptions {
            wavelength_range: Some(WavelengthRange::new(400.0, 401.0)),
            ..Default::default()
        };
        let v = dashboard.v_csv(&["m.img"], Some(&session), &options).unwrap().into_option().unwrap();
        assert_eq!(v.filename, "v(400-401)-m.img.csv");
        let h = dashboard.h_csv(&["m.img"], Some(&session), false).unwrap().into_option().unwrap();
        assert_eq!(h.filename, "h-m.img.csv");
        let png = dashboard.streak_png(&["m.img"], Some(&session)).unwrap().into_option().unwrap();
        assert_eq!(png.filename, "m.png");
    }

    #[test]
    fn raw_image_round_trips_through_base64() {
        let (_root, dashboard, session) = setup();
        let raw = dashboard.raw_image(&["m.img"], Some(&session)).unwrap().into_option().unwrap();
        let decoded = URL_SAFE.decode(raw.base64()).unwrap();
        assert_eq!(decoded, std::fs::read(session.join("m.img")).unwrap());
    }

    #[test]
    fn wavelength_bounds_span_the_selection() {
        let (_root, dashboard, session) = setup();
        let bounds = dashboard.wavelength_bounds(&["m.img"], Some(&session)).unwrap();
        assert_eq!(bounds, Outcome::Update((400.0, 402.0)));
    }

    #[test]
    fn slide_summary_is_json() {
        let (_root, dashboard, session) = setup();
        let out = dashboard
            .slide_summary(&["m.img"], Some(&session), &TimeTableOptions::default())
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(out.filename, "m.json");
        let value: serde_json::Value = serde_json::from_slice(out.bytes()).unwrap();
        assert_eq!(value["excitation_wavelength"], 405);
    }
}
