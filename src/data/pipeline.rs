use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use super::builder::{self, TimeTableOptions};
use super::cache::{CacheStats, MemoCache};
use super::loader;
use super::model::{DerivedTable, Measurement};

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WavelengthTableKey {
    pub path: PathBuf,
    pub normalize: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeTableKey {
    pub path: PathBuf,
    pub options: TimeTableOptions,
}

// ---------------------------------------------------------------------------
// Pipeline – memoized read → aggregate → fit → normalize
// ---------------------------------------------------------------------------

/// Owns one cache per memoized operation. Construct one per process (or per
/// test) and share it by reference; cached values are read-only `Arc`s.
#[derive(Debug)]
pub struct Pipeline {
    measurements: MemoCache<PathBuf, Measurement>,
    wavelength_tables: MemoCache<WavelengthTableKey, DerivedTable>,
    time_tables: MemoCache<TimeTableKey, DerivedTable>,
}

impl Pipeline {
    pub fn new(capacity: usize) -> Self {
        Pipeline {
            measurements: MemoCache::new(capacity),
            wavelength_tables: MemoCache::new(capacity),
            time_tables: MemoCache::new(capacity),
        }
    }

    /// Parse a streak image, or return the cached parse for this path.
    pub fn load_measurement(&self, path: &Path) -> Result<Arc<Measurement>> {
        self.measurements
            .get_or_try_insert_with(path.to_path_buf(), || {
                log::info!("reading {}", path.display());
                loader::read_file(path)
            })
    }

    pub fn wavelength_table(&self, path: &Path, normalize: bool) -> Result<Arc<DerivedTable>> {
        let key = WavelengthTableKey {
            path: path.to_path_buf(),
            normalize,
        };
        self.wavelength_tables.get_or_try_insert_with(key, || {
            log::debug!("building H table for {} (normalize={normalize})", path.display());
            let measurement = self.load_measurement(path)?;
            Ok(builder::wavelength_table(&measurement, &file_name(path), normalize))
        })
    }

    pub fn wavelength_tables(&self, paths: &[PathBuf], normalize: bool) -> Result<Vec<Arc<DerivedTable>>> {
        paths
            .iter()
            .map(|p| self.wavelength_table(p, normalize))
            .collect()
    }

    pub fn time_table(&self, path: &Path, options: &TimeTableOptions) -> Result<Arc<DerivedTable>> {
        let key = TimeTableKey {
            path: path.to_path_buf(),
            options: *options,
        };
        self.time_tables.get_or_try_insert_with(key, || {
            log::debug!("building V table for {} ({options:?})", path.display());
            let measurement = self.load_measurement(path)?;
            Ok(builder::time_table(&measurement, &file_name(path), options))
        })
    }

    pub fn time_tables(&self, paths: &[PathBuf], options: &TimeTableOptions) -> Result<Vec<Arc<DerivedTable>>> {
        paths.iter().map(|p| self.time_table(p, options)).collect()
    }

    /// Counters for the measurement, H-table and V-table caches.
    pub fn stats(&self) -> [CacheStats; 3] {
        [
            self.measurements.stats(),
            self.wavelength_tables.stats(),
            self.time_tables.stats(),
        ]
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(super::cache::DEFAULT_CAPACITY)
    }
}

/// Final path component, used to tag table rows.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
