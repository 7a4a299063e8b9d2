use chrono::NaiveDate;
use nalgebra::{Matrix4, Vector4};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Measurement – one parsed streak image
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum MeasurementError {
    #[error("intensity grid has {actual} samples, expected {wavelengths} x {times} = {expected}")]
    ShapeMismatch {
        wavelengths: usize,
        times: usize,
        expected: usize,
        actual: usize,
    },
}

/// A parsed streak image: intensity counts over (time, wavelength) plus axes
/// and the free-text comment lines written by the acquisition software.
///
/// The grid is stored row-major with one row per time sample, exactly as it
/// sits in the file, so `to_raw_binary` can write it back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    wavelength: Vec<f64>,
    time: Vec<f64>,
    counts: Vec<u32>,
    metadata: Vec<String>,
    /// Header fields that carry no meaning here but are preserved on export.
    pub(crate) offsets: (u16, u16),
}

impl Measurement {
    pub fn new(
        wavelength: Vec<f64>,
        time: Vec<f64>,
        counts: Vec<u32>,
        metadata: Vec<String>,
    ) -> Result<Self, MeasurementError> {
        let expected = wavelength.len() * time.len();
        if counts.len() != expected {
            return Err(MeasurementError::ShapeMismatch {
                wavelengths: wavelength.len(),
                times: time.len(),
                expected,
                actual: counts.len(),
            });
        }
        Ok(Measurement {
            wavelength,
            time,
            counts,
            metadata,
            offsets: (0, 0),
        })
    }

    /// Wavelength axis (nm), one value per grid column.
    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    /// Time axis (ns), one value per grid row.
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn width(&self) -> usize {
        self.wavelength.len()
    }

    pub fn height(&self) -> usize {
        self.time.len()
    }

    /// Intensity at grid position (time row, wavelength column).
    pub fn intensity(&self, row: usize, col: usize) -> u32 {
        self.counts[row * self.width() + col]
    }

    /// The streak image as rows of counts, one row per time sample.
    pub fn streak_image(&self) -> impl Iterator<Item = &[u32]> + '_ {
        // chunks() panics on 0; an empty axis means there are no rows anyway.
        self.counts.chunks(self.width().max(1))
    }

    /// Smallest and largest wavelength, if the axis is non-empty.
    pub fn wavelength_bounds(&self) -> Option<(f64, f64)> {
        bounds(&self.wavelength)
    }

    pub fn time_bounds(&self) -> Option<(f64, f64)> {
        bounds(&self.time)
    }

    // -- metadata helpers --

    /// Frame count from `Frame=<n>,` on the first comment line.
    pub fn frame(&self) -> Option<u32> {
        let line = self.metadata.first()?;
        field_between(line, "Frame=", ",")?.parse().ok()
    }

    /// Spectrograph center wavelength from `Wavelength=<x>[nm],` on the third line.
    pub fn center_wavelength(&self) -> Option<f64> {
        let line = self.metadata.get(2)?;
        field_between(line, "Wavelength=", "[nm],")?.parse().ok()
    }

    /// Acquisition date from `Date:<yyyy/mm/dd>,` on the fourth line.
    pub fn date(&self) -> Option<NaiveDate> {
        let line = self.metadata.get(3)?;
        let raw = field_between(line, "Date:", ",")?;
        NaiveDate::parse_from_str(raw.trim(), "%Y/%m/%d").ok()
    }
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn field_between<'a>(line: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = line.find(start)? + start.len();
    let rest = &line[from..];
    let to = rest.find(end)?;
    Some(&rest[..to])
}

// ---------------------------------------------------------------------------
// DerivedTable – an aggregated profile
// ---------------------------------------------------------------------------

/// Which axis a derived table runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// H-profile: one row per wavelength, intensity summed over time.
    Wavelength,
    /// V-profile: one row per time sample, intensity summed over wavelength.
    Time,
}

impl Axis {
    pub fn column_name(self) -> &'static str {
        match self {
            Axis::Wavelength => "wavelength",
            Axis::Time => "time",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Axis::Wavelength => "nm",
            Axis::Time => "ns",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub axis: f64,
    pub intensity: f64,
    /// Smoothed intensity, filled in by the builder; used for peak annotation only.
    pub smoothed_intensity: Option<f64>,
    /// Fitted decay curve; `None` outside the fit window or when no fit was made.
    pub fit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTable {
    pub axis: Axis,
    /// Source file name tag.
    pub name: String,
    /// Rows in ascending axis order.
    pub rows: Vec<TableRow>,
    /// Whether intensities were divided by the raw maximum.
    pub normalized: bool,
    pub fit: Option<FitResult>,
}

impl DerivedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn axis_values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.axis).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.intensity).collect()
    }

    /// Smoothed intensities, falling back to the raw value for unsmoothed rows.
    pub fn smoothed_intensities(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| r.smoothed_intensity.unwrap_or(r.intensity))
            .collect()
    }

    /// `(axis, fit)` pairs inside the fit window.
    pub fn fit_points(&self) -> Vec<[f64; 2]> {
        self.rows
            .iter()
            .filter_map(|r| r.fit.map(|f| [r.axis, f]))
            .collect()
    }

    pub fn max_intensity(&self) -> Option<f64> {
        self.rows
            .iter()
            .map(|r| r.intensity)
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }
}

// ---------------------------------------------------------------------------
// FitResult – two-exponential decay
// ---------------------------------------------------------------------------

/// Outcome of a successful two-exponential fit.
///
/// Component `a` is always the faster one (`tau1 <= tau2`), and the two
/// amplitude percentages always sum to exactly 100.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub a: u32,
    pub tau1: f64,
    pub b: u32,
    pub tau2: f64,
    /// Raw solver output in model order `(a, tau1, b, tau2)`.
    pub params: Vector4<f64>,
    pub covariance: Matrix4<f64>,
}

impl FitResult {
    /// Sort the two `(amplitude, tau)` pairs by ascending tau and convert the
    /// amplitudes into integer percentages. Returns `None` when the amplitudes
    /// do not sum to something positive.
    pub fn from_params(params: Vector4<f64>, covariance: Matrix4<f64>) -> Option<Self> {
        let mut pairs = [(params[0], params[1]), (params[2], params[3])];
        // Stable: equal taus keep solver order.
        pairs.sort_by(|x, y| x.1.total_cmp(&y.1));
        let [(amp_fast, tau_fast), (amp_slow, tau_slow)] = pairs;

        let total = amp_fast + amp_slow;
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }
        let a = (100.0 * amp_fast / total).round().clamp(0.0, 100.0) as u32;
        Some(FitResult {
            a,
            tau1: tau_fast,
            b: 100 - a,
            tau2: tau_slow,
            params,
            covariance,
        })
    }

    /// Evaluate the fitted model (normalized to the fitted peak) at `t`.
    pub fn model(&self, t: f64) -> f64 {
        crate::data::fit::double_exponential(t, &self.params)
    }

    pub fn label(&self) -> String {
        format!(
            "a : b = {}:{}, τ₁ = {:.3} ns, τ₂ = {:.3} ns",
            self.a, self.b, self.tau1, self.tau2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Measurement {
        Measurement::new(
            vec![400.0, 401.0, 402.0],
            vec![0.0, 1.0],
            vec![1, 2, 3, 4, 5, 6],
            vec![
                "HiPic,1.0,100,Frame=12,Acquire".to_string(),
                "[Application]".to_string(),
                "Spectrograph,Wavelength=480.5[nm],Grating=1".to_string(),
                "Date:2023/05/17,Time:10:11:12".to_string(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_wrong_grid_size() {
        let err = Measurement::new(vec![1.0, 2.0], vec![0.0], vec![1], vec![]).unwrap_err();
        assert_eq!(
            err,
            MeasurementError::ShapeMismatch {
                wavelengths: 2,
                times: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn indexes_rows_by_time() {
        let m = sample();
        assert_eq!(m.intensity(1, 0), 4);
        let rows: Vec<&[u32]> = m.streak_image().collect();
        assert_eq!(rows, vec![&[1, 2, 3][..], &[4, 5, 6][..]]);
    }

    #[test]
    fn parses_metadata_fields() {
        let m = sample();
        assert_eq!(m.frame(), Some(12));
        assert_eq!(m.center_wavelength(), Some(480.5));
        assert_eq!(m.date(), NaiveDate::from_ymd_opt(2023, 5, 17));
    }

    #[test]
    fn missing_metadata_yields_none() {
        let m = Measurement::new(vec![], vec![], vec![], vec![]).unwrap();
        assert_eq!(m.frame(), None);
        assert_eq!(m.center_wavelength(), None);
        assert_eq!(m.date(), None);
        assert_eq!(m.wavelength_bounds(), None);
    }

    #[test]
    fn fit_result_orders_fast_component_first() {
        let params = Vector4::new(0.3, 8.0, 0.7, 1.5);
        let fit = FitResult::from_params(params, Matrix4::zeros()).unwrap();
        assert_eq!(fit.tau1, 1.5);
        assert_eq!(fit.tau2, 8.0);
        assert_eq!(fit.a, 70);
        assert_eq!(fit.b, 30);
    }

    #[test]
    fn fit_percentages_always_sum_to_100() {
        for (amp1, amp2) in [(1.0, 2.0), (0.333, 0.667), (1e-9, 1.0), (5.0, 0.0)] {
            let params = Vector4::new(amp1, 1.0, amp2, 2.0);
            let fit = FitResult::from_params(params, Matrix4::zeros()).unwrap();
            assert_eq!(fit.a + fit.b, 100);
            assert!(fit.tau1 <= fit.tau2);
        }
    }

    #[test]
    fn zero_amplitudes_are_rejected() {
        let params = Vector4::new(0.0, 1.0, 0.0, 2.0);
        assert!(FitResult::from_params(params, Matrix4::zeros()).is_none());
    }
}
