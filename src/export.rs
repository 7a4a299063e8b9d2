use std::io::Cursor;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use image::{ImageFormat, RgbImage};
use palette::{Hsl, IntoColor, Srgb};
use serde::Serialize;

use crate::data::model::{Axis, DerivedTable, Measurement};
use crate::data::signal;

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WavelengthCsvRow<'a> {
    wavelength: f64,
    intensity: f64,
    smoothed_intensity: Option<f64>,
    name: &'a str,
}

#[derive(Serialize)]
struct TimeCsvRow<'a> {
    time: f64,
    intensity: f64,
    /// Empty outside the fit window.
    fit: Option<f64>,
    name: &'a str,
}

/// Serialise a derived table with a header row and no index column.
///
/// H tables carry `smoothed_intensity`, V tables carry `fit`.
pub fn table_to_csv(table: &DerivedTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &table.rows {
        let written = match table.axis {
            Axis::Wavelength => writer.serialize(WavelengthCsvRow {
                wavelength: row.axis,
                intensity: row.intensity,
                smoothed_intensity: row.smoothed_intensity,
                name: &table.name,
            }),
            Axis::Time => writer.serialize(TimeCsvRow {
                time: row.axis,
                intensity: row.intensity,
                fit: row.fit,
                name: &table.name,
            }),
        };
        written.context("writing CSV row")?;
    }
    if table.is_empty() {
        let header: &[&str] = match table.axis {
            Axis::Wavelength => &["wavelength", "intensity", "smoothed_intensity", "name"],
            Axis::Time => &["time", "intensity", "fit", "name"],
        };
        writer.write_record(header).context("writing CSV header")?;
    }
    let bytes = writer.into_inner().context("flushing CSV")?;
    String::from_utf8(bytes).context("CSV is not UTF-8")
}

// ---------------------------------------------------------------------------
// Streak image PNG
// ---------------------------------------------------------------------------

/// Map `fraction` in `[0, 1]` onto a blue → red hue ramp.
pub fn heat_color(fraction: f64) -> [u8; 3] {
    let f = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0) as f32
    } else {
        0.0
    };
    let hsl = Hsl::new(240.0 * (1.0 - f), 0.9, 0.1 + 0.45 * f);
    let rgb: Srgb = hsl.into_color();
    [
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
    ]
}

/// RGB pixels of the streak image, one row per time sample (earliest on
/// top), colour on a log scale of the counts.
pub fn streak_pixels(measurement: &Measurement) -> (usize, usize, Vec<u8>) {
    let max = measurement.counts().iter().copied().max().unwrap_or(0);
    let scale = f64::from(max).ln_1p();
    let pixels = measurement
        .counts()
        .iter()
        .flat_map(|&c| {
            let fraction = if scale > 0.0 { f64::from(c).ln_1p() / scale } else { 0.0 };
            heat_color(fraction)
        })
        .collect();
    (measurement.width(), measurement.height(), pixels)
}

/// PNG encoding of [`streak_pixels`].
pub fn streak_png(measurement: &Measurement) -> Result<Vec<u8>> {
    let (width, height, pixels) = streak_pixels(measurement);
    let image = RgbImage::from_raw(width as u32, height as u32, pixels)
        .context("pixel buffer does not match the image size")?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("encoding streak image as PNG")?;
    Ok(out.into_inner())
}

// ---------------------------------------------------------------------------
// Slide summary
// ---------------------------------------------------------------------------

/// Excitation settings are not recorded in the file; these are the lab defaults.
pub const EXCITATION_WAVELENGTH_NM: u32 = 405;
pub const EXCITATION_POWER: u32 = 5;

/// Scalar values handed to the slide-deck builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideSummary {
    pub title: String,
    pub excitation_wavelength: u32,
    pub excitation_power: u32,
    /// Rounded span of the time axis (ns).
    pub time_range: i64,
    pub center_wavelength: i64,
    pub frame: u32,
    pub date: NaiveDate,
    /// FWHM of the H-profile peak (nm).
    pub fwhm: Option<f64>,
    pub peak_wavelength: Option<f64>,
    pub a: Option<u32>,
    pub b: Option<u32>,
    pub tau1: Option<f64>,
    pub tau2: Option<f64>,
}

impl SlideSummary {
    /// Collect the summary from a measurement and its H and (fitted) V tables.
    /// Missing metadata falls back to zero, and the date to `today`.
    pub fn new(
        title: &str,
        measurement: &Measurement,
        h_table: &DerivedTable,
        v_table: &DerivedTable,
        today: NaiveDate,
    ) -> Self {
        let axis = h_table.axis_values();
        let smoothed = h_table.smoothed_intensities();
        let fit = v_table.fit.as_ref();
        SlideSummary {
            title: title.to_string(),
            excitation_wavelength: EXCITATION_WAVELENGTH_NM,
            excitation_power: EXCITATION_POWER,
            time_range: measurement
                .time_bounds()
                .map_or(0, |(lo, hi)| (hi - lo).round() as i64),
            center_wavelength: measurement.center_wavelength().map_or(0, |w| w as i64),
            frame: measurement.frame().unwrap_or(0),
            date: measurement.date().unwrap_or(today),
            fwhm: signal::fwhm(&axis, &smoothed),
            peak_wavelength: signal::find_peak(&axis, &smoothed).map(|(x, _)| x),
            a: fit.map(|f| f.a),
            b: fit.map(|f| f.b),
            tau1: fit.map(|f| f.tau1),
            tau2: fit.map(|f| f.tau2),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialising slide summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::builder::{time_table, wavelength_table, TimeTableOptions};

    fn measurement() -> Measurement {
        Measurement::new(
            vec![450.0, 451.0, 452.0],
            vec![0.0, 1.0],
            vec![1, 5, 2, 0, 3, 1],
            vec![
                "Frame=4,".into(),
                String::new(),
                "Wavelength=451[nm],".into(),
                "Date:2024/01/02,".into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn h_csv_has_header_and_smoothed_column() {
        let table = wavelength_table(&measurement(), "m.img", false);
        let csv = table_to_csv(&table).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "wavelength,intensity,smoothed_intensity,name");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("450.0,1.0,"));
        assert!(lines[1].ends_with(",m.img"));
    }

    #[test]
    fn v_csv_leaves_fit_empty_without_fit() {
        let table = time_table(&measurement(), "m.img", &TimeTableOptions::default());
        let csv = table_to_csv(&table).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,intensity,fit,name");
        assert_eq!(lines[1], "0.0,8.0,,m.img");
        assert_eq!(lines[2], "1.0,4.0,,m.img");
    }

    #[test]
    fn empty_table_still_has_header() {
        let empty = Measurement::new(vec![], vec![], vec![], vec![]).unwrap();
        let csv = table_to_csv(&time_table(&empty, "e", &TimeTableOptions::default())).unwrap();
        assert_eq!(csv.trim(), "time,intensity,fit,name");
    }

    #[test]
    fn streak_png_has_png_signature() {
        let png = streak_png(&measurement()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn heat_color_endpoints() {
        let cold = heat_color(0.0);
        let hot = heat_color(1.0);
        assert!(cold[2] > cold[0]);
        assert!(hot[0] > hot[2]);
        assert_eq!(heat_color(f64::NAN), cold);
    }

    #[test]
    fn summary_reads_metadata_and_fit() {
        let m = measurement();
        let h = wavelength_table(&m, "m.img", false);
        let v = time_table(&m, "m.img", &TimeTableOptions::default());
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let summary = SlideSummary::new("m", &m, &h, &v, today);
        assert_eq!(summary.frame, 4);
        assert_eq!(summary.center_wavelength, 451);
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(summary.time_range, 1);
        assert_eq!(summary.a, None);
        assert!(summary.to_json().unwrap().contains("\"excitation_wavelength\": 405"));
    }

    #[test]
    fn summary_falls_back_to_today() {
        let m = Measurement::new(vec![1.0], vec![0.0], vec![1], vec![]).unwrap();
        let h = wavelength_table(&m, "x", false);
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let summary = SlideSummary::new("x", &m, &h, &h, today);
        assert_eq!(summary.date, today);
        assert_eq!(summary.frame, 0);
    }
}
