use super::filter::{selected_columns, WavelengthRange};
use super::fit::fit_double_exponential;
use super::model::{Axis, DerivedTable, FitResult, Measurement, TableRow};
use super::signal;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Everything that shapes a time-resolved (V) table besides the source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeTableOptions {
    /// Inclusive wavelength window to sum over; `None` sums every wavelength.
    pub wavelength_range: Option<WavelengthRange>,
    pub fitting: bool,
    pub normalize: bool,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// H-profile: for each distinct wavelength, the intensity summed over all
/// time samples.
pub fn aggregate_along_time(measurement: &Measurement) -> DerivedTable {
    let width = measurement.width();
    let mut sums = vec![0.0; width];
    for row in measurement.streak_image() {
        for (sum, &count) in sums.iter_mut().zip(row) {
            *sum += f64::from(count);
        }
    }
    let pairs = measurement.wavelength().iter().copied().zip(sums).collect();
    raw_table(Axis::Wavelength, pairs)
}

/// V-profile: for each distinct time sample, the intensity summed over the
/// wavelengths inside `wavelength_range` (all of them for `None`).
pub fn aggregate_along_wavelength(
    measurement: &Measurement,
    wavelength_range: Option<WavelengthRange>,
) -> DerivedTable {
    let columns = selected_columns(measurement, wavelength_range);
    let pairs = measurement
        .time()
        .iter()
        .copied()
        .zip(measurement.streak_image())
        .map(|(t, row)| (t, columns.iter().map(|&c| f64::from(row[c])).sum()))
        .collect();
    raw_table(Axis::Time, pairs)
}

/// Sort `(axis, intensity)` pairs and merge repeated axis values.
fn raw_table(axis: Axis, mut pairs: Vec<(f64, f64)>) -> DerivedTable {
    pairs.sort_by(|l, r| l.0.total_cmp(&r.0));
    let mut rows: Vec<TableRow> = Vec::with_capacity(pairs.len());
    for (value, intensity) in pairs {
        match rows.last_mut() {
            Some(last) if last.axis == value => last.intensity += intensity,
            _ => rows.push(TableRow {
                axis: value,
                intensity,
                smoothed_intensity: None,
                fit: None,
            }),
        }
    }
    DerivedTable {
        axis,
        name: String::new(),
        rows,
        normalized: false,
        fit: None,
    }
}

// ---------------------------------------------------------------------------
// Derived tables (aggregation + post-processing)
// ---------------------------------------------------------------------------

/// Wavelength-resolved table: aggregate, smooth, optionally normalize.
pub fn wavelength_table(measurement: &Measurement, name: &str, normalize: bool) -> DerivedTable {
    let mut table = aggregate_along_time(measurement);
    table.name = name.to_string();
    apply_smoothing(&mut table);
    if normalize {
        apply_normalization(&mut table);
    }
    table
}

/// Time-resolved table: aggregate over the wavelength window, smooth,
/// optionally fit, optionally normalize (in that order).
pub fn time_table(measurement: &Measurement, name: &str, options: &TimeTableOptions) -> DerivedTable {
    let mut table = aggregate_along_wavelength(measurement, options.wavelength_range);
    table.name = name.to_string();
    apply_smoothing(&mut table);
    if options.fitting {
        apply_fit(&mut table);
    }
    if options.normalize {
        apply_normalization(&mut table);
    }
    table
}

fn apply_smoothing(table: &mut DerivedTable) {
    let smoothed = signal::smooth(&table.intensities());
    for (row, s) in table.rows.iter_mut().zip(smoothed) {
        row.smoothed_intensity = Some(s);
    }
}

/// Fit the decay inside the automatic window and write the curve back onto
/// the rows of that window. A failed fit leaves the table without one.
fn apply_fit(table: &mut DerivedTable) {
    let Some(max) = table.max_intensity().filter(|m| m.is_finite() && *m > 0.0) else {
        log::warn!("{}: no positive intensity, skipping fit", table.name);
        return;
    };
    let time = table.axis_values();
    let Some((start, end)) = signal::determine_fit_range(&time, &table.intensities()) else {
        return;
    };

    let window: Vec<usize> = (0..table.len())
        .filter(|&i| start <= time[i] && time[i] <= end)
        .collect();
    let x: Vec<f64> = window.iter().map(|&i| time[i]).collect();
    let y: Vec<f64> = window.iter().map(|&i| table.rows[i].intensity / max).collect();

    let solved = match fit_double_exponential(&x, &y) {
        Ok(solved) => solved,
        Err(e) => {
            log::warn!("{}: decay fit over {start}..{end} ns failed: {e}", table.name);
            return;
        }
    };
    let Some(fit) = FitResult::from_params(solved.params, solved.covariance) else {
        log::warn!("{}: decay fit produced zero amplitudes", table.name);
        return;
    };

    for &i in &window {
        let row = &mut table.rows[i];
        row.fit = Some(fit.model(row.axis) * max);
    }
    log::debug!("{}: fitted {}", table.name, fit.label());
    table.fit = Some(fit);
}

/// Divide every intensity column by the raw maximum so the peak is exactly 1.
///
/// A table whose maximum is not a positive finite number is left as is and
/// stays marked as not normalized.
fn apply_normalization(table: &mut DerivedTable) {
    let Some(max) = table.max_intensity().filter(|m| m.is_finite() && *m > 0.0) else {
        if !table.is_empty() {
            log::warn!("{}: maximum intensity is zero, not normalizing", table.name);
        }
        return;
    };
    for row in &mut table.rows {
        row.intensity /= max;
        row.smoothed_intensity = row.smoothed_intensity.map(|s| s / max);
        row.fit = row.fit.map(|f| f / max);
    }
    table.normalized = true;
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    use super::*;
    use crate::data::fit::double_exponential;

    fn uniform(wavelengths: usize, times: usize, value: u32) -> Measurement {
        Measurement::new(
            (0..wavelengths).map(|i| 400.0 + i as f64).collect(),
            (0..times).map(|i| i as f64 * 0.5).collect(),
            vec![value; wavelengths * times],
            vec![],
        )
        .unwrap()
    }

    /// Streak image whose every column decays as `0.7 e^{-t/0.8} + 0.3 e^{-t/6}`.
    fn decaying(times: usize) -> Measurement {
        let params = Vector4::new(0.7, 0.8, 0.3, 6.0);
        let wavelength = vec![450.0, 455.0, 460.0];
        let time: Vec<f64> = (0..times).map(|i| i as f64 * 0.1).collect();
        let counts = time
            .iter()
            .flat_map(|&t| {
                let c = (100_000.0 * double_exponential(t, &params)).round() as u32;
                std::iter::repeat(c).take(3)
            })
            .collect();
        Measurement::new(wavelength, time, counts, vec![]).unwrap()
    }

    #[test]
    fn h_profile_sums_over_time() {
        let m = uniform(401, 7, 10);
        let table = aggregate_along_time(&m);
        assert_eq!(table.axis, Axis::Wavelength);
        assert_eq!(table.len(), 401);
        assert!(table.rows.iter().all(|r| r.intensity == 70.0));
        assert!(table.rows.windows(2).all(|w| w[0].axis < w[1].axis));
    }

    #[test]
    fn v_profile_respects_inclusive_range() {
        let m = uniform(401, 7, 10);
        let table = aggregate_along_wavelength(&m, Some(WavelengthRange::new(450.0, 460.0)));
        assert_eq!(table.len(), 7);
        // 450..=460 is 11 wavelengths.
        assert!(table.rows.iter().all(|r| r.intensity == 110.0));
    }

    #[test]
    fn range_filter_commutes_with_aggregation() {
        let m = decaying(40);
        let range = WavelengthRange::new(452.0, 460.0);
        let direct = aggregate_along_wavelength(&m, Some(range));
        let prefiltered = aggregate_along_wavelength(&m.restricted_to(range).unwrap(), None);
        assert_eq!(direct, prefiltered);
    }

    #[test]
    fn unordered_axes_are_sorted_and_merged() {
        let m = Measurement::new(
            vec![402.0, 400.0, 402.0],
            vec![1.0, 0.0],
            vec![1, 2, 3, 4, 5, 6],
            vec![],
        )
        .unwrap();
        let h = aggregate_along_time(&m);
        assert_eq!(h.axis_values(), vec![400.0, 402.0]);
        assert_eq!(h.intensities(), vec![7.0, 14.0]);

        let v = aggregate_along_wavelength(&m, None);
        assert_eq!(v.axis_values(), vec![0.0, 1.0]);
        assert_eq!(v.intensities(), vec![15.0, 6.0]);
    }

    #[test]
    fn empty_measurement_gives_empty_tables() {
        let m = Measurement::new(vec![], vec![], vec![], vec![]).unwrap();
        let options = TimeTableOptions {
            fitting: true,
            normalize: true,
            ..Default::default()
        };
        assert!(wavelength_table(&m, "e.img", true).is_empty());
        let v = time_table(&m, "e.img", &options);
        assert!(v.is_empty());
        assert!(v.fit.is_none());
        assert!(!v.normalized);
    }

    #[test]
    fn normalization_makes_peak_exactly_one() {
        let m = decaying(60);
        let table = wavelength_table(&m, "d.img", true);
        assert!(table.normalized);
        assert_eq!(table.max_intensity(), Some(1.0));

        let plain = wavelength_table(&m, "d.img", false);
        assert!(!plain.normalized);
        assert_eq!(plain.intensities(), aggregate_along_time(&m).intensities());
    }

    #[test]
    fn zero_intensity_is_left_unnormalized() {
        let m = uniform(5, 5, 0);
        let table = wavelength_table(&m, "z.img", true);
        assert!(!table.normalized);
        assert!(table.rows.iter().all(|r| r.intensity == 0.0));
    }

    #[test]
    fn time_table_fits_decay() {
        let m = decaying(300);
        let options = TimeTableOptions {
            fitting: true,
            ..Default::default()
        };
        let table = time_table(&m, "d.img", &options);
        let fit = table.fit.as_ref().expect("fit should converge on clean data");
        assert_eq!(fit.a + fit.b, 100);
        assert!(fit.tau1 <= fit.tau2);
        assert_relative_eq!(fit.tau1, 0.8, epsilon = 0.01);
        assert_relative_eq!(fit.tau2, 6.0, epsilon = 0.1);
        assert_eq!(fit.a, 70);

        // The curve is written back at the measured scale.
        let first = &table.rows[0];
        assert_relative_eq!(first.fit.unwrap(), first.intensity, max_relative = 1e-3);
    }

    #[test]
    fn fit_column_is_absent_without_fitting() {
        let table = time_table(&decaying(50), "d.img", &TimeTableOptions::default());
        assert!(table.fit.is_none());
        assert!(table.rows.iter().all(|r| r.fit.is_none()));
        assert!(table.rows.iter().all(|r| r.smoothed_intensity.is_some()));
    }

    #[test]
    fn normalization_also_scales_fit() {
        let options = TimeTableOptions {
            fitting: true,
            normalize: true,
            ..Default::default()
        };
        let table = time_table(&decaying(300), "d.img", &options);
        assert!(table.normalized);
        assert_eq!(table.max_intensity(), Some(1.0));
        let first_fit = table.rows[0].fit.unwrap();
        assert_relative_eq!(first_fit, 1.0, max_relative = 1e-3);
    }

    #[test]
    fn failed_fit_still_returns_the_full_table() {
        // Intensity peaks at the last sample, so the fit window is a single point.
        let times = 12;
        let m = Measurement::new(
            vec![450.0, 451.0],
            (0..times).map(f64::from).collect(),
            (0..times).flat_map(|i| [10 * (i as u32 + 1); 2]).collect(),
            vec![],
        )
        .unwrap();
        let options = TimeTableOptions {
            fitting: true,
            ..Default::default()
        };
        let table = time_table(&m, "rising.img", &options);
        assert_eq!(table.len(), times as usize);
        assert_eq!(table.intensities(), aggregate_along_wavelength(&m, None).intensities());
        assert!(table.fit.is_none());
        assert!(table.rows.iter().all(|r| r.fit.is_none()));
        assert!(table.rows.iter().all(|r| r.smoothed_intensity.is_some()));
    }

    #[test]
    fn single_exponential_decay_gets_a_fit() {
        let time: Vec<f64> = (0..200).map(|i| i as f64 * 0.1).collect();
        let counts = time
            .iter()
            .flat_map(|&t| [(100_000.0 * (-t / 2.0).exp()).round() as u32; 2])
            .collect();
        let m = Measurement::new(vec![450.0, 451.0], time, counts, vec![]).unwrap();
        let options = TimeTableOptions {
            fitting: true,
            ..Default::default()
        };
        let fit = time_table(&m, "mono.img", &options).fit.expect("mono-exponential decay fits");
        assert_eq!(fit.a + fit.b, 100);
        assert!(fit.tau1 <= fit.tau2);
    }

    #[test]
    fn name_tag_is_set() {
        let table = wavelength_table(&uniform(3, 3, 1), "sample.img", false);
        assert_eq!(table.name, "sample.img");
    }
}
