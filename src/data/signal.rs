//! Small numeric helpers used to annotate profiles: smoothing, peak
//! position, half-maximum range and the automatic decay fit window.

/// Moving-average window used by [`smooth`].
pub const SMOOTHING_WINDOW: usize = 5;

/// Fraction of the peak below which the decay is considered finished.
pub const FIT_RANGE_CUTOFF: f64 = 0.01;

/// Centered moving average; the window shrinks at both ends so the output
/// has the same length as the input and no zero padding leaks in.
pub fn smooth(values: &[f64]) -> Vec<f64> {
    let half = SMOOTHING_WINDOW / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            let window = &values[lo..hi];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Index of the largest finite value.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Position and height of the maximum.
pub fn find_peak(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let i = argmax(y)?;
    Some((*x.get(i)?, y[i]))
}

/// Interpolated positions left and right of the peak where `y` crosses half
/// of its maximum. Falls back to the first / last `x` when no crossing exists.
pub fn find_half_range(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    let peak = argmax(&y[..n])?;
    let half = y[peak] / 2.0;

    let left = (0..peak)
        .rev()
        .find(|&i| y[i] < half)
        .map(|i| interpolate(x[i], y[i], x[i + 1], y[i + 1], half))
        .unwrap_or(x[0]);
    let right = (peak + 1..n)
        .find(|&i| y[i] < half)
        .map(|i| interpolate(x[i - 1], y[i - 1], x[i], y[i], half))
        .unwrap_or(x[n - 1]);
    Some((left, right))
}

/// Full width at half maximum.
pub fn fwhm(x: &[f64], y: &[f64]) -> Option<f64> {
    find_half_range(x, y).map(|(left, right)| (right - left).abs())
}

fn interpolate(x0: f64, y0: f64, x1: f64, y1: f64, level: f64) -> f64 {
    if y1 == y0 {
        return x0;
    }
    x0 + (level - y0) * (x1 - x0) / (y1 - y0)
}

/// Window `(start, end)` on the time axis for fitting a decay curve: from the
/// time of peak intensity up to the first later sample that falls below
/// [`FIT_RANGE_CUTOFF`] of the peak (or the last sample).
pub fn determine_fit_range(time: &[f64], intensity: &[f64]) -> Option<(f64, f64)> {
    let n = time.len().min(intensity.len());
    let peak = argmax(&intensity[..n])?;
    let threshold = intensity[peak] * FIT_RANGE_CUTOFF;
    let end = (peak + 1..n)
        .find(|&i| intensity[i] < threshold)
        .unwrap_or(n - 1);
    Some((time[peak], time[end]))
}
