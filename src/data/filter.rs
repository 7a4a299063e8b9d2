use std::fmt;
use std::hash::{Hash, Hasher};

use super::model::{Measurement, MeasurementError};

// ---------------------------------------------------------------------------
// WavelengthRange – inclusive selection on the wavelength axis
// ---------------------------------------------------------------------------

/// Inclusive `[min, max]` wavelength window in nm.
///
/// Used as part of cache keys, so equality and hashing go through the bit
/// pattern of the bounds (after folding `-0.0` into `0.0`).
#[derive(Debug, Clone, Copy)]
pub struct WavelengthRange {
    min: f64,
    max: f64,
}

impl WavelengthRange {
    /// Build a range; bounds given in the wrong order are swapped.
    pub fn new(a: f64, b: f64) -> Self {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        WavelengthRange {
            min: canonical(min),
            max: canonical(max),
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, wavelength: f64) -> bool {
        self.min <= wavelength && wavelength <= self.max
    }
}

fn canonical(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialEq for WavelengthRange {
    fn eq(&self, other: &Self) -> bool {
        self.min.to_bits() == other.min.to_bits() && self.max.to_bits() == other.max.to_bits()
    }
}

impl Eq for WavelengthRange {}

impl Hash for WavelengthRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min.to_bits().hash(state);
        self.max.to_bits().hash(state);
    }
}

impl fmt::Display for WavelengthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Column selection
// ---------------------------------------------------------------------------

/// Indices of wavelength columns that fall inside `range` (all columns for `None`).
pub fn selected_columns(measurement: &Measurement, range: Option<WavelengthRange>) -> Vec<usize> {
    measurement
        .wavelength()
        .iter()
        .enumerate()
        .filter(|(_, &w)| range.map_or(true, |r| r.contains(w)))
        .map(|(i, _)| i)
        .collect()
}

impl Measurement {
    /// A copy of this measurement with only the wavelength columns in `range`.
    pub fn restricted_to(&self, range: WavelengthRange) -> Result<Measurement, MeasurementError> {
        let columns = selected_columns(self, Some(range));
        let wavelength = columns.iter().map(|&c| self.wavelength()[c]).collect();
        let counts = self
            .streak_image()
            .flat_map(|row| columns.iter().map(move |&c| row[c]))
            .collect();
        let mut restricted = Measurement::new(
            wavelength,
            self.time().to_vec(),
            counts,
            self.metadata().to_vec(),
        )?;
        restricted.offsets = self.offsets;
        Ok(restricted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn swaps_reversed_bounds() {
        let r = WavelengthRange::new(500.0, 450.0);
        assert_eq!((r.min(), r.max()), (450.0, 500.0));
    }

    #[test]
    fn bounds_are_inclusive() {
        let r = WavelengthRange::new(450.0, 460.0);
        assert!(r.contains(450.0));
        assert!(r.contains(460.0));
        assert!(!r.contains(460.0001));
    }

    #[test]
    fn negative_zero_hashes_like_zero() {
        let mut set = HashSet::new();
        set.insert(WavelengthRange::new(-0.0, 10.0));
        assert!(set.contains(&WavelengthRange::new(0.0, 10.0)));
    }

    #[test]
    fn restricts_columns() {
        let m = Measurement::new(
            vec![400.0, 401.0, 402.0, 403.0],
            vec![0.0, 1.0],
            vec![1, 2, 3, 4, 5, 6, 7, 8],
            vec![],
        )
        .unwrap();
        let r = m.restricted_to(WavelengthRange::new(401.0, 402.0)).unwrap();
        assert_eq!(r.wavelength(), &[401.0, 402.0]);
        assert_eq!(r.counts(), &[2, 3, 6, 7]);
        assert_eq!(r.time(), m.time());
    }

    #[test]
    fn no_range_selects_everything() {
        let m = Measurement::new(vec![1.0, 2.0], vec![0.0], vec![1, 1], vec![]).unwrap();
        assert_eq!(selected_columns(&m, None), vec![0, 1]);
    }
}
