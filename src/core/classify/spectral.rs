//! Threshold tests shared by the sensor classifiers
//!
//! Band selections and thresholds are plain configuration so the same
//! tests serve every sensor.

use crate::types::{IdepixError, IdepixResult};
use serde::{Deserialize, Serialize};

/// Brightness from one band, or a weighted sum of two bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightnessTest {
    pub band: usize,
    pub weight: f64,
    #[serde(default)]
    pub second_band: Option<usize>,
    #[serde(default)]
    pub second_weight: f64,
    pub threshold: f64,
}

impl BrightnessTest {
    pub fn single(band: usize, threshold: f64) -> Self {
        Self { band, weight: 1.0, second_band: None, second_weight: 0.0, threshold }
    }

    pub fn weighted(band: usize, weight: f64, second_band: usize, second_weight: f64, threshold: f64) -> Self {
        Self { band, weight, second_band: Some(second_band), second_weight, threshold }
    }

    pub fn value(&self, reflectances: &[f64]) -> f64 {
        let first = reflectances.get(self.band).copied().unwrap_or(f64::NAN) * self.weight;
        match self.second_band {
            Some(b) => first + reflectances.get(b).copied().unwrap_or(f64::NAN) * self.second_weight,
            None => first,
        }
    }

    pub fn is_bright(&self, reflectances: &[f64]) -> bool {
        self.value(reflectances) > self.threshold
    }

    fn max_band(&self) -> usize {
        self.band.max(self.second_band.unwrap_or(0))
    }

    fn validate(&self, label: &str) -> IdepixResult<()> {
        if self.weight <= 0.0 || (self.second_band.is_some() && self.second_weight <= 0.0) {
            return Err(IdepixError::Config(format!("{} weights must be positive", label)));
        }
        Ok(())
    }
}

/// Ratio of two bands; a pixel is white when the ratio stays below the threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhitenessTest {
    pub numerator_band: usize,
    pub denominator_band: usize,
    pub threshold: f64,
}

impl WhitenessTest {
    pub fn new(numerator_band: usize, denominator_band: usize, threshold: f64) -> Self {
        Self { numerator_band, denominator_band, threshold }
    }

    pub fn value(&self, reflectances: &[f64]) -> f64 {
        match (reflectances.get(self.numerator_band), reflectances.get(self.denominator_band)) {
            (Some(n), Some(d)) => n / d,
            _ => f64::NAN,
        }
    }

    pub fn is_white(&self, reflectances: &[f64]) -> bool {
        let ratio = self.value(reflectances);
        ratio.is_finite() && ratio < self.threshold
    }
}

/// Independent brightness and whiteness configuration for land and water
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightWhiteParams {
    pub land_brightness: BrightnessTest,
    pub water_brightness: BrightnessTest,
    pub land_whiteness: WhitenessTest,
    pub water_whiteness: WhitenessTest,
}

impl BrightWhiteParams {
    pub fn is_bright(&self, reflectances: &[f64], land: bool) -> bool {
        if land {
            self.land_brightness.is_bright(reflectances)
        } else {
            self.water_brightness.is_bright(reflectances)
        }
    }

    pub fn is_white(&self, reflectances: &[f64], land: bool) -> bool {
        if land {
            self.land_whiteness.is_white(reflectances)
        } else {
            self.water_whiteness.is_white(reflectances)
        }
    }

    /// Check weights and that every referenced band exists
    pub fn validate(&self, band_count: usize) -> IdepixResult<()> {
        self.land_brightness.validate("land brightness")?;
        self.water_brightness.validate("water brightness")?;
        let max_band = [
            self.land_brightness.max_band(),
            self.water_brightness.max_band(),
            self.land_whiteness.numerator_band,
            self.land_whiteness.denominator_band,
            self.water_whiteness.numerator_band,
            self.water_whiteness.denominator_band,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        if max_band >= band_count {
            return Err(IdepixError::Config(format!(
                "brightness/whiteness test uses band {} but only {} bands are available",
                max_band, band_count
            )));
        }
        Ok(())
    }
}

/// Ordered NN output boundaries:
/// `ambiguous_lower_boundary < ambiguous_sure_separation < sure_snow_separation`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NnBoundaries {
    pub ambiguous_lower_boundary: f64,
    pub ambiguous_sure_separation: f64,
    pub sure_snow_separation: f64,
}

/// Pixel category selected by the NN output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NnCategory {
    Clear,
    Ambiguous,
    CloudSure,
    SnowIce,
}

impl NnBoundaries {
    pub fn new(ambiguous_lower_boundary: f64, ambiguous_sure_separation: f64, sure_snow_separation: f64) -> Self {
        Self { ambiguous_lower_boundary, ambiguous_sure_separation, sure_snow_separation }
    }

    pub fn validate(&self) -> IdepixResult<()> {
        let ordered = self.ambiguous_lower_boundary < self.ambiguous_sure_separation
            && self.ambiguous_sure_separation < self.sure_snow_separation;
        if !ordered || !self.sure_snow_separation.is_finite() || !self.ambiguous_lower_boundary.is_finite() {
            return Err(IdepixError::Config(format!(
                "NN boundaries must be finite and strictly increasing, got {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Intervals are open below and closed above; NaN counts as clear
    pub fn category(&self, nn_output: f64) -> NnCategory {
        if nn_output.is_nan() || nn_output <= self.ambiguous_lower_boundary {
            NnCategory::Clear
        } else if nn_output <= self.ambiguous_sure_separation {
            NnCategory::Ambiguous
        } else if nn_output <= self.sure_snow_separation {
            NnCategory::CloudSure
        } else {
            NnCategory::SnowIce
        }
    }
}

/// Surface type from a 0..100 water fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Land,
    Water,
    Coastline,
    Unknown,
}

impl Surface {
    /// 0 is land, 100 is water, anything strictly between is coastline.
    /// Missing, NaN or out-of-range fractions (no data) are unknown.
    pub fn from_water_fraction(water_fraction: Option<f32>) -> Self {
        match water_fraction {
            Some(wf) if wf == 0.0 => Surface::Land,
            Some(wf) if wf == 100.0 => Surface::Water,
            Some(wf) if wf > 0.0 && wf < 100.0 => Surface::Coastline,
            _ => Surface::Unknown,
        }
    }

    pub fn is_land(&self) -> bool {
        *self == Surface::Land
    }
}

/// True when fewer than `expected` samples are present or any is NaN, infinite or negative
pub fn has_invalid_sample(values: &[f64], expected: usize) -> bool {
    values.len() < expected || values[..expected].iter().any(|v| !v.is_finite() || *v < 0.0)
}

/// Write `sqrt(reflectance)` of the selected bands into `input`
pub fn fill_sqrt_input(reflectances: &[f64], bands: &[usize], input: &mut [f64]) {
    for (slot, &band) in input.iter_mut().zip(bands) {
        *slot = reflectances.get(band).map_or(f64::NAN, |r| r.sqrt());
    }
}

/// Normalised difference of two reflectances
pub fn normalized_difference(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum.abs() < f64::EPSILON {
        0.0
    } else {
        (a - b) / sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nn_bucket_boundaries() {
        let boundaries = NnBoundaries::new(1.035, 3.35, 4.2);
        assert_eq!(boundaries.category(1.0), NnCategory::Clear);
        assert_eq!(boundaries.category(1.035), NnCategory::Clear);
        assert_eq!(boundaries.category(2.0), NnCategory::Ambiguous);
        assert_eq!(boundaries.category(3.35), NnCategory::Ambiguous);
        assert_eq!(boundaries.category(3.5), NnCategory::CloudSure);
        assert_eq!(boundaries.category(4.2), NnCategory::CloudSure);
        assert_eq!(boundaries.category(4.5), NnCategory::SnowIce);
        assert_eq!(boundaries.category(f64::NAN), NnCategory::Clear);
    }

    #[test]
    fn test_boundaries_must_be_ordered() {
        assert!(NnBoundaries::new(1.0, 3.0, 4.0).validate().is_ok());
        assert!(NnBoundaries::new(3.0, 3.0, 4.0).validate().is_err());
        assert!(NnBoundaries::new(1.0, 5.0, 4.0).validate().is_err());
    }

    #[test]
    fn test_brightness_weighted_sum() {
        let refl = [0.1, 0.4, 0.2];
        let test = BrightnessTest::weighted(1, 0.5, 2, 1.5, 0.45);
        assert!((test.value(&refl) - 0.5).abs() < 1e-12);
        assert!(test.is_bright(&refl));
        assert!(!BrightnessTest::single(0, 0.3).is_bright(&refl));
    }

    #[test]
    fn test_whiteness_ratio_below_threshold() {
        let test = WhitenessTest::new(0, 1, 1.2);
        assert!(test.is_white(&[0.5, 0.5]));
        assert!(!test.is_white(&[0.9, 0.3]));
        assert!(!test.is_white(&[0.5, 0.0]));
    }

    #[test]
    fn test_surface_from_water_fraction() {
        assert_eq!(Surface::from_water_fraction(Some(0.0)), Surface::Land);
        assert_eq!(Surface::from_water_fraction(Some(100.0)), Surface::Water);
        assert_eq!(Surface::from_water_fraction(Some(37.0)), Surface::Coastline);
        assert_eq!(Surface::from_water_fraction(Some(255.0)), Surface::Unknown);
        assert_eq!(Surface::from_water_fraction(None), Surface::Unknown);
    }

    #[test]
    fn test_invalid_samples() {
        assert!(!has_invalid_sample(&[0.1, 0.2], 2));
        assert!(has_invalid_sample(&[0.1, f64::NAN], 2));
        assert!(has_invalid_sample(&[0.1, -0.01], 2));
        assert!(has_invalid_sample(&[0.1], 2));
    }

    #[test]
    fn test_bright_white_band_validation() {
        let params = BrightWhiteParams {
            land_brightness: BrightnessTest::single(3, 0.3),
            water_brightness: BrightnessTest::weighted(0, 1.0, 1, 1.0, 0.2),
            land_whiteness: WhitenessTest::new(1, 0, 1.5),
            water_whiteness: WhitenessTest::new(0, 1, 2.0),
        };
        assert!(params.validate(4).is_ok());
        assert!(params.validate(3).is_err());
    }
}
