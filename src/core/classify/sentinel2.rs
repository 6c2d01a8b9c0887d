//! Sentinel-2 MSI classification from spectral thresholds alone
//!
//! Band order: B1, B2, B3, B4, B5, B6, B7, B8, B8A, B9, B10, B11, B12.

use super::spectral::{self, BrightWhiteParams};
use super::{PixelClass, PixelClassifier, PixelSample, PixelTests};
use crate::flags::{FlagBit, S2Flag};
use crate::types::{IdepixError, IdepixResult, Sensor};
use serde::{Deserialize, Serialize};

const B2: usize = 1;
const B3: usize = 2;
const B4: usize = 3;
const B8: usize = 7;
const B8A: usize = 8;
const B10: usize = 10;
const B11: usize = 11;
const B12: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentinel2Params {
    pub bright_white: BrightWhiteParams,
    /// Tasselled-cap brightness above which bright and white pixels are sure clouds
    pub tc1_sure_threshold: f64,
    /// Tasselled-cap brightness above which bright pixels are ambiguous clouds
    pub tc1_ambiguous_threshold: f64,
    /// NDSI (B3, B11) above which bright pixels are snow
    pub ndsi_threshold: f64,
    pub snow_b8_min: f64,
    pub snow_b3_min: f64,
    pub apply_cirrus: bool,
    pub cirrus_sure_threshold: f64,
    pub cirrus_ambiguous_threshold: f64,
}

impl Default for Sentinel2Params {
    fn default() -> Self {
        Self {
            bright_white: BrightWhiteParams::for_sensor(Sensor::Sentinel2),
            tc1_sure_threshold: 0.36,
            tc1_ambiguous_threshold: 0.25,
            ndsi_threshold: 0.4,
            snow_b8_min: 0.11,
            snow_b3_min: 0.1,
            apply_cirrus: true,
            cirrus_sure_threshold: 0.012,
            cirrus_ambiguous_threshold: 0.008,
        }
    }
}

impl Sentinel2Params {
    pub fn validate(&self) -> IdepixResult<()> {
        self.bright_white.validate(Sensor::Sentinel2.reflectance_band_count())?;
        if !(self.tc1_ambiguous_threshold < self.tc1_sure_threshold) {
            return Err(IdepixError::Config(format!(
                "TC1 ambiguous threshold {} must be below the sure threshold {}",
                self.tc1_ambiguous_threshold, self.tc1_sure_threshold
            )));
        }
        if !(self.cirrus_ambiguous_threshold < self.cirrus_sure_threshold) {
            return Err(IdepixError::Config(format!(
                "cirrus ambiguous threshold {} must be below the sure threshold {}",
                self.cirrus_ambiguous_threshold, self.cirrus_sure_threshold
            )));
        }
        Ok(())
    }
}

/// First tasselled-cap component (brightness)
pub fn tc1(r: &[f64]) -> f64 {
    0.3029 * r[B2] + 0.2786 * r[B3] + 0.4733 * r[B4] + 0.5599 * r[B8A] + 0.508 * r[B11] + 0.1872 * r[B12]
}

#[derive(Debug, Clone)]
pub struct Sentinel2Classifier {
    params: Sentinel2Params,
}

impl Sentinel2Classifier {
    pub fn new(params: Sentinel2Params) -> IdepixResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    fn is_snow(&self, r: &[f64]) -> bool {
        spectral::normalized_difference(r[B3], r[B11]) > self.params.ndsi_threshold
            && r[B8] > self.params.snow_b8_min
            && r[B3] > self.params.snow_b3_min
    }
}

impl PixelClassifier for Sentinel2Classifier {
    fn sensor(&self) -> Sensor {
        Sensor::Sentinel2
    }

    fn classify(&mut self, sample: &PixelSample<'_>) -> PixelClass {
        let mut tests = PixelTests::from_sample(sample, self.reflectance_band_count(), 0);
        if tests.invalid {
            return PixelClass::resolve(tests);
        }

        let r = sample.reflectances;
        let p = &self.params;
        tests.bright = p.bright_white.is_bright(r, tests.land);
        tests.white = p.bright_white.is_white(r, tests.land);
        tests.snow_ice = tests.bright && self.is_snow(r);

        let brightness = tc1(r);
        if !tests.snow_ice {
            tests.cloud_sure = tests.bright && tests.white && brightness > p.tc1_sure_threshold;
            tests.cloud_ambiguous = tests.bright && brightness > p.tc1_ambiguous_threshold;
        }

        if p.apply_cirrus {
            if r[B10] > p.cirrus_sure_threshold {
                tests.extension |= S2Flag::CirrusSure.mask();
                tests.cloud_sure = true;
            } else if r[B10] > p.cirrus_ambiguous_threshold {
                tests.extension |= S2Flag::CirrusAmbiguous.mask();
                tests.cloud_ambiguous = true;
            }
        }
        PixelClass::resolve(tests)
    }

    fn boxed_clone(&self) -> Box<dyn PixelClassifier> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(level: f64, b3: f64, b8: f64, b10: f64, b11: f64) -> Vec<f64> {
        let mut r = vec![level; 13];
        r[B3] = b3;
        r[B8] = b8;
        r[B10] = b10;
        r[B11] = b11;
        r
    }

    fn classify(r: &[f64]) -> PixelClass {
        let mut c = Sentinel2Classifier::new(Sentinel2Params::default()).unwrap();
        c.classify(&PixelSample::new(0, 0, r).with_water_fraction(0.0))
    }

    #[test]
    fn test_bright_white_cloud_is_sure() {
        let class = classify(&spectrum(0.6, 0.6, 0.6, 0.001, 0.5));
        assert!(class.is_cloud_sure() && !class.is_snow_ice());
        assert!(class.is_bright() && class.is_white());
    }

    #[test]
    fn test_snow_not_cloud() {
        // high NDSI: bright in green, dark in SWIR
        let class = classify(&spectrum(0.6, 0.8, 0.7, 0.001, 0.1));
        assert!(class.is_snow_ice());
        assert!(!class.is_cloud());
    }

    #[test]
    fn test_cirrus_levels() {
        let dark = spectrum(0.05, 0.05, 0.2, 0.015, 0.1);
        let class = classify(&dark);
        assert!(class.is_cloud_sure() && class.has_extension(S2Flag::CirrusSure.bit()));

        let thin = spectrum(0.05, 0.05, 0.2, 0.009, 0.1);
        let class = classify(&thin);
        assert!(class.is_cloud_ambiguous() && class.has_extension(S2Flag::CirrusAmbiguous.bit()));

        let clear = spectrum(0.05, 0.05, 0.2, 0.002, 0.1);
        assert!(!classify(&clear).is_cloud());
    }

    #[test]
    fn test_tc1_weights() {
        let r = vec![1.0; 13];
        assert!((tc1(&r) - 2.3099).abs() < 1e-9);
    }
}
