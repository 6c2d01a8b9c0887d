//! AVHRR classification: NN rules combined with thermal tests
//!
//! Channels: reflectances of channel 1 (630 nm) and 2 (860 nm), brightness
//! temperatures of channel 4 (11 um) and 5 (12 um). The net receives the
//! square-rooted reflectances followed by both brightness temperatures.

use super::generic::{NnClassifierParams, NnCore};
use super::{PixelClass, PixelClassifier, PixelSample, PixelTests};
use crate::core::neural_net::FeedForwardNet;
use crate::types::{IdepixError, IdepixResult, Sensor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvhrrParams {
    pub nn: NnClassifierParams,
    /// Gross cloud test: BT11 below this (K) is sure cloud
    pub tgct_threshold: f64,
    /// Reflectance ratio test over water: ch2/ch1 inside (min, max) is ambiguous cloud
    pub rrct_min: f64,
    pub rrct_max: f64,
    /// Split window test: BT11 - BT12 above this (K) is ambiguous cloud
    pub fmft_threshold: f64,
}

impl Default for AvhrrParams {
    fn default() -> Self {
        Self {
            nn: NnClassifierParams::for_sensor(Sensor::Avhrr),
            tgct_threshold: 244.0,
            rrct_min: 0.9,
            rrct_max: 1.1,
            fmft_threshold: 2.5,
        }
    }
}

impl AvhrrParams {
    pub fn validate(&self) -> IdepixResult<()> {
        self.nn.validate(Sensor::Avhrr)?;
        if !(self.rrct_min < self.rrct_max) {
            return Err(IdepixError::Config(format!(
                "reflectance ratio range ({}, {}) is empty",
                self.rrct_min, self.rrct_max
            )));
        }
        if self.tgct_threshold <= 0.0 || !self.fmft_threshold.is_finite() {
            return Err(IdepixError::Config("thermal test thresholds must be finite and positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AvhrrClassifier {
    params: AvhrrParams,
    core: NnCore,
}

impl AvhrrClassifier {
    pub fn new(params: AvhrrParams, net: FeedForwardNet) -> IdepixResult<Self> {
        params.validate()?;
        let core = NnCore::new(Sensor::Avhrr, params.nn.clone(), net, 2)?;
        Ok(Self { params, core })
    }

    fn is_tgct(&self, bt11: f64) -> bool {
        bt11 < self.params.tgct_threshold
    }

    fn is_rrct(&self, r1: f64, r2: f64, land: bool) -> bool {
        if land || r1 <= 0.0 {
            return false;
        }
        let ratio = r2 / r1;
        ratio > self.params.rrct_min && ratio < self.params.rrct_max
    }

    fn is_fmft(&self, bt11: f64, bt12: f64) -> bool {
        bt11 - bt12 > self.params.fmft_threshold
    }
}

impl PixelClassifier for AvhrrClassifier {
    fn sensor(&self) -> Sensor {
        Sensor::Avhrr
    }

    fn requires_geometry(&self) -> bool {
        self.params.nn.glint_angle_max.is_some()
    }

    fn classify(&mut self, sample: &PixelSample<'_>) -> PixelClass {
        let mut tests =
            PixelTests::from_sample(sample, self.reflectance_band_count(), self.thermal_band_count());
        if tests.invalid {
            self.core.apply(sample, &[], &mut tests);
            return PixelClass::resolve(tests);
        }

        let (bt11, bt12) = (sample.brightness_temperatures[0], sample.brightness_temperatures[1]);
        self.core.apply(sample, &[bt11, bt12], &mut tests);

        let (r1, r2) = (sample.reflectances[0], sample.reflectances[1]);
        tests.cloud_sure |= self.is_tgct(bt11);
        tests.cloud_ambiguous |= self.is_rrct(r1, r2, tests.land) || self.is_fmft(bt11, bt12);
        PixelClass::resolve(tests)
    }

    fn nn_output(&self) -> Option<f64> {
        self.core.last_output()
    }

    fn boxed_clone(&self) -> Box<dyn PixelClassifier> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::constant_net;
    use super::*;

    fn classifier() -> AvhrrClassifier {
        AvhrrClassifier::new(AvhrrParams::default(), constant_net(4, 0.5)).unwrap()
    }

    #[test]
    fn test_gross_cloud_test() {
        let mut c = classifier();
        let refl = [0.1, 0.05];
        let cold = c.classify(&PixelSample::new(0, 0, &refl).with_brightness_temperatures(&[230.0, 229.0]));
        assert!(cold.is_cloud_sure());

        let warm = c.classify(&PixelSample::new(0, 0, &refl).with_brightness_temperatures(&[290.0, 289.5]));
        assert!(!warm.is_cloud());
    }

    #[test]
    fn test_ratio_and_split_window_tests() {
        let mut c = classifier();
        let bts = [285.0, 284.0];

        let flat = [0.3, 0.31];
        let water = c.classify(&PixelSample::new(0, 0, &flat).with_water_fraction(100.0).with_brightness_temperatures(&bts));
        assert!(water.is_cloud_ambiguous());
        let land = c.classify(&PixelSample::new(0, 0, &flat).with_water_fraction(0.0).with_brightness_temperatures(&bts));
        assert!(!land.is_cloud());

        let dark = [0.05, 0.02];
        let split = c.classify(&PixelSample::new(0, 0, &dark).with_brightness_temperatures(&[280.0, 276.0]));
        assert!(split.is_cloud_ambiguous() && !split.is_cloud_sure());
    }

    #[test]
    fn test_missing_brightness_temperature_is_invalid() {
        let mut c = classifier();
        let refl = [0.1, 0.05];
        let class = c.classify(&PixelSample::new(0, 0, &refl).with_brightness_temperatures(&[f64::NAN, 280.0]));
        assert!(class.is_invalid());
        let class = c.classify(&PixelSample::new(0, 0, &refl));
        assert!(class.is_invalid());
    }
}
