//! Landsat-8 OLI classification
//!
//! Band order: coastal, blue, green, red, NIR, SWIR1, SWIR2, pan, cirrus.
//! The NN rules decide the base cloud flags; the SHIMEZ, HOT, CLOST and
//! OTSU tests set their own extension bits, which post-processing buffers
//! separately.

use super::generic::{NnClassifierParams, NnCore};
use super::{PixelClass, PixelClassifier, PixelSample, PixelTests};
use crate::core::neural_net::FeedForwardNet;
use crate::flags::{FlagBit, Landsat8Flag};
use crate::types::{IdepixError, IdepixResult, Sensor};
use serde::{Deserialize, Serialize};

const COASTAL: usize = 0;
const BLUE: usize = 1;
const GREEN: usize = 2;
const RED: usize = 3;
const PAN: usize = 7;
const CIRRUS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landsat8Params {
    pub nn: NnClassifierParams,
    pub apply_shimez: bool,
    /// Minimum mean of blue, green and red
    pub shimez_mean_threshold: f64,
    /// Maximum pairwise difference of blue, green and red
    pub shimez_diff_threshold: f64,
    pub apply_hot: bool,
    pub hot_threshold: f64,
    /// Switches the OTSU test and, with it, the CLOST test
    pub apply_otsu: bool,
    pub clost_threshold: f64,
    /// Scene-level threshold on CLOST; computed from the scene when absent
    #[serde(default)]
    pub otsu_threshold: Option<f64>,
}

impl Default for Landsat8Params {
    fn default() -> Self {
        Self {
            nn: NnClassifierParams::for_sensor(Sensor::Landsat8),
            apply_shimez: true,
            shimez_mean_threshold: 0.35,
            shimez_diff_threshold: 0.1,
            apply_hot: true,
            hot_threshold: 0.1,
            apply_otsu: false,
            clost_threshold: 1e-5,
            otsu_threshold: None,
        }
    }
}

impl Landsat8Params {
    pub fn validate(&self) -> IdepixResult<()> {
        self.nn.validate(Sensor::Landsat8)?;
        let positive = [
            ("SHIMEZ mean", self.shimez_mean_threshold),
            ("SHIMEZ difference", self.shimez_diff_threshold),
            ("CLOST", self.clost_threshold),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(IdepixError::Config(format!("{} threshold must be positive, got {}", name, value)));
        }
        if !self.hot_threshold.is_finite() {
            return Err(IdepixError::Config("HOT threshold must be finite".to_string()));
        }
        Ok(())
    }

    /// Whether a scene-level Otsu threshold has to be computed before classification
    pub fn needs_scene_otsu(&self) -> bool {
        self.apply_otsu && self.otsu_threshold.is_none()
    }
}

/// CLOST index: product of coastal, blue, pan and cirrus reflectances
pub fn clost(reflectances: &[f64]) -> f64 {
    reflectances[COASTAL] * reflectances[BLUE] * reflectances[PAN] * reflectances[CIRRUS]
}

/// Otsu threshold of a sample distribution (256-bin histogram between min and max).
///
/// Returns `None` when fewer than two distinct finite values are present.
pub fn otsu_threshold(values: &[f64]) -> Option<f64> {
    const BINS: usize = 256;

    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(max > min) {
        return None;
    }

    let width = (max - min) / BINS as f64;
    let mut histogram = [0usize; BINS];
    for v in values.iter().filter(|v| v.is_finite()) {
        let idx = (((v - min) / width) as usize).min(BINS - 1);
        histogram[idx] += 1;
    }

    let total: f64 = histogram.iter().sum::<usize>() as f64;
    let sum_all: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    let mut best_variance = -1.0;
    let mut best_bin = 0;
    for (i, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        sum_bg += i as f64 * count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best_variance {
            best_variance = between;
            best_bin = i;
        }
    }

    Some(min + (best_bin + 1) as f64 * width)
}

#[derive(Debug, Clone)]
pub struct Landsat8Classifier {
    params: Landsat8Params,
    core: NnCore,
}

impl Landsat8Classifier {
    pub fn new(params: Landsat8Params, net: FeedForwardNet) -> IdepixResult<Self> {
        params.validate()?;
        if params.needs_scene_otsu() {
            log::debug!("Landsat-8 OTSU test has no threshold yet, only CLOST will be flagged");
        }
        let core = NnCore::new(Sensor::Landsat8, params.nn.clone(), net, 0)?;
        Ok(Self { params, core })
    }

    fn is_shimez(&self, r: &[f64]) -> bool {
        let (b, g, red) = (r[BLUE], r[GREEN], r[RED]);
        let mean = (b + g + red) / 3.0;
        let diff = self.params.shimez_diff_threshold;
        mean > self.params.shimez_mean_threshold
            && (b - g).abs() < diff
            && (g - red).abs() < diff
            && (b - red).abs() < diff
    }

    fn is_hot(&self, r: &[f64]) -> bool {
        r[BLUE] - 0.5 * r[RED] - 0.08 > self.params.hot_threshold
    }

    fn extension_tests(&self, r: &[f64]) -> u32 {
        let mut bits = 0;
        if self.params.apply_shimez && self.is_shimez(r) {
            bits |= Landsat8Flag::CloudShimez.mask();
        }
        if self.params.apply_hot && self.is_hot(r) {
            bits |= Landsat8Flag::CloudHot.mask();
        }
        // CLOST shares the OTSU switch
        if self.params.apply_otsu {
            let value = clost(r);
            if value > self.params.clost_threshold {
                bits |= Landsat8Flag::CloudClost.mask();
            }
            if matches!(self.params.otsu_threshold, Some(t) if value > t) {
                bits |= Landsat8Flag::CloudOtsu.mask();
            }
        }
        bits
    }
}

impl PixelClassifier for Landsat8Classifier {
    fn sensor(&self) -> Sensor {
        Sensor::Landsat8
    }

    fn classify(&mut self, sample: &PixelSample<'_>) -> PixelClass {
        let mut tests = PixelTests::from_sample(sample, self.reflectance_band_count(), 0);
        self.core.apply(sample, &[], &mut tests);
        if !tests.invalid {
            tests.extension |= self.extension_tests(sample.reflectances);
        }
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

    fn classifier(params: Landsat8Params) -> Landsat8Classifier {
        let net = constant_net(params.nn.nn_input_bands.len(), 0.5);
        Landsat8Classifier::new(params, net).unwrap()
    }

    fn classify(c: &mut Landsat8Classifier, refl: &[f64]) -> PixelClass {
        c.classify(&PixelSample::new(0, 0, refl).with_water_fraction(0.0))
    }

    #[test]
    fn test_shimez_and_hot() {
        let mut c = classifier(Landsat8Params::default());

        let grey = [0.4, 0.42, 0.41, 0.40, 0.45, 0.3, 0.2, 0.4, 0.01];
        let class = classify(&mut c, &grey);
        assert!(class.has_extension(Landsat8Flag::CloudShimez.bit()));
        // 0.42 - 0.2 - 0.08 = 0.14
        assert!(class.has_extension(Landsat8Flag::CloudHot.bit()));

        let vegetation = [0.05, 0.04, 0.07, 0.04, 0.35, 0.2, 0.1, 0.05, 0.001];
        let class = classify(&mut c, &vegetation);
        assert_eq!(class.extension_bits(), 0);
    }

    #[test]
    fn test_clost_follows_otsu_switch() {
        let bright = [0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.05];
        let mut off = classifier(Landsat8Params { apply_shimez: false, apply_hot: false, ..Default::default() });
        assert!(!classify(&mut off, &bright).has_extension(Landsat8Flag::CloudClost.bit()));

        let params = Landsat8Params {
            apply_shimez: false,
            apply_hot: false,
            apply_otsu: true,
            otsu_threshold: Some(1e-4),
            ..Default::default()
        };
        let mut on = classifier(params);
        let class = classify(&mut on, &bright);
        assert!(class.has_extension(Landsat8Flag::CloudClost.bit()));
        assert!(class.has_extension(Landsat8Flag::CloudOtsu.bit()));
    }

    #[test]
    fn test_otsu_separates_two_modes() {
        let mut values = vec![0.1; 100];
        values.extend(vec![0.9; 100]);
        values.push(f64::NAN);
        let t = otsu_threshold(&values).unwrap();
        assert!(t > 0.1 && t < 0.9, "threshold {}", t);

        assert!(otsu_threshold(&[0.5, 0.5, 0.5]).is_none());
        assert!(otsu_threshold(&[]).is_none());
    }

    #[test]
    fn test_needs_scene_otsu() {
        let params = Landsat8Params { apply_otsu: true, ..Default::default() };
        assert!(params.needs_scene_otsu());
        assert!(!Landsat8Params::default().needs_scene_otsu());
    }
}
