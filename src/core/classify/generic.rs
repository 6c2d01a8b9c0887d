//! Neural-net driven classification shared by the ocean colour and
//! land sensors (MERIS, OLCI, SLSTR, SeaWiFS, VIIRS, PROBA-V).
//!
//! MODIS, AVHRR and Landsat-8 run the same NN rules through [`NnCore`]
//! and add their own tests on top.

use super::spectral::{self, BrightWhiteParams, BrightnessTest, NnBoundaries, WhitenessTest};
use super::{PixelClass, PixelClassifier, PixelSample, PixelTests};
use crate::core::neural_net::FeedForwardNet;
use crate::flags::{FlagBit, OcFlag};
use crate::types::{IdepixError, IdepixResult, Sensor};
use serde::{Deserialize, Serialize};

/// Parameters of the NN classification rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NnClassifierParams {
    pub boundaries: NnBoundaries,
    /// Reflectance bands fed to the net as `sqrt(reflectance)`, in net input order
    pub nn_input_bands: Vec<usize>,
    pub bright_white: BrightWhiteParams,
    /// Flag GLINT_RISK on water when the glint angle is below this value (degrees)
    #[serde(default)]
    pub glint_angle_max: Option<f64>,
}

/// Visible and NIR band used by the default brightness/whiteness tests
fn band_layout(sensor: Sensor) -> (usize, usize) {
    match sensor {
        Sensor::Meris => (1, 12),
        Sensor::Olci => (2, 16),
        Sensor::Slstr => (0, 2),
        Sensor::Modis => (2, 1),
        Sensor::Avhrr => (0, 1),
        Sensor::Viirs => (1, 6),
        Sensor::SeaWifs => (1, 7),
        Sensor::Landsat8 => (1, 4),
        Sensor::Sentinel2 => (1, 8),
        Sensor::ProbaV => (0, 2),
    }
}

/// NN boundaries and input bands. Sentinel-2 classifies without a net.
fn nn_profile(sensor: Sensor) -> Option<(NnBoundaries, Vec<usize>)> {
    let profile = match sensor {
        Sensor::Meris => (NnBoundaries::new(1.1, 2.7, 4.6), vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 11, 12, 13]),
        Sensor::Olci => (
            NnBoundaries::new(1.1, 2.75, 3.5),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 15, 16, 17, 18, 20],
        ),
        Sensor::Slstr => (NnBoundaries::new(1.1, 2.7, 3.6), (0..6).collect()),
        Sensor::Modis => (NnBoundaries::new(1.035, 3.35, 4.2), (0..17).collect()),
        Sensor::Avhrr => (NnBoundaries::new(1.1, 2.8, 4.2), vec![0, 1]),
        Sensor::Viirs => (NnBoundaries::new(1.1, 2.45, 4.3), (0..10).collect()),
        Sensor::SeaWifs => (NnBoundaries::new(1.15, 2.6, 4.2), (0..8).collect()),
        Sensor::Landsat8 => (NnBoundaries::new(1.1, 2.8, 4.2), (0..7).collect()),
        Sensor::ProbaV => (NnBoundaries::new(1.1, 2.5, 4.0), (0..4).collect()),
        Sensor::Sentinel2 => return None,
    };
    Some(profile)
}

impl BrightWhiteParams {
    /// Default brightness/whiteness tests: visible brightness over land,
    /// NIR brightness over water, flat visible/NIR spectra are white
    pub fn for_sensor(sensor: Sensor) -> Self {
        let (visible, nir) = band_layout(sensor);
        Self {
            land_brightness: BrightnessTest::single(visible, 0.3),
            water_brightness: BrightnessTest::single(nir, 0.2),
            land_whiteness: WhitenessTest::new(nir, visible, 1.4),
            water_whiteness: WhitenessTest::new(visible, nir, 1.5),
        }
    }
}

impl NnClassifierParams {
    /// Sensors without a net get an empty input band list, which `validate` rejects
    pub fn for_sensor(sensor: Sensor) -> Self {
        let bright_white = BrightWhiteParams::for_sensor(sensor);
        match nn_profile(sensor) {
            Some((boundaries, nn_input_bands)) => {
                Self { boundaries, nn_input_bands, bright_white, glint_angle_max: None }
            }
            None => Self { nn_input_bands: Vec::new(), bright_white, ..Self::default() },
        }
    }

    pub fn validate(&self, sensor: Sensor) -> IdepixResult<()> {
        self.boundaries.validate()?;
        let band_count = sensor.reflectance_band_count();
        if self.nn_input_bands.is_empty() {
            return Err(IdepixError::Config("NN input band list is empty".to_string()));
        }
        if let Some(&band) = self.nn_input_bands.iter().find(|&&b| b >= band_count) {
            return Err(IdepixError::Config(format!(
                "NN input band {} out of range, {} has {} bands",
                band, sensor, band_count
            )));
        }
        self.bright_white.validate(band_count)?;

        if let Some(max) = self.glint_angle_max {
            if !has_glint_flag(sensor) {
                return Err(IdepixError::Config(format!("{} has no GLINT_RISK flag", sensor)));
            }
            if !(max > 0.0 && max <= 90.0) {
                return Err(IdepixError::Config(format!(
                    "glint angle maximum must lie in (0, 90], got {}",
                    max
                )));
            }
        }
        Ok(())
    }
}

impl Default for NnClassifierParams {
    fn default() -> Self {
        Self::for_sensor(Sensor::Olci)
    }
}

fn has_glint_flag(sensor: Sensor) -> bool {
    matches!(sensor, Sensor::Meris | Sensor::Modis | Sensor::SeaWifs | Sensor::Viirs)
}

/// NN evaluation plus the rules every NN sensor shares
#[derive(Debug, Clone)]
pub(crate) struct NnCore {
    params: NnClassifierParams,
    net: FeedForwardNet,
    last_output: Option<f64>,
}

impl NnCore {
    /// `extra_inputs` are appended by the caller after the reflectance inputs
    pub(crate) fn new(
        sensor: Sensor,
        params: NnClassifierParams,
        net: FeedForwardNet,
        extra_inputs: usize,
    ) -> IdepixResult<Self> {
        params.validate(sensor)?;
        let expected = params.nn_input_bands.len() + extra_inputs;
        if net.input_len() != expected {
            return Err(IdepixError::Config(format!(
                "{} neural net '{}' takes {} inputs, classification provides {}",
                sensor,
                net.definition().name,
                net.input_len(),
                expected
            )));
        }
        if net.output_len() == 0 {
            return Err(IdepixError::Config(format!("{} neural net has no output", sensor)));
        }
        Ok(Self { params, net, last_output: None })
    }

    pub(crate) fn params(&self) -> &NnClassifierParams {
        &self.params
    }

    pub(crate) fn last_output(&self) -> Option<f64> {
        self.last_output
    }

    /// Evaluate the net and apply bucketing, brightness, whiteness and glint tests
    pub(crate) fn apply(&mut self, sample: &PixelSample<'_>, extra: &[f64], tests: &mut PixelTests) {
        self.last_output = None;
        if tests.invalid {
            return;
        }

        let n_refl = self.params.nn_input_bands.len();
        let input = self.net.input_mut();
        spectral::fill_sqrt_input(sample.reflectances, &self.params.nn_input_bands, &mut input[..n_refl]);
        input[n_refl..].copy_from_slice(extra);
        let output = self.net.evaluate()[0];
        self.last_output = Some(output);

        tests.apply_nn_category(self.params.boundaries.category(output));

        let refl = sample.reflectances;
        tests.bright = self.params.bright_white.is_bright(refl, tests.land);
        tests.white = self.params.bright_white.is_white(refl, tests.land);

        if let (Some(max), Some(geometry)) = (self.params.glint_angle_max, sample.geometry) {
            if !tests.land && geometry.is_valid() && geometry.glint_angle() < max {
                tests.extension |= OcFlag::GlintRisk.mask();
            }
        }
    }
}

/// Classifier for the sensors that rely on the NN rules alone
#[derive(Debug, Clone)]
pub struct NnClassifier {
    sensor: Sensor,
    core: NnCore,
}

impl NnClassifier {
    pub fn new(sensor: Sensor, params: NnClassifierParams, net: FeedForwardNet) -> IdepixResult<Self> {
        let core = NnCore::new(sensor, params, net, 0)?;
        Ok(Self { sensor, core })
    }

    pub fn params(&self) -> &NnClassifierParams {
        self.core.params()
    }
}

impl PixelClassifier for NnClassifier {
    fn sensor(&self) -> Sensor {
        self.sensor
    }

    fn requires_geometry(&self) -> bool {
        self.core.params().glint_angle_max.is_some()
    }

    fn classify(&mut self, sample: &PixelSample<'_>) -> PixelClass {
        let mut tests = PixelTests::from_sample(sample, self.reflectance_band_count(), 0);
        self.core.apply(sample, &[], &mut tests);
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
    use crate::flags::Flag;
    use crate::types::SunViewGeometry;

    fn classifier(sensor: Sensor, nn_value: f64) -> NnClassifier {
        let params = NnClassifierParams::for_sensor(sensor);
        let net = constant_net(params.nn_input_bands.len(), nn_value);
        NnClassifier::new(sensor, params, net).unwrap()
    }

    #[test]
    fn test_default_profiles_validate() {
        for sensor in Sensor::ALL.into_iter().filter(|&s| s != Sensor::Sentinel2) {
            assert!(NnClassifierParams::for_sensor(sensor).validate(sensor).is_ok(), "{}", sensor);
        }
    }

    #[test]
    fn test_sentinel2_has_no_nn_profile() {
        assert!(nn_profile(Sensor::Sentinel2).is_none());
        let params = NnClassifierParams::for_sensor(Sensor::Sentinel2);
        assert!(params.nn_input_bands.is_empty());
        assert!(params.validate(Sensor::Sentinel2).is_err());

        let bright_white = BrightWhiteParams::for_sensor(Sensor::Sentinel2);
        assert_eq!(bright_white.land_brightness, BrightnessTest::single(1, 0.3));
        assert_eq!(bright_white.water_whiteness, WhitenessTest::new(1, 8, 1.5));
    }

    #[test]
    fn test_nn_output_selects_category() {
        let refl = vec![0.05; 21];
        let sample = PixelSample::new(0, 0, &refl).with_water_fraction(100.0);

        let class = classifier(Sensor::Olci, 2.0).classify(&sample);
        assert!(class.is_cloud_ambiguous() && !class.is_cloud_sure());

        let class = classifier(Sensor::Olci, 3.2).classify(&sample);
        assert!(class.is_cloud_sure() && class.is_cloud());

        let class = classifier(Sensor::Olci, 4.0).classify(&sample);
        assert!(class.is_snow_ice() && !class.is_cloud());

        let mut clear = classifier(Sensor::Olci, 0.5);
        let class = clear.classify(&sample);
        assert!(!class.is_cloud() && !class.is_snow_ice());
        assert!((clear.nn_output().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_land_and_coastline_from_water_fraction() {
        let refl = vec![0.05; 21];
        let mut c = classifier(Sensor::Olci, 0.5);

        let land = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(0.0));
        assert!(land.is_land() && !land.is_coastline());

        let coast = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(40.0));
        assert!(coast.is_coastline() && !coast.is_land());

        let water = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(100.0));
        assert!(!water.is_land() && !water.is_coastline() && !water.is_bright());
    }

    #[test]
    fn test_bright_white_cloud_spectrum() {
        // flat, bright spectrum over water
        let refl = vec![0.6; 21];
        let class = classifier(Sensor::Olci, 3.2).classify(&PixelSample::new(0, 0, &refl).with_water_fraction(100.0));
        assert!(class.is_bright() && class.is_white());
        let flags = class.to_flags();
        assert_eq!(flags & Flag::Bright.mask(), Flag::Bright.mask());
    }

    #[test]
    fn test_invalid_sample_has_no_nn_output() {
        let mut refl = vec![0.1; 15];
        refl[4] = -1.0;
        let mut c = classifier(Sensor::Meris, 3.0);
        assert!(c.classify(&PixelSample::new(0, 0, &refl)).is_invalid());
        assert!(c.nn_output().is_none());
    }

    #[test]
    fn test_glint_risk_over_water_only() {
        let mut params = NnClassifierParams::for_sensor(Sensor::Meris);
        params.glint_angle_max = Some(20.0);
        let net = constant_net(params.nn_input_bands.len(), 0.5);
        let mut c = NnClassifier::new(Sensor::Meris, params, net).unwrap();
        assert!(c.requires_geometry());

        let geometry = SunViewGeometry { sun_zenith: 30.0, sun_azimuth: 10.0, view_zenith: 25.0, view_azimuth: 185.0 };
        let refl = vec![0.02; 15];
        let water = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(100.0).with_geometry(geometry));
        assert!(water.has_extension(OcFlag::GlintRisk.bit()));

        let land = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(0.0).with_geometry(geometry));
        assert!(!land.has_extension(OcFlag::GlintRisk.bit()));
    }

    #[test]
    fn test_glint_rejected_without_flag() {
        let mut params = NnClassifierParams::for_sensor(Sensor::Olci);
        params.glint_angle_max = Some(20.0);
        assert!(params.validate(Sensor::Olci).is_err());
    }

    #[test]
    fn test_net_input_length_must_match() {
        let params = NnClassifierParams::for_sensor(Sensor::SeaWifs);
        let net = constant_net(3, 1.0);
        assert!(matches!(NnClassifier::new(Sensor::SeaWifs, params, net), Err(IdepixError::Config(_))));
    }
}
