use super::generic::{NnClassifierParams, NnCore};
use super::{PixelClass, PixelClassifier, PixelSample, PixelTests};
use crate::core::neural_net::FeedForwardNet;
use crate::flags::{FlagBit, OcFlag};
use crate::types::{IdepixError, IdepixResult, Sensor};
use serde::{Deserialize, Serialize};

/// MODIS classification parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModisParams {
    pub nn: NnClassifierParams,
    /// NIR band of the B-NIR cloud test (859 nm)
    pub b_nir_band: usize,
    /// Water pixels brighter than this in the NIR band are B-NIR clouds
    pub b_nir_threshold: f64,
    /// Also set CLOUD_SURE where the B-NIR test fires
    pub b_nir_as_cloud_sure: bool,
}

impl Default for ModisParams {
    fn default() -> Self {
        Self {
            nn: NnClassifierParams::for_sensor(Sensor::Modis),
            b_nir_band: 1,
            b_nir_threshold: 0.08,
            b_nir_as_cloud_sure: false,
        }
    }
}

impl ModisParams {
    pub fn validate(&self) -> IdepixResult<()> {
        self.nn.validate(Sensor::Modis)?;
        if self.b_nir_band >= Sensor::Modis.reflectance_band_count() {
            return Err(IdepixError::Config(format!("B-NIR band {} out of range", self.b_nir_band)));
        }
        if !self.b_nir_threshold.is_finite() || self.b_nir_threshold <= 0.0 {
            return Err(IdepixError::Config(format!(
                "B-NIR threshold must be positive, got {}",
                self.b_nir_threshold
            )));
        }
        Ok(())
    }
}

/// MODIS classifier: NN rules plus the B-NIR cloud test over water
#[derive(Debug, Clone)]
pub struct ModisClassifier {
    params: ModisParams,
    core: NnCore,
}

impl ModisClassifier {
    pub fn new(params: ModisParams, net: FeedForwardNet) -> IdepixResult<Self> {
        params.validate()?;
        let core = NnCore::new(Sensor::Modis, params.nn.clone(), net, 0)?;
        Ok(Self { params, core })
    }

    fn is_cloud_b_nir(&self, sample: &PixelSample<'_>, tests: &PixelTests) -> bool {
        !tests.land && sample.reflectances[self.params.b_nir_band] > self.params.b_nir_threshold
    }
}

impl PixelClassifier for ModisClassifier {
    fn sensor(&self) -> Sensor {
        Sensor::Modis
    }

    fn requires_geometry(&self) -> bool {
        self.params.nn.glint_angle_max.is_some()
    }

    fn classify(&mut self, sample: &PixelSample<'_>) -> PixelClass {
        let mut tests = PixelTests::from_sample(sample, self.reflectance_band_count(), 0);
        self.core.apply(sample, &[], &mut tests);
        if !tests.invalid && self.is_cloud_b_nir(sample, &tests) {
            tests.extension |= OcFlag::CloudBNir.mask();
            tests.cloud_sure |= self.params.b_nir_as_cloud_sure;
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

    fn classifier(params: ModisParams) -> ModisClassifier {
        let net = constant_net(params.nn.nn_input_bands.len(), 0.5);
        ModisClassifier::new(params, net).unwrap()
    }

    fn nir_spectrum(nir: f64) -> Vec<f64> {
        let mut refl = vec![0.03; 19];
        refl[1] = nir;
        refl
    }

    #[test]
    fn test_b_nir_flag_over_water() {
        let mut c = classifier(ModisParams::default());
        let refl = nir_spectrum(0.12);

        let water = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(100.0));
        assert!(water.has_extension(OcFlag::CloudBNir.bit()));
        assert!(!water.is_cloud_sure());

        let land = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(0.0));
        assert!(!land.has_extension(OcFlag::CloudBNir.bit()));

        let dark = nir_spectrum(0.02);
        let clear = c.classify(&PixelSample::new(0, 0, &dark).with_water_fraction(100.0));
        assert!(!clear.has_extension(OcFlag::CloudBNir.bit()));
    }

    #[test]
    fn test_b_nir_promoted_to_cloud_sure() {
        let params = ModisParams { b_nir_as_cloud_sure: true, ..Default::default() };
        let mut c = classifier(params);
        let refl = nir_spectrum(0.12);
        let class = c.classify(&PixelSample::new(0, 0, &refl).with_water_fraction(100.0));
        assert!(class.is_cloud_sure() && class.is_cloud());
    }

    #[test]
    fn test_invalid_band_rejected() {
        let params = ModisParams { b_nir_band: 19, ..Default::default() };
        assert!(params.validate().is_err());
    }
}
