//! Per-pixel cloud, snow and surface classification
//!
//! Each sensor implements [`PixelClassifier`]. A classifier turns one
//! [`PixelSample`] into a [`PixelClass`], which owns the consistency rules
//! between the flags (invalid pixels carry no other flag, CLOUD_SURE wins
//! over CLOUD_AMBIGUOUS and SNOW_ICE).

pub mod avhrr;
pub mod generic;
pub mod landsat8;
pub mod modis;
pub mod sentinel2;
pub mod spectral;

pub use avhrr::{AvhrrClassifier, AvhrrParams};
pub use generic::{NnClassifier, NnClassifierParams};
pub use landsat8::{otsu_threshold, Landsat8Classifier, Landsat8Params};
pub use modis::{ModisClassifier, ModisParams};
pub use sentinel2::{Sentinel2Classifier, Sentinel2Params};
pub use spectral::{
    BrightWhiteParams, BrightnessTest, NnBoundaries, NnCategory, Surface, WhitenessTest,
};

use crate::core::neural_net::FeedForwardNet;
use crate::flags::{Flag, NUM_DEFAULT_FLAGS};
use crate::types::{IdepixError, IdepixResult, Sensor, SunViewGeometry};
use serde::{Deserialize, Serialize};

/// Inputs of one pixel
#[derive(Debug, Clone, Copy)]
pub struct PixelSample<'a> {
    pub x: i32,
    pub y: i32,
    /// TOA reflectances in sensor band order
    pub reflectances: &'a [f64],
    /// Brightness temperatures (K) of the thermal bands, empty for solar-only sensors
    pub brightness_temperatures: &'a [f64],
    /// Water fraction 0..100 from the land/water mask
    pub water_fraction: Option<f32>,
    pub geometry: Option<SunViewGeometry>,
}

impl<'a> PixelSample<'a> {
    pub fn new(x: i32, y: i32, reflectances: &'a [f64]) -> Self {
        Self {
            x,
            y,
            reflectances,
            brightness_temperatures: &[],
            water_fraction: None,
            geometry: None,
        }
    }

    pub fn with_water_fraction(mut self, water_fraction: f32) -> Self {
        self.water_fraction = Some(water_fraction);
        self
    }

    pub fn with_geometry(mut self, geometry: SunViewGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_brightness_temperatures(mut self, bts: &'a [f64]) -> Self {
        self.brightness_temperatures = bts;
        self
    }

    pub fn surface(&self) -> Surface {
        Surface::from_water_fraction(self.water_fraction)
    }
}

/// Raw outcome of the individual tests of a classifier, before consistency rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelTests {
    pub invalid: bool,
    pub cloud_sure: bool,
    pub cloud_ambiguous: bool,
    pub snow_ice: bool,
    pub bright: bool,
    pub white: bool,
    pub land: bool,
    pub coastline: bool,
    /// Sensor extension bits (bit index >= NUM_DEFAULT_FLAGS)
    pub extension: u32,
}

impl PixelTests {
    /// Land and coastline from the water fraction, validity from the sample vectors
    pub fn from_sample(sample: &PixelSample<'_>, reflectance_bands: usize, thermal_bands: usize) -> Self {
        let invalid = spectral::has_invalid_sample(sample.reflectances, reflectance_bands)
            || (thermal_bands > 0
                && (sample.brightness_temperatures.len() < thermal_bands
                    || sample.brightness_temperatures[..thermal_bands].iter().any(|t| !t.is_finite())));
        let surface = sample.surface();
        Self {
            invalid,
            land: surface == Surface::Land,
            coastline: surface == Surface::Coastline,
            ..Default::default()
        }
    }

    /// Cloud and snow tests from the NN category
    pub fn apply_nn_category(&mut self, category: NnCategory) {
        self.cloud_ambiguous |= category == NnCategory::Ambiguous;
        self.cloud_sure |= category == NnCategory::CloudSure;
        self.snow_ice |= category == NnCategory::SnowIce;
    }
}

/// Final classification of one pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelClass {
    invalid: bool,
    cloud_ambiguous: bool,
    cloud_sure: bool,
    snow_ice: bool,
    bright: bool,
    white: bool,
    coastline: bool,
    land: bool,
    extension: u32,
}

impl PixelClass {
    pub fn invalid() -> Self {
        Self { invalid: true, ..Default::default() }
    }

    /// Apply the consistency rules to the raw test results
    pub fn resolve(tests: PixelTests) -> Self {
        if tests.invalid {
            return Self::invalid();
        }
        let cloud_sure = tests.cloud_sure;
        Self {
            invalid: false,
            cloud_sure,
            cloud_ambiguous: tests.cloud_ambiguous && !cloud_sure,
            snow_ice: tests.snow_ice && !cloud_sure,
            bright: tests.bright,
            white: tests.white,
            coastline: tests.coastline,
            land: tests.land,
            extension: tests.extension & !((1 << NUM_DEFAULT_FLAGS) - 1),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn is_cloud(&self) -> bool {
        self.cloud_ambiguous || self.cloud_sure
    }

    pub fn is_cloud_ambiguous(&self) -> bool {
        self.cloud_ambiguous
    }

    pub fn is_cloud_sure(&self) -> bool {
        self.cloud_sure
    }

    /// Buffers are painted by post-processing, never by the per-pixel pass
    pub fn is_cloud_buffer(&self) -> bool {
        false
    }

    /// Shadows are detected by post-processing, never by the per-pixel pass
    pub fn is_cloud_shadow(&self) -> bool {
        false
    }

    pub fn is_snow_ice(&self) -> bool {
        self.snow_ice
    }

    pub fn is_bright(&self) -> bool {
        self.bright
    }

    pub fn is_white(&self) -> bool {
        self.white
    }

    pub fn is_coastline(&self) -> bool {
        self.coastline
    }

    pub fn is_land(&self) -> bool {
        self.land
    }

    pub fn extension_bits(&self) -> u32 {
        self.extension
    }

    pub fn has_extension(&self, bit: u32) -> bool {
        self.extension & (1 << bit) != 0
    }

    /// Encode as a classification flag word
    pub fn to_flags(&self) -> u32 {
        let mut word = self.extension;
        let mut set = |flag: Flag, on: bool| {
            if on {
                word |= flag.mask();
            }
        };
        set(Flag::Invalid, self.invalid);
        set(Flag::Cloud, self.is_cloud());
        set(Flag::CloudAmbiguous, self.cloud_ambiguous);
        set(Flag::CloudSure, self.cloud_sure);
        set(Flag::SnowIce, self.snow_ice);
        set(Flag::Bright, self.bright);
        set(Flag::White, self.white);
        set(Flag::Coastline, self.coastline);
        set(Flag::Land, self.land);
        word
    }
}

/// Sensor-specific per-pixel classification.
///
/// Implementations may keep scratch state (the NN input vector), so a
/// classifier is owned by one worker at a time; use
/// [`boxed_clone`](PixelClassifier::boxed_clone) to hand each worker its own.
pub trait PixelClassifier: Send + Sync {
    fn sensor(&self) -> Sensor;

    fn reflectance_band_count(&self) -> usize {
        self.sensor().reflectance_band_count()
    }

    fn thermal_band_count(&self) -> usize {
        self.sensor().thermal_band_count()
    }

    /// Whether sun/view geometry must be supplied for every pixel
    fn requires_geometry(&self) -> bool {
        false
    }

    fn classify(&mut self, sample: &PixelSample<'_>) -> PixelClass;

    /// NN output of the most recent [`classify`](PixelClassifier::classify) call
    fn nn_output(&self) -> Option<f64> {
        None
    }

    fn boxed_clone(&self) -> Box<dyn PixelClassifier>;
}

/// Classifier parameters, tagged by sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sensor")]
pub enum ClassifierConfig {
    Meris(NnClassifierParams),
    Olci(NnClassifierParams),
    Slstr(NnClassifierParams),
    SeaWifs(NnClassifierParams),
    Viirs(NnClassifierParams),
    ProbaV(NnClassifierParams),
    Modis(ModisParams),
    Avhrr(AvhrrParams),
    Landsat8(Landsat8Params),
    Sentinel2(Sentinel2Params),
}

impl ClassifierConfig {
    pub fn default_for(sensor: Sensor) -> Self {
        match sensor {
            Sensor::Meris => ClassifierConfig::Meris(NnClassifierParams::for_sensor(sensor)),
            Sensor::Olci => ClassifierConfig::Olci(NnClassifierParams::for_sensor(sensor)),
            Sensor::Slstr => ClassifierConfig::Slstr(NnClassifierParams::for_sensor(sensor)),
            Sensor::SeaWifs => ClassifierConfig::SeaWifs(NnClassifierParams::for_sensor(sensor)),
            Sensor::Viirs => ClassifierConfig::Viirs(NnClassifierParams::for_sensor(sensor)),
            Sensor::ProbaV => ClassifierConfig::ProbaV(NnClassifierParams::for_sensor(sensor)),
            Sensor::Modis => ClassifierConfig::Modis(ModisParams::default()),
            Sensor::Avhrr => ClassifierConfig::Avhrr(AvhrrParams::default()),
            Sensor::Landsat8 => ClassifierConfig::Landsat8(Landsat8Params::default()),
            Sensor::Sentinel2 => ClassifierConfig::Sentinel2(Sentinel2Params::default()),
        }
    }

    pub fn sensor(&self) -> Sensor {
        match self {
            ClassifierConfig::Meris(_) => Sensor::Meris,
            ClassifierConfig::Olci(_) => Sensor::Olci,
            ClassifierConfig::Slstr(_) => Sensor::Slstr,
            ClassifierConfig::SeaWifs(_) => Sensor::SeaWifs,
            ClassifierConfig::Viirs(_) => Sensor::Viirs,
            ClassifierConfig::ProbaV(_) => Sensor::ProbaV,
            ClassifierConfig::Modis(_) => Sensor::Modis,
            ClassifierConfig::Avhrr(_) => Sensor::Avhrr,
            ClassifierConfig::Landsat8(_) => Sensor::Landsat8,
            ClassifierConfig::Sentinel2(_) => Sensor::Sentinel2,
        }
    }

    pub fn uses_neural_net(&self) -> bool {
        !matches!(self, ClassifierConfig::Sentinel2(_))
    }

    pub fn validate(&self) -> IdepixResult<()> {
        let sensor = self.sensor();
        match self {
            ClassifierConfig::Meris(p)
            | ClassifierConfig::Olci(p)
            | ClassifierConfig::Slstr(p)
            | ClassifierConfig::SeaWifs(p)
            | ClassifierConfig::Viirs(p)
            | ClassifierConfig::ProbaV(p) => p.validate(sensor),
            ClassifierConfig::Modis(p) => p.validate(),
            ClassifierConfig::Avhrr(p) => p.validate(),
            ClassifierConfig::Landsat8(p) => p.validate(),
            ClassifierConfig::Sentinel2(p) => p.validate(),
        }
    }

    /// Build the classifier; NN-driven sensors fail without a network
    pub fn build(&self, net: Option<FeedForwardNet>) -> IdepixResult<Box<dyn PixelClassifier>> {
        self.validate()?;
        let sensor = self.sensor();
        let require_net = |net: Option<FeedForwardNet>| {
            net.ok_or_else(|| {
                IdepixError::Config(format!("{} classification requires a neural net", sensor))
            })
        };

        let classifier: Box<dyn PixelClassifier> = match self {
            ClassifierConfig::Meris(p)
            | ClassifierConfig::Olci(p)
            | ClassifierConfig::Slstr(p)
            | ClassifierConfig::SeaWifs(p)
            | ClassifierConfig::Viirs(p)
            | ClassifierConfig::ProbaV(p) => {
                Box::new(NnClassifier::new(sensor, p.clone(), require_net(net)?)?)
            }
            ClassifierConfig::Modis(p) => Box::new(ModisClassifier::new(p.clone(), require_net(net)?)?),
            ClassifierConfig::Avhrr(p) => Box::new(AvhrrClassifier::new(p.clone(), require_net(net)?)?),
            ClassifierConfig::Landsat8(p) => {
                Box::new(Landsat8Classifier::new(p.clone(), require_net(net)?)?)
            }
            ClassifierConfig::Sentinel2(p) => {
                if net.is_some() {
                    log::warn!("Sentinel-2 classification is threshold based, ignoring neural net");
                }
                Box::new(Sentinel2Classifier::new(p.clone())?)
            }
        };
        log::debug!("Built {} classifier", sensor);
        Ok(classifier)
    }
}
