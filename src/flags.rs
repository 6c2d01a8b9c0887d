//! Classification flag model
//!
//! Every sensor shares the same eleven base bits. Sensor families append
//! their own bits starting at [`NUM_DEFAULT_FLAGS`]. A [`FlagCoding`] maps
//! flag names to bit positions for one product and rejects collisions.

use crate::types::{IdepixError, IdepixResult, Sensor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Width of the base flag set shared by all sensors
pub const NUM_DEFAULT_FLAGS: u32 = 11;

/// Name of the classification flag band
pub const CLASSIF_BAND_NAME: &str = "pixel_classif_flags";

/// A named bit within the classification flag word
pub trait FlagBit: Copy {
    fn bit(self) -> u32;
    fn name(self) -> &'static str;
    fn description(self) -> &'static str;

    fn mask(self) -> u32 {
        1 << self.bit()
    }
}

/// Base flags shared by all sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Invalid = 0,
    Cloud = 1,
    CloudAmbiguous = 2,
    CloudSure = 3,
    CloudBuffer = 4,
    CloudShadow = 5,
    SnowIce = 6,
    Bright = 7,
    White = 8,
    Coastline = 9,
    Land = 10,
}

impl Flag {
    pub const ALL: [Flag; 11] = [
        Flag::Invalid,
        Flag::Cloud,
        Flag::CloudAmbiguous,
        Flag::CloudSure,
        Flag::CloudBuffer,
        Flag::CloudShadow,
        Flag::SnowIce,
        Flag::Bright,
        Flag::White,
        Flag::Coastline,
        Flag::Land,
    ];

    pub const fn bit(self) -> u32 {
        self as u32
    }

    pub const fn mask(self) -> u32 {
        1 << (self as u32)
    }

    /// Any of CLOUD, CLOUD_AMBIGUOUS or CLOUD_SURE
    pub const CLOUD_ANY: u32 = Flag::Cloud.mask() | Flag::CloudAmbiguous.mask() | Flag::CloudSure.mask();
}

impl FlagBit for Flag {
    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            Flag::Invalid => "IDEPIX_INVALID",
            Flag::Cloud => "IDEPIX_CLOUD",
            Flag::CloudAmbiguous => "IDEPIX_CLOUD_AMBIGUOUS",
            Flag::CloudSure => "IDEPIX_CLOUD_SURE",
            Flag::CloudBuffer => "IDEPIX_CLOUD_BUFFER",
            Flag::CloudShadow => "IDEPIX_CLOUD_SHADOW",
            Flag::SnowIce => "IDEPIX_SNOW_ICE",
            Flag::Bright => "IDEPIX_BRIGHT",
            Flag::White => "IDEPIX_WHITE",
            Flag::Coastline => "IDEPIX_COASTLINE",
            Flag::Land => "IDEPIX_LAND",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Flag::Invalid => "Invalid pixels",
            Flag::Cloud => "Pixels which are either cloud_sure or cloud_ambiguous",
            Flag::CloudAmbiguous => "Semi transparent clouds, or clouds where the detection level is uncertain",
            Flag::CloudSure => "Fully opaque clouds with full confidence of their detection",
            Flag::CloudBuffer => "A buffer of n pixels around a cloud, n being a user supplied parameter",
            Flag::CloudShadow => "Pixels affected by a cloud shadow",
            Flag::SnowIce => "Clear snow/ice pixels",
            Flag::Bright => "Bright pixels",
            Flag::White => "White pixels",
            Flag::Coastline => "Pixels at a coastline",
            Flag::Land => "Land pixels",
        }
    }
}

/// Extension bits of the ocean colour sensors (MERIS, MODIS, SeaWiFS, VIIRS)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcFlag {
    MixedPixel = 11,
    GlintRisk = 12,
    CloudBNir = 13,
}

impl FlagBit for OcFlag {
    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            OcFlag::MixedPixel => "IDEPIX_MIXED_PIXEL",
            OcFlag::GlintRisk => "IDEPIX_GLINT_RISK",
            OcFlag::CloudBNir => "IDEPIX_CLOUD_B_NIR",
        }
    }

    fn description(self) -> &'static str {
        match self {
            OcFlag::MixedPixel => "Mixed pixels near coastlines where cloud flags were removed",
            OcFlag::GlintRisk => "Water pixels at risk of sun glint contamination",
            OcFlag::CloudBNir => "Clouds detected from NIR brightness over water",
        }
    }
}

/// Extension bits of OLCI and SLSTR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OlciFlag {
    MountainShadow = 11,
}

impl FlagBit for OlciFlag {
    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        "IDEPIX_MOUNTAIN_SHADOW"
    }

    fn description(self) -> &'static str {
        "Pixels in the shadow of surrounding terrain"
    }
}

/// Extension bits of Landsat-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landsat8Flag {
    CloudShimez = 11,
    CloudShimezBuffer = 12,
    CloudHot = 13,
    CloudHotBuffer = 14,
    CloudOtsu = 15,
    CloudOtsuBuffer = 16,
    CloudClost = 17,
    CloudClostBuffer = 18,
}

impl Landsat8Flag {
    pub const ALL: [Landsat8Flag; 8] = [
        Landsat8Flag::CloudShimez,
        Landsat8Flag::CloudShimezBuffer,
        Landsat8Flag::CloudHot,
        Landsat8Flag::CloudHotBuffer,
        Landsat8Flag::CloudOtsu,
        Landsat8Flag::CloudOtsuBuffer,
        Landsat8Flag::CloudClost,
        Landsat8Flag::CloudClostBuffer,
    ];

    /// (cloud test bit, buffer bit) pairs buffered by post-processing
    pub const BUFFER_PAIRS: [(Landsat8Flag, Landsat8Flag); 4] = [
        (Landsat8Flag::CloudShimez, Landsat8Flag::CloudShimezBuffer),
        (Landsat8Flag::CloudHot, Landsat8Flag::CloudHotBuffer),
        (Landsat8Flag::CloudOtsu, Landsat8Flag::CloudOtsuBuffer),
        (Landsat8Flag::CloudClost, Landsat8Flag::CloudClostBuffer),
    ];
}

impl FlagBit for Landsat8Flag {
    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            Landsat8Flag::CloudShimez => "IDEPIX_CLOUD_SHIMEZ",
            Landsat8Flag::CloudShimezBuffer => "IDEPIX_CLOUD_SHIMEZ_BUFFER",
            Landsat8Flag::CloudHot => "IDEPIX_CLOUD_HOT",
            Landsat8Flag::CloudHotBuffer => "IDEPIX_CLOUD_HOT_BUFFER",
            Landsat8Flag::CloudOtsu => "IDEPIX_CLOUD_OTSU",
            Landsat8Flag::CloudOtsuBuffer => "IDEPIX_CLOUD_OTSU_BUFFER",
            Landsat8Flag::CloudClost => "IDEPIX_CLOUD_CLOST",
            Landsat8Flag::CloudClostBuffer => "IDEPIX_CLOUD_CLOST_BUFFER",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Landsat8Flag::CloudShimez => "Cloud detected by the SHIMEZ mean/difference test",
            Landsat8Flag::CloudShimezBuffer => "Buffer around SHIMEZ clouds",
            Landsat8Flag::CloudHot => "Cloud detected by the haze optimized transformation",
            Landsat8Flag::CloudHotBuffer => "Buffer around HOT clouds",
            Landsat8Flag::CloudOtsu => "Cloud detected by the scene Otsu threshold on CLOST",
            Landsat8Flag::CloudOtsuBuffer => "Buffer around OTSU clouds",
            Landsat8Flag::CloudClost => "Cloud detected by the CLOST band product test",
            Landsat8Flag::CloudClostBuffer => "Buffer around CLOST clouds",
        }
    }
}

/// Extension bits of Sentinel-2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S2Flag {
    CirrusSure = 11,
    CirrusAmbiguous = 12,
    MountainShadow = 13,
}

impl FlagBit for S2Flag {
    fn bit(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            S2Flag::CirrusSure => "IDEPIX_CIRRUS_SURE",
            S2Flag::CirrusAmbiguous => "IDEPIX_CIRRUS_AMBIGUOUS",
            S2Flag::MountainShadow => "IDEPIX_MOUNTAIN_SHADOW",
        }
    }

    fn description(self) -> &'static str {
        match self {
            S2Flag::CirrusSure => "Cirrus clouds with full confidence of their detection",
            S2Flag::CirrusAmbiguous => "Cirrus clouds, or clouds where the detection level is uncertain",
            S2Flag::MountainShadow => "Pixels in the shadow of surrounding terrain",
        }
    }
}

/// One entry of a flag coding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    pub bit: u32,
    pub description: String,
}

/// Visualisation mask derived from one flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskDefinition {
    pub name: String,
    pub expression: String,
    pub description: String,
    pub color: [u8; 3],
    pub transparency: f32,
}

/// Mapping between flag names and bit positions for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCoding {
    name: String,
    flags: Vec<FlagDefinition>,
}

impl FlagCoding {
    pub fn builder(name: &str) -> FlagCodingBuilder {
        FlagCodingBuilder { name: name.to_string(), flags: Vec::new() }
    }

    /// Flag coding of a sensor: base flags plus the sensor's extension bits
    pub fn for_sensor(sensor: Sensor) -> IdepixResult<Self> {
        let builder = Self::builder(CLASSIF_BAND_NAME).with_defaults();
        let builder = match sensor {
            Sensor::Meris | Sensor::Modis | Sensor::SeaWifs | Sensor::Viirs => builder
                .add(OcFlag::MixedPixel)
                .add(OcFlag::GlintRisk)
                .add(OcFlag::CloudBNir),
            Sensor::Olci | Sensor::Slstr => builder.add(OlciFlag::MountainShadow),
            Sensor::Landsat8 => Landsat8Flag::ALL.iter().fold(builder, |b, &f| b.add(f)),
            Sensor::Sentinel2 => builder
                .add(S2Flag::CirrusSure)
                .add(S2Flag::CirrusAmbiguous)
                .add(S2Flag::MountainShadow),
            Sensor::Avhrr | Sensor::ProbaV => builder,
        };
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> &[FlagDefinition] {
        &self.flags
    }

    pub fn bit(&self, name: &str) -> Option<u32> {
        self.flags.iter().find(|f| f.name == name).map(|f| f.bit)
    }

    pub fn mask(&self, name: &str) -> Option<u32> {
        self.bit(name).map(|b| 1 << b)
    }

    pub fn name_of(&self, bit: u32) -> Option<&str> {
        self.flags.iter().find(|f| f.bit == bit).map(|f| f.name.as_str())
    }

    /// Names of all flags set in `word`, in bit order
    pub fn decode(&self, word: u32) -> Vec<&str> {
        let mut set: Vec<&FlagDefinition> =
            self.flags.iter().filter(|f| word & (1 << f.bit) != 0).collect();
        set.sort_by_key(|f| f.bit);
        set.into_iter().map(|f| f.name.as_str()).collect()
    }

    /// One visualisation mask per flag
    pub fn masks(&self) -> Vec<MaskDefinition> {
        self.flags
            .iter()
            .map(|f| MaskDefinition {
                name: f.name.to_lowercase().replace("idepix_", "idepix_mask_"),
                expression: format!("{}.{}", self.name, f.name),
                description: f.description.clone(),
                color: mask_color(f.bit),
                transparency: 0.5,
            })
            .collect()
    }
}

/// Builder validating that bit positions and names are unique
#[derive(Debug, Clone)]
pub struct FlagCodingBuilder {
    name: String,
    flags: Vec<FlagDefinition>,
}

impl FlagCodingBuilder {
    pub fn with_defaults(self) -> Self {
        Flag::ALL.iter().fold(self, |b, &f| b.add(f))
    }

    pub fn add<F: FlagBit>(self, flag: F) -> Self {
        self.add_custom(flag.name(), flag.bit(), flag.description())
    }

    pub fn add_custom(mut self, name: &str, bit: u32, description: &str) -> Self {
        self.flags.push(FlagDefinition {
            name: name.to_string(),
            bit,
            description: description.to_string(),
        });
        self
    }

    pub fn build(self) -> IdepixResult<FlagCoding> {
        let mut bits = HashSet::new();
        let mut names = HashSet::new();
        for flag in &self.flags {
            if flag.bit >= u32::BITS {
                return Err(IdepixError::FlagCoding(format!(
                    "{} uses bit {}, flag words hold {} bits",
                    flag.name,
                    flag.bit,
                    u32::BITS
                )));
            }
            if !bits.insert(flag.bit) {
                return Err(IdepixError::FlagCoding(format!(
                    "bit {} of {} is already taken",
                    flag.bit, flag.name
                )));
            }
            if !names.insert(flag.name.as_str()) {
                return Err(IdepixError::FlagCoding(format!("duplicate flag name {}", flag.name)));
            }
        }
        Ok(FlagCoding { name: self.name, flags: self.flags })
    }
}

fn mask_color(bit: u32) -> [u8; 3] {
    match bit {
        0 => [178, 0, 0],
        1 => [255, 0, 255],
        2 => [255, 255, 0],
        3 => [255, 0, 0],
        4 => [255, 200, 0],
        5 => [178, 0, 0],
        6 => [0, 255, 255],
        7 => [178, 178, 0],
        8 => [255, 90, 90],
        9 => [0, 255, 0],
        10 => [0, 178, 0],
        _ => {
            // golden-ratio hue walk keeps extension colours apart
            let hue = (bit as f32 * 0.618_034).fract() * 6.0;
            let x = (1.0 - (hue % 2.0 - 1.0).abs()) * 255.0;
            let x = x as u8;
            match hue as u32 {
                0 => [255, x, 0],
                1 => [x, 255, 0],
                2 => [0, 255, x],
                3 => [0, x, 255],
                4 => [x, 0, 255],
                _ => [255, 0, x],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flag_layout() {
        let coding = FlagCoding::builder(CLASSIF_BAND_NAME).with_defaults().build().unwrap();
        assert_eq!(coding.flags().len(), NUM_DEFAULT_FLAGS as usize);
        assert_eq!(coding.bit("IDEPIX_CLOUD_SURE"), Some(3));
        assert_eq!(coding.name_of(10), Some("IDEPIX_LAND"));
        assert_eq!(Flag::Land.mask(), 1 << 10);
    }

    #[test]
    fn test_sensor_extensions_start_after_defaults() {
        for sensor in Sensor::ALL {
            let coding = FlagCoding::for_sensor(sensor).unwrap();
            for flag in coding.flags().iter().skip(NUM_DEFAULT_FLAGS as usize) {
                assert!(flag.bit >= NUM_DEFAULT_FLAGS, "{} on {}", flag.name, sensor);
            }
        }
        let l8 = FlagCoding::for_sensor(Sensor::Landsat8).unwrap();
        assert_eq!(l8.bit("IDEPIX_CLOUD_CLOST_BUFFER"), Some(18));
    }

    #[test]
    fn test_builder_rejects_collisions() {
        let result = FlagCoding::builder("flags")
            .with_defaults()
            .add_custom("IDEPIX_EXTRA", 3, "collides with CLOUD_SURE")
            .build();
        assert!(matches!(result, Err(IdepixError::FlagCoding(_))));

        let result = FlagCoding::builder("flags").add_custom("TOO_HIGH", 32, "").build();
        assert!(result.is_err());

        let result = FlagCoding::builder("flags")
            .add_custom("A", 1, "")
            .add_custom("A", 2, "")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_and_masks() {
        let coding = FlagCoding::for_sensor(Sensor::Olci).unwrap();
        let word = Flag::Cloud.mask() | Flag::CloudSure.mask() | OlciFlag::MountainShadow.mask();
        assert_eq!(
            coding.decode(word),
            vec!["IDEPIX_CLOUD", "IDEPIX_CLOUD_SURE", "IDEPIX_MOUNTAIN_SHADOW"]
        );

        let masks = coding.masks();
        assert_eq!(masks.len(), coding.flags().len());
        assert_eq!(masks[1].expression, "pixel_classif_flags.IDEPIX_CLOUD");
    }
}
