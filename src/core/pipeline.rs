//! Scene processing: tile jobs, scheduling and cancellation
//!
//! A scene is classified tile by tile into a raw flag layer. Once the raw
//! layer is complete, every output tile is post-processed from a haloed
//! window of it, so the result does not depend on the tiling.

use crate::core::classify::{otsu_threshold, ClassifierConfig, PixelClassifier, PixelSample};
use crate::core::classify::landsat8::clost;
use crate::core::cloud_shadow::{CloudShadow, CloudShadowParams};
use crate::core::coastline::{PostProcessParams, PostProcessor};
use crate::core::neural_net::FeedForwardNet;
use crate::core::terrain::{mountain_shadow_bit, orientation_at, TerrainBands, TerrainParams, TerrainProcessor};
use crate::flags::FlagCoding;
use crate::raster::{FlagTile, Raster, ValueTile};
use crate::types::{IdepixError, IdepixResult, Rectangle, Sensor, SunViewGeometry};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared cancellation flag, checked once per processed row
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> IdepixResult<()> {
        if self.is_cancelled() {
            Err(IdepixError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sun and view angle rasters in degrees
#[derive(Debug, Clone)]
pub struct SunViewRasters {
    pub sun_zenith: ValueTile,
    pub sun_azimuth: ValueTile,
    pub view_zenith: ValueTile,
    pub view_azimuth: ValueTile,
}

impl SunViewRasters {
    pub fn at(&self, x: i32, y: i32) -> SunViewGeometry {
        SunViewGeometry {
            sun_zenith: self.sun_zenith.get(x, y) as f64,
            sun_azimuth: self.sun_azimuth.get(x, y) as f64,
            view_zenith: self.view_zenith.get(x, y) as f64,
            view_azimuth: self.view_azimuth.get(x, y) as f64,
        }
    }
}

/// Input rasters of one scene, all on the same grid
#[derive(Debug, Clone)]
pub struct SceneRasters {
    rect: Rectangle,
    reflectances: Vec<ValueTile>,
    brightness_temperatures: Vec<ValueTile>,
    water_fraction: Option<ValueTile>,
    sun_view: Option<SunViewRasters>,
    latitude: Option<ValueTile>,
    longitude: Option<ValueTile>,
    elevation: Option<ValueTile>,
}

impl SceneRasters {
    /// Scene from reflectance bands in the sensor's band order
    pub fn new(reflectances: Vec<Array2<f32>>) -> IdepixResult<Self> {
        let first = reflectances
            .first()
            .ok_or_else(|| IdepixError::MissingBand("scene has no reflectance bands".to_string()))?;
        let rect = Rectangle::with_size(first.ncols(), first.nrows());
        let reflectances = reflectances
            .into_iter()
            .enumerate()
            .map(|(i, band)| Self::band(rect, &format!("reflectance {}", i), band))
            .collect::<IdepixResult<Vec<_>>>()?;
        Ok(Self {
            rect,
            reflectances,
            brightness_temperatures: Vec::new(),
            water_fraction: None,
            sun_view: None,
            latitude: None,
            longitude: None,
            elevation: None,
        })
    }

    fn band(rect: Rectangle, name: &str, data: Array2<f32>) -> IdepixResult<ValueTile> {
        if data.dim() != (rect.height as usize, rect.width as usize) {
            return Err(IdepixError::DimensionMismatch(format!(
                "{} is {}x{}, scene is {}x{}",
                name,
                data.ncols(),
                data.nrows(),
                rect.width,
                rect.height
            )));
        }
        ValueTile::from_array(rect, data)
    }

    /// Brightness temperatures (K) of the thermal channels, e.g. AVHRR 11 and 12 µm
    pub fn with_brightness_temperatures(mut self, bands: Vec<Array2<f32>>) -> IdepixResult<Self> {
        self.brightness_temperatures = bands
            .into_iter()
            .enumerate()
            .map(|(i, band)| Self::band(self.rect, &format!("brightness temperature {}", i), band))
            .collect::<IdepixResult<Vec<_>>>()?;
        Ok(self)
    }

    /// Water fraction in percent (0 land, 100 water)
    pub fn with_water_fraction(mut self, water_fraction: Array2<f32>) -> IdepixResult<Self> {
        self.water_fraction = Some(Self::band(self.rect, "water fraction", water_fraction)?);
        Ok(self)
    }

    pub fn with_sun_view_angles(
        mut self,
        sun_zenith: Array2<f32>,
        sun_azimuth: Array2<f32>,
        view_zenith: Array2<f32>,
        view_azimuth: Array2<f32>,
    ) -> IdepixResult<Self> {
        self.sun_view = Some(SunViewRasters {
            sun_zenith: Self::band(self.rect, "sun zenith", sun_zenith)?,
            sun_azimuth: Self::band(self.rect, "sun azimuth", sun_azimuth)?,
            view_zenith: Self::band(self.rect, "view zenith", view_zenith)?,
            view_azimuth: Self::band(self.rect, "view azimuth", view_azimuth)?,
        });
        Ok(self)
    }

    pub fn with_geolocation(mut self, latitude: Array2<f32>, longitude: Array2<f32>) -> IdepixResult<Self> {
        self.latitude = Some(Self::band(self.rect, "latitude", latitude)?);
        self.longitude = Some(Self::band(self.rect, "longitude", longitude)?);
        Ok(self)
    }

    /// Elevation in metres
    pub fn with_elevation(mut self, elevation: Array2<f32>) -> IdepixResult<Self> {
        self.elevation = Some(Self::band(self.rect, "elevation", elevation)?);
        Ok(self)
    }

    pub fn rect(&self) -> Rectangle {
        self.rect
    }

    pub fn reflectance_band_count(&self) -> usize {
        self.reflectances.len()
    }

    pub fn thermal_band_count(&self) -> usize {
        self.brightness_temperatures.len()
    }

    pub fn water_fraction(&self) -> Option<&ValueTile> {
        self.water_fraction.as_ref()
    }

    pub fn sun_view(&self) -> Option<&SunViewRasters> {
        self.sun_view.as_ref()
    }

    pub fn geolocation(&self) -> Option<(&ValueTile, &ValueTile)> {
        self.latitude.as_ref().zip(self.longitude.as_ref())
    }

    pub fn elevation(&self) -> Option<&ValueTile> {
        self.elevation.as_ref()
    }

    /// Fill `reflectances` and `temperatures` with the samples at (x, y); absent bands read NaN
    pub fn read_spectra(&self, x: i32, y: i32, reflectances: &mut [f64], temperatures: &mut [f64]) {
        for (i, r) in reflectances.iter_mut().enumerate() {
            *r = self.reflectances.get(i).map_or(f64::NAN, |band| band.get(x, y) as f64);
        }
        for (i, t) in temperatures.iter_mut().enumerate() {
            *t = self.brightness_temperatures.get(i).map_or(f64::NAN, |band| band.get(x, y) as f64);
        }
    }
}

fn default_tile_size() -> usize {
    512
}

/// Complete processing configuration, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub classifier: ClassifierConfig,
    /// JSON network definition for NN-driven sensors
    #[serde(default)]
    pub neural_net_path: Option<PathBuf>,
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,
    #[serde(default)]
    pub post_process: PostProcessParams,
    #[serde(default)]
    pub cloud_shadow: Option<CloudShadowParams>,
    #[serde(default)]
    pub terrain: Option<TerrainParams>,
    #[serde(default)]
    pub compute_mountain_shadow: bool,
}

impl ProcessingConfig {
    pub fn for_sensor(sensor: Sensor) -> Self {
        Self {
            classifier: ClassifierConfig::default_for(sensor),
            neural_net_path: None,
            tile_size: default_tile_size(),
            post_process: PostProcessParams::default(),
            cloud_shadow: None,
            terrain: None,
            compute_mountain_shadow: false,
        }
    }

    pub fn from_json_str(json: &str) -> IdepixResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> IdepixResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading processing configuration from {}", path.as_ref().display());
        Self::from_json_str(&content)
    }

    pub fn sensor(&self) -> Sensor {
        self.classifier.sensor()
    }

    pub fn validate(&self) -> IdepixResult<()> {
        self.classifier.validate()?;
        if self.tile_size == 0 {
            return Err(IdepixError::Config("tile size must be positive".to_string()));
        }
        self.post_process.validate()?;
        if let Some(shadow) = &self.cloud_shadow {
            shadow.validate()?;
        }
        if let Some(terrain) = &self.terrain {
            terrain.validate()?;
        }
        if self.compute_mountain_shadow {
            if self.terrain.is_none() {
                return Err(IdepixError::Config("mountain shadow requires terrain parameters".to_string()));
            }
            if mountain_shadow_bit(self.sensor()).is_none() {
                return Err(IdepixError::Config(format!(
                    "{} flag coding has no mountain shadow flag",
                    self.sensor()
                )));
            }
        }
        Ok(())
    }

    /// Load the configured network; `None` for threshold-only sensors
    pub fn load_neural_net(&self) -> IdepixResult<Option<FeedForwardNet>> {
        if !self.classifier.uses_neural_net() {
            if self.neural_net_path.is_some() {
                log::debug!("{} does not use a neural net, ignoring configured path", self.sensor());
            }
            return Ok(None);
        }
        let path = self.neural_net_path.as_ref().ok_or_else(|| {
            IdepixError::Config(format!("{} classification requires a neural net path", self.sensor()))
        })?;
        let net = FeedForwardNet::from_json_file(path).map_err(|e| {
            IdepixError::Config(format!("failed to load neural net {}: {}", path.display(), e))
        })?;
        log::info!("Loaded neural net '{}' from {}", net.definition().name, path.display());
        Ok(Some(net))
    }
}

/// Check that the scene carries every input the classifier needs
fn check_classifier_inputs(classifier: &dyn PixelClassifier, scene: &SceneRasters) -> IdepixResult<()> {
    let sensor = classifier.sensor();
    if scene.reflectance_band_count() < classifier.reflectance_band_count() {
        return Err(IdepixError::MissingBand(format!(
            "{} needs {} reflectance bands, scene has {}",
            sensor,
            classifier.reflectance_band_count(),
            scene.reflectance_band_count()
        )));
    }
    if scene.thermal_band_count() < classifier.thermal_band_count() {
        return Err(IdepixError::MissingBand(format!(
            "{} needs {} brightness temperature bands, scene has {}",
            sensor,
            classifier.thermal_band_count(),
            scene.thermal_band_count()
        )));
    }
    if classifier.requires_geometry() && scene.sun_view().is_none() {
        return Err(IdepixError::MissingBand(format!("{} glint test needs sun and view angles", sensor)));
    }
    Ok(())
}

/// Raw classification of `rect`: flag tile and NN output tile (NaN where absent)
pub fn classify_tile(
    classifier: &mut dyn PixelClassifier,
    scene: &SceneRasters,
    rect: Rectangle,
    cancel: &CancelToken,
) -> IdepixResult<(FlagTile, ValueTile)> {
    check_classifier_inputs(classifier, scene)?;
    if !scene.rect().contains_rect(&rect) {
        return Err(IdepixError::DimensionMismatch(format!(
            "tile {} exceeds scene {}",
            rect,
            scene.rect()
        )));
    }

    let mut flags = FlagTile::zeros(rect);
    let mut nn_output = ValueTile::filled(rect, f32::NAN);
    let mut reflectances = vec![0.0; classifier.reflectance_band_count()];
    let mut temperatures = vec![0.0; classifier.thermal_band_count()];

    for y in rect.y..rect.y_end() {
        cancel.check()?;
        for x in rect.x..rect.x_end() {
            scene.read_spectra(x, y, &mut reflectances, &mut temperatures);
            let mut sample = PixelSample::new(x, y, &reflectances).with_brightness_temperatures(&temperatures);
            if let Some(water) = scene.water_fraction() {
                sample = sample.with_water_fraction(water.get(x, y));
            }
            if let Some(sun_view) = scene.sun_view() {
                sample = sample.with_geometry(sun_view.at(x, y));
            }

            let class = classifier.classify(&sample);
            flags.set(x, y, class.to_flags());
            if let Some(value) = classifier.nn_output() {
                nn_output.set(x, y, value as f32);
            }
        }
    }
    Ok((flags, nn_output))
}

/// Final flags of `rect` from the complete raw layer
pub fn post_process_tile(
    post: &PostProcessor,
    raw: &FlagTile,
    water_fraction: Option<&ValueTile>,
    rect: Rectangle,
) -> IdepixResult<FlagTile> {
    let halo = rect.grow(post.required_margin()).intersection(&raw.rect());
    let source = raw.window(halo)?;
    let water = water_fraction.map(|w| w.window(halo)).transpose()?;
    post.process(&source, water.as_ref(), rect)
}

/// Products of a scene run
#[derive(Debug, Clone)]
pub struct SceneOutput {
    /// Post-processed classification
    pub flags: FlagTile,
    pub raw_flags: FlagTile,
    pub nn_output: ValueTile,
    pub terrain: Option<TerrainBands>,
    pub flag_coding: FlagCoding,
}

/// Runs classification and post-processing over a whole scene
pub struct SceneProcessor {
    config: ProcessingConfig,
    net: Option<FeedForwardNet>,
    classifier: Box<dyn PixelClassifier>,
    post: PostProcessor,
    shadow: Option<CloudShadow>,
    terrain: Option<TerrainProcessor>,
    mountain_shadow_bit: Option<u32>,
    flag_coding: FlagCoding,
}

impl SceneProcessor {
    pub fn new(config: ProcessingConfig, net: Option<FeedForwardNet>) -> IdepixResult<Self> {
        config.validate()?;
        let sensor = config.sensor();
        let classifier = config.classifier.build(net.clone())?;
        let post = PostProcessor::new(config.post_process.clone(), sensor)?;
        let shadow = config.cloud_shadow.clone().map(CloudShadow::new).transpose()?;
        let terrain = config.terrain.clone().map(TerrainProcessor::new).transpose()?;
        let mountain_shadow_bit = if config.compute_mountain_shadow {
            mountain_shadow_bit(sensor)
        } else {
            None
        };
        let flag_coding = FlagCoding::for_sensor(sensor)?;
        Ok(Self { config, net, classifier, post, shadow, terrain, mountain_shadow_bit, flag_coding })
    }

    /// Build from a configuration, loading the network from its path
    pub fn from_config(config: ProcessingConfig) -> IdepixResult<Self> {
        config.validate()?;
        let net = config.load_neural_net()?;
        Self::new(config, net)
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn flag_coding(&self) -> &FlagCoding {
        &self.flag_coding
    }

    fn check_preconditions(&self, scene: &SceneRasters) -> IdepixResult<()> {
        check_classifier_inputs(self.classifier.as_ref(), scene)?;
        if self.shadow.is_some() && scene.sun_view().is_none() {
            return Err(IdepixError::MissingBand("cloud shadow needs sun angles".to_string()));
        }
        if self.mountain_shadow_bit.is_some() {
            if scene.sun_view().is_none() {
                return Err(IdepixError::MissingBand("mountain shadow needs sun angles".to_string()));
            }
            if scene.elevation().is_none() || scene.geolocation().is_none() {
                return Err(IdepixError::MissingBand("mountain shadow needs elevation and geolocation".to_string()));
            }
        } else if self.terrain.is_some() && (scene.elevation().is_none() || scene.geolocation().is_none()) {
            log::warn!("No elevation or geolocation, skipping terrain bands");
        }
        if scene.water_fraction().is_none() {
            log::warn!("No water fraction, all pixels are classified with the water tests");
        }
        Ok(())
    }

    /// Classifier for this scene; Landsat-8 first gets its scene-level Otsu threshold
    fn scene_classifier(&self, scene: &SceneRasters, cancel: &CancelToken) -> IdepixResult<Box<dyn PixelClassifier>> {
        let params = match &self.config.classifier {
            ClassifierConfig::Landsat8(p) if p.needs_scene_otsu() => p,
            _ => return Ok(self.classifier.boxed_clone()),
        };

        let rect = scene.rect();
        let mut reflectances = vec![0.0; Sensor::Landsat8.reflectance_band_count()];
        let mut values = Vec::with_capacity(rect.area());
        for y in rect.y..rect.y_end() {
            cancel.check()?;
            for x in rect.x..rect.x_end() {
                scene.read_spectra(x, y, &mut reflectances, &mut []);
                if reflectances.iter().all(|r| r.is_finite()) {
                    values.push(clost(&reflectances));
                }
            }
        }

        match otsu_threshold(&values) {
            Some(threshold) => {
                log::info!("Scene Otsu threshold on CLOST: {:.6}", threshold);
                let mut params = params.clone();
                params.otsu_threshold = Some(threshold);
                ClassifierConfig::Landsat8(params).build(self.net.clone())
            }
            None => {
                log::warn!("CLOST values do not separate, skipping the OTSU test");
                Ok(self.classifier.boxed_clone())
            }
        }
    }

    fn classify_tiles(
        &self,
        classifier: &dyn PixelClassifier,
        scene: &SceneRasters,
        tiles: &[Rectangle],
        cancel: &CancelToken,
    ) -> IdepixResult<Vec<(FlagTile, ValueTile)>> {
        #[cfg(feature = "parallel")]
        let results: IdepixResult<Vec<_>> = {
            use rayon::prelude::*;

            tiles
                .par_iter()
                .map_init(
                    || classifier.boxed_clone(),
                    |worker, rect| classify_tile(worker.as_mut(), scene, *rect, cancel),
                )
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: IdepixResult<Vec<_>> = {
            let mut worker = classifier.boxed_clone();
            tiles
                .iter()
                .map(|rect| classify_tile(worker.as_mut(), scene, *rect, cancel))
                .collect()
        };

        results
    }

    fn finish_tile(
        &self,
        scene: &SceneRasters,
        raw: &FlagTile,
        orientation: Option<&ValueTile>,
        terrain: Option<&TerrainBands>,
        rect: Rectangle,
        cancel: &CancelToken,
    ) -> IdepixResult<FlagTile> {
        cancel.check()?;
        let mut flags = post_process_tile(&self.post, raw, scene.water_fraction(), rect)?;

        if let (Some(shadow), Some(sun_view)) = (&self.shadow, scene.sun_view()) {
            let halo = rect.grow(shadow.required_margin()).intersection(&raw.rect());
            let raw_window = raw.window(halo)?;
            shadow.apply(&raw_window, &mut flags, &sun_view.sun_zenith, &sun_view.sun_azimuth, orientation)?;
        }

        if let (Some(bit), Some(processor), Some(bands), Some(sun_view)) =
            (self.mountain_shadow_bit, &self.terrain, terrain, scene.sun_view())
        {
            processor.flag_mountain_shadow(bands, &sun_view.sun_zenith, &sun_view.sun_azimuth, &mut flags, bit)?;
        }
        Ok(flags)
    }

    fn post_process_tiles(
        &self,
        scene: &SceneRasters,
        raw: &FlagTile,
        orientation: Option<&ValueTile>,
        terrain: Option<&TerrainBands>,
        tiles: &[Rectangle],
        cancel: &CancelToken,
    ) -> IdepixResult<Vec<FlagTile>> {
        #[cfg(feature = "parallel")]
        let results: IdepixResult<Vec<_>> = {
            use rayon::prelude::*;

            tiles
                .par_iter()
                .map(|rect| self.finish_tile(scene, raw, orientation, terrain, *rect, cancel))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: IdepixResult<Vec<_>> = tiles
            .iter()
            .map(|rect| self.finish_tile(scene, raw, orientation, terrain, *rect, cancel))
            .collect();

        results
    }

    /// Classify and post-process a complete scene
    pub fn process(&self, scene: &SceneRasters, cancel: &CancelToken) -> IdepixResult<SceneOutput> {
        let start_time = Instant::now();
        let rect = scene.rect();
        let sensor = self.config.sensor();
        self.check_preconditions(scene)?;

        let tiles = rect.tiles(self.config.tile_size);
        log::info!(
            "Classifying {} scene of {}x{} pixels in {} tiles",
            sensor,
            rect.width,
            rect.height,
            tiles.len()
        );

        let classifier = self.scene_classifier(scene, cancel)?;
        let classified = self.classify_tiles(classifier.as_ref(), scene, &tiles, cancel)?;
        let mut raw_flags = FlagTile::zeros(rect);
        let mut nn_output = ValueTile::filled(rect, f32::NAN);
        for (flags, nn) in &classified {
            raw_flags.paste(flags);
            nn_output.paste(nn);
        }
        log::debug!("Raw classification done after {:.2?}", start_time.elapsed());

        let terrain = match (&self.terrain, scene.elevation(), scene.geolocation()) {
            (Some(processor), Some(elevation), Some((lat, lon))) => Some(processor.compute(elevation, lat, lon, rect)?),
            _ => None,
        };
        let orientation = match (&terrain, scene.geolocation()) {
            (Some(bands), _) => Some(bands.orientation.clone()),
            (None, Some((lat, lon))) if self.shadow.is_some() => {
                Some(ValueTile::from_fn(rect, |x, y| orientation_at(lat, lon, x, y) as f32))
            }
            _ => None,
        };

        let finished =
            self.post_process_tiles(scene, &raw_flags, orientation.as_ref(), terrain.as_ref(), &tiles, cancel)?;
        let mut flags = FlagTile::zeros(rect);
        for tile in &finished {
            flags.paste(tile);
        }

        log::info!("{} classification completed in {:.2?}", sensor, start_time.elapsed());
        Ok(SceneOutput { flags, raw_flags, nn_output, terrain, flag_coding: self.flag_coding.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::test_support::constant_net;
    use crate::flags::Flag;
    use crate::raster::BitRaster;

    fn olci_scene(width: usize, height: usize) -> SceneRasters {
        let bands = (0..21).map(|_| Array2::from_elem((height, width), 0.05f32)).collect();
        SceneRasters::new(bands).unwrap()
    }

    fn olci_processor(nn_value: f64) -> SceneProcessor {
        let config = ProcessingConfig::for_sensor(Sensor::Olci);
        SceneProcessor::new(config, Some(constant_net(17, nn_value))).unwrap()
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(token.check().is_ok());
        shared.cancel();
        assert!(matches!(token.check(), Err(IdepixError::Cancelled)));
    }

    #[test]
    fn test_scene_band_dimensions_checked() {
        let scene = olci_scene(4, 3);
        let err = scene.with_water_fraction(Array2::zeros((4, 3))).unwrap_err();
        assert!(matches!(err, IdepixError::DimensionMismatch(_)));
        assert!(matches!(SceneRasters::new(Vec::new()), Err(IdepixError::MissingBand(_))));
    }

    #[test]
    fn test_classify_tile_reports_nn_output() {
        let scene = olci_scene(6, 4);
        let mut classifier = ClassifierConfig::default_for(Sensor::Olci)
            .build(Some(constant_net(17, 2.0)))
            .unwrap();
        let rect = Rectangle::new(2, 1, 3, 2);
        let (flags, nn) = classify_tile(classifier.as_mut(), &scene, rect, &CancelToken::new()).unwrap();

        assert_eq!(flags.rect(), rect);
        assert!((nn.get(3, 2) - 2.0).abs() < 1e-4);
        // between 1.1 and 2.75 is ambiguous for OLCI
        assert!(flags.get_bit(3, 2, Flag::CloudAmbiguous.bit()));
    }

    #[test]
    fn test_missing_bands_fail_fast() {
        let bands = (0..10).map(|_| Array2::from_elem((2, 2), 0.05f32)).collect();
        let scene = SceneRasters::new(bands).unwrap();
        let err = olci_processor(0.5).process(&scene, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, IdepixError::MissingBand(_)));
    }

    #[test]
    fn test_cancelled_scene_returns_no_output() {
        let scene = olci_scene(8, 8);
        let token = CancelToken::new();
        token.cancel();
        let result = olci_processor(0.5).process(&scene, &token);
        assert!(matches!(result, Err(IdepixError::Cancelled)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ProcessingConfig::for_sensor(Sensor::Olci);
        config.tile_size = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::for_sensor(Sensor::Modis);
        config.compute_mountain_shadow = true;
        config.terrain = Some(TerrainParams::default());
        assert!(config.validate().is_err());

        let config = ProcessingConfig::for_sensor(Sensor::Olci);
        assert!(matches!(config.load_neural_net(), Err(IdepixError::Config(_))));
        assert!(ProcessingConfig::for_sensor(Sensor::Sentinel2).load_neural_net().unwrap().is_none());
    }
}
