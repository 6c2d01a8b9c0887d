use crate::flags::Flag;
use crate::raster::{BitRaster, FlagTile, Raster, ValueTile};
use crate::types::{IdepixError, IdepixResult};
use serde::{Deserialize, Serialize};

/// Cloud shadow search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudShadowParams {
    /// Lowest cloud top height considered (m)
    pub min_cloud_height: f64,
    /// Highest cloud top height considered (m)
    pub max_cloud_height: f64,
    /// Pixel spacing (m)
    pub pixel_size: f64,
    /// Largest sun zenith angle the halo is sized for (degrees)
    pub max_sun_zenith: f64,
    /// Search step along the sun direction (pixels)
    pub step: f64,
}

impl Default for CloudShadowParams {
    fn default() -> Self {
        Self {
            min_cloud_height: 300.0,
            max_cloud_height: 5000.0,
            pixel_size: 300.0,
            max_sun_zenith: 70.0,
            step: 0.5,
        }
    }
}

impl CloudShadowParams {
    pub fn validate(&self) -> IdepixResult<()> {
        if !(self.min_cloud_height >= 0.0 && self.min_cloud_height < self.max_cloud_height) {
            return Err(IdepixError::Config(format!(
                "cloud height range [{}, {}] is invalid",
                self.min_cloud_height, self.max_cloud_height
            )));
        }
        if !(self.pixel_size > 0.0 && self.step > 0.0) {
            return Err(IdepixError::Config("pixel size and search step must be positive".to_string()));
        }
        if !(self.max_sun_zenith > 0.0 && self.max_sun_zenith < 90.0) {
            return Err(IdepixError::Config(format!(
                "maximum sun zenith must lie in (0, 90), got {}",
                self.max_sun_zenith
            )));
        }
        Ok(())
    }
}

/// Flags CLOUD_SHADOW on clear pixels that have a cloud between them and the sun
#[derive(Debug, Clone)]
pub struct CloudShadow {
    params: CloudShadowParams,
}

impl CloudShadow {
    pub fn new(params: CloudShadowParams) -> IdepixResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Halo of raw flags needed to find the clouds of shadows inside a tile
    pub fn required_margin(&self) -> i32 {
        let p = &self.params;
        (p.max_cloud_height * p.max_sun_zenith.to_radians().tan() / p.pixel_size).ceil() as i32
    }

    /// Search sunward from every clear pixel of `target` for a CLOUD pixel of `raw`.
    ///
    /// Sun angles (degrees) and the optional grid orientation (degrees) must
    /// cover the target rectangle. Returns the number of shadow pixels.
    pub fn apply(
        &self,
        raw: &FlagTile,
        target: &mut FlagTile,
        sun_zenith: &ValueTile,
        sun_azimuth: &ValueTile,
        orientation: Option<&ValueTile>,
    ) -> IdepixResult<usize> {
        let rect = target.rect();
        let covered = sun_zenith.rect().contains_rect(&rect)
            && sun_azimuth.rect().contains_rect(&rect)
            && orientation.map_or(true, |o| o.rect().contains_rect(&rect));
        if !covered {
            return Err(IdepixError::DimensionMismatch(format!(
                "sun geometry does not cover shadow target {}",
                rect
            )));
        }

        let skip = Flag::Invalid.mask() | Flag::CLOUD_ANY;
        let mut count = 0;
        for (x, y) in rect.positions() {
            if target.get(x, y) & skip != 0 {
                continue;
            }
            let sza = sun_zenith.get(x, y) as f64;
            let saa = sun_azimuth.get(x, y) as f64;
            let grid = orientation.map_or(0.0, |o| o.get(x, y) as f64);
            if self.finds_cloud(raw, x, y, sza, saa, grid) {
                target.set_bit(x, y, Flag::CloudShadow.bit(), true);
                count += 1;
            }
        }
        log::debug!("{} cloud shadow pixels in {}", count, rect);
        Ok(count)
    }

    fn finds_cloud(&self, raw: &FlagTile, x: i32, y: i32, sza: f64, saa: f64, orientation: f64) -> bool {
        if !(sza.is_finite() && saa.is_finite() && orientation.is_finite()) || sza >= 90.0 {
            return false;
        }
        let p = &self.params;
        let tan_sza = sza.to_radians().tan();
        let d_min = p.min_cloud_height * tan_sza / p.pixel_size;
        // capped at the halo a tile is read with
        let d_max = (p.max_cloud_height * tan_sza / p.pixel_size).min(self.required_margin() as f64);
        if d_min > d_max {
            return false;
        }

        // sun direction, clockwise from the grid x axis (y grows downwards)
        let theta = (saa - orientation - 90.0).to_radians();
        let (dir_x, dir_y) = (theta.cos(), theta.sin());

        let steps = ((d_max - d_min) / p.step).ceil() as usize;
        for i in 0..=steps {
            let d = (d_min + i as f64 * p.step).min(d_max);
            let px = x + (d * dir_x).round() as i32;
            let py = y + (d * dir_y).round() as i32;
            if px == x && py == y {
                continue;
            }
            match raw.try_get(px, py) {
                Some(word) if word & Flag::Cloud.mask() != 0 => return true,
                Some(_) => {}
                None => return false,
            }
        }
        false
    }
}
