//! Terrain descriptors: grid orientation, slope/aspect and mountain shadow

use crate::flags::{FlagBit, OlciFlag, S2Flag};
use crate::raster::{BitRaster, FlagTile, Raster, ValueTile};
use crate::types::{IdepixError, IdepixResult, Rectangle, Sensor};
use serde::{Deserialize, Serialize};

/// Terrain parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainParams {
    /// Pixel spacing of the elevation grid in metres
    pub resolution: f64,
    /// Elevation value marking missing data
    #[serde(default)]
    pub elevation_no_data: Option<f32>,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            resolution: 300.0, // OLCI full resolution
            elevation_no_data: None,
        }
    }
}

impl TerrainParams {
    pub fn validate(&self) -> IdepixResult<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(IdepixError::Config(format!(
                "terrain resolution must be positive, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

/// Slope, aspect (radians) and orientation (degrees) of a tile
#[derive(Debug, Clone)]
pub struct TerrainBands {
    pub slope: ValueTile,
    pub aspect: ValueTile,
    pub orientation: ValueTile,
}

/// Bearing of the pixel grid between two positions, in degrees.
///
/// `atan2(-(lat2 - lat1), (lon2 - lon1) * cos(lat1))`, evaluated in double
/// precision on single precision geolocation.
pub fn compute_orientation(lat1: f32, lon1: f32, lat2: f32, lon2: f32) -> f64 {
    let (lat1, lon1, lat2, lon2) = (lat1 as f64, lon1 as f64, lat2 as f64, lon2 as f64);
    let dy = -(lat2 - lat1);
    let dx = (lon2 - lon1) * lat1.to_radians().cos();
    dy.atan2(dx).to_degrees()
}

/// Orientation at (x, y) from the left and right neighbours, clamped to the raster edges
pub fn orientation_at<R: Raster<f32>>(lat: &R, lon: &R, x: i32, y: i32) -> f64 {
    let rect = lat.rect();
    let left = (x - 1).max(rect.x);
    let right = (x + 1).min(rect.x_end() - 1);
    compute_orientation(lat.get(left, y), lon.get(left, y), lat.get(right, y), lon.get(right, y))
}

/// Slope and aspect (radians) from a row-major 3x3 elevation window.
///
/// NaN for both when any sample is not finite.
pub fn compute_slope_aspect(elevation: &[f64; 9], resolution: f64) -> (f64, f64) {
    if elevation.iter().any(|e| !e.is_finite()) {
        return (f64::NAN, f64::NAN);
    }
    let e = elevation;
    let b = (e[2] + 2.0 * e[5] + e[8] - e[0] - 2.0 * e[3] - e[6]) / 8.0;
    let c = (e[0] + 2.0 * e[1] + e[2] - e[6] - 2.0 * e[7] - e[8]) / 8.0;
    let slope = ((b / resolution).powi(2) + (c / resolution).powi(2)).sqrt().atan();
    let aspect = (-b).atan2(-c);
    (slope, aspect)
}

/// Terrain shadow test; all angles in radians.
///
/// Shadowed when the sun direction makes an obtuse angle with the surface
/// normal. NaN inputs never flag.
pub fn is_mountain_shadow(sun_zenith: f64, sun_azimuth: f64, slope: f64, aspect: f64, orientation: f64) -> bool {
    let cos_beta = sun_zenith.cos() * slope.cos()
        + sun_zenith.sin() * slope.sin() * (sun_azimuth - (aspect + orientation)).cos();
    cos_beta < 0.0
}

/// Extension bit carrying MOUNTAIN_SHADOW for a sensor, if it has one
pub fn mountain_shadow_bit(sensor: Sensor) -> Option<u32> {
    match sensor {
        Sensor::Olci | Sensor::Slstr => Some(OlciFlag::MountainShadow.bit()),
        Sensor::Sentinel2 => Some(S2Flag::MountainShadow.bit()),
        _ => None,
    }
}

/// Terrain band processor
#[derive(Debug, Clone)]
pub struct TerrainProcessor {
    params: TerrainParams,
}

impl TerrainProcessor {
    pub fn new(params: TerrainParams) -> IdepixResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Halo of elevation and lat/lon needed around a target tile
    pub fn required_margin(&self) -> i32 {
        1
    }

    fn elevation(&self, elevation: &ValueTile, x: i32, y: i32) -> f64 {
        match elevation.try_get(x, y) {
            Some(e) if Some(e) == self.params.elevation_no_data => f64::NAN,
            Some(e) => e as f64,
            None => f64::NAN,
        }
    }

    /// Slope, aspect and orientation of `rect`.
    ///
    /// Inputs must cover `rect`; pixels whose 3x3 elevation window leaves
    /// the elevation raster get NaN slope and aspect.
    pub fn compute(
        &self,
        elevation: &ValueTile,
        lat: &ValueTile,
        lon: &ValueTile,
        rect: Rectangle,
    ) -> IdepixResult<TerrainBands> {
        for (name, tile) in [("elevation", elevation), ("latitude", lat), ("longitude", lon)] {
            if !tile.rect().contains_rect(&rect) {
                return Err(IdepixError::DimensionMismatch(format!(
                    "{} window {} does not cover {}",
                    name,
                    tile.rect(),
                    rect
                )));
            }
        }
        if lat.rect() != lon.rect() {
            return Err(IdepixError::DimensionMismatch(format!(
                "latitude {} and longitude {} windows differ",
                lat.rect(),
                lon.rect()
            )));
        }

        let mut slope = ValueTile::filled(rect, f32::NAN);
        let mut aspect = ValueTile::filled(rect, f32::NAN);
        let mut window = [0.0; 9];
        for (x, y) in rect.positions() {
            for (k, e) in window.iter_mut().enumerate() {
                let (dx, dy) = ((k % 3) as i32 - 1, (k / 3) as i32 - 1);
                *e = self.elevation(elevation, x + dx, y + dy);
            }
            let (s, a) = compute_slope_aspect(&window, self.params.resolution);
            slope.set(x, y, s as f32);
            aspect.set(x, y, a as f32);
        }

        let orientation = ValueTile::from_fn(rect, |x, y| orientation_at(lat, lon, x, y) as f32);
        log::debug!("Computed terrain bands for {}", rect);
        Ok(TerrainBands { slope, aspect, orientation })
    }

    /// Set `bit` on every pixel of `flags` in terrain shadow.
    ///
    /// Sun angles are in degrees and must cover the flag tile.
    pub fn flag_mountain_shadow(
        &self,
        bands: &TerrainBands,
        sun_zenith: &ValueTile,
        sun_azimuth: &ValueTile,
        flags: &mut FlagTile,
        bit: u32,
    ) -> IdepixResult<usize> {
        let rect = flags.rect();
        if !bands.slope.rect().contains_rect(&rect)
            || !sun_zenith.rect().contains_rect(&rect)
            || !sun_azimuth.rect().contains_rect(&rect)
        {
            return Err(IdepixError::DimensionMismatch(format!(
                "terrain or sun angle windows do not cover {}",
                rect
            )));
        }

        let mut count = 0;
        for (x, y) in rect.positions() {
            let shadow = is_mountain_shadow(
                (sun_zenith.get(x, y) as f64).to_radians(),
                (sun_azimuth.get(x, y) as f64).to_radians(),
                bands.slope.get(x, y) as f64,
                bands.aspect.get(x, y) as f64,
                (bands.orientation.get(x, y) as f64).to_radians(),
            );
            if shadow {
                flags.set_bit(x, y, bit, true);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_orientation_fixtures() {
        assert_abs_diff_eq!(compute_orientation(56.0214, -175.4993, 55.7504, -177.0226), 162.3427376678585, epsilon = 1e-6);
        assert_abs_diff_eq!(compute_orientation(1.0, 2.0, 2.0, 3.0), -45.004363, epsilon = 1e-6);
        assert_abs_diff_eq!(compute_orientation(10.0, 10.0, 11.0, 12.0), -26.917511, epsilon = 1e-6);
    }

    #[test]
    fn test_orientation_reflected_pair_negates() {
        let (lat1, lon1, lat2, lon2) = (56.0214f32, -175.4993f32, 55.7504f32, -177.0226f32);
        let mirrored = 2.0 * lat1 - lat2;
        let a = compute_orientation(lat1, lon1, lat2, lon2);
        let b = compute_orientation(lat1, lon1, mirrored, lon2);
        assert_abs_diff_eq!(a, -b, epsilon = 1e-3);
    }

    #[test]
    fn test_flat_terrain_has_zero_slope() {
        let (slope, _) = compute_slope_aspect(&[120.0; 9], 30.0);
        assert_eq!(slope, 0.0);
    }

    #[test]
    fn test_eastward_ramp() {
        let ramp = [0.0, 10.0, 20.0, 0.0, 10.0, 20.0, 0.0, 10.0, 20.0];
        let (slope, aspect) = compute_slope_aspect(&ramp, 10.0);
        assert_abs_diff_eq!(slope, 45f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(aspect, -FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_neighbour_gives_nan() {
        let mut window = [5.0; 9];
        window[7] = f64::NAN;
        let (slope, aspect) = compute_slope_aspect(&window, 10.0);
        assert!(slope.is_nan() && aspect.is_nan());
    }

    #[test]
    fn test_mountain_shadow_depends_on_sun_side() {
        let slope = 45f64.to_radians();
        let aspect = -FRAC_PI_2;
        let sza = 60f64.to_radians();
        assert!(is_mountain_shadow(sza, FRAC_PI_2, slope, aspect, 0.0));
        assert!(!is_mountain_shadow(sza, -FRAC_PI_2, slope, aspect, 0.0));
        assert!(!is_mountain_shadow(sza, FRAC_PI_2, f64::NAN, f64::NAN, 0.0));
    }

    #[test]
    fn test_tile_terrain_and_shadow() {
        let scene = Rectangle::with_size(5, 4);
        // 100 m rise per pixel towards east
        let elevation = ValueTile::from_fn(scene, |x, _| 100.0 * x as f32);
        let lat = ValueTile::from_fn(scene, |_, y| 45.0 - 0.01 * y as f32);
        let lon = ValueTile::from_fn(scene, |x, _| 7.0 + 0.01 * x as f32);

        let processor = TerrainProcessor::new(TerrainParams { resolution: 100.0, elevation_no_data: None }).unwrap();
        let bands = processor.compute(&elevation, &lat, &lon, scene).unwrap();

        assert!(bands.slope.get(0, 1).is_nan());
        assert_abs_diff_eq!(bands.slope.get(2, 1) as f64, 45f64.to_radians(), epsilon = 1e-6);
        assert_abs_diff_eq!(bands.orientation.get(2, 1) as f64, 0.0, epsilon = 1e-6);

        let sza = ValueTile::filled(scene, 60.0);
        let saa = ValueTile::filled(scene, 90.0);
        let mut flags = FlagTile::zeros(scene);
        let bit = OlciFlag::MountainShadow.bit();
        let count = processor.flag_mountain_shadow(&bands, &sza, &saa, &mut flags, bit).unwrap();

        // interior pixels only; the border has no full window
        assert_eq!(count, 6);
        assert!(flags.get_bit(2, 1, bit));
        assert!(!flags.get_bit(0, 0, bit));
    }

    #[test]
    fn test_no_data_elevation() {
        let scene = Rectangle::with_size(3, 3);
        let mut elevation = ValueTile::filled(scene, 10.0);
        elevation.set(0, 0, -9999.0);
        let lat = ValueTile::filled(scene, 50.0);
        let lon = ValueTile::from_fn(scene, |x, _| x as f32);
        let processor = TerrainProcessor::new(TerrainParams { resolution: 30.0, elevation_no_data: Some(-9999.0) }).unwrap();
        let bands = processor.compute(&elevation, &lat, &lon, scene).unwrap();
        assert!(bands.slope.get(1, 1).is_nan());
    }

    #[test]
    fn test_mountain_shadow_bits() {
        assert_eq!(mountain_shadow_bit(Sensor::Olci), Some(11));
        assert_eq!(mountain_shadow_bit(Sensor::Sentinel2), Some(13));
        assert_eq!(mountain_shadow_bit(Sensor::Modis), None);
    }
}
