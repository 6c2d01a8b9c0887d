//! Coastline refinement and tile post-processing
//!
//! Post-processing runs after the whole scene has been classified. For one
//! target tile it reads a haloed window of the raw classification and
//! produces the final flags: coastline marking, cloud and snow removal
//! along coasts, cloud buffers and the buffer/cloud consolidation.

use crate::core::cloud_buffer::{CloudBuffer, CloudBufferParams};
use crate::flags::{Flag, FlagBit, Landsat8Flag, OcFlag};
use crate::raster::{BitRaster, FlagTile, Raster, ValueTile};
use crate::types::{GeoCodingKind, IdepixError, IdepixResult, Rectangle, Sensor};
use serde::{Deserialize, Serialize};

/// Post-processing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessParams {
    pub cloud_buffer: CloudBufferParams,
    /// Mark coastlines and remove snow and isolated cloud flags along them
    pub coastline_refinement: bool,
    /// Minimum cloud fraction of the 3x3 window for a coastal cloud to survive.
    ///
    /// Counted over all 9 window pixels, the centre included: the default
    /// 0.7 needs 7 cloudy pixels, 6/9 would accept 6.
    pub surrounded_fraction: f64,
    #[serde(default)]
    pub geocoding: GeoCodingKind,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        Self {
            cloud_buffer: CloudBufferParams::default(),
            coastline_refinement: true,
            surrounded_fraction: 0.7,
            geocoding: GeoCodingKind::default(),
        }
    }
}

impl PostProcessParams {
    pub fn validate(&self) -> IdepixResult<()> {
        self.cloud_buffer.validate()?;
        if !(self.surrounded_fraction > 0.0 && self.surrounded_fraction <= 1.0) {
            return Err(IdepixError::Config(format!(
                "surrounded fraction must lie in (0, 1], got {}",
                self.surrounded_fraction
            )));
        }
        Ok(())
    }
}

/// Coastline heuristic for geocodings without a fractional water mask.
///
/// True for a LAND pixel whose neighbours (3x3 minus centre, clipped to the
/// raster) are split between land and water:
/// `count >= 4 && land >= max(count - 6, 1) && land <= count - 3`.
pub fn is_coastline<R: Raster<u32>>(flags: &R, x: i32, y: i32) -> bool {
    let land = Flag::Land.mask();
    if flags.get(x, y) & land == 0 {
        return false;
    }
    let (x0, x1, y0, y1) = flags.rect().window_bounds(x, y, 1);
    let mut count = 0;
    let mut land_count = 0;
    for j in y0..=y1 {
        for i in x0..=x1 {
            if i == x && j == y {
                continue;
            }
            count += 1;
            if flags.get(i, j) & land != 0 {
                land_count += 1;
            }
        }
    }
    count >= 4 && land_count >= (count - 6).max(1) && land_count <= count - 3
}

/// True when the 3x3 window around (x, y), clipped to `bounds`, touches a coastline.
///
/// With a fractional water mask any change of water fraction marks the
/// coast; without one the COASTLINE flags of the window are used.
pub fn is_near_coastline<R: Raster<u32>>(
    flags: &R,
    water_fraction: Option<&ValueTile>,
    x: i32,
    y: i32,
    bounds: Rectangle,
) -> bool {
    let (x0, x1, y0, y1) = bounds.window_bounds(x, y, 1);
    match water_fraction {
        Some(water) => {
            let centre = water.get(x, y);
            if !centre.is_finite() {
                return false;
            }
            (y0..=y1).any(|j| {
                (x0..=x1).any(|i| {
                    let wf = water.get(i, j);
                    wf.is_finite() && wf != centre
                })
            })
        }
        None => {
            let coast = Flag::Coastline.mask();
            (y0..=y1).any(|j| (x0..=x1).any(|i| flags.get(i, j) & coast != 0))
        }
    }
}

/// True when at least `fraction` of the full 3x3 window carries a bit of `mask`.
///
/// Neighbours outside the raster count as not flagged, the divisor stays 9.
pub fn is_pixel_surrounded<R: Raster<u32>>(flags: &R, x: i32, y: i32, mask: u32, fraction: f64) -> bool {
    let (x0, x1, y0, y1) = flags.rect().window_bounds(x, y, 1);
    let count = (y0..=y1)
        .flat_map(|j| (x0..=x1).map(move |i| (i, j)))
        .filter(|&(i, j)| flags.get(i, j) & mask != 0)
        .count();
    count as f64 / 9.0 >= fraction
}

/// OR the flags of `source` into `target` over the target rectangle
pub fn combine_flags<S: Raster<u32>, T: Raster<u32>>(source: &S, target: &mut T) {
    let overlap = target.rect().intersection(&source.rect());
    for (x, y) in overlap.positions() {
        let word = target.get(x, y) | source.get(x, y);
        target.set(x, y, word);
    }
}

/// Clear CLOUD_BUFFER on pixels that are CLOUD_SURE or CLOUD_AMBIGUOUS
pub fn consolidate_cloud_and_buffer<T: Raster<u32>>(target: &mut T) {
    let cloud = Flag::CloudSure.mask() | Flag::CloudAmbiguous.mask();
    for (x, y) in target.rect().positions() {
        let word = target.get(x, y);
        if word & cloud != 0 {
            target.set(x, y, word & !Flag::CloudBuffer.mask());
        }
    }
}

/// Clear SNOW_ICE next to a coastline
pub fn refine_snow_ice_for_coastline<T: BitRaster>(target: &mut T, x: i32, y: i32) {
    target.set_bit(x, y, Flag::SnowIce.bit(), false);
}

/// Per-tile post-processing
#[derive(Debug, Clone)]
pub struct PostProcessor {
    params: PostProcessParams,
    buffer: CloudBuffer,
    mixed_pixel_bit: Option<u32>,
    buffer_pairs: Vec<(u32, u32)>,
}

impl PostProcessor {
    pub fn new(params: PostProcessParams, sensor: Sensor) -> IdepixResult<Self> {
        params.validate()?;
        let mixed_pixel_bit = match sensor {
            Sensor::Meris | Sensor::Modis | Sensor::SeaWifs | Sensor::Viirs => Some(OcFlag::MixedPixel.bit()),
            _ => None,
        };
        let buffer_pairs = match sensor {
            Sensor::Landsat8 => Landsat8Flag::BUFFER_PAIRS
                .iter()
                .map(|(cloud, buffer)| (cloud.mask(), buffer.bit()))
                .collect(),
            _ => Vec::new(),
        };
        let buffer = CloudBuffer::with_params(params.cloud_buffer.clone());
        Ok(Self { params, buffer, mixed_pixel_bit, buffer_pairs })
    }

    pub fn params(&self) -> &PostProcessParams {
        &self.params
    }

    /// Halo of raw flags needed around a target tile
    pub fn required_margin(&self) -> i32 {
        let refine = if self.params.coastline_refinement { 3 } else { 0 };
        self.buffer_margin() + refine
    }

    fn buffer_margin(&self) -> i32 {
        self.buffer.required_margin()
    }

    /// Final flags of `target_rect`.
    ///
    /// `source` holds the raw classification of at least `target_rect` grown
    /// by [`required_margin`](Self::required_margin), clipped to the scene.
    /// `water_fraction`, when given, must cover the source rectangle.
    pub fn process(
        &self,
        source: &FlagTile,
        water_fraction: Option<&ValueTile>,
        target_rect: Rectangle,
    ) -> IdepixResult<FlagTile> {
        let src_rect = source.rect();
        if !src_rect.contains_rect(&target_rect) {
            return Err(IdepixError::DimensionMismatch(format!(
                "source window {} does not cover target {}",
                src_rect, target_rect
            )));
        }
        let water = match water_fraction {
            Some(w) if !w.rect().contains_rect(&src_rect) => {
                return Err(IdepixError::DimensionMismatch(format!(
                    "water fraction window {} does not cover {}",
                    w.rect(),
                    src_rect
                )));
            }
            Some(w) if self.params.geocoding.has_fractional_water_mask() => Some(w),
            _ => None,
        };

        let refine_rect = target_rect.grow(self.buffer_margin()).intersection(&src_rect);
        let mut refined = FlagTile::zeros(refine_rect);

        if self.params.coastline_refinement {
            let coast = self.coastline_flags(source);
            combine_flags(&coast, &mut refined);
            for (x, y) in refine_rect.positions() {
                self.refine_pixel(&coast, water, &mut refined, x, y);
            }
        } else {
            combine_flags(source, &mut refined);
        }

        let mut target = refined.window(target_rect)?;
        self.buffer.apply(&refined, &mut target);
        for &(cloud_mask, buffer_bit) in &self.buffer_pairs {
            self.buffer.apply_pair(&refined, &mut target, cloud_mask, buffer_bit);
        }
        consolidate_cloud_and_buffer(&mut target);
        Ok(target)
    }

    /// Raw flags plus COASTLINE from the neighbourhood heuristic (pixel geocodings only)
    fn coastline_flags(&self, source: &FlagTile) -> FlagTile {
        let mut coast = source.clone();
        if !self.params.geocoding.has_fractional_water_mask() {
            for (x, y) in source.rect().positions() {
                if is_coastline(source, x, y) {
                    coast.set_bit(x, y, Flag::Coastline.bit(), true);
                }
            }
        }
        coast
    }

    fn refine_pixel(&self, coast: &FlagTile, water: Option<&ValueTile>, target: &mut FlagTile, x: i32, y: i32) {
        let bounds = coast.rect();
        if is_near_coastline(coast, water, x, y, bounds) {
            target.set_bit(x, y, Flag::Coastline.bit(), true);
            refine_snow_ice_for_coastline(target, x, y);
            if coast.get_bit(x, y, Flag::Cloud.bit()) {
                self.refine_cloud_for_coastline(coast, water, target, x, y);
            }
        }
        if target.get_bit(x, y, Flag::Cloud.bit()) {
            target.set_bit(x, y, Flag::SnowIce.bit(), false);
        }
    }

    fn refine_cloud_for_coastline(
        &self,
        coast: &FlagTile,
        water: Option<&ValueTile>,
        target: &mut FlagTile,
        x: i32,
        y: i32,
    ) {
        let cloud = Flag::Cloud.mask();
        let bounds = coast.rect();
        let keep = is_pixel_surrounded(coast, x, y, cloud, self.params.surrounded_fraction) || {
            let (x0, x1, y0, y1) = bounds.window_bounds(x, y, 1);
            (y0..=y1).any(|j| {
                (x0..=x1).any(|i| coast.get(i, j) & cloud != 0 && !is_near_coastline(coast, water, i, j, bounds))
            })
        };
        if keep {
            return;
        }

        let word = target.get(x, y) & !Flag::CLOUD_ANY;
        target.set(x, y, word);
        if let Some(bit) = self.mixed_pixel_bit {
            if word & Flag::Land.mask() == 0 {
                target.set_bit(x, y, bit, true);
            }
        }
    }
}
