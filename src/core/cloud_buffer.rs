use crate::flags::Flag;
use crate::raster::{BitRaster, Raster};
use crate::types::{IdepixError, IdepixResult};
use serde::{Deserialize, Serialize};

/// How the buffer is grown around cloud pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudBufferAlgorithm {
    /// Square of half-width N around every cloud pixel
    Simple,
    /// 2x2 reference block: width 1 around cloud pixels, width 2 around fully cloudy blocks
    ReferenceBlock,
}

/// Cloud buffer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudBufferParams {
    /// Buffer width N in pixels (Simple algorithm)
    pub width: usize,
    pub algorithm: CloudBufferAlgorithm,
}

impl Default for CloudBufferParams {
    fn default() -> Self {
        Self {
            width: 2,
            algorithm: CloudBufferAlgorithm::Simple,
        }
    }
}

impl CloudBufferParams {
    pub fn validate(&self) -> IdepixResult<()> {
        if self.width == 0 {
            return Err(IdepixError::Config("cloud buffer width must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Cloud buffer processor
#[derive(Debug, Clone)]
pub struct CloudBuffer {
    params: CloudBufferParams,
}

impl CloudBuffer {
    pub fn new() -> Self {
        Self {
            params: CloudBufferParams::default(),
        }
    }

    pub fn with_params(params: CloudBufferParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CloudBufferParams {
        &self.params
    }

    /// Halo the source window needs around the target rectangle
    pub fn required_margin(&self) -> i32 {
        match self.params.algorithm {
            CloudBufferAlgorithm::Simple => self.params.width as i32,
            CloudBufferAlgorithm::ReferenceBlock => 0,
        }
    }

    /// Set CLOUD_BUFFER in `target` around the CLOUD pixels of `source`
    pub fn apply<S, T>(&self, source: &S, target: &mut T)
    where
        S: Raster<u32>,
        T: BitRaster,
    {
        self.apply_pair(source, target, Flag::Cloud.mask(), Flag::CloudBuffer.bit());
    }

    /// Set `buffer_bit` in `target` around pixels of `source` carrying any bit of `cloud_mask`
    pub fn apply_pair<S, T>(&self, source: &S, target: &mut T, cloud_mask: u32, buffer_bit: u32)
    where
        S: Raster<u32>,
        T: BitRaster,
    {
        match self.params.algorithm {
            CloudBufferAlgorithm::Simple => {
                set_cloud_buffer(source, target, self.params.width as i32, cloud_mask, buffer_bit)
            }
            CloudBufferAlgorithm::ReferenceBlock => {
                set_cloud_buffer_reference_block(target, cloud_mask, buffer_bit)
            }
        }
    }
}

impl Default for CloudBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn has_any<R: Raster<u32>>(raster: &R, x: i32, y: i32, mask: u32) -> bool {
    raster.get(x, y) & mask != 0
}

fn paint<T: BitRaster>(target: &mut T, bounds: (i32, i32, i32, i32), bit: u32) {
    let (x0, x1, y0, y1) = bounds;
    for y in y0..=y1 {
        for x in x0..=x1 {
            target.set_bit(x, y, bit, true);
        }
    }
}

/// Dilate cloud pixels of the haloed `source` by `width` into `target`.
///
/// Squares are clipped to the source rectangle, and only pixels inside the
/// target rectangle are written. With a halo of at least `width` pixels the
/// target is identical to a whole-scene dilation.
pub fn set_cloud_buffer<S, T>(source: &S, target: &mut T, width: i32, cloud_mask: u32, buffer_bit: u32)
where
    S: Raster<u32>,
    T: BitRaster,
{
    let src_rect = source.rect();
    let tgt_rect = target.rect();
    for (x, y) in src_rect.positions() {
        if source.get(x, y) & cloud_mask == 0 {
            continue;
        }
        let (x0, x1, y0, y1) = src_rect.window_bounds(x, y, width);
        let bounds = (
            x0.max(tgt_rect.x),
            x1.min(tgt_rect.x_end() - 1),
            y0.max(tgt_rect.y),
            y1.min(tgt_rect.y_end() - 1),
        );
        paint(target, bounds, buffer_bit);
    }
}

/// 2x2 reference block buffering, in place on `tile`.
///
/// Each pixel with its right, lower and diagonal neighbours forms a block.
/// A cloudy reference pixel gets a buffer of width 1 reaching one pixel
/// up/left and two pixels down/right; a fully cloudy block gets width 2
/// (two up/left, three down/right). The last row, the last column and the
/// bottom-right corner have no block and are buffered with width 1 towards
/// the inside of the tile only.
pub fn set_cloud_buffer_reference_block<T: BitRaster>(tile: &mut T, cloud_mask: u32, buffer_bit: u32) {
    let rect = tile.rect();
    if rect.is_empty() {
        return;
    }
    let (rx, ry) = (rect.x, rect.y);
    let (x_last, y_last) = (rect.x_end() - 1, rect.y_end() - 1);
    let clip = |x0: i32, x1: i32, y0: i32, y1: i32| (x0.max(rx), x1.min(x_last), y0.max(ry), y1.min(y_last));

    for y in ry..y_last {
        for x in rx..x_last {
            if !has_any(tile, x, y, cloud_mask) {
                continue;
            }
            let block = has_any(tile, x + 1, y, cloud_mask)
                && has_any(tile, x, y + 1, cloud_mask)
                && has_any(tile, x + 1, y + 1, cloud_mask);
            let bounds = if block {
                clip(x - 2, x + 3, y - 2, y + 3)
            } else {
                clip(x - 1, x + 2, y - 1, y + 2)
            };
            paint(tile, bounds, buffer_bit);
        }
    }

    // south row
    for x in rx..x_last {
        if has_any(tile, x, y_last, cloud_mask) {
            paint(tile, clip(x - 1, x + 2, y_last - 1, y_last), buffer_bit);
        }
    }

    // east column
    for y in ry..y_last {
        if has_any(tile, x_last, y, cloud_mask) {
            paint(tile, clip(x_last - 1, x_last, y - 1, y + 2), buffer_bit);
        }
    }

    if has_any(tile, x_last, y_last, cloud_mask) {
        paint(tile, clip(x_last - 1, x_last, y_last - 1, y_last), buffer_bit);
    }
}
