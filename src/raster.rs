//! Tiled raster access
//!
//! Algorithms address pixels in scene coordinates. A [`Tile`] owns the
//! samples of one rectangular window of the scene; neighbourhood passes
//! receive a tile whose rectangle is grown by a halo so that windows
//! near the edge of the target rectangle still see real neighbours.

use crate::types::{IdepixError, IdepixResult, Rectangle};
use ndarray::{s, Array2};
use num_traits::Zero;

/// Random-access raster window addressed in scene coordinates
pub trait Raster<T: Copy> {
    /// Bounding rectangle of the samples held by this raster
    fn rect(&self) -> Rectangle;

    fn get(&self, x: i32, y: i32) -> T;

    fn set(&mut self, x: i32, y: i32, value: T);

    /// Sample at (x, y), or `None` outside the raster rectangle
    fn try_get(&self, x: i32, y: i32) -> Option<T> {
        if self.rect().contains(x, y) {
            Some(self.get(x, y))
        } else {
            None
        }
    }
}

/// Flag raster with single-bit access
pub trait BitRaster: Raster<u32> {
    fn get_bit(&self, x: i32, y: i32, bit: u32) -> bool {
        self.get(x, y) & (1 << bit) != 0
    }

    fn set_bit(&mut self, x: i32, y: i32, bit: u32, value: bool) {
        let word = self.get(x, y);
        let word = if value { word | (1 << bit) } else { word & !(1 << bit) };
        self.set(x, y, word);
    }
}

/// Rectangular window of a scene raster backed by a row-major array
#[derive(Debug, Clone, PartialEq)]
pub struct Tile<T> {
    rect: Rectangle,
    data: Array2<T>,
}

/// Classification flag tile
pub type FlagTile = Tile<u32>;

/// Single-band value tile (reflectance, angle, elevation, ...)
pub type ValueTile = Tile<f32>;

impl<T: Copy> Tile<T> {
    /// Tile filled with a constant value
    pub fn filled(rect: Rectangle, value: T) -> Self {
        Self {
            rect,
            data: Array2::from_elem((rect.height.max(0) as usize, rect.width.max(0) as usize), value),
        }
    }

    /// Wrap an existing (rows, cols) array positioned at `rect`
    pub fn from_array(rect: Rectangle, data: Array2<T>) -> IdepixResult<Self> {
        let expected = (rect.height.max(0) as usize, rect.width.max(0) as usize);
        if data.dim() != expected {
            return Err(IdepixError::DimensionMismatch(format!(
                "array of {}x{} cannot back tile {}",
                data.ncols(),
                data.nrows(),
                rect
            )));
        }
        Ok(Self { rect, data })
    }

    /// Build a tile at the scene origin from row-major samples
    pub fn from_vec(width: usize, height: usize, values: Vec<T>) -> IdepixResult<Self> {
        let data = Array2::from_shape_vec((height, width), values)
            .map_err(|e| IdepixError::DimensionMismatch(format!("Failed to reshape samples: {}", e)))?;
        Ok(Self { rect: Rectangle::with_size(width, height), data })
    }

    pub fn from_fn<F>(rect: Rectangle, mut f: F) -> Self
    where
        F: FnMut(i32, i32) -> T,
    {
        let data = Array2::from_shape_fn(
            (rect.height.max(0) as usize, rect.width.max(0) as usize),
            |(row, col)| f(rect.x + col as i32, rect.y + row as i32),
        );
        Self { rect, data }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn as_array(&self) -> &Array2<T> {
        &self.data
    }

    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    /// Copy of the samples covered by `window`; the window must lie inside the tile
    pub fn window(&self, window: Rectangle) -> IdepixResult<Tile<T>> {
        if !self.rect.contains_rect(&window) {
            return Err(IdepixError::DimensionMismatch(format!(
                "window {} exceeds tile {}",
                window, self.rect
            )));
        }
        let (row0, col0) = self.offset(window.x, window.y);
        let view = self.data.slice(s![
            row0..row0 + window.height as usize,
            col0..col0 + window.width as usize
        ]);
        Ok(Tile { rect: window, data: view.to_owned() })
    }

    /// Copy the overlapping part of `other` into this tile
    pub fn paste(&mut self, other: &Tile<T>) {
        let overlap = self.rect.intersection(&other.rect);
        if overlap.is_empty() {
            return;
        }
        let (dst_row, dst_col) = self.offset(overlap.x, overlap.y);
        let (src_row, src_col) = other.offset(overlap.x, overlap.y);
        let (h, w) = (overlap.height as usize, overlap.width as usize);
        self.data
            .slice_mut(s![dst_row..dst_row + h, dst_col..dst_col + w])
            .assign(&other.data.slice(s![src_row..src_row + h, src_col..src_col + w]));
    }

    fn offset(&self, x: i32, y: i32) -> (usize, usize) {
        debug_assert!(self.rect.contains(x, y), "({}, {}) outside {}", x, y, self.rect);
        ((y - self.rect.y) as usize, (x - self.rect.x) as usize)
    }
}

impl<T: Copy + Zero> Tile<T> {
    pub fn zeros(rect: Rectangle) -> Self {
        Self::filled(rect, T::zero())
    }
}

impl<T: Copy> Raster<T> for Tile<T> {
    fn rect(&self) -> Rectangle {
        self.rect
    }

    fn get(&self, x: i32, y: i32) -> T {
        self.data[self.offset(x, y)]
    }

    fn set(&mut self, x: i32, y: i32, value: T) {
        let idx = self.offset(x, y);
        self.data[idx] = value;
    }
}

impl BitRaster for Tile<u32> {}

impl Tile<u32> {
    /// Number of pixels carrying `bit`
    pub fn count_bit(&self, bit: u32) -> usize {
        self.data.iter().filter(|&&w| w & (1 << bit) != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_coordinates() {
        let rect = Rectangle::new(10, 20, 3, 2);
        let mut tile = Tile::<f32>::zeros(rect);
        tile.set(12, 21, 4.5);

        assert_eq!(tile.get(12, 21), 4.5);
        assert_eq!(tile.as_array()[[1, 2]], 4.5);
        assert_eq!(tile.try_get(13, 21), None);
    }

    #[test]
    fn test_bit_access() {
        let mut flags = FlagTile::zeros(Rectangle::with_size(2, 2));
        flags.set_bit(1, 1, 3, true);
        flags.set_bit(1, 1, 10, true);
        flags.set_bit(1, 1, 3, false);

        assert!(!flags.get_bit(1, 1, 3));
        assert!(flags.get_bit(1, 1, 10));
        assert_eq!(flags.get(1, 1), 1 << 10);
        assert_eq!(flags.count_bit(10), 1);
    }

    #[test]
    fn test_window_and_paste() {
        let scene = Tile::from_fn(Rectangle::with_size(6, 6), |x, y| (y * 6 + x) as u32);
        let window = scene.window(Rectangle::new(2, 3, 2, 2)).unwrap();
        assert_eq!(window.get(3, 4), 27);

        let mut target = FlagTile::zeros(Rectangle::with_size(6, 6));
        target.paste(&window);
        assert_eq!(target.get(2, 3), 20);
        assert_eq!(target.get(0, 0), 0);

        assert!(scene.window(Rectangle::new(5, 5, 2, 2)).is_err());
    }

    #[test]
    fn test_from_array_dimension_check() {
        let data = Array2::<f32>::zeros((3, 4));
        assert!(Tile::from_array(Rectangle::with_size(4, 3), data.clone()).is_ok());
        assert!(Tile::from_array(Rectangle::with_size(3, 4), data).is_err());
    }
}
