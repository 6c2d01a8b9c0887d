use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle in scene coordinates.
///
/// `x`/`y` is the upper-left corner, the extent is exclusive on the
/// right and bottom sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width: width.max(0), height: height.max(0) }
    }

    /// Rectangle anchored at the scene origin
    pub fn with_size(width: usize, height: usize) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// First column right of the rectangle
    pub fn x_end(&self) -> i32 {
        self.x + self.width
    }

    /// First row below the rectangle
    pub fn y_end(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x_end() && y >= self.y && y < self.y_end()
    }

    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.x_end() <= self.x_end()
                && other.y_end() <= self.y_end())
    }

    /// Enlarge the rectangle by `margin` pixels on every side
    pub fn grow(&self, margin: i32) -> Rectangle {
        Rectangle::new(
            self.x - margin,
            self.y - margin,
            self.width + 2 * margin,
            self.height + 2 * margin,
        )
    }

    /// Overlap of two rectangles (empty if they do not intersect)
    pub fn intersection(&self, other: &Rectangle) -> Rectangle {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.x_end().min(other.x_end());
        let y1 = self.y_end().min(other.y_end());
        Rectangle::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Clip a 3x3-style window of half-width `radius` around (x, y) to this rectangle.
    /// Returns inclusive (x_min, x_max, y_min, y_max) bounds.
    pub fn window_bounds(&self, x: i32, y: i32, radius: i32) -> (i32, i32, i32, i32) {
        (
            (x - radius).max(self.x),
            (x + radius).min(self.x_end() - 1),
            (y - radius).max(self.y),
            (y + radius).min(self.y_end() - 1),
        )
    }

    /// Row-major iterator over all pixel positions
    pub fn positions(&self) -> impl Iterator<Item = (i32, i32)> {
        let rect = *self;
        (rect.y..rect.y_end()).flat_map(move |y| (rect.x..rect.x_end()).map(move |x| (x, y)))
    }

    /// Split the rectangle into a grid of tiles of at most `tile_size` pixels per side
    pub fn tiles(&self, tile_size: usize) -> Vec<Rectangle> {
        let step = tile_size.max(1) as i32;
        let mut tiles = Vec::new();
        let mut y = self.y;
        while y < self.y_end() {
            let mut x = self.x;
            while x < self.x_end() {
                let w = step.min(self.x_end() - x);
                let h = step.min(self.y_end() - y);
                tiles.push(Rectangle::new(x, y, w, h));
                x += step;
            }
            y += step;
        }
        tiles
    }
}

impl std::fmt::Display for Rectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{} {}x{}]", self.x, self.y, self.width, self.height)
    }
}

/// Optical sensors supported by the classification engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Meris,
    Olci,
    Slstr,
    Modis,
    Avhrr,
    Viirs,
    SeaWifs,
    Landsat8,
    Sentinel2,
    ProbaV,
}

impl Sensor {
    pub const ALL: [Sensor; 10] = [
        Sensor::Meris,
        Sensor::Olci,
        Sensor::Slstr,
        Sensor::Modis,
        Sensor::Avhrr,
        Sensor::Viirs,
        Sensor::SeaWifs,
        Sensor::Landsat8,
        Sensor::Sentinel2,
        Sensor::ProbaV,
    ];

    /// Number of reflectance bands the classifier expects, in sensor band order
    pub fn reflectance_band_count(&self) -> usize {
        match self {
            Sensor::Meris => 15,
            Sensor::Olci => 21,
            Sensor::Slstr => 6,
            Sensor::Modis => 19,
            Sensor::Avhrr => 2,
            Sensor::Viirs => 10,
            Sensor::SeaWifs => 8,
            Sensor::Landsat8 => 9,
            Sensor::Sentinel2 => 13,
            Sensor::ProbaV => 4,
        }
    }

    /// Number of thermal (brightness temperature) bands the classifier expects
    pub fn thermal_band_count(&self) -> usize {
        match self {
            Sensor::Avhrr => 2,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Sensor::Meris => "MERIS",
            Sensor::Olci => "OLCI",
            Sensor::Slstr => "SLSTR",
            Sensor::Modis => "MODIS",
            Sensor::Avhrr => "AVHRR",
            Sensor::Viirs => "VIIRS",
            Sensor::SeaWifs => "SeaWiFS",
            Sensor::Landsat8 => "Landsat-8",
            Sensor::Sentinel2 => "Sentinel-2",
            Sensor::ProbaV => "PROBA-V",
        };
        write!(f, "{}", name)
    }
}

/// Kind of geocoding attached to the source product.
///
/// Tie-point and CRS geocodings come with a fractional water mask, so the
/// water fraction itself marks coastlines. Pixel geocodings only deliver
/// 0/100 water fractions and need the neighbourhood heuristic instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoCodingKind {
    TiePoint,
    Crs,
    Pixel,
}

impl GeoCodingKind {
    pub fn has_fractional_water_mask(&self) -> bool {
        matches!(self, GeoCodingKind::TiePoint | GeoCodingKind::Crs)
    }
}

impl Default for GeoCodingKind {
    fn default() -> Self {
        GeoCodingKind::TiePoint
    }
}

/// Sun and view angles of one pixel, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunViewGeometry {
    pub sun_zenith: f64,
    pub sun_azimuth: f64,
    pub view_zenith: f64,
    pub view_azimuth: f64,
}

impl SunViewGeometry {
    pub fn is_valid(&self) -> bool {
        self.sun_zenith.is_finite()
            && self.sun_azimuth.is_finite()
            && self.view_zenith.is_finite()
            && self.view_azimuth.is_finite()
    }

    /// Angle between the view direction and the specular reflection of the sun (degrees)
    pub fn glint_angle(&self) -> f64 {
        let sza = self.sun_zenith.to_radians();
        let vza = self.view_zenith.to_radians();
        let raa = (self.view_azimuth - self.sun_azimuth).to_radians();
        // specular direction sits at a relative azimuth of 180 degrees
        let cos_glint = sza.cos() * vza.cos() - sza.sin() * vza.sin() * raa.cos();
        cos_glint.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

/// Error types for pixel identification
#[derive(Debug, thiserror::Error)]
pub enum IdepixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required band: {0}")]
    MissingBand(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Neural net error: {0}")]
    NeuralNet(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Flag coding error: {0}")]
    FlagCoding(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Processing cancelled")]
    Cancelled,
}

/// Result type for pixel identification operations
pub type IdepixResult<T> = Result<T, IdepixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_intersection_and_grow() {
        let scene = Rectangle::with_size(100, 80);
        let tile = Rectangle::new(90, 0, 10, 10);
        let halo = tile.grow(4).intersection(&scene);

        assert_eq!(halo, Rectangle::new(86, 0, 14, 14));
        assert!(halo.contains_rect(&tile));
        assert!(!tile.contains(100, 5));
    }

    #[test]
    fn test_rectangle_tiling_covers_scene() {
        let scene = Rectangle::with_size(25, 17);
        let tiles = scene.tiles(10);

        assert_eq!(tiles.len(), 6);
        let covered: usize = tiles.iter().map(|t| t.area()).sum();
        assert_eq!(covered, scene.area());
        assert_eq!(tiles[5], Rectangle::new(20, 10, 5, 7));
    }

    #[test]
    fn test_window_bounds_clipped() {
        let rect = Rectangle::new(10, 10, 5, 5);
        assert_eq!(rect.window_bounds(10, 14, 1), (10, 11, 13, 14));
    }

    #[test]
    fn test_glint_angle_specular() {
        let geometry = SunViewGeometry {
            sun_zenith: 30.0,
            sun_azimuth: 0.0,
            view_zenith: 30.0,
            view_azimuth: 180.0,
        };
        assert!(geometry.glint_angle() < 1e-6);
    }
}
