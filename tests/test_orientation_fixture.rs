use approx::assert_abs_diff_eq;
use idepix::core::terrain::{compute_orientation, orientation_at, TerrainParams, TerrainProcessor};
use idepix::raster::{Raster, ValueTile};
use idepix::types::Rectangle;

/// 4x4 geolocation grid, rows of (lat, lon)
const GRID: [[(f32, f32); 4]; 4] = [
    [(56.0214, -175.4993), (55.7504, -177.0226), (55.4821, -178.5302), (55.2113, -179.9987)],
    [(55.9, -175.6), (55.76, -176.31), (55.9012, -177.02562), (55.62, -178.4)],
    [(55.8, -175.9), (55.7, -176.9), (55.6, -177.4), (55.5, -176.9)],
    [(55.1, -176.0), (55.2, -176.2), (55.3, -176.4), (55.3021, -175.12381)],
];

const DIAGONAL: [f64; 4] = [162.3427376678585, -179.91413286368964, 90.0, -0.16576552104248135];

fn geolocation() -> (ValueTile, ValueTile) {
    let lat = GRID.iter().flat_map(|row| row.iter().map(|p| p.0)).collect();
    let lon = GRID.iter().flat_map(|row| row.iter().map(|p| p.1)).collect();
    (
        ValueTile::from_vec(4, 4, lat).expect("Failed to build latitude tile"),
        ValueTile::from_vec(4, 4, lon).expect("Failed to build longitude tile"),
    )
}

#[test]
fn test_orientation_along_diagonal() {
    let (lat, lon) = geolocation();
    for (i, expected) in DIAGONAL.iter().enumerate() {
        let i = i as i32;
        let orientation = orientation_at(&lat, &lon, i, i);
        println!("orientation({}, {}) = {}", i, i, orientation);
        assert_abs_diff_eq!(orientation, *expected, epsilon = 1e-6);
    }
}

#[test]
fn test_edges_use_clamped_neighbours() {
    let (lat, lon) = geolocation();
    // left edge pairs (0, y) with (1, y), right edge pairs (2, y) with (3, y)
    let first = compute_orientation(lat.get(0, 2), lon.get(0, 2), lat.get(1, 2), lon.get(1, 2));
    assert_abs_diff_eq!(orientation_at(&lat, &lon, 0, 2), first, epsilon = 1e-12);
    let last = compute_orientation(lat.get(2, 0), lon.get(2, 0), lat.get(3, 0), lon.get(3, 0));
    assert_abs_diff_eq!(orientation_at(&lat, &lon, 3, 0), last, epsilon = 1e-12);
}

#[test]
fn test_terrain_orientation_band_matches_fixture() {
    let (lat, lon) = geolocation();
    let rect = Rectangle::with_size(4, 4);
    let elevation = ValueTile::filled(rect, 250.0);

    let processor = TerrainProcessor::new(TerrainParams::default()).expect("Failed to create terrain processor");
    let bands = processor.compute(&elevation, &lat, &lon, rect).expect("Failed to compute terrain bands");

    for (i, expected) in DIAGONAL.iter().enumerate() {
        let i = i as i32;
        // the band is stored in single precision
        assert_abs_diff_eq!(bands.orientation.get(i, i) as f64, *expected, epsilon = 1e-4);
    }
    assert_abs_diff_eq!(bands.slope.get(1, 1) as f64, 0.0, epsilon = 1e-12);
}
