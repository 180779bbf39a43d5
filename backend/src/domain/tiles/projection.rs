//! Spherical Web Mercator projection helpers.

use std::f64::consts::PI;

/// Edge length of one slippy-map tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

const SIN_LATITUDE_LIMIT: f64 = 0.9999;

/// Project a WGS84 coordinate onto the zoom-0 pixel plane.
///
/// Returns `(x, y)` in `[0, TILE_SIZE]` pixel units. Latitudes near the poles
/// are clamped so `y` stays finite.
pub fn project(latitude: f64, longitude: f64) -> (f64, f64) {
    let sin_y = (latitude * PI / 180.0)
        .sin()
        .clamp(-SIN_LATITUDE_LIMIT, SIN_LATITUDE_LIMIT);
    let x = TILE_SIZE * (0.5 + longitude / 360.0);
    let y = TILE_SIZE * (0.5 - ((1.0 + sin_y) / (1.0 - sin_y)).ln() / (4.0 * PI));
    (x, y)
}

/// Index of the tile containing a zoom-0 pixel coordinate at `zoom`.
///
/// Indices are clamped to the valid `[0, 2^zoom - 1]` range so coordinates on
/// the antimeridian (`lon == 180`) land in the last column.
pub fn tile_index(pixel: f64, zoom: u8) -> u32 {
    let tiles_per_axis = tiles_per_axis(zoom);
    let index = (pixel * tiles_per_axis / TILE_SIZE).floor();
    index.clamp(0.0, tiles_per_axis - 1.0) as u32
}

/// Latitude of the northern edge of tile row `y` at `zoom`.
pub fn tile_to_latitude(y: u32, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * f64::from(y) / tiles_per_axis(zoom);
    (180.0 / PI) * n.sinh().atan()
}

/// Longitude of the western edge of tile column `x` at `zoom`.
pub fn tile_to_longitude(x: u32, zoom: u8) -> f64 {
    f64::from(x) / tiles_per_axis(zoom) * 360.0 - 180.0
}

fn tiles_per_axis(zoom: u8) -> f64 {
    f64::from(1_u32 << u32::from(zoom))
}
