use crate::core::geometry::{geodetic_to_ecef, SceneGeometry};
use crate::core::tiling::TileRect;
use crate::io::{ElevationSource, TiePointLookup};

/// Azimuth halo of a tile in units of tile heights
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TileOverlap {
    /// Lines to add above the tile
    pub up: f64,
    /// Lines to add below the tile
    pub down: f64,
}

impl TileOverlap {
    /// Lines `[ymin, ymax)` the simulation must cover for `tile`, clamped to the image
    pub fn line_range(&self, tile: &TileRect, tile_size: usize, image_height: usize) -> (usize, usize) {
        let up = (tile_size as f64 * self.up) as usize;
        let down = (tile_size as f64 * self.down) as usize;
        let ymin = tile.y0.saturating_sub(up);
        let ymax = (tile.y_end() + down).min(image_height.max(tile.y_end()));
        (ymin, ymax)
    }
}

/// Estimate how far energy imaged in `tile` may originate from ground
/// sampled outside its lines.
///
/// Every `step`-th pixel of the tile is geolocated, given its elevation and
/// located in radar coordinates. The deviation between the line it is
/// imaged at and the line it was sampled on is recorded in tile heights.
/// Ground that images later than it was sampled means the tile needs
/// ground from above; earlier means from below. A tile without drift needs
/// no halo.
pub fn estimate_tile_overlap(
    tile: &TileRect,
    tile_size: usize,
    step: usize,
    geometry: &SceneGeometry,
    latitude: &dyn TiePointLookup,
    longitude: &dyn TiePointLookup,
    dem: &dyn ElevationSource,
) -> TileOverlap {
    let step = step.max(1);
    let mut min_deviation = f64::MAX;
    let mut max_deviation = f64::MIN;

    for y in (tile.y0..tile.y_end()).step_by(step) {
        for x in (tile.x0..tile.x_end()).step_by(step) {
            let pixel_x = x as f64 + 0.5;
            let pixel_y = y as f64 + 0.5;
            let lat = latitude.value_at(pixel_x, pixel_y);
            let lon = longitude.value_at(pixel_x, pixel_y);

            let Some(height) = dem.elevation(lat, lon) else {
                continue;
            };
            let earth_point = geodetic_to_ecef(lat, lon, height);
            let Some(solution) = geometry.locate(&earth_point) else {
                continue;
            };

            let azimuth_index = geometry.azimuth_index(solution.time).round();
            let deviation = (azimuth_index - y as f64) / tile_size as f64;
            min_deviation = min_deviation.min(deviation);
            max_deviation = max_deviation.max(deviation);
        }
    }

    let up = if max_deviation > 0.0 { max_deviation + 1.0 } else { 0.0 };
    let down = if min_deviation < 0.0 { (min_deviation - 1.0).abs() } else { 0.0 };

    TileOverlap { up, down }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_range_clamps_to_image() {
        let tile = TileRect::new(0, 400, 100, 400);

        let none = TileOverlap::default();
        assert_eq!(none.line_range(&tile, 400, 2000), (400, 800));

        let both = TileOverlap { up: 1.5, down: 2.0 };
        assert_eq!(both.line_range(&tile, 400, 2000), (0, 1600));
        assert_eq!(both.line_range(&tile, 400, 1000), (0, 1000));
    }
}
