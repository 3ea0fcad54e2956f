//! Forward simulation of the illuminated reference area.
//!
//! Every DEM window sample is located in radar coordinates, the area of the
//! ground patch it spans is computed, shadowed samples are dropped and the
//! remaining areas are splatted into per-tile reference grids normalised by
//! the beta0 resolution cell.

use ndarray::Array2;

use crate::core::dem_window::DemWindow;
use crate::core::geometry::{elevation_angle, SceneGeometry};
use crate::core::tiling::{CancellationToken, TileRect};
use crate::types::{PosVector, SarResult};

/// ECEF corners of the ground patch spanned by one sample and its
/// neighbours, plus the sensor that images it.
///
/// `t00` is the sample itself, `t01` the sample one line up, `t10` the next
/// sample in range and `t11` the diagonal.
#[derive(Debug, Clone, Copy)]
pub struct LocalGeometry {
    pub t00: PosVector,
    pub t01: PosVector,
    pub t10: PosVector,
    pub t11: PosVector,
    pub sensor_position: PosVector,
}

impl LocalGeometry {
    /// Patch at tile-relative `(x, y)`; `None` when any corner lacks elevation
    pub fn from_window(window: &DemWindow, x: isize, y: isize, sensor_position: PosVector) -> Option<Self> {
        Some(Self {
            t00: window.sample(x, y).earth_point?,
            t01: window.sample(x, y - 1).earth_point?,
            t10: window.sample(x + 1, y).earth_point?,
            t11: window.sample(x + 1, y - 1).earth_point?,
            sensor_position,
        })
    }

    pub fn center(&self) -> PosVector {
        (self.t00 + self.t01 + self.t10 + self.t11) * 0.25
    }

    /// Area of the patch projected onto the plane perpendicular to the line of sight (gamma0)
    pub fn projected_area(&self) -> f64 {
        let center = self.center();
        let look = (self.sensor_position - center).normalized();
        let project = |t: PosVector| {
            let r = t - center;
            r - look * r.dot(&look)
        };

        quad_area(
            project(self.t00),
            project(self.t01),
            project(self.t10),
            project(self.t11),
        )
    }

    /// Area of the patch on the terrain surface (sigma0)
    pub fn surface_area(&self) -> f64 {
        let center = self.center();
        quad_area(
            self.t00 - center,
            self.t01 - center,
            self.t10 - center,
            self.t11 - center,
        )
    }
}

/// Two triangles sharing the p10-p01 diagonal
fn quad_area(p00: PosVector, p01: PosVector, p10: PosVector, p11: PosVector) -> f64 {
    let diagonal = p10.distance(&p01);
    heron(p00.distance(&p01), p00.distance(&p10), diagonal)
        + heron(p11.distance(&p01), p11.distance(&p10), diagonal)
}

fn heron(a: f64, b: f64, c: f64) -> f64 {
    let s = 0.5 * (a + b + c);
    (s * (s - a) * (s - b) * (s - c)).max(0.0).sqrt()
}

/// Add `area / beta0` at fractional image position `(azimuth, range)` with
/// bilinear weights. Only cells inside `tile` receive a contribution.
pub fn splat(
    grid: &mut Array2<f64>,
    tile: &TileRect,
    azimuth_index: f64,
    range_index: f64,
    area: f64,
    beta0: f64,
) {
    let ia0 = azimuth_index.floor();
    let ir0 = range_index.floor();
    let wa = azimuth_index - ia0;
    let wr = range_index - ir0;
    let value = area / beta0;

    let y0 = tile.y0 as f64;
    let x0 = tile.x0 as f64;
    let (rows, cols) = grid.dim();

    for (da, weight_a) in [(0.0, 1.0 - wa), (1.0, wa)] {
        let row = ia0 + da - y0;
        if row < 0.0 || row >= rows as f64 {
            continue;
        }
        for (dr, weight_r) in [(0.0, 1.0 - wr), (1.0, wr)] {
            let col = ir0 + dr - x0;
            if col < 0.0 || col >= cols as f64 {
                continue;
            }
            grid[[row as usize, col as usize]] += weight_a * weight_r * value;
        }
    }
}

/// Walk a line of samples from near to far range, calling `accept` for
/// every savable sample whose elevation angle is strictly larger than any
/// accepted before it. Later samples at lower angles are in radar shadow.
pub fn for_each_visible(
    elevation_angles: &[f64],
    savable: &[bool],
    near_range_on_left: bool,
    mut accept: impl FnMut(usize),
) {
    let mut max_angle = 0.0;
    let mut visit = |i: usize| {
        if savable[i] && elevation_angles[i] > max_angle {
            max_angle = elevation_angles[i];
            accept(i);
        }
    };

    if near_range_on_left {
        (0..elevation_angles.len()).for_each(&mut visit);
    } else {
        (0..elevation_angles.len()).rev().for_each(&mut visit);
    }
}

/// Simulated reference areas of one tile
#[derive(Debug, Clone)]
pub struct ReferenceArea {
    pub gamma0: Array2<f64>,
    pub sigma0: Option<Array2<f64>>,
}

impl ReferenceArea {
    pub fn new(height: usize, width: usize, with_sigma0: bool) -> Self {
        Self {
            gamma0: Array2::zeros((height, width)),
            sigma0: with_sigma0.then(|| Array2::zeros((height, width))),
        }
    }
}

/// Per-line working buffers reused across the lines of a tile
struct LineScratch {
    azimuth: Vec<f64>,
    range: Vec<f64>,
    gamma0: Vec<f64>,
    sigma0: Vec<f64>,
    elevation: Vec<f64>,
    savable: Vec<bool>,
}

impl LineScratch {
    fn new(width: usize) -> Self {
        Self {
            azimuth: vec![0.0; width],
            range: vec![0.0; width],
            gamma0: vec![0.0; width],
            sigma0: vec![0.0; width],
            elevation: vec![0.0; width],
            savable: vec![false; width],
        }
    }

    fn reset(&mut self) {
        self.savable.iter_mut().for_each(|s| *s = false);
    }
}

/// Simulate the reference area of `tile` from a populated DEM window.
///
/// The window must span the tile columns and may extend above and below the
/// tile in azimuth. Samples that cannot be located or whose patch touches a
/// no-data cell are skipped. Cancellation is checked once per window line.
pub fn simulate_tile(
    window: &DemWindow,
    geometry: &SceneGeometry,
    tile: &TileRect,
    with_sigma0: bool,
    cancel: &CancellationToken,
) -> SarResult<ReferenceArea> {
    let mut reference = ReferenceArea::new(tile.height, tile.width, with_sigma0);
    let width = window.width();
    let beta0 = geometry.beta0();
    let near_range_on_left = geometry.mission.near_range_on_left;

    let x_min = tile.x0 as f64;
    let x_max = tile.x_end() as f64;
    let y_min = tile.y0 as f64 - 1.0;
    let y_max = tile.y_end() as f64;

    let mut line = LineScratch::new(width);

    for y in 0..window.height() as isize {
        cancel.check()?;
        line.reset();

        for x in 0..width as isize {
            let i = x as usize;
            let sample = window.sample(x, y);
            let Some(earth_point) = sample.earth_point else {
                continue;
            };

            let Some(solution) = geometry.locate(&earth_point) else {
                continue;
            };
            let Some(range_index) = geometry.range_index(solution.time, solution.slant_range) else {
                continue;
            };
            let azimuth_index = geometry.azimuth_index(solution.time);

            let Some(patch) = LocalGeometry::from_window(window, x, y, solution.sensor_position) else {
                continue;
            };

            let gamma0_area = patch.projected_area();
            if !(gamma0_area > 0.0) {
                continue;
            }

            line.azimuth[i] = azimuth_index;
            line.range[i] = range_index;
            line.gamma0[i] = gamma0_area;
            if with_sigma0 {
                line.sigma0[i] = patch.surface_area();
            }
            line.elevation[i] =
                elevation_angle(solution.slant_range, &earth_point, &solution.sensor_position);
            line.savable[i] = range_index >= x_min
                && range_index < x_max
                && azimuth_index > y_min
                && azimuth_index < y_max;
        }

        let ReferenceArea { gamma0, sigma0 } = &mut reference;
        for_each_visible(&line.elevation, &line.savable, near_range_on_left, |i| {
            splat(gamma0, tile, line.azimuth[i], line.range[i], line.gamma0[i], beta0);
            if let Some(sigma0) = sigma0.as_mut() {
                splat(sigma0, tile, line.azimuth[i], line.range[i], line.sigma0[i], beta0);
            }
        });
    }

    log::trace!("Simulated tile at line {} from {} window lines", tile.y0, window.height());

    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_patch(offset: PosVector, sensor: PosVector) -> LocalGeometry {
        LocalGeometry {
            t00: offset,
            t01: offset + PosVector::new(0.0, 10.0, 0.0),
            t10: offset + PosVector::new(20.0, 0.0, 0.0),
            t11: offset + PosVector::new(20.0, 10.0, 0.0),
            sensor_position: sensor,
        }
    }

    #[test]
    fn test_area_of_flat_rectangle() {
        // Line of sight along +z: projection leaves the patch unchanged
        let patch = square_patch(PosVector::default(), PosVector::new(10.0, 5.0, 1.0e6));
        assert_relative_eq!(patch.surface_area(), 200.0, epsilon = 1e-9);
        assert_relative_eq!(patch.projected_area(), 200.0, epsilon = 1e-6);
    }

    #[test]
    fn test_projected_area_shrinks_with_incidence() {
        // Sensor 45 degrees off the patch normal, tilted in x
        let sensor = PosVector::new(10.0 + 1.0e6, 5.0, 1.0e6);
        let patch = square_patch(PosVector::default(), sensor);
        let expected = 200.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(patch.projected_area(), expected, epsilon = 1e-3);
        assert_relative_eq!(patch.surface_area(), 200.0, epsilon = 1e-9);
    }

    #[test]
    fn test_area_translation_invariant() {
        let sensor_offset = PosVector::new(3.0e5, -2.0e5, 7.0e5);
        let base = square_patch(PosVector::default(), sensor_offset);

        for shift in [
            PosVector::new(6_378_137.0, 0.0, 0.0),
            PosVector::new(-1.2e6, 4.5e6, 3.9e6),
            PosVector::new(0.5, -0.25, 1000.0),
        ] {
            let moved = LocalGeometry {
                t00: base.t00 + shift,
                t01: base.t01 + shift,
                t10: base.t10 + shift,
                t11: base.t11 + shift,
                sensor_position: base.sensor_position + shift,
            };
            assert_relative_eq!(moved.projected_area(), base.projected_area(), epsilon = 1e-4);
            assert_relative_eq!(moved.surface_area(), base.surface_area(), epsilon = 1e-4);
        }
    }

    #[test]
    fn test_degenerate_patch_has_zero_area() {
        let p = PosVector::new(1.0, 2.0, 3.0);
        let patch = LocalGeometry {
            t00: p,
            t01: p,
            t10: p + PosVector::new(1.0, 0.0, 0.0),
            t11: p + PosVector::new(2.0, 0.0, 0.0),
            sensor_position: PosVector::new(0.0, 0.0, 1.0e6),
        };
        let area = patch.surface_area();
        assert!(area.is_finite());
        assert!(area.abs() < 1e-6);
    }

    #[test]
    fn test_splat_conserves_energy() {
        let tile = TileRect::new(0, 0, 8, 8);
        for &frac in &[0.0, 0.25, 0.5, 0.75, 0.999] {
            let mut grid = Array2::<f64>::zeros((8, 8));
            splat(&mut grid, &tile, 3.0 + frac, 4.0 + frac, 1.0, 1.0);
            assert_relative_eq!(grid.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_splat_weights_and_beta0() {
        let tile = TileRect::new(10, 100, 4, 4);
        let mut grid = Array2::<f64>::zeros((4, 4));
        splat(&mut grid, &tile, 101.25, 11.5, 8.0, 2.0);

        assert_relative_eq!(grid[[1, 1]], 0.75 * 0.5 * 4.0);
        assert_relative_eq!(grid[[1, 2]], 0.75 * 0.5 * 4.0);
        assert_relative_eq!(grid[[2, 1]], 0.25 * 0.5 * 4.0);
        assert_relative_eq!(grid[[2, 2]], 0.25 * 0.5 * 4.0);
        assert_relative_eq!(grid.sum(), 4.0);
    }

    #[test]
    fn test_splat_stays_inside_tile() {
        let tile = TileRect::new(0, 10, 4, 4);
        let mut grid = Array2::<f64>::zeros((4, 4));

        // Row above the tile: only the lower neighbour lands inside
        splat(&mut grid, &tile, 9.5, 3.5, 1.0, 1.0);
        assert_relative_eq!(grid.sum(), 0.25, epsilon = 1e-12);
        assert_relative_eq!(grid[[0, 3]], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_shadow_filter_accepts_rising_prefix() {
        let angles = [10.0, 20.0, 30.0, 40.0, 35.0, 25.0, 15.0];
        let savable = [true; 7];

        let mut accepted = Vec::new();
        for_each_visible(&angles, &savable, true, |i| accepted.push(i));
        assert_eq!(accepted, vec![0, 1, 2, 3]);

        let mirrored: Vec<f64> = angles.iter().rev().copied().collect();
        let mut accepted_mirrored = Vec::new();
        for_each_visible(&mirrored, &savable, false, |i| accepted_mirrored.push(i));
        assert_eq!(accepted_mirrored, vec![6, 5, 4, 3]);
        assert_eq!(accepted.len(), accepted_mirrored.len());
    }

    #[test]
    fn test_shadow_filter_skips_unsavable_and_equal_angles() {
        let angles = [10.0, 10.0, 5.0, 30.0, 20.0];
        let savable = [true, true, true, false, true];

        let mut accepted = Vec::new();
        for_each_visible(&angles, &savable, true, |i| accepted.push(i));
        // equal angle is not strictly larger; the peak is not savable so 20 > 10 passes
        assert_eq!(accepted, vec![0, 4]);
    }
}
