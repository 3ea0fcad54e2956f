use crate::types::{SarError, SarResult};
use ndarray::Array2;

/// Smooth geolocation lookup over image pixel coordinates.
///
/// Coordinates are continuous pixel positions: the centre of pixel `(x, y)`
/// is at `(x + 0.5, y + 0.5)`. Implementations must tolerate positions one
/// pixel outside the raster.
pub trait TiePointLookup: Send + Sync {
    fn value_at(&self, x: f64, y: f64) -> f64;
}

impl<F> TiePointLookup for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn value_at(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// Sub-sampled grid of latitude or longitude values over the image raster
#[derive(Debug, Clone)]
pub struct TiePointGrid {
    /// Pixel coordinate of the first grid column / row
    offset_x: f64,
    offset_y: f64,
    /// Pixel distance between adjacent grid columns / rows
    sub_sampling_x: f64,
    sub_sampling_y: f64,
    values: Array2<f32>,
    /// Interpolate across the +/-180 degree meridian
    wraps_longitude: bool,
}

impl TiePointGrid {
    pub fn new(
        offset_x: f64,
        offset_y: f64,
        sub_sampling_x: f64,
        sub_sampling_y: f64,
        values: Array2<f32>,
    ) -> SarResult<Self> {
        let (rows, cols) = values.dim();
        if rows < 2 || cols < 2 {
            return Err(SarError::InvalidFormat(format!(
                "Tie point grid needs at least 2x2 points, got {}x{}", rows, cols
            )));
        }
        if !(sub_sampling_x > 0.0 && sub_sampling_y > 0.0) {
            return Err(SarError::InvalidFormat(format!(
                "Invalid tie point sub-sampling: {} x {}", sub_sampling_x, sub_sampling_y
            )));
        }

        Ok(Self {
            offset_x,
            offset_y,
            sub_sampling_x,
            sub_sampling_y,
            values,
            wraps_longitude: false,
        })
    }

    /// Longitude grid in degrees; interpolation unwraps across the antimeridian
    pub fn longitude(
        offset_x: f64,
        offset_y: f64,
        sub_sampling_x: f64,
        sub_sampling_y: f64,
        values: Array2<f32>,
    ) -> SarResult<Self> {
        let mut grid = Self::new(offset_x, offset_y, sub_sampling_x, sub_sampling_y, values)?;
        grid.wraps_longitude = true;
        Ok(grid)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Lower cell index and fractional weight; weights outside [0, 1] extrapolate
    fn cell(position: f64, count: usize) -> (usize, f64) {
        let max_index = count - 2;
        let index = position.floor().clamp(0.0, max_index as f64) as usize;
        (index, position - index as f64)
    }
}

impl TiePointLookup for TiePointGrid {
    fn value_at(&self, x: f64, y: f64) -> f64 {
        let (rows, cols) = self.values.dim();
        let (i0, wy) = Self::cell((y - self.offset_y) / self.sub_sampling_y, rows);
        let (j0, wx) = Self::cell((x - self.offset_x) / self.sub_sampling_x, cols);

        let v00 = self.values[[i0, j0]] as f64;
        let mut v01 = self.values[[i0, j0 + 1]] as f64;
        let mut v10 = self.values[[i0 + 1, j0]] as f64;
        let mut v11 = self.values[[i0 + 1, j0 + 1]] as f64;

        if self.wraps_longitude {
            let unwrap = |v: f64| {
                if v - v00 > 180.0 {
                    v - 360.0
                } else if v - v00 < -180.0 {
                    v + 360.0
                } else {
                    v
                }
            };
            v01 = unwrap(v01);
            v10 = unwrap(v10);
            v11 = unwrap(v11);
        }

        let value = v00 * (1.0 - wx) * (1.0 - wy)
            + v01 * wx * (1.0 - wy)
            + v10 * (1.0 - wx) * wy
            + v11 * wx * wy;

        if self.wraps_longitude {
            if value > 180.0 {
                value - 360.0
            } else if value <= -180.0 {
                value + 360.0
            } else {
                value
            }
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_interpolates_between_grid_points() {
        let grid = TiePointGrid::new(0.5, 0.5, 10.0, 10.0, array![[0.0, 1.0], [2.0, 3.0]]).unwrap();

        assert_relative_eq!(grid.value_at(0.5, 0.5), 0.0);
        assert_relative_eq!(grid.value_at(10.5, 10.5), 3.0);
        assert_relative_eq!(grid.value_at(5.5, 5.5), 1.5);
    }

    #[test]
    fn test_extrapolates_outside_grid() {
        let grid = TiePointGrid::new(0.5, 0.5, 1.0, 1.0, array![[0.0, 1.0], [0.0, 1.0]]).unwrap();

        assert_relative_eq!(grid.value_at(-0.5, 0.5), -1.0, epsilon = 1e-12);
        assert_relative_eq!(grid.value_at(2.5, 0.5), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_longitude_across_antimeridian() {
        let grid = TiePointGrid::longitude(
            0.0, 0.0, 1.0, 1.0,
            array![[179.0, -179.0], [179.0, -179.0]],
        )
        .unwrap();

        let mid = grid.value_at(0.5, 0.5);
        assert!((mid.abs() - 180.0).abs() < 1e-9, "unexpected longitude {}", mid);
        assert_relative_eq!(grid.value_at(0.25, 0.0), 179.5, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_degenerate_grid() {
        assert!(TiePointGrid::new(0.0, 0.0, 1.0, 1.0, array![[1.0, 2.0]]).is_err());
        assert!(TiePointGrid::new(0.0, 0.0, 0.0, 1.0, array![[1.0, 2.0], [3.0, 4.0]]).is_err());
    }
}
