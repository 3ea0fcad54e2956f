use ndarray::Array2;

use crate::core::geometry::geodetic_to_ecef;
use crate::io::{ElevationSource, TiePointLookup};
use crate::types::PosVector;

/// 2D grid over a tile plus a one-cell ring around it.
///
/// Cells are addressed with tile-relative coordinates in `-1..=width` and
/// `-1..=height`, so `(0, 0)` is the first tile pixel and `-1` / `width`
/// are the halo.
#[derive(Debug, Clone)]
pub struct HaloGrid<T> {
    cells: Array2<T>,
    width: usize,
    height: usize,
}

impl<T: Clone> HaloGrid<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            cells: Array2::from_elem((height + 2, width + 2), fill),
            width,
            height,
        }
    }
}

impl<T> HaloGrid<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= -1 && y >= -1 && x <= self.width as isize && y <= self.height as isize
    }

    /// Panics when `(x, y)` is outside the grid and its halo
    pub fn get(&self, x: isize, y: isize) -> &T {
        assert!(self.contains(x, y), "halo grid index ({}, {}) out of bounds", x, y);
        &self.cells[[(y + 1) as usize, (x + 1) as usize]]
    }

    pub fn get_mut(&mut self, x: isize, y: isize) -> &mut T {
        assert!(self.contains(x, y), "halo grid index ({}, {}) out of bounds", x, y);
        &mut self.cells[[(y + 1) as usize, (x + 1) as usize]]
    }
}

/// Geodetic sample of one DEM window cell
#[derive(Debug, Clone, Copy, Default)]
pub struct TerrainSample {
    pub lat: f64,
    pub lon: f64,
    /// `None` where the elevation model has no data
    pub elevation: Option<f64>,
    /// ECEF position, present whenever `elevation` is
    pub earth_point: Option<PosVector>,
}

/// Latitude, longitude and elevation sampled for a block of image pixels
#[derive(Debug, Clone)]
pub struct DemWindow {
    x0: usize,
    y0: usize,
    samples: HaloGrid<TerrainSample>,
}

impl DemWindow {
    /// Window over `width x height` pixels starting at image pixel `(x0, y0)`
    pub fn new(x0: usize, y0: usize, width: usize, height: usize) -> Self {
        Self {
            x0,
            y0,
            samples: HaloGrid::new(width, height, TerrainSample::default()),
        }
    }

    pub fn origin(&self) -> (usize, usize) {
        (self.x0, self.y0)
    }

    pub fn width(&self) -> usize {
        self.samples.width()
    }

    pub fn height(&self) -> usize {
        self.samples.height()
    }

    /// Sample at tile-relative `(x, y)`, halo included
    pub fn sample(&self, x: isize, y: isize) -> &TerrainSample {
        self.samples.get(x, y)
    }

    /// Fill every cell including the halo from the geolocation grids and the
    /// elevation model. Returns `false` when no cell has a valid elevation.
    pub fn populate(
        &mut self,
        latitude: &dyn TiePointLookup,
        longitude: &dyn TiePointLookup,
        dem: &dyn ElevationSource,
    ) -> bool {
        let width = self.samples.width() as isize;
        let height = self.samples.height() as isize;
        let mut valid = false;

        for y in -1..=height {
            let pixel_y = (self.y0 as isize + y) as f64 + 0.5;
            for x in -1..=width {
                let pixel_x = (self.x0 as isize + x) as f64 + 0.5;

                let lat = latitude.value_at(pixel_x, pixel_y);
                let lon = longitude.value_at(pixel_x, pixel_y);
                let elevation = dem.elevation(lat, lon).filter(|h| h.is_finite());
                let earth_point = elevation.map(|h| geodetic_to_ecef(lat, lon, h));
                valid |= elevation.is_some();

                *self.samples.get_mut(x, y) = TerrainSample {
                    lat,
                    lon,
                    elevation,
                    earth_point,
                };
            }
        }

        valid
    }
}
