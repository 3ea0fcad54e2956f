use crate::types::{GeoTransform, SarError, SarResult};
use ndarray::Array2;
use std::path::Path;

/// Elevation source queried by geodetic position.
///
/// Returns the height above the WGS84 ellipsoid in meters, or `None` where the
/// model has no data. Implementations are shared read-only between tile
/// workers.
pub trait ElevationSource: Send + Sync {
    fn elevation(&self, lat: f64, lon: f64) -> Option<f64>;

    /// Name recorded in product metadata and error messages
    fn name(&self) -> &str {
        "DEM"
    }
}

impl<F> ElevationSource for F
where
    F: Fn(f64, f64) -> Option<f64> + Send + Sync,
{
    fn elevation(&self, lat: f64, lon: f64) -> Option<f64> {
        self(lat, lon)
    }
}

/// DEM resampling applied between posts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemResampling {
    NearestNeighbour,
    Bilinear,
}

impl DemResampling {
    pub fn from_name(name: &str) -> SarResult<Self> {
        match name.to_uppercase().as_str() {
            "NEAREST_NEIGHBOUR" | "NEAREST_NEIGHBOR" | "NEAREST" => Ok(DemResampling::NearestNeighbour),
            "BILINEAR_INTERPOLATION" | "BILINEAR" => Ok(DemResampling::Bilinear),
            _ => Err(SarError::Configuration(format!(
                "Unsupported DEM resampling method: {}", name
            ))),
        }
    }
}

/// Geocoded DEM raster held in memory (latitude/longitude grid)
#[derive(Debug, Clone)]
pub struct DemGrid {
    name: String,
    data: Array2<f32>,
    transform: GeoTransform,
    no_data_value: f32,
    resampling: DemResampling,
}

impl DemGrid {
    pub fn new(
        name: impl Into<String>,
        data: Array2<f32>,
        transform: GeoTransform,
        no_data_value: f32,
        resampling: DemResampling,
    ) -> SarResult<Self> {
        let name = name.into();
        let (rows, cols) = data.dim();
        if rows < 2 || cols < 2 {
            return Err(SarError::Dem {
                dem: name,
                message: format!("raster too small for resampling: {}x{}", rows, cols),
            });
        }
        if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
            return Err(SarError::Dem {
                dem: name,
                message: "degenerate geotransform".to_string(),
            });
        }

        Ok(Self {
            name,
            data,
            transform,
            no_data_value,
            resampling,
        })
    }

    /// Load a DEM raster from a file readable by GDAL
    #[cfg(feature = "gdal")]
    pub fn from_dem_file<P: AsRef<Path>>(
        dem_path: P,
        no_data_override: Option<f64>,
        resampling: DemResampling,
    ) -> SarResult<Self> {
        use gdal::Dataset;

        log::info!("Loading DEM: {}", dem_path.as_ref().display());

        let dataset = Dataset::open(dem_path.as_ref())?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();

        let rasterband = dataset.rasterband(1)?;
        let nodata_value = no_data_override
            .or_else(|| rasterband.no_data_value())
            .unwrap_or(-32768.0) as f32;
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let dem_array = Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| SarError::Processing(format!("Failed to reshape DEM data: {}", e)))?;

        log::debug!("DEM size: {}x{}, no-data {}", width, height, nodata_value);

        Self::new(
            dem_path.as_ref().display().to_string(),
            dem_array,
            GeoTransform::from_gdal(geo_transform),
            nodata_value,
            resampling,
        )
    }

    #[cfg(not(feature = "gdal"))]
    pub fn from_dem_file<P: AsRef<Path>>(
        dem_path: P,
        _no_data_override: Option<f64>,
        _resampling: DemResampling,
    ) -> SarResult<Self> {
        Err(SarError::Dem {
            dem: dem_path.as_ref().display().to_string(),
            message: "reading DEM files requires the `gdal` feature".to_string(),
        })
    }

    fn is_no_data(&self, value: f32) -> bool {
        value == self.no_data_value || !value.is_finite()
    }
}

impl ElevationSource for DemGrid {
    fn elevation(&self, lat: f64, lon: f64) -> Option<f64> {
        let col = (lon - self.transform.top_left_x) / self.transform.pixel_width;
        let row = (lat - self.transform.top_left_y) / self.transform.pixel_height;
        let (rows, cols) = self.data.dim();

        match self.resampling {
            DemResampling::NearestNeighbour => {
                // Post (i, j) covers [j, j + 1) x [i, i + 1) in raster coordinates
                if col < 0.0 || row < 0.0 || col >= cols as f64 || row >= rows as f64 {
                    return None;
                }
                let value = self.data[[row as usize, col as usize]];
                (!self.is_no_data(value)).then_some(value as f64)
            }
            DemResampling::Bilinear => {
                // Interpolate between post centres
                let x = col - 0.5;
                let y = row - 0.5;
                if x < 0.0 || y < 0.0 || x > (cols - 1) as f64 || y > (rows - 1) as f64 {
                    return None;
                }

                let x1 = (x.floor() as usize).min(cols - 2);
                let y1 = (y.floor() as usize).min(rows - 2);
                let dx = x - x1 as f64;
                let dy = y - y1 as f64;

                let v11 = self.data[[y1, x1]];
                let v12 = self.data[[y1 + 1, x1]];
                let v21 = self.data[[y1, x1 + 1]];
                let v22 = self.data[[y1 + 1, x1 + 1]];

                if [v11, v12, v21, v22].iter().any(|&v| self.is_no_data(v)) {
                    return None;
                }

                let interpolated = v11 as f64 * (1.0 - dx) * (1.0 - dy)
                    + v21 as f64 * dx * (1.0 - dy)
                    + v12 as f64 * (1.0 - dx) * dy
                    + v22 as f64 * dx * dy;

                Some(interpolated)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
