use ndarray::{s, Array2};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::bands::{derive_target_bands, Quantity, TargetBand};
use crate::core::dem_window::DemWindow;
use crate::core::geometry::SceneGeometry;
use crate::core::illumination::{simulate_tile, ReferenceArea};
use crate::core::normalize::{normalize_intensity_tile, normalize_tile};
use crate::core::tile_overlap::{estimate_tile_overlap, TileOverlap};
use crate::core::tiling::{full_width_tiles, CancellationToken, TileRect};
use crate::io::{DemGrid, DemResampling, ElevationSource, TiePointLookup};
use crate::types::{BandInfo, SarError, SarMetadata, SarProduct, SarResult};

/// Parameters for terrain flattening
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerrainFlatteningParams {
    /// Source bands to flatten; empty selects every beta0 band
    #[serde(rename = "sourceBands", deserialize_with = "deserialize_band_list")]
    pub source_bands: Vec<String>,
    /// Elevation model name recorded in the output metadata
    #[serde(rename = "demName")]
    pub dem_name: String,
    #[serde(rename = "demResamplingMethod")]
    pub dem_resampling_method: String,
    /// GeoTIFF DEM used instead of a named model
    #[serde(rename = "externalDEMFile", deserialize_with = "deserialize_optional_path")]
    pub external_dem_file: Option<PathBuf>,
    #[serde(rename = "externalDEMNoDataValue")]
    pub external_dem_no_data_value: f64,
    /// Add the gamma0 reference area as a `simulatedImage` band
    #[serde(rename = "outputSimulatedImage")]
    pub output_simulated_image: bool,
    /// Add terrain-flattened sigma0 bands
    #[serde(rename = "outputSigma0")]
    pub output_sigma0: bool,
    /// Tile height in lines; tiles span the full image width
    #[serde(rename = "tileSize")]
    pub tile_size: usize,
    /// Pixel stride of the tile overlap estimate
    #[serde(rename = "overlapSampleStep")]
    pub overlap_sample_step: usize,
    /// Compute tiles on the rayon thread pool
    #[serde(rename = "enableParallel")]
    pub enable_parallel: bool,
}

impl Default for TerrainFlatteningParams {
    fn default() -> Self {
        Self {
            source_bands: Vec::new(),
            dem_name: "SRTM 3Sec".to_string(),
            dem_resampling_method: "BILINEAR_INTERPOLATION".to_string(),
            external_dem_file: None,
            external_dem_no_data_value: 0.0,
            output_simulated_image: false,
            output_sigma0: false,
            tile_size: 400,
            overlap_sample_step: 20,
            enable_parallel: true,
        }
    }
}

fn deserialize_band_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

fn deserialize_optional_path<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PathBuf>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from))
}

impl TerrainFlatteningParams {
    /// Parse a `<parameters>` block of a processing graph
    pub fn from_xml(xml: &str) -> SarResult<Self> {
        let params: Self = quick_xml::de::from_str(xml.trim())
            .map_err(|e| SarError::XmlParsing(format!("Failed to parse parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_xml_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let xml = std::fs::read_to_string(path.as_ref())?;
        Self::from_xml(&xml)
    }

    pub fn validate(&self) -> SarResult<()> {
        if self.tile_size == 0 {
            return Err(SarError::Configuration("tile_size must be positive".to_string()));
        }
        if self.overlap_sample_step == 0 {
            return Err(SarError::Configuration(
                "overlap_sample_step must be positive".to_string(),
            ));
        }
        DemResampling::from_name(&self.dem_resampling_method)?;
        Ok(())
    }

    /// Name of the elevation model as recorded in the output metadata
    pub fn dem_label(&self) -> String {
        match &self.external_dem_file {
            Some(path) => path.display().to_string(),
            None => self.dem_name.clone(),
        }
    }

    /// Open the external DEM file, if one is configured
    pub fn open_external_dem(&self) -> SarResult<Option<DemGrid>> {
        let Some(path) = &self.external_dem_file else {
            return Ok(None);
        };
        let resampling = DemResampling::from_name(&self.dem_resampling_method)?;
        DemGrid::from_dem_file(path, Some(self.external_dem_no_data_value), resampling).map(Some)
    }
}

/// How a tile ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Computed,
    /// The DEM window held no valid elevation; output stays no-data
    NoElevation,
    Cancelled,
}

/// Per-tile processing record
#[derive(Debug, Clone, Copy)]
pub struct TileReport {
    pub tile: TileRect,
    pub overlap: TileOverlap,
    pub outcome: TileOutcome,
}

/// Output rasters of one tile, in target band order
#[derive(Debug, Clone)]
pub struct TileResult {
    pub report: TileReport,
    pub bands: Vec<Array2<f32>>,
}

/// Terrain-flattened product and the per-tile record of how it was computed
#[derive(Debug, Clone)]
pub struct FlattenedProduct {
    pub product: SarProduct,
    pub tiles: Vec<TileReport>,
}

/// Terrain flattening processor
pub struct TerrainFlattener {
    params: TerrainFlatteningParams,
    geometry: SceneGeometry,
    latitude: Arc<dyn TiePointLookup>,
    longitude: Arc<dyn TiePointLookup>,
    dem: Arc<dyn ElevationSource>,
    targets: Vec<TargetBand>,
    metadata: SarMetadata,
    no_data: f64,
}

impl std::fmt::Debug for TerrainFlattener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainFlattener")
            .field("params", &self.params)
            .field("dem", &self.dem.name())
            .field("targets", &self.targets)
            .finish()
    }
}

impl TerrainFlattener {
    /// Validate the source product and prepare the processor.
    ///
    /// All configuration problems surface here, before any tile is computed.
    pub fn new(
        params: TerrainFlatteningParams,
        source: &SarProduct,
        dem: Arc<dyn ElevationSource>,
    ) -> SarResult<Self> {
        params.validate()?;
        let metadata = &source.metadata;

        if metadata.map_projected {
            return Err(SarError::Configuration(
                "Source product should not be map projected".to_string(),
            ));
        }
        if !metadata.calibrated {
            return Err(SarError::Configuration(
                "Source product should be calibrated to beta0".to_string(),
            ));
        }

        let latitude = source.latitude.clone().ok_or_else(|| {
            SarError::Configuration("Product without latitude tie point grid".to_string())
        })?;
        let longitude = source.longitude.clone().ok_or_else(|| {
            SarError::Configuration("Product without longitude tie point grid".to_string())
        })?;

        let geometry = SceneGeometry::from_metadata(metadata)?;

        let targets = derive_target_bands(
            &source.bands,
            &params.source_bands,
            &metadata.polarizations,
            params.output_sigma0,
            params.output_simulated_image,
        )?;
        for source_name in targets
            .iter()
            .flat_map(|t| t.source.iter().chain(t.quadrature.iter()))
        {
            check_band_data(source, source_name)?;
        }

        let no_data = source.bands.first().map(|b| b.no_data_value).unwrap_or(0.0);

        let mut target_metadata = metadata.clone();
        target_metadata.set_attribute("DEM", params.dem_label());
        target_metadata.set_attribute("DEM resampling method", &params.dem_resampling_method);
        target_metadata.set_attribute("abs_calibration_flag", 1);
        if params.external_dem_file.is_some() {
            target_metadata.set_attribute("external DEM no data value", params.external_dem_no_data_value);
        }

        log::info!("Terrain flattening initialised for {}", metadata.product_name);
        log::info!("Image: {}x{}, beta0 cell {:.2} m², mission {:?}",
                   metadata.image_width, metadata.image_height,
                   geometry.beta0(), geometry.mission.mission);
        log::info!("DEM: {} ({})", params.dem_label(), params.dem_resampling_method);
        log::debug!("Target bands: {:?}", targets.iter().map(|t| &t.name).collect::<Vec<_>>());

        Ok(Self {
            params,
            geometry,
            latitude,
            longitude,
            dem,
            targets,
            metadata: target_metadata,
            no_data,
        })
    }

    /// Create a processor that reads its elevation from `params.external_dem_file`
    pub fn with_external_dem(params: TerrainFlatteningParams, source: &SarProduct) -> SarResult<Self> {
        let dem = params.open_external_dem()?.ok_or_else(|| {
            SarError::Configuration(format!(
                "DEM '{}' is not available: supply an elevation source or an external DEM file",
                params.dem_name
            ))
        })?;
        Self::new(params, source, Arc::new(dem))
    }

    pub fn params(&self) -> &TerrainFlatteningParams {
        &self.params
    }

    pub fn geometry(&self) -> &SceneGeometry {
        &self.geometry
    }

    pub fn target_bands(&self) -> &[TargetBand] {
        &self.targets
    }

    /// Target band descriptions, in the order tile rasters are produced
    pub fn target_band_info(&self) -> Vec<BandInfo> {
        self.targets
            .iter()
            .map(|t| BandInfo {
                name: t.name.clone(),
                unit: Some(t.unit.clone()),
                no_data_value: self.no_data,
            })
            .collect()
    }

    /// Metadata of the flattened product
    pub fn target_metadata(&self) -> &SarMetadata {
        &self.metadata
    }

    /// Azimuth halo needed by `tile`
    pub fn tile_overlap(&self, tile: &TileRect) -> TileOverlap {
        estimate_tile_overlap(
            tile,
            self.params.tile_size,
            self.params.overlap_sample_step,
            &self.geometry,
            self.latitude.as_ref(),
            self.longitude.as_ref(),
            self.dem.as_ref(),
        )
    }

    /// Simulated reference area of `tile`, or `None` when its DEM window has no elevation
    pub fn simulate(&self, tile: &TileRect, cancel: &CancellationToken) -> SarResult<(TileOverlap, Option<ReferenceArea>)> {
        let overlap = self.tile_overlap(tile);
        let (ymin, ymax) = overlap.line_range(tile, self.params.tile_size, self.metadata.image_height);
        log::debug!("Tile at line {}: halo up {:.2} down {:.2}, simulating lines {}..{}",
                    tile.y0, overlap.up, overlap.down, ymin, ymax);

        let mut window = DemWindow::new(tile.x0, ymin, tile.width, ymax - ymin);
        if !window.populate(self.latitude.as_ref(), self.longitude.as_ref(), self.dem.as_ref()) {
            return Ok((overlap, None));
        }

        let reference = simulate_tile(&window, &self.geometry, tile, self.params.output_sigma0, cancel)?;
        Ok((overlap, Some(reference)))
    }

    /// Compute every target band over one tile
    pub fn compute_tile_stack(
        &self,
        source: &SarProduct,
        tile: &TileRect,
        cancel: &CancellationToken,
    ) -> SarResult<TileResult> {
        if tile.is_empty() || tile.x_end() > self.metadata.image_width || tile.y_end() > self.metadata.image_height {
            return Err(SarError::Processing(format!(
                "Tile {:?} outside image {}x{}",
                tile, self.metadata.image_width, self.metadata.image_height
            )));
        }

        let report = |overlap, outcome| TileReport { tile: *tile, overlap, outcome };

        let (overlap, reference) = match self.simulate(tile, cancel) {
            Ok(result) => result,
            Err(SarError::Cancelled) => {
                return Ok(TileResult { report: report(TileOverlap::default(), TileOutcome::Cancelled), bands: Vec::new() });
            }
            Err(e) => return Err(e),
        };

        let Some(reference) = reference else {
            log::warn!("No valid elevation for tile at line {}; output left as no-data", tile.y0);
            return Ok(TileResult { report: report(overlap, TileOutcome::NoElevation), bands: Vec::new() });
        };

        let mut bands = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            if cancel.is_cancelled() {
                return Ok(TileResult { report: report(overlap, TileOutcome::Cancelled), bands: Vec::new() });
            }

            let area = match target.quantity {
                Quantity::Sigma0 => reference.sigma0.as_ref().unwrap_or(&reference.gamma0),
                Quantity::Gamma0 | Quantity::SimulatedImage => &reference.gamma0,
            };

            let (rows, cols) = (tile.y0..tile.y_end(), tile.x0..tile.x_end());
            let output = match (&target.source, &target.quadrature) {
                (Some(real), Some(imaginary)) => {
                    let i = check_band_data(source, real)?;
                    let q = check_band_data(source, imaginary)?;
                    normalize_intensity_tile(
                        i.slice(s![rows.clone(), cols.clone()]),
                        q.slice(s![rows, cols]),
                        area,
                        self.source_no_data(source, real),
                        self.no_data,
                    )
                }
                (Some(name), None) => {
                    let data = check_band_data(source, name)?;
                    let source_no_data = self.source_no_data(source, name);
                    normalize_tile(Some(data.slice(s![rows, cols])), area, target.source_unit, source_no_data, self.no_data)
                }
                (None, _) => normalize_tile(None, area, target.source_unit, self.no_data, self.no_data),
            };
            bands.push(output);
        }

        Ok(TileResult { report: report(overlap, TileOutcome::Computed), bands })
    }

    fn source_no_data(&self, source: &SarProduct, name: &str) -> f64 {
        source
            .bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.no_data_value)
            .unwrap_or(self.no_data)
    }

    /// Flatten the whole product tile by tile
    pub fn process(&self, source: &SarProduct, cancel: &CancellationToken) -> SarResult<FlattenedProduct> {
        let width = self.metadata.image_width;
        let height = self.metadata.image_height;
        let tiles = full_width_tiles(width, height, self.params.tile_size);

        log::info!("Starting terrain flattening: {} tiles of up to {} lines", tiles.len(), self.params.tile_size);

        let results = self.compute_tiles(source, &tiles, cancel)?;
        if cancel.is_cancelled() || results.iter().any(|r| r.report.outcome == TileOutcome::Cancelled) {
            log::info!("Terrain flattening cancelled");
            return Err(SarError::Cancelled);
        }

        let mut outputs: Vec<Array2<f32>> = self
            .targets
            .iter()
            .map(|_| Array2::from_elem((height, width), self.no_data as f32))
            .collect();

        let mut skipped = 0;
        let mut reports = Vec::with_capacity(results.len());
        for result in results {
            let tile = result.report.tile;
            if result.report.outcome == TileOutcome::NoElevation {
                skipped += 1;
            }
            for (output, band) in outputs.iter_mut().zip(result.bands) {
                output
                    .slice_mut(s![tile.y0..tile.y_end(), tile.x0..tile.x_end()])
                    .assign(&band);
            }
            reports.push(result.report);
        }

        let band_info = self.target_band_info();
        let data: HashMap<String, Array2<f32>> = band_info
            .iter()
            .map(|b| b.name.clone())
            .zip(outputs)
            .collect();

        log::info!("Terrain flattening completed: {} bands, {} tiles without elevation",
                   band_info.len(), skipped);

        Ok(FlattenedProduct {
            product: SarProduct {
                metadata: self.metadata.clone(),
                bands: band_info,
                data,
                latitude: Some(self.latitude.clone()),
                longitude: Some(self.longitude.clone()),
            },
            tiles: reports,
        })
    }

    fn compute_tiles(
        &self,
        source: &SarProduct,
        tiles: &[TileRect],
        cancel: &CancellationToken,
    ) -> SarResult<Vec<TileResult>> {
        #[cfg(feature = "parallel")]
        {
            if self.params.enable_parallel && tiles.len() > 1 {
                // Each tile recomputes its own halo; results are stitched afterwards
                return tiles
                    .par_iter()
                    .map(|tile| self.compute_tile_stack(source, tile, cancel))
                    .collect();
            }
        }

        tiles
            .iter()
            .map(|tile| self.compute_tile_stack(source, tile, cancel))
            .collect()
    }
}

/// Raster of a source band, checked against the image size
fn check_band_data<'a>(source: &'a SarProduct, name: &str) -> SarResult<&'a Array2<f32>> {
    let data = source.data.get(name).ok_or_else(|| SarError::Band {
        band: name.to_string(),
        message: "no raster data in source product".to_string(),
    })?;
    let expected = (source.metadata.image_height, source.metadata.image_width);
    if data.dim() != expected {
        return Err(SarError::Band {
            band: name.to_string(),
            message: format!("raster is {:?}, image is {:?}", data.dim(), expected),
        });
    }
    Ok(data)
}
