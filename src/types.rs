use chrono::{DateTime, Utc};
use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

use crate::io::TiePointLookup;

/// Complex-valued SAR sample (I + jQ)
pub type SarComplex = Complex<f32>;

/// Real-valued intensity or amplitude sample
pub type SarReal = f32;

/// 2D real SAR data array (azimuth x range)
pub type SarRealImage = Array2<SarReal>;

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Earth-centred, earth-fixed position or direction in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PosVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PosVector {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn dot(&self, other: &PosVector) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm_squared(&self) -> f64 {
        self.dot(self)
    }

    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Unit vector in the same direction; the zero vector is returned unchanged
    pub fn normalized(&self) -> PosVector {
        let magnitude = self.norm();
        if magnitude > 0.0 {
            *self * (1.0 / magnitude)
        } else {
            *self
        }
    }

    pub fn distance(&self, other: &PosVector) -> f64 {
        (*self - *other).norm()
    }
}

impl Add for PosVector {
    type Output = PosVector;

    fn add(self, rhs: PosVector) -> PosVector {
        PosVector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for PosVector {
    type Output = PosVector;

    fn sub(self, rhs: PosVector) -> PosVector {
        PosVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for PosVector {
    type Output = PosVector;

    fn mul(self, rhs: f64) -> PosVector {
        PosVector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Polarization modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl std::str::FromStr for Polarization {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(SarError::InvalidFormat(format!("Invalid polarization: {}", s))),
        }
    }
}

/// Orbit state vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVector {
    pub time: DateTime<Utc>,
    pub position: [f64; 3],  // [x, y, z] in meters
    pub velocity: [f64; 3],  // [vx, vy, vz] in m/s
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// Slant range to ground range conversion polynomial valid from `time` onwards.
///
/// The polynomial maps ground range to slant range:
/// `sr = c0 + c1*g + c2*g^2 + ...`. The first image column lies at
/// `g = ground_range_origin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrgrCoefficients {
    pub time: DateTime<Utc>,
    pub ground_range_origin: f64,
    pub coefficients: Vec<f64>,
}

/// Abstracted product metadata consumed by the terrain flattening engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarMetadata {
    // Product identification
    pub product_name: String,
    pub mission: String,
    /// ASCENDING or DESCENDING
    pub pass: String,
    pub polarizations: Vec<Polarization>,

    // Raster geometry
    pub image_width: usize,
    pub image_height: usize,
    /// True for ground range detected products
    pub srgr_flag: bool,
    pub range_spacing: f64,    // meters
    pub azimuth_spacing: f64,  // meters
    pub slant_range_to_first_pixel: f64,  // meters
    pub srgr_coefficients: Vec<SrgrCoefficients>,

    // Timing
    pub first_line_time: DateTime<Utc>,
    pub last_line_time: DateTime<Utc>,
    pub line_time_interval: f64,  // seconds

    /// Radar carrier frequency in MHz
    pub radar_frequency: f64,
    pub orbit_state_vectors: Vec<StateVector>,

    // Processing state
    pub calibrated: bool,
    pub map_projected: bool,

    /// Free-form attributes written by processors
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SarMetadata {
    /// Radar wavelength in meters
    pub fn wavelength(&self) -> SarResult<f64> {
        if !(self.radar_frequency > 0.0) {
            return Err(SarError::Metadata(format!(
                "Invalid radar frequency: {} MHz", self.radar_frequency
            )));
        }
        Ok(SPEED_OF_LIGHT / (self.radar_frequency * 1.0e6))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl ToString) {
        self.attributes.insert(name.to_string(), value.to_string());
    }
}

/// Band description: name, declared unit and no-data value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandInfo {
    pub name: String,
    pub unit: Option<String>,
    pub no_data_value: f64,
}

/// Decoded SAR product: metadata, band rasters and geolocation tie point grids
#[derive(Clone)]
pub struct SarProduct {
    pub metadata: SarMetadata,
    pub bands: Vec<BandInfo>,
    pub data: HashMap<String, SarRealImage>,
    pub latitude: Option<Arc<dyn TiePointLookup>>,
    pub longitude: Option<Arc<dyn TiePointLookup>>,
}

impl std::fmt::Debug for SarProduct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SarProduct")
            .field("product_name", &self.metadata.product_name)
            .field("bands", &self.bands)
            .field("has_latitude", &self.latitude.is_some())
            .field("has_longitude", &self.longitude.is_some())
            .finish()
    }
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Band '{band}': {message}")]
    Band { band: String, message: String },

    #[error("DEM '{dem}': {message}")]
    Dem { dem: String, message: String },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
