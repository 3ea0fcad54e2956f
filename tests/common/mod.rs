//! Synthetic acquisition used by the integration tests.
//!
//! The sensor flies a straight line parallel to the z axis at 700 km above
//! the equatorial ellipsoid radius. Line `y` is acquired at `y * dt`, and the
//! ground imaged there lies in the plane `z = v * y * dt`, so every ground
//! point is broadside to the sensor exactly at its own line. Column `x` sits
//! at a known slant range, which makes the expected radar coordinates of
//! every pixel exact.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ndarray::Array2;

use terraflat::core::geometry::{
    ecef_to_geodetic, geodetic_to_ecef, polynomial_value, WGS84_A, WGS84_F,
};
use terraflat::{
    BandInfo, ElevationSource, Polarization, PosVector, SarMetadata, SarProduct,
    SrgrCoefficients, StateVector, TiePointLookup,
};

pub const WIDTH: usize = 40;
pub const HEIGHT: usize = 30;
pub const LINE_TIME_INTERVAL: f64 = 0.1;
pub const VELOCITY: f64 = 7000.0;
pub const ALTITUDE: f64 = 700_000.0;
pub const NEAR_RANGE: f64 = 850_000.0;
pub const RANGE_SPACING: f64 = 100.0;
pub const AZIMUTH_SPACING: f64 = VELOCITY * LINE_TIME_INTERVAL;
pub const BACKSCATTER: f32 = 0.25;

/// Slant range polynomial of the ground range variant, in ground meters
pub const SRGR: [f64; 3] = [NEAR_RANGE, 0.6, 2.0e-8];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeModel {
    Slant,
    Ground,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub mission: String,
    pub pass: String,
    pub range_model: RangeModel,
    /// Near range on the right: column 0 is the far edge
    pub mirrored: bool,
    /// Lines by which the geolocation grids disagree with the orbit
    pub row_shift: f64,
    /// Ground range of the first column in the SRGR metadata
    pub ground_range_origin: f64,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            mission: "SENTINEL-1A".to_string(),
            pass: "ASCENDING".to_string(),
            range_model: RangeModel::Slant,
            mirrored: false,
            row_shift: 0.0,
            ground_range_origin: 0.0,
        }
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn first_line_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2020-01-03T17:08:15Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn at_seconds(seconds: f64) -> DateTime<Utc> {
    first_line_time() + Duration::microseconds((seconds * 1.0e6).round() as i64)
}

pub fn sensor_height() -> f64 {
    WGS84_A + ALTITUDE
}

pub fn state_vectors() -> Vec<StateVector> {
    (-5..=8)
        .map(|k| {
            let t = k as f64;
            StateVector {
                time: at_seconds(t),
                position: [sensor_height(), 0.0, VELOCITY * t],
                velocity: [0.0, 0.0, VELOCITY],
            }
        })
        .collect()
}

pub fn sensor_position(row: f64) -> PosVector {
    PosVector::new(sensor_height(), 0.0, VELOCITY * row * LINE_TIME_INTERVAL)
}

impl Scene {
    /// Slant range of continuous image column `col`
    pub fn slant_range(&self, col: f64) -> f64 {
        let col = if self.mirrored { (WIDTH - 1) as f64 - col } else { col };
        match self.range_model {
            RangeModel::Slant => NEAR_RANGE + col * RANGE_SPACING,
            RangeModel::Ground => polynomial_value(col * RANGE_SPACING, &SRGR),
        }
    }

    /// Point on the ellipsoid imaged at continuous pixel `(col, row)`
    pub fn ground_point(&self, col: f64, row: f64) -> PosVector {
        let b = WGS84_A * (1.0 - WGS84_F);
        let z = VELOCITY * row * LINE_TIME_INTERVAL;
        let rho2 = WGS84_A * WGS84_A * (1.0 - z * z / (b * b));
        let h = sensor_height();
        let range = self.slant_range(col);

        let x = (h * h + rho2 - range * range) / (2.0 * h);
        let y = (rho2 - x * x).sqrt();
        PosVector::new(x, y, z)
    }

    fn geolocation(&self) -> (Arc<dyn TiePointLookup>, Arc<dyn TiePointLookup>) {
        let lat_scene = self.clone();
        let lon_scene = self.clone();
        let latitude = move |x: f64, y: f64| {
            let p = lat_scene.ground_point(x - 0.5, y - 0.5 + lat_scene.row_shift);
            ecef_to_geodetic(&p).0
        };
        let longitude = move |x: f64, y: f64| {
            let p = lon_scene.ground_point(x - 0.5, y - 0.5 + lon_scene.row_shift);
            ecef_to_geodetic(&p).1
        };
        let latitude: Arc<dyn TiePointLookup> = Arc::new(latitude);
        let longitude: Arc<dyn TiePointLookup> = Arc::new(longitude);
        (latitude, longitude)
    }

    pub fn metadata(&self) -> SarMetadata {
        let srgr_flag = self.range_model == RangeModel::Ground;
        let last_line = (HEIGHT - 1) as f64 * LINE_TIME_INTERVAL;
        let srgr_coefficients = if srgr_flag {
            // SRGR evaluated at g - origin, expanded in absolute ground range g
            let o = self.ground_range_origin;
            let shifted = vec![
                SRGR[0] - SRGR[1] * o + SRGR[2] * o * o,
                SRGR[1] - 2.0 * SRGR[2] * o,
                SRGR[2],
            ];
            [0.0, last_line]
                .iter()
                .map(|&t| SrgrCoefficients {
                    time: at_seconds(t),
                    ground_range_origin: o,
                    coefficients: shifted.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        SarMetadata {
            product_name: "SYNTHETIC_FLAT_SCENE".to_string(),
            mission: self.mission.clone(),
            pass: self.pass.clone(),
            polarizations: vec![Polarization::VV],
            image_width: WIDTH,
            image_height: HEIGHT,
            srgr_flag,
            range_spacing: RANGE_SPACING,
            azimuth_spacing: AZIMUTH_SPACING,
            slant_range_to_first_pixel: NEAR_RANGE,
            srgr_coefficients,
            first_line_time: first_line_time(),
            last_line_time: at_seconds(last_line),
            line_time_interval: LINE_TIME_INTERVAL,
            radar_frequency: 5405.0,
            orbit_state_vectors: state_vectors(),
            calibrated: true,
            map_projected: false,
            attributes: BTreeMap::new(),
        }
    }

    /// Calibrated product with one constant beta0 intensity band
    pub fn product(&self) -> SarProduct {
        let (latitude, longitude) = self.geolocation();
        let mut data = HashMap::new();
        data.insert(
            "Beta0_VV".to_string(),
            Array2::from_elem((HEIGHT, WIDTH), BACKSCATTER),
        );

        SarProduct {
            metadata: self.metadata(),
            bands: vec![BandInfo {
                name: "Beta0_VV".to_string(),
                unit: Some("intensity".to_string()),
                no_data_value: 0.0,
            }],
            data,
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }
}

/// Product with one complex beta0 pair, `i = 0.3` and `q = 0.4`, whose
/// intensity is `BACKSCATTER`
pub fn complex_product(scene: &Scene) -> SarProduct {
    let mut product = scene.product();
    product.data.clear();
    product.bands.clear();
    for (name, unit, value) in [("Beta0_i_VV", "real", 0.3f32), ("Beta0_q_VV", "imaginary", 0.4)] {
        product
            .data
            .insert(name.to_string(), Array2::from_elem((HEIGHT, WIDTH), value));
        product.bands.push(BandInfo {
            name: name.to_string(),
            unit: Some(unit.to_string()),
            no_data_value: 0.0,
        });
    }
    product
}

/// Ridge running along azimuth. Heights are set by the slant-range column
/// `c` of the ellipsoid point: rising linearly from column 5 to 1000 m at
/// column 20.5, then dropping to zero. The far side lies in radar shadow
/// until about column 25.
pub fn ridge_dem() -> Arc<dyn ElevationSource> {
    Arc::new(|lat: f64, lon: f64| {
        let point = geodetic_to_ecef(lat, lon, 0.0);
        let sensor = PosVector::new(sensor_height(), 0.0, point.z);
        let col = (point.distance(&sensor) - NEAR_RANGE) / RANGE_SPACING;
        let height = if (5.0..=20.5).contains(&col) {
            1000.0 * (col - 5.0) / 15.5
        } else {
            0.0
        };
        Some(height)
    })
}

/// Flat terrain at the ellipsoid
pub fn flat_dem() -> Arc<dyn ElevationSource> {
    Arc::new(|_lat: f64, _lon: f64| Some(0.0))
}
