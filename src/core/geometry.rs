//! Geometry kernels: WGS84 conversions, zero-Doppler solving, slant range,
//! elevation angle and radar image coordinates.

use crate::core::orbit::{seconds_since, Orbit};
use crate::types::{PosVector, SarError, SarMetadata, SarResult, SPEED_OF_LIGHT};

/// WGS84 semi-major axis (m)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Convert geodetic latitude/longitude (degrees) and ellipsoid height (m) to ECEF
pub fn geodetic_to_ecef(lat: f64, lon: f64, height: f64) -> PosVector {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let (sin_lat, cos_lat) = lat_rad.sin_cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    PosVector::new(
        (n + height) * cos_lat * lon_rad.cos(),
        (n + height) * cos_lat * lon_rad.sin(),
        (n * (1.0 - WGS84_E2) + height) * sin_lat,
    )
}

/// Convert ECEF to geodetic (latitude, longitude, height)
pub fn ecef_to_geodetic(point: &PosVector) -> (f64, f64, f64) {
    let p = (point.x * point.x + point.y * point.y).sqrt();
    let lon = point.y.atan2(point.x);

    let mut lat = point.z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..8 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        lat = (point.z + WGS84_E2 * n * sin_lat).atan2(p);
    }

    let (sin_lat, cos_lat) = lat.sin_cos();
    let height = p * cos_lat + point.z * sin_lat
        - WGS84_A * (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    (lat.to_degrees(), lon.to_degrees(), height)
}

/// Doppler frequency (Hz) of a ground point seen from the sensor
pub fn doppler_frequency(
    earth_point: &PosVector,
    sensor_position: &PosVector,
    sensor_velocity: &PosVector,
    wavelength: f64,
) -> f64 {
    let look = *earth_point - *sensor_position;
    let distance = look.norm();
    2.0 * sensor_velocity.dot(&look) / (distance * wavelength)
}

/// Zero-Doppler time (seconds after the first line) of a ground point.
///
/// Brackets the sign change of the Doppler frequency over the cached image
/// lines by bisection and interpolates linearly between the bracketing lines.
/// Returns `None` when the point is not broadside to the sensor at any line.
pub fn zero_doppler_time(earth_point: &PosVector, orbit: &Orbit, wavelength: f64) -> Option<f64> {
    let num_lines = orbit.num_lines();
    if num_lines < 2 {
        return None;
    }

    let frequency = |line: usize| {
        doppler_frequency(
            earth_point,
            &orbit.line_position(line),
            &orbit.line_velocity(line),
            wavelength,
        )
    };

    let mut lower = 0;
    let mut upper = num_lines - 1;
    let mut lower_freq = frequency(lower);
    let mut upper_freq = frequency(upper);
    if !lower_freq.is_finite() || !upper_freq.is_finite() || lower_freq * upper_freq > 0.0 {
        return None;
    }

    while upper - lower > 1 {
        let mid = (lower + upper) / 2;
        let mid_freq = frequency(mid);
        if mid_freq * lower_freq > 0.0 {
            lower = mid;
            lower_freq = mid_freq;
        } else {
            upper = mid;
            upper_freq = mid_freq;
        }
    }

    let line = if upper_freq == lower_freq {
        lower as f64
    } else {
        lower as f64 - lower_freq * (upper - lower) as f64 / (upper_freq - lower_freq)
    };

    Some(line * orbit.line_time_interval())
}

/// Distance from the sensor at `time` to the ground point, with the sensor position
pub fn slant_range(time: f64, orbit: &Orbit, earth_point: &PosVector) -> SarResult<(f64, PosVector)> {
    let sensor_position = orbit.position_at(time)?;
    Ok((sensor_position.distance(earth_point), sensor_position))
}

/// Angle (degrees) at the sensor between nadir and the line of sight
pub fn elevation_angle(slant_range: f64, earth_point: &PosVector, sensor_position: &PosVector) -> f64 {
    let h2 = sensor_position.norm_squared();
    let r2 = earth_point.norm_squared();
    let cos_angle = (slant_range * slant_range + h2 - r2) / (2.0 * slant_range * h2.sqrt());
    cos_angle.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Evaluate `c0 + c1*x + c2*x^2 + ...`
pub fn polynomial_value(x: f64, coefficients: &[f64]) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Ground range (m) whose polynomial slant range matches `slant_range`,
/// searched over the swath `[origin, origin + width * spacing]`. `None`
/// outside the swath.
pub fn ground_range_from_slant_range(
    image_width: usize,
    ground_range_spacing: f64,
    slant_range: f64,
    coefficients: &[f64],
    ground_range_origin: f64,
) -> Option<f64> {
    let mut lower = ground_range_origin;
    let mut upper = ground_range_origin + image_width as f64 * ground_range_spacing;
    let lower_range = polynomial_value(lower, coefficients);
    let upper_range = polynomial_value(upper, coefficients);
    if !(slant_range >= lower_range && slant_range <= upper_range) {
        return None;
    }

    for _ in 0..100 {
        let mid = 0.5 * (lower + upper);
        let diff = polynomial_value(mid, coefficients) - slant_range;
        if diff.abs() < 1.0e-4 || upper - lower < 1.0e-6 {
            return Some(mid);
        }
        if diff < 0.0 {
            lower = mid;
        } else {
            upper = mid;
        }
    }
    Some(0.5 * (lower + upper))
}

/// SRGR polynomial with its validity start time in seconds after the first line
#[derive(Debug, Clone)]
pub struct SrgrPolynomial {
    pub time: f64,
    pub ground_range_origin: f64,
    pub coefficients: Vec<f64>,
}

/// How slant range maps onto image columns
#[derive(Debug, Clone)]
pub enum RangeConversion {
    /// Slant range products: columns are equidistant in slant range
    SlantRange { near_edge_slant_range: f64 },
    /// Ground range products: columns are equidistant in ground range
    GroundRange { polynomials: Vec<SrgrPolynomial> },
}

/// Mission-specific geometry conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mission {
    Sentinel1,
    Radarsat2,
    CosmoSkymed,
    TerraSarX,
    Other,
}

impl Mission {
    pub fn from_name(name: &str) -> Self {
        let name = name.to_uppercase();
        if name.contains("SENTINEL") {
            Mission::Sentinel1
        } else if name == "RS2" {
            Mission::Radarsat2
        } else if name.contains("CSKS") {
            Mission::CosmoSkymed
        } else if name.contains("TSX") {
            Mission::TerraSarX
        } else {
            Mission::Other
        }
    }
}

/// Behaviour switches resolved once per product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionProfile {
    pub mission: Mission,
    /// Zero-Doppler times are already referenced to the bistatic midpoint
    pub skip_bistatic_correction: bool,
    /// Near range is at column 0 (false: image is mirrored in range)
    pub near_range_on_left: bool,
}

impl MissionProfile {
    pub fn resolve(mission: &str, pass: &str) -> Self {
        let mission = Mission::from_name(mission);
        let skip_bistatic_correction = mission != Mission::Other;
        let near_range_on_left =
            !(mission == Mission::Radarsat2 && pass.to_uppercase().contains("DESCENDING"));

        Self {
            mission,
            skip_bistatic_correction,
            near_range_on_left,
        }
    }
}

/// Zero-Doppler solution for one ground point
#[derive(Debug, Clone, Copy)]
pub struct ZeroDopplerSolution {
    /// Seconds after the first line
    pub time: f64,
    pub slant_range: f64,
    pub sensor_position: PosVector,
}

/// Acquisition geometry of a product: orbit, timing, range sampling, mission
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    pub orbit: Orbit,
    pub wavelength: f64,
    pub range_spacing: f64,
    pub azimuth_spacing: f64,
    pub image_width: usize,
    pub image_height: usize,
    /// Last line time in seconds after the first line
    pub last_line_time: f64,
    pub range_conversion: RangeConversion,
    pub mission: MissionProfile,
}

impl SceneGeometry {
    pub fn from_metadata(metadata: &SarMetadata) -> SarResult<Self> {
        let wavelength = metadata.wavelength()?;

        if !(metadata.range_spacing > 0.0 && metadata.azimuth_spacing > 0.0) {
            return Err(SarError::Metadata(format!(
                "Invalid pixel spacing: range {} m, azimuth {} m",
                metadata.range_spacing, metadata.azimuth_spacing
            )));
        }
        if metadata.image_width == 0 || metadata.image_height == 0 {
            return Err(SarError::Metadata("Empty image raster".to_string()));
        }

        let orbit = Orbit::new(
            &metadata.orbit_state_vectors,
            metadata.first_line_time,
            metadata.line_time_interval,
            metadata.image_height,
        )?;

        let range_conversion = if metadata.srgr_flag {
            if metadata.srgr_coefficients.is_empty() {
                return Err(SarError::Metadata(
                    "Ground range product without SRGR coefficients".to_string(),
                ));
            }
            let mut polynomials: Vec<SrgrPolynomial> = metadata
                .srgr_coefficients
                .iter()
                .map(|c| SrgrPolynomial {
                    time: seconds_since(metadata.first_line_time, c.time),
                    ground_range_origin: c.ground_range_origin,
                    coefficients: c.coefficients.clone(),
                })
                .collect();
            polynomials.sort_by(|a, b| a.time.total_cmp(&b.time));
            RangeConversion::GroundRange { polynomials }
        } else {
            if !(metadata.slant_range_to_first_pixel > 0.0) {
                return Err(SarError::Metadata(format!(
                    "Invalid slant range to first pixel: {}", metadata.slant_range_to_first_pixel
                )));
            }
            RangeConversion::SlantRange {
                near_edge_slant_range: metadata.slant_range_to_first_pixel,
            }
        };

        let mission = MissionProfile::resolve(&metadata.mission, &metadata.pass);
        log::debug!("Mission profile: {:?}", mission);

        Ok(Self {
            orbit,
            wavelength,
            range_spacing: metadata.range_spacing,
            azimuth_spacing: metadata.azimuth_spacing,
            image_width: metadata.image_width,
            image_height: metadata.image_height,
            last_line_time: seconds_since(metadata.first_line_time, metadata.last_line_time),
            range_conversion,
            mission,
        })
    }

    /// Radar brightness reference area of one resolution cell
    pub fn beta0(&self) -> f64 {
        self.azimuth_spacing * self.range_spacing
    }

    /// Zero-Doppler time and slant range of a ground point, with the one-step
    /// bistatic correction applied unless the mission already accounts for it
    pub fn locate(&self, earth_point: &PosVector) -> Option<ZeroDopplerSolution> {
        let mut time = zero_doppler_time(earth_point, &self.orbit, self.wavelength)?;
        let (mut range, mut sensor_position) = slant_range(time, &self.orbit, earth_point).ok()?;

        if !self.mission.skip_bistatic_correction {
            time += range / SPEED_OF_LIGHT;
            (range, sensor_position) = slant_range(time, &self.orbit, earth_point).ok()?;
        }

        Some(ZeroDopplerSolution {
            time,
            slant_range: range,
            sensor_position,
        })
    }

    /// Fractional image line of a zero-Doppler time
    pub fn azimuth_index(&self, time: f64) -> f64 {
        self.orbit.azimuth_index(time)
    }

    /// Fractional image column of a slant range at a zero-Doppler time.
    ///
    /// `None` when the time lies outside the image, the range falls outside
    /// the swath, or the index is not strictly positive. Mirrored for
    /// products with near range on the right.
    pub fn range_index(&self, time: f64, slant_range: f64) -> Option<f64> {
        if time < self.last_line_time.min(0.0) || time > self.last_line_time.max(0.0) {
            return None;
        }

        let index = match &self.range_conversion {
            RangeConversion::SlantRange { near_edge_slant_range } => {
                (slant_range - near_edge_slant_range) / self.range_spacing
            }
            RangeConversion::GroundRange { polynomials } => {
                let (origin, coefficients) = Self::srgr_at(polynomials, time);
                let ground_range = ground_range_from_slant_range(
                    self.image_width,
                    self.range_spacing,
                    slant_range,
                    &coefficients,
                    origin,
                )?;
                (ground_range - origin) / self.range_spacing
            }
        };

        if !(index > 0.0) {
            return None;
        }

        if self.mission.near_range_on_left {
            Some(index)
        } else {
            Some(self.image_width as f64 - 1.0 - index)
        }
    }

    /// Ground range origin and SRGR coefficients at `time`. Coefficients are
    /// interpolated linearly between the bracketing sets, the origin is
    /// taken from the earlier set.
    fn srgr_at(polynomials: &[SrgrPolynomial], time: f64) -> (f64, Vec<f64>) {
        if polynomials.len() == 1 {
            return (polynomials[0].ground_range_origin, polynomials[0].coefficients.clone());
        }

        let mut idx = polynomials
            .iter()
            .rposition(|p| time >= p.time)
            .unwrap_or(0);
        if idx == polynomials.len() - 1 {
            idx -= 1;
        }

        let (a, b) = (&polynomials[idx], &polynomials[idx + 1]);
        let mu = (time - a.time) / (b.time - a.time);
        // Missing higher order terms are zero
        let order = a.coefficients.len().max(b.coefficients.len());
        let coefficients = (0..order)
            .map(|i| {
                let ca = a.coefficients.get(i).copied().unwrap_or(0.0);
                let cb = b.coefficients.get(i).copied().unwrap_or(0.0);
                ca + mu * (cb - ca)
            })
            .collect();
        (a.ground_range_origin, coefficients)
    }
}
