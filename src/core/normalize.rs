use ndarray::{Array2, ArrayView2, Zip};

use crate::types::{SarComplex, SarError, SarResult};

/// Radiometric quantity carried by a band, parsed from its unit string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    Amplitude,
    Intensity,
    /// Real or imaginary component of a complex sample
    Complex,
    /// Simulated reference area written unchanged
    Ratio,
    Phase,
    Decibel,
}

impl UnitType {
    pub fn from_unit(unit: &str) -> SarResult<Self> {
        let lower = unit.to_lowercase();
        if lower.contains("db") {
            Ok(UnitType::Decibel)
        } else if lower.contains("phase") {
            Ok(UnitType::Phase)
        } else if lower.contains("amplitude") {
            Ok(UnitType::Amplitude)
        } else if lower.contains("intensity") {
            Ok(UnitType::Intensity)
        } else if lower.contains("real") || lower.contains("imaginary") {
            Ok(UnitType::Complex)
        } else if lower.contains("ratio") {
            Ok(UnitType::Ratio)
        } else {
            Err(SarError::InvalidFormat(format!("Unsupported unit: {}", unit)))
        }
    }
}

/// Terrain-flattened value of one sample, or `no_data` where the reference
/// area carries no illumination
pub fn normalize_value(value: f64, reference_area: f64, unit: UnitType, no_data: f64) -> f64 {
    if reference_area == no_data || reference_area == 0.0 || !reference_area.is_finite() {
        return no_data;
    }

    let normalized = match unit {
        UnitType::Amplitude => value * value / reference_area,
        UnitType::Intensity => value / reference_area,
        UnitType::Complex => value / reference_area.sqrt(),
        UnitType::Ratio => reference_area,
        UnitType::Phase | UnitType::Decibel => return no_data,
    };

    if normalized.is_finite() {
        normalized
    } else {
        no_data
    }
}

/// Flatten an I/Q sample; both components scale by `1 / sqrt(reference_area)`
pub fn normalize_complex(sample: SarComplex, reference_area: f64, no_data: f64) -> Option<SarComplex> {
    if reference_area == no_data || !(reference_area > 0.0) || !reference_area.is_finite() {
        return None;
    }
    let scale = (1.0 / reference_area.sqrt()) as f32;
    Some(sample * scale)
}

/// Normalize one tile of a band.
///
/// `source` is `None` for the simulated image, which only needs the
/// reference area. Source samples equal to `source_no_data` stay no-data.
pub fn normalize_tile(
    source: Option<ArrayView2<f32>>,
    reference_area: &Array2<f64>,
    unit: UnitType,
    source_no_data: f64,
    no_data: f64,
) -> Array2<f32> {
    match source {
        Some(source) => {
            let flatten = |&value: &f32, &area: &f64| {
                if value as f64 == source_no_data {
                    no_data as f32
                } else {
                    normalize_value(value as f64, area, unit, no_data) as f32
                }
            };
            let zip = Zip::from(&source).and(reference_area);

            #[cfg(feature = "parallel")]
            let output = zip.par_map_collect(flatten);
            #[cfg(not(feature = "parallel"))]
            let output = zip.map_collect(flatten);
            output
        }
        None => reference_area.mapv(|area| normalize_value(0.0, area, UnitType::Ratio, no_data) as f32),
    }
}

/// Intensity `i^2 + q^2` of a flattened I/Q tile pair.
///
/// A pixel is no-data when either component equals `source_no_data` or the
/// reference area carries no illumination.
pub fn normalize_intensity_tile(
    real: ArrayView2<f32>,
    imaginary: ArrayView2<f32>,
    reference_area: &Array2<f64>,
    source_no_data: f64,
    no_data: f64,
) -> Array2<f32> {
    let intensity = |&i: &f32, &q: &f32, &area: &f64| {
        if i as f64 == source_no_data || q as f64 == source_no_data {
            return no_data as f32;
        }
        match normalize_complex(SarComplex::new(i, q), area, no_data) {
            Some(flattened) if flattened.norm_sqr().is_finite() => flattened.norm_sqr(),
            _ => no_data as f32,
        }
    };
    let zip = Zip::from(&real).and(&imaginary).and(reference_area);

    #[cfg(feature = "parallel")]
    let output = zip.par_map_collect(intensity);
    #[cfg(not(feature = "parallel"))]
    let output = zip.map_collect(intensity);
    output
}
