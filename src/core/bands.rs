use regex::Regex;

use crate::core::normalize::UnitType;
use crate::types::{BandInfo, Polarization, SarError, SarResult};

/// Name of the optional diagnostic band holding the gamma0 reference area
pub const SIMULATED_IMAGE_BAND: &str = "simulatedImage";

const BETA0_PREFIX: &str = "Beta0";

/// Quantity written into a target band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Gamma0,
    Sigma0,
    SimulatedImage,
}

/// Output band and the source band it is computed from
#[derive(Debug, Clone, PartialEq)]
pub struct TargetBand {
    pub name: String,
    pub unit: String,
    pub quantity: Quantity,
    /// `None` for the simulated image
    pub source: Option<String>,
    /// Imaginary band paired with the real `source` band for complex intensity targets
    pub quadrature: Option<String>,
    /// Unit of the source band, which selects the normalization formula
    pub source_unit: UnitType,
}

/// Derive the output bands from the source bands.
///
/// Only `Beta0*` bands are flattened. Phase bands are skipped, dB bands and
/// bands without a unit are rejected. Complex components keep their unit and
/// are named `Gamma0_<source>`; every real band followed by an imaginary band
/// also yields an intensity target named after the polarization. Amplitude
/// and intensity bands become intensity bands named after their polarization.
pub fn derive_target_bands(
    source_bands: &[BandInfo],
    selected: &[String],
    polarizations: &[Polarization],
    output_sigma0: bool,
    output_simulated_image: bool,
) -> SarResult<Vec<TargetBand>> {
    let candidates: Vec<&BandInfo> = if selected.is_empty() {
        source_bands.iter().collect()
    } else {
        selected
            .iter()
            .map(|name| {
                source_bands
                    .iter()
                    .find(|band| &band.name == name)
                    .ok_or_else(|| SarError::Band {
                        band: name.clone(),
                        message: "not found in source product".to_string(),
                    })
            })
            .collect::<SarResult<_>>()?
    };

    let pol_pattern = Regex::new(r"(?i)(?:^|_)(HH|HV|VH|VV)(?:_|$)")
        .map_err(|e| SarError::Processing(format!("Regex error: {}", e)))?;

    let mut targets: Vec<TargetBand> = Vec::new();
    let mut intensities: Vec<TargetBand> = Vec::new();
    let mut pending_real: Option<&BandInfo> = None;
    for band in candidates {
        if !band.name.starts_with(BETA0_PREFIX) {
            log::debug!("Skipping non-beta0 band {}", band.name);
            continue;
        }

        let unit = band.unit.as_deref().ok_or_else(|| SarError::Band {
            band: band.name.clone(),
            message: "band requires a unit".to_string(),
        })?;
        let unit_type = UnitType::from_unit(unit).map_err(|e| SarError::Band {
            band: band.name.clone(),
            message: e.to_string(),
        })?;

        let (gamma0_name, sigma0_name, target_unit) = match unit_type {
            UnitType::Decibel => {
                return Err(SarError::Band {
                    band: band.name.clone(),
                    message: "terrain flattening of bands in dB is not supported".to_string(),
                });
            }
            UnitType::Phase => continue,
            UnitType::Complex => {
                if unit.to_lowercase().contains("real") {
                    pending_real = Some(band);
                } else if let Some(real) = pending_real.take() {
                    let pol = band_polarization(&pol_pattern, &real.name, polarizations);
                    let mut quantities = vec![(Quantity::Gamma0, "Gamma0")];
                    if output_sigma0 {
                        quantities.push((Quantity::Sigma0, "Sigma0"));
                    }
                    for (quantity, prefix) in quantities {
                        intensities.push(TargetBand {
                            name: match &pol {
                                Some(pol) => format!("{}_{}", prefix, pol),
                                None => prefix.to_string(),
                            },
                            unit: "intensity".to_string(),
                            quantity,
                            source: Some(real.name.clone()),
                            quadrature: Some(band.name.clone()),
                            source_unit: UnitType::Complex,
                        });
                    }
                }
                (format!("Gamma0_{}", band.name), format!("Sigma0_{}", band.name), unit.to_string())
            }
            UnitType::Amplitude | UnitType::Intensity => {
                match band_polarization(&pol_pattern, &band.name, polarizations) {
                    Some(pol) => (format!("Gamma0_{}", pol), format!("Sigma0_{}", pol), "intensity".to_string()),
                    None => ("Gamma0".to_string(), "Sigma0".to_string(), "intensity".to_string()),
                }
            }
            UnitType::Ratio => {
                return Err(SarError::Band {
                    band: band.name.clone(),
                    message: format!("unsupported unit for terrain flattening: {}", unit),
                });
            }
        };

        let mut push = |name: String, quantity: Quantity| {
            if targets.iter().all(|t| t.name != name) {
                targets.push(TargetBand {
                    name,
                    unit: target_unit.clone(),
                    quantity,
                    source: Some(band.name.clone()),
                    quadrature: None,
                    source_unit: unit_type,
                });
            }
        };
        push(gamma0_name, Quantity::Gamma0);
        if output_sigma0 {
            push(sigma0_name, Quantity::Sigma0);
        }
    }

    if targets.is_empty() {
        return Err(SarError::Configuration(
            "Terrain flattening requires beta0 bands as input".to_string(),
        ));
    }

    for intensity in intensities {
        if targets.iter().all(|t| t.name != intensity.name) {
            targets.push(intensity);
        }
    }

    if output_simulated_image {
        targets.push(TargetBand {
            name: SIMULATED_IMAGE_BAND.to_string(),
            unit: "Ratio".to_string(),
            quantity: Quantity::SimulatedImage,
            source: None,
            quadrature: None,
            source_unit: UnitType::Ratio,
        });
    }

    Ok(targets)
}

/// Polarization from the band name, or the only polarization of a single-pol product
fn band_polarization(pattern: &Regex, band_name: &str, polarizations: &[Polarization]) -> Option<String> {
    if let Some(captures) = pattern.captures(band_name) {
        return captures.get(1).map(|m| m.as_str().to_uppercase());
    }
    match polarizations {
        [single] => Some(single.to_string()),
        _ => None,
    }
}
