//! terraflat: radiometric terrain flattening for SAR backscatter
//!
//! Simulates the illuminated ground area of every radar pixel against a
//! digital elevation model and normalises calibrated beta0 bands into
//! terrain-flattened gamma0 (and optionally sigma0), following the area
//! integration approach of Small (2011).

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BandInfo, Polarization, PosVector, SarError, SarMetadata, SarProduct, SarRealImage,
    SarResult, SrgrCoefficients, StateVector,
};

pub use io::{DemGrid, DemResampling, ElevationSource, TiePointGrid, TiePointLookup};

pub use crate::core::{
    CancellationToken, FlattenedProduct, TerrainFlattener, TerrainFlatteningParams, TileOutcome,
    TileRect,
};
