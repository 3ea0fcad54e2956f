//! Terrain flattening engine

pub mod bands;
pub mod dem_window;
pub mod geometry;
pub mod illumination;
pub mod normalize;
pub mod orbit;
pub mod terrain_flatten;
pub mod tile_overlap;
pub mod tiling;

pub use geometry::{MissionProfile, SceneGeometry};
pub use orbit::Orbit;
pub use terrain_flatten::{
    FlattenedProduct, TerrainFlattener, TerrainFlatteningParams, TileOutcome, TileReport,
    TileResult,
};
pub use tiling::{CancellationToken, TileRect};
