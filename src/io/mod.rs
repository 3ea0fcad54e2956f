//! Collaborator contracts and adapters: elevation models and geolocation grids

pub mod dem;
pub mod tie_point;

pub use dem::{DemGrid, DemResampling, ElevationSource};
pub use tie_point::{TiePointGrid, TiePointLookup};
