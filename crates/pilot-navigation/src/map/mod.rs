//! Persistent terrain memory.
//!
//! [`WorldMap`] is the cumulative, process-wide picture of a game map: a
//! sparse grid of cell states plus the portals and ropes seen so far.
//! [`MapStore`] persists it per map id.

pub mod grid;
pub mod store;
pub mod world;

pub use grid::{CellRecord, CellState, GridCell, TerrainFeature, validate_cell_size};
pub use store::{MAP_FORMAT_VERSION, MapStore};
pub use world::{
    ConnectionPoint, MapConfig, NearbyObject, ObjectKind, ObjectRecord, PlatformSpan, RopeSpan, WorldMap,
};
