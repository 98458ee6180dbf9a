//! World model and path planning for the platformer pilot.
//!
//! Data flows one way each frame: detector records are normalised in
//! [`detection`], turned into collision boxes ([`collision`]) and a fresh
//! quadtree ([`spatial`]), and folded into the persistent [`map::WorldMap`].
//! The [`planner`] then searches the affordance-aware grid derived from that
//! map. [`frame::ingest_frame`] ties the per-frame steps together.

pub mod collision;
pub mod detection;
pub mod error;
pub mod frame;
pub mod frontier;
pub mod map;
pub mod planner;
pub mod spatial;

pub use collision::{BoxKind, CollisionBox, CollisionConfig, CollisionSystem, Facing, GapProbe};
pub use detection::{Detection, DetectionClass, RawDetection};
pub use error::NavigationError;
pub use frame::{FrameSnapshot, IndexConfig, IngestConfig, ingest_frame};
pub use map::{CellState, GridCell, MapConfig, MapStore, WorldMap};
pub use planner::{Action, PathPlanner, PathResult, PlannerConfig, Waypoint};
pub use spatial::{IndexStats, IndexedPoint, SpatialIndex};
