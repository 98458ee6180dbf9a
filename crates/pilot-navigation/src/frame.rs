//! One detection cycle, from raw records to an immutable snapshot.

use pilot_geometry::{Aabb, CoordinateTransform, Point2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::collision::{BoxKind, CollisionConfig, CollisionSystem};
use crate::detection::{DEFAULT_MIN_CONFIDENCE, Detection, RawDetection, normalize_detections};
use crate::error::NavigationError;
use crate::map::{ObjectKind, TerrainFeature, WorldMap};
use crate::spatial::{IndexedPoint, SpatialIndex};

/// Bounds and shape of the per-frame spatial index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub capacity: usize,
    pub max_depth: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_x: -8192.0,
            min_y: -8192.0,
            max_x: 8192.0,
            max_y: 8192.0,
            capacity: 8,
            max_depth: 8,
        }
    }
}

impl IndexConfig {
    pub fn boundary(&self) -> Aabb {
        Aabb::from_corners(Point2::new(self.min_x, self.min_y), Point2::new(self.max_x, self.max_y))
    }
}

/// Everything [`ingest_frame`] needs besides the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub collision: CollisionConfig,
    pub index: IndexConfig,
    /// Detections at or below this confidence are discarded.
    pub min_confidence: f32,
    /// Write the top edge of platform detections into the map as `Platform` cells.
    pub mark_platforms: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::new(CollisionConfig::default(), IndexConfig::default())
    }
}

impl IngestConfig {
    pub fn new(collision: CollisionConfig, index: IndexConfig) -> Self {
        Self {
            collision,
            index,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            mark_platforms: true,
        }
    }
}

/// Collision boxes and spatial index of a single frame.
///
/// Built once, then shared read-only; the next frame replaces it whole.
#[derive(Debug)]
pub struct FrameSnapshot {
    pub frame_id: u64,
    pub collision: CollisionSystem,
    /// Detections keyed by world-space center.
    pub index: SpatialIndex<Detection>,
}

impl FrameSnapshot {
    /// Snapshot with no detections, used before the first frame arrives.
    pub fn empty(config: &IngestConfig) -> Result<Self, NavigationError> {
        Ok(Self {
            frame_id: 0,
            collision: CollisionSystem::new(config.collision),
            index: SpatialIndex::new(config.index.boundary(), config.index.capacity, config.index.max_depth)?,
        })
    }

    pub fn player_position(&self) -> Option<Point2> {
        self.collision.player_position()
    }
}

/// Turns one frame of raw detections into a snapshot and folds what it
/// reveals into `world`.
///
/// Records the player position as explored, stores seen portals and ropes
/// and, if enabled, platform top edges. Detections the transform rejects or
/// that fall outside the index bounds are skipped.
pub fn ingest_frame(
    world: &mut WorldMap,
    frame_id: u64,
    raw: Vec<RawDetection>,
    transform: &dyn CoordinateTransform,
    config: &IngestConfig,
) -> Result<FrameSnapshot, NavigationError> {
    let detections = normalize_detections(raw, config.min_confidence);

    let mut collision = CollisionSystem::new(config.collision);
    collision.rebuild(&detections, transform);

    let mut index = SpatialIndex::new(config.index.boundary(), config.index.capacity, config.index.max_depth)?;
    let mut dropped = 0usize;
    for detection in &detections {
        let Some(center) = transform.screen_to_world(detection.center()) else {
            dropped += 1;
            continue;
        };
        if !index.insert(IndexedPoint::new(center, detection.clone())) {
            dropped += 1;
        }
    }

    if let Some(player) = collision.player_position() {
        world.mark_explored(player);
    }
    for b in collision.boxes() {
        match b.kind {
            BoxKind::Portal => world.add_object(ObjectKind::Portal, b.center(), None),
            BoxKind::Rope => world.add_object(ObjectKind::Rope, b.center(), None),
            BoxKind::Platform if config.mark_platforms => mark_platform_edge(world, &b.footprint),
            _ => {}
        }
    }

    if dropped > 0 {
        debug!(frame_id, dropped, "detections left out of the spatial index");
    }
    trace!(frame_id, detections = detections.len(), indexed = index.len(), "frame ingested");

    Ok(FrameSnapshot {
        frame_id,
        collision,
        index,
    })
}

/// Marks every cell along the top edge of `footprint` as platform.
fn mark_platform_edge(world: &mut WorldMap, footprint: &Aabb) {
    let first = world.cell_of(footprint.min);
    let last = world.cell_of(Point2::new(footprint.max.x, footprint.min.y));
    let size = world.cell_size();
    for x in first.x..=last.x {
        let center = Point2::new((x as f64 + 0.5) * size, footprint.min.y);
        world.mark_terrain(center, TerrainFeature::Platform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{CellState, GridCell, MapConfig};
    use pilot_geometry::LinearTransform;

    fn raw(class: &str, bbox: [f64; 4]) -> RawDetection {
        RawDetection {
            class_name: class.to_string(),
            bbox,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_ingest_updates_map_and_builds_snapshot() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        let transform = LinearTransform::new(2.0, 2.0, Point2::new(0.0, 0.0)).unwrap();
        let frame = vec![
            raw("minimap_player", [10.0, 10.0, 20.0, 20.0]),
            raw("minimap_portal", [100.0, 10.0, 110.0, 20.0]),
            raw("climbable_object", [50.0, 0.0, 52.0, 40.0]),
            raw("monster", [70.0, 10.0, 80.0, 20.0]),
            raw("platform", [0.0, 40.0, 60.0, 42.0]),
        ];
        let snapshot = ingest_frame(&mut world, 3, frame, &transform, &IngestConfig::default()).unwrap();

        assert_eq!(snapshot.frame_id, 3);
        assert_eq!(snapshot.player_position(), Some(Point2::new(30.0, 30.0)));
        assert_eq!(snapshot.index.len(), 5);
        assert!(world.is_explored(Point2::new(30.0, 30.0)));
        assert_eq!(world.portals().len(), 1);
        assert_eq!(world.ropes().len(), 1);
        // Platform top edge at world y = 80 spans x 0..120: cells 0, 1 and 2.
        for x in 0..=2 {
            assert_eq!(world.state(GridCell::new(x, 1)), Some(CellState::Platform));
        }
    }

    #[test]
    fn test_out_of_bounds_detections_skip_index_only() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        let config = IngestConfig {
            index: IndexConfig {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 100.0,
                max_y: 100.0,
                ..IndexConfig::default()
            },
            ..IngestConfig::default()
        };
        let frame = vec![raw("player", [500.0, 500.0, 510.0, 510.0]), raw("rope", [0.0, 0.0, 0.0, 0.0])];
        let snapshot = ingest_frame(&mut world, 1, frame, &LinearTransform::identity(), &config).unwrap();
        assert_eq!(snapshot.index.len(), 1);
        assert_eq!(snapshot.player_position(), Some(Point2::new(505.0, 505.0)));
        assert!(world.is_explored(Point2::new(505.0, 505.0)));
    }

    #[test]
    fn test_low_confidence_is_ignored() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        let mut weak = raw("player", [0.0, 0.0, 10.0, 10.0]);
        weak.confidence = 0.2;
        let snapshot =
            ingest_frame(&mut world, 1, vec![weak], &LinearTransform::identity(), &IngestConfig::default())
                .unwrap();
        assert!(snapshot.player_position().is_none());
        assert!(world.is_empty());
    }

    #[test]
    fn test_portal_sighting_keeps_known_destination() {
        use crate::planner::{PathPlanner, PlannerConfig};

        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        for x in 0..3 {
            world.mark_explored(GridCell::new(x, 0).center(50.0));
        }
        world.mark_explored(GridCell::new(40, 0).center(50.0));
        world.add_object(
            ObjectKind::Portal,
            GridCell::new(1, 0).center(50.0),
            Some(GridCell::new(40, 0).center(50.0)),
        );

        let frame = vec![raw("portal", [70.0, 20.0, 80.0, 30.0])];
        ingest_frame(&mut world, 1, frame, &LinearTransform::identity(), &IngestConfig::default()).unwrap();

        let portal = &world.portals()[&GridCell::new(1, 0)];
        assert_eq!(portal.position, Point2::new(75.0, 25.0));
        assert_eq!(portal.destination, Some(Point2::new(2025.0, 25.0)));

        let planner = PathPlanner::new(PlannerConfig::default()).unwrap();
        let result = planner.find_path(&world, None, Point2::new(25.0, 25.0), Point2::new(2025.0, 25.0));
        assert!(result.is_success());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = FrameSnapshot::empty(&IngestConfig::default()).unwrap();
        assert_eq!(snapshot.frame_id, 0);
        assert!(snapshot.index.is_empty());
    }
}
