//! Per-frame collision boxes and the geometric queries built on them.
//!
//! A [`CollisionSystem`] lives for exactly one detection cycle. It is rebuilt
//! from that cycle's detections and then only read.

use pilot_geometry::{Aabb, CoordinateTransform, Point2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::detection::{Detection, DetectionClass};
use crate::map::{CellState, GridCell, WorldMap};

/// Tunables for box construction and probing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Scale applied to both sides of every box.
    pub inflation: f64,
    /// Extra height scale for ropes, applied after inflation.
    pub rope_height_scale: f64,
    /// Step between probe samples, both axes.
    pub probe_stride: f64,
    /// How far below the walking line the gap probe looks for support.
    pub gap_probe_depth: f64,
    /// Side of the square probe used by obstacle prediction.
    pub probe_size: f64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            inflation: 1.2,
            rope_height_scale: 1.5,
            probe_stride: 10.0,
            gap_probe_depth: 140.0,
            probe_size: 10.0,
        }
    }
}

/// Classes that take part in collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKind {
    Player,
    Portal,
    Rope,
    Platform,
    Obstacle,
}

impl BoxKind {
    pub fn from_class(class: &DetectionClass) -> Option<Self> {
        match class {
            DetectionClass::Player => Some(BoxKind::Player),
            DetectionClass::Portal => Some(BoxKind::Portal),
            DetectionClass::Rope => Some(BoxKind::Rope),
            DetectionClass::Platform => Some(BoxKind::Platform),
            DetectionClass::Obstacle => Some(BoxKind::Obstacle),
            DetectionClass::Monster | DetectionClass::Other(_) => None,
        }
    }

    /// Contact handling order: portal, then rope, then everything else.
    pub fn priority(&self) -> u8 {
        match self {
            BoxKind::Portal => 0,
            BoxKind::Rope => 1,
            _ => 2,
        }
    }
}

/// A world-space box built from one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionBox {
    pub kind: BoxKind,
    /// Inflated box used for overlap tests.
    pub bounds: Aabb,
    /// The detection box mapped to world space, before inflation.
    pub footprint: Aabb,
    pub source: Detection,
}

impl CollisionBox {
    pub fn center(&self) -> Point2 {
        self.bounds.center()
    }
}

/// An object overlapping the player box.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub kind: BoxKind,
    pub position: Point2,
    pub source: Detection,
}

/// First obstacle met along a predicted straight-line move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleHit {
    pub distance: f64,
    pub position: Point2,
    pub bounds: Aabb,
}

/// Horizontal facing for the ground probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    /// Facing that moves along `dx`; zero counts as right.
    pub fn toward(dx: f64) -> Self {
        if dx < 0.0 { Facing::Left } else { Facing::Right }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }
}

/// Outcome of [`CollisionSystem::detect_platform_gap`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapProbe {
    /// Every probed column has support, or no platform data exists at all.
    Clear,
    /// First unsupported column.
    Gap { distance: f64, position: Point2 },
}

impl GapProbe {
    pub fn is_gap(&self) -> bool {
        matches!(self, GapProbe::Gap { .. })
    }
}

/// Extent of the gap found ahead, see [`CollisionSystem::measure_gap_width`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapExtent {
    /// Distance to the first unsupported column.
    pub distance: f64,
    /// Distance from that column to the next supported one, if seen in range.
    pub width: Option<f64>,
}

/// Collision boxes of the current frame.
#[derive(Debug, Clone, Default)]
pub struct CollisionSystem {
    config: CollisionConfig,
    boxes: Vec<CollisionBox>,
    player: Option<CollisionBox>,
}

impl CollisionSystem {
    pub fn new(config: CollisionConfig) -> Self {
        Self {
            config,
            boxes: Vec::new(),
            player: None,
        }
    }

    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Replaces all boxes with those built from `detections`.
    ///
    /// # Arguments
    /// * `detections` - Normalised screen-space detections of one frame.
    /// * `transform` - Screen to world mapping; detections it rejects are skipped.
    ///
    /// # Returns
    /// * `usize` - Number of boxes built, the player box included.
    pub fn rebuild(&mut self, detections: &[Detection], transform: &dyn CoordinateTransform) -> usize {
        self.boxes.clear();
        self.player = None;

        for detection in detections {
            let Some(kind) = BoxKind::from_class(&detection.class) else {
                continue;
            };
            let corners = (
                transform.screen_to_world(detection.bbox.min),
                transform.screen_to_world(detection.bbox.max),
            );
            let (Some(a), Some(b)) = corners else {
                debug!(class = %detection.class, "detection not placeable in world, skipped");
                continue;
            };

            let footprint = Aabb::from_corners(a, b);
            let mut bounds = footprint.inflated(self.config.inflation);
            if kind == BoxKind::Rope {
                bounds = bounds.with_height_scale(self.config.rope_height_scale);
            }
            let collision_box = CollisionBox {
                kind,
                bounds,
                footprint,
                source: detection.clone(),
            };

            // The most recent player detection is authoritative.
            if kind == BoxKind::Player {
                self.player = Some(collision_box);
            } else {
                self.boxes.push(collision_box);
            }
        }

        let built = self.boxes.len() + usize::from(self.player.is_some());
        trace!(built, "collision boxes rebuilt");
        built
    }

    pub fn player(&self) -> Option<&CollisionBox> {
        self.player.as_ref()
    }

    /// Current player position of record.
    pub fn player_position(&self) -> Option<Point2> {
        self.player.as_ref().map(CollisionBox::center)
    }

    /// Non-player boxes.
    pub fn boxes(&self) -> &[CollisionBox] {
        &self.boxes
    }

    pub fn boxes_of(&self, kind: BoxKind) -> impl Iterator<Item = &CollisionBox> {
        self.boxes.iter().filter(move |b| b.kind == kind)
    }

    /// Every non-player box overlapping the player box, in detection order.
    pub fn check_player_collisions(&self) -> Vec<Contact> {
        let Some(player) = &self.player else {
            return Vec::new();
        };
        self.boxes
            .iter()
            .filter(|b| player.bounds.overlaps(&b.bounds))
            .map(|b| Contact {
                kind: b.kind,
                position: b.center(),
                source: b.source.clone(),
            })
            .collect()
    }

    /// True when a box of `kind` has its center within `distance` of the player's.
    pub fn is_player_near(&self, kind: BoxKind, distance: f64) -> bool {
        let Some(player) = self.player_position() else {
            return false;
        };
        self.boxes_of(kind)
            .any(|b| b.center().distance(player) <= distance)
    }

    /// Steps a probe box from `start` along `direction` and returns the first
    /// obstacle it overlaps within `distance`.
    pub fn predict_obstacle(&self, start: Point2, direction: Point2, distance: f64) -> Option<ObstacleHit> {
        let dir = direction.normalized()?;
        let stride = self.config.probe_stride;
        if !(stride > 0.0) || !(distance >= 0.0 && distance.is_finite()) {
            return None;
        }

        let steps = (distance / stride).floor() as usize;
        for i in 1..=steps {
            let travelled = i as f64 * stride;
            let position = start.offset(dir.x * travelled, dir.y * travelled);
            let probe = Aabb::from_center_size(position, self.config.probe_size, self.config.probe_size);
            if let Some(hit) = self.boxes_of(BoxKind::Obstacle).find(|b| b.bounds.overlaps(&probe)) {
                return Some(ObstacleHit {
                    distance: travelled,
                    position,
                    bounds: hit.bounds,
                });
            }
        }
        None
    }

    /// Walks columns ahead of `start` and reports the first one with no
    /// platform beneath it.
    ///
    /// Each column is probed downward from the walking line in `probe_stride`
    /// steps to `gap_probe_depth`, against platform footprints of this frame
    /// and `Platform` cells of `world`. With no platform data at all the
    /// answer is [`GapProbe::Clear`].
    pub fn detect_platform_gap(&self, world: &WorldMap, start: Point2, facing: Facing, max_distance: f64) -> GapProbe {
        if !self.has_platform_data(world) {
            return GapProbe::Clear;
        }
        match self.first_column(world, start, facing, max_distance, 1, false) {
            Some((distance, position)) => {
                debug!(distance, %position, "platform gap ahead");
                GapProbe::Gap { distance, position }
            }
            None => GapProbe::Clear,
        }
    }

    /// Like [`Self::detect_platform_gap`] but keeps probing past the first
    /// unsupported column to find where support resumes.
    pub fn measure_gap_width(
        &self,
        world: &WorldMap,
        start: Point2,
        facing: Facing,
        max_distance: f64,
    ) -> Option<GapExtent> {
        if !self.has_platform_data(world) {
            return None;
        }
        let (distance, _) = self.first_column(world, start, facing, max_distance, 1, false)?;
        let stride = self.config.probe_stride;
        let first_step = (distance / stride).round() as usize + 1;
        let width = self
            .first_column(world, start, facing, max_distance, first_step, true)
            .map(|(far, _)| far - distance);
        Some(GapExtent { distance, width })
    }

    /// First column from step `from` whose support equals `supported`.
    fn first_column(
        &self,
        world: &WorldMap,
        start: Point2,
        facing: Facing,
        max_distance: f64,
        from: usize,
        supported: bool,
    ) -> Option<(f64, Point2)> {
        let stride = self.config.probe_stride;
        let depth = self.config.gap_probe_depth;
        if !(stride > 0.0) || !(max_distance >= 0.0 && max_distance.is_finite()) || !depth.is_finite() {
            return None;
        }
        let steps = (max_distance / stride).floor() as usize;
        (from..=steps)
            .map(|i| {
                let distance = i as f64 * stride;
                (distance, start.offset(facing.sign() * distance, 0.0))
            })
            .find(|(_, column)| self.column_supported(world, *column) == supported)
    }

    fn column_supported(&self, world: &WorldMap, column: Point2) -> bool {
        let stride = self.config.probe_stride;
        let samples = (self.config.gap_probe_depth / stride).floor() as usize;
        (0..=samples).any(|j| {
            let p = column.offset(0.0, j as f64 * stride);
            self.boxes_of(BoxKind::Platform).any(|b| b.footprint.contains_point(p))
                || world.state(GridCell::from_world(p, world.cell_size())) == Some(CellState::Platform)
        })
    }

    fn has_platform_data(&self, world: &WorldMap) -> bool {
        self.boxes_of(BoxKind::Platform).next().is_some()
            || world.cells().any(|(_, r)| r.state == CellState::Platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{MapConfig, TerrainFeature};
    use pilot_geometry::{LinearTransform, approx_eq};

    const EPS: f64 = 1e-9;

    fn det(label: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection::new(
            DetectionClass::from_label(label),
            Aabb::from_corners(Point2::new(x1, y1), Point2::new(x2, y2)),
            0.9,
        )
    }

    fn system(detections: &[Detection]) -> CollisionSystem {
        let mut system = CollisionSystem::new(CollisionConfig::default());
        system.rebuild(detections, &LinearTransform::identity());
        system
    }

    /// Rejects everything left of x = 0.
    struct RightHalf;

    impl CoordinateTransform for RightHalf {
        fn screen_to_world(&self, screen: Point2) -> Option<Point2> {
            (screen.x >= 0.0).then_some(screen)
        }

        fn world_to_screen(&self, world: Point2) -> Option<Point2> {
            Some(world)
        }
    }

    #[test]
    fn test_boxes_are_inflated() {
        let system = system(&[det("portal", 0.0, 0.0, 50.0, 100.0), det("rope", 0.0, 0.0, 10.0, 100.0)]);
        let portal = system.boxes_of(BoxKind::Portal).next().unwrap();
        assert!(approx_eq(portal.bounds.width(), 60.0, EPS));
        assert!(approx_eq(portal.bounds.height(), 120.0, EPS));
        assert_eq!(portal.bounds.center(), Point2::new(25.0, 50.0));

        let rope = system.boxes_of(BoxKind::Rope).next().unwrap();
        assert!(approx_eq(rope.bounds.width(), 12.0, EPS));
        assert!(approx_eq(rope.bounds.height(), 180.0, EPS));
    }

    #[test]
    fn test_near_boxes_collide_after_inflation() {
        // Raw boxes are 5 units apart.
        let system = system(&[det("minimap_player", 0.0, 0.0, 50.0, 50.0), det("game_portal", 55.0, 0.0, 105.0, 50.0)]);
        let contacts = system.check_player_collisions();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].kind, BoxKind::Portal);
        assert!(system.is_player_near(BoxKind::Portal, 60.0));
        assert!(!system.is_player_near(BoxKind::Portal, 40.0));
        assert!(!system.is_player_near(BoxKind::Rope, 1000.0));
    }

    #[test]
    fn test_all_contacts_reported() {
        let system = system(&[
            det("player", 100.0, 100.0, 150.0, 150.0),
            det("rope", 120.0, 0.0, 130.0, 200.0),
            det("portal", 110.0, 110.0, 140.0, 140.0),
            det("wall", 500.0, 0.0, 510.0, 200.0),
        ]);
        let mut kinds: Vec<_> = system.check_player_collisions().iter().map(|c| c.kind).collect();
        kinds.sort_by_key(BoxKind::priority);
        assert_eq!(kinds, vec![BoxKind::Portal, BoxKind::Rope]);
    }

    #[test]
    fn test_last_player_detection_wins_and_failed_transform_skips() {
        let mut system = CollisionSystem::new(CollisionConfig::default());
        let built = system.rebuild(
            &[
                det("player", 0.0, 0.0, 10.0, 10.0),
                det("player", 100.0, 100.0, 110.0, 110.0),
                det("portal", -50.0, 0.0, -40.0, 10.0),
                det("monster", 0.0, 0.0, 5.0, 5.0),
            ],
            &RightHalf,
        );
        assert_eq!(built, 1);
        assert_eq!(system.player_position(), Some(Point2::new(105.0, 105.0)));
        assert!(system.boxes().is_empty());

        system.rebuild(&[], &RightHalf);
        assert!(system.player_position().is_none());
        assert!(system.check_player_collisions().is_empty());
    }

    #[test]
    fn test_predict_obstacle_reports_first_hit() {
        let system = system(&[det("wall", 60.0, -20.0, 70.0, 20.0), det("wall", 150.0, -20.0, 160.0, 20.0)]);
        // Inflated wall spans x 59..71; the 10-wide probe first reaches it at 60.
        let hit = system.predict_obstacle(Point2::new(0.0, 0.0), Point2::new(3.0, 0.0), 200.0).unwrap();
        assert!(approx_eq(hit.distance, 60.0, EPS));
        assert!(system.predict_obstacle(Point2::new(0.0, 0.0), Point2::new(-1.0, 0.0), 200.0).is_none());
        assert!(system.predict_obstacle(Point2::new(0.0, 0.0), Point2::new(0.0, 0.0), 200.0).is_none());
    }

    #[test]
    fn test_gap_reported_at_first_unsupported_column() {
        let system = system(&[
            det("platform", 0.0, 298.0, 100.0, 302.0),
            det("platform", 250.0, 298.0, 400.0, 302.0),
        ]);
        let world = WorldMap::new(MapConfig::default()).unwrap();
        let probe = system.detect_platform_gap(&world, Point2::new(50.0, 300.0), Facing::Right, 200.0);
        match probe {
            GapProbe::Gap { distance, position } => {
                assert!(approx_eq(distance, 60.0, EPS));
                assert!(approx_eq(position.x, 110.0, EPS));
            }
            GapProbe::Clear => panic!("expected a gap"),
        }

        let extent = system
            .measure_gap_width(&world, Point2::new(50.0, 300.0), Facing::Right, 200.0)
            .unwrap();
        assert!(approx_eq(extent.distance, 60.0, EPS));
        assert!(approx_eq(extent.width.unwrap(), 140.0, EPS));

        let back = system.detect_platform_gap(&world, Point2::new(50.0, 300.0), Facing::Left, 200.0);
        assert!(back.is_gap());
    }

    #[test]
    fn test_gap_probe_uses_map_platform_cells() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        for x in [0.0, 50.0, 250.0, 300.0, 350.0] {
            world.mark_terrain(Point2::new(x + 1.0, 301.0), TerrainFeature::Platform);
        }
        let system = CollisionSystem::new(CollisionConfig::default());
        // Cells are 50 wide, so support ends at the cell boundary x = 100.
        let probe = system.detect_platform_gap(&world, Point2::new(50.0, 300.0), Facing::Right, 200.0);
        assert_eq!(
            probe,
            GapProbe::Gap {
                distance: 50.0,
                position: Point2::new(100.0, 300.0)
            }
        );
    }

    #[test]
    fn test_support_found_within_probe_depth() {
        // Platform 140 units below the walking line still counts; 150 does not.
        let system = system(&[det("platform", 0.0, 440.0, 400.0, 445.0)]);
        let world = WorldMap::new(MapConfig::default()).unwrap();
        assert_eq!(
            system.detect_platform_gap(&world, Point2::new(50.0, 300.0), Facing::Right, 100.0),
            GapProbe::Clear
        );
        assert!(
            system
                .detect_platform_gap(&world, Point2::new(50.0, 290.0), Facing::Right, 100.0)
                .is_gap()
        );
    }

    #[test]
    fn test_no_platform_data_is_optimistic() {
        let system = CollisionSystem::new(CollisionConfig::default());
        let world = WorldMap::new(MapConfig::default()).unwrap();
        assert_eq!(
            system.detect_platform_gap(&world, Point2::new(0.0, 0.0), Facing::Right, 200.0),
            GapProbe::Clear
        );
        assert!(system.measure_gap_width(&world, Point2::new(0.0, 0.0), Facing::Left, 200.0).is_none());
    }

    #[test]
    fn test_unbounded_distances_return_at_once() {
        let system = system(&[det("wall", 60.0, -20.0, 70.0, 20.0), det("platform", 0.0, 298.0, 100.0, 302.0)]);
        let world = WorldMap::new(MapConfig::default()).unwrap();
        let start = Point2::new(50.0, 300.0);
        assert!(system.predict_obstacle(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), f64::INFINITY).is_none());
        assert!(!system.detect_platform_gap(&world, start, Facing::Right, f64::INFINITY).is_gap());
        assert!(system.measure_gap_width(&world, start, Facing::Right, f64::INFINITY).is_none());
        assert!(system.predict_obstacle(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), f64::NAN).is_none());
    }
}
