use std::collections::{BTreeMap, HashMap};

use pilot_geometry::Point2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::grid::{CellRecord, CellState, GridCell, TerrainFeature, now_millis, validate_cell_size};
use super::store::MapStore;
use crate::error::NavigationError;

/// Tunables for a [`WorldMap`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// World units per grid cell. Must match the planner's.
    pub cell_size: f64,
    /// Minimum movement before a new position is appended to the history.
    pub jitter_threshold: f64,
    /// Cells scanned above and below a rope for its anchoring platforms.
    pub rope_scan_cells: i32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            cell_size: 50.0,
            jitter_threshold: 20.0,
            rope_scan_cells: 20,
        }
    }
}

/// Kinds of special object a cell can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Portal,
    Rope,
}

/// A portal or rope recorded at a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// World position where the object was last seen.
    pub position: Point2,
    /// Teleport target, portals only.
    #[serde(default)]
    pub destination: Option<Point2>,
    /// Platform cells bounding a rope (nearest above first, then nearest below).
    #[serde(default)]
    pub connects: Vec<GridCell>,
    pub updated_at: u64,
}

/// Result entry of [`WorldMap::nearby_objects`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyObject {
    pub kind: ObjectKind,
    pub cell: GridCell,
    pub position: Point2,
}

/// Derived link between otherwise disconnected regions of the map.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPoint {
    pub kind: ObjectKind,
    pub cell: GridCell,
    pub position: Point2,
    /// Rope: the platform cells it joins.
    pub connects: Vec<GridCell>,
    /// Portal: explicit teleport target, if known.
    pub destination: Option<Point2>,
}

/// Vertical column a rope makes traversable, in cells (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RopeSpan {
    pub x: i32,
    pub top: i32,
    pub bottom: i32,
}

impl RopeSpan {
    pub fn contains(&self, cell: GridCell) -> bool {
        cell.x == self.x && cell.y >= self.top && cell.y <= self.bottom
    }
}

/// A horizontal run of standable cells with open space below (world units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformSpan {
    pub y: f64,
    pub x_min: f64,
    pub x_max: f64,
}

/// Sparse, cumulative terrain memory for one game map.
///
/// Entries only ever accumulate while a map is active; [`WorldMap::load`]
/// style replacement happens through [`WorldMap::switch_map`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorldMap {
    pub(super) config: MapConfig,
    pub(super) map_id: Option<String>,
    pub(super) grid: HashMap<GridCell, CellRecord>,
    pub(super) history: Vec<Point2>,
    pub(super) portals: HashMap<GridCell, ObjectRecord>,
    pub(super) ropes: HashMap<GridCell, ObjectRecord>,
}

impl WorldMap {
    /// Creates an empty map.
    ///
    /// # Arguments
    /// * `config` - Cell size and ingestion tunables.
    ///
    /// # Returns
    /// * `Result<Self, NavigationError>` - The map, or `InvalidCellSize`.
    pub fn new(config: MapConfig) -> Result<Self, NavigationError> {
        validate_cell_size(config.cell_size)?;
        Ok(Self {
            config,
            map_id: None,
            grid: HashMap::new(),
            history: Vec::new(),
            portals: HashMap::new(),
            ropes: HashMap::new(),
        })
    }

    /// Empty map with default tunables and the given cell size.
    pub fn with_cell_size(cell_size: f64) -> Result<Self, NavigationError> {
        Self::new(MapConfig {
            cell_size,
            ..MapConfig::default()
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn cell_size(&self) -> f64 {
        self.config.cell_size
    }

    pub fn map_id(&self) -> Option<&str> {
        self.map_id.as_deref()
    }

    pub fn set_map_id(&mut self, map_id: impl Into<String>) {
        self.map_id = Some(map_id.into());
    }

    pub fn cell_of(&self, position: Point2) -> GridCell {
        GridCell::from_world(position, self.config.cell_size)
    }

    /// Records that the player stood at `position`.
    ///
    /// The cell becomes `Explored` unless it already carries terrain, in which
    /// case only its timestamp is refreshed. The position joins the history
    /// only once it is more than the jitter threshold away from the last one.
    pub fn mark_explored(&mut self, position: Point2) {
        if !position.is_finite() {
            return;
        }
        let cell = self.cell_of(position);
        self.grid
            .entry(cell)
            .and_modify(|record| record.updated_at = now_millis())
            .or_insert_with(|| CellRecord::new(CellState::Explored));

        let moved = self
            .history
            .last()
            .is_none_or(|last| last.distance(position) > self.config.jitter_threshold);
        if moved {
            self.history.push(position);
        }
    }

    /// Overwrites a cell with terrain and recomputes rope anchors.
    pub fn mark_terrain(&mut self, position: Point2, feature: TerrainFeature) {
        if !position.is_finite() {
            return;
        }
        let cell = self.cell_of(position);
        self.grid.insert(cell, CellRecord::new(feature.into()));
        debug!(%cell, ?feature, "terrain updated");
        self.refresh_connections();
    }

    /// Records a portal or rope at the cell owning `position`.
    ///
    /// Seeing an object again refreshes its position and timestamp. A portal
    /// keeps its recorded destination unless a new one is supplied.
    pub fn add_object(&mut self, kind: ObjectKind, position: Point2, destination: Option<Point2>) {
        if !position.is_finite() {
            return;
        }
        let cell = self.cell_of(position);
        let destination = destination.filter(|d| d.is_finite());
        let objects = match kind {
            ObjectKind::Portal => &mut self.portals,
            ObjectKind::Rope => &mut self.ropes,
        };
        objects
            .entry(cell)
            .and_modify(|record| {
                record.position = position;
                record.updated_at = now_millis();
                if destination.is_some() {
                    record.destination = destination;
                }
            })
            .or_insert_with(|| ObjectRecord {
                position,
                destination,
                connects: Vec::new(),
                updated_at: now_millis(),
            });
        self.grid
            .entry(cell)
            .or_insert_with(|| CellRecord::new(CellState::Explored));
        self.refresh_connections();
    }

    /// Sets the teleport target of an existing portal. Returns false if the
    /// cell has no portal.
    pub fn set_portal_destination(&mut self, cell: GridCell, destination: Point2) -> bool {
        match self.portals.get_mut(&cell) {
            Some(portal) if destination.is_finite() => {
                portal.destination = Some(destination);
                true
            }
            _ => false,
        }
    }

    /// Re-derives each rope's anchoring platforms: the nearest `Platform`
    /// cell above and the nearest below, within the scan range.
    fn refresh_connections(&mut self) {
        let scan = self.config.rope_scan_cells;
        let grid = &self.grid;
        let is_platform = |cell: GridCell| {
            grid.get(&cell)
                .is_some_and(|r| r.state == CellState::Platform)
        };

        for (cell, rope) in self.ropes.iter_mut() {
            let mut connects = Vec::with_capacity(2);
            if let Some(up) = (1..=scan).map(|dy| cell.offset(0, -dy)).find(|c| is_platform(*c)) {
                connects.push(up);
            }
            if let Some(down) = (1..=scan).map(|dy| cell.offset(0, dy)).find(|c| is_platform(*c)) {
                connects.push(down);
            }
            rope.connects = connects;
        }
    }

    /// Portals and ropes within `radius_in_cells` (Chebyshev) of `position`.
    pub fn nearby_objects(&self, position: Point2, radius_in_cells: i32) -> Vec<NearbyObject> {
        let center = self.cell_of(position);
        let r = radius_in_cells.max(0);
        let mut nearby = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let cell = center.offset(dx, dy);
                if let Some(portal) = self.portals.get(&cell) {
                    nearby.push(NearbyObject {
                        kind: ObjectKind::Portal,
                        cell,
                        position: portal.position,
                    });
                }
                if let Some(rope) = self.ropes.get(&cell) {
                    nearby.push(NearbyObject {
                        kind: ObjectKind::Rope,
                        cell,
                        position: rope.position,
                    });
                }
            }
        }
        nearby
    }

    /// True when the cell owning `position` has any entry.
    pub fn is_explored(&self, position: Point2) -> bool {
        self.grid.contains_key(&self.cell_of(position))
    }

    /// False only for cells explicitly marked `Obstacle`; unknown space is walkable.
    pub fn is_walkable(&self, position: Point2) -> bool {
        self.state(self.cell_of(position)) != Some(CellState::Obstacle)
    }

    pub fn state(&self, cell: GridCell) -> Option<CellState> {
        self.grid.get(&cell).map(|r| r.state)
    }

    pub fn record(&self, cell: GridCell) -> Option<&CellRecord> {
        self.grid.get(&cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&GridCell, &CellRecord)> {
        self.grid.iter()
    }

    pub fn portals(&self) -> &HashMap<GridCell, ObjectRecord> {
        &self.portals
    }

    pub fn ropes(&self) -> &HashMap<GridCell, ObjectRecord> {
        &self.ropes
    }

    pub fn history(&self) -> &[Point2] {
        &self.history
    }

    /// Number of known cells.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Every rope and portal as a connection point, sorted by cell.
    pub fn connection_points(&self) -> Vec<ConnectionPoint> {
        let mut points: Vec<ConnectionPoint> = self
            .ropes
            .iter()
            .map(|(cell, rope)| ConnectionPoint {
                kind: ObjectKind::Rope,
                cell: *cell,
                position: rope.position,
                connects: rope.connects.clone(),
                destination: None,
            })
            .chain(self.portals.iter().map(|(cell, portal)| ConnectionPoint {
                kind: ObjectKind::Portal,
                cell: *cell,
                position: portal.position,
                connects: Vec::new(),
                destination: portal.destination,
            }))
            .collect();
        points.sort_by_key(|p| (p.cell, p.kind == ObjectKind::Portal));
        points
    }

    /// Columns made climbable by ropes, from the anchor above (or the rope
    /// cell) down to the anchor below (or the rope cell).
    pub fn rope_spans(&self) -> Vec<RopeSpan> {
        self.ropes
            .keys()
            .map(|cell| {
                let rope = &self.ropes[cell];
                let top = rope.connects.iter().filter(|c| c.y < cell.y).map(|c| c.y).min();
                let bottom = rope.connects.iter().filter(|c| c.y > cell.y).map(|c| c.y).max();
                RopeSpan {
                    x: cell.x,
                    top: top.unwrap_or(cell.y),
                    bottom: bottom.unwrap_or(cell.y),
                }
            })
            .collect()
    }

    /// Groups standable cells with nothing known beneath them into
    /// horizontal runs, sorted top to bottom then left to right.
    pub fn platform_spans(&self) -> Vec<PlatformSpan> {
        let mut rows: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for (cell, record) in &self.grid {
            if record.state.is_walkable() && !self.grid.contains_key(&cell.below()) {
                rows.entry(cell.y).or_default().push(cell.x);
            }
        }

        let size = self.config.cell_size;
        let mut spans = Vec::new();
        for (y, mut xs) in rows {
            xs.sort_unstable();
            let mut start = xs[0];
            let mut prev = xs[0];
            for &x in &xs[1..] {
                if x > prev + 1 {
                    spans.push(span(y, start, prev, size));
                    start = x;
                }
                prev = x;
            }
            spans.push(span(y, start, prev, size));
        }
        spans
    }

    /// Drops all terrain, history and objects. Keeps config and map id.
    pub fn clear(&mut self) {
        self.grid.clear();
        self.history.clear();
        self.portals.clear();
        self.ropes.clear();
    }

    /// Saves the current map (when it has an id) and replaces this map
    /// wholesale with the stored state of `map_id`.
    pub fn switch_map(&mut self, store: &MapStore, map_id: &str) -> Result<(), NavigationError> {
        if self.map_id.as_deref() == Some(map_id) {
            return Ok(());
        }
        if let Some(current) = self.map_id.as_deref() {
            store.save(current, self)?;
        }
        let loaded = store.load(map_id, self.config)?;
        info!(from = ?self.map_id, to = map_id, cells = loaded.len(), "switched map");
        *self = loaded;
        Ok(())
    }
}

fn span(y: i32, first: i32, last: i32, size: f64) -> PlatformSpan {
    PlatformSpan {
        y: y as f64 * size,
        x_min: first as f64 * size,
        x_max: (last + 1) as f64 * size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> WorldMap {
        WorldMap::new(MapConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_map_is_walkable_everywhere() {
        let world = map();
        assert!(world.is_walkable(Point2::new(0.0, 0.0)));
        assert!(world.is_walkable(Point2::new(-1234.5, 9876.0)));
        assert!(!world.is_explored(Point2::new(0.0, 0.0)));
    }

    #[test]
    fn test_rejects_bad_cell_size() {
        assert!(matches!(
            WorldMap::with_cell_size(-1.0),
            Err(NavigationError::InvalidCellSize(_))
        ));
    }

    #[test]
    fn test_history_ignores_jitter() {
        let mut world = map();
        world.mark_explored(Point2::new(100.0, 100.0));
        world.mark_explored(Point2::new(110.0, 105.0));
        world.mark_explored(Point2::new(115.0, 100.0));
        world.mark_explored(Point2::new(130.0, 100.0));
        assert_eq!(
            world.history(),
            &[Point2::new(100.0, 100.0), Point2::new(130.0, 100.0)]
        );
        assert!(world.is_explored(Point2::new(120.0, 120.0)));
    }

    #[test]
    fn test_explored_never_downgrades_terrain() {
        let mut world = map();
        world.mark_terrain(Point2::new(10.0, 10.0), TerrainFeature::Platform);
        world.mark_explored(Point2::new(20.0, 20.0));
        assert_eq!(world.state(GridCell::new(0, 0)), Some(CellState::Platform));

        world.mark_terrain(Point2::new(10.0, 10.0), TerrainFeature::Obstacle);
        assert!(!world.is_walkable(Point2::new(1.0, 1.0)));
    }

    #[test]
    fn test_one_object_per_kind_per_cell() {
        let mut world = map();
        world.add_object(ObjectKind::Portal, Point2::new(10.0, 10.0), None);
        world.add_object(ObjectKind::Portal, Point2::new(20.0, 20.0), Some(Point2::new(500.0, 10.0)));
        world.add_object(ObjectKind::Rope, Point2::new(30.0, 30.0), None);
        assert_eq!(world.portals().len(), 1);
        assert_eq!(world.ropes().len(), 1);
        assert_eq!(
            world.portals()[&GridCell::new(0, 0)].destination,
            Some(Point2::new(500.0, 10.0))
        );
        assert_eq!(world.state(GridCell::new(0, 0)), Some(CellState::Explored));
    }

    #[test]
    fn test_resighting_portal_keeps_destination() {
        let mut world = map();
        world.add_object(ObjectKind::Portal, Point2::new(10.0, 10.0), Some(Point2::new(500.0, 10.0)));
        world.add_object(ObjectKind::Portal, Point2::new(14.0, 12.0), None);
        let portal = &world.portals()[&GridCell::new(0, 0)];
        assert_eq!(portal.position, Point2::new(14.0, 12.0));
        assert_eq!(portal.destination, Some(Point2::new(500.0, 10.0)));
    }

    #[test]
    fn test_nearby_objects_scans_square() {
        let mut world = map();
        world.add_object(ObjectKind::Rope, Point2::new(125.0, 25.0), None);
        world.add_object(ObjectKind::Portal, Point2::new(525.0, 25.0), None);
        let near = world.nearby_objects(Point2::new(25.0, 25.0), 2);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].kind, ObjectKind::Rope);
        assert_eq!(world.nearby_objects(Point2::new(25.0, 25.0), 10).len(), 2);
    }

    #[test]
    fn test_rope_connects_nearest_platforms() {
        let mut world = map();
        world.add_object(ObjectKind::Rope, Point2::new(25.0, 525.0), None);
        // Two candidates above; the nearer (y = 8) wins.
        world.mark_terrain(Point2::new(25.0, 225.0), TerrainFeature::Platform);
        world.mark_terrain(Point2::new(25.0, 425.0), TerrainFeature::Platform);
        world.mark_terrain(Point2::new(25.0, 725.0), TerrainFeature::Platform);
        // Out of scan range below.
        world.mark_terrain(Point2::new(25.0, 50.0 * 40.0), TerrainFeature::Platform);

        let rope = &world.ropes()[&GridCell::new(0, 10)];
        assert_eq!(rope.connects, vec![GridCell::new(0, 8), GridCell::new(0, 14)]);

        let spans = world.rope_spans();
        assert_eq!(spans, vec![RopeSpan { x: 0, top: 8, bottom: 14 }]);
        assert!(spans[0].contains(GridCell::new(0, 12)));

        let points = world.connection_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].connects.len(), 2);
    }

    #[test]
    fn test_platform_spans_merge_adjacent_cells() {
        let mut world = map();
        for x in [0.0, 50.0, 100.0, 300.0] {
            world.mark_explored(Point2::new(x + 1.0, 301.0));
        }
        // Supported cell: has something below, so not an edge.
        world.mark_explored(Point2::new(401.0, 301.0));
        world.mark_terrain(Point2::new(401.0, 351.0), TerrainFeature::Obstacle);

        let spans = world.platform_spans();
        assert_eq!(
            spans,
            vec![
                PlatformSpan { y: 300.0, x_min: 0.0, x_max: 150.0 },
                PlatformSpan { y: 300.0, x_min: 300.0, x_max: 350.0 },
            ]
        );
    }
}
