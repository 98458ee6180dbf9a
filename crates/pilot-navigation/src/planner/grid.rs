use std::collections::HashMap;

use pilot_geometry::{Aabb, Point2};

use super::Action;
use crate::detection::{Detection, DetectionClass};
use crate::map::{CellState, GridCell, RopeSpan, WorldMap};
use crate::spatial::SpatialIndex;

/// Half-width of the box around a cell center searched for live obstacles.
const LIVE_OBSTACLE_REACH: f64 = 20.0;

/// Affordance view of a [`WorldMap`] for one search.
///
/// Built per planning call; borrows the map and, optionally, the frame's
/// spatial index for obstacles that are not yet part of the map.
pub struct PlannerGrid<'a> {
    world: &'a WorldMap,
    obstacles: Option<&'a SpatialIndex<Detection>>,
    rope_spans: Vec<RopeSpan>,
    portals: HashMap<GridCell, GridCell>,
    start: GridCell,
}

impl<'a> PlannerGrid<'a> {
    pub fn new(world: &'a WorldMap, obstacles: Option<&'a SpatialIndex<Detection>>, start: GridCell) -> Self {
        let cell_size = world.cell_size();
        let portals = world
            .portals()
            .iter()
            .filter_map(|(cell, portal)| {
                portal
                    .destination
                    .map(|d| (*cell, GridCell::from_world(d, cell_size)))
            })
            .collect();
        Self {
            world,
            obstacles,
            rope_spans: world.rope_spans(),
            portals,
            start,
        }
    }

    pub fn world(&self) -> &WorldMap {
        self.world
    }

    pub fn cell_size(&self) -> f64 {
        self.world.cell_size()
    }

    pub fn start(&self) -> GridCell {
        self.start
    }

    pub fn center(&self, cell: GridCell) -> Point2 {
        cell.center(self.cell_size())
    }

    /// Obstacle in the map, or an obstacle detection near the cell center.
    pub fn is_blocked(&self, cell: GridCell) -> bool {
        self.world.state(cell) == Some(CellState::Obstacle) || self.has_live_obstacle(cell)
    }

    fn has_live_obstacle(&self, cell: GridCell) -> bool {
        let Some(index) = self.obstacles else {
            return false;
        };
        let c = self.center(cell);
        let reach = Aabb::from_corners(
            c.offset(-LIVE_OBSTACLE_REACH, -LIVE_OBSTACLE_REACH),
            c.offset(LIVE_OBSTACLE_REACH, LIVE_OBSTACLE_REACH),
        );
        index
            .query_range(&reach)
            .iter()
            .any(|p| p.payload.class == DetectionClass::Obstacle)
    }

    /// Explored or platform cell with no live obstacle. The start cell always qualifies.
    pub fn is_walkable(&self, cell: GridCell) -> bool {
        if cell == self.start {
            return true;
        }
        self.world.state(cell).is_some_and(|s| s.is_walkable()) && !self.has_live_obstacle(cell)
    }

    pub fn rope_span_at(&self, cell: GridCell) -> Option<&RopeSpan> {
        self.rope_spans.iter().find(|span| span.contains(cell))
    }

    /// Walkable, or on a rope and not blocked.
    pub fn is_traversable(&self, cell: GridCell) -> bool {
        self.is_walkable(cell) || (self.rope_span_at(cell).is_some() && !self.is_blocked(cell))
    }

    /// A platform: walkable with nothing walkable directly beneath.
    pub fn is_platform(&self, cell: GridCell) -> bool {
        self.is_walkable(cell) && !self.is_walkable(cell.below())
    }

    /// Standing on a platform with clear space overhead.
    pub fn can_jump_from(&self, cell: GridCell) -> bool {
        self.is_platform(cell) && !self.is_blocked(cell.above())
    }

    pub fn portal_destination(&self, cell: GridCell) -> Option<GridCell> {
        self.portals.get(&cell).copied()
    }

    /// True when `a` and `b` lie in one rope span with nothing blocking between them.
    pub fn rope_connects(&self, a: GridCell, b: GridCell) -> bool {
        if a.x != b.x || a == b {
            return false;
        }
        let Some(span) = self.rope_span_at(a) else {
            return false;
        };
        span.contains(b) && (a.y.min(b.y)..=a.y.max(b.y)).all(|y| !self.is_blocked(GridCell::new(a.x, y)))
    }

    /// Successors of `cell` with the action reaching them and its cost.
    ///
    /// Horizontal steps always; down only onto a walkable cell or along a
    /// rope; up only along a rope; a two-cell jump from platforms; a portal
    /// hop to its recorded destination.
    pub fn neighbors(&self, cell: GridCell) -> Vec<(GridCell, Action, f64)> {
        let mut out = Vec::with_capacity(6);

        for side in [cell.offset(-1, 0), cell.offset(1, 0)] {
            if self.is_traversable(side) {
                out.push((side, Action::Move, 1.0));
            }
        }

        let below = cell.below();
        if self.rope_connects(cell, below) {
            out.push((below, Action::UseRope, 1.0));
        } else if self.is_walkable(below) {
            out.push((below, Action::Move, 1.0));
        }

        let above = cell.above();
        if self.rope_connects(cell, above) {
            out.push((above, Action::UseRope, 1.0));
        }

        let landing = cell.offset(0, -2);
        if self.can_jump_from(cell) && self.is_traversable(landing) {
            out.push((landing, Action::Jump, 2.0));
        }

        if let Some(destination) = self.portal_destination(cell) {
            if !self.is_blocked(destination) {
                out.push((destination, Action::UsePortal, 1.0));
            }
        }

        out
    }

    /// Every traversable cell the map knows about, plus the start.
    pub fn known_traversable(&self) -> Vec<GridCell> {
        let mut cells: Vec<GridCell> = self
            .world
            .cells()
            .map(|(cell, _)| *cell)
            .filter(|cell| self.is_traversable(*cell))
            .collect();
        for span in &self.rope_spans {
            for y in span.top..=span.bottom {
                let cell = GridCell::new(span.x, y);
                if self.world.record(cell).is_none() && self.is_traversable(cell) {
                    cells.push(cell);
                }
            }
        }
        if self.world.record(self.start).is_none() && !cells.contains(&self.start) {
            cells.push(self.start);
        }
        cells.sort_unstable();
        cells.dedup();
        cells
    }
}
