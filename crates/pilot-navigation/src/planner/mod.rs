//! Path planning over the affordance-aware grid derived from a [`WorldMap`].

pub mod astar;
pub mod grid;
pub mod hierarchical;
pub mod smooth;

use std::fmt;

use pilot_geometry::Point2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detection::Detection;
use crate::error::NavigationError;
use crate::map::{GridCell, WorldMap, validate_cell_size};
use crate::spatial::SpatialIndex;

pub use grid::PlannerGrid;

/// How a waypoint is reached from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Move,
    Jump,
    UseRope,
    UsePortal,
    /// Strike the monster at the waypoint position.
    Attack,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Move => "move",
            Action::Jump => "jump",
            Action::UseRope => "use_rope",
            Action::UsePortal => "use_portal",
            Action::Attack => "attack",
        };
        f.write_str(name)
    }
}

/// One step of a plan: the action to perform and where it ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub action: Action,
    /// World position, the center of `cell`.
    pub position: Point2,
    pub cell: GridCell,
}

impl Waypoint {
    pub fn new(action: Action, cell: GridCell, cell_size: f64) -> Self {
        Self {
            action,
            position: cell.center(cell_size),
            cell,
        }
    }
}

/// Represents the result of a planning call with search metadata.
///
/// `path == None` means no route; `Some` with a single waypoint means the
/// start already is the goal.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// The computed path, if one was found.
    pub path: Option<Vec<Waypoint>>,
    /// Sum of step costs along the path.
    pub total_cost: Option<f64>,
    /// Nodes expanded across every search level.
    pub nodes_explored: usize,
    /// Number of waypoints.
    pub path_length: usize,
}

impl PathResult {
    /// Creates a new PathResult for a successful search.
    pub fn success(path: Vec<Waypoint>, total_cost: f64, nodes_explored: usize) -> Self {
        let path_length = path.len();
        Self {
            path: Some(path),
            total_cost: Some(total_cost),
            nodes_explored,
            path_length,
        }
    }

    /// Creates a new PathResult for a failed search.
    pub fn failure(nodes_explored: usize) -> Self {
        Self {
            path: None,
            total_cost: None,
            nodes_explored,
            path_length: 0,
        }
    }

    /// Returns true if a path was found.
    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }

    /// Returns the path if one was found.
    pub fn into_path(self) -> Option<Vec<Waypoint>> {
        self.path
    }
}

impl fmt::Display for PathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(_) => write!(
                f,
                "PathResult {{ success: true, path_length: {}, total_cost: {}, nodes_explored: {} }}",
                self.path_length,
                self.total_cost.unwrap_or(0.0),
                self.nodes_explored
            ),
            None => write!(
                f,
                "PathResult {{ success: false, nodes_explored: {} }}",
                self.nodes_explored
            ),
        }
    }
}

/// Planner tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// World units per cell; must equal the map's.
    pub cell_size: f64,
    /// Multiplier on the Manhattan heuristic. Above 1 trades optimality for speed.
    pub heuristic_weight: f64,
    /// Node expansions per search before giving up.
    pub max_expansions: usize,
    /// Base cells per super-cell side for the two-level search.
    pub super_cell_size: i32,
    /// Manhattan distance in cells above which [`PathPlanner::plan`] goes two-level.
    pub hierarchical_threshold: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cell_size: 50.0,
            heuristic_weight: 1.0,
            max_expansions: 20_000,
            super_cell_size: 10,
            hierarchical_threshold: 40,
        }
    }
}

/// Entry point tying grid construction, search and smoothing together.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    config: PlannerConfig,
}

impl PathPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self, NavigationError> {
        validate_cell_size(config.cell_size)?;
        Ok(Self {
            config: PlannerConfig {
                heuristic_weight: if config.heuristic_weight.is_finite() && config.heuristic_weight >= 0.0 {
                    config.heuristic_weight
                } else {
                    1.0
                },
                super_cell_size: config.super_cell_size.max(1),
                ..config
            },
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Cell-size agreement between planner and map; a mismatch would make
    /// every cell lookup wrong, so the search is refused.
    fn grid<'a>(
        &self,
        world: &'a WorldMap,
        obstacles: Option<&'a SpatialIndex<Detection>>,
        start: Point2,
    ) -> Option<PlannerGrid<'a>> {
        if world.cell_size() != self.config.cell_size {
            warn!(
                planner = self.config.cell_size,
                map = world.cell_size(),
                "planner and map cell sizes differ"
            );
            return None;
        }
        Some(PlannerGrid::new(world, obstacles, world.cell_of(start)))
    }

    /// Flat A* between two world positions.
    pub fn find_path(
        &self,
        world: &WorldMap,
        obstacles: Option<&SpatialIndex<Detection>>,
        start: Point2,
        goal: Point2,
    ) -> PathResult {
        let Some(grid) = self.grid(world, obstacles, start) else {
            return PathResult::failure(0);
        };
        astar::find_path(&grid, grid.start(), world.cell_of(goal), &self.config)
    }

    /// Two-level search between two world positions.
    pub fn find_path_hierarchical(
        &self,
        world: &WorldMap,
        obstacles: Option<&SpatialIndex<Detection>>,
        start: Point2,
        goal: Point2,
    ) -> PathResult {
        let Some(grid) = self.grid(world, obstacles, start) else {
            return PathResult::failure(0);
        };
        hierarchical::find_path_hierarchical(&grid, grid.start(), world.cell_of(goal), &self.config)
    }

    /// Picks the search by distance: two-level for long trips with a flat
    /// fallback, flat otherwise.
    pub fn plan(
        &self,
        world: &WorldMap,
        obstacles: Option<&SpatialIndex<Detection>>,
        start: Point2,
        goal: Point2,
    ) -> PathResult {
        let Some(grid) = self.grid(world, obstacles, start) else {
            return PathResult::failure(0);
        };
        let from = grid.start();
        let to = world.cell_of(goal);

        let result = if from.manhattan(to) > self.config.hierarchical_threshold {
            let coarse = hierarchical::find_path_hierarchical(&grid, from, to, &self.config);
            if coarse.is_success() {
                coarse
            } else {
                debug!(nodes = coarse.nodes_explored, "two-level search failed, trying flat");
                let mut flat = astar::find_path(&grid, from, to, &self.config);
                flat.nodes_explored += coarse.nodes_explored;
                flat
            }
        } else {
            astar::find_path(&grid, from, to, &self.config)
        };

        if result.is_success() {
            info!(%from, %to, steps = result.path_length, nodes_explored = result.nodes_explored, "path found");
        } else {
            info!(%from, %to, nodes_explored = result.nodes_explored, "no path");
        }
        result
    }

    /// Collapses a raw path into higher-level actions.
    pub fn smooth_path(
        &self,
        world: &WorldMap,
        obstacles: Option<&SpatialIndex<Detection>>,
        raw: &[Waypoint],
    ) -> Vec<Waypoint> {
        let Some(first) = raw.first() else {
            return Vec::new();
        };
        match self.grid(world, obstacles, first.position) {
            Some(grid) => smooth::smooth_path(&grid, raw),
            None => raw.to_vec(),
        }
    }
}
