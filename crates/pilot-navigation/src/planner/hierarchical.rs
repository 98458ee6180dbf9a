use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::astar::{find_path, search};
use super::grid::PlannerGrid;
use super::{PathResult, PlannerConfig};
use crate::map::GridCell;

/// Super-cell containing `cell`.
fn region_of(cell: GridCell, size: i32) -> GridCell {
    GridCell::new(cell.x.div_euclid(size), cell.y.div_euclid(size))
}

/// Coarse graph over super-cells that contain at least one traversable cell.
struct RegionGraph {
    members: HashMap<GridCell, Vec<GridCell>>,
    links: HashMap<GridCell, HashSet<GridCell>>,
}

impl RegionGraph {
    fn build(grid: &PlannerGrid, size: i32) -> Self {
        let mut members: HashMap<GridCell, Vec<GridCell>> = HashMap::new();
        for cell in grid.known_traversable() {
            members.entry(region_of(cell, size)).or_default().push(cell);
        }

        let mut links: HashMap<GridCell, HashSet<GridCell>> = HashMap::new();
        for region in members.keys() {
            let adjacent = [
                region.offset(-1, 0),
                region.offset(1, 0),
                region.offset(0, -1),
                region.offset(0, 1),
            ];
            let entry = links.entry(*region).or_default();
            entry.extend(adjacent.into_iter().filter(|r| members.contains_key(r)));
        }
        // Portals join regions regardless of distance.
        for cells in members.values() {
            for cell in cells {
                if let Some(destination) = grid.portal_destination(*cell) {
                    let to = region_of(destination, size);
                    links.entry(region_of(*cell, size)).or_default().insert(to);
                }
            }
        }

        Self { members, links }
    }

    fn neighbors(&self, region: GridCell) -> Vec<(GridCell, (), f64)> {
        let mut out: Vec<(GridCell, (), f64)> = self
            .links
            .get(&region)
            .map(|set| set.iter().map(|r| (*r, (), 1.0)).collect())
            .unwrap_or_default();
        // HashSet order is arbitrary; sort for reproducible searches.
        out.sort_by_key(|(r, _, _)| *r);
        out
    }

    /// Member of `region` closest to `from`.
    fn entry_cell(&self, region: GridCell, from: GridCell) -> Option<GridCell> {
        self.members
            .get(&region)?
            .iter()
            .copied()
            .min_by_key(|cell| (cell.manhattan(from), *cell))
    }
}

/// Two-level search: A* over super-cells of `config.super_cell_size` base
/// cells, then flat A* between consecutive super-cells, stitched together.
///
/// Returns a failure when either level fails; the caller decides whether to
/// fall back to a flat search.
pub fn find_path_hierarchical(grid: &PlannerGrid, start: GridCell, goal: GridCell, config: &PlannerConfig) -> PathResult {
    let size = config.super_cell_size.max(1);
    let graph = RegionGraph::build(grid, size);
    let start_region = region_of(start, size);
    let goal_region = region_of(goal, size);

    if start_region == goal_region {
        return find_path(grid, start, goal, config);
    }

    let coarse = search(
        start_region,
        goal_region,
        (),
        |region| graph.neighbors(region),
        |region| f64::from(region.manhattan(goal_region)),
        config.heuristic_weight,
        config.max_expansions,
    );
    let Some(regions) = coarse.path else {
        debug!(explored = coarse.explored, "no region route");
        return PathResult::failure(coarse.explored);
    };

    let mut path = Vec::new();
    let mut total_cost = 0.0;
    let mut nodes_explored = coarse.explored;
    let mut current = start;

    for (i, (region, _)) in regions.iter().enumerate().skip(1) {
        let target = if i == regions.len() - 1 {
            goal
        } else {
            match graph.entry_cell(*region, current) {
                Some(cell) => cell,
                None => return PathResult::failure(nodes_explored),
            }
        };

        let leg = find_path(grid, current, target, config);
        nodes_explored += leg.nodes_explored;
        let Some(steps) = leg.path else {
            debug!(%current, %target, "region leg failed to refine");
            return PathResult::failure(nodes_explored);
        };
        total_cost += leg.total_cost.unwrap_or(0.0);
        let skip = usize::from(!path.is_empty());
        path.extend(steps.into_iter().skip(skip));
        current = target;
    }

    PathResult::success(path, total_cost, nodes_explored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{MapConfig, ObjectKind, WorldMap};
    use crate::planner::Action;

    fn explore_row(world: &mut WorldMap, cy: i32, xs: std::ops::RangeInclusive<i32>) {
        for x in xs {
            world.mark_explored(GridCell::new(x, cy).center(50.0));
        }
    }

    #[test]
    fn test_region_of_floors_negative_cells() {
        assert_eq!(region_of(GridCell::new(-1, 9), 10), GridCell::new(-1, 0));
        assert_eq!(region_of(GridCell::new(10, -10), 10), GridCell::new(1, -1));
    }

    #[test]
    fn test_long_corridor_matches_flat_result() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 3, 0..=45);
        let start = GridCell::new(0, 3);
        let goal = GridCell::new(45, 3);
        let grid = PlannerGrid::new(&world, None, start);
        let config = PlannerConfig::default();

        let coarse = find_path_hierarchical(&grid, start, goal, &config);
        let flat = find_path(&grid, start, goal, &config);
        let path = coarse.path.unwrap();
        assert_eq!(path.len(), 46);
        assert_eq!(path.first().unwrap().cell, start);
        assert_eq!(path.last().unwrap().cell, goal);
        assert!(path.windows(2).all(|w| w[0].cell.manhattan(w[1].cell) == 1));
        assert_eq!(coarse.total_cost, flat.total_cost);
    }

    #[test]
    fn test_portal_links_distant_regions() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=2);
        explore_row(&mut world, 0, 60..=62);
        world.add_object(
            ObjectKind::Portal,
            GridCell::new(2, 0).center(50.0),
            Some(GridCell::new(60, 0).center(50.0)),
        );
        let start = GridCell::new(0, 0);
        let grid = PlannerGrid::new(&world, None, start);

        let result = find_path_hierarchical(&grid, start, GridCell::new(62, 0), &PlannerConfig::default());
        let path = result.path.unwrap();
        assert!(path.iter().any(|w| w.action == Action::UsePortal));
        assert_eq!(path.last().unwrap().cell, GridCell::new(62, 0));
    }

    #[test]
    fn test_disconnected_regions_fail() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=3);
        explore_row(&mut world, 0, 50..=53);
        let start = GridCell::new(0, 0);
        let grid = PlannerGrid::new(&world, None, start);
        let result = find_path_hierarchical(&grid, start, GridCell::new(53, 0), &PlannerConfig::default());
        assert!(!result.is_success());
    }
}
