use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::hash::Hash;

use tracing::debug;

use super::grid::PlannerGrid;
use super::{Action, PathResult, PlannerConfig, Waypoint};
use crate::map::GridCell;

/// Open-set entry. Ordered so the max-heap pops the lowest `f` first and,
/// among equal `f`, the entry pushed first.
#[derive(Debug, Clone, Copy)]
struct State<N> {
    f: f64,
    seq: u64,
    node: N,
}

impl<N> Ord for State<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.f.total_cmp(&self.f).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<N> PartialOrd for State<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<N> PartialEq for State<N> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<N> Eq for State<N> {}

/// Raw outcome of [`search`]: the node path with the edge taken into each
/// node (the start carries `start_edge`).
pub(crate) struct Search<N, E> {
    pub path: Option<Vec<(N, E)>>,
    pub cost: f64,
    pub explored: usize,
}

/// Weighted A* over any graph.
///
/// # Arguments
/// * `start`, `goal` - Endpoints.
/// * `start_edge` - Edge value reported for the start node.
/// * `neighbors` - Successors of a node as `(node, edge, cost)`.
/// * `heuristic` - Estimated remaining cost; multiplied by `weight`.
/// * `max_expansions` - Nodes expanded before giving up.
pub(crate) fn search<N, E, F, H>(
    start: N,
    goal: N,
    start_edge: E,
    mut neighbors: F,
    heuristic: H,
    weight: f64,
    max_expansions: usize,
) -> Search<N, E>
where
    N: Copy + Eq + Hash,
    E: Copy,
    F: FnMut(N) -> Vec<(N, E, f64)>,
    H: Fn(N) -> f64,
{
    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<N, (N, E)> = HashMap::new();
    let mut g_score: HashMap<N, f64> = HashMap::new();
    let mut closed: HashSet<N> = HashSet::new();
    let mut seq = 0u64;
    let mut explored = 0usize;

    g_score.insert(start, 0.0);
    open.push(State {
        f: weight * heuristic(start),
        seq,
        node: start,
    });

    while let Some(State { node, .. }) = open.pop() {
        if !closed.insert(node) {
            continue;
        }
        let g = g_score.get(&node).copied().unwrap_or(f64::INFINITY);

        if node == goal {
            return Search {
                path: Some(reconstruct_path(&came_from, start, start_edge, goal)),
                cost: g,
                explored,
            };
        }

        explored += 1;
        if explored > max_expansions {
            debug!(explored, "search expansion limit reached");
            break;
        }

        for (next, edge, step) in neighbors(node) {
            if closed.contains(&next) {
                continue;
            }
            let tentative = g + step;
            let improved = match g_score.entry(next) {
                Entry::Occupied(mut best) if tentative < *best.get() => {
                    best.insert(tentative);
                    true
                }
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(tentative);
                    true
                }
            };
            if improved {
                came_from.insert(next, (node, edge));
                seq += 1;
                open.push(State {
                    f: tentative + weight * heuristic(next),
                    seq,
                    node: next,
                });
            }
        }
    }

    Search {
        path: None,
        cost: 0.0,
        explored,
    }
}

fn reconstruct_path<N, E>(came_from: &HashMap<N, (N, E)>, start: N, start_edge: E, goal: N) -> Vec<(N, E)>
where
    N: Copy + Eq + Hash,
    E: Copy,
{
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&(previous, edge)) => {
                path.push((current, edge));
                current = previous;
            }
            None => break,
        }
    }
    path.push((start, start_edge));
    path.reverse();
    path
}

/// Flat A* from `start` to `goal` over the affordance grid.
///
/// The heuristic is the Manhattan distance in cells scaled by
/// `config.heuristic_weight`. Waypoint positions are cell centers.
pub fn find_path(grid: &PlannerGrid, start: GridCell, goal: GridCell, config: &PlannerConfig) -> PathResult {
    let result = search(
        start,
        goal,
        Action::Move,
        |cell| grid.neighbors(cell),
        |cell| f64::from(cell.manhattan(goal)),
        config.heuristic_weight,
        config.max_expansions,
    );

    match result.path {
        Some(steps) => {
            let path = steps
                .into_iter()
                .map(|(cell, action)| Waypoint::new(action, cell, grid.cell_size()))
                .collect();
            PathResult::success(path, result.cost, result.explored)
        }
        None => PathResult::failure(result.explored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{MapConfig, ObjectKind, TerrainFeature, WorldMap};
    use pilot_geometry::Point2;

    fn explore_row(world: &mut WorldMap, cy: i32, xs: std::ops::RangeInclusive<i32>) {
        for x in xs {
            world.mark_explored(GridCell::new(x, cy).center(50.0));
        }
    }

    fn plan(world: &WorldMap, start: GridCell, goal: GridCell) -> PathResult {
        let grid = PlannerGrid::new(world, None, start);
        find_path(&grid, start, goal, &PlannerConfig::default())
    }

    #[test]
    fn test_straight_run_is_manhattan_length() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=4);
        let start = GridCell::from_world(Point2::new(0.0, 0.0), 50.0);
        let goal = GridCell::from_world(Point2::new(200.0, 0.0), 50.0);

        let result = plan(&world, start, goal);
        let path = result.path.clone().unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(result.total_cost, Some(4.0));
        assert!(path.windows(2).all(|w| w[1].cell.y == w[0].cell.y && w[1].cell.x == w[0].cell.x + 1));
        assert!(path.iter().all(|w| w.action == Action::Move));
        assert_eq!(path[4].position, Point2::new(225.0, 25.0));
    }

    #[test]
    fn test_start_equals_goal_is_single_point() {
        let world = WorldMap::new(MapConfig::default()).unwrap();
        let result = plan(&world, GridCell::new(2, 2), GridCell::new(2, 2));
        assert!(result.is_success());
        assert_eq!(result.path_length, 1);
        assert_eq!(result.total_cost, Some(0.0));
    }

    #[test]
    fn test_unreachable_goal_is_failure() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=2);
        explore_row(&mut world, 0, 5..=6);
        let result = plan(&world, GridCell::new(0, 0), GridCell::new(6, 0));
        assert!(!result.is_success());
        assert!(result.path.is_none());
        assert_eq!(result.nodes_explored, 3);
    }

    #[test]
    fn test_obstacle_forces_jump_over_wall() {
        // Two floors; the lower one is cut by a wall so the route climbs.
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 4, 0..=6);
        explore_row(&mut world, 2, 0..=6);
        world.mark_terrain(GridCell::new(3, 4).center(50.0), TerrainFeature::Obstacle);

        let result = plan(&world, GridCell::new(0, 4), GridCell::new(6, 2));
        let path = result.path.unwrap();
        assert_eq!(path.first().unwrap().cell, GridCell::new(0, 4));
        assert_eq!(path.last().unwrap().cell, GridCell::new(6, 2));
        assert!(path.iter().any(|w| w.action == Action::Jump));
        assert!(path.iter().all(|w| w.cell != GridCell::new(3, 4)));
    }

    #[test]
    fn test_portal_shortcut_is_taken() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=1);
        explore_row(&mut world, 0, 40..=41);
        world.add_object(ObjectKind::Portal, GridCell::new(1, 0).center(50.0), Some(GridCell::new(40, 0).center(50.0)));

        let result = plan(&world, GridCell::new(0, 0), GridCell::new(41, 0));
        let actions: Vec<Action> = result.path.unwrap().iter().map(|w| w.action).collect();
        assert_eq!(actions, vec![Action::Move, Action::Move, Action::UsePortal, Action::Move]);
    }

    #[test]
    fn test_expansion_limit_bounds_search() {
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=200);
        let grid = PlannerGrid::new(&world, None, GridCell::new(0, 0));
        let config = PlannerConfig {
            max_expansions: 10,
            ..PlannerConfig::default()
        };
        let result = find_path(&grid, GridCell::new(0, 0), GridCell::new(500, 0), &config);
        assert!(!result.is_success());
        assert!(result.nodes_explored <= 11);
    }

    #[test]
    fn test_heuristic_weight() {
        // Walking costs 30, the portal route costs 3.
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        explore_row(&mut world, 0, 0..=30);
        world.add_object(ObjectKind::Portal, GridCell::new(1, 0).center(50.0), Some(GridCell::new(29, 0).center(50.0)));
        let grid = PlannerGrid::new(&world, None, GridCell::new(0, 0));
        let run = |weight: f64| {
            let config = PlannerConfig {
                heuristic_weight: weight,
                ..PlannerConfig::default()
            };
            find_path(&grid, GridCell::new(0, 0), GridCell::new(30, 0), &config)
        };

        let uniform = run(0.0);
        assert_eq!(uniform.total_cost, Some(3.0));
        assert_eq!(uniform.path.as_ref().unwrap().last().unwrap().cell, GridCell::new(30, 0));

        let greedy = run(5.0);
        assert!(greedy.is_success());
        assert_eq!(greedy.path.unwrap().last().unwrap().cell, GridCell::new(30, 0));
        assert!(greedy.total_cost.unwrap() >= 3.0);
        assert!(greedy.nodes_explored <= uniform.nodes_explored);
    }
}
