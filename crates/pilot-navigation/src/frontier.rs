use pilot_geometry::Point2;
use rand::seq::IndexedRandom;

use crate::map::{GridCell, WorldMap};

/// A known walkable cell bordering unexplored space.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontier {
    /// The walkable cell the player can reach.
    pub cell: GridCell,
    /// World position of the cell center.
    pub position: Point2,
    /// Horizontal neighbours with no map entry.
    pub unknown_neighbors: Vec<GridCell>,
}

/// Finds every frontier in the map, sorted by cell.
///
/// A frontier is a walkable cell whose left or right neighbour has never been
/// seen. Vertical neighbours are ignored: the space above a platform is
/// normally empty air and would make every cell a frontier.
///
/// # Arguments
/// * `world` - The map to search.
///
/// # Returns
/// * `Vec<Frontier>` - Frontier cells, possibly empty.
pub fn find_frontiers(world: &WorldMap) -> Vec<Frontier> {
    let mut frontiers: Vec<Frontier> = world
        .cells()
        .filter(|(_, record)| record.state.is_walkable())
        .filter_map(|(cell, _)| {
            let unknown: Vec<GridCell> = [cell.offset(-1, 0), cell.offset(1, 0)]
                .into_iter()
                .filter(|n| world.record(*n).is_none())
                .collect();
            (!unknown.is_empty()).then(|| Frontier {
                cell: *cell,
                position: cell.center(world.cell_size()),
                unknown_neighbors: unknown,
            })
        })
        .collect();
    frontiers.sort_by_key(|f| f.cell);
    frontiers
}

/// Selects the frontier closest to `current` by Manhattan distance in cells.
///
/// # Returns
/// * `Option<&Frontier>` - The closest frontier, or None if the list is empty.
pub fn select_closest_frontier(frontiers: &[Frontier], current: GridCell) -> Option<&Frontier> {
    frontiers.iter().min_by_key(|f| (f.cell.manhattan(current), f.cell))
}

/// Selects the frontier with the most unknown neighbours.
pub fn select_largest_frontier(frontiers: &[Frontier]) -> Option<&Frontier> {
    frontiers.iter().max_by_key(|f| f.unknown_neighbors.len())
}

/// Selects a random frontier from the list.
///
/// # Arguments
/// * `frontiers` - A slice of `Frontier` structs to choose from.
/// * `rng` - A mutable reference to a random number generator.
pub fn select_random_frontier<'a, R: rand::Rng + ?Sized>(frontiers: &'a [Frontier], rng: &mut R) -> Option<&'a Frontier> {
    frontiers.choose(rng)
}
