use pilot_geometry::Point2;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::NavigationError;

/// Integer cell coordinate in the sparse world grid.
///
/// Built with `floor`, so negative world coordinates map to negative cells
/// instead of collapsing onto cell 0. +y points down: the cell above is `y - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell owning a world position.
    ///
    /// # Arguments
    /// * `p` - World position.
    /// * `cell_size` - World units per cell; assumed validated by the caller.
    ///
    /// # Returns
    /// * `GridCell` - `(floor(x / cell_size), floor(y / cell_size))`.
    pub fn from_world(p: Point2, cell_size: f64) -> Self {
        Self {
            x: (p.x / cell_size).floor() as i32,
            y: (p.y / cell_size).floor() as i32,
        }
    }

    /// World position of the cell center.
    pub fn center(&self, cell_size: f64) -> Point2 {
        Point2::new(
            (self.x as f64 + 0.5) * cell_size,
            (self.y as f64 + 0.5) * cell_size,
        )
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn above(&self) -> Self {
        self.offset(0, -1)
    }

    pub fn below(&self) -> Self {
        self.offset(0, 1)
    }

    pub fn manhattan(&self, other: GridCell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// What is known about a cell. Unexplored cells have no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Explored,
    Platform,
    Obstacle,
    Gap,
}

impl CellState {
    /// Whether the planner may stand in this cell.
    pub fn is_walkable(&self) -> bool {
        matches!(self, CellState::Explored | CellState::Platform)
    }

    /// Terrain states are never downgraded back to plain `Explored`.
    pub fn is_terrain(&self) -> bool {
        !matches!(self, CellState::Explored)
    }
}

/// Terrain kinds accepted by [`crate::map::WorldMap::mark_terrain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainFeature {
    Platform,
    Obstacle,
    Gap,
}

impl From<TerrainFeature> for CellState {
    fn from(feature: TerrainFeature) -> Self {
        match feature {
            TerrainFeature::Platform => CellState::Platform,
            TerrainFeature::Obstacle => CellState::Obstacle,
            TerrainFeature::Gap => CellState::Gap,
        }
    }
}

/// A cell's state and when it was last written (milliseconds since the epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub state: CellState,
    pub updated_at: u64,
}

impl CellRecord {
    pub fn new(state: CellState) -> Self {
        Self {
            state,
            updated_at: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Rejects cell sizes that would make `from_world` meaningless.
pub fn validate_cell_size(cell_size: f64) -> Result<f64, NavigationError> {
    if cell_size > 0.0 && cell_size.is_finite() {
        Ok(cell_size)
    } else {
        Err(NavigationError::InvalidCellSize("cell size must be positive and finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_world_floors_negative_coordinates() {
        assert_eq!(GridCell::from_world(Point2::new(49.9, 0.0), 50.0), GridCell::new(0, 0));
        assert_eq!(GridCell::from_world(Point2::new(50.0, 0.0), 50.0), GridCell::new(1, 0));
        assert_eq!(GridCell::from_world(Point2::new(-0.1, -50.0), 50.0), GridCell::new(-1, -1));
    }

    #[test]
    fn test_center_round_trips_to_same_cell() {
        let cell = GridCell::new(-3, 7);
        assert_eq!(GridCell::from_world(cell.center(50.0), 50.0), cell);
        assert_eq!(cell.above(), GridCell::new(-3, 6));
        assert_eq!(cell.manhattan(GridCell::new(0, 0)), 10);
    }

    #[test]
    fn test_cell_size_validation() {
        assert!(validate_cell_size(50.0).is_ok());
        assert!(validate_cell_size(0.0).is_err());
        assert!(validate_cell_size(f64::NAN).is_err());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&CellState::Platform).unwrap(), "\"platform\"");
        assert!(CellState::Platform.is_walkable());
        assert!(!CellState::Gap.is_walkable());
        assert!(!CellState::Explored.is_terrain());
    }
}
