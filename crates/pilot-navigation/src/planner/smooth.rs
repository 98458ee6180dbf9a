use super::grid::PlannerGrid;
use super::{Action, Waypoint};
use crate::map::GridCell;

/// Collapses a dense cell path into fewer, longer actions.
///
/// From each anchor the farthest reachable raw point wins, trying a direct
/// jump, then a rope ride, then a portal hop, then a walk with line of sight.
/// When nothing connects, the anchor advances one raw step and keeps that
/// step's own action.
pub fn smooth_path(grid: &PlannerGrid, raw: &[Waypoint]) -> Vec<Waypoint> {
    if raw.len() < 3 {
        return raw.to_vec();
    }

    let mut smoothed = vec![raw[0]];
    let mut anchor = 0;
    while anchor < raw.len() - 1 {
        let from = raw[anchor].cell;
        let shortcut = (anchor + 1..raw.len())
            .rev()
            .find_map(|i| connect(grid, from, raw[i].cell).map(|action| (i, action)));

        match shortcut {
            Some((i, action)) => {
                smoothed.push(Waypoint { action, ..raw[i] });
                anchor = i;
            }
            None => {
                anchor += 1;
                smoothed.push(raw[anchor]);
            }
        }
    }
    smoothed
}

/// Single action that takes the player from `a` to `b`, if any.
fn connect(grid: &PlannerGrid, a: GridCell, b: GridCell) -> Option<Action> {
    if is_direct_jump(grid, a, b) {
        Some(Action::Jump)
    } else if grid.rope_connects(a, b) {
        Some(Action::UseRope)
    } else if grid.portal_destination(a) == Some(b) && !grid.is_blocked(b) {
        Some(Action::UsePortal)
    } else if has_walk_line(grid, a, b) {
        Some(Action::Move)
    } else {
        None
    }
}

/// One or two cells up, at most two across, from a platform.
fn is_direct_jump(grid: &PlannerGrid, a: GridCell, b: GridCell) -> bool {
    let dy = b.y - a.y;
    (dy == -1 || dy == -2) && (b.x - a.x).abs() <= 2 && grid.can_jump_from(a) && grid.is_traversable(b)
}

/// Bresenham line from `a` to `b` where every cell is walkable. Walking never
/// gains height, so targets above `a` are rejected.
fn has_walk_line(grid: &PlannerGrid, a: GridCell, b: GridCell) -> bool {
    if b.y < a.y {
        return false;
    }
    line_cells(a, b).into_iter().all(|cell| grid.is_walkable(cell))
}

/// Cells visited by Bresenham's line from `a` to `b`, endpoints included.
pub(crate) fn line_cells(a: GridCell, b: GridCell) -> Vec<GridCell> {
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (a.x, a.y);
    let mut cells = Vec::with_capacity((dx - dy) as usize + 1);

    loop {
        cells.push(GridCell::new(x, y));
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    cells
}
