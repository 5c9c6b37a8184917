//! Stateless next-step planning toward a target cell.
//!
//! The planner only reads the grid and never mutates it; the grid can change
//! between planning and acting, so callers re-validate under the grid lock
//! before committing a move.

use crate::grid::{Grid, Pos};

/// Preferred next cell from `from` toward `to`.
///
/// The row axis is tried first, then the column axis; a direct candidate is
/// rejected only when out of bounds or permanently blocked — an occupied
/// cell is still returned so the caller can negotiate with its occupant.
/// When both direct candidates are unusable the search falls back to
/// [`best_adjacent`]. Returns `None` when no neighbor qualifies at all.
pub fn next_step(from: Pos, to: Pos, grid: &Grid) -> Option<Pos> {
    let d_row = to.row - from.row;
    if d_row != 0 {
        let cand = Pos::new(from.row + d_row.signum(), from.col);
        if grid.in_bounds(cand) && !grid.is_blocked(cand) {
            return Some(cand);
        }
    }

    let d_col = to.col - from.col;
    if d_col != 0 {
        let cand = Pos::new(from.row, from.col + d_col.signum());
        if grid.in_bounds(cand) && !grid.is_blocked(cand) {
            return Some(cand);
        }
    }

    best_adjacent(from, to, grid)
}

/// The best currently-free orthogonal neighbor of `from`.
///
/// Neighbors are scanned in the fixed order up, down, left, right and must
/// be in bounds, unblocked, and free. A neighbor that reduces the Manhattan
/// distance to `to` wins immediately; otherwise the first non-improving
/// neighbor found is returned. `None` when every neighbor is unusable.
pub fn best_adjacent(from: Pos, to: Pos, grid: &Grid) -> Option<Pos> {
    let current = from.manhattan(to);
    let mut fallback = None;
    for cand in from.neighbors4() {
        if !grid.is_free(cand) {
            continue;
        }
        if cand.manhattan(to) < current {
            return Some(cand);
        }
        if fallback.is_none() {
            fallback = Some(cand);
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Occupant, Role};

    fn occ(id: &str) -> Occupant {
        Occupant {
            id: id.to_string(),
            role: Role::Mover,
        }
    }

    #[test]
    fn test_row_axis_is_preferred() {
        let grid = Grid::new(5, 5);
        let step = next_step(Pos::new(0, 0), Pos::new(4, 4), &grid);
        assert_eq!(step, Some(Pos::new(1, 0)));
    }

    #[test]
    fn test_column_axis_when_rows_aligned() {
        let grid = Grid::new(5, 5);
        let step = next_step(Pos::new(4, 0), Pos::new(4, 4), &grid);
        assert_eq!(step, Some(Pos::new(4, 1)));
    }

    #[test]
    fn test_occupied_direct_candidate_is_still_returned() {
        let mut grid = Grid::new(5, 5);
        grid.occupy(Pos::new(1, 0), occ("Robot2"));
        // Occupancy does not disqualify the direct candidate; that is what
        // negotiation is for.
        assert_eq!(next_step(Pos::new(0, 0), Pos::new(4, 0), &grid), Some(Pos::new(1, 0)));
    }

    #[test]
    fn test_blocked_direct_candidate_falls_to_other_axis() {
        let mut grid = Grid::new(5, 5);
        grid.set_blocked(Pos::new(1, 0), true);
        assert_eq!(next_step(Pos::new(0, 0), Pos::new(4, 4), &grid), Some(Pos::new(0, 1)));
    }

    #[test]
    fn test_both_axes_blocked_falls_to_best_adjacent() {
        let mut grid = Grid::new(5, 5);
        grid.set_blocked(Pos::new(2, 1), true);
        grid.set_blocked(Pos::new(1, 2), true);
        // From (1,1) toward (4,4): both direct candidates blocked, best
        // adjacent scans up, down, left, right for a free cell.
        assert_eq!(next_step(Pos::new(1, 1), Pos::new(4, 4), &grid), Some(Pos::new(0, 1)));
    }

    #[test]
    fn test_best_adjacent_prefers_distance_reducing() {
        let grid = Grid::new(5, 5);
        // From (1,1) toward (4,4) the first scanned improving neighbor is
        // down, even though up comes first in scan order.
        assert_eq!(best_adjacent(Pos::new(1, 1), Pos::new(4, 4), &grid), Some(Pos::new(2, 1)));
    }

    #[test]
    fn test_best_adjacent_neutral_fallback_in_scan_order() {
        let mut grid = Grid::new(5, 5);
        // Improving neighbors of (1,1) toward (4,4) are down and right;
        // remove both and the first neutral neighbor (up) wins.
        grid.set_blocked(Pos::new(2, 1), true);
        grid.occupy(Pos::new(1, 2), occ("Robot2"));
        assert_eq!(best_adjacent(Pos::new(1, 1), Pos::new(4, 4), &grid), Some(Pos::new(0, 1)));
    }

    #[test]
    fn test_no_candidate_when_surrounded() {
        let mut grid = Grid::new(5, 5);
        grid.set_blocked(Pos::new(0, 1), true);
        grid.set_blocked(Pos::new(1, 0), true);
        assert_eq!(next_step(Pos::new(0, 0), Pos::new(4, 4), &grid), None);
        assert_eq!(best_adjacent(Pos::new(0, 0), Pos::new(4, 4), &grid), None);
    }
}
