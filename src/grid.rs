//! Shared grid state: cell occupancy and permanently blocked cells.
//!
//! The grid is the only mutable resource shared between agents. Every
//! mutation goes through the methods below, and callers that need a
//! check-then-act sequence (plan, validate, occupy) hold the surrounding
//! [`SharedGrid`] lock for the whole sequence so no other agent can observe
//! an intermediate state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::MoveError;

/// A cell coordinate. Signed so that candidate neighbors of edge cells can
/// be represented before the bounds check rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub row: i32,
    pub col: i32,
}

impl Pos {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Manhattan distance to `other`.
    pub fn manhattan(self, other: Pos) -> i32 {
        (self.row - other.row).abs() + (self.col - other.col).abs()
    }

    /// True when `other` is exactly one orthogonal step away.
    pub fn is_adjacent(self, other: Pos) -> bool {
        self.manhattan(other) == 1
    }

    /// The four orthogonal neighbors in the fixed scan order used by every
    /// candidate search: up, down, left, right.
    pub fn neighbors4(self) -> [Pos; 4] {
        [
            Pos::new(self.row - 1, self.col),
            Pos::new(self.row + 1, self.col),
            Pos::new(self.row, self.col - 1),
            Pos::new(self.row, self.col + 1),
        ]
    }

    /// The eight neighbors, orthogonal first, then diagonals.
    pub fn neighbors8(self) -> [Pos; 8] {
        [
            Pos::new(self.row - 1, self.col),
            Pos::new(self.row + 1, self.col),
            Pos::new(self.row, self.col - 1),
            Pos::new(self.row, self.col + 1),
            Pos::new(self.row - 1, self.col - 1),
            Pos::new(self.row - 1, self.col + 1),
            Pos::new(self.row + 1, self.col - 1),
            Pos::new(self.row + 1, self.col + 1),
        ]
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// What kind of participant an agent is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Moves toward a target cell.
    Mover,
    /// Holds a fixed cell, vacating temporarily under request pressure.
    StaticBlocker,
}

/// The occupant recorded in a cell. Carries the role so neighbors can be
/// classified without reaching into another agent's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: String,
    pub role: Role,
}

/// The `rows x cols` occupancy map plus the set of permanently blocked
/// cells. A cell is never both occupied and blocked.
#[derive(Debug)]
pub struct Grid {
    rows: i32,
    cols: i32,
    cells: Vec<Option<Occupant>>,
    blocked: HashSet<Pos>,
}

/// The grid as shared between agent tasks: one mutex, one writer at a time.
pub type SharedGrid = Arc<Mutex<Grid>>;

impl Grid {
    pub fn new(rows: i32, cols: i32) -> Self {
        assert!(rows > 0 && cols > 0, "grid dimensions must be positive");
        Self {
            rows,
            cols,
            cells: vec![None; (rows * cols) as usize],
            blocked: HashSet::new(),
        }
    }

    /// Wrap a grid for sharing across tasks.
    pub fn into_shared(self) -> SharedGrid {
        Arc::new(Mutex::new(self))
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.row >= 0 && pos.row < self.rows && pos.col >= 0 && pos.col < self.cols
    }

    fn idx(&self, pos: Pos) -> Option<usize> {
        if self.in_bounds(pos) {
            Some((pos.row * self.cols + pos.col) as usize)
        } else {
            None
        }
    }

    /// False when out of bounds, occupied, or permanently blocked.
    pub fn is_free(&self, pos: Pos) -> bool {
        match self.idx(pos) {
            Some(i) => self.cells[i].is_none() && !self.blocked.contains(&pos),
            None => false,
        }
    }

    /// Out of bounds counts as blocked.
    pub fn is_blocked(&self, pos: Pos) -> bool {
        !self.in_bounds(pos) || self.blocked.contains(&pos)
    }

    /// Occupy a cell. Fails (returning false) when the cell is out of
    /// bounds, blocked, or already occupied; a collision is reported
    /// distinctly and never silently overwrites the current occupant.
    pub fn occupy(&mut self, pos: Pos, occupant: Occupant) -> bool {
        let Some(i) = self.idx(pos) else {
            return false;
        };
        if self.blocked.contains(&pos) {
            log::error!("attempt to occupy blocked cell {pos} by {}", occupant.id);
            return false;
        }
        if let Some(current) = &self.cells[i] {
            log::warn!(
                "attempt to occupy occupied cell {pos}: current occupant {}, new occupant {}",
                current.id,
                occupant.id
            );
            return false;
        }
        self.cells[i] = Some(occupant);
        true
    }

    /// Clear a cell. Out-of-bounds positions are ignored.
    pub fn free(&mut self, pos: Pos) {
        if let Some(i) = self.idx(pos) {
            self.cells[i] = None;
        }
    }

    pub fn occupant_at(&self, pos: Pos) -> Option<&Occupant> {
        self.idx(pos).and_then(|i| self.cells[i].as_ref())
    }

    /// Move the occupant of `from` to `to` as one atomic step. If `to`
    /// cannot be occupied the occupant is restored to `from` and false is
    /// returned.
    pub fn relocate(&mut self, from: Pos, to: Pos) -> bool {
        let Some(i_from) = self.idx(from) else {
            return false;
        };
        let Some(occupant) = self.cells[i_from].take() else {
            log::warn!("relocate from empty cell {from}");
            return false;
        };
        if self.occupy(to, occupant.clone()) {
            true
        } else {
            self.cells[i_from] = Some(occupant);
            false
        }
    }

    /// Classify a proposed single-step move without mutating anything.
    pub fn check_move(&self, from: Pos, to: Pos) -> Result<(), MoveError> {
        if !from.is_adjacent(to) {
            return Err(MoveError::NonAdjacent);
        }
        if !self.in_bounds(to) {
            return Err(MoveError::OutOfBounds);
        }
        if self.blocked.contains(&to) {
            return Err(MoveError::CellBlocked);
        }
        if self.occupant_at(to).is_some() {
            return Err(MoveError::CellOccupied);
        }
        Ok(())
    }

    /// Block or unblock a cell. Blocking fails while the cell is occupied;
    /// unblocking always succeeds. Returns whether the flag was applied.
    pub fn set_blocked(&mut self, pos: Pos, blocked: bool) -> bool {
        let Some(i) = self.idx(pos) else {
            return false;
        };
        if blocked {
            if self.cells[i].is_some() {
                return false;
            }
            self.blocked.insert(pos);
        } else {
            self.blocked.remove(&pos);
        }
        true
    }

    /// Flip the blocked flag of a cell, subject to the same occupancy rule
    /// as [`set_blocked`](Self::set_blocked).
    pub fn toggle_blocked(&mut self, pos: Pos) -> bool {
        let currently = self.blocked.contains(&pos);
        self.set_blocked(pos, !currently)
    }

    pub fn clear_blocked(&mut self) {
        self.blocked.clear();
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Remove every occupant, keeping blocked cells. Used when resetting a
    /// board between scenarios.
    pub fn clear_occupants(&mut self) {
        for cell in &mut self.cells {
            *cell = None;
        }
    }

    /// All occupants with their positions, row-major order.
    pub fn occupants(&self) -> Vec<(Pos, Occupant)> {
        let mut out = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let pos = Pos::new(row, col);
                if let Some(occ) = self.occupant_at(pos) {
                    out.push((pos, occ.clone()));
                }
            }
        }
        out
    }

    /// ASCII rendering of the board: `#` blocked, `.` free, otherwise the
    /// first character of the occupant id.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let pos = Pos::new(row, col);
                let ch = if let Some(occ) = self.occupant_at(pos) {
                    occ.id.chars().next().unwrap_or('?')
                } else if self.is_blocked(pos) {
                    '#'
                } else {
                    '.'
                };
                out.push(ch);
                if col + 1 < self.cols {
                    out.push(' ');
                }
            }
            out.push('\n');
        }
        out
    }
}
