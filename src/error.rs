//! Error types for grid movement and simulation assembly.

use thiserror::Error;

use crate::grid::Pos;

/// Why a proposed single-cell move cannot be applied.
///
/// `OutOfBounds` and `CellBlocked` are permanent conditions that feed the
/// consecutive-failure counter; `CellOccupied` is transient and triggers
/// negotiation with the occupant; `NonAdjacent` is a planning invariant
/// violation that aborts the move without touching the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("cell is outside the grid")]
    OutOfBounds,

    #[error("cell is permanently blocked")]
    CellBlocked,

    #[error("cell is occupied by another agent")]
    CellOccupied,

    #[error("cell is not adjacent to the current position")]
    NonAdjacent,
}

/// Errors raised while assembling or controlling a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("agent id {id:?} is already registered")]
    DuplicateAgent { id: String },

    #[error("start cell {pos} is not available for agent {id:?}")]
    StartUnavailable { id: String, pos: Pos },
}
