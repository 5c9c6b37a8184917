//! The adaptive blocker: a stationary occupant that counts inbound
//! requests and, at its threshold, runs a vacate → wait → return cycle to
//! open the path before resuming its post.

use crate::grid::{Grid, Pos, Role};
use crate::protocol::{Message, RefuseKind};

use super::core::{BlockerPhase, RobotAgent};

/// Temporary cell for a vacating blocker: prefer a free neighbor
/// (diagonals included) keeping Manhattan distance greater than one from
/// every other static agent; otherwise any free neighbor.
pub(crate) fn find_temporary_position(from: Pos, self_id: &str, grid: &Grid) -> Option<Pos> {
    let statics: Vec<Pos> = grid
        .occupants()
        .into_iter()
        .filter(|(_, occ)| occ.role == Role::StaticBlocker && occ.id != self_id)
        .map(|(pos, _)| pos)
        .collect();

    for cand in from.neighbors8() {
        if grid.is_free(cand) && statics.iter().all(|&s| cand.manhattan(s) > 1) {
            return Some(cand);
        }
    }
    from.neighbors8().into_iter().find(|&cand| grid.is_free(cand))
}

/// Fixed fallback offsets for when no free neighbor exists at all.
pub(crate) fn default_temporary(original: Pos) -> Pos {
    match (original.row, original.col) {
        (2, 2) => Pos::new(1, 1),
        (2, 1) => Pos::new(1, 0),
        (2, 3) => Pos::new(3, 4),
        (row, col) => Pos::new(
            if row > 0 { row - 1 } else { row + 1 },
            if col > 0 { col - 1 } else { col + 1 },
        ),
    }
}

impl RobotAgent {
    /// Incoming `Request` while acting as a static blocker.
    ///
    /// Holding: count it and refuse, unless the count just reached the
    /// threshold, which starts the vacate cycle. In every other phase the
    /// request is granted immediately — including while the grid still
    /// shows this blocker occupying the contested cell.
    pub(crate) fn blocker_handle_request(&mut self, from: &str, cell: Pos, now_ms: u64) {
        let (received, threshold, holding) = {
            let Some(st) = self.blocker.as_mut() else {
                return;
            };
            st.received += 1;
            (st.received, st.threshold, matches!(st.phase, BlockerPhase::Holding))
        };
        self.log(&format!("received request {received} from {from} for cell {cell}"));

        if !holding {
            if let Some(st) = self.blocker.as_mut() {
                st.received = 0;
            }
            let clock = self.clock;
            self.send(from, Message::Grant { clock });
            self.log(&format!("granted access to {from} while temporarily away"));
            return;
        }

        if received >= threshold {
            self.start_vacating(now_ms);
            let clock = self.clock;
            self.send(from, Message::Grant { clock });
            self.log(&format!("granted access to {from}, vacate cycle starting"));
        } else {
            let clock = self.clock;
            self.send(
                from,
                Message::Refuse {
                    kind: RefuseKind::StaticBlocked,
                    clock,
                    count: received,
                },
            );
            self.log(&format!("denied access to {from} ({received}/{threshold} requests)"));
        }
    }

    fn start_vacating(&mut self, _now_ms: u64) {
        let Some(original) = self.blocker.as_ref().map(|st| st.original) else {
            return;
        };
        let chosen = {
            let grid = self.grid.lock();
            find_temporary_position(self.pos, &self.id, &grid)
        };
        let temp = match chosen {
            Some(pos) => pos,
            None => {
                let fallback = default_temporary(original);
                self.log(&format!("no free neighbor, using default temporary position {fallback}"));
                fallback
            }
        };
        if let Some(st) = self.blocker.as_mut() {
            st.received = 0;
            st.phase = BlockerPhase::Vacating { temp };
        }
        self.log(&format!("request threshold reached, temporarily vacating toward {temp}"));
        self.notifier.on_grid_changed();
    }

    /// One tick of the vacate cycle.
    pub(crate) fn blocker_poll(&mut self, now_ms: u64) {
        let (phase, original, due) = {
            let Some(st) = self.blocker.as_ref() else {
                return;
            };
            (
                st.phase,
                st.original,
                now_ms.saturating_sub(st.last_tick_ms) >= self.cfg.blocker_tick_ms,
            )
        };
        if !due {
            return;
        }
        if let Some(st) = self.blocker.as_mut() {
            st.last_tick_ms = now_ms;
        }

        match phase {
            BlockerPhase::Holding => {}
            BlockerPhase::Vacating { temp } => {
                if self.pos == temp {
                    self.log(&format!("reached temporary position {temp}, waiting for movers to pass"));
                    if let Some(st) = self.blocker.as_mut() {
                        st.phase = BlockerPhase::WaitingAtTemp { temp, since_ms: now_ms };
                    }
                } else {
                    self.step_toward(temp);
                }
            }
            BlockerPhase::WaitingAtTemp { since_ms, .. } => {
                if now_ms.saturating_sub(since_ms) >= self.cfg.blocker_wait_ms {
                    self.log("wait complete, returning to original position");
                    if let Some(st) = self.blocker.as_mut() {
                        st.phase = BlockerPhase::Returning;
                    }
                }
            }
            BlockerPhase::Returning => {
                if self.pos == original {
                    self.log("returned to original position, resuming post");
                    if let Some(st) = self.blocker.as_mut() {
                        st.phase = BlockerPhase::Holding;
                    }
                    self.notifier.on_grid_changed();
                } else {
                    self.step_toward(original);
                }
            }
        }
    }

    /// One validated step toward `tgt`, larger-offset axis first, with an
    /// orthogonal sidestep when the preferred cell is taken. No
    /// negotiation: the destination only has to be free and unblocked.
    pub(crate) fn step_toward(&mut self, tgt: Pos) {
        if self.pos == tgt {
            return;
        }
        let d_row = tgt.row - self.pos.row;
        let d_col = tgt.col - self.pos.col;
        let cand = if d_row.abs() > d_col.abs() {
            Pos::new(self.pos.row + d_row.signum(), self.pos.col)
        } else {
            Pos::new(self.pos.row, self.pos.col + d_col.signum())
        };

        let moved = {
            let mut grid = self.grid.lock();
            if !grid.in_bounds(cand) {
                None
            } else if grid.is_free(cand) {
                grid.relocate(self.pos, cand);
                Some(cand)
            } else {
                let mut sidestep = None;
                for alt in self.pos.neighbors4() {
                    if grid.is_free(alt) {
                        grid.relocate(self.pos, alt);
                        sidestep = Some(alt);
                        break;
                    }
                }
                sidestep
            }
        };
        match moved {
            Some(cell) => self.after_move(cell),
            None => self.log(&format!("cell {cand} not free and no alternative, staying")),
        }
    }
}
