//! Request/grant/queue/release negotiation for single-cell contention,
//! including retry-on-timeout.

use crate::error::MoveError;
use crate::grid::{Occupant, Pos};
use crate::planner;
use crate::protocol::Message;

use super::core::{Control, PendingRequest, QueuedRequest, RobotAgent};

/// The timestamp-ordered priority rule. The occupant grants an incoming
/// request iff its own outstanding request carries a strictly greater
/// timestamp, or the timestamps tie and its own id sorts lexicographically
/// greater — the older (and on ties, lexicographically smaller) request
/// wins contention.
pub fn should_grant(
    own_timestamp: u64,
    own_id: &str,
    incoming_timestamp: u64,
    incoming_id: &str,
) -> bool {
    own_timestamp > incoming_timestamp
        || (own_timestamp == incoming_timestamp && own_id > incoming_id)
}

enum StepOutcome {
    Moved,
    NonAdjacent,
    Blocked,
    Occupied(Option<Occupant>),
}

impl RobotAgent {
    /// Incoming `Request` for the cell this agent occupies.
    pub(crate) fn handle_request(&mut self, from: &str, cell: Pos, timestamp: u64, now_ms: u64) {
        self.bump_clock(timestamp);

        if self.blocker.is_some() {
            self.blocker_handle_request(from, cell, now_ms);
            return;
        }

        let grant = match self.pending() {
            Some(p) => should_grant(p.timestamp, &self.id, timestamp, from),
            None => true,
        };
        if grant {
            let clock = self.clock;
            self.send(from, Message::Grant { clock });
            self.log(&format!("granted access to cell {cell} for {from}"));
        } else {
            self.queued.push_back(QueuedRequest {
                from: from.to_string(),
                cell,
                timestamp,
            });
            self.log(&format!("queued request from {from} for cell {cell}"));
        }
    }

    /// Incoming `Grant`. The first grant for the pending request is
    /// sufficient; the move itself is committed after a short delay by
    /// [`commit_move`](Self::commit_move).
    pub(crate) fn handle_grant(&mut self, from: &str, now_ms: u64) {
        self.log(&format!("grant received from {from}"));
        self.consecutive_blocks = 0;
        let due = now_ms + self.cfg.grant_move_delay_ms;
        if let Some(p) = self.pending_mut() {
            if !p.granted() {
                p.commit_due_ms = Some(due);
                p.peer = from.to_string();
                p.retries = 0;
            }
        }
    }

    /// Incoming `Refuse` from a static blocker: a hard failure, but the
    /// request stays pending — the next attempt may succeed once the
    /// blocker's threshold is reached.
    pub(crate) fn handle_refuse(&mut self, from: &str, count: u32, now_ms: u64) {
        self.log(&format!("blocked by static agent {from} (request count {count})"));
        if let Some(p) = self.pending_mut() {
            p.retries = 0;
            p.last_sent_ms = now_ms;
        }
        self.record_failure(now_ms);
    }

    /// Incoming `Release`: answer the oldest queued request, if any.
    pub(crate) fn handle_release(&mut self, from: &str) {
        self.log(&format!("release received from {from}"));
        if let Some(q) = self.queued.pop_front() {
            let clock = self.clock;
            self.send(&q.from, Message::Grant { clock });
            self.log(&format!("granted queued request from {} for cell {}", q.from, q.cell));
        }
    }

    /// One movement attempt: plan a step and either take it directly,
    /// search an alternative, or open a negotiation with the occupant.
    pub(crate) fn initiate_move(&mut self, now_ms: u64) {
        if self.reached_target() {
            self.log("target reached");
            self.control = Control::Stopped;
            return;
        }
        let planned = {
            let grid = self.grid.lock();
            planner::next_step(self.pos, self.target, &grid)
        };
        match planned {
            Some(cell) => {
                self.log(&format!("planning to move to {cell}"));
                self.enter_cell(cell, now_ms);
            }
            None => {
                self.log("no usable neighbor, staying put");
                self.record_failure(now_ms);
            }
        }
    }

    /// Validate and act on a single-step candidate: move if free, count a
    /// failure if blocked, negotiate if occupied.
    pub(crate) fn enter_cell(&mut self, cell: Pos, now_ms: u64) {
        match self.try_step(cell) {
            StepOutcome::Moved => self.after_move(cell),
            StepOutcome::NonAdjacent => {
                log::warn!("[{}] rejected non-adjacent move {} -> {}", self.id, self.pos, cell);
                self.log(&format!("refusing non-adjacent move to {cell}"));
            }
            StepOutcome::Blocked => {
                self.log(&format!("cell {cell} is blocked"));
                self.record_failure(now_ms);
            }
            StepOutcome::Occupied(Some(occ)) => self.begin_request(cell, occ.id, now_ms),
            StepOutcome::Occupied(None) => {
                self.log(&format!("cell {cell} freed up mid-decision, retrying next cycle"));
            }
        }
    }

    /// Like [`enter_cell`](Self::enter_cell) but never negotiates: an
    /// occupied cell is simply reported. Used for opportunistic sidesteps.
    pub(crate) fn move_to_cell(&mut self, cell: Pos, now_ms: u64) {
        match self.try_step(cell) {
            StepOutcome::Moved => self.after_move(cell),
            StepOutcome::NonAdjacent => {
                log::warn!("[{}] rejected non-adjacent move {} -> {}", self.id, self.pos, cell);
                self.log(&format!("refusing non-adjacent move to {cell}"));
            }
            StepOutcome::Blocked => {
                self.log(&format!("cell {cell} is blocked"));
                self.record_failure(now_ms);
            }
            StepOutcome::Occupied(_) => {
                self.log(&format!("cell {cell} is occupied"));
            }
        }
    }

    /// Check-then-act under one grid lock: no other agent can observe the
    /// cell between validation and occupation.
    fn try_step(&mut self, cell: Pos) -> StepOutcome {
        let mut grid = self.grid.lock();
        match grid.check_move(self.pos, cell) {
            Ok(()) => {
                grid.relocate(self.pos, cell);
                StepOutcome::Moved
            }
            Err(MoveError::NonAdjacent) => StepOutcome::NonAdjacent,
            Err(MoveError::OutOfBounds) | Err(MoveError::CellBlocked) => StepOutcome::Blocked,
            Err(MoveError::CellOccupied) => StepOutcome::Occupied(grid.occupant_at(cell).cloned()),
        }
    }

    /// Open a negotiation for `cell` with its occupant `peer`.
    pub(crate) fn begin_request(&mut self, cell: Pos, peer: String, now_ms: u64) {
        self.clock += 1;
        let pending = PendingRequest {
            cell,
            timestamp: self.clock,
            peer: peer.clone(),
            retries: 0,
            last_sent_ms: now_ms,
            commit_due_ms: None,
        };
        let timestamp = pending.timestamp;
        self.control = match std::mem::replace(&mut self.control, Control::Idle) {
            Control::InDeadlock { since_ms, .. } => Control::InDeadlock {
                since_ms,
                pending: Some(pending),
            },
            _ => Control::Requesting(pending),
        };
        self.send(&peer, Message::Request { cell, timestamp });
        self.log(&format!("requesting cell {cell} from {peer}"));
    }

    /// Commit a granted move, re-validating adjacency, block status, and
    /// freedom first. Any validation failure aborts the move and clears
    /// pending state; if the cell was taken in the meantime, an adjacent
    /// sidestep is tried instead.
    pub(crate) fn commit_move(&mut self, now_ms: u64) {
        let Some(pending) = self.take_pending() else {
            return;
        };
        let cell = pending.cell;
        match self.try_step(cell) {
            StepOutcome::Moved => {
                let old = self.pos;
                self.after_move(cell);
                let clock = self.clock;
                self.send(&pending.peer, Message::Release { cell: old, clock });
                self.log(&format!("sent release for {old} to {}", pending.peer));
            }
            StepOutcome::NonAdjacent => {
                self.log(&format!("granted cell {cell} is not adjacent, canceling move"));
            }
            StepOutcome::Blocked => {
                self.log(&format!("granted cell {cell} is blocked, canceling move"));
                self.record_failure(now_ms);
            }
            StepOutcome::Occupied(_) => {
                self.log(&format!("granted cell {cell} is occupied again, canceling move"));
                let alternate = {
                    let grid = self.grid.lock();
                    planner::best_adjacent(self.pos, self.target, &grid)
                };
                if let Some(alt) = alternate {
                    self.log(&format!("trying adjacent move to {alt}"));
                    self.move_to_cell(alt, now_ms);
                }
            }
        }
    }

    /// Resend an unanswered request with its original timestamp, up to the
    /// retry cap. A capped-out request stops retrying but remains pending.
    /// A request whose cell has meanwhile emptied counts as a failed
    /// attempt, feeding deadlock escalation.
    pub(crate) fn maybe_retry(&mut self, now_ms: u64) {
        let interval = self.cfg.retry_interval_ms;
        let max_retries = self.cfg.max_retries;
        let (cell, timestamp, attempt) = match self.pending_mut() {
            Some(p)
                if !p.granted()
                    && now_ms.saturating_sub(p.last_sent_ms) >= interval
                    && p.retries < max_retries =>
            {
                p.retries += 1;
                p.last_sent_ms = now_ms;
                (p.cell, p.timestamp, p.retries)
            }
            _ => return,
        };
        let occupant = {
            let grid = self.grid.lock();
            grid.occupant_at(cell).cloned()
        };
        match occupant {
            Some(occ) => {
                if let Some(p) = self.pending_mut() {
                    p.peer = occ.id.clone();
                }
                self.send(&occ.id, Message::Request { cell, timestamp });
                self.log(&format!("retrying request for cell {cell}, attempt {attempt}"));
            }
            None => {
                self.log(&format!("requested cell {cell} is no longer occupied"));
                self.record_failure(now_ms);
            }
        }
    }
}
