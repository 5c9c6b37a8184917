//! Deadlock detection and resolution for movers.
//!
//! Every failed move attempt (blocked obstacle, refusal, no free neighbor)
//! feeds a consecutive-failure counter. At the threshold the agent flags
//! itself, alerts its peers, and switches from normal negotiation to a
//! resolution loop: bounded detour, then a move away from the target, then
//! waiting. Past the timeout the agent gives up for good — a terminal state
//! for that agent only, never a crash.

use crate::grid::{Grid, Pos, Role};
use crate::protocol::Message;

use super::core::{Control, RobotAgent};

/// A free, unblocked neighbor whose distance to `to` stays within `slack`
/// of the current distance. First match in the fixed scan order wins.
pub(crate) fn find_detour(from: Pos, to: Pos, grid: &Grid, slack: i32) -> Option<Pos> {
    let current = from.manhattan(to);
    from.neighbors4()
        .into_iter()
        .find(|&cand| grid.is_free(cand) && cand.manhattan(to) <= current + slack)
}

/// The cell stepped away from the target on both axes, if free. Diagonal
/// when both axes are off-target; move validation rejects that case
/// downstream.
pub(crate) fn find_opposite(from: Pos, to: Pos, grid: &Grid) -> Option<Pos> {
    let cand = Pos::new(
        from.row - (to.row - from.row).signum(),
        from.col - (to.col - from.col).signum(),
    );
    if cand == from || !grid.is_free(cand) {
        return None;
    }
    Some(cand)
}

impl RobotAgent {
    /// Register one failed move attempt and escalate at the threshold.
    pub(crate) fn record_failure(&mut self, now_ms: u64) {
        self.consecutive_blocks += 1;
        self.check_deadlock(now_ms);
    }

    fn check_deadlock(&mut self, now_ms: u64) {
        if self.role != Role::Mover {
            return;
        }
        if self.consecutive_blocks < self.cfg.deadlock_threshold {
            return;
        }
        if matches!(self.control, Control::InDeadlock { .. } | Control::Stopped) {
            return;
        }
        // An outstanding request is carried into the deadlock state; the
        // counter itself is deliberately not cleared here.
        let pending = match std::mem::replace(&mut self.control, Control::Idle) {
            Control::Requesting(p) => Some(p),
            _ => None,
        };
        self.control = Control::InDeadlock {
            since_ms: now_ms,
            pending,
        };
        self.log(&format!(
            "deadlock detected after {} consecutive blocks",
            self.consecutive_blocks
        ));
        self.notifier
            .on_log(&format!("[DEADLOCK] {} detected deadlock", self.id));
        let alert = Message::DeadlockAlert {
            cell: self.pos,
            clock: self.clock,
        };
        for peer in self.alert_peers.clone() {
            self.send(&peer, alert.clone());
            self.log(&format!("broadcast deadlock alert to {peer}"));
        }
    }

    /// A peer reported a deadlock. Acknowledgement is log-only; the alert
    /// forces no protocol action on the receiver.
    pub(crate) fn handle_alert(&mut self, from: &str, cell: Pos, clock: u64) {
        self.bump_clock(clock);
        self.log(&format!("deadlock alert received from {from} at {cell}"));
    }

    /// One resolution attempt, run instead of normal negotiation while
    /// deadlocked.
    pub(crate) fn attempt_resolution(&mut self, now_ms: u64) {
        self.log("attempting deadlock resolution");

        let detour = {
            let grid = self.grid.lock();
            find_detour(self.pos, self.target, &grid, self.cfg.detour_slack)
        };
        if let Some(cell) = detour {
            self.log(&format!("detour available at {cell}"));
            self.enter_cell(cell, now_ms);
            // Only the detour strategy clears the flag.
            if !matches!(self.control, Control::Stopped) {
                self.control = Control::Idle;
            }
            self.consecutive_blocks = 0;
            return;
        }

        let opposite = {
            let grid = self.grid.lock();
            find_opposite(self.pos, self.target, &grid)
        };
        if let Some(cell) = opposite {
            self.log(&format!("trying opposite direction {cell} to create space"));
            self.enter_cell(cell, now_ms);
            return;
        }

        self.log("waiting for path to clear");
    }
}
