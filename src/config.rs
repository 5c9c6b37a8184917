//! Simulation configuration: grid dimensions and every timing/threshold the
//! protocol depends on.
//!
//! The defaults are the values the coordination protocol was tuned with;
//! the negotiation and deadlock logic only depends on the relative ordering
//! of events, so scaling the intervals together is safe.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grid rows.
    pub rows: i32,
    /// Grid columns.
    pub cols: i32,

    /// Minimum interval between move attempts of a mover.
    pub move_interval_ms: u64,
    /// Interval after which an unanswered request is resent.
    pub retry_interval_ms: u64,
    /// Resend budget per request; a capped-out request stays pending but
    /// quiescent.
    pub max_retries: u32,

    /// Consecutive failed move attempts before deadlock is declared.
    pub deadlock_threshold: u32,
    /// Time in deadlock after which the agent gives up permanently.
    pub deadlock_timeout_ms: u64,
    /// Extra Manhattan distance a deadlock detour may cost relative to the
    /// current distance to target.
    pub detour_slack: i32,

    /// How long a blocker waits at its temporary cell before returning.
    pub blocker_wait_ms: u64,
    /// Interval between movement steps of a vacating/returning blocker.
    pub blocker_tick_ms: u64,

    /// Delay between receiving a grant and committing the move, so the
    /// granter's side of the grid mutation settles first.
    pub grant_move_delay_ms: u64,

    /// Cadence at which agent tasks poll for messages and due work.
    pub message_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 5,
            move_interval_ms: 800,
            retry_interval_ms: 500,
            max_retries: 10,
            deadlock_threshold: 3,
            deadlock_timeout_ms: 5000,
            detour_slack: 2,
            blocker_wait_ms: 3000,
            blocker_tick_ms: 300,
            grant_move_delay_ms: 50,
            message_poll_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!((cfg.rows, cfg.cols), (5, 5));
        assert_eq!(cfg.move_interval_ms, 800);
        assert_eq!(cfg.retry_interval_ms, 500);
        assert_eq!(cfg.max_retries, 10);
        assert_eq!(cfg.deadlock_threshold, 3);
        assert_eq!(cfg.deadlock_timeout_ms, 5000);
        assert_eq!(cfg.blocker_wait_ms, 3000);
    }

    #[test]
    fn test_partial_json_override_keeps_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"move_interval_ms": 100}"#).unwrap();
        assert_eq!(cfg.move_interval_ms, 100);
        assert_eq!(cfg.retry_interval_ms, 500);
    }
}
