//! Predefined boards: grid size, obstacles, and agent rosters.
//!
//! These are the data half of the original control panel's preset buttons;
//! the panel itself is out of scope.

use serde::{Deserialize, Serialize};

use crate::agent::AgentSpec;
use crate::grid::Pos;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub rows: i32,
    pub cols: i32,
    pub blocked: Vec<Pos>,
    pub agents: Vec<AgentSpec>,
}

impl Scenario {
    /// A single mover crossing an empty board corner to corner.
    pub fn open_field() -> Self {
        Self {
            name: "open_field".into(),
            rows: 5,
            cols: 5,
            blocked: Vec::new(),
            agents: vec![AgentSpec::mover("Robot1", Pos::new(0, 0), Pos::new(4, 4))],
        }
    }

    /// Two movers on crossing diagonals.
    pub fn crossing() -> Self {
        Self {
            name: "crossing".into(),
            rows: 5,
            cols: 5,
            blocked: Vec::new(),
            agents: vec![
                AgentSpec::mover("Robot1", Pos::new(0, 0), Pos::new(4, 4)),
                AgentSpec::mover("Robot2", Pos::new(4, 0), Pos::new(0, 4)),
            ],
        }
    }

    /// Two movers swapping ends of the same column.
    pub fn head_on() -> Self {
        Self {
            name: "head_on".into(),
            rows: 5,
            cols: 5,
            blocked: Vec::new(),
            agents: vec![
                AgentSpec::mover("Robot1", Pos::new(0, 2), Pos::new(4, 2)),
                AgentSpec::mover("Robot2", Pos::new(4, 2), Pos::new(0, 2)),
            ],
        }
    }

    /// The head-on swap with row 2 walled off by three adaptive blockers,
    /// each needing three requests before vacating.
    pub fn adaptive_blockers() -> Self {
        Self {
            name: "adaptive_blockers".into(),
            rows: 5,
            cols: 5,
            blocked: Vec::new(),
            agents: vec![
                AgentSpec::blocker("BlockTop", Pos::new(2, 1), 3),
                AgentSpec::blocker("BlockMiddle", Pos::new(2, 2), 3),
                AgentSpec::blocker("BlockBottom", Pos::new(2, 3), 3),
                AgentSpec::mover("Robot1", Pos::new(0, 2), Pos::new(4, 2)),
                AgentSpec::mover("Robot2", Pos::new(4, 2), Pos::new(0, 2)),
            ],
        }
    }

    /// A mover walled into its corner: deadlock is detected and, with no
    /// detour available, the agent gives up at the timeout.
    pub fn boxed_in() -> Self {
        Self {
            name: "boxed_in".into(),
            rows: 5,
            cols: 5,
            blocked: vec![Pos::new(0, 1), Pos::new(1, 0)],
            agents: vec![AgentSpec::mover("Robot1", Pos::new(0, 0), Pos::new(4, 4))],
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "open_field" => Some(Self::open_field()),
            "crossing" => Some(Self::crossing()),
            "head_on" => Some(Self::head_on()),
            "adaptive_blockers" => Some(Self::adaptive_blockers()),
            "boxed_in" => Some(Self::boxed_in()),
            _ => None,
        }
    }

    pub fn names() -> Vec<&'static str> {
        vec!["open_field", "crossing", "head_on", "adaptive_blockers", "boxed_in"]
    }
}
