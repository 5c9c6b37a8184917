//! Cross-agent coordination driven deterministically: a synthetic clock, a
//! round-robin message drain, and occupancy invariants checked after every
//! tick.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use robogrid::{
    AgentSpec, CollectingNotifier, Config, Envelope, Grid, Notifier, Occupant, Pos, RobotAgent,
    Role, Router, Scenario, SharedGrid,
};

const TICK_MS: u64 = 50;

struct Harness {
    grid: SharedGrid,
    #[allow(dead_code)]
    router: Arc<Router>,
    notifier: Arc<CollectingNotifier>,
    agents: Vec<RobotAgent>,
    mailboxes: Vec<UnboundedReceiver<Envelope>>,
    now: u64,
}

impl Harness {
    fn from_scenario(scenario: &Scenario) -> Self {
        let grid = Grid::new(scenario.rows, scenario.cols).into_shared();
        {
            let mut g = grid.lock();
            for &pos in &scenario.blocked {
                assert!(g.set_blocked(pos, true));
            }
        }
        let router = Arc::new(Router::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let cfg = Arc::new(Config::default());

        let mut agents = Vec::new();
        let mut mailboxes = Vec::new();
        for spec in &scenario.agents {
            let rx = router.register(&spec.id);
            assert!(grid.lock().occupy(
                spec.start,
                Occupant {
                    id: spec.id.clone(),
                    role: spec.role,
                },
            ));
            agents.push(RobotAgent::new(
                spec.clone(),
                grid.clone(),
                router.clone(),
                Arc::clone(&notifier) as Arc<dyn Notifier>,
                cfg.clone(),
            ));
            mailboxes.push(rx);
        }

        let mover_ids: Vec<String> = agents
            .iter()
            .filter(|a| a.role() == Role::Mover)
            .map(|a| a.id().to_string())
            .collect();
        for agent in &mut agents {
            if agent.role() == Role::Mover {
                let peers = mover_ids
                    .iter()
                    .filter(|id| id.as_str() != agent.id())
                    .cloned()
                    .collect();
                agent.set_alert_peers(peers);
            }
        }

        Self {
            grid,
            router,
            notifier,
            agents,
            mailboxes,
            now: 0,
        }
    }

    fn tick(&mut self) {
        self.now += TICK_MS;
        for i in 0..self.agents.len() {
            while let Ok(envelope) = self.mailboxes[i].try_recv() {
                self.agents[i].handle_message(envelope, self.now);
            }
            self.agents[i].poll(self.now);
        }
        self.assert_occupancy_invariants();
    }

    /// Run until `pred` holds or the simulated time limit passes. Returns
    /// whether the predicate was reached.
    fn run_until(&mut self, limit_ms: u64, mut pred: impl FnMut(&Harness) -> bool) -> bool {
        while self.now < limit_ms {
            self.tick();
            if pred(self) {
                return true;
            }
        }
        false
    }

    fn agent(&self, id: &str) -> &RobotAgent {
        self.agents
            .iter()
            .find(|a| a.id() == id)
            .unwrap_or_else(|| panic!("no agent {id}"))
    }

    /// At every step: one occupant per cell, every agent on its recorded
    /// cell, never out of bounds, never on a blocked cell.
    fn assert_occupancy_invariants(&self) {
        let grid = self.grid.lock();
        let mut seen = HashSet::new();
        for agent in &self.agents {
            let pos = agent.pos();
            assert!(
                seen.insert(pos),
                "two agents share cell {pos} at t={}",
                self.now
            );
            assert!(
                pos.row >= 0 && pos.row < grid.rows() && pos.col >= 0 && pos.col < grid.cols(),
                "{} out of bounds at {pos}",
                agent.id()
            );
            assert!(
                !grid.is_blocked(pos),
                "{} on blocked cell {pos}",
                agent.id()
            );
            let occupant = grid
                .occupant_at(pos)
                .unwrap_or_else(|| panic!("grid shows {pos} empty but {} is there", agent.id()));
            assert_eq!(occupant.id, agent.id(), "grid/agent disagreement at {pos}");
        }
    }
}

#[test]
fn test_single_mover_reaches_corner_in_exactly_eight_moves() {
    let mut harness = Harness::from_scenario(&Scenario::open_field());

    let settled = harness.run_until(20_000, |h| h.agent("Robot1").is_stopped());
    assert!(settled, "mover did not settle in time");
    assert!(harness.agent("Robot1").reached_target());
    assert_eq!(harness.agent("Robot1").pos(), Pos::new(4, 4));

    let moves = harness
        .notifier
        .lines()
        .iter()
        .filter(|line| line.contains("[Robot1] moved from "))
        .count();
    assert_eq!(moves, 8, "expected exactly 8 moves on an empty 5x5 board");
}

#[test]
fn test_boxed_in_mover_gives_up_after_timeout_without_mutating_grid() {
    let mut harness = Harness::from_scenario(&Scenario::boxed_in());

    let deadlocked = harness.run_until(5_000, |h| {
        h.agent("Robot1").consecutive_blocks() >= 3 || h.agent("Robot1").is_stopped()
    });
    assert!(deadlocked, "failure counter never reached the threshold");
    assert!(!harness.agent("Robot1").is_stopped());

    let before = harness.grid.lock().render();
    let stopped = harness.run_until(15_000, |h| h.agent("Robot1").is_stopped());
    assert!(stopped, "agent never gave up");
    assert!(!harness.agent("Robot1").reached_target());
    assert_eq!(harness.agent("Robot1").pos(), Pos::new(0, 0));
    assert!(harness
        .notifier
        .contains("[DEADLOCK] Robot1 cannot reach target - path blocked"));

    // Terminal but non-fatal: nothing moves afterwards.
    for _ in 0..100 {
        harness.tick();
    }
    assert_eq!(harness.grid.lock().render(), before);
}

#[test]
fn test_head_on_swap_resolves_through_negotiation() {
    let mut harness = Harness::from_scenario(&Scenario::head_on());

    let settled = harness.run_until(60_000, |h| {
        h.agent("Robot1").is_stopped() && h.agent("Robot2").is_stopped()
    });
    assert!(settled, "movers did not settle");
    assert!(harness.agent("Robot1").reached_target());
    assert!(harness.agent("Robot2").reached_target());
    assert_eq!(harness.agent("Robot1").pos(), Pos::new(4, 2));
    assert_eq!(harness.agent("Robot2").pos(), Pos::new(0, 2));
}

#[test]
fn test_adaptive_blocker_wall_end_to_end() {
    let mut harness = Harness::from_scenario(&Scenario::adaptive_blockers());

    let settled = harness.run_until(180_000, |h| {
        h.agent("Robot1").is_stopped() && h.agent("Robot2").is_stopped()
    });
    assert!(settled, "movers did not settle behind the adaptive wall");
    assert!(
        harness.agent("Robot1").reached_target(),
        "Robot1 gave up instead of reaching (4,2)"
    );
    assert!(
        harness.agent("Robot2").reached_target(),
        "Robot2 gave up instead of reaching (0,2)"
    );

    // The wall had to open: at least one blocker ran its vacate cycle.
    assert!(harness.notifier.contains("request threshold reached"));
}

#[test]
fn test_mover_with_start_equal_to_target_stops_immediately() {
    let scenario = Scenario {
        name: "noop".into(),
        rows: 5,
        cols: 5,
        blocked: Vec::new(),
        agents: vec![AgentSpec::mover("Robot1", Pos::new(2, 2), Pos::new(2, 2))],
    };
    let mut harness = Harness::from_scenario(&scenario);
    let settled = harness.run_until(2_000, |h| h.agent("Robot1").is_stopped());
    assert!(settled);
    assert!(harness.agent("Robot1").reached_target());
}
