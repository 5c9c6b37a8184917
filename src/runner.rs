//! Async assembly: one cooperative task per agent over the shared grid and
//! message fabric.
//!
//! Each task drains its mailbox and polls its agent core at a fixed
//! cadence; the cores themselves gate movement, retries, and blocker ticks
//! internally, so the cadence only bounds reaction latency.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::agent::{AgentSnapshot, AgentSpec, RobotAgent};
use crate::config::Config;
use crate::error::SimError;
use crate::fabric::Router;
use crate::grid::{Grid, Occupant, Role, SharedGrid};
use crate::notifier::Notifier;
use crate::protocol::Envelope;
use crate::scenario::Scenario;

/// Owns the grid, the router, and the agent tasks of one simulation run.
pub struct Simulation {
    cfg: Arc<Config>,
    grid: SharedGrid,
    router: Arc<Router>,
    notifier: Arc<dyn Notifier>,
    staged: Vec<(RobotAgent, UnboundedReceiver<Envelope>)>,
    statuses: Arc<DashMap<String, AgentSnapshot>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Simulation {
    pub fn new(cfg: Config, notifier: Arc<dyn Notifier>) -> Self {
        let grid = Grid::new(cfg.rows, cfg.cols).into_shared();
        let (shutdown, _) = watch::channel(false);
        Self {
            cfg: Arc::new(cfg),
            grid,
            router: Arc::new(Router::new()),
            notifier,
            staged: Vec::new(),
            statuses: Arc::new(DashMap::new()),
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Build a simulation from a preset board. Grid dimensions come from
    /// the scenario; timings from `cfg`.
    pub fn from_scenario(
        scenario: &Scenario,
        cfg: Config,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SimError> {
        let cfg = Config {
            rows: scenario.rows,
            cols: scenario.cols,
            ..cfg
        };
        let mut sim = Self::new(cfg, notifier);
        {
            let mut grid = sim.grid.lock();
            for &pos in &scenario.blocked {
                grid.set_blocked(pos, true);
            }
        }
        if !scenario.blocked.is_empty() {
            sim.notifier.on_grid_changed();
        }
        for spec in &scenario.agents {
            sim.add_agent(spec.clone())?;
        }
        Ok(sim)
    }

    pub fn grid(&self) -> SharedGrid {
        self.grid.clone()
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Stage an agent: occupy its start cell and create its mailbox. Tasks
    /// are spawned by [`start`](Self::start).
    pub fn add_agent(&mut self, spec: AgentSpec) -> Result<(), SimError> {
        if self.staged.iter().any(|(a, _)| a.id() == spec.id)
            || self.statuses.contains_key(&spec.id)
        {
            return Err(SimError::DuplicateAgent { id: spec.id });
        }
        let occupied = self.grid.lock().occupy(
            spec.start,
            Occupant {
                id: spec.id.clone(),
                role: spec.role,
            },
        );
        if !occupied {
            return Err(SimError::StartUnavailable {
                id: spec.id,
                pos: spec.start,
            });
        }
        match spec.role {
            Role::Mover => self.notifier.on_log(&format!(
                "[{}] agent started at {} targeting {}",
                spec.id, spec.start, spec.target
            )),
            Role::StaticBlocker => self.notifier.on_log(&format!(
                "[{}] adaptive static agent at {}, needs {} requests to move",
                spec.id, spec.start, spec.requests_needed_to_move
            )),
        }
        self.notifier.on_grid_changed();

        let rx = self.router.register(&spec.id);
        let agent = RobotAgent::new(
            spec,
            self.grid.clone(),
            self.router.clone(),
            self.notifier.clone(),
            self.cfg.clone(),
        );
        self.statuses.insert(agent.id().to_string(), agent.snapshot());
        self.staged.push((agent, rx));
        Ok(())
    }

    /// Spawn one task per staged agent. Movers learn about each other here
    /// so deadlock alerts reach every other mover.
    pub fn start(&mut self) {
        let mover_ids: Vec<String> = self
            .staged
            .iter()
            .filter(|(a, _)| a.role() == Role::Mover)
            .map(|(a, _)| a.id().to_string())
            .collect();

        for (mut agent, rx) in self.staged.drain(..) {
            if agent.role() == Role::Mover {
                let peers: Vec<String> = mover_ids
                    .iter()
                    .filter(|id| id.as_str() != agent.id())
                    .cloned()
                    .collect();
                agent.set_alert_peers(peers);
            }
            let cfg = self.cfg.clone();
            let statuses = self.statuses.clone();
            let shutdown = self.shutdown.subscribe();
            self.tasks.push(tokio::spawn(drive(agent, rx, cfg, statuses, shutdown)));
        }
    }

    /// Latest snapshot of every agent, sorted by id.
    pub fn statuses(&self) -> Vec<AgentSnapshot> {
        let mut out: Vec<AgentSnapshot> =
            self.statuses.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Wait until every mover has stopped (target reached or given up), or
    /// the timeout elapses. Returns whether all movers settled.
    pub async fn wait_for_movers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let settled = self
                .statuses
                .iter()
                .filter(|e| e.value().role == Role::Mover)
                .all(|e| e.value().state == "stopped");
            if settled {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(self.cfg.message_poll_ms)).await;
        }
    }

    /// Signal every agent task to exit and wait for them.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

async fn drive(
    mut agent: RobotAgent,
    mut rx: UnboundedReceiver<Envelope>,
    cfg: Arc<Config>,
    statuses: Arc<DashMap<String, AgentSnapshot>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let epoch = Instant::now();
    let mut tick = interval(Duration::from_millis(cfg.message_poll_ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = rx.recv() => {
                match received {
                    Some(envelope) => {
                        let now_ms = epoch.elapsed().as_millis() as u64;
                        agent.handle_message(envelope, now_ms);
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                let now_ms = epoch.elapsed().as_millis() as u64;
                agent.poll(now_ms);
            }
        }
        statuses.insert(agent.id().to_string(), agent.snapshot());
    }
    statuses.insert(agent.id().to_string(), agent.snapshot());
}
