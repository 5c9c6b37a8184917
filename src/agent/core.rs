//! Per-agent state: position, logical clock, movement control, and the
//! blocker-only vacate machinery.
//!
//! The agent core is synchronous and driven from outside through
//! [`RobotAgent::handle_message`] and [`RobotAgent::poll`]; it assumes
//! nothing about the cadence it is polled at, only the relative order of
//! events. The async task wrapping is in [`crate::runner`].

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::fabric::Router;
use crate::grid::{Pos, Role, SharedGrid};
use crate::notifier::Notifier;
use crate::protocol::{Envelope, Message};

/// A request this agent has sent and not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// The contended cell.
    pub cell: Pos,
    /// Our logical-clock timestamp at request time; retries reuse it.
    pub timestamp: u64,
    /// The peer the request went to (updated if the occupant changes or a
    /// grant arrives from someone else).
    pub peer: String,
    /// Resends so far.
    pub retries: u32,
    /// When the request was last (re)sent.
    pub last_sent_ms: u64,
    /// Set once granted: the time at which the move may be committed.
    pub commit_due_ms: Option<u64>,
}

impl PendingRequest {
    pub fn granted(&self) -> bool {
        self.commit_due_ms.is_some()
    }
}

/// Movement-control state of a mover. One tagged union instead of parallel
/// flags, so a request pending during deadlock resolution is representable
/// but "requesting and independently in deadlock" is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Idle,
    Requesting(PendingRequest),
    InDeadlock {
        since_ms: u64,
        pending: Option<PendingRequest>,
    },
    Stopped,
}

/// Stage of a static blocker's vacate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerPhase {
    /// At its post, refusing and counting requests.
    Holding,
    /// Walking toward the temporary cell.
    Vacating { temp: Pos },
    /// Parked at the temporary cell until the wait elapses.
    WaitingAtTemp { temp: Pos, since_ms: u64 },
    /// Walking back to the original post.
    Returning,
}

/// Blocker-only state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockerState {
    pub phase: BlockerPhase,
    pub received: u32,
    pub threshold: u32,
    pub original: Pos,
    pub last_tick_ms: u64,
}

/// An incoming request that lost the priority comparison and waits for our
/// next release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedRequest {
    pub from: String,
    pub cell: Pos,
    pub timestamp: u64,
}

/// Construction contract for an agent. For movers the blocker-only fields
/// are unused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub start: Pos,
    pub target: Pos,
    pub role: Role,
    pub requests_needed_to_move: u32,
    pub original: Pos,
}

impl AgentSpec {
    pub fn mover(id: impl Into<String>, start: Pos, target: Pos) -> Self {
        Self {
            id: id.into(),
            start,
            target,
            role: Role::Mover,
            requests_needed_to_move: 0,
            original: start,
        }
    }

    /// A static blocker holds `post`; its target and original position are
    /// the post itself.
    pub fn blocker(id: impl Into<String>, post: Pos, requests_needed_to_move: u32) -> Self {
        Self {
            id: id.into(),
            start: post,
            target: post,
            role: Role::StaticBlocker,
            requests_needed_to_move,
            original: post,
        }
    }
}

/// Point-in-time view of an agent, published for observers.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub role: Role,
    pub pos: Pos,
    pub target: Pos,
    pub state: String,
    pub reached_target: bool,
    pub clock: u64,
    pub consecutive_blocks: u32,
    pub received_requests: u32,
}

/// One participant in the simulation: a mover negotiating its way toward a
/// target, or a static blocker running the adaptive vacate cycle.
pub struct RobotAgent {
    pub(crate) id: String,
    pub(crate) pos: Pos,
    pub(crate) target: Pos,
    pub(crate) role: Role,
    pub(crate) clock: u64,
    pub(crate) control: Control,
    pub(crate) consecutive_blocks: u32,
    pub(crate) last_attempt_ms: u64,
    pub(crate) queued: VecDeque<QueuedRequest>,
    pub(crate) blocker: Option<BlockerState>,
    pub(crate) alert_peers: Vec<String>,
    pub(crate) grid: SharedGrid,
    pub(crate) router: Arc<Router>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) cfg: Arc<Config>,
}

impl RobotAgent {
    /// Build an agent from its construction contract. The start cell is
    /// expected to already be occupied on the grid by the caller.
    pub fn new(
        spec: AgentSpec,
        grid: SharedGrid,
        router: Arc<Router>,
        notifier: Arc<dyn Notifier>,
        cfg: Arc<Config>,
    ) -> Self {
        let blocker = match spec.role {
            Role::StaticBlocker => Some(BlockerState {
                phase: BlockerPhase::Holding,
                received: 0,
                threshold: spec.requests_needed_to_move,
                original: spec.original,
                last_tick_ms: 0,
            }),
            Role::Mover => None,
        };
        Self {
            id: spec.id,
            pos: spec.start,
            target: spec.target,
            role: spec.role,
            clock: 0,
            control: Control::Idle,
            consecutive_blocks: 0,
            last_attempt_ms: 0,
            queued: VecDeque::new(),
            blocker,
            alert_peers: Vec::new(),
            grid,
            router,
            notifier,
            cfg,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    pub fn target(&self) -> Pos {
        self.target
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn consecutive_blocks(&self) -> u32 {
        self.consecutive_blocks
    }

    pub fn reached_target(&self) -> bool {
        self.pos == self.target
    }

    /// True once the agent will never move again: target reached or
    /// deadlock give-up. Blockers never stop.
    pub fn is_stopped(&self) -> bool {
        matches!(self.control, Control::Stopped)
    }

    /// Peers to alert when this agent detects a deadlock (the other movers).
    pub fn set_alert_peers(&mut self, peers: Vec<String>) {
        self.alert_peers = peers;
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let state = match (&self.role, &self.control, self.blocker.as_ref()) {
            (Role::StaticBlocker, _, Some(st)) => match st.phase {
                BlockerPhase::Holding => "holding",
                BlockerPhase::Vacating { .. } => "vacating",
                BlockerPhase::WaitingAtTemp { .. } => "waiting",
                BlockerPhase::Returning => "returning",
            },
            (_, Control::Idle, _) => "idle",
            (_, Control::Requesting(_), _) => "requesting",
            (_, Control::InDeadlock { .. }, _) => "in_deadlock",
            (_, Control::Stopped, _) => "stopped",
        };
        AgentSnapshot {
            id: self.id.clone(),
            role: self.role,
            pos: self.pos,
            target: self.target,
            state: state.to_string(),
            reached_target: self.reached_target(),
            clock: self.clock,
            consecutive_blocks: self.consecutive_blocks,
            received_requests: self.blocker.as_ref().map(|b| b.received).unwrap_or(0),
        }
    }

    /// Process one delivered message. Handlers are re-entrant with respect
    /// to interleaved unrelated messages.
    pub fn handle_message(&mut self, envelope: Envelope, now_ms: u64) {
        if envelope.to != self.id {
            log::warn!("{} received misrouted envelope for {}", self.id, envelope.to);
            return;
        }
        let from = envelope.from;
        match envelope.message {
            Message::Request { cell, timestamp } => {
                self.handle_request(&from, cell, timestamp, now_ms)
            }
            Message::Grant { .. } => self.handle_grant(&from, now_ms),
            Message::Refuse { count, .. } => self.handle_refuse(&from, count, now_ms),
            Message::Release { .. } => self.handle_release(&from),
            Message::DeadlockAlert { cell, clock } => self.handle_alert(&from, cell, clock),
        }
    }

    /// Advance time-driven work: granted-move commits, retries, deadlock
    /// checks and resolution, movement attempts, blocker ticks.
    pub fn poll(&mut self, now_ms: u64) {
        match self.role {
            Role::Mover => self.mover_poll(now_ms),
            Role::StaticBlocker => self.blocker_poll(now_ms),
        }
    }

    fn mover_poll(&mut self, now_ms: u64) {
        if matches!(self.control, Control::Stopped) {
            return;
        }

        if let Control::InDeadlock { since_ms, .. } = self.control {
            if now_ms.saturating_sub(since_ms) > self.cfg.deadlock_timeout_ms {
                self.log("deadlock timeout, concluding path is impossible");
                self.notifier.on_log(&format!(
                    "[DEADLOCK] {} cannot reach target - path blocked",
                    self.id
                ));
                self.control = Control::Stopped;
                return;
            }
        }

        let commit_due = match self.pending() {
            Some(p) => p.commit_due_ms.map(|due| now_ms >= due).unwrap_or(false),
            None => false,
        };
        if commit_due {
            self.commit_move(now_ms);
        }

        self.maybe_retry(now_ms);

        if matches!(self.control, Control::Stopped) {
            return;
        }
        if now_ms.saturating_sub(self.last_attempt_ms) < self.cfg.move_interval_ms {
            return;
        }
        match self.control {
            Control::Idle => {
                self.last_attempt_ms = now_ms;
                self.initiate_move(now_ms);
            }
            Control::InDeadlock { .. } => {
                self.last_attempt_ms = now_ms;
                self.attempt_resolution(now_ms);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Shared helpers for the negotiation/deadlock/blocker impls
    // -----------------------------------------------------------------------

    /// Lamport update on receipt of a timestamped message.
    pub(crate) fn bump_clock(&mut self, incoming: u64) {
        self.clock = self.clock.max(incoming) + 1;
    }

    pub(crate) fn send(&self, to: &str, message: Message) {
        self.router.send(Envelope {
            from: self.id.clone(),
            to: to.to_string(),
            message,
        });
    }

    pub(crate) fn log(&self, text: &str) {
        log::debug!("[{}] {}", self.id, text);
        self.notifier.on_log(&format!("[{}] {}", self.id, text));
    }

    pub(crate) fn pending(&self) -> Option<&PendingRequest> {
        match &self.control {
            Control::Requesting(p) => Some(p),
            Control::InDeadlock {
                pending: Some(p), ..
            } => Some(p),
            _ => None,
        }
    }

    pub(crate) fn pending_mut(&mut self) -> Option<&mut PendingRequest> {
        match &mut self.control {
            Control::Requesting(p) => Some(p),
            Control::InDeadlock {
                pending: Some(p), ..
            } => Some(p),
            _ => None,
        }
    }

    /// Remove and return the pending request, leaving the control state
    /// otherwise intact (`Requesting` collapses to `Idle`, a deadlocked
    /// agent stays deadlocked).
    pub(crate) fn take_pending(&mut self) -> Option<PendingRequest> {
        match std::mem::replace(&mut self.control, Control::Idle) {
            Control::Requesting(p) => Some(p),
            Control::InDeadlock { since_ms, pending } => {
                self.control = Control::InDeadlock {
                    since_ms,
                    pending: None,
                };
                pending
            }
            other => {
                self.control = other;
                None
            }
        }
    }

    /// Bookkeeping after this agent's occupant record moved to `cell`.
    pub(crate) fn after_move(&mut self, cell: Pos) {
        let old = self.pos;
        self.pos = cell;
        self.log(&format!("moved from {old} to {cell}"));
        self.notifier.on_grid_changed();
        if self.role == Role::Mover && self.reached_target() {
            self.log("target reached");
            self.control = Control::Stopped;
        }
    }
}
