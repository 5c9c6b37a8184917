//! Agents: mover negotiation, deadlock detection, and the adaptive blocker
//! cycle, layered over a shared per-agent state machine.

mod blocker;
mod core;
mod deadlock;
mod negotiation;

pub use self::core::{AgentSnapshot, AgentSpec, BlockerPhase, Control, PendingRequest, RobotAgent};
pub use self::negotiation::should_grant;

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::config::Config;
    use crate::fabric::Router;
    use crate::grid::{Grid, Occupant, Pos, Role, SharedGrid};
    use crate::notifier::{CollectingNotifier, Notifier};
    use crate::protocol::Envelope;

    use super::{AgentSpec, RobotAgent};

    /// Grid + router + notifier wiring for driving agent cores directly.
    pub(crate) struct Rig {
        pub grid: SharedGrid,
        pub router: Arc<Router>,
        pub notifier: Arc<CollectingNotifier>,
        pub cfg: Arc<Config>,
    }

    impl Rig {
        pub fn new() -> Self {
            Self {
                grid: Grid::new(5, 5).into_shared(),
                router: Arc::new(Router::new()),
                notifier: Arc::new(CollectingNotifier::new()),
                cfg: Arc::new(Config::default()),
            }
        }

        /// Create an agent, occupy its start cell, and return it with its
        /// mailbox.
        pub fn spawn(&self, spec: AgentSpec) -> (RobotAgent, UnboundedReceiver<Envelope>) {
            let rx = self.router.register(&spec.id);
            assert!(self.grid.lock().occupy(
                spec.start,
                Occupant {
                    id: spec.id.clone(),
                    role: spec.role,
                },
            ));
            let agent = RobotAgent::new(
                spec,
                self.grid.clone(),
                self.router.clone(),
                Arc::clone(&self.notifier) as Arc<dyn Notifier>,
                self.cfg.clone(),
            );
            (agent, rx)
        }

        /// Register a mailbox for a fake peer and, optionally, plant its
        /// occupant on the grid.
        pub fn peer(&self, id: &str, at: Option<(Pos, Role)>) -> UnboundedReceiver<Envelope> {
            if let Some((pos, role)) = at {
                assert!(self.grid.lock().occupy(
                    pos,
                    Occupant {
                        id: id.to_string(),
                        role,
                    },
                ));
            }
            self.router.register(id)
        }
    }

    pub(crate) fn drain(rx: &mut UnboundedReceiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }
}
