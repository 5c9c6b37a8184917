//! # robogrid
//!
//! Multi-robot coordination on a shared grid: movers negotiate exclusive
//! cell occupancy through a timestamp-ordered mutual-exclusion protocol,
//! detect and recover from deadlocks, and contend with adaptive blockers
//! that temporarily vacate their posts after enough access requests.
//!
//! The agent cores are synchronous state machines (`agent`), driven either
//! by the bundled tokio runner (`runner`) or directly by an embedder that
//! controls time; the grid (`grid`) is the single lock-guarded shared
//! resource, and messages travel over an in-process fabric (`fabric`)
//! addressed by agent id.

pub mod agent;
pub mod config;
pub mod error;
pub mod fabric;
pub mod grid;
pub mod notifier;
pub mod planner;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use agent::{AgentSnapshot, AgentSpec, BlockerPhase, Control, PendingRequest, RobotAgent};
pub use config::Config;
pub use error::{MoveError, SimError};
pub use fabric::Router;
pub use grid::{Grid, Occupant, Pos, Role, SharedGrid};
pub use notifier::{CollectingNotifier, ConsoleNotifier, Notifier, NullNotifier};
pub use protocol::{Envelope, Message, ProtocolError, RefuseKind};
pub use runner::Simulation;
pub use scenario::Scenario;
