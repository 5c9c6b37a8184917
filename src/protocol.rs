//! Typed messages exchanged between agents, plus the colon-delimited text
//! codec used on the wire and in log output.
//!
//! Delivery is asynchronous, reliable, and ordered per sender-receiver pair;
//! nothing is assumed about ordering across different senders, so every
//! handler tolerates interleaved unrelated messages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::Pos;

/// Reason attached to a `Refuse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefuseKind {
    /// The occupant is a static blocker that has not yet collected enough
    /// requests to vacate.
    StaticBlocked,
}

/// Protocol message bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Ask the occupant of `cell` for permission to enter it.
    Request { cell: Pos, timestamp: u64 },
    /// Permission granted.
    Grant { clock: u64 },
    /// Permission denied; `count` is the occupant's running request tally.
    Refuse { kind: RefuseKind, clock: u64, count: u32 },
    /// A previously contended cell has been left behind.
    Release { cell: Pos, clock: u64 },
    /// The sender has detected a deadlock at `cell`.
    DeadlockAlert { cell: Pos, clock: u64 },
}

/// A message together with its addressing: always exactly one named
/// recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub message: Message,
}

/// Rejection of input that does not parse as a protocol message. The
/// in-process transport never produces these; a foreign transport feeding
/// the codec must treat them as fatal for the offending line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed protocol message: {line:?}")]
    Malformed { line: String },
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request { cell, timestamp } => {
                write!(f, "REQUEST:{}:{}:{}", cell.row, cell.col, timestamp)
            }
            Message::Grant { clock } => write!(f, "OK:{clock}"),
            Message::Refuse { kind: RefuseKind::StaticBlocked, clock, count } => {
                write!(f, "STATIC_BLOCKED:{clock}:{count}")
            }
            Message::Release { cell, clock } => {
                write!(f, "RELEASE:{}:{}:{}", cell.row, cell.col, clock)
            }
            Message::DeadlockAlert { cell, clock } => {
                write!(f, "DEADLOCK:{}:{}:{}", cell.row, cell.col, clock)
            }
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::Malformed { line: s.to_string() };
        let parts: Vec<&str> = s.split(':').collect();

        fn num<T: FromStr>(part: &str) -> Option<T> {
            part.parse().ok()
        }

        let msg = match (parts.first().copied(), parts.len()) {
            (Some("REQUEST"), 4) => Message::Request {
                cell: Pos::new(
                    num(parts[1]).ok_or_else(malformed)?,
                    num(parts[2]).ok_or_else(malformed)?,
                ),
                timestamp: num(parts[3]).ok_or_else(malformed)?,
            },
            (Some("OK"), 2) => Message::Grant {
                clock: num(parts[1]).ok_or_else(malformed)?,
            },
            (Some("STATIC_BLOCKED"), 3) => Message::Refuse {
                kind: RefuseKind::StaticBlocked,
                clock: num(parts[1]).ok_or_else(malformed)?,
                count: num(parts[2]).ok_or_else(malformed)?,
            },
            (Some("RELEASE"), 4) => Message::Release {
                cell: Pos::new(
                    num(parts[1]).ok_or_else(malformed)?,
                    num(parts[2]).ok_or_else(malformed)?,
                ),
                clock: num(parts[3]).ok_or_else(malformed)?,
            },
            (Some("DEADLOCK"), 4) => Message::DeadlockAlert {
                cell: Pos::new(
                    num(parts[1]).ok_or_else(malformed)?,
                    num(parts[2]).ok_or_else(malformed)?,
                ),
                clock: num(parts[3]).ok_or_else(malformed)?,
            },
            _ => return Err(malformed()),
        };
        Ok(msg)
    }
}
