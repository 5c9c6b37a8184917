//! Notification interface to the excluded visualization layer.
//!
//! Called after every state-affecting event (occupy, free, block toggle,
//! role transition). Implementations must be idempotent and cheap; the
//! simulation calls them redundantly rather than tracking dirtiness.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;
use parking_lot::Mutex;

/// External sink for simulation events.
pub trait Notifier: Send + Sync {
    /// A human-readable simulation event.
    fn on_log(&self, text: &str);

    /// The grid changed in a way a renderer would care about.
    fn on_grid_changed(&self);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn on_log(&self, _text: &str) {}
    fn on_grid_changed(&self) {}
}

/// Prints timestamped lines to stdout, the headless replacement for the
/// original control panel's log view.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn on_log(&self, text: &str) {
        println!("[{}] {}", Local::now().format("%H:%M:%S"), text);
    }

    fn on_grid_changed(&self) {}
}

/// Records log lines and counts grid-change callbacks. Useful for tests and
/// embedders that render after the fact.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    lines: Mutex<Vec<String>>,
    grid_changes: AtomicUsize,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn grid_changes(&self) -> usize {
        self.grid_changes.load(Ordering::SeqCst)
    }

    /// True when any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl Notifier for CollectingNotifier {
    fn on_log(&self, text: &str) {
        self.lines.lock().push(text.to_string());
    }

    fn on_grid_changed(&self) {
        self.grid_changes.fetch_add(1, Ordering::SeqCst);
    }
}
