//! Reconnection timers.
//!
//! Each color has at most one live timer. Every arm carries a generation so the
//! controller can tell a current expiry from one that raced a reconnect.

use std::collections::HashMap;
use std::time::Duration;

use futures::channel::mpsc;
use ludo_types::Color;
use tokio::task::JoinHandle;
use tracing::debug;

/// A reconnection window closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerExpired {
    pub color: Color,
    pub generation: u64,
}

pub trait ReconnectTimers: Send + 'static {
    /// Start (or restart) the timer for `color`.
    fn arm(&mut self, color: Color, generation: u64, delay: Duration);

    fn cancel(&mut self, color: Color);
}

/// Timers backed by tokio tasks. Expiries are sent to the actor loop.
pub struct TokioTimers {
    expiries: mpsc::UnboundedSender<TimerExpired>,
    live: HashMap<Color, JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new(expiries: mpsc::UnboundedSender<TimerExpired>) -> Self {
        Self {
            expiries,
            live: HashMap::new(),
        }
    }
}

impl ReconnectTimers for TokioTimers {
    fn arm(&mut self, color: Color, generation: u64, delay: Duration) {
        self.cancel(color);
        let expiries = self.expiries.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if expiries
                .unbounded_send(TimerExpired { color, generation })
                .is_err()
            {
                debug!(?color, "actor gone; reconnect expiry dropped");
            }
        });
        self.live.insert(color, handle);
    }

    fn cancel(&mut self, color: Color) {
        if let Some(handle) = self.live.remove(&color) {
            handle.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, handle) in self.live.drain() {
            handle.abort();
        }
    }
}

/// Records arms and cancels; expiries are fired by hand.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualTimers {
    pub armed: HashMap<Color, (u64, Duration)>,
    pub cancelled: Vec<Color>,
}

#[cfg(test)]
impl ReconnectTimers for ManualTimers {
    fn arm(&mut self, color: Color, generation: u64, delay: Duration) {
        self.armed.insert(color, (generation, delay));
    }

    fn cancel(&mut self, color: Color) {
        if self.armed.remove(&color).is_some() {
            self.cancelled.push(color);
        }
    }
}
