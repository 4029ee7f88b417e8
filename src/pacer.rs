//! Block pacer scheduling
//!
//! The pacer owns the "emission chain" for one connection: a single spawned
//! sleep that posts a [`OrchestratorMsg::PacerTick`] into the orchestrator's
//! queue when a block is due. The delay precedes the block it paces - a tick
//! is scheduled `max(typing_time, 1s)` before its block goes out, so every
//! block (including a buffer's first) arrives after its own typing delay.
//!
//! Ticks carry a sequence number. Cancelling or rescheduling bumps the
//! sequence, so a tick that was already in the queue when its chain was
//! cancelled is recognized as stale and dropped - at most one emission chain
//! is ever live per connection, even across abort races.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::debug;

use crate::orchestrator::OrchestratorMsg;
use crate::session::Block;

/// Floor for the effective per-block delay
pub const MIN_BLOCK_DELAY: Duration = Duration::from_secs(1);

/// Effective typing delay for a block
pub fn effective_delay(block: &Block) -> Duration {
    let millis = (block.typing_time.max(0.0) * 1000.0) as u64;
    Duration::from_millis(millis).max(MIN_BLOCK_DELAY)
}

/// Scheduler for one connection's emission chain
pub struct Pacer {
    conn: String,
    tx: mpsc::Sender<OrchestratorMsg>,
    tick: Option<JoinHandle<()>>,
    seq: u64,
}

impl Pacer {
    pub fn new(conn: impl Into<String>, tx: mpsc::Sender<OrchestratorMsg>) -> Self {
        Self {
            conn: conn.into(),
            tx,
            tick: None,
            seq: 0,
        }
    }

    /// Schedule the next emission `delay` from now, cancelling any prior
    /// chain for this connection
    pub fn schedule(&mut self, delay: Duration) {
        self.cancel_tick();
        let seq = self.seq;
        debug!(conn = %self.conn, seq, ?delay, "scheduling pacer tick");

        let tx = self.tx.clone();
        self.tick = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(OrchestratorMsg::PacerTick { seq }).await;
        }));
    }

    /// Cancel the scheduled firing; no callbacks fire
    pub fn stop(&mut self) {
        if self.tick.is_some() {
            debug!(conn = %self.conn, "stopping pacer");
        }
        self.cancel_tick();
    }

    /// Validate an arriving tick against the live chain and consume it.
    /// Returns false for ticks from a cancelled or superseded chain.
    pub fn accept_tick(&mut self, seq: u64) -> bool {
        if self.tick.is_none() || seq != self.seq {
            return false;
        }
        self.tick = None;
        true
    }

    /// Whether a next-block firing is pending
    pub fn is_sending(&self) -> bool {
        self.tick.is_some()
    }

    fn cancel_tick(&mut self) {
        if let Some(handle) = self.tick.take() {
            handle.abort();
        }
        self.seq += 1;
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.cancel_tick();
    }
}
