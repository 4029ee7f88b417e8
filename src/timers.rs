//! Named single-shot timers
//!
//! Each connection's orchestrator owns one [`Timers`] value. Setting a timer
//! spawns a sleep task that posts a [`OrchestratorMsg::Timer`] back into the
//! orchestrator's own queue when it fires; setting the same name again first
//! cancels the prior task. Cancellation is a best-effort race with firing, so
//! every timer handler re-reads session state on entry and exits when its
//! precondition has vanished.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::debug;

use crate::orchestrator::OrchestratorMsg;

/// User has paused typing; wait this long before regenerating
pub const TYPING_IDLE_DELAY: Duration = Duration::from_secs(5);
/// User has been typing too long; regenerate anyway
pub const MAX_TYPING_DELAY: Duration = Duration::from_secs(30);
/// Settle period after a group boundary during interrupt flow
pub const GROUP_DELAY: Duration = Duration::from_secs(2);
/// Post-response follow-up timer
pub const END_UPDATE_DELAY: Duration = Duration::from_secs(25);

/// The fixed set of per-connection timer names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    TypingIdle,
    MaxTyping,
    GroupDelay,
    EndUpdate,
}

impl TimerKind {
    pub fn delay(&self) -> Duration {
        match self {
            TimerKind::TypingIdle => TYPING_IDLE_DELAY,
            TimerKind::MaxTyping => MAX_TYPING_DELAY,
            TimerKind::GroupDelay => GROUP_DELAY,
            TimerKind::EndUpdate => END_UPDATE_DELAY,
        }
    }
}

/// At most one scheduled callback per timer name
pub struct Timers {
    conn: String,
    tx: mpsc::Sender<OrchestratorMsg>,
    handles: HashMap<TimerKind, JoinHandle<()>>,
}

impl Timers {
    pub fn new(conn: impl Into<String>, tx: mpsc::Sender<OrchestratorMsg>) -> Self {
        Self {
            conn: conn.into(),
            tx,
            handles: HashMap::new(),
        }
    }

    /// Schedule `kind`, replacing any prior timer of the same name
    pub fn set(&mut self, kind: TimerKind) {
        self.cancel(kind);
        debug!(conn = %self.conn, ?kind, delay = ?kind.delay(), "setting timer");

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(kind.delay()).await;
            let _ = tx.send(OrchestratorMsg::Timer(kind)).await;
        });
        self.handles.insert(kind, handle);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.handles.remove(&kind) {
            debug!(conn = %self.conn, ?kind, "cancelling timer");
            handle.abort();
        }
    }

    /// Cancel the typing pair (idle + max)
    pub fn cancel_typing(&mut self) {
        self.cancel(TimerKind::TypingIdle);
        self.cancel(TimerKind::MaxTyping);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    /// Whether `kind` is scheduled and has not yet fired
    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.handles.get(&kind).is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = Timers::new("c", tx);

        let start = Instant::now();
        timers.set(TimerKind::TypingIdle);
        assert!(timers.is_active(TimerKind::TypingIdle));

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, OrchestratorMsg::Timer(TimerKind::TypingIdle)));
        assert!(start.elapsed() >= TYPING_IDLE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = Timers::new("c", tx);

        timers.set(TimerKind::GroupDelay);
        timers.cancel(TimerKind::GroupDelay);
        assert!(!timers.is_active(TimerKind::GroupDelay));

        let fired = timeout(Duration::from_secs(10), rx.recv()).await;
        assert!(fired.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_prior_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timers = Timers::new("c", tx);

        timers.set(TimerKind::TypingIdle);
        tokio::time::sleep(Duration::from_secs(3)).await;
        timers.set(TimerKind::TypingIdle);

        let start = Instant::now();
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, OrchestratorMsg::Timer(TimerKind::TypingIdle)));
        // The replacement restarted the 5s clock; only one fire arrives.
        assert!(start.elapsed() >= Duration::from_secs(4));
        let second = timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(second.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_typing_leaves_others() {
        let (tx, _rx) = mpsc::channel(8);
        let mut timers = Timers::new("c", tx);

        timers.set(TimerKind::TypingIdle);
        timers.set(TimerKind::MaxTyping);
        timers.set(TimerKind::EndUpdate);
        timers.cancel_typing();

        assert!(!timers.is_active(TimerKind::TypingIdle));
        assert!(!timers.is_active(TimerKind::MaxTyping));
        assert!(timers.is_active(TimerKind::EndUpdate));
    }
}
