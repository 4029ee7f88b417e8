//! Per-connection state machine
//!
//! Every connection gets one orchestrator actor. Client events, timer fires,
//! and pacer ticks all arrive on the actor's queue and are processed one at
//! a time, which is the whole concurrency story: state reads and writes for
//! a connection never interleave.

mod core;
mod handle;
mod messages;

pub use core::Orchestrator;
pub use handle::OrchestratorHandle;
pub use messages::OrchestratorMsg;
