//! Per-connection session state
//!
//! A [`Session`] aggregates everything the relay tracks for one connection:
//! conversation history, the current block buffer and its delivery cursor,
//! typing state, and the interrupt / follow-up flags. The [`SessionStore`]
//! owns all sessions behind one async mutex; operations are atomic at the
//! single-session granularity.

mod store;
mod types;

pub use store::SessionStore;
pub use types::{
    Block, Buffer, EndUpdateState, HistoryEntry, Role, Session, TypingState, UpdateCheckState,
};
