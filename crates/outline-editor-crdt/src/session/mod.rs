//! The document session: one open document, debounced saves, and
//! reconciliation of values arriving from the store.

mod actor;
mod state;

pub use actor::{SessionHandle, spawn_session};
pub use state::{RemoteOutcome, SaveOutcome, SaveRequest, SessionState, SessionStatus};
