//! Remote session management.
//!
//! This module owns the connection lifecycle for each chat identity:
//! the session state machine with its quiescent capture protocol, and
//! the registry mapping identities to live sessions.

mod registry;
mod remote;

pub use registry::SessionRegistry;
pub use remote::{LoginOutcome, QuiescenceTuning, RemoteSession, SessionConfig};
