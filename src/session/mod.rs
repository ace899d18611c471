// src/session/mod.rs
pub mod backend;
pub mod catalog;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::SessionCoordinator;
pub use error::{SessionError, SessionResult};
pub use state::{SessionSnapshot, StateChange};
pub use types::SessionState;
