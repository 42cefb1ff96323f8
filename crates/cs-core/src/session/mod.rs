//! Session management module
//!
//! Per-session conversation logs held in process memory.

mod store;
mod types;

pub use store::{SessionHandle, SessionLimits, SessionStore};
pub use types::{Role, Session, Turn};
