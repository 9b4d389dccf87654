// ABOUTME: Session module — bounded per-session conversation history.
// ABOUTME: Provides the shared store, turn types, and JSON snapshot persistence.

pub mod persistence;
pub mod store;
pub mod turn;

pub use persistence::Snapshot;
pub use store::{AppendTicket, Session, SessionStore};
pub use turn::{ImageRef, Role, Turn};
