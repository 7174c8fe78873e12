//! Offline-capable submission core for the warehouse field tool.
//!
//! Operators scan movements into the local store while offline; the sync
//! driver later submits pending batches through the authenticated transport,
//! which silently re-logs-in once when the session token expires.

pub mod api;
pub mod config;
pub mod db;
pub mod model;
pub mod secrets;
pub mod sync;

pub use db::{MovementRepo, SqliteStore};
pub use model::{MovementState, Order, PickedItem, RelocateMovement, StowMovement};
