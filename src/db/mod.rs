//! Database module: entity store and movement repository.
//!
//! - `store`: the [`MovementStore`] trait plus the sqlite implementation and
//!   pool/migration helpers.
//! - `repo`: the async, failure-absorbing repository the UI and sync driver
//!   talk to.

pub mod repo;
pub mod store;

pub use repo::MovementRepo;
pub use store::{init_pool, run_migrations, MovementStore, Pool, SqliteStore};
