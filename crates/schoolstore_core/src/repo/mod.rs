//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persisted config store and hierarchical storage contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `InvalidPosition`)
//!   in addition to DB transport errors.

pub mod config_repo;
pub mod error;
pub mod storage_repo;
