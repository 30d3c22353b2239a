//! Core use-case services over the storage backend.
//!
//! # Responsibility
//! - Resolve session-scoped containers and tables.
//! - Provide keyed row operations, archiving, provisioning and rollover.
//!
//! # Invariants
//! - Services never bypass the repository contracts.
//! - Every directory lookup takes an explicit `SessionContext`.

pub mod archive_service;
pub mod directory_service;
pub mod provision_service;
pub mod rollover_service;
pub mod row_service;
pub mod table_service;
pub mod upload;
