//! Domain model for session-isolated tabular storage.
//!
//! # Responsibility
//! - Define the typed cell/row shape shared by every table.
//! - Enumerate logical modules and their standard table catalog.
//! - Define session identity and the explicit per-request session context.
//!
//! # Invariants
//! - Row 0 of every table is a header of text cells.
//! - Exactly one session is active process-wide; callers carry it explicitly
//!   as a `SessionContext`.

pub mod cell;
pub mod container;
pub mod module;
pub mod naming;
pub mod session;
