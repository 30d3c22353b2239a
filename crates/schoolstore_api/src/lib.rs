//! Use-case API over the school store core.
//!
//! Entity handlers (students, fees, homework and the rest) call into this
//! crate; it never exposes panics or typed core errors across its surface.

pub mod api;

pub use api::{core_version, init_logging, Outcome, SchoolStoreApi};
