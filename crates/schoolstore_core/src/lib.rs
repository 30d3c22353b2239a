//! Session-isolated data-store core for the school management system.
//! This crate owns directory resolution, table/row access, archiving and
//! academic-year rollover.

pub mod cache;
pub mod config;
pub mod db;
pub mod lock;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use cache::{CacheStats, EphemeralCache};
pub use config::{ConfigError, StoreConfig};
pub use lock::{LockError, LockManager, DEFAULT_LOCK_TIMEOUT};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::cell::{header_row, Cell, Row};
pub use model::container::{Container, ContainerId, FolderId, TableHandle, TableId};
pub use model::module::{parse_module, Module, TableKind, TableSpec};
pub use model::naming::{dynamic_table_name, TableNameError};
pub use model::session::{SessionContext, SessionId, SessionIdError};
pub use repo::error::{RepoError, RepoResult};
pub use service::archive_service::ArchiveRecord;
pub use service::rollover_service::{
    MasterCopyOutcome, MasterCopyReport, RolloverError, RolloverReport, RolloverStage,
};
pub use service::upload::{AssetUploader, UploadRequest};
pub use store::{RegistrationError, SchoolStore, StoreOpenError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
