//! Store facade wiring the backend, config store, cache and lock together.
//!
//! # Responsibility
//! - Own the process-wide store state (one lock, one cache, one database).
//! - Expose the services over that state.
//! - Provide the locked find-then-write paths used by entity handlers.
//!
//! # Invariants
//! - Every find-then-write sequence runs inside the store lock.
//! - Every successful write invalidates the cached reads of its table.
//! - Cached reads are keyed by session so sessions never share entries.

use crate::cache::EphemeralCache;
use crate::config::{ConfigError, StoreConfig};
use crate::db::{Database, DbError};
use crate::lock::{LockError, LockManager};
use crate::model::cell::{Cell, Row};
use crate::model::container::TableHandle;
use crate::model::module::Module;
use crate::model::session::{SessionContext, SessionId};
use crate::repo::config_repo::SqliteConfigStore;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::storage_repo::SqliteStorageBackend;
use crate::service::archive_service::{ArchiveLog, ArchiveRecord};
use crate::service::directory_service::DirectoryResolver;
use crate::service::provision_service::ProvisionService;
use crate::service::rollover_service::{RolloverError, RolloverReport, RolloverService};
use crate::service::row_service::{key_matches, RowStore};
use crate::service::table_service::TableAccessor;
use crate::service::upload::{upload_or_empty, AssetUploader, UploadRequest};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub enum StoreOpenError {
    Config(ConfigError),
    Db(DbError),
}

impl Display for StoreOpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreOpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<ConfigError> for StoreOpenError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for StoreOpenError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Failure of a locked write path (registration, keyed update or delete).
#[derive(Debug)]
pub enum RegistrationError {
    Busy(LockError),
    /// Another row already holds `key` in the key column.
    Conflict { table: String, key: String },
    /// No row holds `key` in the key column.
    NotFound { table: String, key: String },
    /// Table is neither a standard table of the module nor already present.
    UnknownTable { module: Module, table: String },
    UnknownColumn { table: String, column: String },
    /// The submitted row has no value in the key column.
    MissingKey { table: String, column: String },
    Repo(RepoError),
}

impl Display for RegistrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy(err) => write!(f, "{err}"),
            Self::Conflict { table, key } => {
                write!(f, "`{key}` already exists in table `{table}`")
            }
            Self::NotFound { table, key } => write!(f, "`{key}` not found in table `{table}`"),
            Self::UnknownTable { module, table } => {
                write!(f, "table `{table}` does not exist in module `{module}`")
            }
            Self::UnknownColumn { table, column } => {
                write!(f, "table `{table}` has no column `{column}`")
            }
            Self::MissingKey { table, column } => {
                write!(f, "row for table `{table}` has no value in key column `{column}`")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Busy(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LockError> for RegistrationError {
    fn from(value: LockError) -> Self {
        Self::Busy(value)
    }
}

impl From<RepoError> for RegistrationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// One open school store.
pub struct SchoolStore {
    settings: StoreConfig,
    backend: SqliteStorageBackend,
    config_store: SqliteConfigStore,
    cache: EphemeralCache,
    lock: LockManager,
}

impl SchoolStore {
    /// Opens (and migrates) a store file.
    pub fn open(path: impl AsRef<Path>, settings: StoreConfig) -> Result<Self, StoreOpenError> {
        settings.validate()?;
        let db = Database::open(path)?;
        Ok(Self::from_database(Arc::new(db), settings))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory(settings: StoreConfig) -> Result<Self, StoreOpenError> {
        settings.validate()?;
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(Arc::new(db), settings))
    }

    /// Builds a store over an already migrated database.
    ///
    /// `settings` is assumed valid.
    pub fn from_database(db: Arc<Database>, settings: StoreConfig) -> Self {
        let cache = EphemeralCache::new(settings.cache_max_payload_bytes, settings.cache_max_ttl());
        let lock = LockManager::new(settings.lock_timeout());
        Self {
            backend: SqliteStorageBackend::new(Arc::clone(&db)),
            config_store: SqliteConfigStore::new(db),
            cache,
            lock,
            settings,
        }
    }

    pub fn settings(&self) -> &StoreConfig {
        &self.settings
    }

    pub fn cache(&self) -> &EphemeralCache {
        &self.cache
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    pub fn directory(&self) -> DirectoryResolver<'_> {
        DirectoryResolver::new(&self.backend, &self.config_store, &self.settings)
    }

    pub fn tables(&self) -> TableAccessor<'_> {
        TableAccessor::new(&self.backend)
    }

    pub fn rows(&self) -> RowStore<'_> {
        RowStore::new(&self.backend)
    }

    pub fn archive(&self) -> ArchiveLog<'_> {
        ArchiveLog::new(self.directory(), self.tables(), self.rows())
    }

    pub fn provisioning(&self) -> ProvisionService<'_> {
        ProvisionService::new(self.directory(), self.tables())
    }

    pub fn rollover_service(&self) -> RolloverService<'_> {
        RolloverService::new(
            self.directory(),
            self.tables(),
            &self.lock,
            self.settings.lock_timeout(),
        )
    }

    /// Context pinned to the persisted active session.
    pub fn current_context(&self) -> RepoResult<SessionContext> {
        self.directory().current_context()
    }

    /// Data rows of a module table, served from the cache when fresh.
    ///
    /// A missing table reads as empty and is not created.
    pub fn list_rows(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
    ) -> RepoResult<Vec<Row>> {
        let key = rows_cache_key(ctx.session(), module, table);
        let generation = self.cache.generation(&key);
        if let Some(rows) = self.cache.get::<Vec<Row>>(&key) {
            debug!(
                "event=rows_read module=store status=ok source=cache target={} table={}",
                module, table
            );
            return Ok(rows);
        }
        let container = self.directory().resolve(ctx, module)?;
        let rows = self.tables().read_all_data_rows(&container, table)?;
        self.cache
            .put_if_unchanged(&key, &rows, self.settings.cache_ttl(), generation);
        Ok(rows)
    }

    /// Row whose `key_column` holds `key`, read without the lock.
    pub fn get_by_key(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, RegistrationError> {
        let handle = self.open_table(ctx, module, table)?;
        let column = self.key_column(&handle, key_column)?;
        Ok(self
            .rows()
            .find_by_key(&handle, column, key)?
            .map(|(_, row)| row))
    }

    /// Appends `row` unless another row already holds its key.
    ///
    /// Returns the new row's position.
    pub fn register_unique(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
        key_column: &str,
        row: Row,
    ) -> Result<usize, RegistrationError> {
        self.lock.with_default_lock(|| {
            let handle = self.open_table(ctx, module, table)?;
            let column = self.key_column(&handle, key_column)?;
            let key = row_key(&handle, &row, column, key_column)?;
            if self.rows().find_by_key(&handle, column, &key)?.is_some() {
                warn!(
                    "event=row_register module=store status=error error_code=conflict target={} table={}",
                    module, handle.name
                );
                return Err(RegistrationError::Conflict {
                    table: handle.name.clone(),
                    key,
                });
            }
            let position = self.rows().append(&handle, &row)?;
            self.invalidate(ctx, module, &handle.name);
            info!(
                "event=row_register module=store status=ok target={} table={} position={}",
                module, handle.name, position
            );
            Ok(position)
        })?
    }

    /// Registers a row under a freshly generated `{prefix}{nnn}` id.
    ///
    /// The id is one past the highest numeric suffix already in use, so ids
    /// freed by deletes are never reissued while a higher one exists.
    pub fn register_with_generated_id(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
        key_column: &str,
        prefix: &str,
        build_row: impl FnOnce(&str) -> Row,
    ) -> Result<(String, usize), RegistrationError> {
        self.lock.with_default_lock(|| {
            let handle = self.open_table(ctx, module, table)?;
            let column = self.key_column(&handle, key_column)?;
            let next = self
                .rows()
                .data_rows(&handle)?
                .iter()
                .filter_map(|row| row.get(column))
                .filter_map(|cell| {
                    cell.display_string()
                        .strip_prefix(prefix)
                        .and_then(|suffix| suffix.parse::<u64>().ok())
                })
                .max()
                .map_or(1, |max| max + 1);
            let id = format!("{prefix}{next:03}");
            let row = build_row(&id);
            if !key_matches(&row, column, &id) {
                return Err(RegistrationError::MissingKey {
                    table: handle.name.clone(),
                    column: key_column.to_string(),
                });
            }
            let position = self.rows().append(&handle, &row)?;
            self.invalidate(ctx, module, &handle.name);
            info!(
                "event=row_register module=store status=ok target={} table={} position={} generated=true",
                module, handle.name, position
            );
            Ok((id, position))
        })?
    }

    /// Overwrites the row holding `key`; returns its position.
    ///
    /// The replacement may change the key, but only to one no other row
    /// holds.
    pub fn update_by_key(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
        key_column: &str,
        key: &str,
        row: Row,
    ) -> Result<usize, RegistrationError> {
        self.lock.with_default_lock(|| {
            let handle = self.open_table(ctx, module, table)?;
            let column = self.key_column(&handle, key_column)?;
            let (position, _) = self.locate(&handle, column, key)?;
            let new_key = row_key(&handle, &row, column, key_column)?;
            if let Some((holder, _)) = self.rows().find_by_key(&handle, column, &new_key)? {
                if holder != position {
                    warn!(
                        "event=row_update module=store status=error error_code=conflict target={} table={}",
                        module, handle.name
                    );
                    return Err(RegistrationError::Conflict {
                        table: handle.name.clone(),
                        key: new_key,
                    });
                }
            }
            self.rows().update_at(&handle, position, &row)?;
            self.invalidate(ctx, module, &handle.name);
            Ok(position)
        })?
    }

    /// Archives the row holding `key`, then deletes it.
    pub fn delete_by_key(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
        key_column: &str,
        key: &str,
        actor: &str,
    ) -> Result<ArchiveRecord, RegistrationError> {
        self.lock.with_default_lock(|| {
            let handle = self.open_table(ctx, module, table)?;
            let column = self.key_column(&handle, key_column)?;
            let (position, _) = self.locate(&handle, column, key)?;
            let record = self
                .archive()
                .archive_then_delete(ctx, module, &handle, position, key, actor)?;
            self.invalidate(ctx, module, &handle.name);
            Ok(record)
        })?
    }

    /// Rolls the store over to `new_session`.
    pub fn rollover(&self, new_session: &SessionId) -> Result<RolloverReport, RolloverError> {
        let report = self.rollover_service().rollover(new_session)?;
        let dropped = self
            .cache
            .remove_prefix(&format!("rows:{}:", report.new_session));
        debug!(
            "event=cache_invalidate module=store status=ok session={} entries={}",
            report.new_session, dropped
        );
        Ok(report)
    }

    /// Uploads an asset into `Uploads/<category>`; `""` on any failure.
    pub fn upload_asset(&self, uploader: &dyn AssetUploader, request: &UploadRequest) -> String {
        match self.directory().asset_folder(&request.category) {
            Ok(folder) => upload_or_empty(uploader, &folder, request),
            Err(err) => {
                warn!(
                    "event=asset_upload module=store status=error error_code=folder_unavailable error={}",
                    err
                );
                String::new()
            }
        }
    }

    fn open_table(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &str,
    ) -> Result<TableHandle, RegistrationError> {
        let container = self.directory().resolve(ctx, module)?;
        if let Some(spec) = module.table_spec(table) {
            return Ok(self.tables().ensure_standard(&container, spec)?.id);
        }
        self.tables()
            .open(&container, table)?
            .ok_or_else(|| RegistrationError::UnknownTable {
                module,
                table: table.to_string(),
            })
    }

    fn key_column(&self, table: &TableHandle, column: &str) -> Result<usize, RegistrationError> {
        self.rows()
            .column_index(table, column)?
            .ok_or_else(|| RegistrationError::UnknownColumn {
                table: table.name.clone(),
                column: column.to_string(),
            })
    }

    fn locate(
        &self,
        table: &TableHandle,
        column: usize,
        key: &str,
    ) -> Result<(usize, Row), RegistrationError> {
        self.rows()
            .find_by_key(table, column, key)?
            .ok_or_else(|| RegistrationError::NotFound {
                table: table.name.clone(),
                key: key.to_string(),
            })
    }

    fn invalidate(&self, ctx: &SessionContext, module: Module, table: &str) {
        self.cache.remove(&rows_cache_key(ctx.session(), module, table));
    }
}

/// Display form of the row's key cell; blank keys are missing.
fn row_key(
    table: &TableHandle,
    row: &Row,
    column: usize,
    key_column: &str,
) -> Result<String, RegistrationError> {
    row.get(column)
        .map(Cell::display_string)
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| RegistrationError::MissingKey {
            table: table.name.clone(),
            column: key_column.to_string(),
        })
}

fn rows_cache_key(session: &SessionId, module: Module, table: &str) -> String {
    format!("rows:{}:{}:{}", session, module.as_str(), table)
}

#[cfg(test)]
mod tests {
    use super::{rows_cache_key, RegistrationError, SchoolStore};
    use crate::config::StoreConfig;
    use crate::model::cell::{Cell, Row};
    use crate::model::module::{Module, STUDENTS_TABLE};
    use crate::model::session::SessionContext;

    const KEY: &str = "Student ID";

    fn store() -> (SchoolStore, SessionContext) {
        let store = SchoolStore::open_in_memory(StoreConfig::default()).expect("open store");
        let ctx = store.current_context().expect("context");
        (store, ctx)
    }

    fn student(id: &str, name: &str) -> Row {
        vec![Cell::text(id), Cell::text(name), Cell::text("5"), Cell::text("A")]
    }

    fn register(
        store: &SchoolStore,
        ctx: &SessionContext,
        row: Row,
    ) -> Result<usize, RegistrationError> {
        store.register_unique(ctx, Module::Students, STUDENTS_TABLE, KEY, row)
    }

    fn students(store: &SchoolStore, ctx: &SessionContext) -> Vec<Row> {
        store
            .list_rows(ctx, Module::Students, STUDENTS_TABLE)
            .expect("list")
    }

    #[test]
    fn list_rows_is_served_from_cache_until_a_write() {
        let (store, ctx) = store();
        register(&store, &ctx, student("S001", "Asha")).expect("register");

        assert_eq!(students(&store, &ctx).len(), 1);
        let misses = store.cache().stats().misses;
        students(&store, &ctx);
        assert_eq!(store.cache().stats().misses, misses);

        register(&store, &ctx, student("S002", "Ravi")).expect("register");
        assert_eq!(students(&store, &ctx).len(), 2);
    }

    #[test]
    fn read_computed_before_a_write_is_not_cached_after_it() {
        let (store, ctx) = store();
        register(&store, &ctx, student("S001", "Asha")).expect("register");

        let key = rows_cache_key(ctx.session(), Module::Students, STUDENTS_TABLE);
        let before_write = store.cache().generation(&key);
        let stale = students(&store, &ctx);

        register(&store, &ctx, student("S002", "Ravi")).expect("register");
        let ttl = store.settings().cache_ttl();
        assert!(!store
            .cache()
            .put_if_unchanged(&key, &stale, ttl, before_write));
        assert_eq!(students(&store, &ctx).len(), 2);
    }

    #[test]
    fn register_unique_rejects_duplicate_key() {
        let (store, ctx) = store();
        register(&store, &ctx, student("S001", "Asha")).expect("register");
        let error = register(&store, &ctx, student("S001", "Other")).expect_err("duplicate");
        assert!(matches!(error, RegistrationError::Conflict { ref key, .. } if key == "S001"));
    }

    #[test]
    fn unknown_column_and_table_are_reported() {
        let (store, ctx) = store();
        let error = store
            .register_unique(
                &ctx,
                Module::Students,
                STUDENTS_TABLE,
                "Admission No",
                student("S001", "Asha"),
            )
            .expect_err("unknown column");
        assert!(matches!(error, RegistrationError::UnknownColumn { .. }));

        let error = store
            .get_by_key(&ctx, Module::Results, "Results_Midterm", KEY, "S001")
            .expect_err("unknown table");
        assert!(matches!(error, RegistrationError::UnknownTable { .. }));
    }

    #[test]
    fn generated_ids_continue_after_highest_suffix() {
        let (store, ctx) = store();
        register(&store, &ctx, student("STU007", "Asha")).expect("register");
        let (id, position) = store
            .register_with_generated_id(&ctx, Module::Students, STUDENTS_TABLE, KEY, "STU", |id| {
                student(id, "Ravi")
            })
            .expect("generated");
        assert_eq!(id, "STU008");
        assert_eq!(position, 1);
    }

    #[test]
    fn update_and_delete_by_key() {
        let (store, ctx) = store();
        for (id, name) in [("S001", "Asha"), ("S002", "Ravi"), ("S003", "Meera")] {
            register(&store, &ctx, student(id, name)).expect("register");
        }

        let position = store
            .update_by_key(
                &ctx,
                Module::Students,
                STUDENTS_TABLE,
                KEY,
                "S002",
                student("S002", "Ravi K"),
            )
            .expect("update");
        assert_eq!(position, 1);

        let record = store
            .delete_by_key(&ctx, Module::Students, STUDENTS_TABLE, KEY, "S001", "admin")
            .expect("delete");
        assert_eq!(record.original_id, "S001");
        assert_eq!(record.snapshot, student("S001", "Asha"));

        assert_eq!(
            students(&store, &ctx),
            vec![student("S002", "Ravi K"), student("S003", "Meera")]
        );

        let error = store
            .delete_by_key(&ctx, Module::Students, STUDENTS_TABLE, KEY, "S001", "admin")
            .expect_err("already deleted");
        assert!(matches!(error, RegistrationError::NotFound { .. }));
    }

    #[test]
    fn update_by_key_keeps_keys_unique_and_present() {
        let (store, ctx) = store();
        register(&store, &ctx, student("S001", "Asha")).expect("register");
        register(&store, &ctx, student("S002", "Ravi")).expect("register");
        let update = |key: &str, row: Row| {
            store.update_by_key(&ctx, Module::Students, STUDENTS_TABLE, KEY, key, row)
        };

        let error = update("S002", student("S001", "Ravi")).expect_err("taken key");
        assert!(matches!(error, RegistrationError::Conflict { ref key, .. } if key == "S001"));

        let error = update("S002", student(" ", "Ravi")).expect_err("blank key");
        assert!(matches!(error, RegistrationError::MissingKey { .. }));
        let error = update("S002", Vec::new()).expect_err("short row");
        assert!(matches!(error, RegistrationError::MissingKey { .. }));

        assert_eq!(update("S002", student("S003", "Ravi")).expect("rename"), 1);
        assert_eq!(
            students(&store, &ctx),
            vec![student("S001", "Asha"), student("S003", "Ravi")]
        );
    }
}
