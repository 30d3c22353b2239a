//! Use-case API for entity handlers.
//!
//! # Responsibility
//! - Expose store operations with plain string/JSON inputs.
//! - Wrap every result into one serializable [`Outcome`] envelope.
//!
//! # Invariants
//! - Exported functions never panic.
//! - Failures carry a human-readable message and no payload.

use log::warn;
use schoolstore_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, parse_module,
    AssetUploader, Module, RolloverReport, Row, SchoolStore, SessionContext, SessionId,
    StoreConfig, StoreOpenError, UploadRequest,
};
use serde::Serialize;
use std::path::PathBuf;

const STORE_DB_FILE_NAME: &str = "schoolstore.sqlite3";
const STORE_DB_PATH_ENV: &str = "SCHOOLSTORE_DB_PATH";

/// Result envelope returned by every API call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub ok: bool,
    pub payload: Option<T>,
    pub message: String,
}

impl<T> Outcome<T> {
    pub fn success(message: impl Into<String>, payload: T) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: None,
            message: message.into(),
        }
    }
}

impl<T: Serialize> Outcome<T> {
    /// JSON form of the envelope.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            serde_json::json!({
                "ok": false,
                "payload": null,
                "message": format!("response encoding failed: {err}"),
            })
            .to_string()
        })
    }
}

/// Core crate version.
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Starts core logging; returns an empty string on success and the error
/// message otherwise.
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Store handle used by entity handlers.
pub struct SchoolStoreApi {
    store: SchoolStore,
}

impl SchoolStoreApi {
    pub fn new(store: SchoolStore) -> Self {
        Self { store }
    }

    /// Opens the store at `$SCHOOLSTORE_DB_PATH`, or a file in the temp dir.
    pub fn open_default(settings: StoreConfig) -> Result<Self, StoreOpenError> {
        SchoolStore::open(default_store_path(), settings).map(Self::new)
    }

    pub fn open_in_memory(settings: StoreConfig) -> Result<Self, StoreOpenError> {
        SchoolStore::open_in_memory(settings).map(Self::new)
    }

    pub fn store(&self) -> &SchoolStore {
        &self.store
    }

    pub fn active_session(&self) -> Outcome<String> {
        match self.store.directory().active_session() {
            Ok(session) => Outcome::success("Active session loaded.", session.to_string()),
            Err(err) => Outcome::failure(format!("active_session failed: {err}")),
        }
    }

    /// Provisions every standard table in the active session; payload is
    /// the number of tables created.
    pub fn provision(&self) -> Outcome<usize> {
        let result = self
            .store
            .current_context()
            .and_then(|ctx| self.store.provisioning().provision_all(&ctx));
        match result {
            Ok(summary) => Outcome::success("Session provisioned.", summary.created.len()),
            Err(err) => Outcome::failure(format!("provision failed: {err}")),
        }
    }

    pub fn rollover_session(&self, new_session: String) -> Outcome<RolloverReport> {
        let session = match SessionId::parse(&new_session) {
            Ok(session) => session,
            Err(err) => return Outcome::failure(format!("rollover_session failed: {err}")),
        };
        match self.store.rollover(&session) {
            Ok(report) if report.is_complete() => {
                Outcome::success(format!("Rolled over to {session}."), report)
            }
            Ok(report) => {
                let mut failed = report
                    .failed_masters()
                    .map(|entry| entry.table)
                    .collect::<Vec<_>>();
                if report.provision_error.is_some() {
                    failed.push("provisioning");
                }
                if report.session_folder_error.is_some() {
                    failed.push("session folder");
                }
                let failed = failed.join(", ");
                warn!(
                    "event=rollover_session module=api status=partial failed={}",
                    failed
                );
                // The pointer already moved; callers get the report to retry copies.
                Outcome {
                    ok: false,
                    payload: Some(report),
                    message: format!("Rolled over to {session} with failures: {failed}"),
                }
            }
            Err(err) => Outcome::failure(format!("rollover_session failed: {err}")),
        }
    }

    /// Data rows of a module table in the active session.
    pub fn list_rows(&self, module: String, table: String) -> Outcome<Vec<Row>> {
        let result = self.context_and_module(&module).and_then(|(ctx, module)| {
            self.store
                .list_rows(&ctx, module, table.trim())
                .map_err(|err| err.to_string())
        });
        match result {
            Ok(rows) => Outcome::success(format!("Loaded {} row(s).", rows.len()), rows),
            Err(err) => Outcome::failure(format!("list_rows failed: {err}")),
        }
    }

    /// Registers a row given as a JSON array of cells; payload is its position.
    pub fn register_row(
        &self,
        module: String,
        table: String,
        key_column: String,
        row_json: String,
    ) -> Outcome<usize> {
        let result = self.context_and_module(&module).and_then(|(ctx, module)| {
            let row: Row = serde_json::from_str(&row_json)
                .map_err(|err| format!("invalid row payload: {err}"))?;
            self.store
                .register_unique(&ctx, module, table.trim(), key_column.trim(), row)
                .map_err(|err| err.to_string())
        });
        match result {
            Ok(position) => Outcome::success("Row registered.", position),
            Err(err) => Outcome::failure(format!("register_row failed: {err}")),
        }
    }

    /// Archives then deletes the row holding `key`; payload is the archived id.
    pub fn delete_row(
        &self,
        module: String,
        table: String,
        key_column: String,
        key: String,
        actor: String,
    ) -> Outcome<String> {
        let result = self.context_and_module(&module).and_then(|(ctx, module)| {
            self.store
                .delete_by_key(
                    &ctx,
                    module,
                    table.trim(),
                    key_column.trim(),
                    key.trim(),
                    actor.trim(),
                )
                .map_err(|err| err.to_string())
        });
        match result {
            Ok(record) => Outcome::success("Row archived and deleted.", record.original_id),
            Err(err) => Outcome::failure(format!("delete_row failed: {err}")),
        }
    }

    /// Uploads an asset; an empty URL means the upload failed.
    pub fn upload_asset(&self, uploader: &dyn AssetUploader, request: &UploadRequest) -> String {
        self.store.upload_asset(uploader, request)
    }

    fn context_and_module(&self, module: &str) -> Result<(SessionContext, Module), String> {
        let module = parse_module(module).map_err(|err| err.to_string())?;
        let ctx = self.store.current_context().map_err(|err| err.to_string())?;
        Ok((ctx, module))
    }
}

fn default_store_path() -> PathBuf {
    if let Ok(raw) = std::env::var(STORE_DB_PATH_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(STORE_DB_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::{core_version, init_logging, Outcome, SchoolStoreApi};
    use schoolstore_core::{AssetUploader, FolderId, SchoolStore, StoreConfig, UploadRequest};

    fn api() -> SchoolStoreApi {
        SchoolStoreApi::open_in_memory(StoreConfig::default()).expect("open api")
    }

    fn register(api: &SchoolStoreApi, id: &str) -> Outcome<usize> {
        api.register_row(
            "students".to_string(),
            "Students".to_string(),
            "Student ID".to_string(),
            format!(r#"[{{"type":"text","value":"{id}"}},{{"type":"text","value":"Asha"}}]"#),
        )
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_bad_input() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
        assert!(!init_logging("verbose".to_string(), "/tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn outcome_serializes_envelope() {
        let json = Outcome::success("done", 3usize).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["ok"], true);
        assert_eq!(value["payload"], 3);

        let json = Outcome::<usize>::failure("nope").to_json();
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["payload"], serde_json::Value::Null);
        assert_eq!(value["message"], "nope");
    }

    #[test]
    fn register_list_and_delete_round_trip() {
        let api = api();
        let created = register(&api, "S001");
        assert!(created.ok, "{}", created.message);
        assert_eq!(created.payload, Some(0));

        let duplicate = register(&api, "S001");
        assert!(!duplicate.ok);
        assert!(duplicate.message.contains("already exists"));

        let listed = api.list_rows("students".to_string(), "Students".to_string());
        assert_eq!(listed.payload.map(|rows| rows.len()), Some(1));

        let deleted = api.delete_row(
            "students".to_string(),
            "Students".to_string(),
            "Student ID".to_string(),
            "S001".to_string(),
            "admin".to_string(),
        );
        assert_eq!(deleted.payload.as_deref(), Some("S001"));
    }

    #[test]
    fn unknown_module_and_bad_row_fail_cleanly() {
        let api = api();
        let listed = api.list_rows("library".to_string(), "Books".to_string());
        assert!(!listed.ok);

        let bad = api.register_row(
            "students".to_string(),
            "Students".to_string(),
            "Student ID".to_string(),
            "not json".to_string(),
        );
        assert!(!bad.ok);
        assert!(bad.message.contains("invalid row payload"));
    }

    #[test]
    fn rollover_switches_active_session() {
        let api = api();
        assert!(register(&api, "S001").ok);

        let report = api.rollover_session("2025-26".to_string());
        assert!(report.ok, "{}", report.message);
        assert_eq!(api.active_session().payload.as_deref(), Some("2025-26"));
        let listed = api.list_rows("students".to_string(), "Students".to_string());
        assert_eq!(listed.payload.map(|rows| rows.len()), Some(1));

        assert!(!api.rollover_session("2025-26".to_string()).ok);
        assert!(!api.rollover_session("bad session!".to_string()).ok);
    }

    #[test]
    fn active_session_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("school.sqlite3");
        let open = || {
            SchoolStore::open(&path, StoreConfig::default())
                .map(SchoolStoreApi::new)
                .expect("open file store")
        };

        let api = open();
        assert_eq!(api.active_session().payload.as_deref(), Some("2024-25"));
        assert!(api.rollover_session("2025-26".to_string()).ok);
        drop(api);

        assert_eq!(open().active_session().payload.as_deref(), Some("2025-26"));
    }

    struct FixedUploader;

    impl AssetUploader for FixedUploader {
        fn upload(&self, folder: &FolderId, request: &UploadRequest) -> String {
            format!("https://files.test/{folder}/{}", request.target_name)
        }
    }

    #[test]
    fn upload_asset_returns_url_or_empty() {
        let api = api();
        let request = UploadRequest::new("aGVsbG8=", "image/png", "S001.png", "student_photos");
        assert!(api
            .upload_asset(&FixedUploader, &request)
            .ends_with("/S001.png"));

        let empty = UploadRequest::new("aGVsbG8=", "image/png", "S001.png", " ");
        assert_eq!(api.upload_asset(&FixedUploader, &empty), "");
    }
}
