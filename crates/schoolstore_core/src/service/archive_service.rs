//! Archive log: append-only snapshots of deleted rows.
//!
//! # Invariants
//! - Entries are only ever appended; nothing here updates or prunes them.
//! - The snapshot column holds the JSON form of the pre-delete row.

use crate::model::cell::{Cell, Row};
use crate::model::container::TableHandle;
use crate::model::module::{parse_module, Module, ARCHIVE_HEADER, ARCHIVE_TABLE};
use crate::model::session::SessionContext;
use crate::repo::error::{RepoError, RepoResult};
use crate::service::directory_service::DirectoryResolver;
use crate::service::row_service::RowStore;
use crate::service::table_service::TableAccessor;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;

/// One archived row.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub module: Module,
    pub original_id: String,
    pub snapshot: Row,
}

impl ArchiveRecord {
    fn to_row(&self) -> RepoResult<Row> {
        Ok(vec![
            Cell::text(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Cell::text(self.actor.as_str()),
            Cell::text(self.module.as_str()),
            Cell::text(self.original_id.as_str()),
            Cell::text(serde_json::to_string(&self.snapshot)?),
        ])
    }

    fn from_row(row: &Row) -> RepoResult<Self> {
        let timestamp = DateTime::parse_from_rfc3339(text_at(row, 0)?)
            .map_err(|err| RepoError::InvalidData(format!("invalid archive timestamp: {err}")))?
            .with_timezone(&Utc);
        let module = parse_module(text_at(row, 2)?)
            .map_err(|err| RepoError::InvalidData(format!("invalid archive module: {err}")))?;
        Ok(Self {
            timestamp,
            actor: text_at(row, 1)?.to_string(),
            module,
            original_id: text_at(row, 3)?.to_string(),
            snapshot: serde_json::from_str(text_at(row, 4)?)?,
        })
    }
}

fn text_at(row: &Row, index: usize) -> RepoResult<&str> {
    row.get(index).and_then(Cell::as_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "archive row column `{}` is missing or not text",
            ARCHIVE_HEADER[index]
        ))
    })
}

#[derive(Clone, Copy)]
pub struct ArchiveLog<'a> {
    resolver: DirectoryResolver<'a>,
    tables: TableAccessor<'a>,
    rows: RowStore<'a>,
}

impl<'a> ArchiveLog<'a> {
    pub fn new(
        resolver: DirectoryResolver<'a>,
        tables: TableAccessor<'a>,
        rows: RowStore<'a>,
    ) -> Self {
        Self {
            resolver,
            tables,
            rows,
        }
    }

    /// Appends one immutable archive entry.
    pub fn record(
        &self,
        ctx: &SessionContext,
        module: Module,
        record_id: &str,
        snapshot: &Row,
        actor: &str,
    ) -> RepoResult<ArchiveRecord> {
        let record = ArchiveRecord {
            timestamp: Utc::now(),
            actor: actor.trim().to_string(),
            module,
            original_id: record_id.trim().to_string(),
            snapshot: snapshot.clone(),
        };
        let table = self.archive_table(ctx)?;
        self.rows.append(&table, &record.to_row()?)?;
        info!(
            "event=archive_record module=archive status=ok target={} session={} record_id={}",
            module,
            ctx.session(),
            record.original_id
        );
        Ok(record)
    }

    /// Snapshots the row at `position` into the archive, then deletes it.
    ///
    /// Callers hold the store lock so the position cannot shift in between.
    pub fn archive_then_delete(
        &self,
        ctx: &SessionContext,
        module: Module,
        table: &TableHandle,
        position: usize,
        record_id: &str,
        actor: &str,
    ) -> RepoResult<ArchiveRecord> {
        let data_rows = self.rows.data_rows(table)?;
        let snapshot = data_rows
            .get(position)
            .ok_or_else(|| RepoError::InvalidPosition {
                table: table.name.clone(),
                position,
                len: data_rows.len(),
            })?;
        let record = self.record(ctx, module, record_id, snapshot, actor)?;
        self.rows.delete_at(table, position)?;
        Ok(record)
    }

    /// Archive entries of the session, oldest first.
    pub fn list(&self, ctx: &SessionContext) -> RepoResult<Vec<ArchiveRecord>> {
        let Some(container) = self.resolver.find_existing(ctx, Module::Archive)? else {
            return Ok(Vec::new());
        };
        self.tables
            .read_all_data_rows(&container, ARCHIVE_TABLE)?
            .iter()
            .map(ArchiveRecord::from_row)
            .collect()
    }

    fn archive_table(&self, ctx: &SessionContext) -> RepoResult<TableHandle> {
        let container = self.resolver.resolve(ctx, Module::Archive)?;
        self.tables
            .get_or_create(&container, ARCHIVE_TABLE, ARCHIVE_HEADER)
    }
}
