//! Row store operations: linear-scan keyed access over one table.
//!
//! # Responsibility
//! - Find, append, overwrite and delete data rows by position.
//! - Resolve key columns by header name.
//!
//! # Invariants
//! - Positions are 0-based over data rows; the header is never addressed.
//! - Updates overwrite the whole row.
//! - Deletes remove exactly one row and shift later rows up.

use crate::model::cell::Row;
use crate::model::container::TableHandle;
use crate::repo::error::RepoResult;
use crate::repo::storage_repo::StorageBackend;
use log::debug;

#[derive(Clone, Copy)]
pub struct RowStore<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> RowStore<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    /// Data rows in positional order.
    pub fn data_rows(&self, table: &TableHandle) -> RepoResult<Vec<Row>> {
        let mut rows = self.backend.read_rows(&table.id)?;
        if !rows.is_empty() {
            rows.remove(0);
        }
        Ok(rows)
    }

    /// First row matching `predicate`, in row order.
    pub fn find(
        &self,
        table: &TableHandle,
        predicate: impl Fn(&Row) -> bool,
    ) -> RepoResult<Option<Row>> {
        Ok(self
            .find_with_position(table, predicate)?
            .map(|(_, row)| row))
    }

    /// Position of the first row matching `predicate`.
    pub fn find_position(
        &self,
        table: &TableHandle,
        predicate: impl Fn(&Row) -> bool,
    ) -> RepoResult<Option<usize>> {
        Ok(self
            .find_with_position(table, predicate)?
            .map(|(position, _)| position))
    }

    pub fn find_with_position(
        &self,
        table: &TableHandle,
        predicate: impl Fn(&Row) -> bool,
    ) -> RepoResult<Option<(usize, Row)>> {
        Ok(self
            .data_rows(table)?
            .into_iter()
            .enumerate()
            .find(|(_, row)| predicate(row)))
    }

    /// First row whose `key_column` cell equals `key` (display form).
    pub fn find_by_key(
        &self,
        table: &TableHandle,
        key_column: usize,
        key: &str,
    ) -> RepoResult<Option<(usize, Row)>> {
        self.find_with_position(table, |row| key_matches(row, key_column, key))
    }

    /// Index of a header column by exact (trimmed) name.
    pub fn column_index(&self, table: &TableHandle, column: &str) -> RepoResult<Option<usize>> {
        let rows = self.backend.read_rows(&table.id)?;
        Ok(rows.first().and_then(|header| {
            header
                .iter()
                .position(|cell| cell.as_text().map(str::trim) == Some(column.trim()))
        }))
    }

    /// Appends a row at the end and returns its position.
    pub fn append(&self, table: &TableHandle, row: &Row) -> RepoResult<usize> {
        let position = self.backend.append_row(&table.id, row)?;
        debug!(
            "event=row_append module=row status=ok table={} position={}",
            table.name, position
        );
        Ok(position)
    }

    /// Overwrites the whole row at `position`.
    pub fn update_at(&self, table: &TableHandle, position: usize, row: &Row) -> RepoResult<()> {
        self.backend.write_row(&table.id, position, row)?;
        debug!(
            "event=row_update module=row status=ok table={} position={}",
            table.name, position
        );
        Ok(())
    }

    /// Deletes the row at `position`, shifting later rows up.
    pub fn delete_at(&self, table: &TableHandle, position: usize) -> RepoResult<()> {
        self.backend.remove_row(&table.id, position)?;
        debug!(
            "event=row_delete module=row status=ok table={} position={}",
            table.name, position
        );
        Ok(())
    }

    /// Number of data rows.
    pub fn count(&self, table: &TableHandle) -> RepoResult<usize> {
        self.backend.data_row_count(&table.id)
    }
}

/// Whether `row[key_column]` holds `key`; rows too short never match.
pub fn key_matches(row: &Row, key_column: usize, key: &str) -> bool {
    row.get(key_column)
        .is_some_and(|cell| cell.matches_key(key))
}
