//! Table accessor: named tables inside a container.
//!
//! # Invariants
//! - `get_or_create` never produces two tables with the same name in one
//!   container.
//! - A missing table reads as empty; absence is not a failure.

use crate::model::cell::{header_row, Row};
use crate::model::container::{Container, TableHandle};
use crate::model::module::TableSpec;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::storage_repo::{Ensured, StorageBackend};
use log::info;

#[derive(Clone, Copy)]
pub struct TableAccessor<'a> {
    backend: &'a dyn StorageBackend,
}

impl<'a> TableAccessor<'a> {
    pub fn new(backend: &'a dyn StorageBackend) -> Self {
        Self { backend }
    }

    /// Returns the named table, creating it with `header` when absent.
    ///
    /// The header is only applied on creation; an existing table keeps its
    /// own header.
    pub fn get_or_create(
        &self,
        container: &Container,
        name: &str,
        header: &[&str],
    ) -> RepoResult<TableHandle> {
        self.ensure(container, name, header).map(|ensured| ensured.id)
    }

    /// `get_or_create` that also reports whether the table was created.
    pub fn ensure(
        &self,
        container: &Container,
        name: &str,
        header: &[&str],
    ) -> RepoResult<Ensured<TableHandle>> {
        let name = validate_table_name(name)?;
        let ensured = self
            .backend
            .ensure_table(&container.id, name, &header_row(header))?;
        if ensured.created {
            info!(
                "event=table_create module=table status=ok target={} session={} table={} columns={}",
                container.module,
                container.session,
                name,
                header.len()
            );
        }
        Ok(Ensured {
            id: TableHandle {
                id: ensured.id,
                container_id: container.id.clone(),
                name: name.to_string(),
            },
            created: ensured.created,
        })
    }

    /// Ensures one standard catalog table.
    pub fn ensure_standard(
        &self,
        container: &Container,
        spec: &TableSpec,
    ) -> RepoResult<Ensured<TableHandle>> {
        self.ensure(container, spec.name, spec.header)
    }

    /// Opens an existing table without creating it.
    pub fn open(&self, container: &Container, name: &str) -> RepoResult<Option<TableHandle>> {
        let id = self.backend.find_table(&container.id, name)?;
        Ok(id.map(|id| TableHandle {
            id,
            container_id: container.id.clone(),
            name: name.to_string(),
        }))
    }

    /// All rows of a table, header first; empty when the table is missing.
    pub fn read_all_rows(&self, container: &Container, name: &str) -> RepoResult<Vec<Row>> {
        match self.open(container, name)? {
            Some(table) => self.backend.read_rows(&table.id),
            None => Ok(Vec::new()),
        }
    }

    /// Data rows of a table (header excluded); empty when the table is
    /// missing.
    pub fn read_all_data_rows(&self, container: &Container, name: &str) -> RepoResult<Vec<Row>> {
        let mut rows = self.read_all_rows(container, name)?;
        if !rows.is_empty() {
            rows.remove(0);
        }
        Ok(rows)
    }

    /// Header row of an open table.
    pub fn header(&self, table: &TableHandle) -> RepoResult<Row> {
        self.backend
            .read_rows(&table.id)?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::InvalidData(format!("table `{}` has no header", table.name)))
    }

    /// Replaces the whole table content, header included.
    pub fn replace_contents(&self, table: &TableHandle, rows: &[Row]) -> RepoResult<()> {
        if rows.is_empty() {
            return Err(RepoError::InvalidData(format!(
                "replacement for table `{}` must include a header row",
                table.name
            )));
        }
        self.backend.replace_rows(&table.id, rows)
    }

    pub fn list_tables(&self, container: &Container) -> RepoResult<Vec<String>> {
        self.backend.list_tables(&container.id)
    }
}

fn validate_table_name(name: &str) -> RepoResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidData(
            "table name must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
