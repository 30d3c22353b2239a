//! Hierarchical storage backend contracts and SQLite implementation.
//!
//! # Responsibility
//! - Model the root -> session folder -> module container hierarchy.
//! - Store named tables of positional rows inside containers.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `ensure_*` calls look up by name before creating, inside one
//!   transaction, so racing first-time provisioning never duplicates a
//!   folder, container or table.
//! - Row index 0 of every table is its header; data positions are 0-based
//!   and map to row index `position + 1`.
//! - Deleting a row shifts every later row up by one.

use crate::db::Database;
use crate::model::cell::Row;
use crate::model::container::{ContainerId, FolderId, TableId};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use uuid::Uuid;

const COLLECTION_KIND_FOLDER: &str = "folder";
const COLLECTION_KIND_CONTAINER: &str = "container";

/// Result of a find-or-create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured<T> {
    pub id: T,
    /// `true` when the item did not exist and was created by this call.
    pub created: bool,
}

/// Storage backend interface used by directory/table/row services.
pub trait StorageBackend: Send + Sync {
    /// Finds a folder by name under `parent` (`None` = top level).
    fn find_folder(&self, parent: Option<&FolderId>, name: &str) -> RepoResult<Option<FolderId>>;
    /// Finds or creates a folder by name under `parent`.
    fn ensure_folder(&self, parent: Option<&FolderId>, name: &str)
        -> RepoResult<Ensured<FolderId>>;
    fn folder_exists(&self, id: &FolderId) -> RepoResult<bool>;
    /// Finds a container by name inside `folder`.
    fn find_container(&self, folder: &FolderId, name: &str) -> RepoResult<Option<ContainerId>>;
    /// Finds or creates a container by name inside `folder`.
    fn ensure_container(&self, folder: &FolderId, name: &str) -> RepoResult<Ensured<ContainerId>>;
    fn container_exists(&self, id: &ContainerId) -> RepoResult<bool>;
    fn find_table(&self, container: &ContainerId, name: &str) -> RepoResult<Option<TableId>>;
    /// Finds or creates a table; a new table gets `header` as row 0.
    fn ensure_table(
        &self,
        container: &ContainerId,
        name: &str,
        header: &Row,
    ) -> RepoResult<Ensured<TableId>>;
    /// Table names in creation order.
    fn list_tables(&self, container: &ContainerId) -> RepoResult<Vec<String>>;
    /// All rows, header first.
    fn read_rows(&self, table: &TableId) -> RepoResult<Vec<Row>>;
    /// Number of data rows (header excluded).
    fn data_row_count(&self, table: &TableId) -> RepoResult<usize>;
    /// Appends a data row and returns its position.
    fn append_row(&self, table: &TableId, row: &Row) -> RepoResult<usize>;
    /// Overwrites the data row at `position`.
    fn write_row(&self, table: &TableId, position: usize, row: &Row) -> RepoResult<()>;
    /// Deletes the data row at `position` and compacts later rows.
    fn remove_row(&self, table: &TableId, position: usize) -> RepoResult<()>;
    /// Replaces every row, header included.
    fn replace_rows(&self, table: &TableId, rows: &[Row]) -> RepoResult<()>;
}

/// SQLite-backed storage backend.
pub struct SqliteStorageBackend {
    db: Arc<Database>,
}

impl SqliteStorageBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl StorageBackend for SqliteStorageBackend {
    fn find_folder(&self, parent: Option<&FolderId>, name: &str) -> RepoResult<Option<FolderId>> {
        let conn = self.db.lock();
        let id = find_collection(
            &conn,
            parent.map(FolderId::as_str),
            name,
            COLLECTION_KIND_FOLDER,
        )?;
        Ok(id.map(FolderId::new))
    }

    fn ensure_folder(
        &self,
        parent: Option<&FolderId>,
        name: &str,
    ) -> RepoResult<Ensured<FolderId>> {
        let mut conn = self.db.lock();
        let ensured = ensure_collection(
            &mut conn,
            parent.map(FolderId::as_str),
            name,
            COLLECTION_KIND_FOLDER,
        )?;
        Ok(Ensured {
            id: FolderId::new(ensured.id),
            created: ensured.created,
        })
    }

    fn folder_exists(&self, id: &FolderId) -> RepoResult<bool> {
        let conn = self.db.lock();
        collection_exists(&conn, id.as_str(), COLLECTION_KIND_FOLDER)
    }

    fn find_container(&self, folder: &FolderId, name: &str) -> RepoResult<Option<ContainerId>> {
        let conn = self.db.lock();
        let id = find_collection(
            &conn,
            Some(folder.as_str()),
            name,
            COLLECTION_KIND_CONTAINER,
        )?;
        Ok(id.map(ContainerId::new))
    }

    fn ensure_container(&self, folder: &FolderId, name: &str) -> RepoResult<Ensured<ContainerId>> {
        let mut conn = self.db.lock();
        if !collection_exists(&conn, folder.as_str(), COLLECTION_KIND_FOLDER)? {
            return Err(RepoError::NotFound(format!("folder {folder}")));
        }
        let ensured = ensure_collection(
            &mut conn,
            Some(folder.as_str()),
            name,
            COLLECTION_KIND_CONTAINER,
        )?;
        Ok(Ensured {
            id: ContainerId::new(ensured.id),
            created: ensured.created,
        })
    }

    fn container_exists(&self, id: &ContainerId) -> RepoResult<bool> {
        let conn = self.db.lock();
        collection_exists(&conn, id.as_str(), COLLECTION_KIND_CONTAINER)
    }

    fn find_table(&self, container: &ContainerId, name: &str) -> RepoResult<Option<TableId>> {
        let conn = self.db.lock();
        let id = find_table_id(&conn, container.as_str(), name)?;
        Ok(id.map(TableId::new))
    }

    fn ensure_table(
        &self,
        container: &ContainerId,
        name: &str,
        header: &Row,
    ) -> RepoResult<Ensured<TableId>> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        if !collection_exists(&tx, container.as_str(), COLLECTION_KIND_CONTAINER)? {
            return Err(RepoError::NotFound(format!("container {container}")));
        }
        if let Some(existing) = find_table_id(&tx, container.as_str(), name)? {
            return Ok(Ensured {
                id: TableId::new(existing),
                created: false,
            });
        }

        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO data_tables (id, container_id, name) VALUES (?1, ?2, ?3);",
            params![id.as_str(), container.as_str(), name],
        )?;
        tx.execute(
            "INSERT INTO table_rows (table_id, row_index, cells) VALUES (?1, 0, ?2);",
            params![id.as_str(), serde_json::to_string(header)?],
        )?;
        tx.commit()?;
        Ok(Ensured {
            id: TableId::new(id),
            created: true,
        })
    }

    fn list_tables(&self, container: &ContainerId) -> RepoResult<Vec<String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT name
             FROM data_tables
             WHERE container_id = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([container.as_str()])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get::<_, String>(0)?);
        }
        Ok(names)
    }

    fn read_rows(&self, table: &TableId) -> RepoResult<Vec<Row>> {
        let conn = self.db.lock();
        ensure_table_exists(&conn, table)?;
        let mut stmt = conn.prepare(
            "SELECT cells
             FROM table_rows
             WHERE table_id = ?1
             ORDER BY row_index ASC;",
        )?;
        let mut rows = stmt.query([table.as_str()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let cells: String = row.get(0)?;
            items.push(parse_cells(&cells, table)?);
        }
        Ok(items)
    }

    fn data_row_count(&self, table: &TableId) -> RepoResult<usize> {
        let conn = self.db.lock();
        ensure_table_exists(&conn, table)?;
        count_data_rows(&conn, table)
    }

    fn append_row(&self, table: &TableId, row: &Row) -> RepoResult<usize> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        ensure_table_exists(&tx, table)?;
        let max_index: i64 = tx.query_row(
            "SELECT COALESCE(MAX(row_index), 0) FROM table_rows WHERE table_id = ?1;",
            [table.as_str()],
            |r| r.get(0),
        )?;
        let row_index = max_index + 1;
        tx.execute(
            "INSERT INTO table_rows (table_id, row_index, cells) VALUES (?1, ?2, ?3);",
            params![table.as_str(), row_index, serde_json::to_string(row)?],
        )?;
        tx.commit()?;
        Ok((row_index - 1) as usize)
    }

    fn write_row(&self, table: &TableId, position: usize, row: &Row) -> RepoResult<()> {
        let conn = self.db.lock();
        ensure_table_exists(&conn, table)?;
        let changed = conn.execute(
            "UPDATE table_rows
             SET cells = ?3
             WHERE table_id = ?1
               AND row_index = ?2;",
            params![
                table.as_str(),
                position_to_row_index(position),
                serde_json::to_string(row)?
            ],
        )?;
        if changed == 0 {
            return Err(invalid_position(&conn, table, position)?);
        }
        Ok(())
    }

    fn remove_row(&self, table: &TableId, position: usize) -> RepoResult<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        ensure_table_exists(&tx, table)?;
        let row_index = position_to_row_index(position);
        let changed = tx.execute(
            "DELETE FROM table_rows WHERE table_id = ?1 AND row_index = ?2;",
            params![table.as_str(), row_index],
        )?;
        if changed == 0 {
            return Err(invalid_position(&tx, table, position)?);
        }
        tx.execute(
            "UPDATE table_rows
             SET row_index = row_index - 1
             WHERE table_id = ?1
               AND row_index > ?2;",
            params![table.as_str(), row_index],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn replace_rows(&self, table: &TableId, rows: &[Row]) -> RepoResult<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        ensure_table_exists(&tx, table)?;
        tx.execute(
            "DELETE FROM table_rows WHERE table_id = ?1;",
            [table.as_str()],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO table_rows (table_id, row_index, cells) VALUES (?1, ?2, ?3);",
            )?;
            for (index, row) in rows.iter().enumerate() {
                insert.execute(params![
                    table.as_str(),
                    index as i64,
                    serde_json::to_string(row)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn find_collection(
    conn: &Connection,
    parent_id: Option<&str>,
    name: &str,
    kind: &str,
) -> RepoResult<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id
             FROM collections
             WHERE parent_id IS ?1
               AND name = ?2
               AND kind = ?3
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1;",
            params![parent_id, name, kind],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(id)
}

fn ensure_collection(
    conn: &mut Connection,
    parent_id: Option<&str>,
    name: &str,
    kind: &str,
) -> RepoResult<Ensured<String>> {
    let tx = conn.transaction()?;
    if let Some(existing) = find_collection(&tx, parent_id, name, kind)? {
        return Ok(Ensured {
            id: existing,
            created: false,
        });
    }

    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO collections (id, parent_id, name, kind) VALUES (?1, ?2, ?3, ?4);",
        params![id.as_str(), parent_id, name, kind],
    )?;
    tx.commit()?;
    Ok(Ensured { id, created: true })
}

fn collection_exists(conn: &Connection, id: &str, kind: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM collections WHERE id = ?1 AND kind = ?2
        );",
        params![id, kind],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn find_table_id(conn: &Connection, container_id: &str, name: &str) -> RepoResult<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM data_tables WHERE container_id = ?1 AND name = ?2;",
            params![container_id, name],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(id)
}

fn ensure_table_exists(conn: &Connection, table: &TableId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM data_tables WHERE id = ?1);",
        [table.as_str()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::NotFound(format!("table {table}")))
    }
}

fn count_data_rows(conn: &Connection, table: &TableId) -> RepoResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM table_rows WHERE table_id = ?1 AND row_index > 0;",
        [table.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn invalid_position(conn: &Connection, table: &TableId, position: usize) -> RepoResult<RepoError> {
    Ok(RepoError::InvalidPosition {
        table: table.to_string(),
        position,
        len: count_data_rows(conn, table)?,
    })
}

fn position_to_row_index(position: usize) -> i64 {
    position as i64 + 1
}

fn parse_cells(value: &str, table: &TableId) -> RepoResult<Row> {
    serde_json::from_str(value).map_err(|err| {
        RepoError::InvalidData(format!("invalid cells in table {table}: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{SqliteStorageBackend, StorageBackend};
    use crate::db::Database;
    use crate::model::cell::{header_row, Cell};
    use crate::repo::error::RepoError;
    use std::sync::Arc;

    fn backend() -> SqliteStorageBackend {
        SqliteStorageBackend::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn ensure_folder_finds_before_creating() {
        let backend = backend();
        let first = backend.ensure_folder(None, "Root").unwrap();
        let second = backend.ensure_folder(None, "Root").unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let child = backend.ensure_folder(Some(&first.id), "Root").unwrap();
        assert_ne!(child.id, first.id);
    }

    #[test]
    fn ensure_container_requires_existing_folder() {
        let backend = backend();
        let missing = crate::model::container::FolderId::new("nope");
        let err = backend.ensure_container(&missing, "Students_DB").unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }

    #[test]
    fn remove_row_compacts_positions() {
        let backend = backend();
        let folder = backend.ensure_folder(None, "Root").unwrap().id;
        let container = backend.ensure_container(&folder, "C").unwrap().id;
        let table = backend
            .ensure_table(&container, "T", &header_row(&["A"]))
            .unwrap()
            .id;
        for value in ["a", "b", "c"] {
            backend.append_row(&table, &vec![Cell::text(value)]).unwrap();
        }

        backend.remove_row(&table, 1).unwrap();
        let rows = backend.read_rows(&table).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec![Cell::text("a")]);
        assert_eq!(rows[2], vec![Cell::text("c")]);
        assert_eq!(backend.append_row(&table, &vec![Cell::text("d")]).unwrap(), 2);

        let err = backend.remove_row(&table, 9).unwrap_err();
        assert!(matches!(err, RepoError::InvalidPosition { len: 3, .. }));
    }
}
