//! SQLite persistence for tracings, nodes and the structure catalogs.
//!
//! All writes go through [`SwcStore::transaction`], which hands the closure a
//! [`StoreTx`]. The transaction commits only if the closure returns `Ok`;
//! any error (or panic) drops it, and SQLite rolls back. Reads use the same
//! primitive so a header and its nodes come from one snapshot.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{StorageError, StorageResult};
use crate::models::{
    seed_structure_identifiers, seed_tracing_structures, NewNode, NewTracing, StructureIdentifier,
    Tracing, TracingNode, TracingPage, TracingQuery, TracingStructure, TracingUpdate,
};

const TRACING_COLUMNS: &str = "id, neuron_id, filename, annotator, file_comments, offset_x, offset_y, offset_z, tracing_structure_id, created_at, updated_at";

const NODE_COLUMNS: &str =
    "id, swc_tracing_id, sample_number, parent_number, x, y, z, radius, structure_identifier_id";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// SQLite-backed store. One connection, serialized behind a mutex.
#[derive(Debug)]
pub struct SwcStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SwcStore {
    /// Open (or create) a database file, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Self::init(conn, Some(path))
    }

    /// Create a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` inside one transaction; commit on `Ok`, roll back otherwise.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = StoreTx {
            tx: conn.transaction().map_err(StorageError::from)?,
        };
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Seed both catalogs if the structure identifier table is empty.
    ///
    /// Returns `true` when a seed was written.
    pub fn seed_if_required(&self) -> StorageResult<bool> {
        self.transaction(|tx| {
            if tx.structure_identifier_count()? > 0 {
                return Ok(false);
            }
            for identifier in seed_structure_identifiers() {
                tx.insert_structure_identifier(&identifier)?;
            }
            for structure in seed_tracing_structures() {
                tx.insert_tracing_structure(&structure)?;
            }
            Ok(true)
        })
    }

    pub fn structure_identifiers(&self) -> StorageResult<Vec<StructureIdentifier>> {
        self.transaction(|tx| tx.structure_identifiers())
    }

    pub fn tracing_structures(&self) -> StorageResult<Vec<TracingStructure>> {
        self.transaction(|tx| tx.tracing_structures())
    }

    pub fn find_tracing(&self, id: &str) -> StorageResult<Option<Tracing>> {
        self.transaction(|tx| tx.find_tracing(id))
    }

    pub fn find_nodes_ordered(&self, tracing_id: &str) -> StorageResult<Vec<TracingNode>> {
        self.transaction(|tx| tx.find_nodes_ordered(tracing_id))
    }

    pub fn node_count(&self, tracing_id: &str) -> StorageResult<usize> {
        self.transaction(|tx| tx.node_count(tracing_id))
    }

    pub fn list_tracings(&self, query: &TracingQuery) -> StorageResult<TracingPage> {
        self.transaction(|tx| tx.list_tracings(query))
    }

    pub fn tracing_ids_for_neurons(&self, neuron_ids: &[String]) -> StorageResult<Vec<String>> {
        self.transaction(|tx| tx.tracing_ids_for_neurons(neuron_ids))
    }
}

fn migrate(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS structure_identifiers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            swc_name TEXT NOT NULL,
            value INTEGER NOT NULL UNIQUE,
            mutable INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracing_structures (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            value INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS swc_tracings (
            id TEXT PRIMARY KEY,
            neuron_id TEXT,
            filename TEXT NOT NULL DEFAULT '',
            annotator TEXT NOT NULL DEFAULT '',
            file_comments TEXT NOT NULL DEFAULT '',
            offset_x REAL NOT NULL DEFAULT 0,
            offset_y REAL NOT NULL DEFAULT 0,
            offset_z REAL NOT NULL DEFAULT 0,
            tracing_structure_id TEXT REFERENCES tracing_structures(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS swc_tracing_nodes (
            id TEXT PRIMARY KEY,
            swc_tracing_id TEXT NOT NULL REFERENCES swc_tracings(id) ON DELETE CASCADE,
            sample_number INTEGER NOT NULL,
            parent_number INTEGER NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            z REAL NOT NULL,
            radius REAL NOT NULL,
            structure_identifier_id TEXT NOT NULL REFERENCES structure_identifiers(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tracings_neuron ON swc_tracings(neuron_id);
        CREATE INDEX IF NOT EXISTS idx_tracings_structure ON swc_tracings(tracing_structure_id);
        CREATE INDEX IF NOT EXISTS idx_nodes_tracing_sample ON swc_tracing_nodes(swc_tracing_id, sample_number);
        CREATE INDEX IF NOT EXISTS idx_nodes_structure ON swc_tracing_nodes(structure_identifier_id);
        "#,
    )?;
    Ok(())
}

fn tracing_from_row(row: &Row<'_>) -> rusqlite::Result<Tracing> {
    Ok(Tracing {
        id: row.get(0)?,
        neuron_id: row.get(1)?,
        filename: row.get(2)?,
        annotator: row.get(3)?,
        file_comments: row.get(4)?,
        offset_x: row.get(5)?,
        offset_y: row.get(6)?,
        offset_z: row.get(7)?,
        tracing_structure_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<TracingNode> {
    Ok(TracingNode {
        id: row.get(0)?,
        tracing_id: row.get(1)?,
        sample_number: row.get(2)?,
        parent_number: row.get(3)?,
        x: row.get(4)?,
        y: row.get(5)?,
        z: row.get(6)?,
        radius: row.get(7)?,
        structure_identifier_id: row.get(8)?,
    })
}

/// Operations available inside one transaction.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    fn commit(self) -> StorageResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Catalogs
    // -------------------------------------------------------------------------

    pub fn structure_identifier_count(&self) -> StorageResult<usize> {
        let count: i64 =
            self.tx
                .query_row("SELECT COUNT(*) FROM structure_identifiers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn insert_structure_identifier(&self, identifier: &StructureIdentifier) -> StorageResult<()> {
        let when = now();
        self.tx.execute(
            "INSERT INTO structure_identifiers (id, name, swc_name, value, mutable, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                identifier.id,
                identifier.name,
                identifier.swc_name,
                identifier.value,
                identifier.mutable,
                when
            ],
        )?;
        Ok(())
    }

    pub fn insert_tracing_structure(&self, structure: &TracingStructure) -> StorageResult<()> {
        let when = now();
        self.tx.execute(
            "INSERT INTO tracing_structures (id, name, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![structure.id, structure.name, structure.value, when],
        )?;
        Ok(())
    }

    pub fn structure_identifiers(&self) -> StorageResult<Vec<StructureIdentifier>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, name, swc_name, value, mutable FROM structure_identifiers ORDER BY value",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StructureIdentifier {
                id: row.get(0)?,
                name: row.get(1)?,
                swc_name: row.get(2)?,
                value: row.get(3)?,
                mutable: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn tracing_structures(&self) -> StorageResult<Vec<TracingStructure>> {
        let mut stmt = self
            .tx
            .prepare("SELECT id, name, value FROM tracing_structures ORDER BY value")?;
        let rows = stmt.query_map([], |row| {
            Ok(TracingStructure {
                id: row.get(0)?,
                name: row.get(1)?,
                value: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -------------------------------------------------------------------------
    // Tracings
    // -------------------------------------------------------------------------

    pub fn create_tracing(&self, tracing: &NewTracing) -> StorageResult<Tracing> {
        let id = uuid::Uuid::new_v4().to_string();
        let when = now();
        self.tx.execute(
            &format!(
                "INSERT INTO swc_tracings ({TRACING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)"
            ),
            params![
                id,
                tracing.neuron_id,
                tracing.filename,
                tracing.annotator,
                tracing.file_comments,
                tracing.offset.0,
                tracing.offset.1,
                tracing.offset.2,
                tracing.tracing_structure_id,
                when
            ],
        )?;
        self.require_tracing(&id)
    }

    pub fn find_tracing(&self, id: &str) -> StorageResult<Option<Tracing>> {
        let tracing = self
            .tx
            .query_row(
                &format!("SELECT {TRACING_COLUMNS} FROM swc_tracings WHERE id = ?1"),
                params![id],
                tracing_from_row,
            )
            .optional()?;
        Ok(tracing)
    }

    /// Like [`find_tracing`](Self::find_tracing), but a missing tracing is an error.
    pub fn require_tracing(&self, id: &str) -> StorageResult<Tracing> {
        self.find_tracing(id)?.ok_or_else(|| StorageError::NotFound {
            entity: "tracing",
            id: id.to_string(),
        })
    }

    /// Replace file-derived header fields after a node set replacement.
    pub fn update_tracing_contents(
        &self,
        id: &str,
        filename: &str,
        file_comments: &str,
        offset: (f64, f64, f64),
    ) -> StorageResult<Tracing> {
        let changed = self.tx.execute(
            "UPDATE swc_tracings SET filename = ?2, file_comments = ?3, offset_x = ?4, offset_y = ?5, offset_z = ?6, updated_at = ?7 WHERE id = ?1",
            params![id, filename, file_comments, offset.0, offset.1, offset.2, now()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "tracing",
                id: id.to_string(),
            });
        }
        self.require_tracing(id)
    }

    /// Apply a metadata-only update. Absent fields keep their value.
    pub fn update_tracing_metadata(&self, update: &TracingUpdate) -> StorageResult<Tracing> {
        let current = self.require_tracing(&update.id)?;
        let annotator = update.annotator.as_ref().unwrap_or(&current.annotator);
        let neuron_id = update.neuron_id.as_ref().or(current.neuron_id.as_ref());
        let structure_id = update
            .tracing_structure_id
            .as_ref()
            .or(current.tracing_structure_id.as_ref());

        self.tx.execute(
            "UPDATE swc_tracings SET annotator = ?2, neuron_id = ?3, tracing_structure_id = ?4, updated_at = ?5 WHERE id = ?1",
            params![update.id, annotator, neuron_id, structure_id, now()],
        )?;
        self.require_tracing(&update.id)
    }

    /// Delete a tracing and its nodes. Returns the number of nodes removed.
    pub fn delete_tracing(&self, id: &str) -> StorageResult<usize> {
        let nodes = self.delete_nodes(id)?;
        let removed = self
            .tx
            .execute("DELETE FROM swc_tracings WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StorageError::NotFound {
                entity: "tracing",
                id: id.to_string(),
            });
        }
        Ok(nodes)
    }

    pub fn list_tracings(&self, query: &TracingQuery) -> StorageResult<TracingPage> {
        let total: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM swc_tracings", [], |row| row.get(0))?;

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(neuron_ids) = query.neuron_ids.as_ref() {
            if neuron_ids.is_empty() {
                clauses.push("0".to_string());
            } else {
                let placeholders = vec!["?"; neuron_ids.len()].join(", ");
                clauses.push(format!("neuron_id IN ({placeholders})"));
                values.extend(neuron_ids.iter().cloned().map(SqlValue::Text));
            }
        }
        if let Some(structure_id) = query.tracing_structure_id.as_ref() {
            clauses.push("tracing_structure_id = ?".to_string());
            values.push(SqlValue::Text(structure_id.clone()));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let matched: i64 = self.tx.query_row(
            &format!("SELECT COUNT(*) FROM swc_tracings{filter}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        values.push(SqlValue::Integer(limit));
        values.push(SqlValue::Integer(offset as i64));

        let mut stmt = self.tx.prepare(&format!(
            "SELECT {TRACING_COLUMNS} FROM swc_tracings{filter} ORDER BY created_at, id LIMIT ? OFFSET ?"
        ))?;
        let tracings = stmt
            .query_map(params_from_iter(values.iter()), tracing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TracingPage {
            offset,
            limit: query.limit,
            total_count: total as usize,
            match_count: matched as usize,
            tracings,
        })
    }

    pub fn tracing_ids_for_neurons(&self, neuron_ids: &[String]) -> StorageResult<Vec<String>> {
        if neuron_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; neuron_ids.len()].join(", ");
        let mut stmt = self.tx.prepare(&format!(
            "SELECT id FROM swc_tracings WHERE neuron_id IN ({placeholders}) ORDER BY created_at, id"
        ))?;
        let ids = stmt
            .query_map(params_from_iter(neuron_ids.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    /// Insert every node for `tracing_id`. Returns the number inserted.
    pub fn bulk_create_nodes(&self, tracing_id: &str, nodes: &[NewNode]) -> StorageResult<usize> {
        let when = now();
        let mut stmt = self.tx.prepare_cached(&format!(
            "INSERT INTO swc_tracing_nodes ({NODE_COLUMNS}, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)"
        ))?;
        for node in nodes {
            stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                tracing_id,
                node.sample_number,
                node.parent_number,
                node.x,
                node.y,
                node.z,
                node.radius,
                node.structure_identifier_id,
                when
            ])?;
        }
        Ok(nodes.len())
    }

    /// Remove every node of a tracing. Returns the number removed.
    pub fn delete_nodes(&self, tracing_id: &str) -> StorageResult<usize> {
        let removed = self.tx.execute(
            "DELETE FROM swc_tracing_nodes WHERE swc_tracing_id = ?1",
            params![tracing_id],
        )?;
        Ok(removed)
    }

    /// Nodes of a tracing, ascending by sample number.
    pub fn find_nodes_ordered(&self, tracing_id: &str) -> StorageResult<Vec<TracingNode>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM swc_tracing_nodes WHERE swc_tracing_id = ?1 ORDER BY sample_number ASC, id ASC"
        ))?;
        let nodes = stmt
            .query_map(params![tracing_id], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    pub fn node_count(&self, tracing_id: &str) -> StorageResult<usize> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM swc_tracing_nodes WHERE swc_tracing_id = ?1",
            params![tracing_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StandardStructure;

    fn seeded() -> SwcStore {
        let store = SwcStore::open_in_memory().unwrap();
        assert!(store.seed_if_required().unwrap());
        store
    }

    fn new_tracing(neuron: &str) -> NewTracing {
        NewTracing {
            neuron_id: Some(neuron.to_string()),
            filename: "cell.swc".to_string(),
            annotator: "annotator".to_string(),
            file_comments: "# c\n".to_string(),
            offset: (1.0, 2.0, 3.0),
            tracing_structure_id: Some("68e76074-1777-42b6-bbf9-93a6a5f02fa4".to_string()),
        }
    }

    fn node(sample: i32, parent: i32) -> NewNode {
        NewNode {
            sample_number: sample,
            parent_number: parent,
            x: sample as f64,
            y: 0.0,
            z: 0.0,
            radius: 1.0,
            structure_identifier_id: StandardStructure::Axon.seed_id().to_string(),
        }
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = seeded();
        assert!(!store.seed_if_required().unwrap());
        assert_eq!(store.structure_identifiers().unwrap().len(), 7);
        assert_eq!(store.tracing_structures().unwrap().len(), 2);
    }

    #[test]
    fn test_create_and_read_ordered() {
        let store = seeded();
        let tracing = store
            .transaction(|tx| -> StorageResult<Tracing> {
                let tracing = tx.create_tracing(&new_tracing("n1"))?;
                tx.bulk_create_nodes(&tracing.id, &[node(3, 2), node(1, -1), node(2, 1)])?;
                Ok(tracing)
            })
            .unwrap();

        let nodes = store.find_nodes_ordered(&tracing.id).unwrap();
        let samples: Vec<i32> = nodes.iter().map(|n| n.sample_number).collect();
        assert_eq!(samples, vec![1, 2, 3]);
        assert_eq!(store.node_count(&tracing.id).unwrap(), 3);
        assert_eq!(tracing.offset_y, 2.0);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = seeded();
        let mut bad = node(2, 1);
        bad.structure_identifier_id = "no-such-structure".to_string();

        let result = store.transaction(|tx| -> StorageResult<()> {
            let tracing = tx.create_tracing(&new_tracing("n1"))?;
            tx.bulk_create_nodes(&tracing.id, &[node(1, -1), bad.clone()])?;
            Ok(())
        });

        assert!(matches!(result, Err(StorageError::Sql(_))));
        let page = store.list_tracings(&TracingQuery::default()).unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn test_delete_cascades() {
        let store = seeded();
        let tracing = store
            .transaction(|tx| -> StorageResult<Tracing> {
                let tracing = tx.create_tracing(&new_tracing("n1"))?;
                tx.bulk_create_nodes(&tracing.id, &[node(1, -1), node(2, 1)])?;
                Ok(tracing)
            })
            .unwrap();

        let removed = store.transaction(|tx| tx.delete_tracing(&tracing.id)).unwrap();
        assert_eq!(removed, 2);
        assert!(store.find_tracing(&tracing.id).unwrap().is_none());
        assert!(store.find_nodes_ordered(&tracing.id).unwrap().is_empty());

        let again = store.transaction(|tx| tx.delete_tracing(&tracing.id));
        assert!(matches!(again, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_metadata_update_keeps_absent_fields() {
        let store = seeded();
        let tracing = store
            .transaction(|tx| tx.create_tracing(&new_tracing("n1")))
            .unwrap();

        let updated = store
            .transaction(|tx| {
                tx.update_tracing_metadata(&TracingUpdate {
                    id: tracing.id.clone(),
                    annotator: Some("someone else".to_string()),
                    ..Default::default()
                })
            })
            .unwrap();

        assert_eq!(updated.annotator, "someone else");
        assert_eq!(updated.neuron_id.as_deref(), Some("n1"));
        assert_eq!(updated.filename, "cell.swc");
    }

    #[test]
    fn test_list_filters_and_window() {
        let store = seeded();
        store
            .transaction(|tx| -> StorageResult<()> {
                tx.create_tracing(&new_tracing("n1"))?;
                tx.create_tracing(&new_tracing("n1"))?;
                tx.create_tracing(&new_tracing("n2"))?;
                Ok(())
            })
            .unwrap();

        let page = store
            .list_tracings(&TracingQuery {
                neuron_ids: Some(vec!["n1".to_string()]),
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.match_count, 2);
        assert_eq!(page.tracings.len(), 1);

        let none = store
            .list_tracings(&TracingQuery {
                neuron_ids: Some(vec![]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(none.match_count, 0);

        let ids = store.tracing_ids_for_neurons(&["n2".to_string()]).unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("swc.db");
        {
            let store = SwcStore::open(&path).unwrap();
            store.seed_if_required().unwrap();
        }
        let reopened = SwcStore::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert!(!reopened.seed_if_required().unwrap());
    }
}
