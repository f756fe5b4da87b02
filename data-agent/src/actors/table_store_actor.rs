//! Table Store Actor - owns the SQLite file holding uploaded tables.
//!
//! This actor handles:
//! - Creating the `uploaded_tables` manifest on startup
//! - Listing the tables (and their columns) uploaded to a conversation
//! - Running compiled `SELECT` statements on read-only connections
//! - Ingesting parsed tabular uploads as new tables
//!
//! Every request opens its own connection inside `spawn_blocking`; nothing holds a
//! handle across requests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::StoreError;
use crate::plan::{is_valid_identifier, sanitize_identifier};
use crate::query_executor::CompiledQuery;
use crate::tabular_parser::{TabularFileData, TypedValue};

/// One result row: column name to string/number/null, in SELECT order.
pub type Row = serde_json::Map<String, Value>;

const CREATE_MANIFEST: &str = r#"
    CREATE TABLE IF NOT EXISTS uploaded_tables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        topic_id TEXT NOT NULL,
        table_name TEXT NOT NULL,
        original_name TEXT,
        schema_json TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages for the Table Store Actor
#[derive(Debug)]
pub enum TableStoreMsg {
    /// Tables uploaded to a conversation, most recent first
    ListTables {
        conversation_id: String,
        respond_to: oneshot::Sender<Result<Vec<TableManifest>, StoreError>>,
    },
    /// Run an assembled SELECT
    ExecuteSelect {
        query: CompiledQuery,
        respond_to: oneshot::Sender<Result<RowSet, StoreError>>,
    },
    /// Store a parsed upload as a new table
    IngestTable {
        conversation_id: String,
        upload: TabularFileData,
        respond_to: oneshot::Sender<Result<IngestReport, StoreError>>,
    },
}

/// Manifest row for an uploaded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    pub table: String,
    pub original_name: Option<String>,
    pub columns: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Result of an ingestion. `table` is `None` when the upload had no rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub table: Option<String>,
    pub columns: Vec<String>,
    pub rows_inserted: usize,
}

/// Table Store Actor
pub struct TableStoreActor {
    rx: mpsc::Receiver<TableStoreMsg>,
    db_path: PathBuf,
}

impl TableStoreActor {
    pub fn new(rx: mpsc::Receiver<TableStoreMsg>, db_path: PathBuf) -> Self {
        Self { rx, db_path }
    }

    /// Create the database directory and manifest table, then spawn the actor.
    pub async fn start(db_path: PathBuf) -> Result<mpsc::Sender<TableStoreMsg>, StoreError> {
        let init_path = db_path.clone();
        tokio::task::spawn_blocking(move || Self::initialize_sync(&init_path))
            .await
            .map_err(|e| StoreError::Io(format!("store init task panicked: {}", e)))??;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            TableStoreActor::new(rx, db_path).run().await;
        });
        Ok(tx)
    }

    /// Run the actor's message loop
    pub async fn run(mut self) {
        tracing::info!("[TableStoreActor] Started ({})", self.db_path.display());

        while let Some(msg) = self.rx.recv().await {
            let db_path = self.db_path.clone();
            match msg {
                TableStoreMsg::ListTables {
                    conversation_id,
                    respond_to,
                } => {
                    // Reads run concurrently; SQLite provides read consistency.
                    tokio::spawn(async move {
                        let result = run_blocking(move || {
                            Self::list_tables_sync(&db_path, &conversation_id)
                        })
                        .await;
                        let _ = respond_to.send(result);
                    });
                }
                TableStoreMsg::ExecuteSelect { query, respond_to } => {
                    tokio::spawn(async move {
                        let result =
                            run_blocking(move || Self::execute_select_sync(&db_path, &query)).await;
                        let _ = respond_to.send(result);
                    });
                }
                TableStoreMsg::IngestTable {
                    conversation_id,
                    upload,
                    respond_to,
                } => {
                    let result = run_blocking(move || {
                        Self::ingest_sync(&db_path, &conversation_id, &upload)
                    })
                    .await;
                    if let Err(e) = &result {
                        tracing::warn!("[TableStoreActor] Ingest failed: {}", e);
                    }
                    let _ = respond_to.send(result);
                }
            }
        }

        tracing::info!("[TableStoreActor] Stopped");
    }

    fn initialize_sync(db_path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute(CREATE_MANIFEST, [])?;
        Ok(())
    }

    fn list_tables_sync(db_path: &Path, conversation_id: &str) -> Result<Vec<TableManifest>, StoreError> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mut stmt = conn.prepare(
            "SELECT table_name, original_name, schema_json, created_at FROM uploaded_tables \
             WHERE topic_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut manifests = Vec::new();
        for row in rows {
            let (table, original_name, schema_json, created_at) = row?;
            let columns: Vec<String> = match serde_json::from_str(&schema_json) {
                Ok(columns) => columns,
                Err(e) => {
                    tracing::warn!(
                        "[TableStoreActor] Skipping '{}': unreadable column list ({})",
                        table,
                        e
                    );
                    continue;
                }
            };
            if !is_valid_identifier(&table) || !columns.iter().all(|c| is_valid_identifier(c)) {
                tracing::warn!(
                    "[TableStoreActor] Skipping '{}': table or column name is not a plain identifier",
                    table
                );
                continue;
            }
            manifests.push(TableManifest {
                table,
                original_name,
                columns,
                created_at,
            });
        }

        Ok(manifests)
    }

    fn execute_select_sync(db_path: &Path, query: &CompiledQuery) -> Result<RowSet, StoreError> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mut stmt = conn.prepare(query.sql())?;
        if !stmt.readonly() {
            return Err(StoreError::Sqlite("statement is not read-only".to_string()));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows_iter = stmt.query(params_from_iter(query.params().iter()))?;

        let mut rows = Vec::new();
        while let Some(row) = rows_iter.next()? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), sqlite_to_json(row.get_ref(i)?));
            }
            rows.push(record);
        }

        Ok(RowSet { columns, rows })
    }

    fn ingest_sync(
        db_path: &Path,
        conversation_id: &str,
        upload: &TabularFileData,
    ) -> Result<IngestReport, StoreError> {
        let columns = upload.column_names();
        if upload.is_empty() {
            tracing::info!(
                "[TableStoreActor] '{}' has no rows, nothing ingested",
                upload.file_name
            );
            return Ok(IngestReport {
                table: None,
                columns,
                rows_inserted: 0,
            });
        }

        let stem = Path::new(&upload.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        let base_table = sanitize_identifier(
            &format!("doc_{}_{}", stem, Utc::now().timestamp_millis()),
            "doc_uploaded",
        );

        let column_defs: Vec<String> = upload
            .columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.column_type.sql_type()))
            .collect();
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

        let mut conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let tx = conn.transaction()?;

        // Two uploads of the same file within one millisecond would collide.
        let mut table = base_table.clone();
        let mut suffix = 2;
        while tx
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get::<_, i64>(0),
            )?
            > 0
        {
            table = format!("{}_{}", base_table, suffix);
            suffix += 1;
        }

        tx.execute(
            &format!("CREATE TABLE \"{}\" ({})", table, column_defs.join(", ")),
            [],
        )?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                quoted.join(", "),
                placeholders.join(", ")
            ))?;
            for row in &upload.rows {
                stmt.execute(params_from_iter(row.iter().map(typed_to_sql)))?;
                inserted += 1;
            }
        }

        let schema_json =
            serde_json::to_string(&columns).map_err(|e| StoreError::Ingest(e.to_string()))?;
        tx.execute(
            "INSERT INTO uploaded_tables (topic_id, table_name, original_name, schema_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation_id,
                table,
                upload.file_name,
                schema_json,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            "[TableStoreActor] Ingested '{}' as {} ({} rows, {} columns)",
            upload.file_name,
            table,
            inserted,
            columns.len()
        );

        Ok(IngestReport {
            table: Some(table),
            columns,
            rows_inserted: inserted,
        })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Sqlite(format!("store task panicked: {}", e)))?
}

/// Convert a SQLite cell to JSON (string/number/null).
fn sqlite_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn typed_to_sql(value: &TypedValue) -> SqlValue {
    match value {
        TypedValue::Null => SqlValue::Null,
        TypedValue::Int(i) => SqlValue::Integer(*i),
        TypedValue::Float(f) => SqlValue::Real(*f),
        TypedValue::Text(s) => SqlValue::Text(s.clone()),
    }
}
