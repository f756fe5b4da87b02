//! Upload ingestion: parse a tabular file off the async runtime, then hand the
//! parsed rows to the table store.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use crate::actors::table_store_actor::{IngestReport, TableStoreMsg};
use crate::error::StoreError;
use crate::tabular_parser::{parse_tabular_bytes, TabularFileData};

/// Ingest raw upload bytes named `file_name` into `conversation_id`.
pub async fn ingest_bytes(
    store_tx: &mpsc::Sender<TableStoreMsg>,
    conversation_id: &str,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<IngestReport, StoreError> {
    let name = file_name.to_string();
    let upload = tokio::task::spawn_blocking(move || parse_tabular_bytes(&name, &bytes))
        .await
        .map_err(|e| StoreError::Ingest(format!("parse task panicked: {}", e)))??;

    ingest_parsed(store_tx, conversation_id, upload).await
}

/// Ingest a file from disk.
pub async fn ingest_file(
    store_tx: &mpsc::Sender<TableStoreMsg>,
    conversation_id: &str,
    path: &Path,
) -> Result<IngestReport, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.csv".to_string());
    ingest_bytes(store_tx, conversation_id, &file_name, bytes).await
}

pub async fn ingest_parsed(
    store_tx: &mpsc::Sender<TableStoreMsg>,
    conversation_id: &str,
    upload: TabularFileData,
) -> Result<IngestReport, StoreError> {
    tracing::info!(
        "[Ingest] '{}' -> topic '{}' ({} rows, {} columns)",
        upload.file_name,
        conversation_id,
        upload.row_count,
        upload.columns.len()
    );

    let (tx, rx) = oneshot::channel();
    store_tx
        .send(TableStoreMsg::IngestTable {
            conversation_id: conversation_id.to_string(),
            upload,
            respond_to: tx,
        })
        .await
        .map_err(|_| StoreError::Unavailable)?;
    rx.await.map_err(|_| StoreError::Unavailable)?
}
