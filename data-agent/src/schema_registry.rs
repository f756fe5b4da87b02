//! Schema Registry
//!
//! Read-only view of the tables and columns uploaded to a conversation, most
//! recently ingested first. An empty result is a normal answer ("nothing uploaded
//! yet"), not a fault.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::actors::table_store_actor::{TableManifest, TableStoreMsg};
use crate::error::StoreError;

/// Table name plus its ordered column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub table: String,
    pub columns: Vec<String>,
}

impl From<TableManifest> for SchemaEntry {
    fn from(manifest: TableManifest) -> Self {
        Self {
            table: manifest.table,
            columns: manifest.columns,
        }
    }
}

#[derive(Clone)]
pub struct SchemaRegistry {
    store_tx: mpsc::Sender<TableStoreMsg>,
}

impl SchemaRegistry {
    pub fn new(store_tx: mpsc::Sender<TableStoreMsg>) -> Self {
        Self { store_tx }
    }

    /// Schema entries for a conversation, most recent first.
    pub async fn lookup(&self, conversation_id: &str) -> Result<Vec<SchemaEntry>, StoreError> {
        let manifests = self.manifests(conversation_id).await?;
        Ok(manifests.into_iter().map(SchemaEntry::from).collect())
    }

    /// Full manifest rows (original file name, upload time) for listings.
    pub async fn manifests(&self, conversation_id: &str) -> Result<Vec<TableManifest>, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.store_tx
            .send(TableStoreMsg::ListTables {
                conversation_id: conversation_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable)?;
        rx.await.map_err(|_| StoreError::Unavailable)?
    }
}

/// Render schema entries as plain text for prompts.
pub fn describe_schema(schema: &[SchemaEntry]) -> String {
    schema
        .iter()
        .map(|entry| format!("Table: {}\nColumns: {}", entry.table, entry.columns.join(", ")))
        .collect::<Vec<_>>()
        .join("\n\n")
}
