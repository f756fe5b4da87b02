//! get_schema Implementation
//!
//! Returns the tables uploaded to the loop's conversation, with column hints for
//! the current question.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::column_relevance::relevant_columns;
use crate::error::StoreError;
use crate::schema_registry::{SchemaEntry, SchemaRegistry};

/// Input for the get_schema tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetSchemaInput {
    /// Topic the model asked about. Only informational: the loop's own
    /// conversation is always the one answered.
    #[serde(default, rename = "topicId", alias = "topic_id")]
    pub topic_id: Option<String>,
}

impl GetSchemaInput {
    /// Lenient decode: anything that isn't an object with a string `topicId` is
    /// treated as "no topic given".
    pub fn from_arguments(arguments: &Value) -> Self {
        serde_json::from_value(arguments.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
    /// Columns that look related to the question (all columns when none do).
    pub relevant_columns: Vec<String>,
}

/// Output from get_schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSchemaOutput {
    pub schema: Vec<TableSchema>,
}

impl GetSchemaOutput {
    pub fn from_entries(entries: &[SchemaEntry], question: &str) -> Self {
        Self {
            schema: entries
                .iter()
                .map(|entry| TableSchema {
                    table: entry.table.clone(),
                    columns: entry.columns.clone(),
                    relevant_columns: relevant_columns(&entry.columns, question),
                })
                .collect(),
        }
    }
}

/// Executor for the get_schema tool
#[derive(Clone)]
pub struct GetSchemaExecutor {
    registry: SchemaRegistry,
}

impl GetSchemaExecutor {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    pub async fn execute(
        &self,
        conversation_id: &str,
        input: GetSchemaInput,
        question: &str,
    ) -> Result<GetSchemaOutput, StoreError> {
        if let Some(requested) = input.topic_id.as_deref() {
            if requested.trim() != conversation_id {
                tracing::info!(
                    "[GetSchema] Ignoring requested topic '{}', answering for '{}'",
                    requested,
                    conversation_id
                );
            }
        }

        let entries = self.registry.lookup(conversation_id).await?;
        tracing::debug!(
            "[GetSchema] {} table(s) for topic '{}'",
            entries.len(),
            conversation_id
        );
        Ok(GetSchemaOutput::from_entries(&entries, question))
    }
}
