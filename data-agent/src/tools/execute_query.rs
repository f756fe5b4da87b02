//! execute_query Implementation
//!
//! Parses the model's plan, validates it against the conversation's current
//! schema and runs it. The SQL text never leaves this tool; the model only sees
//! rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actors::table_store_actor::Row;
use crate::error::{ExecutionError, StoreError, ValidationError};
use crate::plan::QueryPlan;
use crate::plan_validator::{validate, NormalizedPlan};
use crate::query_executor::{QueryExecutor, QueryOutput};
use crate::schema_registry::SchemaRegistry;

/// Output from execute_query, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteQueryOutput {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

/// Why an execute_query call produced no rows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecuteQueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A successful run: the plan that was executed plus the raw executor output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedPlan {
    pub plan: NormalizedPlan,
    pub output: QueryOutput,
}

impl ExecutedPlan {
    pub fn to_tool_output(&self) -> ExecuteQueryOutput {
        ExecuteQueryOutput {
            table: self.plan.table.clone(),
            columns: self.output.columns.clone(),
            rows: self.output.rows.clone(),
            row_count: self.output.rows.len(),
        }
    }
}

/// Executor for the execute_query tool
#[derive(Clone)]
pub struct ExecuteQueryExecutor {
    registry: SchemaRegistry,
    executor: QueryExecutor,
    row_limit: u32,
}

impl ExecuteQueryExecutor {
    pub fn new(registry: SchemaRegistry, executor: QueryExecutor, row_limit: u32) -> Self {
        Self {
            registry,
            executor,
            row_limit,
        }
    }

    /// Decode, validate and run raw tool arguments.
    pub async fn execute(
        &self,
        conversation_id: &str,
        arguments: &Value,
    ) -> Result<ExecutedPlan, ExecuteQueryError> {
        let plan = QueryPlan::from_tool_arguments(arguments)?;
        self.execute_plan(conversation_id, &plan).await
    }

    /// Validate an already-decoded plan against the live schema and run it.
    pub async fn execute_plan(
        &self,
        conversation_id: &str,
        plan: &QueryPlan,
    ) -> Result<ExecutedPlan, ExecuteQueryError> {
        // Re-read the schema on every call: tables may have been uploaded since get_schema ran.
        let schema = self.registry.lookup(conversation_id).await?;

        let normalized = validate(plan, &schema, self.row_limit).map_err(|e| {
            tracing::info!("[ExecuteQuery] Plan rejected ({}): {}", e.kind(), e);
            e
        })?;

        let output = self.executor.execute(&normalized).await?;
        tracing::info!(
            "[ExecuteQuery] {} row(s) from '{}'",
            output.rows.len(),
            normalized.table
        );

        Ok(ExecutedPlan {
            plan: normalized,
            output,
        })
    }
}
