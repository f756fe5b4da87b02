//! Single-shot planner.
//!
//! One reasoning call with the schema embedded in the prompt and no tools. The
//! first JSON object in the reply is the plan; it goes through the same
//! validator and executor as the loop's `execute_query` tool. Diagnostic
//! surface: the report carries the SQL and rows.

use serde::Serialize;

use crate::actors::table_store_actor::Row;
use crate::agentic_loop::AgentHandles;
use crate::error::{ExecutionError, ReasoningError, StoreError, ValidationError};
use crate::message_builders::user_message;
use crate::plan::QueryPlan;
use crate::plan_validator::NormalizedPlan;
use crate::query_executor::{QueryExecutor, SqlParam};
use crate::schema_registry::SchemaRegistry;
use crate::system_prompt::build_planner_prompt;
use crate::tool_parsing::first_json_object;
use crate::tools::{ExecuteQueryError, ExecuteQueryExecutor};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannerReport {
    pub plan: NormalizedPlan,
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlannerError {
    #[error("No uploaded tables found for this topic")]
    NoTables,

    #[error("Planner model error: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("Failed to parse planner JSON")]
    UnparsablePlan { raw: String },

    #[error("Planner returned error: {0}")]
    Declined(String),

    #[error("Planner produced an invalid plan: {0}")]
    Validation(#[from] ValidationError),

    #[error("Query execution error: {}", .0.message)]
    Execution(ExecutionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ExecuteQueryError> for PlannerError {
    fn from(e: ExecuteQueryError) -> Self {
        match e {
            ExecuteQueryError::Validation(e) => PlannerError::Validation(e),
            ExecuteQueryError::Execution(e) => PlannerError::Execution(e),
            ExecuteQueryError::Store(e) => PlannerError::Store(e),
        }
    }
}

/// Plan `question` in one model call and run the plan.
pub async fn plan_and_run(
    handles: &AgentHandles,
    row_limit: u32,
    conversation_id: &str,
    question: &str,
) -> Result<PlannerReport, PlannerError> {
    let registry = SchemaRegistry::new(handles.store_tx.clone());
    let schema = registry.lookup(conversation_id).await?;
    if schema.is_empty() {
        return Err(PlannerError::NoTables);
    }

    let prompt = build_planner_prompt(&schema, question);
    let replies = handles
        .reasoning
        .invoke(&[user_message(prompt)], &[])
        .await?;
    let raw = replies
        .iter()
        .map(|m| m.content.as_str())
        .find(|c| !c.trim().is_empty())
        .unwrap_or_default()
        .to_string();

    let plan = parse_planner_reply(&raw)?;
    tracing::info!(
        "[QueryPlanner] Plan for topic '{}' targets '{}'",
        conversation_id,
        plan.table
    );

    let executor = ExecuteQueryExecutor::new(
        registry,
        QueryExecutor::new(handles.store_tx.clone()),
        row_limit,
    );
    let executed = executor.execute_plan(conversation_id, &plan).await?;

    Ok(PlannerReport {
        sql: executed.output.sql,
        params: executed.output.params,
        columns: executed.output.columns,
        rows: executed.output.rows,
        plan: executed.plan,
    })
}

/// Decode the planner's reply: a plan object, or `{"error": "..."}` to decline.
pub fn parse_planner_reply(raw: &str) -> Result<QueryPlan, PlannerError> {
    let Some(value) = first_json_object(raw) else {
        tracing::debug!("[QueryPlanner] No JSON object in reply: {}", raw);
        return Err(PlannerError::UnparsablePlan {
            raw: raw.to_string(),
        });
    };

    if let Some(reason) = value.get("error") {
        let reason = reason
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| reason.to_string());
        return Err(PlannerError::Declined(reason));
    }

    Ok(QueryPlan::from_tool_arguments(&value)?)
}
