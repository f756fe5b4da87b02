//! Tool execution for the planning loop.
//!
//! Turns one `ParsedToolCall` into the text of its tool-result message. Nothing
//! here returns an error to the loop: validation failures, storage failures and
//! unknown tool names all become result text the model can react to.

use tokio::sync::mpsc;

use crate::actors::table_store_actor::TableStoreMsg;
use crate::protocol::ParsedToolCall;
use crate::query_executor::QueryExecutor;
use crate::schema_registry::SchemaRegistry;
use crate::system_prompt::build_plan_error_guidance;
use crate::tool_registry::AgentTool;
use crate::tools::{ExecuteQueryError, ExecuteQueryExecutor, GetSchemaExecutor, GetSchemaInput};

/// Result text for one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Tool that ran, `None` when the name was not recognized.
    pub tool: Option<AgentTool>,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    fn ok(tool: AgentTool, content: String) -> Self {
        Self {
            tool: Some(tool),
            content,
            is_error: false,
        }
    }

    fn error(tool: Option<AgentTool>, content: String) -> Self {
        Self {
            tool,
            content,
            is_error: true,
        }
    }
}

/// Exhaustive dispatcher over `AgentTool`.
#[derive(Clone)]
pub struct ToolDispatcher {
    get_schema: GetSchemaExecutor,
    execute_query: ExecuteQueryExecutor,
}

impl ToolDispatcher {
    pub fn new(store_tx: mpsc::Sender<TableStoreMsg>, row_limit: u32) -> Self {
        let registry = SchemaRegistry::new(store_tx.clone());
        Self {
            get_schema: GetSchemaExecutor::new(registry.clone()),
            execute_query: ExecuteQueryExecutor::new(
                registry,
                QueryExecutor::new(store_tx),
                row_limit,
            ),
        }
    }

    pub fn get_schema(&self) -> &GetSchemaExecutor {
        &self.get_schema
    }

    /// Run `call` for `conversation_id`. `question` feeds column hints and retry guidance.
    pub async fn dispatch(
        &self,
        call: &ParsedToolCall,
        conversation_id: &str,
        question: &str,
    ) -> ToolResult {
        let Some(tool) = AgentTool::from_name(&call.name) else {
            tracing::warn!("[ToolExecution] Unknown tool requested: '{}'", call.name);
            return ToolResult::error(None, format!("Unknown tool: {}", call.name));
        };

        match tool {
            AgentTool::GetSchema => {
                let input = GetSchemaInput::from_arguments(&call.arguments);
                match self.get_schema.execute(conversation_id, input, question).await {
                    Ok(output) => match serde_json::to_string(&output) {
                        Ok(json) => ToolResult::ok(tool, json),
                        Err(e) => ToolResult::error(
                            Some(tool),
                            format!("Error: failed to encode schema: {}", e),
                        ),
                    },
                    Err(e) => {
                        tracing::warn!("[ToolExecution] get_schema failed: {}", e);
                        ToolResult::error(
                            Some(tool),
                            "Error: the table schema could not be read right now.".to_string(),
                        )
                    }
                }
            }
            AgentTool::ExecuteQuery => {
                match self.execute_query.execute(conversation_id, &call.arguments).await {
                    Ok(executed) => match serde_json::to_string(&executed.to_tool_output()) {
                        Ok(json) => ToolResult::ok(tool, json),
                        Err(e) => ToolResult::error(
                            Some(tool),
                            format!("Error: failed to encode rows: {}", e),
                        ),
                    },
                    Err(ExecuteQueryError::Validation(e)) => ToolResult::error(
                        Some(tool),
                        format!("Error: {}{}", e, build_plan_error_guidance(question)),
                    ),
                    Err(ExecuteQueryError::Execution(e)) => {
                        tracing::warn!(
                            "[ToolExecution] execute_query failed: {} sql={} params={:?}",
                            e.message,
                            e.sql,
                            e.params
                        );
                        ToolResult::error(
                            Some(tool),
                            format!("Error: the query failed in storage: {}", e.message),
                        )
                    }
                    Err(ExecuteQueryError::Store(e)) => {
                        tracing::warn!("[ToolExecution] execute_query store failure: {}", e);
                        ToolResult::error(
                            Some(tool),
                            "Error: the table store is unavailable right now.".to_string(),
                        )
                    }
                }
            }
        }
    }
}
