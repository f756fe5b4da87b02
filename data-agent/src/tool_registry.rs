//! Tool Registry - the closed set of tools the planning loop exposes.
//!
//! Tools are an enum, not a name-keyed map: adding one means adding a variant,
//! and every dispatcher `match` has to handle it.

use serde_json::json;

use crate::protocol::OpenAITool;

pub const GET_SCHEMA: &str = "get_schema";
pub const EXECUTE_QUERY: &str = "execute_query";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentTool {
    GetSchema,
    ExecuteQuery,
}

impl AgentTool {
    pub fn all() -> [AgentTool; 2] {
        [AgentTool::GetSchema, AgentTool::ExecuteQuery]
    }

    /// Resolve a model-supplied name. Unknown names are `None`, never a panic.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            GET_SCHEMA => Some(AgentTool::GetSchema),
            EXECUTE_QUERY => Some(AgentTool::ExecuteQuery),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentTool::GetSchema => GET_SCHEMA,
            AgentTool::ExecuteQuery => EXECUTE_QUERY,
        }
    }

    /// OpenAI-compatible definition sent with every reasoning call.
    pub fn definition(&self) -> OpenAITool {
        match self {
            AgentTool::GetSchema => get_schema_tool(),
            AgentTool::ExecuteQuery => execute_query_tool(),
        }
    }
}

/// Definitions for every tool, in a stable order.
pub fn tool_definitions() -> Vec<OpenAITool> {
    AgentTool::all().iter().map(AgentTool::definition).collect()
}

fn get_schema_tool() -> OpenAITool {
    OpenAITool::function(
        GET_SCHEMA,
        "Return uploaded table schemas (table names and columns) for a given topic id",
        json!({
            "type": "object",
            "properties": {
                "topicId": {
                    "type": "string",
                    "description": "Conversation topic id"
                }
            },
            "required": ["topicId"]
        }),
    )
}

fn execute_query_tool() -> OpenAITool {
    OpenAITool::function(
        EXECUTE_QUERY,
        "Execute a validated query plan against one uploaded table and return rows",
        json!({
            "type": "object",
            "properties": {
                "table": {
                    "type": "string",
                    "description": "Table name exactly as returned by get_schema"
                },
                "select": {
                    "type": "array",
                    "description": "Column names, or aggregate objects {\"agg\": \"COUNT|SUM|AVG|MIN|MAX\", \"column\": \"col\", \"alias\": \"name\"}. Empty means all columns.",
                    "items": {
                        "anyOf": [
                            { "type": "string" },
                            {
                                "type": "object",
                                "properties": {
                                    "agg": { "type": "string", "enum": ["COUNT", "SUM", "AVG", "MIN", "MAX"] },
                                    "column": { "type": "string" },
                                    "alias": { "type": "string" }
                                },
                                "required": ["agg", "column"]
                            }
                        ]
                    }
                },
                "where": {
                    "type": "array",
                    "description": "Filters joined with AND",
                    "items": {
                        "type": "object",
                        "properties": {
                            "column": { "type": "string" },
                            "op": { "type": "string", "enum": ["=", ">", "<", ">=", "<=", "LIKE"] },
                            "value": { "type": ["string", "number"] }
                        },
                        "required": ["column", "value"]
                    }
                },
                "group_by": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum rows to return"
                }
            },
            "required": ["table"]
        }),
    )
}
