//! Instruction text for the reasoning component.
//!
//! Single source of truth for every prompt the agent sends.

use crate::schema_registry::{describe_schema, SchemaEntry};
use crate::tool_registry::{EXECUTE_QUERY, GET_SCHEMA};

/// Core plan-writing rules shared by the loop and the single-shot planner.
pub const PLAN_RULES: &str = "\
- Allowed aggregates: {\"agg\":\"COUNT|SUM|AVG|MIN|MAX\", \"column\":\"col\", \"alias\":\"name\"}.
- Allowed ops: =, >, <, >=, <=, LIKE. Values must be plain strings or numbers.
- ONLY use table and column names exactly as listed in the schema. NEVER guess column names.
- Do not return raw SQL.";

pub const EXAMPLE_PLAN: &str = r#"{
  "table":"sales_2025",
  "select":[{"agg":"SUM","column":"revenue","alias":"total_revenue"}],
  "where":[],
  "group_by":["region"],
  "limit":50
}"#;

/// System instruction for every planning-loop reasoning call.
pub fn build_agent_instructions() -> String {
    format!(
        "You are a data agent that can call two tools:\n\
        1) {get_schema}(topicId) -> returns the list of uploaded tables and their columns for the conversation.\n\
        2) {execute_query}(plan) -> executes a validated query plan against a single uploaded table and returns rows.\n\n\
        Required behavior:\n\
        - First, call {get_schema} with the provided topicId to discover available tables and columns.\n\
        - Then, produce a JSON plan and call {execute_query}. The plan JSON must be an object with keys: \
        table (string), select (array of column names or aggregate objects), where (array of {{column, op, value}}), \
        group_by (array), limit (number).\n\
        {rules}\n\
        - Do not call any other tools.\n\
        - After {execute_query} returns results, synthesize a concise human-readable answer summarizing \
        the requested metric(s) or listing rows as requested.\n\n\
        Always return final decisions as an assistant message (do not output raw tool internals). \
        Example {execute_query} plan:\n{example}\n\n\
        If you cannot build a valid plan, return a short explanation in an assistant message and do not call {execute_query}.",
        get_schema = GET_SCHEMA,
        execute_query = EXECUTE_QUERY,
        rules = PLAN_RULES,
        example = EXAMPLE_PLAN,
    )
}

/// Names the conversation scope the loop runs in.
pub fn build_topic_instruction(conversation_id: &str) -> String {
    format!(
        "Conversation topic id: {}. When calling {} pass this topic id.",
        conversation_id, GET_SCHEMA
    )
}

/// Marks the schema injected by the fallback run.
pub fn build_preloaded_schema_note(conversation_id: &str) -> String {
    format!(
        "Preloaded schema for topic {}. The {} result below is already available; \
        call {} next.",
        conversation_id, GET_SCHEMA, EXECUTE_QUERY
    )
}

/// Appended to a rejected plan so the model retries with a corrected one.
pub fn build_plan_error_guidance(original_question: &str) -> String {
    format!(
        "\n\n**PLAN REJECTED - RETRY REQUIRED**: Read the error above. \
        Use ONLY the table and column names returned by {}, and only the allowed aggregates and operators. \
        Call {} again with a corrected plan, or explain briefly why the question cannot be answered.\n\n\
        **REMINDER - Original User Request**: \"{}\"",
        GET_SCHEMA, EXECUTE_QUERY, original_question
    )
}

/// Prompt for the single-shot planner (no tools, JSON-only reply).
pub fn build_planner_prompt(schema: &[SchemaEntry], question: &str) -> String {
    format!(
        "You are a data planner. Given the schema below and a user question, produce a JSON object \
        (no surrounding text) with the following keys:\n\
        {{\n  \"table\": \"<table_name>\",\n  \"select\": [\"col1\", {{\"agg\":\"COUNT\", \"column\":\"col2\", \"alias\":\"count_col2\"}}],\n  \
        \"where\": [{{\"column\":\"col\",\"op\":\"=|>|<|>=|<=|LIKE\",\"value\": \"...\"}}],\n  \
        \"group_by\": [\"col1\"],\n  \"limit\": 50\n}}\n\n\
        Only return valid JSON. Choose the most appropriate table and columns for the user's question. \
        If an aggregate is needed, use the agg object form. If no filters are required, return an empty array for where. \
        If you cannot answer, return an object with {{\"error\":\"explain reason\"}}.\n\n\
        {rules}\n\n\
        Schema:\n{schema}\n\n\
        Question:\n{question}",
        rules = PLAN_RULES,
        schema = describe_schema(schema),
        question = question,
    )
}
