use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::harness::{test_config, text, tool_call, tool_results, ScriptedReasoner, TestStore};
use crate::agentic_loop::{run_agent, run_agent_with_report, AgentLoopConfig};
use crate::agentic_state::Termination;
use crate::answer_synthesizer::{
    BUDGET_EXHAUSTED_ANSWER, FAILURE_ANSWER, NO_DATA_ANSWER, TIMEOUT_ANSWER,
};
use crate::error::ReasoningError;
use crate::message_builders::PRELOADED_SCHEMA_CALL_ID;
use crate::protocol::MessageRole;

const TOPIC: &str = "topic-1";

#[tokio::test]
async fn test_sales_question_end_to_end() {
    let store = TestStore::start().await;
    let table = store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call("get_schema", json!({"topicId": TOPIC}))]),
        Ok(vec![tool_call(
            "execute_query",
            json!({
                "table": table,
                "select": ["region", {"agg": "SUM", "column": "revenue"}],
                "group_by": ["region"]
            }),
        )]),
        Ok(vec![text("North had 125 in revenue and South had 50.")]),
    ]));
    let handles = store.handles(reasoner.clone());

    let report = run_agent_with_report(&handles, &test_config(), TOPIC, "Revenue by region?").await;

    assert_eq!(report.termination, Termination::Answered);
    assert!(!report.fallback_used);
    assert_eq!(report.answer, "North had 125 in revenue and South had 50.");
    assert_eq!(reasoner.call_count(), 3);

    let requests = reasoner.requests();
    let last = requests.last().unwrap();
    let results = tool_results(last);
    assert_eq!(results.len(), 2);

    let rows: Value = serde_json::from_str(&results[1].content).unwrap();
    assert_eq!(rows["row_count"], json!(2));
    let mut pairs: Vec<(String, i64)> = rows["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["region"].as_str().unwrap().to_string(),
                r["sum_revenue"].as_i64().unwrap(),
            )
        })
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![("North".to_string(), 125), ("South".to_string(), 50)]
    );

    assert!(report.trace.contains(&"node:toolNode:done:get_schema".to_string()));
    assert!(report.trace.contains(&"node:toolNode:done:execute_query".to_string()));
    assert_eq!(report.trace.last().unwrap(), "done:answered");
}

#[tokio::test]
async fn test_requests_carry_instructions_and_topic() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call("get_schema", json!({}))]),
        Ok(vec![text("Done.")]),
    ]));
    run_agent(&store.handles(reasoner.clone()), &test_config(), TOPIC, "How many rows?").await;

    let requests = reasoner.requests();
    let first = &requests[0];
    assert_eq!(first[0].role, MessageRole::System);
    assert_eq!(first[1].role, MessageRole::User);
    assert_eq!(first[1].content, "How many rows?");
    assert!(first[2].content.contains(TOPIC));
}

#[tokio::test]
async fn test_fallback_injects_schema_when_no_tool_requested() {
    let store = TestStore::start().await;
    let table = store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![text("I think revenue is probably fine.")]),
        Ok(vec![text("Total revenue is 175.")]),
    ]));
    let report = run_agent_with_report(
        &store.handles(reasoner.clone()),
        &test_config(),
        TOPIC,
        "What is the total revenue?",
    )
    .await;

    assert!(report.fallback_used);
    assert_eq!(report.termination, Termination::Answered);
    assert_eq!(report.answer, "Total revenue is 175.");
    assert_eq!(report.trace[0], "fallback:schema_injected:tables=1");
    assert_eq!(reasoner.call_count(), 2);

    let requests = reasoner.requests();
    let second = &requests[1];
    let preloaded_call = second
        .iter()
        .find(|m| m.role == MessageRole::Assistant && m.has_tool_calls())
        .unwrap();
    assert_eq!(
        preloaded_call.tool_calls[0].id.as_deref(),
        Some(PRELOADED_SCHEMA_CALL_ID)
    );
    assert_eq!(preloaded_call.tool_calls[0].name, "get_schema");

    let results = tool_results(second);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id.as_deref(), Some(PRELOADED_SCHEMA_CALL_ID));
    let schema: Value = serde_json::from_str(&results[0].content).unwrap();
    assert_eq!(schema["schema"][0]["table"], json!(table));
    assert_eq!(schema["schema"][0]["relevant_columns"], json!(["revenue"]));
}

#[tokio::test]
async fn test_first_answer_stands_when_fallback_schema_fetch_fails() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    // Forward only the opening table lookup; later store requests find the channel closed.
    let (proxy_tx, mut proxy_rx) = mpsc::channel(8);
    let store_tx = store.tx.clone();
    tokio::spawn(async move {
        if let Some(msg) = proxy_rx.recv().await {
            let _ = store_tx.send(msg).await;
        }
    });

    let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(vec![text(
        "Revenue looks healthy.",
    )])]));
    let mut handles = store.handles(reasoner.clone());
    handles.store_tx = proxy_tx;

    let report = run_agent_with_report(&handles, &test_config(), TOPIC, "How is revenue?").await;

    assert_eq!(report.termination, Termination::Answered);
    assert!(!report.fallback_used);
    assert_eq!(report.answer, "Revenue looks healthy.");
    assert_eq!(reasoner.call_count(), 1);
}

#[tokio::test]
async fn test_fallback_runs_only_once() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![text("Guessing.")]),
        Ok(vec![text("Still guessing.")]),
    ]));
    let report = run_agent_with_report(
        &store.handles(reasoner.clone()),
        &test_config(),
        TOPIC,
        "What is the revenue?",
    )
    .await;

    assert!(report.fallback_used);
    assert_eq!(report.answer, "Still guessing.");
    assert_eq!(reasoner.call_count(), 2);
}

#[tokio::test]
async fn test_rejected_plan_is_reported_and_loop_continues() {
    let store = TestStore::start().await;
    let table = store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call(
            "execute_query",
            json!({
                "table": table,
                "select": ["region"],
                "where": [{"column": "region", "op": "DROP", "value": "x"}]
            }),
        )]),
        Ok(vec![text("I could not filter that way.")]),
    ]));
    let report = run_agent_with_report(
        &store.handles(reasoner.clone()),
        &test_config(),
        TOPIC,
        "Drop the regions",
    )
    .await;

    assert_eq!(report.termination, Termination::Answered);
    assert_eq!(report.answer, "I could not filter that way.");
    assert!(report
        .trace
        .contains(&"node:toolNode:error:execute_query".to_string()));

    let requests = reasoner.requests();
    let second = &requests[1];
    let results = tool_results(second);
    assert!(results[0].content.contains("UnsupportedOperator"));
    assert!(results[0].content.contains("RETRY REQUIRED"));
}

#[tokio::test]
async fn test_no_tables_short_circuits() {
    let store = TestStore::start().await;
    let reasoner = Arc::new(ScriptedReasoner::new(vec![]));

    let report = run_agent_with_report(
        &store.handles(reasoner.clone()),
        &test_config(),
        "empty-topic",
        "What is the revenue?",
    )
    .await;

    assert_eq!(report.answer, NO_DATA_ANSWER);
    assert_eq!(report.termination, Termination::Answered);
    assert_eq!(report.trace, vec!["shortcut:no_tables", "done:answered"]);
    assert_eq!(reasoner.call_count(), 0);
}

#[tokio::test]
async fn test_tables_of_other_topics_are_invisible() {
    let store = TestStore::start().await;
    store.ingest_sales("someone-else").await;
    let reasoner = Arc::new(ScriptedReasoner::new(vec![]));

    let answer = run_agent(&store.handles(reasoner.clone()), &test_config(), TOPIC, "Revenue?").await;

    assert_eq!(answer.answer, NO_DATA_ANSWER);
    assert_eq!(reasoner.call_count(), 0);
}

#[tokio::test]
async fn test_budget_exhaustion_stops_before_third_call() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call("get_schema", json!({}))]),
        Ok(vec![tool_call("get_schema", json!({}))]),
        Ok(vec![tool_call("get_schema", json!({}))]),
        Ok(vec![text("unreachable")]),
    ]));
    let config = AgentLoopConfig {
        max_tool_calls: 2,
        ..test_config()
    };
    let report =
        run_agent_with_report(&store.handles(reasoner.clone()), &config, TOPIC, "Revenue?").await;

    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert_eq!(report.answer, BUDGET_EXHAUSTED_ANSWER);
    assert!(!report.fallback_used);
    assert_eq!(reasoner.call_count(), 3);

    let tool_starts = report
        .trace
        .iter()
        .filter(|t| t.starts_with("node:toolNode:start"))
        .count();
    assert_eq!(tool_starts, 2);
    assert!(report
        .trace
        .contains(&"budget:exhausted:max_tool_calls=2".to_string()));
    assert_eq!(report.trace.last().unwrap(), "done:budget_exhausted");
}

#[tokio::test]
async fn test_unknown_tool_becomes_result_text() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call("drop_table", json!({"table": "x"}))]),
        Ok(vec![text("That tool does not exist.")]),
    ]));
    let report = run_agent_with_report(
        &store.handles(reasoner.clone()),
        &test_config(),
        TOPIC,
        "Remove the table",
    )
    .await;

    assert!(!report.fallback_used);
    assert_eq!(report.answer, "That tool does not exist.");
    let requests = reasoner.requests();
    let second = &requests[1];
    assert_eq!(tool_results(second)[0].content, "Unknown tool: drop_table");
    assert!(report
        .trace
        .contains(&"node:toolNode:error:drop_table".to_string()));
}

#[tokio::test]
async fn test_reasoning_failure_returns_fixed_answer() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![Err(ReasoningError::Status {
        code: 503,
        body: "overloaded".to_string(),
    })]));
    let report = run_agent_with_report(
        &store.handles(reasoner.clone()),
        &test_config(),
        TOPIC,
        "Revenue?",
    )
    .await;

    assert_eq!(report.answer, FAILURE_ANSWER);
    assert!(matches!(
        report.termination,
        Termination::ReasoningFailed(ReasoningError::Status { code: 503, .. })
    ));
    assert!(!report.fallback_used);
    assert_eq!(reasoner.call_count(), 1);
    assert!(report.trace.contains(&"node:llmCall:error".to_string()));
}

#[tokio::test]
async fn test_deadline_stops_slow_model() {
    let store = TestStore::start().await;
    store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::slow(Duration::from_secs(5)));
    let config = AgentLoopConfig {
        timeout: Duration::from_millis(100),
        ..test_config()
    };
    let report =
        run_agent_with_report(&store.handles(reasoner.clone()), &config, TOPIC, "Revenue?").await;

    assert_eq!(report.termination, Termination::TimedOut);
    assert_eq!(report.answer, TIMEOUT_ANSWER);
    assert!(report.trace.contains(&"deadline:timed_out".to_string()));
}

#[tokio::test]
async fn test_payload_only_reply_falls_back_to_summary() {
    let store = TestStore::start().await;
    let table = store.ingest_sales(TOPIC).await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call(
            "execute_query",
            json!({"table": table, "select": [{"agg": "COUNT", "column": "region"}]}),
        )]),
        Ok(vec![text("{\"count_region\": 3}")]),
    ]));
    let answer = run_agent(&store.handles(reasoner), &test_config(), TOPIC, "How many rows?").await;

    assert!(!answer.answer.contains('{'));
    assert!(answer.answer.contains("returned 1 row(s)"));
}
