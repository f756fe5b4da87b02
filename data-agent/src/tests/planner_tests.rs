use std::sync::Arc;

use serde_json::json;

use super::harness::{text, ScriptedReasoner, TestStore};
use crate::error::ValidationError;
use crate::query_planner::{plan_and_run, PlannerError};
use crate::query_executor::SqlParam;

#[tokio::test]
async fn test_single_shot_plan_runs() {
    let store = TestStore::start().await;
    let table = store.ingest_sales("t").await;

    let reply = format!(
        "Here is the plan:\n```json\n{}\n```",
        json!({
            "table": table,
            "select": ["region"],
            "where": [{"column": "region", "op": "=", "value": "North"}]
        })
    );
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(vec![text(&reply)])]));

    let report = plan_and_run(&store.handles(reasoner.clone()), 100, "t", "Rows in the North?")
        .await
        .unwrap();

    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.columns, vec!["region"]);
    assert_eq!(report.params, vec![SqlParam::Text("North".to_string())]);
    assert!(report.sql.contains("WHERE \"region\" = ?"));

    let requests = reasoner.requests();
    let request = &requests[0];
    assert_eq!(request.len(), 1);
    assert!(request[0].content.contains(&table));
    assert!(request[0].content.ends_with("Rows in the North?"));
}

#[tokio::test]
async fn test_no_tables_skips_model() {
    let store = TestStore::start().await;
    let reasoner = Arc::new(ScriptedReasoner::new(vec![]));

    let err = plan_and_run(&store.handles(reasoner.clone()), 100, "t", "Anything?")
        .await
        .unwrap_err();

    assert_eq!(err, PlannerError::NoTables);
    assert_eq!(reasoner.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_and_declined_plans() {
    let store = TestStore::start().await;
    store.ingest_sales("t").await;

    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![text(r#"{"table": "payroll", "select": ["salary"]}"#)]),
        Ok(vec![text(r#"{"error": "question is not about the data"}"#)]),
        Ok(vec![text("I cannot help with that.")]),
    ]));
    let handles = store.handles(reasoner);

    let err = plan_and_run(&handles, 100, "t", "Salaries?").await.unwrap_err();
    assert!(matches!(
        err,
        PlannerError::Validation(ValidationError::UnknownTable { .. })
    ));

    let err = plan_and_run(&handles, 100, "t", "Weather?").await.unwrap_err();
    assert_eq!(
        err,
        PlannerError::Declined("question is not about the data".to_string())
    );

    let err = plan_and_run(&handles, 100, "t", "Hello?").await.unwrap_err();
    assert!(matches!(err, PlannerError::UnparsablePlan { .. }));
}
