use serde_json::json;

use super::harness::{TestStore, SALES_CSV};
use crate::plan::QueryPlan;
use crate::plan_validator::{validate, ComparisonOp, Filter, NormalizedPlan, Projection};
use crate::query_executor::{QueryExecutor, SqlParam};
use crate::schema_registry::SchemaRegistry;

#[tokio::test]
async fn test_listing_is_most_recent_first_and_per_topic() {
    let store = TestStore::start().await;
    let first = store.ingest_sales("a").await;
    let second = store
        .ingest("a", "staff.csv", "name,team\nAda,core\nLin,infra\n")
        .await
        .table
        .unwrap();
    store.ingest_sales("b").await;

    let registry = SchemaRegistry::new(store.tx.clone());
    let schema = registry.lookup("a").await.unwrap();
    let tables: Vec<&str> = schema.iter().map(|e| e.table.as_str()).collect();
    assert_eq!(tables, vec![second.as_str(), first.as_str()]);
    assert_eq!(schema[0].columns, vec!["name", "team"]);
    assert_eq!(schema[1].columns, vec!["region", "revenue", "units"]);

    assert_eq!(registry.lookup("b").await.unwrap().len(), 1);
    assert!(registry.lookup("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_names_table_after_file() {
    let store = TestStore::start().await;
    let report = store.ingest("t", "Q3 Sales.csv", SALES_CSV).await;

    let table = report.table.unwrap();
    assert!(table.starts_with("doc_Q3_Sales_"), "unexpected name {}", table);
    assert_eq!(report.rows_inserted, 3);
    assert_eq!(report.columns, vec!["region", "revenue", "units"]);

    let manifests = SchemaRegistry::new(store.tx.clone())
        .manifests("t")
        .await
        .unwrap();
    assert_eq!(manifests[0].original_name.as_deref(), Some("Q3 Sales.csv"));
}

#[tokio::test]
async fn test_header_only_upload_creates_no_table() {
    let store = TestStore::start().await;
    let report = store.ingest("t", "empty.csv", "region,revenue\n").await;

    assert!(report.table.is_none());
    assert_eq!(report.rows_inserted, 0);
    assert!(SchemaRegistry::new(store.tx.clone())
        .lookup("t")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_storage_failure_carries_sql_and_params() {
    let store = TestStore::start().await;
    let table = store.ingest_sales("t").await;

    // Bypasses validation on purpose: the column does not exist.
    let plan = NormalizedPlan {
        table,
        select: vec![Projection::Column("missing".to_string())],
        filters: vec![Filter {
            column: "region".to_string(),
            op: ComparisonOp::Eq,
            value: SqlParam::Text("North".to_string()),
        }],
        group_by: Vec::new(),
        limit: 10,
    };
    let err = QueryExecutor::new(store.tx.clone())
        .execute(&plan)
        .await
        .unwrap_err();

    assert!(err.sql.starts_with("SELECT \"missing\" FROM"));
    assert!(err.sql.contains("WHERE \"region\" = ?"));
    assert_eq!(err.params, vec![SqlParam::Text("North".to_string())]);
    assert!(err.message.contains("missing"));
}

#[tokio::test]
async fn test_same_plan_twice_returns_same_rows() {
    let store = TestStore::start().await;
    let table = store.ingest_sales("t").await;
    let schema = SchemaRegistry::new(store.tx.clone())
        .lookup("t")
        .await
        .unwrap();

    let raw = QueryPlan::from_tool_arguments(&json!({
        "table": table,
        "select": ["region", "revenue"],
        "where": [{"column": "revenue", "op": ">=", "value": 50}]
    }))
    .unwrap();
    let normalized = validate(&raw, &schema, 100).unwrap();
    let executor = QueryExecutor::new(store.tx.clone());

    let first = executor.execute(&normalized).await.unwrap();
    let second = executor.execute(&normalized).await.unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(first.columns, vec!["region", "revenue"]);
    assert_eq!(first.rows.len(), 2);
    assert_eq!(first.params, vec![SqlParam::Integer(50)]);
}

#[tokio::test]
async fn test_limit_caps_returned_rows() {
    let store = TestStore::start().await;
    let table = store.ingest_sales("t").await;
    let schema = SchemaRegistry::new(store.tx.clone())
        .lookup("t")
        .await
        .unwrap();

    let raw = QueryPlan::from_tool_arguments(&json!({"table": table, "limit": 2})).unwrap();
    let normalized = validate(&raw, &schema, 100).unwrap();
    let output = QueryExecutor::new(store.tx.clone())
        .execute(&normalized)
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 2);
    assert_eq!(output.columns, vec!["region", "revenue", "units"]);
}
