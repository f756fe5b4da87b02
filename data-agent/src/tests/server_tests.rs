use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};

use super::harness::{test_config, text, tool_call, ScriptedReasoner, TestStore, SALES_CSV};
use crate::answer_synthesizer::NO_DATA_ANSWER;
use crate::server::{router, AppState};

async fn start_server(store: &TestStore, reasoner: Arc<ScriptedReasoner>) -> SocketAddr {
    let state = AppState {
        handles: store.handles(reasoner),
        config: test_config(),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_upload_then_list_then_ask() {
    let store = TestStore::start().await;
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![tool_call("get_schema", json!({"topicId": "t"}))]),
        Ok(vec![text("There are three sales rows.")]),
    ]));
    let addr = start_server(&store, reasoner).await;
    let client = reqwest::Client::new();

    let upload: Value = client
        .post(format!("http://{}/topics/t/upload-csv?name=sales.csv", addr))
        .body(SALES_CSV)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(upload["rows_inserted"], json!(3));
    let table = upload["table"].as_str().unwrap().to_string();

    let tables: Value = client
        .get(format!("http://{}/topics/t/tables", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tables[0]["table"], json!(table));
    assert_eq!(tables[0]["original_name"], json!("sales.csv"));

    let response = client
        .post(format!("http://{}/topics/t/agent-query", addr))
        .json(&json!({"question": "How many rows?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"answer": "There are three sales rows."}));
}

#[tokio::test]
async fn test_empty_topic_and_bad_requests() {
    let store = TestStore::start().await;
    let addr = start_server(&store, Arc::new(ScriptedReasoner::new(vec![]))).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{}/topics/none/agent-query", addr))
        .json(&json!({"question": "Revenue?"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["answer"], json!(NO_DATA_ANSWER));

    let blank = client
        .post(format!("http://{}/topics/none/agent-query", addr))
        .json(&json!({"question": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);

    let empty_upload = client
        .post(format!("http://{}/topics/none/upload-csv", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(empty_upload.status(), 400);

    let planner = client
        .post(format!("http://{}/topics/none/query-data", addr))
        .json(&json!({"question": "Revenue?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(planner.status(), 404);
}

#[tokio::test]
async fn test_query_data_honors_requested_limit() {
    let store = TestStore::start().await;
    let table = store.ingest_sales("t").await;
    let plan = json!({"table": table, "select": ["region", "revenue"]}).to_string();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(vec![text(&plan)]),
        Ok(vec![text(&plan)]),
    ]));
    let addr = start_server(&store, reasoner).await;
    let client = reqwest::Client::new();

    let limited: Value = client
        .post(format!("http://{}/topics/t/query-data", addr))
        .json(&json!({"question": "List sales", "limit": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(limited["rows"].as_array().unwrap().len(), 1);
    assert_eq!(limited["plan"]["limit"], json!(1));

    let unlimited: Value = client
        .post(format!("http://{}/topics/t/query-data", addr))
        .json(&json!({"question": "List sales"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unlimited["rows"].as_array().unwrap().len(), 3);
    assert_eq!(unlimited["plan"]["limit"], json!(100));
}
