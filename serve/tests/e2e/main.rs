//! End-to-end HTTP tests against a server bound to 127.0.0.1:0.

mod common;

use serde_json::{json, Value};

use common::{spawn_server, spawn_unready_server};

#[tokio::test]
async fn health_reports_ok() {
    let server = spawn_server().await;
    let body: Value = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

/// **Scenario**: thread create → chat → list (session scoped) → delete
/// round-trip; deleting again is still 204.
#[tokio::test]
async fn thread_lifecycle_roundtrip() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{}/threads", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = created["thread_id"].as_str().unwrap().to_string();

    server.llm.push_text("Hello! Ask me about trade data.");
    let response = client
        .post(format!("{}/chat", server.base_url))
        .header("X-Session-Id", "session-1")
        .json(&json!({"question": "hello", "thread_id": thread_id}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let listed: Value = client
        .get(format!("{}/threads", server.base_url))
        .header("X-Session-Id", "session-1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rows = listed.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["thread_id"], thread_id.as_str());
    assert_eq!(rows[0]["title"], "hello");

    // Another session sees nothing.
    let other: Value = client
        .get(format!("{}/threads", server.base_url))
        .header("X-Session-Id", "session-2")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(other.as_array().unwrap().is_empty());

    // Listing without the session header is a validation error.
    let missing = client
        .get(format!("{}/threads", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 422);

    let deleted = client
        .delete(format!("{}/threads/{thread_id}", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);
    let again = client
        .delete(format!("{}/threads/{thread_id}", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 204);
}

/// **Scenario**: messages endpoint returns history after a chat and 404 for
/// unknown threads.
#[tokio::test]
async fn thread_messages_endpoint() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    server.llm.push_text("Hi there.");
    let chat: Value = client
        .post(format!("{}/chat", server.base_url))
        .json(&json!({"question": "hello", "thread_id": "t-msgs", "override_schema": "hs12"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["thread_id"], "t-msgs");

    let messages: Value = client
        .get(format!("{}/threads/t-msgs/messages", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed = messages["messages"].as_array().unwrap();
    assert_eq!(listed[0]["role"], "human");
    assert_eq!(listed[1]["role"], "ai");
    assert_eq!(messages["overrides"]["schema"], "hs12");
    assert_eq!(messages["turn_summaries"].as_array().unwrap().len(), 1);

    let missing = client
        .get(format!("{}/threads/no-such-thread/messages", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

/// **Scenario**: invalid override enum values produce 422 with a structured
/// error naming the field.
#[tokio::test]
async fn invalid_override_is_422() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/chat", server.base_url))
        .json(&json!({"question": "cotton exports", "override_schema": "hs22"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["field"], "override_schema");
    assert!(body["detail"].as_str().unwrap().contains("hs22"));

    let response = client
        .post(format!("{}/chat/stream", server.base_url))
        .json(&json!({"question": "cotton exports", "override_direction": "sideways"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

/// **Scenario**: chat endpoints answer 503 before the service is ready.
#[tokio::test]
async fn unready_service_is_503() {
    let server = spawn_unready_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/chat", server.base_url))
        .json(&json!({"question": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let response = client
        .post(format!("{}/chat/stream", server.base_url))
        .json(&json!({"question": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    // Health still answers.
    let body: Value = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

/// **Scenario**: SQL happy path over HTTP — the answer is non-empty, queries
/// carry SQL starting with SELECT, and totals are populated.
#[tokio::test]
async fn chat_sql_happy_path() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    server.llm.push_tool_call(
        "call_1",
        "query_tool",
        json!({"question": "Top 5 exports of Brazil in 2020"}),
    );
    server.lightweight.push_structured(json!({
        "classification_schemas": ["hs92"],
        "products": [],
        "requires_product_lookup": false,
        "countries": [{"name": "Brazil", "iso3_code": "BRA"}]
    }));
    server
        .llm
        .push_text("SELECT year FROM hs92.country_year LIMIT 5");
    server.llm.push_text("Soybeans led Brazil's 2020 exports.");

    let body: Value = client
        .post(format!("{}/chat", server.base_url))
        .json(&json!({"question": "Top 5 exports of Brazil in 2020", "thread_id": "t-sql-1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(!body["answer"].as_str().unwrap().is_empty());
    let queries = body["queries"].as_array().unwrap();
    assert!(!queries.is_empty());
    assert!(queries[0]["sql"].as_str().unwrap().starts_with("SELECT"));
    assert!(body["total_rows"].as_u64().unwrap() >= 1);
    assert_eq!(body["schemas_used"], json!(["hs92"]));
}

/// **Scenario**: streaming order over HTTP — the event sequence starts with
/// thread_id and ends with done.
#[tokio::test]
async fn chat_stream_event_order() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    server.llm.push_tool_call(
        "call_1",
        "query_tool",
        json!({"question": "US exports 2020"}),
    );
    server.lightweight.push_structured(json!({
        "classification_schemas": ["hs92"],
        "products": [],
        "requires_product_lookup": false,
        "countries": [{"name": "United States", "iso3_code": "USA"}]
    }));
    server
        .llm
        .push_text("SELECT year FROM hs92.country_year LIMIT 5");
    server.llm.push_text("About $1.4T in 2020.");

    let raw = client
        .post(format!("{}/chat/stream", server.base_url))
        .json(&json!({"question": "US exports 2020"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let names: Vec<&str> = raw
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert_eq!(*names.first().unwrap(), "thread_id");
    assert_eq!(*names.last().unwrap(), "done");
    assert!(names.contains(&"node_start"));
    assert!(names.contains(&"pipeline_state"));
    assert!(names.contains(&"agent_talk"));

    let done_data = raw
        .lines()
        .zip(raw.lines().skip(1))
        .find(|(event, _)| *event == "event: done")
        .and_then(|(_, data)| data.strip_prefix("data: "))
        .unwrap();
    let done: Value = serde_json::from_str(done_data).unwrap();
    assert!(done["total_time_ms"].as_u64().unwrap() > 0);
}
