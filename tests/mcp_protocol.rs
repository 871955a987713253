//! Integration tests for the MCP tool server over HTTP

use reqwest::StatusCode;
use serde_json::{json, Value};
use sqlmcp_cli::config::ServerConfig;
use sqlmcp_cli::mcp::{server, McpClient, McpServerState};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

const SESSION_HEADER: &str = "mcp-session-id";

async fn start(dir: &TempDir, raw_sql: bool) -> String {
    let config = ServerConfig {
        db_path: dir.path().join("demo.db"),
        raw_sql,
        ..Default::default()
    };
    let state = Arc::new(McpServerState::open(&config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state, std::future::pending()));
    format!("http://{}/mcp", addr)
}

async fn initialize(client: &reqwest::Client, url: &str) -> String {
    let res = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0" }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let session = res
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    session
}

#[tokio::test]
async fn test_unknown_method_is_method_not_found() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, true).await;
    let client = reqwest::Client::new();
    let session = initialize(&client, &url).await;

    let body: Value = client
        .post(&url)
        .header(SESSION_HEADER, &session)
        .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/list" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], 2);
}

#[tokio::test]
async fn test_notification_is_accepted() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, true).await;
    let client = reqwest::Client::new();
    let session = initialize(&client, &url).await;

    let res = client
        .post(&url)
        .header(SESSION_HEADER, &session)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_session_and_get() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, true).await;
    let client = reqwest::Client::new();

    let res = client
        .post(&url)
        .header(SESSION_HEADER, "no-such-session")
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_malformed_json_and_batch() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, true).await;
    let client = reqwest::Client::new();

    let res = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);

    let res = client
        .post(&url)
        .json(&json!([{ "jsonrpc": "2.0", "id": 1, "method": "ping" }]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_ends_session() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, true).await;
    let client = reqwest::Client::new();
    let session = initialize(&client, &url).await;

    let res = client
        .delete(&url)
        .header(SESSION_HEADER, &session)
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let res = client
        .post(&url)
        .header(SESSION_HEADER, &session)
        .json(&json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_raw_sql_roundtrip_through_client() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, true).await;
    let client = McpClient::connect(&url).await.unwrap();

    let names: Vec<&str> = client.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "add_data",
            "read_data",
            "add_person",
            "query_people",
            "record_interaction",
            "recent_interactions"
        ]
    );

    let added = client
        .call_tool(
            "add_data",
            json!({ "query": "INSERT INTO people (name, age, profession) VALUES ('Bob', 41, 'chef')" }),
        )
        .await
        .unwrap();
    assert_eq!(added.value_or_text(), json!(true));

    let rows = client
        .call_tool("read_data", json!({ "query": "SELECT name, age FROM people" }))
        .await
        .unwrap();
    assert_eq!(rows.value_or_text(), json!([["Bob", 41]]));

    // Failures stay inside the result
    let bad = client
        .call_tool("add_data", json!({ "query": "INSERT INTO nowhere VALUES (1)" }))
        .await
        .unwrap();
    assert!(!bad.is_error);
    assert_eq!(bad.value_or_text(), json!(false));

    let bad_read = client
        .call_tool("read_data", json!({ "query": "SELEC nonsense" }))
        .await
        .unwrap();
    assert_eq!(bad_read.value_or_text(), json!([]));

    assert!(client.call_tool("drop_everything", json!({})).await.is_err());
}

#[tokio::test]
async fn test_parameterized_tools_bind_values() {
    let dir = TempDir::new().unwrap();
    let url = start(&dir, false).await;
    let client = McpClient::connect(&url).await.unwrap();

    assert!(!client.has_tool("add_data"));
    assert!(!client.has_tool("read_data"));

    let name = "Robert'); DROP TABLE people;--";
    let added = client
        .call_tool(
            "add_person",
            json!({ "name": name, "age": 28, "profession": "tester" }),
        )
        .await
        .unwrap();
    assert!(!added.is_error);

    let found = client
        .call_tool("query_people", json!({ "name_contains": "DROP" }))
        .await
        .unwrap();
    let people = found.value_or_text();
    assert_eq!(people[0]["name"], name);
    assert_eq!(people[0]["age"], 28);

    let invalid = client
        .call_tool(
            "add_person",
            json!({ "name": "", "age": 200, "profession": "x" }),
        )
        .await
        .unwrap();
    assert!(invalid.is_error);
    assert!(invalid.to_text().contains("Invalid input"));
}
