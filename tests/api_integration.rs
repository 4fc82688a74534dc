//! Integration tests for the HTTP API.
//!
//! Each test starts the real router on a random port, backed by in-memory
//! stores and a scripted chat client, and talks to it over reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{ json, Value as JsonValue };

use docchat_agent::admin::{ AdminGate, AdminService };
use docchat_agent::agent::ChatAgent;
use docchat_agent::config::prompt::PromptConfig;
use docchat_agent::history::{ HistoryStore, MemoryHistoryStore };
use docchat_agent::llm::chat::{ create_streaming_response, ChatClient, FragmentStream };
use docchat_agent::llm::proxy::CompletionProxy;
use docchat_agent::llm::retry::RetryPolicy;
use docchat_agent::llm::LlmError;
use docchat_agent::models::chat::{ ChatMessage, Role };
use docchat_agent::server::{ api, AppState };
use docchat_agent::store::MemoryStore;
use docchat_agent::store::Fields;

const ADMIN: &str = "admin-1";

struct EchoClient;

#[async_trait]
impl ChatClient for EchoClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok("echo".to_string())
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(
            create_streaming_response(move |tx| async move {
                for fragment in ["You said: ".to_string(), last] {
                    if tx.send(Ok(fragment)).await.is_err() {
                        return;
                    }
                }
            })
        )
    }

    fn get_model(&self) -> String {
        "echo".to_string()
    }
}

fn fields(value: JsonValue) -> Fields {
    match value {
        JsonValue::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

struct TestServer {
    base: String,
    documents: Arc<MemoryStore>,
    history: Arc<MemoryHistoryStore>,
}

/// Spawn the API on port 0 (random available port).
async fn spawn_test_server() -> TestServer {
    let documents = Arc::new(MemoryStore::default());
    let history = Arc::new(MemoryHistoryStore::default());
    let prompts = Arc::new(PromptConfig {
        system_prompt: "You answer questions about documents.".into(),
        document_context: "Document: {document}".into(),
        last_loaded: None,
    });

    let agent = ChatAgent::new(Arc::new(EchoClient), history.clone(), prompts);
    let proxy = CompletionProxy::new(
        "http://127.0.0.1:9/unused".into(),
        "key".into(),
        "model".into(),
        RetryPolicy::default()
    );

    let state = AppState {
        agent: Arc::new(agent),
        admin: Arc::new(AdminService::new(documents.clone())),
        gate: Arc::new(AdminGate::new([ADMIN, "admin-2", "admin-3"])),
        proxy: Arc::new(proxy),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });

    TestServer { base: format!("http://{addr}"), documents, history }
}

fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap()
}

// ── Chat ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let server = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/api/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn chat_stores_both_sides_of_the_exchange() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/documents/doc-1/chat", server.base))
        .json(&json!({ "content": "What is this?", "context": "A short memo." }))
        .send().await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let reply: JsonValue = resp.json().await.unwrap();
    assert_eq!(reply["content"], "You said: What is this?");
    assert_eq!(reply["persisted"], true);
    assert_eq!(reply["history_len"], 3);

    let stored = server.history.get_conversation("doc-1").await.unwrap();
    let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert!(stored.messages[0].content.contains("A short memo."));

    let history: JsonValue = reqwest
        ::get(format!("{}/api/documents/doc-1/history", server.base)).await
        .unwrap()
        .json().await
        .unwrap();
    assert_eq!(history["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_chat_message_is_rejected() {
    let server = spawn_test_server().await;
    let resp = reqwest::Client
        ::new()
        .post(format!("{}/api/documents/doc-1/chat", server.base))
        .json(&json!({ "content": "   " }))
        .send().await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let stored = server.history.get_conversation("doc-1").await.unwrap();
    assert!(stored.messages.is_empty());
}

// ── Conversions ──────────────────────────────────────────────────────

#[tokio::test]
async fn conversion_is_recorded() {
    let server = spawn_test_server().await;
    let resp = reqwest::Client
        ::new()
        .post(format!("{}/api/conversions", server.base))
        .json(&json!({ "user_id": "u1", "file_name": "report.pdf", "conversion_type": "pdf-to-docx" }))
        .send().await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let record: JsonValue = resp.json().await.unwrap();
    assert_eq!(record["file_name"], "report.pdf");
    assert!(!record["id"].as_str().unwrap().is_empty());

    let resp = no_redirect_client()
        .get(format!("{}/api/admin/stats", server.base))
        .header("x-user-id", ADMIN)
        .send().await
        .unwrap();
    let stats: JsonValue = resp.json().await.unwrap();
    assert_eq!(stats["total_conversions"], 1);
    assert_eq!(stats["conversions_last_7_days"], 1);
}

#[tokio::test]
async fn conversion_without_file_is_rejected() {
    let server = spawn_test_server().await;
    let resp = reqwest::Client
        ::new()
        .post(format!("{}/api/conversions", server.base))
        .json(&json!({ "user_id": "u1", "file_name": "" }))
        .send().await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ── Admin ────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_admin_is_redirected_to_root() {
    let server = spawn_test_server().await;
    let client = no_redirect_client();

    for identity in [None, Some("someone-else")] {
        let mut req = client.get(format!("{}/api/admin/stats", server.base));
        if let Some(id) = identity {
            req = req.header("x-user-id", id);
        }
        let resp = req.send().await.unwrap();
        assert!(resp.status().is_redirection(), "status {}", resp.status());
        assert_eq!(resp.headers()["location"], "/");
    }

    let resp = client
        .get(format!("{}/api/admin/export/users", server.base))
        .send().await
        .unwrap();
    assert!(resp.status().is_redirection());
}

#[tokio::test]
async fn admin_stats_aggregate_store_contents() {
    let server = spawn_test_server().await;
    let docs = &server.documents;
    docs.insert("users", "u1", fields(json!({ "name": "Ada", "email": "ada@example.com" }))).await;
    docs.insert("users", "u2", fields(json!({ "name": "Bob", "email": "bob@example.com" }))).await;
    docs.insert("customers", "c1", fields(json!({ "email": "ada@example.com", "stripeId": "cus_1" }))).await;
    docs.insert(
        "customers/c1/payments",
        "p1",
        fields(json!({ "amount": 1999, "currency": "usd", "status": "succeeded" }))
    ).await;
    docs.insert(
        "customers/c1/payments",
        "p2",
        fields(json!({ "amount": 500, "currency": "usd", "status": "failed" }))
    ).await;
    docs.insert(
        "customers/c1/cancellation_requests",
        "r1",
        fields(json!({ "reason": "too pricey", "status": "pending" }))
    ).await;

    let stats: JsonValue = no_redirect_client()
        .get(format!("{}/api/admin/stats", server.base))
        .header("x-user-id", ADMIN)
        .send().await
        .unwrap()
        .json().await
        .unwrap();

    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["total_customers"], 1);
    assert_eq!(stats["paying_customers"], 1);
    assert_eq!(stats["succeeded_payments"], 1);
    assert_eq!(stats["revenue_by_currency"]["usd"], 1999);
    assert_eq!(stats["pending_cancellations"], 1);
}

#[tokio::test]
async fn admin_export_downloads_csv() {
    let server = spawn_test_server().await;
    server.documents.insert(
        "users",
        "u1",
        fields(json!({ "name": "Lovelace, Ada", "email": "ada@example.com" }))
    ).await;

    let resp = no_redirect_client()
        .get(format!("{}/api/admin/export/users", server.base))
        .header("x-user-id", ADMIN)
        .send().await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/csv"));

    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert!(disposition.contains(&format!("users_{today}.csv")), "{disposition}");

    let body = resp.text().await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], "Name,Email");
    assert_eq!(lines[1], "\"Lovelace, Ada\",ada@example.com");
}

#[tokio::test]
async fn unknown_export_dataset_is_not_found() {
    let server = spawn_test_server().await;
    let resp = no_redirect_client()
        .get(format!("{}/api/admin/export/invoices", server.base))
        .header("x-user-id", ADMIN)
        .send().await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
