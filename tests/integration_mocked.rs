/// Integration tests with mocked external APIs
/// Exercises the Notion and Anthropic clients without hitting real services
use lead_copilot::config::PropertyNames;
use lead_copilot::errors::{AppError, LlmError};
use lead_copilot::llm::{
    AnthropicClient, CompletionRequest, FieldKind, FieldSpec, LlmAdapter, LlmClient, SchemaHint,
    Stage,
};
use lead_copilot::models::{FieldValue, OutputField};
use lead_copilot::notion::NotionClient;
use lead_copilot::retry::RetryPolicy;
use lead_copilot::store::{LeadFilter, RecordStore};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DATABASE_ID: &str = "0123456789abcdef0123456789abcdef";

/// Shortest backoff the policy supports. Real time: pausing the clock would
/// also fire the HTTP client's timeouts while wiremock answers.
fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(1),
    }
}

fn notion_client(server: &MockServer) -> NotionClient {
    NotionClient::new(
        server.uri(),
        "ntn_test".to_string(),
        DATABASE_ID.to_string(),
        PropertyNames::default(),
        fast_retry(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn anthropic_client(server: &MockServer) -> AnthropicClient {
    AnthropicClient::new(
        server.uri(),
        "sk-ant-test".to_string(),
        "claude-test".to_string(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn database_schema(extra: &[(&str, &str)]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    for (name, kind) in [
        ("Company", "title"),
        ("Website", "url"),
        ("Notes", "rich_text"),
        ("Last Contacted", "date"),
        ("Status", "select"),
    ]
    .iter()
    .chain(extra.iter())
    {
        properties.insert(name.to_string(), json!({ "id": name, "type": kind }));
    }
    json!({ "object": "database", "id": DATABASE_ID, "properties": properties })
}

fn page(id: &str, company: &str) -> serde_json::Value {
    json!({
        "object": "page",
        "id": id,
        "properties": {
            "Company": { "type": "title", "title": [{ "plain_text": company }] },
            "Website": { "type": "url", "url": null },
            "Notes": { "type": "rich_text", "rich_text": [{ "plain_text": "Series B" }] },
            "Last Contacted": { "type": "date", "date": { "start": "2026-03-01" } },
            "Status": { "type": "select", "select": { "name": "Qualified" } }
        }
    })
}

async fn mount_schema(server: &MockServer, extra: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_schema(extra)))
        .mount(server)
        .await;
}

// ============ Notion ============

#[tokio::test]
async fn test_notion_query_follows_pagination() {
    let server = MockServer::start().await;
    mount_schema(&server, &[]).await;

    Mock::given(method("POST"))
        .and(path(format!("/v1/databases/{}/query", DATABASE_ID)))
        .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [page("page-3", "Gamma")],
            "has_more": false,
            "next_cursor": null
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/v1/databases/{}/query", DATABASE_ID)))
        .and(header("Notion-Version", "2022-06-28"))
        .and(header("Authorization", "Bearer ntn_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [page("page-1", "Alpha"), page("page-2", "Beta")],
            "has_more": true,
            "next_cursor": "cursor-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let leads = notion_client(&server)
        .query_leads(&LeadFilter::default())
        .await
        .unwrap();

    let companies: Vec<&str> = leads.iter().map(|l| l.company.as_str()).collect();
    assert_eq!(companies, vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(leads[0].notes.as_deref(), Some("Series B"));
    assert_eq!(leads[0].website, None);
    assert_eq!(leads[0].status.as_deref(), Some("Qualified"));
}

#[tokio::test]
async fn test_notion_query_stops_at_limit() {
    let server = MockServer::start().await;
    mount_schema(&server, &[]).await;

    Mock::given(method("POST"))
        .and(path(format!("/v1/databases/{}/query", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [page("page-1", "Alpha"), page("page-2", "Beta")],
            "has_more": true,
            "next_cursor": "cursor-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = LeadFilter {
        status: None,
        limit: Some(1),
    };
    let leads = notion_client(&server).query_leads(&filter).await.unwrap();

    assert_eq!(leads.len(), 1);
}

#[tokio::test]
async fn test_notion_write_formats_by_column_type_and_skips_missing() {
    let server = MockServer::start().await;
    mount_schema(
        &server,
        &[
            ("icp_score", "number"),
            ("priority_tier", "select"),
            ("stale_flag", "checkbox"),
            ("research_citations", "rich_text"),
        ],
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/v1/pages/page-1"))
        .and(body_partial_json(json!({
            "properties": {
                "icp_score": { "number": 82 },
                "priority_tier": { "select": { "name": "high" } },
                "stale_flag": { "checkbox": false }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page" })))
        .expect(1)
        .mount(&server)
        .await;

    let values = vec![
        (OutputField::IcpScore, FieldValue::Number(82)),
        (OutputField::PriorityTier, FieldValue::Select("high".into())),
        (OutputField::StaleFlag, FieldValue::Checkbox(false)),
        (
            OutputField::ResearchCitations,
            FieldValue::List(vec!["CRM Notes".into(), "Website: https://example.com".into()]),
        ),
        (OutputField::ResearchBrief, FieldValue::Text("brief".into())),
    ];

    let report = notion_client(&server)
        .write_properties("page-1", &values)
        .await
        .unwrap();

    assert_eq!(report.written.len(), 4);
    assert_eq!(report.skipped_columns, vec!["research_brief".to_string()]);
}

#[tokio::test]
async fn test_notion_retries_rate_limit_then_succeeds() {
    let server = MockServer::start().await;
    mount_schema(&server, &[]).await;

    Mock::given(method("POST"))
        .and(path(format!("/v1/databases/{}/query", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate_limited"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/v1/databases/{}/query", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [page("page-1", "Alpha")],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let leads = notion_client(&server)
        .query_leads(&LeadFilter::default())
        .await
        .unwrap();

    assert_eq!(leads.len(), 1);
}

#[tokio::test]
async fn test_notion_unauthorized_is_fatal_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "object": "error", "code": "unauthorized", "message": "API token is invalid."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = notion_client(&server)
        .query_leads(&LeadFilter::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Auth(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_notion_missing_database_is_configuration_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(404).set_body_string("object_not_found"))
        .mount(&server)
        .await;

    let err = notion_client(&server)
        .query_leads(&LeadFilter::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Configuration(_)));
}

#[tokio::test]
async fn test_notion_schema_bootstrap_is_idempotent() {
    let server = MockServer::start().await;

    // First retrieval: no output columns yet
    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_schema(&[])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let all_outputs: Vec<(&str, &str)> = OutputField::ALL
        .iter()
        .map(|f| (f.key(), "rich_text"))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_schema(&all_outputs)))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .and(body_partial_json(json!({
            "properties": {
                "stale_flag": { "checkbox": {} },
                "icp_score": { "number": { "format": "number" } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "database" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = notion_client(&server);

    let created = client.ensure_schema_columns().await.unwrap();
    assert_eq!(created.len(), OutputField::ALL.len());

    let created_again = client.ensure_schema_columns().await.unwrap();
    assert!(created_again.is_empty());
}

#[tokio::test]
async fn test_notion_setup_access_check_rereads_schema() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(database_schema(&[("icp_score", "number")])),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = notion_client(&server);
    assert_eq!(client.validate_database().await.unwrap(), 6);
    // A second check must not be answered from the cache
    assert_eq!(client.validate_database().await.unwrap(), 6);
}

#[tokio::test]
async fn test_notion_setup_access_check_reports_unshared_database() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/v1/databases/{}", DATABASE_ID)))
        .respond_with(ResponseTemplate::new(404).set_body_string("object_not_found"))
        .mount(&server)
        .await;

    let err = notion_client(&server).validate_database().await.unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
}

// ============ Anthropic ============

fn request() -> CompletionRequest {
    CompletionRequest::structured(Stage::Icp, "system", "Score this lead")
}

#[tokio::test]
async fn test_anthropic_returns_text_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "model": "claude-test", "system": "system" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "{\"icp_score\": 70}" }],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = anthropic_client(&server).complete(&request()).await.unwrap();

    assert_eq!(text, "{\"icp_score\": 70}");
}

async fn anthropic_error_for(status: u16) -> LlmError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(status).set_body_string("error"))
        .expect(1)
        .mount(&server)
        .await;

    anthropic_client(&server).complete(&request()).await.unwrap_err()
}

#[tokio::test]
async fn test_anthropic_status_codes_map_to_error_kinds() {
    assert!(matches!(anthropic_error_for(401).await, LlmError::Auth(_)));
    assert_eq!(anthropic_error_for(429).await, LlmError::RateLimited);
    assert!(matches!(anthropic_error_for(529).await, LlmError::Unavailable(_)));
    assert!(matches!(anthropic_error_for(400).await, LlmError::Rejected(_)));
}

#[tokio::test]
async fn test_adapter_stops_after_three_rate_limited_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate_limit_error"))
        .expect(3)
        .mount(&server)
        .await;

    const SCHEMA: SchemaHint = SchemaHint::new(&[FieldSpec::required("icp_score", FieldKind::Number)]);
    let adapter = LlmAdapter::new(anthropic_client(&server), fast_retry());

    let err = adapter.complete(&request(), &SCHEMA).await.unwrap_err();

    assert_eq!(err, LlmError::RateLimited);
}

#[tokio::test]
async fn test_adapter_repairs_prose_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "This lead looks promising!" }]
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "```json\n{\"icp_score\": 64}\n```" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    const SCHEMA: SchemaHint = SchemaHint::new(&[FieldSpec::required("icp_score", FieldKind::Number)]);
    let adapter = LlmAdapter::new(anthropic_client(&server), fast_retry());

    let object = adapter.complete(&request(), &SCHEMA).await.unwrap();

    assert_eq!(object.get("icp_score"), Some(&json!(64)));
}
