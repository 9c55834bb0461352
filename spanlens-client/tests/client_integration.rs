// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP-level tests for the REST client against a mock server.

use mockito::{Matcher, Server};
use serde_json::json;
use spanlens_client::{ClientConfig, ClientError, RetryPolicy, SpanlensClient};
use spanlens_core::{
    ApiParams, CreateRuleRequest, ManualClock, PresetTable, PromptMessage, RuleStatus,
    ScorerConfig, TestRuleRequest, UpdateRuleRequest,
};
use std::io::Write;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

const PROJECT: &str = "proj-1";

fn fast_retry() -> RetryPolicy {
    RetryPolicy::exponential()
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

fn client_for(server: &Server) -> SpanlensClient {
    let config = ClientConfig::new(server.url())
        .with_api_key("sk-test")
        .with_project_id(PROJECT)
        .with_retry(fast_retry());
    SpanlensClient::new(config).unwrap()
}

fn rule_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "project_id": PROJECT,
        "name": format!("Rule {}", id),
        "status": status,
        "sampling_rate": 0.5,
        "scorer": {
            "scorer_type": "regex",
            "pattern": "refund",
            "score_name": "mentions_refund"
        },
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

fn rules_page() -> String {
    json!({
        "data": [rule_json("r1", "inactive"), rule_json("r2", "active")],
        "pagination": {"total": 2, "page": 1, "limit": 20}
    })
    .to_string()
}

fn empty_traces_page() -> String {
    json!({"data": [], "pagination": {"total": 0, "page": 1, "limit": 50}}).to_string()
}

/// Test that a GET is retried after a 503 and then succeeds
#[tokio::test]
async fn test_get_retried_on_server_error() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", "/v1/traces")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/v1/traces")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(empty_traces_page())
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let page = client.list_traces(&ApiParams::new().with("page", 1u32)).await.unwrap();
    assert!(page.data.is_empty());

    failing.assert_async().await;
    ok.assert_async().await;
}

/// Test that client errors are never retried
#[tokio::test]
async fn test_client_error_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/traces/missing")
        .with_status(400)
        .with_body(r#"{"message": "Malformed trace id"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_trace("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.user_message(), "Malformed trace id");
    mock.assert_async().await;
}

/// Test that a failing POST is sent exactly once
#[tokio::test]
async fn test_post_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/projects/proj-1/evaluations/rules/r1/test")
        .with_status(503)
        .with_body(r#"{"error": {"message": "Scorer unavailable"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .test_rule(PROJECT, "r1", &TestRuleRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 503, .. }));
    assert_eq!(err.user_message(), "Scorer unavailable");
    mock.assert_async().await;
}

/// Test that the API key header is sent
#[tokio::test]
async fn test_api_key_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/spans")
        .match_query(Matcher::Any)
        .match_header("x-api-key", "sk-test")
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_body(r#"{"data": [], "pagination": {"total": 0, "page": 1, "limit": 50}}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    client.list_spans(&ApiParams::new()).await.unwrap();
    mock.assert_async().await;
}

/// Test that lists are served from cache until the TTL passes
#[tokio::test]
async fn test_list_cached_within_ttl() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/traces")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(empty_traces_page())
        .expect(2)
        .create_async()
        .await;

    let clock = Arc::new(ManualClock::new());
    let config = ClientConfig::new(server.url()).with_retry(fast_retry());
    let client = SpanlensClient::with_clock(config, clock.clone()).unwrap();
    let params = ApiParams::new().with("page", 1u32).with("limit", 50u32);

    client.list_traces(&params).await.unwrap();
    clock.advance(Duration::from_secs(10));
    client.list_traces(&params).await.unwrap();
    assert_eq!(client.cache_stats().hits, 1);

    clock.advance(Duration::from_secs(25));
    client.list_traces(&params).await.unwrap();
    mock.assert_async().await;
}

/// Test that a rejected delete restores the cached list
#[tokio::test]
async fn test_delete_rule_rolls_back_on_failure() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/v1/projects/proj-1/evaluations/rules")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(rules_page())
        .expect(1)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v1/projects/proj-1/evaluations/rules/r1")
        .with_status(500)
        .with_body(r#"{"error": {"message": "Rule is locked"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let params = ApiParams::new();
    assert_eq!(client.list_rules(PROJECT, &params).await.unwrap().data.len(), 2);

    let err = client.delete_rule(PROJECT, "r1").await.unwrap_err();
    assert_eq!(err.user_message(), "Rule is locked");

    let page = client.list_rules(PROJECT, &params).await.unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.pagination.total, 2);
    list.assert_async().await;
    delete.assert_async().await;
}

/// Test that a successful activation drops the patched copy and refetches
#[tokio::test]
async fn test_activate_rule_refetches_after_success() {
    let mut server = Server::new_async().await;
    let detail = server
        .mock("GET", "/v1/projects/proj-1/evaluations/rules/r1")
        .with_status(200)
        .with_body(json!({"data": rule_json("r1", "inactive")}).to_string())
        .expect(2)
        .create_async()
        .await;
    let activate = server
        .mock("POST", "/v1/projects/proj-1/evaluations/rules/r1/activate")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    assert_eq!(client.get_rule(PROJECT, "r1").await.unwrap().status, RuleStatus::Inactive);
    client.activate_rule(PROJECT, "r1").await.unwrap();

    // The server still reports inactive, so this value can only come from a refetch.
    let rule = client.get_rule(PROJECT, "r1").await.unwrap();
    assert_eq!(rule.status, RuleStatus::Inactive);
    detail.assert_async().await;
    activate.assert_async().await;
}

/// Test that activation patches cached rules while the request is in flight
/// and restores them when the server rejects it
#[tokio::test]
async fn test_activate_rule_patches_then_rolls_back() {
    let mut server = Server::new_async().await;
    let list = server
        .mock("GET", "/v1/projects/proj-1/evaluations/rules")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(rules_page())
        .expect(1)
        .create_async()
        .await;
    let detail = server
        .mock("GET", "/v1/projects/proj-1/evaluations/rules/r1")
        .with_status(200)
        .with_body(json!({"data": rule_json("r1", "inactive")}).to_string())
        .expect(1)
        .create_async()
        .await;

    let (arrived_tx, arrived_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let arrived_tx = Mutex::new(arrived_tx);
    let release_rx = Mutex::new(release_rx);
    let activate = server
        .mock("POST", "/v1/projects/proj-1/evaluations/rules/r1/activate")
        .with_status(500)
        .with_chunked_body(move |w| {
            let _ = arrived_tx.lock().unwrap().send(());
            let _ = release_rx.lock().unwrap().recv();
            w.write_all(br#"{"error": {"message": "Evaluator quota exceeded"}}"#)
        })
        .expect(1)
        .create_async()
        .await;

    let client = Arc::new(client_for(&server));
    let params = ApiParams::new();
    let page = client.list_rules(PROJECT, &params).await.unwrap();
    assert_eq!(page.data[0].status, RuleStatus::Inactive);
    assert_eq!(client.get_rule(PROJECT, "r1").await.unwrap().status, RuleStatus::Inactive);

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.activate_rule(PROJECT, "r1").await }
    });
    tokio::task::spawn_blocking(move || arrived_rx.recv())
        .await
        .unwrap()
        .unwrap();

    // Served from cache: no request is made for these reads.
    let page = client.list_rules(PROJECT, &params).await.unwrap();
    assert_eq!(page.data[0].status, RuleStatus::Active);
    assert_eq!(client.get_rule(PROJECT, "r1").await.unwrap().status, RuleStatus::Active);

    release_tx.send(()).unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.user_message(), "Evaluator quota exceeded");

    let page = client.list_rules(PROJECT, &params).await.unwrap();
    assert_eq!(page.data[0].status, RuleStatus::Inactive);
    assert_eq!(client.get_rule(PROJECT, "r1").await.unwrap().status, RuleStatus::Inactive);
    list.assert_async().await;
    detail.assert_async().await;
    activate.assert_async().await;
}

/// Test that changing only the scorer is checked against the stored mapping
#[tokio::test]
async fn test_update_rule_scorer_uses_stored_mapping() {
    let mut server = Server::new_async().await;
    let mut stored = rule_json("r1", "active");
    stored["scorer"] = json!({
        "scorer_type": "llm",
        "messages": [{"role": "user", "content": "Rate {{output}}"}],
        "model": "gpt-4o-mini",
        "provider": "openai"
    });
    stored["variable_mapping"] = json!([{"variable_name": "output", "source": "span_output"}]);
    let detail = server
        .mock("GET", "/v1/projects/proj-1/evaluations/rules/r1")
        .with_status(200)
        .with_body(json!({"data": stored}).to_string())
        .expect(2)
        .create_async()
        .await;
    let update = server
        .mock("PUT", "/v1/projects/proj-1/evaluations/rules/r1")
        .with_status(200)
        .with_body(json!({"data": stored}).to_string())
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let scorer = |prompt: &str| ScorerConfig::Llm {
        messages: vec![PromptMessage {
            role: "user".into(),
            content: prompt.into(),
        }],
        model: "gpt-4o".into(),
        provider: "openai".into(),
        temperature: None,
        output_schema: Vec::new(),
    };

    let request = UpdateRuleRequest {
        scorer: Some(scorer("Score this answer: {{output}}")),
        ..Default::default()
    };
    client.update_rule(PROJECT, "r1", &request).await.unwrap();

    // The update invalidated the cached rule, so it is fetched again here.
    let request = UpdateRuleRequest {
        scorer: Some(scorer("{{input}} -> {{output}}")),
        ..Default::default()
    };
    let err = client.update_rule(PROJECT, "r1", &request).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    detail.assert_async().await;
    update.assert_async().await;
}

/// Test that invalid forms fail before any request
#[tokio::test]
async fn test_create_rule_validates_locally() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server);
    let request = CreateRuleRequest::new(
        "  ",
        ScorerConfig::Builtin {
            scorer_name: "toxicity".into(),
            config: json!({}),
        },
    );
    let err = client.create_rule(PROJECT, &request).await.unwrap_err();
    match err {
        ClientError::Validation(errors) => assert!(errors.field("name").is_some()),
        other => panic!("expected validation error, got {:?}", other),
    }
    mock.assert_async().await;
}

/// Test that unsupported operations make no request
#[tokio::test]
async fn test_not_implemented_makes_no_request() {
    let mut server = Server::new_async().await;
    let post = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let get = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .bulk_delete_traces(&["t1".to_string(), "t2".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotImplemented(_)));
    let err = client.export_traces(&ApiParams::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::NotImplemented("Export")));

    post.assert_async().await;
    get.assert_async().await;
}

/// Test that a rule with no executions yields None
#[tokio::test]
async fn test_latest_execution_not_found_is_none() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/projects/proj-1/evaluations/rules/r1/executions/latest")
        .with_status(404)
        .with_body(r#"{"detail": "No executions"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let latest = client.get_latest_execution(PROJECT, "r1").await.unwrap();
    assert!(latest.is_none());
    mock.assert_async().await;
}

/// Test listing presets sends the table name
#[tokio::test]
async fn test_list_presets_by_table() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/projects/proj-1/filter-presets")
        .match_query(Matcher::UrlEncoded("table_name".into(), "spans".into()))
        .with_status(200)
        .with_body(
            json!({
                "data": [{
                    "id": "p1",
                    "project_id": PROJECT,
                    "name": "Slow LLM calls",
                    "table_name": "spans",
                    "filters": [{"column": "duration", "operator": ">", "value": 2000}],
                    "search_types": ["id"],
                    "created_at": "2025-01-01T00:00:00Z",
                    "updated_at": "2025-01-01T00:00:00Z"
                }],
                "pagination": {"total": 1, "page": 1, "limit": 20}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let page = client.list_presets(PROJECT, PresetTable::Spans).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].to_state(20).len(), 1);
    mock.assert_async().await;
}
