use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex};

use analytics_core::config::Config;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use e2e_cli::execute;
use e2e_cli::outcome::RunOutcome;
use envconfig::Envconfig;
use serde_json::{json, Value};

#[derive(Clone)]
struct Collector {
    status: StatusCode,
    batches: Arc<Mutex<Vec<Value>>>,
}

impl Collector {
    fn answering(status: StatusCode) -> Self {
        Self {
            status,
            batches: Arc::default(),
        }
    }

    fn events(&self) -> Vec<Value> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|body| body["batch"].as_array().cloned().unwrap_or_default())
            .collect()
    }
}

async fn import(State(collector): State<Collector>, Json(body): Json<Value>) -> StatusCode {
    collector.batches.lock().unwrap().push(body);
    collector.status
}

async fn start_collector(collector: Collector) -> String {
    let router = Router::new()
        .route("/v1/import/", post(import))
        .with_state(collector);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

fn defaults() -> Config {
    Config::init_from_hashmap(&HashMap::from([(
        "ANALYTICS_RETRY_INITIAL_INTERVAL".to_owned(),
        "1".to_owned(),
    )]))
    .unwrap()
}

fn payload(host: &str, sequences: Value) -> String {
    json!({
        "writeKey": "test-key",
        "apiHost": host,
        "sequences": sequences,
        "config": {"flushAt": 20, "flushInterval": 10000, "maxRetries": 0, "timeout": 5}
    })
    .to_string()
}

#[tokio::test]
async fn delivers_every_kind_of_event() {
    let collector = Collector::answering(StatusCode::OK);
    let host = start_collector(collector.clone()).await;

    let input = payload(
        &host,
        json!([
            {"delayMs": 0, "events": [
                {"type": "identify", "userId": "u1", "traits": {"name": "Ada"}},
                {"type": "track", "userId": "u1", "event": "Signed Up",
                 "timestamp": "2024-05-01T12:00:00Z", "integrations": {"All": true}}
            ]},
            {"delayMs": 10, "events": [
                {"type": "page", "anonymousId": "anon", "name": "Home"},
                {"type": "screen", "userId": "u1", "name": "Settings"},
                {"type": "group", "userId": "u1", "groupId": "g1"},
                {"type": "alias", "userId": "u2", "previousId": "u1"}
            ]}
        ]),
    );

    let outcome = execute(Some(&input), &defaults()).await;

    assert_eq!(outcome, RunOutcome::succeeded());
    let kinds: Vec<String> = collector
        .events()
        .iter()
        .map(|event| event["type"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(
        kinds,
        vec!["identify", "track", "page", "screen", "group", "alias"]
    );
}

#[tokio::test]
async fn rejected_batches_fail_the_run() {
    let collector = Collector::answering(StatusCode::BAD_REQUEST);
    let host = start_collector(collector.clone()).await;

    let input = payload(
        &host,
        json!([{"events": [{"type": "track", "userId": "u", "event": "x"}]}]),
    );

    let outcome = execute(Some(&input), &defaults()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.sent_batches, 0);
    assert!(outcome.error.unwrap().contains("status 400"));
}

#[tokio::test]
async fn empty_run_succeeds_without_contacting_the_endpoint() {
    let collector = Collector::answering(StatusCode::OK);
    let host = start_collector(collector.clone()).await;

    let input = payload(&host, json!([{"delayMs": 0, "events": []}]));

    assert_eq!(
        execute(Some(&input), &defaults()).await,
        RunOutcome::succeeded()
    );
    assert!(collector.events().is_empty());
}

#[tokio::test]
async fn malformed_input_yields_a_failed_outcome() {
    for raw in ["not json", "{}", r#"{"writeKey": 1}"#] {
        let outcome = execute(Some(raw), &defaults()).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    let outcome = execute(None, &defaults()).await;
    assert_eq!(
        outcome,
        RunOutcome::failed("Missing required --input argument")
    );
}

#[tokio::test]
async fn event_without_type_yields_a_failed_outcome() {
    let input = payload(
        "http://127.0.0.1:9",
        json!([{"events": [{"userId": "u", "event": "x"}]}]),
    );

    let outcome = execute(Some(&input), &defaults()).await;

    assert_eq!(outcome, RunOutcome::failed("unknown event type: <missing>"));
}

#[tokio::test]
async fn invalid_host_yields_a_failed_outcome() {
    let input = payload("::not a host::", json!([]));

    let outcome = execute(Some(&input), &defaults()).await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().starts_with("invalid api host"));
}

fn run_binary(args: &[&str]) -> (bool, Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_e2e-cli"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run e2e-cli");

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "expected one line, got {stdout:?}");

    (
        output.status.success(),
        serde_json::from_str(lines[0]).expect("stdout is json"),
    )
}

#[test]
fn binary_prints_one_json_line_for_bad_input() {
    let (exited_ok, result) = run_binary(&["--input", "{not json"]);

    assert!(exited_ok);
    assert_eq!(result["success"], false);
    assert_eq!(result["sentBatches"], 0);
    assert!(result["error"].is_string());
}

#[test]
fn binary_reports_missing_input() {
    let (exited_ok, result) = run_binary(&[]);

    assert!(exited_ok);
    assert_eq!(
        result,
        json!({"success": false, "error": "Missing required --input argument", "sentBatches": 0})
    );
}

#[test]
fn binary_reports_unknown_flags_as_failures() {
    let (exited_ok, result) = run_binary(&["--bogus"]);

    assert!(exited_ok);
    assert_eq!(result["success"], false);
}
