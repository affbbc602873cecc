//! End-to-end tests for the Orca webhook relay over real sockets

use async_trait::async_trait;
use axum::{routing::post, Router};
use bytes::Bytes;
use orca_webhook::{
    example_row, ActionHandler, OrcaAction, OrcaConfig, OrcaResult, OrcaSender,
    OrcaWebhookService, RecordDecoder, SendOutcome, WebhookRecord,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Remembers every invocation
#[derive(Default)]
struct CapturingHandler {
    calls: Mutex<Vec<(OrcaAction, WebhookRecord)>>,
}

impl CapturingHandler {
    fn push(&self, action: OrcaAction, record: &WebhookRecord) -> OrcaResult<()> {
        self.calls.lock().unwrap().push((action, record.clone()));
        Ok(())
    }

    fn calls(&self) -> Vec<(OrcaAction, WebhookRecord)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for CapturingHandler {
    async fn on_add(&self, record: &WebhookRecord) -> OrcaResult<()> {
        self.push(OrcaAction::Add, record)
    }

    async fn on_update(&self, record: &WebhookRecord) -> OrcaResult<()> {
        self.push(OrcaAction::Update, record)
    }

    async fn on_delete(&self, record: &WebhookRecord) -> OrcaResult<()> {
        self.push(OrcaAction::Delete, record)
    }

    async fn on_test(&self, record: &WebhookRecord) -> OrcaResult<()> {
        self.push(OrcaAction::Test, record)
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn start_relay(config: OrcaConfig) -> (SocketAddr, Arc<CapturingHandler>) {
    let handler = Arc::new(CapturingHandler::default());
    let service = OrcaWebhookService::new(config, handler.clone()).unwrap();
    let addr = serve(service.router()).await;
    (addr, handler)
}

fn relay_config() -> OrcaConfig {
    let mut config = OrcaConfig::default();
    config.server.host = "127.0.0.1".to_string();
    // Nothing listens on port 1
    config.sender.target_url = "http://127.0.0.1:1/rows".to_string();
    config.sender.timeout = 2;
    config
}

async fn post_webhook(addr: SocketAddr, body: impl Into<reqwest::Body>) -> (u16, String) {
    let response = reqwest::Client::new()
        .post(format!("http://{}/orca-webhook-out", addr))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn add_event_reaches_add_handler() {
    let (addr, handler) = start_relay(relay_config()).await;

    let (status, body) = post_webhook(
        addr,
        r#"{"___orca_action":"add","Barcode":"123","Name":"Widget"}"#,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, "OK");

    let calls = handler.calls();
    assert_eq!(calls.len(), 1);
    let (action, record) = &calls[0];
    assert_eq!(*action, OrcaAction::Add);
    assert_eq!(record.sheet_name(), "");
    assert_eq!(record.user_email(), "");
    assert_eq!(record.text("Barcode").as_deref(), Some("123"));
    assert_eq!(record.text("Name").as_deref(), Some("Widget"));
}

#[tokio::test]
async fn every_recognised_action_dispatches_once() {
    let (addr, handler) = start_relay(relay_config()).await;

    for action in OrcaAction::ALL {
        let body = json!({"___orca_action": action.as_str(), "___orca_sheet_name": "Stock"});
        let (status, _) = post_webhook(addr, body.to_string()).await;
        assert_eq!(status, 200);
    }

    let actions: Vec<OrcaAction> = handler.calls().into_iter().map(|(a, _)| a).collect();
    assert_eq!(actions, OrcaAction::ALL.to_vec());
}

#[tokio::test]
async fn unknown_or_missing_action_is_acknowledged_without_dispatch() {
    let (addr, handler) = start_relay(relay_config()).await;

    let (status, body) = post_webhook(addr, r#"{"___orca_action":"bogus"}"#).await;
    assert_eq!((status, body.as_str()), (200, "OK"));

    let (status, _) = post_webhook(addr, r#"{"Barcode":"1"}"#).await;
    assert_eq!(status, 200);

    assert!(handler.calls().is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_server_error() {
    let (addr, handler) = start_relay(relay_config()).await;

    let (status, body) = post_webhook(addr, "not json").await;

    assert_eq!(status, 500);
    assert!(body.contains("expected"), "unexpected body: {}", body);
    assert!(handler.calls().is_empty());
}

#[tokio::test]
async fn schema_type_mismatch_is_rejected_with_configured_status() {
    let mut config = relay_config();
    config.receiver.decode_mode = orca_webhook::DecodeMode::Schema;
    config.receiver.decode_error_status = 400;
    config.receiver.schema = vec![orca_webhook::config::SchemaField {
        name: "Quantity".to_string(),
        kind: orca_webhook::FieldKind::Number,
    }];
    let (addr, handler) = start_relay(config).await;

    let (status, body) =
        post_webhook(addr, r#"{"___orca_action":"add","Quantity":"12"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body, "field `Quantity`: expected number, found string");

    let (status, _) = post_webhook(addr, r#"{"___orca_action":"add","Quantity":12}"#).await;
    assert_eq!(status, 200);
    assert_eq!(handler.calls().len(), 1);
}

#[tokio::test]
async fn repeated_delivery_is_not_deduplicated() {
    let (addr, handler) = start_relay(relay_config()).await;
    let body = r#"{"___orca_action":"update","___orca_row_id":"r1","Name":"Widget"}"#;

    for _ in 0..2 {
        let (status, text) = post_webhook(addr, body).await;
        assert_eq!((status, text.as_str()), (200, "OK"));
    }

    let calls = handler.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, calls[1].1);
}

#[tokio::test]
async fn sender_transport_failure_is_returned_to_caller() {
    let sender = OrcaSender::new(&relay_config().sender).unwrap();

    let mut row = BTreeMap::new();
    row.insert("Barcode".to_string(), "0123456789".to_string());
    row.insert("Name".to_string(), "New 1".to_string());
    row.insert("Quantity".to_string(), "12".to_string());
    row.insert("Description".to_string(), "Add new row example".to_string());

    let outcome = sender.send_add_row_event(row).await;
    assert!(matches!(outcome, SendOutcome::TransportFailed { .. }));
}

#[tokio::test]
async fn echoed_row_decodes_to_the_sent_fields() {
    // Orca stand-in that answers with the request body unchanged
    let echo = serve(Router::new().route("/rows", post(|body: Bytes| async move { body }))).await;

    let mut config = relay_config();
    config.sender.target_url = format!("http://{}/rows", echo);
    let sender = OrcaSender::new(&config.sender).unwrap();

    let outcome = sender.send_add_row_event(example_row()).await;

    let mut expected = example_row();
    expected.insert("___orca_action".to_string(), "add".to_string());
    let echoed = match outcome {
        SendOutcome::Delivered {
            status: 200,
            response: Some(echoed),
        } => echoed,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(echoed, expected);

    let wire = serde_json::to_vec(&echoed).unwrap();
    let record = RecordDecoder::open().decode(&wire).unwrap();
    assert_eq!(record.orca_action(), Some(OrcaAction::Add));

    let round_tripped: BTreeMap<String, String> = record
        .to_json_map()
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();
    assert_eq!(round_tripped, expected);
}

#[tokio::test]
async fn trigger_route_answers_after_outbound_call() {
    let (addr, _handler) = start_relay(relay_config()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/trigger-webhook-in", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}
