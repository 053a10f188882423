//! End-to-end cycles against a mock control plane.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use fleetd_agent::{Agent, AgentConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

#[derive(Debug)]
struct CapturedRequest {
    path: String,
    authorization: Option<String>,
    body: Value,
}

struct MockControlPlane {
    requests: Mutex<Vec<CapturedRequest>>,
    bootstrap_token: Option<String>,
    heartbeat_status: AtomicU16,
}

impl MockControlPlane {
    fn new(bootstrap_token: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            bootstrap_token: bootstrap_token.map(|t| t.to_string()),
            heartbeat_status: AtomicU16::new(200),
        })
    }

    fn capture(&self, path: &str, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        self.requests.lock().unwrap().push(CapturedRequest {
            path: path.to_string(),
            authorization,
            body,
        });
    }

    fn requests_for(&self, path: &str) -> Vec<(Option<String>, Value)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .map(|r| (r.authorization.clone(), r.body.clone()))
            .collect()
    }
}

async fn serve(state: Arc<MockControlPlane>) -> String {
    async fn register(
        State(state): State<Arc<MockControlPlane>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        state.capture("/internal/worker/register", &headers, body);
        match &state.bootstrap_token {
            Some(token) => Json(json!({ "bootstrap_token": token })),
            None => Json(json!({})),
        }
    }

    async fn heartbeat(
        State(state): State<Arc<MockControlPlane>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        state.capture("/internal/worker/heartbeat", &headers, body);
        StatusCode::from_u16(state.heartbeat_status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::OK)
    }

    let app = Router::new()
        .route("/internal/worker/register", post(register))
        .route("/internal/worker/heartbeat", post(heartbeat))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn agent_config(control_plane_url: &str) -> AgentConfig {
    AgentConfig {
        control_plane_url: control_plane_url.to_string(),
        instance_id: "i-int".to_string(),
        worker_id: Some("w-int".to_string()),
        model_id: Some("demo-model".to_string()),
        // Nothing listens here, so the runtime reports not-ready and
        // contributes no signals.
        runtime_base_url: "http://127.0.0.1:1".to_string(),
        runtime_metrics_url: "http://127.0.0.1:1/metrics".to_string(),
        simulate_gpu_count: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_bootstrap_token_flows_into_heartbeats() {
    let mock = MockControlPlane::new(Some("abc"));
    let base = serve(mock.clone()).await;

    let agent = Agent::new(agent_config(&base)).await.unwrap();
    assert!(!agent.control_plane().is_registered());

    // First cycle: registers, adopts the bootstrap token, heartbeats.
    agent.cycle().await;
    assert!(agent.control_plane().is_registered());
    assert_eq!(agent.credentials().bearer().as_deref(), Some("abc"));

    // Second cycle: heartbeat only.
    agent.cycle().await;

    let registers = mock.requests_for("/internal/worker/register");
    assert_eq!(registers.len(), 1);
    // The first register went out before any credential existed.
    assert_eq!(registers[0].0, None);
    assert_eq!(registers[0].1["instance_id"], "i-int");
    assert_eq!(registers[0].1["worker_id"], "w-int");
    assert_eq!(registers[0].1["model_id"], "demo-model");
    assert_eq!(registers[0].1["vllm_port"], 8000);
    assert_eq!(registers[0].1["health_port"], 8080);

    let heartbeats = mock.requests_for("/internal/worker/heartbeat");
    assert_eq!(heartbeats.len(), 2);
    for (authorization, body) in &heartbeats {
        assert_eq!(authorization.as_deref(), Some("Bearer abc"));
        // The runtime is unreachable, so the worker is still starting.
        assert_eq!(body["status"], "starting");
        assert_eq!(body["queue_depth"], Value::Null);
        // One simulated GPU is configured.
        assert!(body["gpu_utilization"].is_number());
        assert_eq!(body["metadata"]["gpus"].as_array().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_supplied_token_is_not_replaced_by_bootstrap() {
    let mock = MockControlPlane::new(Some("bootstrap-token"));
    let base = serve(mock.clone()).await;

    let mut config = agent_config(&base);
    config.worker_auth_token = Some("supplied-token".to_string());
    let agent = Agent::new(config).await.unwrap();

    agent.cycle().await;
    assert_eq!(agent.credentials().bearer().as_deref(), Some("supplied-token"));

    let registers = mock.requests_for("/internal/worker/register");
    assert_eq!(registers[0].0.as_deref(), Some("Bearer supplied-token"));
}

#[tokio::test]
async fn test_heartbeat_failure_keeps_registration() {
    let mock = MockControlPlane::new(Some("tok"));
    let base = serve(mock.clone()).await;

    let agent = Agent::new(agent_config(&base)).await.unwrap();
    agent.cycle().await;
    assert!(agent.control_plane().is_registered());

    // The control plane starts refusing heartbeats.
    mock.heartbeat_status.store(500, Ordering::SeqCst);
    agent.cycle().await;

    // Registration is monotonic and only one register was ever sent.
    assert!(agent.control_plane().is_registered());
    assert_eq!(mock.requests_for("/internal/worker/register").len(), 1);
    assert_eq!(mock.requests_for("/internal/worker/heartbeat").len(), 2);
}

#[tokio::test]
async fn test_heartbeats_skipped_without_credential_or_registration() {
    // Registration fails at the transport level; no token anywhere.
    let config = agent_config("http://127.0.0.1:1");
    let agent = Agent::new(config).await.unwrap();

    agent.cycle().await;

    assert!(!agent.control_plane().is_registered());
    assert!(!agent.control_plane().should_heartbeat());
}

#[tokio::test]
async fn test_disabled_control_plane_sends_nothing() {
    let mock = MockControlPlane::new(None);
    let base = serve(mock.clone()).await;

    // An agent without an instance id never registers, even with a URL.
    let mut config = agent_config(&base);
    config.instance_id = String::new();
    let agent = Agent::new(config).await.unwrap();

    agent.cycle().await;

    assert!(mock.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_stops_on_sigterm() {
    // Control plane disabled, port 0 so the exposition bind is free.
    let mut config = AgentConfig::default();
    config.health_port = 0;
    config.runtime_base_url = "http://127.0.0.1:1".to_string();
    config.runtime_metrics_url = "http://127.0.0.1:1/metrics".to_string();
    let mut agent = Agent::new(config).await.unwrap();

    let handle = tokio::spawn(async move { agent.run().await });

    // Give the loop time to install its signal handlers.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("agent did not stop on SIGTERM")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_bootstrap_token_is_persisted_for_restart() {
    let mock = MockControlPlane::new(Some("persisted-tok"));
    let base = serve(mock.clone()).await;
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("worker.token");

    let mut config = agent_config(&base);
    config.worker_auth_token_file = Some(token_path.clone());
    let agent = Agent::new(config.clone()).await.unwrap();

    agent.cycle().await;
    assert_eq!(
        std::fs::read_to_string(&token_path).unwrap(),
        "persisted-tok\n"
    );

    // A restarted agent picks the credential up from disk and can
    // heartbeat before ever re-registering.
    let restarted = Agent::new(config).await.unwrap();
    assert_eq!(
        restarted.credentials().bearer().as_deref(),
        Some("persisted-tok")
    );
    assert!(restarted.control_plane().should_heartbeat());
}
