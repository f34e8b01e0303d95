//! JSON-RPC boundary over real HTTP: bearer-token gate on submission,
//! ungated status polling

use jsonrpsee::server::ServerHandle;
use playlist_import_api_rpc::error::code;
use playlist_import_api_rpc::{RpcServer, RpcServerConfig};
use playlist_import_core::application::{
    AuthConfig, AuthGate, ImportService, JobRegistry, RetentionPolicy,
};
use playlist_import_core::domain::JobStatus;
use playlist_import_core::port::id_provider::UuidProvider;
use playlist_import_core::port::job_queue::mocks::InMemoryJobQueue;
use playlist_import_core::port::time_provider::SystemTimeProvider;
use serde_json::{json, Value};
use std::sync::Arc;

const TOKEN: &str = "integration-test-token";
const PLAYLIST: &str = "https://music.example.com/playlist?list=rpc";

struct TestServer {
    url: String,
    queue: Arc<InMemoryJobQueue>,
    registry: Arc<JobRegistry>,
    handle: ServerHandle,
}

impl TestServer {
    async fn start(auth: AuthConfig) -> Self {
        let registry = Arc::new(JobRegistry::new(
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
            RetentionPolicy::default(),
        ));
        let queue = Arc::new(InMemoryJobQueue::new());
        let service = Arc::new(ImportService::new(registry.clone(), queue.clone()));

        let config = RpcServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let (handle, addr) = RpcServer::new(config, service, Arc::new(AuthGate::new(auth)))
            .start()
            .await
            .unwrap();

        Self {
            url: format!("http://{}", addr),
            queue,
            registry,
            handle,
        }
    }

    async fn call(&self, method: &str, params: Value, authorization: Option<&str>) -> Value {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let mut request = reqwest::Client::new().post(&self.url).json(&body);
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }
        request.send().await.unwrap().json().await.unwrap()
    }

    async fn submit(&self, authorization: Option<&str>) -> Value {
        self.call(
            "import.submit.v1",
            json!({"playlist_url": PLAYLIST}),
            authorization,
        )
        .await
    }

    async fn stop(self) {
        self.handle.stop().unwrap();
        self.handle.stopped().await;
    }
}

fn enabled() -> AuthConfig {
    AuthConfig {
        disabled: false,
        expected_token: Some(TOKEN.to_string()),
    }
}

fn bearer() -> String {
    format!("Bearer {}", TOKEN)
}

fn error_code(response: &Value) -> i64 {
    response["error"]["code"].as_i64().unwrap_or_default()
}

#[tokio::test]
async fn test_missing_header_is_unauthenticated() {
    let server = TestServer::start(enabled()).await;

    let response = server.submit(None).await;

    assert_eq!(error_code(&response), code::UNAUTHENTICATED as i64);
    assert_eq!(response["error"]["data"]["http_status"], 401);
    assert!(server.registry.is_empty());
    assert_eq!(server.queue.pending_len(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_wrong_token_is_rejected_distinctly() {
    let server = TestServer::start(enabled()).await;

    let response = server.submit(Some("Bearer not-the-token")).await;

    assert_eq!(error_code(&response), code::INVALID_TOKEN as i64);
    assert_eq!(response["error"]["data"]["http_status"], 403);
    assert!(server.registry.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_correct_token_queues_job() {
    let server = TestServer::start(enabled()).await;

    let response = server.submit(Some(&bearer())).await;

    assert!(response.get("error").is_none(), "{}", response);
    assert_eq!(response["result"]["status"], "queued");
    let job_id = response["result"]["job_id"].as_str().unwrap().to_string();
    assert_eq!(
        server.registry.get(&job_id).unwrap().status,
        JobStatus::Queued
    );
    assert_eq!(server.queue.pending_len(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_status_polling_is_not_gated() {
    let server = TestServer::start(enabled()).await;
    let submitted = server.submit(Some(&bearer())).await;
    let job_id = submitted["result"]["job_id"].as_str().unwrap().to_string();

    let status = server
        .call("import.status.v1", json!({"job_id": job_id}), None)
        .await;

    assert_eq!(status["result"]["id"], job_id.as_str());
    assert_eq!(status["result"]["status"], "queued");
    assert_eq!(status["result"]["progress"]["total"], 0);
    assert!(status["result"]["createdAt"].is_i64());
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let server = TestServer::start(enabled()).await;

    let response = server
        .call("import.status.v1", json!({"job_id": "no-such-job"}), None)
        .await;

    assert_eq!(error_code(&response), code::NOT_FOUND as i64);
    server.stop().await;
}

#[tokio::test]
async fn test_invalid_url_is_validation_error() {
    let server = TestServer::start(enabled()).await;

    let response = server
        .call(
            "import.submit.v1",
            json!({"playlist_url": "ftp://music.example.com/list"}),
            Some(&bearer()),
        )
        .await;

    assert_eq!(error_code(&response), code::VALIDATION_ERROR as i64);
    assert!(server.registry.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_disabled_auth_accepts_any_request() {
    let server = TestServer::start(AuthConfig {
        disabled: true,
        expected_token: None,
    })
    .await;

    let anonymous = server.submit(None).await;
    let garbage = server.submit(Some("Bearer whatever")).await;

    assert_eq!(anonymous["result"]["status"], "queued");
    assert_eq!(garbage["result"]["status"], "queued");
    assert_eq!(server.queue.pending_len(), 2);
    server.stop().await;
}

#[tokio::test]
async fn test_enabled_without_token_is_misconfigured() {
    let server = TestServer::start(AuthConfig {
        disabled: false,
        expected_token: None,
    })
    .await;

    let response = server.submit(Some(&bearer())).await;

    assert_eq!(error_code(&response), code::AUTH_MISCONFIGURED as i64);
    assert_eq!(response["error"]["data"]["http_status"], 500);
    assert!(server.registry.is_empty());
    server.stop().await;
}
