//! Fake SendGrid endpoint shared by the integration tests

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use relay_rs::config::Config;
use relay_rs::delivery::SendGridClient;
use relay_rs::relay::Relay;
use relay_rs::smtp::RelayServer;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const API_KEY: &str = "SG.integration";
pub const MESSAGE_ID: &str = "fake-message-id";

/// One request as seen by the fake provider
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct FakeState {
    status: StatusCode,
    delay: Duration,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub struct FakeSendGrid {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeSendGrid {
    /// Serve `/v3/mail/send`, answering every request with `status`
    pub async fn start(status: StatusCode) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    pub async fn start_with_delay(status: StatusCode, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            status,
            delay,
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/v3/mail/send", post(mail_send))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self, timeout: Duration) -> SendGridClient {
        SendGridClient::new(API_KEY.to_string(), timeout)
            .unwrap()
            .with_base_url(self.base_url())
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn mail_send(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.requests.lock().unwrap().push(CapturedRequest {
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let body = if state.status.is_success() {
        String::new()
    } else {
        r#"{"errors":[{"message":"fake failure"}]}"#.to_string()
    };

    (state.status, [("x-message-id", MESSAGE_ID)], body)
}

/// A running gateway wired to `provider`
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
}

impl Gateway {
    pub async fn start(provider: &FakeSendGrid) -> Self {
        let mut config = Config::development();
        config.server.hostname = "relay.test".to_string();
        config.smtp.listen_addr = "127.0.0.1:0".to_string();
        config.delivery.api_key = API_KEY.to_string();
        config.delivery.api_base_url = provider.base_url();
        config.delivery.request_timeout_secs = 5;
        config.relay.transaction_timeout_secs = 10;

        let client = SendGridClient::from_config(&config.delivery).unwrap();
        let relay = Arc::new(Relay::new(Arc::new(client)));
        let server = RelayServer::bind(&config, relay).await.unwrap();
        let addr = server.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));

        Self { addr, shutdown }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
