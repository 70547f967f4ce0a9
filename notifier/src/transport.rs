//! Push transport abstraction.
//!
//! Shaped after this codebase's `WsMarketDataProvider` (an injected trait
//! hiding transport-specific wiring behind a narrow async interface),
//! generalized from a streaming source to a fire-and-forget sink: instead
//! of a long-lived `stream_quotes` loop, a single `push` call per message.

use async_trait::async_trait;
use tracing::{info, warn};

/// Outcome of a single push attempt, classified so the caller can decide
/// whether to clear the driver's stored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    InvalidToken,
    Transient,
    TerminalOther,
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(&self, token: &str, title: &str, body: &str) -> PushOutcome;
}

/// Production transport: an HTTP client hitting a push gateway. The exact
/// endpoint/key come from config; network errors are classified as
/// transient rather than propagated, since a push failure must never
/// affect the caller.
pub struct HttpPushTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpPushTransport {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn push(&self, token: &str, title: &str, body: &str) -> PushOutcome {
        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "token": token, "title": title, "body": body }))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => PushOutcome::Delivered,
            Ok(resp) if resp.status().as_u16() == 410 || resp.status().as_u16() == 404 => {
                PushOutcome::InvalidToken
            }
            Ok(resp) if resp.status().is_server_error() => PushOutcome::Transient,
            Ok(resp) => {
                warn!(status = %resp.status(), "push transport returned unexpected status");
                PushOutcome::TerminalOther
            }
            Err(e) if e.is_timeout() || e.is_connect() => PushOutcome::Transient,
            Err(e) => {
                warn!(error = %e, "push transport request failed");
                PushOutcome::TerminalOther
            }
        }
    }
}

/// Logging-only transport for environments without push configured.
pub struct LoggingPushTransport;

#[async_trait]
impl PushTransport for LoggingPushTransport {
    async fn push(&self, token: &str, title: &str, _body: &str) -> PushOutcome {
        info!(token, title, "push (logging transport, not actually sent)");
        PushOutcome::Delivered
    }
}
