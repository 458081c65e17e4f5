//! services/api/src/adapters/relay.rs
//!
//! The client-side `ChatTransport` implementation: POSTs the conversation
//! to the relay endpoint and hands back the raw chunked response body.
//! This is the `fetch("/api/chat")` of the original browser client.

use async_trait::async_trait;
use chatrelay_core::ports::{ByteStream, ChatTransport, PortError, PortResult, ProviderTurn};
use chatrelay_core::Role;
use futures::TryStreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RelayRequest {
    messages: Vec<RelayMessage>,
}

#[derive(Debug, Serialize)]
struct RelayMessage {
    role: &'static str,
    content: String,
}

pub struct HttpRelayTransport {
    client: Client,
    url: String,
}

impl HttpRelayTransport {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, url }
    }
}

#[async_trait]
impl ChatTransport for HttpRelayTransport {
    async fn send(&self, turns: &[ProviderTurn]) -> PortResult<ByteStream> {
        let request = RelayRequest {
            messages: turns
                .iter()
                .map(|turn| RelayMessage {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: turn.content.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Relay error ({status}): {detail}"
            )));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| PortError::Unexpected(format!("Stream read failed: {e}")));
        Ok(Box::pin(body))
    }
}
