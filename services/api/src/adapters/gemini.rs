//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for the upstream text-generation model.
//! It implements the `CompletionService` port from the `core` crate against
//! the Google Generative Language streaming REST API.

use async_stream::try_stream;
use async_trait::async_trait;
use chatrelay_core::ports::{
    CompletionService, FragmentStream, PortError, PortResult, ProviderTurn,
};
use chatrelay_core::Role;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

//=========================================================================================
// Provider Wire Types
//=========================================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<WireContent>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
struct WirePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using the Gemini
/// server-sent-events endpoint (`:streamGenerateContent?alt=sse`).
#[derive(Clone)]
pub struct GeminiCompletionAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiCompletionAdapter {
    /// Creates a new `GeminiCompletionAdapter`.
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Pulls the fragment text out of one SSE `data:` payload. Chunks
    /// without candidate text (safety metadata, usage counts) yield `None`.
    fn extract_text(payload: &str) -> Option<String> {
        let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
        let text: String = chunk
            .candidates?
            .into_iter()
            .filter_map(|c| c.content)
            .filter_map(|c| c.parts)
            .flatten()
            .filter_map(|p| p.text)
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for GeminiCompletionAdapter {
    /// Streams a completion for the conversation. `history` holds every
    /// prior turn (assistant turns become the provider's `model` role) and
    /// `current` is the new user turn.
    async fn stream_completion(
        &self,
        history: &[ProviderTurn],
        current: &str,
    ) -> PortResult<FragmentStream> {
        let mut contents: Vec<WireContent> = history
            .iter()
            .map(|turn| WireContent {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                },
                parts: vec![WirePart {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(WireContent {
            role: "user",
            parts: vec![WirePart {
                text: current.to_string(),
            }],
        });

        debug!(model = %self.model, turns = contents.len(), "requesting completion");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest { contents })
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
                StatusCode::NOT_FOUND => PortError::NotFound(self.model.clone()),
                _ => PortError::Unexpected(format!("Provider error ({status}): {detail}")),
            });
        }

        let mut body = response.bytes_stream();
        let stream = try_stream! {
            // SSE payloads are newline-delimited; a network chunk can end
            // mid-line, so bytes are buffered until a full line arrives.
            let mut pending: Vec<u8> = Vec::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk
                    .map_err(|e| PortError::Unexpected(format!("Stream read failed: {e}")))?;
                pending.extend_from_slice(&chunk);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if let Some(payload) = line.strip_prefix("data: ") {
                        if let Some(text) = Self::extract_text(payload) {
                            yield text;
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_joins_candidate_parts() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        assert_eq!(
            GeminiCompletionAdapter::extract_text(payload),
            Some("Hello".to_string())
        );
    }

    #[test]
    fn extract_text_skips_metadata_only_chunks() {
        assert_eq!(
            GeminiCompletionAdapter::extract_text(r#"{"usageMetadata":{"totalTokenCount":3}}"#),
            None
        );
        assert_eq!(GeminiCompletionAdapter::extract_text("not json"), None);
    }

    #[test]
    fn endpoint_includes_model_and_sse_flag() {
        let adapter = GeminiCompletionAdapter::new(
            "https://example.test/v1beta/".to_string(),
            "key".to_string(),
            "gemini-1.5-flash".to_string(),
        );
        assert_eq!(
            adapter.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
