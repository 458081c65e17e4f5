//! services/api/src/web/chat.rs
//!
//! Contains the Axum handler for the streaming chat relay endpoint and the
//! master definition for the OpenAPI specification.
//!
//! Errors raised before any response byte is written map onto HTTP status
//! codes. Once streaming has begun the status is already 200, so failures
//! are encoded in-band as an `Error:` frame followed by the terminal
//! sentinel, which is sent exactly once per cycle either way.

use crate::web::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chatrelay_core::ports::PortError;
use chatrelay_core::{wire, ProviderTurn, Role};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chat_handler,
    ),
    components(
        schemas(ChatRequest, ChatTurn, ErrorBody)
    ),
    tags(
        (name = "Chat Relay API", description = "Streaming relay between the chat client and the model provider.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

/// The conversation to complete: prior turns plus the new user turn, last.
#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
}

/// One role/content pair. Roles other than `assistant` are treated as user
/// turns.
#[derive(Deserialize, ToSchema)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// The JSON error payload returned for non-streaming failures.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            details: None,
        }
    }
}

type HandlerError = (StatusCode, Json<ErrorBody>);

fn reject(status: StatusCode, error: &str) -> HandlerError {
    (status, Json(ErrorBody::new(error)))
}

//=========================================================================================
// The Relay Handler
//=========================================================================================

/// Stream a model completion for a conversation.
///
/// Accepts the full message history; all but the last message become
/// provider history and the last message is the new turn. Responds with a
/// chunked plain-text body of `data:` frames ending in `data: [DONE]`.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Chunked stream of data: frames, terminated by data: [DONE]"),
        (status = 400, description = "messages is missing, not a sequence, or empty", body = ErrorBody),
        (status = 401, description = "The provider rejected the credential", body = ErrorBody),
        (status = 404, description = "The requested model is unavailable", body = ErrorBody),
        (status = 500, description = "Missing credential or internal error", body = ErrorBody)
    )
)]
pub async fn chat_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, HandlerError> {
    let Some(completion) = app_state.completion.clone() else {
        return Err(reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Gemini API key not configured",
        ));
    };

    let Some(raw_messages) = body.get("messages").filter(|m| m.is_array()).cloned() else {
        return Err(reject(StatusCode::BAD_REQUEST, "Messages array is required"));
    };
    let messages: Vec<ChatTurn> = serde_json::from_value(raw_messages)
        .map_err(|_| reject(StatusCode::BAD_REQUEST, "Messages array is malformed"))?;
    let Some((current, history)) = messages.split_last() else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Messages array must not be empty",
        ));
    };

    let history: Vec<ProviderTurn> = history
        .iter()
        .map(|turn| ProviderTurn {
            role: if turn.role == "assistant" {
                Role::Assistant
            } else {
                Role::User
            },
            content: turn.content.clone(),
        })
        .collect();

    let fragments = match completion.stream_completion(&history, &current.content).await {
        Ok(fragments) => fragments,
        Err(PortError::Unauthorized) => {
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid API key"))
        }
        Err(PortError::NotFound(_)) => {
            return Err(reject(StatusCode::NOT_FOUND, "Model not available"))
        }
        Err(err) => {
            error!("Provider request failed: {err}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "Internal server error".to_string(),
                    details: Some(err.to_string()),
                }),
            ));
        }
    };

    let frames = async_stream::stream! {
        let mut fragments = fragments;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) => yield Ok::<_, Infallible>(wire::encode_fragment(&text)),
                Err(err) => {
                    error!("Streaming error: {err}");
                    yield Ok(wire::encode_error(&err.to_string()));
                    break;
                }
            }
        }
        yield Ok(wire::encode_done());
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use chatrelay_core::ports::{CompletionService, FragmentStream, PortResult};
    use futures::stream;

    struct StubCompletion {
        script: Vec<Result<&'static str, &'static str>>,
        refuse: Option<fn() -> PortError>,
    }

    #[async_trait]
    impl CompletionService for StubCompletion {
        async fn stream_completion(
            &self,
            _history: &[ProviderTurn],
            _current: &str,
        ) -> PortResult<FragmentStream> {
            if let Some(refuse) = self.refuse {
                return Err(refuse());
            }
            let items: Vec<PortResult<String>> = self
                .script
                .iter()
                .map(|item| match item {
                    Ok(text) => Ok(text.to_string()),
                    Err(detail) => Err(PortError::Unexpected(detail.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            log_level: tracing::Level::INFO,
            gemini_api_key: Some("test-key".to_string()),
            chat_model: "gemini-1.5-flash".to_string(),
            provider_base_url: "http://localhost".to_string(),
            relay_url: "http://localhost/api/chat".to_string(),
            state_path: std::path::PathBuf::from("/tmp/unused"),
        })
    }

    fn state_with(completion: Option<StubCompletion>) -> Arc<AppState> {
        Arc::new(AppState {
            config: test_config(),
            completion: completion.map(|c| Arc::new(c) as Arc<dyn CompletionService>),
        })
    }

    fn ok_stub(fragments: Vec<&'static str>) -> StubCompletion {
        StubCompletion {
            script: fragments.into_iter().map(Ok).collect(),
            refuse: None,
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_messages_is_a_400() {
        let state = state_with(Some(ok_stub(vec![])));
        let err = chat_handler(State(state), Json(serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_sequence_messages_is_a_400() {
        let state = state_with(Some(ok_stub(vec![])));
        let body = serde_json::json!({ "messages": "not a list" });
        let err = chat_handler(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_credential_is_a_500_before_any_stream() {
        let state = state_with(None);
        let body = serde_json::json!({ "messages": [{ "role": "user", "content": "hi" }] });
        let err = chat_handler(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.1 .0.error, "Gemini API key not configured");
    }

    #[tokio::test]
    async fn rejected_credential_is_a_401() {
        let state = state_with(Some(StubCompletion {
            script: vec![],
            refuse: Some(|| PortError::Unauthorized),
        }));
        let body = serde_json::json!({ "messages": [{ "role": "user", "content": "hi" }] });
        let err = chat_handler(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unavailable_model_is_a_404() {
        let state = state_with(Some(StubCompletion {
            script: vec![],
            refuse: Some(|| PortError::NotFound("gemini-1.5-flash".to_string())),
        }));
        let body = serde_json::json!({ "messages": [{ "role": "user", "content": "hi" }] });
        let err = chat_handler(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn success_relays_framed_fragments_and_one_sentinel() {
        let state = state_with(Some(ok_stub(vec!["Hi", "there!"])));
        let body = serde_json::json!({ "messages": [{ "role": "user", "content": "Say hi" }] });
        let response = chat_handler(State(state), Json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(
            body_string(response).await,
            "data: Hi\n\ndata: there!\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_is_encoded_in_band_then_terminated() {
        let state = state_with(Some(StubCompletion {
            script: vec![Ok("partial"), Err("network drop")],
            refuse: None,
        }));
        let body = serde_json::json!({ "messages": [{ "role": "user", "content": "hi" }] });
        let response = chat_handler(State(state), Json(body)).await.unwrap();
        let text = body_string(response).await;
        assert_eq!(
            text,
            "data: partial\n\ndata: Error: An unexpected error occurred: network drop\n\ndata: [DONE]\n\n"
        );
        assert_eq!(text.matches("[DONE]").count(), 1);
    }
}
