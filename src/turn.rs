// Turn orchestration.
//
// Runs one client-facing streamed turn: resolve the continuation token,
// build the upstream request, open the streaming call, and drive the
// decoder and translator, forwarding client events in arrival order. Every
// turn ends with exactly one of `done`, `error`, or
// `oauth_consent_required`.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::conversation::{ConversationState, ConversationStore};
use crate::stream::{translate, ClientEvent, SseDecoder, TurnState, TurnStep};
use crate::upstream::{UpstreamBody, UpstreamConnector, UpstreamRequest};

/// Maximum bytes of an upstream error body echoed into an `error` event.
const ERROR_SNIPPET_BYTES: usize = 300;

/// Collaborators shared by all turns.
#[derive(Clone)]
pub struct TurnDeps {
    pub config: Arc<Config>,
    pub tokens: Arc<dyn TokenProvider>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub conversations: Arc<dyn ConversationStore>,
}

/// Either a new user message or a resume after consent.
#[derive(Debug, Clone)]
pub enum TurnInput {
    Message(String),
    Resume,
}

/// Runs streamed turns against the upstream responses endpoint.
pub struct TurnRunner {
    deps: TurnDeps,
}

impl TurnRunner {
    pub fn new(deps: TurnDeps) -> Self {
        Self { deps }
    }

    /// Run one turn, returning the client-facing SSE byte stream.
    ///
    /// The turn is driven by a spawned task. If the returned stream is
    /// dropped (client disconnected), the next send fails, the task
    /// returns, and dropping the upstream body cancels the outbound call.
    pub fn run(
        &self,
        conversation_id: String,
        input: TurnInput,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        let deps = self.deps.clone();

        tokio::spawn(async move {
            drive_turn(deps, conversation_id, input, tx).await;
        });

        ReceiverStream::new(rx)
    }
}

/// Build the upstream request body. `previous_response_id` continues a
/// stored conversation; `user_message` is absent on a resume.
pub fn build_request_body(
    agent_id: &str,
    previous_response_id: Option<&str>,
    user_message: Option<&str>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": agent_id,
        "stream": true,
    });
    if let Some(previous) = previous_response_id {
        body["previous_response_id"] = serde_json::Value::String(previous.to_string());
    }
    if let Some(message) = user_message {
        body["input"] = serde_json::json!([{"role": "user", "content": message}]);
    }
    body
}

async fn drive_turn(
    deps: TurnDeps,
    conversation_id: String,
    input: TurnInput,
    tx: mpsc::Sender<Bytes>,
) {
    let request_id = Uuid::new_v4().to_string();

    let previous_response_id = deps
        .conversations
        .get(&conversation_id)
        .and_then(|state| state.previous_response_id);

    let user_message = match &input {
        TurnInput::Message(message) => Some(message.as_str()),
        TurnInput::Resume => None,
    };
    let body = build_request_body(
        &deps.config.agent_id,
        previous_response_id.as_deref(),
        user_message,
    );
    let url = format!("{}/openai/v1/responses", deps.config.project_endpoint);

    tracing::info!(
        request_id = %request_id,
        conversation_id = %conversation_id,
        resume = user_message.is_none(),
        has_previous_response = previous_response_id.is_some(),
        "opening upstream stream"
    );

    let bearer_token = match deps.tokens.bearer_token().await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "credential acquisition failed");
            let _ = send_event(&tx, &ClientEvent::Error {
                message: e.to_string(),
            })
            .await;
            return;
        }
    };

    let request = UpstreamRequest {
        url,
        bearer_token,
        body,
    };
    let response = match deps.connector.open(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "upstream connect failed");
            let _ = send_event(&tx, &ClientEvent::Error {
                message: e.to_string(),
            })
            .await;
            return;
        }
    };

    if !response.status.is_success() {
        let snippet = read_snippet(response.body, ERROR_SNIPPET_BYTES).await;
        let message = format!(
            "upstream API HTTP {}: {}",
            response.status.as_u16(),
            snippet
        );
        tracing::error!(
            request_id = %request_id,
            status = response.status.as_u16(),
            "upstream returned error status"
        );
        let _ = send_event(&tx, &ClientEvent::Error { message }).await;
        return;
    }

    let mut body = response.body;
    let mut decoder = SseDecoder::new();
    let mut state = TurnState::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "upstream stream failed");
                let _ = send_event(&tx, &ClientEvent::Error {
                    message: e.to_string(),
                })
                .await;
                return;
            }
        };

        for record in decoder.push(&chunk) {
            let step = translate(&record, &mut state);
            if let Flow::Stop =
                apply_step(step, &deps, &conversation_id, &request_id, &state, &tx).await
            {
                return;
            }
        }
        if decoder.is_finished() {
            break;
        }
    }

    for record in decoder.finish() {
        let step = translate(&record, &mut state);
        if let Flow::Stop =
            apply_step(step, &deps, &conversation_id, &request_id, &state, &tx).await
        {
            return;
        }
    }

    let response_id = state.response_id.clone().unwrap_or_default();
    tracing::info!(request_id = %request_id, response_id = %response_id, "turn completed");
    let _ = send_event(&tx, &ClientEvent::Done { response_id }).await;
}

enum Flow {
    Continue,
    Stop,
}

async fn apply_step(
    step: TurnStep,
    deps: &TurnDeps,
    conversation_id: &str,
    request_id: &str,
    state: &TurnState,
    tx: &mpsc::Sender<Bytes>,
) -> Flow {
    match step {
        TurnStep::Emit(event) => {
            if send_event(tx, &event).await.is_err() {
                // Client disconnected; dropping the upstream body cancels
                // the outbound call.
                Flow::Stop
            } else {
                Flow::Continue
            }
        }

        TurnStep::Completed => {
            deps.conversations.put(
                conversation_id,
                ConversationState {
                    previous_response_id: state.response_id.clone(),
                },
            );
            tracing::info!(
                request_id = %request_id,
                response_id = state.response_id.as_deref().unwrap_or(""),
                "response completed"
            );
            Flow::Continue
        }

        TurnStep::Consent {
            consent_link,
            connection_name,
        } => {
            deps.conversations.put(
                conversation_id,
                ConversationState {
                    previous_response_id: state.response_id.clone(),
                },
            );
            // The consent link carries OAuth state parameters; log the
            // connection name only.
            tracing::info!(
                request_id = %request_id,
                connection = %connection_name,
                response_id = state.response_id.as_deref().unwrap_or(""),
                "consent required, pausing turn"
            );
            let event = ClientEvent::ConsentRequired {
                consent_link,
                response_id: state.response_id.clone(),
                connection_name,
            };
            let _ = send_event(tx, &event).await;
            Flow::Stop
        }

        TurnStep::Fail { message } => {
            tracing::error!(request_id = %request_id, error = %message, "upstream error event");
            let _ = send_event(tx, &ClientEvent::Error { message }).await;
            Flow::Stop
        }

        TurnStep::Skip => Flow::Continue,
    }
}

async fn send_event(tx: &mpsc::Sender<Bytes>, event: &ClientEvent) -> Result<(), ()> {
    tx.send(event.to_frame()).await.map_err(|_| ())
}

/// Read at most `limit` bytes of an upstream error body for the error
/// message.
async fn read_snippet(mut body: UpstreamBody, limit: usize) -> String {
    let mut collected = Vec::new();
    while collected.len() < limit {
        match body.next().await {
            Some(Ok(chunk)) => collected.extend_from_slice(&chunk),
            _ => break,
        }
    }
    collected.truncate(limit);
    String::from_utf8_lossy(&collected).trim().to_string()
}
