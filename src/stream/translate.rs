// Upstream event translation and consent interrupt detection.
//
// One decoded record in, one `TurnStep` out. The consent check runs before
// every other rule: the upstream expresses it either as an explicit
// `oauth_consent_request` event or as an `oauth_consent_request` object
// embedded in an otherwise ordinary payload.

use std::collections::HashMap;

use serde_json::Value;

use super::decoder::SseRecord;
use super::types::ClientEvent;

/// Name reported when the upstream omits one on a tool call item.
const FALLBACK_TOOL_NAME: &str = "unknown_tool";

/// Mutable state carried across one streamed turn. Never outlives it.
#[derive(Debug, Default)]
pub struct TurnState {
    /// Last response id reported by the upstream, if any.
    pub response_id: Option<String>,
    /// In-flight tool calls, keyed by call id.
    active_tool_calls: HashMap<String, String>,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What the orchestrator should do with one decoded record.
#[derive(Debug, PartialEq)]
pub enum TurnStep {
    /// Forward a client event and keep streaming.
    Emit(ClientEvent),
    /// Consent interrupt: persist state, notify the client, stop the turn.
    Consent {
        consent_link: String,
        connection_name: String,
    },
    /// `response.completed`: persist state, keep draining until the stream
    /// ends and the terminal `done` is sent.
    Completed,
    /// Upstream error event: send a terminal `error`, stop the turn.
    Fail { message: String },
    /// State-only update or unrecognized event.
    Skip,
}

/// Translate one decoded record against the turn state.
///
/// The event name comes from the SSE `event:` field, falling back to the
/// payload's `type` key when the upstream sent a bare data line.
pub fn translate(record: &SseRecord, state: &mut TurnState) -> TurnStep {
    let data = &record.data;
    let event_type = if record.event.is_empty() {
        data.get("type").and_then(Value::as_str).unwrap_or("")
    } else {
        record.event.as_str()
    };

    // Consent wins over everything else, in either wire shape.
    if event_type == "oauth_consent_request" {
        return consent_step(data);
    }
    if let Some(embedded) = data.get("oauth_consent_request") {
        return consent_step(embedded);
    }

    match event_type {
        "response.created" => {
            if let Some(id) = response_id_of(data) {
                state.response_id = Some(id);
            }
            TurnStep::Skip
        }

        "response.output_text.delta" | "response.text.delta" => {
            match data.get("delta").and_then(Value::as_str) {
                Some(delta) if !delta.is_empty() => TurnStep::Emit(ClientEvent::TextDelta {
                    delta: delta.to_string(),
                }),
                _ => TurnStep::Skip,
            }
        }

        "response.content_part.delta" => {
            let text = match data.get("delta") {
                Some(Value::Object(part)) => part
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            if text.is_empty() {
                TurnStep::Skip
            } else {
                TurnStep::Emit(ClientEvent::TextDelta { delta: text })
            }
        }

        "response.output_item.added" => {
            let Some(item) = function_call_item(data) else {
                return TurnStep::Skip;
            };
            let call_id = call_id_of(item);
            let tool_name = item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_TOOL_NAME)
                .to_string();
            state
                .active_tool_calls
                .insert(call_id.clone(), tool_name.clone());
            TurnStep::Emit(ClientEvent::ToolStart { tool_name, call_id })
        }

        "response.output_item.done" => {
            let Some(item) = function_call_item(data) else {
                return TurnStep::Skip;
            };
            let call_id = call_id_of(item);
            // Resolve the name recorded at start time; fall back to the
            // item's own name if the `added` event was never seen.
            let tool_name = state.active_tool_calls.remove(&call_id).unwrap_or_else(|| {
                item.get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(FALLBACK_TOOL_NAME)
                    .to_string()
            });
            TurnStep::Emit(ClientEvent::ToolEnd { tool_name, call_id })
        }

        "response.completed" => {
            if let Some(id) = data
                .get("response")
                .and_then(|r| r.get("id"))
                .and_then(Value::as_str)
            {
                state.response_id = Some(id.to_string());
            }
            TurnStep::Completed
        }

        "error" => {
            let err = data.get("error").unwrap_or(data);
            let message = match err {
                Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            };
            TurnStep::Fail { message }
        }

        // Unknown upstream event types are not failures.
        _ => TurnStep::Skip,
    }
}

fn consent_step(payload: &Value) -> TurnStep {
    let field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    TurnStep::Consent {
        consent_link: field("consent_link"),
        connection_name: field("connection_name"),
    }
}

fn response_id_of(data: &Value) -> Option<String> {
    data.get("response")
        .and_then(|r| r.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .or_else(|| data.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

fn function_call_item(data: &Value) -> Option<&Value> {
    let item = data.get("item")?;
    (item.get("type").and_then(Value::as_str) == Some("function_call")).then_some(item)
}

fn call_id_of(item: &Value) -> String {
    item.get("call_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .or_else(|| item.get("id").and_then(Value::as_str))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(event: &str, data: Value) -> SseRecord {
        SseRecord {
            event: event.to_string(),
            data,
        }
    }

    #[test]
    fn response_created_captures_nested_id_without_emitting() {
        let mut state = TurnState::new();
        let step = translate(
            &record("response.created", json!({"response": {"id": "resp_1"}})),
            &mut state,
        );
        assert_eq!(step, TurnStep::Skip);
        assert_eq!(state.response_id.as_deref(), Some("resp_1"));
    }

    #[test]
    fn response_created_falls_back_to_top_level_id() {
        let mut state = TurnState::new();
        translate(&record("response.created", json!({"id": "resp_2"})), &mut state);
        assert_eq!(state.response_id.as_deref(), Some("resp_2"));
    }

    #[test]
    fn output_text_delta_emits_text() {
        let mut state = TurnState::new();
        let step = translate(
            &record("response.output_text.delta", json!({"delta": "Hello"})),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::TextDelta {
                delta: "Hello".to_string()
            })
        );
    }

    #[test]
    fn empty_delta_is_skipped() {
        let mut state = TurnState::new();
        let step = translate(
            &record("response.output_text.delta", json!({"delta": ""})),
            &mut state,
        );
        assert_eq!(step, TurnStep::Skip);
    }

    #[test]
    fn event_type_falls_back_to_payload_type_field() {
        let mut state = TurnState::new();
        let step = translate(
            &record("", json!({"type": "response.text.delta", "delta": "hi"})),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::TextDelta {
                delta: "hi".to_string()
            })
        );
    }

    #[test]
    fn content_part_delta_reads_nested_text() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.content_part.delta",
                json!({"delta": {"text": "part"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::TextDelta {
                delta: "part".to_string()
            })
        );
    }

    #[test]
    fn content_part_delta_stringifies_unexpected_shapes() {
        let mut state = TurnState::new();
        let step = translate(
            &record("response.content_part.delta", json!({"delta": 42})),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::TextDelta {
                delta: "42".to_string()
            })
        );
    }

    #[test]
    fn function_call_added_records_name_and_emits_start() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.output_item.added",
                json!({"item": {"type": "function_call", "call_id": "call_1", "name": "search_mail"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::ToolStart {
                tool_name: "search_mail".to_string(),
                call_id: "call_1".to_string()
            })
        );
    }

    #[test]
    fn non_function_call_items_are_ignored() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.output_item.added",
                json!({"item": {"type": "message", "id": "msg_1"}}),
            ),
            &mut state,
        );
        assert_eq!(step, TurnStep::Skip);
    }

    #[test]
    fn call_id_falls_back_to_item_id() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.output_item.added",
                json!({"item": {"type": "function_call", "id": "fc_9", "name": "lookup"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::ToolStart {
                tool_name: "lookup".to_string(),
                call_id: "fc_9".to_string()
            })
        );
    }

    #[test]
    fn done_resolves_name_recorded_at_start() {
        let mut state = TurnState::new();
        translate(
            &record(
                "response.output_item.added",
                json!({"item": {"type": "function_call", "call_id": "call_1", "name": "search_mail"}}),
            ),
            &mut state,
        );
        // The done item carries a different name; the start-time name wins.
        let step = translate(
            &record(
                "response.output_item.done",
                json!({"item": {"type": "function_call", "call_id": "call_1", "name": "renamed"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::ToolEnd {
                tool_name: "search_mail".to_string(),
                call_id: "call_1".to_string()
            })
        );
    }

    #[test]
    fn done_without_added_falls_back_to_item_name() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.output_item.done",
                json!({"item": {"type": "function_call", "call_id": "call_2", "name": "late_tool"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::ToolEnd {
                tool_name: "late_tool".to_string(),
                call_id: "call_2".to_string()
            })
        );
    }

    #[test]
    fn missing_name_everywhere_reports_unknown_tool() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.output_item.done",
                json!({"item": {"type": "function_call", "call_id": "call_3"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Emit(ClientEvent::ToolEnd {
                tool_name: "unknown_tool".to_string(),
                call_id: "call_3".to_string()
            })
        );
    }

    #[test]
    fn completed_updates_response_id_and_signals_persist() {
        let mut state = TurnState::new();
        state.response_id = Some("resp_old".to_string());
        let step = translate(
            &record("response.completed", json!({"response": {"id": "resp_new"}})),
            &mut state,
        );
        assert_eq!(step, TurnStep::Completed);
        assert_eq!(state.response_id.as_deref(), Some("resp_new"));
    }

    #[test]
    fn completed_without_id_keeps_the_known_one() {
        let mut state = TurnState::new();
        state.response_id = Some("resp_1".to_string());
        let step = translate(&record("response.completed", json!({})), &mut state);
        assert_eq!(step, TurnStep::Completed);
        assert_eq!(state.response_id.as_deref(), Some("resp_1"));
    }

    #[test]
    fn explicit_consent_event_interrupts() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "oauth_consent_request",
                json!({"consent_link": "https://x", "connection_name": "graph"}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Consent {
                consent_link: "https://x".to_string(),
                connection_name: "graph".to_string()
            }
        );
    }

    #[test]
    fn embedded_consent_key_interrupts() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "",
                json!({"oauth_consent_request": {"consent_link": "https://x", "connection_name": "graph"}}),
            ),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Consent {
                consent_link: "https://x".to_string(),
                connection_name: "graph".to_string()
            }
        );
    }

    #[test]
    fn embedded_consent_takes_priority_over_other_handling() {
        let mut state = TurnState::new();
        let step = translate(
            &record(
                "response.completed",
                json!({
                    "response": {"id": "resp_1"},
                    "oauth_consent_request": {"consent_link": "https://x", "connection_name": "graph"}
                }),
            ),
            &mut state,
        );
        assert!(matches!(step, TurnStep::Consent { .. }));
    }

    #[test]
    fn error_event_extracts_message() {
        let mut state = TurnState::new();
        let step = translate(
            &record("error", json!({"error": {"message": "quota exceeded"}})),
            &mut state,
        );
        assert_eq!(
            step,
            TurnStep::Fail {
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn error_event_stringifies_unstructured_payloads() {
        let mut state = TurnState::new();
        let step = translate(&record("error", json!({"code": 500})), &mut state);
        assert_eq!(
            step,
            TurnStep::Fail {
                message: "{\"code\":500}".to_string()
            }
        );
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        let mut state = TurnState::new();
        let step = translate(
            &record("response.refusal.delta", json!({"delta": "no"})),
            &mut state,
        );
        assert_eq!(step, TurnStep::Skip);
    }
}
